use async_trait::async_trait;

use crate::store::FileStorage;
use crate::utils::StoreError;

/// Resolves object ids to `{base_url}/{object_id}`.
#[derive(Debug, Clone)]
pub struct StaticFileStorage {
    base_url: String,
}

impl StaticFileStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FileStorage for StaticFileStorage {
    async fn resolve_url(&self, object_id: &str) -> Result<String, StoreError> {
        if object_id.is_empty() {
            return Err(StoreError::not_found("object", object_id));
        }
        Ok(format!("{}/{}", self.base_url, object_id))
    }
}
