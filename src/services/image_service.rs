use crate::api::error::AppError;
use crate::auth::Identity;
use crate::entities::images;
use crate::services::catalog::{ImageCatalog, UserStats};
use crate::services::storage::BlobStorage;
use std::sync::Arc;

pub const MAX_PAGE_SIZE: u64 = 100;

/// Read and delete paths over catalogued images. Uploads go through
/// the saga, not here.
pub struct ImageService {
    storage: Arc<dyn BlobStorage>,
    catalog: Arc<dyn ImageCatalog>,
}

impl ImageService {
    pub fn new(storage: Arc<dyn BlobStorage>, catalog: Arc<dyn ImageCatalog>) -> Self {
        Self { storage, catalog }
    }

    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<images::Model>, AppError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.catalog.list_by_user(user_id, limit, offset).await?)
    }

    /// Fetch one image the caller is allowed to see. Someone else's
    /// image reads the same as a missing one.
    pub async fn get(&self, identity: &Identity, id: &str) -> Result<images::Model, AppError> {
        let image = self
            .catalog
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

        if image.user_id != identity.user_id && !identity.is_admin {
            return Err(AppError::NotFound("Image not found".to_string()));
        }

        Ok(image)
    }

    /// Delete blob first, then the record. A failed blob delete is
    /// logged but does not keep the record alive; note a lingering
    /// blob gets re-adopted by the next reconciliation sweep.
    pub async fn delete(&self, identity: &Identity, id: &str) -> Result<(), AppError> {
        let image = self.get(identity, id).await?;

        if let Err(e) = self.storage.delete_object(&image.storage_key).await {
            tracing::warn!("Blob delete failed for {}: {}", image.storage_key, e);
        }
        self.catalog.delete_image(&image.id).await?;

        tracing::info!("🗑️ Deleted image {} ({})", image.id, image.storage_key);
        Ok(())
    }

    pub async fn stats(&self, user_id: &str) -> Result<UserStats, AppError> {
        Ok(self.catalog.user_stats(user_id).await?)
    }
}
