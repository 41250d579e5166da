use crate::entities::images;
use crate::services::catalog::ImageCatalog;
use crate::services::storage::{
    BlobObject, BlobStorage, META_ORIGINAL_FILENAME, META_UPLOADED_AT, META_USER_ID,
};
use crate::services::upload_service::{ALLOWED_TYPES, normalize_extension, normalize_mime};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one sweep. The HTTP layer owns the wire shape; this is
/// the engine's plain tally.
#[derive(Debug)]
pub struct SyncReport {
    /// Objects seen in the bucket.
    pub total: usize,
    /// Records created by this sweep.
    pub added: usize,
    /// Objects left alone: already catalogued, or not an allowed
    /// image type.
    pub skipped: usize,
    pub errors: Vec<String>,
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Walks the whole bucket and adopts every blob the catalog does not
/// know about, so images written by external tools (or orphaned by a
/// crashed upload) become queryable. Existing records are never
/// touched, which makes the sweep idempotent.
pub struct ReconciliationEngine {
    storage: Arc<dyn BlobStorage>,
    catalog: Arc<dyn ImageCatalog>,
    public_url: String,
}

impl ReconciliationEngine {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        catalog: Arc<dyn ImageCatalog>,
        public_url: String,
    ) -> Self {
        Self {
            storage,
            catalog,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// One full sweep. `acting_user_id` owns any blob that carries no
    /// uploader metadata. Per-object failures are reported, never
    /// fatal: a bad object costs one error line, not the sweep.
    pub async fn sweep(&self, acting_user_id: &str) -> anyhow::Result<SyncReport> {
        let objects = self.storage.list_all().await?;
        let total = objects.len();
        let mut added = 0;
        let mut skipped = 0;
        let mut errors = Vec::new();

        tracing::info!("🔄 Reconciliation sweep over {} objects", total);

        for object in objects {
            match self.adopt(&object, acting_user_id).await {
                Ok(true) => added += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    tracing::warn!("Sync failed for {}: {}", object.key, e);
                    errors.push(format!("{}: {}", object.key, e));
                }
            }
        }

        tracing::info!(
            "✅ Sweep done: {} added, {} skipped, {} errors",
            added,
            skipped,
            errors.len()
        );

        Ok(SyncReport {
            total,
            added,
            skipped,
            errors,
        })
    }

    /// Catalogue one blob. `Ok(true)` means a record was created,
    /// `Ok(false)` means the object was deliberately skipped.
    async fn adopt(&self, object: &BlobObject, acting_user_id: &str) -> anyhow::Result<bool> {
        if self.catalog.find_by_storage_key(&object.key).await?.is_some() {
            tracing::debug!("Skipping {}: already catalogued", object.key);
            return Ok(false);
        }

        let filename = object
            .meta(META_ORIGINAL_FILENAME)
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                object
                    .key
                    .rsplit('/')
                    .next()
                    .unwrap_or(&object.key)
                    .to_string()
            });

        // Format follows the recorded filename, which is what the
        // uploader actually sent; the key's extension can lag behind
        // a renamed original.
        let extension = normalize_extension(&filename);
        let mime_type = match object.content_type.as_deref() {
            Some(ct) => normalize_mime(ct),
            None => match mime_for_extension(&extension) {
                Some(ct) => ct.to_string(),
                None => {
                    tracing::debug!("Skipping {}: unrecognized extension", object.key);
                    return Ok(false);
                }
            },
        };
        if !ALLOWED_TYPES.contains(&mime_type.as_str()) {
            tracing::debug!("Skipping {}: {} is not an image type", object.key, mime_type);
            return Ok(false);
        }

        let user_id = object
            .meta(META_USER_ID)
            .unwrap_or(acting_user_id)
            .to_string();

        // Upload-time stamp when present and parseable, otherwise the
        // store's own modification time.
        let created_at = object
            .meta(META_UPLOADED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(object.last_modified);

        let record = images::Model {
            id: Uuid::new_v4().to_string(),
            user_id,
            filename,
            storage_key: object.key.clone(),
            file_size: object.size,
            width: None,
            height: None,
            format: extension,
            mime_type,
            is_compressed: false,
            compression_quality: None,
            original_size: None,
            url: format!("{}/{}", self.public_url, object.key),
            created_at,
        };

        self.catalog.insert_image(record).await?;
        Ok(true)
    }
}
