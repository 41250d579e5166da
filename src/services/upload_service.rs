use crate::api::error::AppError;
use crate::entities::images;
use crate::services::catalog::ImageCatalog;
use crate::services::storage::{
    BlobStorage, META_ORIGINAL_FILENAME, META_UPLOADED_AT, META_USER_ID,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub const ALLOWED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

const STORAGE_KEY_LEN: usize = 16;
const KEY_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// One file as submitted by a client, fully buffered.
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadedImage {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub size: i64,
    pub format: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub uploaded: usize,
    pub failed: usize,
    pub results: Vec<UploadedImage>,
    pub errors: Vec<UploadFailure>,
}

/// Lower-cased file extension with the `jpg -> jpeg` alias applied,
/// so the catalog never stores both spellings of the same format.
pub fn normalize_extension(filename: &str) -> String {
    let raw = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "jpg".to_string());

    if raw == "jpg" { "jpeg".to_string() } else { raw }
}

/// Lower-cased MIME type with the same alias (`image/jpg` is not a
/// registered type but appears in the wild).
pub fn normalize_mime(mime: &str) -> String {
    let lower = mime.trim().to_lowercase();
    if lower == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        lower
    }
}

fn generate_storage_key(extension: &str) -> String {
    let mut rng = rand::thread_rng();
    let id: String = (0..STORAGE_KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    format!("{}.{}", id, extension)
}

/// Moves a submitted file to "queryable image record" in two steps:
/// blob write, then catalog insert. There is no transaction spanning
/// the two stores; when the insert fails the just-written blob is
/// deleted best-effort and the insert error is re-raised. An orphaned
/// blob is tolerated, an orphaned catalog row never is.
///
/// Keys are 16 chars over a 62-symbol alphabet (~95 bits); collisions
/// are not retried, the catalog's unique constraint would surface one
/// as an insert failure.
pub struct UploadSaga {
    storage: Arc<dyn BlobStorage>,
    catalog: Arc<dyn ImageCatalog>,
    public_url: String,
    max_file_size: usize,
}

impl UploadSaga {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        catalog: Arc<dyn ImageCatalog>,
        public_url: String,
        max_file_size: usize,
    ) -> Self {
        Self {
            storage,
            catalog,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_file_size,
        }
    }

    /// Validate, write the blob, insert the record, compensate on
    /// insert failure. Both validations run before any I/O.
    pub async fn upload(
        &self,
        user_id: &str,
        request: UploadRequest,
    ) -> Result<UploadedImage, AppError> {
        let mime_type = normalize_mime(&request.content_type);
        if !ALLOWED_TYPES.contains(&mime_type.as_str()) {
            return Err(AppError::Validation(format!(
                "Unsupported file type: {}. Allowed types: {}",
                request.content_type,
                ALLOWED_TYPES.join(", ")
            )));
        }

        if request.data.len() > self.max_file_size {
            return Err(AppError::Validation(format!(
                "File too large: {:.2}MB (max {}MB)",
                request.data.len() as f64 / 1024.0 / 1024.0,
                self.max_file_size / 1024 / 1024
            )));
        }

        let extension = normalize_extension(&request.filename);
        let storage_key = generate_storage_key(&extension);
        let file_size = request.data.len() as i64;
        let now = Utc::now();

        let mut metadata = HashMap::new();
        metadata.insert(META_USER_ID.to_string(), user_id.to_string());
        metadata.insert(
            META_ORIGINAL_FILENAME.to_string(),
            request.filename.clone(),
        );
        metadata.insert(META_UPLOADED_AT.to_string(), now.to_rfc3339());

        self.storage
            .put_object(&storage_key, request.data, &mime_type, metadata)
            .await?;

        let record = images::Model {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            filename: request.filename.clone(),
            storage_key: storage_key.clone(),
            file_size,
            width: None,
            height: None,
            format: extension,
            mime_type,
            is_compressed: false,
            compression_quality: None,
            original_size: None,
            url: format!("{}/{}", self.public_url, storage_key),
            created_at: now,
        };

        match self.catalog.insert_image(record).await {
            Ok(saved) => Ok(UploadedImage {
                id: saved.id,
                url: saved.url,
                filename: saved.filename,
                size: saved.file_size,
                format: saved.format,
                created_at: saved.created_at,
            }),
            Err(db_err) => {
                // Compensate: the blob must not outlive a failed
                // insert as a normal outcome, but a failed delete only
                // leaves an orphan for the reconciliation sweep.
                tracing::error!(
                    "Catalog insert failed for {}, compensating blob: {}",
                    storage_key,
                    db_err
                );
                if let Err(cleanup_err) = self.storage.delete_object(&storage_key).await {
                    tracing::warn!(
                        "Compensating delete failed for {}: {}",
                        storage_key,
                        cleanup_err
                    );
                }
                Err(AppError::Database(db_err))
            }
        }
    }

    /// Run the full saga for every file concurrently. Files are
    /// independent: one failure neither aborts nor rolls back any
    /// sibling. Results and errors are keyed by filename, not index.
    pub async fn upload_batch(&self, user_id: &str, requests: Vec<UploadRequest>) -> BatchOutcome {
        let outcomes = join_all(requests.into_iter().map(|request| {
            let filename = request.filename.clone();
            async move { (filename, self.upload(user_id, request).await) }
        }))
        .await;

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for (filename, outcome) in outcomes {
            match outcome {
                Ok(image) => results.push(image),
                Err(e) => {
                    tracing::warn!("Failed to upload {}: {}", filename, e);
                    errors.push(UploadFailure {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        BatchOutcome {
            uploaded: results.len(),
            failed: errors.len(),
            results,
            errors,
        }
    }
}
