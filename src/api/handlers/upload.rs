use crate::AppState;
use crate::api::error::AppError;
use crate::auth::Identity;
use crate::services::upload_service::{BatchOutcome, UploadRequest, UploadedImage};
use axum::{
    Extension, Json,
    extract::{Multipart, State},
};

/// Drain the multipart stream into buffered upload requests. Non-file
/// fields are ignored.
async fn collect_files(multipart: &mut Multipart) -> Result<Vec<UploadRequest>, AppError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?
            .to_vec();

        files.push(UploadRequest {
            filename,
            content_type,
            data,
        });
    }

    Ok(files)
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Object, description = "One image file", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = UploadedImage),
        (status = 400, description = "Rejected by validation"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "upload"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<UploadedImage>, AppError> {
    let mut files = collect_files(&mut multipart).await?;

    let request = match files.len() {
        0 => return Err(AppError::Validation("No file provided".to_string())),
        1 => files.remove(0),
        n => {
            return Err(AppError::Validation(format!(
                "Expected one file, got {}. Use the batch endpoint for multiple files.",
                n
            )));
        }
    };

    let uploaded = state.uploads.upload(&identity.user_id, request).await?;
    tracing::info!("📸 Uploaded {} for {}", uploaded.filename, identity.user_id);
    Ok(Json(uploaded))
}

#[utoipa::path(
    post,
    path = "/api/upload/batch",
    request_body(content = Object, description = "Up to 20 image files", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file outcomes", body = BatchOutcome),
        (status = 400, description = "Batch-level rejection"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "upload"
)]
pub async fn upload_batch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<BatchOutcome>, AppError> {
    let files = collect_files(&mut multipart).await?;

    if files.is_empty() {
        return Err(AppError::Validation("No files provided".to_string()));
    }
    if files.len() > state.config.max_batch_size {
        return Err(AppError::Validation(format!(
            "Too many files: {} (max {})",
            files.len(),
            state.config.max_batch_size
        )));
    }

    let outcome = state.uploads.upload_batch(&identity.user_id, files).await;
    tracing::info!(
        "📦 Batch for {}: {} uploaded, {} failed",
        identity.user_id,
        outcome.uploaded,
        outcome.failed
    );
    Ok(Json(outcome))
}
