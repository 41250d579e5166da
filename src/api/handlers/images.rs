use crate::AppState;
use crate::api::error::AppError;
use crate::auth::Identity;
use crate::entities::images;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ImageResponse {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub size: i64,
    pub format: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<images::Model> for ImageResponse {
    fn from(model: images::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            filename: model.filename,
            size: model.file_size,
            format: model.format,
            mime_type: model.mime_type,
            created_at: model.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct ImageListResponse {
    pub images: Vec<ImageResponse>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Serialize, ToSchema)]
pub struct UserStatsResponse {
    #[serde(rename = "imageCount")]
    pub image_count: i64,
    #[serde(rename = "totalSize")]
    pub total_size: i64,
}

#[utoipa::path(
    get,
    path = "/api/images",
    responses(
        (status = 200, description = "Caller's images, newest first", body = ImageListResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "images"
)]
pub async fn list_images(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ImageListResponse>, AppError> {
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let images = state.images.list(&identity.user_id, limit, offset).await?;

    Ok(Json(ImageListResponse {
        images: images.into_iter().map(ImageResponse::from).collect(),
        limit: limit.clamp(1, crate::services::image_service::MAX_PAGE_SIZE),
        offset,
    }))
}

#[utoipa::path(
    get,
    path = "/api/images/{id}",
    responses(
        (status = 200, description = "Image detail", body = ImageResponse),
        (status = 404, description = "Not found or not yours")
    ),
    tag = "images"
)]
pub async fn get_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<ImageResponse>, AppError> {
    let image = state.images.get(&identity, &id).await?;
    Ok(Json(ImageResponse::from(image)))
}

#[utoipa::path(
    delete,
    path = "/api/images/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found or not yours")
    ),
    tag = "images"
)]
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.images.delete(&identity, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Caller's usage totals", body = UserStatsResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "images"
)]
pub async fn user_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserStatsResponse>, AppError> {
    let stats = state.images.stats(&identity.user_id).await?;
    Ok(Json(UserStatsResponse {
        image_count: stats.image_count,
        total_size: stats.total_size,
    }))
}
