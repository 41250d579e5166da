use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::require_session;
use crate::auth::Identity;
use crate::services::token_service::TokenSummary;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateTokenRequest {
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct CreatedTokenResponse {
    /// The raw token. Shown exactly once; only its hash is stored.
    pub token: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/upload-tokens",
    responses(
        (status = 200, description = "Caller's upload tokens", body = [TokenSummary]),
        (status = 401, description = "Unauthorized")
    ),
    tag = "tokens"
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<TokenSummary>>, AppError> {
    require_session(&identity)?;
    Ok(Json(state.registry.list(&identity.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/upload-tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 200, description = "Token issued", body = CreatedTokenResponse),
        (status = 400, description = "Bad name"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "tokens"
)]
pub async fn create_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateTokenRequest>,
) -> Result<Json<CreatedTokenResponse>, AppError> {
    require_session(&identity)?;

    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Token name is required".to_string()));
    }
    if name.len() > 100 {
        return Err(AppError::Validation(
            "Token name must be 100 characters or fewer".to_string(),
        ));
    }

    let issued = state.registry.issue(&identity.user_id, name).await?;
    tracing::info!("🔑 Issued upload token '{}' for {}", name, identity.user_id);

    Ok(Json(CreatedTokenResponse {
        token: issued.token,
        id: issued.record.id,
        name: issued.record.name,
        created_at: issued.record.created_at,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/upload-tokens/{id}",
    responses(
        (status = 204, description = "Revoked (or never yours to begin with)"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "tokens"
)]
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_session(&identity)?;
    state.registry.revoke(&identity.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
