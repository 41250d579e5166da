use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::require_admin_session;
use crate::auth::Identity;
use axum::{Extension, Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct SyncStats {
    pub total: usize,
    pub added: usize,
    pub skipped: usize,
    /// Count of failed objects; the messages ride alongside.
    pub errors: usize,
}

/// Wire shape consumed by the dashboard: counters under `stats`,
/// per-object messages in a flat `errors` list.
#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    pub stats: SyncStats,
    pub errors: Vec<String>,
}

/// Full bucket-to-catalog reconciliation. Admin sessions only; an
/// upload token cannot trigger a sweep.
#[utoipa::path(
    post,
    path = "/api/images/sync",
    responses(
        (status = 200, description = "Sweep report", body = SyncResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not an admin")
    ),
    tag = "admin"
)]
pub async fn sync_storage(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SyncResponse>, AppError> {
    require_admin_session(&identity)?;

    let report = state.sync.sweep(&identity.user_id).await?;
    Ok(Json(SyncResponse {
        stats: SyncStats {
            total: report.total,
            added: report.added,
            skipped: report.skipped,
            errors: report.errors.len(),
        },
        errors: report.errors,
    }))
}
