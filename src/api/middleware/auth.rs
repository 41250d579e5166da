use crate::AppState;
use crate::api::error::AppError;
use crate::auth::Identity;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Resolves the caller's identity (session cookie or bearer upload
/// token) and stashes it as a request extension. Every failure mode
/// renders the same 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match state.authenticator.authenticate(req.headers()).await {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        None => Err(AppError::Unauthorized),
    }
}

/// Guard for admin-only operations. Upload tokens are rejected
/// outright: only an interactive session can carry admin privilege.
pub fn require_admin_session(identity: &Identity) -> Result<(), AppError> {
    if !identity.is_session() {
        return Err(AppError::Unauthorized);
    }
    if !identity.is_admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(())
}

/// Guard for credential-management operations, which a stolen upload
/// token must not be able to reach.
pub fn require_session(identity: &Identity) -> Result<(), AppError> {
    if !identity.is_session() {
        return Err(AppError::Forbidden(
            "Session authentication required".to_string(),
        ));
    }
    Ok(())
}
