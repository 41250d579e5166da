use crate::AppState;
use crate::api::error::AppError;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{SessionPayload, clear_session_cookie, session_cookie};
use crate::auth::Identity;
use crate::entities::{prelude::*, users};
use crate::services::oauth::ExternalIdentity;
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    #[serde(rename = "avatarUrl")]
    pub avatar_url: Option<String>,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

impl UserResponse {
    fn from_model(user: users::Model, is_admin: bool) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar_url: user.avatar_url,
            is_admin,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

fn is_owner(state: &AppState, email: &str) -> bool {
    state
        .config
        .owner_email
        .as_deref()
        .is_some_and(|owner| owner.eq_ignore_ascii_case(email))
}

fn issue_session(
    state: &AppState,
    user_id: &str,
    is_admin: bool,
) -> Result<String, AppError> {
    let payload = SessionPayload::new(user_id, is_admin);
    let encoded = state.codec.encode(&payload)?;
    Ok(session_cookie(&encoded, state.config.secure_cookies))
}

/// Password fallback, restricted to the instance owner. The first
/// successful login provisions the account; after that the stored
/// hash is authoritative.
#[utoipa::path(
    post,
    path = "/api/auth/password-login",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = UserResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn password_login(
    State(state): State<AppState>,
    Json(body): Json<PasswordLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_lowercase();

    if !is_owner(&state, &email) {
        return Err(AppError::Unauthorized);
    }

    let existing = Users::find()
        .filter(users::Column::Email.eq(&email))
        .one(&state.db)
        .await?;

    let user = match existing {
        Some(user) => {
            let stored = user.password_hash.as_deref().ok_or(AppError::Unauthorized)?;
            if !verify_password(&body.password, stored) {
                return Err(AppError::Unauthorized);
            }
            user
        }
        None => {
            if body.password.len() < 8 {
                return Err(AppError::Validation(
                    "Password must be at least 8 characters".to_string(),
                ));
            }
            tracing::info!("👤 Provisioning owner account {}", email);
            users::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                email: Set(email.clone()),
                name: Set(None),
                avatar_url: Set(None),
                provider: Set("password".to_string()),
                provider_id: Set(email.clone()),
                password_hash: Set(Some(hash_password(&body.password))),
                created_at: Set(Some(Utc::now())),
                updated_at: Set(Some(Utc::now())),
            }
            .insert(&state.db)
            .await?
        }
    };

    let cookie = issue_session(&state, &user.id, true)?;
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(UserResponse::from_model(user, true)),
    ))
}

/// Kick off the GitHub OAuth flow.
#[utoipa::path(
    get,
    path = "/api/auth/github",
    responses((status = 307, description = "Redirect to GitHub")),
    tag = "auth"
)]
pub async fn github_login(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let client_id = state
        .config
        .github_client_id
        .as_deref()
        .ok_or_else(|| AppError::Validation("GitHub OAuth is not configured".to_string()))?;

    Ok(Redirect::temporary(&format!(
        "https://github.com/login/oauth/authorize?client_id={}&scope=user:email",
        client_id
    )))
}

/// OAuth callback: exchange the code, upsert the user by email, set
/// the session cookie and bounce back to the app. Only the configured
/// owner gets an admin session.
#[utoipa::path(
    get,
    path = "/api/auth/github/callback",
    responses(
        (status = 303, description = "Logged in, redirecting"),
        (status = 401, description = "Code exchange failed")
    ),
    tag = "auth"
)]
pub async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    let provider = state
        .oauth
        .as_ref()
        .ok_or_else(|| AppError::Validation("GitHub OAuth is not configured".to_string()))?;

    let external = provider.exchange_code(&query.code).await.map_err(|e| {
        tracing::warn!("GitHub code exchange failed: {}", e);
        AppError::Unauthorized
    })?;

    let user = upsert_oauth_user(&state, external).await?;
    let is_admin = is_owner(&state, &user.email);

    let cookie = issue_session(&state, &user.id, is_admin)?;
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::to(&state.config.app_url),
    ))
}

async fn upsert_oauth_user(
    state: &AppState,
    external: ExternalIdentity,
) -> Result<users::Model, AppError> {
    let email = external.email.trim().to_lowercase();
    let existing = Users::find()
        .filter(users::Column::Email.eq(&email))
        .one(&state.db)
        .await?;

    let user = match existing {
        Some(user) => {
            let mut active: users::ActiveModel = user.into();
            active.name = Set(external.name);
            active.avatar_url = Set(external.avatar_url);
            active.provider = Set(external.provider);
            active.provider_id = Set(external.provider_id);
            active.updated_at = Set(Some(Utc::now()));
            active.update(&state.db).await?
        }
        None => {
            users::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                email: Set(email),
                name: Set(external.name),
                avatar_url: Set(external.avatar_url),
                provider: Set(external.provider),
                provider_id: Set(external.provider_id),
                password_hash: Set(None),
                created_at: Set(Some(Utc::now())),
                updated_at: Set(Some(Utc::now())),
            }
            .insert(&state.db)
            .await?
        }
    };

    Ok(user)
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 303, description = "Session cleared, redirecting")),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie(state.config.secure_cookies))]),
        Redirect::to(&state.config.app_url),
    )
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserResponse>, AppError> {
    let user = Users::find_by_id(&identity.user_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(UserResponse::from_model(user, identity.is_admin)))
}

/// Session probe for the frontend. Always 200; an anonymous caller is
/// an answer, not an error.
#[utoipa::path(
    get,
    path = "/api/auth/status",
    responses((status = 200, description = "Authentication status", body = AuthStatusResponse)),
    tag = "auth"
)]
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AuthStatusResponse>, AppError> {
    let Some(identity) = state.authenticator.authenticate(&headers).await else {
        return Ok(Json(AuthStatusResponse {
            authenticated: false,
            user: None,
        }));
    };

    let user = Users::find_by_id(&identity.user_id).one(&state.db).await?;

    Ok(Json(AuthStatusResponse {
        authenticated: user.is_some(),
        user: user.map(|u| UserResponse::from_model(u, identity.is_admin)),
    }))
}
