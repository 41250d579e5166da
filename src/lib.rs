pub mod api;
pub mod auth;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;

use crate::auth::RequestAuthenticator;
use crate::auth::session::SessionCodec;
use crate::config::AppConfig;
use crate::services::catalog::{ImageCatalog, SeaOrmCatalog};
use crate::services::image_service::ImageService;
use crate::services::oauth::{GitHubProvider, IdentityProvider};
use crate::services::storage::BlobStorage;
use crate::services::sync_service::ReconciliationEngine;
use crate::services::token_service::UploadTokenRegistry;
use crate::services::upload_service::UploadSaga;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::password_login,
        api::handlers::auth::github_login,
        api::handlers::auth::github_callback,
        api::handlers::auth::logout,
        api::handlers::auth::me,
        api::handlers::auth::status,
        api::handlers::images::list_images,
        api::handlers::images::get_image,
        api::handlers::images::delete_image,
        api::handlers::images::user_stats,
        api::handlers::upload::upload_image,
        api::handlers::upload::upload_batch,
        api::handlers::sync::sync_storage,
        api::handlers::tokens::list_tokens,
        api::handlers::tokens::create_token,
        api::handlers::tokens::revoke_token,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::PasswordLoginRequest,
            api::handlers::auth::UserResponse,
            api::handlers::auth::AuthStatusResponse,
            api::handlers::images::ImageResponse,
            api::handlers::images::ImageListResponse,
            api::handlers::images::UserStatsResponse,
            api::handlers::tokens::CreateTokenRequest,
            api::handlers::tokens::CreatedTokenResponse,
            api::handlers::sync::SyncStats,
            api::handlers::sync::SyncResponse,
            api::handlers::health::HealthResponse,
            services::upload_service::UploadedImage,
            services::upload_service::UploadFailure,
            services::upload_service::BatchOutcome,
            services::token_service::TokenSummary,
        )
    ),
    tags(
        (name = "auth", description = "Login, logout and session state"),
        (name = "images", description = "Image listing and management"),
        (name = "upload", description = "Single and batch uploads"),
        (name = "tokens", description = "Upload token management"),
        (name = "admin", description = "Owner-only operations"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub storage: Arc<dyn BlobStorage>,
    pub catalog: Arc<dyn ImageCatalog>,
    pub codec: Arc<SessionCodec>,
    pub authenticator: Arc<RequestAuthenticator>,
    pub registry: UploadTokenRegistry,
    pub uploads: Arc<UploadSaga>,
    pub images: Arc<ImageService>,
    pub sync: Arc<ReconciliationEngine>,
    pub oauth: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Wire every service from the three externals: database, blob
    /// store and config.
    pub fn new(db: DatabaseConnection, storage: Arc<dyn BlobStorage>, config: AppConfig) -> Self {
        let catalog: Arc<dyn ImageCatalog> = Arc::new(SeaOrmCatalog::new(db.clone()));
        let codec = Arc::new(SessionCodec::new(&config.session_secret));
        let registry = UploadTokenRegistry::new(db.clone());
        let authenticator = Arc::new(RequestAuthenticator::new(codec.clone(), registry.clone()));

        let uploads = Arc::new(UploadSaga::new(
            storage.clone(),
            catalog.clone(),
            config.public_url.clone(),
            config.max_file_size,
        ));
        let images = Arc::new(ImageService::new(storage.clone(), catalog.clone()));
        let sync = Arc::new(ReconciliationEngine::new(
            storage.clone(),
            catalog.clone(),
            config.public_url.clone(),
        ));

        let oauth: Option<Arc<dyn IdentityProvider>> = match (
            config.github_client_id.clone(),
            config.github_client_secret.clone(),
        ) {
            (Some(id), Some(secret)) => Some(Arc::new(GitHubProvider::new(id, secret))),
            _ => None,
        };

        Self {
            db,
            config,
            storage,
            catalog,
            codec,
            authenticator,
            registry,
            uploads,
            images,
            sync,
            oauth,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    // Multipart framing adds overhead on top of the file bytes; the
    // per-file limit itself is enforced inside the saga.
    let single_limit = state.config.max_file_size + 2 * 1024 * 1024;
    let batch_limit =
        state.config.max_batch_size * (state.config.max_file_size + 1024 * 1024);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/auth/password-login",
            post(api::handlers::auth::password_login),
        )
        .route("/api/auth/github", get(api::handlers::auth::github_login))
        .route(
            "/api/auth/github/callback",
            get(api::handlers::auth::github_callback),
        )
        .route("/api/auth/logout", post(api::handlers::auth::logout))
        .route("/api/auth/status", get(api::handlers::auth::status))
        .route(
            "/api/auth/me",
            get(api::handlers::auth::me).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/api/images",
            get(api::handlers::images::list_images).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/api/images/:id",
            get(api::handlers::images::get_image)
                .delete(api::handlers::images::delete_image)
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api/stats",
            get(api::handlers::images::user_stats).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/api/upload",
            post(api::handlers::upload::upload_image)
                .layer(DefaultBodyLimit::max(single_limit))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api/upload/batch",
            post(api::handlers::upload::upload_batch)
                .layer(DefaultBodyLimit::max(batch_limit))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api/images/sync",
            post(api::handlers::sync::sync_storage).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/api/upload-tokens",
            get(api::handlers::tokens::list_tokens)
                .post(api::handlers::tokens::create_token)
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api/upload-tokens/:id",
            axum::routing::delete(api::handlers::tokens::revoke_token).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .layer(cors)
        .with_state(state)
}
