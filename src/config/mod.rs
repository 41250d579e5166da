use anyhow::{bail, Context};
use std::env;

pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10 MiB
pub const MAX_BATCH_SIZE: usize = 20;

/// Application configuration, loaded from the environment once at
/// startup. The session secret has no default: a process without one
/// must not come up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Secret used to derive the session encryption key (>= 32 bytes)
    pub session_secret: String,

    /// Set the `Secure` attribute on session cookies (default: true).
    /// Disable only for non-TLS local development.
    pub secure_cookies: bool,

    /// Maximum upload size in bytes (default: 10 MiB)
    pub max_file_size: usize,

    /// Maximum number of files per batch upload (default: 20)
    pub max_batch_size: usize,

    /// Public base URL joined with storage keys to form image URLs
    pub public_url: String,

    /// Application URL used for post-logout/OAuth redirects
    pub app_url: String,

    /// Email of the instance owner; the only account allowed to use
    /// the password fallback, and the admin marker for OAuth logins
    pub owner_email: Option<String>,

    /// GitHub OAuth application credentials
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,

    /// Allowed CORS origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from environment variables. Fails fast when
    /// SESSION_SECRET is absent or too short.
    pub fn from_env() -> anyhow::Result<Self> {
        let session_secret = env::var("SESSION_SECRET")
            .context("SESSION_SECRET environment variable is required")?;
        if session_secret.len() < 32 {
            bail!("SESSION_SECRET must be at least 32 characters long");
        }

        let app_url = env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let public_url = env::var("PUBLIC_URL").unwrap_or_else(|_| app_url.clone());

        Ok(Self {
            session_secret,

            secure_cookies: env::var("COOKIE_SECURE")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_FILE_SIZE),

            max_batch_size: env::var("MAX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_BATCH_SIZE),

            public_url: public_url.trim_end_matches('/').to_string(),
            app_url,

            owner_email: env::var("OWNER_EMAIL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),

            github_client_id: env::var("GITHUB_CLIENT_ID").ok(),
            github_client_secret: env::var("GITHUB_CLIENT_SECRET").ok(),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
        })
    }

    /// Create config for development and tests (fixed secret, plain
    /// HTTP cookies)
    pub fn development() -> Self {
        Self {
            session_secret: "development-session-secret-0123456789ab".to_string(),
            secure_cookies: false,
            max_file_size: MAX_FILE_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            public_url: "http://localhost:3000".to_string(),
            app_url: "http://localhost:3000".to_string(),
            owner_email: Some("owner@example.com".to_string()),
            github_client_id: None,
            github_client_secret: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}
