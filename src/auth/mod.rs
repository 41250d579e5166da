pub mod password;
pub mod session;

use crate::services::token_service::UploadTokenRegistry;
use async_trait::async_trait;
use axum::http::HeaderMap;
use self::session::SessionCodec;
use std::sync::Arc;

pub const UPLOAD_TOKEN_HEADER: &str = "x-upload-token";

/// How a request proved who it is. Only sessions can carry the admin
/// flag; upload tokens never escalate past plain uploads.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    Session,
    UploadToken { token_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub is_admin: bool,
    pub source: CredentialSource,
}

impl Identity {
    pub fn is_session(&self) -> bool {
        matches!(self.source, CredentialSource::Session)
    }
}

/// One way of turning request headers into an identity. Resolvers are
/// tried in a fixed priority order; adding a third credential scheme
/// means adding a resolver, not touching the authenticator.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Decrypts the session cookie. Pure CPU work, no data access.
pub struct SessionResolver {
    codec: Arc<SessionCodec>,
}

impl SessionResolver {
    pub fn new(codec: Arc<SessionCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl CredentialResolver for SessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
        let value = session::session_cookie_value(cookie_header)?;
        let payload = self.codec.decode(value)?;

        Some(Identity {
            user_id: payload.user_id,
            is_admin: payload.is_admin,
            source: CredentialSource::Session,
        })
    }
}

/// Looks up a bearer upload token: `Authorization: Bearer <token>`,
/// with `X-Upload-Token` as a fallback for clients that cannot set
/// the Authorization header. Costs one catalog round-trip.
pub struct BearerTokenResolver {
    registry: UploadTokenRegistry,
}

impl BearerTokenResolver {
    pub fn new(registry: UploadTokenRegistry) -> Self {
        Self { registry }
    }

    fn extract_token(headers: &HeaderMap) -> Option<String> {
        if let Some(auth) = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        {
            let trimmed = auth.trim();
            if trimmed.len() > 7 && trimmed[..7].eq_ignore_ascii_case("bearer ") {
                return Some(trimmed[7..].trim().to_string());
            }
        }

        headers
            .get(UPLOAD_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }
}

#[async_trait]
impl CredentialResolver for BearerTokenResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = Self::extract_token(headers)?;

        match self.registry.resolve(&token).await {
            Ok(Some(resolved)) => Some(Identity {
                user_id: resolved.user_id,
                is_admin: false,
                source: CredentialSource::UploadToken {
                    token_id: resolved.token_id,
                },
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Token lookup failed: {}", e);
                None
            }
        }
    }
}

/// Resolves "who is making this request" by trying each resolver in
/// order; the first success wins. Sessions go first because they are
/// the common interactive path and cost no I/O to reject.
pub struct RequestAuthenticator {
    resolvers: Vec<Arc<dyn CredentialResolver>>,
}

impl RequestAuthenticator {
    pub fn new(codec: Arc<SessionCodec>, registry: UploadTokenRegistry) -> Self {
        Self {
            resolvers: vec![
                Arc::new(SessionResolver::new(codec)),
                Arc::new(BearerTokenResolver::new(registry)),
            ],
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<Identity> {
        for resolver in &self.resolvers {
            if let Some(identity) = resolver.resolve(headers).await {
                return Some(identity);
            }
        }
        None
    }
}
