use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    AeadCore, ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use chrono::{Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub const SESSION_COOKIE_NAME: &str = "session";
pub const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60; // 30 days

const KDF_ITERATIONS: u32 = 100_000;
// Fixed salt: the derivation must be deterministic for a given secret
// so any instance holding the same secret can decode the cookie.
const KDF_SALT: &[u8] = b"rust-image-backend-session";
const NONCE_LEN: usize = 12;

/// Session contents carried inside the encrypted cookie. Never
/// persisted server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Absolute expiry, unix milliseconds
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

impl SessionPayload {
    pub fn new(user_id: impl Into<String>, is_admin: bool) -> Self {
        Self {
            user_id: user_id.into(),
            expires_at: (Utc::now() + Duration::seconds(SESSION_MAX_AGE_SECS)).timestamp_millis(),
            is_admin,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now().timestamp_millis()
    }
}

/// Encrypts session payloads into opaque cookie values and back.
///
/// The 256-bit key is derived from the configured secret via
/// PBKDF2-HMAC-SHA256 once at construction; the KDF cost is paid per
/// process, not per request. Each encode uses a fresh 96-bit nonce,
/// and the cookie value is base64(nonce || ciphertext).
pub struct SessionCodec {
    cipher: ChaCha20Poly1305,
}

impl SessionCodec {
    pub fn new(secret: &str) -> Self {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
        Self {
            cipher: ChaCha20Poly1305::new(&Key::from(key)),
        }
    }

    pub fn encode(&self, payload: &SessionPayload) -> Result<String> {
        let plaintext = serde_json::to_vec(payload)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| anyhow::anyhow!("session encryption failed: {}", e))?;

        let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decode a cookie value. Bad base64, tampering, a wrong secret,
    /// malformed JSON and expiry all collapse to `None`: the caller
    /// only ever learns "no session".
    pub fn decode(&self, token: &str) -> Option<SessionPayload> {
        let combined = BASE64.decode(token).ok()?;
        if combined.len() <= NONCE_LEN {
            return None;
        }

        let nonce = Nonce::from_slice(&combined[..NONCE_LEN]);
        let plaintext = self.cipher.decrypt(nonce, &combined[NONCE_LEN..]).ok()?;
        let payload: SessionPayload = serde_json::from_slice(&plaintext).ok()?;

        if payload.is_expired() {
            return None;
        }

        Some(payload)
    }
}

/// Build the `Set-Cookie` value for a freshly encoded session.
pub fn session_cookie(encoded: &str, secure: bool) -> String {
    let mut attrs = vec![
        format!("{}={}", SESSION_COOKIE_NAME, encoded),
        format!("Max-Age={}", SESSION_MAX_AGE_SECS),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];
    if secure {
        attrs.push("Secure".to_string());
    }
    attrs.join("; ")
}

/// Build the `Set-Cookie` value that clears the session.
pub fn clear_session_cookie(secure: bool) -> String {
    let mut attrs = vec![
        format!("{}=", SESSION_COOKIE_NAME),
        "Max-Age=0".to_string(),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];
    if secure {
        attrs.push("Secure".to_string());
    }
    attrs.join("; ")
}

/// Pull the session cookie value out of a `Cookie` header. Lenient
/// about whitespace around separators.
pub fn session_cookie_value(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .map(|c| c.trim())
        .filter_map(|c| c.split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SessionCodec {
        SessionCodec::new("an-adequately-long-test-secret-value")
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let payload = SessionPayload::new("user_1", true);
        let token = codec.encode(&payload).unwrap();
        let decoded = codec.decode(&token).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_expired_payload_decodes_as_absent() {
        let codec = codec();
        let payload = SessionPayload {
            user_id: "user_1".to_string(),
            expires_at: Utc::now().timestamp_millis() - 1000,
            is_admin: false,
        };
        let token = codec.encode(&payload).unwrap();
        assert!(codec.decode(&token).is_none());
    }

    #[test]
    fn test_tampering_yields_absent() {
        let codec = codec();
        let token = codec.encode(&SessionPayload::new("user_1", false)).unwrap();
        let mut raw = BASE64.decode(&token).unwrap();
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            assert!(codec.decode(&BASE64.encode(&raw)).is_none(), "byte {}", i);
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn test_wrong_secret_yields_absent() {
        let token = codec().encode(&SessionPayload::new("user_1", false)).unwrap();
        let other = SessionCodec::new("a-different-but-also-long-secret-val");
        assert!(other.decode(&token).is_none());
    }

    #[test]
    fn test_garbage_yields_absent() {
        let codec = codec();
        assert!(codec.decode("not base64 at all!!").is_none());
        assert!(codec.decode("").is_none());
        assert!(codec.decode(&BASE64.encode(b"short")).is_none());
    }

    #[test]
    fn test_nonce_is_fresh_per_encode() {
        let codec = codec();
        let payload = SessionPayload::new("user_1", false);
        let a = codec.encode(&payload).unwrap();
        let b = codec.encode(&payload).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cookie_attributes() {
        let secure = session_cookie("abc", true);
        assert!(secure.starts_with("session=abc"));
        assert!(secure.contains("HttpOnly"));
        assert!(secure.contains("SameSite=Lax"));
        assert!(secure.contains("Secure"));

        let dev = session_cookie("abc", false);
        assert!(!dev.contains("Secure"));

        let cleared = clear_session_cookie(true);
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn test_cookie_header_parsing() {
        let header = "theme=dark; session=tok-value ; other=1";
        assert_eq!(session_cookie_value(header), Some("tok-value"));
        assert_eq!(session_cookie_value("theme=dark"), None);
    }
}
