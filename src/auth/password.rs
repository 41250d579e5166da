use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const ALGORITHM: &str = "pbkdf2_sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32; // 256-bit output

/// One-way password hashing for the local fallback login.
///
/// Stored format: `pbkdf2_sha256$<iterations>$<salt b64>$<hash b64>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let mut derived = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, ITERATIONS, &mut derived);

    format!(
        "{}${}${}${}",
        ALGORITHM,
        ITERATIONS,
        BASE64.encode(salt),
        BASE64.encode(derived)
    )
}

/// Verify a password against a stored hash string. A malformed or
/// unknown-algorithm hash verifies as `false`, never panics. The final
/// comparison is constant-time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 {
        return false;
    }

    let (algorithm, iterations_raw, salt_b64, hash_b64) =
        (parts[0], parts[1], parts[2], parts[3]);
    if algorithm != ALGORITHM {
        return false;
    }

    let iterations: u32 = match iterations_raw.parse() {
        Ok(n) if n > 0 => n,
        _ => return false,
    };

    let salt = match BASE64.decode(salt_b64) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let expected = match BASE64.decode(hash_b64) {
        Ok(h) => h,
        Err(_) => return false,
    };
    if expected.len() != HASH_LEN {
        return false;
    }

    let mut derived = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut derived);

    derived.ct_eq(expected.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &stored));
        assert!(!verify_password("correct horse battery stable", &stored));
    }

    #[test]
    fn test_hash_format() {
        let stored = hash_password("pw");
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "pbkdf2_sha256");
        assert_eq!(parts[1], "100000");
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("pw"), hash_password("pw"));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "pbkdf2_sha256$100000$onlythree"));
        assert!(!verify_password("pw", "md5$1$c2FsdA==$aGFzaA=="));
        assert!(!verify_password("pw", "pbkdf2_sha256$zero$c2FsdA==$aGFzaA=="));
        assert!(!verify_password("pw", "pbkdf2_sha256$100000$!!!$aGFzaA=="));
    }

    #[test]
    fn test_verify_respects_stored_iteration_count() {
        // A hash produced with a different iteration count still
        // verifies, because the count is read from the stored string.
        let mut salt = [0u8; SALT_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt);
        let mut derived = [0u8; HASH_LEN];
        pbkdf2_hmac::<Sha256>(b"pw", &salt, 150_000, &mut derived);
        let stored = format!(
            "pbkdf2_sha256$150000${}${}",
            BASE64.encode(salt),
            BASE64.encode(derived)
        );
        assert!(verify_password("pw", &stored));
    }
}
