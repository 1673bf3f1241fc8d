//! Secret generation.
//!
//! ```bash
//! ms-cli secret generate
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use marketstall_storefront::config::check_session_secret;
use rand::RngCore;

/// Random bytes per generated secret.
const SECRET_BYTES: usize = 48;

/// A fresh base64url secret that passes the server's startup checks.
#[must_use]
pub fn generate() -> String {
    loop {
        let mut bytes = [0_u8; SECRET_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let candidate = URL_SAFE_NO_PAD.encode(bytes);
        // Random text can still spell a blocklisted word.
        if check_session_secret(&candidate).is_ok() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_long_and_distinct() {
        let a = generate();
        let b = generate();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(!a.contains('='));
        assert!(check_session_secret(&a).is_ok());
    }
}
