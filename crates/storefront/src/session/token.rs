//! Signed session tokens.
//!
//! # Format
//!
//! ```text
//! <base64url(JSON claims + "exp")>.<hex HMAC-SHA256 of the base64url text>
//! ```
//!
//! The body is unpadded base64url, `exp` is the absolute expiry in Unix
//! milliseconds, and the signature is lower-case hex. `.` appears in neither
//! alphabet, so it separates the halves unambiguously. Tokens are signed, not
//! encrypted: the holder may read its own claims but cannot alter them.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::models::SessionClaims;

/// Lifetime of a session token in seconds (7 days).
pub const TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

const DELIMITER: char = '.';

/// Unpadded base64url on encode; accepts padded input on decode.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

type HmacSha256 = Hmac<Sha256>;

/// Reasons a token cannot be issued or accepted.
///
/// Callers must treat every rejection the same way ("no session"); the
/// variants exist for logs only.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Missing delimiter, empty half, or a body that is not valid claims.
    #[error("malformed token")]
    Malformed,
    /// The signature does not match the body under the configured secret.
    #[error("signature mismatch")]
    SignatureMismatch,
    /// The token's expiry has passed.
    #[error("token expired")]
    Expired,
    /// The signing key was rejected by the MAC implementation.
    #[error("invalid signing secret")]
    InvalidSecret,
    /// Claims could not be serialized.
    #[error("failed to encode claims: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SignedBodyRef<'a> {
    #[serde(flatten)]
    claims: &'a SessionClaims,
    exp: i64,
}

#[derive(Deserialize)]
struct SignedBody {
    #[serde(flatten)]
    claims: SessionClaims,
    exp: i64,
}

/// Token lifetime as a [`TimeDelta`].
#[must_use]
pub fn token_ttl() -> TimeDelta {
    TimeDelta::seconds(TOKEN_TTL_SECONDS)
}

/// Encode and sign `claims`, expiring [`TOKEN_TTL_SECONDS`] after `now`.
///
/// # Errors
///
/// Returns `TokenError::Encode` if the claims cannot be serialized, or
/// `TokenError::InvalidSecret` if the MAC rejects the key.
pub fn encode(
    claims: &SessionClaims,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let body = SignedBodyRef {
        claims,
        exp: (now + token_ttl()).timestamp_millis(),
    };
    let encoded = BODY_ENGINE.encode(serde_json::to_vec(&body)?);
    let signature = sign(&encoded, secret)?;
    Ok(format!("{encoded}{DELIMITER}{signature}"))
}

/// Verify `token` and return its claims with the expiry stripped.
///
/// The signature is checked before the body is parsed, so unauthenticated
/// input never reaches the JSON parser.
///
/// # Errors
///
/// Returns `Malformed`, `SignatureMismatch` or `Expired` (see [`TokenError`]).
pub fn decode(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
    let (body, signature) = token
        .split_once(DELIMITER)
        .ok_or(TokenError::Malformed)?;
    if body.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }

    let expected = sign(body, secret)?;
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        return Err(TokenError::SignatureMismatch);
    }

    let bytes = BODY_ENGINE
        .decode(body)
        .map_err(|_| TokenError::Malformed)?;
    let signed: SignedBody = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    if now.timestamp_millis() >= signed.exp {
        return Err(TokenError::Expired);
    }

    Ok(signed.claims)
}

/// Hex HMAC-SHA256 of `body`.
fn sign(body: &str, secret: &[u8]) -> Result<String, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidSecret)?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Token codec bound to the process signing secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: SecretString,
}

impl TokenCodec {
    /// Create a codec that signs with `secret`.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// See [`encode`].
    ///
    /// # Errors
    ///
    /// Propagates [`encode`] errors.
    pub fn encode(&self, claims: &SessionClaims, now: DateTime<Utc>) -> Result<String, TokenError> {
        encode(claims, self.secret.expose_secret().as_bytes(), now)
    }

    /// See [`decode`].
    ///
    /// # Errors
    ///
    /// Propagates [`decode`] errors.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        decode(token, self.secret.expose_secret().as_bytes(), now)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use marketstall_core::{Email, Role, UserId};

    use super::*;

    const SECRET: &[u8] = b"test-secret";

    /// Token for `fixed_claims()` issued at the Unix epoch, computed independently.
    const KNOWN_TOKEN: &str = "eyJpZCI6IjAwMDAwMDAwLTAwMDAtMDAwMC0wMDAwLTAwMDAwMDAwMDAwMCIsImVtYWlsIjoieEB4LmNvbSIsIm5hbWUiOiJYIiwicm9sZSI6ImFkbWluIiwiZXhwIjo2MDQ4MDAwMDB9.b9c8400bce9a5bff2e80f6d1831eeec05fffcb0713f392826eb1c40edff6eecd";

    fn fixed_claims() -> SessionClaims {
        SessionClaims {
            subject: UserId::from_uuid(uuid::Uuid::nil()),
            email: Email::parse("x@x.com").unwrap(),
            name: "X".to_owned(),
            role: Role::Admin,
        }
    }

    fn shopper() -> SessionClaims {
        SessionClaims {
            subject: UserId::generate(),
            email: Email::parse("shopper@example.com").unwrap(),
            name: "Sam Shopper".to_owned(),
            role: Role::User,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000)
    }

    #[test]
    fn test_encoding_is_reproducible_bit_for_bit() {
        let token = encode(&fixed_claims(), SECRET, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(token, KNOWN_TOKEN);
    }

    #[test]
    fn test_known_token_decodes() {
        let claims = decode(KNOWN_TOKEN, SECRET, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(claims, fixed_claims());
    }

    #[test]
    fn test_roundtrip_before_expiry() {
        let claims = shopper();
        let token = encode(&claims, SECRET, t0()).unwrap();

        for offset in [
            TimeDelta::zero(),
            TimeDelta::hours(1),
            TimeDelta::days(6),
            token_ttl() - TimeDelta::milliseconds(1),
        ] {
            assert_eq!(decode(&token, SECRET, t0() + offset).unwrap(), claims);
        }
    }

    #[test]
    fn test_rejected_at_and_after_expiry() {
        let token = encode(&shopper(), SECRET, t0()).unwrap();

        assert!(matches!(
            decode(&token, SECRET, t0() + token_ttl()),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            decode(&token, SECRET, t0() + TimeDelta::days(30)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_decoded_claims_carry_no_expiry() {
        let token = encode(&shopper(), SECRET, t0()).unwrap();
        let claims = decode(&token, SECRET, t0()).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("exp").is_none());
    }

    #[test]
    fn test_every_tampered_byte_is_rejected() {
        let token = encode(&shopper(), SECRET, t0()).unwrap();
        let bytes = token.as_bytes();

        for i in 0..bytes.len() {
            if bytes[i] == b'.' {
                continue;
            }
            let mut tampered = bytes.to_vec();
            // Stay within both alphabets so the failure is the signature, not parsing.
            tampered[i] = if bytes[i] == b'a' { b'b' } else { b'a' };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(
                decode(&tampered, SECRET, t0()).is_err(),
                "tampering byte {i} was accepted"
            );
        }
    }

    #[test]
    fn test_wrong_secret_is_signature_mismatch() {
        let token = encode(&shopper(), SECRET, t0()).unwrap();
        assert!(matches!(
            decode(&token, b"another-secret", t0()),
            Err(TokenError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_signature_is_case_sensitive_hex() {
        let token = encode(&shopper(), SECRET, t0()).unwrap();
        let (body, signature) = token.split_once('.').unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let shouted = format!("{body}.{}", signature.to_uppercase());
        assert!(matches!(
            decode(&shouted, SECRET, t0()),
            Err(TokenError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_structural_failures_are_malformed() {
        for token in ["", "no-delimiter", ".sig", "body.", "."] {
            assert!(
                matches!(decode(token, SECRET, t0()), Err(TokenError::Malformed)),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_signed_garbage_body_is_malformed() {
        let body = BODY_ENGINE.encode(br#"{"id":"not-a-uuid"}"#);
        let token = format!("{body}.{}", sign(&body, SECRET).unwrap());
        assert!(matches!(
            decode(&token, SECRET, t0()),
            Err(TokenError::Malformed)
        ));

        let not_base64 = "!!!";
        let token = format!("{not_base64}.{}", sign(not_base64, SECRET).unwrap());
        assert!(matches!(
            decode(&token, SECRET, t0()),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn test_codec_debug_redacts_secret() {
        let codec = TokenCodec::new(SecretString::from("super-secret-signing-key"));
        let debug = format!("{codec:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-signing-key"));
    }
}
