//! Stateless session management.
//!
//! The server keeps no session table. A session exists exactly as long as the
//! client holds an unexpired token signed with the current secret.

use std::sync::Arc;

use cookie::SameSite;
use tracing::debug;

use super::channel::{ClearVariant, CredentialAttributes, CredentialChannel};
use super::token::{TOKEN_TTL_SECONDS, TokenCodec, TokenError};
use crate::clock::Clock;
use crate::models::SessionClaims;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "ms_session";

/// Paths the application has ever scoped the session cookie to.
pub const SESSION_PATHS: &[&str] = &["/", "/api", "/admin", "/cart", "/account"];

/// Issues, reads and revokes sessions over a [`CredentialChannel`].
#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    secure: bool,
    paths: Arc<[String]>,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// `secure` marks the cookie HTTPS-only; enable it for production-like
    /// deployments.
    #[must_use]
    pub fn new(codec: TokenCodec, clock: Arc<dyn Clock>, secure: bool) -> Self {
        Self {
            codec,
            clock,
            secure,
            paths: SESSION_PATHS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    /// Whether issued cookies carry the `Secure` attribute.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    fn attributes(&self, path: &str) -> CredentialAttributes {
        CredentialAttributes {
            http_only: true,
            same_site: SameSite::Lax,
            path: path.to_owned(),
            secure: self.secure,
            max_age_seconds: Some(TOKEN_TTL_SECONDS),
        }
    }

    /// Sign `claims` and attach the token to `channel`.
    ///
    /// Returns the token so non-cookie clients can carry it themselves.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if the claims cannot be encoded.
    pub fn issue<C: CredentialChannel>(
        &self,
        channel: &mut C,
        claims: &SessionClaims,
    ) -> Result<String, TokenError> {
        let token = self.codec.encode(claims, self.clock.now())?;
        channel.write_credential(SESSION_COOKIE_NAME, token.clone(), &self.attributes("/"));
        debug!(user_id = %claims.subject, role = %claims.role, "Session issued");
        Ok(token)
    }

    /// Claims of the current session, or `None` when there is none.
    ///
    /// Absence, tampering and expiry are ordinary states here, so they all
    /// collapse into `None`; the reason is only logged.
    #[must_use]
    pub fn current<C: CredentialChannel>(&self, channel: &C) -> Option<SessionClaims> {
        let token = channel.read_credential(SESSION_COOKIE_NAME)?;
        match self.codec.decode(&token, self.clock.now()) {
            Ok(claims) => Some(claims),
            Err(reason) => {
                debug!(%reason, "Rejected session token");
                None
            }
        }
    }

    /// Instruct the client to drop the session credential.
    ///
    /// Clears on every path the cookie may have been scoped to, once per
    /// [`ClearVariant`].
    pub fn revoke<C: CredentialChannel>(&self, channel: &mut C) {
        for path in self.paths.iter() {
            let attributes = self.attributes(path);
            for variant in ClearVariant::ALL {
                channel.clear_credential(SESSION_COOKIE_NAME, &attributes, variant);
            }
        }
        debug!(paths = self.paths.len(), "Session revoked");
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("codec", &self.codec)
            .field("secure", &self.secure)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeDelta, Utc};
    use marketstall_core::{Email, Role, UserId};
    use secrecy::SecretString;

    use super::*;
    use crate::clock::ManualClock;
    use crate::session::channel::CookieChannel;

    fn manager(clock: &ManualClock) -> SessionManager {
        SessionManager::new(
            TokenCodec::new(SecretString::from("manager-test-secret")),
            Arc::new(clock.clone()),
            false,
        )
    }

    fn claims(role: Role) -> SessionClaims {
        SessionClaims {
            subject: UserId::generate(),
            email: Email::parse("pat@example.com").unwrap(),
            name: "Pat".to_owned(),
            role,
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(19_000))
    }

    /// Carry the issued cookie into the next request like a browser would.
    fn next_request(channel: &CookieChannel) -> CookieChannel {
        let headers = channel.set_cookie_headers();
        let pairs: Vec<String> = headers
            .iter()
            .filter_map(|h| h.split(';').next().map(str::to_owned))
            .collect();
        CookieChannel::from_cookie_headers(pairs.iter().map(String::as_str))
    }

    #[test]
    fn test_issue_then_current_in_next_request() {
        let clock = clock();
        let sessions = manager(&clock);
        let claims = claims(Role::Admin);

        let mut response = CookieChannel::default();
        sessions.issue(&mut response, &claims).unwrap();

        let request = next_request(&response);
        assert_eq!(sessions.current(&request), Some(claims));
    }

    #[test]
    fn test_issued_cookie_attributes() {
        let clock = clock();
        let mut channel = CookieChannel::default();
        manager(&clock).issue(&mut channel, &claims(Role::User)).unwrap();

        let headers = channel.set_cookie_headers();
        let header = headers.first().unwrap();
        assert!(header.starts_with("ms_session="));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Path=/"));
        assert!(header.contains(&format!("Max-Age={TOKEN_TTL_SECONDS}")));
        assert!(!header.contains("Secure"));
    }

    #[test]
    fn test_secure_flag_follows_configuration() {
        let clock = clock();
        let sessions = SessionManager::new(
            TokenCodec::new(SecretString::from("manager-test-secret")),
            Arc::new(clock),
            true,
        );
        let mut channel = CookieChannel::default();
        sessions.issue(&mut channel, &claims(Role::User)).unwrap();
        assert!(channel.set_cookie_headers().first().unwrap().contains("Secure"));
    }

    #[test]
    fn test_current_is_none_without_cookie() {
        let clock = clock();
        assert!(manager(&clock).current(&CookieChannel::default()).is_none());
    }

    #[test]
    fn test_current_is_none_for_garbage_or_foreign_tokens() {
        let clock = clock();
        let sessions = manager(&clock);

        let garbage = CookieChannel::from_cookie_headers(["ms_session=not-a-token"]);
        assert!(sessions.current(&garbage).is_none());

        let foreign = SessionManager::new(
            TokenCodec::new(SecretString::from("someone-elses-secret")),
            Arc::new(clock.clone()),
            false,
        );
        let mut response = CookieChannel::default();
        foreign.issue(&mut response, &claims(Role::Admin)).unwrap();
        assert!(sessions.current(&next_request(&response)).is_none());
    }

    #[test]
    fn test_current_is_none_after_natural_expiry() {
        let clock = clock();
        let sessions = manager(&clock);
        let mut response = CookieChannel::default();
        sessions.issue(&mut response, &claims(Role::User)).unwrap();
        let request = next_request(&response);

        clock.advance(TimeDelta::days(6));
        assert!(sessions.current(&request).is_some());

        clock.advance(TimeDelta::days(1));
        assert!(sessions.current(&request).is_none());
    }

    #[test]
    fn test_revoke_hides_unexpired_session() {
        let clock = clock();
        let sessions = manager(&clock);
        let mut response = CookieChannel::default();
        sessions.issue(&mut response, &claims(Role::Admin)).unwrap();

        let mut request = next_request(&response);
        assert!(sessions.current(&request).is_some());

        sessions.revoke(&mut request);
        assert!(sessions.current(&request).is_none());
    }

    #[test]
    fn test_revoke_clears_every_path_with_every_variant() {
        let clock = clock();
        let mut channel = CookieChannel::default();
        manager(&clock).revoke(&mut channel);

        let headers = channel.set_cookie_headers();
        assert_eq!(headers.len(), SESSION_PATHS.len() * ClearVariant::ALL.len());
        for path in SESSION_PATHS {
            let for_path = headers
                .iter()
                .filter(|h| h.contains(&format!("Path={path};")) || h.ends_with(&format!("Path={path}")))
                .count();
            assert_eq!(for_path, ClearVariant::ALL.len(), "path {path}");
        }
        assert!(headers.iter().all(|h| h.starts_with("ms_session=;")));
    }
}
