//! Session extractors.
//!
//! Authorization is decided during extraction, so a rejected request never
//! reaches the handler body and never touches the repository.

use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use tracing::debug;

use marketstall_core::Capability;

use crate::error::AppError;
use crate::models::SessionClaims;
use crate::session::{CookieChannel, SessionManager};

/// Extractor that optionally gets the current session.
///
/// A missing, malformed, forged or expired token all read as `None`.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentSession(session): CurrentSession) -> impl IntoResponse {
///     match session {
///         Some(claims) => format!("Hello, {}!", claims.name),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
pub struct CurrentSession(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let channel = CookieChannel::from_request_parts(parts, state).await?;
        Ok(Self(SessionManager::from_ref(state).current(&channel)))
    }
}

/// Extractor that requires a signed-in user.
///
/// Rejects with [`AppError::Unauthenticated`].
pub struct RequireSession(pub SessionClaims);

impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(CurrentSession(session)) = CurrentSession::from_request_parts(parts, state).await;
        session.map(Self).ok_or(AppError::Unauthenticated)
    }
}

/// Extractor that requires a session with [`Capability::Administer`].
///
/// Rejects with [`AppError::Forbidden`] whether the session is missing or
/// merely lacks the capability.
pub struct RequireAdmin(pub SessionClaims);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(CurrentSession(session)) = CurrentSession::from_request_parts(parts, state).await;
        match session {
            Some(claims) if claims.can(Capability::Administer) => Ok(Self(claims)),
            Some(claims) => {
                debug!(user_id = %claims.subject, role = %claims.role, "Admin route refused");
                Err(AppError::Forbidden)
            }
            None => Err(AppError::Forbidden),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Request, header::COOKIE};
    use secrecy::SecretString;

    use marketstall_core::{Email, Role, UserId};

    use super::*;
    use crate::clock::SystemClock;
    use crate::session::{SESSION_COOKIE_NAME, TokenCodec};

    fn manager() -> SessionManager {
        SessionManager::new(
            TokenCodec::new(SecretString::from("k".repeat(32))),
            Arc::new(SystemClock),
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

    fn parts(sessions: &SessionManager, session: Option<&SessionClaims>) -> Parts {
        let mut request = Request::builder().uri("/admin/products");
        if let Some(claims) = session {
            let mut channel = CookieChannel::default();
            let token = sessions.issue(&mut channel, claims).unwrap();
            request = request.header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"));
        }
        request.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_current_session_reads_the_cookie() {
        let sessions = manager();
        let admin = claims(Role::Admin);

        let CurrentSession(found) =
            CurrentSession::from_request_parts(&mut parts(&sessions, Some(&admin)), &sessions)
                .await
                .unwrap();
        assert_eq!(found, Some(admin));

        let CurrentSession(none) =
            CurrentSession::from_request_parts(&mut parts(&sessions, None), &sessions)
                .await
                .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_require_session_rejects_guests() {
        let sessions = manager();
        let result = RequireSession::from_request_parts(&mut parts(&sessions, None), &sessions).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_require_admin_checks_capability() {
        let sessions = manager();

        let user = claims(Role::User);
        let result =
            RequireAdmin::from_request_parts(&mut parts(&sessions, Some(&user)), &sessions).await;
        assert!(matches!(result, Err(AppError::Forbidden)));

        let result = RequireAdmin::from_request_parts(&mut parts(&sessions, None), &sessions).await;
        assert!(matches!(result, Err(AppError::Forbidden)));

        let admin = claims(Role::Admin);
        let RequireAdmin(found) =
            RequireAdmin::from_request_parts(&mut parts(&sessions, Some(&admin)), &sessions)
                .await
                .unwrap();
        assert_eq!(found.subject, admin.subject);
    }
}
