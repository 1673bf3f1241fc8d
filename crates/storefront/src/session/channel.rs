//! Credential channel: where the session token travels between requests.
//!
//! [`CookieChannel`] is the HTTP implementation. It is an axum extractor that
//! reads every inbound `Cookie` header, and a response part that emits one
//! `Set-Cookie` header per queued write or clear. Queuing (rather than a
//! name-keyed jar) is what lets several clearing instructions for the same
//! cookie name reach the client in a single response.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponseParts, ResponseParts},
};
use cookie::{Cookie, SameSite, time};

/// Attributes attached to a credential when it is written or cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialAttributes {
    /// Hide the credential from page scripts.
    pub http_only: bool,
    /// Cross-site sending policy.
    pub same_site: SameSite,
    /// Path scope.
    pub path: String,
    /// Only send over HTTPS.
    pub secure: bool,
    /// Lifetime in seconds (`None` for a browser-session cookie).
    pub max_age_seconds: Option<i64>,
}

/// How a clearing instruction is phrased.
///
/// User agents differ in which form they honor, so revocation sends all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearVariant {
    /// Name and path only, as produced by [`Cookie::make_removal`].
    Bare,
    /// Full attributes with `Max-Age=0`.
    MaxAgeZero,
    /// Full attributes with an `Expires` date in the past.
    PastExpiry,
}

impl ClearVariant {
    /// Every variant, in the order they are emitted.
    pub const ALL: [Self; 3] = [Self::Bare, Self::MaxAgeZero, Self::PastExpiry];
}

/// Opaque storage for a named credential on the client side.
pub trait CredentialChannel {
    /// Current value of the credential, if any.
    fn read_credential(&self, name: &str) -> Option<String>;

    /// Store `value` under `name`.
    fn write_credential(&mut self, name: &str, value: String, attributes: &CredentialAttributes);

    /// Overwrite `name` with an empty, already-expired value.
    fn clear_credential(
        &mut self,
        name: &str,
        attributes: &CredentialAttributes,
        variant: ClearVariant,
    );
}

/// Cookie-backed [`CredentialChannel`].
#[derive(Debug, Clone, Default)]
pub struct CookieChannel {
    inbound: HashMap<String, String>,
    outbound: Vec<Cookie<'static>>,
}

impl CookieChannel {
    /// Build a channel from raw `Cookie` header values.
    pub fn from_cookie_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let inbound = headers
            .into_iter()
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .map(|c| (c.name().to_owned(), c.value().to_owned()))
            .collect();

        Self {
            inbound,
            outbound: Vec::new(),
        }
    }

    /// Queued `Set-Cookie` values, in emission order.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.outbound.iter().map(ToString::to_string).collect()
    }
}

impl CredentialChannel for CookieChannel {
    fn read_credential(&self, name: &str) -> Option<String> {
        // The most recent queued instruction wins over what the client sent.
        if let Some(queued) = self.outbound.iter().rev().find(|c| c.name() == name) {
            return (!queued.value().is_empty()).then(|| queued.value().to_owned());
        }
        self.inbound
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn write_credential(&mut self, name: &str, value: String, attributes: &CredentialAttributes) {
        let mut builder = Cookie::build((name.to_owned(), value))
            .http_only(attributes.http_only)
            .same_site(attributes.same_site)
            .path(attributes.path.clone())
            .secure(attributes.secure);
        if let Some(seconds) = attributes.max_age_seconds {
            builder = builder.max_age(time::Duration::seconds(seconds));
        }
        self.outbound.push(builder.build());
    }

    fn clear_credential(
        &mut self,
        name: &str,
        attributes: &CredentialAttributes,
        variant: ClearVariant,
    ) {
        let full = || {
            Cookie::build((name.to_owned(), String::new()))
                .http_only(attributes.http_only)
                .same_site(attributes.same_site)
                .path(attributes.path.clone())
                .secure(attributes.secure)
        };

        let cookie = match variant {
            ClearVariant::Bare => {
                let mut cookie = Cookie::build((name.to_owned(), String::new()))
                    .path(attributes.path.clone())
                    .build();
                cookie.make_removal();
                cookie
            }
            ClearVariant::MaxAgeZero => full().max_age(time::Duration::ZERO).build(),
            ClearVariant::PastExpiry => full().expires(time::OffsetDateTime::UNIX_EPOCH).build(),
        };
        self.outbound.push(cookie);
    }
}

impl<S> FromRequestParts<S> for CookieChannel
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_cookie_headers(
            parts
                .headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        ))
    }
}

impl IntoResponseParts for CookieChannel {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for cookie in &self.outbound {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    res.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::error!(error = %e, cookie = cookie.name(), "Unencodable cookie"),
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn attributes(path: &str) -> CredentialAttributes {
        CredentialAttributes {
            http_only: true,
            same_site: SameSite::Lax,
            path: path.to_owned(),
            secure: true,
            max_age_seconds: Some(3600),
        }
    }

    #[test]
    fn test_reads_from_all_cookie_headers() {
        let channel = CookieChannel::from_cookie_headers(["a=1; b=2", "ms_session=tok"]);
        assert_eq!(channel.read_credential("b").as_deref(), Some("2"));
        assert_eq!(channel.read_credential("ms_session").as_deref(), Some("tok"));
        assert!(channel.read_credential("missing").is_none());
    }

    #[test]
    fn test_empty_inbound_value_is_absent() {
        let channel = CookieChannel::from_cookie_headers(["ms_session="]);
        assert!(channel.read_credential("ms_session").is_none());
    }

    #[test]
    fn test_write_sets_every_attribute() {
        let mut channel = CookieChannel::default();
        channel.write_credential("ms_session", "abc.def".to_owned(), &attributes("/"));

        let headers = channel.set_cookie_headers();
        assert_eq!(headers.len(), 1);
        let header = &headers[0];
        assert!(header.starts_with("ms_session=abc.def"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Secure"));
        assert!(header.contains("Max-Age=3600"));
    }

    #[test]
    fn test_queued_write_is_visible_to_reads() {
        let mut channel = CookieChannel::from_cookie_headers(["ms_session=old"]);
        channel.write_credential("ms_session", "new".to_owned(), &attributes("/"));
        assert_eq!(channel.read_credential("ms_session").as_deref(), Some("new"));
    }

    #[test]
    fn test_each_clear_variant_expires_the_cookie() {
        let mut channel = CookieChannel::from_cookie_headers(["ms_session=tok"]);
        for variant in ClearVariant::ALL {
            channel.clear_credential("ms_session", &attributes("/admin"), variant);
        }

        assert!(channel.read_credential("ms_session").is_none());

        let headers = channel.set_cookie_headers();
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().all(|h| h.starts_with("ms_session=;")));
        assert!(headers.iter().all(|h| h.contains("Path=/admin")));
        assert!(headers[1].contains("Max-Age=0"));
        assert!(headers[2].contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn test_into_response_parts_appends_one_header_per_cookie() {
        use axum::response::IntoResponse;

        let mut channel = CookieChannel::default();
        for variant in ClearVariant::ALL {
            channel.clear_credential("ms_session", &attributes("/"), variant);
        }

        let response = (channel, "ok").into_response();
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 3);
    }
}
