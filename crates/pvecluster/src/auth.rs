//! Ticket authentication for the control-plane API.
//!
//! A session is an opaque ticket (sent as the `PVEAuthCookie` cookie) plus
//! an anti-forgery token (sent as the `CSRFPreventionToken` header). Both
//! are wrapped in [`Secret`] so they never show up in `Debug` output, log
//! lines, or serialized results.

use std::fmt;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ClusterError, ClusterResult};

/// Cookie carrying the session ticket.
pub const AUTH_COOKIE: &str = "PVEAuthCookie";

/// Header carrying the anti-forgery token.
pub const CSRF_HEADER: &str = "CSRFPreventionToken";

const REDACTED: &str = "[REDACTED]";

/// A string that is wiped on drop and redacted on every output path.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext. Call sites should be limited to the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Serialize a secret's plaintext. Only for request bodies sent to the API.
pub(crate) fn serialize_exposed<S: Serializer>(
    secret: &Secret,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose())
}

/// An authenticated session against one endpoint.
///
/// Deserializes from the shape returned by `POST /access/ticket`
/// (`{"ticket": …, "CSRFPreventionToken": …}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTicket {
    pub ticket: Secret,
    #[serde(rename = "CSRFPreventionToken", alias = "csrf_token")]
    pub csrf_token: Secret,
}

impl AuthTicket {
    pub fn new(ticket: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            ticket: Secret::new(ticket),
            csrf_token: Secret::new(csrf_token),
        }
    }

    /// Build the header set for an authenticated request.
    ///
    /// Fails with [`ClusterError::InvalidCredential`] if either value is
    /// empty or cannot be carried in a cookie/header.
    pub fn headers(&self) -> ClusterResult<HeaderMap> {
        validate_ticket(self.ticket.expose())?;
        if self.csrf_token.is_empty() {
            return Err(ClusterError::InvalidCredential(
                "empty CSRF prevention token".to_string(),
            ));
        }

        let mut cookie = HeaderValue::from_str(&format!("{AUTH_COOKIE}={}", self.ticket.expose()))
            .map_err(|_| ClusterError::InvalidCredential("ticket is not a valid cookie value".to_string()))?;
        cookie.set_sensitive(true);

        let mut csrf = HeaderValue::from_str(self.csrf_token.expose()).map_err(|_| {
            ClusterError::InvalidCredential("CSRF token is not a valid header value".to_string())
        })?;
        csrf.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(COOKIE, cookie);
        headers.insert(HeaderName::from_static("csrfpreventiontoken"), csrf);
        Ok(headers)
    }

    /// A view exposing the plaintext, for handing the session to a
    /// downstream step. Never log it.
    pub fn reveal(&self) -> RevealedAuth<'_> {
        RevealedAuth {
            ticket: self.ticket.expose(),
            csrf_token: self.csrf_token.expose(),
        }
    }
}

/// Plaintext rendering of an [`AuthTicket`], in the `/access/ticket` shape.
#[derive(Serialize)]
pub struct RevealedAuth<'a> {
    pub ticket: &'a str,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: &'a str,
}

/// Reject tickets that would break the `Cookie` header.
fn validate_ticket(ticket: &str) -> ClusterResult<()> {
    if ticket.is_empty() {
        return Err(ClusterError::InvalidCredential("empty ticket".to_string()));
    }
    let bad = ticket
        .chars()
        .find(|c| !c.is_ascii_graphic() || matches!(c, ';' | ',' | '"' | '\\'));
    match bad {
        Some(c) => Err(ClusterError::InvalidCredential(format!(
            "ticket contains forbidden character {c:?}"
        ))),
        None => Ok(()),
    }
}
