//! Bearer token with expiry tracking.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Default token type when the server omits one.
const DEFAULT_TOKEN_TYPE: &str = "token";

/// An active bearer credential.
///
/// One token is active per strategy at a time; a refresh replaces it
/// wholesale, never field by field.
///
/// # Security
///
/// The token text is hidden from Debug output.
#[derive(Clone)]
pub struct AuthToken {
    access_token: String,
    token_type: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    /// Build a token expiring `expires_in` seconds from now.
    ///
    /// An absent `expires_in` leaves the expiry unset, which counts as
    /// already expired.
    pub fn new(
        access_token: impl Into<String>,
        token_type: Option<String>,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_at: expires_in.map(|seconds| Utc::now() + Duration::seconds(seconds)),
        }
    }

    /// True when the expiry is unset or the current instant is at or past it.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => Utc::now() >= at,
        }
    }

    /// The full `Authorization` header value for this token.
    pub(crate) fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

// Hide token value in Debug output
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Wire shape of a token endpoint response.
///
/// Decoded through the fuzzy decoder because some deployments quote
/// `expires_in`.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl From<AccessTokenResponse> for AuthToken {
    fn from(wire: AccessTokenResponse) -> Self {
        AuthToken::new(wire.access_token, wire.token_type, wire.expires_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::FuzzyDecoder;

    #[test]
    fn unset_expiry_counts_as_expired() {
        let token = AuthToken::new("abc", None, None);
        assert!(token.is_expired());
    }

    #[test]
    fn future_expiry_is_not_expired() {
        let token = AuthToken::new("abc", None, Some(3600));
        assert!(!token.is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let token = AuthToken::new("abc", None, Some(-1));
        assert!(token.is_expired());

        let zero = AuthToken::new("abc", None, Some(0));
        assert!(zero.is_expired());
    }

    #[test]
    fn header_value_uses_reported_token_type() {
        let bearer = AuthToken::new("abc", Some("Bearer".to_string()), Some(60));
        assert_eq!(bearer.header_value(), "Bearer abc");

        let bare = AuthToken::new("abc", None, Some(60));
        assert_eq!(bare.header_value(), "token abc");

        let empty = AuthToken::new("abc", Some(String::new()), Some(60));
        assert_eq!(empty.header_value(), "token abc");
    }

    #[test]
    fn debug_hides_token_text() {
        let token = AuthToken::new("super-secret-token", None, Some(60));
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn wire_response_tolerates_quoted_expires_in() {
        let wire: AccessTokenResponse = FuzzyDecoder::new()
            .decode(r#"{"access_token":"abc","token_type":"Bearer","expires_in":"3600"}"#)
            .unwrap();
        assert_eq!(wire.expires_in, Some(3600));
        let token = AuthToken::from(wire);
        assert!(!token.is_expired());
    }
}
