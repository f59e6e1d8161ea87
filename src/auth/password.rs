//! Password / login-grant strategy.
//!
//! Exchanges the API client id and secret for a bearer token with a
//! form-encoded POST to `{base_url}/api/{version}/login`, and re-logs-in
//! transparently whenever the cached token has expired.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{AuthError, Error};
use crate::fuzzy::FuzzyDecoder;
use crate::settings::ApiSettings;
use crate::transport::{APP_ID, APP_ID_HEADER};

use super::token::{AccessTokenResponse, AuthToken};
use super::AuthStrategy;

/// Login-grant credential source.
pub struct PasswordGrant {
    login_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    decoder: FuzzyDecoder,
    // Held across the login round trip so concurrent callers observing an
    // expired token wait for the single refresh in flight.
    token: Mutex<Option<AuthToken>>,
}

impl PasswordGrant {
    /// Create a login-grant source for `settings`, using `http` for the
    /// login call itself.
    pub fn new(settings: &ApiSettings, http: reqwest::Client) -> Self {
        Self {
            login_url: format!(
                "{}/api/{}/login",
                settings.base_url, settings.api_version
            ),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            http,
            decoder: FuzzyDecoder::new(),
            token: Mutex::new(None),
        }
    }

    #[instrument(skip(self), fields(url = %self.login_url))]
    async fn login(&self) -> Result<AuthToken, Error> {
        debug!("logging in");

        let response = self
            .http
            .post(&self.login_url)
            .header(APP_ID_HEADER, APP_ID)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::LoginFailed {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let wire: AccessTokenResponse = self.decoder.decode(&body)?;
        Ok(AuthToken::from(wire))
    }
}

#[async_trait]
impl AuthStrategy for PasswordGrant {
    async fn authorization(&self) -> Result<String, Error> {
        let mut guard = self.token.lock().await;

        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.header_value());
            }
            debug!("cached token expired, logging in again");
        }

        let token = self.login().await?;
        let header = token.header_value();
        *guard = Some(token);
        Ok(header)
    }
}

impl std::fmt::Debug for PasswordGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGrant")
            .field("login_url", &self.login_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}
