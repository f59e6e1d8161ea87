//! OAuth2 client-credentials strategy.
//!
//! Delegates token acquisition to a standard client-credentials exchange
//! against the login endpoint, with credentials carried in the request
//! body (the service does not accept HTTP basic auth on this endpoint).

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{AuthError, Error};
use crate::settings::ApiSettings;

use super::token::AuthToken;
use super::AuthStrategy;

type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Client-credentials OAuth source.
pub struct ClientCredentialsGrant {
    oauth: TokenClient,
    http: reqwest::Client,
    token: Mutex<Option<AuthToken>>,
}

impl ClientCredentialsGrant {
    /// Create a client-credentials source for `settings`.
    ///
    /// The supplied `http` client is used for token calls, so its default
    /// headers (the app-id tag included) reach the token endpoint too.
    pub fn new(settings: &ApiSettings, http: reqwest::Client) -> Result<Self, Error> {
        let token_url = format!(
            "{}/api/{}/login",
            settings.base_url, settings.api_version
        );
        let token_url = TokenUrl::new(token_url).map_err(|err| AuthError::InvalidEndpoint {
            kind: "token",
            reason: err.to_string(),
        })?;

        let oauth = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        Ok(Self {
            oauth,
            http,
            token: Mutex::new(None),
        })
    }

    #[instrument(skip(self))]
    async fn exchange(&self) -> Result<AuthToken, Error> {
        debug!("exchanging client credentials");

        let response = self
            .oauth
            .exchange_client_credentials()
            .request_async(&self.http)
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

        Ok(AuthToken::new(
            response.access_token().secret().clone(),
            Some("Bearer".to_string()),
            response.expires_in().map(|d| d.as_secs() as i64),
        ))
    }
}

#[async_trait]
impl AuthStrategy for ClientCredentialsGrant {
    async fn authorization(&self) -> Result<String, Error> {
        let mut guard = self.token.lock().await;

        if let Some(token) = guard.as_ref() {
            if !token.is_expired() {
                return Ok(token.header_value());
            }
            debug!("cached token expired, re-exchanging");
        }

        let token = self.exchange().await?;
        let header = token.header_value();
        *guard = Some(token);
        Ok(header)
    }
}

impl std::fmt::Debug for ClientCredentialsGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsGrant")
            .field("token_url", &self.oauth.token_uri().as_str())
            .finish()
    }
}
