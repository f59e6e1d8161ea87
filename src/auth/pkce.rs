//! Interactive OAuth authorization code flow with PKCE.
//!
//! Walks the user through a browser login once, then serves API calls
//! from the cached token, refreshing silently for as long as the server
//! keeps issuing refresh tokens.

use std::fmt;

use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::auth::token::AuthToken;
use crate::auth::{redirect, AuthStrategy};
use crate::error::{AuthError, Error};
use crate::settings::ApiSettings;

type PkceClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Tokens held after a completed browser login.
struct PkceState {
    token: AuthToken,
    refresh: Option<RefreshToken>,
}

/// Authorization code grant with PKCE for user-interactive logins.
///
/// Construction runs the full browser round trip: it opens the
/// authorization URL, waits on a loopback listener for the redirect,
/// and exchanges the returned code for tokens.
pub struct PkceGrant {
    oauth: PkceClient,
    http: reqwest::Client,
    state: Mutex<PkceState>,
}

impl PkceGrant {
    /// Run the interactive login and return a grant holding the tokens.
    ///
    /// # Errors
    ///
    /// Fails when the configured endpoints are not valid URLs, the
    /// loopback port cannot be bound, the redirect does not arrive
    /// within five minutes, or the code exchange is rejected.
    #[instrument(skip_all, fields(auth_url = %settings.auth_url))]
    pub async fn new(settings: &ApiSettings, http: reqwest::Client) -> Result<Self, Error> {
        let oauth = build_client(settings)?;

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256_len(96);
        let (authorize_url, _state) = oauth
            .authorize_url(|| CsrfToken::new_random_len(32))
            .add_scope(Scope::new("cors_api".to_string()))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(challenge)
            .url();

        let listener = redirect::bind(settings.redirect_port).await?;

        info!(url = %authorize_url, "opening browser for authorization");
        if let Err(err) = open::that(authorize_url.as_str()) {
            warn!(error = %err, url = %authorize_url, "could not open browser, visit the URL manually");
        }

        let code = redirect::wait_for_code(listener, &settings.redirect_path).await?;

        let response = oauth
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&http)
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

        let state = PkceState {
            token: token_from(&response),
            refresh: response.refresh_token().cloned(),
        };

        Ok(Self {
            oauth,
            http,
            state: Mutex::new(state),
        })
    }

    /// Trade the stored refresh token for a fresh access token.
    #[instrument(skip(self))]
    async fn refresh(&self, refresh: &RefreshToken) -> Result<PkceState, Error> {
        let response = self
            .oauth
            .exchange_refresh_token(refresh)
            .request_async(&self.http)
            .await
            .map_err(|err| AuthError::TokenExchange(err.to_string()))?;

        Ok(PkceState {
            token: token_from(&response),
            // Servers may rotate the refresh token; keep the old one
            // when the response omits it.
            refresh: response
                .refresh_token()
                .cloned()
                .or_else(|| Some(refresh.clone())),
        })
    }
}

#[async_trait::async_trait]
impl AuthStrategy for PkceGrant {
    async fn authorization(&self) -> Result<String, Error> {
        let mut state = self.state.lock().await;
        if state.token.is_expired() {
            let Some(refresh) = state.refresh.clone() else {
                return Err(AuthError::SessionExpired.into());
            };
            *state = self.refresh(&refresh).await?;
        }
        Ok(state.token.header_value())
    }
}

impl fmt::Debug for PkceGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceGrant")
            .field("auth_uri", &self.oauth.auth_uri().as_str())
            .field("token_uri", &self.oauth.token_uri().as_str())
            .finish_non_exhaustive()
    }
}

fn build_client(settings: &ApiSettings) -> Result<PkceClient, Error> {
    let auth_url = AuthUrl::new(settings.auth_url.clone()).map_err(|err| {
        AuthError::InvalidEndpoint {
            kind: "authorization",
            reason: err.to_string(),
        }
    })?;
    let token_url = TokenUrl::new(format!("{}/api/token", settings.base_url)).map_err(|err| {
        AuthError::InvalidEndpoint {
            kind: "token",
            reason: err.to_string(),
        }
    })?;
    let redirect_url = RedirectUrl::new(format!(
        "http://localhost:{}{}",
        settings.redirect_port, settings.redirect_path
    ))
    .map_err(|err| AuthError::InvalidEndpoint {
        kind: "redirect",
        reason: err.to_string(),
    })?;

    Ok(BasicClient::new(ClientId::new(settings.client_id.clone()))
        .set_auth_type(AuthType::RequestBody)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url))
}

fn token_from(response: &oauth2::basic::BasicTokenResponse) -> AuthToken {
    AuthToken::new(
        response.access_token().secret().clone(),
        Some("Bearer".to_string()),
        response.expires_in().map(|d| d.as_secs() as i64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ApiSettings {
        ApiSettings {
            base_url: "https://test.looker.com:19999".to_string(),
            auth_url: "https://test.looker.com:19999/auth".to_string(),
            client_id: "id".to_string(),
            redirect_port: 8080,
            redirect_path: "/callback".to_string(),
            ..ApiSettings::default()
        }
    }

    #[test]
    fn client_uses_configured_endpoints() {
        let client = build_client(&settings()).unwrap();
        assert_eq!(
            client.auth_uri().as_str(),
            "https://test.looker.com:19999/auth"
        );
        assert_eq!(
            client.token_uri().as_str(),
            "https://test.looker.com:19999/api/token"
        );
    }

    #[test]
    fn invalid_auth_url_is_rejected() {
        let mut settings = settings();
        settings.auth_url = "not a url".to_string();
        let err = build_client(&settings).unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthError::InvalidEndpoint { kind: "authorization", .. })
        ));
    }
}
