//! The authenticated request executor.
//!
//! [`AuthSession`] owns the HTTP client, the resolved settings, and an
//! authentication strategy. Every call acquires a credential through the
//! strategy, builds the versioned request, runs it under the effective
//! deadline or cancellation handle, and decodes the response.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{AuthStrategy, ClientCredentialsGrant, PasswordGrant, PkceGrant};
use crate::error::{Error, ResponseError, TransportError};
use crate::fuzzy::FuzzyDecoder;
use crate::settings::{ApiSettings, DEFAULT_TIMEOUT};
use crate::transport::{encode_query, ApiParams, Body, RequestOptions, APP_ID, APP_ID_HEADER};

/// Successful status window. 2xx including the WebDAV extensions.
const SUCCESS_STATUS: std::ops::RangeInclusive<u16> = 200..=226;

/// An authenticated session against one API host.
///
/// Cheap to clone; clones share the HTTP connection pool and the cached
/// token, so concurrent calls across clones trigger at most one login.
///
/// # Example
///
/// ```no_run
/// use looker_rtl::{ApiSettings, AuthSession};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: i64,
///     display_name: String,
/// }
///
/// # async fn run() -> Result<(), looker_rtl::Error> {
/// let settings = ApiSettings::from_env();
/// let session = AuthSession::new(settings)?;
/// let user: Option<User> = session
///     .request_json(reqwest::Method::GET, "/user", None, None, None)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthSession {
    settings: ApiSettings,
    client: reqwest::Client,
    auth: Arc<dyn AuthStrategy>,
    decoder: FuzzyDecoder,
    cancel: Option<CancellationToken>,
}

impl AuthSession {
    /// A session using the API login endpoint with client credentials.
    ///
    /// # Errors
    ///
    /// Fails only when the HTTP client cannot be constructed.
    pub fn new(settings: ApiSettings) -> Result<Self, Error> {
        let client = build_client(&settings)?;
        Ok(Self::with_client(settings, client))
    }

    /// Like [`AuthSession::new`] with a caller-supplied HTTP client.
    ///
    /// The client is used for API calls and token fetches both; callers
    /// that need proxy or TLS tweaks configure them once here.
    pub fn with_client(settings: ApiSettings, client: reqwest::Client) -> Self {
        let auth = Arc::new(PasswordGrant::new(&settings, client.clone()));
        Self::assemble(settings, client, auth)
    }

    /// A session using the OAuth client credentials grant.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed or the token
    /// endpoint derived from the settings is not a valid URL.
    pub fn oauth(settings: ApiSettings) -> Result<Self, Error> {
        let client = build_client(&settings)?;
        Self::oauth_with_client(settings, client)
    }

    /// Like [`AuthSession::oauth`] with a caller-supplied HTTP client.
    pub fn oauth_with_client(settings: ApiSettings, client: reqwest::Client) -> Result<Self, Error> {
        let auth = Arc::new(ClientCredentialsGrant::new(&settings, client.clone())?);
        Ok(Self::assemble(settings, client, auth))
    }

    /// A session using the interactive authorization code flow with PKCE.
    ///
    /// Runs the browser round trip before returning; see [`PkceGrant::new`].
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed or the interactive
    /// flow does not complete.
    pub async fn pkce(settings: ApiSettings) -> Result<Self, Error> {
        let client = build_client(&settings)?;
        Self::pkce_with_client(settings, client).await
    }

    /// Like [`AuthSession::pkce`] with a caller-supplied HTTP client.
    pub async fn pkce_with_client(
        settings: ApiSettings,
        client: reqwest::Client,
    ) -> Result<Self, Error> {
        let auth = Arc::new(PkceGrant::new(&settings, client.clone()).await?);
        Ok(Self::assemble(settings, client, auth))
    }

    fn assemble(settings: ApiSettings, client: reqwest::Client, auth: Arc<dyn AuthStrategy>) -> Self {
        Self {
            settings,
            client,
            auth,
            decoder: FuzzyDecoder::new(),
            cancel: None,
        }
    }

    /// Attach a cancellation handle to every call made through this session.
    ///
    /// The handle replaces the deadline entirely; a per-call handle in
    /// [`RequestOptions`] takes precedence over this one.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The settings this session was built from.
    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Perform a call and decode the JSON response into `T`.
    ///
    /// Returns `None` for a `204 No Content` response. Decoding is fuzzy:
    /// quoted numbers and bare numbers both land in the destination field.
    ///
    /// # Errors
    ///
    /// [`Error::Response`] for a non-2xx status, [`Error::Transport`] for
    /// network failures, deadline, or cancellation, [`Error::Decode`] when
    /// the body does not fit `T`, and [`Error::Auth`] when no credential
    /// could be obtained.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Option<&ApiParams>,
        body: Option<Body>,
        options: Option<&RequestOptions>,
    ) -> Result<Option<T>, Error> {
        let (status, bytes) = self.dispatch(method, path, params, body, options).await?;
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&bytes);
        Ok(Some(self.decoder.decode(&text)?))
    }

    /// Perform a call and return the response body bytes verbatim.
    ///
    /// Used for endpoints returning SQL text, CSV, or opaque blobs such
    /// as images; nothing is decoded or re-encoded.
    ///
    /// # Errors
    ///
    /// As [`AuthSession::request_json`], minus the decode step.
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        params: Option<&ApiParams>,
        body: Option<Body>,
        options: Option<&RequestOptions>,
    ) -> Result<Vec<u8>, Error> {
        let (_, bytes) = self.dispatch(method, path, params, body, options).await?;
        Ok(bytes)
    }

    /// Perform a call and discard the response body.
    ///
    /// # Errors
    ///
    /// As [`AuthSession::request_raw`].
    pub async fn request_empty(
        &self,
        method: Method,
        path: &str,
        params: Option<&ApiParams>,
        body: Option<Body>,
        options: Option<&RequestOptions>,
    ) -> Result<(), Error> {
        self.dispatch(method, path, params, body, options).await?;
        Ok(())
    }

    #[instrument(skip(self, params, body, options), fields(%method))]
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        params: Option<&ApiParams>,
        body: Option<Body>,
        options: Option<&RequestOptions>,
    ) -> Result<(StatusCode, Vec<u8>), Error> {
        let mut url = Url::parse(&format!(
            "{}/api/{}{}",
            self.settings.base_url, self.settings.api_version, path
        ))
        .map_err(|err| TransportError::Http {
            message: format!("invalid request URL: {err}"),
        })?;
        if let Some(params) = params {
            encode_query(&mut url, params);
        }

        let cancel = options
            .and_then(|options| options.cancel.clone())
            .or_else(|| self.cancel.clone());

        // The deadline covers the whole round trip, the credential fetch
        // included: an expired token can cost a login call here.
        let call = self.perform(method, url, body, options);

        let (status, bytes) = if let Some(cancel) = cancel {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
                result = call => result?,
            }
        } else {
            let seconds = self.effective_timeout(options);
            match timeout(Duration::from_secs(seconds), call).await {
                Ok(result) => result?,
                Err(_) => return Err(TransportError::DeadlineExceeded { seconds }.into()),
            }
        };

        debug!(status = status.as_u16(), bytes = bytes.len(), "response received");

        if !SUCCESS_STATUS.contains(&status.as_u16()) {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(ResponseError::new(status, text).into());
        }

        Ok((status, bytes))
    }

    /// Authenticate, build, and send one request; returns the status and
    /// the unmodified body bytes.
    async fn perform(
        &self,
        method: Method,
        url: Url,
        body: Option<Body>,
        options: Option<&RequestOptions>,
    ) -> Result<(StatusCode, Vec<u8>), Error> {
        let authorization = self.auth.authorization().await?;
        let headers = self.build_headers(&authorization, body.as_ref(), options)?;

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body.into_text());
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        Ok((status, bytes.to_vec()))
    }

    /// Merge the header layers: session agent tag, per-call agent tag,
    /// session headers, per-call headers, then the SDK app id last so it
    /// cannot be overridden.
    fn build_headers(
        &self,
        authorization: &str,
        body: Option<&Body>,
        options: Option<&RequestOptions>,
    ) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, AUTHORIZATION.as_str(), authorization)?;

        if let Some(body) = body {
            insert_header(&mut headers, CONTENT_TYPE.as_str(), body.content_type())?;
        }

        if !self.settings.agent_tag.is_empty() {
            insert_header(&mut headers, USER_AGENT.as_str(), &self.settings.agent_tag)?;
        }
        if let Some(tag) = options.and_then(|options| options.agent_tag.as_deref()) {
            insert_header(&mut headers, USER_AGENT.as_str(), tag)?;
        }

        for (key, value) in &self.settings.headers {
            insert_header(&mut headers, key, value)?;
        }
        if let Some(extra) = options.and_then(|options| options.headers.as_ref()) {
            for (key, value) in extra {
                insert_header(&mut headers, key, value)?;
            }
        }

        insert_header(&mut headers, APP_ID_HEADER, APP_ID)?;
        Ok(headers)
    }

    /// Per-call override wins over the session setting; zero means unset.
    fn effective_timeout(&self, options: Option<&RequestOptions>) -> u64 {
        options
            .and_then(|options| options.timeout)
            .filter(|seconds| *seconds != 0)
            .or_else(|| (self.settings.timeout != 0).then_some(self.settings.timeout))
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Default client: TLS verification per the settings, and the SDK app id
/// as a default header so token fetches carry it too.
fn build_client(settings: &ApiSettings) -> Result<reqwest::Client, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(APP_ID_HEADER, HeaderValue::from_static(APP_ID));

    reqwest::Client::builder()
        .danger_accept_invalid_certs(!settings.verify_ssl)
        .default_headers(headers)
        .build()
        .map_err(Error::from)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Error> {
    let parsed_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|err| TransportError::Http {
            message: format!("invalid header name {name:?}: {err}"),
        })?;
    let parsed_value = HeaderValue::from_str(value).map_err(|err| TransportError::Http {
        message: format!("invalid value for header {name:?}: {err}"),
    })?;
    headers.insert(parsed_name, parsed_value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_timeout(timeout: u64) -> AuthSession {
        let settings = ApiSettings {
            base_url: "https://test.looker.com:19999".to_string(),
            timeout,
            ..ApiSettings::default()
        };
        AuthSession::new(settings).unwrap()
    }

    #[test]
    fn timeout_precedence_is_options_then_settings_then_default() {
        let session = session_with_timeout(0);
        assert_eq!(session.effective_timeout(None), DEFAULT_TIMEOUT);

        let session = session_with_timeout(30);
        assert_eq!(session.effective_timeout(None), 30);
        assert_eq!(
            session.effective_timeout(Some(&RequestOptions::with_timeout(60))),
            60
        );
        // zero in the options means "no override"
        assert_eq!(
            session.effective_timeout(Some(&RequestOptions::with_timeout(0))),
            30
        );
    }

    #[test]
    fn app_id_header_cannot_be_overridden() {
        let session = session_with_timeout(0);
        let options = RequestOptions {
            headers: Some(std::collections::HashMap::from([(
                APP_ID_HEADER.to_string(),
                "sneaky".to_string(),
            )])),
            ..RequestOptions::default()
        };
        let headers = session
            .build_headers("token abc", None, Some(&options))
            .unwrap();
        assert_eq!(headers.get(APP_ID_HEADER).unwrap(), APP_ID);
    }

    #[test]
    fn per_call_agent_tag_wins() {
        let settings = ApiSettings {
            base_url: "https://test.looker.com:19999".to_string(),
            agent_tag: "session-agent".to_string(),
            ..ApiSettings::default()
        };
        let session = AuthSession::new(settings).unwrap();

        let headers = session.build_headers("token abc", None, None).unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "session-agent");

        let options = RequestOptions {
            agent_tag: Some("call-agent".to_string()),
            ..RequestOptions::default()
        };
        let headers = session
            .build_headers("token abc", None, Some(&options))
            .unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "call-agent");
    }

    #[test]
    fn content_type_follows_the_body_kind() {
        let session = session_with_timeout(0);
        let headers = session
            .build_headers("token abc", Some(&Body::plain("hello")), None)
            .unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");

        let body = Body::json(&serde_json::json!({"k": "v"}));
        let headers = session
            .build_headers("token abc", Some(&body), None)
            .unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn invalid_caller_header_is_rejected() {
        let session = session_with_timeout(0);
        let options = RequestOptions {
            headers: Some(std::collections::HashMap::from([(
                "bad header".to_string(),
                "x".to_string(),
            )])),
            ..RequestOptions::default()
        };
        let err = session
            .build_headers("token abc", None, Some(&options))
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Http { .. })));
    }
}
