//! Runtime library for the Looker REST API SDK.
//!
//! This crate is the hand-written foundation that generated API bindings
//! call into. It resolves settings from INI files and environment
//! variables, authenticates against the API with client credentials or an
//! interactive OAuth flow, and executes versioned requests with fuzzy
//! JSON decoding.
//!
//! # Example
//!
//! ```no_run
//! use looker_rtl::{ApiSettings, AuthSession};
//!
//! # async fn run() -> Result<(), looker_rtl::Error> {
//! let settings = ApiSettings::from_ini_file("looker.ini", None)?;
//! let session = AuthSession::new(settings)?;
//! let me: Option<serde_json::Value> = session
//!     .request_json(reqwest::Method::GET, "/user", None, None, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod delim;
pub mod error;
pub mod fuzzy;
pub mod session;
pub mod settings;
pub mod transport;

pub use auth::{AuthStrategy, AuthToken, ClientCredentialsGrant, PasswordGrant, PkceGrant};
pub use delim::{DelimInt64, DelimString};
pub use error::{AuthError, ConfigError, DecodeError, Error, ResponseError, TransportError};
pub use fuzzy::FuzzyDecoder;
pub use session::AuthSession;
pub use settings::ApiSettings;
pub use transport::{ApiParams, Body, ParamValue, RequestOptions};

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;
