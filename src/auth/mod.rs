//! Authentication strategies.
//!
//! Three historically divergent auth paths share one capability here:
//! produce a valid `Authorization` credential for a request, refreshing it
//! when expired. The strategy is picked at session construction and hidden
//! behind [`AuthStrategy`].

mod oauth;
mod password;
mod pkce;
mod redirect;
mod token;

use async_trait::async_trait;

use crate::error::Error;

pub use oauth::ClientCredentialsGrant;
pub use password::PasswordGrant;
pub use pkce::PkceGrant;
pub use token::AuthToken;

/// The single auth capability: a ready `Authorization` header value.
///
/// Implementations cache their token and refresh it under a lock; callers
/// invoking this concurrently never trigger duplicate logins, they wait on
/// the one in flight.
#[async_trait]
pub trait AuthStrategy: Send + Sync + std::fmt::Debug {
    /// Return a valid `Authorization` header value, refreshing the
    /// underlying credential first if it has expired.
    async fn authorization(&self) -> Result<String, Error>;
}
