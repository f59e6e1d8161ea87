//! Connection settings for an API session.
//!
//! Settings are resolved once at startup, either from an INI-style file or
//! from `LOOKERSDK_*` environment variables, and are immutable afterwards.
//! Per-call overrides go through [`RequestOptions`](crate::RequestOptions),
//! not through mutation.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;

use config::{Config, File, FileFormat};
use tracing::warn;

use crate::error::{ConfigError, Error};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT: u64 = 120;

/// Default API version.
pub const DEFAULT_API_VERSION: &str = "4.0";

/// Default settings-file section name.
pub const DEFAULT_SECTION: &str = "Looker";

/// Default loopback port for the interactive OAuth redirect.
pub const DEFAULT_REDIRECT_PORT: u16 = 8080;

/// Default loopback path for the interactive OAuth redirect.
pub const DEFAULT_REDIRECT_PATH: &str = "/callback";

/// Immutable per-session connection configuration.
///
/// Construct with [`ApiSettings::from_ini_file`], [`ApiSettings::from_env`],
/// or by filling in fields over [`ApiSettings::default`].
///
/// # Example
///
/// ```no_run
/// use looker_rtl::ApiSettings;
///
/// let settings = ApiSettings::from_ini_file("looker.ini", None)?;
/// assert_eq!(settings.api_version, "4.0");
/// # Ok::<(), looker_rtl::Error>(())
/// ```
#[derive(Clone, PartialEq)]
pub struct ApiSettings {
    /// Base URL of the API server, without a trailing `/api` path.
    pub base_url: String,
    /// API version segment, e.g. `"4.0"`.
    pub api_version: String,
    /// Whether to verify the server's TLS certificate.
    pub verify_ssl: bool,
    /// Request timeout in seconds. `0` means unset.
    pub timeout: u64,
    /// Extra headers attached to every request.
    pub headers: HashMap<String, String>,
    /// `User-Agent` value for outgoing requests. Empty means unset.
    pub agent_tag: String,
    /// Settings file this configuration came from, if any.
    pub file_name: String,
    /// API client id.
    pub client_id: String,
    /// API client secret.
    pub client_secret: String,
    /// Authorization endpoint for interactive OAuth flows.
    pub auth_url: String,
    /// Loopback port for the interactive OAuth redirect.
    pub redirect_port: u16,
    /// Loopback path for the interactive OAuth redirect.
    pub redirect_path: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            verify_ssl: true,
            timeout: DEFAULT_TIMEOUT,
            headers: HashMap::new(),
            agent_tag: String::new(),
            file_name: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: String::new(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            redirect_path: DEFAULT_REDIRECT_PATH.to_string(),
        }
    }
}

impl ApiSettings {
    /// Resolve settings from an INI-style file.
    ///
    /// Reads the named `section` (default `"Looker"`) and maps recognized
    /// keys onto the default baseline. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, the
    /// section is missing, or a recognized key holds an unparseable value.
    pub fn from_ini_file(path: impl AsRef<Path>, section: Option<&str>) -> Result<Self, Error> {
        let path = path.as_ref();
        let parsed = Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Ini))
            .build()
            .map_err(ConfigError::File)?;

        let section = section.unwrap_or(DEFAULT_SECTION);
        let table = parsed.get_table(section).map_err(|_| ConfigError::MissingSection {
            section: section.to_string(),
        })?;

        let mut values = HashMap::new();
        for (key, value) in table {
            if let Ok(text) = value.into_string() {
                values.insert(key, unquote(&text).to_string());
            }
        }

        let mut settings = Self::from_map(&values)?;
        settings.file_name = path.to_string_lossy().into_owned();
        Ok(settings.finalize())
    }

    /// Resolve settings from `LOOKERSDK_*` environment variables.
    ///
    /// Variables that are absent leave the baseline default in place; an
    /// absent environment is not an error. Numeric or boolean variables
    /// that fail to parse are logged and ignored.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(value) = env_value("LOOKERSDK_BASE_URL") {
            settings.base_url = value;
        }
        if let Some(value) = env_value("LOOKERSDK_API_VERSION") {
            settings.api_version = value;
        }
        if let Some(value) = env_value("LOOKERSDK_VERIFY_SSL") {
            settings.verify_ssl = truthy(&value);
        }
        if let Some(value) = env_value("LOOKERSDK_TIMEOUT") {
            match value.parse() {
                Ok(seconds) => settings.timeout = seconds,
                Err(_) => warn!(%value, "ignoring unparseable LOOKERSDK_TIMEOUT"),
            }
        }
        if let Some(value) = env_value("LOOKERSDK_CLIENT_ID") {
            settings.client_id = value;
        }
        if let Some(value) = env_value("LOOKERSDK_CLIENT_SECRET") {
            settings.client_secret = value;
        }
        if let Some(value) = env_value("LOOKERSDK_AUTH_URL") {
            settings.auth_url = value;
        }
        if let Some(value) = env_value("LOOKERSDK_REDIRECT_PORT") {
            match value.parse() {
                Ok(port) => settings.redirect_port = port,
                Err(_) => warn!(%value, "ignoring unparseable LOOKERSDK_REDIRECT_PORT"),
            }
        }
        if let Some(value) = env_value("LOOKERSDK_REDIRECT_PATH") {
            settings.redirect_path = value;
        }

        settings.finalize()
    }

    /// Build settings from a parsed key/value map.
    fn from_map(values: &HashMap<String, String>) -> Result<Self, Error> {
        let mut settings = Self::default();

        if let Some(value) = values.get("base_url") {
            settings.base_url = value.clone();
        }
        if let Some(value) = values.get("api_version") {
            settings.api_version = value.clone();
        }
        if let Some(value) = values.get("verify_ssl") {
            settings.verify_ssl = truthy(value);
        }
        if let Some(value) = values.get("timeout") {
            settings.timeout = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "timeout",
                value: value.clone(),
            })?;
        }
        if let Some(value) = values.get("agent_tag") {
            settings.agent_tag = value.clone();
        }
        if let Some(value) = values.get("file_name") {
            settings.file_name = value.clone();
        }
        if let Some(value) = values.get("client_id") {
            settings.client_id = value.clone();
        }
        if let Some(value) = values.get("client_secret") {
            settings.client_secret = value.clone();
        }
        if let Some(value) = values.get("auth_url") {
            settings.auth_url = value.clone();
        }
        if let Some(value) = values.get("redirect_port") {
            settings.redirect_port = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "redirect_port",
                value: value.clone(),
            })?;
        }
        if let Some(value) = values.get("redirect_path") {
            settings.redirect_path = value.clone();
        }

        Ok(settings)
    }

    /// Apply derivations that depend on more than one field.
    fn finalize(mut self) -> Self {
        if self.auth_url.is_empty() && !self.base_url.is_empty() {
            self.auth_url = format!("{}/auth", self.base_url);
        }
        self
    }

    /// True when enough is configured to reach a server.
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_version.is_empty()
    }
}

// Hide the client secret in Debug output
impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("agent_tag", &self.agent_tag)
            .field("file_name", &self.file_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("redirect_port", &self.redirect_port)
            .field("redirect_path", &self.redirect_path)
            .finish()
    }
}

/// Parse truthy configuration strings: "true", "t", "1", "y", "yes",
/// case-insensitive. Anything else is false.
fn truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "t" | "1" | "y" | "yes"
    )
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Read an environment variable, treating empty values as absent.
fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let settings = ApiSettings::default();
        assert!(settings.verify_ssl);
        assert_eq!(settings.api_version, "4.0");
        assert_eq!(settings.timeout, 120);
        assert_eq!(settings.redirect_port, 8080);
        assert_eq!(settings.redirect_path, "/callback");
        assert!(!settings.is_configured());
    }

    #[test]
    fn truthy_strings() {
        for value in ["true", "TRUE", "t", "1", "y", "Yes"] {
            assert!(truthy(value), "{value} should be truthy");
        }
        for value in ["false", "0", "no", "", "totally"] {
            assert!(!truthy(value), "{value} should be falsy");
        }
    }

    #[test]
    fn unquote_strips_matching_quotes() {
        assert_eq!(unquote("\"https://example.looker.com\""), "https://example.looker.com");
        assert_eq!(unquote("'secret'"), "secret");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\"unbalanced"), "\"unbalanced");
    }

    #[test]
    fn from_ini_file_reads_looker_section() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(
            file,
            "[Looker]\n\
             base_url=https://example.looker.com:19999\n\
             client_id=id123\n\
             client_secret=\"hush\"\n\
             verify_ssl=false\n\
             timeout=30\n\
             not_a_real_key=ignored\n\
             [Other]\n\
             base_url=https://other.looker.com"
        )
        .unwrap();

        let settings = ApiSettings::from_ini_file(file.path(), None).unwrap();
        assert_eq!(settings.base_url, "https://example.looker.com:19999");
        assert_eq!(settings.client_id, "id123");
        assert_eq!(settings.client_secret, "hush");
        assert!(!settings.verify_ssl);
        assert_eq!(settings.timeout, 30);
        // derived because no explicit auth_url was provided
        assert_eq!(settings.auth_url, "https://example.looker.com:19999/auth");
        assert!(settings.is_configured());
    }

    #[test]
    fn from_ini_file_reads_named_section() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(
            file,
            "[Looker]\nbase_url=https://one.looker.com\n[Alt]\nbase_url=https://two.looker.com"
        )
        .unwrap();

        let settings = ApiSettings::from_ini_file(file.path(), Some("Alt")).unwrap();
        assert_eq!(settings.base_url, "https://two.looker.com");
    }

    #[test]
    fn from_ini_file_missing_file_is_config_error() {
        let result = ApiSettings::from_ini_file("/nonexistent/looker.ini", None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn from_ini_file_missing_section_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "[Other]\nbase_url=https://example.looker.com").unwrap();

        let result = ApiSettings::from_ini_file(file.path(), None);
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingSection { .. }))
        ));
    }

    #[test]
    fn from_ini_file_bad_timeout_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "[Looker]\nbase_url=https://example.looker.com\ntimeout=soon").unwrap();

        let result = ApiSettings::from_ini_file(file.path(), None);
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { key: "timeout", .. }))
        ));
    }

    #[test]
    fn from_ini_file_explicit_auth_url_wins() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(
            file,
            "[Looker]\nbase_url=https://example.looker.com\nauth_url=https://sso.example.com/grant"
        )
        .unwrap();

        let settings = ApiSettings::from_ini_file(file.path(), None).unwrap();
        assert_eq!(settings.auth_url, "https://sso.example.com/grant");
    }

    // Environment variables are process-global, so all env-based assertions
    // live in this single test to avoid races between parallel tests.
    #[test]
    fn from_env_overrides_only_present_variables() {
        unsafe {
            env::set_var("LOOKERSDK_BASE_URL", "https://env.looker.com");
            env::set_var("LOOKERSDK_VERIFY_SSL", "F");
            env::set_var("LOOKERSDK_TIMEOUT", "forever");
            env::remove_var("LOOKERSDK_API_VERSION");
            env::remove_var("LOOKERSDK_AUTH_URL");
        }

        let settings = ApiSettings::from_env();
        assert_eq!(settings.base_url, "https://env.looker.com");
        assert!(!settings.verify_ssl);
        // unparseable timeout falls back to the default
        assert_eq!(settings.timeout, 120);
        // absent version keeps the default
        assert_eq!(settings.api_version, "4.0");
        // derived from the env base URL
        assert_eq!(settings.auth_url, "https://env.looker.com/auth");

        unsafe {
            env::remove_var("LOOKERSDK_BASE_URL");
            env::remove_var("LOOKERSDK_VERIFY_SSL");
            env::remove_var("LOOKERSDK_TIMEOUT");
        }
    }

    #[test]
    fn debug_hides_client_secret() {
        let settings = ApiSettings {
            client_secret: "hunter2".to_string(),
            ..ApiSettings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
