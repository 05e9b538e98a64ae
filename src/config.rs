//! Runtime configuration for the JMAP connection
//!
//! Exactly three values are read from the environment:
//!
//! - `JMAP_SESSION_URL`: absolute `http(s)` URL of the JMAP session resource
//! - `JMAP_BEARER_TOKEN`: bearer credential sent with every request
//! - `JMAP_ACCOUNT_ID`: optional account id; the server's primary mail
//!   account is used when unset

use std::env;
use std::env::VarError;

use secrecy::SecretString;
use url::Url;

use crate::errors::ConfigError;

pub const SESSION_URL_VAR: &str = "JMAP_SESSION_URL";
pub const BEARER_TOKEN_VAR: &str = "JMAP_BEARER_TOKEN";
pub const ACCOUNT_ID_VAR: &str = "JMAP_ACCOUNT_ID";

/// Validated connection settings
///
/// Created once at process start and never mutated. The token is stored as a
/// `SecretString` so it cannot leak through `Debug` or tracing output.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// JMAP session resource endpoint
    pub session_url: Url,
    /// Bearer credential
    pub bearer_token: SecretString,
    /// Explicit account to operate on, if configured
    pub account_id: Option<String>,
}

impl RuntimeConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `Missing` when the session URL or token is unset or blank, and
    /// `Invalid` when a value is present but unusable.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match env::var(key) {
            Ok(v) => Ok(Some(v)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(ConfigError::Invalid {
                name: key,
                reason: "contains non-unicode data".to_owned(),
            }),
        })
    }

    /// Resolve configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<Option<String>, ConfigError>,
    {
        let raw_url = required(&lookup, SESSION_URL_VAR)?;
        let token = required(&lookup, BEARER_TOKEN_VAR)?;
        let account_id = optional(&lookup, ACCOUNT_ID_VAR)?;

        Ok(Self {
            session_url: parse_session_url(&raw_url)?,
            bearer_token: SecretString::new(token.into()),
            account_id,
        })
    }
}

/// Read a mandatory value; blank counts as missing
fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&'static str) -> Result<Option<String>, ConfigError>,
{
    match lookup(key)? {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional<F>(lookup: &F, key: &'static str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&'static str) -> Result<Option<String>, ConfigError>,
{
    Ok(lookup(key)?
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty()))
}

/// Parse the session endpoint as an absolute `http`/`https` URL
fn parse_session_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name: SESSION_URL_VAR,
        reason: format!("not an absolute URL: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::Invalid {
                name: SESSION_URL_VAR,
                reason: format!("unsupported scheme '{other}'"),
            });
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            name: SESSION_URL_VAR,
            reason: "URL has no host".to_owned(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::{ACCOUNT_ID_VAR, BEARER_TOKEN_VAR, RuntimeConfig, SESSION_URL_VAR};
    use crate::errors::ConfigError;

    fn resolve(vars: &[(&'static str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, (*v).to_owned())).collect();
        RuntimeConfig::from_lookup(|key| Ok(map.get(key).cloned()))
    }

    #[test]
    fn resolves_all_three_values() {
        let config = resolve(&[
            (SESSION_URL_VAR, "https://api.fastmail.com/jmap/session"),
            (BEARER_TOKEN_VAR, " token-123 "),
            (ACCOUNT_ID_VAR, "u1234"),
        ])
        .expect("config must resolve");
        assert_eq!(config.session_url.as_str(), "https://api.fastmail.com/jmap/session");
        assert_eq!(config.bearer_token.expose_secret(), "token-123");
        assert_eq!(config.account_id.as_deref(), Some("u1234"));
    }

    #[test]
    fn account_id_is_optional_and_blank_means_absent() {
        let config = resolve(&[
            (SESSION_URL_VAR, "https://jmap.example.com/.well-known/jmap"),
            (BEARER_TOKEN_VAR, "t"),
            (ACCOUNT_ID_VAR, "   "),
        ])
        .expect("config must resolve");
        assert_eq!(config.account_id, None);
    }

    #[test]
    fn missing_session_url_is_reported_by_name() {
        let err = resolve(&[(BEARER_TOKEN_VAR, "t")]).expect_err("must fail");
        assert_eq!(err, ConfigError::Missing(SESSION_URL_VAR));
    }

    #[test]
    fn missing_or_blank_token_is_reported_by_name() {
        let url = "https://jmap.example.com/session";
        let err = resolve(&[(SESSION_URL_VAR, url)]).expect_err("must fail");
        assert_eq!(err, ConfigError::Missing(BEARER_TOKEN_VAR));

        let err = resolve(&[(SESSION_URL_VAR, url), (BEARER_TOKEN_VAR, "")]).expect_err("must fail");
        assert_eq!(err, ConfigError::Missing(BEARER_TOKEN_VAR));
    }

    #[test]
    fn relative_or_non_http_urls_are_invalid() {
        for bad in ["/jmap/session", "not a url", "ftp://jmap.example.com/session"] {
            let err = resolve(&[(SESSION_URL_VAR, bad), (BEARER_TOKEN_VAR, "t")])
                .expect_err("must fail");
            assert!(
                matches!(err, ConfigError::Invalid { name, .. } if name == SESSION_URL_VAR),
                "unexpected error for {bad}: {err:?}"
            );
        }
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = resolve(&[
            (SESSION_URL_VAR, "https://jmap.example.com/session"),
            (BEARER_TOKEN_VAR, "super-secret-token"),
        ])
        .expect("config must resolve");
        assert!(!format!("{config:?}").contains("super-secret-token"));
    }
}
