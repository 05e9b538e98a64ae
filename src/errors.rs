//! Error model for bootstrap failures and tool execution
//!
//! Bootstrap errors (`ConfigError`, `ConnectionError`, `CapabilityError`) are
//! always fatal and surface once, at the driver boundary. `AppError` covers
//! failures inside tool calls and maps each variant to an MCP `ErrorData`.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

use crate::jmap::JmapError;

/// Configuration could not be resolved from the environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A mandatory value is absent (or blank)
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A value is present but malformed
    #[error("invalid environment variable {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// The JMAP session could not be established
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Transport, authentication, or decoding failure fetching the session
    #[error("failed to open JMAP session")]
    SessionFailed(#[source] JmapError),
    /// No account hint and the server designates no primary mail account
    #[error("server designates no primary mail account; set JMAP_ACCOUNT_ID")]
    NoPrimaryAccount,
}

/// The negotiated session cannot support the bridge
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// Mail capability is not advertised by the server
    #[error("server does not advertise the mail capability ({})", crate::capability::MAIL)]
    MailUnsupported,
    /// The configured account id is not present in the session
    #[error("account '{0}' is not present in the JMAP session")]
    UnknownAccount(String),
}

/// Any fatal failure before the bridge reaches its serving state
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error("connection error")]
    Connection(#[from] ConnectionError),
    #[error("capability error")]
    Capability(#[from] CapabilityError),
    /// The stdio transport failed to start
    #[error("serving failed: {0}")]
    Serve(String),
}

impl BootstrapError {
    /// Render the error and its full source chain for the operator
    ///
    /// The first line names the failure class; every `source()` link follows
    /// on its own `caused by:` line.
    pub fn diagnostic(&self) -> String {
        let mut out = format!("error: {self}");
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

/// Top-level outcome of a process run
///
/// Bootstrap failures happen before serving begins; `Session` covers the
/// stdio service terminating abnormally after it was up.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("MCP session terminated abnormally: {0}")]
    Session(String),
}

impl RunError {
    /// Short label used when logging the failure
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bootstrap(_) => "bootstrap failed",
            Self::Session(_) => "MCP session failed after serving started",
        }
    }

    /// Operator-facing report; bootstrap errors include their cause chain
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Bootstrap(err) => err.diagnostic(),
            Self::Session(_) => format!("error: {self}"),
        }
    }
}

/// Tool execution error type
///
/// Covers failures inside MCP tool calls once the bridge is serving. Each
/// variant maps to an appropriate MCP error code in [`ErrorData`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (mailbox, email, identity)
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication failure reported by the JMAP server
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// JMAP method-level error (`["error", {...}, id]` response)
    #[error("jmap method error: {0}")]
    Jmap(String),
    /// Internal error (unexpected failure, transport error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `NotFound` → `resource_not_found`
    /// - `AuthFailed` → `invalid_request`
    /// - `Jmap` → `invalid_request`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::NotFound(msg) => {
                ErrorData::resource_not_found(msg.clone(), Some(json!({ "code": "not_found" })))
            }
            Self::AuthFailed(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "auth_failed" })))
            }
            Self::Jmap(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "jmap_error" })))
            }
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }
}

impl From<JmapError> for AppError {
    fn from(err: JmapError) -> Self {
        match err {
            JmapError::Unauthorized => Self::AuthFailed(err.to_string()),
            JmapError::Method { ref kind, .. } if kind == "notFound" || kind == "accountNotFound" => {
                Self::NotFound(err.to_string())
            }
            JmapError::Method { .. } => Self::Jmap(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Type alias for fallible tool-side return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::{
        AppError, BootstrapError, CapabilityError, ConfigError, ConnectionError, RunError,
    };
    use crate::jmap::JmapError;

    #[test]
    fn diagnostic_includes_every_cause() {
        let err = BootstrapError::from(ConnectionError::SessionFailed(JmapError::Unauthorized));
        let text = err.diagnostic();
        assert!(text.starts_with("error: connection error"));
        assert!(text.contains("caused by: failed to open JMAP session"));
        assert!(text.contains("caused by: server rejected the bearer token"));
    }

    #[test]
    fn diagnostic_names_missing_capability() {
        let err = BootstrapError::from(CapabilityError::MailUnsupported);
        assert!(err.diagnostic().contains("urn:ietf:params:jmap:mail"));
    }

    #[test]
    fn diagnostic_names_missing_variable() {
        let err = BootstrapError::from(ConfigError::Missing("JMAP_BEARER_TOKEN"));
        assert!(err.diagnostic().contains("JMAP_BEARER_TOKEN"));
    }

    #[test]
    fn session_failure_after_serving_is_not_reported_as_bootstrap() {
        let err = RunError::Session("task panicked".to_owned());
        assert_eq!(err.label(), "MCP session failed after serving started");
        assert!(!err.diagnostic().contains("bootstrap"));
        assert!(err.diagnostic().contains("task panicked"));

        let err = RunError::from(BootstrapError::from(CapabilityError::MailUnsupported));
        assert_eq!(err.label(), "bootstrap failed");
        assert!(err.diagnostic().contains("caused by:"));
    }

    #[test]
    fn jmap_method_errors_map_by_kind() {
        let not_found = AppError::from(JmapError::Method {
            kind: "accountNotFound".to_owned(),
            description: None,
        });
        assert!(matches!(not_found, AppError::NotFound(_)));

        let other = AppError::from(JmapError::Method {
            kind: "invalidArguments".to_owned(),
            description: Some("bad filter".to_owned()),
        });
        assert!(matches!(other, AppError::Jmap(_)));
        assert!(other.to_string().contains("bad filter"));
    }
}
