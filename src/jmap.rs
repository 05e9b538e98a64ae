//! Thin JMAP (RFC 8620) client
//!
//! Fetches the session resource once and issues single-invocation method
//! calls against its `apiUrl`. Requests carry the bearer token; there are no
//! timeouts or retries at this layer.

use std::collections::HashMap;

use reqwest::{Client, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

/// Failures talking to the JMAP server
#[derive(Debug, Error)]
pub enum JmapError {
    #[error("HTTP request failed")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected the bearer token")]
    Unauthorized,
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed JMAP response")]
    Decode(#[from] serde_json::Error),
    #[error("invalid apiUrl in session: {0}")]
    ApiUrl(#[from] url::ParseError),
    #[error("{kind}{}", describe(.description))]
    Method {
        kind: String,
        description: Option<String>,
    },
    #[error("JMAP response contained no method responses")]
    EmptyResponse,
}

/// JMAP session resource
///
/// Only the members the bridge consults are decoded; unknown members are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Server capabilities keyed by URN
    pub capabilities: HashMap<String, Value>,
    /// Accounts visible to the credential, keyed by account id
    pub accounts: HashMap<String, Account>,
    /// Default account per capability URN
    #[serde(default)]
    pub primary_accounts: HashMap<String, String>,
    #[serde(default)]
    pub username: String,
    pub api_url: String,
    #[serde(default)]
    pub state: String,
}

impl Session {
    pub fn has_capability(&self, urn: &str) -> bool {
        self.capabilities.contains_key(urn)
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Account the server designates as default for `urn`
    pub fn primary_account(&self, urn: &str) -> Option<&str> {
        self.primary_accounts.get(urn).map(String::as_str)
    }
}

/// Per-account entry of the session resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub name: String,
    /// Required by RFC 8620; a session omitting it fails to decode
    pub is_read_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'a> {
    using: &'a [&'a str],
    method_calls: Vec<(&'a str, Value, &'a str)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Response {
    method_responses: Vec<(String, Value, String)>,
}

/// Authenticated handle on a JMAP API endpoint
#[derive(Debug, Clone)]
pub struct JmapClient {
    http: Client,
    api_url: Url,
    token: SecretString,
}

impl JmapClient {
    /// Build a client for a known API endpoint without contacting it
    pub fn new(api_url: Url, token: SecretString) -> Self {
        Self {
            http: Client::new(),
            api_url,
            token,
        }
    }

    /// Fetch the session resource and return a client bound to its `apiUrl`
    ///
    /// A relative `apiUrl` is resolved against the session URL.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` on HTTP 401/403
    /// - `Status` on any other non-success status
    /// - `Transport`, `Decode`, or `ApiUrl` for lower-level failures
    pub async fn connect(session_url: &Url, token: SecretString) -> Result<(Self, Session), JmapError> {
        let http = Client::new();
        let resp = http
            .get(session_url.clone())
            .bearer_auth(token.expose_secret())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let body = check_status(resp).await?;
        let session: Session = serde_json::from_str(&body)?;
        let api_url = session_url.join(&session.api_url)?;

        tracing::debug!(
            api_url = %api_url,
            username = %session.username,
            state = %session.state,
            capabilities = session.capabilities.len(),
            accounts = session.accounts.len(),
            "JMAP session fetched"
        );

        Ok((
            Self {
                http,
                api_url,
                token,
            },
            session,
        ))
    }

    /// Invoke a single JMAP method and return its response arguments
    ///
    /// # Errors
    ///
    /// Returns `Method` when the server answers with an `error` invocation.
    pub async fn call(&self, using: &[&str], method: &str, args: Value) -> Result<Value, JmapError> {
        let request = Request {
            using,
            method_calls: vec![(method, args, "c0")],
        };
        let resp = self
            .http
            .post(self.api_url.clone())
            .bearer_auth(self.token.expose_secret())
            .json(&request)
            .send()
            .await?;
        let body = check_status(resp).await?;
        let response: Response = serde_json::from_str(&body)?;

        let (name, args, _) = response
            .method_responses
            .into_iter()
            .next()
            .ok_or(JmapError::EmptyResponse)?;
        if name == "error" {
            return Err(method_error(&args));
        }
        tracing::debug!(method, response = %name, "JMAP method completed");
        Ok(args)
    }
}

/// Read the body of a response, mapping failure statuses
async fn check_status(resp: reqwest::Response) -> Result<String, JmapError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(JmapError::Unauthorized);
    }
    let body = resp.text().await?;
    if !status.is_success() {
        let body = body.chars().take(512).collect();
        return Err(JmapError::Status { status, body });
    }
    Ok(body)
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

fn method_error(args: &Value) -> JmapError {
    JmapError::Method {
        kind: args["type"].as_str().unwrap_or("serverFail").to_owned(),
        description: args["description"].as_str().map(str::to_owned),
    }
}

/// Arguments object carrying the mandatory `accountId`
pub fn account_args(account_id: &str) -> Value {
    json!({ "accountId": account_id })
}
