//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps the JMAP response arguments with a human-readable summary and
/// execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Input: fetch mailboxes
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetMailboxesInput {
    /// Mailbox ids to fetch; all mailboxes when omitted
    pub ids: Option<Vec<String>>,
}

/// Input: query emails
///
/// `filter` and `sort` are passed through as JMAP `FilterCondition` /
/// `Comparator` objects.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryEmailsInput {
    /// JMAP `Email/query` filter, e.g. `{"inMailbox": "..", "text": "invoice"}`
    pub filter: Option<Value>,
    /// JMAP comparators; defaults to newest first
    pub sort: Option<Vec<Value>>,
    /// Zero-based offset into the result list
    #[serde(default)]
    pub position: u32,
    /// Maximum ids to return (1..100, default 25)
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Collapse results to one email per thread
    #[serde(default)]
    pub collapse_threads: bool,
}

/// Input: fetch emails by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetEmailsInput {
    /// Email ids (1..50)
    pub ids: Vec<String>,
    /// Properties to return; server default set when omitted
    pub properties: Option<Vec<String>>,
    /// Include text body values (truncated to `max_body_value_bytes`)
    #[serde(default)]
    pub fetch_text_body: bool,
    /// Maximum bytes per body value (256..100000, default 4096)
    #[serde(default = "default_max_body_value_bytes")]
    pub max_body_value_bytes: u32,
}

/// Input: fetch threads by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetThreadsInput {
    /// Thread ids (1..50)
    pub ids: Vec<String>,
}

/// Input: patch emails
///
/// Keys are email ids; values are JMAP patch objects such as
/// `{"keywords/$seen": true}` or `{"mailboxIds/<id>": true}`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateEmailsInput {
    /// Email id → patch object (1..50 entries)
    pub update: BTreeMap<String, Value>,
}

/// Input: destroy emails
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DestroyEmailsInput {
    /// Email ids to destroy permanently (1..50)
    pub ids: Vec<String>,
    /// Explicit confirmation required
    pub confirm: bool,
}

/// Input: fetch sending identities
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetIdentitiesInput {
    /// Identity ids to fetch; all identities when omitted
    pub ids: Option<Vec<String>>,
}

/// Input: submit an existing email for delivery
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendEmailInput {
    /// Id of the (draft) email to send
    pub email_id: String,
    /// Identity to send as
    pub identity_id: String,
    /// Explicit confirmation required
    pub confirm: bool,
}

fn default_limit() -> u32 {
    25
}

fn default_max_body_value_bytes() -> u32 {
    4_096
}
