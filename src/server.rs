//! MCP serving surface and tool groups
//!
//! `JmapMcpServer` starts with an empty tool router. Tool groups are merged
//! in through [`ToolRegistrar`] once the capability decision is known, so the
//! advertised tool list always matches what the account can actually do.

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use serde_json::{Value, json};

use crate::capability::{CORE, MAIL, SUBMISSION};
use crate::errors::{AppError, AppResult};
use crate::jmap::{JmapClient, account_args};
use crate::models::{
    DestroyEmailsInput, GetEmailsInput, GetIdentitiesInput, GetMailboxesInput, GetThreadsInput,
    Meta, QueryEmailsInput, SendEmailInput, ToolEnvelope, UpdateEmailsInput,
};

const MAIL_USING: &[&str] = &[CORE, MAIL];
const SUBMISSION_USING: &[&str] = &[CORE, MAIL, SUBMISSION];

/// Maximum ids per query page
const MAX_QUERY_LIMIT: u32 = 100;
/// Maximum ids per get/set call
const MAX_IDS_PER_CALL: usize = 50;

/// Tool groups the registrar can attach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolGroup {
    /// Mail reading tools, plus write tools for read-write accounts
    Mail { read_only: bool },
    /// Message submission tools
    Submission,
}

/// Attaches tool groups to a serving surface
///
/// Each call is a one-shot side effect. Registering a group that is already
/// present does nothing.
pub trait ToolRegistrar {
    /// Attach mail tools; `read_only` accounts get only the non-mutating set
    fn register_mail(&mut self, read_only: bool);
    /// Attach message submission tools
    fn register_submission(&mut self);
}

/// JMAP MCP server
///
/// Holds the JMAP client and the active account. Every tool call targets
/// that account.
#[derive(Clone)]
pub struct JmapMcpServer {
    client: Arc<JmapClient>,
    account_id: String,
    groups: Vec<ToolGroup>,
    tool_router: ToolRouter<Self>,
}

impl JmapMcpServer {
    /// Create a server with no tools registered
    pub fn new(client: JmapClient, account_id: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            account_id: account_id.into(),
            groups: Vec::new(),
            tool_router: ToolRouter::new(),
        }
    }

    /// Groups registered so far, in registration order
    pub fn groups(&self) -> &[ToolGroup] {
        &self.groups
    }

    fn has_mail(&self) -> bool {
        self.groups
            .iter()
            .any(|g| matches!(g, ToolGroup::Mail { .. }))
    }

    async fn invoke(&self, using: &[&str], method: &str, args: Value) -> AppResult<Value> {
        Ok(self.client.call(using, method, args).await?)
    }

    fn args(&self) -> Value {
        account_args(&self.account_id)
    }
}

impl ToolRegistrar for JmapMcpServer {
    fn register_mail(&mut self, read_only: bool) {
        if self.has_mail() {
            return;
        }
        self.tool_router.merge(Self::mail_read_router());
        if !read_only {
            self.tool_router.merge(Self::mail_write_router());
        }
        self.groups.push(ToolGroup::Mail { read_only });
    }

    fn register_submission(&mut self) {
        if self.groups.contains(&ToolGroup::Submission) {
            return;
        }
        self.tool_router.merge(Self::submission_router());
        self.groups.push(ToolGroup::Submission);
    }
}

#[tool_router(router = mail_read_router)]
impl JmapMcpServer {
    /// Tool: List mailboxes
    #[tool(
        name = "mail_get_mailboxes",
        description = "List mailboxes (folders) with roles and counts"
    )]
    async fn get_mailboxes(
        &self,
        Parameters(input): Parameters<GetMailboxesInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.get_mailboxes_impl(input).await)
    }

    /// Tool: Query emails
    ///
    /// Returns matching email ids; fetch details with `mail_get_emails`.
    #[tool(
        name = "mail_query_emails",
        description = "Search emails and return matching ids"
    )]
    async fn query_emails(
        &self,
        Parameters(input): Parameters<QueryEmailsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.query_emails_impl(input).await)
    }

    /// Tool: Fetch emails by id
    #[tool(name = "mail_get_emails", description = "Get emails by id")]
    async fn get_emails(
        &self,
        Parameters(input): Parameters<GetEmailsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.get_emails_impl(input).await)
    }

    /// Tool: Fetch threads by id
    #[tool(
        name = "mail_get_threads",
        description = "Get threads (email id lists) by id"
    )]
    async fn get_threads(
        &self,
        Parameters(input): Parameters<GetThreadsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.get_threads_impl(input).await)
    }
}

#[tool_router(router = mail_write_router)]
impl JmapMcpServer {
    /// Tool: Patch emails
    ///
    /// Covers flagging, marking read, and moving between mailboxes.
    #[tool(
        name = "mail_update_emails",
        description = "Update email keywords or mailbox membership"
    )]
    async fn update_emails(
        &self,
        Parameters(input): Parameters<UpdateEmailsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.update_emails_impl(input).await)
    }

    /// Tool: Destroy emails
    ///
    /// Permanent; requires `confirm=true`.
    #[tool(name = "mail_destroy_emails", description = "Permanently delete emails")]
    async fn destroy_emails(
        &self,
        Parameters(input): Parameters<DestroyEmailsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.destroy_emails_impl(input).await)
    }
}

#[tool_router(router = submission_router)]
impl JmapMcpServer {
    /// Tool: List sending identities
    #[tool(
        name = "submission_get_identities",
        description = "List identities the account may send as"
    )]
    async fn get_identities(
        &self,
        Parameters(input): Parameters<GetIdentitiesInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.get_identities_impl(input).await)
    }

    /// Tool: Send an existing email
    ///
    /// Creates an `EmailSubmission` for a draft. Requires `confirm=true`.
    #[tool(
        name = "submission_send_email",
        description = "Send an existing draft email as the given identity"
    )]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.send_email_impl(input).await)
    }
}

/// Tool implementation methods
///
/// Each returns the summary line and the JMAP response arguments; the
/// `#[tool]` wrappers above handle envelopes and error mapping.
impl JmapMcpServer {
    async fn get_mailboxes_impl(&self, input: GetMailboxesInput) -> AppResult<(String, Value)> {
        if let Some(ids) = &input.ids {
            validate_ids(ids, "ids")?;
        }
        let mut args = self.args();
        args["ids"] = json!(input.ids);
        let data = self.invoke(MAIL_USING, "Mailbox/get", args).await?;
        Ok((format!("{} mailbox(es)", list_len(&data, "list")), data))
    }

    async fn query_emails_impl(&self, input: QueryEmailsInput) -> AppResult<(String, Value)> {
        let args = build_query_args(&self.account_id, &input)?;
        let data = self.invoke(MAIL_USING, "Email/query", args).await?;
        Ok((
            format!("{} email id(s) returned", list_len(&data, "ids")),
            data,
        ))
    }

    async fn get_emails_impl(&self, input: GetEmailsInput) -> AppResult<(String, Value)> {
        validate_ids(&input.ids, "ids")?;
        if !(256..=100_000).contains(&input.max_body_value_bytes) {
            return Err(AppError::invalid(
                "max_body_value_bytes must be in range 256..100000",
            ));
        }
        let mut args = self.args();
        args["ids"] = json!(input.ids);
        if let Some(properties) = &input.properties {
            args["properties"] = json!(properties);
        }
        if input.fetch_text_body {
            args["fetchTextBodyValues"] = json!(true);
            args["maxBodyValueBytes"] = json!(input.max_body_value_bytes);
        }
        let data = self.invoke(MAIL_USING, "Email/get", args).await?;
        Ok((
            format!("{} email(s) retrieved", list_len(&data, "list")),
            data,
        ))
    }

    async fn get_threads_impl(&self, input: GetThreadsInput) -> AppResult<(String, Value)> {
        validate_ids(&input.ids, "ids")?;
        let mut args = self.args();
        args["ids"] = json!(input.ids);
        let data = self.invoke(MAIL_USING, "Thread/get", args).await?;
        Ok((
            format!("{} thread(s) retrieved", list_len(&data, "list")),
            data,
        ))
    }

    async fn update_emails_impl(&self, input: UpdateEmailsInput) -> AppResult<(String, Value)> {
        validate_update(&input)?;
        let mut args = self.args();
        args["update"] = json!(input.update);
        let data = self.invoke(MAIL_USING, "Email/set", args).await?;
        let summary = format!(
            "{} email(s) updated, {} failed",
            map_len(&data, "updated"),
            map_len(&data, "notUpdated")
        );
        Ok((summary, data))
    }

    async fn destroy_emails_impl(&self, input: DestroyEmailsInput) -> AppResult<(String, Value)> {
        require_confirm(input.confirm)?;
        validate_ids(&input.ids, "ids")?;
        let mut args = self.args();
        args["destroy"] = json!(input.ids);
        let data = self.invoke(MAIL_USING, "Email/set", args).await?;
        let summary = format!(
            "{} email(s) destroyed, {} failed",
            list_len(&data, "destroyed"),
            map_len(&data, "notDestroyed")
        );
        Ok((summary, data))
    }

    async fn get_identities_impl(&self, input: GetIdentitiesInput) -> AppResult<(String, Value)> {
        if let Some(ids) = &input.ids {
            validate_ids(ids, "ids")?;
        }
        let mut args = self.args();
        args["ids"] = json!(input.ids);
        let data = self.invoke(SUBMISSION_USING, "Identity/get", args).await?;
        Ok((
            format!("{} identity(ies)", list_len(&data, "list")),
            data,
        ))
    }

    async fn send_email_impl(&self, input: SendEmailInput) -> AppResult<(String, Value)> {
        require_confirm(input.confirm)?;
        validate_id(&input.email_id, "email_id")?;
        validate_id(&input.identity_id, "identity_id")?;
        let mut args = self.args();
        args["create"] = json!({
            "send": { "emailId": input.email_id, "identityId": input.identity_id }
        });
        let data = self
            .invoke(SUBMISSION_USING, "EmailSubmission/set", args)
            .await?;
        if let Some(err) = data["notCreated"].get("send") {
            return Err(AppError::Jmap(format!(
                "submission rejected: {}",
                err["type"].as_str().unwrap_or("unknown")
            )));
        }
        Ok(("Email submitted".to_owned(), data))
    }
}

/// MCP server handler implementation
#[tool_handler(router = self.tool_router)]
impl ServerHandler for JmapMcpServer {
    fn get_info(&self) -> ServerInfo {
        let groups = self
            .groups
            .iter()
            .map(|g| match g {
                ToolGroup::Mail { read_only: true } => "mail (read-only)",
                ToolGroup::Mail { read_only: false } => "mail",
                ToolGroup::Submission => "submission",
            })
            .collect::<Vec<_>>()
            .join(", ");
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(format!(
                "JMAP MCP server for account {}. Enabled tool groups: {groups}.",
                self.account_id
            ))
            .with_server_info(Implementation::new(
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
            ))
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "tool call failed");
            Err(e.to_error_data())
        }
    }
}

/// Assemble `Email/query` arguments, newest first unless `sort` is given
fn build_query_args(account_id: &str, input: &QueryEmailsInput) -> AppResult<Value> {
    if !(1..=MAX_QUERY_LIMIT).contains(&input.limit) {
        return Err(AppError::InvalidInput(format!(
            "limit must be in range 1..{MAX_QUERY_LIMIT}"
        )));
    }
    if let Some(filter) = &input.filter
        && !filter.is_object()
    {
        return Err(AppError::invalid("filter must be a JSON object"));
    }
    let mut args = account_args(account_id);
    args["filter"] = input.filter.clone().unwrap_or(Value::Null);
    args["sort"] = match &input.sort {
        Some(sort) => json!(sort),
        None => json!([{ "property": "receivedAt", "isAscending": false }]),
    };
    args["position"] = json!(input.position);
    args["limit"] = json!(input.limit);
    args["collapseThreads"] = json!(input.collapse_threads);
    args["calculateTotal"] = json!(true);
    Ok(args)
}

/// Validate JMAP `Id` syntax (RFC 8620 §1.2)
fn validate_id(id: &str, field: &str) -> AppResult<()> {
    if id.is_empty() || id.len() > 255 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be 1..255 characters"
        )));
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(AppError::InvalidInput(format!(
            "{field} must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

fn validate_ids(ids: &[String], field: &str) -> AppResult<()> {
    if ids.is_empty() || ids.len() > MAX_IDS_PER_CALL {
        return Err(AppError::InvalidInput(format!(
            "{field} must contain 1..{MAX_IDS_PER_CALL} ids"
        )));
    }
    ids.iter().try_for_each(|id| validate_id(id, field))
}

fn validate_update(input: &UpdateEmailsInput) -> AppResult<()> {
    if input.update.is_empty() || input.update.len() > MAX_IDS_PER_CALL {
        return Err(AppError::InvalidInput(format!(
            "update must contain 1..{MAX_IDS_PER_CALL} entries"
        )));
    }
    for (id, patch) in &input.update {
        validate_id(id, "update")?;
        let Some(patch) = patch.as_object() else {
            return Err(AppError::invalid("each update value must be a patch object"));
        };
        if let Some(key) = patch
            .keys()
            .find(|k| !(k.starts_with("keywords") || k.starts_with("mailboxIds")))
        {
            return Err(AppError::InvalidInput(format!(
                "patch key '{key}' is not allowed; only keywords and mailboxIds may change"
            )));
        }
    }
    Ok(())
}

fn require_confirm(confirm: bool) -> AppResult<()> {
    if confirm {
        Ok(())
    } else {
        Err(AppError::invalid("confirm=true is required"))
    }
}

fn list_len(data: &Value, key: &str) -> usize {
    data[key].as_array().map_or(0, Vec::len)
}

fn map_len(data: &Value, key: &str) -> usize {
    data[key].as_object().map_or(0, serde_json::Map::len)
}
