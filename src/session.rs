//! Session negotiation
//!
//! Opens the JMAP session with the configured credential and settles on the
//! account the bridge will operate against for the rest of its lifetime.

use std::future::Future;

use secrecy::SecretString;
use url::Url;

use crate::capability::MAIL;
use crate::config::RuntimeConfig;
use crate::errors::{BootstrapError, CapabilityError, ConnectionError};
use crate::jmap::{JmapClient, JmapError, Session};

/// The account selected for this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub is_read_only: bool,
}

/// Source of JMAP sessions
///
/// Production code uses [`JmapConnector`]; tests substitute canned sessions.
pub trait SessionConnector {
    type Client;

    fn connect(
        &self,
        session_url: &Url,
        token: SecretString,
    ) -> impl Future<Output = Result<(Self::Client, Session), JmapError>> + Send;
}

/// Connector backed by [`JmapClient::connect`]
#[derive(Debug, Default, Clone, Copy)]
pub struct JmapConnector;

impl SessionConnector for JmapConnector {
    type Client = JmapClient;

    async fn connect(
        &self,
        session_url: &Url,
        token: SecretString,
    ) -> Result<(JmapClient, Session), JmapError> {
        JmapClient::connect(session_url, token).await
    }
}

/// Result of a successful negotiation
#[derive(Debug)]
pub struct Negotiated<C> {
    pub client: C,
    pub session: Session,
    pub account: AccountInfo,
}

/// Open the session and resolve the active account
///
/// An explicit account id must exist in the session. Without one, the
/// server's primary mail account is used.
///
/// # Errors
///
/// - `ConnectionError::SessionFailed` if the session resource cannot be fetched
/// - `CapabilityError::UnknownAccount` if the configured account is absent
/// - `CapabilityError::MailUnsupported` if no account was configured and the
///   server does not offer mail at all
/// - `ConnectionError::NoPrimaryAccount` if mail is offered but no primary
///   mail account is designated
pub async fn negotiate<C>(
    config: RuntimeConfig,
    connector: &C,
) -> Result<Negotiated<C::Client>, BootstrapError>
where
    C: SessionConnector,
{
    tracing::info!(url = %config.session_url, "opening JMAP session");
    let (client, session) = connector
        .connect(&config.session_url, config.bearer_token)
        .await
        .map_err(ConnectionError::SessionFailed)?;

    let account = select_account(&session, config.account_id.as_deref())?;
    tracing::info!(
        account_id = %account.id,
        name = %account.name,
        read_only = account.is_read_only,
        "active account selected"
    );

    Ok(Negotiated {
        client,
        session,
        account,
    })
}

/// Pick the active account from the session's account table
pub fn select_account(session: &Session, hint: Option<&str>) -> Result<AccountInfo, BootstrapError> {
    let id = match hint {
        Some(id) => id,
        None => match session.primary_account(MAIL) {
            Some(id) => id,
            None if !session.has_capability(MAIL) => {
                return Err(CapabilityError::MailUnsupported.into());
            }
            None => return Err(ConnectionError::NoPrimaryAccount.into()),
        },
    };

    let account = session
        .account(id)
        .ok_or_else(|| CapabilityError::UnknownAccount(id.to_owned()))?;

    Ok(AccountInfo {
        id: id.to_owned(),
        name: account.name.clone(),
        is_read_only: account.is_read_only,
    })
}
