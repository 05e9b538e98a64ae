//! Capability gate
//!
//! Decides which tool groups the bridge exposes from the negotiated session
//! and the active account. Pure: the same inputs always give the same
//! decision, and nothing here talks to the network.

use crate::errors::CapabilityError;
use crate::jmap::Session;
use crate::session::AccountInfo;

/// JMAP core capability URN (RFC 8620)
pub const CORE: &str = "urn:ietf:params:jmap:core";
/// JMAP mail capability URN (RFC 8621)
pub const MAIL: &str = "urn:ietf:params:jmap:mail";
/// JMAP message submission capability URN (RFC 8621)
pub const SUBMISSION: &str = "urn:ietf:params:jmap:submission";

/// Why submission tools were not registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithheldReason {
    /// Server does not advertise the submission capability
    NotAdvertised,
    /// Active account is read-only
    ReadOnlyAccount,
}

/// Tool groups enabled for this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDecision {
    pub register_mail: bool,
    pub register_submission: bool,
    /// Set exactly when `register_submission` is false
    pub submission_withheld: Option<WithheldReason>,
}

impl CapabilityDecision {
    /// Human-readable notices describing the decision
    pub fn notices(&self, account: &AccountInfo) -> Vec<String> {
        let mut out = Vec::with_capacity(2);
        if self.register_mail {
            let mode = if account.is_read_only {
                "read-only"
            } else {
                "read-write"
            };
            out.push(format!(
                "mail tools enabled for account {} ({mode})",
                account.id
            ));
        }
        match self.submission_withheld {
            None if self.register_submission => {
                out.push(format!("submission tools enabled for account {}", account.id));
            }
            Some(WithheldReason::NotAdvertised) => out.push(format!(
                "submission tools disabled: server does not advertise {SUBMISSION}"
            )),
            Some(WithheldReason::ReadOnlyAccount) => out.push(format!(
                "submission tools disabled: account {} is read-only",
                account.id
            )),
            None => {}
        }
        out
    }
}

/// Decide which tool groups may be registered
///
/// Mail support is mandatory. Submission requires both the submission
/// capability and a writable account; missing either only withholds the
/// submission group.
///
/// # Errors
///
/// Returns `MailUnsupported` when the mail capability is absent, regardless
/// of the account's access mode.
pub fn decide(
    session: &Session,
    account: &AccountInfo,
) -> Result<CapabilityDecision, CapabilityError> {
    if !session.has_capability(MAIL) {
        return Err(CapabilityError::MailUnsupported);
    }

    let submission_withheld = if !session.has_capability(SUBMISSION) {
        Some(WithheldReason::NotAdvertised)
    } else if account.is_read_only {
        Some(WithheldReason::ReadOnlyAccount)
    } else {
        None
    };

    Ok(CapabilityDecision {
        register_mail: true,
        register_submission: submission_withheld.is_none(),
        submission_withheld,
    })
}
