//! Startup sequence
//!
//! Config → session → capability decision → tool registration → serving.
//! Each step consumes the previous step's output; any failure ends the
//! sequence in [`Phase::Failed`] and is returned to the caller unchanged.

use rmcp::ServiceExt;
use rmcp::transport::stdio;

use crate::capability::{self, CapabilityDecision};
use crate::config::RuntimeConfig;
use crate::errors::{BootstrapError, ConfigError, RunError};
use crate::server::{JmapMcpServer, ToolRegistrar};
use crate::session::{self, AccountInfo, JmapConnector, SessionConnector};

/// Bootstrap state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ConfigResolved,
    SessionNegotiated,
    CapabilityDecided,
    ToolsRegistered,
    Serving,
    Failed,
}

/// Everything needed to build the serving surface
#[derive(Debug)]
pub struct Prepared<C> {
    pub client: C,
    pub account: AccountInfo,
    pub decision: CapabilityDecision,
}

/// Drives the startup sequence and records the current phase
#[derive(Debug)]
pub struct Driver {
    phase: Phase,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Self {
        Self { phase: Phase::Init }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, next: Phase) {
        tracing::debug!(from = ?self.phase, to = ?next, "bootstrap phase");
        self.phase = next;
    }

    fn fail<E: Into<BootstrapError>>(&mut self, err: E) -> BootstrapError {
        self.advance(Phase::Failed);
        err.into()
    }

    /// Resolve config, negotiate the session, and decide tool groups
    ///
    /// `resolve` runs before any network activity, so a configuration error
    /// never reaches the connector.
    pub async fn prepare<R, C>(
        &mut self,
        resolve: R,
        connector: &C,
    ) -> Result<Prepared<C::Client>, BootstrapError>
    where
        R: FnOnce() -> Result<RuntimeConfig, ConfigError>,
        C: SessionConnector,
    {
        let config = resolve().map_err(|e| self.fail(e))?;
        self.advance(Phase::ConfigResolved);

        let negotiated = session::negotiate(config, connector)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(Phase::SessionNegotiated);

        let decision = capability::decide(&negotiated.session, &negotiated.account)
            .map_err(|e| self.fail(e))?;
        self.advance(Phase::CapabilityDecided);

        for notice in decision.notices(&negotiated.account) {
            tracing::info!("{notice}");
        }

        Ok(Prepared {
            client: negotiated.client,
            account: negotiated.account,
            decision,
        })
    }

    /// Apply the decision: mail first, then submission
    pub fn register<T: ToolRegistrar>(
        &mut self,
        registrar: &mut T,
        decision: &CapabilityDecision,
        account: &AccountInfo,
    ) {
        if decision.register_mail {
            registrar.register_mail(account.is_read_only);
        }
        if decision.register_submission {
            registrar.register_submission();
        }
        self.advance(Phase::ToolsRegistered);
    }

    /// Serve `server` over stdio until the client disconnects
    ///
    /// Failing to start the transport is a bootstrap failure; an abnormal end
    /// after `Serving` is reported as `RunError::Session`.
    pub async fn serve(&mut self, server: JmapMcpServer) -> Result<(), RunError> {
        let service = server
            .serve(stdio())
            .await
            .map_err(|e| self.fail(BootstrapError::Serve(e.to_string())))?;
        self.advance(Phase::Serving);
        tracing::info!("serving MCP over stdio");

        let reason = service
            .waiting()
            .await
            .map_err(|e| RunError::Session(e.to_string()))?;
        tracing::info!(?reason, "MCP session ended");
        Ok(())
    }
}

/// Run the bridge with configuration from the process environment
pub async fn run() -> Result<(), RunError> {
    let mut driver = Driver::new();
    let prepared = driver
        .prepare(RuntimeConfig::load_from_env, &JmapConnector)
        .await?;

    let mut server = JmapMcpServer::new(prepared.client, prepared.account.id.clone());
    driver.register(&mut server, &prepared.decision, &prepared.account);
    driver.serve(server).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use secrecy::SecretString;
    use url::Url;

    use mockito::Server;

    use super::{Driver, Phase};
    use crate::capability::tests::session_with;
    use crate::capability::{CORE, MAIL, SUBMISSION};
    use crate::config::{ACCOUNT_ID_VAR, BEARER_TOKEN_VAR, RuntimeConfig, SESSION_URL_VAR};
    use crate::errors::{BootstrapError, CapabilityError, ConfigError, ConnectionError};
    use crate::jmap::{JmapError, Session};
    use crate::server::{JmapMcpServer, ToolGroup, ToolRegistrar};
    use crate::session::{JmapConnector, SessionConnector};

    /// Returns a canned session, or fails, and counts attempts
    struct MockConnector {
        session: Option<Session>,
        calls: AtomicUsize,
    }

    impl MockConnector {
        fn returning(session: Session) -> Self {
            Self {
                session: Some(session),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                session: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SessionConnector for MockConnector {
        type Client = ();

        async fn connect(
            &self,
            _session_url: &Url,
            _token: SecretString,
        ) -> Result<((), Session), JmapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.session {
                Some(session) => Ok(((), session.clone())),
                None => Err(JmapError::Unauthorized),
            }
        }
    }

    #[derive(Default)]
    struct RecordingRegistrar {
        calls: Vec<String>,
    }

    impl ToolRegistrar for RecordingRegistrar {
        fn register_mail(&mut self, read_only: bool) {
            self.calls.push(format!("mail(read_only={read_only})"));
        }

        fn register_submission(&mut self) {
            self.calls.push("submission".to_owned());
        }
    }

    fn env(
        vars: &[(&'static str, &str)],
    ) -> impl FnOnce() -> Result<RuntimeConfig, ConfigError> + use<> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, (*v).to_owned())).collect();
        move || RuntimeConfig::from_lookup(|key| Ok(map.get(key).cloned()))
    }

    fn full_env() -> impl FnOnce() -> Result<RuntimeConfig, ConfigError> {
        env(&[
            (SESSION_URL_VAR, "https://jmap.example.com/.well-known/jmap"),
            (BEARER_TOKEN_VAR, "token"),
        ])
    }

    #[tokio::test]
    async fn read_write_account_gets_both_groups_in_order() {
        let connector = MockConnector::returning(session_with(&[CORE, MAIL, SUBMISSION], false));
        let mut driver = Driver::new();
        let prepared = driver
            .prepare(full_env(), &connector)
            .await
            .expect("bootstrap must succeed");
        assert_eq!(driver.phase(), Phase::CapabilityDecided);

        let mut registrar = RecordingRegistrar::default();
        driver.register(&mut registrar, &prepared.decision, &prepared.account);
        assert_eq!(registrar.calls, ["mail(read_only=false)", "submission"]);
        assert_eq!(driver.phase(), Phase::ToolsRegistered);
    }

    #[tokio::test]
    async fn read_only_account_gets_read_only_mail_tools_only() {
        let connector = MockConnector::returning(session_with(&[CORE, MAIL, SUBMISSION], true));
        let mut driver = Driver::new();
        let prepared = driver
            .prepare(full_env(), &connector)
            .await
            .expect("bootstrap must succeed");

        let mut registrar = RecordingRegistrar::default();
        driver.register(&mut registrar, &prepared.decision, &prepared.account);
        assert_eq!(registrar.calls, ["mail(read_only=true)"]);

        let notices = prepared.decision.notices(&prepared.account);
        assert!(notices.iter().any(|n| n.contains("account A1 is read-only")));
    }

    #[tokio::test]
    async fn missing_mail_capability_fails_before_registration() {
        let connector = MockConnector::returning(session_with(&[CORE, SUBMISSION], false));
        let mut driver = Driver::new();
        let err = driver
            .prepare(full_env(), &connector)
            .await
            .expect_err("bootstrap must fail");
        assert!(matches!(
            err,
            BootstrapError::Capability(CapabilityError::MailUnsupported)
        ));
        assert!(err.diagnostic().contains(MAIL));
        assert_eq!(driver.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn missing_credential_fails_without_network_call() {
        let connector = MockConnector::returning(session_with(&[CORE, MAIL], false));
        let mut driver = Driver::new();
        let err = driver
            .prepare(
                env(&[(SESSION_URL_VAR, "https://jmap.example.com/session")]),
                &connector,
            )
            .await
            .expect_err("bootstrap must fail");
        assert!(matches!(
            err,
            BootstrapError::Config(ConfigError::Missing(BEARER_TOKEN_VAR))
        ));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(driver.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn session_failure_is_wrapped_with_cause() {
        let connector = MockConnector::failing();
        let mut driver = Driver::new();
        let err = driver
            .prepare(full_env(), &connector)
            .await
            .expect_err("bootstrap must fail");
        assert!(matches!(
            err,
            BootstrapError::Connection(ConnectionError::SessionFailed(JmapError::Unauthorized))
        ));
        assert!(err.diagnostic().contains("bearer token"));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_account_hint_fails_after_negotiation() {
        let connector = MockConnector::returning(session_with(&[CORE, MAIL], false));
        let mut driver = Driver::new();
        let err = driver
            .prepare(
                env(&[
                    (SESSION_URL_VAR, "https://jmap.example.com/session"),
                    (BEARER_TOKEN_VAR, "token"),
                    (ACCOUNT_ID_VAR, "ghost"),
                ]),
                &connector,
            )
            .await
            .expect_err("bootstrap must fail");
        assert!(err.diagnostic().contains("account 'ghost'"));
    }

    #[tokio::test]
    async fn jmap_connector_session_drives_real_server_registration() {
        let mut mock_server = Server::new_async().await;
        let mock = mock_server
            .mock("GET", "/.well-known/jmap")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "capabilities": {
                        "urn:ietf:params:jmap:core": {},
                        "urn:ietf:params:jmap:mail": {},
                        "urn:ietf:params:jmap:submission": {}
                    },
                    "accounts": {
                        "A1": { "name": "user@example.com", "isPersonal": true, "isReadOnly": true }
                    },
                    "primaryAccounts": { "urn:ietf:params:jmap:mail": "A1" },
                    "username": "user@example.com",
                    "apiUrl": "/jmap/api/",
                    "state": "s1"
                }"#,
            )
            .create_async()
            .await;

        let session_url = format!("{}/.well-known/jmap", mock_server.url());
        let mut driver = Driver::new();
        let prepared = driver
            .prepare(
                env(&[(SESSION_URL_VAR, session_url.as_str()), (BEARER_TOKEN_VAR, "token")]),
                &JmapConnector,
            )
            .await
            .expect("bootstrap must succeed");
        mock.assert_async().await;
        assert_eq!(prepared.account.id, "A1");
        assert!(!prepared.decision.register_submission);

        let mut server = JmapMcpServer::new(prepared.client, prepared.account.id.clone());
        driver.register(&mut server, &prepared.decision, &prepared.account);
        assert_eq!(server.groups(), [ToolGroup::Mail { read_only: true }]);
        assert_eq!(driver.phase(), Phase::ToolsRegistered);
    }
}
