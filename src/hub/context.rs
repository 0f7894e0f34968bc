//! Application context: the one place that owns the hub connection,
//! dispatcher, keyword model and message log.
//!
//! The context is constructed explicitly and handed to whatever needs it.
//! `start` logs in, `shutdown` (or dropping the context) disconnects.

use super::HubConfig;
use super::connection::{Connection, ConnectionState, Credentials};
use super::dispatcher::Dispatcher;
use super::error::ConnectionResult;
use super::keyword::KeywordModel;
use super::log::{MessageLog, Severity};
use super::value::quote;
use crate::{APPLICATION_NAME, VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Shared application state for one hub session
pub struct HubContext {
    config: HubConfig,
    connection: Connection,
    dispatcher: Arc<Dispatcher>,
    model: Arc<KeywordModel>,
    log: Arc<MessageLog>,
}

impl HubContext {
    /// Build a context from configuration. In test mode the connection is a
    /// null connection that never touches the network.
    pub fn new(config: HubConfig) -> Self {
        let connection = if config.test_mode {
            tracing::info!("running in test mode, no real connection possible");
            Connection::null()
        } else {
            Connection::new(login_extra())
        };

        let model = Arc::new(KeywordModel::new());
        let log = Arc::new(MessageLog::new(config.log_capacity));
        let dispatcher = Dispatcher::new(
            config.program.to_lowercase(),
            connection.clone(),
            Arc::clone(&model),
            Arc::clone(&log),
        );

        Self {
            config,
            connection,
            dispatcher,
            model,
            log,
        }
    }

    /// Connect to the configured hub and log in
    pub async fn start(&self, credentials: &Credentials) -> ConnectionResult<()> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        self.connection
            .connect(&self.config.address(), credentials, timeout)
            .await
    }

    /// Log in over an already open stream; the handshake is bounded by the
    /// configured connect timeout.
    pub async fn attach<S>(&self, stream: S, credentials: &Credentials) -> ConnectionResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        self.connection.attach(stream, credentials, timeout).await
    }

    /// Disconnect; pending commands are cancelled
    pub fn shutdown(&self) {
        self.connection.disconnect();
    }

    /// Configuration this context was built with
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The hub connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The keyword dispatcher
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The keyword model
    pub fn model(&self) -> &Arc<KeywordModel> {
        &self.model
    }

    /// The message log
    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    /// Connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Commander (`program.username`) assigned by the hub, if connected
    pub fn commander(&self) -> Option<String> {
        self.connection.commander()
    }

    /// Program ID assigned by the hub, if connected
    pub fn program_id(&self) -> Option<String> {
        self.connection.program_id()
    }

    /// User name assigned by the hub, if connected
    pub fn username(&self) -> Option<String> {
        self.connection.username()
    }

    /// Write a message to the log, formatted like hub output.
    ///
    /// With a keyword the message becomes `.prog 0 prog <keyword>="<msg>"`;
    /// without one `msg` is assumed to already be in keyword=value form.
    pub fn log_msg(&self, msg: &str, severity: Severity, keyword: Option<&str>) {
        let prog = self.config.program.to_lowercase();
        let line = match keyword {
            Some(keyword) => format!(".{prog} 0 {prog} {keyword}={}", quote_always(msg)),
            None => format!(".{prog} 0 {prog} {msg}"),
        };
        self.log.add(severity, Some(&prog), line);
    }
}

impl Drop for HubContext {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

fn quote_always(msg: &str) -> String {
    let quoted = quote(msg);
    if quoted.starts_with('"') {
        quoted
    } else {
        format!("\"{quoted}\"")
    }
}

/// Extra login data identifying this client to the hub
pub fn login_extra() -> String {
    let platform = format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH);
    format!(
        "type={} version={} platform={}",
        APPLICATION_NAME,
        quote_always(VERSION),
        quote_always(&platform)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_msg_formats_like_hub_output() {
        let ctx = HubContext::new(HubConfig::test());
        ctx.log_msg("hello there", Severity::Warning, Some("Text"));
        ctx.log_msg("Done=1", Severity::Normal, None);

        let entries = ctx.log().entries();
        let texts: Vec<_> = entries.iter().map(|e| e.text.as_str()).collect();
        assert!(texts.contains(&".stui 0 stui Text=\"hello there\""));
        assert!(texts.contains(&".stui 0 stui Done=1"));
    }

    #[test]
    fn test_login_extra_mentions_application() {
        let extra = login_extra();
        assert!(extra.starts_with("type=STUI version=\""));
        assert!(extra.contains("platform=\""));
    }

    #[tokio::test]
    async fn test_restart_after_shutdown_in_test_mode() {
        let ctx = HubContext::new(HubConfig::test());
        ctx.shutdown();
        assert!(ctx.dispatcher().issue_command("tcc", "show").is_err());

        let credentials = Credentials::new("STUI", "alice", "");
        ctx.start(&credentials).await.unwrap();
        assert_eq!(ctx.state(), ConnectionState::Connected);
        assert!(ctx.dispatcher().issue_command("tcc", "show").is_ok());
    }

    #[test]
    fn test_test_mode_is_connected() {
        let ctx = HubContext::new(HubConfig::test());
        assert_eq!(ctx.state(), ConnectionState::Connected);
        ctx.shutdown();
        assert_eq!(ctx.state(), ConnectionState::Disconnected);
    }
}
