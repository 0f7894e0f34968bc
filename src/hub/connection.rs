//! Line-oriented connection to the hub
//!
//! A connection performs the login handshake, then runs one reader task that
//! hands every received line to the registered callbacks in arrival order and
//! one writer task that drains the outgoing command queue. Sending never
//! blocks: the command id is assigned and the line queued immediately.
//!
//! A null connection (test mode) never touches the network; it reports itself
//! connected and records the lines it would have sent.

use super::error::{ConnectionError, ConnectionResult};
use super::reply::Reply;
use super::value::quote;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected (initial state, or after `disconnect`)
    Disconnected,
    /// TCP connect or login in progress
    Connecting,
    /// Logged in; commands may be sent
    Connected,
    /// The connection was lost or could not be established
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        };
        write!(f, "{label}")
    }
}

/// Identifier the connection assigns to each outgoing command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login credentials
#[derive(Clone)]
pub struct Credentials {
    /// Program name (the first half of the commander name)
    pub program: String,
    /// User name (the second half of the commander name)
    pub username: String,
    /// Program password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(
        program: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("program", &self.program)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hash sent in place of the password: blake3 of the hub nonce followed by the password.
pub fn password_hash(nonce: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(nonce.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Callback receiving each raw line from the hub
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback receiving state transitions and an optional reason
pub type StateCallback = Arc<dyn Fn(ConnectionState, Option<&str>) + Send + Sync>;

enum Link {
    Idle,
    Null {
        sent: Vec<String>,
    },
    Stream {
        outgoing: mpsc::UnboundedSender<String>,
        tasks: Vec<JoinHandle<()>>,
    },
}

struct Inner {
    state: ConnectionState,
    reason: Option<String>,
    link: Link,
    next_cmd_id: u64,
    commander: Option<String>,
    login_extra: String,
    line_callbacks: Vec<LineCallback>,
    state_callbacks: Vec<StateCallback>,
}

/// Connection to the hub; clones share the same underlying link.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Mutex<Inner>>,
}

impl Connection {
    /// Create a disconnected network connection.
    ///
    /// `login_extra` is appended verbatim to the login command
    /// (e.g. `type=STUI version="0.1.0" platform="linux-x86_64"`).
    pub fn new(login_extra: impl Into<String>) -> Self {
        Self::with_link(Link::Idle, ConnectionState::Disconnected, login_extra.into())
    }

    /// Create a null connection for test mode
    pub fn null() -> Self {
        Self::with_link(
            Link::Null { sent: Vec::new() },
            ConnectionState::Connected,
            String::new(),
        )
    }

    fn with_link(link: Link, state: ConnectionState, login_extra: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                reason: None,
                link,
                next_cmd_id: 1,
                commander: None,
                login_extra,
                line_callbacks: Vec::new(),
                state_callbacks: Vec::new(),
            })),
        }
    }

    /// True for a test-mode connection
    pub fn is_null(&self) -> bool {
        matches!(self.inner.lock().link, Link::Null { .. })
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Reason for the last transition to `Failed`, if any
    pub fn failure_reason(&self) -> Option<String> {
        self.inner.lock().reason.clone()
    }

    /// True if commands can be sent
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Commander name (`program.username`) assigned by the hub at login
    pub fn commander(&self) -> Option<String> {
        self.inner.lock().commander.clone()
    }

    /// Program ID, in the case used by the hub
    pub fn program_id(&self) -> Option<String> {
        self.commander()
            .and_then(|cmdr| cmdr.split('.').next().map(String::from))
    }

    /// User name assigned by the hub
    pub fn username(&self) -> Option<String> {
        self.commander()
            .and_then(|cmdr| cmdr.split_once('.').map(|(_, user)| user.to_string()))
    }

    /// Register a callback for every received line
    pub fn on_line<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.lock().line_callbacks.push(Arc::new(callback));
    }

    /// Register a callback for state transitions
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(ConnectionState, Option<&str>) + Send + Sync + 'static,
    {
        self.inner.lock().state_callbacks.push(Arc::new(callback));
    }

    /// Lines a null connection has recorded instead of sending
    pub fn sent_lines(&self) -> Vec<String> {
        match &self.inner.lock().link {
            Link::Null { sent } => sent.clone(),
            _ => Vec::new(),
        }
    }

    /// Connect over TCP and log in. `timeout` bounds the TCP connect and,
    /// separately, the login handshake.
    pub async fn connect(
        &self,
        addr: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> ConnectionResult<()> {
        if self.is_null() {
            self.reopen_null();
            return Ok(());
        }
        self.begin_connect()?;

        tracing::info!(addr, "connecting to hub");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(self.abandon_connect(ConnectionError::Io(err))),
            Err(_) => {
                return Err(self.abandon_connect(ConnectionError::Timeout {
                    addr: addr.to_string(),
                    after_ms: timeout.as_millis() as u64,
                }));
            }
        };
        stream.set_nodelay(true).ok();

        self.login(stream, addr, credentials, timeout).await
    }

    /// Log in over an already open byte stream; `timeout` bounds the handshake.
    pub async fn attach<S>(
        &self,
        stream: S,
        credentials: &Credentials,
        timeout: Duration,
    ) -> ConnectionResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_null() {
            self.reopen_null();
            return Ok(());
        }
        self.begin_connect()?;
        self.login(stream, "stream", credentials, timeout).await
    }

    fn reopen_null(&self) {
        if self.state() != ConnectionState::Connected {
            self.set_state(ConnectionState::Connected, None);
        }
    }

    fn begin_connect(&self) -> ConnectionResult<()> {
        let state = self.state();
        if matches!(
            state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            return Err(ConnectionError::AlreadyConnected);
        }
        self.set_state(ConnectionState::Connecting, None);
        Ok(())
    }

    /// Record a failed connect attempt. A `disconnect` during the attempt wins:
    /// the state stays Disconnected and the error becomes `LoginAbandoned`.
    fn abandon_connect(&self, err: ConnectionError) -> ConnectionError {
        if self.state() != ConnectionState::Connecting {
            return ConnectionError::LoginAbandoned;
        }
        self.set_state(ConnectionState::Failed, Some(err.to_string()));
        err
    }

    async fn login<S>(
        &self,
        stream: S,
        addr: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> ConnectionResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();

        let handshake = self.handshake(&mut lines, &mut write_half, credentials);
        let commander = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(commander)) => commander,
            Ok(Err(err)) => return Err(self.abandon_connect(err)),
            Err(_) => {
                return Err(self.abandon_connect(ConnectionError::Timeout {
                    addr: addr.to_string(),
                    after_ms: timeout.as_millis() as u64,
                }));
            }
        };

        let (outgoing, mut queue) = mpsc::unbounded_channel::<String>();
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Connecting {
                tracing::info!("disconnected during login, dropping hub stream");
                return Err(ConnectionError::LoginAbandoned);
            }
            inner.commander = Some(commander.clone());
            inner.link = Link::Stream {
                outgoing,
                tasks: Vec::new(),
            };
            inner.state = ConnectionState::Connected;
            inner.reason = None;
            inner.state_callbacks.clone()
        };
        tracing::info!(commander = %commander, "logged in to hub");
        for callback in callbacks {
            callback(ConnectionState::Connected, None);
        }

        let writer = tokio::spawn(async move {
            while let Some(line) = queue.recv().await {
                if let Err(err) = write_line(&mut write_half, &line).await {
                    tracing::warn!(error = %err, "failed to write to hub");
                    break;
                }
            }
        });

        let connection = self.clone();
        let reader = tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => connection.deliver_line(&line),
                    Ok(None) => {
                        connection.fail("connection closed by hub");
                        break;
                    }
                    Err(err) => {
                        connection.fail(&err.to_string());
                        break;
                    }
                }
            }
        });

        let mut inner = self.inner.lock();
        match &mut inner.link {
            Link::Stream { tasks, .. } => {
                tasks.push(writer);
                tasks.push(reader);
            }
            _ => {
                // Disconnected while the tasks were being spawned.
                writer.abort();
                reader.abort();
            }
        }
        Ok(())
    }

    async fn handshake<R, W>(
        &self,
        lines: &mut Lines<R>,
        writer: &mut W,
        credentials: &Credentials,
    ) -> ConnectionResult<String>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let knock_id = self.allocate_id();
        write_line(writer, &format!("{knock_id} auth knockKnock")).await?;
        let reply = read_auth_reply(lines, knock_id).await?;
        if reply.code.is_failure() {
            return Err(ConnectionError::AuthRejected(reply.text()));
        }
        let nonce = reply
            .keyword("nonce")
            .and_then(|kw| kw.values.first())
            .and_then(|value| value.as_str().map(String::from))
            .ok_or_else(|| ConnectionError::MalformedHandshake("reply missing nonce".into()))?;

        let login_id = self.allocate_id();
        let login_extra = self.inner.lock().login_extra.clone();
        let mut login = format!(
            "{login_id} auth login program={} username={} password={}",
            quote(&credentials.program),
            quote(&credentials.username),
            password_hash(&nonce, &credentials.password),
        );
        if !login_extra.is_empty() {
            login.push(' ');
            login.push_str(&login_extra);
        }
        write_line(writer, &login).await?;

        let reply = read_auth_reply(lines, login_id).await?;
        if reply.code.is_failure() {
            return Err(ConnectionError::AuthRejected(reply.text()));
        }

        let commander = reply
            .keyword("cmdr")
            .and_then(|kw| kw.values.first())
            .and_then(|value| value.as_str().map(String::from))
            .unwrap_or_else(|| format!("{}.{}", credentials.program, credentials.username));
        Ok(commander)
    }

    fn allocate_id(&self) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_cmd_id;
        inner.next_cmd_id += 1;
        id
    }

    /// Send a command to an actor, returning its command id.
    pub fn send(&self, actor: &str, command: &str) -> ConnectionResult<CommandId> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }

        let id = inner.next_cmd_id;
        inner.next_cmd_id += 1;
        let line = format!("{id} {actor} {command}");
        tracing::debug!(cmd_id = id, actor, command, "sending command");

        match &mut inner.link {
            Link::Null { sent } => sent.push(line),
            Link::Stream { outgoing, .. } => {
                outgoing.send(line).map_err(|_| ConnectionError::Closed)?;
            }
            Link::Idle => return Err(ConnectionError::NotConnected),
        }
        Ok(CommandId(id))
    }

    /// Close the connection. Calling this more than once is harmless.
    pub fn disconnect(&self) {
        let tasks = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            match std::mem::replace(&mut inner.link, Link::Idle) {
                Link::Stream { tasks, .. } => tasks,
                Link::Null { sent } => {
                    inner.link = Link::Null { sent };
                    Vec::new()
                }
                Link::Idle => Vec::new(),
            }
        };

        for task in tasks {
            task.abort();
        }
        tracing::info!("disconnected from hub");
        self.set_state(ConnectionState::Disconnected, None);
    }

    fn deliver_line(&self, line: &str) {
        let callbacks = self.inner.lock().line_callbacks.clone();
        for callback in callbacks {
            callback(line);
        }
    }

    fn fail(&self, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Connected {
                return;
            }
            // Dropping the sender ends the writer task.
            inner.link = Link::Idle;
        }
        tracing::warn!(reason, "hub connection lost");
        self.set_state(ConnectionState::Failed, Some(reason.to_string()));
    }

    fn set_state(&self, state: ConnectionState, reason: Option<String>) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.state == state {
                return;
            }
            inner.state = state;
            inner.reason = reason.clone();
            inner.state_callbacks.clone()
        };

        for callback in callbacks {
            callback(state, reason.as_deref());
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Read lines until the terminal `auth` reply for `cmd_id` arrives.
async fn read_auth_reply<R>(lines: &mut Lines<R>, cmd_id: u64) -> ConnectionResult<Reply>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let line = lines.next_line().await?.ok_or(ConnectionError::Closed)?;
        match Reply::parse(&line) {
            Ok(reply) if reply.cmd_id == cmd_id && reply.actor == "auth" => {
                if reply.code.is_terminal() {
                    return Ok(reply);
                }
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(error = %err, "ignoring line during login"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_connection_records_commands() {
        let connection = Connection::null();
        assert!(connection.is_connected());

        let first = connection.send("apogeecal", "allOff").unwrap();
        let second = connection.send("apogee", "shutter close").unwrap();
        assert!(second > first);
        assert_eq!(
            connection.sent_lines(),
            vec![
                format!("{first} apogeecal allOff"),
                format!("{second} apogee shutter close"),
            ]
        );
    }

    #[test]
    fn test_send_requires_connection() {
        let connection = Connection::new("");
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(matches!(
            connection.send("tcc", "show"),
            Err(ConnectionError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let connection = Connection::null();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&transitions);
        connection.on_state_change(move |state, _| sink.lock().push(state));

        connection.disconnect();
        connection.disconnect();
        assert_eq!(*transitions.lock(), vec![ConnectionState::Disconnected]);
        assert!(connection.send("tcc", "show").is_err());
    }

    #[tokio::test]
    async fn test_null_connection_reopens() {
        let connection = Connection::null();
        connection.disconnect();
        assert!(connection.send("tcc", "show").is_err());

        let creds = Credentials::new("ops", "alice", "");
        connection
            .connect("unused:0", &creds, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(connection.is_connected());
        assert!(connection.send("tcc", "show").is_ok());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("ops", "alice", "hunter2");
        let shown = format!("{creds:?}");
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_password_hash_depends_on_nonce() {
        assert_eq!(password_hash("abc", "pw"), password_hash("abc", "pw"));
        assert_ne!(password_hash("abc", "pw"), password_hash("abd", "pw"));
    }

    #[test]
    fn test_commander_parts() {
        let connection = Connection::null();
        connection.inner.lock().commander = Some("ops.alice".into());
        assert_eq!(connection.program_id().as_deref(), Some("ops"));
        assert_eq!(connection.username().as_deref(), Some("alice"));
    }
}
