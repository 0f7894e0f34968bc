//! Error types for the hub client
//!
//! Domain errors use thiserror; `anyhow` is reserved for the config file and
//! CLI boundaries.

use std::io;
use thiserror::Error;

/// Top-level hub client error
#[derive(Debug, Error)]
pub enum HubError {
    /// Network or authentication errors
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Malformed protocol line
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolParseError),

    /// A remote actor reported failure for a command
    #[error("Command failed: {0}")]
    Command(#[from] CommandFailure),

    /// A sequence pre-condition was not met
    #[error("Guard failed: {0}")]
    Guard(#[from] GuardFailure),

    /// A command was cancelled before it completed
    #[error("Cancelled: {0}")]
    Cancelled(#[from] CancelledError),

    /// Invalid command descriptors or form input
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Invalid script definition
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}

/// Connection-specific errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// IO error on the socket
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TCP connect did not finish in time
    #[error("Timed out connecting to {addr} after {after_ms} ms")]
    Timeout {
        /// Address being connected to
        addr: String,
        /// Timeout that elapsed
        after_ms: u64,
    },

    /// The hub rejected the login
    #[error("Login rejected: {0}")]
    AuthRejected(String),

    /// The hub answered the handshake with something unexpected
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    /// An operation needed a live connection
    #[error("Not connected")]
    NotConnected,

    /// Connect was called on a connection that is already up
    #[error("Already connected")]
    AlreadyConnected,

    /// The hub closed the connection
    #[error("Connection closed by hub")]
    Closed,

    /// `disconnect` was called while the login was still in progress
    #[error("Login abandoned: disconnected during handshake")]
    LoginAbandoned,
}

/// Convenience result alias for connection operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// A protocol line that could not be parsed
#[derive(Debug, Clone, Error)]
#[error("cannot parse {line:?}: {detail}")]
pub struct ProtocolParseError {
    /// The offending line
    pub line: String,
    /// What was wrong with it
    pub detail: String,
}

impl ProtocolParseError {
    /// Create a parse error for a line
    pub fn new(line: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            detail: detail.into(),
        }
    }
}

/// A remote actor reported failure for a command
#[derive(Debug, Clone, Error)]
#[error("{actor} {command} (id {command_id}): {detail}")]
pub struct CommandFailure {
    /// Command identifier
    pub command_id: u64,
    /// Target actor
    pub actor: String,
    /// Command text
    pub command: String,
    /// Failure text reported by the actor
    pub detail: String,
}

/// A sequence pre-condition was not met
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct GuardFailure(pub String);

/// A command was cancelled because the connection went away
#[derive(Debug, Clone, Error)]
#[error("{actor} {command} (id {command_id}) cancelled")]
pub struct CancelledError {
    /// Command identifier
    pub command_id: u64,
    /// Target actor
    pub actor: String,
    /// Command text
    pub command: String,
}

/// Descriptor validation and input checking errors
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// A parameter refers to a stage its command does not declare
    #[error("{command}.{parameter}: unknown stage '{stage}'")]
    UnknownStage {
        /// Command name
        command: String,
        /// Parameter name
        parameter: String,
        /// Undeclared stage
        stage: String,
    },

    /// A stage is declared twice
    #[error("{command}: duplicate stage '{stage}'")]
    DuplicateStage {
        /// Command name
        command: String,
        /// Stage name
        stage: String,
    },

    /// A parameter is declared twice
    #[error("{command}: duplicate parameter '{parameter}'")]
    DuplicateParameter {
        /// Command name
        command: String,
        /// Parameter name
        parameter: String,
    },

    /// A command is declared twice in a set
    #[error("duplicate command '{0}'")]
    DuplicateCommand(String),

    /// A default value does not match the parameter kind
    #[error("{command}.{parameter}: default does not match kind {kind}")]
    DefaultKindMismatch {
        /// Command name
        command: String,
        /// Parameter name
        parameter: String,
        /// Declared kind
        kind: String,
    },

    /// Form input does not match the parameter kind
    #[error("{parameter}: {input:?} is not a valid {kind}")]
    InvalidValue {
        /// Parameter name
        parameter: String,
        /// Declared kind
        kind: String,
        /// Rejected input
        input: String,
    },

    /// A value was supplied for an undeclared parameter
    #[error("{command}: unknown parameter '{parameter}'")]
    UnknownParameter {
        /// Command name
        command: String,
        /// Parameter name
        parameter: String,
    },

    /// Lookup of an unknown command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// JSON error while loading descriptors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for descriptor operations
pub type DescriptorResult<T> = std::result::Result<T, DescriptorError>;

/// Script definition errors
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Step text was blank
    #[error("empty script step")]
    EmptyStep,

    /// Step text named an actor but no command
    #[error("script step '{0}' has no command")]
    MissingCommand(String),
}

/// Result type using HubError
pub type Result<T> = std::result::Result<T, HubError>;
