//! Hub client core
//!
//! This module ties together the connection to the hub, the keyword
//! dispatcher, the keyword model and the message log, and exposes the
//! [`HubContext`] that owns them for one session.

use serde::{Deserialize, Serialize};

// Submodules
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod keyword;
pub mod log;
pub mod reply;
pub mod storage;
pub mod value;

/// Default TCP port of the hub
pub const DEFAULT_HUB_PORT: u16 = 9877;

/// Configuration for a hub session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub host name
    pub host: String,

    /// Hub TCP port
    pub port: u16,

    /// Program name; also used (lowercased) as the dispatcher and log prefix
    pub program: String,

    /// How long to wait for the TCP connection to open
    pub connect_timeout_ms: u64,

    /// Maximum number of entries kept in the message log
    pub log_capacity: usize,

    /// Use a null connection instead of the network
    pub test_mode: bool,

    /// Delay between data sets when replaying test data
    pub replay_interval_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_HUB_PORT,
            program: crate::APPLICATION_NAME.to_string(),
            connect_timeout_ms: 10_000,
            log_capacity: 5_000,
            test_mode: false,
            replay_interval_ms: 1_500,
        }
    }
}

impl HubConfig {
    /// Configuration for test mode
    pub fn test() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    /// `host:port` address of the hub
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Re-export commonly used types
pub use connection::{CommandId, Connection, ConnectionState, Credentials};
pub use context::HubContext;
pub use dispatcher::{CommandInvocation, CommandState, Dispatcher};
pub use keyword::{KeywordModel, KeywordValue};
pub use log::{LogEntry, MessageLog, Severity};
pub use reply::{Keyword, MsgCode, Reply};
pub use value::Scalar;
