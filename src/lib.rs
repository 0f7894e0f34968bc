//! STUI hub client – keyword dispatch and scripted command sequences
//!
//! This crate implements the client side of an observatory control UI:
//! - A connection to the hub with the login handshake and line-oriented traffic
//! - A keyword dispatcher that keeps a last-write-wins model of actor keywords
//! - Command invocations correlated with their completion or failure replies
//! - Scripted sequences that issue commands one at a time and stop on failure
//! - Declarative command/parameter descriptors for painting input forms
//! - Test data generators that replay scripted keyword streams offline

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Hub connection, keyword dispatch and application context
pub mod hub;

/// Scripted command sequences
pub mod script;

/// Command and parameter descriptors
pub mod descr;

/// Synthetic keyword data for exercising status displays offline
pub mod testdata;

// Re-export key types for convenience
pub use hub::{HubConfig, HubContext};

/// Current version of the STUI client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name reported to the hub at login
pub const APPLICATION_NAME: &str = "STUI";
