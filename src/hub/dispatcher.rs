//! Keyword dispatcher and command correlation
//!
//! Every line from the hub is parsed into a [`Reply`]; its keywords are applied
//! to the [`KeywordModel`] in order, the reply is logged, and if it carries the
//! id of one of our pending commands the reply is attached to that command.
//! A terminal reply (`:`, `f`, `!`) resolves the command exactly once.
//!
//! When the connection drops or is closed every pending command is cancelled.

use super::connection::{CommandId, Connection, ConnectionState};
use super::error::{CancelledError, CommandFailure, ConnectionError, HubError};
use super::keyword::KeywordModel;
use super::log::{MessageLog, Severity};
use super::reply::Reply;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

/// Lifecycle state of a command invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandState {
    /// Sent, no terminal reply yet
    Pending,
    /// Finished successfully
    Done,
    /// The actor reported failure
    Failed,
    /// Abandoned because the connection went away
    Cancelled,
}

impl CommandState {
    /// True for Done, Failed and Cancelled
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandState::Pending)
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandState::Pending => "Pending",
            CommandState::Done => "Done",
            CommandState::Failed => "Failed",
            CommandState::Cancelled => "Cancelled",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug)]
struct InvocationRecord {
    state: CommandState,
    replies: Vec<Reply>,
}

struct PendingCommand {
    record: Arc<Mutex<InvocationRecord>>,
    notify: oneshot::Sender<CommandState>,
}

impl PendingCommand {
    fn finish(self, state: CommandState) {
        self.record.lock().state = state;
        // The waiter may have been dropped; the record still carries the state.
        let _ = self.notify.send(state);
    }
}

/// Handle to an issued command
///
/// The dispatcher owns the pending entry; this handle observes it and can
/// await its resolution.
pub struct CommandInvocation {
    id: CommandId,
    actor: String,
    command: String,
    record: Arc<Mutex<InvocationRecord>>,
    resolved: Option<oneshot::Receiver<CommandState>>,
}

impl CommandInvocation {
    /// Command id assigned by the connection
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Target actor
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Command text
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Current state
    pub fn state(&self) -> CommandState {
        self.record.lock().state
    }

    /// Replies received for this command so far
    pub fn replies(&self) -> Vec<Reply> {
        self.record.lock().replies.clone()
    }

    /// Text of the last reply, used to describe failures
    pub fn last_reply_text(&self) -> Option<String> {
        self.record.lock().replies.last().map(Reply::text)
    }

    /// Wait until the command leaves `Pending`.
    ///
    /// Cancel safe: if this future is dropped before the command resolves, a
    /// later call still receives the resolution.
    pub async fn wait(&mut self) -> CommandState {
        let Some(receiver) = self.resolved.as_mut() else {
            return self.state();
        };

        let resolution = receiver.await;
        self.resolved = None;
        match resolution {
            Ok(state) => state,
            Err(_) => {
                // Dispatcher dropped without resolving.
                let mut record = self.record.lock();
                if !record.state.is_terminal() {
                    record.state = CommandState::Cancelled;
                }
                record.state
            }
        }
    }

    /// Wait and convert a failed or cancelled command into an error
    pub async fn wait_ok(&mut self) -> Result<Vec<Reply>, HubError> {
        match self.wait().await {
            CommandState::Done => Ok(self.replies()),
            CommandState::Failed => Err(CommandFailure {
                command_id: self.id.0,
                actor: self.actor.clone(),
                command: self.command.clone(),
                detail: self.last_reply_text().unwrap_or_default(),
            }
            .into()),
            CommandState::Cancelled | CommandState::Pending => Err(CancelledError {
                command_id: self.id.0,
                actor: self.actor.clone(),
                command: self.command.clone(),
            }
            .into()),
        }
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInvocation")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("command", &self.command)
            .field("state", &self.state())
            .finish()
    }
}

/// Demultiplexes hub traffic into the keyword model and pending commands
pub struct Dispatcher {
    name: String,
    connection: Connection,
    model: Arc<KeywordModel>,
    log: Arc<MessageLog>,
    pending: Mutex<HashMap<u64, PendingCommand>>,
}

impl Dispatcher {
    /// Create a dispatcher and attach it to the connection's line and state callbacks
    pub fn new(
        name: impl Into<String>,
        connection: Connection,
        model: Arc<KeywordModel>,
        log: Arc<MessageLog>,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            name: name.into(),
            connection: connection.clone(),
            model,
            log,
            pending: Mutex::new(HashMap::new()),
        });

        let weak: Weak<Self> = Arc::downgrade(&dispatcher);
        connection.on_line(move |line| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.dispatch(line);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(&dispatcher);
        connection.on_state_change(move |state, reason| {
            let Some(dispatcher) = weak.upgrade() else {
                return;
            };
            match state {
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    if let Some(reason) = reason {
                        dispatcher
                            .log
                            .add(Severity::Error, None, format!("connection {state}: {reason}"));
                    }
                    dispatcher.cancel_all();
                }
                ConnectionState::Connecting | ConnectionState::Connected => {
                    dispatcher
                        .log
                        .add(Severity::Normal, None, format!("connection {state}"));
                }
            }
        });

        dispatcher
    }

    /// Dispatcher name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The connection commands are sent over
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The keyword model this dispatcher writes
    pub fn model(&self) -> &Arc<KeywordModel> {
        &self.model
    }

    /// Number of commands still awaiting a terminal reply
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Parse and apply one protocol line. Malformed lines are logged and dropped.
    pub fn dispatch(&self, line: &str) {
        match Reply::parse(line) {
            Ok(reply) => self.dispatch_reply(reply),
            Err(err) => {
                tracing::warn!(error = %err, "dropping unparseable line");
                self.log.add(Severity::Warning, None, err.to_string());
            }
        }
    }

    /// Apply an already parsed reply
    pub fn dispatch_reply(&self, reply: Reply) {
        for keyword in &reply.keywords {
            self.model
                .update(&reply.actor, &keyword.name, keyword.values.clone());
        }

        let text = reply.keyword_text();
        if !text.is_empty() || reply.code.is_terminal() {
            self.log
                .add(reply.code.severity(), Some(&reply.actor), format!("{} {}", reply.code, text));
        }

        self.resolve(reply);
    }

    fn resolve(&self, reply: Reply) {
        if reply.cmd_id == 0 || !self.is_ours(&reply) {
            return;
        }

        let finished = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get(&reply.cmd_id) else {
                return;
            };
            let terminal = reply.code.is_terminal();
            let failed = reply.code.is_failure();
            entry.record.lock().replies.push(reply.clone());
            if !terminal {
                return;
            }
            let state = if failed {
                CommandState::Failed
            } else {
                CommandState::Done
            };
            pending.remove(&reply.cmd_id).map(|entry| (entry, state))
        };

        if let Some((entry, state)) = finished {
            tracing::debug!(cmd_id = reply.cmd_id, actor = %reply.actor, %state, "command finished");
            entry.finish(state);
        }
    }

    fn is_ours(&self, reply: &Reply) -> bool {
        match (self.connection.commander(), reply.commander.as_deref()) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }

    /// Send a command and register it as pending. Returns immediately.
    pub fn issue_command(
        &self,
        actor: &str,
        command: &str,
    ) -> Result<CommandInvocation, ConnectionError> {
        let record = Arc::new(Mutex::new(InvocationRecord {
            state: CommandState::Pending,
            replies: Vec::new(),
        }));
        let (notify, resolved) = oneshot::channel();

        // Hold the table while sending so a fast reply cannot miss the entry.
        let mut pending = self.pending.lock();
        let id = self.connection.send(actor, command)?;
        pending.insert(
            id.0,
            PendingCommand {
                record: Arc::clone(&record),
                notify,
            },
        );
        drop(pending);

        Ok(CommandInvocation {
            id,
            actor: actor.to_string(),
            command: command.to_string(),
            record,
            resolved: Some(resolved),
        })
    }

    /// Cancel every pending command; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(u64, PendingCommand)> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (cmd_id, entry) in drained {
            tracing::debug!(cmd_id, "command cancelled");
            entry.finish(CommandState::Cancelled);
        }
        if count > 0 {
            self.log.add(
                Severity::Warning,
                None,
                format!("cancelled {count} pending command(s)"),
            );
        }
        count
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for (_, entry) in self.pending.get_mut().drain() {
            entry.finish(CommandState::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::value::Scalar;

    fn dispatcher() -> Arc<Dispatcher> {
        Dispatcher::new(
            "stui",
            Connection::null(),
            Arc::new(KeywordModel::new()),
            Arc::new(MessageLog::new(100)),
        )
    }

    #[test]
    fn test_keywords_applied_in_order() {
        let dispatcher = dispatcher();
        dispatcher.dispatch(".stui 0 tcc i SecFocus=1; SecFocus=2");
        assert_eq!(
            dispatcher.model().value("tcc", "SecFocus", 0),
            Some(Scalar::Int(2))
        );
    }

    #[tokio::test]
    async fn test_terminal_reply_resolves() {
        let dispatcher = dispatcher();
        let mut invocation = dispatcher.issue_command("tcc", "show").unwrap();
        assert_eq!(dispatcher.pending_count(), 1);

        dispatcher.dispatch(&format!(".stui {} tcc > ", invocation.id()));
        assert_eq!(invocation.state(), CommandState::Pending);

        dispatcher.dispatch(&format!(".stui {} tcc : ", invocation.id()));
        assert_eq!(invocation.wait().await, CommandState::Done);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let dispatcher = dispatcher();
        let invocation = dispatcher.issue_command("tcc", "show").unwrap();
        dispatcher.dispatch(&format!(".stui {} tcc f", invocation.id().0 + 100));
        assert_eq!(invocation.state(), CommandState::Pending);
    }

    #[tokio::test]
    async fn test_drop_cancels_pending() {
        let dispatcher = dispatcher();
        let mut invocation = dispatcher.issue_command("tcc", "show").unwrap();
        drop(dispatcher);
        assert_eq!(invocation.wait().await, CommandState::Cancelled);
    }

    #[test]
    fn test_cancel_all_counts() {
        let dispatcher = dispatcher();
        dispatcher.issue_command("a", "one").unwrap();
        dispatcher.issue_command("b", "two").unwrap();
        assert_eq!(dispatcher.cancel_all(), 2);
        assert_eq!(dispatcher.cancel_all(), 0);
    }
}
