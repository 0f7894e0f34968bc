//! Fake hub traffic for test mode
//!
//! A [`TestDispatcher`] feeds fabricated reply lines straight into a context's
//! dispatcher, as if they had arrived from the hub. It pairs with the null
//! connection: commands issued in test mode are recorded rather than sent,
//! and can be answered with [`TestDispatcher::reply`].

use crate::hub::HubContext;
use crate::hub::connection::CommandId;
use crate::hub::reply::MsgCode;
use std::time::Duration;

pub mod tcc_status;

/// A command recorded by a null connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// Id assigned when the command was issued
    pub id: CommandId,
    /// Target actor
    pub actor: String,
    /// Command text
    pub command: String,
}

/// Dispatches fabricated hub output to a context
pub struct TestDispatcher<'a> {
    ctx: &'a HubContext,
    default_actor: String,
}

impl<'a> TestDispatcher<'a> {
    /// Create a dispatcher whose broadcasts default to `default_actor`
    pub fn new(ctx: &'a HubContext, default_actor: impl Into<String>) -> Self {
        Self {
            ctx,
            default_actor: default_actor.into(),
        }
    }

    /// The context replies are dispatched to
    pub fn context(&self) -> &HubContext {
        self.ctx
    }

    fn commander(&self) -> String {
        self.ctx
            .commander()
            .unwrap_or_else(|| format!(".{}", self.ctx.config().program.to_lowercase()))
    }

    /// Broadcast keywords from an actor (the default actor if `None`)
    pub fn dispatch<S: AsRef<str>>(&self, keywords: &[S], actor: Option<&str>) {
        let actor = actor.unwrap_or(&self.default_actor);
        self.send_line(0, actor, MsgCode::Info, keywords);
    }

    /// Reply to an issued command
    pub fn reply<S: AsRef<str>>(&self, id: CommandId, actor: &str, code: MsgCode, keywords: &[S]) {
        self.send_line(id.0, actor, code, keywords);
    }

    fn send_line<S: AsRef<str>>(&self, cmd_id: u64, actor: &str, code: MsgCode, keywords: &[S]) {
        let body: Vec<&str> = keywords.iter().map(AsRef::as_ref).collect();
        let line = format!(
            "{} {cmd_id} {actor} {code} {}",
            self.commander(),
            body.join("; ")
        );
        tracing::debug!(%line, "test dispatch");
        self.ctx.dispatcher().dispatch(&line);
    }

    /// Commands recorded by the null connection, oldest first
    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.ctx
            .connection()
            .sent_lines()
            .iter()
            .filter_map(|line| {
                let (id, rest) = line.split_once(' ')?;
                let (actor, command) = rest.split_once(' ')?;
                Some(SentCommand {
                    id: CommandId(id.parse().ok()?),
                    actor: actor.to_string(),
                    command: command.to_string(),
                })
            })
            .collect()
    }

    /// The most recently recorded command
    pub fn last_command(&self) -> Option<SentCommand> {
        self.sent_commands().pop()
    }

    /// Dispatch each data set from the default actor, pausing between sets
    pub async fn run_data_set<S: AsRef<str>>(&self, sets: &[&[S]], interval: Duration) {
        for (index, set) in sets.iter().enumerate() {
            if index > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            self.dispatch(set, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{CommandState, HubConfig, Scalar};

    #[test]
    fn test_dispatch_updates_model() {
        let ctx = HubContext::new(HubConfig::test());
        let test = TestDispatcher::new(&ctx, "tcc");
        test.dispatch(&["SecFocus=570", "Inst=BOSS"], None);
        test.dispatch(&["instrumentNum=10"], Some("mcp"));

        assert_eq!(ctx.model().value("tcc", "SecFocus", 0), Some(Scalar::Int(570)));
        assert_eq!(
            ctx.model().value("mcp", "instrumentNum", 0),
            Some(Scalar::Int(10))
        );
    }

    #[tokio::test]
    async fn test_reply_resolves_recorded_command() {
        let ctx = HubContext::new(HubConfig::test());
        let test = TestDispatcher::new(&ctx, "tcc");

        let mut invocation = ctx.dispatcher().issue_command("tcc", "show time").unwrap();
        let sent = test.last_command().unwrap();
        assert_eq!(sent.id, invocation.id());
        assert_eq!(sent.actor, "tcc");
        assert_eq!(sent.command, "show time");

        test.reply::<&str>(sent.id, "tcc", MsgCode::Done, &[]);
        assert_eq!(invocation.wait().await, CommandState::Done);
    }
}
