//! Scripted command sequences
//!
//! A [`SequenceRunner`] issues its steps one at a time. Each step waits for its
//! command to resolve before the next one is issued:
//!
//! - Done: continue with the next step
//! - Failed: stop if the step checks for failure, otherwise continue
//! - Cancelled: stop
//!
//! An optional guard runs once before the first step; if it refuses, no
//! command is issued at all. The runner is consumed by [`SequenceRunner::run`],
//! so a finished runner cannot be started again.

use crate::hub::HubContext;
use crate::hub::dispatcher::CommandState;
use crate::hub::error::{GuardFailure, ScriptError};
use crate::hub::log::{MessageLog, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

pub mod apogee_short_dark;

/// TAI - UTC in seconds (leap seconds since 1972, current since 2017)
pub const TAI_MINUS_UTC_SECS: i64 = 37;

/// Format the TAI time of day as `HH:MM:SS`
pub fn tai_time_str(now: DateTime<Utc>) -> String {
    (now + Duration::seconds(TAI_MINUS_UTC_SECS))
        .format("%H:%M:%S")
        .to_string()
}

/// One command of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Target actor
    pub actor: String,
    /// Command text sent to the actor
    pub command: String,
    /// Stop the sequence if this command fails
    pub check_fail: bool,
}

impl ScriptStep {
    /// Create a step that stops the sequence on failure
    pub fn new(actor: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            command: command.into(),
            check_fail: true,
        }
    }

    /// Parse `"actor command text"`, splitting on the first whitespace
    pub fn parse(actor_cmd: &str) -> Result<Self, ScriptError> {
        let trimmed = actor_cmd.trim();
        if trimmed.is_empty() {
            return Err(ScriptError::EmptyStep);
        }
        let (actor, command) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| ScriptError::MissingCommand(trimmed.to_string()))?;
        let command = command.trim();
        if command.is_empty() {
            return Err(ScriptError::MissingCommand(trimmed.to_string()));
        }
        Ok(Self::new(actor, command))
    }

    /// Set whether a failure stops the sequence
    pub fn check_fail(mut self, check_fail: bool) -> Self {
        self.check_fail = check_fail;
        self
    }

    /// `actor command` as typed by a user
    pub fn command_line(&self) -> String {
        format!("{} {}", self.actor, self.command)
    }
}

/// Why a sequence stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// The guard refused before any command was issued
    GuardFailed(String),
    /// The step at this index failed and checked for failure
    CommandFailed(usize),
    /// A command was cancelled or could not be sent
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::GuardFailed(why) => write!(f, "guard failed: {why}"),
            AbortReason::CommandFailed(step) => write!(f, "step {step} failed"),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Runner state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerState {
    /// Not yet run
    NotStarted,
    /// Waiting on the step at this index
    Running(usize),
    /// Every step finished
    Completed,
    /// Stopped early
    Aborted(AbortReason),
}

impl RunnerState {
    /// True for Completed and Aborted
    pub fn is_finished(&self) -> bool {
        matches!(self, RunnerState::Completed | RunnerState::Aborted(_))
    }
}

/// Pre-condition checked once before the first step
pub trait Guard: Send + Sync {
    /// Return an error to stop the sequence before anything is sent
    fn check(&self, ctx: &HubContext) -> Result<(), GuardFailure>;
}

impl<F> Guard for F
where
    F: Fn(&HubContext) -> Result<(), GuardFailure> + Send + Sync,
{
    fn check(&self, ctx: &HubContext) -> Result<(), GuardFailure> {
        self(ctx)
    }
}

/// Executes a list of steps against a hub context
pub struct SequenceRunner {
    name: String,
    run_id: Uuid,
    steps: Vec<ScriptStep>,
    guard: Option<Box<dyn Guard>>,
    debug: bool,
    state: watch::Sender<RunnerState>,
}

impl SequenceRunner {
    /// Create a runner for `steps`
    pub fn new(name: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        let (state, _) = watch::channel(RunnerState::NotStarted);
        Self {
            name: name.into(),
            run_id: Uuid::new_v4(),
            steps,
            guard: None,
            debug: false,
            state,
        }
    }

    /// Build a runner from `"actor command"` strings, all checking for failure
    pub fn from_lines<I, S>(name: impl Into<String>, lines: I) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let steps = lines
            .into_iter()
            .map(|line| ScriptStep::parse(line.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, steps))
    }

    /// Install a guard
    pub fn with_guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// In debug mode commands are logged but not sent, and count as Done
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Script name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id of this execution, attached to its tracing span
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Steps in order
    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Current state
    pub fn state(&self) -> RunnerState {
        self.state.borrow().clone()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    /// Run the sequence to a terminal state
    pub async fn run(self, ctx: &HubContext) -> RunnerState {
        let span = tracing::info_span!("sequence", name = %self.name, run = %self.run_id);
        self.execute(ctx).instrument(span).await
    }

    async fn execute(&self, ctx: &HubContext) -> RunnerState {
        let log = ctx.log();
        log.add(
            Severity::Normal,
            None,
            format!("-- {} -- {}", tai_time_str(Utc::now()), self.name),
        );

        if let Some(guard) = &self.guard {
            if let Err(failure) = guard.check(ctx) {
                log.add(Severity::Error, None, format!("{}: {failure}", self.name));
                tracing::warn!(reason = %failure, "guard refused");
                return self.finish(RunnerState::Aborted(AbortReason::GuardFailed(failure.0)));
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            self.state.send_replace(RunnerState::Running(index));
            let line = step.command_line();
            log.add(Severity::Normal, Some(&step.actor), line.clone());

            if self.debug {
                tracing::info!(step = index, command = %line, "debug mode: not sent");
                continue;
            }

            let mut invocation = match ctx.dispatcher().issue_command(&step.actor, &step.command) {
                Ok(invocation) => invocation,
                Err(err) => {
                    log.add(
                        Severity::Error,
                        Some(&step.actor),
                        format!("{line}: could not send: {err}"),
                    );
                    return self.stop(log, RunnerState::Aborted(AbortReason::Cancelled));
                }
            };

            match invocation.wait().await {
                CommandState::Done => {}
                CommandState::Failed if step.check_fail => {
                    let mut text = format!(" {line}   ** FAILED **");
                    if let Some(why) = invocation.last_reply_text().filter(|t| !t.is_empty()) {
                        text.push_str(&format!(" ({why})"));
                    }
                    log.add(Severity::Error, Some(&step.actor), text);
                    return self.stop(log, RunnerState::Aborted(AbortReason::CommandFailed(index)));
                }
                CommandState::Failed => {
                    log.add(
                        Severity::Warning,
                        Some(&step.actor),
                        format!(" {line}   failed; continuing"),
                    );
                }
                CommandState::Cancelled | CommandState::Pending => {
                    log.add(
                        Severity::Error,
                        Some(&step.actor),
                        format!(" {line}   ** CANCELLED **"),
                    );
                    return self.stop(log, RunnerState::Aborted(AbortReason::Cancelled));
                }
            }
        }

        self.stop(log, RunnerState::Completed)
    }

    /// Close the log section opened by the header, then finish.
    fn stop(&self, log: &MessageLog, state: RunnerState) -> RunnerState {
        log.add(Severity::Normal, None, "-- done --");
        self.finish(state)
    }

    fn finish(&self, state: RunnerState) -> RunnerState {
        tracing::info!(state = ?state, "sequence finished");
        self.state.send_replace(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_step_parse_splits_on_first_whitespace() {
        let step = ScriptStep::parse("apogee expose nreads=3 ; object=Dark").unwrap();
        assert_eq!(step.actor, "apogee");
        assert_eq!(step.command, "expose nreads=3 ; object=Dark");
        assert!(step.check_fail);
    }

    #[test]
    fn test_step_parse_errors() {
        assert!(matches!(ScriptStep::parse("  "), Err(ScriptError::EmptyStep)));
        assert!(matches!(
            ScriptStep::parse("apogeecal"),
            Err(ScriptError::MissingCommand(_))
        ));
    }

    #[test]
    fn test_tai_offset() {
        let utc = Utc.with_ymd_and_hms(2014, 2, 17, 23, 59, 50).unwrap();
        assert_eq!(tai_time_str(utc), "00:00:27");
    }

    #[test]
    fn test_new_runner_not_started() {
        let runner = SequenceRunner::from_lines("demo", ["tcc show"]).unwrap();
        assert_eq!(runner.state(), RunnerState::NotStarted);
        assert_eq!(runner.steps().len(), 1);
    }
}
