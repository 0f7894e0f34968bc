//! APOGEE short dark: takes a short dark to check the APOGEE binding.
//!
//! Reports where the gang connector is before starting. By default the
//! sequence runs at any gang position; [`GangGuard::require_podium`] makes it
//! refuse unless the connector is at the podium.

use super::{Guard, ScriptStep, SequenceRunner};
use crate::hub::HubContext;
use crate::hub::error::GuardFailure;
use crate::hub::log::Severity;

/// Script name shown in the log
pub const NAME: &str = "APOGEE Short Dark";

/// Commands in the order they are issued
pub const COMMANDS: [&str; 6] = [
    "apogeecal allOff",
    "apogee shutter close",
    "apogeecal shutterClose",
    "apogee expose nreads=3 ; object=Dark",
    "apogeecal shutterClose",
    "apogeecal allOff",
];

/// Actor reporting the gang connector position
pub const GANG_ACTOR: &str = "mcp";

/// Keyword reporting the gang connector position
pub const GANG_KEYWORD: &str = "apogeeGang";

/// Gang connector position at the podium
pub const GANG_PODIUM: &str = "1";

/// Human-readable label for a gang connector position
pub fn gang_label(position: &str) -> &'static str {
    match position {
        "0" => "Disconnected",
        "1" => "Podium",
        "2" => "Cart",
        "3" => "Sparse cals",
        _ => "?",
    }
}

/// Steps of the script; every step stops the sequence on failure
pub fn steps() -> Vec<ScriptStep> {
    COMMANDS
        .iter()
        .filter_map(|line| ScriptStep::parse(line).ok())
        .collect()
}

/// Reports the gang connector position and optionally requires the podium
#[derive(Debug, Clone, Copy, Default)]
pub struct GangGuard {
    require_podium: bool,
}

impl GangGuard {
    /// Report the position but run anywhere
    pub fn report_only() -> Self {
        Self::default()
    }

    /// Refuse to run unless the connector is at the podium
    pub fn require_podium() -> Self {
        Self {
            require_podium: true,
        }
    }
}

impl Guard for GangGuard {
    fn check(&self, ctx: &HubContext) -> Result<(), GuardFailure> {
        let position = ctx
            .model()
            .actor(GANG_ACTOR)
            .value(GANG_KEYWORD, 0)
            .map(|value| match value.as_str() {
                Some(text) => text.to_string(),
                None => value.to_string(),
            });

        let shown = position.as_deref().unwrap_or("n/a");
        let label = position.as_deref().map(gang_label).unwrap_or("?");
        ctx.log().add(
            Severity::Normal,
            Some(GANG_ACTOR),
            format!("{GANG_ACTOR}.gang={shown}  ({label})"),
        );

        if self.require_podium && position.as_deref() != Some(GANG_PODIUM) {
            return Err(GuardFailure(format!(
                "gang connector must be at the podium, not {shown} ({label})"
            )));
        }
        Ok(())
    }
}

/// Build the runner for this script
pub fn runner(guard: GangGuard) -> SequenceRunner {
    SequenceRunner::new(NAME, steps()).with_guard(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_match_commands() {
        let steps = steps();
        assert_eq!(steps.len(), COMMANDS.len());
        assert_eq!(steps[0].actor, "apogeecal");
        assert_eq!(steps[3].command, "expose nreads=3 ; object=Dark");
        assert!(steps.iter().all(|step| step.check_fail));
    }

    #[test]
    fn test_gang_labels() {
        assert_eq!(gang_label("1"), "Podium");
        assert_eq!(gang_label("3"), "Sparse cals");
        assert_eq!(gang_label("12"), "?");
    }
}
