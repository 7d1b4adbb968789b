use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal state of the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Completing,
    Failing,
    Aborting,
}

impl Phase {
    pub fn is_idle(self) -> bool {
        self == Phase::Idle
    }
}

/// What the UI shows. A projection of [`Phase`] plus agent readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Thinking,
    Executing,
    Streaming,
    Error,
    Initializing,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Idle => "Idle",
            Status::Thinking => "Thinking...",
            Status::Executing => "Executing tool...",
            Status::Streaming => "Streaming...",
            Status::Error => "Error",
            Status::Initializing => "Initializing Agent...",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Exchange details the projection needs beyond the phase itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub agent_ready: bool,
    pub tools_open: bool,
    pub content_seen: bool,
}

pub fn project(phase: Phase, inputs: StatusInputs) -> Status {
    match phase {
        Phase::Sending => Status::Thinking,
        Phase::Streaming if inputs.tools_open => Status::Executing,
        Phase::Streaming if inputs.content_seen => Status::Streaming,
        Phase::Streaming => Status::Thinking,
        Phase::Failing => Status::Error,
        Phase::Idle | Phase::Completing | Phase::Aborting => {
            if inputs.agent_ready {
                Status::Idle
            } else {
                Status::Initializing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> StatusInputs {
        StatusInputs {
            agent_ready: true,
            ..Default::default()
        }
    }

    #[test]
    fn idle_depends_on_readiness() {
        assert_eq!(project(Phase::Idle, ready()), Status::Idle);
        assert_eq!(
            project(Phase::Idle, StatusInputs::default()),
            Status::Initializing
        );
    }

    #[test]
    fn streaming_prefers_executing_tools() {
        let inputs = StatusInputs {
            agent_ready: true,
            tools_open: true,
            content_seen: true,
        };
        assert_eq!(project(Phase::Streaming, inputs), Status::Executing);
        assert_eq!(
            project(
                Phase::Streaming,
                StatusInputs {
                    tools_open: false,
                    ..inputs
                }
            ),
            Status::Streaming
        );
        assert_eq!(project(Phase::Streaming, ready()), Status::Thinking);
    }

    #[test]
    fn terminal_phases() {
        assert_eq!(project(Phase::Sending, ready()), Status::Thinking);
        assert_eq!(project(Phase::Failing, ready()), Status::Error);
        assert_eq!(project(Phase::Completing, ready()), Status::Idle);
        assert_eq!(project(Phase::Aborting, ready()), Status::Idle);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Status::Initializing).unwrap(),
            "\"initializing\""
        );
        assert_eq!(Status::Executing.label(), "Executing tool...");
    }
}
