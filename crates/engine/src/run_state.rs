//! Run-level state machine: `Idle -> Running -> {Finished | Failed | Cancelled}`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Finished => "finished",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    pub fn is_running(&self) -> bool {
        *self == RunState::Running
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Finished | RunState::Failed | RunState::Cancelled
        )
    }

    /// Idle -> Running
    pub fn start(&mut self) -> bool {
        self.transition(RunState::Idle, RunState::Running)
    }

    /// Running -> Finished
    pub fn finish(&mut self) -> bool {
        self.transition(RunState::Running, RunState::Finished)
    }

    /// Running -> Failed
    pub fn fail(&mut self) -> bool {
        self.transition(RunState::Running, RunState::Failed)
    }

    /// Running -> Cancelled
    pub fn cancel(&mut self) -> bool {
        self.transition(RunState::Running, RunState::Cancelled)
    }

    fn transition(&mut self, from: RunState, to: RunState) -> bool {
        if *self != from {
            return false;
        }
        *self = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_happy_path() {
        let mut state = RunState::default();
        assert!(state.start());
        assert!(state.is_running());
        assert!(state.finish());
        assert_eq!(state, RunState::Finished);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut state = RunState::Idle;
        assert!(state.start());
        assert!(!state.start());
    }

    #[test]
    fn test_state_names_match_serde() {
        for state in [
            RunState::Idle,
            RunState::Running,
            RunState::Finished,
            RunState::Failed,
            RunState::Cancelled,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn test_cancel_requires_running() {
        let mut state = RunState::Idle;
        assert!(!state.cancel());
        assert_eq!(state, RunState::Idle);
    }

    // Random sequences of transitions never leave a terminal state
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_terminal_states_are_sticky(ops in proptest::collection::vec(0u8..4, 0..16)) {
            let mut state = RunState::Idle;
            let mut terminal: Option<RunState> = None;

            for op in ops {
                match op {
                    0 => { state.start(); }
                    1 => { state.finish(); }
                    2 => { state.fail(); }
                    _ => { state.cancel(); }
                }
                if let Some(t) = terminal {
                    prop_assert_eq!(state, t);
                } else if state.is_terminal() {
                    terminal = Some(state);
                }
            }
        }
    }
}
