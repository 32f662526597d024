use std::fmt;

use serde::{Deserialize, Serialize};

/// States of the regeneration workflow.
///
/// Each round flows through: IDLE → SUBMITTING → POLLING → {COMPLETED,
/// FAILED, TIMED_OUT} → IDLE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegenState {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl RegenState {
    pub fn is_busy(self) -> bool {
        !matches!(self, RegenState::Idle)
    }
}

impl fmt::Display for RegenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegenState::Idle => write!(f, "IDLE"),
            RegenState::Submitting => write!(f, "SUBMITTING"),
            RegenState::Polling => write!(f, "POLLING"),
            RegenState::Completed => write!(f, "COMPLETED"),
            RegenState::Failed => write!(f, "FAILED"),
            RegenState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Inputs that drive the regeneration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenEvent {
    /// User asked to regenerate `selected` characters.
    Submit { selected: usize },
    /// Server accepted the request.
    Accepted,
    SubmitFailed,
    PollCompleted,
    PollFailed,
    BudgetExhausted,
    /// Workflow torn down or job replaced while polling.
    Abandoned,
    /// Terminal handling (notifications, reloads) is done.
    Finished,
}

/// The result of evaluating a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Advance to the next state.
    Next(RegenState),
    /// The event is not valid in the current state; the state is unchanged.
    Rejected {
        state: RegenState,
        reason: &'static str,
    },
}

/// Drives a regeneration round through its states.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: RegenState,
    history: Vec<RegenState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RegenState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> RegenState {
        self.state
    }

    /// States left behind in the current or last round, oldest first.
    pub fn history(&self) -> &[RegenState] {
        &self.history
    }

    /// Compute the transition for `event` and apply it.
    ///
    /// - `Idle` accepts only a non-empty `Submit`.
    /// - `Submitting` resolves to `Polling` or back to `Idle`.
    /// - `Polling` resolves to one terminal state, or `Idle` when abandoned.
    /// - Terminal states return to `Idle` on `Finished`.
    pub fn next(&mut self, event: RegenEvent) -> Transition {
        let transition = Self::evaluate(self.state, event);
        if let Transition::Next(next) = transition {
            // A new round starts from Idle; earlier rounds are not kept.
            if self.state == RegenState::Idle {
                self.history.clear();
            }
            self.history.push(self.state);
            self.state = next;
        }
        transition
    }

    fn evaluate(state: RegenState, event: RegenEvent) -> Transition {
        use RegenEvent as E;
        use RegenState as S;

        match (state, event) {
            (S::Idle, E::Submit { selected: 0 }) => Transition::Rejected {
                state,
                reason: "no characters selected",
            },
            (S::Idle, E::Submit { .. }) => Transition::Next(S::Submitting),
            (S::Submitting, E::Accepted) => Transition::Next(S::Polling),
            (S::Submitting, E::SubmitFailed) => Transition::Next(S::Idle),
            (S::Polling, E::PollCompleted) => Transition::Next(S::Completed),
            (S::Polling, E::PollFailed) => Transition::Next(S::Failed),
            (S::Polling, E::BudgetExhausted) => Transition::Next(S::TimedOut),
            (S::Polling, E::Abandoned) => Transition::Next(S::Idle),
            (S::Completed | S::Failed | S::TimedOut, E::Finished) => Transition::Next(S::Idle),
            (_, E::Submit { .. }) => Transition::Rejected {
                state,
                reason: "a regeneration is already running",
            },
            _ => Transition::Rejected {
                state,
                reason: "event not valid in this state",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_states() {
        let mut machine = StateMachine::new();
        assert_eq!(machine.state(), RegenState::Idle);

        let t = machine.next(RegenEvent::Submit { selected: 2 });
        assert_eq!(t, Transition::Next(RegenState::Submitting));

        let t = machine.next(RegenEvent::Accepted);
        assert_eq!(t, Transition::Next(RegenState::Polling));

        let t = machine.next(RegenEvent::PollCompleted);
        assert_eq!(t, Transition::Next(RegenState::Completed));

        let t = machine.next(RegenEvent::Finished);
        assert_eq!(t, Transition::Next(RegenState::Idle));

        assert_eq!(
            machine.history(),
            &[
                RegenState::Idle,
                RegenState::Submitting,
                RegenState::Polling,
                RegenState::Completed
            ]
        );
    }

    #[test]
    fn empty_selection_is_rejected_and_stays_idle() {
        let mut machine = StateMachine::new();
        let t = machine.next(RegenEvent::Submit { selected: 0 });
        assert!(matches!(
            t,
            Transition::Rejected {
                state: RegenState::Idle,
                ..
            }
        ));
        assert_eq!(machine.state(), RegenState::Idle);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn submit_failure_returns_to_idle() {
        let mut machine = StateMachine::new();
        machine.next(RegenEvent::Submit { selected: 1 });
        let t = machine.next(RegenEvent::SubmitFailed);
        assert_eq!(t, Transition::Next(RegenState::Idle));
    }

    #[test]
    fn timeout_and_failure_are_terminal_until_finished() {
        let mut machine = StateMachine::new();
        machine.next(RegenEvent::Submit { selected: 1 });
        machine.next(RegenEvent::Accepted);
        assert_eq!(
            machine.next(RegenEvent::BudgetExhausted),
            Transition::Next(RegenState::TimedOut)
        );
        assert!(matches!(
            machine.next(RegenEvent::PollCompleted),
            Transition::Rejected { .. }
        ));
        assert_eq!(machine.state(), RegenState::TimedOut);
        machine.next(RegenEvent::Finished);
        assert_eq!(machine.state(), RegenState::Idle);
    }

    #[test]
    fn second_submit_while_busy_is_rejected() {
        let mut machine = StateMachine::new();
        machine.next(RegenEvent::Submit { selected: 3 });
        machine.next(RegenEvent::Accepted);
        let t = machine.next(RegenEvent::Submit { selected: 1 });
        assert_eq!(
            t,
            Transition::Rejected {
                state: RegenState::Polling,
                reason: "a regeneration is already running"
            }
        );
        assert!(machine.state().is_busy());
    }

    #[test]
    fn abandoned_poll_returns_to_idle() {
        let mut machine = StateMachine::new();
        machine.next(RegenEvent::Submit { selected: 1 });
        machine.next(RegenEvent::Accepted);
        assert_eq!(
            machine.next(RegenEvent::Abandoned),
            Transition::Next(RegenState::Idle)
        );
    }

    #[test]
    fn history_only_keeps_the_latest_round() {
        let mut machine = StateMachine::new();
        for _ in 0..5 {
            machine.next(RegenEvent::Submit { selected: 1 });
            machine.next(RegenEvent::Accepted);
            machine.next(RegenEvent::PollFailed);
            machine.next(RegenEvent::Finished);
        }
        assert_eq!(
            machine.history(),
            &[
                RegenState::Idle,
                RegenState::Submitting,
                RegenState::Polling,
                RegenState::Failed
            ]
        );

        machine.next(RegenEvent::Submit { selected: 1 });
        assert_eq!(machine.history(), &[RegenState::Idle]);
    }

    #[test]
    fn state_display() {
        assert_eq!(RegenState::Idle.to_string(), "IDLE");
        assert_eq!(RegenState::TimedOut.to_string(), "TIMED_OUT");
    }
}
