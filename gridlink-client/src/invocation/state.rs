//! Invocation lifecycle states.

use std::fmt;

/// The state of a single invocation.
///
/// ```text
/// Created -> Pending -> Completed
///                    -> Failed   -> Created (retry)
///                    -> TimedOut
/// ```
///
/// `Completed`, `TimedOut` and a `Failed` invocation that is not retried are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationState {
    /// Built, not yet handed to a connection.
    Created,
    /// Registered under a correlation id and awaiting its response.
    Pending,
    /// A response arrived.
    Completed,
    /// The attempt failed.
    Failed,
    /// The deadline elapsed.
    TimedOut,
}

impl InvocationState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Created, Pending)
                | (Created, Failed)
                | (Created, TimedOut)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, TimedOut)
                | (Pending, Created)
                | (Failed, Created)
        )
    }

    /// Returns true for states that never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, InvocationState::Completed | InvocationState::TimedOut)
    }

    /// Returns a short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            InvocationState::Created => "CREATED",
            InvocationState::Pending => "PENDING",
            InvocationState::Completed => "COMPLETED",
            InvocationState::Failed => "FAILED",
            InvocationState::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InvocationState::*;

    const ALL: [InvocationState; 5] = [Created, Pending, Completed, Failed, TimedOut];

    #[test]
    fn test_happy_path() {
        assert!(Created.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_retry_path() {
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Created));
        assert!(Pending.can_transition_to(Created));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in ALL {
            assert!(!Completed.can_transition_to(next));
            assert!(!TimedOut.can_transition_to(next));
        }
        assert!(Completed.is_terminal());
        assert!(TimedOut.is_terminal());
        assert!(!Failed.is_terminal());
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_failed_cannot_complete() {
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Created.can_transition_to(Completed));
    }

    #[test]
    fn test_display() {
        assert_eq!(TimedOut.to_string(), "TIMED_OUT");
        assert_eq!(Pending.to_string(), "PENDING");
    }
}
