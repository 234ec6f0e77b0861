use crate::execution::ExecutionStatus;

/// How the store treats status updates that skip or reverse the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may be written at any time; last writer wins.
    #[default]
    Permissive,
    /// Only the lifecycle edges in [`is_allowed`] are accepted.
    Strict,
}

impl TransitionPolicy {
    pub fn permits(self, from: ExecutionStatus, to: ExecutionStatus) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => is_allowed(from, to),
        }
    }
}

/// queued -> running, running -> any terminal status, and any
/// non-terminal status -> canceled.
pub fn is_allowed(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    use crate::execution::ExecutionStatus::*;

    match (from, to) {
        (Queued, Running) => true,
        (Running, Completed | Failed | Canceled | Timeout) => true,
        (from, Canceled) => !from.is_terminal(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionStatus::*;

    #[test]
    fn lifecycle_edges_are_allowed() {
        assert!(is_allowed(Queued, Running));
        for terminal in [Completed, Failed, Canceled, Timeout] {
            assert!(is_allowed(Running, terminal));
        }
        assert!(is_allowed(Queued, Canceled));
    }

    #[test]
    fn terminal_statuses_are_final() {
        for from in [Completed, Failed, Canceled, Timeout] {
            for to in ExecutionStatus::ALL {
                assert!(!is_allowed(from, to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn skipping_running_is_rejected() {
        assert!(!is_allowed(Queued, Completed));
        assert!(!is_allowed(Queued, Timeout));
        assert!(!is_allowed(Running, Queued));
        assert!(!is_allowed(Running, Running));
    }

    #[test]
    fn permissive_accepts_everything() {
        for from in ExecutionStatus::ALL {
            for to in ExecutionStatus::ALL {
                assert!(TransitionPolicy::Permissive.permits(from, to));
            }
        }
        assert!(!TransitionPolicy::Strict.permits(Completed, Queued));
        assert_eq!(TransitionPolicy::default(), TransitionPolicy::Permissive);
    }
}
