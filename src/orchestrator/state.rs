//! Run stages and the transitions allowed between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of an alignment run.
///
/// ```text
/// Unconfigured → Configured → FeasibilityChecked → Slewing → AcquiringPair
///   → Estimating → Correcting → Verifying → (AcquiringPair …) → Completed
/// any stage after perturbation → Recovering → Recovered | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Unconfigured,
    Configured,
    FeasibilityChecked,
    Slewing,
    AcquiringPair,
    Estimating,
    Correcting,
    Verifying,
    Completed,
    Recovering,
    Recovered,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Recovered | RunState::Failed
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (_, Recovering) => !matches!(self, Unconfigured | Configured | Recovering)
                && !self.is_terminal(),
            (_, Failed) => !self.is_terminal(),
            (Unconfigured, Configured) => true,
            (Configured, FeasibilityChecked) => true,
            (FeasibilityChecked, Slewing) => true,
            (Slewing, AcquiringPair) => true,
            (AcquiringPair, Estimating) => true,
            (Estimating, Correcting) => true,
            (Correcting, Verifying) | (Correcting, Completed) => true,
            (Verifying, AcquiringPair) | (Verifying, Completed) => true,
            (Recovering, Recovered) => true,
            // A finished run can be configured and run again.
            (Completed | Recovered | Failed, Configured) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_path_is_legal() {
        let path = [
            RunState::Unconfigured,
            RunState::Configured,
            RunState::FeasibilityChecked,
            RunState::Slewing,
            RunState::AcquiringPair,
            RunState::Estimating,
            RunState::Correcting,
            RunState::Verifying,
            RunState::AcquiringPair,
            RunState::Estimating,
            RunState::Correcting,
            RunState::Completed,
        ];
        for w in path.windows(2) {
            assert!(w[0].can_transition_to(w[1]), "{} -> {}", w[0], w[1]);
        }
    }

    #[test]
    fn recovery_only_after_perturbation() {
        assert!(!RunState::Configured.can_transition_to(RunState::Recovering));
        assert!(RunState::Configured.can_transition_to(RunState::Failed));
        assert!(RunState::Estimating.can_transition_to(RunState::Recovering));
        assert!(RunState::Recovering.can_transition_to(RunState::Failed));
        assert!(!RunState::Completed.can_transition_to(RunState::Recovering));
    }

    #[test]
    fn no_skipping_stages() {
        assert!(!RunState::Slewing.can_transition_to(RunState::Estimating));
        assert!(!RunState::Configured.can_transition_to(RunState::Slewing));
    }
}
