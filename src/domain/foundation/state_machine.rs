//! State machine trait for lifecycle status enums.
//!
//! Subscription, invoice, and payment-attempt statuses all follow the same
//! pattern: a closed set of states with an explicit transition table. The
//! trait keeps the table in one place per status and gives every status a
//! validated `transition_to`.

use super::errors::BillingError;

/// Trait for status enums that represent state machines.
///
/// Implementors define the valid transition table; validated transitions
/// come for free.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from the current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs a transition with validation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the transition table does not
    /// allow moving from the current state to `target`.
    fn transition_to(&self, target: Self) -> Result<Self, BillingError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(BillingError::invalid_transition(
                std::any::type_name::<Self>(),
                self,
                target,
            ))
        }
    }

    /// Checks if the current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum AttemptPhase {
        Queued,
        Submitted,
        Settled,
    }

    impl StateMachine for AttemptPhase {
        fn can_transition_to(&self, target: &Self) -> bool {
            use AttemptPhase::*;
            matches!((self, target), (Queued, Submitted) | (Submitted, Settled))
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use AttemptPhase::*;
            match self {
                Queued => vec![Submitted],
                Submitted => vec![Settled],
                Settled => vec![],
            }
        }
    }

    #[test]
    fn valid_transition_succeeds() {
        let next = AttemptPhase::Queued
            .transition_to(AttemptPhase::Submitted)
            .unwrap();
        assert_eq!(next, AttemptPhase::Submitted);
    }

    #[test]
    fn invalid_transition_returns_typed_error() {
        let err = AttemptPhase::Queued
            .transition_to(AttemptPhase::Settled)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[test]
    fn terminal_state_has_no_transitions() {
        assert!(AttemptPhase::Settled.is_terminal());
        assert!(!AttemptPhase::Queued.is_terminal());
    }

    #[test]
    fn table_and_listing_agree() {
        for phase in [AttemptPhase::Queued, AttemptPhase::Submitted, AttemptPhase::Settled] {
            for target in phase.valid_transitions() {
                assert!(phase.can_transition_to(&target));
            }
        }
    }
}
