//! Invoice statuses.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Invoice lifecycle. Line items may only change while `Draft`; `Open`
/// invoices are immutable except for settlement or voiding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
}

impl StateMachine for InvoiceStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, target),
            (Draft, Open) | (Draft, Void) | (Open, Paid) | (Open, Void)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use InvoiceStatus::*;
        match self {
            Draft => vec![Open, Void],
            Open => vec![Paid, Void],
            Paid => vec![],
            Void => vec![],
        }
    }
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_open_or_void() {
        assert!(InvoiceStatus::Draft.can_transition_to(&InvoiceStatus::Open));
        assert!(InvoiceStatus::Draft.can_transition_to(&InvoiceStatus::Void));
        assert!(!InvoiceStatus::Draft.can_transition_to(&InvoiceStatus::Paid));
    }

    #[test]
    fn paid_and_void_are_terminal() {
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(InvoiceStatus::Void.is_terminal());
    }

    #[test]
    fn paid_cannot_be_voided() {
        assert!(!InvoiceStatus::Paid.can_transition_to(&InvoiceStatus::Void));
    }
}
