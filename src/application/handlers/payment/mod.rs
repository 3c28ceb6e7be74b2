//! Payment collection and reconciliation handlers.

mod collect_invoice;
mod reconcile;

pub use collect_invoice::{CollectInvoicePayment, CollectionOutcome};
pub use reconcile::ReconcilePayments;
