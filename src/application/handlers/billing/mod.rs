//! Billing handlers: period close, invoice finalization, voids, credits.

mod assembler;
mod close_period;
mod issue_credit;
mod void_invoice;

pub use assembler::InvoiceAssembler;
pub use close_period::ClosePeriod;
pub use issue_credit::IssueCredit;
pub use void_invoice::VoidInvoice;
