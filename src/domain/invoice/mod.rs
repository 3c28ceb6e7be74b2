//! Invoices: aggregate, numbering, proration math, and account credits.

mod aggregate;
mod credit;
mod number;
mod proration;
mod status;

pub use aggregate::{Invoice, LineItem, LineItemKind};
pub use credit::{apply_credits, Credit, CreditDraw};
pub use number::InvoiceNumber;
pub use proration::{proration_pair, prorated_cents};
pub use status::InvoiceStatus;
