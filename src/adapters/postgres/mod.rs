//! PostgreSQL adapters.
//!
//! Schema expected by these adapters:
//!
//! ```sql
//! CREATE TABLE subscriptions (
//!     id UUID PRIMARY KEY,
//!     account_id UUID NOT NULL,
//!     status TEXT NOT NULL,
//!     period_end TIMESTAMPTZ NOT NULL,
//!     body TEXT NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX subscriptions_due ON subscriptions (status, period_end);
//!
//! CREATE TABLE invoices (
//!     id UUID PRIMARY KEY,
//!     account_id UUID NOT NULL,
//!     subscription_id UUID NOT NULL,
//!     status TEXT NOT NULL,
//!     period_start TIMESTAMPTZ NOT NULL,
//!     due_at TIMESTAMPTZ,
//!     supplemental BOOLEAN NOT NULL,
//!     body TEXT NOT NULL
//! );
//! CREATE INDEX invoices_open_due ON invoices (status, due_at);
//! CREATE SEQUENCE invoice_numbers START 1;
//!
//! CREATE TABLE subscription_history (
//!     id BIGSERIAL PRIMARY KEY,
//!     subscription_id UUID NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL,
//!     body TEXT NOT NULL
//! );
//! ```

mod advisory_lock;
mod history_store;
mod invoice_repository;
mod subscription_repository;

pub use advisory_lock::PgAdvisoryLock;
pub use history_store::PostgresHistoryStore;
pub use invoice_repository::PostgresInvoiceRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
