//! Usage handlers.

mod ingest_usage;

pub use ingest_usage::{IngestResult, IngestUsage};
