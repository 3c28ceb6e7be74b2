//! Command handlers, one struct per operation.

pub mod billing;
pub mod payment;
pub mod subscription;
pub mod usage;
