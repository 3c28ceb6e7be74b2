//! Pure domain model: no IO, no clocks, no storage.

pub mod foundation;
pub mod invoice;
pub mod payment;
pub mod plan;
pub mod subscription;
pub mod usage;
