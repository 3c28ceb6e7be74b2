//! Adapter implementations of the ports.

pub mod gateway;
pub mod memory;
pub mod notify;
pub mod postgres;
pub mod tax;
