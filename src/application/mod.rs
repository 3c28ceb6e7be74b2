//! Application layer: command handlers, the periodic sweeps, and the
//! wiring that assembles them from port implementations.

pub mod engine;
pub mod handlers;
pub mod sweeps;

pub use engine::{BillingEngine, EnginePorts};
