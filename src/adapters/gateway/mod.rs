//! Payment gateway adapters.

mod http_gateway;

pub use http_gateway::HttpPaymentGateway;
