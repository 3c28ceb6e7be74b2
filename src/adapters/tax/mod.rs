//! Tax service adapters.

mod http_tax_service;

pub use http_tax_service::HttpTaxService;
