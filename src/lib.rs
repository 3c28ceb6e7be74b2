//! Cyclebill - Recurring Billing Engine
//!
//! This crate implements subscription lifecycle management, prorated and
//! metered invoicing, payment orchestration with fixed-schedule retries,
//! and dunning, behind async ports with in-memory, HTTP, and PostgreSQL
//! adapters.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
