//! Library half of the shortener API binary, split out so integration
//! tests can assemble the same HTTP stack `main.rs` runs in production.

pub mod api;
pub mod bus;
pub mod config;
pub mod fraud_scanner;
pub mod kv;
pub mod rate_limit;
pub mod store;
