pub mod api;
pub mod config;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod mdns;
pub mod notify;
pub mod scanner;
pub mod store;
