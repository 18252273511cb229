//! Library crate for sublist-web-rs exposing reusable modules.
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod ports;
pub mod ratelimit;
pub mod resolver;
pub mod scanner;
pub mod server;
pub mod store;
pub mod types;
pub mod validate;
