//! MCP server exposing Amadeus hotel search as tools.
//!
//! The crate is a thin protocol adapter: a bounded response cache, a
//! fixed-size pool of authenticated API clients, a performance monitor, and
//! a tool layer that ties them together behind a JSON-RPC stdio transport.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod tools;

pub use auth::BearerAuth;
pub use cache::{cache_key, CacheStats, ResponseCache};
pub use client::{AmadeusClient, HotelSearchApi};
pub use config::Settings;
pub use error::HotelsApiError;
pub use monitor::PerformanceMonitor;
pub use pool::{ClientPool, PoolGuard};
pub use server::McpServer;
pub use tools::HotelTools;
