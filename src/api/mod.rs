//! HTTP API server for crawl control, search, and statistics.
//!
//! Thin JSON endpoints over the crawl manager and the search engine;
//! operator errors surface as 400s with their message, everything else
//! is logged and returned as an opaque 500.

mod error;
mod indexing;
mod search;
mod server;
mod state;

pub use server::start_http_server;
pub use state::ApiState;
