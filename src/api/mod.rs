//! HTTP API Module
//!
//! Read-only REST API for node status, peers, locks and heartbeats.

mod http;

pub use http::HttpServer;
