//! hotsheet gateway library
//!
//! Server-side boundary between the SKU card / Hot Sheet builder and the
//! third-party services it depends on: an LLM for brand research, a
//! background-removal API, an image-search API, and arbitrary image hosts.
//! Every outbound call is gated by an origin check, a per-route rate limit,
//! and, where a URL comes from the client, a syntactic SSRF guard.

pub mod cli;
pub mod config;
pub mod deadline;
pub mod logging;
pub mod media;
pub mod providers;
pub mod security;
pub mod server;
