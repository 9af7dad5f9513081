//! # Veil Gateway
//!
//! A multi-tenant reverse-proxy gateway that terminates TLS, routes requests
//! by port, domain, and path, load-balances across weighted upstream targets,
//! and redacts sensitive JSON response fields per caller clearance level.
//!
//! ## Features
//!
//! - Per-port listeners started and stopped with route configuration
//! - RSA and SM dual-certificate TLS selected per ClientHello, with
//!   plaintext fallback on the same port
//! - Path routing over a segment trie with literal, regex, and wildcard
//!   segments
//! - Round-robin, weighted-random, and IP-hash target selection
//! - Streaming JSON field masking driven by a session-token clearance cache
//!
//! ## Architecture
//!
//! [`modules::proxy::ProxyManager`] is the hub: configuration operations
//! mutate its routing state, and every accepted connection resolves against
//! it. The remaining modules under [`modules`] each own one concern and are
//! composed by the manager.

pub mod config;
pub mod modules;
pub mod provider;
