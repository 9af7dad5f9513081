//! # Gateway Modules
//!
//! Each module owns one concern of the proxy pipeline.
//!
//! - [`router`] - Path routing over a segment trie with literal, regex, and
//!   wildcard segments
//! - [`load_balancer`] - Weighted target sets with round-robin,
//!   weighted-random, and IP-hash selection
//! - [`tls`] - Dual-certificate stores, per-ClientHello certificate
//!   selection, and first-byte protocol sniffing
//! - [`token_cache`] - Session-token to clearance-level cache with sliding
//!   expiry and token-position extraction
//! - [`masking`] - Streaming JSON field redaction
//! - [`proxy`] - The reverse-proxy core tying the others together

pub mod load_balancer;
pub mod masking;
pub mod proxy;
pub mod router;
pub mod tls;
pub mod token_cache;
