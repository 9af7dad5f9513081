//! Reverse-proxy core.
//!
//! [`ProxyManager`] owns the full routing picture: per-port listeners, the
//! domain routers behind them, the weighted target sets, certificates, and
//! the token cache. Listeners come and go with configuration: registering a
//! route on an unused port starts one, removing the last route on a port
//! drains and stops it. Each accepted connection is sniffed for a TLS
//! handshake byte so one port serves both TLS and plaintext clients.

mod body;
mod error;
mod forward;
mod handler;
mod manager;
mod server;
mod trace;

pub use body::MaskingBody;
pub use error::{ProxyError, ProxyResult};
pub use forward::{empty_body, full_body, incoming_body, ProxyBody, UpstreamClient};
pub use handler::NO_MASKING_HEADER;
pub use manager::{ProxyManager, ResolvedRoute, RouteMeta, DEFAULT_DRAIN_GRACE};
