//! # Configuration System
//!
//! TOML-based process configuration for the gateway: the instance name, the
//! seed file holding the routing tables, listener drain behavior, and the
//! logging setup. Routing state itself lives in the seed and is managed at
//! runtime by the proxy manager, not here.
//!
//! ## Example Configuration
//!
//! ```toml
//! [gateway]
//! name = "edge-gateway"
//! seed_file = "/etc/veil/seed.toml"
//! drain_grace_secs = 10
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{GatewayConfig, GatewaySection, LogFormat, LogLevel, LoggingConfig};
