//! Session token resolution.
//!
//! The gateway never sees authentication itself; it watches the responses of
//! a configured user-info route, learns which opaque session token belongs to
//! which user and clearance level, and caches that mapping per (port, domain)
//! with a sliding TTL. The token position mini-language describes where in a
//! request or response the token appears.

mod cache;
mod error;
mod position;

pub use cache::{TokenCache, DEFAULT_TTL};
pub use error::{TokenError, TokenResult};
pub use position::{
    cookie_value, form_value, json_path_string, TokenLocation, TokenPosition, TokenSide,
};
