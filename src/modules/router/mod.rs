//! Path routing over a segment trie.
//!
//! Paths are split on `/` into segments of three kinds: literals, `{regex}`
//! tokens, and the `*` wildcard. Matching walks the trie level by level with
//! literal > regex > wildcard precedence among siblings; when a request path
//! is deeper than any registered route, the closest enclosing route wins.
//! Each terminal route carries caller metadata and a masking field map.

mod error;
mod segment;
mod trie;

pub use error::{RouterError, RouterResult};
pub use segment::split_path;
pub use trie::{validate_path, Route, Router};
