//! Field Masking Module
//!
//! Field-level redaction of JSON response bodies:
//! - Declarative mask-rule mini-language (`all`, `each`, `start`, `middle`,
//!   `end`, with literal and count modes)
//! - Per-field rule sets with one rule per clearance level
//! - Streaming byte-state-machine writer that rewrites values in-flight
//!   without parsing the document into a tree

mod error;
mod rule;
mod writer;

pub use error::{MaskError, MaskResult};
pub use rule::{apply_mask, FieldRule, FieldScope};
pub use writer::{mask_document, MaskingWriter};
