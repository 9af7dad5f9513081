//! Upstream target selection.
//!
//! Each route path owns a [`TargetSet`] of weighted upstream URLs. A set is
//! created when the first target of a path registers and torn down when its
//! last target leaves. Three policies are supported: round robin, weighted
//! random, and sticky IP hash.

mod error;
mod policy;
mod target;

pub use error::{LoadBalancerError, LoadBalancerResult};
pub use policy::{fnv1a32, Policy};
pub use target::{Target, TargetSet};
