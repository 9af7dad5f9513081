//! Weighted target sets.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use super::error::{LoadBalancerError, LoadBalancerResult};
use super::policy::{fnv1a32, Policy};

/// One upstream target of a route.
#[derive(Debug, Clone)]
pub struct Target {
    /// Base URL of the upstream, e.g. `https://10.0.0.1:8443`.
    pub url: String,
    /// Positive selection weight.
    pub weight: u32,
}

/// The weighted targets of one route path, with round-robin state.
///
/// Mutations keep two invariants: the cursor stays below the target count,
/// and `weight_total` equals the sum of member weights.
#[derive(Debug)]
pub struct TargetSet {
    path: String,
    targets: Vec<Target>,
    weight_total: u32,
    cursor: AtomicUsize,
}

impl TargetSet {
    /// Create an empty set for a route path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            targets: Vec::new(),
            weight_total: 0,
            cursor: AtomicUsize::new(0),
        }
    }

    /// The route path this set belongs to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the set has no targets left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The member target URLs, in insertion order.
    #[must_use]
    pub fn target_urls(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.url.clone()).collect()
    }

    /// Register a target. A URL already present is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error when the weight is zero. Weights are positive, which
    /// keeps the weighted-random draw over a non-empty range.
    pub fn add_target(&mut self, url: impl Into<String>, weight: u32) -> LoadBalancerResult<()> {
        let url = url.into();
        if weight == 0 {
            return Err(LoadBalancerError::ZeroWeight(url));
        }
        if self.targets.iter().any(|t| t.url == url) {
            return Ok(());
        }
        self.weight_total += weight;
        self.targets.push(Target { url, weight });
        Ok(())
    }

    /// Deregister a target by URL. Returns whether the set is now empty.
    pub fn remove_target(&mut self, url: &str) -> bool {
        if let Some(pos) = self.targets.iter().position(|t| t.url == url) {
            let removed = self.targets.remove(pos);
            self.weight_total -= removed.weight;
            // Keep the cursor in bounds after shrinking.
            if self.cursor.load(Ordering::Relaxed) >= self.targets.len() {
                self.cursor.store(0, Ordering::Relaxed);
            }
        }
        self.targets.is_empty()
    }

    /// Pick a target URL under the given policy.
    ///
    /// # Errors
    ///
    /// Returns an error when the set is empty.
    pub fn select(&self, policy: Policy, client_ip: &str) -> LoadBalancerResult<String> {
        if self.targets.is_empty() {
            return Err(LoadBalancerError::NoTargets(self.path.clone()));
        }
        let target = match policy {
            Policy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.targets.len();
                &self.targets[idx]
            }
            Policy::WeightedRandom => {
                let mut remaining = rand::rng().random_range(0..self.weight_total);
                let mut chosen = &self.targets[0];
                for target in &self.targets {
                    if remaining < target.weight {
                        chosen = target;
                        break;
                    }
                    remaining -= target.weight;
                }
                chosen
            }
            Policy::IpHash => {
                let idx = fnv1a32(client_ip) as usize % self.targets.len();
                &self.targets[idx]
            }
        };
        Ok(target.url.clone())
    }
}
