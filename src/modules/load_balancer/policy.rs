//! Balancing policies.

use serde::{Deserialize, Serialize};

use super::error::{LoadBalancerError, LoadBalancerResult};

/// How a target is picked from a route's target set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Cycle through targets in insertion order.
    #[default]
    RoundRobin,
    /// Draw proportionally to target weights.
    WeightedRandom,
    /// Stable per-client-IP choice while the target set is unchanged.
    IpHash,
}

impl Policy {
    /// Map a numeric policy code from route configuration (1 = round robin,
    /// 2 = weighted random, 3 = IP hash).
    ///
    /// # Errors
    ///
    /// Returns an error for codes outside 1..=3.
    pub fn from_code(code: u8) -> LoadBalancerResult<Self> {
        match code {
            1 => Ok(Self::RoundRobin),
            2 => Ok(Self::WeightedRandom),
            3 => Ok(Self::IpHash),
            other => Err(LoadBalancerError::UnknownPolicy(other.to_string())),
        }
    }

    /// The policy's configuration name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::WeightedRandom => "weighted-random",
            Self::IpHash => "ip-hash",
        }
    }
}

/// 32-bit FNV-1a over a byte string. Non-cryptographic; used only so the same
/// client IP keeps landing on the same target.
#[must_use]
pub fn fnv1a32(data: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in data.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_codes() {
        assert_eq!(Policy::from_code(1).unwrap(), Policy::RoundRobin);
        assert_eq!(Policy::from_code(2).unwrap(), Policy::WeightedRandom);
        assert_eq!(Policy::from_code(3).unwrap(), Policy::IpHash);
        assert!(matches!(
            Policy::from_code(0),
            Err(LoadBalancerError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn test_policy_serde_names() {
        let json = serde_json::to_string(&Policy::IpHash).unwrap();
        assert_eq!(json, "\"ip-hash\"");
        let policy: Policy = serde_json::from_str("\"weighted-random\"").unwrap();
        assert_eq!(policy, Policy::WeightedRandom);
    }

    #[test]
    fn test_fnv1a32_reference_values() {
        // Standard FNV-1a test vectors.
        assert_eq!(fnv1a32(""), 0x811c_9dc5);
        assert_eq!(fnv1a32("a"), 0xe40c_292c);
        assert_eq!(fnv1a32("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_fnv1a32_is_stable() {
        assert_eq!(fnv1a32("192.168.1.100"), fnv1a32("192.168.1.100"));
        assert_ne!(fnv1a32("192.168.1.100"), fnv1a32("192.168.1.101"));
    }
}
