//! The token → clearance cache.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Sliding TTL on every entry: three days, refreshed on each read.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 3);

/// Cache key scope: entries never leak across ports or domains.
type Scope = (u16, String, String);

#[derive(Debug)]
struct TokenEntry {
    level: u8,
    username: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct UserEntry {
    tokens: HashSet<String>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Maps {
    /// (port, domain, token) → clearance + username.
    forward: HashMap<Scope, TokenEntry>,
    /// (port, domain, username) → live tokens, for level rewrites.
    inverse: HashMap<Scope, UserEntry>,
}

/// Maps session tokens to the clearance level and username resolved when the
/// user authenticated, scoped per (port, domain).
///
/// Expiry is lazy: entries are dropped when read or rewritten after their
/// deadline. A read refreshes both the token's deadline and its user's.
#[derive(Debug)]
pub struct TokenCache {
    maps: RwLock<Maps>,
    ttl: Duration,
}

impl TokenCache {
    /// Create a cache with the default three-day sliding TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a cache with an explicit TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            ttl,
        }
    }

    /// Record a token's clearance level and username.
    pub fn cache(&self, port: u16, domain: &str, token: &str, level: u8, username: &str) {
        let expires_at = Instant::now() + self.ttl;
        let mut maps = match self.maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        maps.forward.insert(
            (port, domain.to_string(), token.to_string()),
            TokenEntry {
                level,
                username: username.to_string(),
                expires_at,
            },
        );
        let user = maps
            .inverse
            .entry((port, domain.to_string(), username.to_string()))
            .or_insert_with(|| UserEntry {
                tokens: HashSet::new(),
                expires_at,
            });
        user.tokens.insert(token.to_string());
        user.expires_at = expires_at;
    }

    /// Resolve a token to `(level, username)`, refreshing its TTL.
    ///
    /// Expired entries are removed and report as absent.
    #[must_use]
    pub fn resolve(&self, port: u16, domain: &str, token: &str) -> Option<(u8, String)> {
        let now = Instant::now();
        let key = (port, domain.to_string(), token.to_string());
        let mut maps = match self.maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let expired = matches!(maps.forward.get(&key), Some(entry) if entry.expires_at <= now);
        if expired {
            if let Some(entry) = maps.forward.remove(&key) {
                let user_key = (port, domain.to_string(), entry.username);
                if let Some(user) = maps.inverse.get_mut(&user_key) {
                    user.tokens.remove(token);
                }
            }
            return None;
        }
        let entry = maps.forward.get_mut(&key)?;
        entry.expires_at = now + self.ttl;
        let result = (entry.level, entry.username.clone());
        let user_key = (port, domain.to_string(), result.1.clone());
        if let Some(user) = maps.inverse.get_mut(&user_key) {
            user.expires_at = now + self.ttl;
        }
        Some(result)
    }

    /// Rewrite the clearance level of every live token a user holds under one
    /// (port, domain). Dead tokens are pruned from the user's set.
    pub fn set_service_level(&self, port: u16, domain: &str, username: &str, level: u8) {
        let mut maps = match self.maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::rewrite_scope(&mut maps, port, domain, username, level, self.ttl);
    }

    /// Rewrite the clearance level of every live token a user holds across
    /// all ports and domains.
    pub fn set_user_global_level(&self, username: &str, level: u8) {
        let mut maps = match self.maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let scopes: Vec<(u16, String)> = maps
            .inverse
            .keys()
            .filter(|(_, _, name)| name == username)
            .map(|(port, domain, _)| (*port, domain.clone()))
            .collect();
        for (port, domain) in scopes {
            Self::rewrite_scope(&mut maps, port, &domain, username, level, self.ttl);
        }
    }

    fn rewrite_scope(
        maps: &mut Maps,
        port: u16,
        domain: &str,
        username: &str,
        level: u8,
        ttl: Duration,
    ) {
        let now = Instant::now();
        let user_key = (port, domain.to_string(), username.to_string());
        let Some(user) = maps.inverse.get(&user_key) else {
            return;
        };
        let tokens: Vec<String> = user.tokens.iter().cloned().collect();
        let mut dead = Vec::new();
        for token in tokens {
            let key = (port, domain.to_string(), token.clone());
            match maps.forward.get_mut(&key) {
                Some(entry) if entry.expires_at > now => {
                    entry.level = level;
                    entry.expires_at = now + ttl;
                }
                Some(_) => {
                    maps.forward.remove(&key);
                    dead.push(token);
                }
                None => dead.push(token),
            }
        }
        if let Some(user) = maps.inverse.get_mut(&user_key) {
            for token in dead {
                user.tokens.remove(&token);
            }
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_and_resolve() {
        let cache = TokenCache::new();
        cache.cache(8443, "a.example.com", "tk-1", 3, "alice");

        let (level, username) = cache.resolve(8443, "a.example.com", "tk-1").unwrap();
        assert_eq!(level, 3);
        assert_eq!(username, "alice");
    }

    #[test]
    fn test_scoped_by_port_and_domain() {
        let cache = TokenCache::new();
        cache.cache(8443, "a.example.com", "tk-1", 3, "alice");

        assert!(cache.resolve(9443, "a.example.com", "tk-1").is_none());
        assert!(cache.resolve(8443, "b.example.com", "tk-1").is_none());
    }

    #[test]
    fn test_expired_token_reports_absent() {
        let cache = TokenCache::with_ttl(Duration::ZERO);
        cache.cache(8443, "a.example.com", "tk-1", 3, "alice");
        assert!(cache.resolve(8443, "a.example.com", "tk-1").is_none());
        // The removal is permanent.
        assert!(cache.resolve(8443, "a.example.com", "tk-1").is_none());
    }

    #[test]
    fn test_service_level_rewrites_all_user_tokens() {
        let cache = TokenCache::new();
        cache.cache(8443, "a.example.com", "tk-1", 2, "alice");
        cache.cache(8443, "a.example.com", "tk-2", 2, "alice");
        cache.cache(8443, "a.example.com", "tk-3", 2, "bob");

        cache.set_service_level(8443, "a.example.com", "alice", 4);

        assert_eq!(cache.resolve(8443, "a.example.com", "tk-1").unwrap().0, 4);
        assert_eq!(cache.resolve(8443, "a.example.com", "tk-2").unwrap().0, 4);
        assert_eq!(cache.resolve(8443, "a.example.com", "tk-3").unwrap().0, 2);
    }

    #[test]
    fn test_global_level_spans_scopes() {
        let cache = TokenCache::new();
        cache.cache(8443, "a.example.com", "tk-1", 1, "alice");
        cache.cache(9443, "b.example.com", "tk-2", 2, "alice");

        cache.set_user_global_level("alice", 3);

        assert_eq!(cache.resolve(8443, "a.example.com", "tk-1").unwrap().0, 3);
        assert_eq!(cache.resolve(9443, "b.example.com", "tk-2").unwrap().0, 3);
    }

    #[test]
    fn test_rewrite_ignores_other_users() {
        let cache = TokenCache::new();
        cache.cache(8443, "a.example.com", "tk-b", 2, "bob");
        cache.set_user_global_level("alice", 4);
        assert_eq!(cache.resolve(8443, "a.example.com", "tk-b").unwrap().0, 2);
    }

    #[test]
    fn test_recache_updates_level() {
        let cache = TokenCache::new();
        cache.cache(8443, "a.example.com", "tk-1", 1, "alice");
        cache.cache(8443, "a.example.com", "tk-1", 4, "alice");
        assert_eq!(cache.resolve(8443, "a.example.com", "tk-1").unwrap().0, 4);
    }
}
