//! The configuration collaborator.
//!
//! The gateway core never owns configuration; it asks a [`ConfigProvider`]
//! for services, routes, fields, certificates, and users, both at startup
//! and on each administrative mutation. [`MemoryProvider`] is the built-in
//! implementation, seedable from a TOML file.

mod entities;
mod error;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::Value;

pub use entities::{
    Certificate, Route, RouteField, RouteTarget, Service, ServiceField, Upstream, User,
    UserInfoRoute, UserServiceLevel,
};
pub use error::{ProviderError, ProviderResult};

/// Read access to gateway configuration, plus first-seen user registration.
pub trait ConfigProvider: Send + Sync {
    /// All published services.
    fn services(&self) -> Vec<Service>;

    /// One service by id.
    fn service(&self, id: u64) -> Option<Service>;

    /// The routes of a service.
    fn routes_by_service(&self, service_id: u64) -> Vec<Route>;

    /// The weighted upstreams of a route.
    fn targets_by_route(&self, route_id: u64) -> Vec<(Upstream, u32)>;

    /// The service-scoped maskable fields of a service.
    fn service_fields(&self, service_id: u64) -> Vec<ServiceField>;

    /// One service-scoped field by name.
    fn service_field(&self, service_id: u64, name: &str) -> Option<ServiceField>;

    /// The route-scoped maskable fields of a route.
    fn route_fields(&self, route_id: u64) -> Vec<RouteField>;

    /// Certificate material by id.
    fn certificate(&self, id: u64) -> Option<Certificate>;

    /// The identity-extraction routes of a service.
    fn user_info_routes_by_service(&self, service_id: u64) -> Vec<UserInfoRoute>;

    /// Find a user by username and unique key. With a match key, the unique
    /// key is compared against that entry of the user's alternative key set
    /// instead of the primary key.
    fn user_by_unique_key(
        &self,
        username: &str,
        unique_key: &str,
        match_key: Option<&str>,
    ) -> Option<User>;

    /// Register a first-seen user at the default clearance level.
    ///
    /// # Errors
    ///
    /// Returns an error when the user cannot be persisted.
    fn create_user(&self, username: &str, unique_key: &str) -> ProviderResult<User>;

    /// A user's clearance override within a service, if any.
    fn user_service_level(&self, user_id: u64, service_id: u64) -> Option<u8>;
}

/// TOML seed document for [`MemoryProvider`].
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    /// Services to publish.
    #[serde(default)]
    pub services: Vec<Service>,
    /// Routes of those services.
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Upstream servers.
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    /// Route → upstream memberships.
    #[serde(default)]
    pub route_targets: Vec<RouteTarget>,
    /// Service-scoped fields.
    #[serde(default)]
    pub service_fields: Vec<ServiceField>,
    /// Route-scoped fields.
    #[serde(default)]
    pub route_fields: Vec<RouteField>,
    /// Certificate material.
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    /// Known users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Per-service clearance overrides.
    #[serde(default)]
    pub user_service_levels: Vec<UserServiceLevel>,
    /// Identity-extraction routes.
    #[serde(default)]
    pub user_info_routes: Vec<UserInfoRoute>,
}

#[derive(Debug, Default)]
struct Tables {
    services: HashMap<u64, Service>,
    routes: HashMap<u64, Route>,
    upstreams: HashMap<u64, Upstream>,
    route_targets: Vec<RouteTarget>,
    service_fields: Vec<ServiceField>,
    route_fields: Vec<RouteField>,
    certificates: HashMap<u64, Certificate>,
    users: HashMap<u64, User>,
    user_service_levels: Vec<UserServiceLevel>,
    user_info_routes: Vec<UserInfoRoute>,
}

/// In-memory [`ConfigProvider`].
#[derive(Debug, Default)]
pub struct MemoryProvider {
    tables: RwLock<Tables>,
    next_user_id: AtomicU64,
}

impl MemoryProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a provider from a seed document.
    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let max_user_id = seed.users.iter().map(|u| u.id).max().unwrap_or(0);
        let tables = Tables {
            services: seed.services.into_iter().map(|s| (s.id, s)).collect(),
            routes: seed.routes.into_iter().map(|r| (r.id, r)).collect(),
            upstreams: seed.upstreams.into_iter().map(|u| (u.id, u)).collect(),
            route_targets: seed.route_targets,
            service_fields: seed.service_fields,
            route_fields: seed.route_fields,
            certificates: seed.certificates.into_iter().map(|c| (c.id, c)).collect(),
            users: seed.users.into_iter().map(|u| (u.id, u)).collect(),
            user_service_levels: seed.user_service_levels,
            user_info_routes: seed.user_info_routes,
        };
        Self {
            tables: RwLock::new(tables),
            next_user_id: AtomicU64::new(max_user_id + 1),
        }
    }

    /// Load a provider from a TOML seed file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let seed: Seed = toml::from_str(&content)?;
        Ok(Self::from_seed(seed))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ConfigProvider for MemoryProvider {
    fn services(&self) -> Vec<Service> {
        self.read().services.values().cloned().collect()
    }

    fn service(&self, id: u64) -> Option<Service> {
        self.read().services.get(&id).cloned()
    }

    fn routes_by_service(&self, service_id: u64) -> Vec<Route> {
        self.read()
            .routes
            .values()
            .filter(|r| r.service_id == service_id)
            .cloned()
            .collect()
    }

    fn targets_by_route(&self, route_id: u64) -> Vec<(Upstream, u32)> {
        let tables = self.read();
        tables
            .route_targets
            .iter()
            .filter(|rt| rt.route_id == route_id)
            .filter_map(|rt| {
                tables
                    .upstreams
                    .get(&rt.upstream_id)
                    .map(|u| (u.clone(), rt.weight))
            })
            .collect()
    }

    fn service_fields(&self, service_id: u64) -> Vec<ServiceField> {
        self.read()
            .service_fields
            .iter()
            .filter(|f| f.service_id == service_id)
            .cloned()
            .collect()
    }

    fn service_field(&self, service_id: u64, name: &str) -> Option<ServiceField> {
        self.read()
            .service_fields
            .iter()
            .find(|f| f.service_id == service_id && f.field_name == name)
            .cloned()
    }

    fn route_fields(&self, route_id: u64) -> Vec<RouteField> {
        self.read()
            .route_fields
            .iter()
            .filter(|f| f.route_id == route_id)
            .cloned()
            .collect()
    }

    fn certificate(&self, id: u64) -> Option<Certificate> {
        self.read().certificates.get(&id).cloned()
    }

    fn user_info_routes_by_service(&self, service_id: u64) -> Vec<UserInfoRoute> {
        self.read()
            .user_info_routes
            .iter()
            .filter(|u| u.service_id == service_id)
            .cloned()
            .collect()
    }

    fn user_by_unique_key(
        &self,
        username: &str,
        unique_key: &str,
        match_key: Option<&str>,
    ) -> Option<User> {
        let tables = self.read();
        tables
            .users
            .values()
            .find(|user| {
                if user.username != username {
                    return false;
                }
                match match_key {
                    None => user.unique_key == unique_key,
                    Some(key) => {
                        let Ok(doc) = serde_json::from_str::<Value>(&user.unique_keys_json) else {
                            return false;
                        };
                        doc.get(key).and_then(Value::as_str) == Some(unique_key)
                    }
                }
            })
            .cloned()
    }

    fn create_user(&self, username: &str, unique_key: &str) -> ProviderResult<User> {
        let user = User {
            id: self.next_user_id.fetch_add(1, Ordering::Relaxed),
            username: username.to_string(),
            unique_key: unique_key.to_string(),
            unique_keys_json: String::new(),
            sec_level: 1,
        };
        let mut tables = match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn user_service_level(&self, user_id: u64, service_id: u64) -> Option<u8> {
        self.read()
            .user_service_levels
            .iter()
            .find(|usl| usl.user_id == user_id && usl.service_id == service_id)
            .map(|usl| usl.sec_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryProvider {
        let seed: Seed = toml::from_str(
            r#"
            [[services]]
            id = 1
            name = "records"
            port = 8443
            domain = "records.example.com"

            [[routes]]
            id = 10
            service_id = 1
            uri = "/api"
            policy = "weighted-random"

            [[upstreams]]
            id = 100
            target_url = "http://10.0.0.1:8080"

            [[route_targets]]
            id = 1000
            route_id = 10
            upstream_id = 100
            weight = 3

            [[service_fields]]
            id = 20
            service_id = 1
            field_name = "phone"
            level2 = "end-****"

            [[users]]
            id = 5
            username = "alice"
            unique_key = "A-1"
            unique_keys_json = '{"badge": "B-9"}'
            sec_level = 3

            [[user_service_levels]]
            id = 50
            user_id = 5
            service_id = 1
            sec_level = 2
            "#,
        )
        .unwrap();
        MemoryProvider::from_seed(seed)
    }

    #[test]
    fn test_seeded_lookups() {
        let provider = seeded();
        assert_eq!(provider.services().len(), 1);
        assert_eq!(provider.routes_by_service(1).len(), 1);
        assert!(provider.routes_by_service(2).is_empty());

        let targets = provider.targets_by_route(10);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0.target_url, "http://10.0.0.1:8080");
        assert_eq!(targets[0].1, 3);

        let field = provider.service_field(1, "phone").unwrap();
        assert_eq!(field.level2, "end-****");
    }

    #[test]
    fn test_user_lookup_by_primary_key() {
        let provider = seeded();
        let user = provider.user_by_unique_key("alice", "A-1", None).unwrap();
        assert_eq!(user.id, 5);
        assert!(provider.user_by_unique_key("alice", "wrong", None).is_none());
        assert!(provider.user_by_unique_key("bob", "A-1", None).is_none());
    }

    #[test]
    fn test_user_lookup_by_match_key() {
        let provider = seeded();
        let user = provider
            .user_by_unique_key("alice", "B-9", Some("badge"))
            .unwrap();
        assert_eq!(user.id, 5);
        assert!(provider
            .user_by_unique_key("alice", "B-9", Some("card"))
            .is_none());
    }

    #[test]
    fn test_service_level_override() {
        let provider = seeded();
        assert_eq!(provider.user_service_level(5, 1), Some(2));
        assert_eq!(provider.user_service_level(5, 2), None);
    }

    #[test]
    fn test_create_user_assigns_fresh_id() {
        let provider = seeded();
        let user = provider.create_user("carol", "C-1").unwrap();
        assert_eq!(user.id, 6);
        assert_eq!(user.sec_level, 1);
        assert!(provider.user_by_unique_key("carol", "C-1", None).is_some());
    }
}
