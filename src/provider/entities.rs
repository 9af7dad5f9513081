//! Configuration entities.
//!
//! These mirror the records the administrative CRUD layer manages. The
//! gateway core reads them at startup and on administrative mutations; it
//! never writes them except to register first-seen users.

use serde::{Deserialize, Serialize};

use crate::modules::load_balancer::Policy;
use crate::modules::masking::{FieldRule, FieldScope};

/// A published service: one (port, domain) with an optional certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Identifier.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Listening port.
    pub port: u16,
    /// Served domain, matched against Host / SNI.
    pub domain: String,
    /// Certificate to terminate TLS with; plain HTTP only when absent.
    #[serde(default)]
    pub certificate_id: Option<u64>,
}

/// A routed path prefix of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Identifier.
    pub id: u64,
    /// Owning service.
    pub service_id: u64,
    /// Path prefix with literal, `{regex}`, and `*` segments.
    pub uri: String,
    /// Target selection policy.
    #[serde(default)]
    pub policy: Policy,
}

/// An upstream server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    /// Identifier.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Base URL requests are forwarded to.
    pub target_url: String,
}

/// Membership of an upstream in a route's target set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Identifier.
    pub id: u64,
    /// The route.
    pub route_id: u64,
    /// The upstream.
    pub upstream_id: u64,
    /// Positive selection weight.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// A service-scoped maskable field with one rule per clearance level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceField {
    /// Identifier.
    pub id: u64,
    /// Owning service.
    pub service_id: u64,
    /// Field name, matched by name anywhere in response documents.
    pub field_name: String,
    /// Rule for clearance level 1 (least restricted).
    #[serde(default)]
    pub level1: String,
    /// Rule for clearance level 2.
    #[serde(default)]
    pub level2: String,
    /// Rule for clearance level 3.
    #[serde(default)]
    pub level3: String,
    /// Rule for clearance level 4 (most restricted).
    #[serde(default)]
    pub level4: String,
}

impl ServiceField {
    /// Convert to a masking rule.
    #[must_use]
    pub fn rule(&self) -> FieldRule {
        FieldRule::new(
            self.field_name.clone(),
            FieldScope::Service,
            [
                self.level1.clone(),
                self.level2.clone(),
                self.level3.clone(),
                self.level4.clone(),
            ],
        )
    }
}

/// A route-scoped maskable field; shadows a same-named service field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteField {
    /// Identifier.
    pub id: u64,
    /// Owning route.
    pub route_id: u64,
    /// Field name.
    pub field_name: String,
    /// Rule for clearance level 1.
    #[serde(default)]
    pub level1: String,
    /// Rule for clearance level 2.
    #[serde(default)]
    pub level2: String,
    /// Rule for clearance level 3.
    #[serde(default)]
    pub level3: String,
    /// Rule for clearance level 4.
    #[serde(default)]
    pub level4: String,
}

impl RouteField {
    /// Convert to a masking rule.
    #[must_use]
    pub fn rule(&self) -> FieldRule {
        FieldRule::new(
            self.field_name.clone(),
            FieldScope::Route,
            [
                self.level1.clone(),
                self.level2.clone(),
                self.level3.clone(),
                self.level4.clone(),
            ],
        )
    }
}

/// PEM material for a service: an RSA/ECDSA pair plus the national
/// dual-certificate signing and encryption pairs, any of which may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificate {
    /// Identifier.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub cert_name: String,
    /// Standard certificate chain PEM.
    #[serde(default)]
    pub cert_pem: String,
    /// Standard private key PEM.
    #[serde(default)]
    pub key_pem: String,
    /// National signing certificate PEM.
    #[serde(default)]
    pub sign_cert_pem: String,
    /// National signing key PEM.
    #[serde(default)]
    pub sign_key_pem: String,
    /// National encryption certificate PEM.
    #[serde(default)]
    pub enc_cert_pem: String,
    /// National encryption key PEM.
    #[serde(default)]
    pub enc_key_pem: String,
}

/// A known user and their global clearance level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Identifier.
    pub id: u64,
    /// Username as reported by the upstream identity route.
    pub username: String,
    /// Primary unique key.
    pub unique_key: String,
    /// Optional JSON object of alternative unique keys, keyed by match key.
    #[serde(default)]
    pub unique_keys_json: String,
    /// Global clearance level.
    #[serde(default = "default_level")]
    pub sec_level: u8,
}

fn default_level() -> u8 {
    1
}

/// A per-service clearance override; takes precedence over the user's
/// global level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserServiceLevel {
    /// Identifier.
    pub id: u64,
    /// The user.
    pub user_id: u64,
    /// The service.
    pub service_id: u64,
    /// Clearance level within the service.
    pub sec_level: u8,
}

/// The identity-extraction route of a service: which responses reveal who a
/// session token belongs to, and where to find the pieces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoRoute {
    /// Identifier.
    pub id: u64,
    /// Owning service.
    pub service_id: u64,
    /// Exact request path of the identity endpoint.
    pub path: String,
    /// Exact request method of the identity endpoint.
    pub method: String,
    /// JSON path of the username in the response body.
    pub username_path: String,
    /// JSON path of the unique key in the response body.
    pub unique_key_path: String,
    /// `-` to match `User.unique_key` directly; otherwise a JSON path whose
    /// value names the entry in `User.unique_keys_json` to match against.
    #[serde(default = "default_match_key")]
    pub match_key: String,
    /// Token position string, e.g. `request:header:Authorization`.
    pub token_position: String,
}

fn default_match_key() -> String {
    "-".to_string()
}
