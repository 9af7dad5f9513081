//! The proxy manager.
//!
//! Owns the live mapping of port → domain → route → weighted targets, the
//! per-domain trie routers, the certificate store, the token cache, and the
//! lifecycle of per-port listeners. Administrative mutations arrive through
//! the methods here; request handling only reads.
//!
//! Locking discipline: `state` is a coarse read/write lock taken for short,
//! await-free critical sections. Request handling takes read locks; the
//! single administrative mutation path takes write locks. `servers` has its
//! own async lock because starting and draining listeners must await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::modules::load_balancer::{LoadBalancerError, Policy, TargetSet};
use crate::modules::masking::FieldRule;
use crate::modules::router::{validate_path, Router};
use crate::modules::tls::{CertificateBundle, CertificateStore};
use crate::modules::token_cache::TokenCache;
use crate::provider::{ConfigProvider, Route, Service, UserInfoRoute};

use super::error::{ProxyError, ProxyResult};
use super::forward::UpstreamClient;
use super::server::PortServer;

/// Default bounded drain when a listener shuts down.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Route payload stored in the trie.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    /// Configuration id of the route.
    pub route_id: u64,
    /// Owning service.
    pub service_id: u64,
    /// Target selection policy.
    pub policy: Policy,
}

/// Everything the request handler needs for one matched request, cloned out
/// under a single read lock.
#[derive(Debug)]
pub struct ResolvedRoute {
    /// The registered route path whose prefix is stripped before forwarding.
    pub route_path: String,
    /// Owning service.
    pub service_id: u64,
    /// Chosen upstream base URL for this request.
    pub target: Result<String, LoadBalancerError>,
    /// Field map for masking.
    pub fields: Arc<HashMap<String, FieldRule>>,
    /// The domain's identity-extraction route, if configured.
    pub user_route: Option<UserInfoRoute>,
}

#[derive(Default)]
struct RoutingState {
    /// port → domain → target sets, one per registered path.
    targets: HashMap<u16, HashMap<String, Vec<TargetSet>>>,
    /// port → domain → trie router.
    routers: HashMap<u16, HashMap<String, Router<RouteMeta>>>,
    /// port → domain → identity-extraction route.
    user_routes: HashMap<u16, HashMap<String, UserInfoRoute>>,
}

/// The gateway core.
pub struct ProxyManager {
    state: RwLock<RoutingState>,
    servers: Mutex<HashMap<u16, PortServer>>,
    cert_store: Arc<CertificateStore>,
    token_cache: Arc<TokenCache>,
    client: UpstreamClient,
    provider: Arc<dyn ConfigProvider>,
    drain_grace: Duration,
}

impl ProxyManager {
    /// Create a manager over a configuration provider.
    #[must_use]
    pub fn new(provider: Arc<dyn ConfigProvider>, drain_grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(RoutingState::default()),
            servers: Mutex::new(HashMap::new()),
            cert_store: Arc::new(CertificateStore::new()),
            token_cache: Arc::new(TokenCache::new()),
            client: UpstreamClient::new(),
            provider,
            drain_grace,
        })
    }

    /// The certificate store serving this manager's listeners.
    #[must_use]
    pub fn cert_store(&self) -> &Arc<CertificateStore> {
        &self.cert_store
    }

    /// The token cache.
    #[must_use]
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.token_cache
    }

    /// The upstream client.
    #[must_use]
    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    /// The configuration provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ConfigProvider> {
        &self.provider
    }

    /// Ports with a running listener.
    pub async fn used_ports(&self) -> Vec<u16> {
        self.servers.lock().await.keys().copied().collect()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, RoutingState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, RoutingState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Match a request against the routing state and pick its upstream, all
    /// under one read lock.
    #[must_use]
    pub fn resolve_request(
        &self,
        port: u16,
        domain: &str,
        path: &str,
        client_ip: &str,
    ) -> Option<ResolvedRoute> {
        let state = self.read_state();
        let router = state.routers.get(&port)?.get(domain)?;
        let route = router.find_route(path)?;
        let route_path = route.path().to_string();
        let target = state
            .targets
            .get(&port)
            .and_then(|domains| domains.get(domain))
            .and_then(|sets| sets.iter().find(|set| set.path() == route_path))
            .map_or(
                Err(LoadBalancerError::NoTargets(route_path.clone())),
                |set| set.select(route.meta.policy, client_ip),
            );
        let user_route = state
            .user_routes
            .get(&port)
            .and_then(|domains| domains.get(domain))
            .cloned();
        Some(ResolvedRoute {
            route_path,
            service_id: route.meta.service_id,
            target,
            fields: Arc::new(route.fields.clone()),
            user_route,
        })
    }

    /// Register one (route, upstream) pair, starting the port's listener if
    /// none is running yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the route path is invalid, the weight is zero,
    /// or the listener cannot bind. Path and weight are checked up front so
    /// a rejected registration leaves no listener or target behind.
    pub async fn add_route(
        self: &Arc<Self>,
        service: &Service,
        route: &Route,
        target_url: &str,
        weight: u32,
    ) -> ProxyResult<()> {
        let port = service.port;
        let domain = &service.domain;

        // Reject bad input before any side effect: no listener, no target,
        // no trie node may outlive a failed registration.
        validate_path(&route.uri)?;
        if weight == 0 {
            return Err(LoadBalancerError::ZeroWeight(target_url.to_string()).into());
        }

        {
            let mut servers = self.servers.lock().await;
            if !servers.contains_key(&port) {
                let server = PortServer::start(port, Arc::clone(self)).await?;
                servers.insert(port, server);
                info!(port, "listener started");
            }
        }

        // Field map: service-scoped rules, shadowed by route-scoped ones.
        let mut fields: HashMap<String, FieldRule> = HashMap::new();
        for field in self.provider.service_fields(service.id) {
            fields.insert(field.field_name.clone(), field.rule());
        }
        for field in self.provider.route_fields(route.id) {
            fields.insert(field.field_name.clone(), field.rule());
        }

        let mut state = self.write_state();
        let router = state
            .routers
            .entry(port)
            .or_default()
            .entry(domain.clone())
            .or_insert_with(Router::new);
        router.add_route(
            &route.uri,
            RouteMeta {
                route_id: route.id,
                service_id: service.id,
                policy: route.policy,
            },
            fields,
        )?;

        let sets = state
            .targets
            .entry(port)
            .or_default()
            .entry(domain.clone())
            .or_default();
        let set = match sets.iter_mut().find(|set| set.path() == route.uri) {
            Some(set) => set,
            None => {
                sets.push(TargetSet::new(route.uri.clone()));
                match sets.last_mut() {
                    Some(set) => set,
                    None => return Ok(()),
                }
            }
        };
        set.add_target(target_url, weight)?;
        Ok(())
    }

    /// Deregister a target from a route; `None` clears every target of the
    /// path. Tears down emptied routes, domains, and finally the port's
    /// listener when its last domain goes.
    pub async fn remove_route(&self, port: u16, domain: &str, path: &str, target_url: Option<&str>) {
        let port_empty = {
            let mut state = self.write_state();
            let mut route_empty = false;
            if let Some(sets) = state
                .targets
                .get_mut(&port)
                .and_then(|domains| domains.get_mut(domain))
            {
                if let Some(pos) = sets.iter().position(|set| set.path() == path) {
                    match target_url {
                        Some(url) => route_empty = sets[pos].remove_target(url),
                        None => route_empty = true,
                    }
                    if route_empty {
                        sets.remove(pos);
                    }
                }
            }

            if route_empty {
                let mut domain_empty = false;
                if let Some(routers) = state.routers.get_mut(&port) {
                    if let Some(router) = routers.get_mut(domain) {
                        if router.remove_route(path) {
                            domain_empty = true;
                            routers.remove(domain);
                        }
                    }
                }
                if domain_empty {
                    if let Some(domains) = state.targets.get_mut(&port) {
                        domains.remove(domain);
                    }
                    if let Some(domains) = state.user_routes.get_mut(&port) {
                        domains.remove(domain);
                    }
                }
            }

            let port_empty = state
                .targets
                .get(&port)
                .map_or(true, |domains| domains.is_empty());
            if port_empty {
                state.targets.remove(&port);
                state.routers.remove(&port);
                state.user_routes.remove(&port);
            }
            port_empty
        };

        if port_empty {
            let server = self.servers.lock().await.remove(&port);
            if let Some(server) = server {
                server.shutdown(self.drain_grace).await;
                info!(port, "listener stopped");
            }
        }
    }

    /// Rehydrate one service: all its routes, targets, identity route, and
    /// certificate.
    ///
    /// # Errors
    ///
    /// Returns an error when the service is unknown or a listener fails.
    pub async fn add_service(self: &Arc<Self>, service_id: u64) -> ProxyResult<()> {
        let service = self
            .provider
            .service(service_id)
            .ok_or(ProxyError::UnknownEntity {
                entity: "service",
                id: service_id,
            })?;

        for route in self.provider.routes_by_service(service.id) {
            for (upstream, weight) in self.provider.targets_by_route(route.id) {
                self.add_route(&service, &route, &upstream.target_url, weight)
                    .await?;
            }
        }
        for uir in self.provider.user_info_routes_by_service(service.id) {
            self.add_user_route(&service, uir);
        }
        if let Err(err) = self.update_service_certificate(service.id) {
            warn!(service_id = service.id, error = %err, "certificate not installed");
        }
        Ok(())
    }

    /// Tear down every route of a service.
    pub async fn remove_service(&self, service: &Service) {
        let paths: Vec<(String, Vec<String>)> = {
            let state = self.read_state();
            state
                .targets
                .get(&service.port)
                .and_then(|domains| domains.get(&service.domain))
                .map(|sets| {
                    sets.iter()
                        .map(|set| (set.path().to_string(), set.target_urls()))
                        .collect()
                })
                .unwrap_or_default()
        };
        for (path, urls) in paths {
            for url in urls {
                self.remove_route(service.port, &service.domain, &path, Some(&url))
                    .await;
            }
        }
        self.cert_store.remove(service.port, &service.domain);
    }

    /// Apply a port or domain change by provisioning the new identity before
    /// releasing the old one.
    ///
    /// # Errors
    ///
    /// Returns an error when rehydrating the new identity fails.
    pub async fn update_service(self: &Arc<Self>, old: &Service, new: &Service) -> ProxyResult<()> {
        if old.port == new.port && old.domain == new.domain {
            return Ok(());
        }
        self.add_service(new.id).await?;
        self.remove_service(old).await;
        Ok(())
    }

    /// Install or replace a route-scoped field rule.
    pub fn update_route_field(&self, service: &Service, route: &Route, rule: FieldRule) {
        let mut state = self.write_state();
        if let Some(router) = state
            .routers
            .get_mut(&service.port)
            .and_then(|domains| domains.get_mut(&service.domain))
        {
            router.update_route_field(&route.uri, rule);
        }
    }

    /// Remove a route-scoped field rule, reinstating the service-scoped rule
    /// of the same name when the provider still has one.
    pub fn remove_route_field(&self, service: &Service, route: &Route, field_name: &str) {
        let fallback = self
            .provider
            .service_field(service.id, field_name)
            .map(|field| field.rule());
        let mut state = self.write_state();
        if let Some(router) = state
            .routers
            .get_mut(&service.port)
            .and_then(|domains| domains.get_mut(&service.domain))
        {
            router.remove_route_field(&route.uri, field_name, fallback);
        }
    }

    /// Install or replace a service-scoped field rule on every route of the
    /// service's domain.
    pub fn update_service_field(&self, service: &Service, rule: &FieldRule) {
        let mut state = self.write_state();
        if let Some(router) = state
            .routers
            .get_mut(&service.port)
            .and_then(|domains| domains.get_mut(&service.domain))
        {
            router.update_service_field(rule);
        }
    }

    /// Remove a service-scoped field rule from every route carrying it.
    pub fn remove_service_field(&self, port: u16, domain: &str, field_name: &str) {
        let mut state = self.write_state();
        if let Some(router) = state
            .routers
            .get_mut(&port)
            .and_then(|domains| domains.get_mut(domain))
        {
            router.remove_service_field(field_name);
        }
    }

    /// Register a domain's identity-extraction route; an existing one is
    /// kept.
    pub fn add_user_route(&self, service: &Service, uir: UserInfoRoute) {
        let mut state = self.write_state();
        state
            .user_routes
            .entry(service.port)
            .or_default()
            .entry(service.domain.clone())
            .or_insert(uir);
    }

    /// Replace a domain's identity-extraction route.
    pub fn update_user_route(&self, service: &Service, uir: UserInfoRoute) {
        let mut state = self.write_state();
        if let Some(domains) = state.user_routes.get_mut(&service.port) {
            domains.insert(service.domain.clone(), uir);
        }
    }

    /// Remove a domain's identity-extraction route.
    pub fn remove_user_route(&self, port: u16, domain: &str) {
        let mut state = self.write_state();
        if let Some(domains) = state.user_routes.get_mut(&port) {
            domains.remove(domain);
        }
    }

    /// Load a service's certificate from the provider into the store. A
    /// missing or cleared certificate id removes the installed bundle.
    ///
    /// # Errors
    ///
    /// Returns an error when the referenced certificate is unknown or does
    /// not parse; the previously installed bundle stays in place.
    pub fn update_service_certificate(&self, service_id: u64) -> ProxyResult<()> {
        let service = self
            .provider
            .service(service_id)
            .ok_or(ProxyError::UnknownEntity {
                entity: "service",
                id: service_id,
            })?;
        let Some(certificate_id) = service.certificate_id.filter(|id| *id != 0) else {
            self.cert_store.remove(service.port, &service.domain);
            return Ok(());
        };
        let cert = self
            .provider
            .certificate(certificate_id)
            .ok_or(ProxyError::UnknownEntity {
                entity: "certificate",
                id: certificate_id,
            })?;
        let pair = |c: &str, k: &str| {
            if c.is_empty() && k.is_empty() {
                None
            } else {
                Some((c.to_string(), k.to_string()))
            }
        };
        let rsa = pair(&cert.cert_pem, &cert.key_pem);
        let sign = pair(&cert.sign_cert_pem, &cert.sign_key_pem);
        let enc = pair(&cert.enc_cert_pem, &cert.enc_key_pem);
        let bundle = CertificateBundle::from_pems(
            &service.domain,
            rsa.as_ref().map(|(c, k)| (c.as_str(), k.as_str())),
            sign.as_ref().map(|(c, k)| (c.as_str(), k.as_str())),
            enc.as_ref().map(|(c, k)| (c.as_str(), k.as_str())),
        )?;
        self.cert_store.update(service.port, &service.domain, bundle);
        Ok(())
    }

    /// Rewrite a user's cached clearance level everywhere.
    pub fn set_user_global_level(&self, username: &str, level: u8) {
        self.token_cache.set_user_global_level(username, level);
    }

    /// Rewrite a user's cached clearance level under one (port, domain).
    pub fn set_service_level(&self, port: u16, domain: &str, username: &str, level: u8) {
        self.token_cache
            .set_service_level(port, domain, username, level);
    }

    /// Forget a listener whose accept loop died after its one rebind
    /// attempt. Routing state stays so a later route addition re-provisions
    /// the port.
    pub async fn mark_port_dead(&self, port: u16) {
        if self.servers.lock().await.remove(&port).is_some() {
            error!(port, "listener abandoned");
        }
    }

    /// Drain and stop every listener.
    pub async fn shutdown(&self) {
        let servers: Vec<PortServer> = {
            let mut guard = self.servers.lock().await;
            guard.drain().map(|(_, server)| server).collect()
        };
        for server in servers {
            server.shutdown(self.drain_grace).await;
        }
    }
}
