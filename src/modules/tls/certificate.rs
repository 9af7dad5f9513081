//! Per-service certificate bundles and ClientHello-time selection.
//!
//! Every (port, domain) pair can carry up to three certificate chains: a
//! standard RSA/ECDSA chain and the national dual-certificate pair, one
//! signing chain and one key-exchange (encryption) chain. Selection happens
//! inside the handshake, after the ClientHello names the domain and reveals
//! whether the client offers the national cipher suites.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rustls_pemfile::{certs, private_key};
use rustls::crypto::aws_lc_rs::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tracing::{debug, warn};

use super::error::{TlsError, TlsResult};

/// ShangMi cipher suite code points: the RFC 8998 TLS 1.3 suites plus the
/// legacy GMSSL ECC-SM4 suites. A ClientHello offering any of these is
/// treated as a national-suite client.
const SM_CIPHER_SUITES: [u16; 4] = [0x00C6, 0x00C7, 0xE011, 0xE013];

/// Whether a cipher suite code point belongs to the national suite family.
#[must_use]
pub fn is_sm_suite(suite: u16) -> bool {
    SM_CIPHER_SUITES.contains(&suite)
}

/// The loaded certificate material of one (port, domain).
pub struct CertificateBundle {
    rsa: Option<Arc<CertifiedKey>>,
    sm_sign: Option<Arc<CertifiedKey>>,
    sm_enc: Option<Arc<CertifiedKey>>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("rsa", &self.rsa.is_some())
            .field("sm_sign", &self.sm_sign.is_some())
            .field("sm_enc", &self.sm_enc.is_some())
            .finish()
    }
}

impl CertificateBundle {
    /// Parse a bundle from PEM pairs. Each pair is optional, but every pair
    /// supplied must parse; a half-configured or unparsable pair rejects the
    /// whole bundle so a broken update can never evict a working one.
    ///
    /// # Errors
    ///
    /// Returns an error when any supplied pair is incomplete or invalid.
    pub fn from_pems(
        domain: &str,
        rsa: Option<(&str, &str)>,
        sm_sign: Option<(&str, &str)>,
        sm_enc: Option<(&str, &str)>,
    ) -> TlsResult<Self> {
        Ok(Self {
            rsa: rsa.map(|(cert, key)| load_pair(domain, cert, key)).transpose()?,
            sm_sign: sm_sign
                .map(|(cert, key)| load_pair(domain, cert, key))
                .transpose()?,
            sm_enc: sm_enc
                .map(|(cert, key)| load_pair(domain, cert, key))
                .transpose()?,
        })
    }

    /// The signing certificate for a handshake: the SM signing chain when the
    /// client offers national suites, the RSA chain otherwise. `None` fails
    /// the handshake.
    #[must_use]
    pub fn signing_key(&self, client_supports_sm: bool) -> Option<Arc<CertifiedKey>> {
        if client_supports_sm && self.sm_sign.is_some() {
            return self.sm_sign.clone();
        }
        self.rsa.clone()
    }

    /// The SM key-exchange (encryption) certificate, when configured.
    #[must_use]
    pub fn key_exchange_key(&self) -> Option<Arc<CertifiedKey>> {
        self.sm_enc.clone()
    }
}

fn load_pair(domain: &str, cert_pem: &str, key_pem: &str) -> TlsResult<Arc<CertifiedKey>> {
    if cert_pem.trim().is_empty() || key_pem.trim().is_empty() {
        return Err(TlsError::IncompletePair(domain.to_string()));
    }
    let chain: Vec<CertificateDer<'static>> = certs(&mut cert_pem.as_bytes())
        .collect::<Result<_, _>>()
        .map_err(|e| TlsError::InvalidCertificate {
            domain: domain.to_string(),
            message: e.to_string(),
        })?;
    if chain.is_empty() {
        return Err(TlsError::InvalidCertificate {
            domain: domain.to_string(),
            message: "no certificates found in PEM".to_string(),
        });
    }
    let key: PrivateKeyDer<'static> = private_key(&mut key_pem.as_bytes())
        .map_err(|e| TlsError::InvalidPrivateKey {
            domain: domain.to_string(),
            message: e.to_string(),
        })?
        .ok_or_else(|| TlsError::InvalidPrivateKey {
            domain: domain.to_string(),
            message: "no private key found in PEM".to_string(),
        })?;
    let signing_key = any_supported_type(&key).map_err(|e| TlsError::InvalidPrivateKey {
        domain: domain.to_string(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(CertifiedKey::new(chain, signing_key)))
}

/// All certificate bundles, keyed by port then domain.
#[derive(Debug, Default)]
pub struct CertificateStore {
    bundles: RwLock<HashMap<u16, HashMap<String, Arc<CertificateBundle>>>>,
}

impl CertificateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the bundle for a (port, domain).
    pub fn update(&self, port: u16, domain: &str, bundle: CertificateBundle) {
        let mut bundles = match self.bundles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bundles
            .entry(port)
            .or_default()
            .insert(domain.to_string(), Arc::new(bundle));
        debug!(port, domain, "certificate bundle installed");
    }

    /// Drop the bundle of a (port, domain).
    pub fn remove(&self, port: u16, domain: &str) {
        let mut bundles = match self.bundles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(domains) = bundles.get_mut(&port) {
            domains.remove(domain);
            if domains.is_empty() {
                bundles.remove(&port);
            }
        }
    }

    fn bundle(&self, port: u16, domain: &str) -> Option<Arc<CertificateBundle>> {
        let bundles = match self.bundles.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bundles.get(&port)?.get(domain).cloned()
    }

    /// Select the signing certificate for a handshake on `port` with the
    /// given SNI name.
    #[must_use]
    pub fn select_certificate(
        &self,
        port: u16,
        server_name: &str,
        client_supports_sm: bool,
    ) -> Option<Arc<CertifiedKey>> {
        self.bundle(port, server_name)?.signing_key(client_supports_sm)
    }

    /// Select the key-exchange certificate for a national-suite handshake.
    #[must_use]
    pub fn select_key_exchange_certificate(
        &self,
        port: u16,
        server_name: &str,
    ) -> Option<Arc<CertifiedKey>> {
        self.bundle(port, server_name)?.key_exchange_key()
    }

    /// Build a rustls server config whose certificate is chosen per handshake
    /// from this store. The config stays valid as bundles come and go.
    #[must_use]
    pub fn server_config(self: &Arc<Self>, port: u16) -> Arc<ServerConfig> {
        let resolver = DynamicCertResolver {
            port,
            store: Arc::clone(self),
        };
        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Arc::new(config)
    }
}

/// Resolves the handshake certificate from the live store, so certificate
/// updates take effect without rebuilding listeners.
#[derive(Debug)]
struct DynamicCertResolver {
    port: u16,
    store: Arc<CertificateStore>,
}

impl ResolvesServerCert for DynamicCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name().unwrap_or_default();
        let client_supports_sm = client_hello
            .cipher_suites()
            .iter()
            .any(|suite| is_sm_suite(u16::from(*suite)));
        let resolved = self
            .store
            .select_certificate(self.port, server_name, client_supports_sm);
        if resolved.is_none() {
            warn!(
                port = self.port,
                server_name, "no certificate for handshake, failing closed"
            );
        }
        resolved
    }
}
