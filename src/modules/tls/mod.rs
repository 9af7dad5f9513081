//! TLS termination support.
//!
//! Two concerns live here: the per-(port, domain) certificate store with
//! handshake-time selection between the standard chain and the national
//! dual-certificate chains, and the first-byte sniffer that lets one listener
//! serve both TLS and plaintext HTTP.

mod certificate;
mod error;
mod sniff;

pub use certificate::{is_sm_suite, CertificateBundle, CertificateStore};
pub use error::{TlsError, TlsResult};
pub use sniff::{is_tls_first_byte, sniff_first_byte, SniffedStream, TLS_HANDSHAKE_BYTE};
