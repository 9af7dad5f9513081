//! Per-port listeners.
//!
//! One accept loop per port. Every accepted connection is sniffed: a 0x16
//! first byte goes through the TLS acceptor with per-SNI certificate
//! selection, anything else is served as plaintext HTTP. Accept failure is
//! retried with one rebind; a second failure abandons the port until an
//! administrative route addition re-provisions it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use crate::modules::tls::{is_tls_first_byte, sniff_first_byte, SniffedStream, TlsError};

use super::error::{ProxyError, ProxyResult};
use super::handler::handle_request;
use super::manager::ProxyManager;

/// Holds one slot of the in-flight connection count and releases it on drop,
/// so a panicking connection task cannot leak a slot and stall every later
/// drain at its full grace period.
struct ActiveGuard(Arc<AtomicU64>);

impl ActiveGuard {
    fn acquire(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A running listener and its shutdown handle.
pub(super) struct PortServer {
    shutdown_tx: mpsc::Sender<()>,
    active: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl PortServer {
    /// Bind the port and start accepting in the background.
    pub(super) async fn start(port: u16, manager: Arc<ProxyManager>) -> ProxyResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ProxyError::Bind { port, source })?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let active = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(accept_loop(
            listener,
            port,
            manager,
            shutdown_rx,
            Arc::clone(&active),
        ));
        Ok(Self {
            shutdown_tx,
            active,
            handle,
        })
    }

    /// Signal the accept loop, then wait up to `grace` for in-flight
    /// connections to finish.
    pub(super) async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(()).await;
        let deadline = Instant::now() + grace;
        while self.active.load(Ordering::Relaxed) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.handle.abort();
    }
}

async fn accept_loop(
    mut listener: TcpListener,
    port: u16,
    manager: Arc<ProxyManager>,
    mut shutdown_rx: mpsc::Receiver<()>,
    active: Arc<AtomicU64>,
) {
    let mut rebound = false;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(port, "accept loop stopping");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let manager = Arc::clone(&manager);
                    let guard = ActiveGuard::acquire(&active);
                    tokio::spawn(async move {
                        let _guard = guard;
                        serve_connection(stream, peer, port, manager).await;
                    });
                }
                Err(err) => {
                    error!(port, error = %err, "accept failed");
                    if rebound {
                        manager.mark_port_dead(port).await;
                        return;
                    }
                    match TcpListener::bind(("0.0.0.0", port)).await {
                        Ok(fresh) => {
                            info!(port, "listener rebound after accept failure");
                            listener = fresh;
                            rebound = true;
                        }
                        Err(err) => {
                            error!(port, error = %err, "rebind failed");
                            manager.mark_port_dead(port).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    port: u16,
    manager: Arc<ProxyManager>,
) {
    let first = match sniff_first_byte(&mut stream).await {
        Ok(byte) => byte,
        Err(TlsError::ClosedBeforeFirstByte) => return,
        Err(err) => {
            debug!(port, error = %err, "sniff failed");
            return;
        }
    };
    let replayed = SniffedStream::new(stream, first);
    let client_ip = peer.ip().to_string();

    if is_tls_first_byte(first) {
        let config = manager.cert_store().server_config(port);
        match TlsAcceptor::from(config).accept(replayed).await {
            Ok(tls) => serve_http(tls, port, client_ip, manager).await,
            Err(err) => debug!(port, error = %err, "TLS handshake failed"),
        }
    } else {
        serve_http(replayed, port, client_ip, manager).await;
    }
}

async fn serve_http<S>(stream: S, port: u16, client_ip: String, manager: Arc<ProxyManager>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let manager = Arc::clone(&manager);
        let client_ip = client_ip.clone();
        async move { handle_request(manager, port, client_ip, req).await }
    });
    if let Err(err) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(port, error = %err, "connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_guard_releases_even_when_task_panics() {
        let counter = Arc::new(AtomicU64::new(0));
        let guard = ActiveGuard::acquire(&counter);
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("connection task died");
        });
        assert!(task.await.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_active_guard_counts_concurrent_holders() {
        let counter = Arc::new(AtomicU64::new(0));
        let a = ActiveGuard::acquire(&counter);
        let b = ActiveGuard::acquire(&counter);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        drop(a);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(b);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
