//! Network listener
//!
//! Accept loop for broker client connections. Binding is separated from
//! serving so the caller can distinguish "could not start" from "ran and
//! shut down": [`Listener::bind`] fails loudly, [`BoundListener::serve`]
//! blocks for the life of the server and returning from it is an orderly
//! shutdown. Accepted connections are handed to the worker pool; framing
//! and routing happen behind the pool jobs.

use crate::pool::PoolHandle;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors that prevent the listener from starting.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("failed to configure listening socket: {0}")]
    Configure(#[source] io::Error),
}

/// Listener configuration prior to binding.
#[derive(Debug)]
pub struct Listener {
    port: u16,
    web_root: Option<PathBuf>,
}

impl Listener {
    pub fn new(port: u16, web_root: Option<PathBuf>) -> Self {
        Self { port, web_root }
    }

    /// Bind the listening socket. This is the only fallible step; a
    /// listener that binds successfully is considered started.
    pub fn bind(self) -> Result<BoundListener, ListenerError> {
        let socket = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .map_err(|source| ListenerError::Bind {
                port: self.port,
                source,
            })?;
        socket
            .set_nonblocking(true)
            .map_err(ListenerError::Configure)?;
        let port = socket
            .local_addr()
            .map_err(ListenerError::Configure)?
            .port();

        info!("listening on port {port}");
        if let Some(root) = &self.web_root {
            debug!(root = %root.display(), "web service root configured");
        }

        Ok(BoundListener {
            socket,
            port,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A listener whose socket is bound and ready to serve.
pub struct BoundListener {
    socket: TcpListener,
    port: u16,
    shutdown: Arc<AtomicBool>,
}

impl BoundListener {
    /// Actual bound port; differs from the configured one only for port 0.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Flag that ends the accept loop when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the accept loop until shutdown. Connections are dispatched to
    /// the worker pool; per-connection failures never bring the loop down.
    pub fn serve(self, pool: &PoolHandle) {
        for signal in [SIGTERM, SIGINT] {
            if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&self.shutdown)) {
                warn!(signal, error = %err, "failed to register shutdown signal");
            }
        }

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    // Accepted sockets must not inherit the listener's
                    // nonblocking mode
                    stream.set_nonblocking(false).ok();
                    let dispatched = pool.submit(Box::new(move || {
                        handle_connection(stream, peer);
                    }));
                    if !dispatched {
                        warn!(%peer, "worker pool unavailable, dropping connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        info!("listener shutting down");
    }
}

/// Drain a client connection. Message framing and routing belong to the
/// broker engine; at this layer the connection is read until the peer
/// closes it.
fn handle_connection(mut stream: TcpStream, peer: SocketAddr) {
    let mut buf = [0u8; 4096];
    let mut total = 0usize;
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) => {
                debug!(%peer, error = %e, "connection error");
                break;
            }
        }
    }
    debug!(%peer, bytes = total, "connection closed");
}
