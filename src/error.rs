//! Top-level error taxonomy for the bootstrap sequence
//!
//! Every stage of startup either hands a fully valid result to the next
//! stage or fails with one of these variants; the binary maps any of them
//! to a diagnostic and a nonzero exit. There is no recovery and no partial
//! cleanup, since the process is terminating either way.

use crate::config::ConfigError;
use crate::crash::CrashReporterError;
use crate::daemonize::DaemonizeError;
use crate::listener::ListenerError;
use crate::pool::PoolError;
use crate::store::StoreError;
use std::io;
use thiserror::Error;

/// Fatal startup error.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not determine host address, use -n <ip>")]
    UnknownIdentity,

    #[error(transparent)]
    Daemonize(#[from] DaemonizeError),

    #[error("failed to ignore SIGPIPE: {0}")]
    SigPipe(#[source] io::Error),

    #[error("crash reporter: {0}")]
    CrashReporter(#[from] CrashReporterError),

    #[error("config store: {0}")]
    Store(#[from] StoreError),

    #[error("worker pool: {0}")]
    Pool(#[from] PoolError),

    #[error("listener could not start: {0}")]
    Listener(#[from] ListenerError),
}

impl BootError {
    /// Whether the diagnostic should be followed by the usage text.
    pub fn wants_usage(&self) -> bool {
        matches!(self, BootError::Config(e) if e.wants_usage())
    }
}
