//! Startup orchestration
//!
//! Drives the bootstrap sequence in a strict order: resolve the node
//! identity, resolve configuration, validate identity, ignore SIGPIPE,
//! daemonize, bring up crash reporting, initialize the store, start the
//! worker pool, and hand control to the listener. Each step completes or
//! the process dies; nothing downstream ever runs half-configured.

use crate::config::{self, ParseOutcome, StartupConfig, DEBUG_ENV_VAR};
use crate::crash;
use crate::daemonize::daemonize;
use crate::debug::DebugFlags;
use crate::error::BootError;
use crate::identity::{self, NodeId};
use crate::listener::Listener;
use crate::modules::{ModuleRegistry, DEFAULT_MODULE_DIR};
use crate::pool::WorkerPool;
use crate::store::ConfigStore;
use nix::sys::signal::{signal, SigHandler, Signal};
use std::env;
use std::io;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "ferryd=info";

/// Lifecycle of the broker process, from construction to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Foreground,
    Daemonizing,
    Background,
    Running,
    Terminated,
}

impl LifecycleState {
    /// Whether `from` may move to `to`. Termination is reachable from
    /// every state; everything else follows the startup order.
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        use LifecycleState::*;
        matches!(
            (from, to),
            (New, Foreground)
                | (New, Daemonizing)
                | (Daemonizing, Background)
                | (Foreground, Running)
                | (Background, Running)
                | (_, Terminated)
        )
    }
}

/// Owns the bootstrap sequence and the process lifecycle state.
pub struct Supervisor {
    state: LifecycleState,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::New,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Run the full bootstrap and serve until shutdown.
    ///
    /// Returns `Ok(())` for a help request or an orderly shutdown; any
    /// error is fatal and the caller exits nonzero without cleaning up
    /// subsystems that already started.
    pub fn run(&mut self) -> Result<(), BootError> {
        let result = self.run_sequence();
        self.advance(LifecycleState::Terminated);
        result
    }

    fn run_sequence(&mut self) -> Result<(), BootError> {
        let resolved = identity::resolve_local();

        let args: Vec<String> = env::args().skip(1).collect();
        let prog = env::args().next().unwrap_or_else(|| "ferryd".to_string());
        let env_debug = env::var(DEBUG_ENV_VAR).ok();

        let mut registry = ModuleRegistry::new(DEFAULT_MODULE_DIR);
        let config =
            match StartupConfig::parse(&args, env_debug.as_deref(), &mut registry)? {
                ParseOutcome::Ready(config) => config,
                ParseOutcome::Help => {
                    println!("{}", config::usage(&prog));
                    return Ok(());
                }
            };

        let node_id = config
            .node_id
            .or(resolved)
            .ok_or(BootError::UnknownIdentity)?;

        init_logging(config.debug);
        debug!(target: "ferryd::config", ?config, %node_id, "configuration resolved");

        ignore_sigpipe()?;

        if config.foreground {
            self.advance(LifecycleState::Foreground);
        } else {
            self.advance(LifecycleState::Daemonizing);
            daemonize()?;
            self.advance(LifecycleState::Background);
        }

        if config.crash_reporting {
            crash::init(crash::ReporterConfig::default())?;
            info!("crash reporting enabled");
        }

        self.serve(node_id, &config)
    }

    /// The handoff sequence proper: store, pool, listener.
    fn serve(&mut self, node_id: NodeId, config: &StartupConfig) -> Result<(), BootError> {
        let _store = ConfigStore::init(
            node_id,
            config.config_path.as_deref(),
            config.queue_path.as_deref(),
        )?;

        let pool = WorkerPool::start(config.worker_threads)?;

        let bound = Listener::new(config.port, config.web_root.clone()).bind()?;
        self.advance(LifecycleState::Running);

        bound.serve(&pool.handle());

        // Listener returned: orderly shutdown
        pool.stop();
        info!("shutdown complete");
        Ok(())
    }

    fn advance(&mut self, next: LifecycleState) {
        if !LifecycleState::is_valid_transition(self.state, next) {
            warn!(from = ?self.state, to = ?next, "unexpected lifecycle transition");
        }
        trace!(from = ?self.state, to = ?next, "lifecycle transition");
        self.state = next;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Ignore SIGPIPE process-wide so peer disconnects surface as ordinary
/// I/O errors in the networking layer instead of killing the process.
fn ignore_sigpipe() -> Result<(), BootError> {
    // SAFETY: SigIgn installs no handler code.
    unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }
        .map(|_| ())
        .map_err(|e| BootError::SigPipe(io::Error::from_raw_os_error(e as i32)))
}

fn init_logging(debug: Option<DebugFlags>) {
    let directives = debug
        .map(|d| d.filter_directives())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    let filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
