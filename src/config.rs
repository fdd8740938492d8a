//! Startup configuration resolution
//!
//! Turns the raw argument list and process environment into an immutable
//! [`StartupConfig`]. Every option is validated here; nothing downstream
//! ever sees a half-configured broker. Module loads requested with `-m`
//! happen during parsing, against the search directory resolved so far.

use crate::debug::DebugFlags;
use crate::identity::{IdentityError, NodeId};
use crate::modules::{ModuleLoadError, ModuleRegistry};
use std::path::PathBuf;
use thiserror::Error;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8765;

/// Default worker thread count.
pub const DEFAULT_WORKER_THREADS: u32 = 1;

/// Environment variable supplying a default debug-flags string.
pub const DEBUG_ENV_VAR: &str = "FERRYD_DEBUG";

/// Errors from command-line resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("bad argument to -n: {0}")]
    NodeIdentity(#[from] IdentityError),

    #[error("invalid worker thread count '{0}', must be a positive integer")]
    BadWorkerCount(String),

    #[error("invalid port '{0}'")]
    BadPort(String),

    #[error("unknown option '{0}'")]
    UnknownFlag(String),

    #[error("option {0} requires an argument")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Module(#[from] ModuleLoadError),
}

impl ConfigError {
    /// Whether the error should be followed by the usage text, as opposed
    /// to a descriptive message alone.
    pub fn wants_usage(&self) -> bool {
        matches!(
            self,
            ConfigError::UnknownFlag(_) | ConfigError::MissingArgument(_)
        )
    }
}

/// Immutable startup configuration for one broker node.
///
/// Built once by [`StartupConfig::parse`] and then only read; the handoff
/// sequence never mutates it.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    /// Explicit node identity from `-n`, if any.
    pub node_id: Option<NodeId>,
    /// Listening port.
    pub port: u16,
    /// Skip daemonization and stay attached to the terminal.
    pub foreground: bool,
    /// Install the crash reporter at startup.
    pub crash_reporting: bool,
    /// Worker threads to start.
    pub worker_threads: u32,
    /// Location of the config store.
    pub config_path: Option<PathBuf>,
    /// Directory for persistent queue storage.
    pub queue_path: Option<PathBuf>,
    /// Directory for relative module loads.
    pub module_dir: PathBuf,
    /// Root directory for the web service, when enabled.
    pub web_root: Option<PathBuf>,
    /// Debug categories from `-v` or the environment.
    pub debug: Option<DebugFlags>,
}

/// Result of a parse: either a ready configuration or a help request.
#[derive(Debug)]
pub enum ParseOutcome {
    Ready(StartupConfig),
    Help,
}

impl StartupConfig {
    fn defaults(module_dir: PathBuf) -> Self {
        Self {
            node_id: None,
            port: DEFAULT_PORT,
            foreground: false,
            crash_reporting: false,
            worker_threads: DEFAULT_WORKER_THREADS,
            config_path: None,
            queue_path: None,
            module_dir,
            web_root: None,
            debug: None,
        }
    }

    /// Resolve the argument list against the environment-supplied debug
    /// default, loading any requested modules along the way.
    pub fn parse(
        args: &[String],
        env_debug: Option<&str>,
        registry: &mut ModuleRegistry,
    ) -> Result<ParseOutcome, ConfigError> {
        let mut config = Self::defaults(registry.search_dir().to_path_buf());
        let mut debug = env_debug.map(str::to_owned);

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-h" => return Ok(ParseOutcome::Help),
                "-D" => config.foreground = true,
                "-B" => config.crash_reporting = true,
                "-b" => config.crash_reporting = false,
                "-t" => {
                    let v = take_value(args, &mut i, "-t")?;
                    config.worker_threads = parse_worker_count(v)?;
                }
                "-n" => {
                    let v = take_value(args, &mut i, "-n")?;
                    config.node_id = Some(NodeId::parse(v)?);
                }
                "-p" => {
                    let v = take_value(args, &mut i, "-p")?;
                    config.port = v
                        .parse()
                        .map_err(|_| ConfigError::BadPort(v.to_string()))?;
                }
                "-c" => {
                    let v = take_value(args, &mut i, "-c")?;
                    config.config_path = Some(PathBuf::from(v));
                }
                "-q" => {
                    let v = take_value(args, &mut i, "-q")?;
                    config.queue_path = Some(PathBuf::from(v));
                }
                "-w" => {
                    let v = take_value(args, &mut i, "-w")?;
                    config.web_root = Some(PathBuf::from(v));
                }
                "-v" => {
                    let v = take_value(args, &mut i, "-v")?;
                    debug = Some(v.to_string());
                }
                "-l" => {
                    let v = take_value(args, &mut i, "-l")?;
                    let dir = PathBuf::from(v);
                    registry.set_search_dir(&dir);
                    config.module_dir = dir;
                }
                "-m" => {
                    let v = take_value(args, &mut i, "-m")?;
                    registry.load(v)?;
                }
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            }
            i += 1;
        }

        config.debug = debug.map(|s| DebugFlags::parse(&s));
        Ok(ParseOutcome::Ready(config))
    }
}

fn take_value<'a>(
    args: &'a [String],
    i: &mut usize,
    flag: &'static str,
) -> Result<&'a str, ConfigError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or(ConfigError::MissingArgument(flag))
}

fn parse_worker_count(v: &str) -> Result<u32, ConfigError> {
    match v.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::BadWorkerCount(v.to_string())),
    }
}

/// Usage text printed for `-h` and for unrecognized input.
pub fn usage(prog: &str) -> String {
    format!(
        "\
{prog}:
\t-h\t\tthis help message
\t-D\t\trun in the foreground
\t-B\t\tenable crash reporting
\t-b\t\tdisable crash reporting
\t-t <count>\tnumber of worker threads to use (default {threads})
\t-n <ip>\t\tnode self identifier (IPv4)
\t-p <port>\tspecify listening port (default: {port})
\t-c <file>\tlocation of the config store
\t-q <dir>\twhere persistent queues are stored
\t-w <dir>\twhere files for web services are available
\t-v <flags>\tprint additional debugging information, by overriding {env}
\t-l <dir>\tuse this dir for relative module loads
\t-m <module>\tmodule to load",
        prog = prog,
        threads = DEFAULT_WORKER_THREADS,
        port = DEFAULT_PORT,
        env = DEBUG_ENV_VAR,
    )
}
