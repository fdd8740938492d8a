//! Crash reporting
//!
//! When enabled with `-B`, fatal signals produce a structured crash report
//! on stderr before the process dies through the signal's default action.
//! The report body is rendered up front at initialization so the signal
//! handler only has to `write(2)` pre-built bytes; the handler itself
//! allocates nothing.
//!
//! The reporter is a process-wide singleton, but participation is
//! per-thread: every thread that wants its faults to land on the alternate
//! signal stack calls [`attach`] once. Attaching while reporting is
//! disabled is a no-op, so library callers can attach unconditionally.
//!
//! The whole integration can be compiled out with
//! `--no-default-features` (the `crash-reports` feature); the API remains
//! and every call succeeds as a no-op.

use std::collections::BTreeMap;
use std::io;
use std::os::raw::c_int;
use thiserror::Error;

#[cfg(feature = "crash-reports")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "crash-reports")]
use std::cell::Cell;
#[cfg(feature = "crash-reports")]
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, AtomicUsize, Ordering};

/// Errors from reporter initialization. Fatal when reporting was requested.
#[derive(Debug, Error)]
pub enum CrashReporterError {
    #[error("reporter already initialized")]
    AlreadyInitialized,

    #[error("failed to render crash report: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to install alternate signal stack: {0}")]
    AltStack(#[source] io::Error),
}

/// Reporter configuration: descriptive metadata attached to every report,
/// and the descriptor reports are written to.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    metadata: BTreeMap<String, String>,
    report_fd: c_int,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("application".to_string(), "ferryd".to_string());
        metadata.insert(
            "version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            metadata,
            report_fd: libc::STDERR_FILENO,
        }
    }
}

impl ReporterConfig {
    /// Attach an additional key/value pair to the report context.
    pub fn kv(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Write reports to the given descriptor instead of stderr.
    pub fn report_fd(mut self, fd: c_int) -> Self {
        self.report_fd = fd;
        self
    }
}

#[cfg(feature = "crash-reports")]
#[derive(Debug, Serialize, Deserialize)]
struct CrashReport {
    pid: u32,
    timestamp: String,
    metadata: BTreeMap<String, String>,
}

#[cfg(feature = "crash-reports")]
static INITIALIZED: AtomicBool = AtomicBool::new(false);
#[cfg(feature = "crash-reports")]
static ENABLED: AtomicBool = AtomicBool::new(false);
#[cfg(feature = "crash-reports")]
static REPORT_FD: AtomicI32 = AtomicI32::new(libc::STDERR_FILENO);
#[cfg(feature = "crash-reports")]
static REPORT_PTR: AtomicPtr<u8> = AtomicPtr::new(std::ptr::null_mut());
#[cfg(feature = "crash-reports")]
static REPORT_LEN: AtomicUsize = AtomicUsize::new(0);

#[cfg(feature = "crash-reports")]
thread_local! {
    static ATTACHED: Cell<bool> = const { Cell::new(false) };
}

/// Fatal signals covered by the reporter.
#[cfg(feature = "crash-reports")]
const FATAL_SIGNALS: [nix::sys::signal::Signal; 5] = [
    nix::sys::signal::Signal::SIGSEGV,
    nix::sys::signal::Signal::SIGFPE,
    nix::sys::signal::Signal::SIGABRT,
    nix::sys::signal::Signal::SIGBUS,
    nix::sys::signal::Signal::SIGILL,
];

#[cfg(feature = "crash-reports")]
const ALT_STACK_SIZE: usize = 64 * 1024;

/// Initialize the crash reporter and attach the current thread.
///
/// Renders the report body, installs the fatal-signal handlers, and sets
/// up the calling thread's alternate stack. Per-signal handler
/// installation failure is a warning; anything else here is an error the
/// caller must treat as fatal.
pub fn init(config: ReporterConfig) -> Result<(), CrashReporterError> {
    #[cfg(feature = "crash-reports")]
    {
        init_impl(config)
    }
    #[cfg(not(feature = "crash-reports"))]
    {
        let _ = config;
        Ok(())
    }
}

/// Attach the calling thread to the reporter.
///
/// Installs this thread's alternate signal stack so fatal-signal handlers
/// can run even when the fault corrupted the thread stack. A no-op when
/// reporting is not enabled, and idempotent per thread.
pub fn attach() -> Result<(), CrashReporterError> {
    #[cfg(feature = "crash-reports")]
    {
        if !ENABLED.load(Ordering::SeqCst) {
            return Ok(());
        }
        ATTACHED.with(|attached| {
            if attached.get() {
                return Ok(());
            }
            install_alt_stack().map_err(CrashReporterError::AltStack)?;
            attached.set(true);
            Ok(())
        })
    }
    #[cfg(not(feature = "crash-reports"))]
    {
        Ok(())
    }
}

/// Whether reporting is active for this process.
pub fn enabled() -> bool {
    #[cfg(feature = "crash-reports")]
    {
        ENABLED.load(Ordering::SeqCst)
    }
    #[cfg(not(feature = "crash-reports"))]
    {
        false
    }
}

#[cfg(feature = "crash-reports")]
fn init_impl(config: ReporterConfig) -> Result<(), CrashReporterError> {
    let bytes = render_report(&config)?;

    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(CrashReporterError::AlreadyInitialized);
    }

    let leaked: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    REPORT_FD.store(config.report_fd, Ordering::SeqCst);
    REPORT_LEN.store(leaked.len(), Ordering::SeqCst);
    REPORT_PTR.store(leaked.as_ptr() as *mut u8, Ordering::SeqCst);
    ENABLED.store(true, Ordering::SeqCst);

    attach()?;
    install_handlers();
    Ok(())
}

#[cfg(feature = "crash-reports")]
fn render_report(config: &ReporterConfig) -> Result<Vec<u8>, CrashReporterError> {
    let report = CrashReport {
        pid: std::process::id(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        metadata: config.metadata.clone(),
    };
    let mut bytes = serde_json::to_vec(&report)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(feature = "crash-reports")]
fn install_alt_stack() -> io::Result<()> {
    // The stack must outlive the thread; threads attach once and live for
    // the process, so leaking one allocation per attached thread is fine.
    let stack = Box::leak(vec![0u8; ALT_STACK_SIZE].into_boxed_slice());
    let ss = libc::stack_t {
        ss_sp: stack.as_mut_ptr() as *mut libc::c_void,
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    if unsafe { libc::sigaltstack(&ss, std::ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(feature = "crash-reports")]
fn install_handlers() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
    use tracing::warn;

    let action = SigAction::new(
        SigHandler::SigAction(on_fatal_signal),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );

    for sig in FATAL_SIGNALS {
        // SAFETY: the handler only calls async-signal-safe functions.
        if let Err(err) = unsafe { sigaction(sig, &action) } {
            warn!(signal = %sig, error = %err, "failed to install crash handler");
        }
    }
}

/// Signal handler for the fatal set. Writes the pre-rendered report, then
/// restores the default disposition and re-raises so the process dies
/// through the normal OS fault path.
#[cfg(feature = "crash-reports")]
extern "C" fn on_fatal_signal(
    sig: c_int,
    _info: *mut libc::siginfo_t,
    _ctx: *mut libc::c_void,
) {
    let fd = REPORT_FD.load(Ordering::Relaxed);
    let ptr = REPORT_PTR.load(Ordering::Relaxed);
    let len = REPORT_LEN.load(Ordering::Relaxed);

    write_bytes(fd, b"ferryd: fatal signal ");
    write_bytes(fd, signal_name(sig));
    write_bytes(fd, b"\n");
    if !ptr.is_null() {
        // SAFETY: ptr/len describe the leaked report buffer stored at init.
        let report = unsafe { std::slice::from_raw_parts(ptr, len) };
        write_bytes(fd, report);
    }

    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

#[cfg(feature = "crash-reports")]
fn write_bytes(fd: c_int, buf: &[u8]) {
    let mut off = 0;
    while off < buf.len() {
        // SAFETY: writes within buf bounds; write(2) is async-signal-safe.
        let n = unsafe {
            libc::write(
                fd,
                buf[off..].as_ptr() as *const libc::c_void,
                buf.len() - off,
            )
        };
        if n <= 0 {
            break;
        }
        off += n as usize;
    }
}

#[cfg(feature = "crash-reports")]
fn signal_name(sig: c_int) -> &'static [u8] {
    match sig {
        libc::SIGSEGV => b"SIGSEGV",
        libc::SIGFPE => b"SIGFPE",
        libc::SIGABRT => b"SIGABRT",
        libc::SIGBUS => b"SIGBUS",
        libc::SIGILL => b"SIGILL",
        _ => b"UNKNOWN",
    }
}
