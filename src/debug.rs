//! Debug flag parsing
//!
//! The `-v` option (or the `FERRYD_DEBUG` environment variable when `-v` is
//! absent) carries a comma-separated list of subsystem names, each of which
//! turns on debug-level logging for the matching part of the broker. A raw
//! decimal or `0x`-prefixed bitmask is also accepted.

use std::fmt;

/// Set of debug categories requested on the command line or environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags(u32);

impl DebugFlags {
    pub const MSG: Self = Self(1 << 0);
    pub const ROUTE: Self = Self(1 << 1);
    pub const IO: Self = Self(1 << 2);
    pub const CONN: Self = Self(1 << 3);
    pub const CONFIG: Self = Self(1 << 4);
    pub const PEER: Self = Self(1 << 5);
    pub const HTTP: Self = Self(1 << 6);
    pub const PANIC: Self = Self(1 << 7);

    /// Parse a debug-flags string.
    ///
    /// Unknown names are skipped with a warning on stderr; parsing itself
    /// never fails, so a stray name cannot keep the broker from starting.
    pub fn parse(s: &str) -> Self {
        let mut bits = 0u32;
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some(hex) = part.strip_prefix("0x") {
                if let Ok(v) = u32::from_str_radix(hex, 16) {
                    bits |= v;
                    continue;
                }
            }
            if let Ok(v) = part.parse::<u32>() {
                bits |= v;
                continue;
            }
            match NAMES.iter().find(|(name, _)| *name == part) {
                Some((_, flag)) => bits |= flag.0,
                None => eprintln!("ferryd: unknown debug flag '{}'", part),
            }
        }
        Self(bits)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Render tracing filter directives for the requested categories.
    ///
    /// Each category maps to the module that owns it; everything else stays
    /// at info level.
    pub fn filter_directives(self) -> String {
        let mut out = String::from("ferryd=info");
        for (flag, target) in TARGETS {
            if self.contains(*flag) {
                out.push(',');
                out.push_str(target);
                out.push_str("=debug");
            }
        }
        out
    }
}

impl fmt::Display for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, flag) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

const NAMES: &[(&str, DebugFlags)] = &[
    ("msg", DebugFlags::MSG),
    ("route", DebugFlags::ROUTE),
    ("io", DebugFlags::IO),
    ("conn", DebugFlags::CONN),
    ("config", DebugFlags::CONFIG),
    ("peer", DebugFlags::PEER),
    ("http", DebugFlags::HTTP),
    ("panic", DebugFlags::PANIC),
];

const TARGETS: &[(DebugFlags, &str)] = &[
    (DebugFlags::MSG, "ferryd::pool"),
    (DebugFlags::ROUTE, "ferryd::modules"),
    (DebugFlags::IO, "ferryd::store"),
    (DebugFlags::CONN, "ferryd::listener"),
    (DebugFlags::CONFIG, "ferryd::config"),
    (DebugFlags::PEER, "ferryd::identity"),
    (DebugFlags::HTTP, "ferryd::listener"),
    (DebugFlags::PANIC, "ferryd::crash"),
];
