//! Host DNS resolver management.
//!
//! Every strategy tags what it writes with [`MARKER`] so it can later find
//! and remove exactly its own entries. Detection also accepts content that
//! carries our nameserver without the marker, so hand-edited files count as
//! configured.
//!
//! There is no locking: two processes editing the same resolver file at once
//! can interleave their read-modify-write cycles. Writes go through
//! write-then-rename, so resolver lookups never observe a half-written file.

pub mod linux;
pub mod macos;

pub use linux::LinuxResolver;
pub use macos::MacosResolver;

use crate::config::Settings;
use crate::error::{ResolverError, Result};
use crate::platform::{self, OsFamily};
use crate::util::is_root;
use std::path::PathBuf;

/// Marker comment embedded in every entry this crate writes.
pub const MARKER: &str = "# added by dory";

/// A resolver file this crate installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEntry {
    /// File the OS resolver reads.
    pub path: PathBuf,
    /// Comment identifying the entry as ours.
    pub marker: &'static str,
    /// Text installed in the file.
    pub content: String,
}

/// Installs and removes the local nameserver in the host resolver.
///
/// [`configure`](Self::configure) and [`clean`](Self::clean) are idempotent
/// and never fail loudly: errors are logged and reported as `false`, leaving
/// privilege escalation to the caller.
pub trait Resolver {
    /// The OS family this strategy serves.
    fn os(&self) -> OsFamily;

    /// Files this strategy writes for `settings`.
    fn resolver_paths(&self, settings: &Settings) -> Vec<PathBuf>;

    /// Returns `true` if `contents` already routes to our nameserver.
    fn contents_has_our_nameserver(&self, contents: &str, settings: &Settings) -> bool;

    /// Returns `true` if the on-disk resolver state already has our entry.
    fn has_our_nameserver(&self, settings: &Settings) -> bool;

    /// Installs our entry unless it is already present.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError`] if a file cannot be written or a helper
    /// command fails.
    fn try_configure(&self, settings: &Settings) -> Result<()>;

    /// Removes the entries carrying [`MARKER`], leaving everything else.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError`] if a file cannot be written or removed, or
    /// a helper command fails.
    fn try_clean(&self, settings: &Settings) -> Result<()>;

    /// Ensures the host resolves through our nameserver.
    fn configure(&self, settings: &Settings) -> bool {
        report(self.os(), "configure", self.try_configure(settings))
    }

    /// Removes everything [`configure`](Self::configure) installed.
    fn clean(&self, settings: &Settings) -> bool {
        report(self.os(), "clean", self.try_clean(settings))
    }
}

/// Returns the resolver strategy for `os`.
///
/// # Errors
///
/// Returns [`ResolverError::UnsupportedPlatform`] for [`OsFamily::Unknown`].
pub fn resolver_for(os: OsFamily) -> Result<Box<dyn Resolver>> {
    match os {
        OsFamily::MacOs => Ok(Box::new(MacosResolver::new())),
        os if os.is_linux() => Ok(Box::new(LinuxResolver::new(os))),
        _ => Err(ResolverError::UnsupportedPlatform { os }),
    }
}

/// Detects the host platform and returns its resolver strategy.
///
/// # Errors
///
/// Returns [`ResolverError::UnsupportedPlatform`] if the host is not
/// recognized.
pub fn resolver_for_host() -> Result<Box<dyn Resolver>> {
    resolver_for(platform::detect())
}

fn report(os: OsFamily, operation: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_permission_denied() && !is_root() => {
            tracing::warn!(
                os = %os,
                operation,
                error = %e,
                "Permission denied updating resolver, elevated privileges required"
            );
            false
        }
        Err(e) => {
            tracing::warn!(os = %os, operation, error = %e, "Resolver update failed");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Content matching
// ---------------------------------------------------------------------------

/// Whitespace-separated words of `line` before any `#` comment.
fn directive_words(line: &str) -> impl Iterator<Item = &str> {
    line.split('#').next().unwrap_or_default().split_whitespace()
}

fn is_directive(line: &str, keyword: &str, value: &str) -> bool {
    let mut words = directive_words(line);
    words.next() == Some(keyword) && words.next() == Some(value) && words.next().is_none()
}

/// Returns `true` if any line carries [`MARKER`].
pub(crate) fn has_marker(contents: &str) -> bool {
    contents.lines().any(|line| line.contains(MARKER))
}

/// Returns `true` for a `nameserver <ip>` line, ignoring spacing and comments.
pub(crate) fn is_nameserver_line(line: &str, nameserver: &str) -> bool {
    is_directive(line, "nameserver", nameserver)
}

/// Returns `true` for a `port <n>` line, ignoring spacing and comments.
pub(crate) fn is_port_line(line: &str, port: u16) -> bool {
    is_directive(line, "port", &port.to_string())
}
