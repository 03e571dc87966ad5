//! Linux `resolv.conf` management.
//!
//! All Linux families share one system-wide resolver file. Our nameserver is
//! inserted as a marked block ahead of the existing `nameserver` lines so it
//! is consulted first:
//!
//! ```text
//! # added by dory
//! nameserver 127.0.0.1
//! # end added by dory
//! ```
//!
//! `resolv.conf` has no port directive, so the local DNS server must answer
//! on port 53 of the configured nameserver address.

use super::{MARKER, Resolver, has_marker, is_nameserver_line};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::Settings;
use crate::error::{ResolverError, Result};
use crate::platform::OsFamily;
use crate::util::atomic_write;
use std::fmt;
use std::path::{Path, PathBuf};

/// Closes the block opened by [`MARKER`].
pub const MARKER_END: &str = "# end added by dory";

/// System-wide resolver configuration.
const DEFAULT_RESOLV_FILE: &str = "/etc/resolv.conf";

/// Directory present when Ubuntu's `resolvconf` package owns `resolv.conf`.
const UBUNTU_RESOLVCONF_DIR: &str = "/etc/resolvconf/resolv.conf.d";

/// Manages the marked block in a single shared resolver file.
pub struct LinuxResolver {
    os: OsFamily,
    resolv_file: PathBuf,
    /// Regenerates the live resolver file after `resolv_file` changes.
    refresh: Option<(String, Vec<String>)>,
    runner: Box<dyn CommandRunner>,
}

impl LinuxResolver {
    /// Creates the resolver for a Linux family's standard file.
    ///
    /// On Ubuntu with `resolvconf` installed this edits the `head` fragment
    /// and runs `resolvconf -u` afterwards; otherwise `/etc/resolv.conf`.
    #[must_use]
    pub fn new(os: OsFamily) -> Self {
        let resolvconf_dir = Path::new(UBUNTU_RESOLVCONF_DIR);
        if os == OsFamily::Ubuntu && resolvconf_dir.is_dir() {
            Self::with_file(os, resolvconf_dir.join("head")).with_refresh("resolvconf", &["-u"])
        } else {
            Self::with_file(os, DEFAULT_RESOLV_FILE)
        }
    }

    /// Creates a resolver editing `resolv_file` (useful for testing).
    #[must_use]
    pub fn with_file(os: OsFamily, resolv_file: impl Into<PathBuf>) -> Self {
        Self {
            os,
            resolv_file: resolv_file.into(),
            refresh: None,
            runner: Box::new(SystemCommandRunner),
        }
    }

    /// Runs `program args..` after every change to the resolver file.
    #[must_use]
    pub fn with_refresh(mut self, program: &str, args: &[&str]) -> Self {
        self.refresh = Some((
            program.to_string(),
            args.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    /// Replaces the command runner used for the refresh command.
    #[must_use]
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Returns the resolver file path.
    #[must_use]
    pub fn resolv_file(&self) -> &Path {
        &self.resolv_file
    }

    fn read_resolv_file(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.resolv_file) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_resolv_file(&self, contents: &str) -> Result<()> {
        atomic_write(&self.resolv_file, contents)?;
        self.run_refresh()
    }

    fn run_refresh(&self) -> Result<()> {
        let Some((program, args)) = &self.refresh else {
            return Ok(());
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.runner.run(program, &args)?;
        if !output.success {
            return Err(ResolverError::Command {
                program: program.clone(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        tracing::debug!(program = %program, "Refreshed resolver configuration");
        Ok(())
    }
}

impl fmt::Debug for LinuxResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinuxResolver")
            .field("os", &self.os)
            .field("resolv_file", &self.resolv_file)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl Resolver for LinuxResolver {
    fn os(&self) -> OsFamily {
        self.os
    }

    fn resolver_paths(&self, _settings: &Settings) -> Vec<PathBuf> {
        vec![self.resolv_file.clone()]
    }

    fn contents_has_our_nameserver(&self, contents: &str, settings: &Settings) -> bool {
        let nameserver = &settings.dory.resolv.nameserver;
        has_marker(contents) || contents.lines().any(|l| is_nameserver_line(l, nameserver))
    }

    fn has_our_nameserver(&self, settings: &Settings) -> bool {
        let nameserver = &settings.dory.resolv.nameserver;
        std::fs::read_to_string(&self.resolv_file)
            .is_ok_and(|c| c.lines().any(|l| is_nameserver_line(l, nameserver)))
    }

    fn try_configure(&self, settings: &Settings) -> Result<()> {
        let current = self.read_resolv_file()?.unwrap_or_default();
        let configured = configured_contents(&current, &settings.dory.resolv.nameserver);
        if configured == current {
            tracing::debug!(path = %self.resolv_file.display(), "Nameserver already configured");
            return Ok(());
        }

        self.write_resolv_file(&configured)?;
        tracing::info!(
            path = %self.resolv_file.display(),
            nameserver = %settings.dory.resolv.nameserver,
            "Added nameserver to resolver file"
        );
        Ok(())
    }

    fn try_clean(&self, settings: &Settings) -> Result<()> {
        let Some(current) = self.read_resolv_file()? else {
            tracing::debug!(path = %self.resolv_file.display(), "Resolver file does not exist, skipping");
            return Ok(());
        };

        let cleaned = remove_block(&current, &settings.dory.resolv.nameserver);
        if cleaned == current {
            tracing::debug!(path = %self.resolv_file.display(), "No marked nameserver to remove");
            return Ok(());
        }

        self.write_resolv_file(&cleaned)?;
        tracing::info!(path = %self.resolv_file.display(), "Removed nameserver from resolver file");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Block editing
// ---------------------------------------------------------------------------

/// Returns `contents` routed through `nameserver`.
///
/// Any marked block is rebuilt so a block left behind for an older
/// nameserver is replaced. An unmarked `nameserver` line for the same
/// address already satisfies the file and no block is added.
fn configured_contents(contents: &str, nameserver: &str) -> String {
    let base = if has_marker(contents) {
        remove_block(contents, nameserver)
    } else {
        contents.to_string()
    };
    if base.lines().any(|l| is_nameserver_line(l, nameserver)) {
        base
    } else {
        insert_block(&base, nameserver)
    }
}

/// Inserts the marked block before the first `nameserver` line, or at the end.
fn insert_block(contents: &str, nameserver: &str) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let at = lines
        .iter()
        .position(|l| l.split_whitespace().next() == Some("nameserver"))
        .unwrap_or(lines.len());

    let nameserver_line = format!("nameserver {nameserver}");
    let mut out = Vec::with_capacity(lines.len() + 3);
    out.extend_from_slice(&lines[..at]);
    out.extend([MARKER, nameserver_line.as_str(), MARKER_END]);
    out.extend_from_slice(&lines[at..]);

    join_lines(&out, contents.is_empty() || contents.ends_with('\n'))
}

/// Removes marked blocks, keeping every other line in order.
///
/// A block runs from a [`MARKER`] line through the next [`MARKER_END`]. A
/// marker with no end removes only itself and the `nameserver` lines
/// directly after it, and a line tagged inline with the marker is dropped
/// on its own.
fn remove_block(contents: &str, nameserver: &str) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let mut kept = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim() == MARKER {
            if let Some(len) = lines[i + 1..].iter().position(|l| l.trim() == MARKER_END) {
                i += len + 2;
            } else {
                i += 1;
                while i < lines.len() && is_nameserver_line(lines[i], nameserver) {
                    i += 1;
                }
            }
            continue;
        }
        if !line.contains(MARKER) {
            kept.push(line);
        }
        i += 1;
    }

    join_lines(&kept, contents.ends_with('\n'))
}

fn join_lines(lines: &[&str], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}
