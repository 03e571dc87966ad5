//! macOS `/etc/resolver/` management.
//!
//! macOS routes queries for `<domain>` to the nameserver listed in
//! `/etc/resolver/<domain>`, so each configured domain gets its own file.
//! Changes take effect immediately; verify with `scutil --dns`.

use super::{MARKER, Resolver, ResolverEntry, has_marker, is_nameserver_line, is_port_line};
use crate::config::Settings;
use crate::error::Result;
use crate::platform::OsFamily;
use crate::util::atomic_write;
use std::path::{Path, PathBuf};

/// Default macOS resolver directory.
const DEFAULT_RESOLVER_DIR: &str = "/etc/resolver";

/// Manages one `/etc/resolver/<domain>` file per configured domain.
///
/// # Permissions
///
/// `/etc/resolver/` requires root. The caller must handle elevation.
///
/// # Example
///
/// ```rust,ignore
/// use dory::{MacosResolver, Resolver, SettingsStore};
///
/// let settings = SettingsStore::at_default_location()?.settings()?;
/// let resolver = MacosResolver::new();
/// if !resolver.configure(&settings) {
///     // retry with sudo
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MacosResolver {
    resolver_dir: PathBuf,
}

impl MacosResolver {
    /// Creates a resolver targeting the default `/etc/resolver` directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver_dir: PathBuf::from(DEFAULT_RESOLVER_DIR),
        }
    }

    /// Creates a resolver targeting a custom directory (useful for testing).
    #[must_use]
    pub fn with_dir(resolver_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver_dir: resolver_dir.into(),
        }
    }

    /// Returns the resolver directory path.
    #[must_use]
    pub fn resolver_dir(&self) -> &Path {
        &self.resolver_dir
    }

    /// One file name per configured domain.
    #[must_use]
    pub fn resolv_file_names(settings: &Settings) -> Vec<String> {
        settings.domain_names().map(str::to_string).collect()
    }

    /// The files [`configure`](Resolver::configure) writes.
    #[must_use]
    pub fn entries(&self, settings: &Settings) -> Vec<ResolverEntry> {
        let content = resolv_contents(settings);
        Self::resolv_file_names(settings)
            .into_iter()
            .map(|name| ResolverEntry {
                path: self.resolver_dir.join(name),
                marker: MARKER,
                content: content.clone(),
            })
            .collect()
    }
}

impl Default for MacosResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for MacosResolver {
    fn os(&self) -> OsFamily {
        OsFamily::MacOs
    }

    fn resolver_paths(&self, settings: &Settings) -> Vec<PathBuf> {
        Self::resolv_file_names(settings)
            .into_iter()
            .map(|name| self.resolver_dir.join(name))
            .collect()
    }

    fn contents_has_our_nameserver(&self, contents: &str, settings: &Settings) -> bool {
        has_marker(contents) || routes_to_current(contents, settings)
    }

    fn has_our_nameserver(&self, settings: &Settings) -> bool {
        let paths = self.resolver_paths(settings);
        !paths.is_empty()
            && paths.iter().all(|path| {
                std::fs::read_to_string(path).is_ok_and(|c| routes_to_current(&c, settings))
            })
    }

    /// Writes `/etc/resolver/<domain>` for every configured domain.
    ///
    /// Files that already name the current nameserver and port are left
    /// untouched. Anything else, including our own entry written for an
    /// older nameserver or port, is rewritten.
    fn try_configure(&self, settings: &Settings) -> Result<()> {
        if !self.resolver_dir.exists() {
            std::fs::create_dir_all(&self.resolver_dir)?;
        }

        for entry in self.entries(settings) {
            let existing = std::fs::read_to_string(&entry.path).ok();
            if existing.is_some_and(|c| routes_to_current(&c, settings)) {
                tracing::debug!(path = %entry.path.display(), "Resolver file already configured");
                continue;
            }

            atomic_write(&entry.path, &entry.content)?;
            tracing::info!(
                path = %entry.path.display(),
                nameserver = %settings.dory.resolv.nameserver,
                port = settings.dory.resolv.port,
                "Registered macOS DNS resolver"
            );
        }
        Ok(())
    }

    /// Removes each domain's file if it carries the marker.
    ///
    /// Missing files are skipped. Files created by other tools are left
    /// in place.
    fn try_clean(&self, settings: &Settings) -> Result<()> {
        for path in self.resolver_paths(settings) {
            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "Resolver file does not exist, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !has_marker(&contents) {
                tracing::warn!(
                    path = %path.display(),
                    "Resolver file not managed by dory, leaving it in place"
                );
                continue;
            }

            std::fs::remove_file(&path)?;
            tracing::info!(path = %path.display(), "Unregistered macOS DNS resolver");
        }
        Ok(())
    }
}

/// Returns `true` if `contents` has the `nameserver` and `port` lines
/// for the current settings, in any order.
fn routes_to_current(contents: &str, settings: &Settings) -> bool {
    let resolv = &settings.dory.resolv;
    contents
        .lines()
        .any(|l| is_nameserver_line(l, &resolv.nameserver))
        && contents.lines().any(|l| is_port_line(l, resolv.port))
}

/// Generates resolver file content.
///
/// ```text
/// # added by dory
/// nameserver 127.0.0.1
/// port 19323
/// ```
fn resolv_contents(settings: &Settings) -> String {
    let resolv = &settings.dory.resolv;
    format!(
        "{MARKER}\nnameserver {ns}\nport {port}\n",
        ns = resolv.nameserver,
        port = resolv.port,
    )
}
