//! # dory
//!
//! Settings and host DNS resolver management for a local Docker development
//! environment.
//!
//! A dnsmasq container answers for a set of development domains. This crate
//! keeps the user's settings file in step with the compiled-in defaults and
//! points the host resolver at that DNS server for those domains.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use dory::{SettingsStore, resolver};
//!
//! let store = SettingsStore::at_default_location()?;
//! store.upgrade_settings_file()?;
//! let settings = store.settings()?;
//!
//! // Fails with `UnsupportedPlatform` on hosts we don't know.
//! let resolver = resolver::resolver_for_host()?;
//! if !resolver.has_our_nameserver(&settings) && !resolver.configure(&settings) {
//!     eprintln!("could not update the resolver, try again with sudo");
//! }
//!
//! // Later, on `dory down`.
//! resolver.clean(&settings);
//! ```
//!
//! ## Settings
//!
//! The settings file (`~/.dory.toml`, or `$DORY_SETTINGS_FILE`) only needs
//! the keys the user wants to change; everything else comes from
//! [`settings::defaults`]:
//!
//! ```toml
//! [dory.resolv]
//! port = 20053
//!
//! [dory.dnsmasq]
//! domains = [
//!     { domain = "docker", address = "127.0.0.1" },
//!     { domain = "dev", address = "127.0.0.1" },
//! ]
//! ```
//!
//! ## Platforms
//!
//! - **macOS**: one `/etc/resolver/<domain>` file per domain.
//! - **Ubuntu, Fedora, Arch**: a marked block in `/etc/resolv.conf` (or the
//!   `resolvconf` head fragment on Ubuntu).
//!
//! ## Permissions
//!
//! Resolver files are owned by root. [`Resolver::configure`] and
//! [`Resolver::clean`] return `false` when they lack permission; the caller
//! is responsible for privilege elevation.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod config;
pub mod error;
pub mod platform;
pub mod resolver;
pub mod settings;
pub mod util;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::{DomainEntry, Settings};
pub use error::{ResolverError, Result, SettingsError, SettingsResult};
pub use platform::OsFamily;
pub use resolver::{LinuxResolver, MacosResolver, Resolver, ResolverEntry};
pub use settings::{Document, SettingsContent, SettingsStore};
