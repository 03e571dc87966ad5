//! Typed view of the settings document.

use crate::error::{SettingsError, SettingsResult};
use crate::settings::Document;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Port the local DNS server listens on when `resolv.port` is omitted.
pub const DEFAULT_RESOLV_PORT: u16 = 19323;

/// Effective settings, deserialized from a merged [`Document`].
///
/// # Example
///
/// ```
/// use dory::{Settings, settings};
///
/// let settings = Settings::from_document(&settings::defaults()).unwrap();
/// assert_eq!(settings.dory.resolv.port, 19323);
/// assert!(!settings.dory.debug);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Everything lives under the `dory` root table.
    pub dory: DorySettings,
}

/// Contents of the `dory` root table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DorySettings {
    /// The DNS server container.
    pub dnsmasq: DnsmasqSettings,
    /// The HTTP reverse proxy container.
    pub nginx_proxy: NginxProxySettings,
    /// The host resolver entry.
    pub resolv: ResolvSettings,
    /// Verbose output. Defaults to `false`.
    #[serde(default)]
    pub debug: bool,
}

/// The dnsmasq container answering for the custom domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsmasqSettings {
    /// Whether the container is started at all.
    pub enabled: bool,
    /// Never empty once validated.
    pub domains: Vec<DomainEntry>,
    /// Docker container name.
    pub container_name: String,
    /// Host port the container publishes DNS on.
    #[serde(default = "default_dnsmasq_port")]
    pub port: u16,
    /// Seconds to wait after starting the container.
    #[serde(default = "default_service_start_delay")]
    pub service_start_delay: u64,
}

/// A domain suffix and the address every name under it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Domain suffix (e.g. `"docker"`). Also the macOS resolver file name.
    pub domain: String,
    /// IPv4 address answered for the domain.
    pub address: String,
}

impl DomainEntry {
    /// Creates an entry routing `domain` to `address`.
    #[must_use]
    pub fn new(domain: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            address: address.into(),
        }
    }
}

/// The nginx reverse proxy container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NginxProxySettings {
    /// Whether the container is started at all.
    pub enabled: bool,
    /// Docker container name.
    pub container_name: String,
    /// Serve HTTPS as well as HTTP.
    #[serde(default = "default_true")]
    pub https_enabled: bool,
    /// Directory of certificates mounted into the proxy. Empty means none.
    pub ssl_certs_dir: String,
    /// Docker image to run.
    #[serde(default = "default_proxy_image")]
    pub image: String,
    /// Host port for HTTP.
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Host port for HTTPS.
    #[serde(default = "default_proxy_tls_port")]
    pub tls_port: u16,
}

/// Host resolver configuration pointing at the local DNS server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvSettings {
    /// Whether the host resolver is touched at all.
    pub enabled: bool,
    /// IPv4 address of the local nameserver.
    pub nameserver: String,
    /// Port of the local nameserver. Only macOS resolver files can carry it.
    #[serde(default = "default_resolv_port")]
    pub port: u16,
}

const fn default_true() -> bool {
    true
}

const fn default_dnsmasq_port() -> u16 {
    53
}

const fn default_service_start_delay() -> u64 {
    5
}

fn default_proxy_image() -> String {
    "codekitchen/dinghy-http-proxy:latest".to_string()
}

const fn default_proxy_port() -> u16 {
    80
}

const fn default_proxy_tls_port() -> u16 {
    443
}

const fn default_resolv_port() -> u16 {
    DEFAULT_RESOLV_PORT
}

impl Settings {
    /// Deserializes and validates a settings document.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Schema`] if a required key is missing or
    /// mistyped, `domains` is empty, or an address is not IPv4.
    pub fn from_document(doc: &Document) -> SettingsResult<Self> {
        let settings: Self = toml::Value::Table(doc.clone())
            .try_into()
            .map_err(|e: toml::de::Error| SettingsError::Schema(e.message().to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes back into a document.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Serialize`] if serialization fails.
    pub fn to_document(&self) -> SettingsResult<Document> {
        match toml::Value::try_from(self)? {
            toml::Value::Table(table) => Ok(table),
            other => Err(SettingsError::Schema(format!(
                "expected a table, got {}",
                other.type_str()
            ))),
        }
    }

    /// Domain suffixes in configuration order.
    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.dory.dnsmasq.domains.iter().map(|d| d.domain.as_str())
    }

    fn validate(&self) -> SettingsResult<()> {
        let dnsmasq = &self.dory.dnsmasq;
        if dnsmasq.domains.is_empty() {
            return Err(SettingsError::Schema(
                "dory.dnsmasq.domains must not be empty".to_string(),
            ));
        }
        for (i, entry) in dnsmasq.domains.iter().enumerate() {
            if entry.domain.trim().is_empty() {
                return Err(SettingsError::Schema(format!(
                    "dory.dnsmasq.domains[{i}].domain is empty"
                )));
            }
            // Domains double as file names under the macOS resolver directory.
            if entry.domain.contains(['/', '\\']) || entry.domain.starts_with('.') {
                return Err(SettingsError::Schema(format!(
                    "dory.dnsmasq.domains[{i}].domain is not a valid domain: {:?}",
                    entry.domain
                )));
            }
            check_ipv4(&format!("dory.dnsmasq.domains[{i}].address"), &entry.address)?;
        }
        check_ipv4("dory.resolv.nameserver", &self.dory.resolv.nameserver)
    }
}

fn check_ipv4(key: &str, value: &str) -> SettingsResult<()> {
    value.parse::<Ipv4Addr>().map(|_| ()).map_err(|_| {
        SettingsError::Schema(format!("{key} is not an IPv4 address: {value:?}"))
    })
}
