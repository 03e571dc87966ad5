//! Settings document store.
//!
//! The persisted document is merged over compiled-in [`defaults`] on every
//! read, so keys added to the defaults in later releases appear without the
//! user touching their file, while anything the user set explicitly wins.
//! Documents in the legacy single-domain shape are migrated in place by
//! [`SettingsStore::upgrade_settings_file`].

use crate::config::Settings;
use crate::error::{SettingsError, SettingsResult};
use crate::util::atomic_write;
use std::path::{Path, PathBuf};
use toml::Value;

/// An untyped settings document.
pub type Document = toml::Table;

/// Environment variable overriding the settings file location.
pub const SETTINGS_PATH_ENV: &str = "DORY_SETTINGS_FILE";

/// Settings file name under the home directory.
pub const SETTINGS_FILE_NAME: &str = ".dory.toml";

/// Returns the compiled-in default document.
#[must_use]
pub fn defaults() -> Document {
    toml::toml! {
        [dory]
        debug = false

        [dory.dnsmasq]
        enabled = true
        domains = [{ domain = "docker", address = "127.0.0.1" }]
        container_name = "dory_dnsmasq"
        port = 53
        service_start_delay = 5

        [dory.nginx_proxy]
        enabled = true
        container_name = "dory_dinghy_http_proxy"
        https_enabled = true
        ssl_certs_dir = ""
        image = "codekitchen/dinghy-http-proxy:latest"
        port = 80
        tls_port = 443

        [dory.resolv]
        enabled = true
        nameserver = "127.0.0.1"
        port = 19323
    }
}

/// Recursively merges `overrides` over `base`.
///
/// Tables merge key by key; every other value in `overrides`, arrays
/// included, replaces the base value wholesale. Keys only in `overrides`
/// are carried through.
#[must_use]
pub fn merge(base: &Document, overrides: &Document) -> Document {
    let mut merged = base.clone();
    for (key, value) in overrides {
        match (merged.get_mut(key), value) {
            (Some(Value::Table(base_table)), Value::Table(override_table)) => {
                *base_table = merge(base_table, override_table);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Returns `true` if the document uses the single `domain`/`address` shape.
#[must_use]
pub fn is_legacy(doc: &Document) -> bool {
    dnsmasq_table(doc).is_some_and(|dnsmasq| {
        (dnsmasq.contains_key("domain") || dnsmasq.contains_key("address"))
            && !dnsmasq.contains_key("domains")
    })
}

/// Rewrites a legacy document to the `domains` shape.
///
/// The singular pair becomes the sole `domains` entry (a missing half is
/// taken from the default first entry) and the singular keys are dropped.
/// Everything else is untouched. Current documents are returned as-is.
#[must_use]
pub fn upgrade_document(mut doc: Document) -> Document {
    if !is_legacy(&doc) {
        return doc;
    }

    let fallback = default_first_domain();
    if let Some(dnsmasq) = doc
        .get_mut("dory")
        .and_then(Value::as_table_mut)
        .and_then(|dory| dory.get_mut("dnsmasq"))
        .and_then(Value::as_table_mut)
    {
        let mut entry = toml::Table::new();
        for key in ["domain", "address"] {
            let value = dnsmasq
                .remove(key)
                .or_else(|| fallback.as_ref().and_then(|f| f.get(key).cloned()));
            if let Some(value) = value {
                entry.insert(key.to_string(), value);
            }
        }
        dnsmasq.insert("domains".to_string(), Value::Array(vec![Value::Table(entry)]));
    }
    doc
}

fn dnsmasq_table(doc: &Document) -> Option<&toml::Table> {
    doc.get("dory")?.get("dnsmasq")?.as_table()
}

fn default_first_domain() -> Option<toml::Table> {
    dnsmasq_table(&defaults())?
        .get("domains")?
        .as_array()?
        .first()?
        .as_table()
        .cloned()
}

/// What [`SettingsStore::write_settings`] persists.
#[derive(Debug, Clone, Copy)]
pub enum SettingsContent<'a> {
    /// A decoded document, serialized before writing.
    Document(&'a Document),
    /// Already-serialized text, written verbatim.
    Raw(&'a str),
}

/// Reads and writes the settings file at a fixed path.
///
/// # Example
///
/// ```rust,ignore
/// use dory::SettingsStore;
///
/// let store = SettingsStore::at_default_location()?;
/// store.upgrade_settings_file()?;
/// let settings = store.settings()?;
/// ```
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store for the settings file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at `$DORY_SETTINGS_FILE`, or `~/.dory.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NoHomeDir`] if neither is available.
    pub fn at_default_location() -> SettingsResult<Self> {
        if let Some(path) = std::env::var_os(SETTINGS_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(Self::new(path));
        }
        dirs::home_dir()
            .map(|home| Self::new(home.join(SETTINGS_FILE_NAME)))
            .ok_or(SettingsError::NoHomeDir)
    }

    /// Returns the settings file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document on disk without merging.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotFound`] if the file is absent,
    /// [`SettingsError::Parse`] if it is malformed, or
    /// [`SettingsError::Io`] if it cannot be read.
    pub fn load(&self) -> SettingsResult<Document> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SettingsError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Returns the on-disk document merged over [`defaults`].
    ///
    /// A missing file yields the defaults. Nothing is written. The result is
    /// not validated: a user file that sets `domains = []` yields an empty
    /// list here, and only [`settings`](Self::settings) rejects it.
    ///
    /// # Errors
    ///
    /// Propagates [`load`](Self::load) errors other than `NotFound`.
    pub fn effective_settings(&self) -> SettingsResult<Document> {
        let user = match self.load() {
            Ok(doc) => doc,
            Err(SettingsError::NotFound { .. }) => {
                tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
                Document::new()
            }
            Err(e) => return Err(e),
        };
        Ok(merge(&defaults(), &user))
    }

    /// Returns the validated, typed effective settings.
    ///
    /// # Errors
    ///
    /// Propagates [`effective_settings`](Self::effective_settings) errors,
    /// or [`SettingsError::Schema`] if the merged document is invalid.
    pub fn settings(&self) -> SettingsResult<Settings> {
        Settings::from_document(&self.effective_settings()?)
    }

    /// Overwrites the settings file with the defaults.
    ///
    /// # Errors
    ///
    /// Returns serialization or I/O errors.
    pub fn write_default_settings_file(&self) -> SettingsResult<()> {
        self.write_settings(SettingsContent::Document(&defaults()))
    }

    /// Persists `content` verbatim. No merge is performed.
    ///
    /// # Errors
    ///
    /// Returns serialization or I/O errors. The previous file is left
    /// intact on failure.
    pub fn write_settings(&self, content: SettingsContent<'_>) -> SettingsResult<()> {
        let text = match content {
            SettingsContent::Document(doc) => toml::to_string_pretty(doc)?,
            SettingsContent::Raw(raw) => raw.to_string(),
        };
        atomic_write(&self.path, &text)?;
        tracing::info!(path = %self.path.display(), "Wrote settings file");
        Ok(())
    }

    /// Returns `true` if the file on disk uses the legacy schema.
    ///
    /// A missing file does not need upgrading.
    ///
    /// # Errors
    ///
    /// Propagates parse and I/O errors from [`load`](Self::load).
    pub fn needs_upgrade(&self) -> SettingsResult<bool> {
        match self.load() {
            Ok(doc) => Ok(is_legacy(&doc)),
            Err(SettingsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Migrates a legacy settings file in place.
    ///
    /// The upgraded document is merged over the defaults before writing so
    /// newly introduced keys are persisted too. Returns `true` if the file
    /// was rewritten; a current or missing file is left alone.
    ///
    /// # Errors
    ///
    /// Propagates load, serialization and I/O errors. Returns
    /// [`SettingsError::Schema`] without touching the file if the upgraded
    /// document would not be valid settings.
    pub fn upgrade_settings_file(&self) -> SettingsResult<bool> {
        if !self.needs_upgrade()? {
            tracing::debug!(path = %self.path.display(), "Settings file is current");
            return Ok(false);
        }

        let upgraded = merge(&defaults(), &upgrade_document(self.load()?));
        Settings::from_document(&upgraded)?;
        self.write_settings(SettingsContent::Document(&upgraded))?;
        tracing::info!(path = %self.path.display(), "Upgraded legacy settings file");
        Ok(true)
    }

    /// Returns `dory.debug` from the effective settings.
    ///
    /// Any failure to read the settings counts as `false`.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        match self.effective_settings() {
            Ok(doc) => doc
                .get("dory")
                .and_then(|dory| dory.get("debug"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                tracing::debug!(error = %e, "Could not read settings for debug flag");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        toml::from_str(text).unwrap()
    }

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("dory.toml"))
    }

    const LEGACY: &str = r#"
        [dory.dnsmasq]
        enabled = true
        domain = "docker_test_name"
        address = "192.168.11.1"
        container_name = "dory_dnsmasq_test_name"

        [dory.nginx_proxy]
        enabled = true
        container_name = "dory_dinghy_http_proxy_test_name"
        ssl_certs_dir = "/tmp/certs"

        [dory.resolv]
        enabled = true
        nameserver = "192.168.11.1"
        port = 53
    "#;

    #[test]
    fn merge_recurses_and_override_wins() {
        let base = doc("[a]\nx = 1\ny = 2\n[a.inner]\nz = 3\nw = 4\n");
        let over = doc("[a]\nx = 10\n[a.inner]\nw = 40\n");
        let merged = merge(&base, &over);
        assert_eq!(merged, doc("[a]\nx = 10\ny = 2\n[a.inner]\nz = 3\nw = 40\n"));
    }

    #[test]
    fn merge_replaces_arrays_wholesale() {
        let base = doc("list = [1, 2, 3]\n");
        let over = doc("list = [9]\n");
        assert_eq!(merge(&base, &over)["list"], Value::Array(vec![Value::Integer(9)]));
    }

    #[test]
    fn merge_keeps_override_only_keys() {
        let merged = merge(&doc("a = 1\n"), &doc("b = 2\n[extra]\nc = 3\n"));
        assert_eq!(merged, doc("a = 1\nb = 2\n[extra]\nc = 3\n"));
    }

    #[test]
    fn merge_scalar_over_table_wins() {
        let merged = merge(&doc("[a]\nx = 1\n"), &doc("a = false\n"));
        assert_eq!(merged["a"], Value::Boolean(false));
    }

    #[test]
    fn merge_with_empty_override_is_identity() {
        assert_eq!(merge(&defaults(), &Document::new()), defaults());
    }

    #[test]
    fn legacy_detection() {
        assert!(is_legacy(&doc(LEGACY)));
        assert!(!is_legacy(&defaults()));
        assert!(!is_legacy(&Document::new()));

        let both = doc("[dory.dnsmasq]\ndomain = \"a\"\ndomains = []\n");
        assert!(!is_legacy(&both));
    }

    #[test]
    fn upgrade_wraps_pair_and_keeps_other_keys() {
        let upgraded = upgrade_document(doc(LEGACY));
        let dnsmasq = upgraded["dory"]["dnsmasq"].as_table().unwrap();

        assert!(!dnsmasq.contains_key("domain"));
        assert!(!dnsmasq.contains_key("address"));
        assert_eq!(
            dnsmasq["domains"],
            Value::Array(vec![Value::Table(doc(
                "domain = \"docker_test_name\"\naddress = \"192.168.11.1\"\n"
            ))])
        );
        assert_eq!(dnsmasq["container_name"].as_str(), Some("dory_dnsmasq_test_name"));
        assert_eq!(upgraded["dory"]["resolv"], doc(LEGACY)["dory"]["resolv"]);
    }

    #[test]
    fn upgrade_fills_missing_half_from_defaults() {
        let upgraded = upgrade_document(doc("[dory.dnsmasq]\ndomain = \"dev\"\n"));
        let entry = upgraded["dory"]["dnsmasq"]["domains"][0].as_table().unwrap();
        assert_eq!(entry["domain"].as_str(), Some("dev"));
        assert_eq!(entry["address"].as_str(), Some("127.0.0.1"));
    }

    #[test]
    fn upgrade_of_current_document_is_identity() {
        assert_eq!(upgrade_document(defaults()), defaults());
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            store_in(&dir).load(),
            Err(SettingsError::NotFound { .. })
        ));
    }

    #[test]
    fn load_malformed_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "[dory\nnot toml").unwrap();
        assert!(matches!(store.load(), Err(SettingsError::Parse { .. })));
        assert!(matches!(
            store.effective_settings(),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn effective_settings_without_file_are_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.effective_settings().unwrap(), defaults());
        assert!(!store.path().exists());
    }

    #[test]
    fn effective_settings_fill_omitted_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .write_settings(SettingsContent::Raw(
                "[dory.nginx_proxy]\ncontainer_name = \"custom_proxy\"\n",
            ))
            .unwrap();

        let settings = store.settings().unwrap();
        assert_eq!(settings.dory.nginx_proxy.container_name, "custom_proxy");
        assert_eq!(settings.dory.nginx_proxy.ssl_certs_dir, "");
        assert!(settings.dory.nginx_proxy.enabled);
        assert_eq!(settings.dory.dnsmasq.domains[0].domain, "docker");
    }

    #[test]
    fn write_default_settings_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "garbage = [").unwrap();

        store.write_default_settings_file().unwrap();
        assert_eq!(store.load().unwrap(), defaults());
    }

    #[test]
    fn write_raw_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let raw = "# my settings\n[dory]\ndebug = true\n";
        store.write_settings(SettingsContent::Raw(raw)).unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), raw);
    }

    #[test]
    fn needs_upgrade_cases() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.needs_upgrade().unwrap());

        store.write_settings(SettingsContent::Raw(LEGACY)).unwrap();
        assert!(store.needs_upgrade().unwrap());

        store.write_default_settings_file().unwrap();
        assert!(!store.needs_upgrade().unwrap());
    }

    #[test]
    fn upgrade_settings_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.write_settings(SettingsContent::Raw(LEGACY)).unwrap();

        assert!(store.upgrade_settings_file().unwrap());
        let once = std::fs::read_to_string(store.path()).unwrap();
        assert!(!store.upgrade_settings_file().unwrap());
        let twice = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(once, twice);

        let loaded = store.load().unwrap();
        let dnsmasq = loaded["dory"]["dnsmasq"].as_table().unwrap();
        assert!(!dnsmasq.contains_key("domain"));
        assert!(!dnsmasq.contains_key("address"));
        let domains = dnsmasq["domains"].as_array().unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0]["domain"].as_str(), Some("docker_test_name"));
        assert_eq!(domains[0]["address"].as_str(), Some("192.168.11.1"));

        // Keys new since the legacy schema were persisted from the defaults.
        assert_eq!(loaded["dory"]["nginx_proxy"]["tls_port"].as_integer(), Some(443));
        assert!(store.settings().is_ok());
    }

    #[test]
    fn upgrade_refuses_invalid_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let legacy = "[dory.dnsmasq]\ndomain = \"docker\"\naddress = \"localhost\"\n";
        store.write_settings(SettingsContent::Raw(legacy)).unwrap();

        let err = store.upgrade_settings_file().unwrap_err();
        assert!(matches!(err, SettingsError::Schema(ref m) if m.contains("localhost")));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), legacy);
        assert!(store.needs_upgrade().unwrap());
    }

    #[test]
    fn empty_domains_survive_merge_but_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .write_settings(SettingsContent::Raw("[dory.dnsmasq]\ndomains = []\n"))
            .unwrap();

        let doc = store.effective_settings().unwrap();
        assert_eq!(doc["dory"]["dnsmasq"]["domains"].as_array().map(Vec::len), Some(0));
        assert!(matches!(store.settings(), Err(SettingsError::Schema(_))));
    }

    #[test]
    fn default_location_honours_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");

        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var(SETTINGS_PATH_ENV, &path) };
        let store = SettingsStore::at_default_location();
        // SAFETY: as above.
        unsafe { std::env::remove_var(SETTINGS_PATH_ENV) };

        assert_eq!(store.unwrap().path(), path);
    }

    #[test]
    fn debug_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.is_debug());

        let mut doc = defaults();
        doc["dory"]
            .as_table_mut()
            .unwrap()
            .insert("debug".into(), Value::Boolean(true));
        store.write_settings(SettingsContent::Document(&doc)).unwrap();
        assert!(store.is_debug());
    }

    #[test]
    fn debug_flag_is_false_on_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "[dory\ndebug = true").unwrap();
        assert!(!store.is_debug());
    }
}
