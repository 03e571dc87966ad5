//! Host operating system detection.

use crate::util::kernel_name;
use std::fmt;
use std::path::Path;

const OS_RELEASE_FILES: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];

/// Operating system families with distinct resolver mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// macOS (`/etc/resolver/<domain>` files).
    MacOs,
    /// Ubuntu and Debian derivatives.
    Ubuntu,
    /// Fedora and Red Hat derivatives.
    Fedora,
    /// Arch Linux and derivatives.
    Arch,
    /// Anything else. Treat as unsupported.
    Unknown,
}

impl OsFamily {
    /// Returns `true` unless this is [`OsFamily::Unknown`].
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Returns `true` for the Linux distributions.
    #[must_use]
    pub const fn is_linux(self) -> bool {
        matches!(self, Self::Ubuntu | Self::Fedora | Self::Arch)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MacOs => "macOS",
            Self::Ubuntu => "Ubuntu",
            Self::Fedora => "Fedora",
            Self::Arch => "Arch",
            Self::Unknown => "unknown",
        })
    }
}

/// Detects the host's OS family.
///
/// Never fails: anything unrecognized is [`OsFamily::Unknown`].
#[must_use]
pub fn detect() -> OsFamily {
    let kernel = kernel_name();
    let release = if kernel.as_deref() == Some("Linux") {
        read_release_info()
    } else {
        None
    };
    let os = detect_from(kernel.as_deref(), release.as_deref());
    tracing::debug!(kernel = ?kernel, os = %os, "Detected platform");
    os
}

/// Classifies a host from its kernel name and `os-release` text.
#[must_use]
pub fn detect_from(kernel: Option<&str>, os_release: Option<&str>) -> OsFamily {
    match kernel {
        Some("Darwin") => OsFamily::MacOs,
        Some("Linux") => os_release.map_or(OsFamily::Unknown, classify_os_release),
        _ => OsFamily::Unknown,
    }
}

/// Classifies `os-release` contents by `ID`, falling back to `ID_LIKE`.
#[must_use]
pub fn classify_os_release(contents: &str) -> OsFamily {
    let mut id = None;
    let mut id_like = None;
    for line in contents.lines() {
        if let Some((key, value)) = line.trim().split_once('=') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            match key.trim() {
                "ID" => id = Some(value.to_ascii_lowercase()),
                "ID_LIKE" => id_like = Some(value.to_ascii_lowercase()),
                _ => {}
            }
        }
    }

    id.iter()
        .chain(id_like.iter())
        .flat_map(|v| v.split_whitespace())
        .map(family_for_id)
        .find(|os| os.is_supported())
        .unwrap_or(OsFamily::Unknown)
}

fn family_for_id(id: &str) -> OsFamily {
    match id {
        "ubuntu" | "debian" | "linuxmint" | "pop" | "elementary" => OsFamily::Ubuntu,
        "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => OsFamily::Fedora,
        "arch" | "manjaro" | "endeavouros" => OsFamily::Arch,
        _ => OsFamily::Unknown,
    }
}

/// Reads `os-release`, or synthesizes an equivalent from legacy release files.
fn read_release_info() -> Option<String> {
    if let Some(contents) = OS_RELEASE_FILES
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
    {
        return Some(contents);
    }

    if Path::new("/etc/arch-release").exists() {
        return Some("ID=arch\n".to_string());
    }
    if Path::new("/etc/fedora-release").exists() {
        return Some("ID=fedora\n".to_string());
    }
    std::fs::read_to_string("/etc/lsb-release")
        .ok()
        .filter(|c| c.lines().any(|l| l.trim() == "DISTRIB_ID=Ubuntu"))
        .map(|_| "ID=ubuntu\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darwin_is_macos() {
        assert_eq!(detect_from(Some("Darwin"), None), OsFamily::MacOs);
    }

    #[test]
    fn linux_without_release_is_unknown() {
        assert_eq!(detect_from(Some("Linux"), None), OsFamily::Unknown);
    }

    #[test]
    fn other_kernels_are_unknown() {
        assert_eq!(detect_from(Some("FreeBSD"), None), OsFamily::Unknown);
        assert_eq!(detect_from(None, Some("ID=ubuntu")), OsFamily::Unknown);
    }

    #[test]
    fn classifies_by_id() {
        let ubuntu = "NAME=\"Ubuntu\"\nVERSION_ID=\"24.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(detect_from(Some("Linux"), Some(ubuntu)), OsFamily::Ubuntu);
        assert_eq!(classify_os_release("ID=fedora\n"), OsFamily::Fedora);
        assert_eq!(classify_os_release("ID=\"arch\"\n"), OsFamily::Arch);
    }

    #[test]
    fn falls_back_to_id_like() {
        let mint = "ID=linuxmintish\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(classify_os_release(mint), OsFamily::Ubuntu);
        let rocky = "ID=\"something\"\nID_LIKE=\"rhel centos fedora\"\n";
        assert_eq!(classify_os_release(rocky), OsFamily::Fedora);
    }

    #[test]
    fn unrecognized_distro_is_unknown() {
        assert_eq!(classify_os_release("ID=alpine\n"), OsFamily::Unknown);
        assert_eq!(classify_os_release(""), OsFamily::Unknown);
    }

    #[test]
    fn detect_does_not_panic() {
        let os = detect();
        if cfg!(target_os = "macos") {
            assert_eq!(os, OsFamily::MacOs);
        }
    }
}
