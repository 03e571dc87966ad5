//! Internal utilities.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Replaces `path` with `contents` via write-new-then-rename.
///
/// Readers see either the old file or the complete new one. Symlinks are
/// resolved first so the link target is replaced rather than the link, and
/// an existing file's permissions carry over to the replacement. Missing
/// parent directories are created.
///
/// # Errors
///
/// Returns the first I/O error; the temporary file is removed on failure.
pub fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    let target = match std::fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };

    if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let tmp = temp_path(&target);
    let result = write_then_rename(&tmp, &target, contents);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_then_rename(tmp: &Path, target: &Path, contents: &str) -> io::Result<()> {
    std::fs::write(tmp, contents)?;
    if let Ok(meta) = std::fs::metadata(target) {
        std::fs::set_permissions(tmp, meta.permissions())?;
    }
    std::fs::rename(tmp, target)
}

/// Sibling path used while a replacement is being written.
fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(|| OsString::from("dory"), ToOwned::to_owned);
    name.push(".dory.tmp");
    target.with_file_name(name)
}

/// Returns the kernel name reported by `uname(2)` (e.g. `Darwin`, `Linux`).
#[cfg(unix)]
#[must_use]
pub fn kernel_name() -> Option<String> {
    // SAFETY: `utsname` is a plain C struct of byte arrays; all-zero is valid.
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    // SAFETY: `uts` is a valid, writable `utsname`.
    if unsafe { libc::uname(&raw mut uts) } != 0 {
        return None;
    }
    // SAFETY: on success every `utsname` field is NUL-terminated.
    let name = unsafe { std::ffi::CStr::from_ptr(uts.sysname.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
#[must_use]
pub fn kernel_name() -> Option<String> {
    None
}

/// Returns `true` if the process runs with effective UID 0.
#[cfg(unix)]
#[must_use]
pub fn is_root() -> bool {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
#[must_use]
pub const fn is_root() -> bool {
    false
}
