//! Utility helpers — paths, timestamps, atomic JSON writes.

use std::path::{Path, PathBuf};

/// Get the Reefbot data directory (e.g. `~/.reefbot/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".reefbot")
}

/// Get the default workspace path (e.g. `~/.reefbot/workspace/`).
pub fn get_default_workspace_path() -> PathBuf {
    get_data_path().join("workspace")
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(path.trim_start_matches("~/"))
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

/// Write `contents` to `path` atomically: write a sibling temp file, harden
/// its permissions, then rename over the target. Readers never observe a
/// partial file.
pub fn atomic_write(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("reefbot");
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&tmp, contents)?;
    harden_permissions(&tmp)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize a value as pretty JSON with sorted keys and write atomically.
///
/// Round-tripping through `serde_json::Value` sorts object keys (the default
/// `Map` is a BTreeMap), which keeps on-disk files diff-stable.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let value = serde_json::to_value(value).map_err(std::io::Error::other)?;
    let body = serde_json::to_string_pretty(&value).map_err(std::io::Error::other)?;
    atomic_write(path, &body)
}

#[cfg(unix)]
fn harden_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn harden_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
