use std::{
    fs, io,
    path::{Path, PathBuf},
};

use dxnav_telemetry as telemetry;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const DATA_DIR_ENV: &str = "DXNAV_DATA_DIR";
pub const STAGING_DIR_ENV: &str = "DXNAV_STAGING_DIR";

pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return expand_user(&dir);
    }
    if let Some(home) = home_dir() {
        home.join(".local/share/dxnav")
    } else {
        PathBuf::from("/tmp/dxnav")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

/// Per-workspace state file, keyed by a short hash of the workspace path so
/// that two checkouts never share an active project.
pub fn workspace_state_path(workspace: &Path) -> PathBuf {
    let canonical = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    let key = short_hash(&canonical.to_string_lossy());
    state_dir().join("workspaces").join(format!("{key}.json"))
}

/// Local directory used for describe output, previews and other downloads
/// that are opened straight away.
pub fn default_staging_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(STAGING_DIR_ENV) {
        return expand_user(&dir);
    }
    match home_dir() {
        Some(home) => home.join(".dnanexus_config").join("tmp"),
        None => data_dir().join("tmp"),
    }
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = home_dir() {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

pub fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let full = hex_encode(&hasher.finalize());
    full.chars().take(12).collect()
}

pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();
    Ok(())
}

/// Starts the journal and records the command. Keep the returned guard
/// alive until the command finishes.
pub fn init_cli_telemetry(
    app_name: &'static str,
    app_version: &'static str,
    command: &str,
) -> telemetry::FlushGuard {
    telemetry::init_with_env(app_name, app_version, data_dir().join("telemetry"));
    telemetry::event("cli.start", &[("command", command)]);
    telemetry::FlushGuard::new()
}
