use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use dxnav_util::{expand_user, write_json_atomic};

use crate::error::{DxError, DxResult};

const CONFIG_FILE: &str = "config.json";
const DEFAULT_JOB_REFRESH_SECS: u64 = 60;
const DEFAULT_JOB_LIMIT: u32 = 50;
pub const DEFAULT_LISTING_DELIMITER: &str = ";;";

pub const CLI_PATH_ENV: &str = "DXNAV_CLI_PATH";
pub const WORKSPACE_ENV: &str = "DXNAV_WORKSPACE";
pub const JOB_REFRESH_ENV: &str = "DXNAV_JOB_REFRESH_SECS";
pub const JOB_LIMIT_ENV: &str = "DXNAV_JOB_LIMIT";
pub const STAGING_ENV: &str = "DXNAV_STAGING_DIR";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DxConfig {
    /// Override for the dx executable; empty means search.
    pub cli_path: String,
    /// Workspace the active project and run templates are scoped to; empty
    /// means the current directory.
    pub workspace_dir: String,
    pub job_refresh_secs: u64,
    pub job_limit: u32,
    pub staging_dir: String,
    pub listing_delimiter: String,
}

impl Default for DxConfig {
    fn default() -> Self {
        Self {
            cli_path: String::new(),
            workspace_dir: String::new(),
            job_refresh_secs: DEFAULT_JOB_REFRESH_SECS,
            job_limit: DEFAULT_JOB_LIMIT,
            staging_dir: String::new(),
            listing_delimiter: DEFAULT_LISTING_DELIMITER.to_string(),
        }
    }
}

impl DxConfig {
    pub fn load() -> Self {
        let mut cfg = Self::load_from(&config_path());
        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<DxConfig>(&data) {
                Ok(cfg) => cfg.normalized(),
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                    DxConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
                DxConfig::default()
            }
        }
    }

    /// The config file alone, without environment overrides. Use this as
    /// the base for edits so env values never end up in the file.
    pub fn load_file() -> Self {
        Self::load_from(&config_path())
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }

    /// Settings as `(key, value)` pairs, in file order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("cli_path", self.cli_path.clone()),
            ("workspace_dir", self.workspace_dir.clone()),
            ("job_refresh_secs", self.job_refresh_secs.to_string()),
            ("job_limit", self.job_limit.to_string()),
            ("staging_dir", self.staging_dir.clone()),
            ("listing_delimiter", self.listing_delimiter.clone()),
        ]
    }

    /// Updates one setting by its file key. Numeric settings must be
    /// positive; the delimiter cannot be empty.
    pub fn set(&mut self, key: &str, value: &str) -> DxResult<()> {
        let positive = |value: &str| -> DxResult<u64> {
            match value.trim().parse::<u64>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(DxError::InvalidInput(format!(
                    "{key} must be a positive number, got '{value}'"
                ))),
            }
        };
        match key {
            "cli_path" => self.cli_path = value.trim().to_string(),
            "workspace_dir" => self.workspace_dir = value.trim().to_string(),
            "staging_dir" => self.staging_dir = value.trim().to_string(),
            "job_refresh_secs" => self.job_refresh_secs = positive(value)?,
            "job_limit" => {
                self.job_limit = u32::try_from(positive(value)?).map_err(|_| {
                    DxError::InvalidInput(format!("job_limit is too large: {value}"))
                })?
            }
            "listing_delimiter" => {
                if value.is_empty() {
                    return Err(DxError::InvalidInput(
                        "listing_delimiter cannot be empty".into(),
                    ));
                }
                self.listing_delimiter = value.to_string();
            }
            other => {
                return Err(DxError::InvalidInput(format!("unknown setting '{other}'")))
            }
        }
        Ok(())
    }

    /// Environment values win over the config file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(CLI_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.cli_path = value;
        }
        if let Some(value) = lookup(WORKSPACE_ENV).filter(|v| !v.trim().is_empty()) {
            self.workspace_dir = value;
        }
        if let Some(value) = lookup(STAGING_ENV).filter(|v| !v.trim().is_empty()) {
            self.staging_dir = value;
        }
        if let Some(value) = lookup(JOB_REFRESH_ENV) {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.job_refresh_secs = secs,
                _ => warn!("Ignoring invalid {JOB_REFRESH_ENV}={value}"),
            }
        }
        if let Some(value) = lookup(JOB_LIMIT_ENV) {
            match value.trim().parse::<u32>() {
                Ok(limit) if limit > 0 => self.job_limit = limit,
                _ => warn!("Ignoring invalid {JOB_LIMIT_ENV}={value}"),
            }
        }
    }

    fn normalized(mut self) -> Self {
        let defaults = DxConfig::default();
        if self.job_refresh_secs == 0 {
            self.job_refresh_secs = defaults.job_refresh_secs;
        }
        if self.job_limit == 0 {
            self.job_limit = defaults.job_limit;
        }
        if self.listing_delimiter.is_empty() {
            self.listing_delimiter = defaults.listing_delimiter;
        }
        self
    }

    pub fn cli_path_override(&self) -> Option<PathBuf> {
        let trimmed = self.cli_path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(expand_user(trimmed))
        }
    }

    pub fn workspace_dir(&self) -> PathBuf {
        let trimmed = self.workspace_dir.trim();
        if trimmed.is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            expand_user(trimmed)
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        let trimmed = self.staging_dir.trim();
        if trimmed.is_empty() {
            dxnav_util::default_staging_dir()
        } else {
            expand_user(trimmed)
        }
    }

    pub fn job_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.job_refresh_secs.max(1))
    }
}

pub fn config_path() -> PathBuf {
    dxnav_util::state_file_path(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = DxConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(cfg.job_limit, 50);
        assert_eq!(cfg.listing_delimiter, ";;");
        assert!(cfg.cli_path_override().is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"cli_path": "/opt/dx/bin/dx", "job_limit": 0}"#).unwrap();

        let cfg = DxConfig::load_from(&path);
        assert_eq!(cfg.cli_path_override(), Some(PathBuf::from("/opt/dx/bin/dx")));
        assert_eq!(cfg.job_limit, 50);
        assert_eq!(cfg.job_refresh_secs, 60);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let cfg = DxConfig::load_from(&path);
        assert_eq!(cfg.job_refresh_secs, 60);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut cfg = DxConfig {
            cli_path: "/from/file/dx".into(),
            ..DxConfig::default()
        };
        let env: HashMap<&str, &str> = HashMap::from([
            (CLI_PATH_ENV, "/from/env/dx"),
            (JOB_REFRESH_ENV, "15"),
            (JOB_LIMIT_ENV, "nope"),
        ]);
        cfg.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.cli_path, "/from/env/dx");
        assert_eq!(cfg.job_refresh_interval(), Duration::from_secs(15));
        assert_eq!(cfg.job_limit, 50);
    }

    #[test]
    fn set_then_save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("config.json");
        let mut cfg = DxConfig::default();
        cfg.set("cli_path", " /opt/dx ").unwrap();
        cfg.set("job_limit", "20").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = DxConfig::load_from(&path);
        assert_eq!(loaded.cli_path, "/opt/dx");
        assert_eq!(loaded.job_limit, 20);
        assert!(loaded
            .entries()
            .contains(&("job_refresh_secs", "60".to_string())));
    }

    #[test]
    fn set_rejects_bad_values() {
        let mut cfg = DxConfig::default();
        for (key, value) in [
            ("job_limit", "0"),
            ("job_refresh_secs", "soon"),
            ("listing_delimiter", ""),
            ("colour", "blue"),
        ] {
            assert!(
                matches!(cfg.set(key, value), Err(DxError::InvalidInput(_))),
                "{key}={value}"
            );
        }
        assert_eq!(cfg.job_limit, 50);
    }
}
