use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::config::DxConfig;
use crate::error::{DxError, DxResult};

pub const DX_BINARY: &str = "dx";

const SYSTEM_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin"];
const HOME_VENV_DIRS: &[&str] = &["dxpy-venv", ".dxpy-venv", "venv", ".venv", "env"];
const WORKSPACE_VENV_DIRS: &[&str] = &["dxpy-venv", "venv"];

/// Finds the `dx` executable.
///
/// Order: configured override, `PATH`, then well-known install locations
/// (including virtualenv `bin/` directories under the home directory and the
/// workspace).
#[derive(Clone, Debug, Default)]
pub struct ToolLocator {
    pub override_path: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub home_dir: Option<PathBuf>,
    pub path_var: Option<OsString>,
    pub system_dirs: Vec<PathBuf>,
}

impl ToolLocator {
    pub fn from_env(config: &DxConfig) -> Self {
        Self {
            override_path: config.cli_path_override(),
            workspace_dir: Some(config.workspace_dir()),
            home_dir: dxnav_util::home_dir(),
            path_var: std::env::var_os("PATH"),
            system_dirs: SYSTEM_DIRS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn locate(&self) -> DxResult<PathBuf> {
        let mut checked = Vec::new();

        if let Some(path) = self.override_path.as_ref() {
            if path.is_file() {
                debug!("using configured dx at {}", path.display());
                return Ok(path.clone());
            }
            warn!("Configured dx path {} does not exist", path.display());
            checked.push(path.clone());
        }

        for candidate in self.path_candidates() {
            if candidate.is_file() {
                debug!("found dx on PATH at {}", candidate.display());
                return Ok(candidate);
            }
            checked.push(candidate);
        }

        for candidate in self.well_known_candidates() {
            if candidate.is_file() {
                debug!("found dx at {}", candidate.display());
                return Ok(candidate);
            }
            checked.push(candidate);
        }

        Err(DxError::ToolNotFound { checked })
    }

    fn path_candidates(&self) -> Vec<PathBuf> {
        match self.path_var.as_ref() {
            Some(path_var) => std::env::split_paths(path_var)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(|dir| dir.join(DX_BINARY))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn well_known_candidates(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(workspace) = self.workspace_dir.as_ref() {
            out.push(workspace.join(DX_BINARY));
        }
        for dir in &self.system_dirs {
            out.push(dir.join(DX_BINARY));
        }
        if let Some(home) = self.home_dir.as_ref() {
            out.extend(HOME_VENV_DIRS.iter().map(|venv| venv_binary(home, venv)));
        }
        if let Some(workspace) = self.workspace_dir.as_ref() {
            out.extend(
                WORKSPACE_VENV_DIRS
                    .iter()
                    .map(|venv| venv_binary(workspace, venv)),
            );
        }
        out
    }
}

fn venv_binary(base: &Path, venv: &str) -> PathBuf {
    base.join(venv).join("bin").join(DX_BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn empty_locator(root: &Path) -> ToolLocator {
        ToolLocator {
            override_path: None,
            workspace_dir: Some(root.join("ws")),
            home_dir: Some(root.join("home")),
            path_var: Some(OsString::from(root.join("bin"))),
            system_dirs: vec![root.join("usr-local-bin"), root.join("usr-bin")],
        }
    }

    #[test]
    fn missing_everywhere_reports_every_checked_path() {
        let root = TempDir::new().unwrap();
        let mut locator = empty_locator(root.path());
        locator.override_path = Some(root.path().join("custom").join("dx"));

        let err = locator.locate().unwrap_err();
        let DxError::ToolNotFound { checked } = &err else {
            panic!("expected ToolNotFound, got {err:?}");
        };
        // override + PATH entry + workspace + 2 system + 5 home venvs + 2 workspace venvs
        assert_eq!(checked.len(), 12);
        assert!(checked.contains(&root.path().join("custom").join("dx")));
        assert!(checked.contains(&root.path().join("home/.venv/bin/dx")));
        let msg = err.to_string();
        for path in checked {
            assert!(msg.contains(&path.display().to_string()));
        }
    }

    #[test]
    fn override_wins_when_present() {
        let root = TempDir::new().unwrap();
        let custom = root.path().join("dx-custom");
        fs::write(&custom, "#!/bin/sh\n").unwrap();
        let mut locator = empty_locator(root.path());
        locator.override_path = Some(custom.clone());

        assert_eq!(locator.locate().unwrap(), custom);
    }

    #[test]
    fn path_lookup_precedes_well_known_locations() {
        let root = TempDir::new().unwrap();
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("dx"), "#!/bin/sh\n").unwrap();
        let venv = root.path().join("home/dxpy-venv/bin");
        fs::create_dir_all(&venv).unwrap();
        fs::write(venv.join("dx"), "#!/bin/sh\n").unwrap();

        let locator = empty_locator(root.path());
        assert_eq!(locator.locate().unwrap(), bin.join("dx"));
    }

    #[test]
    fn falls_back_to_home_virtualenv() {
        let root = TempDir::new().unwrap();
        let venv = root.path().join("home/.dxpy-venv/bin");
        fs::create_dir_all(&venv).unwrap();
        fs::write(venv.join("dx"), "#!/bin/sh\n").unwrap();

        let locator = empty_locator(root.path());
        assert_eq!(locator.locate().unwrap(), venv.join("dx"));
    }
}
