use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{
    io::AsyncWriteExt,
    process::{Child, Command},
};
use tracing::{debug, warn};

use crate::error::{DxError, DxResult};
use crate::locate::{ToolLocator, DX_BINARY};

pub const JSON_FLAG: &str = "--json";

/// Verbs that accept `--json`; the flag is appended automatically.
pub const JSON_VERBS: &[&str] = &["describe", "find", "tree", "wait", "env", "get", "new", "update"];

/// Parsed stdout of a successful dx invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum DxOutput {
    Json(Value),
    Text(String),
}

impl DxOutput {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            DxOutput::Json(value) => Some(value),
            DxOutput::Text(_) => None,
        }
    }

    /// Requires JSON output; `what` names the query for the error message.
    pub fn into_json(self, what: &str) -> DxResult<Value> {
        match self {
            DxOutput::Json(value) => Ok(value),
            DxOutput::Text(text) => Err(DxError::UnexpectedOutput(format!(
                "{what} returned text instead of JSON: {}",
                first_line(&text)
            ))),
        }
    }

    /// Text form of the output; JSON is pretty-printed.
    pub fn text(&self) -> String {
        match self {
            DxOutput::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            DxOutput::Text(text) => text.clone(),
        }
    }
}

/// The single seam through which everything talks to the platform.
#[async_trait]
pub trait DxRunner: Send + Sync {
    async fn call(&self, args: &[String]) -> DxResult<DxOutput>;

    /// Like `call`, but never adds `--json`; for verbs whose human-readable
    /// output is wanted.
    async fn call_text(&self, args: &[String]) -> DxResult<DxOutput> {
        self.call(args).await
    }

    /// Executable used when a command has to be handed to a terminal.
    fn cli_path(&self) -> &Path {
        Path::new(DX_BINARY)
    }
}

pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub fn supports_json_flag(verb: &str) -> bool {
    JSON_VERBS.contains(&verb)
}

pub fn with_json_flag(mut args: Vec<String>) -> Vec<String> {
    let wants_json = args
        .first()
        .map(|verb| supports_json_flag(verb))
        .unwrap_or(false);
    if wants_json && !args.iter().any(|arg| arg == JSON_FLAG) {
        args.push(JSON_FLAG.to_string());
    }
    args
}

/// JSON when stdout looks like an object or array and parses; raw text
/// otherwise. Malformed JSON is never an error.
pub fn parse_output(stdout: &str) -> DxOutput {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => return DxOutput::Json(value),
            Err(err) => warn!("Failed to parse dx JSON output, keeping text: {err}"),
        }
    }
    DxOutput::Text(stdout.to_string())
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or("")
}

/// Spawns the dx executable.
#[derive(Clone, Debug)]
pub struct DxProcess {
    cli_path: PathBuf,
}

impl DxProcess {
    pub fn new(cli_path: impl Into<PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    pub fn discover(locator: &ToolLocator) -> DxResult<Self> {
        Ok(Self::new(locator.locate()?))
    }

    pub async fn call_with_input(&self, args: &[String], input: Option<&str>) -> DxResult<DxOutput> {
        self.execute(with_json_flag(args.to_vec()), input).await
    }

    async fn execute(&self, args: Vec<String>, input: Option<&str>) -> DxResult<DxOutput> {
        debug!("dx {}", args.join(" "));

        let mut cmd = Command::new(&self.cli_path);
        cmd.args(&args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|source| DxError::Spawn {
            program: self.cli_path.display().to_string(),
            source,
        })?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| DxError::io("failed to write dx stdin", e))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DxError::io("failed to wait for dx", e))?;
        let verb = args.first().map(String::as_str).unwrap_or_default();
        debug!(code = ?output.status.code(), "dx {verb} finished");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DxError::classify(output.status.code(), &stderr));
        }
        Ok(parse_output(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Starts dx with piped stdout/stderr and unbuffered Python output so
    /// callers can consume progress lines as they are printed.
    pub fn spawn_streaming(&self, args: &[String]) -> DxResult<Child> {
        debug!("dx {} (streaming)", args.join(" "));
        Command::new(&self.cli_path)
            .args(args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DxError::Spawn {
                program: self.cli_path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl DxRunner for DxProcess {
    async fn call(&self, args: &[String]) -> DxResult<DxOutput> {
        self.call_with_input(args, None).await
    }

    async fn call_text(&self, args: &[String]) -> DxResult<DxOutput> {
        self.execute(args.to_vec(), None).await
    }

    fn cli_path(&self) -> &Path {
        &self.cli_path
    }
}
