use std::{io, path::PathBuf};

use thiserror::Error;

const AUTH_EXPIRED_MARKER: &str = "InvalidAuthentication";

#[derive(Debug, Error)]
pub enum DxError {
    #[error("{}", tool_not_found_message(checked))]
    ToolNotFound { checked: Vec<PathBuf> },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}", exit_message(*code, stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("session expired: {0}")]
    AuthExpired(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unexpected dx output: {0}")]
    UnexpectedOutput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<DxError>,
    },
}

pub type DxResult<T> = Result<T, DxError>;

impl DxError {
    /// Turns a non-zero exit into the most specific error available.
    pub fn classify(code: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        if stderr.contains(AUTH_EXPIRED_MARKER) {
            DxError::AuthExpired(stderr.to_string())
        } else {
            DxError::Exit {
                code,
                stderr: stderr.to_string(),
            }
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        DxError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        DxError::Json {
            context: context.into(),
            source,
        }
    }

    pub fn wrap(self, context: impl Into<String>) -> Self {
        DxError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        match self {
            DxError::AuthExpired(_) => true,
            DxError::Wrapped { source, .. } => source.is_auth_expired(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            DxError::Cancelled => true,
            DxError::Wrapped { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

fn exit_message(code: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("dx exited with code {code}"),
        None => "dx terminated by signal".to_string(),
    }
}

fn tool_not_found_message(checked: &[PathBuf]) -> String {
    let paths: Vec<String> = checked.iter().map(|p| p.display().to_string()).collect();
    format!(
        "DNAnexus dx CLI not found. Checked: {} and PATH. \
         Set the path to dx manually with `cli_path` in the config file or DXNAV_CLI_PATH.",
        paths.join(", ")
    )
}
