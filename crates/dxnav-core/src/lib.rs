//! Core of the DNAnexus navigator: drives the `dx` command-line tool and
//! turns its output into project, file, job and app models.

pub mod apps;
pub mod config;
pub mod context;
pub mod details;
pub mod directory;
pub mod error;
pub mod files;
pub mod jobs;
pub mod listing;
pub mod locate;
pub mod nodes;
pub mod notify;
pub mod process;
pub mod project_state;
pub mod projects;
pub mod session;
pub mod status;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use config::DxConfig;
pub use context::{CancelHandle, CancelToken, OpContext, ProgressSink};
pub use error::{DxError, DxResult};
pub use notify::Notifier;
pub use process::{DxOutput, DxProcess, DxRunner};
pub use project_state::ActiveProject;
pub use status::StatusIndicator;
