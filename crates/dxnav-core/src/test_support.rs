//! Fakes shared by the unit tests.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{CancelToken, OpContext, ProgressSink};
use crate::error::{DxError, DxResult};
use crate::notify::Notifier;
use crate::process::{DxOutput, DxRunner};

/// Writes an executable shell script standing in for `dx`.
#[cfg(unix)]
pub fn fake_dx(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("dx");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

type Responder = dyn Fn(&[String]) -> DxResult<DxOutput> + Send + Sync;

/// Records every argument vector and answers from a closure.
pub struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
    responder: Box<Responder>,
}

impl RecordingRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[String]) -> DxResult<DxOutput> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Answers every call with the same JSON value.
    pub fn json(value: Value) -> Self {
        Self::new(move |_| Ok(DxOutput::Json(value.clone())))
    }

    pub fn text(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(DxOutput::Text(text.clone())))
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls rendered as single space-joined strings.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.join(" ")).collect()
    }
}

#[async_trait]
impl DxRunner for RecordingRunner {
    async fn call(&self, args: &[String]) -> DxResult<DxOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        (self.responder)(args)
    }
}

pub fn exit_error(stderr: &str) -> DxError {
    DxError::Exit {
        code: Some(1),
        stderr: stderr.to_string(),
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    reports: Mutex<Vec<(String, Option<f64>)>>,
}

impl RecordingProgress {
    pub fn messages(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn increments(&self) -> Vec<Option<f64>> {
        self.reports.lock().unwrap().iter().map(|(_, i)| *i).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, message: &str, increment: Option<f64>) {
        self.reports
            .lock()
            .unwrap()
            .push((message.to_string(), increment));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warn(String),
    Error(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.notices.lock().unwrap().push(Notice::Info(message.into()));
    }

    fn warn(&self, message: &str) {
        self.notices.lock().unwrap().push(Notice::Warn(message.into()));
    }

    fn error(&self, message: &str) {
        self.notices.lock().unwrap().push(Notice::Error(message.into()));
    }
}

pub fn recording_context(cancel: CancelToken) -> (OpContext, Arc<RecordingProgress>) {
    let progress = Arc::new(RecordingProgress::default());
    (OpContext::new(cancel, progress.clone()), progress)
}
