use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use dxnav_telemetry::{self as telemetry, Outcome};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::OpContext;
use crate::error::{DxError, DxResult};
use crate::notify::Notifier;
use crate::process::DxProcess;
use crate::status::{progress_percent, StatusIndicator};

#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    pub paths: Vec<PathBuf>,
    pub project_id: Option<String>,
    /// `Some("")` means the project root.
    pub folder: Option<String>,
    pub threads: Option<u32>,
    pub chunk_size: Option<u64>,
    pub show_progress: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileCount {
    pub total: usize,
    pub has_directory: bool,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    NothingToUpload,
    Completed { uploaded: usize },
    /// dx exited cleanly but confirmed fewer files than were counted.
    Partial { confirmed: usize, total: usize },
    Cancelled,
}

impl UploadOutcome {
    fn telemetry(&self) -> Outcome {
        match self {
            UploadOutcome::NothingToUpload | UploadOutcome::Completed { .. } => Outcome::Succeeded,
            UploadOutcome::Partial { .. } => Outcome::Partial,
            UploadOutcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Counts every file below the given roots. Unreadable entries are recorded
/// and skipped; symlinks are counted, never followed.
pub fn count_files(paths: &[PathBuf]) -> FileCount {
    let mut count = FileCount::default();
    for root in paths {
        if fs::metadata(root).map(|m| m.is_dir()).unwrap_or(false) {
            count.has_directory = true;
        }
        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => {}
                Ok(_) => count.total += 1,
                Err(err) => {
                    let path = err.path().unwrap_or(root).display().to_string();
                    warn!("Error accessing {path}: {err}");
                    count.errors.push(format!(
                        "Error accessing {path}. It might not exist or there's a permission issue."
                    ));
                }
            }
        }
    }
    count
}

/// Destination argument for `dx upload`, if any.
pub fn upload_destination(project_id: Option<&str>, folder: Option<&str>) -> Option<String> {
    let folder = folder.map(|f| if f.is_empty() { "/" } else { f });
    match (project_id, folder) {
        (project, Some(folder)) => {
            let folder = if folder.ends_with('/') {
                folder.to_string()
            } else {
                format!("{folder}/")
            };
            Some(match project {
                Some(project) => format!("{project}:{folder}"),
                None => folder,
            })
        }
        (Some(project), None) => Some(format!("{project}:/")),
        (None, None) => None,
    }
}

pub fn upload_args(req: &UploadRequest, has_directory: bool) -> Vec<String> {
    let mut args = vec!["upload".to_string(), "--wait".to_string(), "--brief".to_string()];
    if let Some(dest) = upload_destination(req.project_id.as_deref(), req.folder.as_deref()) {
        args.push("--destination".to_string());
        args.push(dest);
    }
    args.push("-p".to_string());
    if let Some(threads) = req.threads {
        args.push("--threads".to_string());
        args.push(threads.to_string());
    }
    if let Some(chunk_size) = req.chunk_size {
        args.push("--chunksize".to_string());
        args.push(chunk_size.to_string());
    }
    if has_directory {
        args.push("-r".to_string());
    }
    args.extend(req.paths.iter().map(|p| p.display().to_string()));
    args
}

/// Runs `dx upload`, turning each line it prints (one file id per uploaded
/// file) into progress.
#[derive(Clone)]
pub struct UploadOrchestrator {
    process: DxProcess,
    notifier: Arc<dyn Notifier>,
    status: StatusIndicator,
}

impl UploadOrchestrator {
    pub fn new(process: DxProcess, notifier: Arc<dyn Notifier>, status: StatusIndicator) -> Self {
        Self {
            process,
            notifier,
            status,
        }
    }

    pub async fn upload(&self, req: &UploadRequest, ctx: &OpContext) -> DxResult<UploadOutcome> {
        let started = Instant::now();
        let result = self.run(req, ctx).await;
        self.status.reset();

        let outcome = match &result {
            Ok(outcome) => outcome.telemetry(),
            Err(err) if err.is_cancelled() => Outcome::Cancelled,
            Err(_) => Outcome::Failed,
        };
        let roots = req.paths.len().to_string();
        telemetry::operation(
            "upload",
            outcome,
            started.elapsed().as_millis(),
            &[("roots", roots.as_str()), ("op_id", ctx.op_id.as_str())],
        );
        result
    }

    async fn run(&self, req: &UploadRequest, ctx: &OpContext) -> DxResult<UploadOutcome> {
        let paths = req.paths.clone();
        let count = tokio::task::spawn_blocking(move || count_files(&paths))
            .await
            .map_err(|e| DxError::io("file count task failed", std::io::Error::other(e)))?;
        for error in &count.errors {
            self.notifier.error(error);
        }

        let total = count.total;
        info!("Total files to upload: {total}");
        if total == 0 {
            self.notifier.warn("No files found to upload.");
            if req.show_progress {
                ctx.report("No files to upload.", None);
            }
            return Ok(UploadOutcome::NothingToUpload);
        }
        if ctx.is_cancelled() {
            return Ok(UploadOutcome::Cancelled);
        }

        self.report(req, ctx, 0, total, None);
        let args = upload_args(req, count.has_directory);
        let mut child = self.process.spawn_streaming(&args)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DxError::UnexpectedOutput("upload stdout pipe missing".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DxError::UnexpectedOutput("upload stderr pipe missing".into()))?;
        let stderr_task = tokio::spawn(drain_stderr(stderr));

        let mut lines = BufReader::new(stdout).lines();
        let mut processed = 0usize;
        let mut stdout_open = true;
        let increment = 100.0 / total as f64;

        let status = loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    info!("Upload cancelled; stopping dx");
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    if req.show_progress {
                        ctx.report("Upload cancelled by user.", None);
                    }
                    return Ok(UploadOutcome::Cancelled);
                }
                line = lines.next_line(), if stdout_open => {
                    match line {
                        Ok(Some(line)) => {
                            let line = line.trim();
                            if !line.is_empty() {
                                debug!("uploaded {line}");
                                processed += 1;
                                self.report(req, ctx, processed, total, Some(increment));
                            }
                        }
                        Ok(None) => stdout_open = false,
                        Err(err) => {
                            warn!("Failed to read upload output: {err}");
                            stdout_open = false;
                        }
                    }
                }
                result = child.wait(), if !stdout_open => {
                    break result.map_err(|e| DxError::io("failed to wait for dx upload", e))?;
                }
            }
        };
        let stderr = match stderr_task.await {
            Ok(text) => text,
            Err(err) => {
                warn!("Upload stderr reader did not finish: {err}");
                String::new()
            }
        };

        if !status.success() {
            warn!("Upload failed. Full stderr: {stderr}");
            let err = DxError::classify(status.code(), &stderr);
            if req.show_progress {
                let message = err.to_string();
                let first = message.lines().next().unwrap_or_default();
                ctx.report(&format!("Upload failed: {first}"), None);
            }
            return Err(err);
        }

        let confirmed = processed.min(total);
        if confirmed == total {
            self.notifier.info(&format!(
                "Successfully uploaded all {total} file(s) to the DNAnexus platform."
            ));
            if req.show_progress {
                ctx.report(&format!("Successfully uploaded all {total} file(s). (100%)"), None);
            }
            Ok(UploadOutcome::Completed { uploaded: total })
        } else {
            warn!("Upload exited cleanly but confirmed {confirmed} of {total} files");
            self.notifier.warn(&format!(
                "Upload completed, but {confirmed} of {total} expected files were confirmed. Please verify the upload."
            ));
            if req.show_progress {
                ctx.report(
                    &format!(
                        "Upload completed. Processed {confirmed} of {total} expected file(s). ({}%)",
                        progress_percent(confirmed, total)
                    ),
                    None,
                );
            }
            Ok(UploadOutcome::Partial { confirmed, total })
        }
    }

    fn report(
        &self,
        req: &UploadRequest,
        ctx: &OpContext,
        processed: usize,
        total: usize,
        increment: Option<f64>,
    ) {
        let shown = processed.min(total);
        self.status.set_upload_progress(shown, total);
        if req.show_progress {
            let percent = progress_percent(shown, total);
            ctx.report(&format!("Uploaded {shown}/{total} files ({percent}%)"), increment);
        }
    }
}

/// Reads a child's stderr to the end. Bytes that are not UTF-8 are replaced
/// rather than dropping the message; a read error keeps what arrived so far.
async fn drain_stderr<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(err) = reader.read_to_end(&mut buf).await {
        warn!("Failed to read upload stderr: {err}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
