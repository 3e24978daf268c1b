use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::CancelToken;
use crate::details::format_timestamp;
use crate::error::{DxError, DxResult};
use crate::files::write_staged;
use crate::notify::Notifier;
use crate::process::{args, DxRunner};
use crate::project_state::{ActiveProject, SubscriptionId};

pub const DEFAULT_JOB_LIMIT: u32 = 50;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PLATFORM_HOST: &str = "https://platform.dnanexus.com";
const DESCRIBE_FILE: &str = "job-describe.json";
const UNKNOWN: &str = "Unknown";

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
    Failed,
    Terminated,
    Waiting,
    Other(String),
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "running" => JobState::Running,
            "done" => JobState::Done,
            "failed" => JobState::Failed,
            "terminated" => JobState::Terminated,
            "waiting" => JobState::Waiting,
            _ => JobState::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Terminated => "terminated",
            JobState::Waiting => "waiting",
            JobState::Other(raw) => raw,
        }
    }

    /// Name of the status icon shown next to the job.
    pub fn icon_name(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Terminated => "terminated",
            JobState::Waiting => "runnable",
            JobState::Other(_) => "idle",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTransition {
    pub new_state: String,
    /// Milliseconds since the epoch.
    pub set_at: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub state: JobState,
    pub transitions: Vec<StateTransition>,
    pub created: Option<i64>,
    pub modified: Option<i64>,
    pub started_at: Option<i64>,
    pub instance_type: String,
    pub launched_by: String,
    pub bill_to: String,
    pub executable_name: String,
    pub folder: Option<String>,
    pub project: Option<String>,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl JobRecord {
    /// Builds a record from one `dx find jobs --json` entry. Entries without
    /// an id are rejected.
    pub fn from_json(value: &Value, fallback_project: Option<&str>) -> Option<Self> {
        let id = str_field(value, "id")?;
        let state = JobState::parse(&str_field(value, "state").unwrap_or_else(|| "unknown".into()));
        let executable_name = str_field(value, "executableName")
            .or_else(|| str_field(value, "executable"))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let transitions = value
            .get("stateTransitions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| {
                        Some(StateTransition {
                            new_state: str_field(t, "newState")?,
                            set_at: t.get("setAt")?.as_i64()?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let unknown_or = |key: &str| str_field(value, key).unwrap_or_else(|| UNKNOWN.to_string());

        Some(Self {
            name: str_field(value, "name").unwrap_or_else(|| id.clone()),
            description: format!("{state} | {executable_name}"),
            created: value.get("created").and_then(Value::as_i64),
            modified: value.get("modified").and_then(Value::as_i64),
            started_at: value.get("startedRunning").and_then(Value::as_i64),
            instance_type: unknown_or("instanceType"),
            launched_by: unknown_or("launchedBy"),
            bill_to: unknown_or("billTo"),
            folder: str_field(value, "folder"),
            project: str_field(value, "project").or_else(|| fallback_project.map(str::to_string)),
            id,
            state,
            transitions,
            executable_name,
        })
    }

    pub fn latest_transition(&self) -> Option<&StateTransition> {
        self.transitions.last()
    }

    /// Age of the latest state transition relative to `now_ms`.
    pub fn since_last_change(&self, now_ms: i64) -> String {
        let Some(latest) = self.latest_transition() else {
            return UNKNOWN.to_string();
        };
        let diff = now_ms - latest.set_at;
        let plural = |n: i64, unit: &str| {
            format!("{n} {unit}{} ago", if n == 1 { "" } else { "s" })
        };
        if diff < MINUTE_MS {
            "Just now".to_string()
        } else if diff < HOUR_MS {
            plural(diff / MINUTE_MS, "minute")
        } else if diff < DAY_MS {
            plural(diff / HOUR_MS, "hour")
        } else {
            plural(diff / DAY_MS, "day")
        }
    }

    pub fn icon_name(&self) -> &'static str {
        self.state.icon_name()
    }

    /// Description line with the transition age appended when known.
    pub fn summary(&self, now_ms: i64) -> String {
        match self.latest_transition() {
            Some(_) => format!("{} - {}", self.description, self.since_last_change(now_ms)),
            None => self.description.clone(),
        }
    }

    /// Key/value rows for a detail view.
    pub fn details(&self) -> Vec<(&'static str, String)> {
        let stamp = |ms: Option<i64>| ms.map(format_timestamp).unwrap_or_else(|| UNKNOWN.into());
        let mut rows = vec![
            ("Job", self.name.clone()),
            ("ID", self.id.clone()),
            ("Status", self.state.to_string()),
            ("Created", stamp(self.created)),
            ("Last Modified", stamp(self.modified)),
        ];
        if let Some(folder) = &self.folder {
            rows.push(("Folder", folder.clone()));
        }
        rows.push((
            "Started",
            self.started_at
                .map(format_timestamp)
                .unwrap_or_else(|| "Not started".into()),
        ));
        rows.push(("Instance Type", self.instance_type.clone()));
        rows.push(("Launched by", self.launched_by.clone()));
        rows.push(("Bill To", self.bill_to.clone()));
        rows.push(("App Name", self.executable_name.clone()));
        rows
    }
}

pub fn find_jobs_args(project_id: &str, limit: u32) -> Vec<String> {
    args(&[
        "find",
        "jobs",
        "--json",
        "-n",
        &limit.to_string(),
        "--project",
        project_id,
    ])
}

pub fn parse_jobs(value: &Value, project_id: Option<&str>) -> DxResult<Vec<JobRecord>> {
    let Value::Array(items) = value else {
        return Err(DxError::UnexpectedOutput(
            "dx find jobs did not return a list".into(),
        ));
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let record = JobRecord::from_json(item, project_id);
            if record.is_none() {
                warn!("Skipping job entry without an id");
            }
            record
        })
        .collect())
}

/// Web UI address of a job, given the `dx env --json` document.
pub fn job_url(env: &Value, job_id: &str) -> String {
    let host = env
        .get("DX_APISERVER_HOST")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .unwrap_or(DEFAULT_PLATFORM_HOST);
    let host = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    format!("{}/panx/jobs/{job_id}", host.trim_end_matches('/'))
}

/// Argument vector for `dx run` reproducing a described job.
pub fn rerun_args(describe: &Value, destination: &str) -> DxResult<Vec<String>> {
    let executable = str_field(describe, "executable")
        .or_else(|| str_field(describe, "executableName"))
        .ok_or_else(|| DxError::UnexpectedOutput("job description has no executable".into()))?;
    let name = str_field(describe, "name")
        .or_else(|| str_field(describe, "id"))
        .unwrap_or_else(|| "job".into());
    let input = describe
        .get("runInput")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    let input = serde_json::to_string(&input)
        .map_err(|e| DxError::json("failed to encode job input", e))?;
    Ok(args(&[
        "run",
        &executable,
        "--destination",
        destination,
        "--input-json",
        &input,
        "--name",
        &format!("{name} (rerun)"),
        "-y",
        "--brief",
    ]))
}

pub fn watch_command(cli_path: &Path, job_id: &str) -> Vec<String> {
    vec![cli_path.display().to_string(), "watch".into(), job_id.into()]
}

pub fn ssh_command(cli_path: &Path, job_id: &str) -> Vec<String> {
    vec![cli_path.display().to_string(), "ssh".into(), job_id.into()]
}

/// A described job: the raw `dx describe` output saved to disk, plus the
/// parsed record when the output looked like a job.
#[derive(Clone, Debug, PartialEq)]
pub struct JobDescription {
    pub path: PathBuf,
    pub record: Option<JobRecord>,
}

/// Recent jobs of the active project.
pub struct JobExplorer {
    runner: Arc<dyn DxRunner>,
    state: Arc<ActiveProject>,
    notifier: Arc<dyn Notifier>,
    jobs: Arc<Mutex<Vec<JobRecord>>>,
    limit: u32,
    staging_dir: PathBuf,
    subscription: SubscriptionId,
}

impl JobExplorer {
    pub fn new(
        runner: Arc<dyn DxRunner>,
        state: Arc<ActiveProject>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let jobs: Arc<Mutex<Vec<JobRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let cache = Arc::clone(&jobs);
        let subscription = state.subscribe(move |_| {
            if let Ok(mut jobs) = cache.lock() {
                jobs.clear();
            }
        });
        Self {
            runner,
            state,
            notifier,
            jobs,
            limit: DEFAULT_JOB_LIMIT,
            staging_dir: dxnav_util::default_staging_dir(),
            subscription,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }

    fn replace(&self, jobs: Vec<JobRecord>) {
        if let Ok(mut slot) = self.jobs.lock() {
            *slot = jobs;
        }
    }

    fn notify_failure<T>(&self, what: &str, result: DxResult<T>) -> DxResult<T> {
        if let Err(err) = &result {
            self.notifier.error(&format!("{what}: {err}"));
        }
        result
    }

    /// Reloads the list. A result for a project that stopped being active
    /// while the query ran is dropped.
    pub async fn load(&self) {
        let generation = self.state.generation();
        let Some(project_id) = self.state.get() else {
            debug!("No active project, clearing job list");
            self.replace(Vec::new());
            return;
        };

        info!("Loading jobs for project {project_id}");
        let result: DxResult<Vec<JobRecord>> = async {
            let value = self
                .runner
                .call(&find_jobs_args(&project_id, self.limit))
                .await?
                .into_json("dx find jobs")?;
            parse_jobs(&value, Some(project_id.as_str()))
        }
        .await;

        if !self.state.is_current(generation) {
            debug!("Discarding jobs of {project_id}: active project changed");
            return;
        }
        match result {
            Ok(jobs) => {
                info!("Loaded {} jobs", jobs.len());
                self.replace(jobs);
            }
            Err(err) => {
                self.notifier.error(&format!("Failed to load jobs: {err}"));
                self.replace(Vec::new());
            }
        }
    }

    pub async fn terminate(&self, job_id: &str) -> DxResult<()> {
        let result = self.runner.call(&args(&["terminate", job_id])).await;
        self.notify_failure("Failed to terminate job", result)?;
        self.notifier
            .info(&format!("Job {} has been terminated.", self.label(job_id)));
        self.load().await;
        Ok(())
    }

    /// Writes `dx describe` output for the job into the staging directory
    /// and parses it for the details view.
    pub async fn describe(&self, job_id: &str) -> DxResult<JobDescription> {
        let result: DxResult<JobDescription> = async {
            let project_id = self
                .state
                .get()
                .ok_or_else(|| DxError::InvalidInput("Please select a project first.".into()))?;
            let output = self.runner.call(&args(&["describe", job_id])).await?;
            let content = output.text();
            if content.trim().is_empty() {
                return Err(DxError::UnexpectedOutput(format!(
                    "`dx describe --json {job_id}` returned no output"
                )));
            }
            let path = self.staging_dir.join(DESCRIBE_FILE);
            write_staged(&path, content.as_bytes()).await?;
            let record = output
                .as_json()
                .and_then(|value| JobRecord::from_json(value, Some(project_id.as_str())));
            Ok(JobDescription { path, record })
        }
        .await;
        self.notify_failure("Failed to describe job", result)
    }

    pub async fn platform_url(&self, job_id: &str) -> DxResult<String> {
        let result: DxResult<String> = async {
            let env = self.runner.call(&args(&["env"])).await?.into_json("dx env")?;
            Ok(job_url(&env, job_id))
        }
        .await;
        self.notify_failure("Failed to resolve job URL", result)
    }

    /// Launches a copy of the job with the same executable and input.
    /// Returns the new job id.
    pub async fn rerun(&self, job_id: &str) -> DxResult<String> {
        let result: DxResult<String> = async {
            let describe = self
                .runner
                .call(&args(&["describe", job_id]))
                .await?
                .into_json("dx describe")?;
            let destination = self
                .state
                .get()
                .or_else(|| str_field(&describe, "project"))
                .ok_or_else(|| DxError::InvalidInput("Please select a project first.".into()))?;
            let argv = rerun_args(&describe, &destination)?;
            let new_id = self.runner.call(&argv).await?.text().trim().to_string();
            if new_id.is_empty() {
                return Err(DxError::UnexpectedOutput("dx run printed no job id".into()));
            }
            Ok(new_id)
        }
        .await;
        let new_id = self.notify_failure("Failed to rerun job", result)?;
        self.notifier.info(&format!(
            "Job {} has been rerun as {new_id}.",
            self.label(job_id)
        ));
        self.load().await;
        Ok(new_id)
    }

    /// Reloads every `interval` until `cancel` fires, handing each fresh
    /// list to `on_refresh`.
    pub fn spawn_auto_refresh<F>(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancelToken,
        on_refresh: F,
    ) -> JoinHandle<()>
    where
        F: Fn(&[JobRecord]) + Send + 'static,
    {
        let explorer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("job auto-refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        explorer.load().await;
                        on_refresh(&explorer.jobs());
                    }
                }
            }
        })
    }

    fn label(&self, job_id: &str) -> String {
        self.jobs()
            .into_iter()
            .find(|j| j.id == job_id)
            .map(|j| j.name)
            .unwrap_or_else(|| job_id.to_string())
    }
}

impl Drop for JobExplorer {
    fn drop(&mut self) {
        self.state.unsubscribe(self.subscription);
    }
}
