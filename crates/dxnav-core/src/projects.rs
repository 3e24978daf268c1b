use std::{
    cmp::Ordering,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use dxnav_util::write_json_atomic;

use crate::error::{DxError, DxResult};
use crate::listing::compare_names;
use crate::notify::Notifier;
use crate::process::{args, DxRunner};
use crate::project_state::{ActiveProject, SubscriptionId};

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub level: Option<String>,
    /// Full `describe` block, passed through untouched.
    pub describe: Value,
    pub is_active: bool,
}

impl ProjectRecord {
    pub fn from_json(value: &Value, active: Option<&str>) -> Option<Self> {
        let id = value.get("id")?.as_str()?.to_string();
        let describe = value.get("describe").cloned().unwrap_or(Value::Null);
        let text = |key: &str| {
            describe
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let name = text("name").unwrap_or_else(|| id.clone());
        let description = text("description")
            .or_else(|| text("summary"))
            .unwrap_or_default();
        let level = value
            .get("level")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            is_active: active == Some(id.as_str()),
            id,
            name,
            description,
            level,
            describe,
        })
    }
}

/// A project added by hand from the `--all` list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinnedProject {
    pub id: String,
    pub name: String,
    pub description: String,
    pub level: Option<String>,
}

impl PinnedProject {
    fn from_record(record: &ProjectRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            level: record.level.clone(),
        }
    }

    fn to_record(&self, active: Option<&str>) -> ProjectRecord {
        ProjectRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            level: self.level.clone(),
            describe: Value::Null,
            is_active: active == Some(self.id.as_str()),
        }
    }
}

/// Pinned projects of one workspace, stored beside its active-project file.
#[derive(Clone, Debug)]
pub struct PinStore {
    path: PathBuf,
}

impl PinStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_workspace(workspace: &Path) -> Self {
        Self::new(dxnav_util::workspace_state_path(workspace).with_extension("pins.json"))
    }

    pub fn load(&self) -> Vec<PinnedProject> {
        match fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|err| {
                warn!("Failed to parse {}: {err}", self.path.display());
                Vec::new()
            }),
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", self.path.display());
                }
                Vec::new()
            }
        }
    }

    pub fn save(&self, pins: &[PinnedProject]) -> io::Result<()> {
        write_json_atomic(&self.path, &pins)
    }
}

/// Active project first, then by name.
pub fn sort_projects(projects: &mut [ProjectRecord]) {
    projects.sort_by(|a, b| match (a.is_active, b.is_active) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_names(&a.name, &b.name),
    });
}

pub async fn load_projects(
    runner: &dyn DxRunner,
    active: Option<&str>,
    include_all: bool,
) -> DxResult<Vec<ProjectRecord>> {
    let mut argv = args(&["find", "projects", "--json"]);
    if include_all {
        argv.push("--all".to_string());
    }
    let value = runner.call(&argv).await?.into_json("dx find projects")?;
    let Value::Array(items) = value else {
        return Err(DxError::UnexpectedOutput(
            "dx find projects did not return a list".into(),
        ));
    };
    let mut projects: Vec<ProjectRecord> = items
        .iter()
        .filter_map(|item| {
            let record = ProjectRecord::from_json(item, active);
            if record.is_none() {
                warn!("Skipping project entry without an id");
            }
            record
        })
        .collect();
    sort_projects(&mut projects);
    debug!("loaded {} projects", projects.len());
    Ok(projects)
}

/// `dx select` followed by an update of the shared active project.
pub async fn select_project(
    runner: &dyn DxRunner,
    state: &ActiveProject,
    project_id: &str,
) -> DxResult<()> {
    runner.call(&args(&["select", project_id])).await?;
    state
        .set(Some(project_id))
        .map_err(|e| DxError::io("failed to persist active project", e))?;
    Ok(())
}

/// The `Current workspace` line of human-readable `dx env` output.
pub fn parse_current_workspace(env_text: &str) -> Option<String> {
    env_text
        .lines()
        .find(|line| line.starts_with("Current workspace"))
        .and_then(|line| line.split_whitespace().last())
        .map(|token| token.replace('"', ""))
        .filter(|id| !id.is_empty())
}

pub async fn current_workspace_from_env(runner: &dyn DxRunner) -> DxResult<Option<String>> {
    let out = runner.call_text(&args(&["env"])).await?;
    Ok(parse_current_workspace(&out.text()))
}

/// Cached project list with the active flag kept in sync.
pub struct ProjectExplorer {
    runner: Arc<dyn DxRunner>,
    state: Arc<ActiveProject>,
    notifier: Arc<dyn Notifier>,
    projects: Arc<Mutex<Vec<ProjectRecord>>>,
    pins: Option<PinStore>,
    subscription: SubscriptionId,
}

impl ProjectExplorer {
    pub fn new(
        runner: Arc<dyn DxRunner>,
        state: Arc<ActiveProject>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let projects: Arc<Mutex<Vec<ProjectRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let cache = Arc::clone(&projects);
        let subscription = state.subscribe(move |active| {
            if let Ok(mut projects) = cache.lock() {
                for project in projects.iter_mut() {
                    project.is_active = Some(project.id.as_str()) == active;
                }
            }
        });
        Self {
            runner,
            state,
            notifier,
            projects,
            pins: None,
            subscription,
        }
    }

    /// Keeps added projects across runs.
    pub fn with_pins(mut self, pins: PinStore) -> Self {
        self.pins = Some(pins);
        self
    }

    pub fn projects(&self) -> Vec<ProjectRecord> {
        self.projects.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Loads the list, then adopts the workspace `dx env` reports as active.
    pub async fn initialize(&self) {
        self.refresh().await;
        match current_workspace_from_env(self.runner.as_ref()).await {
            Ok(Some(project_id)) => {
                info!("Current workspace from dx env: {project_id}");
                if let Err(err) = self.state.set(Some(&project_id)) {
                    self.notifier
                        .error(&format!("Failed to save active project: {err}"));
                }
                self.resort();
            }
            Ok(None) => debug!("dx env reported no current workspace"),
            Err(err) => warn!("Failed to read current workspace: {err}"),
        }
    }

    pub async fn refresh(&self) {
        let active = self.state.get();
        let loaded = load_projects(self.runner.as_ref(), active.as_deref(), false).await;
        let mut projects = match loaded {
            Ok(projects) => projects,
            Err(err) => {
                self.notifier
                    .error(&format!("Failed to load projects: {err}"));
                Vec::new()
            }
        };
        if let Some(pins) = &self.pins {
            for pin in pins.load() {
                if !projects.iter().any(|p| p.id == pin.id) {
                    projects.push(pin.to_record(active.as_deref()));
                }
            }
            sort_projects(&mut projects);
        }
        if let Ok(mut slot) = self.projects.lock() {
            *slot = projects;
        }
    }

    pub async fn select(&self, project_id: &str) -> DxResult<()> {
        let label = self
            .projects()
            .into_iter()
            .find(|p| p.id == project_id)
            .map(|p| p.name)
            .unwrap_or_else(|| project_id.to_string());
        match select_project(self.runner.as_ref(), &self.state, project_id).await {
            Ok(()) => {
                self.resort();
                self.notifier
                    .info(&format!("Switched to project: {label}"));
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Failed to select project: {err}"));
                Err(err)
            }
        }
    }

    /// Projects visible with `--all` that are not in the list yet.
    pub async fn add_candidates(&self) -> DxResult<Vec<ProjectRecord>> {
        let known: Vec<String> = self.projects().into_iter().map(|p| p.id).collect();
        let all = load_projects(self.runner.as_ref(), None, true).await?;
        Ok(all
            .into_iter()
            .filter(|p| !known.contains(&p.id))
            .collect())
    }

    /// Pins a project into the list and, with a pin store, saves it for
    /// later runs. Returns `false` when the project is already listed.
    pub fn add_project(&self, mut record: ProjectRecord) -> DxResult<bool> {
        {
            let mut projects = self
                .projects
                .lock()
                .map_err(|_| DxError::InvalidInput("project list is unavailable".into()))?;
            if projects.iter().any(|p| p.id == record.id) {
                return Ok(false);
            }
            record.is_active = self.state.get().as_deref() == Some(record.id.as_str());
            projects.push(record.clone());
            sort_projects(&mut projects);
        }
        if let Some(pins) = &self.pins {
            let mut saved = pins.load();
            if !saved.iter().any(|p| p.id == record.id) {
                saved.push(PinnedProject::from_record(&record));
                pins.save(&saved)
                    .map_err(|e| DxError::io("failed to save added projects", e))?;
            }
        }
        self.notifier
            .info(&format!("Added project: {}", record.name));
        Ok(true)
    }

    fn resort(&self) {
        if let Ok(mut projects) = self.projects.lock() {
            sort_projects(&mut projects);
        }
    }
}

impl Drop for ProjectExplorer {
    fn drop(&mut self) {
        self.state.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DxOutput;
    use crate::test_support::{exit_error, Notice, RecordingNotifier, RecordingRunner};
    use serde_json::json;

    fn listing() -> Value {
        json!([
            {"id": "project-b", "level": "ADMINISTER", "describe": {"name": "beta", "summary": "s"}},
            {"id": "project-a", "level": "VIEW", "describe": {"name": "Alpha", "description": "first"}},
            {"id": "project-z", "describe": {"name": "zeta"}},
            {"describe": {"name": "no id"}},
        ])
    }

    fn env_runner() -> RecordingRunner {
        RecordingRunner::new(|argv| match argv[0].as_str() {
            "find" => Ok(DxOutput::Json(listing())),
            "env" => Ok(DxOutput::Text(
                "Auth token used\t\tabc\nCurrent workspace\t\"project-z\"\nCurrent folder\t/\n".into(),
            )),
            _ => Ok(DxOutput::Text(String::new())),
        })
    }

    #[tokio::test]
    async fn active_project_sorts_first() {
        let runner = RecordingRunner::json(listing());
        let projects = load_projects(&runner, Some("project-z"), false).await.unwrap();
        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["project-z", "project-a", "project-b"]);
        assert!(projects[0].is_active);
        assert_eq!(projects[1].description, "first");
        assert_eq!(projects[2].description, "s");
        assert_eq!(runner.lines(), ["find projects --json"]);
    }

    #[tokio::test]
    async fn non_list_output_is_rejected() {
        let runner = RecordingRunner::json(json!({"oops": true}));
        let err = load_projects(&runner, None, true).await.unwrap_err();
        assert!(matches!(err, DxError::UnexpectedOutput(_)));
        assert_eq!(runner.lines(), ["find projects --json --all"]);
    }

    #[test]
    fn current_workspace_parsing() {
        assert_eq!(
            parse_current_workspace("Current workspace         \"project-123\"\n").as_deref(),
            Some("project-123")
        );
        assert_eq!(parse_current_workspace("Current folder /\n"), None);
    }

    #[tokio::test]
    async fn initialize_adopts_env_workspace() {
        let runner: Arc<dyn DxRunner> = Arc::new(env_runner());
        let state = Arc::new(ActiveProject::in_memory(None));
        let notifier = Arc::new(RecordingNotifier::default());
        let explorer = ProjectExplorer::new(runner, state.clone(), notifier);

        explorer.initialize().await;

        assert_eq!(state.get().as_deref(), Some("project-z"));
        let projects = explorer.projects();
        assert_eq!(projects[0].id, "project-z");
        assert!(projects[0].is_active);
    }

    #[tokio::test]
    async fn select_updates_state_and_flags() {
        let runner = Arc::new(env_runner());
        let state = Arc::new(ActiveProject::in_memory(None));
        let notifier = Arc::new(RecordingNotifier::default());
        let explorer = ProjectExplorer::new(runner.clone(), state.clone(), notifier.clone());
        explorer.refresh().await;

        explorer.select("project-b").await.unwrap();

        assert_eq!(state.get().as_deref(), Some("project-b"));
        assert_eq!(explorer.projects()[0].id, "project-b");
        assert!(runner.lines().contains(&"select project-b".to_string()));
        assert_eq!(
            notifier.notices(),
            [Notice::Info("Switched to project: beta".into())]
        );
    }

    #[tokio::test]
    async fn failed_select_keeps_state_and_notifies() {
        let runner: Arc<dyn DxRunner> =
            Arc::new(RecordingRunner::new(|_| Err(exit_error("ResourceNotFound"))));
        let state = Arc::new(ActiveProject::in_memory(Some("project-a")));
        let notifier = Arc::new(RecordingNotifier::default());
        let explorer = ProjectExplorer::new(runner, state.clone(), notifier.clone());

        assert!(explorer.select("project-x").await.is_err());
        assert_eq!(state.get().as_deref(), Some("project-a"));
        assert!(matches!(&notifier.notices()[0], Notice::Error(m) if m.contains("ResourceNotFound")));
    }

    #[tokio::test]
    async fn add_project_pins_candidates_once() {
        let runner = Arc::new(env_runner());
        let state = Arc::new(ActiveProject::in_memory(None));
        let explorer = ProjectExplorer::new(
            runner,
            state,
            Arc::new(RecordingNotifier::default()),
        );
        let candidates = explorer.add_candidates().await.unwrap();
        assert_eq!(candidates.len(), 3);

        assert!(explorer.add_project(candidates[0].clone()).unwrap());
        assert!(!explorer.add_project(candidates[0].clone()).unwrap());
        assert_eq!(explorer.add_candidates().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn added_projects_survive_a_new_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let pins = PinStore::new(dir.path().join("pins.json"));
        let listed = json!([{"id": "project-a", "describe": {"name": "Alpha"}}]);
        let runner: Arc<dyn DxRunner> = Arc::new(RecordingRunner::new(move |argv| {
            if argv.iter().any(|a| a == "--all") {
                Ok(DxOutput::Json(listing()))
            } else {
                Ok(DxOutput::Json(listed.clone()))
            }
        }));
        let state = Arc::new(ActiveProject::in_memory(Some("project-b")));
        let notifier = Arc::new(RecordingNotifier::default());

        let first = ProjectExplorer::new(runner.clone(), state.clone(), notifier.clone())
            .with_pins(pins.clone());
        first.refresh().await;
        assert_eq!(first.projects().len(), 1);
        let beta = first
            .add_candidates()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.id == "project-b")
            .unwrap();
        assert!(first.add_project(beta).unwrap());
        assert_eq!(first.projects().len(), 2);
        assert_eq!(pins.load()[0].name, "beta");
        assert_eq!(
            notifier.notices(),
            [Notice::Info("Added project: beta".into())]
        );
        drop(first);

        let second = ProjectExplorer::new(runner, state, notifier).with_pins(pins);
        second.refresh().await;
        let ids: Vec<String> = second.projects().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["project-b", "project-a"]);
        assert!(second.projects()[0].is_active);
    }
}
