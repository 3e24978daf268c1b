use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use dxnav_util::write_json_atomic;

use crate::details::format_timestamp;
use crate::error::{DxError, DxResult};
use crate::files::write_staged;
use crate::notify::Notifier;
use crate::process::{args, DxRunner};
use crate::project_state::ActiveProject;

pub const DEFAULT_INSTANCE_TYPE: &str = "mem1_ssd1_v2_x2";
pub const DEFAULT_OUTPUT_FOLDER: &str = "/output";
const TEMPLATE_EXT: &str = "json";

#[derive(Clone, Debug, PartialEq)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
    /// The `dx find apps` entry as returned.
    pub payload: Value,
}

impl AppRecord {
    pub fn from_json(value: &Value) -> Option<Self> {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let id = text("id").or_else(|| text("name"))?;
        let describe = value.get("describe");
        let version = text("version").or_else(|| {
            describe
                .and_then(|d| d.get("version"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Some(Self {
            name: text("name")
                .or_else(|| {
                    describe
                        .and_then(|d| d.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| id.clone()),
            id,
            version,
            payload: value.clone(),
        })
    }
}

pub async fn load_apps(runner: &dyn DxRunner) -> DxResult<Vec<AppRecord>> {
    let value = runner
        .call(&args(&["find", "apps", "--json", "--all"]))
        .await?
        .into_json("dx find apps")?;
    let Value::Array(items) = value else {
        return Err(DxError::UnexpectedOutput(
            "dx find apps did not return a list".into(),
        ));
    };
    Ok(items.iter().filter_map(AppRecord::from_json).collect())
}

/// Detail page for an app, built from its `dx describe --json` output.
pub fn app_markdown(describe: &Value) -> String {
    let text = |key: &str| describe.get(key).and_then(Value::as_str);
    let mut md = Vec::new();
    md.push(format!(
        "# {} ({})",
        text("name").unwrap_or("unknown"),
        text("version").unwrap_or("unknown")
    ));
    md.push(String::new());
    md.push(format!("**ID**: {}", text("id").unwrap_or("unknown")));
    md.push(format!(
        "**Created by**: {}",
        text("createdBy").unwrap_or("unknown")
    ));
    md.push(format!(
        "**Created at**: {}",
        describe
            .get("created")
            .and_then(Value::as_i64)
            .map(format_timestamp)
            .unwrap_or_else(|| "unknown".into())
    ));
    md.push(String::new());

    if let Some(description) = text("description").filter(|d| !d.is_empty()) {
        md.push("## Description".into());
        md.push(String::new());
        md.push(description.to_string());
        md.push(String::new());
    }

    let spec = |key: &str| {
        describe
            .get(key)
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty())
    };
    let field = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    if let Some(inputs) = spec("inputSpec") {
        md.push("## Inputs".into());
        md.push(String::new());
        md.push("| Name | Type | Optional | Description |".into());
        md.push("| ---- | ---- | -------- | ----------- |".into());
        for input in inputs {
            let optional = input
                .get("optional")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            md.push(format!(
                "| {} | {} | {} | {} |",
                field(input, "name"),
                field(input, "class"),
                if optional { "Yes" } else { "No" },
                field(input, "help")
            ));
        }
        md.push(String::new());
    }

    if let Some(outputs) = spec("outputSpec") {
        md.push("## Outputs".into());
        md.push(String::new());
        md.push("| Name | Type | Description |".into());
        md.push("| ---- | ---- | ----------- |".into());
        for output in outputs {
            md.push(format!(
                "| {} | {} | {} |",
                field(output, "name"),
                field(output, "class"),
                field(output, "help")
            ));
        }
        md.push(String::new());
    }

    md.join("\n")
}

/// Saved parameters for launching an app.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunTemplate {
    #[serde(rename = "jobName")]
    pub job_name: String,
    #[serde(rename = "instanceType")]
    pub instance_type: String,
    pub output_folder: String,
    pub project: String,
    pub inputs: Map<String, Value>,
}

impl Default for RunTemplate {
    fn default() -> Self {
        Self {
            job_name: String::new(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            output_folder: DEFAULT_OUTPUT_FOLDER.to_string(),
            project: String::new(),
            inputs: Map::new(),
        }
    }
}

/// Field overrides applied to a saved template. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateEdit {
    pub job_name: Option<String>,
    pub instance_type: Option<String>,
    pub output_folder: Option<String>,
    pub project: Option<String>,
    pub set_inputs: Vec<(String, Value)>,
    pub remove_inputs: Vec<String>,
}

impl TemplateEdit {
    pub fn is_empty(&self) -> bool {
        *self == TemplateEdit::default()
    }

    /// Removals run before assignments, so a key both removed and set ends
    /// up set.
    pub fn apply(&self, template: &mut RunTemplate) {
        if let Some(job_name) = &self.job_name {
            template.job_name = job_name.clone();
        }
        if let Some(instance_type) = &self.instance_type {
            template.instance_type = instance_type.clone();
        }
        if let Some(output_folder) = &self.output_folder {
            template.output_folder = output_folder.clone();
        }
        if let Some(project) = &self.project {
            template.project = project.clone();
        }
        for key in &self.remove_inputs {
            template.inputs.remove(key);
        }
        for (key, value) in &self.set_inputs {
            template.inputs.insert(key.clone(), value.clone());
        }
    }
}

/// Parses `name=value` for a template input. The value is read as JSON
/// when it parses, otherwise kept as a string.
pub fn parse_input_assignment(raw: &str) -> DxResult<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| DxError::InvalidInput(format!("expected name=value, got '{raw}'")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(DxError::InvalidInput(format!("input name missing in '{raw}'")));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// `dx run` argument vector for a template, launched into `project`.
pub fn run_args(app_id: &str, template: &RunTemplate, project: &str) -> DxResult<Vec<String>> {
    let inputs = serde_json::to_string(&template.inputs)
        .map_err(|e| DxError::json("failed to encode template inputs", e))?;
    let mut argv = args(&[
        "run",
        app_id,
        "--destination",
        project,
        "--name",
        &template.job_name,
    ]);
    if !template.instance_type.is_empty() {
        argv.push("--instance-type".into());
        argv.push(template.instance_type.clone());
    }
    argv.push("--input-json".into());
    argv.push(inputs);
    if !template.output_folder.is_empty() {
        argv.push("--folder".into());
        argv.push(template.output_folder.clone());
    }
    argv.push("-y".into());
    argv.push("--brief".into());
    Ok(argv)
}

fn validate_template_name(name: &str) -> DxResult<&str> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(DxError::InvalidInput("template name cannot be empty".into()));
    }
    if name.contains(['/', '\\']) {
        return Err(DxError::InvalidInput(format!(
            "template name '{name}' cannot contain path separators"
        )));
    }
    Ok(name)
}

/// Run templates on disk: `<root>/apps/<app id>/<name>.json`.
#[derive(Clone, Debug)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Templates live under the workspace's `tmp` directory.
    pub fn for_workspace(workspace: &Path) -> Self {
        Self::new(workspace.join("tmp"))
    }

    pub fn app_dir(&self, app_id: &str) -> PathBuf {
        self.root.join("apps").join(app_id.replace(':', "_"))
    }

    pub fn template_path(&self, app_id: &str, name: &str) -> DxResult<PathBuf> {
        let name = validate_template_name(name)?;
        Ok(self.app_dir(app_id).join(format!("{name}.{TEMPLATE_EXT}")))
    }

    /// Templates of one app, by name. Unreadable files are skipped.
    pub fn list(&self, app_id: &str) -> Vec<(String, RunTemplate)> {
        let dir = self.app_dir(app_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", dir.display());
                }
                return Vec::new();
            }
        };
        let mut templates: Vec<(String, RunTemplate)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXT))
            .filter_map(|path| {
                let name = path.file_stem()?.to_str()?.to_string();
                match read_template(&path) {
                    Ok(template) => Some((name, template)),
                    Err(err) => {
                        warn!("Skipping template {}: {err}", path.display());
                        None
                    }
                }
            })
            .collect();
        templates.sort_by(|a, b| a.0.cmp(&b.0));
        templates
    }

    pub fn load(&self, app_id: &str, name: &str) -> DxResult<RunTemplate> {
        read_template(&self.template_path(app_id, name)?)
    }

    /// Writes the template, replacing one of the same name.
    pub fn save(&self, app_id: &str, name: &str, template: &RunTemplate) -> DxResult<PathBuf> {
        let path = self.template_path(app_id, name)?;
        write_json_atomic(&path, template)
            .map_err(|e| DxError::io(format!("failed to write {}", path.display()), e))?;
        debug!("saved template {}", path.display());
        Ok(path)
    }

    /// Returns whether a file was removed.
    pub fn delete(&self, app_id: &str, name: &str) -> DxResult<bool> {
        let path = self.template_path(app_id, name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(DxError::io(format!("failed to remove {}", path.display()), err)),
        }
    }
}

fn read_template(path: &Path) -> DxResult<RunTemplate> {
    let data = fs::read_to_string(path)
        .map_err(|e| DxError::io(format!("failed to read {}", path.display()), e))?;
    serde_json::from_str(&data)
        .map_err(|e| DxError::json(format!("failed to parse {}", path.display()), e))
}

/// Apps visible to the user plus their saved run templates.
pub struct AppExplorer {
    runner: Arc<dyn DxRunner>,
    state: Arc<ActiveProject>,
    notifier: Arc<dyn Notifier>,
    templates: TemplateStore,
    apps: Mutex<Vec<AppRecord>>,
}

impl AppExplorer {
    pub fn new(
        runner: Arc<dyn DxRunner>,
        state: Arc<ActiveProject>,
        notifier: Arc<dyn Notifier>,
        templates: TemplateStore,
    ) -> Self {
        Self {
            runner,
            state,
            notifier,
            templates,
            apps: Mutex::new(Vec::new()),
        }
    }

    pub fn apps(&self) -> Vec<AppRecord> {
        self.apps.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    fn notify_failure<T>(&self, what: &str, result: DxResult<T>) -> DxResult<T> {
        if let Err(err) = &result {
            self.notifier.error(&format!("{what}: {err}"));
        }
        result
    }

    fn active_project(&self) -> DxResult<String> {
        self.state
            .get()
            .ok_or_else(|| DxError::InvalidInput("Please select a project first.".into()))
    }

    pub async fn refresh(&self) {
        let apps = match load_apps(self.runner.as_ref()).await {
            Ok(apps) => {
                info!("Loaded {} apps", apps.len());
                apps
            }
            Err(err) => {
                self.notifier.error(&format!("Failed to load apps: {err}"));
                Vec::new()
            }
        };
        if let Ok(mut slot) = self.apps.lock() {
            *slot = apps;
        }
    }

    /// Renders the app's detail page next to its templates and returns the
    /// file written.
    pub async fn open(&self, app_id: &str) -> DxResult<PathBuf> {
        let result: DxResult<PathBuf> = async {
            let describe = self
                .runner
                .call(&args(&["describe", app_id]))
                .await?
                .into_json("dx describe")?;
            let path = self
                .templates
                .root
                .join("apps")
                .join(format!("{}.md", app_id.replace(':', "_")));
            write_staged(&path, app_markdown(&describe).as_bytes()).await?;
            Ok(path)
        }
        .await;
        self.notify_failure("Failed to open app", result)
    }

    /// Saves a template with default instance type and no inputs, scoped
    /// to the active project.
    pub fn create_template(
        &self,
        app_id: &str,
        name: &str,
        job_name: &str,
        output_folder: &str,
    ) -> DxResult<PathBuf> {
        let result: DxResult<PathBuf> = (|| {
            let template = RunTemplate {
                job_name: job_name.to_string(),
                output_folder: output_folder.to_string(),
                project: self.active_project()?,
                ..RunTemplate::default()
            };
            self.templates.save(app_id, name, &template)
        })();
        self.notify_failure("Failed to create template", result)
    }

    /// Loads a saved template, applies `edit` and writes it back.
    pub fn edit_template(
        &self,
        app_id: &str,
        name: &str,
        edit: &TemplateEdit,
    ) -> DxResult<RunTemplate> {
        let result: DxResult<RunTemplate> = (|| {
            let mut template = self.templates.load(app_id, name)?;
            edit.apply(&mut template);
            self.templates.save(app_id, name, &template)?;
            Ok(template)
        })();
        let template = self.notify_failure("Failed to edit template", result)?;
        self.notifier.info(&format!("Template '{name}' updated."));
        Ok(template)
    }

    /// Path of an existing template, for editing by hand.
    pub fn template_file(&self, app_id: &str, name: &str) -> DxResult<PathBuf> {
        let result = self.templates.template_path(app_id, name).and_then(|path| {
            if path.is_file() {
                Ok(path)
            } else {
                Err(DxError::InvalidInput(format!(
                    "No template named '{name}' for {app_id}"
                )))
            }
        });
        self.notify_failure("Failed to edit template", result)
    }

    pub fn delete_template(&self, app_id: &str, name: &str) -> DxResult<bool> {
        let removed = self.notify_failure(
            "Failed to delete template",
            self.templates.delete(app_id, name),
        )?;
        if removed {
            self.notifier.info(&format!("Template '{name}' deleted."));
        }
        Ok(removed)
    }

    /// Launches the app with a saved template into the active project and
    /// returns the new job id.
    pub async fn run_template(&self, app_id: &str, name: &str) -> DxResult<String> {
        let result: DxResult<(String, String)> = async {
            let project = self.active_project()?;
            let template = self.templates.load(app_id, name)?;
            let argv = run_args(app_id, &template, &project)?;
            let job_id = self.runner.call(&argv).await?.text().trim().to_string();
            if job_id.is_empty() {
                return Err(DxError::UnexpectedOutput("dx run printed no job id".into()));
            }
            Ok((template.job_name, job_id))
        }
        .await;
        let (job_name, job_id) = self.notify_failure("Failed to run template", result)?;
        self.notifier
            .info(&format!("Job '{job_name}' has been launched: {job_id}"));
        Ok(job_id)
    }
}
