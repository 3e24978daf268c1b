use std::{error::Error, fmt, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use dxnav_core::apps::{
    parse_input_assignment, AppExplorer, TemplateEdit, TemplateStore, DEFAULT_OUTPUT_FOLDER,
};
use dxnav_core::context::TracingProgress;
use dxnav_core::files::FileExplorer;
use dxnav_core::jobs::{ssh_command, watch_command, JobExplorer, JobRecord};
use dxnav_core::locate::ToolLocator;
use dxnav_core::nodes::{NodeId, RemoteNode};
use dxnav_core::project_state::JsonProjectStore;
use dxnav_core::projects::{current_workspace_from_env, PinStore, ProjectExplorer};
use dxnav_core::session::{check_environment, login_command, refresh_login, LoginState};
use dxnav_core::upload::{UploadOrchestrator, UploadOutcome};
use dxnav_core::{
    ActiveProject, CancelHandle, DxConfig, DxProcess, DxRunner, Notifier, OpContext,
    StatusIndicator,
};

#[derive(Parser)]
#[command(name = "dxnav", version, about = "Browse and manage DNAnexus projects from the terminal")]
struct Cli {
    /// Use this project for the command without changing the saved one
    #[arg(long, global = true)]
    project: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Project selection
    Projects {
        #[command(subcommand)]
        cmd: ProjectsCmd,
    },
    /// Files and folders of the active project
    Files {
        #[command(subcommand)]
        cmd: FilesCmd,
    },
    /// Jobs of the active project
    Jobs {
        #[command(subcommand)]
        cmd: JobsCmd,
    },
    /// Apps and saved run templates
    Apps {
        #[command(subcommand)]
        cmd: AppsCmd,
    },
    /// Show the logged-in user
    Whoami,
    /// Log in interactively with dx
    Login,
    /// Environment checks
    Env {
        #[command(subcommand)]
        cmd: EnvCmd,
    },
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ProjectsCmd {
    /// List projects, active one first
    List,
    /// Without an id, list projects not shown by `list`; with one, add it
    /// to the list for this workspace
    Add { project_id: Option<String> },
    /// Make a project the active one
    Select { project_id: String },
    /// Print the active project
    Current,
}

#[derive(Subcommand)]
enum FilesCmd {
    /// List a folder
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print the folder tree
    Tree {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long, default_value_t = 3)]
        depth: usize,
    },
    /// Create a folder (parents included)
    Mkdir {
        parent: String,
        name: String,
    },
    /// Remove a file, or a folder and everything below it
    Rm { path: String },
    /// Move files or folders into a folder
    Mv {
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long)]
        to: String,
        /// Create the target folder if missing
        #[arg(long)]
        parents: bool,
    },
    /// Rename a file or folder in place
    Rename { path: String, new_name: String },
    /// Upload local files or directories
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value = "/")]
        folder: String,
    },
    /// Download a file
    Download {
        path: String,
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
    /// Save `dx describe` output for a file id or path
    Describe { target: String },
    /// Show a file's name, size, dates, properties and tags
    Info { path: String },
    /// Print a file's ID
    Id { path: String },
    /// Fetch a small file into the staging area
    Preview { path: String },
    /// List destination folders
    Folders,
}

#[derive(Subcommand)]
enum JobsCmd {
    /// List recent jobs
    List,
    /// Keep listing jobs on the refresh interval until interrupted
    WatchList,
    Terminate { job_id: String },
    Describe { job_id: String },
    /// Print the job's web address
    Url { job_id: String },
    /// Launch a copy of a job
    Rerun { job_id: String },
    /// Follow a job's log (`dx watch`)
    Watch { job_id: String },
    /// Open a shell on a job's worker (`dx ssh`)
    Ssh { job_id: String },
}

#[derive(Subcommand)]
enum AppsCmd {
    List,
    /// Write the app's detail page and print its location
    Open { app_id: String },
    /// List saved templates for an app
    Templates { app_id: String },
    TemplateNew {
        app_id: String,
        name: String,
        #[arg(long)]
        job_name: Option<String>,
        #[arg(long, default_value = DEFAULT_OUTPUT_FOLDER)]
        folder: String,
    },
    /// Change fields of a saved template, or open it in $EDITOR when no
    /// field is given
    TemplateEdit {
        app_id: String,
        name: String,
        #[arg(long)]
        job_name: Option<String>,
        #[arg(long)]
        instance_type: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        project: Option<String>,
        /// Set an input, as name=value (value read as JSON when it parses)
        #[arg(long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,
        /// Remove an input
        #[arg(long = "unset-input", value_name = "NAME")]
        unset_inputs: Vec<String>,
    },
    TemplateRm { app_id: String, name: String },
    /// Launch an app with a saved template
    Run { app_id: String, template: String },
}

#[derive(Subcommand)]
enum EnvCmd {
    /// Report the dx tool, its version and the current user
    Check,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the effective settings, environment overrides included
    Show,
    /// Save a setting to the config file
    Set { key: String, value: String },
}

/// A failure the notifier has already shown.
#[derive(Debug)]
struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("command failed")
    }
}

impl Error for Reported {}

type CliResult = Result<(), Box<dyn Error>>;

fn reported<E>(_: E) -> Box<dyn Error> {
    Box::new(Reported)
}

struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

struct App {
    config: DxConfig,
    process: DxProcess,
    runner: Arc<dyn DxRunner>,
    state: Arc<ActiveProject>,
    notifier: Arc<dyn Notifier>,
    status: StatusIndicator,
    cancel: CancelHandle,
}

impl App {
    fn new(project_override: Option<String>) -> Result<Self, Box<dyn Error>> {
        let config = DxConfig::load();
        let process = DxProcess::discover(&ToolLocator::from_env(&config))?;
        let state = match project_override {
            Some(project) => ActiveProject::in_memory(Some(&project)),
            None => ActiveProject::new(Box::new(JsonProjectStore::for_workspace(
                &config.workspace_dir(),
            ))),
        };
        Ok(Self {
            runner: Arc::new(process.clone()),
            process,
            config,
            state: Arc::new(state),
            notifier: Arc::new(TerminalNotifier),
            status: StatusIndicator::new(),
            cancel: CancelHandle::new(),
        })
    }

    fn context(&self, label: &str) -> OpContext {
        OpContext::new(self.cancel.token(), Arc::new(TracingProgress::new(label)))
    }

    /// Falls back to the workspace `dx env` reports when nothing is saved.
    async fn ensure_project(&self) -> Result<String, Box<dyn Error>> {
        if let Some(project) = self.state.get() {
            return Ok(project);
        }
        match current_workspace_from_env(self.runner.as_ref()).await? {
            Some(project) => {
                self.state.set(Some(&project))?;
                Ok(project)
            }
            None => Err("no active project; run `dxnav projects select <id>` first".into()),
        }
    }

    fn projects(&self) -> ProjectExplorer {
        ProjectExplorer::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.state),
            Arc::clone(&self.notifier),
        )
        .with_pins(PinStore::for_workspace(&self.config.workspace_dir()))
    }

    fn files(&self) -> FileExplorer {
        let uploader = UploadOrchestrator::new(
            self.process.clone(),
            Arc::clone(&self.notifier),
            self.status.clone(),
        );
        FileExplorer::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.state),
            Arc::clone(&self.notifier),
            uploader,
        )
        .with_staging_dir(self.config.staging_dir())
        .with_delimiter(self.config.listing_delimiter.clone())
    }

    fn jobs(&self) -> JobExplorer {
        JobExplorer::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.state),
            Arc::clone(&self.notifier),
        )
        .with_limit(self.config.job_limit)
        .with_staging_dir(self.config.staging_dir())
    }

    fn apps(&self) -> AppExplorer {
        AppExplorer::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.state),
            Arc::clone(&self.notifier),
            TemplateStore::for_workspace(&self.config.workspace_dir()),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dxnav_util::init_tracing()?;
    let cli = Cli::parse();
    let _telemetry =
        dxnav_util::init_cli_telemetry("dxnav-cli", env!("CARGO_PKG_VERSION"), command_name(&cli.cmd));

    // Settings can be changed before dx is found.
    let cmd = match cli.cmd {
        Cmd::Config { cmd } => return config_cmd(cmd),
        other => other,
    };
    let app = App::new(cli.project)?;

    let cancel = app.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling...");
            cancel.cancel();
        }
    });

    let mut status_rx = app.status.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            debug!("status: {} ({})", status.text, status.tooltip);
        }
    });

    match cmd {
        Cmd::Projects { cmd } => projects_cmd(&app, cmd).await,
        Cmd::Files { cmd } => files_cmd(&app, cmd).await,
        Cmd::Jobs { cmd } => jobs_cmd(&app, cmd).await,
        Cmd::Apps { cmd } => apps_cmd(&app, cmd).await,
        Cmd::Whoami => {
            match refresh_login(app.runner.as_ref(), &app.status, app.notifier.as_ref()).await {
                LoginState::LoggedIn(user) => println!("{user}"),
                _ => {
                    println!("login with: {}", login_command(app.process.cli_path()).join(" "));
                    return Err(Reported.into());
                }
            }
            Ok(())
        }
        Cmd::Login => {
            run_interactive(&login_command(app.process.cli_path())).await?;
            match refresh_login(app.runner.as_ref(), &app.status, app.notifier.as_ref()).await {
                LoginState::LoggedIn(user) => {
                    println!("logged in as {user}");
                    Ok(())
                }
                _ => Err(Reported.into()),
            }
        }
        Cmd::Env { cmd: EnvCmd::Check } => {
            let report = check_environment(app.runner.as_ref()).await;
            println!("dx CLI found: {}", report.cli_path.display());
            println!(
                "Version: {}",
                report.version.as_deref().unwrap_or("unknown")
            );
            match report.login {
                LoginState::LoggedIn(user) => println!("Current user: {user}"),
                LoginState::LoggedOut => println!("Current user: not logged in"),
                LoginState::Expired => println!("Current user: session expired"),
            }
            Ok(())
        }
        Cmd::Config { cmd } => config_cmd(cmd),
    }
}

fn command_name(cmd: &Cmd) -> &'static str {
    match cmd {
        Cmd::Projects { .. } => "projects",
        Cmd::Files { .. } => "files",
        Cmd::Jobs { .. } => "jobs",
        Cmd::Apps { .. } => "apps",
        Cmd::Whoami => "whoami",
        Cmd::Login => "login",
        Cmd::Env { .. } => "env",
        Cmd::Config { .. } => "config",
    }
}

fn config_cmd(cmd: ConfigCmd) -> CliResult {
    match cmd {
        ConfigCmd::Show => {
            for (key, value) in DxConfig::load().entries() {
                println!("{key}\t{value}");
            }
        }
        ConfigCmd::Set { key, value } => {
            let mut config = DxConfig::load_file();
            config.set(&key, &value)?;
            config.save()?;
            println!("{key} saved to {}", dxnav_core::config::config_path().display());
        }
    }
    Ok(())
}

async fn projects_cmd(app: &App, cmd: ProjectsCmd) -> CliResult {
    let explorer = app.projects();
    match cmd {
        ProjectsCmd::List => {
            explorer.initialize().await;
            for project in explorer.projects() {
                let marker = if project.is_active { "*" } else { " " };
                println!(
                    "{marker} {}\t{}\t{}",
                    project.id,
                    project.name,
                    project.level.as_deref().unwrap_or("")
                );
            }
        }
        ProjectsCmd::Add { project_id: None } => {
            explorer.refresh().await;
            let candidates = explorer.add_candidates().await.map_err(|e| {
                app.notifier
                    .error(&format!("Failed to load available projects: {e}"));
                reported(e)
            })?;
            if candidates.is_empty() {
                println!("All available projects are already listed.");
            }
            for project in candidates {
                println!("{}\t{}", project.id, project.name);
            }
        }
        ProjectsCmd::Add {
            project_id: Some(project_id),
        } => {
            explorer.refresh().await;
            let candidates = explorer.add_candidates().await.map_err(|e| {
                app.notifier
                    .error(&format!("Failed to load available projects: {e}"));
                reported(e)
            })?;
            match candidates.into_iter().find(|p| p.id == project_id) {
                Some(record) => {
                    explorer.add_project(record).map_err(|e| {
                        app.notifier.error(&format!("Failed to add project: {e}"));
                        reported(e)
                    })?;
                }
                None if explorer.projects().iter().any(|p| p.id == project_id) => {
                    println!("{project_id} is already listed.");
                }
                None => return Err(format!("no available project with id {project_id}").into()),
            }
        }
        ProjectsCmd::Select { project_id } => {
            explorer.refresh().await;
            explorer.select(&project_id).await.map_err(reported)?;
        }
        ProjectsCmd::Current => println!("{}", app.ensure_project().await?),
    }
    Ok(())
}

async fn files_cmd(app: &App, cmd: FilesCmd) -> CliResult {
    let project = app.ensure_project().await?;
    let explorer = app.files();
    match cmd {
        FilesCmd::Ls { path } => {
            for id in list_folder(&explorer, &path).await? {
                if let Some(node) = explorer.node(id) {
                    print_node(&node, 0);
                }
            }
        }
        FilesCmd::Tree { path, depth } => {
            println!("{project}:{path}");
            let mut stack: Vec<(NodeId, usize)> = list_folder(&explorer, &path)
                .await?
                .into_iter()
                .rev()
                .map(|id| (id, 1))
                .collect();
            while let Some((id, level)) = stack.pop() {
                let Some(node) = explorer.node(id) else {
                    continue;
                };
                print_node(&node, level);
                if node.is_container && level < depth {
                    let children = explorer.children(Some(id)).await;
                    stack.extend(children.into_iter().rev().map(|child| (child, level + 1)));
                }
            }
        }
        FilesCmd::Mkdir { parent, name } => {
            explorer.create_folder(&parent, &name).await.map_err(reported)?;
        }
        FilesCmd::Rm { path } => {
            let node = explorer.resolve(&path).await?;
            let ctx = app.context("delete");
            let outcome = explorer.delete(&node, &ctx).await.map_err(reported)?;
            debug!("delete {path}: {outcome:?}");
        }
        FilesCmd::Mv {
            sources,
            to,
            parents,
        } => {
            explorer
                .move_items(&sources, &to, parents)
                .await
                .map_err(reported)?;
        }
        FilesCmd::Rename { path, new_name } => {
            let node = explorer.resolve(&path).await?;
            explorer.rename(&node, &new_name).await.map_err(reported)?;
        }
        FilesCmd::Upload { paths, folder } => {
            let ctx = app.context("upload");
            match explorer.upload(paths, &folder, &ctx).await.map_err(reported)? {
                UploadOutcome::Partial { .. } | UploadOutcome::Cancelled => {
                    return Err(Reported.into())
                }
                UploadOutcome::NothingToUpload | UploadOutcome::Completed { .. } => {}
            }
        }
        FilesCmd::Download { path, dest } => {
            let node = explorer.resolve(&path).await?;
            let saved = explorer.download(&node, &dest).await.map_err(reported)?;
            println!("{}", saved.display());
        }
        FilesCmd::Describe { target } => {
            let id = if target.starts_with("file-") {
                target
            } else {
                explorer.resolve(&target).await?.handle()
            };
            let saved = explorer.describe(&id).await.map_err(reported)?;
            println!("{}", saved.display());
        }
        FilesCmd::Info { path } => {
            let node = explorer.resolve(&path).await?;
            let details = explorer.details(&node).await.map_err(reported)?;
            for (label, value) in details.rows() {
                println!("{label}: {value}");
            }
            for (key, value) in &details.properties {
                println!("  {key}: {value}");
            }
        }
        FilesCmd::Id { path } => {
            println!("{}", explorer.file_id(&path).await.map_err(reported)?);
        }
        FilesCmd::Preview { path } => {
            let node = explorer.resolve(&path).await?;
            let preview = explorer.preview(&node).await.map_err(reported)?;
            println!("{}\t{:?}", preview.path.display(), preview.kind);
        }
        FilesCmd::Folders => {
            for folder in explorer.folders().await {
                println!("{folder}");
            }
        }
    }
    Ok(())
}

async fn list_folder(explorer: &FileExplorer, path: &str) -> Result<Vec<NodeId>, Box<dyn Error>> {
    if path.trim_matches('/').is_empty() {
        return Ok(explorer.children(None).await);
    }
    let node = explorer.resolve(path).await?;
    if !node.is_container {
        return Err(format!("{path} is not a folder").into());
    }
    let id = explorer
        .find(&node.path)
        .ok_or_else(|| format!("{path} disappeared while listing"))?;
    Ok(explorer.children(Some(id)).await)
}

fn print_node(node: &RemoteNode, level: usize) {
    let indent = "  ".repeat(level.saturating_sub(1));
    if node.is_container {
        println!("{indent}{}/", node.name);
    } else {
        println!(
            "{indent}{}\t{}",
            node.name,
            node.id.as_deref().unwrap_or("")
        );
    }
}

fn print_jobs(jobs: &[JobRecord]) {
    let now = dxnav_util::now_millis();
    for job in jobs {
        println!("{}\t{}\t{}", job.id, job.name, job.summary(now));
    }
}

async fn jobs_cmd(app: &App, cmd: JobsCmd) -> CliResult {
    let explorer = app.jobs();
    match cmd {
        JobsCmd::List => {
            app.ensure_project().await?;
            explorer.load().await;
            print_jobs(&explorer.jobs());
        }
        JobsCmd::WatchList => {
            app.ensure_project().await?;
            let explorer = Arc::new(explorer);
            explorer.load().await;
            print_jobs(&explorer.jobs());
            let task = explorer.spawn_auto_refresh(
                app.config.job_refresh_interval(),
                app.cancel.token(),
                |jobs| {
                    println!();
                    print_jobs(jobs);
                },
            );
            task.await?;
        }
        JobsCmd::Terminate { job_id } => {
            explorer.terminate(&job_id).await.map_err(reported)?;
        }
        JobsCmd::Describe { job_id } => {
            app.ensure_project().await?;
            let described = explorer.describe(&job_id).await.map_err(reported)?;
            if let Some(record) = &described.record {
                for (label, value) in record.details() {
                    println!("{label}: {value}");
                }
            }
            println!("Saved: {}", described.path.display());
        }
        JobsCmd::Url { job_id } => {
            println!("{}", explorer.platform_url(&job_id).await.map_err(reported)?);
        }
        JobsCmd::Rerun { job_id } => {
            app.ensure_project().await?;
            println!("{}", explorer.rerun(&job_id).await.map_err(reported)?);
        }
        JobsCmd::Watch { job_id } => {
            run_interactive(&watch_command(app.process.cli_path(), &job_id)).await?;
        }
        JobsCmd::Ssh { job_id } => {
            run_interactive(&ssh_command(app.process.cli_path(), &job_id)).await?;
        }
    }
    Ok(())
}

async fn apps_cmd(app: &App, cmd: AppsCmd) -> CliResult {
    let explorer = app.apps();
    match cmd {
        AppsCmd::List => {
            explorer.refresh().await;
            for record in explorer.apps() {
                println!(
                    "{}\t{}\t{}",
                    record.id,
                    record.name,
                    record.version.as_deref().unwrap_or("unknown")
                );
            }
        }
        AppsCmd::Open { app_id } => {
            let page = explorer.open(&app_id).await.map_err(reported)?;
            println!("{}", page.display());
        }
        AppsCmd::Templates { app_id } => {
            for (name, template) in explorer.templates().list(&app_id) {
                println!(
                    "{name}\t{}\t{}\t{}",
                    template.job_name, template.instance_type, template.output_folder
                );
            }
        }
        AppsCmd::TemplateNew {
            app_id,
            name,
            job_name,
            folder,
        } => {
            app.ensure_project().await?;
            let job_name = job_name.unwrap_or_else(|| format!("{app_id} run"));
            let path = explorer
                .create_template(&app_id, &name, &job_name, &folder)
                .map_err(reported)?;
            println!("{}", path.display());
        }
        AppsCmd::TemplateEdit {
            app_id,
            name,
            job_name,
            instance_type,
            folder,
            project,
            inputs,
            unset_inputs,
        } => {
            let set_inputs = inputs
                .iter()
                .map(|raw| parse_input_assignment(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let edit = TemplateEdit {
                job_name,
                instance_type,
                output_folder: folder,
                project,
                set_inputs,
                remove_inputs: unset_inputs,
            };
            if edit.is_empty() {
                let path = explorer.template_file(&app_id, &name).map_err(reported)?;
                run_interactive(&[editor(), path.display().to_string()]).await?;
            } else {
                let template = explorer
                    .edit_template(&app_id, &name, &edit)
                    .map_err(reported)?;
                println!("{}", serde_json::to_string_pretty(&template)?);
            }
        }
        AppsCmd::TemplateRm { app_id, name } => {
            if !explorer.delete_template(&app_id, &name).map_err(reported)? {
                warn!("No template named {name} for {app_id}");
            }
        }
        AppsCmd::Run { app_id, template } => {
            app.ensure_project().await?;
            println!("{}", explorer.run_template(&app_id, &template).await.map_err(reported)?);
        }
    }
    Ok(())
}

fn editor() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string())
}

/// Runs a command attached to this terminal.
async fn run_interactive(argv: &[String]) -> CliResult {
    let Some((program, rest)) = argv.split_first() else {
        return Ok(());
    };
    let status = tokio::process::Command::new(program)
        .args(rest)
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{} exited with {status}", argv.join(" ")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_project_flag_parses_after_subcommand() {
        let cli = Cli::try_parse_from(["dxnav", "files", "ls", "/data", "--project", "project-1"])
            .unwrap();
        assert_eq!(cli.project.as_deref(), Some("project-1"));
        assert!(matches!(cli.cmd, Cmd::Files { cmd: FilesCmd::Ls { ref path } } if path == "/data"));
    }

    #[test]
    fn template_edit_collects_repeated_inputs() {
        let cli = Cli::try_parse_from([
            "dxnav",
            "apps",
            "template-edit",
            "app-bwa",
            "nightly",
            "--input",
            "threads=8",
            "--input",
            "sample=S1",
            "--unset-input",
            "reads",
        ])
        .unwrap();
        let Cmd::Apps {
            cmd: AppsCmd::TemplateEdit {
                inputs,
                unset_inputs,
                job_name,
                ..
            },
        } = cli.cmd
        else {
            panic!("expected apps template-edit");
        };
        assert_eq!(inputs, ["threads=8", "sample=S1"]);
        assert_eq!(unset_inputs, ["reads"]);
        assert!(job_name.is_none());
    }

    #[test]
    fn files_info_and_id_take_a_path() {
        let cli = Cli::try_parse_from(["dxnav", "files", "info", "/reads/r1.fq"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Files { cmd: FilesCmd::Info { ref path } } if path == "/reads/r1.fq"));
        let cli = Cli::try_parse_from(["dxnav", "files", "id", "/reads/r1.fq"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Files { cmd: FilesCmd::Id { .. } }));
    }

    #[test]
    fn config_set_takes_key_and_value() {
        let cli = Cli::try_parse_from(["dxnav", "config", "set", "job_limit", "20"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Cmd::Config { cmd: ConfigCmd::Set { ref key, ref value } } if key == "job_limit" && value == "20"
        ));
    }

    #[test]
    fn projects_add_id_is_optional() {
        let cli = Cli::try_parse_from(["dxnav", "projects", "add"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Cmd::Projects { cmd: ProjectsCmd::Add { project_id: None } }
        ));
    }
}
