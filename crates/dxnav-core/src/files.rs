use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::OpContext;
use crate::details::FileDetails;
use crate::directory::{delete_remote_directory, DeleteOutcome};
use crate::error::{DxError, DxResult};
use crate::listing::{child_path, ls_args, parse_listing, DEFAULT_LISTING_DELIMITER};
use crate::nodes::{NodeArena, NodeId, RemoteNode};
use crate::notify::Notifier;
use crate::process::{args, DxRunner};
use crate::project_state::{ActiveProject, SubscriptionId};
use crate::upload::{UploadOrchestrator, UploadOutcome, UploadRequest};

/// Files above this size are not previewed.
pub const MAX_PREVIEW_BYTES: u64 = 5 * 1024 * 1024;
const DESCRIBE_FILE: &str = "file-describe.json";
const HOME_PROJECT_DIR: &str = "my-home";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewKind {
    Image,
    Pdf,
    Markdown,
    Notebook,
    Text,
}

impl PreviewKind {
    pub fn for_extension(extension: Option<&str>) -> Self {
        match extension {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => PreviewKind::Image,
            Some("pdf") => PreviewKind::Pdf,
            Some("md") => PreviewKind::Markdown,
            Some("ipynb") => PreviewKind::Notebook,
            _ => PreviewKind::Text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preview {
    pub path: PathBuf,
    pub kind: PreviewKind,
}

/// Rejects empty names and names containing `/`.
pub fn validate_name(name: &str, what: &str) -> DxResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DxError::InvalidInput(format!("{what} name cannot be empty")));
    }
    if trimmed.contains('/') {
        return Err(DxError::InvalidInput(format!(
            "{what} name cannot contain path separators (/)"
        )));
    }
    Ok(trimmed.to_string())
}

fn folder_target(path: &str) -> String {
    if path == "/" || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

pub fn move_args(
    project_id: Option<&str>,
    sources: &[String],
    target: &str,
    create_parents: bool,
) -> Vec<String> {
    let qualify = |path: &str| match project_id {
        Some(project) => format!("{project}:{path}"),
        None => path.to_string(),
    };
    let mut argv = vec!["mv".to_string()];
    if create_parents {
        argv.push("--parents".to_string());
    }
    argv.extend(sources.iter().map(|s| qualify(s)));
    argv.push(qualify(&folder_target(target)));
    argv
}

/// Folder paths from `dx ls -l <project>: --folders --json`, always
/// including the root.
pub fn folder_paths(listing: &Value) -> Vec<String> {
    let mut out = vec!["/".to_string()];
    if let Some(items) = listing.as_array() {
        for item in items {
            if item.get("id").is_none() {
                continue;
            }
            if let Some(folder) = item.get("folder").and_then(Value::as_str) {
                out.push(folder.to_string());
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

/// File tree of the active project plus the per-node actions.
pub struct FileExplorer {
    runner: Arc<dyn DxRunner>,
    state: Arc<ActiveProject>,
    notifier: Arc<dyn Notifier>,
    uploader: UploadOrchestrator,
    arena: Arc<Mutex<NodeArena>>,
    staging_dir: PathBuf,
    delimiter: String,
    subscription: SubscriptionId,
}

impl FileExplorer {
    pub fn new(
        runner: Arc<dyn DxRunner>,
        state: Arc<ActiveProject>,
        notifier: Arc<dyn Notifier>,
        uploader: UploadOrchestrator,
    ) -> Self {
        let arena = Arc::new(Mutex::new(NodeArena::new()));
        let cache = Arc::clone(&arena);
        let subscription = state.subscribe(move |project| {
            debug!("file tree invalidated for {}", project.unwrap_or("none"));
            if let Ok(mut arena) = cache.lock() {
                arena.clear();
            }
        });
        Self {
            runner,
            state,
            notifier,
            uploader,
            arena,
            staging_dir: dxnav_util::default_staging_dir(),
            delimiter: DEFAULT_LISTING_DELIMITER.to_string(),
            subscription,
        }
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn node(&self, id: NodeId) -> Option<RemoteNode> {
        self.arena.lock().ok().and_then(|a| a.get(id).cloned())
    }

    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.arena.lock().ok().and_then(|a| a.find_by_path(path))
    }

    /// Walks the tree from the root, listing each folder on the way, and
    /// returns the node at `path`.
    pub async fn resolve(&self, path: &str) -> DxResult<RemoteNode> {
        let mut level = self.children(None).await;
        let mut found: Option<NodeId> = None;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for (depth, component) in components.iter().enumerate() {
            let hit = level
                .iter()
                .copied()
                .find(|id| self.node(*id).is_some_and(|n| n.name == *component));
            let Some(id) = hit else {
                return Err(DxError::InvalidInput(format!("No such file or folder: {path}")));
            };
            found = Some(id);
            if depth + 1 < components.len() {
                level = self.children(Some(id)).await;
            }
        }
        found
            .and_then(|id| self.node(id))
            .ok_or_else(|| DxError::InvalidInput(format!("No such file or folder: {path}")))
    }

    fn active_project(&self) -> DxResult<String> {
        self.state
            .get()
            .ok_or_else(|| DxError::InvalidInput("Please select a project first.".into()))
    }

    fn notify_failure<T>(&self, what: &str, result: DxResult<T>) -> DxResult<T> {
        if let Err(err) = &result {
            self.notifier.error(&format!("{what}: {err}"));
        }
        result
    }

    /// Children of `parent`, or of the project root when `parent` is `None`.
    /// Listing the root starts a new tree generation; a listing that finishes
    /// after the tree moved on is dropped. Failures are logged and show as an
    /// empty folder.
    pub async fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        let Some(project_id) = self.state.get() else {
            return Vec::new();
        };
        let generation = self.state.generation();
        let (parent_path, tree) = match parent {
            Some(id) => match self.node(id) {
                Some(node) => (node.path, id.generation()),
                None => {
                    warn!("Unknown node {id:?}; tree was refreshed");
                    return Vec::new();
                }
            },
            None => {
                let Ok(mut arena) = self.arena.lock() else {
                    return Vec::new();
                };
                arena.clear();
                ("/".to_string(), arena.generation())
            }
        };

        let argv = ls_args(&project_id, &parent_path, &self.delimiter);
        let raw = match self.runner.call(&argv).await {
            Ok(out) => out.text(),
            Err(err) => {
                warn!("Failed to list {project_id}:{parent_path}: {err}");
                return Vec::new();
            }
        };
        if !self.state.is_current(generation) {
            debug!("discarding listing of {parent_path} for stale project {project_id}");
            return Vec::new();
        }

        let entries = parse_listing(&raw, &self.delimiter, &parent_path).into_sorted();
        let Ok(mut arena) = self.arena.lock() else {
            return Vec::new();
        };
        if arena.generation() != tree {
            debug!("discarding listing of {parent_path}: tree was refreshed");
            return Vec::new();
        }
        entries
            .into_iter()
            .map(|entry| arena.insert(RemoteNode::from_entry(entry, &project_id, parent)))
            .collect()
    }

    /// Remote id of the file at `path`.
    pub async fn file_id(&self, path: &str) -> DxResult<String> {
        let result: DxResult<String> = async {
            let node = self.resolve(path).await?;
            if node.is_container {
                return Err(DxError::InvalidInput(format!(
                    "{path} is a folder; folders have no file ID."
                )));
            }
            node.id
                .ok_or_else(|| DxError::InvalidInput("File ID is missing.".into()))
        }
        .await;
        self.notify_failure("Failed to get file ID", result)
    }

    pub async fn create_folder(&self, parent_path: &str, name: &str) -> DxResult<String> {
        let result: DxResult<String> = async {
            let project_id = self.active_project()?;
            let name = validate_name(name, "Folder")?;
            let path = child_path(parent_path, &name);
            self.runner
                .call(&args(&["mkdir", "-p", &format!("{project_id}:{path}")]))
                .await?;
            Ok(path)
        }
        .await;
        let path = self.notify_failure("Failed to create folder", result)?;
        self.notifier.info(&format!("Created folder '{path}'"));
        Ok(path)
    }

    pub async fn delete(&self, node: &RemoteNode, ctx: &OpContext) -> DxResult<DeleteOutcome> {
        let result: DxResult<DeleteOutcome> = async {
            let project_id = match node.project_id.clone() {
                Some(project) => project,
                None => self.active_project()?,
            };
            if node.is_container {
                delete_remote_directory(self.runner.as_ref(), &node.path, Some(&project_id), ctx)
                    .await
            } else {
                self.runner
                    .call(&args(&["rm", &format!("{project_id}:{}", node.path)]))
                    .await?;
                Ok(DeleteOutcome::Deleted)
            }
        }
        .await;
        let outcome = self.notify_failure("Failed to delete", result)?;
        let kind = if node.is_container { "folder" } else { "file" };
        match outcome {
            DeleteOutcome::Deleted => self
                .notifier
                .info(&format!("Successfully deleted {kind} '{}'", node.name)),
            DeleteOutcome::Cancelled => self.notifier.warn(&format!(
                "Deletion of '{}' was cancelled; some entries may already be gone",
                node.name
            )),
        }
        Ok(outcome)
    }

    /// Renames in place. Returns `Ok(false)` when the name is unchanged.
    pub async fn rename(&self, node: &RemoteNode, new_name: &str) -> DxResult<bool> {
        let kind = if node.is_container { "folder" } else { "file" };
        let name = self.notify_failure(
            "Rename failed",
            validate_name(new_name, if node.is_container { "Folder" } else { "File" }),
        )?;
        if name == node.name {
            self.notifier
                .info("New name is the same as the current name. No changes made.");
            return Ok(false);
        }
        let result = self.runner.call(&args(&["mv", &node.handle(), &name])).await;
        self.notify_failure("Rename failed", result)?;
        self.notifier.info(&format!(
            "Successfully renamed {kind} \"{}\" to \"{name}\".",
            node.name
        ));
        Ok(true)
    }

    pub async fn move_items(
        &self,
        sources: &[String],
        target: &str,
        create_parents: bool,
    ) -> DxResult<()> {
        if sources.is_empty() {
            return Ok(());
        }
        let project_id = self.state.get();
        let argv = move_args(project_id.as_deref(), sources, target, create_parents);
        let result = self.runner.call(&argv).await.map(|_| ());
        self.notify_failure("Move failed", result)
    }

    pub async fn download(&self, node: &RemoteNode, dest_dir: &Path) -> DxResult<PathBuf> {
        let result: DxResult<PathBuf> = async {
            if node.is_container {
                return Err(DxError::InvalidInput(
                    "Cannot download a directory. Select a file to download.".into(),
                ));
            }
            let id = node
                .id
                .as_deref()
                .ok_or_else(|| DxError::InvalidInput("File ID is missing.".into()))?;
            let dest = dest_dir.display().to_string();
            self.runner.call(&args(&["download", id, "-o", &dest])).await?;
            Ok(dest_dir.join(&node.name))
        }
        .await;
        let path = self.notify_failure("Download failed", result)?;
        self.notifier.info(&format!(
            "Successfully downloaded {} to {}",
            node.name,
            dest_dir.display()
        ));
        Ok(path)
    }

    /// Writes `dx describe` output for `id` into the staging directory.
    pub async fn describe(&self, id: &str) -> DxResult<PathBuf> {
        let result: DxResult<PathBuf> = async {
            let content = self.runner.call(&args(&["describe", id])).await?.text();
            if content.trim().is_empty() {
                return Err(DxError::UnexpectedOutput(format!(
                    "`dx describe --json {id}` returned no output"
                )));
            }
            let path = self.staging_dir.join(DESCRIBE_FILE);
            write_staged(&path, content.as_bytes()).await?;
            Ok(path)
        }
        .await;
        self.notify_failure("Failed to describe file", result)
    }

    /// Describes a file for the details view. Folders have no details.
    pub async fn details(&self, node: &RemoteNode) -> DxResult<FileDetails> {
        let result: DxResult<FileDetails> = async {
            if node.is_container {
                return Err(DxError::InvalidInput(
                    "Folders have no details. Select a file.".into(),
                ));
            }
            let id = node
                .id
                .as_deref()
                .ok_or_else(|| DxError::InvalidInput("File ID is missing.".into()))?;
            let describe = self
                .runner
                .call(&args(&["describe", id]))
                .await?
                .into_json("dx describe")?;
            Ok(FileDetails::from_describe(&describe))
        }
        .await;
        self.notify_failure("Failed to load file details", result)
    }

    /// Downloads a small file into the staging area, mirroring its remote
    /// folder, and reports how it should be shown.
    pub async fn preview(&self, node: &RemoteNode) -> DxResult<Preview> {
        let result = self.fetch_preview(node).await;
        self.notify_failure("Failed to preview file", result)
    }

    async fn fetch_preview(&self, node: &RemoteNode) -> DxResult<Preview> {
        if node.is_container {
            return Err(DxError::InvalidInput("Cannot open a directory.".into()));
        }
        let id = node
            .id
            .as_deref()
            .ok_or_else(|| DxError::InvalidInput("File ID is missing.".into()))?;

        let info = self.runner.call(&args(&["describe", id])).await?;
        let size = info
            .as_json()
            .and_then(|v| v.get("size"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if size > MAX_PREVIEW_BYTES {
            return Err(DxError::InvalidInput(
                "File is larger than 5 MB and will not be downloaded or opened.".into(),
            ));
        }

        let project_dir = node
            .project_id
            .clone()
            .or_else(|| self.state.get())
            .unwrap_or_else(|| HOME_PROJECT_DIR.to_string());
        let local_dir = self
            .staging_dir
            .join(project_dir)
            .join(node.folder().trim_start_matches('/'));
        let local_path = local_dir.join(&node.name);

        if !local_path.exists() {
            tokio::fs::create_dir_all(&local_dir)
                .await
                .map_err(|e| DxError::io(format!("failed to create {}", local_dir.display()), e))?;
            let dir = local_dir.display().to_string();
            self.runner
                .call(&args(&["download", id, "-o", &dir, "--overwrite"]))
                .await?;
            if !local_path.exists() {
                return Err(DxError::UnexpectedOutput(format!(
                    "Download did not produce expected file: {}",
                    local_path.display()
                )));
            }
        } else {
            debug!("preview cache hit for {}", local_path.display());
        }

        info!("Previewing {}", local_path.display());
        Ok(Preview {
            kind: PreviewKind::for_extension(node.extension.as_deref()),
            path: local_path,
        })
    }

    /// Destination folders for uploads and moves.
    pub async fn folders(&self) -> Vec<String> {
        let Some(project_id) = self.state.get() else {
            return vec!["/".to_string()];
        };
        let argv = args(&["ls", "-l", &format!("{project_id}:"), "--folders", "--json"]);
        match self.runner.call(&argv).await {
            Ok(out) => folder_paths(out.as_json().unwrap_or(&Value::Null)),
            Err(err) => {
                warn!("Error getting directories: {err}");
                vec!["/".to_string()]
            }
        }
    }

    /// Uploads local paths into `target_folder` of the active project.
    pub async fn upload(
        &self,
        paths: Vec<PathBuf>,
        target_folder: &str,
        ctx: &OpContext,
    ) -> DxResult<UploadOutcome> {
        let request = UploadRequest {
            paths,
            project_id: self.state.get(),
            folder: Some(target_folder.to_string()),
            show_progress: true,
            ..UploadRequest::default()
        };
        let result = self.uploader.upload(&request, ctx).await;
        self.notify_failure("Upload failed", result)
    }
}

impl Drop for FileExplorer {
    fn drop(&mut self) {
        self.state.unsubscribe(self.subscription);
    }
}

pub(crate) async fn write_staged(path: &Path, data: &[u8]) -> DxResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DxError::io(format!("failed to create {}", parent.display()), e))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| DxError::io(format!("failed to write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{DxOutput, DxProcess};
    use crate::status::StatusIndicator;
    use crate::test_support::{Notice, RecordingNotifier, RecordingRunner};
    use serde_json::json;
    use tempfile::TempDir;

    const ROOT_LISTING: &str = "project-1:/\n\nreads/\n\nState;;Modified;;Size;;Name;;ID\nclosed;;t;;1 KB;;notes.md;;file-n\n";
    const READS_LISTING: &str = "project-1:/reads\n\nState;;Modified;;Size;;Name;;ID\nclosed;;t;;1 GB;;r1.fq;;file-r1\n";

    struct Fixture {
        runner: Arc<RecordingRunner>,
        state: Arc<ActiveProject>,
        notifier: Arc<RecordingNotifier>,
        staging: TempDir,
        explorer: FileExplorer,
    }

    fn fixture(runner: RecordingRunner, project: Option<&str>) -> Fixture {
        let runner = Arc::new(runner);
        let state = Arc::new(ActiveProject::in_memory(project));
        let notifier = Arc::new(RecordingNotifier::default());
        let staging = TempDir::new().unwrap();
        let uploader = UploadOrchestrator::new(
            DxProcess::new(staging.path().join("no-dx")),
            notifier.clone(),
            StatusIndicator::new(),
        );
        let explorer = FileExplorer::new(runner.clone(), state.clone(), notifier.clone(), uploader)
            .with_staging_dir(staging.path());
        Fixture {
            runner,
            state,
            notifier,
            staging,
            explorer,
        }
    }

    fn tree_runner() -> RecordingRunner {
        RecordingRunner::new(|argv| {
            let text = match argv.last().map(String::as_str) {
                Some("project-1:/") => ROOT_LISTING,
                Some("project-1:/reads") => READS_LISTING,
                _ => "",
            };
            Ok(DxOutput::Text(text.into()))
        })
    }

    fn file_node(name: &str, path: &str, id: &str) -> RemoteNode {
        RemoteNode {
            id: Some(id.into()),
            name: name.into(),
            path: path.into(),
            is_container: false,
            project_id: Some("project-1".into()),
            extension: crate::listing::extension_hint(name),
            parent: None,
        }
    }

    #[tokio::test]
    async fn resolve_walks_nested_folders() {
        let fx = fixture(tree_runner(), Some("project-1"));
        let node = fx.explorer.resolve("/reads/r1.fq").await.unwrap();
        assert_eq!(node.id.as_deref(), Some("file-r1"));
        assert_eq!(fx.runner.calls().len(), 2);

        let folder = fx.explorer.resolve("reads/").await.unwrap();
        assert!(folder.is_container);
        assert!(matches!(
            fx.explorer.resolve("/reads/missing").await,
            Err(DxError::InvalidInput(_))
        ));
        assert!(fx.explorer.resolve("/").await.is_err());
    }

    #[tokio::test]
    async fn relisting_the_root_invalidates_old_handles() {
        let fx = fixture(tree_runner(), Some("project-1"));
        let first = fx.explorer.children(None).await;
        let second = fx.explorer.children(None).await;
        assert!(fx.explorer.node(first[0]).is_none());
        assert!(fx.explorer.children(Some(first[0])).await.is_empty());
        assert_eq!(fx.explorer.node(second[0]).unwrap().name, "reads");
        assert_eq!(fx.runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn folder_listing_finishing_after_a_refresh_is_dropped() {
        let arena_slot: Arc<Mutex<Option<Arc<Mutex<NodeArena>>>>> = Arc::default();
        let hook = Arc::clone(&arena_slot);
        let runner = RecordingRunner::new(move |argv| {
            let text = match argv.last().map(String::as_str) {
                Some("project-1:/") => ROOT_LISTING,
                Some("project-1:/reads") => {
                    if let Some(arena) = hook.lock().unwrap().as_ref() {
                        arena.lock().unwrap().clear();
                    }
                    READS_LISTING
                }
                _ => "",
            };
            Ok(DxOutput::Text(text.into()))
        });
        let fx = fixture(runner, Some("project-1"));
        *arena_slot.lock().unwrap() = Some(Arc::clone(&fx.explorer.arena));

        let roots = fx.explorer.children(None).await;
        assert!(fx.explorer.children(Some(roots[0])).await.is_empty());
        assert!(fx.explorer.find("/reads/r1.fq").is_none());
    }

    #[tokio::test]
    async fn file_id_resolves_files_only() {
        let fx = fixture(tree_runner(), Some("project-1"));
        assert_eq!(fx.explorer.file_id("/reads/r1.fq").await.unwrap(), "file-r1");
        assert!(fx.explorer.file_id("/reads").await.is_err());
        assert!(matches!(
            &fx.notifier.notices()[..],
            [Notice::Error(m)] if m.contains("is a folder")
        ));
    }

    #[tokio::test]
    async fn details_are_built_from_describe() {
        let fx = fixture(
            RecordingRunner::json(json!({"id": "file-r1", "name": "r1.fq", "size": 1536})),
            Some("project-1"),
        );
        let node = file_node("r1.fq", "/reads/r1.fq", "file-r1");
        let details = fx.explorer.details(&node).await.unwrap();
        assert_eq!(details.size, Some(1536));
        assert!(details.rows().contains(&("Size", "1.5 KB".to_string())));
        assert_eq!(fx.runner.lines(), ["describe file-r1"]);

        let mut folder = node.clone();
        folder.is_container = true;
        assert!(fx.explorer.details(&folder).await.is_err());
        assert_eq!(fx.runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn no_active_project_means_empty_tree() {
        let fx = fixture(tree_runner(), None);
        assert!(fx.explorer.children(None).await.is_empty());
        assert!(fx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn children_link_back_to_their_parent() {
        let fx = fixture(tree_runner(), Some("project-1"));
        let roots = fx.explorer.children(None).await;
        assert_eq!(roots.len(), 2);
        let reads = fx.explorer.node(roots[0]).unwrap();
        assert!(reads.is_container);
        assert_eq!(reads.full_path(), "project-1:/reads");

        let kids = fx.explorer.children(Some(roots[0])).await;
        let r1 = fx.explorer.node(kids[0]).unwrap();
        assert_eq!(r1.path, "/reads/r1.fq");
        assert_eq!(r1.parent, Some(roots[0]));
        assert_eq!(
            fx.runner.lines()[1],
            "ls --verbose --delimiter ;; project-1:/reads"
        );
    }

    #[tokio::test]
    async fn project_switch_invalidates_nodes() {
        let fx = fixture(tree_runner(), Some("project-1"));
        let roots = fx.explorer.children(None).await;
        fx.state.set(Some("project-2")).unwrap();
        assert!(fx.explorer.node(roots[0]).is_none());
    }

    #[tokio::test]
    async fn listing_failure_shows_empty_folder() {
        let fx = fixture(
            RecordingRunner::new(|_| Err(crate::test_support::exit_error("boom"))),
            Some("project-1"),
        );
        assert!(fx.explorer.children(None).await.is_empty());
    }

    #[tokio::test]
    async fn create_folder_validates_and_qualifies() {
        let fx = fixture(RecordingRunner::text(""), Some("project-1"));
        assert!(fx.explorer.create_folder("/", "a/b").await.is_err());
        assert!(fx.explorer.create_folder("/", "   ").await.is_err());
        let path = fx.explorer.create_folder("/reads", " new ").await.unwrap();
        assert_eq!(path, "/reads/new");
        assert_eq!(fx.runner.lines(), ["mkdir -p project-1:/reads/new"]);
        assert_eq!(fx.notifier.notices().len(), 3);
    }

    #[tokio::test]
    async fn delete_file_uses_project_path() {
        let fx = fixture(RecordingRunner::text(""), Some("project-1"));
        let node = file_node("r1.fq", "/reads/r1.fq", "file-r1");
        let outcome = fx.explorer.delete(&node, &OpContext::detached()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(fx.runner.lines(), ["rm project-1:/reads/r1.fq"]);
        assert_eq!(
            fx.notifier.notices(),
            [Notice::Info("Successfully deleted file 'r1.fq'".into())]
        );
    }

    #[tokio::test]
    async fn rename_rules() {
        let fx = fixture(RecordingRunner::text(""), Some("project-1"));
        let node = file_node("r1.fq", "/reads/r1.fq", "file-r1");

        assert!(!fx.explorer.rename(&node, "r1.fq").await.unwrap());
        assert!(fx.explorer.rename(&node, "x/y").await.is_err());
        assert!(fx.explorer.rename(&node, "sample1.fq").await.unwrap());
        assert_eq!(fx.runner.lines(), ["mv file-r1 sample1.fq"]);
    }

    #[test]
    fn move_targets_end_with_slash() {
        let sources = vec!["/a.txt".to_string(), "/b.txt".to_string()];
        assert_eq!(
            move_args(Some("project-1"), &sources, "/dest", true),
            ["mv", "--parents", "project-1:/a.txt", "project-1:/b.txt", "project-1:/dest/"]
        );
        assert_eq!(move_args(None, &sources[..1], "/", false), ["mv", "/a.txt", "/"]);
    }

    #[tokio::test]
    async fn folders_are_rooted_and_sorted() {
        let fx = fixture(
            RecordingRunner::json(json!([
                {"id": "file-1", "folder": "/b"},
                {"id": "file-2", "folder": "/a"},
                {"id": "file-3", "folder": "/a"},
                {"folder": "/ignored"},
            ])),
            Some("project-1"),
        );
        assert_eq!(fx.explorer.folders().await, ["/", "/a", "/b"]);
        assert_eq!(fx.runner.lines(), ["ls -l project-1: --folders --json"]);

        let none = fixture(RecordingRunner::text(""), None);
        assert_eq!(none.explorer.folders().await, ["/"]);
    }

    #[tokio::test]
    async fn download_refuses_folders() {
        let fx = fixture(RecordingRunner::text(""), Some("project-1"));
        let mut node = file_node("reads", "/reads", "x");
        node.is_container = true;
        let err = fx.explorer.download(&node, Path::new("/tmp")).await.unwrap_err();
        assert!(matches!(err, DxError::InvalidInput(_)));
        assert!(fx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn describe_is_written_to_staging() {
        let fx = fixture(RecordingRunner::json(json!({"id": "file-1", "size": 3})), Some("project-1"));
        let path = fx.explorer.describe("file-1").await.unwrap();
        assert_eq!(path, fx.staging.path().join("file-describe.json"));
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["size"], 3);
    }

    #[tokio::test]
    async fn large_files_are_not_previewed() {
        let fx = fixture(
            RecordingRunner::json(json!({"size": MAX_PREVIEW_BYTES + 1})),
            Some("project-1"),
        );
        let node = file_node("big.txt", "/big.txt", "file-big");
        assert!(fx.explorer.preview(&node).await.is_err());
        assert_eq!(fx.runner.lines(), ["describe file-big"]);
    }

    #[tokio::test]
    async fn cached_preview_skips_download() {
        let fx = fixture(RecordingRunner::json(json!({"size": 10})), Some("project-1"));
        let node = file_node("notes.md", "/docs/notes.md", "file-n");
        let cached = fx.staging.path().join("project-1/docs");
        std::fs::create_dir_all(&cached).unwrap();
        std::fs::write(cached.join("notes.md"), "# hi").unwrap();

        let preview = fx.explorer.preview(&node).await.unwrap();
        assert_eq!(preview.kind, PreviewKind::Markdown);
        assert_eq!(preview.path, cached.join("notes.md"));
        assert_eq!(fx.runner.lines(), ["describe file-n"]);
    }

    #[tokio::test]
    async fn missing_download_output_is_an_error() {
        let fx = fixture(RecordingRunner::json(json!({"size": 10})), Some("project-1"));
        let node = file_node("plot.png", "/plot.png", "file-p");
        let err = fx.explorer.preview(&node).await.unwrap_err();
        assert!(err.to_string().contains("Download did not produce expected file"));
        let lines = fx.runner.lines();
        assert!(lines[1].starts_with("download file-p -o "));
        assert!(lines[1].ends_with("--overwrite"));
    }

    #[test]
    fn preview_kinds() {
        assert_eq!(PreviewKind::for_extension(Some("jpeg")), PreviewKind::Image);
        assert_eq!(PreviewKind::for_extension(Some("ipynb")), PreviewKind::Notebook);
        assert_eq!(PreviewKind::for_extension(None), PreviewKind::Text);
    }
}
