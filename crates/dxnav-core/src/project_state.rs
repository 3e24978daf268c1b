use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dxnav_util::write_json_atomic;

/// Durable slot for the active project id.
pub trait ProjectStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, project_id: Option<&str>) -> io::Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PersistedProject {
    active_project_id: Option<String>,
}

/// One JSON file per workspace under the state directory.
#[derive(Clone, Debug)]
pub struct JsonProjectStore {
    path: PathBuf,
}

impl JsonProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_workspace(workspace: &Path) -> Self {
        Self::new(dxnav_util::workspace_state_path(workspace))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectStore for JsonProjectStore {
    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str::<PersistedProject>(&data) {
                Ok(state) => state.active_project_id,
                Err(err) => {
                    warn!("Failed to parse {}: {err}", self.path.display());
                    None
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", self.path.display());
                }
                None
            }
        }
    }

    fn save(&self, project_id: Option<&str>) -> io::Result<()> {
        write_json_atomic(
            &self.path,
            &PersistedProject {
                active_project_id: project_id.map(str::to_string),
            },
        )
    }
}

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    value: Mutex<Option<String>>,
}

impl MemoryProjectStore {
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            value: Mutex::new(initial.map(str::to_string)),
        }
    }
}

impl ProjectStore for MemoryProjectStore {
    fn load(&self) -> Option<String> {
        self.value.lock().ok().and_then(|v| v.clone())
    }

    fn save(&self, project_id: Option<&str>) -> io::Result<()> {
        let mut slot = self
            .value
            .lock()
            .map_err(|_| io::Error::other("project store lock poisoned"))?;
        *slot = project_id.map(str::to_string);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(Option<&str>) + Send + Sync>;

struct Current {
    project_id: Option<String>,
    generation: u64,
}

/// The project every file and job query is scoped to.
///
/// Constructed once by the front-end and shared as `Arc<ActiveProject>`.
/// Every effective change bumps a generation counter; callers capture it
/// before a slow query and drop the result if `is_current` no longer holds.
pub struct ActiveProject {
    store: Box<dyn ProjectStore>,
    current: Mutex<Current>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl ActiveProject {
    pub fn new(store: Box<dyn ProjectStore>) -> Self {
        let project_id = store.load();
        info!(
            "Active project initialized: {}",
            project_id.as_deref().unwrap_or("none")
        );
        Self {
            store,
            current: Mutex::new(Current {
                project_id,
                generation: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn in_memory(initial: Option<&str>) -> Self {
        Self::new(Box::new(MemoryProjectStore::new(initial)))
    }

    fn lock_current(&self) -> MutexGuard<'_, Current> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Option<String> {
        self.lock_current().project_id.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock_current().generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Persists and broadcasts a new value. Setting the current value again
    /// does nothing and returns `Ok(false)`.
    pub fn set(&self, project_id: Option<&str>) -> io::Result<bool> {
        {
            let mut current = self.lock_current();
            if current.project_id.as_deref() == project_id {
                return Ok(false);
            }
            info!("Setting active project to {}", project_id.unwrap_or("none"));
            self.store.save(project_id)?;
            current.project_id = project_id.map(str::to_string);
            current.generation += 1;
        }

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(project_id);
        }
        Ok(true)
    }

    /// Listeners run synchronously, in registration order, on the thread
    /// that called `set`.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, Arc::new(listener)));
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(existing, _)| *existing != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }
}
