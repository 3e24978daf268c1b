use crate::listing::ListingEntry;

/// Handle to a node of one tree generation. Handles from an earlier
/// generation resolve to nothing once the arena is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    generation: u64,
    index: usize,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index
    }

    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// A file or folder as shown in the file tree. Folders carry no remote id and
/// are addressed by path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: Option<String>,
    pub name: String,
    pub path: String,
    pub is_container: bool,
    pub project_id: Option<String>,
    pub extension: Option<String>,
    pub parent: Option<NodeId>,
}

impl RemoteNode {
    pub fn from_entry(entry: ListingEntry, project_id: &str, parent: Option<NodeId>) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            path: entry.path,
            is_container: entry.is_folder,
            project_id: Some(project_id.to_string()),
            extension: entry.extension,
            parent,
        }
    }

    /// `project:path` when the node is project-scoped, the bare path otherwise.
    pub fn full_path(&self) -> String {
        match self.project_id.as_deref() {
            Some(project) => format!("{project}:{}", self.path),
            None => self.path.clone(),
        }
    }

    /// Remote id for files, full path for folders.
    pub fn handle(&self) -> String {
        match self.id.as_deref() {
            Some(id) if !self.is_container => id.to_string(),
            _ => self.full_path(),
        }
    }

    /// Project-relative path of the containing folder.
    pub fn folder(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &self.path[..idx],
        }
    }
}

/// Flat node table for the current tree generation. Nodes are never mutated
/// after insertion; `clear` drops them all and starts a new generation.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<RemoteNode>,
    generation: u64,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn id_at(&self, index: usize) -> NodeId {
        NodeId {
            generation: self.generation,
            index,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn insert(&mut self, node: RemoteNode) -> NodeId {
        self.nodes.push(node);
        self.id_at(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&RemoteNode> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get(id.index)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent)
    }

    /// Parent chain from the immediate parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if out.contains(&parent) {
                break;
            }
            out.push(parent);
            current = self.parent(parent);
        }
        out
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .rposition(|node| node.path == path)
            .map(|index| self.id_at(index))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.generation += 1;
    }
}
