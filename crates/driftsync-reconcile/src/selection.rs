//! Selective sync tree
//!
//! Folder-selection overlay deciding which parts of the tree are eligible
//! for transfer scheduling. Explicit selection changes propagate top-down
//! over the whole subtree; afterwards ancestors normalize bottom-up so a
//! folder with any selected child stays selected (mixed selection is
//! transient UI state, never persisted here).

use std::collections::BTreeMap;

use driftsync_core::domain::LocalPath;
use tracing::debug;

use crate::error::ReconcileError;

/// One folder in the selection overlay
#[derive(Debug, Clone)]
pub struct FolderNode {
    selected: bool,
    /// Descendant-inclusive byte total of tracked content
    aggregate_size: u64,
    children: BTreeMap<String, FolderNode>,
}

impl FolderNode {
    fn new(selected: bool) -> Self {
        Self {
            selected,
            aggregate_size: 0,
            children: BTreeMap::new(),
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn aggregate_size(&self) -> u64 {
        self.aggregate_size
    }

    fn set_subtree(&mut self, selected: bool) {
        self.selected = selected;
        for child in self.children.values_mut() {
            child.set_subtree(selected);
        }
    }

    fn collect_selected(&self, base: &LocalPath, out: &mut Vec<LocalPath>) {
        if !self.selected {
            return;
        }
        out.push(base.clone());
        for (name, child) in &self.children {
            if let Ok(path) = base.join(name) {
                child.collect_selected(&path, out);
            }
        }
    }
}

/// Selection overlay rooted at the sync root
#[derive(Debug, Clone)]
pub struct SelectiveSyncTree {
    root_path: LocalPath,
    root: FolderNode,
}

impl SelectiveSyncTree {
    /// A new tree with everything selected
    pub fn new(root_path: LocalPath) -> Self {
        Self {
            root_path,
            root: FolderNode::new(true),
        }
    }

    pub fn root_path(&self) -> &LocalPath {
        &self.root_path
    }

    /// Folder-name components of `path` relative to the root
    fn components(&self, path: &LocalPath) -> Result<Vec<String>, ReconcileError> {
        if !path.is_within(&self.root_path) {
            return Err(ReconcileError::OutsideRoot(path.to_string()));
        }
        let relative = path
            .as_ref()
            .strip_prefix(self.root_path.as_ref())
            .map_err(|_| ReconcileError::OutsideRoot(path.to_string()))?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect())
    }

    /// Explicitly selects or deselects the folder at `path`
    ///
    /// The flag propagates to the entire subtree; ancestors then normalize
    /// so any selected descendant keeps its ancestors selected.
    pub fn set_selected(&mut self, path: &LocalPath, selected: bool) -> Result<(), ReconcileError> {
        let components = self.components(path)?;
        debug!(path = %path, selected, "selection change");

        // Descend, creating missing nodes with the selection state they
        // inherit from their parent.
        let mut node = &mut self.root;
        for name in &components {
            let inherited = node.selected;
            node = node
                .children
                .entry(name.clone())
                .or_insert_with(|| FolderNode::new(inherited));
        }
        node.set_subtree(selected);

        // Bottom-up normalization along the touched spine.
        Self::normalize(&mut self.root, &components);
        Ok(())
    }

    /// Re-selects any ancestor of a selected node, leaf-first
    fn normalize(node: &mut FolderNode, components: &[String]) -> bool {
        if let Some((head, rest)) = components.split_first() {
            if let Some(child) = node.children.get_mut(head) {
                if Self::normalize(child, rest) {
                    node.selected = true;
                }
            }
        }
        node.selected || node.children.values().any(|c| c.selected)
    }

    /// Whether `path` (file or folder) is eligible for transfer scheduling
    ///
    /// The deepest folder node along the path decides; paths outside the
    /// root are never eligible.
    pub fn is_eligible(&self, path: &LocalPath) -> bool {
        let Ok(components) = self.components(path) else {
            return false;
        };
        let mut node = &self.root;
        for name in &components {
            match node.children.get(name) {
                Some(child) => node = child,
                // Unmapped folders inherit the nearest tracked ancestor.
                None => break,
            }
        }
        node.selected
    }

    /// The closed set of selected folder paths, root first
    pub fn selected_paths(&self) -> Vec<LocalPath> {
        let mut out = Vec::new();
        self.root.collect_selected(&self.root_path, &mut out);
        out
    }

    /// Adds a file's bytes to its containing folder and every ancestor
    pub fn add_size(&mut self, file: &LocalPath, bytes: u64) -> Result<(), ReconcileError> {
        self.adjust_size(file, bytes as i128)
    }

    /// Removes a file's bytes from its containing folder and every ancestor
    pub fn subtract_size(&mut self, file: &LocalPath, bytes: u64) -> Result<(), ReconcileError> {
        self.adjust_size(file, -(bytes as i128))
    }

    fn adjust_size(&mut self, file: &LocalPath, delta: i128) -> Result<(), ReconcileError> {
        let mut components = self.components(file)?;
        // The last component names the file itself; only folders get nodes.
        components.pop();
        let mut node = &mut self.root;
        node.aggregate_size = apply_delta(node.aggregate_size, delta);
        for name in &components {
            let inherited = node.selected;
            node = node
                .children
                .entry(name.clone())
                .or_insert_with(|| FolderNode::new(inherited));
            node.aggregate_size = apply_delta(node.aggregate_size, delta);
        }
        Ok(())
    }

    /// Descendant-inclusive size of the folder at `path`
    pub fn aggregate_size(&self, path: &LocalPath) -> u64 {
        let Ok(components) = self.components(path) else {
            return 0;
        };
        let mut node = &self.root;
        for name in &components {
            match node.children.get(name) {
                Some(child) => node = child,
                None => return 0,
            }
        }
        node.aggregate_size
    }
}

fn apply_delta(current: u64, delta: i128) -> u64 {
    let next = current as i128 + delta;
    next.max(0) as u64
}
