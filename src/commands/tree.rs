use serde::Serialize;

use crate::commands::sanitize::PROJECT_ROOT_MARKERS;
use crate::commands::store::FileEntry;
use crate::util::segments;

/// Name carried by the root node; its path is always empty.
pub const ROOT_NAME: &str = "root";

/// Directory/file tree derived from a flat file list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub is_directory: bool,
    pub path: String,
    pub children: Vec<TreeNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub expanded: bool,
}

impl TreeNode {
    fn root() -> Self {
        Self {
            name: ROOT_NAME.to_string(),
            is_directory: true,
            path: String::new(),
            children: Vec::new(),
            content: None,
            expanded: true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty() && self.name == ROOT_NAME
    }

    /// Builds a tree whose children appear in the order they were first seen.
    ///
    /// Empty path segments are dropped, so leading, trailing and doubled
    /// slashes all land on the same node. A file and a directory may share a
    /// name; they stay separate siblings.
    pub fn build(files: &[FileEntry]) -> Self {
        let mut root = Self::root();

        for file in files {
            let parts: Vec<&str> = segments(&file.path).collect();
            let mut node = &mut root;

            for (i, part) in parts.iter().enumerate() {
                let is_last = i == parts.len() - 1;
                let index = match node
                    .children
                    .iter()
                    .position(|c| c.name == *part && c.is_directory == !is_last)
                {
                    Some(index) => index,
                    None => {
                        node.children.push(Self {
                            name: part.to_string(),
                            is_directory: !is_last,
                            path: parts[..=i].join("/"),
                            children: Vec::new(),
                            content: None,
                            expanded: false,
                        });
                        node.children.len() - 1
                    }
                };
                node = &mut node.children[index];
                if is_last {
                    node.content = Some(file.content.clone());
                }
            }
        }

        root
    }

    /// Returns a copy with the `expanded` flag of the node at `path` flipped.
    ///
    /// An unknown path (or the root itself) leaves the copy unchanged.
    pub fn toggle(&self, path: &str) -> Self {
        let mut next = self.clone();
        if let Some(node) = next.find_mut(path) {
            if !node.is_root() {
                node.expanded = !node.expanded;
            }
        }
        next
    }

    /// Node at `path`. When a directory and a file share the path, the
    /// directory is returned; use [`TreeNode::find_file`] for the file.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        self.find_kind(path, true)
            .or_else(|| self.find_kind(path, false))
    }

    pub fn find_file(&self, path: &str) -> Option<&TreeNode> {
        self.find_kind(path, false)
    }

    fn find_kind(&self, path: &str, is_directory: bool) -> Option<&TreeNode> {
        if self.path == path && self.is_directory == is_directory {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|c| c.find_kind(path, is_directory))
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut TreeNode> {
        let is_directory = self.find_kind(path, true).is_some();
        self.find_kind_mut(path, is_directory)
    }

    fn find_kind_mut(&mut self, path: &str, is_directory: bool) -> Option<&mut TreeNode> {
        if self.path == path && self.is_directory == is_directory {
            return Some(self);
        }
        for child in self.children.iter_mut() {
            if let Some(found) = child.find_kind_mut(path, is_directory) {
                return Some(found);
            }
        }
        None
    }

    /// Every file node as a `FileEntry`, depth first in tree order.
    pub fn flatten(&self) -> Vec<FileEntry> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files(&self, out: &mut Vec<FileEntry>) {
        if !self.is_directory {
            out.push(FileEntry::new(
                self.path.clone(),
                self.content.clone().unwrap_or_default(),
            ));
        }
        for child in &self.children {
            child.collect_files(out);
        }
    }
}

/// State behind the code panel: the flat file list, its tree and the selection.
#[derive(Clone, Debug, Default)]
pub struct CodeView {
    files: Vec<FileEntry>,
    tree: Option<TreeNode>,
    selected: Option<String>,
}

impl CodeView {
    /// Replaces everything with a fresh tree and selects the first file.
    ///
    /// Expansion state does not survive this; only [`CodeView::toggle`] keeps it.
    pub fn open(&mut self, files: Vec<FileEntry>) {
        self.tree = Some(TreeNode::build(&files));
        self.selected = files.first().map(|f| f.path.clone());
        self.files = files;
    }

    pub fn tree(&self) -> Option<&TreeNode> {
        self.tree.as_ref()
    }

    pub fn toggle(&mut self, path: &str) {
        if let Some(tree) = &self.tree {
            self.tree = Some(tree.toggle(path));
        }
    }

    pub fn select(&mut self, path: &str) {
        self.selected = Some(path.to_string());
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Content of the selection, looked up in the flat list first, then the tree.
    pub fn selected_content(&self) -> Option<&str> {
        let selected = self.selected.as_deref()?;
        if let Some(file) = self.files.iter().find(|f| f.path == selected) {
            return Some(&file.content);
        }
        self.tree
            .as_ref()?
            .find_file(selected)
            .and_then(|n| n.content.as_deref())
    }
}

/// Trims a path to start at its `plugins`/`themes` segment for display.
pub fn display_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.iter().position(|p| PROJECT_ROOT_MARKERS.contains(p)) {
        Some(index) => parts[index..].join("/"),
        None => path.to_string(),
    }
}

/// Syntax highlighter language for a file path.
pub fn language_for_path(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "php" => "php",
        "js" => "javascript",
        "css" => "css",
        "html" => "html",
        "json" => "json",
        _ => "text",
    }
}
