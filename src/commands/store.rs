use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::error::{Result, WpaiError};
use crate::util::is_blank_path;

/// One generated source file. Content is always UTF-8 text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(rename = "code")]
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Plugin,
    Theme,
}

impl ProjectKind {
    /// Directory under `wp-content` that holds this kind of project.
    pub fn content_dir(self) -> &'static str {
        match self {
            ProjectKind::Plugin => "plugins",
            ProjectKind::Theme => "themes",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProjectKind::Plugin => "plugin",
            ProjectKind::Theme => "theme",
        }
    }
}

/// Descriptive fields used when a project is first created.
#[derive(Clone, Debug)]
pub struct ProjectMeta {
    pub kind: ProjectKind,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub kind: ProjectKind,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub files: Vec<FileEntry>,
    pub last_modified: DateTime<Utc>,
}

impl Project {
    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Change notifications for anything rendering the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum StoreEvent {
    Created { slug: String },
    Updated { slug: String, paths: Vec<String> },
    Removed { slug: String },
}

pub type SharedStore = Arc<Mutex<FileSetStore>>;

/// In-memory file sets for every project generated during a session.
///
/// Projects keep their creation order and files keep the order in which their
/// path was first seen; replacing a file's content never moves it.
pub struct FileSetStore {
    projects: Vec<Project>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for FileSetStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            projects: Vec::new(),
            events,
        }
    }
}

impl FileSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Returns the project for `slug`, creating an empty one from `meta` first if needed.
    pub fn create_or_get(&mut self, slug: &str, meta: ProjectMeta) -> &Project {
        let index = match self.position(slug) {
            Some(i) => i,
            None => {
                self.projects.push(Project {
                    kind: meta.kind,
                    name: meta.name,
                    slug: slug.to_string(),
                    description: meta.description,
                    files: Vec::new(),
                    last_modified: Utc::now(),
                });
                tracing::debug!("Created project {slug}");
                self.notify(StoreEvent::Created {
                    slug: slug.to_string(),
                });
                self.projects.len() - 1
            }
        };
        &self.projects[index]
    }

    /// Inserts or replaces each incoming file by exact path; other files are untouched.
    ///
    /// Entries whose path has no non-empty segment are dropped.
    pub fn merge_files(&mut self, slug: &str, incoming: Vec<FileEntry>) -> Result<()> {
        let index = self.position(slug).ok_or_else(|| WpaiError::NotFound {
            slug: slug.to_string(),
        })?;
        let project = &mut self.projects[index];

        let mut paths = Vec::with_capacity(incoming.len());
        for file in incoming {
            if is_blank_path(&file.path) {
                tracing::warn!("Ignoring file with empty path {:?} in {slug}", file.path);
                continue;
            }
            paths.push(file.path.clone());
            match project.files.iter_mut().find(|f| f.path == file.path) {
                Some(existing) => existing.content = file.content,
                None => project.files.push(file),
            }
        }
        project.last_modified = Utc::now();

        self.notify(StoreEvent::Updated {
            slug: slug.to_string(),
            paths,
        });
        Ok(())
    }

    /// Drops a project. Unknown slugs are ignored.
    pub fn remove(&mut self, slug: &str) {
        if let Some(index) = self.position(slug) {
            self.projects.remove(index);
            self.notify(StoreEvent::Removed {
                slug: slug.to_string(),
            });
        }
    }

    pub fn get(&self, slug: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.slug == slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.position(slug).is_some()
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Every file of every project, in project order.
    pub fn all_files(&self) -> Vec<FileEntry> {
        self.projects
            .iter()
            .flat_map(|p| p.files.iter().cloned())
            .collect()
    }

    fn position(&self, slug: &str) -> Option<usize> {
        self.projects.iter().position(|p| p.slug == slug)
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> ProjectMeta {
        ProjectMeta {
            kind: ProjectKind::Plugin,
            name: name.into(),
            description: "test".into(),
        }
    }

    #[test]
    fn test_create_or_get_returns_existing() {
        let mut store = FileSetStore::new();
        store.create_or_get("shop", meta("Shop"));
        store.merge_files("shop", vec![FileEntry::new("a.php", "1")]).unwrap();

        let project = store.create_or_get("shop", meta("Other"));
        assert_eq!(project.name, "Shop");
        assert_eq!(project.files.len(), 1);
        assert_eq!(store.projects().len(), 1);
    }

    #[test]
    fn test_merge_is_last_write_wins_per_path() {
        let mut store = FileSetStore::new();
        store.create_or_get("shop", meta("Shop"));
        store
            .merge_files(
                "shop",
                vec![FileEntry::new("a.php", "a1"), FileEntry::new("b.php", "b1")],
            )
            .unwrap();
        store
            .merge_files(
                "shop",
                vec![FileEntry::new("b.php", "b2"), FileEntry::new("c.php", "c1")],
            )
            .unwrap();
        store
            .merge_files("shop", vec![FileEntry::new("b.php", "b2")])
            .unwrap();

        let project = store.get("shop").unwrap();
        let files: Vec<(&str, &str)> = project
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.content.as_str()))
            .collect();
        assert_eq!(files, vec![("a.php", "a1"), ("b.php", "b2"), ("c.php", "c1")]);
    }

    #[test]
    fn test_merge_duplicate_paths_in_one_batch() {
        let mut store = FileSetStore::new();
        store.create_or_get("shop", meta("Shop"));
        store
            .merge_files(
                "shop",
                vec![FileEntry::new("a.php", "first"), FileEntry::new("a.php", "second")],
            )
            .unwrap();
        let project = store.get("shop").unwrap();
        assert_eq!(project.files.len(), 1);
        assert_eq!(project.file("a.php").unwrap().content, "second");
    }

    #[test]
    fn test_merge_drops_blank_paths() {
        let mut store = FileSetStore::new();
        let mut rx = store.subscribe();
        store.create_or_get("shop", meta("Shop"));
        store
            .merge_files(
                "shop",
                vec![
                    FileEntry::new("", "oops"),
                    FileEntry::new("///", "oops2"),
                    FileEntry::new("shop.php", "ok"),
                ],
            )
            .unwrap();

        let paths: Vec<_> = store.all_files().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["shop.php"]);
        rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Updated {
                slug: "shop".into(),
                paths: vec!["shop.php".into()],
            }
        );
    }

    #[test]
    fn test_merge_unknown_slug_is_not_found() {
        let mut store = FileSetStore::new();
        let err = store
            .merge_files("missing", vec![FileEntry::new("a.php", "")])
            .unwrap_err();
        assert!(matches!(err, WpaiError::NotFound { slug } if slug == "missing"));
    }

    #[test]
    fn test_merge_updates_last_modified() {
        let mut store = FileSetStore::new();
        let created = store.create_or_get("shop", meta("Shop")).last_modified;
        store
            .merge_files("shop", vec![FileEntry::new("a.php", "")])
            .unwrap();
        assert!(store.get("shop").unwrap().last_modified >= created);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = FileSetStore::new();
        store.create_or_get("shop", meta("Shop"));
        store.remove("shop");
        store.remove("shop");
        store.remove("never-existed");
        assert!(store.get("shop").is_none());
        assert!(store.projects().is_empty());
    }

    #[test]
    fn test_all_files_in_project_order() {
        let mut store = FileSetStore::new();
        store.create_or_get("one", meta("One"));
        store.create_or_get("two", meta("Two"));
        store
            .merge_files("two", vec![FileEntry::new("two/x.php", "x")])
            .unwrap();
        store
            .merge_files("one", vec![FileEntry::new("one/y.php", "y")])
            .unwrap();
        let paths: Vec<_> = store.all_files().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["one/y.php", "two/x.php"]);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let mut store = FileSetStore::new();
        let mut rx = store.subscribe();
        store.create_or_get("shop", meta("Shop"));
        store
            .merge_files("shop", vec![FileEntry::new("a.php", "")])
            .unwrap();
        store.remove("shop");

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Created { slug: "shop".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Updated {
                slug: "shop".into(),
                paths: vec!["a.php".into()],
            }
        );
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Removed { slug: "shop".into() });
    }

    #[test]
    fn test_file_entry_uses_code_field_on_the_wire() {
        let json = serde_json::to_string(&FileEntry::new("a.php", "<?php")).unwrap();
        assert_eq!(json, r#"{"path":"a.php","code":"<?php"}"#);
    }
}
