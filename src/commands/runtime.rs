//! The in-browser WordPress sandbox, seen from this crate.
//!
//! The live site owns its own filesystem. Everything here talks to it through
//! [`SandboxRuntime`], which callers inject; nothing reaches for a global client.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::commands::archive::write_archive;
use crate::error::{Result, WpaiError};
use crate::util::segments;

/// Root of the WordPress install inside the sandbox filesystem.
pub const DOCUMENT_ROOT: &str = "/wordpress";

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Writes raw bytes, for restored uploads and other binary content.
    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Creates a directory. Implementations may report an existing one as an
    /// error mentioning "already exists"; callers tolerate that.
    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn get_current_url(&self) -> Result<String>;

    async fn go_to(&self, url: &str) -> Result<()>;

    /// Zips the site's content directory; entries are rooted at `wp-content/`.
    async fn export_wp_content(&self) -> Result<Vec<u8>>;

    /// Runs a PHP script inside the site and returns what it printed.
    async fn run_php(&self, code: &str) -> Result<String>;
}

/// True for the "directory already exists" failure `mkdir` may report.
pub fn is_already_exists(err: &WpaiError) -> bool {
    err.to_string().contains("already exists")
}

/// Creates every ancestor directory of `file_path`, outermost first.
pub async fn ensure_parent_dirs(runtime: &dyn SandboxRuntime, file_path: &str) -> Result<()> {
    let parts: Vec<&str> = segments(file_path).collect();
    let mut current = String::new();

    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(part);
        if let Err(e) = runtime.mkdir(&current).await {
            if !is_already_exists(&e) {
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Creates `path` itself, treating an existing directory as success.
pub async fn ensure_dir(runtime: &dyn SandboxRuntime, path: &str) -> Result<()> {
    match runtime.mkdir(path).await {
        Err(e) if !is_already_exists(&e) => Err(e),
        _ => Ok(()),
    }
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    current_url: String,
    visits: Vec<String>,
    failing: HashSet<String>,
    php_runs: Vec<String>,
    php_output: VecDeque<String>,
}

/// Sandbox runtime backed by an in-memory filesystem.
///
/// Behaves like the live one where it matters: `mkdir` on an existing
/// directory fails with "already exists", and writes need their parent
/// directory to exist. Writes to paths registered with
/// [`MemoryRuntime::fail_writes_to`] always fail. PHP is not executed: each
/// script is recorded and answered with the next output queued through
/// [`MemoryRuntime::queue_php_output`], or `{"ID":<run number>}` when none is.
pub struct MemoryRuntime {
    state: Mutex<MemoryState>,
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryRuntime {
    pub fn new(start_url: &str) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                current_url: start_url.to_string(),
                ..MemoryState::default()
            }),
        }
    }

    pub async fn fail_writes_to(&self, path: &str) {
        self.state.lock().await.failing.insert(normalize(path));
    }

    pub async fn queue_php_output(&self, output: &str) {
        self.state.lock().await.php_output.push_back(output.to_string());
    }

    /// Scripts passed to `run_php`, oldest first.
    pub async fn php_runs(&self) -> Vec<String> {
        self.state.lock().await.php_runs.clone()
    }

    /// Places raw bytes directly, creating parents.
    pub async fn put_bytes(&self, path: &str, bytes: Vec<u8>) {
        let path = normalize(path);
        let mut state = self.state.lock().await;
        let mut parent = parent_of(&path);
        while let Some(dir) = parent {
            state.dirs.insert(dir.to_string());
            parent = parent_of(dir);
        }
        state.files.insert(path, bytes);
    }

    pub async fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().await.files.get(&normalize(path)).cloned()
    }

    pub async fn file(&self, path: &str) -> Option<String> {
        let state = self.state.lock().await;
        let bytes = state.files.get(&normalize(path))?;
        String::from_utf8(bytes.clone()).ok()
    }

    pub async fn has_dir(&self, path: &str) -> bool {
        self.state.lock().await.dirs.contains(&normalize(path))
    }

    pub async fn file_paths(&self) -> Vec<String> {
        self.state.lock().await.files.keys().cloned().collect()
    }

    /// URLs navigated to, oldest first.
    pub async fn visits(&self) -> Vec<String> {
        self.state.lock().await.visits.clone()
    }
}

/// Absolute form of `path` with empty segments removed.
fn normalize(path: &str) -> String {
    format!("/{}", segments(path).collect::<Vec<_>>().join("/"))
}

fn parent_of(normalized: &str) -> Option<&str> {
    match normalized.rfind('/')? {
        0 => None,
        index => Some(&normalized[..index]),
    }
}

#[async_trait]
impl SandboxRuntime for MemoryRuntime {
    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.write_bytes(path, content.as_bytes()).await
    }

    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let normalized = normalize(path);
        let mut state = self.state.lock().await;
        if state.failing.contains(&normalized) {
            return Err(WpaiError::Custom(format!("Could not write {path}: quota exceeded")));
        }
        if let Some(parent) = parent_of(&normalized) {
            if !state.dirs.contains(parent) {
                return Err(WpaiError::Custom(format!(
                    "Could not write {path}: no such directory {parent}"
                )));
            }
        }
        state.files.insert(normalized, bytes.to_vec());
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let normalized = normalize(path);
        let mut state = self.state.lock().await;
        if let Some(parent) = parent_of(&normalized) {
            if !state.dirs.contains(parent) {
                return Err(WpaiError::Custom(format!("No such directory {parent}")));
            }
        }
        if !state.dirs.insert(normalized) {
            return Err(WpaiError::Custom(format!("Directory {path} already exists")));
        }
        Ok(())
    }

    async fn get_current_url(&self) -> Result<String> {
        Ok(self.state.lock().await.current_url.clone())
    }

    async fn go_to(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.current_url = url.to_string();
        state.visits.push(url.to_string());
        Ok(())
    }

    async fn export_wp_content(&self) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        let root = format!("{DOCUMENT_ROOT}/");
        write_archive(state.files.iter().filter_map(|(path, bytes)| {
            path.strip_prefix(&root)
                .map(|relative| (relative.to_string(), bytes.as_slice()))
        }))
    }

    async fn run_php(&self, code: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        state.php_runs.push(code.to_string());
        let run = state.php_runs.len();
        Ok(state
            .php_output
            .pop_front()
            .unwrap_or_else(|| format!(r#"{{"ID":{run}}}"#)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::archive::list_entries;

    #[tokio::test]
    async fn test_ensure_parent_dirs_tolerates_existing() {
        let runtime = MemoryRuntime::default();
        ensure_parent_dirs(&runtime, "/wordpress/wp-content/plugins/shop/shop.php")
            .await
            .unwrap();
        ensure_parent_dirs(&runtime, "/wordpress/wp-content/plugins/shop/inc/a.php")
            .await
            .unwrap();

        assert!(runtime.has_dir("/wordpress").await);
        assert!(runtime.has_dir("/wordpress/wp-content/plugins/shop/inc").await);
        assert!(!runtime.has_dir("/wordpress/wp-content/plugins/shop/shop.php").await);
    }

    #[tokio::test]
    async fn test_write_needs_parent() {
        let runtime = MemoryRuntime::default();
        assert!(runtime.write_file("/wordpress/a.php", "x").await.is_err());
        ensure_dir(&runtime, "/wordpress").await.unwrap();
        ensure_dir(&runtime, "/wordpress").await.unwrap();
        runtime.write_file("/wordpress/a.php", "x").await.unwrap();
        assert_eq!(runtime.file("/wordpress/a.php").await.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_mkdir_reports_already_exists() {
        let runtime = MemoryRuntime::default();
        runtime.mkdir("/wordpress").await.unwrap();
        let err = runtime.mkdir("/wordpress").await.unwrap_err();
        assert!(is_already_exists(&err));
    }

    #[tokio::test]
    async fn test_export_is_rooted_at_document_root() {
        let runtime = MemoryRuntime::default();
        runtime
            .put_bytes("/wordpress/wp-content/plugins/x/a.php", b"<?php".to_vec())
            .await;
        runtime.put_bytes("/wordpress/wp-config.php", b"<?php".to_vec()).await;
        runtime.put_bytes("/tmp/scratch", b"x".to_vec()).await;

        let bytes = runtime.export_wp_content().await.unwrap();
        assert_eq!(
            list_entries(&bytes).unwrap(),
            vec!["wp-config.php", "wp-content/plugins/x/a.php"]
        );
    }

    #[tokio::test]
    async fn test_navigation_is_recorded() {
        let runtime = MemoryRuntime::new("http://localhost/wp-admin/");
        let url = runtime.get_current_url().await.unwrap();
        runtime.go_to(&url).await.unwrap();
        assert_eq!(runtime.visits().await, vec!["http://localhost/wp-admin/"]);
    }

    #[tokio::test]
    async fn test_php_runs_are_recorded() {
        let runtime = MemoryRuntime::default();
        runtime.queue_php_output(r#"{"error":"nope"}"#).await;
        assert_eq!(runtime.run_php("<?php 1;").await.unwrap(), r#"{"error":"nope"}"#);
        assert_eq!(runtime.run_php("<?php 2;").await.unwrap(), r#"{"ID":2}"#);
        assert_eq!(runtime.php_runs().await, vec!["<?php 1;", "<?php 2;"]);
    }
}
