use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use serde::Serialize;

use crate::commands::archive::{
    extract_and_filter_archive, filtered_entries, list_entries, package_project_files,
    text_entries, WP_CONTENT_PREFIX,
};
use crate::commands::config::WpaiConfig;
use crate::commands::repository::{ChatMessage, ProjectRepository, ProjectUpdate};
use crate::commands::runtime::{ensure_parent_dirs, SandboxRuntime, DOCUMENT_ROOT};
use crate::commands::sanitize::PROJECT_ROOT_MARKERS;
use crate::commands::store::SharedStore;
use crate::commands::upload::ArchiveUploader;
use crate::error::{Result, WpaiError};
use crate::util::now_millis;

/// Storage rejects archives above this size, so downloads stop there too.
pub const MAX_ARCHIVE_BYTES: u64 = 50 * 1024 * 1024;

/// What the user asked to save.
#[derive(Clone, Debug)]
pub struct SaveRequest {
    pub project_id: String,
    pub customer_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedProject {
    pub project_id: String,
    pub content_url: String,
    pub share_link: String,
    pub text_files: usize,
}

/// Exports the live site's `wp-content`, or fails if it holds no files.
async fn export_wp_content(runtime: &dyn SandboxRuntime) -> Result<Vec<u8>> {
    let exported = runtime.export_wp_content().await?;
    tracing::debug!("Exported {} bytes from the sandbox", exported.len());
    let filtered = extract_and_filter_archive(&exported, WP_CONTENT_PREFIX, None)?;
    if list_entries(&filtered)?.is_empty() {
        return Err(WpaiError::EmptyArchive("No wp-content files found".into()));
    }
    Ok(filtered)
}

/// Saves the live site and chat, returning a link others can open.
///
/// The project row is only touched after the upload succeeded, so a failed
/// save leaves the previously saved state as it was.
pub async fn save_and_share(
    runtime: &dyn SandboxRuntime,
    uploader: &dyn ArchiveUploader,
    repository: &dyn ProjectRepository,
    config: &WpaiConfig,
    request: SaveRequest,
) -> Result<SharedProject> {
    let SaveRequest {
        project_id,
        customer_id,
        messages,
    } = request;

    let project = repository.get_project(&project_id).await?;
    let archive = export_wp_content(runtime).await?;
    let code = text_entries(&archive, WP_CONTENT_PREFIX)?;
    let text_files = code.len();

    let content_url = uploader.upload(archive, &customer_id, &project_id).await?;

    let update = ProjectUpdate {
        name: project.name,
        customer_id,
        updated_at: chrono::Utc::now().to_rfc3339(),
        messages,
        code,
        content_url: content_url.clone(),
    };
    repository.update_project(&project_id, &update).await?;

    let share_link = config.share_link(&project_id);
    tracing::info!("Shared project {project_id} at {share_link}");
    Ok(SharedProject {
        project_id,
        content_url,
        share_link,
        text_files,
    })
}

/// Deletes a project, removing its stored archive first when it has one.
///
/// A failed storage delete leaves the row in place so it can be retried.
pub async fn delete_project(
    uploader: &dyn ArchiveUploader,
    repository: &dyn ProjectRepository,
    project_id: &str,
) -> Result<()> {
    let project = repository.get_project(project_id).await?;
    if project.content_url.is_some() {
        uploader.delete(&project.customer_id, project_id).await?;
    }
    repository.delete_project(project_id).await
}

/// Writes the live site's `wp-content` as `wp-content.zip` into `dir`.
pub async fn download_wp_content(runtime: &dyn SandboxRuntime, dir: &Path) -> Result<PathBuf> {
    let archive = export_wp_content(runtime).await?;
    write_download(dir, "wp-content.zip", &archive).await
}

/// Packages a generated project as `<slug>.zip` in `dir`.
pub async fn download_project(store: &SharedStore, slug: &str, dir: &Path) -> Result<PathBuf> {
    let archive = {
        let store = store.lock().await;
        let project = store.get(slug).ok_or_else(|| WpaiError::NotFound {
            slug: slug.to_string(),
        })?;
        package_project_files(&project.files, &PROJECT_ROOT_MARKERS)?
    };
    write_download(dir, &format!("{slug}.zip"), &archive).await
}

async fn write_download(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

/// Downloads a previously shared archive, bypassing caches.
pub async fn fetch_shared_archive(client: &reqwest::Client, content_url: &str) -> Result<Vec<u8>> {
    let url = cache_busted(content_url, now_millis());
    let response = client.get(&url).send().await?;
    check_download_status(response.status(), content_url)?;
    read_capped(response.bytes_stream(), MAX_ARCHIVE_BYTES).await
}

fn check_download_status(status: reqwest::StatusCode, content_url: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(WpaiError::Custom(format!(
        "Failed to download shared project: HTTP {status} from {content_url}"
    )))
}

/// Collects a byte stream, failing as soon as it grows past `limit`.
async fn read_capped<S, B, E>(mut stream: S, limit: u64) -> Result<Vec<u8>>
where
    S: futures_util::Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<WpaiError>,
{
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::<WpaiError>::into)?;
        let chunk = chunk.as_ref();
        if bytes.len() as u64 + chunk.len() as u64 > limit {
            return Err(WpaiError::Custom(format!(
                "Shared project exceeds {} MB",
                limit / (1024 * 1024)
            )));
        }
        bytes.extend_from_slice(chunk);
    }
    Ok(bytes)
}

/// Writes the `wp-content/` entries of a shared archive into the live site.
///
/// Returns how many files were written. An archive without content files is
/// an [`WpaiError::EmptyArchive`]; the first failed write stops the restore.
pub async fn restore_archive(runtime: &dyn SandboxRuntime, archive: &[u8]) -> Result<usize> {
    let entries = filtered_entries(archive, WP_CONTENT_PREFIX, None)?;
    if entries.is_empty() {
        return Err(WpaiError::EmptyArchive(
            "Shared project has no wp-content files".into(),
        ));
    }

    for (name, bytes) in &entries {
        let path = format!("{DOCUMENT_ROOT}/{name}");
        let to_write_error = |e: WpaiError| WpaiError::ExternalWrite {
            path: path.clone(),
            message: e.to_string(),
        };
        ensure_parent_dirs(runtime, &path)
            .await
            .map_err(to_write_error)?;
        runtime
            .write_bytes(&path, bytes)
            .await
            .map_err(to_write_error)?;
    }
    tracing::info!("Restored {} files into the sandbox", entries.len());
    Ok(entries.len())
}

/// Loads a shared project's saved site into the sandbox.
pub async fn restore_shared(
    client: &reqwest::Client,
    runtime: &dyn SandboxRuntime,
    content_url: &str,
) -> Result<usize> {
    let archive = fetch_shared_archive(client, content_url).await?;
    restore_archive(runtime, &archive).await
}

fn cache_busted(url: &str, millis: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}time={millis}")
}
