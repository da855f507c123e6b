use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

pub mod commands;
pub mod error;
pub mod templates;
pub mod util;

use commands::config::WpaiConfig;
use commands::generator::{GenerationRequest, PageContentRequest, ToolOutput};
use commands::pages::PageOutcome;
use commands::reconcile::{ReconcileEvent, ReconcileReport, Reconciler};
use commands::repository::ProjectRepository;
use commands::runtime::SandboxRuntime;
use commands::share::{SaveRequest, SharedProject};
use commands::store::{FileSetStore, SharedStore, StoreEvent};
use commands::tree::{CodeView, TreeNode};
use commands::upload::ArchiveUploader;
use error::Result;

/// Everything one browser session works with: the generated file sets, the
/// live sandbox they are mirrored into, and the code panel showing them.
pub struct Session {
    config: WpaiConfig,
    store: SharedStore,
    runtime: Arc<dyn SandboxRuntime>,
    reconciler: Reconciler,
    code_view: Mutex<CodeView>,
    http: reqwest::Client,
}

impl Session {
    pub fn new(config: WpaiConfig, runtime: Arc<dyn SandboxRuntime>) -> Self {
        let store = FileSetStore::shared();
        let reconciler = Reconciler::new(store.clone(), runtime.clone());
        Self {
            config,
            store,
            runtime,
            reconciler,
            code_view: Mutex::new(CodeView::default()),
            http: reqwest::Client::new(),
        }
    }

    /// Streams reconcile progress to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ReconcileEvent>) -> Self {
        self.reconciler = self.reconciler.with_events(events);
        self
    }

    pub fn config(&self) -> &WpaiConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.lock().await.subscribe()
    }

    /// Applies a finished tool call. Failed tool outputs are ignored.
    pub async fn apply_tool_output(
        &self,
        args: &GenerationRequest,
        output_json: &str,
    ) -> Result<Option<ReconcileReport>> {
        let Some(result) = ToolOutput::parse(output_json)?.into_result(args) else {
            tracing::debug!("Tool output for {:?} carried no files", args.name);
            return Ok(None);
        };
        self.reconciler.reconcile(result).await.map(Some)
    }

    /// Publishes the pages from a finished page-content tool call.
    pub async fn apply_page_content(&self, output_json: &str) -> Result<Vec<PageOutcome>> {
        let content = PageContentRequest::parse(output_json)?;
        Ok(commands::pages::publish_pages(self.runtime.as_ref(), &content).await)
    }

    /// Rebuilds the code panel from every project's files.
    pub async fn open_code_view(&self) -> Option<TreeNode> {
        let files = self.store.lock().await.all_files();
        let mut view = self.code_view.lock().await;
        view.open(files);
        view.tree().cloned()
    }

    pub async fn toggle_directory(&self, path: &str) -> Option<TreeNode> {
        let mut view = self.code_view.lock().await;
        view.toggle(path);
        view.tree().cloned()
    }

    pub async fn select_file(&self, path: &str) -> Option<String> {
        let mut view = self.code_view.lock().await;
        view.select(path);
        view.selected_content().map(str::to_string)
    }

    pub async fn download_project(&self, slug: &str) -> Result<PathBuf> {
        let _guard = self.reconciler.locks().acquire(slug).await;
        commands::share::download_project(&self.store, slug, &self.config.download_path()).await
    }

    pub async fn download_wp_content(&self) -> Result<PathBuf> {
        commands::share::download_wp_content(self.runtime.as_ref(), &self.config.download_path())
            .await
    }

    pub async fn save_and_share(
        &self,
        uploader: &dyn ArchiveUploader,
        repository: &dyn ProjectRepository,
        request: SaveRequest,
    ) -> Result<SharedProject> {
        commands::share::save_and_share(
            self.runtime.as_ref(),
            uploader,
            repository,
            &self.config,
            request,
        )
        .await
    }

    /// Deletes a saved project and its stored archive.
    pub async fn delete_project(
        &self,
        uploader: &dyn ArchiveUploader,
        repository: &dyn ProjectRepository,
        project_id: &str,
    ) -> Result<()> {
        commands::share::delete_project(uploader, repository, project_id).await
    }

    /// Loads a shared project's saved site from `content_url` into the sandbox.
    pub async fn restore_shared(&self, content_url: &str) -> Result<usize> {
        commands::share::restore_shared(&self.http, self.runtime.as_ref(), content_url).await
    }
}
