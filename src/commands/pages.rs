use serde::{Deserialize, Serialize};

use crate::commands::generator::{Page, PageContentRequest};
use crate::commands::runtime::SandboxRuntime;
use crate::error::{Result, WpaiError};
use crate::templates;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum PageStatus {
    Published { id: u64 },
    Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutcome {
    pub slug: String,
    pub title: String,
    #[serde(flatten)]
    pub status: PageStatus,
}

/// What the upsert script prints: the saved post, or an error message.
#[derive(Deserialize)]
struct SavedPost {
    #[serde(rename = "ID")]
    id: Option<u64>,
    error: Option<String>,
}

/// Editor screen for a saved page, relative to the site root.
pub fn edit_url(id: u64) -> String {
    format!("/wp-admin/post.php?post={id}&action=edit")
}

/// Creates or updates every page in the live site, in order.
///
/// Pages are matched by slug. A page that fails is recorded and the rest
/// still run. Afterwards the preview opens the editor for the last page saved.
pub async fn publish_pages(
    runtime: &dyn SandboxRuntime,
    content: &PageContentRequest,
) -> Vec<PageOutcome> {
    let mut outcomes = Vec::with_capacity(content.pages.len());
    let mut last_saved = None;

    for page in &content.pages {
        let status = match save_page(runtime, page).await {
            Ok(id) => {
                tracing::debug!("Saved page {} as post {id}", page.slug);
                last_saved = Some(id);
                PageStatus::Published { id }
            }
            Err(e) => {
                tracing::error!("Could not save page {}: {e}", page.slug);
                PageStatus::Failed {
                    message: e.to_string(),
                }
            }
        };
        outcomes.push(PageOutcome {
            slug: page.slug.clone(),
            title: page.title.clone(),
            status,
        });
    }

    if let Some(id) = last_saved {
        if let Err(e) = runtime.go_to(&edit_url(id)).await {
            tracing::warn!("Could not open page editor: {e}");
        }
    }
    tracing::info!(
        "Published {} of {} pages for {:?}",
        outcomes
            .iter()
            .filter(|o| matches!(o.status, PageStatus::Published { .. }))
            .count(),
        outcomes.len(),
        content.site_info.title
    );
    outcomes
}

async fn save_page(runtime: &dyn SandboxRuntime, page: &Page) -> Result<u64> {
    let output = runtime
        .run_php(&templates::page_upsert_script(page))
        .await?;
    let saved: SavedPost = serde_json::from_str(output.trim())?;
    match (saved.id, saved.error) {
        (_, Some(error)) => Err(WpaiError::Custom(error)),
        (Some(id), None) => Ok(id),
        (None, None) => Err(WpaiError::Custom(format!(
            "No post id returned for page {:?}",
            page.slug
        ))),
    }
}
