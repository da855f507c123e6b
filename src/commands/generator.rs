use serde::{Deserialize, Serialize};

use crate::commands::runtime::DOCUMENT_ROOT;
use crate::commands::store::{FileEntry, ProjectKind};
use crate::error::Result;
use crate::templates;

/// Arguments of a code-generation tool call, as produced by the language model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub name: String,
    pub description: String,
    pub files: Vec<FileEntry>,
}

/// What the tool reports back to the chat, serialized as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProjectKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
}

/// A completed generation, ready to be reconciled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationResult {
    pub kind: ProjectKind,
    pub raw_name: String,
    pub description: String,
    pub files: Vec<FileEntry>,
}

/// Runs the generator tool: adds missing headers and places files in `wp-content`.
pub fn execute(request: GenerationRequest) -> ToolOutput {
    let GenerationRequest {
        kind,
        name,
        description,
        files,
    } = request;
    let count = files.len();
    let main_file = format!("{name}.php");

    let files = files
        .into_iter()
        .map(|file| {
            let content = if file.path.ends_with(&main_file) && !templates::has_header(&file.content) {
                format!(
                    "{}{}",
                    templates::file_header(kind, &name, &description),
                    file.content
                )
            } else {
                file.content
            };
            FileEntry::new(content_path(kind, &file.path), content)
        })
        .collect();

    ToolOutput {
        success: true,
        message: format!(
            "Successfully generated {} \"{name}\" with {count} files",
            kind.label()
        ),
        kind: Some(kind),
        name: Some(name),
        description: Some(description),
        files: Some(files),
    }
}

/// Absolute sandbox path for a file generated for a project of `kind`.
pub fn content_path(kind: ProjectKind, path: &str) -> String {
    format!(
        "{DOCUMENT_ROOT}/wp-content/{}/{}",
        kind.content_dir(),
        path.trim_start_matches('/')
    )
}

impl ToolOutput {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The generation to apply, or `None` when the tool failed or produced no files.
    ///
    /// Fields missing from the output fall back to the original tool arguments.
    pub fn into_result(self, args: &GenerationRequest) -> Option<GenerationResult> {
        if !self.success {
            return None;
        }
        let files = self.files?;
        Some(GenerationResult {
            kind: self.kind.unwrap_or(args.kind),
            raw_name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| args.name.clone()),
            description: self
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| args.description.clone()),
            files,
        })
    }
}

/// One page of site content; `content` holds block editor markup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

/// Arguments and output of the page-content tool; the output echoes the pages back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContentRequest {
    pub pages: Vec<Page>,
    pub site_info: SiteInfo,
}

impl PageContentRequest {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Runs the page-content tool. Pages pass through as written.
    pub fn execute(self) -> Self {
        tracing::debug!(
            "Generated {} pages for {:?}",
            self.pages.len(),
            self.site_info.title
        );
        self
    }
}
