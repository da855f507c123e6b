use serde::Serialize;

/// All errors that can occur while generating, previewing and packaging projects.
#[derive(Debug, thiserror::Error)]
pub enum WpaiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Project name {raw:?} does not produce a usable directory name")]
    SanitizationDegenerate { raw: String },

    #[error("No project named {slug:?}")]
    NotFound { slug: String },

    #[error("Invalid archive: {0}")]
    ArchiveFormat(String),

    #[error("File path {path:?} does not name a file")]
    EmptyPath { path: String },

    #[error("Failed to write {path}: {message}")]
    ExternalWrite { path: String, message: String },

    #[error("Upload failed with HTTP {status}: {body}")]
    Upload { status: u16, body: String },

    #[error("{failed} of {total} files failed to write")]
    PartialBatch { failed: usize, total: usize },

    #[error("{0}")]
    EmptyArchive(String),

    #[error("{0}")]
    Custom(String),
}

// Errors cross the UI boundary as plain strings.
impl Serialize for WpaiError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WpaiError>;
