use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use crate::commands::config::WpaiConfig;
use crate::error::{Result, WpaiError};

/// Remote storage for packaged archives.
#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    /// Stores `archive` and returns its public URL.
    async fn upload(&self, archive: Vec<u8>, customer_id: &str, project_id: &str)
        -> Result<String>;

    /// Removes everything stored for the project.
    async fn delete(&self, customer_id: &str, project_id: &str) -> Result<()>;
}

/// Multipart upload to the storage endpoint.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    delete_endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, delete_endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            delete_endpoint: delete_endpoint.into(),
        }
    }

    pub fn from_config(config: &WpaiConfig) -> Self {
        Self::new(
            config.upload_endpoint.clone(),
            config.delete_endpoint.clone(),
        )
    }
}

#[async_trait]
impl ArchiveUploader for HttpUploader {
    async fn upload(
        &self,
        archive: Vec<u8>,
        customer_id: &str,
        project_id: &str,
    ) -> Result<String> {
        let size = archive.len();
        let part = Part::bytes(archive)
            .file_name(format!("{project_id}.zip"))
            .mime_str("application/zip")?;
        let form = Form::new()
            .part("file", part)
            .text("customerId", customer_id.to_string())
            .text("projectId", project_id.to_string());

        tracing::info!("Uploading {size} bytes for project {project_id}");
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_upload_response(status, &body)
    }

    async fn delete(&self, customer_id: &str, project_id: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.delete_endpoint)
            .json(&json!({ "customerId": customer_id, "projectId": project_id }))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_delete_response(status, &body)?;
        tracing::info!("Deleted stored files for project {project_id}");
        Ok(())
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Option<String>,
    error: Option<String>,
}

/// Extracts the public URL from an upload response, or the reason it failed.
pub fn parse_upload_response(status: u16, body: &str) -> Result<String> {
    let parsed = serde_json::from_str::<UploadResponse>(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.to_string());
        return Err(WpaiError::Upload {
            status,
            body: message,
        });
    }

    parsed
        .and_then(|r| r.url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| WpaiError::Upload {
            status,
            body: format!("response has no url: {body}"),
        })
}

/// Checks a delete response, surfacing its `error` field on failure.
pub fn parse_delete_response(status: u16, body: &str) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    let message = serde_json::from_str::<UploadResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or_else(|| body.to_string());
    Err(WpaiError::Custom(format!(
        "Failed to delete file: HTTP {status}: {message}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_returns_url() {
        let url = parse_upload_response(
            200,
            r#"{"url":"https://cdn.example/projects/c/p/wp-content.zip"}"#,
        )
        .unwrap();
        assert_eq!(url, "https://cdn.example/projects/c/p/wp-content.zip");
    }

    #[test]
    fn test_error_body_is_surfaced() {
        let err = parse_upload_response(400, r#"{"error":"Missing required fields"}"#).unwrap_err();
        match err {
            WpaiError::Upload { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Missing required fields");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_json_failure_keeps_raw_body() {
        let err = parse_upload_response(502, "Bad Gateway").unwrap_err();
        assert!(matches!(err, WpaiError::Upload { status: 502, ref body } if body == "Bad Gateway"));
    }

    #[test]
    fn test_success_without_url_is_a_failure() {
        assert!(matches!(
            parse_upload_response(200, "{}"),
            Err(WpaiError::Upload { status: 200, .. })
        ));
    }

    #[test]
    fn test_delete_response() {
        assert!(parse_delete_response(200, r#"{"success":true}"#).is_ok());
        let err = parse_delete_response(500, r#"{"error":"Failed to delete folder"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to delete file: HTTP 500: Failed to delete folder"
        );
    }

    #[test]
    fn test_from_config_uses_both_endpoints() {
        let config = WpaiConfig {
            upload_endpoint: "https://wp.example/api/upload".into(),
            delete_endpoint: "https://wp.example/api/delete-file".into(),
            ..WpaiConfig::default()
        };
        let uploader = HttpUploader::from_config(&config);
        assert_eq!(uploader.endpoint, "https://wp.example/api/upload");
        assert_eq!(uploader.delete_endpoint, "https://wp.example/api/delete-file");
    }
}
