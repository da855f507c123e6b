use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commands::config::WpaiConfig;
use crate::commands::store::FileEntry;
use crate::error::{Result, WpaiError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectType {
    General,
    #[serde(rename = "Page Content")]
    PageContent,
    Plugin,
    Theme,
}

/// A row of the `projects` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub customer_id: String,
    pub name: String,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub code: Option<Vec<FileEntry>>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
}

/// Columns written when a project is saved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectUpdate {
    pub name: String,
    pub customer_id: String,
    pub updated_at: String,
    pub messages: Vec<ChatMessage>,
    pub code: Vec<FileEntry>,
    pub content_url: String,
}

/// Columns supplied when a project row is created; the rest take table defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub name: String,
    pub customer_id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub project_type: Option<ProjectType>,
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get_project(&self, id: &str) -> Result<ProjectRecord>;

    /// Overwrites the given columns of the row with `id`.
    async fn update_project(&self, id: &str, update: &ProjectUpdate) -> Result<()>;

    async fn create_project(&self, project: &NewProject) -> Result<ProjectRecord>;

    /// A customer's projects, newest first.
    async fn list_projects(&self, customer_id: &str) -> Result<Vec<ProjectRecord>>;

    async fn delete_project(&self, id: &str) -> Result<()>;
}

/// Projects table behind a PostgREST endpoint.
pub struct RestProjectRepository {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestProjectRepository {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    pub fn from_config(config: &WpaiConfig) -> Self {
        Self::new(config.supabase_url.clone(), config.supabase_anon_key.clone())
    }

    /// Authenticates requests as a signed-in user instead of the anonymous key.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/projects", self.base_url.trim_end_matches('/'))
    }

    fn table(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, self.table_url())
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    fn request(&self, method: reqwest::Method, id: &str) -> reqwest::RequestBuilder {
        self.table(method).query(&[("id", format!("eq.{id}"))])
    }

    fn create_request(&self, project: &NewProject) -> reqwest::RequestBuilder {
        self.table(reqwest::Method::POST)
            .header("Prefer", "return=representation")
            .json(&[project])
    }

    fn list_request(&self, customer_id: &str) -> reqwest::RequestBuilder {
        self.table(reqwest::Method::GET).query(&[
            ("select", "*".to_string()),
            ("customer_id", format!("eq.{customer_id}")),
            ("order", "created_at.desc".to_string()),
        ])
    }
}

async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(WpaiError::Custom(format!(
        "Failed to {action}: HTTP {status}: {body}"
    )))
}

#[async_trait]
impl ProjectRepository for RestProjectRepository {
    async fn get_project(&self, id: &str) -> Result<ProjectRecord> {
        let response = self
            .request(reqwest::Method::GET, id)
            .query(&[("select", "*")])
            .send()
            .await?;
        let rows: Vec<ProjectRecord> = check(response, "get project").await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| WpaiError::Custom(format!("Project {id} not found")))
    }

    async fn update_project(&self, id: &str, update: &ProjectUpdate) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, id)
            .header("Prefer", "return=minimal")
            .json(update)
            .send()
            .await?;
        check(response, "update project").await?;
        tracing::info!("Updated project {id}");
        Ok(())
    }

    async fn create_project(&self, project: &NewProject) -> Result<ProjectRecord> {
        let response = self.create_request(project).send().await?;
        let rows: Vec<ProjectRecord> = check(response, "create project").await?.json().await?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| WpaiError::Custom("Failed to create project: No data returned".into()))?;
        tracing::info!("Created project {} ({})", record.id, record.name);
        Ok(record)
    }

    async fn list_projects(&self, customer_id: &str) -> Result<Vec<ProjectRecord>> {
        let response = self.list_request(customer_id).send().await?;
        Ok(check(response, "list projects").await?.json().await?)
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        let response = self.request(reqwest::Method::DELETE, id).send().await?;
        check(response, "delete project").await?;
        tracing::info!("Deleted project {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_row() {
        let row = r#"{
            "id": "p1",
            "customer_id": "c1",
            "name": "Shop",
            "content_url": null,
            "code": [{"path": "wp-content/plugins/shop/shop.php", "code": "<?php"}],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "type": "Page Content"
        }"#;
        let record: ProjectRecord = serde_json::from_str(row).unwrap();
        assert_eq!(record.project_type, ProjectType::PageContent);
        assert_eq!(record.messages, None);
        assert_eq!(record.code.unwrap()[0].content, "<?php");
    }

    #[test]
    fn test_table_url() {
        let repo = RestProjectRepository::new("https://db.example/", "anon");
        assert_eq!(repo.table_url(), "https://db.example/rest/v1/projects");
    }

    #[test]
    fn test_update_serializes_columns() {
        let update = ProjectUpdate {
            name: "Shop".into(),
            customer_id: "c1".into(),
            updated_at: "2024-01-02T00:00:00Z".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "Make a shop".into(),
            }],
            code: vec![],
            content_url: "https://cdn.example/x.zip".into(),
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["content_url"], "https://cdn.example/x.zip");
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_new_project_columns() {
        let value = serde_json::to_value([NewProject {
            name: "Shop".into(),
            customer_id: "c1".into(),
            project_type: None,
        }])
        .unwrap();
        assert_eq!(value, serde_json::json!([{"name": "Shop", "customer_id": "c1"}]));

        let typed = serde_json::to_value(NewProject {
            name: "Home".into(),
            customer_id: "c1".into(),
            project_type: Some(ProjectType::PageContent),
        })
        .unwrap();
        assert_eq!(typed["type"], "Page Content");
    }

    #[test]
    fn test_list_query() {
        let repo = RestProjectRepository::new("https://db.example", "anon");
        let request = repo.list_request("c1").build().unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://db.example/rest/v1/projects?select=*&customer_id=eq.c1&order=created_at.desc"
        );
        assert_eq!(request.headers()["apikey"], "anon");
    }

    #[test]
    fn test_create_request() {
        let repo = RestProjectRepository::new("https://db.example", "anon");
        let request = repo
            .create_request(&NewProject {
                name: "Shop".into(),
                customer_id: "c1".into(),
                project_type: Some(ProjectType::Plugin),
            })
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.headers()["prefer"], "return=representation");
        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body[0]["name"], "Shop");
        assert_eq!(body[0]["type"], "Plugin");
    }

    #[test]
    fn test_delete_targets_one_row() {
        let repo = RestProjectRepository::new("https://db.example", "anon").with_access_token("jwt");
        let request = repo
            .request(reqwest::Method::DELETE, "p1")
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::DELETE);
        assert_eq!(request.url().query(), Some("id=eq.p1"));
        assert_eq!(request.headers()["authorization"], "Bearer jwt");
    }
}
