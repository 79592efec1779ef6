//! Terraform Cloud / Enterprise run directory
//!
//! Talks JSON:API v2 over HTTPS with a static bearer token. Each trait
//! operation maps to one or two requests; nothing is cached between calls.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::directory::{
    ConfigurationRevision, DirectoryResult, Run, RunDirectory, RunEvent, RunId, Workspace,
    WorkspaceTarget,
};
use crate::error::DirectoryError;
use crate::status::RunStatus;

/// Public Terraform Cloud endpoint.
pub const DEFAULT_ADDRESS: &str = "https://app.terraform.io";

const JSON_API: &str = "application/vnd.api+json";

/// Largest page size the list endpoints accept.
const EVENT_PAGE_SIZE: &str = "100";

/// Connection settings for a Terraform Cloud / Enterprise instance
#[derive(Clone)]
pub struct TfeConfig {
    /// Base address (e.g., "https://app.terraform.io")
    pub address: String,
    /// API token (user, team or organization)
    pub token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl TfeConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("tfe-drift/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Parse and check the configured address.
    pub fn base_url(&self) -> DirectoryResult<Url> {
        let url = Url::parse(&self.address).map_err(|e| {
            DirectoryError::Config(format!("invalid address {:?}: {}", self.address, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(DirectoryError::Config(format!(
                "address {:?} must be an http(s) URL with a host",
                self.address
            )));
        }
        Ok(url)
    }
}

impl std::fmt::Debug for TfeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfeConfig")
            .field("address", &self.address)
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Run directory backed by the Terraform Cloud API
pub struct TfeDirectory {
    api_base: String,
    token: String,
    http: reqwest::Client,
}

impl TfeDirectory {
    pub fn new(config: TfeConfig) -> DirectoryResult<Self> {
        let base = config.base_url()?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            api_base: format!("{}/api/v2", base.as_str().trim_end_matches('/')),
            token: config.token,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> DirectoryResult<T> {
        let request = self.http.get(self.url(path)).query(query);
        self.send(request, resource).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> DirectoryResult<T> {
        let response = request
            .bearer_auth(&self.token)
            .header(ACCEPT, JSON_API)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            return Ok(serde_json::from_slice(&body)?);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DirectoryError::Unauthorized(
                format!("{} returned {}", resource, status),
            )),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound {
                resource: resource.to_string(),
            }),
            _ => Err(DirectoryError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    /// Commit SHA from a configuration version's ingress attributes.
    ///
    /// Uploaded (non-VCS) configuration versions have no ingress attributes;
    /// the API answers 404, which maps to `None`.
    async fn ingress_commit(&self, configuration_id: &str) -> DirectoryResult<Option<String>> {
        let path = format!("/configuration-versions/{}/ingress-attributes", configuration_id);
        let resource = format!("ingress attributes of {}", configuration_id);
        match self
            .get::<Document<Option<IngressData>>>(&path, &[], &resource)
            .await
        {
            Ok(doc) => Ok(doc.data.and_then(|d| d.attributes.commit_sha)),
            Err(DirectoryError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RunDirectory for TfeDirectory {
    async fn workspace(&self, target: &WorkspaceTarget) -> DirectoryResult<Workspace> {
        let path = format!(
            "/organizations/{}/workspaces/{}",
            target.organization, target.name
        );
        let doc: Document<WorkspaceData> =
            self.get(&path, &[], &format!("workspace {}", target)).await?;

        let current_configuration = match doc
            .data
            .relationships
            .current_configuration_version
            .and_then(|rel| rel.data)
        {
            Some(cv) => {
                let commit_sha = self.ingress_commit(&cv.id).await?;
                Some(ConfigurationRevision {
                    id: cv.id,
                    commit_sha,
                })
            }
            None => None,
        };

        debug!(
            workspace = %target,
            workspace_id = %doc.data.id,
            has_configuration = current_configuration.is_some(),
            "Resolved workspace"
        );

        Ok(Workspace {
            id: doc.data.id,
            target: target.clone(),
            current_configuration,
        })
    }

    async fn latest_run(
        &self,
        workspace: &Workspace,
        commit_sha: &str,
    ) -> DirectoryResult<Option<Run>> {
        let path = format!("/workspaces/{}/runs", workspace.id);
        let doc: Document<Vec<RunData>> = self
            .get(
                &path,
                &[("page[size]", "1"), ("search[commit]", commit_sha)],
                &format!("runs of {}", workspace.id),
            )
            .await?;

        Ok(doc.data.into_iter().next().map(RunData::into_run))
    }

    async fn run_events(&self, run_id: &RunId) -> DirectoryResult<Vec<RunEvent>> {
        let path = format!("/runs/{}/run-events", run_id);
        let resource = format!("events of {}", run_id);

        let mut events = Vec::new();
        let mut page: u32 = 1;
        loop {
            let number = page.to_string();
            let doc: Page<RunEventData> = self
                .get(
                    &path,
                    &[("page[size]", EVENT_PAGE_SIZE), ("page[number]", number.as_str())],
                    &resource,
                )
                .await?;
            let next_page = doc.next_page();
            events.extend(
                doc.data
                    .into_iter()
                    .map(|e| RunEvent::new(e.attributes.action, e.attributes.created_at)),
            );
            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        debug!(run_id = %run_id, pages = page, events = events.len(), "Fetched run events");
        // stable, so same-second events keep API order
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn create_run(&self, workspace: &Workspace, message: &str) -> DirectoryResult<Run> {
        let body = json!({
            "data": {
                "type": "runs",
                "attributes": { "message": message },
                "relationships": {
                    "workspace": {
                        "data": { "type": "workspaces", "id": workspace.id }
                    }
                }
            }
        });
        let request = self
            .http
            .post(self.url("/runs"))
            .header(CONTENT_TYPE, JSON_API)
            .body(serde_json::to_vec(&body)?);

        let doc: Document<RunData> = self
            .send(request, &format!("runs of {}", workspace.id))
            .await?;
        Ok(doc.data.into_run())
    }

    async fn read_run(&self, run_id: &RunId) -> DirectoryResult<Run> {
        let path = format!("/runs/{}", run_id);
        let doc: Document<RunData> = self.get(&path, &[], &format!("run {}", run_id)).await?;
        Ok(doc.data.into_run())
    }
}

// ---------------------------------------------------------------------------
// JSON:API documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

/// One page of a paginated list.
#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

impl<T> Page<T> {
    fn next_page(&self) -> Option<u32> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.pagination.as_ref())
            .and_then(|pagination| pagination.next_page)
    }
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Pagination {
    #[serde(default)]
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceData {
    id: String,
    #[serde(default)]
    relationships: WorkspaceRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceRelationships {
    #[serde(rename = "current-configuration-version", default)]
    current_configuration_version: Option<Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(default)]
    data: Option<ResourceIdentifier>,
}

#[derive(Debug, Deserialize)]
struct ResourceIdentifier {
    id: String,
}

#[derive(Debug, Deserialize)]
struct IngressData {
    #[serde(default)]
    attributes: IngressAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct IngressAttributes {
    #[serde(rename = "commit-sha", default)]
    commit_sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunData {
    id: String,
    attributes: RunAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunAttributes {
    status: RunStatus,
    created_at: DateTime<Utc>,
    #[serde(default)]
    has_changes: bool,
    #[serde(default)]
    message: Option<String>,
}

impl RunData {
    fn into_run(self) -> Run {
        Run {
            id: RunId(self.id),
            status: self.attributes.status,
            created_at: self.attributes.created_at,
            has_changes: self.attributes.has_changes,
            message: self.attributes.message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunEventData {
    attributes: RunEventAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunEventAttributes {
    action: String,
    created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TfeConfig::new(DEFAULT_ADDRESS, "secret");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("tfe-drift/"));
    }

    #[test]
    fn test_config_with_timeout() {
        let config = TfeConfig::new(DEFAULT_ADDRESS, "t").with_timeout(Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(TfeDirectory::new(config).is_ok());
    }

    #[test]
    fn test_page_next_page_from_meta() {
        let raw = r#"{"data": [], "meta": {"pagination": {"current-page": 1, "next-page": 2}}}"#;
        let page: Page<RunEventData> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.next_page(), Some(2));

        let last: Page<RunEventData> =
            serde_json::from_str(r#"{"data": [], "meta": {"pagination": {"next-page": null}}}"#)
                .unwrap();
        assert_eq!(last.next_page(), None);
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = TfeConfig::new(DEFAULT_ADDRESS, "very-secret-token");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_base_url_rejects_relative_and_non_http() {
        assert!(TfeConfig::new("app.terraform.io", "t").base_url().is_err());
        assert!(TfeConfig::new("ftp://tfe.example.com", "t").base_url().is_err());
        assert!(TfeConfig::new("https://tfe.example.com/", "t")
            .base_url()
            .is_ok());
    }

    #[test]
    fn test_api_base_trims_trailing_slash() {
        let directory = TfeDirectory::new(TfeConfig::new("https://tfe.example.com/", "t")).unwrap();
        assert_eq!(directory.url("/runs"), "https://tfe.example.com/api/v2/runs");
    }

    #[test]
    fn test_run_document_decodes_kebab_case_attributes() {
        let raw = r#"{
            "data": {
                "id": "run-1",
                "type": "runs",
                "attributes": {
                    "status": "planned",
                    "created-at": "2024-05-01T10:00:00Z",
                    "has-changes": true,
                    "message": "nightly"
                }
            }
        }"#;
        let doc: Document<RunData> = serde_json::from_str(raw).unwrap();
        let run = doc.data.into_run();
        assert_eq!(run.id, RunId::from("run-1"));
        assert_eq!(run.status, RunStatus::Planned);
        assert!(run.has_changes);
        assert_eq!(run.message.as_deref(), Some("nightly"));
    }

    #[test]
    fn test_workspace_without_configuration_relationship() {
        let raw = r#"{"data": {"id": "ws-1", "relationships": {
            "current-configuration-version": {"data": null}
        }}}"#;
        let doc: Document<WorkspaceData> = serde_json::from_str(raw).unwrap();
        assert!(doc
            .data
            .relationships
            .current_configuration_version
            .and_then(|r| r.data)
            .is_none());
    }
}
