//! Google implementation of [`RemoteService`]: Drive v2 for search,
//! identity probe and project creation; Apps Script v1 for content,
//! versions and deployments.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::client::{AuthenticatedClient, CallKind};
use super::{Deployment, DeploymentConfig, RemoteProject, RemoteService};
use crate::bundle::FileEntry;
use crate::credentials::parse_expiry;
use crate::errors::DeployError;

pub const SCRIPT_MIME_TYPE: &str = "application/vnd.google-apps.script";
const SCRIPT_IMPORT_MIME_TYPE: &str = "application/vnd.google-apps.script+json";

/// Base URLs of the APIs. Overridable so tests can point everything at a
/// mock server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEndpoints {
    pub drive: String,
    pub drive_upload: String,
    pub script: String,
    pub token: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            drive: "https://www.googleapis.com".to_string(),
            drive_upload: "https://www.googleapis.com".to_string(),
            script: "https://script.googleapis.com".to_string(),
            token: crate::credentials::session::DEFAULT_TOKEN_URI.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Every API served from one base URL, token endpoint at `<base>/token`.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            drive: base.to_string(),
            drive_upload: base.to_string(),
            script: base.to_string(),
            token: format!("{}/token", base),
        }
    }

    fn drive_files(&self) -> String {
        format!("{}/drive/v2/files", self.drive.trim_end_matches('/'))
    }

    fn drive_about(&self) -> String {
        format!("{}/drive/v2/about", self.drive.trim_end_matches('/'))
    }

    fn drive_upload(&self) -> String {
        format!("{}/upload/drive/v2/files", self.drive_upload.trim_end_matches('/'))
    }

    fn project(&self, script_id: &str, resource: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.script.trim_end_matches('/'),
            script_id,
            resource
        )
    }
}

pub struct ScriptApi {
    client: AuthenticatedClient,
    endpoints: ApiEndpoints,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    items: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    title: String,
    modified_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentList {
    #[serde(default)]
    deployments: Vec<DeploymentResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentResource {
    deployment_id: String,
    deployment_config: Option<DeploymentConfigResource>,
}

#[derive(Debug, Deserialize)]
struct DeploymentConfigResource {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionResource {
    version_number: u32,
}

impl ScriptApi {
    pub fn new(client: AuthenticatedClient, endpoints: ApiEndpoints) -> Self {
        Self { client, endpoints }
    }

    async fn parse<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, DeployError> {
        let status = resp.status().as_u16();
        resp.json::<T>().await.map_err(|e| DeployError::Remote {
            status: Some(status),
            message: format!("unexpected response body: {}", e),
        })
    }
}

/// Body of a Drive `multipart/related` upload: JSON metadata followed by
/// the media part.
fn multipart_related(boundary: &str, metadata: &serde_json::Value, media_type: &str, media: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
         --{b}\r\nContent-Type: {media_type}\r\n\r\n{media}\r\n--{b}--\r\n",
        b = boundary,
        meta = metadata,
        media_type = media_type,
        media = media,
    )
}

#[async_trait]
impl RemoteService for ScriptApi {
    async fn probe_identity(&self) -> Result<(), DeployError> {
        let url = self.endpoints.drive_about();
        self.client
            .send(CallKind::Read, |c| c.get(&url).query(&[("fields", "user")]))
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteProject>, DeployError> {
        let url = self.endpoints.drive_files();
        let resp = self
            .client
            .send(CallKind::Read, |c| {
                c.get(&url)
                    .query(&[("q", query), ("fields", "items(id,title,modifiedDate)")])
            })
            .await?;

        let list: FileList = Self::parse(resp).await?;
        Ok(list
            .items
            .into_iter()
            .map(|f| RemoteProject {
                last_modified: f.modified_date.as_deref().and_then(parse_expiry),
                id: f.id,
                title: f.title,
            })
            .collect())
    }

    async fn create_container(&self, title: &str, files: &[FileEntry]) -> Result<String, DeployError> {
        let url = self.endpoints.drive_upload();
        let boundary = format!("scriptdeploy-{}", uuid::Uuid::new_v4().simple());
        let metadata = json!({ "title": title, "mimeType": SCRIPT_MIME_TYPE });
        let media = json!({
            "files": files.iter().map(FileEntry::for_drive_import).collect::<Vec<_>>()
        })
        .to_string();
        let body = multipart_related(&boundary, &metadata, SCRIPT_IMPORT_MIME_TYPE, &media);
        let content_type = format!("multipart/related; boundary={}", boundary);

        let resp = self
            .client
            .send(CallKind::Mutation, |c| {
                c.post(&url)
                    .query(&[("uploadType", "multipart"), ("convert", "true")])
                    .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })
            .await?;

        let created: Created = Self::parse(resp).await?;
        Ok(created.id)
    }

    async fn replace_contents(&self, script_id: &str, files: &[FileEntry]) -> Result<(), DeployError> {
        let url = self.endpoints.project(script_id, "content");
        let body = json!({
            "scriptId": script_id,
            "files": files.iter().map(FileEntry::for_script_api).collect::<Vec<_>>()
        });

        self.client
            .send(CallKind::Mutation, |c| c.put(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_deployments(&self, script_id: &str) -> Result<Vec<Deployment>, DeployError> {
        let url = self.endpoints.project(script_id, "deployments");
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .send(CallKind::Read, |c| {
                    let req = c.get(&url);
                    match &page_token {
                        Some(token) => req.query(&[("pageToken", token.as_str())]),
                        None => req,
                    }
                })
                .await?;
            let page: DeploymentList = Self::parse(resp).await?;

            all.extend(page.deployments.into_iter().map(|d| Deployment {
                deployment_id: d.deployment_id,
                description: d.deployment_config.and_then(|c| c.description),
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(all)
    }

    async fn create_version(&self, script_id: &str, description: &str) -> Result<u32, DeployError> {
        let url = self.endpoints.project(script_id, "versions");
        let body = json!({ "description": description });
        let resp = self
            .client
            .send(CallKind::Mutation, |c| c.post(&url).json(&body))
            .await?;

        let version: VersionResource = Self::parse(resp).await?;
        Ok(version.version_number)
    }

    async fn create_deployment(
        &self,
        script_id: &str,
        config: &DeploymentConfig,
    ) -> Result<String, DeployError> {
        let url = self.endpoints.project(script_id, "deployments");
        let body = json!({
            "scriptId": script_id,
            "versionNumber": config.version_number,
            "manifestFileName": config.manifest_file_name,
            "description": config.description,
        });
        let resp = self
            .client
            .send(CallKind::Mutation, |c| c.post(&url).json(&body))
            .await?;

        let created: DeploymentResource = Self::parse(resp).await?;
        Ok(created.deployment_id)
    }
}
