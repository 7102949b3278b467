//! Remote script-hosting service.
//!
//! `RemoteService` is the seam between the reconciler and the provider's
//! REST surface. `google::ScriptApi` is the production implementation.

pub mod client;
pub mod google;
pub mod locator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bundle::FileEntry;
use crate::errors::DeployError;

pub use client::AuthenticatedClient;
pub use google::{ApiEndpoints, ScriptApi};
pub use locator::{IdentityStrategy, LocatePolicy, ProjectIdPin, ProjectLocator, TitleMatch};

/// A script project found by search.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProject {
    pub id: String,
    pub title: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub deployment_id: String,
    pub description: Option<String>,
}

/// Parameters for a new deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentConfig {
    pub description: String,
    pub manifest_file_name: String,
    pub version_number: u32,
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Cheap authenticated call used to validate the credential.
    async fn probe_identity(&self) -> Result<(), DeployError>;

    /// Search script projects with a provider query string.
    async fn search(&self, query: &str) -> Result<Vec<RemoteProject>, DeployError>;

    /// Create a project populated with `files` in one call. Returns its id.
    async fn create_container(&self, title: &str, files: &[FileEntry]) -> Result<String, DeployError>;

    /// Replace the whole file set of a project.
    async fn replace_contents(&self, script_id: &str, files: &[FileEntry]) -> Result<(), DeployError>;

    async fn list_deployments(&self, script_id: &str) -> Result<Vec<Deployment>, DeployError>;

    /// Snapshot the current content as an immutable version.
    async fn create_version(&self, script_id: &str, description: &str) -> Result<u32, DeployError>;

    /// Returns the new deployment id.
    async fn create_deployment(
        &self,
        script_id: &str,
        config: &DeploymentConfig,
    ) -> Result<String, DeployError>;
}

/// Editor URL for a script project.
pub fn project_url(script_id: &str) -> String {
    format!("https://script.google.com/d/{}/edit", script_id)
}
