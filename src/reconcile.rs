//! Converges the remote project to the local bundle.
//!
//! Phases run strictly in order:
//! `Authenticating → BundlingFiles → Locating → Creating | Updating →
//! ConfiguringDeployment → Done`, with `Failed` reachable from any of them.
//! Nothing is retried here; each run is a single attempt.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bundle::{self, FileEntry, Manifest, MANIFEST_NAME};
use crate::config::Config;
use crate::credentials::{CredentialStore, FileCredentialStore, OAuthClient, Session};
use crate::errors::DeployError;
use crate::remote::client::build_http_client;
use crate::remote::{
    project_url, AuthenticatedClient, DeploymentConfig, IdentityStrategy, ProjectIdPin,
    ProjectLocator, RemoteService, ScriptApi, TitleMatch,
};

/// Description identifying the one deployment this tool manages.
pub const DEPLOYMENT_DESCRIPTION: &str = "API Executable Deployment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticating,
    BundlingFiles,
    Locating,
    Creating,
    Updating,
    ConfiguringDeployment,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    /// Dry run: a project would have been created.
    WouldCreate,
    /// Dry run: the located project would have been overwritten.
    WouldUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    /// Not attempted on this path.
    Skipped,
    Reused(String),
    Created(String),
    /// Attempted and failed; the run still succeeds.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    pub script_id: String,
    pub url: String,
}

impl ProjectHandle {
    pub fn new(script_id: impl Into<String>) -> Self {
        let script_id = script_id.into();
        let url = project_url(&script_id);
        Self { script_id, url }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub action: Action,
    /// `None` only for `WouldCreate`.
    pub project: Option<ProjectHandle>,
    pub files: usize,
    pub deployment: DeploymentStatus,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub project_root: PathBuf,
    pub project_name: String,
    pub manifest: Manifest,
    /// Also configure the deployment right after creating a project.
    pub configure_on_create: bool,
    pub dry_run: bool,
}

pub struct Reconciler<'a> {
    service: &'a dyn RemoteService,
    locator: &'a ProjectLocator,
    options: ReconcileOptions,
    phase: Phase,
}

impl<'a> Reconciler<'a> {
    pub fn new(service: &'a dyn RemoteService, locator: &'a ProjectLocator, options: ReconcileOptions) -> Self {
        Self {
            service,
            locator,
            options,
            phase: Phase::Authenticating,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    /// Run every phase. On error the reconciler is left in `Failed`.
    pub async fn run(&mut self) -> Result<DeployOutcome, DeployError> {
        match self.converge().await {
            Ok(outcome) => {
                self.enter(Phase::Done);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(phase = ?self.phase, "deployment failed: {}", e);
                self.enter(Phase::Failed);
                Err(e)
            }
        }
    }

    async fn converge(&mut self) -> Result<DeployOutcome, DeployError> {
        self.enter(Phase::Authenticating);
        self.authenticate().await?;

        self.enter(Phase::BundlingFiles);
        let files = bundle::build(&self.options.project_root, &self.options.manifest)?;

        self.enter(Phase::Locating);
        let existing = self.locator.find(self.service).await?;

        if self.options.dry_run {
            let (action, project) = match existing {
                Some(p) => (Action::WouldUpdate, Some(ProjectHandle::new(p.id))),
                None => (Action::WouldCreate, None),
            };
            tracing::info!(action = ?action, files = files.len(), "dry run, no changes made");
            return Ok(DeployOutcome {
                action,
                project,
                files: files.len(),
                deployment: DeploymentStatus::Skipped,
            });
        }

        let (action, project) = match existing {
            Some(project) => {
                self.enter(Phase::Updating);
                (Action::Updated, self.update(&project.id, &files).await?)
            }
            None => {
                self.enter(Phase::Creating);
                (Action::Created, self.create(&files).await?)
            }
        };

        let deployment = if action == Action::Updated || self.options.configure_on_create {
            self.enter(Phase::ConfiguringDeployment);
            self.configure_deployment(&project.script_id).await
        } else {
            DeploymentStatus::Skipped
        };

        Ok(DeployOutcome {
            action,
            project: Some(project),
            files: files.len(),
            deployment,
        })
    }

    /// One cheap authenticated call. A rejected credential becomes
    /// `CredentialExpired`; other failures pass through unchanged.
    async fn authenticate(&self) -> Result<(), DeployError> {
        tracing::info!("validating credential");
        match self.service.probe_identity().await {
            Ok(()) => {
                tracing::info!("credential is valid");
                Ok(())
            }
            Err(e) if e.is_auth_failure() => Err(match e {
                expired @ DeployError::CredentialExpired { .. } => expired,
                other => DeployError::expired(other.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, files: &[FileEntry]) -> Result<ProjectHandle, DeployError> {
        tracing::info!(title = %self.options.project_name, files = files.len(), "creating new project");
        let script_id = self
            .service
            .create_container(&self.options.project_name, files)
            .await
            .map_err(|e| mutation_error("create", e))?;

        let handle = ProjectHandle::new(script_id);
        tracing::info!(id = %handle.script_id, url = %handle.url, "project created");
        Ok(handle)
    }

    async fn update(&self, script_id: &str, files: &[FileEntry]) -> Result<ProjectHandle, DeployError> {
        tracing::info!(id = %script_id, files = files.len(), "replacing project contents");
        self.service
            .replace_contents(script_id, files)
            .await
            .map_err(|e| {
                tracing::error!(status = ?e.status(), "update failed: {}", e);
                mutation_error("update", e)
            })?;

        let handle = ProjectHandle::new(script_id);
        tracing::info!(url = %handle.url, "project updated");
        Ok(handle)
    }

    /// Reuse the deployment with our description or create one. Never fails
    /// the run.
    async fn configure_deployment(&self, script_id: &str) -> DeploymentStatus {
        match self.ensure_deployment(script_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    "deployment configuration failed (continuing anyway, this may be expected \
                     with default execution permissions): {}",
                    e
                );
                DeploymentStatus::Failed(e.to_string())
            }
        }
    }

    async fn ensure_deployment(&self, script_id: &str) -> Result<DeploymentStatus, DeployError> {
        let wrap = |e: DeployError| DeployError::DeploymentConfig(e.to_string());

        let deployments = self.service.list_deployments(script_id).await.map_err(wrap)?;
        if let Some(existing) = deployments
            .into_iter()
            .find(|d| d.description.as_deref() == Some(DEPLOYMENT_DESCRIPTION))
        {
            tracing::info!(deployment_id = %existing.deployment_id, "deployment already exists");
            return Ok(DeploymentStatus::Reused(existing.deployment_id));
        }

        let version_number = self
            .service
            .create_version(script_id, DEPLOYMENT_DESCRIPTION)
            .await
            .map_err(wrap)?;
        let config = DeploymentConfig {
            description: DEPLOYMENT_DESCRIPTION.to_string(),
            manifest_file_name: MANIFEST_NAME.to_string(),
            version_number,
        };
        let deployment_id = self
            .service
            .create_deployment(script_id, &config)
            .await
            .map_err(wrap)?;

        tracing::info!(%deployment_id, version_number, "deployment created");
        Ok(DeploymentStatus::Created(deployment_id))
    }
}

/// Credential problems keep their own variant; anything else from a
/// create/update call is a mutation failure.
fn mutation_error(action: &'static str, err: DeployError) -> DeployError {
    if err.is_credential_error() {
        return err;
    }
    DeployError::RemoteMutation {
        action,
        message: err.to_string(),
    }
}

/// Identity strategy selected by configuration.
pub fn identity_for(config: &Config) -> Box<dyn IdentityStrategy> {
    match &config.script_id {
        Some(id) => Box::new(ProjectIdPin::new(id.clone())),
        None => Box::new(TitleMatch::new(config.project_name.clone())),
    }
}

/// Wire the production services together and run one deployment.
pub async fn deploy(config: &Config, dry_run: bool) -> Result<DeployOutcome, DeployError> {
    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(&config.token_path));
    let record = store.load()?;
    tracing::info!(path = %config.token_path.display(), "using stored credential");

    let http = build_http_client()?;
    let oauth = OAuthClient::new(http.clone(), config.endpoints.token.clone());
    let session = Session::new(record, oauth);
    let client = AuthenticatedClient::new(http, session, store, config.api_key.clone());
    let service = ScriptApi::new(client, config.endpoints.clone());

    let locator = ProjectLocator::new(identity_for(config), config.locate_policy);
    let options = ReconcileOptions {
        project_root: config.project_root.clone(),
        project_name: config.project_name.clone(),
        manifest: Manifest::default(),
        configure_on_create: config.configure_on_create,
        dry_run,
    };

    Reconciler::new(&service, &locator, options)
        .run()
        .await
        .map_err(|e| e.with_credential_path(&config.token_path))
}
