use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no credential file found at {}", path.display())]
    MissingCredential { path: PathBuf },

    #[error("credential file {} is unusable: {reason}", path.display())]
    InvalidCredential { path: PathBuf, reason: String },

    /// `path` is filled in by whoever knows which file the token came from.
    #[error("credential expired and could not be refreshed: {reason}")]
    CredentialExpired { path: Option<PathBuf>, reason: String },

    #[error("failed to persist refreshed credential to {}: {source}", path.display())]
    CredentialWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no script sources found in {}", dir.display())]
    EmptySource { dir: PathBuf },

    #[error("{} and {} both map to remote file '{name}'", first.display(), second.display())]
    DuplicateSource {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to read source file {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to search for existing project: {0}")]
    RemoteLocate(String),

    #[error("failed to {action} project: {message}")]
    RemoteMutation {
        action: &'static str,
        message: String,
    },

    #[error("deployment configuration failed: {0}")]
    DeploymentConfig(String),

    #[error("remote call failed ({}): {message}", status.map_or_else(|| "no response".to_string(), |s| s.to_string()))]
    Remote { status: Option<u16>, message: String },
}

impl DeployError {
    pub fn expired(reason: impl Into<String>) -> Self {
        DeployError::CredentialExpired {
            path: None,
            reason: reason.into(),
        }
    }

    /// Attach the credential file location to a `CredentialExpired` that
    /// does not carry one yet. Other variants are returned unchanged.
    pub fn with_credential_path(self, location: &std::path::Path) -> Self {
        match self {
            DeployError::CredentialExpired { path: None, reason } => DeployError::CredentialExpired {
                path: Some(location.to_path_buf()),
                reason,
            },
            other => other,
        }
    }

    /// Wrap a transport-level failure that never produced an HTTP status.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        DeployError::Remote {
            status: None,
            message: err.to_string(),
        }
    }

    /// HTTP status of the failed remote call, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeployError::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the remote service rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DeployError::CredentialExpired { .. }) || self.status() == Some(401)
    }

    /// Errors rooted in the credential file rather than the remote call.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            DeployError::MissingCredential { .. }
                | DeployError::InvalidCredential { .. }
                | DeployError::CredentialExpired { .. }
                | DeployError::CredentialWrite { .. }
        )
    }

    /// Operator-facing hint printed before a fatal exit.
    pub fn remediation(&self) -> String {
        match self {
            DeployError::MissingCredential { path } => format!(
                "Run the authorization flow first so that {} exists.\n\
                 The file must embed client_id and client_secret alongside the tokens.",
                path.display()
            ),
            DeployError::InvalidCredential { path, .. } => format!(
                "Re-authenticate:\n  rm {}\n  then re-run the authorization flow.\n\
                 The new file must embed client_id and client_secret.",
                path.display()
            ),
            DeployError::CredentialExpired { path, .. } => format!(
                "Re-authenticate:\n  rm {}\n  then re-run the authorization flow.",
                path.as_deref()
                    .map_or_else(|| "<credential file>".to_string(), |p| p.display().to_string())
            ),
            DeployError::CredentialWrite { path, .. } => format!(
                "Check that {} and its directory are writable.",
                path.display()
            ),
            DeployError::EmptySource { dir } => format!(
                "Add at least one .gs file under {} and try again.",
                dir.display()
            ),
            DeployError::DuplicateSource { first, second, .. } => format!(
                "Rename or remove one of {} and {}; remote file names must be unique.",
                first.display(),
                second.display()
            ),
            DeployError::SourceRead { path, .. } => format!(
                "Make sure {} is readable UTF-8 text.",
                path.display()
            ),
            DeployError::RemoteLocate(_) => "The project search failed. Retry, or pass --script-id \
                 to target a known project, or use --locate-policy fail-open."
                .to_string(),
            DeployError::RemoteMutation { .. } | DeployError::Remote { .. } => {
                "- Check that the Drive API and Apps Script API are enabled in the Cloud Console\n\
                 - Enable the Apps Script API for your account at https://script.google.com/home/usersettings\n\
                 - Verify the credential scopes include drive and script.projects"
                    .to_string()
            }
            DeployError::DeploymentConfig(_) => {
                "Deployment configuration is optional; check the project's deployments in the editor."
                    .to_string()
            }
        }
    }
}
