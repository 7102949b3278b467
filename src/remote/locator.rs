//! Decides whether the project we deploy to already exists.

use async_trait::async_trait;

use super::google::SCRIPT_MIME_TYPE;
use super::{RemoteProject, RemoteService};
use crate::errors::DeployError;

/// What to do when the lookup itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LocatePolicy {
    /// Log and treat the project as absent. A transient error then creates
    /// a duplicate project.
    #[default]
    FailOpen,
    /// Abort the run before any mutation.
    FailFast,
}

/// How a local project is matched to a remote one.
#[async_trait]
pub trait IdentityStrategy: Send + Sync {
    fn describe(&self) -> String;

    async fn resolve(&self, service: &dyn RemoteService) -> Result<Option<RemoteProject>, DeployError>;
}

/// Exact, case-sensitive title match among non-trashed script projects.
/// The first result returned by the service wins.
pub struct TitleMatch {
    title: String,
}

impl TitleMatch {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    pub fn query(&self) -> String {
        title_query(&self.title)
    }
}

#[async_trait]
impl IdentityStrategy for TitleMatch {
    fn describe(&self) -> String {
        format!("title '{}'", self.title)
    }

    async fn resolve(&self, service: &dyn RemoteService) -> Result<Option<RemoteProject>, DeployError> {
        let found = service.search(&self.query()).await?;
        if found.len() > 1 {
            tracing::warn!(
                matches = found.len(),
                title = %self.title,
                "several projects share this title, using the first"
            );
        }
        Ok(found.into_iter().next())
    }
}

/// A known script id; no search is performed.
pub struct ProjectIdPin {
    script_id: String,
}

impl ProjectIdPin {
    pub fn new(script_id: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
        }
    }
}

#[async_trait]
impl IdentityStrategy for ProjectIdPin {
    fn describe(&self) -> String {
        format!("script id {}", self.script_id)
    }

    async fn resolve(&self, _service: &dyn RemoteService) -> Result<Option<RemoteProject>, DeployError> {
        Ok(Some(RemoteProject {
            id: self.script_id.clone(),
            title: String::new(),
            last_modified: None,
        }))
    }
}

/// Drive v2 query for a script project titled exactly `title`.
pub fn title_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "mimeType='{}' and title='{}' and trashed=false",
        SCRIPT_MIME_TYPE, escaped
    )
}

pub struct ProjectLocator {
    strategy: Box<dyn IdentityStrategy>,
    policy: LocatePolicy,
}

impl ProjectLocator {
    pub fn new(strategy: Box<dyn IdentityStrategy>, policy: LocatePolicy) -> Self {
        Self { strategy, policy }
    }

    /// Existing project for this run, if any. Lookup failures follow the
    /// configured [`LocatePolicy`].
    pub async fn find(&self, service: &dyn RemoteService) -> Result<Option<RemoteProject>, DeployError> {
        tracing::info!(identity = %self.strategy.describe(), "checking for existing project");

        match self.strategy.resolve(service).await {
            Ok(Some(project)) => {
                tracing::info!(
                    id = %project.id,
                    title = %project.title,
                    last_modified = ?project.last_modified,
                    "found existing project"
                );
                Ok(Some(project))
            }
            Ok(None) => {
                tracing::info!("no existing project found, will create one");
                Ok(None)
            }
            Err(e) => match self.policy {
                LocatePolicy::FailOpen => {
                    tracing::warn!("error searching for existing project, assuming none: {}", e);
                    Ok(None)
                }
                LocatePolicy::FailFast => Err(DeployError::RemoteLocate(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::FakeService;

    #[test]
    fn test_title_query_escapes_quotes() {
        assert_eq!(
            title_query("Slide Formatter"),
            "mimeType='application/vnd.google-apps.script' and title='Slide Formatter' and trashed=false"
        );
        assert!(title_query("Bob's tool").contains("title='Bob\\'s tool'"));
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let fake = FakeService::with_existing("first", "Slide Formatter");
        fake.search_result
            .lock()
            .unwrap()
            .as_mut()
            .unwrap()
            .as_mut()
            .unwrap()
            .push(RemoteProject {
                id: "second".into(),
                title: "Slide Formatter".into(),
                last_modified: None,
            });

        let locator = ProjectLocator::new(Box::new(TitleMatch::new("Slide Formatter")), LocatePolicy::FailOpen);
        let found = locator.find(&fake).await.unwrap().unwrap();
        assert_eq!(found.id, "first");
    }

    #[tokio::test]
    async fn test_fail_open_treats_errors_as_absent() {
        let fake = FakeService::default();
        *fake.search_result.lock().unwrap() = Some(Err("connection reset".into()));

        let locator = ProjectLocator::new(Box::new(TitleMatch::new("X")), LocatePolicy::FailOpen);
        assert_eq!(locator.find(&fake).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fail_fast_surfaces_errors() {
        let fake = FakeService::default();
        *fake.search_result.lock().unwrap() = Some(Err("connection reset".into()));

        let locator = ProjectLocator::new(Box::new(TitleMatch::new("X")), LocatePolicy::FailFast);
        let err = locator.find(&fake).await.unwrap_err();
        assert!(matches!(err, DeployError::RemoteLocate(_)));
    }

    #[tokio::test]
    async fn test_pinned_id_skips_search() {
        let fake = FakeService::default();
        let locator = ProjectLocator::new(Box::new(ProjectIdPin::new("abc123")), LocatePolicy::FailFast);

        let found = locator.find(&fake).await.unwrap().unwrap();
        assert_eq!(found.id, "abc123");
        assert!(fake.calls().is_empty());
    }
}
