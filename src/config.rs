use std::path::PathBuf;

use clap::ValueEnum;

use crate::remote::{ApiEndpoints, LocatePolicy};

#[derive(Debug, Clone)]
pub struct Config {
    /// Credential file, rewritten in place when the token is refreshed.
    pub token_path: PathBuf,
    /// Project directory; sources are read from `<root>/src`.
    pub project_root: PathBuf,
    /// Remote project title, also the lookup key unless `script_id` is set.
    pub project_name: String,
    /// Optional API key attached to every remote call as `key=`.
    /// Set via DEPLOYMENT_API_KEY.
    pub api_key: Option<String>,
    pub locate_policy: LocatePolicy,
    /// Pin the target project instead of searching by title.
    pub script_id: Option<String>,
    /// Configure the executable deployment after creating a project too,
    /// not only after updates.
    pub configure_on_create: bool,
    pub endpoints: ApiEndpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("token.json"),
            project_root: PathBuf::from("."),
            project_name: "Slide Formatter".to_string(),
            api_key: None,
            locate_policy: LocatePolicy::default(),
            script_id: None,
            configure_on_create: false,
            endpoints: ApiEndpoints::default(),
        }
    }
}

/// Load configuration from `.env` and the process environment.
pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a `Config` from any key lookup. Unset or empty keys fall back to
/// defaults.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let defaults = Config::default();

    let locate_policy = match get("SCRIPTDEPLOY_LOCATE_POLICY") {
        Some(raw) => LocatePolicy::from_str(&raw, true).map_err(|_| {
            anyhow::anyhow!(
                "SCRIPTDEPLOY_LOCATE_POLICY must be 'fail-open' or 'fail-fast', got '{}'",
                raw
            )
        })?,
        None => defaults.locate_policy,
    };

    let configure_on_create = match get("SCRIPTDEPLOY_CONFIGURE_ON_CREATE") {
        Some(raw) => parse_bool(&raw).ok_or_else(|| {
            anyhow::anyhow!("SCRIPTDEPLOY_CONFIGURE_ON_CREATE must be a boolean, got '{}'", raw)
        })?,
        None => defaults.configure_on_create,
    };

    let endpoints = ApiEndpoints {
        drive: endpoint(get("SCRIPTDEPLOY_DRIVE_URL"), defaults.endpoints.drive, "SCRIPTDEPLOY_DRIVE_URL")?,
        drive_upload: endpoint(
            get("SCRIPTDEPLOY_DRIVE_UPLOAD_URL"),
            defaults.endpoints.drive_upload,
            "SCRIPTDEPLOY_DRIVE_UPLOAD_URL",
        )?,
        script: endpoint(get("SCRIPTDEPLOY_SCRIPT_URL"), defaults.endpoints.script, "SCRIPTDEPLOY_SCRIPT_URL")?,
        token: endpoint(get("SCRIPTDEPLOY_TOKEN_URI"), defaults.endpoints.token, "SCRIPTDEPLOY_TOKEN_URI")?,
    };

    Ok(Config {
        token_path: get("SCRIPTDEPLOY_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.token_path),
        project_root: get("SCRIPTDEPLOY_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.project_root),
        project_name: get("SCRIPTDEPLOY_PROJECT_NAME").unwrap_or(defaults.project_name),
        api_key: get("DEPLOYMENT_API_KEY"),
        locate_policy,
        script_id: get("SCRIPTDEPLOY_SCRIPT_ID"),
        configure_on_create,
        endpoints,
    })
}

fn endpoint(value: Option<String>, default: String, key: &str) -> anyhow::Result<String> {
    match value {
        Some(raw) => {
            let parsed = url::Url::parse(&raw).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", key, raw);
            }
            Ok(raw)
        }
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
