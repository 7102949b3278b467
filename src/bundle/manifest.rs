use serde::{Deserialize, Serialize};

/// Remote name of the manifest file.
pub const MANIFEST_NAME: &str = "appsscript";

/// `appsscript.json` contents. Generated from static configuration only;
/// `oauth_scopes` must list every scope the sources need, nothing checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub time_zone: String,
    pub dependencies: Dependencies,
    pub oauth_scopes: Vec<String>,
    pub runtime_version: String,
    pub execution_api: ExecutionApi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    pub enabled_advanced_services: Vec<AdvancedService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedService {
    pub user_symbol: String,
    pub service_id: String,
    pub version: String,
}

impl AdvancedService {
    pub fn new(user_symbol: &str, service_id: &str, version: &str) -> Self {
        Self {
            user_symbol: user_symbol.to_string(),
            service_id: service_id.to_string(),
            version: version.to_string(),
        }
    }
}

/// Who may call the script through the Execution API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionApi {
    pub access: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            time_zone: "America/New_York".to_string(),
            dependencies: Dependencies {
                enabled_advanced_services: vec![
                    AdvancedService::new("Slides", "slides", "v1"),
                    AdvancedService::new("Drive", "drive", "v2"),
                    AdvancedService::new("Sheets", "sheets", "v4"),
                ],
            },
            oauth_scopes: vec![
                "https://www.googleapis.com/auth/presentations".to_string(),
                "https://www.googleapis.com/auth/drive.readonly".to_string(),
                "https://www.googleapis.com/auth/spreadsheets".to_string(),
            ],
            runtime_version: "V8".to_string(),
            execution_api: ExecutionApi {
                access: "ANYONE".to_string(),
            },
        }
    }
}

impl Manifest {
    /// Pretty-printed JSON, the form uploaded to the remote project.
    pub fn to_source(&self) -> String {
        // Plain string/struct fields only, serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest_shape() {
        let value: serde_json::Value = serde_json::from_str(&Manifest::default().to_source()).unwrap();

        assert_eq!(value["timeZone"], "America/New_York");
        assert_eq!(value["runtimeVersion"], "V8");
        assert_eq!(value["executionApi"]["access"], "ANYONE");
        assert_eq!(value["oauthScopes"].as_array().unwrap().len(), 3);

        let services = value["dependencies"]["enabledAdvancedServices"].as_array().unwrap();
        assert_eq!(services.len(), 3);
        assert_eq!(services[0]["userSymbol"], "Slides");
        assert_eq!(services[0]["serviceId"], "slides");
        assert_eq!(services[2]["version"], "v4");
    }
}
