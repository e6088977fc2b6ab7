use serde::{Deserialize, Serialize};

/// Client configuration as supplied by the host page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterConfig {
    pub api_key: String,
    pub workspace_id: String,
    pub conversation_id: String,
    pub journey_id: String,
    pub language_code: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

pub fn default_api_url() -> String {
    "https://mm.nlx.ai".to_string()
}
