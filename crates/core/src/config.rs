use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `COMPASS__`; command-line flags override individual fields.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reporter: ReporterSettings,
    #[serde(default)]
    pub matcher: MatcherSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Connection settings for the step tracking backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ReporterSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub journey_id: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default)]
    pub debug: bool,
}

/// Retry budget for resolving click-trigger queries against the page.
#[derive(Debug, Clone, Deserialize)]
pub struct MatcherSettings {
    #[serde(default = "default_match_attempts")]
    pub attempts: u32,
    #[serde(default = "default_match_interval_ms")]
    pub interval_ms: u64,
}

/// Where triggered-step state is persisted between runs.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

// Default functions
fn default_api_url() -> String {
    "https://mm.nlx.ai".to_string()
}
fn default_language_code() -> String {
    "en-US".to_string()
}
fn default_match_attempts() -> u32 {
    3
}
fn default_match_interval_ms() -> u64 {
    50
}
fn default_storage_dir() -> String {
    ".compass".to_string()
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            workspace_id: String::new(),
            journey_id: String::new(),
            language_code: default_language_code(),
            debug: false,
        }
    }
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            attempts: default_match_attempts(),
            interval_ms: default_match_interval_ms(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reporter: ReporterSettings::default(),
            matcher: MatcherSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("COMPASS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.reporter.api_url, "https://mm.nlx.ai");
        assert_eq!(config.matcher.attempts, 3);
        assert_eq!(config.matcher.interval_ms, 50);
        assert!(!config.reporter.debug);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "reporter": { "api_key": "k-1", "debug": true },
            "matcher": { "attempts": 7 }
        }))
        .unwrap();
        assert_eq!(config.reporter.api_key, "k-1");
        assert!(config.reporter.debug);
        assert_eq!(config.reporter.language_code, "en-US");
        assert_eq!(config.matcher.attempts, 7);
        assert_eq!(config.matcher.interval_ms, 50);
        assert_eq!(config.storage.dir, ".compass");
    }
}
