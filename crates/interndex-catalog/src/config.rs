use std::path::PathBuf;
use std::time::Duration;

use interndex_storage::HttpClientConfig;

pub const DEFAULT_SHEET_ID: &str = "19MSrc1mB4LJI7R9IeMUd3C4iGmxbzH8wM_TojY0c-rc";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sheet_id: String,
    pub sheet_name: String,
    /// `None` skips the tag styling sheet entirely.
    pub config_sheet: Option<String>,
    pub fixtures_dir: Option<PathBuf>,
    pub state_path: PathBuf,
    pub rules_path: PathBuf,
    pub webhook_url: Option<String>,
    pub web_port: u16,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sheet_id: DEFAULT_SHEET_ID.to_string(),
            sheet_name: "Internships".to_string(),
            config_sheet: Some("Config".to_string()),
            fixtures_dir: None,
            state_path: PathBuf::from("./state/tracked.json"),
            rules_path: PathBuf::from("./rules/positions.yaml"),
            webhook_url: None,
            web_port: 8000,
            http_timeout_secs: 20,
            user_agent: "interndex/0.1".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        Self {
            sheet_id: get("INTERNDEX_SHEET_ID").unwrap_or(defaults.sheet_id),
            sheet_name: get("INTERNDEX_SHEET_NAME").unwrap_or(defaults.sheet_name),
            config_sheet: match lookup("INTERNDEX_CONFIG_SHEET") {
                Some(v) if v.trim().is_empty() => None,
                Some(v) => Some(v.trim().to_string()),
                None => defaults.config_sheet,
            },
            fixtures_dir: get("INTERNDEX_FIXTURES_DIR").map(PathBuf::from),
            state_path: get("INTERNDEX_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
            rules_path: get("INTERNDEX_RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.rules_path),
            webhook_url: get("INTERNDEX_WEBHOOK_URL"),
            web_port: get("INTERNDEX_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.web_port),
            http_timeout_secs: get("INTERNDEX_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            user_agent: get("INTERNDEX_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.http_timeout(),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }
}
