use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

const LOCK_JSON: &str = "lock.json";
const SUPPORTED_SCHEMA: u8 = 1;

pub const DEFAULT_BLOCKED_URL_FILTERS: [&str; 2] = ["*youtube.com/*", "*youtu.be/*"];
pub const DEFAULT_BLOCKED_PAGE_URL: &str = "chrome-extension://timer-lock/blocked.html";
pub const DEFAULT_DURATION_PRESETS_MINUTES: [u32; 4] = [15, 30, 60, 120];

fn default_encouragement_messages() -> Vec<String> {
    [
        "Focus mode engaged.",
        "The videos will still be there later.",
        "Work time now, watch time later.",
        "Your future self says thanks.",
        "Stronger than the temptation.",
        "You've come this far, keep going.",
        "What you're doing right now matters more.",
        "Still in the zone.",
    ]
    .into_iter()
    .map(ToOwned::to_owned)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockConfig {
    pub schema: u8,
    pub blocked_url_filters: Vec<String>,
    pub blocked_page_url: String,
    pub duration_presets_minutes: Vec<u32>,
    #[serde(default)]
    pub encouragement_messages: Vec<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            blocked_url_filters: DEFAULT_BLOCKED_URL_FILTERS
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            blocked_page_url: DEFAULT_BLOCKED_PAGE_URL.to_string(),
            duration_presets_minutes: DEFAULT_DURATION_PRESETS_MINUTES.to_vec(),
            encouragement_messages: default_encouragement_messages(),
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.schema != SUPPORTED_SCHEMA {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported schema {}",
                self.schema
            )));
        }
        if self.blocked_url_filters.is_empty() {
            return Err(InfraError::InvalidConfig(
                "blockedUrlFilters must not be empty".to_string(),
            ));
        }
        if self
            .blocked_url_filters
            .iter()
            .any(|filter| filter.trim().is_empty())
        {
            return Err(InfraError::InvalidConfig(
                "blockedUrlFilters must not contain blank entries".to_string(),
            ));
        }
        Url::parse(&self.blocked_page_url).map_err(|error| {
            InfraError::InvalidConfig(format!(
                "blockedPageUrl '{}' is not an absolute URL: {error}",
                self.blocked_page_url
            ))
        })?;
        if self.duration_presets_minutes.iter().any(|minutes| *minutes == 0) {
            return Err(InfraError::InvalidConfig(
                "durationPresetsMinutes must all be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.blocked_url_filters = self
            .blocked_url_filters
            .into_iter()
            .map(|filter| filter.trim().to_string())
            .collect();
        self.encouragement_messages = self
            .encouragement_messages
            .into_iter()
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .collect();
        self
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(LOCK_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&LockConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<LockConfig, InfraError> {
    let path = config_dir.join(LOCK_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != u64::from(SUPPORTED_SCHEMA) {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }

    let config = serde_json::from_value::<LockConfig>(parsed)
        .map_err(|error| InfraError::InvalidConfig(format!("{}: {error}", path.display())))?
        .normalized();
    config.validate()?;
    Ok(config)
}
