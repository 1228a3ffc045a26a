use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MILLIS_PER_MINUTE: i64 = 60_000;

pub fn to_epoch_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// `m:ss` rendering of a remaining duration; negative input clamps to zero.
pub fn format_countdown(remaining_ms: i64) -> String {
    let remaining_ms = remaining_ms.max(0);
    let minutes = remaining_ms / MILLIS_PER_MINUTE;
    let seconds = (remaining_ms % MILLIS_PER_MINUTE) / 1000;
    format!("{minutes}:{seconds:02}")
}

/// Persisted lock record. `lock_end_time` is the expiry in epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub lock_end_time: Option<i64>,
}

impl LockState {
    pub fn unlocked() -> Self {
        Self { lock_end_time: None }
    }

    pub fn until(lock_end_time: i64) -> Self {
        Self {
            lock_end_time: Some(lock_end_time),
        }
    }

    pub fn is_locked_at(&self, now_millis: i64) -> bool {
        self.lock_end_time
            .is_some_and(|lock_end_time| lock_end_time > now_millis)
    }

    /// A stored expiry that has already been reached and still needs cleanup.
    pub fn is_stale_at(&self, now_millis: i64) -> bool {
        self.lock_end_time
            .is_some_and(|lock_end_time| lock_end_time <= now_millis)
    }

    pub fn remaining_millis_at(&self, now_millis: i64) -> i64 {
        self.lock_end_time
            .map(|lock_end_time| (lock_end_time - now_millis).max(0))
            .unwrap_or(0)
    }

    pub fn status_at(&self, now_millis: i64) -> LockStatus {
        LockStatus {
            is_locked: self.is_locked_at(now_millis),
            lock_end_time: self.lock_end_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub is_locked: bool,
    pub lock_end_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Xmlhttprequest,
    Media,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleActionType {
    Redirect,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedirectTarget {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: RuleActionType,
    pub redirect: RedirectTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

impl RuleCondition {
    pub fn matches(&self, request_url: &str, resource_type: ResourceType) -> bool {
        self.resource_types.contains(&resource_type)
            && url_filter_matches(&self.url_filter, request_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockingRule {
    pub fn redirect(id: u32, url_filter: &str, redirect_url: &str) -> Self {
        Self {
            id,
            priority: 1,
            action: RuleAction {
                action_type: RuleActionType::Redirect,
                redirect: RedirectTarget {
                    url: redirect_url.to_string(),
                },
            },
            condition: RuleCondition {
                url_filter: url_filter.to_string(),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id == 0 {
            return Err("rule.id must be >= 1".to_string());
        }
        if self.priority == 0 {
            return Err("rule.priority must be >= 1".to_string());
        }
        validate_non_empty(&self.condition.url_filter, "rule.condition.url_filter")?;
        validate_non_empty(&self.action.redirect.url, "rule.action.redirect.url")?;
        if self.condition.resource_types.is_empty() {
            return Err("rule.condition.resource_types must not be empty".to_string());
        }
        Ok(())
    }
}

/// Case-insensitive filter match where `*` matches any run of characters.
/// Filters are unanchored: they may match anywhere inside the URL.
pub fn url_filter_matches(filter: &str, url: &str) -> bool {
    let filter = filter.to_ascii_lowercase();
    let url = url.to_ascii_lowercase();
    let segments = filter
        .split('*')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();

    let mut cursor = 0;
    for segment in segments {
        match url[cursor..].find(segment) {
            Some(offset) => cursor += offset + segment.len(),
            None => return false,
        }
    }
    true
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
