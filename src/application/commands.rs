use crate::application::blocked_page::BlockedPage;
use crate::application::blocking_rules::BlockingRuleManager;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::lock_controller::{LockController, RestoreOutcome};
use crate::application::popup::PopupModel;
use crate::domain::models::{to_epoch_millis, LockStatus};
use crate::infrastructure::alarm_scheduler::{AlarmEvent, TokioAlarmScheduler};
use crate::infrastructure::config::LockConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::lock_state_repository::SqliteLockStateRepository;
use crate::infrastructure::rule_store::{DynamicRuleStore, InMemoryDynamicRuleStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub type AppLockController<B = InMemoryDynamicRuleStore> =
    LockController<SqliteLockStateRepository, B, TokioAlarmScheduler>;

pub struct AppState<B: DynamicRuleStore = InMemoryDynamicRuleStore> {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    config: LockConfig,
    rule_store: Arc<B>,
    controller: AppLockController<B>,
    alarm_events: Mutex<Option<UnboundedReceiver<AlarmEvent>>>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_rule_store(workspace_root, Arc::new(InMemoryDynamicRuleStore::default()))
    }
}

impl<B: DynamicRuleStore> AppState<B> {
    /// Builds the state around a host-provided rule store.
    pub fn with_rule_store(workspace_root: PathBuf, rule_store: Arc<B>) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;

        let rules = BlockingRuleManager::from_config(Arc::clone(&rule_store), &bootstrap.config)?;
        let (scheduler, alarm_events) = TokioAlarmScheduler::new();
        let controller = LockController::new(
            Arc::new(SqliteLockStateRepository::new(&bootstrap.database_path)),
            rules,
            Arc::new(scheduler),
        );

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            config: bootstrap.config,
            rule_store,
            controller,
            alarm_events: Mutex::new(Some(alarm_events)),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn rule_store(&self) -> &Arc<B> {
        &self.rule_store
    }

    pub fn controller(&self) -> &AppLockController<B> {
        &self.controller
    }

    /// Hands out the fired-alarm stream. Only the first caller gets it.
    pub fn take_alarm_events(&self) -> Result<UnboundedReceiver<AlarmEvent>, InfraError> {
        self.alarm_events
            .lock()
            .map_err(|error| InfraError::Scheduler(format!("alarm receiver lock poisoned: {error}")))?
            .take()
            .ok_or_else(|| InfraError::Scheduler("alarm events already taken".to_string()))
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{message}");
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        tracing::error!(command, "{message}");
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

/// Intent messages as sent by the popup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Intent {
    StartLock { duration: i64 },
    Unlock,
    GetStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedPageResponse {
    pub message: Option<String>,
    pub remaining: String,
}

pub async fn start_lock_impl<B: DynamicRuleStore>(
    state: &AppState<B>,
    duration_minutes: i64,
) -> Result<i64, InfraError> {
    let lock_end_time = state.controller.start_lock(duration_minutes).await?;
    state.log_info(
        "start_lock",
        &format!("locked for {duration_minutes} minutes until lock_end_time={lock_end_time}"),
    );
    Ok(lock_end_time)
}

pub async fn unlock_impl<B: DynamicRuleStore>(state: &AppState<B>) -> Result<(), InfraError> {
    state.controller.unlock().await?;
    state.log_info("unlock", "lock released");
    Ok(())
}

pub fn get_status_impl<B: DynamicRuleStore>(state: &AppState<B>) -> Result<LockStatus, InfraError> {
    state.controller.get_status()
}

pub async fn restore_lock_state_impl<B: DynamicRuleStore>(
    state: &AppState<B>,
) -> Result<RestoreOutcome, InfraError> {
    let outcome = state.controller.restore_lock_state().await?;
    let message = match outcome {
        RestoreOutcome::Idle => "no stored lock".to_string(),
        RestoreOutcome::Expired => "stored lock had expired and was released".to_string(),
        RestoreOutcome::Restored {
            lock_end_time,
            remaining_ms,
        } => format!(
            "restored lock_end_time={lock_end_time} remaining_seconds={}",
            remaining_ms / 1000
        ),
    };
    state.log_info("restore_lock_state", &message);
    Ok(outcome)
}

pub async fn on_alarm_fired_impl<B: DynamicRuleStore>(
    state: &AppState<B>,
    name: &str,
) -> Result<bool, InfraError> {
    let handled = state.controller.on_alarm_fired(name).await?;
    if handled {
        state.log_info("on_alarm_fired", &format!("alarm {name} expired the lock"));
    }
    Ok(handled)
}

/// Delivery path for alarms coming off the scheduler channel.
pub async fn on_alarm_event_impl<B: DynamicRuleStore>(
    state: &AppState<B>,
    event: &AlarmEvent,
) -> Result<bool, InfraError> {
    let handled = state.controller.on_alarm_event(event).await?;
    if handled {
        state.log_info(
            "on_alarm_fired",
            &format!("alarm {} expired the lock", event.name),
        );
    }
    Ok(handled)
}

pub fn open_popup_impl<B: DynamicRuleStore>(state: &AppState<B>) -> Result<PopupModel, InfraError> {
    let status = state.controller.get_status()?;
    Ok(PopupModel::new(
        state.config.duration_presets_minutes.clone(),
        status,
    ))
}

pub fn blocked_page_impl<B: DynamicRuleStore>(state: &AppState<B>) -> Result<BlockedPageResponse, InfraError> {
    let lock_state = state.controller.lock_state()?;
    let page = BlockedPage::new(&state.config.encouragement_messages);
    Ok(BlockedPageResponse {
        message: page.message().map(ToOwned::to_owned),
        remaining: page.remaining_label(lock_state, to_epoch_millis(Utc::now())),
    })
}

pub fn parse_intent(raw: &str) -> Result<Intent, InfraError> {
    serde_json::from_str::<Intent>(raw)
        .map_err(|error| InfraError::InvalidInput(format!("unrecognized intent: {error}")))
}

pub async fn dispatch_intent<B: DynamicRuleStore>(
    state: &AppState<B>,
    intent: Intent,
) -> serde_json::Value {
    let response = match intent {
        Intent::StartLock { duration } => match start_lock_impl(state, duration).await {
            Ok(_) => IntentResponse::ok(),
            Err(error) => IntentResponse::failed(state.command_error("start_lock", &error)),
        },
        Intent::Unlock => match unlock_impl(state).await {
            Ok(()) => IntentResponse::ok(),
            Err(error) => IntentResponse::failed(state.command_error("unlock", &error)),
        },
        Intent::GetStatus => match get_status_impl(state) {
            Ok(status) => return to_json(&status),
            Err(error) => IntentResponse::failed(state.command_error("get_status", &error)),
        },
    };
    to_json(&response)
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|error| {
        serde_json::json!({ "success": false, "error": error.to_string() })
    })
}
