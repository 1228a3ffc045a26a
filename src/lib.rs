pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    dispatch_intent, get_status_impl, on_alarm_event_impl, on_alarm_fired_impl, parse_intent,
    restore_lock_state_impl, start_lock_impl, unlock_impl, AppState, IntentResponse,
};
use chrono::{DateTime, Utc};
use domain::models::LockStatus;
use infrastructure::error::InfraError;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};

const WAKE_CHECK_INTERVAL: TokioDuration = TokioDuration::from_secs(15);

pub async fn start_lock(state: &AppState, duration: i64) -> IntentResponse {
    match start_lock_impl(state, duration).await {
        Ok(_) => IntentResponse::ok(),
        Err(error) => IntentResponse::failed(state.command_error("start_lock", &error)),
    }
}

pub async fn unlock(state: &AppState) -> IntentResponse {
    match unlock_impl(state).await {
        Ok(()) => IntentResponse::ok(),
        Err(error) => IntentResponse::failed(state.command_error("unlock", &error)),
    }
}

pub fn get_status(state: &AppState) -> Result<LockStatus, String> {
    get_status_impl(state).map_err(|error| state.command_error("get_status", &error))
}

/// Host lifecycle hook: process start, install, or wake from suspension.
pub async fn restore_lock_state(state: &AppState) -> Result<(), String> {
    restore_lock_state_impl(state)
        .await
        .map(|_| ())
        .map_err(|error| state.command_error("restore_lock_state", &error))
}

pub async fn on_alarm_fired(state: &AppState, name: &str) -> Result<bool, String> {
    on_alarm_fired_impl(state, name)
        .await
        .map_err(|error| state.command_error("on_alarm_fired", &error))
}

/// Answers one JSON intent message, e.g. `{"action":"startLock","duration":30}`.
pub async fn handle_message(state: &AppState, raw: &str) -> serde_json::Value {
    match parse_intent(raw) {
        Ok(intent) => dispatch_intent(state, intent).await,
        Err(error) => serde_json::to_value(IntentResponse::failed(
            state.command_error("handle_message", &error),
        ))
        .unwrap_or_else(|_| serde_json::json!({ "success": false })),
    }
}

/// True when the wall clock moved much further than the monotonic tick
/// between two checks, i.e. the machine was suspended in between.
fn resumed_from_suspend(previous: DateTime<Utc>, now: DateTime<Utc>, tick: TokioDuration) -> bool {
    (now - previous)
        .to_std()
        .is_ok_and(|elapsed| elapsed > tick * 2)
}

/// Background host: restores the lock, then serves JSON-lines intents on stdin
/// and fired alarms until stdin closes or the process is interrupted.
pub async fn run(workspace_root: PathBuf) -> Result<(), InfraError> {
    let state = AppState::new(workspace_root)?;
    let mut alarm_events = state.take_alarm_events()?;
    let _ = restore_lock_state(&state).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut wake_check = interval(WAKE_CHECK_INTERVAL);
    wake_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_wake_check = Utc::now();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = handle_message(&state, &line).await;
                stdout.write_all(format!("{response}\n").as_bytes()).await?;
                stdout.flush().await?;
            }
            Some(event) = alarm_events.recv() => {
                if let Err(error) = on_alarm_event_impl(&state, &event).await {
                    state.command_error("on_alarm_fired", &error);
                }
            }
            _ = wake_check.tick() => {
                let now = Utc::now();
                if resumed_from_suspend(last_wake_check, now, WAKE_CHECK_INTERVAL) {
                    tracing::info!("resumed from suspend, restoring lock");
                    let _ = restore_lock_state(&state).await;
                }
                last_wake_check = now;
            }
            _ = &mut shutdown => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    fn temp_workspace() -> PathBuf {
        let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "timer-lock-intent-tests-{}-{}",
            std::process::id(),
            sequence
        ));
        fs::create_dir_all(&path).expect("create temp workspace");
        path
    }

    #[tokio::test]
    async fn intents_report_success_and_status() {
        let root = temp_workspace();
        let state = AppState::new(root.clone()).expect("initialize app state");

        assert_eq!(unlock(&state).await, IntentResponse::ok());
        assert_eq!(start_lock(&state, 10).await, IntentResponse::ok());
        assert!(get_status(&state).expect("status").is_locked);
        assert_eq!(unlock(&state).await, IntentResponse::ok());
        assert!(!get_status(&state).expect("status").is_locked);

        let rejected = start_lock(&state, -1).await;
        assert!(!rejected.success);
        assert!(rejected.error.is_some());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn wall_clock_jump_is_detected_as_resume() {
        let tick = TokioDuration::from_secs(15);
        let previous = Utc::now();
        assert!(!resumed_from_suspend(previous, previous + chrono::Duration::seconds(16), tick));
        assert!(resumed_from_suspend(previous, previous + chrono::Duration::minutes(20), tick));
        assert!(!resumed_from_suspend(previous, previous - chrono::Duration::minutes(5), tick));
    }

    #[tokio::test]
    async fn malformed_message_gets_failure_response() {
        let root = temp_workspace();
        let state = AppState::new(root.clone()).expect("initialize app state");

        let response = handle_message(&state, "not json").await;
        assert_eq!(response["success"], serde_json::json!(false));
        assert!(response["error"].is_string());

        let response = handle_message(&state, r#"{"action":"getStatus"}"#).await;
        assert_eq!(response["isLocked"], serde_json::json!(false));

        restore_lock_state(&state).await.expect("restore");
        assert_eq!(
            on_alarm_fired(&state, application::lock_controller::LOCK_ALARM_NAME).await,
            Ok(true)
        );

        let _ = fs::remove_dir_all(root);
    }
}
