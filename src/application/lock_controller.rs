use crate::application::blocking_rules::BlockingRuleManager;
use crate::domain::models::{
    from_epoch_millis, to_epoch_millis, LockState, LockStatus, MILLIS_PER_MINUTE,
};
use crate::infrastructure::alarm_scheduler::{AlarmEvent, AlarmScheduler};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::lock_state_repository::LockStateRepository;
use crate::infrastructure::rule_store::DynamicRuleStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const LOCK_ALARM_NAME: &str = "youtube-lock-end";

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No lock was stored.
    Idle,
    /// A stored lock had already run out and was cleaned up.
    Expired,
    Restored {
        lock_end_time: i64,
        remaining_ms: i64,
    },
}

/// Sole writer of the lock record. Rules and the alarm are derived from it.
pub struct LockController<R, B, A>
where
    R: LockStateRepository,
    B: DynamicRuleStore,
    A: AlarmScheduler,
{
    repository: Arc<R>,
    rules: BlockingRuleManager<B>,
    scheduler: Arc<A>,
    now_provider: NowProvider,
}

impl<R, B, A> LockController<R, B, A>
where
    R: LockStateRepository,
    B: DynamicRuleStore,
    A: AlarmScheduler,
{
    pub fn new(repository: Arc<R>, rules: BlockingRuleManager<B>, scheduler: Arc<A>) -> Self {
        Self {
            repository,
            rules,
            scheduler,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn rules(&self) -> &BlockingRuleManager<B> {
        &self.rules
    }

    pub fn scheduler(&self) -> &Arc<A> {
        &self.scheduler
    }

    fn now_millis(&self) -> i64 {
        to_epoch_millis((self.now_provider)())
    }

    /// Locks for `duration_minutes` from now. Returns the new expiry in epoch ms.
    pub async fn start_lock(&self, duration_minutes: i64) -> Result<i64, InfraError> {
        if duration_minutes <= 0 {
            return Err(InfraError::InvalidInput(format!(
                "duration must be a positive number of minutes, got {duration_minutes}"
            )));
        }
        let lock_end_time = duration_minutes
            .checked_mul(MILLIS_PER_MINUTE)
            .and_then(|duration_ms| self.now_millis().checked_add(duration_ms))
            .ok_or_else(|| {
                InfraError::InvalidInput(format!("duration {duration_minutes} is too large"))
            })?;
        let alarm_at = from_epoch_millis(lock_end_time).ok_or_else(|| {
            InfraError::InvalidInput(format!("duration {duration_minutes} is too large"))
        })?;

        // Persist first so a restart can always repair rules and alarm.
        self.repository.save(lock_end_time)?;
        self.rules.activate().await?;
        self.scheduler.schedule(LOCK_ALARM_NAME, alarm_at)?;

        tracing::info!(
            duration_minutes,
            lock_end_time = %alarm_at.to_rfc3339(),
            "lock started"
        );
        Ok(lock_end_time)
    }

    pub async fn unlock(&self) -> Result<(), InfraError> {
        self.repository.clear()?;
        self.rules.deactivate().await?;
        self.scheduler.cancel(LOCK_ALARM_NAME)?;
        tracing::info!("lock released");
        Ok(())
    }

    /// Reads the stored record without cleaning up an expired one.
    pub fn get_status(&self) -> Result<LockStatus, InfraError> {
        let state = self.repository.load()?;
        Ok(state.status_at(self.now_millis()))
    }

    pub fn lock_state(&self) -> Result<LockState, InfraError> {
        self.repository.load()
    }

    pub async fn restore_lock_state(&self) -> Result<RestoreOutcome, InfraError> {
        let state = self.repository.load()?;
        let Some(lock_end_time) = state.lock_end_time else {
            return Ok(RestoreOutcome::Idle);
        };

        let now = self.now_millis();
        if state.is_stale_at(now) {
            tracing::info!(lock_end_time, "stored lock already expired, releasing");
            self.unlock().await?;
            return Ok(RestoreOutcome::Expired);
        }

        let alarm_at = from_epoch_millis(lock_end_time).ok_or_else(|| {
            InfraError::Storage(format!("stored lockEndTime {lock_end_time} is out of range"))
        })?;
        self.rules.activate().await?;
        self.scheduler.schedule(LOCK_ALARM_NAME, alarm_at)?;

        let remaining_ms = lock_end_time - now;
        tracing::info!(remaining_secs = remaining_ms / 1000, "lock restored");
        Ok(RestoreOutcome::Restored {
            lock_end_time,
            remaining_ms,
        })
    }

    /// Returns whether the alarm belonged to the lock.
    pub async fn on_alarm_fired(&self, name: &str) -> Result<bool, InfraError> {
        if name != LOCK_ALARM_NAME {
            tracing::debug!(alarm = name, "ignoring unrelated alarm");
            return Ok(false);
        }
        tracing::info!("lock timer expired, unlocking");
        self.unlock().await?;
        Ok(true)
    }

    /// Handles a delivered alarm unless a later schedule under the same name
    /// replaced it while the event was queued.
    pub async fn on_alarm_event(&self, event: &AlarmEvent) -> Result<bool, InfraError> {
        if let Some(pending) = self.scheduler.scheduled(&event.name)? {
            tracing::debug!(
                alarm = %event.name,
                fired_for = %event.scheduled_for.to_rfc3339(),
                pending = %pending.to_rfc3339(),
                "dropping superseded alarm"
            );
            return Ok(false);
        }
        self.on_alarm_fired(&event.name).await
    }
}
