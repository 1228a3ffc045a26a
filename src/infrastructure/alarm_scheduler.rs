use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub name: String,
    pub scheduled_for: DateTime<Utc>,
}

/// Named one-shot wake-ups. Scheduling a name that is already pending replaces it.
pub trait AlarmScheduler: Send + Sync {
    fn schedule(&self, name: &str, when: DateTime<Utc>) -> Result<(), InfraError>;
    fn cancel(&self, name: &str) -> Result<bool, InfraError>;
    fn scheduled(&self, name: &str) -> Result<Option<DateTime<Utc>>, InfraError>;
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Longest single sleep before the wall clock is consulted again. Monotonic
/// sleeps stall across system suspend.
pub const DEFAULT_MAX_SLEEP: TokioDuration = TokioDuration::from_secs(30);

#[derive(Debug)]
struct PendingAlarm {
    when: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct PendingAlarms {
    next_generation: u64,
    alarms: HashMap<String, PendingAlarm>,
}

/// Alarms backed by spawned tokio sleeps; fired names arrive on the receiver
/// returned from [`TokioAlarmScheduler::new`].
pub struct TokioAlarmScheduler {
    sender: UnboundedSender<AlarmEvent>,
    pending: Arc<Mutex<PendingAlarms>>,
    now_provider: NowProvider,
    max_sleep: TokioDuration,
}

impl TokioAlarmScheduler {
    pub fn new() -> (Self, UnboundedReceiver<AlarmEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                pending: Arc::new(Mutex::new(PendingAlarms::default())),
                now_provider: Arc::new(Utc::now),
                max_sleep: DEFAULT_MAX_SLEEP,
            },
            receiver,
        )
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_max_sleep(mut self, max_sleep: TokioDuration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, PendingAlarms>, InfraError> {
        self.pending
            .lock()
            .map_err(|error| InfraError::Scheduler(format!("alarm table lock poisoned: {error}")))
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn schedule(&self, name: &str, when: DateTime<Utc>) -> Result<(), InfraError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|error| InfraError::Scheduler(format!("no async runtime: {error}")))?;
        let mut pending = self.lock_pending()?;
        pending.next_generation += 1;
        let generation = pending.next_generation;

        let sender = self.sender.clone();
        let table = Arc::clone(&self.pending);
        let alarm_name = name.to_string();
        let now_provider = Arc::clone(&self.now_provider);
        let max_sleep = self.max_sleep;
        let handle = runtime.spawn(async move {
            loop {
                let remaining = (when - (now_provider)())
                    .to_std()
                    .unwrap_or(TokioDuration::ZERO);
                if remaining.is_zero() {
                    break;
                }
                sleep(remaining.min(max_sleep)).await;
            }
            if let Ok(mut pending) = table.lock() {
                let current = pending
                    .alarms
                    .get(&alarm_name)
                    .is_some_and(|alarm| alarm.generation == generation);
                if !current {
                    return;
                }
                pending.alarms.remove(&alarm_name);
            }
            tracing::debug!(alarm = %alarm_name, "alarm fired");
            let _ = sender.send(AlarmEvent {
                name: alarm_name,
                scheduled_for: when,
            });
        });

        if let Some(previous) = pending.alarms.insert(
            name.to_string(),
            PendingAlarm {
                when,
                generation,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        tracing::debug!(alarm = name, when = %when.to_rfc3339(), "alarm scheduled");
        Ok(())
    }

    fn cancel(&self, name: &str) -> Result<bool, InfraError> {
        let mut pending = self.lock_pending()?;
        match pending.alarms.remove(name) {
            Some(alarm) => {
                alarm.handle.abort();
                tracing::debug!(alarm = name, "alarm cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scheduled(&self, name: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
        Ok(self.lock_pending()?.alarms.get(name).map(|alarm| alarm.when))
    }
}

/// Alarms driven by an external clock: nothing fires until [`fire_due`] is called.
///
/// [`fire_due`]: ManualAlarmScheduler::fire_due
#[derive(Debug, Default)]
pub struct ManualAlarmScheduler {
    alarms: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ManualAlarmScheduler {
    pub fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<AlarmEvent>, InfraError> {
        let mut alarms = self.lock_alarms()?;
        let mut due = alarms
            .iter()
            .filter(|(_, when)| **when <= now)
            .map(|(name, when)| AlarmEvent {
                name: name.clone(),
                scheduled_for: *when,
            })
            .collect::<Vec<_>>();
        due.sort_by_key(|event| event.scheduled_for);
        for event in &due {
            alarms.remove(&event.name);
        }
        Ok(due)
    }

    pub fn pending_count(&self) -> Result<usize, InfraError> {
        Ok(self.lock_alarms()?.len())
    }

    fn lock_alarms(&self) -> Result<MutexGuard<'_, HashMap<String, DateTime<Utc>>>, InfraError> {
        self.alarms
            .lock()
            .map_err(|error| InfraError::Scheduler(format!("alarm table lock poisoned: {error}")))
    }
}

impl AlarmScheduler for ManualAlarmScheduler {
    fn schedule(&self, name: &str, when: DateTime<Utc>) -> Result<(), InfraError> {
        self.lock_alarms()?.insert(name.to_string(), when);
        Ok(())
    }

    fn cancel(&self, name: &str) -> Result<bool, InfraError> {
        Ok(self.lock_alarms()?.remove(name).is_some())
    }

    fn scheduled(&self, name: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
        Ok(self.lock_alarms()?.get(name).copied())
    }
}
