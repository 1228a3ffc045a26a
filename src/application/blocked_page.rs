use crate::domain::models::{format_countdown, LockState};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use rand::Rng;

pub const UNLOCKED_LABEL: &str = "Unlocked";

/// Browser tab operations available to the blocked page.
#[async_trait]
pub trait TabController: Send + Sync {
    async fn close_current_tab(&self) -> Result<(), InfraError>;
    async fn history_back(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackToWorkOutcome {
    TabClosed,
    NavigatedBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPage {
    message: Option<String>,
}

impl BlockedPage {
    pub fn new(messages: &[String]) -> Self {
        Self {
            message: pick_message(messages, &mut rand::rng()),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn remaining_label(&self, state: LockState, now_millis: i64) -> String {
        remaining_label(state, now_millis)
    }
}

pub fn pick_message<G: Rng>(messages: &[String], rng: &mut G) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    Some(messages[rng.random_range(0..messages.len())].clone())
}

pub fn remaining_label(state: LockState, now_millis: i64) -> String {
    if state.is_locked_at(now_millis) {
        format_countdown(state.remaining_millis_at(now_millis))
    } else {
        UNLOCKED_LABEL.to_string()
    }
}

/// Leaves the blocked page. Never touches the lock itself.
pub async fn back_to_work<T>(tabs: &T) -> BackToWorkOutcome
where
    T: TabController + ?Sized,
{
    match tabs.close_current_tab().await {
        Ok(()) => BackToWorkOutcome::TabClosed,
        Err(error) => {
            tracing::warn!(%error, "closing tab failed, navigating back");
            tabs.history_back().await;
            BackToWorkOutcome::NavigatedBack
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeTabs {
        fail_close: AtomicBool,
        close_calls: AtomicUsize,
        back_calls: AtomicUsize,
    }

    #[async_trait]
    impl TabController for FakeTabs {
        async fn close_current_tab(&self) -> Result<(), InfraError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_close.load(Ordering::SeqCst) {
                return Err(InfraError::TabOperation("no active tab".to_string()));
            }
            Ok(())
        }

        async fn history_back(&self) {
            self.back_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn back_to_work_closes_tab() {
        let tabs = FakeTabs::default();
        assert_eq!(back_to_work(&tabs).await, BackToWorkOutcome::TabClosed);
        assert_eq!(tabs.back_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn back_to_work_falls_back_to_history() {
        let tabs = FakeTabs::default();
        tabs.fail_close.store(true, Ordering::SeqCst);
        assert_eq!(back_to_work(&tabs).await, BackToWorkOutcome::NavigatedBack);
        assert_eq!(tabs.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(tabs.back_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remaining_label_counts_down_and_reports_unlocked() {
        assert_eq!(remaining_label(LockState::until(125_000), 0), "2:05");
        assert_eq!(remaining_label(LockState::until(125_000), 125_000), UNLOCKED_LABEL);
        assert_eq!(remaining_label(LockState::unlocked(), 0), UNLOCKED_LABEL);
    }

    #[test]
    fn message_comes_from_the_configured_list() {
        let messages = vec!["one".to_string(), "two".to_string()];
        for _ in 0..20 {
            let page = BlockedPage::new(&messages);
            let message = page.message().expect("message").to_string();
            assert!(messages.contains(&message));
        }
        assert_eq!(BlockedPage::new(&[]).message(), None);
    }
}
