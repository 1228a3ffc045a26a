use crate::application::commands::IntentResponse;
use crate::domain::models::{format_countdown, LockStatus};
use crate::infrastructure::error::InfraError;

pub const REFRESH_INTERVAL_MS: u64 = 1_000;
pub const FLASH_VISIBLE_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupView {
    Unlocked,
    Locked { lock_end_time: i64 },
    ConfirmUnlock { lock_end_time: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashMessage {
    pub text: String,
    pub kind: FlashKind,
}

impl FlashMessage {
    fn success(text: &str) -> Self {
        Self {
            text: text.to_string(),
            kind: FlashKind::Success,
        }
    }

    fn error() -> Self {
        Self {
            text: "Something went wrong".to_string(),
            kind: FlashKind::Error,
        }
    }
}

/// What a refresh tick asks the popup to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshAction {
    Idle,
    Render(String),
    /// The countdown reached zero; poll status again.
    PollStatus,
}

/// Popup state. Every view is derived from a status poll plus the chosen duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupModel {
    view: PopupView,
    presets: Vec<u32>,
    selected_duration: Option<u32>,
    flash: Option<FlashMessage>,
    flash_ticks_left: u64,
}

impl PopupModel {
    pub fn new(presets: Vec<u32>, status: LockStatus) -> Self {
        let mut model = Self {
            view: PopupView::Unlocked,
            presets,
            selected_duration: None,
            flash: None,
            flash_ticks_left: 0,
        };
        model.apply_status(status);
        model
    }

    pub fn view(&self) -> PopupView {
        self.view
    }

    pub fn presets(&self) -> &[u32] {
        &self.presets
    }

    pub fn selected_duration(&self) -> Option<u32> {
        self.selected_duration
    }

    pub fn flash(&self) -> Option<&FlashMessage> {
        self.flash.as_ref()
    }

    pub fn clear_flash(&mut self) {
        self.flash = None;
        self.flash_ticks_left = 0;
    }

    fn show_flash(&mut self, flash: FlashMessage) {
        self.flash = Some(flash);
        self.flash_ticks_left = FLASH_VISIBLE_MS / REFRESH_INTERVAL_MS;
    }

    pub fn can_start(&self) -> bool {
        self.view == PopupView::Unlocked && self.selected_duration.is_some()
    }

    pub fn select_duration(&mut self, minutes: u32) -> Result<(), InfraError> {
        if !self.presets.contains(&minutes) {
            return Err(InfraError::InvalidInput(format!(
                "{minutes} minutes is not an offered duration"
            )));
        }
        self.selected_duration = Some(minutes);
        Ok(())
    }

    /// Any poll that finds the lock gone drops back to the unlocked view.
    pub fn apply_status(&mut self, status: LockStatus) {
        self.view = match (status.is_locked, status.lock_end_time, self.view) {
            (true, Some(lock_end_time), PopupView::ConfirmUnlock { .. }) => {
                PopupView::ConfirmUnlock { lock_end_time }
            }
            (true, Some(lock_end_time), _) => PopupView::Locked { lock_end_time },
            _ => PopupView::Unlocked,
        };
    }

    pub fn on_start_result(&mut self, response: &IntentResponse, status: LockStatus) {
        if response.success {
            self.show_flash(FlashMessage::success("Lock started"));
            self.apply_status(status);
        } else {
            self.show_flash(FlashMessage::error());
        }
    }

    pub fn request_unlock(&mut self, status: LockStatus) {
        if let (true, Some(lock_end_time)) = (status.is_locked, status.lock_end_time) {
            self.view = PopupView::ConfirmUnlock { lock_end_time };
        }
    }

    pub fn cancel_unlock(&mut self, status: LockStatus) {
        if let (true, Some(lock_end_time)) = (status.is_locked, status.lock_end_time) {
            self.view = PopupView::Locked { lock_end_time };
        }
    }

    pub fn on_unlock_result(&mut self, response: &IntentResponse, status: LockStatus) {
        if response.success {
            self.show_flash(FlashMessage::success("Lock released"));
            self.apply_status(status);
        } else {
            self.show_flash(FlashMessage::error());
        }
    }

    /// One tick, every [`REFRESH_INTERVAL_MS`]. Also ages out the flash message.
    pub fn refresh(&mut self, now_millis: i64) -> RefreshAction {
        if self.flash.is_some() {
            self.flash_ticks_left = self.flash_ticks_left.saturating_sub(1);
            if self.flash_ticks_left == 0 {
                self.clear_flash();
            }
        }

        let lock_end_time = match self.view {
            PopupView::Unlocked => return RefreshAction::Idle,
            PopupView::Locked { lock_end_time } | PopupView::ConfirmUnlock { lock_end_time } => {
                lock_end_time
            }
        };
        let remaining = lock_end_time - now_millis;
        if remaining <= 0 {
            RefreshAction::PollStatus
        } else {
            RefreshAction::Render(format_countdown(remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked(lock_end_time: i64) -> LockStatus {
        LockStatus {
            is_locked: true,
            lock_end_time: Some(lock_end_time),
        }
    }

    fn unlocked() -> LockStatus {
        LockStatus {
            is_locked: false,
            lock_end_time: None,
        }
    }

    fn ok() -> IntentResponse {
        IntentResponse::ok()
    }

    #[test]
    fn start_requires_a_selected_preset() {
        let mut model = PopupModel::new(vec![15, 30], unlocked());
        assert!(!model.can_start());
        assert!(model.select_duration(45).is_err());
        model.select_duration(30).expect("select preset");
        assert!(model.can_start());
        assert_eq!(model.selected_duration(), Some(30));
    }

    #[test]
    fn full_unlock_flow_walks_through_confirmation() {
        let mut model = PopupModel::new(vec![30], unlocked());
        model.select_duration(30).expect("select");

        model.on_start_result(&ok(), locked(1_800_000));
        assert_eq!(model.view(), PopupView::Locked { lock_end_time: 1_800_000 });
        assert_eq!(model.flash().map(|flash| flash.kind), Some(FlashKind::Success));

        model.request_unlock(locked(1_800_000));
        assert_eq!(model.view(), PopupView::ConfirmUnlock { lock_end_time: 1_800_000 });

        model.cancel_unlock(locked(1_800_000));
        assert_eq!(model.view(), PopupView::Locked { lock_end_time: 1_800_000 });

        model.request_unlock(locked(1_800_000));
        model.on_unlock_result(&ok(), unlocked());
        assert_eq!(model.view(), PopupView::Unlocked);
        assert_eq!(model.flash().map(|flash| flash.text.as_str()), Some("Lock released"));
    }

    #[test]
    fn failed_intent_keeps_view_and_flashes_error() {
        let mut model = PopupModel::new(vec![30], locked(60_000));
        model.request_unlock(locked(60_000));
        model.on_unlock_result(&IntentResponse::failed("disk full"), locked(60_000));

        assert_eq!(model.view(), PopupView::ConfirmUnlock { lock_end_time: 60_000 });
        assert_eq!(model.flash().map(|flash| flash.kind), Some(FlashKind::Error));
    }

    #[test]
    fn request_unlock_after_expiry_stays_put() {
        let mut model = PopupModel::new(vec![30], unlocked());
        model.request_unlock(LockStatus {
            is_locked: false,
            lock_end_time: Some(10),
        });
        assert_eq!(model.view(), PopupView::Unlocked);
    }

    #[test]
    fn refresh_counts_down_then_asks_for_poll() {
        let mut model = PopupModel::new(vec![30], locked(90_000));
        assert_eq!(model.refresh(25_000), RefreshAction::Render("1:05".to_string()));
        assert_eq!(model.refresh(90_000), RefreshAction::PollStatus);

        model.apply_status(LockStatus {
            is_locked: false,
            lock_end_time: Some(90_000),
        });
        assert_eq!(model.view(), PopupView::Unlocked);
        assert_eq!(model.refresh(95_000), RefreshAction::Idle);
    }

    #[test]
    fn flash_hides_after_three_refresh_ticks() {
        let mut model = PopupModel::new(vec![30], unlocked());
        model.on_start_result(&IntentResponse::failed("disk full"), unlocked());

        model.refresh(0);
        model.refresh(1_000);
        assert_eq!(model.flash().map(|flash| flash.kind), Some(FlashKind::Error));
        model.refresh(2_000);
        assert_eq!(model.flash(), None);

        model.on_start_result(&ok(), locked(600_000));
        assert!(model.flash().is_some());
        model.clear_flash();
        assert_eq!(model.flash(), None);
    }

    #[test]
    fn confirm_view_survives_status_poll_while_locked() {
        let mut model = PopupModel::new(vec![30], locked(90_000));
        model.request_unlock(locked(90_000));
        model.apply_status(locked(90_000));
        assert_eq!(model.view(), PopupView::ConfirmUnlock { lock_end_time: 90_000 });
    }
}
