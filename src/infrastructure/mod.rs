pub mod alarm_scheduler;
pub mod config;
pub mod error;
pub mod lock_state_repository;
pub mod rule_store;
pub mod storage;
