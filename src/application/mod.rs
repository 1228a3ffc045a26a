pub mod blocked_page;
pub mod blocking_rules;
pub mod bootstrap;
pub mod commands;
pub mod lock_controller;
pub mod popup;
