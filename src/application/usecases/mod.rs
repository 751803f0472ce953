pub mod dispatch;
pub mod inspect_config;
pub mod manage_schedules;
pub mod provider_catalog;
pub mod token_manager;
