//! `ConfigRepository` 포트를 JSON 설정 로더에 연결한다.

use anyhow::Result;
use tracing::debug;

use crate::application::config::Config;
use crate::application::ports::ConfigRepository;
use crate::infrastructure::config::{inspect_pretty_json, load_config};

pub struct JsonConfigRepository;

impl ConfigRepository for JsonConfigRepository {
    fn load(&self) -> Result<Config> {
        let config = load_config()?;
        debug!(
            providers = config.providers.len(),
            store = %config.store_path(),
            plan = ?config.plan(),
            "config loaded"
        );
        Ok(config)
    }

    fn inspect_pretty_json(&self) -> Result<String> {
        inspect_pretty_json()
    }
}
