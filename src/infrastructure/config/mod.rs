//! prdigest 설정(JSON) 로딩 모듈.
//! 시스템/사용자/프로젝트/환경변수 경로 순으로 덮어쓰며, OAuth 앱 자격 증명 해석과 점검 출력을 함께 맡는다.

mod inspection;
mod loader;
mod resolve;

use anyhow::{Context, Result};

use crate::application::config::Config;

pub use inspection::{ConfigInspection, EffectiveDefaults, ProviderInspection};
pub use loader::config_paths;
pub use resolve::{ClientCredentials, CredentialResolution, resolve_client_credentials};

pub fn load_config() -> Result<Config> {
    let merged = loader::load_merged_config()?;
    Ok(merged.config)
}

/// 탐색 경로, 실제로 읽은 경로, 제공자별 자격 증명 출처.
pub fn inspect_config() -> Result<ConfigInspection> {
    loader::load_merged_config().map(ConfigInspection::from_loaded)
}

pub fn inspect_pretty_json() -> Result<String> {
    serde_json::to_string_pretty(&inspect_config()?).context("failed to render config inspection")
}
