//! 설정 파일 탐색/병합 로더.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use crate::application::config::{
    Config, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOOKBACK_MINUTES, DEFAULT_REDIRECT_URI,
    DEFAULT_SCHEDULE_TIMEOUT_SECS, DEFAULT_STORE_PATH,
};
use crate::domain::provider::ProviderKind;

pub const CONFIG_ENV: &str = "PRDIGEST_CONFIG";
const PROJECT_CONFIG: &str = ".prdigest/config.json";

#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    pub config: Config,
    pub searched_paths: Vec<PathBuf>,
    pub loaded_paths: Vec<PathBuf>,
}

/// 우선순위 경로를 순회해 JSON 설정을 병합한다.
pub(crate) fn load_merged_config() -> Result<LoadedConfig> {
    load_from_paths(config_paths(), bootstrap_target())
}

fn load_from_paths(paths: Vec<PathBuf>, bootstrap: Option<PathBuf>) -> Result<LoadedConfig> {
    // 낮은 우선순위에서 높은 우선순위 순서로 병합한다.
    let mut merged = Config::default();
    let mut loaded_paths = Vec::new();

    for path in &paths {
        if !path.exists() {
            continue;
        }
        merged.merge_from(read_config(path)?);
        loaded_paths.push(path.to_path_buf());
    }

    if loaded_paths.is_empty()
        && let Some(target) = bootstrap
    {
        // 최초 실행 시 로컬 기본 설정 템플릿을 만든다.
        write_template(&target)?;
        merged.merge_from(read_config(&target)?);
        loaded_paths.push(target);
    }

    Ok(LoadedConfig {
        config: merged,
        searched_paths: paths,
        loaded_paths,
    })
}

fn read_config(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse JSON in {}", path.display()))
}

/// 시스템 + 사용자 + 프로젝트 + 명시 경로 순으로 병합 경로를 구성한다.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/prdigest/config.json")];

    if let Some(base) = dirs::config_dir() {
        paths.push(base.join("prdigest").join("config.json"));
    }

    paths.push(PathBuf::from(PROJECT_CONFIG));

    if let Ok(path) = env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(path));
    }

    dedup_paths(paths)
}

fn bootstrap_target() -> Option<PathBuf> {
    match env::var(CONFIG_ENV) {
        Ok(path) => Some(PathBuf::from(path)),
        Err(_) => Some(PathBuf::from(PROJECT_CONFIG)),
    }
}

fn write_template(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        return Ok(());
    }
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let rendered = serde_json::to_string_pretty(&template())?;
    fs::write(config_path, format!("{rendered}\n"))
        .with_context(|| format!("failed to create config template at {}", config_path.display()))
}

fn template() -> serde_json::Value {
    let mut providers = serde_json::Map::new();
    for kind in ProviderKind::ALL {
        let upper = kind.as_str().to_ascii_uppercase();
        providers.insert(
            kind.as_str().to_string(),
            json!({
                "client_id_env": format!("{upper}_CLIENT_ID"),
                "client_secret_env": format!("{upper}_CLIENT_SECRET"),
            }),
        );
    }
    json!({
        "defaults": {
            "lookback_minutes": DEFAULT_LOOKBACK_MINUTES,
            "schedule_timeout_secs": DEFAULT_SCHEDULE_TIMEOUT_SECS,
            "http_timeout_secs": DEFAULT_HTTP_TIMEOUT_SECS,
            "redirect_uri": DEFAULT_REDIRECT_URI,
            "store_path": DEFAULT_STORE_PATH,
            "plan": "free"
        },
        "rate_limits": {
            "git_per_minute": 60,
            "messaging_per_minute": 50
        },
        "retry": {
            "max_retries": 3,
            "base_delay_ms": 1000
        },
        "providers": providers
    })
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.json");
        fs::write(
            &base,
            r#"{"defaults":{"lookback_minutes":30,"user_id":"ana"},"providers":{"slack":{"client_id":"base"}}}"#,
        )
        .unwrap();
        fs::write(
            &local,
            r#"{"defaults":{"lookback_minutes":5},"providers":{"slack":{"client_secret":"s"}}}"#,
        )
        .unwrap();

        let loaded = load_from_paths(
            vec![base.clone(), dir.path().join("missing.json"), local.clone()],
            None,
        )
        .unwrap();
        assert_eq!(loaded.loaded_paths, vec![base, local]);
        assert_eq!(loaded.config.lookback(), chrono::Duration::minutes(5));
        assert_eq!(loaded.config.user_id(), "ana");
        let slack = loaded.config.provider(ProviderKind::Slack).unwrap();
        assert_eq!(slack.client_id.as_deref(), Some("base"));
        assert_eq!(slack.client_secret.as_deref(), Some("s"));
    }

    #[test]
    fn template_is_written_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cfg").join("config.json");
        let loaded = load_from_paths(vec![], Some(target.clone())).unwrap();
        assert!(target.exists());
        assert_eq!(loaded.loaded_paths, vec![target]);
        let github = loaded.config.provider(ProviderKind::GitHub).unwrap();
        assert_eq!(github.client_id_env.as_deref(), Some("GITHUB_CLIENT_ID"));
    }

    #[test]
    fn invalid_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ nope").unwrap();
        let err = load_from_paths(vec![bad], None).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }
}
