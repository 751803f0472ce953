//! OAuth 앱 자격 증명(client id/secret)을 실제 런타임 값으로 해석한다.
//!
//! - 환경변수 접근은 인프라 계층에서만 수행한다.
//! - 우선순위: 설정 inline 값 > 설정에 지정한 env > 기본 env(`<KIND>_CLIENT_ID` 등).

use std::env;

use crate::application::config::ProviderConfig;
use crate::domain::provider::ProviderKind;

/// 값 하나의 해석 결과와 출처 라벨.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialResolution {
    pub value: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: CredentialResolution,
    pub client_secret: CredentialResolution,
}

pub fn resolve_client_credentials(kind: ProviderKind, cfg: Option<&ProviderConfig>) -> ClientCredentials {
    let upper = kind.as_str().to_ascii_uppercase();
    ClientCredentials {
        client_id: resolve_value(
            cfg.and_then(|c| c.client_id.as_deref()),
            cfg.and_then(|c| c.client_id_env.as_deref()),
            &format!("{upper}_CLIENT_ID"),
        ),
        client_secret: resolve_value(
            cfg.and_then(|c| c.client_secret.as_deref()),
            cfg.and_then(|c| c.client_secret_env.as_deref()),
            &format!("{upper}_CLIENT_SECRET"),
        ),
    }
}

fn resolve_value(inline: Option<&str>, env_name: Option<&str>, default_env: &str) -> CredentialResolution {
    if let Some(value) = inline.map(str::trim).filter(|v| !v.is_empty()) {
        return CredentialResolution {
            value: Some(value.to_string()),
            source: Some("inline".to_string()),
        };
    }

    let env_name = env_name
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default_env);
    match env::var(env_name).ok().map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => CredentialResolution {
            value: Some(v),
            source: Some(format!("env:{env_name}")),
        },
        _ => CredentialResolution {
            value: None,
            source: Some(format!("env:{env_name} (missing)")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_value_wins_over_env() {
        let cfg = ProviderConfig {
            client_id: Some("  inline-id ".into()),
            client_id_env: Some("PRDIGEST_TEST_UNUSED_ID".into()),
            ..ProviderConfig::default()
        };
        let creds = resolve_client_credentials(ProviderKind::Slack, Some(&cfg));
        assert_eq!(creds.client_id.value.as_deref(), Some("inline-id"));
        assert_eq!(creds.client_id.source.as_deref(), Some("inline"));
    }

    #[test]
    fn missing_env_is_labelled() {
        let cfg = ProviderConfig {
            client_secret_env: Some("PRDIGEST_TEST_SURELY_UNSET_SECRET".into()),
            ..ProviderConfig::default()
        };
        let creds = resolve_client_credentials(ProviderKind::Teams, Some(&cfg));
        assert!(creds.client_secret.value.is_none());
        assert_eq!(
            creds.client_secret.source.as_deref(),
            Some("env:PRDIGEST_TEST_SURELY_UNSET_SECRET (missing)")
        );
    }

    #[test]
    fn default_env_name_follows_provider_kind() {
        let creds = resolve_client_credentials(ProviderKind::Bitbucket, None);
        let source = creds.client_id.source.unwrap_or_default();
        assert!(source.starts_with("env:BITBUCKET_CLIENT_ID"));
    }
}
