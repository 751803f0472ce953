//! OAuth 토큰 레코드와 CSRF state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provider::{ProviderKind, ProviderRef};

/// 만료 판정 시 `expires_at`에서 미리 빼는 여유.
pub const EXPIRY_BUFFER_MINUTES: i64 = 5;
/// OAuth state 유효 시간.
pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// (사용자, 제공자 종류, 제공자 인스턴스)별 저장 토큰.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub provider: ProviderRef,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// 없으면 만료되지 않는 토큰
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Discord incoming webhook. 있으면 메시지 전송에 토큰 대신 사용한다.
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// `now > expires_at - 5분`이면 만료로 본다.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at - Duration::minutes(EXPIRY_BUFFER_MINUTES),
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind
    }

    /// 메신저 전송에 쓸 자격 증명. webhook이 있으면 우선한다.
    pub fn credential(&self) -> &str {
        self.webhook_url.as_deref().unwrap_or(&self.access_token)
    }

    /// 토큰 응답을 반영한다. 응답에 refresh token이 없으면 기존 값을 유지한다.
    pub fn apply_grant(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.access_token = grant.access_token;
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        // 표현할 수 없는 수명은 만료 없음으로 본다
        self.expires_at = grant
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        if grant.scope.is_some() {
            self.scope = grant.scope;
        }
        if grant.token_type.is_some() {
            self.token_type = grant.token_type;
        }
        if grant.webhook_url.is_some() {
            self.webhook_url = grant.webhook_url;
        }
        self.updated_at = now;
    }
}

/// 토큰 엔드포인트 응답을 정규화한 값.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// 초 단위 수명
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub webhook_url: Option<String>,
}

impl TokenGrant {
    pub fn into_record(self, user_id: &str, provider: ProviderRef, now: DateTime<Utc>) -> TokenRecord {
        let mut record = TokenRecord {
            user_id: user_id.to_string(),
            provider,
            access_token: String::new(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: None,
            webhook_url: None,
            updated_at: now,
        };
        record.apply_grant(self, now);
        record
    }
}

/// 인가 흐름 시작 시 발급하는 일회용 CSRF 상관 레코드.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub state: String,
    pub provider: ProviderRef,
    pub user_id: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
}

impl OAuthState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(OAUTH_STATE_TTL_MINUTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn record(expires_at: Option<DateTime<Utc>>) -> TokenRecord {
        TokenGrant {
            access_token: "at".into(),
            ..TokenGrant::default()
        }
        .into_record("u1", ProviderRef::new(ProviderKind::GitHub, "default"), now())
        .with_expiry(expires_at)
    }

    impl TokenRecord {
        fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
            self.expires_at = expires_at;
            self
        }
    }

    #[test]
    fn expiry_uses_five_minute_buffer() {
        assert!(!record(None).is_expired(now()));
        assert!(!record(Some(now() + Duration::minutes(6))).is_expired(now()));
        assert!(!record(Some(now() + Duration::minutes(5))).is_expired(now()));
        assert!(record(Some(now() + Duration::minutes(4))).is_expired(now()));
    }

    #[test]
    fn grant_without_refresh_token_keeps_previous_one() {
        let mut rec = record(None);
        rec.refresh_token = Some("rt-1".into());
        rec.apply_grant(
            TokenGrant {
                access_token: "at-2".into(),
                expires_in: Some(3600),
                ..TokenGrant::default()
            },
            now(),
        );
        assert_eq!(rec.access_token, "at-2");
        assert_eq!(rec.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(rec.expires_at, Some(now() + Duration::hours(1)));
    }

    #[test]
    fn out_of_range_lifetime_is_treated_as_non_expiring() {
        for expires_in in [i64::MAX, 1_000_000_000_000_000] {
            let rec = TokenGrant {
                access_token: "at".into(),
                expires_in: Some(expires_in),
                ..TokenGrant::default()
            }
            .into_record("u1", ProviderRef::new(ProviderKind::GitLab, "default"), now());
            assert_eq!(rec.expires_at, None);
            assert!(!rec.is_expired(now()));
        }
    }

    #[test]
    fn webhook_takes_precedence_as_credential() {
        let mut rec = record(None);
        assert_eq!(rec.credential(), "at");
        rec.webhook_url = Some("https://discord.test/hook".into());
        assert_eq!(rec.credential(), "https://discord.test/hook");
    }

    #[test]
    fn oauth_state_expires_after_ten_minutes() {
        let state = OAuthState {
            state: "s".into(),
            provider: ProviderRef::new(ProviderKind::Slack, "default"),
            user_id: "u1".into(),
            redirect_uri: "http://localhost/cb".into(),
            created_at: now(),
        };
        assert!(!state.is_expired(now() + Duration::minutes(10)));
        assert!(state.is_expired(now() + Duration::minutes(11)));
    }
}
