//! 파이프라인 전반에서 분류가 필요한 오류 타입.
//!
//! 유스케이스는 `anyhow`로 전파하고, 분기가 필요한 지점에서만
//! `downcast_ref::<ProviderError>()`로 종류를 판별한다.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::provider::ProviderKind;

/// 외부 제공자 호출 실패 분류.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 401 또는 갱신 불가능한 만료 토큰. 재인증이 필요하다.
    #[error("{provider}: token expired or revoked")]
    TokenExpired { provider: ProviderKind },

    /// HTTP 429. 제공자가 Retry-After를 주면 함께 보관한다.
    #[error("{provider}: rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: ProviderKind,
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx. 멱등 조회라면 재시도 대상이다.
    #[error("{provider}: server error ({status}): {body}")]
    Server {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    /// 그 밖의 비정상 상태 코드. 재시도하지 않는다.
    #[error("{provider}: request rejected ({status}): {body}")]
    Rejected {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    /// 상태 코드 없이 끊긴 전송 계층 실패(DNS/연결/타임아웃).
    #[error("{provider}: network error: {message}")]
    Network {
        provider: ProviderKind,
        message: String,
    },

    /// 2xx지만 본문이 기대한 형태가 아님.
    #[error("{provider}: unexpected response: {message}")]
    InvalidResponse {
        provider: ProviderKind,
        message: String,
    },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::TokenExpired { provider }
            | Self::RateLimited { provider, .. }
            | Self::Server { provider, .. }
            | Self::Rejected { provider, .. }
            | Self::Network { provider, .. }
            | Self::InvalidResponse { provider, .. } => *provider,
        }
    }

    /// 일반 재시도 핸들러가 다시 시도해도 되는 오류인지.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network { .. }
        )
    }

    pub fn is_token_expired(&self) -> bool {
        matches!(self, Self::TokenExpired { .. })
    }
}

/// `anyhow::Error` 체인 안의 `ProviderError`를 찾는다.
pub fn provider_error(err: &anyhow::Error) -> Option<&ProviderError> {
    err.downcast_ref::<ProviderError>()
}

/// 편집 경계에서 거부된 단일 필드 오류.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// 스케줄/필터/크론 검증 실패. 필드 단위 오류를 모두 모아 반환한다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn extend_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for err in other.errors {
            self.errors.push(FieldError {
                field: format!("{prefix}.{}", err.field),
                message: err.message,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// 오류가 없으면 `Ok(())`, 있으면 자기 자신을 오류로 돌려준다.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed: ")?;
        let rendered = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}

impl std::error::Error for ValidationErrors {}
