//! 제공자 REST 호출 공통부: 상태 코드 분류, Retry-After 해석, 레이트 리밋/재시도 적용.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::retry::RetryPolicy;
use crate::domain::error::ProviderError;
use crate::domain::provider::ProviderKind;
use crate::infrastructure::rate_limit::RateLimiter;

pub const USER_AGENT: &str = concat!("prdigest/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 500;
/// 목록 API 페이지 수 상한. 비정상적으로 큰 계정에서 무한 페이지를 막는다.
pub const MAX_PAGES: u32 = 20;
pub const PAGE_SIZE: u32 = 100;

/// 타임아웃이 적용된 공유 reqwest 클라이언트를 만든다.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build http client")
}

/// 설정 override가 있으면 그 값을, 없으면 기본 base URL을 쓴다. 끝의 `/`는 뗀다.
pub fn api_base(configured: Option<&str>, default: &str) -> String {
    configured
        .map(|b| b.trim().trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// 제공자 하나에 묶인 HTTP 호출기. 모든 요청은 공유 레이트 리미터를 거친다.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    provider: ProviderKind,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(client: Client, provider: ProviderKind, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            client,
            provider,
            limiter,
            retry,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// 한 번만 보낸다. 비정상 상태는 `ProviderError`로 분류한다.
    pub async fn send_once(&self, request: RequestBuilder) -> Result<Response> {
        self.limiter.acquire(self.provider).await;
        let response = request.send().await.map_err(|err| ProviderError::Network {
            provider: self.provider,
            message: err.to_string(),
        })?;
        classify_response(self.provider, response).await
    }

    /// 멱등 조회: 재시도 가능한 실패는 백오프 후 다시 시도하고 JSON으로 해석한다.
    pub async fn get_json<T, F>(&self, operation: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        self.retry
            .run(operation, || async move {
                let response = self.send_once(build()).await?;
                decode_json(self.provider, response).await
            })
            .await
            .with_context(|| format!("{}: {operation} failed", self.provider))
    }
}

/// 2xx 본문을 JSON으로 해석한다.
pub async fn decode_json<T: DeserializeOwned>(provider: ProviderKind, response: Response) -> Result<T> {
    let body = response.text().await.map_err(|err| ProviderError::Network {
        provider,
        message: err.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|err| {
        ProviderError::InvalidResponse {
            provider,
            message: format!("{err}: {}", truncate_for_error(&body)),
        }
        .into()
    })
}

/// 상태 코드 분류: 401 → TokenExpired, 429 → RateLimited, 5xx → Server, 그 밖 → Rejected.
pub async fn classify_response(provider: ProviderKind, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(provider, status, retry_after, &body).into())
}

pub fn classify_status(
    provider: ProviderKind,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let body = truncate_for_error(body);
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::TokenExpired { provider },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider,
            retry_after,
        },
        s if s.is_server_error() => ProviderError::Server {
            provider,
            status: s.as_u16(),
            body,
        },
        s => ProviderError::Rejected {
            provider,
            status: s.as_u16(),
            body,
        },
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// 초 단위(정수/소수) Retry-After 값. HTTP-date 형식은 무시한다.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs = raw.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_millis((secs * 1000.0).round() as u64))
}

pub fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...");
    out
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_error_classes() {
        let kind = ProviderKind::GitLab;
        assert!(classify_status(kind, StatusCode::UNAUTHORIZED, None, "").is_token_expired());
        assert!(matches!(
            classify_status(kind, StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3)), ""),
            ProviderError::RateLimited {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(3)
        ));
        let server = classify_status(kind, StatusCode::BAD_GATEWAY, None, "oops");
        assert!(server.is_retryable());
        let rejected = classify_status(kind, StatusCode::NOT_FOUND, None, "missing");
        assert!(!rejected.is_retryable());
        assert!(matches!(rejected, ProviderError::Rejected { status: 404, .. }));
    }

    #[test]
    fn retry_after_accepts_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(800);
        assert_eq!(truncate_for_error(&body).chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }
}
