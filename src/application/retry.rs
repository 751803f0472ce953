//! 지수 백오프 재시도 실행기.
//!
//! 재시도 대상은 `ProviderError::is_retryable()`인 오류(429/5xx/네트워크)뿐이다.
//! 메시지 전송은 이 실행기를 거치지 않는다.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::warn;

use crate::application::config::Config;
use crate::domain::error::{ProviderError, provider_error};

/// Retry-After가 비정상적으로 클 때 기다리는 최대 시간.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries(),
            base_delay: config.retry_base_delay(),
            jitter: true,
        }
    }

    /// 테스트용: 대기 없이 즉시 재시도한다.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// `attempt`번째(0부터) 재시도 전 대기 시간. base * 2^attempt + jitter.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(MAX_RETRY_AFTER);
        }
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        if !self.jitter || exp.is_zero() {
            return exp;
        }
        let max_jitter_ms = (exp.as_millis() as u64 / 2).max(1);
        exp + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
    }

    /// 재시도 가능한 오류면 최대 `max_retries`번 다시 시도하고, 마지막 오류를 그대로 돌려준다.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(classified) = provider_error(&err).filter(|e| e.is_retryable()) else {
                        return Err(err);
                    };
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    let retry_after = match classified {
                        ProviderError::RateLimited { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %classified,
                        "retrying provider call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
