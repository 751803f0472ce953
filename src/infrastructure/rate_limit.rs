//! 제공자별 sliding-window 레이트 리미터.
//!
//! 카운터는 `StateStore`에 있으므로 같은 저장소를 공유하는 모든 호출자가
//! 같은 한도를 나눠 쓴다. 슬롯이 없으면 거절하지 않고 poll 간격마다 다시 확인한다.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::application::config::{Config, RateLimit};
use crate::application::ports::StateStore;
use crate::domain::provider::{ProviderKind, ProviderRole};

pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    git: RateLimit,
    messaging: RateLimit,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, config: &Config) -> Self {
        Self {
            store,
            git: config.rate_limit(ProviderRole::Git),
            messaging: config.rate_limit(ProviderRole::Messaging),
        }
    }

    pub fn with_limits(store: Arc<dyn StateStore>, git: RateLimit, messaging: RateLimit) -> Self {
        Self {
            store,
            git,
            messaging,
        }
    }

    pub fn limit_for(&self, provider: ProviderKind) -> RateLimit {
        match provider.role() {
            ProviderRole::Git => self.git,
            ProviderRole::Messaging => self.messaging,
        }
    }

    /// 슬롯을 얻을 때까지 기다린다.
    pub async fn acquire(&self, provider: ProviderKind) {
        let limit = self.limit_for(provider);
        let key = format!("rate:{provider}");
        let mut waited = 0u32;
        while !self
            .store
            .try_acquire_slot(&key, limit.max_requests, limit.window, Instant::now())
        {
            if waited == 0 {
                debug!(%provider, max = limit.max_requests, "rate limit reached, waiting for a slot");
            }
            waited += 1;
            tokio::time::sleep(limit.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::InMemoryStateStore;
    use std::time::Duration;

    fn limit(max: u32, window_ms: u64) -> RateLimit {
        RateLimit {
            max_requests: max,
            window: Duration::from_millis(window_ms),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn waits_until_window_frees_a_slot() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::default());
        let limiter = RateLimiter::with_limits(store, limit(2, 150), limit(50, 60_000));

        let started = Instant::now();
        limiter.acquire(ProviderKind::GitHub).await;
        limiter.acquire(ProviderKind::GitHub).await;
        assert!(started.elapsed() < Duration::from_millis(100));

        limiter.acquire(ProviderKind::GitHub).await;
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn providers_have_independent_counters() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::default());
        let limiter = RateLimiter::with_limits(store, limit(1, 60_000), limit(1, 60_000));
        let started = Instant::now();
        limiter.acquire(ProviderKind::GitHub).await;
        limiter.acquire(ProviderKind::GitLab).await;
        limiter.acquire(ProviderKind::Slack).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_window() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::default());
        let limiter = Arc::new(RateLimiter::with_limits(store.clone(), limit(3, 60_000), limit(3, 60_000)));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire(ProviderKind::Discord).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(!store.try_acquire_slot("rate:discord", 3, Duration::from_secs(60), Instant::now()));
    }
}
