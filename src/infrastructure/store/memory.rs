//! 단일 프로세스용 `StateStore` 구현.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::application::ports::StateStore;
use crate::domain::token::OAuthState;

#[derive(Default)]
pub struct InMemoryStateStore {
    states: Mutex<HashMap<String, OAuthState>>,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateStore for InMemoryStateStore {
    fn put_oauth_state(&self, state: OAuthState) {
        lock(&self.states).insert(state.state.clone(), state);
    }

    fn take_oauth_state(&self, state: &str) -> Option<OAuthState> {
        lock(&self.states).remove(state)
    }

    fn purge_expired_states(&self, now: DateTime<Utc>) -> usize {
        let mut states = lock(&self.states);
        let before = states.len();
        states.retain(|_, s| !s.is_expired(now));
        before - states.len()
    }

    fn try_acquire_slot(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        let mut windows = lock(&self.windows);
        let slots = windows.entry(key.to_string()).or_default();
        while let Some(&oldest) = slots.front() {
            if now.saturating_duration_since(oldest) >= window {
                slots.pop_front();
            } else {
                break;
            }
        }
        if slots.len() >= limit as usize {
            return false;
        }
        slots.push_back(now);
        true
    }
}
