//! 스케줄과 토큰을 JSON 파일 하나에 보관하는 저장소.
//!
//! 변경할 때마다 전체 문서를 임시 파일에 쓴 뒤 교체한다.
//! 비동기 포트에서는 파일 쓰기를 blocking 스레드로 넘기고, 문서 잠금은 직렬화까지만 잡는다.
//! CLI의 `auth start`/`auth finish`가 별도 프로세스이므로 OAuth state도 파일에 남긴다.
//! rate-limit 창은 프로세스 안에서만 의미가 있어 메모리에 둔다.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::ports::{ScheduleRepository, StateStore, TokenRepository};
use crate::domain::provider::ProviderRef;
use crate::domain::schedule::Schedule;
use crate::domain::token::{OAuthState, TokenRecord};
use crate::infrastructure::store::InMemoryStateStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    schedules: Vec<Schedule>,
    #[serde(default)]
    tokens: Vec<TokenRecord>,
    #[serde(default)]
    oauth_states: Vec<OAuthState>,
    #[serde(skip)]
    revision: u64,
}

/// 특정 revision의 직렬화된 문서.
struct Snapshot {
    revision: u64,
    body: String,
}

pub struct JsonFileStore {
    /// None이면 디스크에 쓰지 않는다.
    path: Option<PathBuf>,
    doc: Mutex<StoreDocument>,
    /// 디스크에 마지막으로 쓴 revision. 파일을 쓰는 동안 잡고 있는다.
    written: Arc<Mutex<u64>>,
    windows: InMemoryStateStore,
}

impl JsonFileStore {
    /// 파일이 없으면 빈 저장소로 시작한다.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read store: {}", path.display()))?;
            if raw.trim().is_empty() {
                StoreDocument::default()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid store json: {}", path.display()))?
            }
        } else {
            StoreDocument::default()
        };
        debug!(
            path = %path.display(),
            schedules = doc.schedules.len(),
            tokens = doc.tokens.len(),
            "store opened"
        );
        Ok(Self {
            path: Some(path),
            doc: Mutex::new(doc),
            written: Arc::default(),
            windows: InMemoryStateStore::default(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: Mutex::new(StoreDocument::default()),
            written: Arc::default(),
            windows: InMemoryStateStore::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, StoreDocument> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 문서를 바꾸고, 파일 저장소면 새 revision의 스냅샷을 만든다.
    fn change<T>(
        &self,
        apply: impl FnOnce(&mut StoreDocument) -> T,
    ) -> Result<(T, Option<Snapshot>)> {
        let mut doc = self.lock();
        let out = apply(&mut doc);
        if self.path.is_none() {
            return Ok((out, None));
        }
        doc.revision += 1;
        let body = serde_json::to_string_pretty(&*doc).context("failed to serialize store")?;
        let snapshot = Snapshot {
            revision: doc.revision,
            body,
        };
        Ok((out, Some(snapshot)))
    }

    /// 동기 경로(`StateStore`)용. 호출 스레드에서 바로 쓴다.
    fn mutate<T>(&self, apply: impl FnOnce(&mut StoreDocument) -> T) -> Result<T> {
        let (out, snapshot) = self.change(apply)?;
        if let (Some(path), Some(snapshot)) = (&self.path, snapshot) {
            write_snapshot(path, &self.written, snapshot)?;
        }
        Ok(out)
    }

    async fn mutate_async<T>(&self, apply: impl FnOnce(&mut StoreDocument) -> T) -> Result<T> {
        let (out, snapshot) = self.change(apply)?;
        if let (Some(path), Some(snapshot)) = (self.path.clone(), snapshot) {
            let written = Arc::clone(&self.written);
            tokio::task::spawn_blocking(move || write_snapshot(&path, &written, snapshot))
                .await
                .context("store write task failed")??;
        }
        Ok(out)
    }
}

/// 스냅샷을 임시 파일에 쓰고 교체한다. 이미 더 새 revision이 기록됐으면 건너뛴다.
fn write_snapshot(path: &Path, written: &Mutex<u64>, snapshot: Snapshot) -> Result<()> {
    let mut last = written.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if snapshot.revision <= *last {
        debug!(revision = snapshot.revision, latest = *last, "stale store snapshot skipped");
        return Ok(());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create store dir: {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, format!("{}\n", snapshot.body))
        .with_context(|| format!("failed to write store: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace store: {}", path.display()))?;
    *last = snapshot.revision;
    Ok(())
}

#[async_trait]
impl ScheduleRepository for JsonFileStore {
    async fn list_active_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self
            .lock()
            .schedules
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn list_schedules(&self, user_id: &str) -> Result<Vec<Schedule>> {
        let mut out: Vec<Schedule> = self
            .lock()
            .schedules
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Option<Schedule>> {
        Ok(self
            .lock()
            .schedules
            .iter()
            .find(|s| s.user_id == user_id && s.id == schedule_id)
            .cloned())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<()> {
        if self.lock().schedules.iter().any(|s| s.id == schedule.id) {
            anyhow::bail!("schedule id already exists: {}", schedule.id);
        }
        self.mutate_async(|doc| doc.schedules.push(schedule.clone()))
            .await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<bool> {
        self.mutate_async(|doc| {
            match doc
                .schedules
                .iter_mut()
                .find(|s| s.user_id == schedule.user_id && s.id == schedule.id)
            {
                Some(slot) => {
                    *slot = schedule.clone();
                    true
                }
                None => false,
            }
        })
        .await
    }

    async fn delete_schedule(&self, user_id: &str, schedule_id: &str) -> Result<bool> {
        self.mutate_async(|doc| {
            let before = doc.schedules.len();
            doc.schedules
                .retain(|s| !(s.user_id == user_id && s.id == schedule_id));
            doc.schedules.len() != before
        })
        .await
    }

    async fn record_check(&self, schedule_id: &str, checked_at: DateTime<Utc>) -> Result<()> {
        self.mutate_async(|doc| {
            if let Some(s) = doc.schedules.iter_mut().find(|s| s.id == schedule_id) {
                s.last_checked_at = Some(checked_at);
            }
        })
        .await
    }
}

#[async_trait]
impl TokenRepository for JsonFileStore {
    async fn get_token(&self, user_id: &str, provider: &ProviderRef) -> Result<Option<TokenRecord>> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .find(|t| t.user_id == user_id && &t.provider == provider)
            .cloned())
    }

    async fn save_token(&self, record: &TokenRecord) -> Result<()> {
        self.mutate_async(|doc| {
            match doc
                .tokens
                .iter_mut()
                .find(|t| t.user_id == record.user_id && t.provider == record.provider)
            {
                Some(slot) => *slot = record.clone(),
                None => doc.tokens.push(record.clone()),
            }
        })
        .await
    }

    async fn delete_token(&self, user_id: &str, provider: &ProviderRef) -> Result<()> {
        self.mutate_async(|doc| {
            doc.tokens
                .retain(|t| !(t.user_id == user_id && &t.provider == provider));
        })
        .await
    }
}

impl StateStore for JsonFileStore {
    fn put_oauth_state(&self, state: OAuthState) {
        let stored = self.mutate(|doc| {
            doc.oauth_states.retain(|s| s.state != state.state);
            doc.oauth_states.push(state);
        });
        if let Err(err) = stored {
            warn!(error = %format!("{err:#}"), "failed to persist oauth state");
        }
    }

    fn take_oauth_state(&self, state: &str) -> Option<OAuthState> {
        let taken = self.mutate(|doc| {
            let index = doc.oauth_states.iter().position(|s| s.state == state)?;
            Some(doc.oauth_states.remove(index))
        });
        match taken {
            Ok(found) => found,
            // 소비 기록을 못 남기면 재사용될 수 있으므로 꺼내지 않는다
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to consume oauth state");
                None
            }
        }
    }

    fn purge_expired_states(&self, now: DateTime<Utc>) -> usize {
        let purged = self.mutate(|doc| {
            let before = doc.oauth_states.len();
            doc.oauth_states.retain(|s| !s.is_expired(now));
            before - doc.oauth_states.len()
        });
        purged.unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "failed to purge oauth states");
            0
        })
    }

    fn try_acquire_slot(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        self.windows.try_acquire_slot(key, limit, window, now)
    }
}
