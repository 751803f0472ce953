//! 스케줄 CRUD 유스케이스. 모든 조회/변경은 소유 사용자 범위로 제한된다.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;

use crate::application::ports::ScheduleRepository;
use crate::domain::schedule::{PlanTier, Schedule, ScheduleDraft, ValidatedDraft};

pub struct ManageSchedulesUseCase<'a> {
    pub schedules: &'a dyn ScheduleRepository,
    pub plan: PlanTier,
}

impl<'a> ManageSchedulesUseCase<'a> {
    pub async fn list(&self, user_id: &str) -> Result<Vec<Schedule>> {
        self.schedules.list_schedules(user_id).await
    }

    pub async fn get(&self, user_id: &str, schedule_id: &str) -> Result<Schedule> {
        self.schedules
            .get_schedule(user_id, schedule_id)
            .await?
            .with_context(|| format!("schedule not found: {schedule_id}"))
    }

    /// 초안을 검증해 새 스케줄을 만든다. 등급 한도를 넘으면 거부한다.
    pub async fn create(
        &self,
        user_id: &str,
        draft: &ScheduleDraft,
        now: DateTime<Utc>,
    ) -> Result<Schedule> {
        let validated = draft.validate()?;

        let existing = self.schedules.list_schedules(user_id).await?.len();
        let limit = self.plan.max_schedules();
        if existing >= limit {
            bail!("plan limit reached: {existing} of {limit} schedules in use");
        }

        let schedule = build_schedule(new_schedule_id(), user_id, validated, now, now, None);
        self.schedules
            .insert_schedule(&schedule)
            .await
            .context("failed to store schedule")?;
        info!(schedule_id = %schedule.id, user_id, "schedule created");
        Ok(schedule)
    }

    /// 초안 전체로 교체한다. id/생성 시각/마지막 확인 시각은 유지한다.
    pub async fn update(
        &self,
        user_id: &str,
        schedule_id: &str,
        draft: &ScheduleDraft,
        now: DateTime<Utc>,
    ) -> Result<Schedule> {
        let current = self.get(user_id, schedule_id).await?;
        let validated = draft.validate()?;
        let schedule = build_schedule(
            current.id,
            user_id,
            validated,
            current.created_at,
            now,
            current.last_checked_at,
        );
        if !self.schedules.update_schedule(&schedule).await? {
            bail!("schedule not found: {schedule_id}");
        }
        info!(schedule_id, user_id, "schedule updated");
        Ok(schedule)
    }

    /// 활성/일시정지를 뒤집는다.
    pub async fn toggle(
        &self,
        user_id: &str,
        schedule_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Schedule> {
        let mut schedule = self.get(user_id, schedule_id).await?;
        schedule.active = !schedule.active;
        schedule.updated_at = now;
        if !self.schedules.update_schedule(&schedule).await? {
            bail!("schedule not found: {schedule_id}");
        }
        info!(schedule_id, user_id, active = schedule.active, "schedule toggled");
        Ok(schedule)
    }

    pub async fn delete(&self, user_id: &str, schedule_id: &str) -> Result<()> {
        if !self.schedules.delete_schedule(user_id, schedule_id).await? {
            bail!("schedule not found: {schedule_id}");
        }
        info!(schedule_id, user_id, "schedule deleted");
        Ok(())
    }
}

/// 편집 화면용: 저장된 스케줄을 초안 형태(현지 시간 크론)로 되돌린다.
pub fn draft_from_schedule(schedule: &Schedule) -> ScheduleDraft {
    let escalation = schedule.escalation.as_ref();
    ScheduleDraft {
        name: schedule.name.clone(),
        cron: schedule.display_cron(),
        timezone: schedule.timezone.clone(),
        git: Some(schedule.git.clone()),
        repositories: schedule.repositories.clone(),
        messaging: Some(schedule.messaging.clone()),
        channel_id: schedule.channel_id.clone(),
        escalation_messaging: escalation.map(|e| e.messaging.clone()),
        escalation_channel_id: escalation.map(|e| e.channel_id.clone()),
        escalation_days: escalation.map(|e| i64::from(e.threshold_days)),
        escalation_mentions: escalation.map(|e| e.mentions.clone()).unwrap_or_default(),
        filters: schedule.filters.clone(),
        send_when_empty: schedule.send_when_empty,
        active: schedule.active,
    }
}

fn build_schedule(
    id: String,
    user_id: &str,
    draft: ValidatedDraft,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
) -> Schedule {
    Schedule {
        id,
        user_id: user_id.to_string(),
        name: draft.name,
        cron_utc: draft.cron_utc,
        timezone: draft.timezone,
        git: draft.git,
        repositories: draft.repositories,
        messaging: draft.messaging,
        channel_id: draft.channel_id,
        escalation: draft.escalation,
        filters: draft.filters,
        send_when_empty: draft.send_when_empty,
        active: draft.active,
        last_checked_at,
        created_at,
        updated_at,
    }
}

fn new_schedule_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("sch_{}", suffix.to_ascii_lowercase())
}
