//! 예약 다이제스트 일괄 실행(dispatch) 유스케이스.
//!
//! 스케줄마다 due 판정 → 조회 → 필터 → 포맷 → 전송 → 에스컬레이션 순으로
//! 진행한다. 개별 스케줄 실패는 기록만 하고 나머지 스케줄은 계속 처리한다.

mod deliver;
mod escalate;
mod fetch;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::application::config::Config;
use crate::application::ports::{Reporter, ScheduleRepository};
use crate::application::registry::ProviderRegistry;
use crate::application::usecases::token_manager::TokenManager;
use crate::domain::cron::is_due;
use crate::domain::digest::format_digest;
use crate::domain::filter::apply_filters;
use crate::domain::schedule::Schedule;

use deliver::deliver_message;
use escalate::run_escalation;
use fetch::fetch_pull_requests;

/// 한 번의 일괄 실행 옵션.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub now: DateTime<Utc>,
    /// 메시지를 보내지 않고 출력만 한다. 마지막 확인 시각도 기록하지 않는다.
    pub dry_run: bool,
    /// due 판정을 건너뛴다.
    pub force: bool,
    pub schedule_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub lookback: chrono::Duration,
    pub schedule_timeout: Duration,
    pub schedule_concurrency: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lookback: config.lookback(),
            schedule_timeout: config.schedule_timeout(),
            schedule_concurrency: config.schedule_concurrency(),
        }
    }
}

/// 스케줄 처리 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    DueCheck,
    Skipped,
    Fetching,
    Filtering,
    Formatting,
    Sending,
    Delivered,
    Escalating,
    Escalated,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::DueCheck => "due_check",
            Self::Skipped => "skipped",
            Self::Fetching => "fetching",
            Self::Filtering => "filtering",
            Self::Formatting => "formatting",
            Self::Sending => "sending",
            Self::Delivered => "delivered",
            Self::Escalating => "escalating",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 스케줄 하나의 실행 결과.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub schedule_id: String,
    pub user_id: String,
    /// 최종 상태
    pub stage: Stage,
    /// 실패했다면 실패 직전 단계
    pub failed_at: Option<Stage>,
    pub pull_requests: usize,
    /// 기본 채널로 메시지를 보냈는지(빈 결과 + send_when_empty=false면 false)
    pub primary_sent: bool,
    pub escalated: usize,
    pub escalation_error: Option<String>,
    pub error: Option<String>,
}

impl ScheduleReport {
    fn new(schedule: &Schedule) -> Self {
        Self {
            schedule_id: schedule.id.clone(),
            user_id: schedule.user_id.clone(),
            stage: Stage::Pending,
            failed_at: None,
            pull_requests: 0,
            primary_sent: false,
            escalated: 0,
            escalation_error: None,
            error: None,
        }
    }

    fn fail(&mut self, at: Stage, err: &anyhow::Error) {
        self.failed_at = Some(at);
        self.stage = Stage::Failed;
        self.error = Some(format!("{err:#}"));
    }
}

/// 일괄 실행 결과. 개별 실패가 있어도 배치 자체는 성공이다.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub schedules: Vec<ScheduleReport>,
}

impl BatchReport {
    pub fn count(&self, stage: Stage) -> usize {
        self.schedules.iter().filter(|r| r.stage == stage).count()
    }

    pub fn failed(&self) -> usize {
        self.count(Stage::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(Stage::Skipped)
    }

    pub fn delivered(&self) -> usize {
        self.count(Stage::Delivered) + self.count(Stage::Escalated)
    }
}

pub struct DispatchUseCase<'a> {
    pub schedules: &'a dyn ScheduleRepository,
    pub tokens: TokenManager<'a>,
    pub registry: &'a ProviderRegistry,
    pub reporter: &'a dyn Reporter,
    pub settings: DispatchSettings,
}

impl<'a> DispatchUseCase<'a> {
    /// 활성 스케줄 목록을 읽지 못한 경우에만 오류를 돌려준다.
    pub async fn execute(&self, options: &RunOptions) -> Result<BatchReport> {
        let mut schedules = self
            .schedules
            .list_active_schedules()
            .await
            .context("failed to load active schedules")?;
        if let Some(only) = &options.schedule_id {
            schedules.retain(|s| &s.id == only);
        }
        info!(
            count = schedules.len(),
            dry_run = options.dry_run,
            force = options.force,
            "dispatch started"
        );

        let reports = stream::iter(schedules)
            .map(|schedule| async move { self.run_schedule(schedule, options).await })
            .buffered(self.settings.schedule_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let batch = BatchReport { schedules: reports };
        info!(
            delivered = batch.delivered(),
            skipped = batch.skipped(),
            failed = batch.failed(),
            "dispatch finished"
        );
        Ok(batch)
    }

    async fn run_schedule(&self, schedule: Schedule, options: &RunOptions) -> ScheduleReport {
        let mut report = ScheduleReport::new(&schedule);
        let now = options.now;

        report.stage = Stage::DueCheck;
        let due = if options.force {
            Ok(true)
        } else {
            is_due(
                &schedule.cron_utc,
                schedule.last_checked_at,
                now,
                self.settings.lookback,
            )
            .map_err(anyhow::Error::from)
        };
        if !options.dry_run
            && let Err(err) = self.schedules.record_check(&schedule.id, now).await
        {
            warn!(schedule_id = %schedule.id, error = %format!("{err:#}"), "failed to record check time");
        }

        match due {
            Ok(true) => {}
            Ok(false) => {
                debug!(schedule_id = %schedule.id, cron = %schedule.cron_utc, "not due");
                report.stage = Stage::Skipped;
                return report;
            }
            Err(err) => {
                error!(schedule_id = %schedule.id, stage = %Stage::DueCheck, error = %format!("{err:#}"), "schedule failed");
                report.fail(Stage::DueCheck, &err);
                return report;
            }
        }

        let mut stage = Stage::Fetching;
        let outcome = tokio::time::timeout(
            self.settings.schedule_timeout,
            self.process(&schedule, options, &mut report, &mut stage),
        )
        .await
        .unwrap_or_else(|_| {
            Err(anyhow::anyhow!(
                "timed out after {}s",
                self.settings.schedule_timeout.as_secs()
            ))
        });

        match outcome {
            Ok(()) => {
                report.stage = stage;
                info!(
                    schedule_id = %schedule.id,
                    stage = %stage,
                    pull_requests = report.pull_requests,
                    escalated = report.escalated,
                    "schedule processed"
                );
            }
            Err(err) => {
                error!(schedule_id = %schedule.id, stage = %stage, error = %format!("{err:#}"), "schedule failed");
                report.fail(stage, &err);
            }
        }
        report
    }

    /// 조회부터 에스컬레이션까지. `stage`는 진행 중인 단계를 가리킨다.
    async fn process(
        &self,
        schedule: &Schedule,
        options: &RunOptions,
        report: &mut ScheduleReport,
        stage: &mut Stage,
    ) -> Result<()> {
        let now = options.now;

        *stage = Stage::Fetching;
        let fetched = fetch_pull_requests(self, schedule, now).await?;

        *stage = Stage::Filtering;
        let prs = apply_filters(fetched, schedule.filters.as_ref(), now);
        report.pull_requests = prs.len();

        *stage = Stage::Formatting;
        let messenger = self.registry.messaging(schedule.messaging.kind)?;
        let primary = if prs.is_empty() && !schedule.send_when_empty {
            debug!(schedule_id = %schedule.id, "no pull requests, nothing to send");
            None
        } else {
            Some(format_digest(
                messenger.style(),
                schedule.digest_title(),
                &schedule.repositories,
                &prs,
                now,
            ))
        };

        *stage = Stage::Sending;
        let sent = match &primary {
            Some(digest) => {
                deliver_message(
                    self,
                    options,
                    &schedule.user_id,
                    &schedule.messaging,
                    &schedule.channel_id,
                    &digest.body,
                )
                .await
            }
            None => Ok(()),
        };
        report.primary_sent = primary.is_some() && sent.is_ok();

        // 에스컬레이션은 기본 전송 결과와 무관하게 독립적으로 시도한다.
        let mut escalated_stage = None;
        if let Some(escalation) = &schedule.escalation {
            *stage = Stage::Escalating;
            match run_escalation(self, options, schedule, escalation, &prs).await {
                Ok(0) => {}
                Ok(count) => {
                    report.escalated = count;
                    escalated_stage = Some(Stage::Escalated);
                }
                Err(err) => {
                    warn!(
                        schedule_id = %schedule.id,
                        stage = %Stage::Escalating,
                        error = %format!("{err:#}"),
                        "escalation failed"
                    );
                    report.escalation_error = Some(format!("{err:#}"));
                }
            }
        }

        if let Err(err) = sent {
            *stage = Stage::Sending;
            return Err(err.context(format!("failed to deliver to {}", schedule.messaging)));
        }
        *stage = escalated_stage.unwrap_or(Stage::Delivered);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
