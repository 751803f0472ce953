//! 에스컬레이션 단계. 이미 조회한 PR 중 기준 일수를 넘긴 항목을 별도 채널로 알린다.

use anyhow::{Context, Result};
use tracing::info;

use super::deliver::deliver_message;
use super::{DispatchUseCase, RunOptions};
use crate::domain::category::PrCategory;
use crate::domain::digest::format_escalation;
use crate::domain::pull_request::NormalizedPullRequest;
use crate::domain::schedule::{EscalationConfig, Schedule};

/// 에스컬레이션 대상: 나이 ≥ 기준 일수이고 Ready to Merge가 아닌 PR.
pub(super) fn escalation_candidates<'p>(
    prs: &'p [NormalizedPullRequest],
    threshold_days: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<&'p NormalizedPullRequest> {
    prs.iter()
        .filter(|pr| pr.age_in_days(now) >= i64::from(threshold_days))
        .filter(|pr| PrCategory::of(pr, now) != PrCategory::ReadyToMerge)
        .collect()
}

/// 보낸 PR 수를 돌려준다. 대상이 없으면 아무것도 보내지 않고 0.
pub(super) async fn run_escalation(
    uc: &DispatchUseCase<'_>,
    options: &RunOptions,
    schedule: &Schedule,
    escalation: &EscalationConfig,
    prs: &[NormalizedPullRequest],
) -> Result<usize> {
    let candidates = escalation_candidates(prs, escalation.threshold_days, options.now);
    if candidates.is_empty() {
        return Ok(0);
    }

    let messenger = uc.registry.messaging(escalation.messaging.kind)?;
    let body = format_escalation(
        messenger.style(),
        schedule.digest_title(),
        escalation.threshold_days,
        &candidates,
        &escalation.mentions,
        options.now,
    );

    deliver_message(
        uc,
        options,
        &schedule.user_id,
        &escalation.messaging,
        &escalation.channel_id,
        &body,
    )
    .await
    .with_context(|| format!("failed to deliver escalation to {}", escalation.messaging))?;

    info!(
        schedule_id = %schedule.id,
        count = candidates.len(),
        channel_id = %escalation.channel_id,
        "escalation sent"
    );
    Ok(candidates.len())
}
