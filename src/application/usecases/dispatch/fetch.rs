//! git 제공자에서 열린 PR을 가져오는 단계.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::DispatchUseCase;
use crate::domain::error::{ProviderError, provider_error};
use crate::domain::pull_request::NormalizedPullRequest;
use crate::domain::schedule::Schedule;

/// 유효 토큰으로 조회하고, 401이 오면 한 번만 갱신 후 다시 조회한다.
pub(super) async fn fetch_pull_requests(
    uc: &DispatchUseCase<'_>,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedPullRequest>> {
    let git = uc.registry.git(schedule.git.kind)?;
    let token = uc
        .tokens
        .get_valid_token(&schedule.user_id, &schedule.git, now)
        .await?;

    let prs = match git
        .get_pull_requests(&token.access_token, &schedule.repositories)
        .await
    {
        Ok(prs) => prs,
        Err(err) if provider_error(&err).is_some_and(ProviderError::is_token_expired) => {
            warn!(
                schedule_id = %schedule.id,
                provider = %schedule.git,
                "git provider rejected token, refreshing once"
            );
            let token = uc
                .tokens
                .refresh_after_rejection(&schedule.user_id, &schedule.git, now)
                .await?;
            git.get_pull_requests(&token.access_token, &schedule.repositories)
                .await
                .with_context(|| format!("failed to fetch pull requests from {}", schedule.git))?
        }
        Err(err) => {
            return Err(err.context(format!(
                "failed to fetch pull requests from {}",
                schedule.git
            )));
        }
    };

    debug!(schedule_id = %schedule.id, count = prs.len(), "pull requests fetched");
    Ok(prs)
}
