//! 메신저 전송 단계. 전송은 재시도하지 않는다(중복 전송 방지).

use anyhow::Result;
use tracing::{info, warn};

use super::{DispatchUseCase, RunOptions};
use crate::domain::error::{ProviderError, provider_error};
use crate::domain::provider::ProviderRef;

/// dry-run이면 본문을 출력만 한다. 401로 거절되면 전송이 일어나지 않았으므로
/// 토큰을 한 번 갱신한 뒤 다시 보낸다.
pub(super) async fn deliver_message(
    uc: &DispatchUseCase<'_>,
    options: &RunOptions,
    user_id: &str,
    messaging: &ProviderRef,
    channel_id: &str,
    body: &str,
) -> Result<()> {
    if options.dry_run {
        uc.reporter.section(&format!("{messaging} -> {channel_id} (dry-run)"));
        uc.reporter.raw(body);
        return Ok(());
    }

    let messenger = uc.registry.messaging(messaging.kind)?;
    let token = uc
        .tokens
        .get_valid_token(user_id, messaging, options.now)
        .await?;

    match messenger
        .send_message(token.credential(), channel_id, body)
        .await
    {
        Ok(()) => {}
        Err(err) if provider_error(&err).is_some_and(ProviderError::is_token_expired) => {
            warn!(provider = %messaging, channel_id, "messaging provider rejected token, refreshing once");
            let token = uc
                .tokens
                .refresh_after_rejection(user_id, messaging, options.now)
                .await?;
            messenger
                .send_message(token.credential(), channel_id, body)
                .await?;
        }
        Err(err) => return Err(err),
    }

    info!(provider = %messaging, channel_id, chars = body.chars().count(), "message delivered");
    Ok(())
}
