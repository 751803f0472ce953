//! 메신저(Slack/Discord/Teams) 어댑터.
//!
//! 채널 조회는 멱등이라 재시도하지만, 메시지 전송은 한 번만 보낸다.

mod discord;
mod slack;
mod teams;

pub use discord::DiscordAdapter;
pub use slack::SlackAdapter;
pub use teams::TeamsAdapter;
