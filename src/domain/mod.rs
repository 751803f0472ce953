//! Domain layer
//! 스케줄/PR/토큰 규칙과 다이제스트 조립을 외부 의존성 없이 표현한다.

pub mod category;
pub mod cron;
pub mod digest;
pub mod error;
pub mod filter;
pub mod provider;
pub mod pull_request;
pub mod schedule;
pub mod token;
