//! Infrastructure layer
//! 외부 시스템(git 호스트/메신저 API, 파일시스템)과 직접 통신하는 구현체 집합.

pub mod adapters;
pub mod config;
pub mod git;
pub mod http;
pub mod messaging;
pub mod oauth;
pub mod rate_limit;
pub mod render;
pub mod store;
