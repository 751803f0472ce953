//! 스케줄/토큰 영속 저장소와 프로세스 전역 단기 상태 저장소.

mod json_store;
mod memory;

pub use json_store::JsonFileStore;
pub use memory::InMemoryStateStore;
