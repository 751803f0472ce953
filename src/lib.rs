//! prdigest library root.
//! Clean Architecture + DDD 계층을 외부에 노출한다.

use anyhow::Result;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interface;

use application::usecases::dispatch::{BatchReport, RunOptions};
use interface::cli::AppComposition;

/// 라이브러리 직접 호출용 일괄 디스패치 함수(외부 스케줄러가 매분 호출).
pub async fn dispatch(options: RunOptions) -> Result<BatchReport> {
    let composition = AppComposition::load()?;
    composition.dispatch_usecase().execute(&options).await
}

/// 설정 점검 JSON 출력용 함수.
pub fn inspect_config_pretty_json() -> Result<String> {
    let composition = AppComposition::load()?;
    composition.inspect_config_usecase().execute()
}
