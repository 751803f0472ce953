//! Interface layer
//! 사용자 입력(CLI)을 유스케이스 호출로 바꾼다.

pub mod cli;
