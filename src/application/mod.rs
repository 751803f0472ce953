//! Application layer
//! 유스케이스를 정의하고 포트(추상 인터페이스)를 통해 인프라를 사용한다.

pub mod config;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod usecases;

#[cfg(test)]
pub(crate) mod fakes;
