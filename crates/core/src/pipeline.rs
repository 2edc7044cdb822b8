//! 파이프라인 trait: 모듈 라이프사이클 정의
//!
//! 데몬은 [`Pipeline`]을 구현한 모듈을 동일한 순서(start → health_check → stop)로
//! 관리합니다.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::error::PktgateError;

/// 모듈 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 주의 필요
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 모듈 라이프사이클 trait
///
/// `start`는 백그라운드 태스크를 스폰하고 즉시 반환합니다.
/// 두 번 시작하면 `PipelineError::AlreadyRunning`, 시작 전에 정지하면
/// `PipelineError::NotRunning`을 반환해야 합니다.
pub trait Pipeline: Send {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), PktgateError>> + Send;

    /// 모듈을 정지하고 백그라운드 태스크를 정리합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), PktgateError>> + Send;

    /// 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
