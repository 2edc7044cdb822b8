//! 엔진 에러 타입
//!
//! [`EngineError`]는 엔진 구성, 테이블 파일 로딩, 워커 채널에서 발생하는 에러입니다.
//! 패킷 판정 자체는 에러를 반환하지 않습니다 (손상된 헤더는 DROP 판정).
//! `From<EngineError> for PktgateError` 변환으로 상위 레이어에서 `?`로 전파합니다.

use pktgate_core::error::{ConfigError, PipelineError, PktgateError, TableError};

/// 판정 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 엔진 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 테이블 파일 로딩 실패
    #[error("table file error: {path}: {reason}")]
    TableFile {
        /// 테이블 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 테이블 쓰기 거부
    #[error(transparent)]
    Table(#[from] TableError),

    /// 워커 채널 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<EngineError> for PktgateError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => {
                PktgateError::Config(ConfigError::InvalidValue { field, reason })
            }
            EngineError::TableFile { path, reason } => {
                PktgateError::Table(TableError::Load { path, reason })
            }
            EngineError::Table(e) => PktgateError::Table(e),
            EngineError::Channel(msg) => PktgateError::Pipeline(PipelineError::InitFailed(msg)),
        }
    }
}
