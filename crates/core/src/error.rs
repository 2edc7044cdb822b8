//! 에러 타입: 도메인별 에러 정의
//!
//! 데이터 경로(패킷 판정)는 에러를 반환하지 않습니다. 잘린 헤더는 판정(DROP)으로
//! 변환되며, 여기 정의된 에러는 설정 로딩, 테이블 쓰기(컨트롤 플레인),
//! 모듈 라이프사이클에서만 발생합니다.

/// pktgate 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PktgateError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 라이프사이클 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 서비스/룰/토큰 테이블 쓰기 에러
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 라이프사이클 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}

/// 컨트롤 플레인 테이블 쓰기 에러
///
/// 데이터 경로에는 전달되지 않습니다. 실패한 쓰기는 게시된 스냅샷을 바꾸지 않으며,
/// 데이터 경로는 마지막 정상 스냅샷으로 계속 동작합니다.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// 테이블 용량 초과
    #[error("{table} table is full (capacity: {capacity})")]
    Full { table: &'static str, capacity: usize },

    /// 유효하지 않은 엔트리
    #[error("invalid {table} entry {key}: {reason}")]
    InvalidEntry {
        table: &'static str,
        key: u32,
        reason: String,
    },

    /// 테이블 파일 로드 실패
    #[error("failed to load tables from {path}: {reason}")]
    Load { path: String, reason: String },
}
