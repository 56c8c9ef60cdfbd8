//! 에러 타입 — 도메인별 에러 정의

/// Logtide 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogtideError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 전송 계층 에러
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// 콜드 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 검색 쿼리 검증 에러
    #[error("query error: {0}")]
    Query(#[from] QueryError),

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

/// 전송 계층 에러
///
/// `Unavailable`은 일시적 장애이며, 수집기의 로컬 스풀이 흡수합니다.
/// 인제스트 호출자에게는 절대 전파되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 전송 계층 일시적 사용 불가
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// 전송 계층 종료됨
    #[error("transport closed")]
    Closed,
}

/// 콜드 스토리지 에러
///
/// 내구성이 걸려 있으므로 archive/restore 호출자에게 전파되어야 합니다.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 아카이브 쓰기 실패
    #[error("archive failed for partition '{key}': {reason}")]
    ArchiveFailed { key: String, reason: String },

    /// 아카이브 읽기 실패
    #[error("restore failed for partition '{key}': {reason}")]
    RestoreFailed { key: String, reason: String },

    /// 보관 데이터 손상
    #[error("corrupt archive for partition '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// 검색 쿼리 검증 에러
///
/// 쿼리 경로의 검증 실패는 동기적으로 명확하게 거부합니다.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// limit이 0
    #[error("query limit must be greater than 0")]
    ZeroLimit,

    /// 시간 범위 역전 (from > to)
    #[error("invalid time range: from {from} is after to {to}")]
    InvalidRange { from: String, to: String },
}
