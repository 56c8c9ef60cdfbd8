//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<PipelineError> for LogtideError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logtide_core::error::{ConfigError, LogtideError};

/// 파이프라인 도메인 에러
///
/// 설정, 규칙 검증, 채널 통신 등 파이프라인 내부의 에러 상황을 포괄합니다.
/// 파싱 실패와 전송 장애는 에러로 전파되지 않고 각각 폴백 엔트리와
/// 로컬 스풀로 흡수된다는 점에 주의하세요.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 알림 규칙 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for LogtideError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Io(io) => LogtideError::Io(io),
            other => LogtideError::Config(ConfigError::InvalidValue {
                field: "pipeline".to_owned(),
                reason: other.to_string(),
            }),
        }
    }
}
