//! 설정 관리 — logtide.toml 파싱 및 런타임 설정
//!
//! [`LogtideConfig`]는 파이프라인 전 구성요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`LOGTIDE_COLLECTOR_BATCH_SIZE=500` 형식)
//! 2. 설정 파일 (`logtide.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logtide_core::error::LogtideError> {
//! use logtide_core::config::LogtideConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogtideConfig::load("logtide.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogtideConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogtideError};

/// Logtide 통합 설정
///
/// `logtide.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 구성요소는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogtideConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집기 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 프로세서 설정
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// 알림 엔진 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 보존 정책 기본값
    #[serde(default)]
    pub retention: RetentionConfig,
    /// 검색 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 출력 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// 배치 크기 (이 개수만큼 모이면 플러시)
    pub batch_size: usize,
    /// 타이머 기반 플러시 간격 (초)
    pub flush_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_secs: 5,
        }
    }
}

/// 프로세서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// 벌크 인덱싱 크기 (이 개수만큼 모이면 인덱스에 일괄 반영)
    pub bulk_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { bulk_size: 500 }
    }
}

/// 알림 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 규칙에 cooldown이 지정되지 않았을 때 적용되는 기본 쿨다운 (초)
    pub default_cooldown_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_cooldown_secs: 60,
        }
    }
}

/// 보존 정책 기본값
///
/// 실제 정책은 외부 저장소가 소유하며, 이 섹션은 정책 미지정 시의 기본값입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Hot 티어 유지 일수
    pub hot_days: u32,
    /// Warm 티어 유지 일수
    pub warm_days: u32,
    /// Cold 보관 일수
    pub cold_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hot_days: 7,
            warm_days: 30,
            cold_days: 365,
        }
    }
}

/// 검색 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 캐시 엔트리 TTL (초)
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

impl LogtideConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogtideError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogtideError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogtideError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogtideError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogtideError> {
        toml::from_str(toml_str).map_err(|e| {
            LogtideError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGTIDE_{SECTION}_{FIELD}`
    /// 예: `LOGTIDE_COLLECTOR_BATCH_SIZE=500`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGTIDE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGTIDE_GENERAL_LOG_FORMAT");

        // Collector
        override_usize(
            &mut self.collector.batch_size,
            "LOGTIDE_COLLECTOR_BATCH_SIZE",
        );
        override_u64(
            &mut self.collector.flush_interval_secs,
            "LOGTIDE_COLLECTOR_FLUSH_INTERVAL_SECS",
        );

        // Processor
        override_usize(&mut self.processor.bulk_size, "LOGTIDE_PROCESSOR_BULK_SIZE");

        // Alert
        override_u64(
            &mut self.alert.default_cooldown_secs,
            "LOGTIDE_ALERT_DEFAULT_COOLDOWN_SECS",
        );

        // Retention
        override_u32(&mut self.retention.hot_days, "LOGTIDE_RETENTION_HOT_DAYS");
        override_u32(&mut self.retention.warm_days, "LOGTIDE_RETENTION_WARM_DAYS");
        override_u32(&mut self.retention.cold_days, "LOGTIDE_RETENTION_COLD_DAYS");

        // Cache
        override_u64(&mut self.cache.ttl_secs, "LOGTIDE_CACHE_TTL_SECS");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogtideError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_BULK_SIZE: usize = 1_000_000;
        const MAX_FLUSH_INTERVAL_SECS: u64 = 3600; // 1 hour

        if self.collector.batch_size == 0 || self.collector.batch_size > MAX_BATCH_SIZE {
            return Err(invalid("collector.batch_size", format!("must be 1-{MAX_BATCH_SIZE}")));
        }

        if self.collector.flush_interval_secs == 0
            || self.collector.flush_interval_secs > MAX_FLUSH_INTERVAL_SECS
        {
            return Err(invalid(
                "collector.flush_interval_secs",
                format!("must be 1-{MAX_FLUSH_INTERVAL_SECS}"),
            ));
        }

        if self.processor.bulk_size == 0 || self.processor.bulk_size > MAX_BULK_SIZE {
            return Err(invalid("processor.bulk_size", format!("must be 1-{MAX_BULK_SIZE}")));
        }

        if self.alert.default_cooldown_secs == 0 {
            return Err(invalid(
                "alert.default_cooldown_secs",
                "must be greater than 0",
            ));
        }

        if self.retention.hot_days == 0 {
            return Err(invalid("retention.hot_days", "must be greater than 0"));
        }

        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be greater than 0"));
        }

        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(invalid(
                    "general.log_format",
                    format!("unknown format '{other}', expected 'json' or 'pretty'"),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogtideError {
    LogtideError::Config(ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    })
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(value) = std::env::var(env_key) {
        *target = value;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(value) = std::env::var(env_key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env = env_key, value = %value, "ignoring unparsable env override"),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(value) = std::env::var(env_key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env = env_key, value = %value, "ignoring unparsable env override"),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(value) = std::env::var(env_key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(env = env_key, value = %value, "ignoring unparsable env override"),
        }
    }
}
