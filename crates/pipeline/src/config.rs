//! 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`LogtideConfig`](logtide_core::config::LogtideConfig)에서
//! 파생되며, 파이프라인 구성요소들이 사용하는 값을 한곳에 모읍니다.
//!
//! # 사용 예시
//! ```ignore
//! use logtide_core::config::LogtideConfig;
//! use logtide_pipeline::config::PipelineConfig;
//!
//! let core_config = LogtideConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// 파이프라인 설정
///
/// core 설정에서 파생되며, 수집기/프로세서/알림/캐시가 공유합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 수집기 배치 크기 (이 개수만큼 모이면 플러시)
    pub batch_size: usize,
    /// 타이머 기반 플러시 간격 (초)
    pub flush_interval_secs: u64,
    /// 프로세서 벌크 인덱싱 크기
    pub bulk_size: usize,
    /// 규칙에 cooldown 미지정 시 적용되는 기본 쿨다운 (초)
    pub default_cooldown_secs: u64,
    /// 검색 캐시 TTL (초)
    pub cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_secs: 5,
            bulk_size: 500,
            default_cooldown_secs: 60,
            cache_ttl_secs: 30,
        }
    }
}

impl PipelineConfig {
    /// core의 `LogtideConfig`에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &logtide_core::config::LogtideConfig) -> Self {
        Self {
            batch_size: core.collector.batch_size,
            flush_interval_secs: core.collector.flush_interval_secs,
            bulk_size: core.processor.bulk_size,
            default_cooldown_secs: core.alert.default_cooldown_secs,
            cache_ttl_secs: core.cache.ttl_secs,
        }
    }

    /// 기본 쿨다운을 `Duration`으로 반환합니다.
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_secs)
    }

    /// 캐시 TTL을 `Duration`으로 반환합니다.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_BULK_SIZE: usize = 1_000_000;

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(PipelineError::Config {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            });
        }

        if self.flush_interval_secs == 0 {
            return Err(PipelineError::Config {
                field: "flush_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.bulk_size == 0 || self.bulk_size > MAX_BULK_SIZE {
            return Err(PipelineError::Config {
                field: "bulk_size".to_owned(),
                reason: format!("must be 1-{MAX_BULK_SIZE}"),
            });
        }

        if self.default_cooldown_secs == 0 {
            return Err(PipelineError::Config {
                field: "default_cooldown_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.cache_ttl_secs == 0 {
            return Err(PipelineError::Config {
                field: "cache_ttl_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집기 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// 플러시 간격(초)을 설정합니다.
    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.config.flush_interval_secs = secs;
        self
    }

    /// 벌크 인덱싱 크기를 설정합니다.
    pub fn bulk_size(mut self, size: usize) -> Self {
        self.config.bulk_size = size;
        self
    }

    /// 기본 쿨다운(초)을 설정합니다.
    pub fn default_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.default_cooldown_secs = secs;
        self
    }

    /// 캐시 TTL(초)을 설정합니다.
    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
