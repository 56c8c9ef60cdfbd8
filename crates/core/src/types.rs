//! 도메인 타입 — 파이프라인 전역에서 사용되는 공통 타입
//!
//! 수집기, 프로세서, 인덱스, 알림 엔진이 공유하는 데이터 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 로그 레벨
///
/// `Ord` 구현으로 레벨 비교가 가능합니다 (`Debug < Info < Warn < Error < Fatal`).
/// 검색의 level-floor 필터와 알림 규칙의 최소 레벨 조건에 사용됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LogLevel {
    /// 디버깅 정보
    Debug,
    /// 정보성 이벤트 (기본값)
    #[default]
    Info,
    /// 경고
    Warn,
    /// 에러
    Error,
    /// 치명적 — 즉시 대응 필요
    Fatal,
}

impl LogLevel {
    /// 문자열에서 로그 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" | "informational" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "fatal" | "critical" | "crit" => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// 로그 엔트리
///
/// 파싱이 완료된 구조화 로그 레코드입니다. 생성 이후 불변이며,
/// 자신의 UTC 날짜로 소속 파티션이 결정됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 이벤트 발생 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 로그 레벨
    pub level: LogLevel,
    /// 서비스명
    pub service: String,
    /// 호스트명
    pub host: String,
    /// 로그 메시지
    pub message: String,
    /// 추가 메타데이터 (key-value)
    pub metadata: BTreeMap<String, String>,
}

impl LogEntry {
    /// 엔트리가 소속될 파티션 키 (UTC 캘린더 날짜)를 반환합니다.
    pub fn utc_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}/{}: {}",
            self.level,
            self.timestamp.to_rfc3339(),
            self.host,
            self.service,
            self.message,
        )
    }
}

/// 파티션 스토리지 티어
///
/// 쿼리 지연과 비용을 교환하는 스토리지 클래스입니다.
/// Cold 파티션은 복원 전까지 검색에서 제외됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// 최신 데이터, 즉시 검색 가능 (기본값)
    #[default]
    Hot,
    /// 검색 가능하지만 강등된 데이터
    Warm,
    /// 콜드 스토리지 이동 대상 / 이동됨, 검색 불가
    Cold,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hot => write!(f, "hot"),
            Self::Warm => write!(f, "warm"),
            Self::Cold => write!(f, "cold"),
        }
    }
}

/// 발화된 알림
///
/// 알림 규칙의 임계값 도달로 발화된 기록입니다. 히스토리에 append-only로 쌓입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiredAlert {
    /// 알림 고유 ID (UUID v4)
    pub id: String,
    /// 발화시킨 규칙 ID
    pub rule_id: String,
    /// 규칙 이름 (표시용)
    pub rule_name: String,
    /// 발화 시점의 윈도우 내 매칭 수
    pub count: u64,
    /// 발화 시각
    pub fired_at: DateTime<Utc>,
}

impl FiredAlert {
    /// 새 발화 기록을 생성합니다.
    pub fn new(
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        count: u64,
        fired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule_id.into(),
            rule_name: rule_name.into(),
            count,
            fired_at,
        }
    }
}

impl fmt::Display for FiredAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] rule={} count={}",
            self.fired_at.to_rfc3339(),
            self.rule_id,
            self.count,
        )
    }
}

/// 보존 정책
///
/// 외부 설정 저장소가 소유하며, 파이프라인은 읽기 전용으로 소비합니다.
/// 각 값은 해당 티어에 머무는 일수입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Hot 티어 유지 일수
    pub hot_days: u32,
    /// Warm 티어 유지 일수 (hot 이후)
    pub warm_days: u32,
    /// Cold 보관 일수 (warm 이후)
    pub cold_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            hot_days: 7,
            warm_days: 30,
            cold_days: 365,
        }
    }
}

impl RetentionPolicy {
    /// Hot 티어 유지 기간을 `Duration`으로 반환합니다.
    pub fn hot_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.hot_days) * 86_400)
    }

    /// Hot + Warm 유지 기간을 `Duration`으로 반환합니다.
    pub fn warm_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.hot_days + self.warm_days) * 86_400)
    }
}
