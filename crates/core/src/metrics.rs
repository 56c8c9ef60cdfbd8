//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 레이블 키를 중앙에서 정의합니다.
//! 각 구성요소는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logtide_`
//! - 구성요소명: `collector_`, `processor_`, `index_`, `alert_`, `retention_`, `cache_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 서비스 레이블 키
pub const LABEL_SERVICE: &str = "service";

/// 호스트 레이블 키
pub const LABEL_HOST: &str = "host";

/// 로그 레벨 레이블 키 (debug, info, warn, error, fatal)
pub const LABEL_LEVEL: &str = "level";

/// 티어 레이블 키 (hot, warm, cold)
pub const LABEL_TIER: &str = "tier";

/// 규칙 ID 레이블 키
pub const LABEL_RULE: &str = "rule";

// ─── Collector 메트릭 ──────────────────────────────────────────────

/// 수집기: 전송 완료된 라인 수 (counter)
pub const COLLECTOR_SHIPPED_TOTAL: &str = "logtide_collector_shipped_total";

/// 수집기: 스풀로 우회한 라인 수 (counter)
pub const COLLECTOR_SPOOLED_TOTAL: &str = "logtide_collector_spooled_total";

/// 수집기: 현재 스풀에 대기 중인 배치 수 (gauge)
pub const COLLECTOR_SPOOL_DEPTH: &str = "logtide_collector_spool_depth";

// ─── Processor 메트릭 ──────────────────────────────────────────────

/// 프로세서: 처리된 라인 수 (counter)
pub const PROCESSOR_PROCESSED_TOTAL: &str = "logtide_processor_processed_total";

/// 프로세서: 문법 불일치로 폴백 처리된 라인 수 (counter)
pub const PROCESSOR_PARSE_ERRORS_TOTAL: &str = "logtide_processor_parse_errors_total";

/// 프로세서: 벌크 플러시 횟수 (counter)
pub const PROCESSOR_BULK_FLUSHES_TOTAL: &str = "logtide_processor_bulk_flushes_total";

// ─── Index 메트릭 ──────────────────────────────────────────────────

/// 인덱스: 인덱싱된 엔트리 수 (counter)
pub const INDEX_ENTRIES_TOTAL: &str = "logtide_index_entries_total";

/// 인덱스: 검색 지연 시간 (histogram, 초)
pub const INDEX_SEARCH_DURATION_SECONDS: &str = "logtide_index_search_duration_seconds";

// ─── Alert 메트릭 ──────────────────────────────────────────────────

/// 알림: 발화된 알림 수 (counter, label: rule)
pub const ALERT_FIRED_TOTAL: &str = "logtide_alert_fired_total";

/// 알림: 쿨다운으로 억제된 임계값 초과 수 (counter, label: rule)
pub const ALERT_SUPPRESSED_TOTAL: &str = "logtide_alert_suppressed_total";

// ─── Retention 메트릭 ──────────────────────────────────────────────

/// 보존: 콜드 스토리지로 아카이브된 엔트리 수 (counter)
pub const RETENTION_ARCHIVED_TOTAL: &str = "logtide_retention_archived_total";

/// 보존: 콜드 스토리지에서 복원된 엔트리 수 (counter)
pub const RETENTION_RESTORED_TOTAL: &str = "logtide_retention_restored_total";

/// 보존: 티어 이동 횟수 (counter, label: tier)
pub const RETENTION_TIER_MOVES_TOTAL: &str = "logtide_retention_tier_moves_total";

// ─── Cache 메트릭 ──────────────────────────────────────────────────

/// 캐시: 적중 수 (counter)
pub const CACHE_HITS_TOTAL: &str = "logtide_cache_hits_total";

/// 캐시: 미스 수 (counter)
pub const CACHE_MISSES_TOTAL: &str = "logtide_cache_misses_total";
