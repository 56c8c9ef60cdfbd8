//! 시간 파티션 인덱스 -- UTC 일 단위 파티션과 티어링
//!
//! [`TimePartitionedIndex`]는 엔트리를 자신의 UTC 캘린더 날짜가 결정하는
//! 파티션에 저장합니다. 파티션은 [`Tier`]를 가지며, Cold 파티션은 복원
//! 전까지 검색에서 제외됩니다.
//!
//! # 잠금 구조
//! 파티션 맵은 `RwLock`으로, 각 파티션은 자신의 `Mutex`로 보호됩니다.
//! 어제 파티션을 아카이빙하는 동안에도 오늘 파티션으로의 인덱싱이
//! 차단되지 않습니다. 티어는 파티션 레코드의 필드이므로 해당 파티션
//! 잠금 아래에서 메타데이터와 항상 일관됩니다.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use logtide_core::error::QueryError;
use logtide_core::metrics as metric_names;
use logtide_core::types::{LogEntry, LogLevel, Tier};

/// 검색 쿼리
///
/// 모든 필터는 선택적이며 AND로 결합됩니다. `limit`만 필수입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// 서비스명 일치 필터
    pub service: Option<String>,
    /// 최소 로그 레벨 (이 레벨 이상만 반환)
    pub level_floor: Option<LogLevel>,
    /// 시간 범위 시작 (포함)
    pub from: Option<DateTime<Utc>>,
    /// 시간 범위 끝 (포함)
    pub to: Option<DateTime<Utc>>,
    /// 자유 텍스트 검색어 (공백 구분, 모든 단어가 메시지에 포함되어야 함)
    pub text: Option<String>,
    /// 최대 반환 개수
    pub limit: usize,
}

impl SearchQuery {
    /// 지정된 limit으로 빈 쿼리를 생성합니다.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// 쿼리의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.limit == 0 {
            return Err(QueryError::ZeroLimit);
        }
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(QueryError::InvalidRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(())
    }

    /// 엔트리가 이 쿼리의 모든 필터를 통과하는지 확인합니다.
    fn matches(&self, entry: &LogEntry, terms: &[String]) -> bool {
        if let Some(service) = &self.service
            && entry.service != *service
        {
            return false;
        }
        if let Some(floor) = self.level_floor
            && entry.level < floor
        {
            return false;
        }
        if let Some(from) = self.from
            && entry.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to
            && entry.timestamp > to
        {
            return false;
        }
        if !terms.is_empty() {
            let message = entry.message.to_lowercase();
            if !terms.iter().all(|term| message.contains(term.as_str())) {
                return false;
            }
        }
        true
    }

    /// 소문자화된 검색어 목록을 반환합니다.
    fn terms(&self) -> Vec<String> {
        self.text
            .as_deref()
            .map(|text| {
                text.split_whitespace()
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 검색 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 매칭 엔트리 (타임스탬프 내림차순, 최대 limit개)
    pub entries: Vec<LogEntry>,
    /// 전체 매칭 수 (limit 적용 전)
    pub total_hits: usize,
    /// 검색 소요 시간 (밀리초)
    pub took_ms: u64,
    /// 캐시에서 반환되었는지 여부
    pub from_cache: bool,
}

/// 일 단위 파티션
///
/// 키(UTC 날짜), 티어, 엔트리를 한 레코드로 묶어 파티션 잠금 아래에서
/// 일관성을 유지합니다.
#[derive(Debug)]
struct Partition {
    key: NaiveDate,
    tier: Tier,
    entries: Vec<LogEntry>,
}

impl Partition {
    fn new(key: NaiveDate) -> Self {
        Self {
            key,
            tier: Tier::Hot,
            entries: Vec::new(),
        }
    }
}

/// 티어별 파티션 수 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierSummary {
    /// Hot 파티션 수
    pub hot: usize,
    /// Warm 파티션 수
    pub warm: usize,
    /// Cold 파티션 수
    pub cold: usize,
}

/// UTC 일 단위 시간 파티션 인덱스
pub struct TimePartitionedIndex {
    /// 날짜 키로 정렬된 파티션 맵
    partitions: RwLock<BTreeMap<NaiveDate, Arc<Mutex<Partition>>>>,
}

impl TimePartitionedIndex {
    /// 빈 인덱스를 생성합니다.
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
        }
    }

    /// 엔트리 하나를 인덱싱합니다.
    ///
    /// 엔트리의 UTC 날짜에 해당하는 파티션으로 라우팅되며, 파티션이 없으면
    /// Hot 티어로 생성됩니다.
    pub fn index(&self, entry: LogEntry) {
        let key = entry.utc_date();
        let partition = self.partition_for(key);
        {
            let mut part = lock(&partition);
            part.entries.push(entry);
        }
        counter!(metric_names::INDEX_ENTRIES_TOTAL).increment(1);
    }

    /// 여러 엔트리를 일괄 인덱싱합니다.
    ///
    /// 날짜별로 묶어 파티션 잠금을 배치 단위로 한 번씩만 잡습니다.
    pub fn bulk_index(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        let total = entries.len() as u64;

        let mut grouped: BTreeMap<NaiveDate, Vec<LogEntry>> = BTreeMap::new();
        for entry in entries {
            grouped.entry(entry.utc_date()).or_default().push(entry);
        }

        for (key, group) in grouped {
            let partition = self.partition_for(key);
            let mut part = lock(&partition);
            part.entries.extend(group);
        }
        counter!(metric_names::INDEX_ENTRIES_TOTAL).increment(total);
    }

    /// 검색을 실행합니다.
    ///
    /// Cold 파티션은 제외됩니다. 결과는 타임스탬프 내림차순으로 정렬되어
    /// 상위 `limit`개가 반환되며, `total_hits`는 limit 적용 전 전체 매칭
    /// 수입니다.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResult, QueryError> {
        query.validate()?;
        let started = Instant::now();
        let terms = query.terms();

        let candidates = self.candidate_partitions(query.from, query.to);

        let mut matched: Vec<LogEntry> = Vec::new();
        for partition in candidates {
            let part = lock(&partition);
            if part.tier == Tier::Cold {
                continue;
            }
            matched.extend(
                part.entries
                    .iter()
                    .filter(|entry| query.matches(entry, &terms))
                    .cloned(),
            );
        }

        let total_hits = matched.len();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(query.limit);

        let took = started.elapsed();
        histogram!(metric_names::INDEX_SEARCH_DURATION_SECONDS).record(took.as_secs_f64());
        tracing::debug!(
            total_hits,
            returned = matched.len(),
            took_ms = took.as_millis() as u64,
            "search completed"
        );

        Ok(SearchResult {
            entries: matched,
            total_hits,
            took_ms: took.as_millis() as u64,
            from_cache: false,
        })
    }

    /// 파티션의 티어를 변경합니다.
    ///
    /// 파티션이 없으면 `false`를 반환합니다 (정상 결과, 에러 아님).
    pub fn move_tier(&self, key: NaiveDate, tier: Tier) -> bool {
        let Some(partition) = self.get_partition(key) else {
            return false;
        };
        let mut part = lock(&partition);
        if part.tier != tier {
            tracing::info!(partition = %key, from = %part.tier, to = %tier, "partition tier moved");
            counter!(
                metric_names::RETENTION_TIER_MOVES_TOTAL,
                metric_names::LABEL_TIER => tier.to_string()
            )
            .increment(1);
            part.tier = tier;
        }
        true
    }

    /// 파티션의 모든 엔트리를 원자적으로 제거하고 반환합니다.
    ///
    /// 호출 이후 해당 파티션은 비어 있으며 검색에서 아무것도 반환하지
    /// 않습니다. 파티션이 없으면 빈 벡터를 반환합니다.
    pub fn archive_partition(&self, key: NaiveDate) -> Vec<LogEntry> {
        let Some(partition) = self.get_partition(key) else {
            return Vec::new();
        };
        let mut part = lock(&partition);
        std::mem::take(&mut part.entries)
    }

    /// 파티션 수를 반환합니다.
    pub fn partition_count(&self) -> usize {
        read_map(&self.partitions).len()
    }

    /// 파티션의 현재 티어를 반환합니다.
    pub fn partition_tier(&self, key: NaiveDate) -> Option<Tier> {
        self.get_partition(key).map(|p| lock(&p).tier)
    }

    /// 파티션의 엔트리 수를 반환합니다.
    pub fn partition_len(&self, key: NaiveDate) -> Option<usize> {
        self.get_partition(key).map(|p| lock(&p).entries.len())
    }

    /// 전체 엔트리 수를 반환합니다.
    pub fn total_entries(&self) -> usize {
        let partitions: Vec<_> = read_map(&self.partitions).values().cloned().collect();
        partitions.iter().map(|p| lock(p).entries.len()).sum()
    }

    /// 모든 파티션 키를 오름차순으로 반환합니다.
    pub fn partition_keys(&self) -> Vec<NaiveDate> {
        read_map(&self.partitions).keys().copied().collect()
    }

    /// 티어별 파티션 수 요약을 반환합니다.
    pub fn tier_summary(&self) -> TierSummary {
        let partitions: Vec<_> = read_map(&self.partitions).values().cloned().collect();
        let mut summary = TierSummary::default();
        for partition in partitions {
            match lock(&partition).tier {
                Tier::Hot => summary.hot += 1,
                Tier::Warm => summary.warm += 1,
                Tier::Cold => summary.cold += 1,
            }
        }
        summary
    }

    /// 키에 해당하는 파티션을 반환하고, 없으면 Hot 티어로 생성합니다.
    fn partition_for(&self, key: NaiveDate) -> Arc<Mutex<Partition>> {
        if let Some(partition) = self.get_partition(key) {
            return partition;
        }
        let mut map = self
            .partitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(key)
            .or_insert_with(|| {
                tracing::debug!(partition = %key, "partition created");
                Arc::new(Mutex::new(Partition::new(key)))
            })
            .clone()
    }

    fn get_partition(&self, key: NaiveDate) -> Option<Arc<Mutex<Partition>>> {
        read_map(&self.partitions).get(&key).cloned()
    }

    /// 요청 시간 범위와 겹치는 파티션을 선별합니다. 범위가 없으면 전체.
    fn candidate_partitions(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<Arc<Mutex<Partition>>> {
        let from_date = from.map(|ts| ts.date_naive());
        let to_date = to.map(|ts| ts.date_naive());
        read_map(&self.partitions)
            .iter()
            .filter(|(key, _)| {
                from_date.is_none_or(|from| **key >= from) && to_date.is_none_or(|to| **key <= to)
            })
            .map(|(_, partition)| partition.clone())
            .collect()
    }
}

impl Default for TimePartitionedIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(partition: &Arc<Mutex<Partition>>) -> std::sync::MutexGuard<'_, Partition> {
    partition.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_map(
    map: &RwLock<BTreeMap<NaiveDate, Arc<Mutex<Partition>>>>,
) -> std::sync::RwLockReadGuard<'_, BTreeMap<NaiveDate, Arc<Mutex<Partition>>>> {
    map.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}
