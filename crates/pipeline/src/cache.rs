//! 검색 캐시 -- 인덱스 읽기 경로의 TTL 캐시
//!
//! [`SearchCache`]는 쿼리 필드의 정규화된 문자열을 키로 결과를 보관합니다.
//! 만료는 읽기 시점에 지연 검사되며, 별도의 축출 스레드는 없습니다.
//! 인덱스나 보존 상태가 바뀌어도 자동 무효화되지 않으므로, 필요 시
//! 호출자가 [`SearchCache::clear`]를 호출해야 합니다.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;

use logtide_core::error::QueryError;
use logtide_core::metrics as metric_names;

use crate::index::{SearchQuery, SearchResult, TimePartitionedIndex};

/// 캐시 슬롯
struct CachedResult {
    result: SearchResult,
    stored_at: Instant,
}

/// TTL 기반 검색 캐시
pub struct SearchCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, CachedResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    /// 지정된 TTL로 캐시를 생성합니다.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// 캐시를 경유해 검색을 실행합니다.
    ///
    /// 유효한 캐시 항목이 있으면 `from_cache=true`로 표시된 사본을
    /// 반환하고 인덱스를 재조회하지 않습니다. 미스 또는 만료 시 라이브
    /// 검색을 실행해 저장한 뒤 `from_cache=false`로 반환합니다.
    pub fn search(
        &self,
        index: &TimePartitionedIndex,
        query: &SearchQuery,
    ) -> Result<SearchResult, QueryError> {
        query.validate()?;
        let key = Self::cache_key(query);

        {
            let mut slots = self.lock_slots();
            match slots.get(&key) {
                Some(slot) if slot.stored_at.elapsed() < self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    counter!(metric_names::CACHE_HITS_TOTAL).increment(1);
                    tracing::debug!(key = %key, "search cache hit");
                    let mut result = slot.result.clone();
                    result.from_cache = true;
                    return Ok(result);
                }
                Some(_) => {
                    // 만료 항목은 읽기 시점에 축출
                    slots.remove(&key);
                }
                None => {}
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(metric_names::CACHE_MISSES_TOTAL).increment(1);

        let result = index.search(query)?;
        self.lock_slots().insert(
            key,
            CachedResult {
                result: result.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(result)
    }

    /// 캐시를 전부 비웁니다.
    pub fn clear(&self) {
        self.lock_slots().clear();
        tracing::debug!("search cache cleared");
    }

    /// 현재 캐시된 항목 수를 반환합니다 (만료 항목 포함).
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// 캐시가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    /// 캐시 히트 수를 반환합니다.
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// 캐시 미스 수를 반환합니다.
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// 쿼리 필드의 정규화된 결정적 캐시 키를 생성합니다.
    fn cache_key(query: &SearchQuery) -> String {
        format!(
            "service={}|level={}|from={}|to={}|text={}|limit={}",
            query.service.as_deref().unwrap_or("*"),
            query
                .level_floor
                .map(|level| level.to_string())
                .unwrap_or_else(|| "*".to_owned()),
            query
                .from
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "*".to_owned()),
            query
                .to
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "*".to_owned()),
            query.text.as_deref().unwrap_or("*"),
            query.limit,
        )
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedResult>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
