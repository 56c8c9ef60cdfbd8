//! 보존 관리자 -- 티어 전환과 콜드 스토리지 아카이브/복원
//!
//! [`RetentionManager`]는 보존 정책에 따라 파티션을 Hot → Warm → Cold로
//! 이동시키고, Cold 대상 파티션의 엔트리를 [`ColdStore`]에 보관합니다.
//! 스윕은 멱등적이어서 같은 시각으로 반복 실행해도 안전합니다.
//!
//! 콜드 스토리지 쓰기/읽기 실패는 내구성이 걸려 있으므로 호출자에게
//! 그대로 전파됩니다. 없는 파티션에 대한 아카이브/복원은 에러가 아니라
//! `false`/`0`을 반환하는 정상 결과입니다.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;

use logtide_core::error::StorageError;
use logtide_core::metrics as metric_names;
use logtide_core::types::{LogEntry, RetentionPolicy, Tier};

use crate::index::TimePartitionedIndex;

/// 콜드 스토리지 추상화
///
/// 아카이브는 파티션 키 단위의 덮어쓰기(put) 의미론을 가지며,
/// `fetch`는 비파괴적입니다 (읽어도 보관본이 사라지지 않음).
pub trait ColdStore: Send + Sync {
    /// 파티션의 엔트리를 보관합니다. 같은 키로 재호출하면 덮어씁니다.
    fn archive(&self, key: NaiveDate, entries: &[LogEntry]) -> Result<(), StorageError>;

    /// 해당 키의 보관본이 존재하는지 확인합니다.
    fn exists(&self, key: NaiveDate) -> bool;

    /// 보관된 엔트리를 읽어 반환합니다. 보관본은 유지됩니다.
    ///
    /// 보관본이 없으면 빈 벡터를 반환합니다.
    fn fetch(&self, key: NaiveDate) -> Result<Vec<LogEntry>, StorageError>;

    /// 보관된 전체 문서 수를 반환합니다.
    fn archived_docs(&self) -> usize;

    /// 보관된 파티션 키 목록을 오름차순으로 반환합니다.
    fn archived_partitions(&self) -> Vec<NaiveDate>;
}

/// 인메모리 콜드 스토어
///
/// 테스트와 단일 프로세스 운용을 위한 기본 구현입니다.
#[derive(Default)]
pub struct MemoryColdStore {
    archives: RwLock<BTreeMap<NaiveDate, Vec<LogEntry>>>,
}

impl MemoryColdStore {
    /// 빈 스토어를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<NaiveDate, Vec<LogEntry>>> {
        self.archives
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ColdStore for MemoryColdStore {
    fn archive(&self, key: NaiveDate, entries: &[LogEntry]) -> Result<(), StorageError> {
        self.archives
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, entries.to_vec());
        Ok(())
    }

    fn exists(&self, key: NaiveDate) -> bool {
        self.read().contains_key(&key)
    }

    fn fetch(&self, key: NaiveDate) -> Result<Vec<LogEntry>, StorageError> {
        Ok(self.read().get(&key).cloned().unwrap_or_default())
    }

    fn archived_docs(&self) -> usize {
        self.read().values().map(Vec::len).sum()
    }

    fn archived_partitions(&self) -> Vec<NaiveDate> {
        self.read().keys().copied().collect()
    }
}

/// JSON Lines 파일 기반 콜드 스토어
///
/// 파티션마다 `<키>.jsonl` 파일 하나를 사용하며, 엔트리 한 건이 한 줄의
/// JSON으로 직렬화됩니다.
pub struct JsonFileColdStore {
    dir: PathBuf,
}

impl JsonFileColdStore {
    /// 지정 디렉터리를 사용하는 스토어를 생성합니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn partition_path(&self, key: NaiveDate) -> PathBuf {
        self.dir.join(format!("{key}.jsonl"))
    }
}

impl ColdStore for JsonFileColdStore {
    fn archive(&self, key: NaiveDate, entries: &[LogEntry]) -> Result<(), StorageError> {
        let map_err = |reason: String| StorageError::ArchiveFailed {
            key: key.to_string(),
            reason,
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| map_err(e.to_string()))?;
        let file =
            std::fs::File::create(self.partition_path(key)).map_err(|e| map_err(e.to_string()))?;
        let mut writer = std::io::BufWriter::new(file);
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(|e| map_err(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| map_err(e.to_string()))?;
        }
        writer.flush().map_err(|e| map_err(e.to_string()))?;
        Ok(())
    }

    fn exists(&self, key: NaiveDate) -> bool {
        self.partition_path(key).exists()
    }

    fn fetch(&self, key: NaiveDate) -> Result<Vec<LogEntry>, StorageError> {
        let path = self.partition_path(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path).map_err(|e| StorageError::RestoreFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| StorageError::RestoreFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry =
                serde_json::from_str(&line).map_err(|e| StorageError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn archived_docs(&self) -> usize {
        self.archived_partitions()
            .iter()
            .map(|key| self.fetch(*key).map(|entries| entries.len()).unwrap_or(0))
            .sum()
    }

    fn archived_partitions(&self) -> Vec<NaiveDate> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<NaiveDate> = read_dir
            .flatten()
            .filter_map(|dir_entry| {
                let path = dir_entry.path();
                let stem = path.file_stem()?.to_str()?;
                if path.extension()?.to_str()? != "jsonl" {
                    return None;
                }
                stem.parse::<NaiveDate>().ok()
            })
            .collect();
        keys.sort();
        keys
    }
}

/// 스윕 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 검사한 파티션 수
    pub scanned: usize,
    /// 이번 스윕에서 Warm으로 강등된 파티션 수
    pub moved_to_warm: usize,
    /// 이번 스윕에서 콜드 스토리지로 보관된 파티션 수
    pub archived: usize,
}

/// 보존 관리자
///
/// 인덱스와 콜드 스토어를 생성자 주입으로 받으므로, 한 프로세스에서
/// 독립된 파이프라인 인스턴스를 여러 개 운용할 수 있습니다.
pub struct RetentionManager {
    index: Arc<TimePartitionedIndex>,
    cold_store: Arc<dyn ColdStore>,
}

impl RetentionManager {
    /// 새 보존 관리자를 생성합니다.
    pub fn new(index: Arc<TimePartitionedIndex>, cold_store: Arc<dyn ColdStore>) -> Self {
        Self { index, cold_store }
    }

    /// 파티션의 엔트리를 콜드 스토리지로 보관합니다.
    ///
    /// 파티션이 없거나 비어 있으면 `Ok(false)`를 반환합니다 (반복 호출에
    /// 대한 멱등 no-op). 스토어 쓰기가 실패하면 추출했던 엔트리를
    /// 인덱스에 되돌린 뒤 에러를 전파합니다.
    pub fn archive_to_cold(&self, key: NaiveDate) -> Result<bool, StorageError> {
        let entries = self.index.archive_partition(key);
        if entries.is_empty() {
            return Ok(false);
        }

        let count = entries.len();
        if let Err(err) = self.cold_store.archive(key, &entries) {
            tracing::error!(partition = %key, error = %err, "cold archive failed, re-indexing extracted entries");
            self.index.bulk_index(entries);
            return Err(err);
        }

        self.index.move_tier(key, Tier::Cold);
        counter!(metric_names::RETENTION_ARCHIVED_TOTAL).increment(count as u64);
        tracing::info!(partition = %key, count, "partition archived to cold storage");
        Ok(true)
    }

    /// 콜드 스토리지에서 파티션을 복원합니다.
    ///
    /// 복원된 엔트리는 자신의 타임스탬프가 결정하는 파티션으로 일반
    /// 인덱싱 경로를 통해 재라우팅됩니다. 원래 키로 돌아간다는 보장은
    /// 없습니다. 영향을 받은 파티션 중 Cold 상태인 것은 다시 검색
    /// 가능하도록 Warm으로 올라갑니다. 복원된 엔트리 수를 반환합니다.
    pub fn restore_from_cold(&self, key: NaiveDate) -> Result<usize, StorageError> {
        if !self.cold_store.exists(key) {
            return Ok(0);
        }
        let entries = self.cold_store.fetch(key)?;
        let count = entries.len();

        let mut touched: BTreeSet<NaiveDate> = BTreeSet::new();
        for entry in entries {
            touched.insert(entry.utc_date());
            self.index.index(entry);
        }
        for touched_key in touched {
            if self.index.partition_tier(touched_key) == Some(Tier::Cold) {
                self.index.move_tier(touched_key, Tier::Warm);
            }
        }

        counter!(metric_names::RETENTION_RESTORED_TOTAL).increment(count as u64);
        tracing::info!(partition = %key, count, "partition restored from cold storage");
        Ok(count)
    }

    /// 보존 정책에 따라 전체 파티션을 한 번 스윕합니다.
    ///
    /// hot 기간을 넘긴 파티션은 Warm으로, hot+warm 기간을 넘긴 파티션은
    /// 콜드 스토리지로 이동합니다. 멱등적이며 재실행해도 안전합니다.
    pub fn sweep(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<SweepReport, StorageError> {
        let today = now.date_naive();
        let mut report = SweepReport::default();

        for key in self.index.partition_keys() {
            report.scanned += 1;
            let age_days = (today - key).num_days();

            if age_days > i64::from(policy.hot_days + policy.warm_days) {
                if self.archive_to_cold(key)? {
                    report.archived += 1;
                }
            } else if age_days > i64::from(policy.hot_days)
                && self.index.partition_tier(key) == Some(Tier::Hot)
            {
                self.index.move_tier(key, Tier::Warm);
                report.moved_to_warm += 1;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            moved_to_warm = report.moved_to_warm,
            archived = report.archived,
            "retention sweep completed"
        );
        Ok(report)
    }

    /// 콜드 스토어에 보관된 전체 문서 수를 반환합니다.
    pub fn archived_docs(&self) -> usize {
        self.cold_store.archived_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchQuery;
    use logtide_core::types::LogLevel;
    use std::collections::BTreeMap as MetaMap;

    fn entry(ts: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: DateTime::parse_from_rfc3339(ts)
                .unwrap()
                .with_timezone(&Utc),
            level: LogLevel::Info,
            service: "api".to_owned(),
            host: "web-01".to_owned(),
            message: message.to_owned(),
            metadata: MetaMap::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn manager() -> (RetentionManager, Arc<TimePartitionedIndex>, Arc<MemoryColdStore>) {
        let index = Arc::new(TimePartitionedIndex::new());
        let store = Arc::new(MemoryColdStore::new());
        (
            RetentionManager::new(index.clone(), store.clone()),
            index,
            store,
        )
    }

    #[test]
    fn memory_store_archive_and_fetch() {
        let store = MemoryColdStore::new();
        let key = date(2025, 2, 15);
        store
            .archive(key, &[entry("2025-02-15T10:00:00Z", "kept")])
            .unwrap();

        assert!(store.exists(key));
        assert_eq!(store.archived_docs(), 1);
        assert_eq!(store.archived_partitions(), vec![key]);

        // fetch는 비파괴적
        assert_eq!(store.fetch(key).unwrap().len(), 1);
        assert_eq!(store.fetch(key).unwrap().len(), 1);
    }

    #[test]
    fn archive_to_cold_then_repeat_returns_false() {
        let (manager, index, _store) = manager();
        index.index(entry("2025-02-15T10:00:00Z", "old"));

        assert!(manager.archive_to_cold(date(2025, 2, 15)).unwrap());
        assert!(!manager.archive_to_cold(date(2025, 2, 15)).unwrap());
    }

    #[test]
    fn archive_on_missing_partition_is_noop() {
        let (manager, _index, store) = manager();
        assert!(!manager.archive_to_cold(date(2025, 2, 15)).unwrap());
        assert_eq!(store.archived_docs(), 0);
    }

    #[test]
    fn archived_entries_leave_search_until_restored() {
        let (manager, index, _store) = manager();
        index.index(entry("2025-02-15T10:00:00Z", "archived away"));
        index.index(entry("2025-02-16T10:00:00Z", "still live"));

        manager.archive_to_cold(date(2025, 2, 15)).unwrap();
        let result = index.search(&SearchQuery::with_limit(10)).unwrap();
        assert_eq!(result.total_hits, 1);
        assert_eq!(result.entries[0].message, "still live");

        let restored = manager.restore_from_cold(date(2025, 2, 15)).unwrap();
        assert_eq!(restored, 1);
        let result = index.search(&SearchQuery::with_limit(10)).unwrap();
        assert_eq!(result.total_hits, 2);
    }

    #[test]
    fn restore_missing_key_returns_zero() {
        let (manager, _index, _store) = manager();
        assert_eq!(manager.restore_from_cold(date(2025, 2, 15)).unwrap(), 0);
    }

    #[test]
    fn restore_routes_entries_by_their_own_timestamp() {
        let (manager, index, store) = manager();
        let key = date(2025, 2, 15);
        // 보관본의 키와 다른 날짜의 엔트리가 섞여 있는 경우
        store
            .archive(
                key,
                &[
                    entry("2025-02-15T10:00:00Z", "same day"),
                    entry("2025-02-14T23:00:00Z", "previous day"),
                ],
            )
            .unwrap();

        assert_eq!(manager.restore_from_cold(key).unwrap(), 2);
        assert_eq!(index.partition_len(date(2025, 2, 15)), Some(1));
        assert_eq!(index.partition_len(date(2025, 2, 14)), Some(1));
    }

    #[test]
    fn sweep_moves_partitions_through_tiers() {
        let (manager, index, store) = manager();
        index.index(entry("2025-02-01T10:00:00Z", "very old"));
        index.index(entry("2025-02-12T10:00:00Z", "aging"));
        index.index(entry("2025-02-15T10:00:00Z", "fresh"));

        let policy = RetentionPolicy {
            hot_days: 2,
            warm_days: 7,
            cold_days: 365,
        };
        let now: DateTime<Utc> = "2025-02-15T12:00:00Z".parse().unwrap();
        let report = manager.sweep(now, &policy).unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.moved_to_warm, 1);
        assert_eq!(report.archived, 1);

        assert_eq!(index.partition_tier(date(2025, 2, 1)), Some(Tier::Cold));
        assert_eq!(index.partition_tier(date(2025, 2, 12)), Some(Tier::Warm));
        assert_eq!(index.partition_tier(date(2025, 2, 15)), Some(Tier::Hot));
        assert_eq!(store.archived_docs(), 1);
    }

    #[test]
    fn sweep_is_idempotent() {
        let (manager, index, _store) = manager();
        index.index(entry("2025-02-01T10:00:00Z", "very old"));

        let policy = RetentionPolicy {
            hot_days: 2,
            warm_days: 7,
            cold_days: 365,
        };
        let now: DateTime<Utc> = "2025-02-15T12:00:00Z".parse().unwrap();

        let first = manager.sweep(now, &policy).unwrap();
        let second = manager.sweep(now, &policy).unwrap();

        assert_eq!(first.archived, 1);
        assert_eq!(second.archived, 0);
        assert_eq!(second.moved_to_warm, 0);
    }

    #[test]
    fn failing_store_keeps_entries_in_index() {
        struct BrokenStore;
        impl ColdStore for BrokenStore {
            fn archive(&self, key: NaiveDate, _: &[LogEntry]) -> Result<(), StorageError> {
                Err(StorageError::ArchiveFailed {
                    key: key.to_string(),
                    reason: "disk full".to_owned(),
                })
            }
            fn exists(&self, _: NaiveDate) -> bool {
                false
            }
            fn fetch(&self, _: NaiveDate) -> Result<Vec<LogEntry>, StorageError> {
                Ok(Vec::new())
            }
            fn archived_docs(&self) -> usize {
                0
            }
            fn archived_partitions(&self) -> Vec<NaiveDate> {
                Vec::new()
            }
        }

        let index = Arc::new(TimePartitionedIndex::new());
        let manager = RetentionManager::new(index.clone(), Arc::new(BrokenStore));
        index.index(entry("2025-02-15T10:00:00Z", "precious"));

        let result = manager.archive_to_cold(date(2025, 2, 15));
        assert!(result.is_err());
        // 추출했던 엔트리가 인덱스에 되돌아와 있어야 함
        assert_eq!(index.partition_len(date(2025, 2, 15)), Some(1));
    }

    mod file_store {
        use super::*;

        #[test]
        fn archive_and_fetch_roundtrip() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonFileColdStore::new(dir.path());
            let key = date(2025, 2, 15);

            store
                .archive(
                    key,
                    &[
                        entry("2025-02-15T10:00:00Z", "first"),
                        entry("2025-02-15T11:00:00Z", "second"),
                    ],
                )
                .unwrap();

            assert!(store.exists(key));
            let fetched = store.fetch(key).unwrap();
            assert_eq!(fetched.len(), 2);
            assert_eq!(fetched[0].message, "first");
            assert_eq!(store.archived_docs(), 2);
            assert_eq!(store.archived_partitions(), vec![key]);
        }

        #[test]
        fn fetch_missing_file_returns_empty() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonFileColdStore::new(dir.path());
            assert!(store.fetch(date(2025, 2, 15)).unwrap().is_empty());
            assert!(!store.exists(date(2025, 2, 15)));
        }

        #[test]
        fn corrupt_file_reports_corrupt_error() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonFileColdStore::new(dir.path());
            let key = date(2025, 2, 15);
            std::fs::write(dir.path().join(format!("{key}.jsonl")), "not json\n").unwrap();

            assert!(matches!(
                store.fetch(key),
                Err(StorageError::Corrupt { .. })
            ));
        }

        #[test]
        fn rearchive_overwrites_previous_file() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonFileColdStore::new(dir.path());
            let key = date(2025, 2, 15);

            store
                .archive(key, &[entry("2025-02-15T10:00:00Z", "old")])
                .unwrap();
            store
                .archive(key, &[entry("2025-02-15T11:00:00Z", "new")])
                .unwrap();

            let fetched = store.fetch(key).unwrap();
            assert_eq!(fetched.len(), 1);
            assert_eq!(fetched[0].message, "new");
        }
    }
}
