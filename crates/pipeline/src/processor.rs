//! 프로세서 -- 라인 파싱 및 벌크 인덱싱
//!
//! [`LogProcessor`]는 버스 구독자로 등록되어 배치의 각 라인을 구조화
//! [`LogEntry`]로 파싱합니다. 파싱된 엔트리는 즉시 알림 엔진을 통과한 뒤
//! 벌크 버퍼에 쌓이고, `bulk_size`에 도달하면 인덱스에 일괄 반영됩니다.
//!
//! # 파싱 규칙
//! 기대 문법: `<UTC 타임스탬프> <LEVEL> <메시지...> host=<h> service=<s> [key=value...]`
//! 뒤쪽 `key=value` 토큰들은 메타데이터로 흡수됩니다. 문법 불일치 시에도
//! 라인은 절대 드롭되지 않으며, `parse_error=true` 메타데이터가 붙은
//! 폴백 엔트리가 생성됩니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use metrics::counter;

use logtide_core::metrics as metric_names;
use logtide_core::types::{LogEntry, LogLevel};

use crate::alert::AlertEngine;
use crate::index::TimePartitionedIndex;
use crate::transport::{LogBatch, RawLine, Subscriber};

/// 로그 라인 파서
///
/// 절대 실패하지 않습니다. 모든 입력 라인은 정확히 하나의 [`LogEntry`]를
/// 생성하며, 문법 불일치 시 폴백 엔트리가 반환됩니다.
#[derive(Debug, Default)]
pub struct LineParser;

impl LineParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 라인 하나를 파싱합니다.
    ///
    /// 성공 시 구조화 엔트리를, 문법 불일치 시 폴백 엔트리와 함께
    /// `true`(파싱 실패 여부)를 반환합니다.
    pub fn parse(&self, raw: &RawLine) -> (LogEntry, bool) {
        let text = raw.text();
        match Self::try_parse(text.trim()) {
            Ok(entry) => (entry, false),
            Err(reason) => {
                tracing::debug!(host = %raw.host, reason, "line did not match grammar, using fallback entry");
                (Self::fallback_entry(text.trim(), raw.received_at), true)
            }
        }
    }

    /// 문법에 따라 라인 파싱을 시도합니다.
    fn try_parse(text: &str) -> Result<LogEntry, &'static str> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err("too few tokens");
        }

        let timestamp = Self::parse_timestamp(tokens[0]).ok_or("invalid timestamp")?;
        let level = LogLevel::from_str_loose(tokens[1]).ok_or("unknown level")?;

        // 뒤에서부터 `key=value` 꼬리를 메타데이터로 흡수
        let mut metadata = BTreeMap::new();
        let mut message_end = tokens.len();
        for (i, token) in tokens.iter().enumerate().skip(2).rev() {
            match token.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    metadata.insert(key.to_owned(), value.to_owned());
                    message_end = i;
                }
                _ => break,
            }
        }

        let host = metadata.remove("host").ok_or("missing host field")?;
        let service = metadata.remove("service").ok_or("missing service field")?;

        if message_end <= 2 {
            return Err("empty message");
        }
        let message = tokens[2..message_end].join(" ");

        Ok(LogEntry {
            timestamp,
            level,
            service,
            host,
            message,
            metadata,
        })
    }

    /// 타임스탬프를 파싱합니다. 말미의 타임존 마커가 없으면 UTC('Z')로
    /// 정규화한 뒤 재시도합니다.
    fn parse_timestamp(token: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(token) {
            return Some(ts.with_timezone(&Utc));
        }
        let normalized = format!("{token}Z");
        DateTime::parse_from_rfc3339(&normalized)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// 문법 불일치 라인의 폴백 엔트리를 생성합니다.
    fn fallback_entry(text: &str, received_at: DateTime<Utc>) -> LogEntry {
        let mut metadata = BTreeMap::new();
        metadata.insert("parse_error".to_owned(), "true".to_owned());
        LogEntry {
            timestamp: received_at,
            level: LogLevel::Info,
            service: "unknown".to_owned(),
            host: "unknown".to_owned(),
            message: text.to_owned(),
            metadata,
        }
    }
}

/// 로그 프로세서
///
/// 버스에서 배치를 전달받아 파싱하고, 엔트리마다 알림 엔진을 태핑한 뒤
/// 벌크 버퍼를 거쳐 인덱스에 반영합니다. [`Subscriber`]로 버스에 등록해
/// 사용합니다.
pub struct LogProcessor {
    /// 구독자 이름 (로깅용)
    name: String,
    /// 벌크 인덱싱 크기
    bulk_size: usize,
    /// 대상 인덱스
    index: Arc<TimePartitionedIndex>,
    /// 알림 엔진 탭
    alerts: Arc<AlertEngine>,
    /// 라인 파서
    parser: LineParser,
    /// 벌크 버퍼
    bulk: Mutex<Vec<LogEntry>>,
    /// 처리된 라인 수
    processed: AtomicU64,
    /// 파싱 실패 라인 수
    parse_errors: AtomicU64,
}

impl LogProcessor {
    /// 새 프로세서를 생성합니다.
    pub fn new(
        name: impl Into<String>,
        bulk_size: usize,
        index: Arc<TimePartitionedIndex>,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            name: name.into(),
            bulk_size: bulk_size.max(1),
            index,
            alerts,
            parser: LineParser::new(),
            bulk: Mutex::new(Vec::new()),
            processed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    /// 라인 하나를 처리합니다: 파싱 → 알림 평가 → 벌크 버퍼링.
    pub fn process_line(&self, raw: &RawLine) {
        let (entry, parse_failed) = self.parser.parse(raw);

        self.processed.fetch_add(1, Ordering::Relaxed);
        counter!(
            metric_names::PROCESSOR_PROCESSED_TOTAL,
            metric_names::LABEL_SERVICE => entry.service.clone(),
            metric_names::LABEL_LEVEL => entry.level.to_string().to_lowercase()
        )
        .increment(1);
        if parse_failed {
            self.parse_errors.fetch_add(1, Ordering::Relaxed);
            counter!(metric_names::PROCESSOR_PARSE_ERRORS_TOTAL).increment(1);
        }

        // 알림은 인덱싱 지연과 무관하게 엔트리마다 즉시 평가
        self.alerts.evaluate(&entry);

        let should_flush = {
            let mut bulk = self.lock_bulk();
            bulk.push(entry);
            bulk.len() >= self.bulk_size
        };
        if should_flush {
            self.flush_bulk();
        }
    }

    /// 벌크 버퍼를 인덱스에 일괄 반영합니다.
    ///
    /// 반영된 엔트리 수를 반환합니다.
    pub fn flush_bulk(&self) -> usize {
        let entries = {
            let mut bulk = self.lock_bulk();
            if bulk.is_empty() {
                return 0;
            }
            std::mem::take(&mut *bulk)
        };
        let count = entries.len();
        self.index.bulk_index(entries);
        counter!(metric_names::PROCESSOR_BULK_FLUSHES_TOTAL).increment(1);
        tracing::debug!(processor = %self.name, count, "bulk buffer flushed to index");
        count
    }

    /// 처리된 라인 수를 반환합니다.
    pub fn processed_lines(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// 파싱 실패 라인 수를 반환합니다.
    pub fn parse_error_lines(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// 현재 벌크 버퍼에 대기 중인 엔트리 수를 반환합니다.
    pub fn buffered_entries(&self) -> usize {
        self.lock_bulk().len()
    }

    fn lock_bulk(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.bulk.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Subscriber for LogProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, batch: &LogBatch) {
        for line in &batch.lines {
            self.process_line(line);
        }
    }
}
