//! 전송 계층 -- 생산자와 소비자를 분리하는 순서 보장 팬아웃 버스
//!
//! [`TransportBus`]는 발행된 배치를 등록된 모든 구독자에게 발행 순서대로,
//! 동기적으로 전달합니다. 느린 구독자는 발행자를 역압(back-pressure)하며,
//! 이는 전달 보장을 위한 의도된 트레이드오프입니다.
//!
//! 수집기와 프로세서는 [`Transport`] / [`Subscriber`] trait에만 의존하므로,
//! 이후 오프셋 추적 브로커로 교체해도 상위 코드는 변경되지 않습니다.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use logtide_core::error::TransportError;

/// 수집된 원시 로그 한 줄
///
/// 수집기가 호스트/서비스 컨텍스트로 보강하여 생성하고, 프로세서가 소비합니다.
#[derive(Debug, Clone)]
pub struct RawLine {
    /// 원시 라인 바이트
    pub data: Bytes,
    /// 수집 호스트
    pub host: String,
    /// 수집 서비스
    pub service: String,
    /// 수집 시각
    pub received_at: DateTime<Utc>,
}

impl RawLine {
    /// 새 RawLine을 생성합니다.
    pub fn new(data: Bytes, host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            data,
            host: host.into(),
            service: service.into(),
            received_at: Utc::now(),
        }
    }

    /// 라인을 UTF-8 문자열로 반환합니다 (비정상 바이트는 손실 변환).
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// 버스를 통해 전달되는 로그 배치
#[derive(Debug, Clone)]
pub struct LogBatch {
    /// 배치 고유 ID (UUID v4)
    pub id: String,
    /// 배치에 포함된 라인
    pub lines: Vec<RawLine>,
    /// 발행 시각
    pub published_at: DateTime<Utc>,
}

impl LogBatch {
    /// 새 배치를 생성합니다.
    pub fn new(lines: Vec<RawLine>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lines,
            published_at: Utc::now(),
        }
    }

    /// 배치에 포함된 라인 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 배치가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// 배치 구독자 trait
///
/// 프로세서 등 버스의 소비자가 구현합니다. `deliver`는 발행자 스레드에서
/// 동기적으로 호출되므로 내부 가변 상태는 구현체가 직접 보호해야 합니다.
pub trait Subscriber: Send + Sync {
    /// 구독자 이름 (로깅용)
    fn name(&self) -> &str;

    /// 배치 한 건을 전달받습니다.
    fn deliver(&self, batch: &LogBatch);
}

/// 발행 측 trait — 수집기가 의존하는 좁은 seam
///
/// [`TransportBus`]가 기본 구현이며, 테스트에서는 장애를 주입하는
/// 대역으로 교체할 수 있습니다.
pub trait Transport: Send + Sync {
    /// 배치 하나를 발행합니다.
    ///
    /// `Err(TransportError::Unavailable)`은 일시적 장애를 의미하며,
    /// 호출자(수집기)는 배치를 로컬 스풀로 우회시킵니다.
    fn publish(&self, batch: &LogBatch) -> Result<(), TransportError>;

    /// 여러 배치를 순서대로 발행합니다. 개별 publish의 순차 실행과 동일합니다.
    fn publish_batch(&self, batches: &[LogBatch]) -> Result<(), TransportError> {
        for batch in batches {
            self.publish(batch)?;
        }
        Ok(())
    }
}

/// 순서 보장 동기 팬아웃 버스
///
/// `publish`는 반환 전에 현재 등록된 모든 구독자에게 등록 순서대로
/// 배치를 전달합니다. 생산자별 순서는 보장되지만 생산자 간 전역 순서는
/// 보장되지 않습니다.
pub struct TransportBus {
    /// 등록 순서를 유지하는 구독자 목록
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    /// 발행된 배치 수
    published_count: AtomicU64,
}

impl TransportBus {
    /// 새 버스를 생성합니다.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            published_count: AtomicU64::new(0),
        }
    }

    /// 구독자를 등록합니다.
    ///
    /// 등록 이후 발행되는 모든 배치가 전달됩니다. 등록 이전 배치는
    /// 재전달되지 않습니다.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!(subscriber = subscriber.name(), "subscriber registered");
        subs.push(subscriber);
    }

    /// 현재 등록된 구독자 수를 반환합니다.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// 지금까지 발행된 배치 수를 반환합니다.
    pub fn published_count(&self) -> u64 {
        self.published_count.load(Ordering::Relaxed)
    }
}

impl Default for TransportBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TransportBus {
    fn publish(&self, batch: &LogBatch) -> Result<(), TransportError> {
        // 전달 중 구독자 목록 변경을 막아 기존 구독자 전원 가시성을 보장
        let subs = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for subscriber in subs.iter() {
            subscriber.deliver(batch);
        }
        self.published_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
