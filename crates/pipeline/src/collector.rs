//! 수집기 -- 호스트별 배칭 및 로컬 스풀 폴백
//!
//! [`CollectorAgent`]는 원시 라인을 호스트/서비스 컨텍스트로 보강해 버퍼링하고,
//! `batch_size`에 도달하면 전송 계층으로 플러시합니다. 지연 상한을 위해
//! 외부 타이머([`spawn_flush_task`])로도 플러시를 트리거할 수 있습니다.
//!
//! # 스풀 폴백
//! 전송 계층이 `Unavailable`을 반환하면 배치는 드롭되지 않고 무제한
//! 로컬 스풀로 이동합니다. 복구 시 스풀 내용이 현재 버퍼보다 **먼저**
//! 발행되어 도착 순서가 유지됩니다. 프로세스가 살아있는 동안 유실은 없으며,
//! 플러시 전 크래시에서만 유실될 수 있습니다 (best-effort 경계).

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, gauge};

use logtide_core::metrics as metric_names;

use crate::transport::{LogBatch, RawLine, Transport};

/// 수집기 내부 상태 (뮤텍스로 보호)
struct AgentState {
    /// 현재 배치 버퍼
    buffer: Vec<RawLine>,
    /// 전송 장애 시 배치가 대기하는 무제한 로컬 스풀
    spool: VecDeque<LogBatch>,
    /// 전송 완료된 라인 수
    shipped_lines: u64,
    /// 스풀로 우회했던 라인 수 (누적)
    spooled_lines: u64,
}

/// 호스트별 수집 에이전트
///
/// 내부 상태가 뮤텍스로 보호되므로 `Arc`로 공유하여 플러시 타이머 태스크와
/// 함께 사용할 수 있습니다.
pub struct CollectorAgent {
    /// 수집 호스트 식별자
    host: String,
    /// 수집 서비스명
    service: String,
    /// 배치 크기 (도달 시 자동 플러시)
    batch_size: usize,
    /// 발행 대상 전송 계층
    transport: Arc<dyn Transport>,
    /// 내부 가변 상태
    state: Mutex<AgentState>,
}

impl CollectorAgent {
    /// 새 수집 에이전트를 생성합니다.
    pub fn new(
        host: impl Into<String>,
        service: impl Into<String>,
        batch_size: usize,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            batch_size: batch_size.max(1),
            transport,
            state: Mutex::new(AgentState {
                buffer: Vec::new(),
                spool: VecDeque::new(),
                shipped_lines: 0,
                spooled_lines: 0,
            }),
        }
    }

    /// 원시 라인 하나를 수집합니다.
    ///
    /// 호스트/서비스 컨텍스트로 보강하여 버퍼에 추가하고,
    /// 버퍼가 `batch_size`에 도달하면 플러시합니다.
    pub fn collect(&self, line: impl Into<Bytes>) {
        let raw = RawLine::new(line.into(), self.host.clone(), self.service.clone());
        let should_flush = {
            let mut state = self.lock_state();
            state.buffer.push(raw);
            state.buffer.len() >= self.batch_size
        };
        if should_flush {
            self.flush();
        }
    }

    /// 버퍼와 스풀을 전송 계층으로 플러시합니다.
    ///
    /// 스풀에 대기 중인 배치가 현재 버퍼보다 먼저 발행됩니다.
    /// 전송 장애는 호출자에게 전파되지 않고 스풀이 흡수합니다.
    /// 이번 호출로 전송에 성공한 라인 수를 반환합니다.
    pub fn flush(&self) -> u64 {
        let mut state = self.lock_state();
        let mut shipped_now: u64 = 0;

        // 1. 스풀 드레인 (도착 순서 유지: 오래된 것부터)
        while let Some(batch) = state.spool.pop_front() {
            match self.transport.publish(&batch) {
                Ok(()) => {
                    let lines = batch.len() as u64;
                    state.shipped_lines += lines;
                    shipped_now += lines;
                    counter!(
                        metric_names::COLLECTOR_SHIPPED_TOTAL,
                        metric_names::LABEL_HOST => self.host.clone()
                    )
                    .increment(lines);
                }
                Err(err) => {
                    tracing::warn!(
                        host = %self.host,
                        spool_depth = state.spool.len() + 1,
                        error = %err,
                        "transport still unavailable, keeping spool"
                    );
                    state.spool.push_front(batch);
                    break;
                }
            }
        }

        // 2. 현재 버퍼
        if !state.buffer.is_empty() {
            let batch = LogBatch::new(mem::take(&mut state.buffer));
            let lines = batch.len() as u64;

            // 스풀이 남아있으면 순서 보존을 위해 발행 시도 없이 뒤에 붙임
            if !state.spool.is_empty() {
                state.spooled_lines += lines;
                counter!(
                    metric_names::COLLECTOR_SPOOLED_TOTAL,
                    metric_names::LABEL_HOST => self.host.clone()
                )
                .increment(lines);
                state.spool.push_back(batch);
            } else {
                match self.transport.publish(&batch) {
                    Ok(()) => {
                        state.shipped_lines += lines;
                        shipped_now += lines;
                        counter!(
                            metric_names::COLLECTOR_SHIPPED_TOTAL,
                            metric_names::LABEL_HOST => self.host.clone()
                        )
                        .increment(lines);
                    }
                    Err(err) => {
                        tracing::warn!(
                            host = %self.host,
                            lines,
                            error = %err,
                            "transport unavailable, batch moved to local spool"
                        );
                        state.spooled_lines += lines;
                        counter!(
                            metric_names::COLLECTOR_SPOOLED_TOTAL,
                            metric_names::LABEL_HOST => self.host.clone()
                        )
                        .increment(lines);
                        state.spool.push_back(batch);
                    }
                }
            }
        }

        gauge!(
            metric_names::COLLECTOR_SPOOL_DEPTH,
            metric_names::LABEL_HOST => self.host.clone()
        )
        .set(state.spool.len() as f64);
        shipped_now
    }

    /// 전송 완료된 라인 수를 반환합니다.
    pub fn shipped_lines(&self) -> u64 {
        self.lock_state().shipped_lines
    }

    /// 지금까지 스풀로 우회했던 라인 수를 반환합니다 (누적).
    pub fn spooled_lines(&self) -> u64 {
        self.lock_state().spooled_lines
    }

    /// 현재 스풀에 대기 중인 배치 수를 반환합니다.
    pub fn spool_depth(&self) -> usize {
        self.lock_state().spool.len()
    }

    /// 현재 버퍼에 있는 라인 수를 반환합니다.
    pub fn buffered_lines(&self) -> usize {
        self.lock_state().buffer.len()
    }

    /// 수집 호스트 식별자를 반환합니다.
    pub fn host(&self) -> &str {
        &self.host
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 주기적 플러시 태스크를 스폰합니다.
///
/// 버퍼가 `batch_size`에 도달하지 않아도 `interval`마다 플러시하여
/// 전달 지연에 상한을 둡니다. 반환된 핸들을 `abort()`하면 중단됩니다.
pub fn spawn_flush_task(
    agent: Arc<CollectorAgent>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            agent.flush();
        }
    })
}
