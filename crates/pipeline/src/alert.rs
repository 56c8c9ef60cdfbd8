//! 알림 엔진 -- 규칙별 슬라이딩 윈도우 평가와 쿨다운 억제
//!
//! [`AlertEngine`]은 인덱싱 경로와 무관하게 모든 엔트리를 태핑하여
//! 활성 규칙과 대조합니다. 규칙마다 독립적인 슬라이딩 윈도우와 쿨다운
//! 시계를 유지하므로, 한 규칙의 평가가 다른 규칙을 차단하지 않습니다.
//!
//! 시간 기준은 엔트리 자신의 타임스탬프(이벤트 시간)입니다. 윈도우 purge와
//! 쿨다운 비교 모두 이벤트 시간으로 수행되어 재처리 시에도 결과가
//! 결정적입니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use regex::Regex;
use serde::{Deserialize, Serialize};

use logtide_core::metrics as metric_names;
use logtide_core::types::{FiredAlert, LogEntry, LogLevel};

use crate::error::PipelineError;

/// 규칙에 쿨다운 미지정 시 적용되는 기본값
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// 알림 규칙 매칭 조건
///
/// 지정된 조건은 모두 AND로 결합됩니다. 아무 조건도 없으면 모든 엔트리와
/// 매칭됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchPredicate {
    /// 서비스명 일치
    pub service: Option<String>,
    /// 호스트명 일치
    pub host: Option<String>,
    /// 최소 로그 레벨 (이 레벨 이상)
    pub min_level: Option<LogLevel>,
    /// 메시지 부분 문자열 (대소문자 무시)
    pub message_contains: Option<String>,
    /// 메시지 정규식 (규칙 설치 시 컴파일)
    pub message_regex: Option<String>,
}

/// 알림 규칙
///
/// 외부 설정 저장소가 소유하며, 엔진은 읽기 전용으로 소비합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    /// 규칙 고유 ID
    pub id: String,
    /// 규칙 이름 (표시용)
    pub name: String,
    /// 매칭 조건
    pub predicate: MatchPredicate,
    /// 슬라이딩 윈도우 길이
    pub window: Duration,
    /// 발화 임계값 (윈도우 내 매칭 수)
    pub threshold: u64,
    /// 규칙별 쿨다운. `None`이면 엔진 기본값이 적용됩니다.
    pub cooldown: Option<Duration>,
    /// 활성 여부 (비활성 규칙은 평가되지 않음)
    pub active: bool,
}

impl AlertRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.id.is_empty() {
            return Err(PipelineError::RuleValidation {
                rule_id: "<empty>".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }
        if self.threshold == 0 {
            return Err(PipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "threshold must be greater than 0".to_owned(),
            });
        }
        if self.window.is_zero() {
            return Err(PipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "window must be greater than 0".to_owned(),
            });
        }
        if let Some(cooldown) = self.cooldown
            && cooldown.is_zero()
        {
            return Err(PipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "cooldown must be greater than 0 when set".to_owned(),
            });
        }
        Ok(())
    }
}

/// 규칙별 가변 상태 (규칙 자신의 뮤텍스로 보호)
#[derive(Debug, Default)]
struct RuleState {
    /// 윈도우 내 매칭 타임스탬프
    window: VecDeque<DateTime<Utc>>,
    /// 마지막 발화 시각
    last_fired: Option<DateTime<Utc>>,
}

/// 설치 시점에 컴파일된 규칙
///
/// 정규식은 설치 시 한 번만 컴파일되고, 쿨다운은 엔진 기본값으로
/// 해석이 끝난 상태로 보관됩니다.
struct CompiledRule {
    rule: AlertRule,
    regex: Option<Regex>,
    cooldown: Duration,
    state: Mutex<RuleState>,
}

impl CompiledRule {
    /// 엔트리가 규칙 조건과 매칭되는지 확인합니다.
    fn matches(&self, entry: &LogEntry) -> bool {
        let predicate = &self.rule.predicate;
        if let Some(service) = &predicate.service
            && entry.service != *service
        {
            return false;
        }
        if let Some(host) = &predicate.host
            && entry.host != *host
        {
            return false;
        }
        if let Some(min_level) = predicate.min_level
            && entry.level < min_level
        {
            return false;
        }
        if let Some(needle) = &predicate.message_contains
            && !entry
                .message
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        if let Some(regex) = &self.regex
            && !regex.is_match(&entry.message)
        {
            return false;
        }
        true
    }
}

/// 슬라이딩 윈도우 알림 엔진
///
/// 인스턴스 단위로 상태를 소유하므로 한 프로세스에서 독립적인 엔진
/// 여러 개를 운용할 수 있습니다 (테스트 격리 포함).
pub struct AlertEngine {
    /// 설치된 규칙 (활성/비활성 포함)
    rules: RwLock<Vec<Arc<CompiledRule>>>,
    /// 규칙에 쿨다운 미지정 시 적용되는 기본값
    default_cooldown: Duration,
    /// 발화 히스토리 (append-only)
    history: Mutex<Vec<FiredAlert>>,
    /// 쿨다운으로 억제된 발화 시도 수
    suppressed: AtomicU64,
}

impl AlertEngine {
    /// 지정된 기본 쿨다운으로 엔진을 생성합니다.
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            default_cooldown,
            history: Mutex::new(Vec::new()),
            suppressed: AtomicU64::new(0),
        }
    }

    /// 기본 쿨다운([`DEFAULT_COOLDOWN`])으로 엔진을 생성합니다.
    pub fn with_default_cooldown() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }

    /// 규칙 목록을 설치합니다. 기존 규칙과 상태는 모두 교체됩니다.
    ///
    /// 각 규칙이 검증되고 정규식이 컴파일됩니다. 하나라도 실패하면
    /// 아무 규칙도 설치되지 않습니다.
    pub fn install_rules(&self, rules: Vec<AlertRule>) -> Result<(), PipelineError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            rule.validate()?;
            let regex = match &rule.predicate.message_regex {
                Some(pattern) => Some(Regex::new(pattern)?),
                None => None,
            };
            let cooldown = rule.cooldown.unwrap_or(self.default_cooldown);
            tracing::info!(
                rule_id = %rule.id,
                threshold = rule.threshold,
                window_secs = rule.window.as_secs(),
                cooldown_secs = cooldown.as_secs(),
                active = rule.active,
                "alert rule installed"
            );
            compiled.push(Arc::new(CompiledRule {
                rule,
                regex,
                cooldown,
                state: Mutex::new(RuleState::default()),
            }));
        }
        *self
            .rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = compiled;
        Ok(())
    }

    /// 엔트리 하나를 모든 활성 규칙과 대조합니다.
    ///
    /// 이번 호출로 발화된 알림 목록을 반환합니다. 쿨다운 중의 임계값
    /// 돌파는 조용히 억제됩니다.
    pub fn evaluate(&self, entry: &LogEntry) -> Vec<FiredAlert> {
        let rules: Vec<Arc<CompiledRule>> = self
            .rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();

        let mut fired = Vec::new();
        for compiled in rules {
            if !compiled.rule.active || !compiled.matches(entry) {
                continue;
            }
            if let Some(alert) = self.advance_rule(&compiled, entry.timestamp) {
                fired.push(alert);
            }
        }
        fired
    }

    /// 규칙 윈도우를 전진시키고, 임계값 도달 시 발화를 시도합니다.
    fn advance_rule(
        &self,
        compiled: &CompiledRule,
        now: DateTime<Utc>,
    ) -> Option<FiredAlert> {
        let window = chrono::Duration::from_std(compiled.rule.window).ok()?;
        let cutoff = now - window;

        let mut state = compiled
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.window.push_back(now);
        while let Some(oldest) = state.window.front() {
            if *oldest < cutoff {
                state.window.pop_front();
            } else {
                break;
            }
        }

        let count = state.window.len() as u64;
        if count < compiled.rule.threshold {
            return None;
        }

        // 쿨다운 중 돌파는 조용히 억제 (알림 폭풍 방지)
        if let Some(last) = state.last_fired {
            let elapsed = now.signed_duration_since(last);
            let cooldown = chrono::Duration::from_std(compiled.cooldown).ok()?;
            if elapsed < cooldown {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                counter!(
                    metric_names::ALERT_SUPPRESSED_TOTAL,
                    metric_names::LABEL_RULE => compiled.rule.id.clone()
                )
                .increment(1);
                return None;
            }
        }

        state.last_fired = Some(now);
        drop(state);

        let alert = FiredAlert::new(
            compiled.rule.id.clone(),
            compiled.rule.name.clone(),
            count,
            now,
        );
        tracing::warn!(
            rule_id = %alert.rule_id,
            count = alert.count,
            fired_at = %alert.fired_at.to_rfc3339(),
            "alert fired"
        );
        counter!(
            metric_names::ALERT_FIRED_TOTAL,
            metric_names::LABEL_RULE => alert.rule_id.clone()
        )
        .increment(1);
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(alert.clone());
        Some(alert)
    }

    /// 모든 규칙의 윈도우와 쿨다운 시계를 초기화합니다.
    ///
    /// 설치된 규칙과 발화 히스토리는 유지됩니다.
    pub fn reset(&self) {
        let rules = self
            .rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for compiled in rules.iter() {
            let mut state = compiled
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *state = RuleState::default();
        }
        tracing::debug!("alert engine state reset");
    }

    /// 발화 히스토리 사본을 반환합니다 (오래된 것부터).
    pub fn history(&self) -> Vec<FiredAlert> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 설치된 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// 쿨다운으로 억제된 발화 시도 수를 반환합니다.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 15, 10, 0, 0).unwrap()
    }

    fn error_entry(offset_secs: i64) -> LogEntry {
        LogEntry {
            timestamp: base_time() + chrono::Duration::seconds(offset_secs),
            level: LogLevel::Error,
            service: "api".to_owned(),
            host: "web-01".to_owned(),
            message: "request failed".to_owned(),
            metadata: BTreeMap::new(),
        }
    }

    fn burst_rule(cooldown: Option<Duration>) -> AlertRule {
        AlertRule {
            id: "error_burst".to_owned(),
            name: "Error Burst".to_owned(),
            predicate: MatchPredicate {
                min_level: Some(LogLevel::Error),
                ..Default::default()
            },
            window: Duration::from_secs(10),
            threshold: 3,
            cooldown,
            active: true,
        }
    }

    fn engine_with(rules: Vec<AlertRule>) -> AlertEngine {
        let engine = AlertEngine::new(Duration::from_secs(60));
        engine.install_rules(rules).unwrap();
        engine
    }

    #[test]
    fn fires_once_at_threshold_then_suppresses_then_refires() {
        // threshold=3, window=10s, cooldown=10s
        let engine = engine_with(vec![burst_rule(Some(Duration::from_secs(10)))]);

        // 10초 안에 매칭 3건 -> 정확히 한 번 발화
        assert!(engine.evaluate(&error_entry(0)).is_empty());
        assert!(engine.evaluate(&error_entry(2)).is_empty());
        let fired = engine.evaluate(&error_entry(4));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].count, 3);

        // 1초 뒤 4번째 매칭 -> 쿨다운 중이므로 재발화 없음
        assert!(engine.evaluate(&error_entry(5)).is_empty());
        assert_eq!(engine.suppressed_count(), 1);

        // 쿨다운 만료 후 5번째 매칭 -> 다시 발화
        let refired = engine.evaluate(&error_entry(14));
        assert_eq!(refired.len(), 1);

        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn window_purges_old_timestamps() {
        let engine = engine_with(vec![burst_rule(Some(Duration::from_secs(10)))]);

        // 두 건은 윈도우를 벗어나 세 번째에서 임계값 미달
        assert!(engine.evaluate(&error_entry(0)).is_empty());
        assert!(engine.evaluate(&error_entry(1)).is_empty());
        assert!(engine.evaluate(&error_entry(30)).is_empty());

        // 새 윈도우에서 다시 3건이 모이면 발화
        assert!(engine.evaluate(&error_entry(31)).is_empty());
        assert_eq!(engine.evaluate(&error_entry(32)).len(), 1);
    }

    #[test]
    fn default_cooldown_applies_when_rule_has_none() {
        let engine = engine_with(vec![burst_rule(None)]);

        engine.evaluate(&error_entry(0));
        engine.evaluate(&error_entry(1));
        assert_eq!(engine.evaluate(&error_entry(2)).len(), 1);

        // 규칙별 쿨다운 미지정 -> 엔진 기본값 60초 적용
        engine.evaluate(&error_entry(10));
        engine.evaluate(&error_entry(11));
        assert!(engine.evaluate(&error_entry(12)).is_empty());
        assert!(engine.suppressed_count() >= 1);

        // 기본 쿨다운 만료 후 새 돌파는 발화
        engine.evaluate(&error_entry(61));
        engine.evaluate(&error_entry(62));
        assert_eq!(engine.evaluate(&error_entry(63)).len(), 1);
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut rule = burst_rule(None);
        rule.active = false;
        rule.threshold = 1;
        let engine = engine_with(vec![rule]);

        assert!(engine.evaluate(&error_entry(0)).is_empty());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn predicate_service_and_host_must_match() {
        let mut rule = burst_rule(None);
        rule.threshold = 1;
        rule.predicate.service = Some("api".to_owned());
        rule.predicate.host = Some("web-02".to_owned());
        let engine = engine_with(vec![rule]);

        // host 불일치
        assert!(engine.evaluate(&error_entry(0)).is_empty());
    }

    #[test]
    fn predicate_message_contains_is_case_insensitive() {
        let mut rule = burst_rule(None);
        rule.threshold = 1;
        rule.predicate.message_contains = Some("FAILED".to_owned());
        let engine = engine_with(vec![rule]);

        assert_eq!(engine.evaluate(&error_entry(0)).len(), 1);
    }

    #[test]
    fn predicate_regex_filters_messages() {
        let mut rule = burst_rule(None);
        rule.threshold = 1;
        rule.predicate.message_regex = Some(r"failed|timeout".to_owned());
        let engine = engine_with(vec![rule]);

        assert_eq!(engine.evaluate(&error_entry(0)).len(), 1);

        let mut entry = error_entry(1);
        entry.message = "all good".to_owned();
        assert!(engine.evaluate(&entry).is_empty());
    }

    #[test]
    fn empty_predicate_matches_everything() {
        let mut rule = burst_rule(None);
        rule.threshold = 1;
        rule.predicate = MatchPredicate::default();
        let engine = engine_with(vec![rule]);

        let mut entry = error_entry(0);
        entry.level = LogLevel::Debug;
        assert_eq!(engine.evaluate(&entry).len(), 1);
    }

    #[test]
    fn rules_evaluate_independently() {
        let mut noisy = burst_rule(None);
        noisy.id = "noisy".to_owned();
        noisy.threshold = 1;
        let quiet = burst_rule(None);
        let engine = engine_with(vec![noisy, quiet]);

        let fired = engine.evaluate(&error_entry(0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_id, "noisy");
    }

    #[test]
    fn reset_clears_window_and_cooldown() {
        let engine = engine_with(vec![burst_rule(Some(Duration::from_secs(10)))]);

        engine.evaluate(&error_entry(0));
        engine.evaluate(&error_entry(1));
        assert_eq!(engine.evaluate(&error_entry(2)).len(), 1);

        engine.reset();

        // 윈도우가 비워졌으므로 다시 3건이 필요하고, 쿨다운도 풀림
        assert!(engine.evaluate(&error_entry(3)).is_empty());
        assert!(engine.evaluate(&error_entry(4)).is_empty());
        assert_eq!(engine.evaluate(&error_entry(5)).len(), 1);
    }

    #[test]
    fn install_rejects_zero_threshold() {
        let mut rule = burst_rule(None);
        rule.threshold = 0;
        let engine = AlertEngine::with_default_cooldown();
        assert!(engine.install_rules(vec![rule]).is_err());
    }

    #[test]
    fn install_rejects_invalid_regex() {
        let mut rule = burst_rule(None);
        rule.predicate.message_regex = Some("(unclosed".to_owned());
        let engine = AlertEngine::with_default_cooldown();
        assert!(matches!(
            engine.install_rules(vec![rule]),
            Err(PipelineError::Regex(_))
        ));
    }

    #[test]
    fn install_replaces_previous_rules_and_state() {
        let engine = engine_with(vec![burst_rule(None)]);
        engine.evaluate(&error_entry(0));
        engine.evaluate(&error_entry(1));

        engine.install_rules(vec![burst_rule(None)]).unwrap();

        // 윈도우가 새로 시작되므로 다시 3건 필요
        assert!(engine.evaluate(&error_entry(2)).is_empty());
        assert!(engine.evaluate(&error_entry(3)).is_empty());
        assert_eq!(engine.evaluate(&error_entry(4)).len(), 1);
    }
}
