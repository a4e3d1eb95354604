use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

// Which window decided a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    None,
    Minute,
    Hour,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::None => "none",
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
        }
    }
}

/// Outcome of a single admission check. Produced per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationResult {
    pub blocked: bool,
    /// Seconds until the breached window resets, 0 when admitted.
    pub remaining_seconds: i64,
    pub breached_window: WindowKind,
}

impl EvaluationResult {
    pub fn admitted() -> Self {
        Self {
            blocked: false,
            remaining_seconds: 0,
            breached_window: WindowKind::None,
        }
    }

    fn blocked(remaining_seconds: i64) -> Self {
        Self {
            blocked: true,
            remaining_seconds,
            breached_window: WindowKind::None,
        }
    }

    fn tagged(mut self, window: WindowKind) -> Self {
        if self.blocked {
            self.breached_window = window;
        }
        self
    }
}

// Span and cap of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowLimit {
    pub span_seconds: i64,
    pub max_count: u64,
}

impl WindowLimit {
    pub const fn new(span_seconds: i64, max_count: u64) -> Self {
        Self {
            span_seconds,
            max_count,
        }
    }
}

/// Limits for both windows. Defaults are 5 per minute and 30 per hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLimits {
    #[serde(default = "default_minute")]
    pub minute: WindowLimit,
    #[serde(default = "default_hour")]
    pub hour: WindowLimit,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            minute: default_minute(),
            hour: default_hour(),
        }
    }
}

fn default_minute() -> WindowLimit {
    WindowLimit::new(60, 5)
}

fn default_hour() -> WindowLimit {
    WindowLimit::new(3600, 30)
}

/// A fixed window counter over unix-second timestamps.
///
/// When a check observes that the window has fully elapsed, the window restarts
/// at that instant with a zero count and the triggering request is admitted
/// without being counted.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window_start: i64,
    count: u64,
    limit: WindowLimit,
}

impl RateWindow {
    pub fn new(limit: WindowLimit, now: i64) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit,
        }
    }

    pub fn check_and_increment(&mut self, now: i64) -> EvaluationResult {
        let remaining = self.limit.span_seconds - (now - self.window_start);

        // window elapsed..? restart it, this request rides free
        if remaining <= 0 {
            self.window_start = now;
            self.count = 0;
            return EvaluationResult::admitted();
        }

        // under limit.? count it
        if self.count < self.limit.max_count {
            self.count += 1;
            return EvaluationResult::admitted();
        }

        EvaluationResult::blocked(remaining)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> i64 {
        self.window_start
    }
}

struct PolicyState {
    minute: RateWindow,
    hour: RateWindow,
    // Only used to notice a day change; nothing is reset on it.
    last_checked_date: String,
}

/// Point-in-time copy of both counters, read under the policy lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub minute_count: u64,
    pub minute_start: i64,
    pub hour_count: u64,
    pub hour_start: i64,
}

/// Process-wide admission policy: a minute window checked before an hour window.
///
/// One instance is built at startup and shared through [`crate::state::AppState`].
/// Every read and write of the window counters goes through the single lock.
pub struct AdmissionPolicy {
    state: Mutex<PolicyState>,
}

impl AdmissionPolicy {
    pub fn new(limits: PolicyLimits) -> Self {
        Self::new_at(limits, Utc::now().timestamp())
    }

    pub fn new_at(limits: PolicyLimits, now: i64) -> Self {
        Self {
            state: Mutex::new(PolicyState {
                minute: RateWindow::new(limits.minute, now),
                hour: RateWindow::new(limits.hour, now),
                last_checked_date: local_date(now),
            }),
        }
    }

    pub fn evaluate(&self) -> EvaluationResult {
        self.evaluate_at(Utc::now().timestamp())
    }

    /// Minute window first; a minute breach is reported even if the hour
    /// window would also reject.
    pub fn evaluate_at(&self, now: i64) -> EvaluationResult {
        let today = local_date(now);
        let mut state = self.state.lock();

        if state.last_checked_date != today {
            debug!(previous = %state.last_checked_date, current = %today, "day rolled over");
            state.last_checked_date = today;
        }

        let minute = state.minute.check_and_increment(now).tagged(WindowKind::Minute);
        if minute.blocked {
            return minute;
        }

        let hour = state.hour.check_and_increment(now).tagged(WindowKind::Hour);
        if hour.blocked {
            return hour;
        }

        EvaluationResult::admitted()
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        let state = self.state.lock();
        PolicySnapshot {
            minute_count: state.minute.count(),
            minute_start: state.minute.window_start(),
            hour_count: state.hour.count(),
            hour_start: state.hour.window_start(),
        }
    }
}

fn local_date(now: i64) -> String {
    DateTime::from_timestamp(now, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_window_admits_up_to_max_then_blocks() {
        let mut window = RateWindow::new(WindowLimit::new(60, 5), T0);

        for i in 0..5 {
            assert!(!window.check_and_increment(T0 + i).blocked);
        }
        assert_eq!(window.count(), 5);

        let result = window.check_and_increment(T0 + 10);
        assert!(result.blocked);
        assert_eq!(result.remaining_seconds, 50);
        assert_eq!(window.count(), 5);
    }

    #[test]
    fn test_window_reset_admits_without_counting() {
        let mut window = RateWindow::new(WindowLimit::new(60, 5), T0);
        for _ in 0..5 {
            window.check_and_increment(T0);
        }

        let result = window.check_and_increment(T0 + 60);
        assert!(!result.blocked);
        assert_eq!(window.count(), 0);
        assert_eq!(window.window_start(), T0 + 60);
    }

    #[test]
    fn test_sixth_request_in_a_minute_breaches_minute() {
        let policy = AdmissionPolicy::new_at(PolicyLimits::default(), T0);

        for i in 0..5 {
            assert_eq!(policy.evaluate_at(T0 + i), EvaluationResult::admitted());
        }

        let result = policy.evaluate_at(T0 + 9);
        assert!(result.blocked);
        assert_eq!(result.breached_window, WindowKind::Minute);
        assert_eq!(result.remaining_seconds, 51);
    }

    #[test]
    fn test_thirty_first_request_in_an_hour_breaches_hour() {
        let policy = AdmissionPolicy::new_at(PolicyLimits::default(), T0);

        // three per minute keeps the minute window clear
        for i in 0..30 {
            let result = policy.evaluate_at(T0 + i * 20);
            assert!(!result.blocked, "request {} should be admitted", i + 1);
        }

        let result = policy.evaluate_at(T0 + 600);
        assert!(result.blocked);
        assert_eq!(result.breached_window, WindowKind::Hour);
        assert_eq!(result.remaining_seconds, 3000);
    }

    #[test]
    fn test_minute_window_recovers_after_elapsing() {
        let policy = AdmissionPolicy::new_at(PolicyLimits::default(), T0);
        for _ in 0..5 {
            policy.evaluate_at(T0);
        }
        assert!(policy.evaluate_at(T0 + 30).blocked);

        // first request after expiry restarts the window and is not counted
        assert!(!policy.evaluate_at(T0 + 60).blocked);
        assert_eq!(policy.snapshot().minute_count, 0);

        for i in 0..5 {
            assert!(!policy.evaluate_at(T0 + 61 + i).blocked);
        }
        assert_eq!(policy.snapshot().minute_count, 5);
        assert_eq!(
            policy.evaluate_at(T0 + 70).breached_window,
            WindowKind::Minute
        );
    }

    #[test]
    fn test_minute_breach_takes_priority_over_hour() {
        let limits = PolicyLimits {
            minute: WindowLimit::new(60, 5),
            hour: WindowLimit::new(3600, 5),
        };
        let policy = AdmissionPolicy::new_at(limits, T0);
        for _ in 0..5 {
            policy.evaluate_at(T0);
        }
        let snapshot = policy.snapshot();
        assert_eq!(snapshot.minute_count, 5);
        assert_eq!(snapshot.hour_count, 5);

        let result = policy.evaluate_at(T0 + 1);
        assert!(result.blocked);
        assert_eq!(result.breached_window, WindowKind::Minute);
    }

    #[test]
    fn test_day_change_is_tracked_without_reset() {
        let policy = AdmissionPolicy::new_at(PolicyLimits::default(), T0);
        policy.evaluate_at(T0);

        let next_day = T0 + 86_400;
        assert!(!policy.evaluate_at(next_day).blocked);
        assert_eq!(policy.state.lock().last_checked_date, local_date(next_day));
        // both windows restarted because they expired; the date change itself resets nothing
        let snapshot = policy.snapshot();
        assert_eq!(snapshot.minute_start, next_day);
        assert_eq!(snapshot.hour_start, next_day);
        assert_eq!(snapshot.hour_count, 0);
    }

    #[test]
    fn test_count_never_decreases_within_window() {
        let policy = AdmissionPolicy::new_at(PolicyLimits::default(), T0);
        let mut last = 0;
        for i in 0..10 {
            policy.evaluate_at(T0 + i);
            let count = policy.snapshot().minute_count;
            assert!(count >= last);
            last = count;
        }
    }

    #[test]
    fn test_concurrent_evaluations_never_over_admit() {
        let policy = Arc::new(AdmissionPolicy::new_at(PolicyLimits::default(), T0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| !policy.evaluate_at(T0 + 1).blocked)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 5);
        assert_eq!(policy.snapshot().minute_count, 5);
    }

    #[test]
    fn test_limits_deserialize_with_defaults() {
        let limits: PolicyLimits =
            serde_json::from_str(r#"{"minute": {"spanSeconds": 10, "maxCount": 2}}"#).unwrap();
        assert_eq!(limits.minute, WindowLimit::new(10, 2));
        assert_eq!(limits.hour, WindowLimit::new(3600, 30));
    }
}
