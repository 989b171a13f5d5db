//! Endpoint health state machine and scoring.
//!
//! # States
//! - Healthy: endpoint receives traffic
//! - Recovering: endpoint excluded from routing, probed in the background
//!
//! # State Transitions
//! ```text
//! Healthy → Recovering: score < fallback_threshold
//! Recovering → Healthy: score > recover_threshold
//! ```
//!
//! # Design Decisions
//! - Penalties are negative deltas, the score is capped at 0
//! - Recovery is credited only for idle time before a successful call
//! - The gap between the two thresholds prevents flapping
//! - Transitions are evaluated once per completed call, nowhere else

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::HealthScoringConfig;
use crate::sync::record::LatencySample;

/// Routing classification of an endpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    Healthy = 1,
    Recovering = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            2 => HealthState::Recovering,
            _ => HealthState::Healthy,
        }
    }
}

/// How the last completed call was judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallVerdict {
    Failed,
    HighLatency,
    Ok,
}

impl CallVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            CallVerdict::Failed => "failed",
            CallVerdict::HighLatency => "high_latency",
            CallVerdict::Ok => "success",
        }
    }
}

/// Result of scoring one completed call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub verdict: CallVerdict,
    pub score: f64,
    /// New state if this call flipped the classification.
    pub transition: Option<HealthState>,
}

/// Per-call performance bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct CallPerformance {
    /// Completion time of the most recent call. Never moves backwards.
    pub last_call_at: Option<Instant>,
    pub last_call_succeeded: bool,
    pub last_call_latency: Duration,
    /// Idle gap credited to the most recently completed call.
    pub time_waited_before_last_call: Duration,
    /// Start of the newest call that has already claimed the idle gap.
    pub idle_credited_until: Option<Instant>,
}

/// Score, classification and call history of one endpoint.
///
/// Not synchronized on its own; the tracker keeps it behind a mutex.
#[derive(Debug)]
pub struct ScoreCard {
    score: f64,
    state: HealthState,
    perf: CallPerformance,
    /// Score at the last successful shared-store merge.
    synced_score: f64,
    latest_sample: Option<LatencySample>,
}

impl Default for ScoreCard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreCard {
    pub fn new() -> Self {
        Self {
            score: 0.0,
            state: HealthState::Healthy,
            perf: CallPerformance::default(),
            synced_score: 0.0,
            latest_sample: None,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn perf(&self) -> &CallPerformance {
        &self.perf
    }

    pub fn latest_sample(&self) -> Option<&LatencySample> {
        self.latest_sample.as_ref()
    }

    /// Claim the idle gap before a call that starts at `start`.
    ///
    /// The gap runs from the later of the last completion and the last claimed
    /// start, so overlapping calls never claim the same idle time twice. The
    /// returned gap belongs to this call and is passed back on completion.
    pub fn record_before_call(&mut self, start: Instant) -> Duration {
        let since = match (self.perf.last_call_at, self.perf.idle_credited_until) {
            (Some(done), Some(claimed)) => Some(done.max(claimed)),
            (done, claimed) => done.or(claimed),
        };
        if self.perf.idle_credited_until.map_or(true, |claimed| claimed < start) {
            self.perf.idle_credited_until = Some(start);
        }
        since.map_or(Duration::ZERO, |since| start.saturating_duration_since(since))
    }

    /// Record the outcome of a call that ran from `start` to `end` after
    /// idling for `waited`.
    pub fn record_after_call(&mut self, start: Instant, end: Instant, waited: Duration, succeeded: bool) {
        // Overlapping calls may finish out of order; keep the newest completion.
        self.perf.last_call_at = Some(match self.perf.last_call_at {
            Some(last) if last > end => last,
            _ => end,
        });
        self.perf.last_call_latency = end.saturating_duration_since(start);
        self.perf.last_call_succeeded = succeeded;
        self.perf.time_waited_before_last_call = waited;
    }

    /// Remember the latest latency sample for the shared store.
    pub fn record_sample(&mut self, sample: LatencySample) {
        self.latest_sample = Some(sample);
    }

    /// Score the last recorded call and apply any classification change.
    pub fn evaluate(&mut self, config: &HealthScoringConfig) -> Evaluation {
        let verdict = if !self.perf.last_call_succeeded {
            self.score += config.error_penalty;
            CallVerdict::Failed
        } else if self.perf.last_call_latency > config.max_latency_allowed() {
            self.score += config.high_latency_penalty;
            CallVerdict::HighLatency
        } else {
            let waited = self.perf.time_waited_before_last_call;
            if !waited.is_zero() {
                self.reward_idle_time(waited, config);
            }
            CallVerdict::Ok
        };

        let transition = self.check_transition(config);
        Evaluation {
            verdict,
            score: self.score,
            transition,
        }
    }

    fn reward_idle_time(&mut self, waited: Duration, config: &HealthScoringConfig) {
        if self.score == 0.0 {
            return;
        }
        let credited = match config.max_recover_wait() {
            Some(cap) => waited.min(cap),
            None => waited,
        };
        let reward = credited.as_secs_f64() * 1000.0 * config.recover_score_per_ms;
        self.score = (self.score + reward).min(0.0);
    }

    fn check_transition(&mut self, config: &HealthScoringConfig) -> Option<HealthState> {
        match self.state {
            HealthState::Healthy if self.score < config.fallback_threshold => {
                self.state = HealthState::Recovering;
                Some(HealthState::Recovering)
            }
            HealthState::Recovering if self.score > config.recover_threshold => {
                self.state = HealthState::Healthy;
                Some(HealthState::Healthy)
            }
            _ => None,
        }
    }

    /// Score change since the last successful merge.
    pub fn unsynced_delta(&self) -> f64 {
        self.score - self.synced_score
    }

    /// Adopt a merged score. `reported_score` is the local score that was sent
    /// with the merge; anything accumulated since then is kept on top.
    pub fn adopt_merged_score(&mut self, merged: f64, reported_score: f64) {
        let accrued_since_report = self.score - reported_score;
        self.synced_score = merged;
        self.score = (merged + accrued_since_report).min(0.0);
    }
}
