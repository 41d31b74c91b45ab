//! Per-sensor phase-locked rhythm model.
//!
//! Pure state machine: advancing it never blocks or sleeps. A future-dated
//! [`PendingBeat`] it emits is handed to [`crate::emission::BeatEmitter`],
//! which owns the sleep-until-timestamp worker thread.

use ppg_types::config::PredictorConfig;
use ppg_types::{AcquireEvent, ChannelId, Observation, PredictorPhase, ReleaseEvent};

/// A beat scheduled for a timestamp that may still be in the future.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingBeat {
    pub channel: ChannelId,
    pub ts_ms: u64,
    pub bpm: f32,
    pub intensity: f32,
}

/// Everything a single `update` call may produce. `release` events instead
/// come from [`Predictor::enter_coasting`], which the Processor calls
/// directly on a detector-side transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictorStep {
    pub acquire: Option<AcquireEvent>,
    pub beat: Option<PendingBeat>,
}

pub struct Predictor {
    channel: ChannelId,
    config: PredictorConfig,
    phase_state: PredictorPhase,
    ibi: Option<f64>,
    phase: f64,
    confidence: f32,
    beat_emitted_this_cycle: bool,
    last_observation_ts: Option<u64>,
    bootstrap_ts: Vec<u64>,
    bootstrap_count: usize,
}

impl Predictor {
    pub fn new(channel: ChannelId, config: PredictorConfig) -> Self {
        Self {
            channel,
            config,
            phase_state: PredictorPhase::Stopped,
            ibi: None,
            phase: 0.0,
            confidence: 0.0,
            beat_emitted_this_cycle: false,
            last_observation_ts: None,
            bootstrap_ts: Vec::new(),
            bootstrap_count: 0,
        }
    }

    pub fn phase_state(&self) -> PredictorPhase {
        self.phase_state
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    fn reset_to_stopped(&mut self) {
        self.phase_state = PredictorPhase::Stopped;
        self.ibi = None;
        self.phase = 0.0;
        self.confidence = 0.0;
        self.beat_emitted_this_cycle = false;
        self.last_observation_ts = None;
        self.bootstrap_ts.clear();
        self.bootstrap_count = 0;
    }

    /// The hosting Processor calls this on an Active->Paused detector
    /// transition or a one-shot detector reset: enter Coasting immediately.
    /// Returns the `/release` event to publish, if this was in fact a
    /// Locked->Coasting transition.
    pub fn enter_coasting(&mut self, now_ms: u64) -> Option<ReleaseEvent> {
        if self.phase_state == PredictorPhase::Locked {
            self.phase_state = PredictorPhase::Coasting;
            Some(ReleaseEvent {
                channel: self.channel,
                ts_ms: now_ms,
            })
        } else {
            None
        }
    }

    /// Advance the model by one sample tick (50 Hz), optionally carrying an
    /// observation that arrived at this same tick.
    pub fn update(
        &mut self,
        now_ms: u64,
        dt_ms: f64,
        observation: Option<Observation>,
    ) -> PredictorStep {
        let mut step = PredictorStep::default();

        if self.phase_state == PredictorPhase::Coasting {
            let decay = dt_ms / self.config.coasting_decay_ms;
            self.confidence = (self.confidence - decay as f32).max(0.0);
            if self.confidence <= 0.0 {
                self.reset_to_stopped();
            }
        }

        if let Some(obs) = observation {
            self.on_observation(obs, &mut step);
        }

        if let Some(ibi) = self.ibi {
            if self.confidence > 0.0 {
                self.phase += dt_ms / ibi;
                let tau = 1.0 - (self.config.beat_lookahead_min_ms / ibi);
                if self.phase >= tau && !self.beat_emitted_this_cycle {
                    let remaining = (1.0 - self.phase).max(0.0);
                    let ts_ms = now_ms + (remaining * ibi) as u64;
                    step.beat = Some(PendingBeat {
                        channel: self.channel,
                        ts_ms,
                        bpm: (60_000.0 / ibi) as f32,
                        intensity: self.confidence,
                    });
                    self.beat_emitted_this_cycle = true;
                }
                if self.phase >= 1.0 {
                    self.phase -= 1.0;
                    self.beat_emitted_this_cycle = false;
                }
            }
        }

        step
    }

    fn on_observation(&mut self, obs: Observation, step: &mut PredictorStep) {
        if let (Some(ibi), Some(last_ts)) = (self.ibi, self.last_observation_ts) {
            let since_last = obs.ts_ms.saturating_sub(last_ts) as f64;
            if since_last < self.config.observation_debounce_fraction * ibi {
                return;
            }
        }

        match self.phase_state {
            PredictorPhase::Stopped => {
                self.phase_state = PredictorPhase::Initialization;
                self.bootstrap_ts.clear();
                self.bootstrap_ts.push(obs.ts_ms);
                self.bootstrap_count = 1;
                self.confidence = self.config.confidence_ramp_per_observation;
                self.last_observation_ts = Some(obs.ts_ms);
            }
            PredictorPhase::Initialization => {
                self.bootstrap_ts.push(obs.ts_ms);
                self.bootstrap_count += 1;
                self.confidence =
                    (self.config.confidence_ramp_per_observation * self.bootstrap_count as f64)
                        as f32;
                self.last_observation_ts = Some(obs.ts_ms);

                if self.bootstrap_count >= self.config.bootstrap_observation_count {
                    let mut intervals: Vec<f64> = self
                        .bootstrap_ts
                        .windows(2)
                        .map(|w| (w[1] - w[0]) as f64)
                        .collect();
                    let median_ibi = median(&mut intervals)
                        .clamp(self.config.ibi_min_ms, self.config.ibi_max_ms);
                    self.ibi = Some(median_ibi);
                    self.phase = 0.0;
                    self.confidence = 1.0;
                    self.beat_emitted_this_cycle = false;
                    self.phase_state = PredictorPhase::Locked;
                    step.acquire = Some(AcquireEvent {
                        channel: self.channel,
                        ts_ms: obs.ts_ms,
                        bpm: (60_000.0 / median_ibi) as f32,
                    });
                }
            }
            PredictorPhase::Locked => {
                let interval = self
                    .last_observation_ts
                    .map(|last| (obs.ts_ms.saturating_sub(last)) as f64);
                self.last_observation_ts = Some(obs.ts_ms);

                if let (Some(interval), Some(old_ibi)) = (interval, self.ibi) {
                    let in_bounds = interval >= self.config.ibi_min_ms
                        && interval <= self.config.ibi_max_ms;
                    let in_outlier_band = interval >= old_ibi / self.config.ibi_outlier_factor
                        && interval <= old_ibi * self.config.ibi_outlier_factor;
                    if in_bounds && in_outlier_band {
                        let new_ibi = (1.0 - self.config.ibi_blend_weight) * old_ibi
                            + self.config.ibi_blend_weight * interval;
                        self.ibi = Some(new_ibi);

                        let expected_phase = interval / old_ibi;
                        let phase_error = expected_phase - self.phase;
                        let clamped = phase_error.clamp(
                            -self.config.phase_correction_clamp,
                            self.config.phase_correction_clamp,
                        );
                        self.phase += self.config.phase_correction_weight * clamped;
                        self.confidence = 1.0;
                    }
                }
            }
            PredictorPhase::Coasting => {
                self.phase_state = PredictorPhase::Locked;
                self.confidence =
                    (self.confidence + self.config.confidence_ramp_per_observation as f32)
                        .min(1.0);
                self.last_observation_ts = Some(obs.ts_ms);
            }
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch() -> ChannelId {
        ChannelId::new(0).unwrap()
    }

    fn obs(ts_ms: u64) -> Observation {
        Observation {
            channel: ch(),
            ts_ms,
            sample_value: 3000,
            threshold: 2500.0,
            mad: 100.0,
        }
    }

    #[test]
    fn stopped_has_zero_confidence_and_no_ibi() {
        let p = Predictor::new(ch(), PredictorConfig::default());
        assert_eq!(p.phase_state(), PredictorPhase::Stopped);
        assert_eq!(p.confidence(), 0.0);
    }

    #[test]
    fn bootstrap_locks_after_five_observations() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        let mut ts = 0u64;
        let mut acquired = false;
        for _ in 0..5 {
            let step = p.update(ts, 20.0, Some(obs(ts)));
            if step.acquire.is_some() {
                acquired = true;
            }
            ts += 800;
        }
        assert!(acquired);
        assert_eq!(p.phase_state(), PredictorPhase::Locked);
        assert_eq!(p.confidence(), 1.0);
    }

    #[test]
    fn confidence_ramps_during_initialization() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        p.update(0, 20.0, Some(obs(0)));
        assert!((p.confidence() - 0.2).abs() < 1e-6);
        p.update(800, 20.0, Some(obs(800)));
        assert!((p.confidence() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn coasting_decays_confidence_to_zero_and_stops() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        let mut ts = 0u64;
        for _ in 0..5 {
            p.update(ts, 20.0, Some(obs(ts)));
            ts += 800;
        }
        assert_eq!(p.phase_state(), PredictorPhase::Locked);

        p.enter_coasting(ts);
        assert_eq!(p.phase_state(), PredictorPhase::Coasting);

        // 10_000ms of decay at full-step granularity.
        let mut t = ts;
        for _ in 0..100 {
            p.update(t, 100.0, None);
            t += 100;
        }
        assert_eq!(p.phase_state(), PredictorPhase::Stopped);
        assert_eq!(p.confidence(), 0.0);
    }

    #[test]
    fn observation_during_coasting_returns_to_locked() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        let mut ts = 0u64;
        for _ in 0..5 {
            p.update(ts, 20.0, Some(obs(ts)));
            ts += 800;
        }
        p.enter_coasting(ts);
        // Decay partway.
        p.update(ts, 2_000.0, None);
        assert!(p.confidence() < 1.0);

        p.update(ts + 800, 20.0, Some(obs(ts + 800)));
        assert_eq!(p.phase_state(), PredictorPhase::Locked);
    }

    #[test]
    fn outlier_interval_is_rejected_and_ibi_unchanged() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        let mut ts = 0u64;
        for _ in 0..5 {
            p.update(ts, 20.0, Some(obs(ts)));
            ts += 800;
        }
        let ibi_before = p.ibi;
        // Wildly different interval (2.5x the locked IBI): rejected.
        p.update(ts + 2000, 20.0, Some(obs(ts + 2000)));
        assert_eq!(p.ibi, ibi_before);
    }

    #[test]
    fn observation_arriving_before_the_debounce_fraction_is_ignored() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        let mut ts = 0u64;
        for _ in 0..5 {
            p.update(ts, 20.0, Some(obs(ts)));
            ts += 800;
        }
        let ibi_before = p.ibi;
        // 0.7 * 800 = 560ms; arriving 300ms later must be ignored entirely,
        // leaving last_observation_ts (and therefore IBI) untouched.
        p.update(ts + 300, 20.0, Some(obs(ts + 300)));
        assert_eq!(p.ibi, ibi_before);

        // Now send one at the debounce boundary itself (560ms): accepted.
        p.update(ts + 560, 20.0, Some(obs(ts + 560)));
        assert_ne!(p.ibi, ibi_before);
    }

    #[test]
    fn debounce_gate_also_applies_while_coasting() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        let mut ts = 0u64;
        for _ in 0..5 {
            p.update(ts, 20.0, Some(obs(ts)));
            ts += 800;
        }
        p.enter_coasting(ts);
        let confidence_before = p.confidence();

        // A spurious crossing 50ms after the last one must not snap
        // Coasting back to Locked; confidence should only move by the
        // tick's own decay, not the 0.2 re-lock ramp.
        p.update(ts + 50, 20.0, Some(obs(ts + 50)));
        assert_eq!(p.phase_state(), PredictorPhase::Coasting);
        assert!((confidence_before - p.confidence()) < 0.01);
    }

    #[test]
    fn ibi_clamped_to_bounds_during_bootstrap() {
        let mut p = Predictor::new(ch(), PredictorConfig::default());
        // Intervals far below the 400ms floor.
        let mut ts = 0u64;
        for _ in 0..5 {
            p.update(ts, 20.0, Some(obs(ts)));
            ts += 100;
        }
        assert_eq!(p.ibi, Some(400.0));
    }
}
