//! Per-sensor signal-quality state machine.

use std::collections::VecDeque;

use ppg_types::config::DetectorConfig;
use ppg_types::{ChannelId, DetectorPhase, Observation, Sample};

/// Result of feeding one sample into a [`Detector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorStep {
    pub observation: Option<Observation>,
    /// Active -> Paused happened on this sample.
    pub transitioned_to_paused: bool,
    /// Paused -> Active happened on this sample.
    pub transitioned_to_active: bool,
    /// A reboot or stream-gap reset happened on this sample: the one-shot
    /// signal the hosting Processor forwards to the Predictor.
    pub reset: bool,
}

/// Per-sensor detector. One instance per channel, owned by the `Processor`.
pub struct Detector {
    channel: ChannelId,
    config: DetectorConfig,
    phase: DetectorPhase,
    buffer: VecDeque<u16>,
    prev_sample: Option<u16>,
    last_observation_ts: Option<u64>,
    last_message_ts: Option<u64>,
    pause_entry_ts: Option<u64>,
    recovery_start_ts: Option<u64>,
}

impl Detector {
    pub fn new(channel: ChannelId, config: DetectorConfig) -> Self {
        Self {
            channel,
            config,
            phase: DetectorPhase::Warmup,
            buffer: VecDeque::with_capacity(config.buffer_len),
            prev_sample: None,
            last_observation_ts: None,
            last_message_ts: None,
            pause_entry_ts: None,
            recovery_start_ts: None,
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    fn reset_state(&mut self) {
        self.buffer.clear();
        self.prev_sample = None;
        self.last_observation_ts = None;
        self.pause_entry_ts = None;
        self.recovery_start_ts = None;
        self.phase = DetectorPhase::Warmup;
    }

    /// Feed one sample through discontinuity handling, the rolling buffer,
    /// and the state machine, in that order.
    pub fn ingest(&mut self, sample: Sample) -> DetectorStep {
        let mut step = DetectorStep::default();

        if let Some(last) = self.last_message_ts {
            let delta = sample.ts_ms as i64 - last as i64;
            if delta < -(self.config.reboot_backward_ms as i64) {
                self.reset_state();
                step.reset = true;
            } else if delta < 0 {
                // Out-of-order: drop the sample, but clear the debounce gate
                // so the next valid sample isn't mis-gated against a stale
                // observation timestamp.
                self.last_observation_ts = None;
                return step;
            } else if delta > self.config.gap_forward_ms as i64 {
                self.reset_state();
                step.reset = true;
            }
        }
        self.last_message_ts = Some(sample.ts_ms);

        self.buffer.push_back(sample.value);
        while self.buffer.len() > self.config.buffer_len {
            self.buffer.pop_front();
        }

        match self.phase {
            DetectorPhase::Warmup => {
                if self.buffer.len() >= self.config.buffer_len {
                    self.phase = DetectorPhase::Active;
                }
            }
            DetectorPhase::Active => {
                let (median, mad) = median_and_mad(&self.buffer);
                if !self.quality_ok(median, mad) {
                    self.phase = DetectorPhase::Paused;
                    self.pause_entry_ts = Some(sample.ts_ms);
                    self.recovery_start_ts = None;
                    step.transitioned_to_paused = true;
                } else {
                    let threshold = median + self.config.threshold_k * mad;
                    if let Some(prev) = self.prev_sample {
                        let crossed =
                            (prev as f64) < threshold && (sample.value as f64) >= threshold;
                        let debounce_ok = match self.last_observation_ts {
                            None => true,
                            Some(last_obs) => {
                                sample.ts_ms.saturating_sub(last_obs) >= self.config.debounce_ms
                            }
                        };
                        if crossed && debounce_ok {
                            step.observation = Some(Observation {
                                channel: self.channel,
                                ts_ms: sample.ts_ms,
                                sample_value: sample.value,
                                threshold,
                                mad,
                            });
                            self.last_observation_ts = Some(sample.ts_ms);
                        }
                    }
                }
            }
            DetectorPhase::Paused => {
                let (median, mad) = median_and_mad(&self.buffer);
                if self.quality_ok(median, mad) {
                    match self.recovery_start_ts {
                        None => self.recovery_start_ts = Some(sample.ts_ms),
                        Some(start) => {
                            if sample.ts_ms.saturating_sub(start) >= self.config.pause_recovery_ms
                            {
                                self.phase = DetectorPhase::Active;
                                self.recovery_start_ts = None;
                                step.transitioned_to_active = true;
                            }
                        }
                    }
                } else {
                    self.recovery_start_ts = None;
                }
            }
        }

        self.prev_sample = Some(sample.value);
        step
    }

    fn quality_ok(&self, _median: f64, mad: f64) -> bool {
        if mad < self.config.mad_floor {
            return false;
        }
        let total = self.buffer.len().max(1) as f64;
        let bottom = self
            .buffer
            .iter()
            .filter(|&&v| v <= self.config.rail_low)
            .count() as f64;
        let top = self
            .buffer
            .iter()
            .filter(|&&v| v >= self.config.rail_high)
            .count() as f64;
        let max_ratio = (bottom / total).max(top / total);
        max_ratio <= self.config.rail_pinned_ratio_limit
    }
}

/// Median and median-absolute-deviation of a buffer of raw sample values.
fn median_and_mad(buffer: &VecDeque<u16>) -> (f64, f64) {
    if buffer.is_empty() {
        return (0.0, 0.0);
    }
    let mut values: Vec<f64> = buffer.iter().map(|&v| v as f64).collect();
    let median = median_of(&mut values);
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
    let mad = median_of(&mut deviations);
    (median, mad)
}

/// In-place median via sort (buffer is capped at 100, cost is negligible).
fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
