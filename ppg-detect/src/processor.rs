//! Owns one Detector/Predictor pair per channel and wires detector
//! transitions into the predictor, and predictor transitions onto the
//! bus.

use std::sync::{Arc, Mutex};

use ppg_osc::{BusMessage, ListenerHandle, OscBus, OscBusError};
use ppg_types::config::EngineConfig;
use ppg_types::{ChannelId, DetectorPhase, PredictorPhase, Sample, SampleBundle};

use crate::detector::Detector;
use crate::emission::BeatEmitter;
use crate::predictor::Predictor;

struct ChannelUnit {
    channel: ChannelId,
    detector: Detector,
    predictor: Predictor,
    last_ts: Option<u64>,
}

impl ChannelUnit {
    fn new(channel: ChannelId, config: &EngineConfig) -> Self {
        Self {
            channel,
            detector: Detector::new(channel, config.detector),
            predictor: Predictor::new(channel, config.predictor),
            last_ts: None,
        }
    }
}

struct Inner {
    channels: Vec<ChannelUnit>,
    beat_bus: Arc<OscBus>,
    emitter: BeatEmitter,
}

impl Inner {
    fn unit_mut(&mut self, channel: ChannelId) -> &mut ChannelUnit {
        &mut self.channels[channel.raw() as usize]
    }

    fn ingest_bundle(&mut self, bundle: SampleBundle) {
        for sample in bundle.to_samples() {
            self.ingest_sample(bundle.channel, sample);
        }
    }

    fn ingest_sample(&mut self, channel: ChannelId, sample: Sample) {
        let unit = self.unit_mut(channel);
        let dt_ms = unit
            .last_ts
            .map(|last| sample.ts_ms.saturating_sub(last) as f64)
            .unwrap_or(20.0);
        unit.last_ts = Some(sample.ts_ms);

        let detector_step = unit.detector.ingest(sample);

        if detector_step.reset || detector_step.transitioned_to_paused {
            if let Some(release) = unit.predictor.enter_coasting(sample.ts_ms) {
                let _ = self.beat_bus.broadcast(&BusMessage::Release {
                    channel: release.channel,
                    ts_ms: release.ts_ms,
                });
            }
        }

        let unit = self.unit_mut(channel);
        let predictor_step = unit.predictor.update(sample.ts_ms, dt_ms, detector_step.observation);

        if let Some(acquire) = predictor_step.acquire {
            let _ = self.beat_bus.broadcast(&BusMessage::Acquire {
                channel: acquire.channel,
                ts_ms: acquire.ts_ms,
                bpm: acquire.bpm,
            });
        }

        if let Some(beat) = predictor_step.beat {
            self.emitter.schedule(beat);
        }
    }
}

/// Owns detection/prediction for all 8 channels and the listener thread
/// that feeds it from the ppg-stream bus.
pub struct Processor {
    inner: Arc<Mutex<Inner>>,
    _ppg_listener: ListenerHandle,
}

impl Processor {
    /// Bind a listener on `ppg_bus` and start the shared beat-emission
    /// worker writing to `beat_bus`.
    pub fn spawn(
        config: &EngineConfig,
        ppg_bus: &OscBus,
        beat_bus: Arc<OscBus>,
    ) -> Result<Self, OscBusError> {
        let channels: Vec<ChannelUnit> = ChannelId::all()
            .map(|ch| ChannelUnit::new(ch, config))
            .collect();
        let emitter = BeatEmitter::spawn("beat-emitter", Arc::clone(&beat_bus));
        let inner = Arc::new(Mutex::new(Inner {
            channels,
            beat_bus,
            emitter,
        }));

        let listener_inner = Arc::clone(&inner);
        let ppg_listener = ppg_bus.spawn_listener("processor-ppg", move |msg| {
            if let BusMessage::Ppg {
                channel,
                values,
                ts_ms,
            } = msg
            {
                let bundle = SampleBundle {
                    channel,
                    values,
                    ts_ms,
                };
                if let Ok(mut guard) = listener_inner.lock() {
                    guard.ingest_bundle(bundle);
                }
            }
        })?;

        Ok(Self {
            inner,
            _ppg_listener: ppg_listener,
        })
    }

    /// Feed a bundle directly, bypassing the bus: used by tests and by
    /// in-process producers (e.g. replay).
    pub fn ingest(&self, bundle: SampleBundle) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.ingest_bundle(bundle);
        }
    }

    pub fn channel_state(&self, channel: ChannelId) -> (DetectorPhase, PredictorPhase) {
        let guard = self.inner.lock().expect("processor lock poisoned");
        let unit = &guard.channels[channel.raw() as usize];
        (unit.detector.phase(), unit.predictor.phase_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(channel: ChannelId, value: u16, ts_ms: u64) -> SampleBundle {
        SampleBundle {
            channel,
            values: [value; 5],
            ts_ms,
        }
    }

    #[test]
    fn acquires_lock_after_sustained_rhythmic_crossings() {
        let config = EngineConfig::default();
        let beat_bus = Arc::new(OscBus::open(47_900).expect("open beat bus"));
        let ppg_bus = OscBus::open(47_901).expect("open ppg bus");
        let processor = Processor::spawn(&config, &ppg_bus, beat_bus).expect("spawn processor");
        let ch = ChannelId::new(0).unwrap();

        // Warm up the buffer with alternating noisy values.
        let mut ts = 0u64;
        for i in 0..25u64 {
            let v = if i % 2 == 0 { 1800 } else { 2200 };
            processor.ingest(bundle(ch, v as u16, ts));
            ts += 100;
        }
        assert_eq!(processor.channel_state(ch).0, DetectorPhase::Active);

        // Drive five clean upward crossings spaced 800ms apart.
        for _ in 0..5 {
            processor.ingest(bundle(ch, 1500, ts));
            ts += 450;
            processor.ingest(bundle(ch, 3200, ts));
            ts += 450;
        }

        assert_eq!(processor.channel_state(ch).1, PredictorPhase::Locked);
    }

    #[test]
    fn signal_loss_drives_predictor_to_coasting() {
        let config = EngineConfig::default();
        let beat_bus = Arc::new(OscBus::open(47_902).expect("open beat bus"));
        let ppg_bus = OscBus::open(47_903).expect("open ppg bus");
        let processor = Processor::spawn(&config, &ppg_bus, beat_bus).expect("spawn processor");
        let ch = ChannelId::new(1).unwrap();

        let mut ts = 0u64;
        for i in 0..25u64 {
            let v = if i % 2 == 0 { 1800 } else { 2200 };
            processor.ingest(bundle(ch, v as u16, ts));
            ts += 100;
        }
        for _ in 0..5 {
            processor.ingest(bundle(ch, 1500, ts));
            ts += 450;
            processor.ingest(bundle(ch, 3200, ts));
            ts += 450;
        }
        assert_eq!(processor.channel_state(ch).1, PredictorPhase::Locked);

        // A flat run drives the detector to Paused, which should coast the
        // predictor.
        for _ in 0..5 {
            processor.ingest(bundle(ch, 2048, ts));
            ts += 100;
        }
        assert_eq!(processor.channel_state(ch).0, DetectorPhase::Paused);
        assert_eq!(processor.channel_state(ch).1, PredictorPhase::Coasting);
    }
}
