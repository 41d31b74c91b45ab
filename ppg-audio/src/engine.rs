//! Wires sample banks, routing, effects, and the mixer to the bus and to a
//! `cpal` output stream.
//!
//! The real-time output callback never takes a lock shared with the beat
//! thread: voices cross from `on_beat`'s DSP work to the callback over a
//! `crossbeam_channel` queue (the same handoff shape the predictor uses to
//! hand a future beat to its emission worker), and the mixer itself is
//! owned solely by the callback closure. The routing table is the other
//! half of that separation: it carries its own lock (`SharedRouting`) and
//! is read and released before any DSP or mixer work starts.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};

use ppg_osc::{BusMessage, ListenerHandle, OscBus, OscBusError};
use ppg_types::config::EngineConfig;
use ppg_types::effect::{linear_map, EffectChain, EffectKind, EffectParams};
use ppg_types::loops::LoopId;
use ppg_types::voice::Voice;
use ppg_types::ChannelId;

use crate::effects::EffectRack;
use crate::loops::{LoopManager, StartOutcome};
use crate::mixer::{LoopTag, Mixer};
use crate::routing::SharedRouting;
use crate::samples::SampleBank;

/// BPM range the effect parameter law maps from, matching the predictor's
/// IBI bounds of 400..1333ms.
const BPM_MIN: f32 = 45.0;
const BPM_MAX: f32 = 150.0;

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug)]
pub enum AudioEngineError {
    Bus(OscBusError),
    Stream(String),
}

impl std::fmt::Display for AudioEngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioEngineError::Bus(e) => write!(f, "audio engine bus error: {e}"),
            AudioEngineError::Stream(e) => write!(f, "audio engine stream error: {e}"),
        }
    }
}

impl std::error::Error for AudioEngineError {}

impl From<OscBusError> for AudioEngineError {
    fn from(e: OscBusError) -> Self {
        AudioEngineError::Bus(e)
    }
}

/// Compute the full canonical effect-parameter set for a beat's bpm/
/// intensity, in a fixed order: reverb, phaser, delay, chorus, low-pass.
fn effect_params_for(bpm: f32, intensity: f32) -> [EffectParams; 5] {
    [
        EffectParams {
            kind: EffectKind::Reverb,
            primary: linear_map(intensity, 0.0, 1.0, 0.1, 0.9),
        },
        EffectParams {
            kind: EffectKind::Phaser,
            primary: linear_map(bpm, BPM_MIN, BPM_MAX, 0.2, 2.0),
        },
        EffectParams {
            kind: EffectKind::Delay,
            primary: linear_map(bpm, BPM_MIN, BPM_MAX, 500.0, 150.0),
        },
        EffectParams {
            kind: EffectKind::Chorus,
            primary: linear_map(intensity, 0.0, 1.0, 0.2, 1.2),
        },
        EffectParams {
            kind: EffectKind::LowPass,
            primary: linear_map(intensity, 0.0, 1.0, 1200.0, 8000.0),
        },
    ]
}

struct ChannelRig {
    chain: EffectChain,
    rack: EffectRack,
}

/// A prepared voice handoff from the beat/control threads to the audio
/// callback. The callback drains these with a non-blocking `try_recv`
/// before rendering each block; it never waits on them.
enum MixerCommand {
    Play(Voice),
    PlayTagged(LoopTag, Voice),
    StopTag(LoopTag),
}

/// Everything the beat and control OSC threads mutate. Never touched by
/// the real-time audio callback.
struct Inner {
    config: EngineConfig,
    banks: SampleBank,
    loop_manager: LoopManager,
    channels: Vec<ChannelRig>,
    mixer_tx: Sender<MixerCommand>,
}

impl Inner {
    fn rig_mut(&mut self, bank: u8) -> &mut ChannelRig {
        &mut self.channels[bank as usize]
    }

    fn gated(&self, ts_ms: u64) -> bool {
        let now = now_unix_ms();
        now.saturating_sub(ts_ms) > ppg_types::config::TIMESTAMP_GATE_MS
    }

    fn on_beat(&mut self, routing: &SharedRouting, channel: ChannelId, ts_ms: u64, bpm: f32, intensity: f32) {
        if self.gated(ts_ms) {
            log::debug!(target: "audio::engine", "dropping stale beat on channel {channel}");
            return;
        }

        let bank = channel.bank();
        // Routing's own lock is taken and released right here, well before
        // any DSP work or the mixer handoff.
        let sample_index = routing.get(channel);
        let source = self.banks.bank_sample(bank, sample_index);

        let params = effect_params_for(bpm, intensity);
        let rig = self.rig_mut(bank);
        rig.chain.rebuild(&params);
        rig.rack.sync(rig.chain.chain());

        let mut rendered: Vec<f32> = (*source).clone();
        for s in &mut rendered {
            *s = rig.rack.process(*s);
        }

        let pan = if self.config.panning_enabled {
            self.config.channel_pan[bank as usize]
        } else {
            0.0
        };
        let intensity_gain = if self.config.intensity_scaling_enabled {
            Some(intensity)
        } else {
            None
        };

        let _ = self
            .mixer_tx
            .send(MixerCommand::Play(Voice::new(Arc::new(rendered), pan, intensity_gain)));
    }

    fn on_acquire(&mut self, channel: ChannelId, ts_ms: u64) {
        if self.gated(ts_ms) {
            return;
        }
        let pan = linear_map(channel.raw() as f32, 0.0, 7.0, -1.0, 1.0);
        let _ = self.mixer_tx.send(MixerCommand::Play(Voice::new(
            self.banks.acquire_sample(),
            pan,
            None,
        )));
    }

    fn on_loop_start(&mut self, id: LoopId) {
        match self.loop_manager.start(id) {
            StartOutcome::AlreadyActive => {}
            StartOutcome::Started { evicted } => {
                if let Some(old) = evicted {
                    let _ = self.mixer_tx.send(MixerCommand::StopTag(old.raw()));
                }
                let source = self.banks.loop_sample(id.raw());
                let _ = self
                    .mixer_tx
                    .send(MixerCommand::PlayTagged(id.raw(), Voice::looping(source)));
            }
        }
    }

    fn on_loop_stop(&mut self, id: LoopId) {
        self.loop_manager.stop(id);
        let _ = self.mixer_tx.send(MixerCommand::StopTag(id.raw()));
    }
}

/// The live audio subsystem: bus listeners plus the cpal output stream.
/// Dropping it tears down both.
pub struct AudioEngine {
    inner: Arc<Mutex<Inner>>,
    voice_count: Arc<AtomicUsize>,
    _beat_listener: ListenerHandle,
    _control_listener: ListenerHandle,
    _stream: Stream,
}

impl AudioEngine {
    pub fn spawn(
        config: EngineConfig,
        sample_dir: &Path,
        beat_bus: &OscBus,
        control_bus: &OscBus,
    ) -> Result<Self, AudioEngineError> {
        let banks = SampleBank::load(sample_dir);
        let sample_rate = banks.sample_rate();

        let channels = (0..4)
            .map(|_| ChannelRig {
                chain: EffectChain::new(),
                rack: EffectRack::new(sample_rate),
            })
            .collect();

        let (mixer_tx, mixer_rx) = crossbeam_channel::unbounded();
        let routing = Arc::new(SharedRouting::new());
        let voice_count = Arc::new(AtomicUsize::new(0));

        let inner = Arc::new(Mutex::new(Inner {
            config,
            banks,
            loop_manager: LoopManager::new(),
            channels,
            mixer_tx,
        }));

        let beat_inner = Arc::clone(&inner);
        let beat_routing = Arc::clone(&routing);
        let beat_listener = beat_bus.spawn_listener("audio-beat", move |msg| {
            let Ok(mut guard) = beat_inner.lock() else {
                return;
            };
            match msg {
                BusMessage::Beat {
                    channel,
                    ts_ms,
                    bpm,
                    intensity,
                } => guard.on_beat(&beat_routing, channel, ts_ms, bpm, intensity),
                BusMessage::Acquire { channel, ts_ms, .. } => guard.on_acquire(channel, ts_ms),
                BusMessage::Release { .. } => {
                    // Contract only: a release carries no audio of its own.
                }
                _ => {}
            }
        })?;

        let control_inner = Arc::clone(&inner);
        let control_routing = Arc::clone(&routing);
        let control_listener = control_bus.spawn_listener("audio-control", move |msg| {
            match msg {
                BusMessage::Route {
                    channel,
                    sample_index,
                } => control_routing.set(channel, sample_index),
                BusMessage::LoopStart(id) => {
                    if let Some(id) = LoopId::new(id) {
                        if let Ok(mut guard) = control_inner.lock() {
                            guard.on_loop_start(id);
                        }
                    }
                }
                BusMessage::LoopStop(id) => {
                    if let Some(id) = LoopId::new(id) {
                        if let Ok(mut guard) = control_inner.lock() {
                            guard.on_loop_stop(id);
                        }
                    }
                }
                _ => {}
            }
        })?;

        let stream = build_output_stream(mixer_rx, Arc::clone(&voice_count), sample_rate)?;
        stream
            .play()
            .map_err(|e| AudioEngineError::Stream(e.to_string()))?;

        Ok(Self {
            inner,
            voice_count,
            _beat_listener: beat_listener,
            _control_listener: control_listener,
            _stream: stream,
        })
    }

    pub fn voice_count(&self) -> usize {
        self.voice_count.load(Ordering::Relaxed)
    }
}

/// Builds the real-time output stream. The callback owns the `Mixer`
/// outright and only ever drains `mixer_rx` with a non-blocking
/// `try_recv`; it holds no lock shared with any other thread.
fn build_output_stream(
    mixer_rx: Receiver<MixerCommand>,
    voice_count: Arc<AtomicUsize>,
    sample_rate: u32,
) -> Result<Stream, AudioEngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioEngineError::Stream("no output device available".to_string()))?;

    let config = StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut mixer = Mixer::new();

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Ok(cmd) = mixer_rx.try_recv() {
                    match cmd {
                        MixerCommand::Play(voice) => mixer.play(voice),
                        MixerCommand::PlayTagged(tag, voice) => mixer.play_tagged(tag, voice),
                        MixerCommand::StopTag(tag) => mixer.stop_tag(tag),
                    }
                }
                let frames = data.len() / 2;
                mixer.render(data, frames);
                voice_count.store(mixer.voice_count(), Ordering::Relaxed);
            },
            |err| log::error!(target: "audio::engine", "output stream error: {err}"),
            None,
        )
        .map_err(|e| AudioEngineError::Stream(e.to_string()))
}
