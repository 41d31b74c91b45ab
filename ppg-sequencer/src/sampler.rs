//! Per-channel sampler/looper.
//!
//! Captures raw PPG to the capture binary format, lets the grid assign the
//! capture to a virtual channel (4..7), and replays it there in a loop.
//! The record/assignment workflow is a three-phase state machine; the set
//! of active virtual-channel playbacks is tracked independently since more
//! than one can be live while the workflow phase sits at `Idle`.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ppg_capture::{CaptureReader, CaptureRecord, CaptureWriter};
use ppg_osc::message::SamplerStatusKind;
use ppg_osc::{BusMessage, ListenerHandle, OscBus, OscBusError};
use ppg_types::config::EngineConfig;
use ppg_types::ChannelId;

/// How often the deadline-check thread wakes to look for an expired
/// recording or assignment window.
const DEADLINE_POLL: Duration = Duration::from_millis(250);

enum Phase {
    Idle,
    Recording {
        src: u8,
        writer: CaptureWriter<Vec<u8>>,
        deadline: Instant,
    },
    AssignmentMode {
        #[allow(dead_code)]
        src: u8,
        buffer: Arc<Vec<CaptureRecord>>,
        deadline: Instant,
    },
}

struct PlaybackHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

struct Inner {
    phase: Phase,
    playbacks: [Option<PlaybackHandle>; 4],
    record_timeout: Duration,
    assignment_timeout: Duration,
}

impl Inner {
    fn on_record_toggle(&mut self, control_bus: &OscBus, src: u8) {
        enum Action {
            Start,
            Stop,
            Ignore,
        }
        let action = match &self.phase {
            Phase::Idle => Action::Start,
            Phase::Recording { src: cur, .. } if *cur == src => Action::Stop,
            _ => Action::Ignore,
        };
        match action {
            Action::Start => {
                self.phase = Phase::Recording {
                    src,
                    writer: CaptureWriter::new(Vec::new(), src),
                    deadline: Instant::now() + self.record_timeout,
                };
                let _ = control_bus.broadcast(&status(SamplerStatusKind::Recording, src, true));
            }
            Action::Stop => self.stop_recording(control_bus),
            Action::Ignore => {
                log::debug!(target: "sequencer::sampler", "ignoring record toggle for {src} in the current phase");
            }
        }
    }

    fn stop_recording(&mut self, control_bus: &OscBus) {
        let Phase::Recording { src, writer, .. } =
            std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };
        let bytes = writer.into_inner();
        let buffer = decode_capture(bytes, src);
        self.phase = Phase::AssignmentMode {
            src,
            buffer: Arc::new(buffer),
            deadline: Instant::now() + self.assignment_timeout,
        };
        let _ = control_bus.broadcast(&status(SamplerStatusKind::Recording, src, false));
        let _ = control_bus.broadcast(&status(SamplerStatusKind::Assignment, src, true));
    }

    fn discard_assignment(&mut self, control_bus: &OscBus) {
        let Phase::AssignmentMode { src, .. } = &self.phase else {
            return;
        };
        let src = *src;
        self.phase = Phase::Idle;
        let _ = control_bus.broadcast(&status(SamplerStatusKind::Assignment, src, false));
    }

    fn on_assign(&mut self, control_bus: &OscBus, ppg_bus: &Arc<OscBus>, dest: u8) {
        let Phase::AssignmentMode { src, buffer, .. } = &self.phase else {
            log::debug!(target: "sequencer::sampler", "ignoring assign to {dest}: not in assignment mode");
            return;
        };
        let src = *src;
        let buffer = Arc::clone(buffer);
        self.stop_playback(control_bus, dest);
        self.start_playback(control_bus, ppg_bus, dest, buffer);
        let _ = control_bus.broadcast(&status(SamplerStatusKind::Assignment, src, false));
        self.phase = Phase::Idle;
    }

    fn on_toggle(&mut self, control_bus: &OscBus, dest: u8) {
        if self.playback_slot(dest).is_some() {
            self.stop_playback(control_bus, dest);
        }
    }

    fn playback_slot(&mut self, dest: u8) -> Option<&mut Option<PlaybackHandle>> {
        if !(4..=7).contains(&dest) {
            return None;
        }
        Some(&mut self.playbacks[(dest - 4) as usize])
    }

    fn start_playback(&mut self, control_bus: &OscBus, ppg_bus: &Arc<OscBus>, dest: u8, buffer: Arc<Vec<CaptureRecord>>) {
        let Some(channel) = ChannelId::new(dest) else {
            return;
        };
        if buffer.is_empty() {
            log::warn!(target: "sequencer::sampler", "refusing to start playback on {dest}: empty capture");
            return;
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let bus = Arc::clone(ppg_bus);
        let join = thread::Builder::new()
            .name(format!("sampler-playback-{dest}"))
            .spawn(move || run_playback(channel, buffer, bus, thread_shutdown))
            .expect("failed to spawn sampler playback thread");
        if let Some(slot) = self.playback_slot(dest) {
            *slot = Some(PlaybackHandle {
                shutdown,
                join: Some(join),
            });
        }
        let _ = control_bus.broadcast(&status(SamplerStatusKind::Playback, dest, true));
    }

    fn stop_playback(&mut self, control_bus: &OscBus, dest: u8) {
        if let Some(slot) = self.playback_slot(dest) {
            if let Some(handle) = slot.take() {
                handle.stop();
                let _ = control_bus.broadcast(&status(SamplerStatusKind::Playback, dest, false));
            }
        }
    }

    fn check_deadlines(&mut self, control_bus: &OscBus) {
        let now = Instant::now();
        let recording_expired = matches!(&self.phase, Phase::Recording { deadline, .. } if now >= *deadline);
        if recording_expired {
            self.stop_recording(control_bus);
            return;
        }
        let assignment_expired =
            matches!(&self.phase, Phase::AssignmentMode { deadline, .. } if now >= *deadline);
        if assignment_expired {
            self.discard_assignment(control_bus);
        }
    }
}

fn decode_capture(bytes: Vec<u8>, expected_channel: u8) -> Vec<CaptureRecord> {
    match CaptureReader::open(Cursor::new(bytes)) {
        Ok(mut reader) => {
            debug_assert_eq!(reader.channel, expected_channel);
            reader.read_all().unwrap_or_default()
        }
        Err(e) => {
            log::warn!(target: "sequencer::sampler", "failed to decode capture buffer: {e}");
            Vec::new()
        }
    }
}

fn status(kind: SamplerStatusKind, channel: u8, active: bool) -> BusMessage {
    BusMessage::SamplerStatus { kind, channel, active }
}

fn run_playback(
    dest: ChannelId,
    buffer: Arc<Vec<CaptureRecord>>,
    bus: Arc<OscBus>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let mut prev_ts = buffer[0].ts_ms;
        for record in buffer.iter() {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let delta_ms = record.ts_ms.saturating_sub(prev_ts).max(0) as u64;
            if delta_ms > 0 {
                thread::sleep(Duration::from_millis(delta_ms));
            }
            prev_ts = record.ts_ms;

            let mut values = [0u16; 5];
            for (v, s) in values.iter_mut().zip(record.samples.iter()) {
                *v = (*s).clamp(0, 4095) as u16;
            }
            // Byte-identical to the captured bundle except for the channel
            // id: the original ts_ms rides along unchanged, not a
            // replay-time stamp.
            let msg = BusMessage::Ppg {
                channel: dest,
                values,
                ts_ms: record.ts_ms as u64,
            };
            let _ = bus.broadcast(&msg);
        }
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
    }
}

/// Owns the sampler's two listener threads and its deadline-check thread.
pub struct Sampler {
    state: Arc<Mutex<Inner>>,
    _ppg_listener: ListenerHandle,
    _control_listener: ListenerHandle,
    deadline_shutdown: Arc<AtomicBool>,
    deadline_join: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn spawn(
        config: &EngineConfig,
        ppg_bus: Arc<OscBus>,
        control_bus: Arc<OscBus>,
    ) -> Result<Self, OscBusError> {
        let state = Arc::new(Mutex::new(Inner {
            phase: Phase::Idle,
            playbacks: Default::default(),
            record_timeout: Duration::from_millis(config.sampler_record_timeout_ms),
            assignment_timeout: Duration::from_millis(config.sampler_assignment_timeout_ms),
        }));

        let capture_state = Arc::clone(&state);
        let ppg_listener = ppg_bus.spawn_listener("sampler-ppg", move |msg| {
            if let BusMessage::Ppg { channel, values, ts_ms } = msg {
                let Ok(mut guard) = capture_state.lock() else {
                    return;
                };
                if let Phase::Recording { src, writer, .. } = &mut guard.phase {
                    if *src == channel.raw() {
                        let record = CaptureRecord {
                            ts_ms: ts_ms as i32,
                            samples: values.map(|v| v as i32),
                        };
                        let _ = writer.write_record(record);
                    }
                }
            }
        })?;

        let control_state = Arc::clone(&state);
        let control_bus_for_listener = Arc::clone(&control_bus);
        let ppg_bus_for_listener = Arc::clone(&ppg_bus);
        let control_listener = control_bus.spawn_listener("sampler-control", move |msg| {
            let Ok(mut guard) = control_state.lock() else {
                return;
            };
            match msg {
                BusMessage::SamplerRecordToggle { src } => {
                    guard.on_record_toggle(&control_bus_for_listener, src)
                }
                BusMessage::SamplerAssign { dest } => {
                    guard.on_assign(&control_bus_for_listener, &ppg_bus_for_listener, dest)
                }
                BusMessage::SamplerToggle { dest } => guard.on_toggle(&control_bus_for_listener, dest),
                _ => {}
            }
        })?;

        let deadline_shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&deadline_shutdown);
        let deadline_state = Arc::clone(&state);
        let deadline_bus = control_bus;
        let deadline_join = thread::Builder::new()
            .name("sampler-deadlines".to_string())
            .spawn(move || loop {
                if thread_shutdown.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(DEADLINE_POLL);
                if let Ok(mut guard) = deadline_state.lock() {
                    guard.check_deadlines(&deadline_bus);
                }
            })
            .expect("failed to spawn sampler deadline thread");

        Ok(Self {
            state,
            _ppg_listener: ppg_listener,
            _control_listener: control_listener,
            deadline_shutdown,
            deadline_join: Some(deadline_join),
        })
    }

    pub fn active_playbacks(&self) -> [bool; 4] {
        let guard = self.state.lock().expect("sampler state lock poisoned");
        let mut out = [false; 4];
        for (i, slot) in guard.playbacks.iter().enumerate() {
            out[i] = slot.is_some();
        }
        out
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.deadline_shutdown.store(true, Ordering::Relaxed);
        if let Some(j) = self.deadline_join.take() {
            let _ = j.join();
        }
    }
}
