//! Grid-controller sequencer.
//!
//! Holds `sample_map[0..3]` and `loop_status[0..31]`, translates grid
//! events on the control bus into routing/loop control messages plus LED
//! feedback. Single lock, single listener thread: no tick loop needed,
//! everything here is event-driven.

use std::sync::{Arc, Mutex};

use ppg_osc::message::SamplerStatusKind;
use ppg_osc::{BusMessage, ListenerHandle, OscBus, OscBusError};
use ppg_types::ChannelId;

/// LED colour used for an actively-selected sample cell.
const LED_SELECTED: u8 = 64;
const LED_UNSELECTED: u8 = 0;
/// LED colour for an active loop cell.
const LED_LOOP_ACTIVE: u8 = 96;
const LED_LOOP_OFF: u8 = 0;
/// LED mode constants (`/led` args: 0|1|2).
const MODE_STATIC: u8 = 0;
const MODE_PULSE: u8 = 1;

/// Scene-status LED rows, below the four sample-select rows (0..3) and the
/// four loop rows (4..7 would overflow an 8-row grid, so status reuses row
/// 7's upper columns).
const STATUS_ROW: u8 = 7;

struct SequencerState {
    sample_map: [u8; 4],
    loop_status: [bool; 32],
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            sample_map: [0; 4],
            loop_status: [false; 32],
        }
    }
}

impl SequencerState {
    fn on_select(&mut self, bus: &OscBus, channel: ChannelId, column: u8) {
        let idx = channel.raw() as usize;
        if idx >= self.sample_map.len() {
            return;
        }
        let previous = self.sample_map[idx];
        if column == previous {
            return;
        }
        self.sample_map[idx] = column;
        let _ = bus.broadcast(&BusMessage::Route {
            channel,
            sample_index: column,
        });
        let _ = bus.broadcast(&led(channel.raw(), previous, LED_UNSELECTED, MODE_STATIC));
        let _ = bus.broadcast(&led(channel.raw(), column, LED_SELECTED, MODE_PULSE));
    }

    fn on_loop_toggle(&mut self, bus: &OscBus, id: u8) {
        if id as usize >= self.loop_status.len() {
            return;
        }
        self.loop_status[id as usize] = !self.loop_status[id as usize];
        let active = self.loop_status[id as usize];
        let msg = if active {
            BusMessage::LoopStart(id)
        } else {
            BusMessage::LoopStop(id)
        };
        let _ = bus.broadcast(&msg);
        let (row, col) = loop_cell(id);
        let color = if active { LED_LOOP_ACTIVE } else { LED_LOOP_OFF };
        let _ = bus.broadcast(&led(row, col, color, MODE_STATIC));
    }

    fn on_loop_momentary(&self, bus: &OscBus, id: u8, state: bool) {
        let msg = if state {
            BusMessage::LoopStart(id)
        } else {
            BusMessage::LoopStop(id)
        };
        let _ = bus.broadcast(&msg);
    }

    fn on_sampler_status(&self, bus: &OscBus, kind: SamplerStatusKind, channel: u8, active: bool) {
        let row = STATUS_ROW;
        let col = (channel % 4) + status_col_offset(kind);
        let color = if active { LED_SELECTED } else { LED_UNSELECTED };
        let _ = bus.broadcast(&led(row, col, color, MODE_STATIC));
    }
}

fn status_col_offset(kind: SamplerStatusKind) -> u8 {
    match kind {
        SamplerStatusKind::Recording => 0,
        SamplerStatusKind::Assignment => 4,
        SamplerStatusKind::Playback => 4,
    }
}

fn loop_cell(id: u8) -> (u8, u8) {
    (4 + id / 8, id % 8)
}

fn led(row: u8, col: u8, color: u8, mode: u8) -> BusMessage {
    BusMessage::Led { row, col, color, mode }
}

/// Owns the sequencer's control-bus listener. Dropping it stops the
/// listener thread.
pub struct Sequencer {
    _listener: ListenerHandle,
    state: Arc<Mutex<SequencerState>>,
}

impl Sequencer {
    pub fn spawn(control_bus: Arc<OscBus>) -> Result<Self, OscBusError> {
        let state = Arc::new(Mutex::new(SequencerState::default()));
        let listener_state = Arc::clone(&state);
        let bus = Arc::clone(&control_bus);
        let listener = control_bus.spawn_listener("sequencer", move |msg| {
            let Ok(mut guard) = listener_state.lock() else {
                return;
            };
            match msg {
                BusMessage::Select { channel, column } => guard.on_select(&bus, channel, column),
                BusMessage::LoopToggle(id) => guard.on_loop_toggle(&bus, id),
                BusMessage::LoopMomentary { id, state } => guard.on_loop_momentary(&bus, id, state),
                BusMessage::SamplerStatus { kind, channel, active } => {
                    guard.on_sampler_status(&bus, kind, channel, active)
                }
                _ => {}
            }
        })?;

        Ok(Self {
            _listener: listener,
            state,
        })
    }

    pub fn sample_map(&self) -> [u8; 4] {
        self.state.lock().expect("sequencer state lock poisoned").sample_map
    }

    pub fn loop_status(&self) -> [bool; 32] {
        self.state.lock().expect("sequencer state lock poisoned").loop_status
    }
}
