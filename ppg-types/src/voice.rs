//! Voice and routing-table data shapes for the audio engine.

use crate::channel::{ChannelId, TOTAL_CHANNELS};

/// A single sample-bank index, 0..=7.
pub type SampleIndex = u8;

/// Mapping ChannelId -> sample-index, default all-zero. The table itself is
/// owned and lock-protected by `ppg-audio`; this is just the plain data.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: [SampleIndex; TOTAL_CHANNELS as usize],
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            entries: [0; TOTAL_CHANNELS as usize],
        }
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ch: ChannelId) -> SampleIndex {
        self.entries[ch.raw() as usize]
    }

    /// Set the routed sample index for a channel. Values outside 0..=7 are
    /// clamped: out-of-range routing arguments are an input-rejected error
    /// at the OSC boundary, not here.
    pub fn set(&mut self, ch: ChannelId, sample_index: SampleIndex) {
        self.entries[ch.raw() as usize] = sample_index.min(7);
    }
}

/// A single playing audio buffer. The mixer owns a pool of these; the
/// `finished` flag marks a drained voice as recyclable.
#[derive(Debug, Clone)]
pub struct Voice {
    /// Mono source samples (already bank/index resolved).
    pub source: std::sync::Arc<Vec<f32>>,
    pub position: usize,
    /// Pan position in [-1, 1].
    pub pan: f32,
    /// Optional intensity scalar applied as a gain multiplier.
    pub intensity: Option<f32>,
    pub active: bool,
    /// Loops wrap back to position 0 at the end instead of finishing.
    pub looping: bool,
}

impl Voice {
    pub fn new(source: std::sync::Arc<Vec<f32>>, pan: f32, intensity: Option<f32>) -> Self {
        Self {
            source,
            position: 0,
            pan,
            intensity,
            active: true,
            looping: false,
        }
    }

    /// Loop playback: centered, unpanned, no intensity scaling, never
    /// reports finished.
    pub fn looping(source: std::sync::Arc<Vec<f32>>) -> Self {
        Self {
            source,
            position: 0,
            pan: 0.0,
            intensity: None,
            active: true,
            looping: true,
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.looping && self.position >= self.source.len()
    }
}
