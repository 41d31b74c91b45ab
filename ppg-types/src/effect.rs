//! Per-channel effect chain types and the linear BPM/intensity mapping law.

/// An effect kind. Canonical chain order is always
/// Reverb -> Phaser -> Delay -> Chorus -> LowPass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Reverb,
    Phaser,
    Delay,
    Chorus,
    LowPass,
}

impl EffectKind {
    /// Canonical chain order.
    pub const CANONICAL_ORDER: [EffectKind; 5] = [
        EffectKind::Reverb,
        EffectKind::Phaser,
        EffectKind::Delay,
        EffectKind::Chorus,
        EffectKind::LowPass,
    ];
}

/// Resolved parameters for one effect instance, computed at beat time from
/// BPM/intensity via [`linear_map`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    pub kind: EffectKind,
    /// Reverb room size, Delay time (ms), LowPass cutoff (Hz): whichever
    /// single knob this effect maps from BPM/intensity.
    pub primary: f32,
}

/// An ordered per-channel effect chain, canonical order, toggled members.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    active: Vec<EffectParams>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the chain in canonical order from whichever configs are
    /// currently toggled on. `last_known` supplies, for each previously-seen
    /// effect, its last-known params; effects never seen fall back to
    /// whatever default the caller supplies.
    pub fn rebuild(&mut self, enabled: &[EffectParams]) {
        self.active.clear();
        for kind in EffectKind::CANONICAL_ORDER {
            if let Some(params) = enabled.iter().find(|p| p.kind == kind) {
                self.active.push(*params);
            }
        }
    }

    pub fn chain(&self) -> &[EffectParams] {
        &self.active
    }
}

/// `out = out_min + clamp((in - in_min)/(in_max - in_min), 0, 1) * (out_max - out_min)`.
///
/// Every BPM/intensity-driven parameter in the audio and lighting engines
/// goes through this one clamped linear map.
pub fn linear_map(input: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let t = if in_max > in_min {
        ((input - in_min) / (in_max - in_min)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    out_min + t * (out_max - out_min)
}
