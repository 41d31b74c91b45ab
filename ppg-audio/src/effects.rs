//! Per-sample DSP for the five effect kinds.
//!
//! The spec fixes the parameter law (BPM/intensity -> knob, via
//! `ppg_types::effect::linear_map`) and the canonical chain order; the DSP
//! behind each knob is an implementation detail. These are deliberately
//! small, single-pole/short-buffer implementations sized for a real-time
//! mixer thread, not studio-grade algorithms.

use ppg_types::effect::{EffectKind, EffectParams};

/// One live DSP instance mirroring an [`EffectParams`] slot.
pub enum Effect {
    Reverb(Reverb),
    Phaser(Phaser),
    Delay(Delay),
    Chorus(Chorus),
    LowPass(LowPass),
}

impl Effect {
    pub fn from_params(params: EffectParams, sample_rate: u32) -> Self {
        match params.kind {
            EffectKind::Reverb => Effect::Reverb(Reverb::new(params.primary, sample_rate)),
            EffectKind::Phaser => Effect::Phaser(Phaser::new(params.primary, sample_rate)),
            EffectKind::Delay => Effect::Delay(Delay::new(params.primary, sample_rate)),
            EffectKind::Chorus => Effect::Chorus(Chorus::new(params.primary, sample_rate)),
            EffectKind::LowPass => Effect::LowPass(LowPass::new(params.primary, sample_rate)),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Reverb(_) => EffectKind::Reverb,
            Effect::Phaser(_) => EffectKind::Phaser,
            Effect::Delay(_) => EffectKind::Delay,
            Effect::Chorus(_) => EffectKind::Chorus,
            Effect::LowPass(_) => EffectKind::LowPass,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        match self {
            Effect::Reverb(e) => e.process(input),
            Effect::Phaser(e) => e.process(input),
            Effect::Delay(e) => e.process(input),
            Effect::Chorus(e) => e.process(input),
            Effect::LowPass(e) => e.process(input),
        }
    }
}

/// Runs a channel's ordered effect chain over one sample.
pub struct EffectRack {
    effects: Vec<Effect>,
    sample_rate: u32,
}

impl EffectRack {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            effects: Vec::new(),
            sample_rate,
        }
    }

    /// Rebuild the rack to match a freshly-rebuilt `EffectChain` (canonical
    /// order already enforced by `ppg_types::effect::EffectChain::rebuild`).
    pub fn sync(&mut self, chain: &[EffectParams]) {
        self.effects = chain
            .iter()
            .map(|p| Effect::from_params(*p, self.sample_rate))
            .collect();
    }

    pub fn process(&mut self, mut sample: f32) -> f32 {
        for effect in &mut self.effects {
            sample = effect.process(sample);
        }
        sample
    }
}

/// Small ring buffer shared by Delay, Chorus, and Reverb.
struct DelayLine {
    buffer: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    fn new(len_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; len_samples.max(1)],
            pos: 0,
        }
    }

    fn read(&self) -> f32 {
        self.buffer[self.pos]
    }

    fn write_advance(&mut self, value: f32) {
        self.buffer[self.pos] = value;
        self.pos = (self.pos + 1) % self.buffer.len();
    }
}

/// Feedback-comb reverb: `primary` is a room-size knob in [0, 1] mapped to
/// feedback gain and tail length.
pub struct Reverb {
    combs: Vec<(DelayLine, f32)>,
}

impl Reverb {
    fn new(room_size: f32, sample_rate: u32) -> Self {
        let feedback = 0.55 + room_size.clamp(0.0, 1.0) * 0.4;
        // Four comb lines at classic Schroeder-ish relative lengths.
        let base_ms = [29.7, 37.1, 41.1, 43.7];
        let combs = base_ms
            .iter()
            .map(|ms| {
                let len = ((ms / 1000.0) * sample_rate as f32) as usize;
                (DelayLine::new(len), feedback)
            })
            .collect();
        Self { combs }
    }

    fn process(&mut self, input: f32) -> f32 {
        let mut out = 0.0;
        for (line, feedback) in &mut self.combs {
            let delayed = line.read();
            line.write_advance(input + delayed * *feedback);
            out += delayed;
        }
        input + out / self.combs.len() as f32
    }
}

/// Two-stage all-pass phaser; `primary` is an LFO rate in Hz.
pub struct Phaser {
    stages: [f32; 2],
    lfo_phase: f32,
    lfo_increment: f32,
}

impl Phaser {
    fn new(rate_hz: f32, sample_rate: u32) -> Self {
        Self {
            stages: [0.0; 2],
            lfo_phase: 0.0,
            lfo_increment: rate_hz.max(0.01) / sample_rate as f32,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        self.lfo_phase = (self.lfo_phase + self.lfo_increment).fract();
        let coeff = 0.5 * (1.0 + (self.lfo_phase * std::f32::consts::TAU).sin()) * 0.8;
        let mut x = input;
        for stage in &mut self.stages {
            let y = -coeff * x + *stage;
            *stage = x + coeff * y;
            x = y;
        }
        0.5 * (input + x)
    }
}

/// Fixed-delay line; `primary` is the delay time in milliseconds.
pub struct Delay {
    line: DelayLine,
    feedback: f32,
}

impl Delay {
    fn new(time_ms: f32, sample_rate: u32) -> Self {
        let len = ((time_ms.max(1.0) / 1000.0) * sample_rate as f32) as usize;
        Self {
            line: DelayLine::new(len),
            feedback: 0.35,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line.read();
        self.line.write_advance(input + delayed * self.feedback);
        0.6 * input + 0.4 * delayed
    }
}

/// Modulated short delay; `primary` is the modulation rate in Hz.
pub struct Chorus {
    line: DelayLine,
    lfo_phase: f32,
    lfo_increment: f32,
    center: usize,
    depth: usize,
}

impl Chorus {
    fn new(rate_hz: f32, sample_rate: u32) -> Self {
        let center_ms = 15.0;
        let depth_ms = 6.0;
        let len = (((center_ms + depth_ms) / 1000.0) * sample_rate as f32) as usize + 2;
        Self {
            line: DelayLine::new(len),
            lfo_phase: 0.0,
            lfo_increment: rate_hz.max(0.01) / sample_rate as f32,
            center: ((center_ms / 1000.0) * sample_rate as f32) as usize,
            depth: ((depth_ms / 1000.0) * sample_rate as f32) as usize,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        self.line.write_advance(input);
        self.lfo_phase = (self.lfo_phase + self.lfo_increment).fract();
        let offset =
            self.center as f32 + self.depth as f32 * (self.lfo_phase * std::f32::consts::TAU).sin();
        let len = self.line.buffer.len();
        let read_pos = (self.line.pos as isize - 1 - offset as isize).rem_euclid(len as isize) as usize;
        let delayed = self.line.buffer[read_pos];
        0.5 * input + 0.5 * delayed
    }
}

/// One-pole low-pass; `primary` is the cutoff frequency in Hz.
pub struct LowPass {
    coeff: f32,
    state: f32,
}

impl LowPass {
    fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let rc = 1.0 / (std::f32::consts::TAU * cutoff_hz.max(1.0));
        let dt = 1.0 / sample_rate as f32;
        let coeff = dt / (rc + dt);
        Self { coeff, state: 0.0 }
    }

    fn process(&mut self, input: f32) -> f32 {
        self.state += self.coeff * (input - self.state);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_rack_mirrors_the_canonical_chain_order() {
        use ppg_types::effect::EffectChain;

        let mut chain = EffectChain::new();
        chain.rebuild(&[
            EffectParams {
                kind: EffectKind::LowPass,
                primary: 800.0,
            },
            EffectParams {
                kind: EffectKind::Delay,
                primary: 300.0,
            },
        ]);

        let mut rack = EffectRack::new(44_100);
        rack.sync(chain.chain());
        let kinds: Vec<_> = rack.effects.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EffectKind::Delay, EffectKind::LowPass]);
    }

    #[test]
    fn lowpass_attenuates_a_nyquist_alternating_signal() {
        let mut lp = LowPass::new(200.0, 44_100);
        let mut max_out: f32 = 0.0;
        for i in 0..200 {
            let input = if i % 2 == 0 { 1.0 } else { -1.0 };
            max_out = max_out.max(lp.process(input).abs());
        }
        assert!(max_out < 0.5);
    }

    #[test]
    fn delay_line_wraps_without_panicking() {
        let mut d = Delay::new(5.0, 8_000);
        for _ in 0..1000 {
            d.process(0.1);
        }
    }
}
