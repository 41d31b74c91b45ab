//! The eight canonical lighting programs.
//!
//! Each program is a tagged variant carrying its own state record, rather
//! than an ad-hoc class hierarchy. A program never holds a pointer back to
//! the engine or the backend: every callback receives the backend and
//! config it needs for that call.

use ppg_types::effect::linear_map;
use ppg_types::{ChannelId, LightingProgramKind, Zone};

use crate::backend::{BulbBackend, Color};
use ppg_types::config::LightingConfig;

/// Four callbacks plus opaque program-local state, scheduled on the
/// single-threaded cooperative runtime.
pub trait LightingProgram {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig);
    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        intensity: f32,
    );
    fn on_tick(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig, dt_ms: f64);
    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig);
}

fn zone_of(channel: ChannelId) -> Zone {
    Zone::new(channel.raw() % 4).expect("modulo 4 is always in range")
}

/// Smallest integer multiple of the IBI not less than `floor_ms`, the
/// FastAttack/SlowPulse fade-duration rule.
fn fade_duration_ms(bpm: f32, floor_ms: f64) -> u64 {
    if bpm <= 0.0 {
        return floor_ms as u64;
    }
    let ibi_ms = 60_000.0 / bpm as f64;
    let n = (floor_ms / ibi_ms).ceil().max(1.0);
    (n * ibi_ms) as u64
}

/// Hue from BPM (40 -> 240deg, 120 -> 0deg, linear clamped) and saturation
/// from intensity, shared by IntensityReactive and IntensitySlowPulse.
fn reactive_color(bpm: f32, intensity: f32, brightness: f32) -> Color {
    let hue = linear_map(bpm, 40.0, 120.0, 240.0, 0.0);
    let saturation = linear_map(intensity, 0.0, 1.0, 0.0, 100.0);
    Color::new(hue, saturation, brightness)
}

// ---------------------------------------------------------------------
// FastAttack
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct FastAttack;

impl LightingProgram for FastAttack {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }

    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        _config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        intensity: f32,
    ) {
        let zone = zone_of(channel);
        let bulb = backend.get_bulb_for_zone(zone);
        let peak = reactive_color(bpm, intensity, 100.0);
        let duration = fade_duration_ms(bpm, 2_000.0);
        backend.pulse(&bulb, peak, Color::baseline(), duration);
    }

    fn on_tick(&mut self, _backend: &mut dyn BulbBackend, _config: &LightingConfig, _dt_ms: f64) {}

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// SlowPulse / IntensitySlowPulse
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum SlowPhase {
    AtBaseline,
    FadeInActive(f64),
    AtPeakWaiting,
    FadeOutActive(f64),
}

struct SlowZone {
    phase: SlowPhase,
    last_bpm: f32,
    last_intensity: f32,
}

impl Default for SlowZone {
    fn default() -> Self {
        Self {
            phase: SlowPhase::AtBaseline,
            last_bpm: 60.0,
            last_intensity: 1.0,
        }
    }
}

pub struct SlowPulse {
    zones: [SlowZone; 4],
    intensity_mapped: bool,
}

impl SlowPulse {
    pub fn new(intensity_mapped: bool) -> Self {
        Self {
            zones: Default::default(),
            intensity_mapped,
        }
    }

    fn peak_color(&self, zone: u8, bpm: f32, intensity: f32) -> Color {
        if self.intensity_mapped {
            reactive_color(bpm, intensity, 100.0)
        } else {
            Color::new(zone as f32 * 90.0, 80.0, 100.0)
        }
    }

    fn baseline_color(&self, zone: u8) -> Color {
        if self.intensity_mapped {
            Color::baseline()
        } else {
            Color::new(zone as f32 * 90.0, 40.0, 10.0)
        }
    }
}

impl LightingProgram for SlowPulse {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
        self.zones = Default::default();
    }

    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        _config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        intensity: f32,
    ) {
        let zone = zone_of(channel);
        let idx = zone.raw() as usize;
        self.zones[idx].last_bpm = bpm;
        self.zones[idx].last_intensity = intensity;
        let duration = fade_duration_ms(bpm, 2_000.0) as f64;
        let bulb = backend.get_bulb_for_zone(zone);

        match self.zones[idx].phase {
            SlowPhase::AtBaseline => {
                let peak = self.peak_color(zone.raw(), bpm, intensity);
                backend.set_color(&bulb, peak, Some(duration as u64));
                self.zones[idx].phase = SlowPhase::FadeInActive(duration);
            }
            SlowPhase::AtPeakWaiting => {
                let baseline = self.baseline_color(zone.raw());
                backend.set_color(&bulb, baseline, Some(duration as u64));
                self.zones[idx].phase = SlowPhase::FadeOutActive(duration);
            }
            SlowPhase::FadeInActive(_) | SlowPhase::FadeOutActive(_) => {}
        }
    }

    fn on_tick(&mut self, _backend: &mut dyn BulbBackend, _config: &LightingConfig, dt_ms: f64) {
        for zone in &mut self.zones {
            zone.phase = match zone.phase {
                SlowPhase::FadeInActive(remaining) => {
                    let remaining = remaining - dt_ms;
                    if remaining <= 0.0 {
                        SlowPhase::AtPeakWaiting
                    } else {
                        SlowPhase::FadeInActive(remaining)
                    }
                }
                SlowPhase::FadeOutActive(remaining) => {
                    let remaining = remaining - dt_ms;
                    if remaining <= 0.0 {
                        SlowPhase::AtBaseline
                    } else {
                        SlowPhase::FadeOutActive(remaining)
                    }
                }
                other => other,
            };
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// RotatingGradient
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct RotatingGradient {
    hue_offset: f32,
}

impl LightingProgram for RotatingGradient {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
        self.hue_offset = 0.0;
    }

    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        _config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        _intensity: f32,
    ) {
        let zone = zone_of(channel);
        let hue = (self.hue_offset + zone.raw() as f32 * 90.0).rem_euclid(360.0);
        let bulb = backend.get_bulb_for_zone(zone);
        let peak = Color::new(hue, 100.0, 100.0);
        let ambient = Color::new(hue, 60.0, 40.0);
        backend.pulse(&bulb, peak, ambient, fade_duration_ms(bpm, 2_000.0));
    }

    fn on_tick(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig, dt_ms: f64) {
        self.hue_offset = (self.hue_offset + config.rotation_deg_per_sec * (dt_ms / 1000.0) as f32)
            .rem_euclid(360.0);
        for zone in Zone::all() {
            let hue = (self.hue_offset + zone.raw() as f32 * 90.0).rem_euclid(360.0);
            let bulb = backend.get_bulb_for_zone(zone);
            backend.set_color(&bulb, Color::new(hue, 60.0, 40.0), None);
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// BreathingSync
// ---------------------------------------------------------------------

pub struct BreathingSync {
    last_bpm: [Option<f32>; 4],
    angle: f32,
}

impl Default for BreathingSync {
    fn default() -> Self {
        Self {
            last_bpm: [None; 4],
            angle: 0.0,
        }
    }
}

impl BreathingSync {
    fn mean_bpm(&self) -> f32 {
        let known: Vec<f32> = self.last_bpm.iter().filter_map(|b| *b).collect();
        if known.is_empty() {
            60.0
        } else {
            known.iter().sum::<f32>() / known.len() as f32
        }
    }
}

impl LightingProgram for BreathingSync {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
        *self = Self::default();
    }

    fn on_beat(
        &mut self,
        _backend: &mut dyn BulbBackend,
        _config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        _intensity: f32,
    ) {
        // Beats update the mean but do not pulse.
        self.last_bpm[zone_of(channel).raw() as usize] = Some(bpm);
    }

    fn on_tick(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig, dt_ms: f64) {
        let rate_hz = self.mean_bpm() / 60.0;
        self.angle = (self.angle + std::f32::consts::TAU * rate_hz * (dt_ms / 1000.0) as f32)
            .rem_euclid(std::f32::consts::TAU);
        let brightness = 10.0 + 45.0 * (1.0 + self.angle.sin());
        for zone in Zone::all() {
            let bulb = backend.get_bulb_for_zone(zone);
            backend.set_color(&bulb, Color::new(200.0, 40.0, brightness), None);
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------

pub struct Convergence {
    last_bpm: [Option<f32>; 4],
    current_hue: [f32; 4],
}

impl Default for Convergence {
    fn default() -> Self {
        Self {
            last_bpm: [None; 4],
            current_hue: [0.0, 90.0, 180.0, 270.0],
        }
    }
}

const CONVERGENCE_GOLD_HUE: f32 = 45.0;

impl Convergence {
    fn default_hue(zone: u8) -> f32 {
        zone as f32 * 90.0
    }

    fn converged_zones(&self, tolerance: f32) -> [bool; 4] {
        let mut converged = [false; 4];
        for i in 0..4 {
            for j in 0..4 {
                if i == j {
                    continue;
                }
                if let (Some(a), Some(b)) = (self.last_bpm[i], self.last_bpm[j]) {
                    if a > 0.0 && ((a - b).abs() / a) <= tolerance {
                        converged[i] = true;
                        converged[j] = true;
                    }
                }
            }
        }
        converged
    }
}

impl LightingProgram for Convergence {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
        *self = Self::default();
    }

    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        _config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        _intensity: f32,
    ) {
        let zone = zone_of(channel);
        let idx = zone.raw() as usize;
        self.last_bpm[idx] = Some(bpm);
        let bulb = backend.get_bulb_for_zone(zone);
        let hue = self.current_hue[idx];
        let peak = Color::new(hue, 100.0, 100.0);
        let ambient = Color::new(hue, 60.0, 40.0);
        backend.pulse(&bulb, peak, ambient, fade_duration_ms(bpm, 2_000.0));
    }

    fn on_tick(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig, dt_ms: f64) {
        let converged = self.converged_zones(config.convergence_tolerance);
        let step = config.convergence_drift_deg_per_sec * (dt_ms / 1000.0) as f32;
        for (idx, zone) in Zone::all().enumerate() {
            let target = if converged[idx] {
                CONVERGENCE_GOLD_HUE
            } else {
                Self::default_hue(zone.raw())
            };
            let hue = &mut self.current_hue[idx];
            let delta = (target - *hue + 540.0).rem_euclid(360.0) - 180.0;
            if delta.abs() <= step {
                *hue = target;
            } else {
                *hue = (*hue + delta.signum() * step).rem_euclid(360.0);
            }
            let bulb = backend.get_bulb_for_zone(zone);
            backend.set_color(&bulb, Color::new(*hue, 60.0, 40.0), None);
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// WaveChase
// ---------------------------------------------------------------------

struct PendingPulse {
    remaining_ms: f64,
    zone: Zone,
    hue: f32,
}

#[derive(Default)]
pub struct WaveChase {
    pending: Vec<PendingPulse>,
}

impl LightingProgram for WaveChase {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
        self.pending.clear();
    }

    fn on_beat(
        &mut self,
        _backend: &mut dyn BulbBackend,
        config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        _intensity: f32,
    ) {
        let start_zone = zone_of(channel).raw();
        let hue = reactive_color(bpm, 1.0, 100.0).hue;
        for step in 0..4u8 {
            let zone = Zone::new((start_zone + step) % 4).expect("modulo 4 in range");
            self.pending.push(PendingPulse {
                remaining_ms: step as f64 * config.wave_stagger_ms as f64,
                zone,
                hue,
            });
        }
    }

    fn on_tick(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig, dt_ms: f64) {
        let mut fired = Vec::new();
        for (i, p) in self.pending.iter_mut().enumerate() {
            p.remaining_ms -= dt_ms;
            if p.remaining_ms <= 0.0 {
                fired.push(i);
            }
        }
        for i in fired.into_iter().rev() {
            let p = self.pending.remove(i);
            let bulb = backend.get_bulb_for_zone(p.zone);
            let peak = Color::new(p.hue, 100.0, 100.0);
            backend.pulse(&bulb, peak, Color::baseline(), 2_000);
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        self.pending.clear();
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// IntensityReactive
// ---------------------------------------------------------------------

pub struct IntensityReactive {
    brightness: [f32; 4],
    hue: [f32; 4],
    saturation: [f32; 4],
}

impl Default for IntensityReactive {
    fn default() -> Self {
        Self {
            brightness: [10.0; 4],
            hue: [0.0; 4],
            saturation: [0.0; 4],
        }
    }
}

const REACTIVE_BASELINE_BRIGHTNESS: f32 = 10.0;
const REACTIVE_DECAY_PER_100MS: f32 = 0.85;

impl LightingProgram for IntensityReactive {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
        *self = Self::default();
    }

    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        _config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        intensity: f32,
    ) {
        let idx = zone_of(channel).raw() as usize;
        let color = reactive_color(bpm, intensity, 100.0);
        self.hue[idx] = color.hue;
        self.saturation[idx] = color.saturation;
        self.brightness[idx] = 100.0;
        let bulb = backend.get_bulb_for_zone(zone_of(channel));
        backend.set_color(&bulb, color, Some(0));
    }

    fn on_tick(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig, dt_ms: f64) {
        let decay = REACTIVE_DECAY_PER_100MS.powf((dt_ms / 100.0) as f32);
        for (idx, zone) in Zone::all().enumerate() {
            self.brightness[idx] =
                REACTIVE_BASELINE_BRIGHTNESS + (self.brightness[idx] - REACTIVE_BASELINE_BRIGHTNESS) * decay;
            let bulb = backend.get_bulb_for_zone(zone);
            let color = Color::new(self.hue[idx], self.saturation[idx], self.brightness[idx]);
            backend.set_color(&bulb, color, None);
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, _config: &LightingConfig) {
        backend.set_all_baseline();
    }
}

// ---------------------------------------------------------------------
// Program registry
// ---------------------------------------------------------------------

/// The currently-active program: exactly one live variant at a time.
pub enum Program {
    FastAttack(FastAttack),
    SlowPulse(SlowPulse),
    RotatingGradient(RotatingGradient),
    BreathingSync(BreathingSync),
    Convergence(Convergence),
    WaveChase(WaveChase),
    IntensityReactive(IntensityReactive),
    IntensitySlowPulse(SlowPulse),
}

impl Program {
    pub fn new(kind: LightingProgramKind) -> Self {
        match kind {
            LightingProgramKind::FastAttack => Program::FastAttack(FastAttack),
            LightingProgramKind::SlowPulse => Program::SlowPulse(SlowPulse::new(false)),
            LightingProgramKind::RotatingGradient => Program::RotatingGradient(RotatingGradient::default()),
            LightingProgramKind::BreathingSync => Program::BreathingSync(BreathingSync::default()),
            LightingProgramKind::Convergence => Program::Convergence(Convergence::default()),
            LightingProgramKind::WaveChase => Program::WaveChase(WaveChase::default()),
            LightingProgramKind::IntensityReactive => Program::IntensityReactive(IntensityReactive::default()),
            LightingProgramKind::IntensitySlowPulse => Program::IntensitySlowPulse(SlowPulse::new(true)),
        }
    }

    pub fn kind(&self) -> LightingProgramKind {
        match self {
            Program::FastAttack(_) => LightingProgramKind::FastAttack,
            Program::SlowPulse(_) => LightingProgramKind::SlowPulse,
            Program::RotatingGradient(_) => LightingProgramKind::RotatingGradient,
            Program::BreathingSync(_) => LightingProgramKind::BreathingSync,
            Program::Convergence(_) => LightingProgramKind::Convergence,
            Program::WaveChase(_) => LightingProgramKind::WaveChase,
            Program::IntensityReactive(_) => LightingProgramKind::IntensityReactive,
            Program::IntensitySlowPulse(_) => LightingProgramKind::IntensitySlowPulse,
        }
    }
}

impl LightingProgram for Program {
    fn on_init(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig) {
        match self {
            Program::FastAttack(p) => p.on_init(backend, config),
            Program::SlowPulse(p) => p.on_init(backend, config),
            Program::RotatingGradient(p) => p.on_init(backend, config),
            Program::BreathingSync(p) => p.on_init(backend, config),
            Program::Convergence(p) => p.on_init(backend, config),
            Program::WaveChase(p) => p.on_init(backend, config),
            Program::IntensityReactive(p) => p.on_init(backend, config),
            Program::IntensitySlowPulse(p) => p.on_init(backend, config),
        }
    }

    fn on_beat(
        &mut self,
        backend: &mut dyn BulbBackend,
        config: &LightingConfig,
        channel: ChannelId,
        bpm: f32,
        intensity: f32,
    ) {
        match self {
            Program::FastAttack(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::SlowPulse(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::RotatingGradient(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::BreathingSync(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::Convergence(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::WaveChase(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::IntensityReactive(p) => p.on_beat(backend, config, channel, bpm, intensity),
            Program::IntensitySlowPulse(p) => p.on_beat(backend, config, channel, bpm, intensity),
        }
    }

    fn on_tick(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig, dt_ms: f64) {
        match self {
            Program::FastAttack(p) => p.on_tick(backend, config, dt_ms),
            Program::SlowPulse(p) => p.on_tick(backend, config, dt_ms),
            Program::RotatingGradient(p) => p.on_tick(backend, config, dt_ms),
            Program::BreathingSync(p) => p.on_tick(backend, config, dt_ms),
            Program::Convergence(p) => p.on_tick(backend, config, dt_ms),
            Program::WaveChase(p) => p.on_tick(backend, config, dt_ms),
            Program::IntensityReactive(p) => p.on_tick(backend, config, dt_ms),
            Program::IntensitySlowPulse(p) => p.on_tick(backend, config, dt_ms),
        }
    }

    fn on_cleanup(&mut self, backend: &mut dyn BulbBackend, config: &LightingConfig) {
        match self {
            Program::FastAttack(p) => p.on_cleanup(backend, config),
            Program::SlowPulse(p) => p.on_cleanup(backend, config),
            Program::RotatingGradient(p) => p.on_cleanup(backend, config),
            Program::BreathingSync(p) => p.on_cleanup(backend, config),
            Program::Convergence(p) => p.on_cleanup(backend, config),
            Program::WaveChase(p) => p.on_cleanup(backend, config),
            Program::IntensityReactive(p) => p.on_cleanup(backend, config),
            Program::IntensitySlowPulse(p) => p.on_cleanup(backend, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoggingBackend;

    fn ch(n: u8) -> ChannelId {
        ChannelId::new(n).unwrap()
    }

    #[test]
    fn fast_attack_pulses_on_beat() {
        let config = LightingConfig::default();
        let mut backend = LoggingBackend::new(&config);
        let mut program = Program::new(LightingProgramKind::FastAttack);
        program.on_init(&mut backend, &config);
        program.on_beat(&mut backend, &config, ch(0), 75.0, 0.8);
        let stats = backend.shutdown();
        // set_all_baseline (4 zones) + the pulse's 2 writes.
        assert_eq!(stats.writes, 6);
    }

    #[test]
    fn slow_pulse_ignores_beats_during_an_active_fade() {
        let config = LightingConfig::default();
        let mut init_backend = LoggingBackend::new(&config);
        let mut program = SlowPulse::new(false);
        program.on_init(&mut init_backend, &config);

        let mut backend = LoggingBackend::new(&config);
        program.on_beat(&mut backend, &config, ch(0), 75.0, 1.0);
        let writes_after_first = backend.shutdown().writes;

        let mut backend = LoggingBackend::new(&config);
        program.on_beat(&mut backend, &config, ch(0), 75.0, 1.0);
        let writes_after_second = backend.shutdown().writes;

        assert_eq!(writes_after_first, 1);
        assert_eq!(writes_after_second, 0);
    }

    #[test]
    fn slow_pulse_completes_a_full_cycle_through_tick() {
        let config = LightingConfig::default();
        let mut backend = LoggingBackend::new(&config);
        let mut program = SlowPulse::new(false);
        program.on_init(&mut backend, &config);
        program.on_beat(&mut backend, &config, ch(0), 120.0, 1.0);
        // IBI at 120bpm = 500ms, so fade duration = 2000ms.
        program.on_tick(&mut backend, &config, 2_000.0);
        assert_eq!(program.zones[0].phase, SlowPhase::AtPeakWaiting);
        program.on_beat(&mut backend, &config, ch(0), 120.0, 1.0);
        assert!(matches!(program.zones[0].phase, SlowPhase::FadeOutActive(_)));
        program.on_tick(&mut backend, &config, 2_000.0);
        assert_eq!(program.zones[0].phase, SlowPhase::AtBaseline);
    }

    #[test]
    fn convergence_snaps_close_bpms_to_gold() {
        let config = LightingConfig::default();
        let mut backend = LoggingBackend::new(&config);
        let mut program = Convergence::default();
        program.on_init(&mut backend, &config);
        program.on_beat(&mut backend, &config, ch(0), 75.0, 1.0);
        program.on_beat(&mut backend, &config, ch(1), 76.0, 1.0);
        program.on_tick(&mut backend, &config, 50_000.0);
        assert_eq!(program.current_hue[0], CONVERGENCE_GOLD_HUE);
        assert_eq!(program.current_hue[1], CONVERGENCE_GOLD_HUE);
    }

    #[test]
    fn wave_chase_schedules_a_staggered_cascade() {
        let config = LightingConfig::default();
        let mut backend = LoggingBackend::new(&config);
        let mut program = WaveChase::default();
        program.on_init(&mut backend, &config);
        program.on_beat(&mut backend, &config, ch(0), 75.0, 1.0);
        assert_eq!(program.pending.len(), 4);
        program.on_tick(&mut backend, &config, 0.0);
        assert_eq!(program.pending.len(), 3);
        program.on_tick(&mut backend, &config, 2_000.0);
        assert_eq!(program.pending.len(), 0);
    }

    #[test]
    fn intensity_reactive_hue_follows_bpm_mapping() {
        let color = reactive_color(40.0, 1.0, 100.0);
        assert!((color.hue - 240.0).abs() < 1e-3);
        let color = reactive_color(120.0, 1.0, 100.0);
        assert!(color.hue.abs() < 1e-3);
    }

    #[test]
    fn intensity_reactive_brightness_decays_between_beats() {
        let config = LightingConfig::default();
        let mut backend = LoggingBackend::new(&config);
        let mut program = IntensityReactive::default();
        program.on_init(&mut backend, &config);
        program.on_beat(&mut backend, &config, ch(0), 75.0, 1.0);
        let peak = program.brightness[0];
        program.on_tick(&mut backend, &config, 500.0);
        assert!(program.brightness[0] < peak);
        assert!(program.brightness[0] >= REACTIVE_BASELINE_BRIGHTNESS);
    }
}
