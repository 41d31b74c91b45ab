//! Bulb backend contract.
//!
//! Vendor protocols (Kasa/Wyze/WLED) are out of scope for this build; this
//! crate ships one backend, a logging stand-in that exercises the full
//! contract without any real network device, which is what every
//! canonical program and the runtime are tested against.

use std::fmt;
use std::thread;
use std::time::Duration;

use ppg_types::config::LightingConfig;
use ppg_types::Zone;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub hue: f32,
    pub saturation: f32,
    pub brightness: f32,
}

impl Color {
    pub fn new(hue: f32, saturation: f32, brightness: f32) -> Self {
        Self {
            hue: hue.rem_euclid(360.0),
            saturation: saturation.clamp(0.0, 100.0),
            brightness: brightness.clamp(0.0, 100.0),
        }
    }

    pub fn baseline() -> Self {
        Self::new(0.0, 0.0, 10.0)
    }
}

#[derive(Debug)]
pub enum BackendError {
    AuthFailed(String),
    Call(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::AuthFailed(e) => write!(f, "bulb backend authentication failed: {e}"),
            BackendError::Call(e) => write!(f, "bulb backend call failed: {e}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Cumulative call/error counts surfaced on shutdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownStats {
    pub writes: u64,
    pub errors: u64,
}

/// One-shot authenticate, then per-call color/baseline operations. Per-call
/// failures are non-fatal to the engine; only `authenticate` failing is
/// fatal.
pub trait BulbBackend: Send {
    fn authenticate(&mut self) -> Result<(), BackendError>;

    fn set_color(&mut self, bulb_id: &str, color: Color, transition_ms: Option<u64>);

    fn set_all_baseline(&mut self);

    fn get_bulb_for_zone(&self, zone: Zone) -> String;

    fn get_latency_estimate(&self) -> Duration;

    fn shutdown(&mut self) -> ShutdownStats;

    /// Rise -> sustain -> fall, built on `set_color` plus the backend's own
    /// sense of timing. A reusable primitive for the fade-then-return shape
    /// several canonical programs need (FastAttack, SlowPulse, ...).
    fn pulse(&mut self, bulb_id: &str, peak: Color, baseline: Color, fade_ms: u64) {
        self.set_color(bulb_id, peak, Some(0));
        self.set_color(bulb_id, baseline, Some(fade_ms));
    }
}

/// Logs every call instead of reaching a real device. Simulates the
/// backend's own latency floor so timing-sensitive programs still behave
/// plausibly in tests.
pub struct LoggingBackend {
    zone_table: [String; 4],
    latency: Duration,
    stats: ShutdownStats,
    authenticated: bool,
}

impl LoggingBackend {
    pub fn new(config: &LightingConfig) -> Self {
        Self {
            zone_table: config.bulb_zone_table.clone(),
            latency: Duration::from_millis(20),
            stats: ShutdownStats::default(),
            authenticated: false,
        }
    }
}

impl BulbBackend for LoggingBackend {
    fn authenticate(&mut self) -> Result<(), BackendError> {
        log::info!(target: "lighting::backend", "authenticated logging backend");
        self.authenticated = true;
        Ok(())
    }

    fn set_color(&mut self, bulb_id: &str, color: Color, transition_ms: Option<u64>) {
        self.stats.writes += 1;
        log::debug!(
            target: "lighting::backend",
            "{bulb_id}: hue={:.1} sat={:.1} bri={:.1} transition={:?}ms",
            color.hue,
            color.saturation,
            color.brightness,
            transition_ms
        );
        thread::sleep(Duration::from_micros(200));
    }

    fn set_all_baseline(&mut self) {
        let baseline = Color::baseline();
        for zone in Zone::all() {
            let bulb_id = self.get_bulb_for_zone(zone);
            self.set_color(&bulb_id, baseline, Some(500));
        }
    }

    fn get_bulb_for_zone(&self, zone: Zone) -> String {
        self.zone_table[zone.raw() as usize].clone()
    }

    fn get_latency_estimate(&self) -> Duration {
        self.latency
    }

    fn shutdown(&mut self) -> ShutdownStats {
        self.stats
    }
}
