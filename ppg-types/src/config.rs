//! Process-wide constants as an injected configuration record.
//!
//! No `static`/`const fn` tables scattered through the engine. Everything
//! that used to be a process-wide constant lives here, built once at
//! startup and passed by reference into every component.

use serde::Deserialize;

/// OSC bus ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusPorts {
    pub ppg: u16,
    pub beat: u16,
    pub control: u16,
    pub admin: u16,
}

impl Default for BusPorts {
    fn default() -> Self {
        Self {
            ppg: 9000,
            beat: 9001,
            control: 9002,
            admin: 9003,
        }
    }
}

/// Fixed per-physical-channel pan constants (disabled by default): channel
/// 0 full left, 1 slight left, 2 slight right, 3 full right.
pub const DEFAULT_CHANNEL_PAN: [f32; 4] = [-1.0, -0.33, 0.33, 1.0];

/// Detector constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub buffer_len: usize,
    pub mad_floor: f64,
    pub rail_low: u16,
    pub rail_high: u16,
    pub rail_pinned_ratio_limit: f64,
    pub threshold_k: f64,
    pub debounce_ms: u64,
    pub reboot_backward_ms: u64,
    pub gap_forward_ms: u64,
    pub pause_recovery_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            buffer_len: 100,
            mad_floor: 40.0,
            rail_low: 10,
            rail_high: 4085,
            rail_pinned_ratio_limit: 0.8,
            threshold_k: 4.5,
            debounce_ms: 400,
            reboot_backward_ms: 3_000,
            gap_forward_ms: 1_000,
            pause_recovery_ms: 2_000,
        }
    }
}

/// Predictor constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorConfig {
    pub ibi_min_ms: f64,
    pub ibi_max_ms: f64,
    pub ibi_blend_weight: f64,
    pub ibi_outlier_factor: f64,
    pub phase_correction_weight: f64,
    pub phase_correction_clamp: f64,
    pub observation_debounce_fraction: f64,
    pub confidence_ramp_per_observation: f64,
    pub bootstrap_observation_count: usize,
    pub coasting_decay_ms: f64,
    pub beat_lookahead_min_ms: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            ibi_min_ms: 400.0,
            ibi_max_ms: 1333.0,
            ibi_blend_weight: 0.1,
            ibi_outlier_factor: 1.5,
            phase_correction_weight: 0.10,
            phase_correction_clamp: 0.2,
            observation_debounce_fraction: 0.7,
            confidence_ramp_per_observation: 0.2,
            bootstrap_observation_count: 5,
            coasting_decay_ms: 10_000.0,
            beat_lookahead_min_ms: 100.0,
        }
    }
}

/// Timestamp gating window shared by audio and lighting.
pub const TIMESTAMP_GATE_MS: u64 = 500;

/// Lighting engine constants. The zone<->bulb table is a static
/// four-entry mapping loaded at start; exactly how a bulb id is reached is
/// a backend concern, out of the core's scope.
#[derive(Debug, Clone)]
pub struct LightingConfig {
    pub tick_interval_ms: u64,
    pub bulb_write_throttle_ms: u64,
    pub min_hardware_transition_ms: u64,
    pub convergence_tolerance: f32,
    pub wave_stagger_ms: u64,
    pub rotation_deg_per_sec: f32,
    pub convergence_drift_deg_per_sec: f32,
    pub bulb_zone_table: [String; 4],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            bulb_write_throttle_ms: 2_000,
            min_hardware_transition_ms: 2_000,
            convergence_tolerance: 0.05,
            wave_stagger_ms: 500,
            rotation_deg_per_sec: 30.0,
            convergence_drift_deg_per_sec: 20.0,
            bulb_zone_table: [
                "zone-0".to_string(),
                "zone-1".to_string(),
                "zone-2".to_string(),
                "zone-3".to_string(),
            ],
        }
    }
}

/// Top-level engine configuration: the single record constructed at startup
/// and handed by reference to every component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ports: BusPorts,
    pub detector: DetectorConfig,
    pub predictor: PredictorConfig,
    pub channel_pan: [f32; 4],
    pub panning_enabled: bool,
    pub intensity_scaling_enabled: bool,
    pub sampler_record_timeout_ms: u64,
    pub sampler_assignment_timeout_ms: u64,
    pub lighting: LightingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ports: BusPorts::default(),
            detector: DetectorConfig::default(),
            predictor: PredictorConfig::default(),
            channel_pan: DEFAULT_CHANNEL_PAN,
            panning_enabled: false,
            intensity_scaling_enabled: false,
            sampler_record_timeout_ms: 60_000,
            sampler_assignment_timeout_ms: 30_000,
            lighting: LightingConfig::default(),
        }
    }
}

/// On-disk override shape. Every field optional; absent fields keep the
/// built-in default (embedded defaults, shallow user override).
#[derive(Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub ports: PortsOverride,
    #[serde(default)]
    pub mixing: MixingOverride,
    #[serde(default)]
    pub lighting: LightingOverride,
}

#[derive(Deserialize, Default)]
pub struct LightingOverride {
    /// Must have exactly 4 entries if present; a missing/malformed table
    /// is a fatal startup error, not silently ignored.
    pub bulb_zone_table: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
pub struct PortsOverride {
    pub ppg: Option<u16>,
    pub beat: Option<u16>,
    pub control: Option<u16>,
    pub admin: Option<u16>,
}

#[derive(Deserialize, Default)]
pub struct MixingOverride {
    pub panning_enabled: Option<bool>,
    pub intensity_scaling_enabled: Option<bool>,
}

impl EngineConfig {
    /// Apply a parsed override file on top of the built-in defaults.
    ///
    /// Fails only when an override is present but malformed in a way that
    /// would leave the engine in an inconsistent state: currently just a
    /// bulb zone table of the wrong arity.
    pub fn merge(mut self, file: ConfigFile) -> Result<Self, String> {
        if let Some(v) = file.ports.ppg {
            self.ports.ppg = v;
        }
        if let Some(v) = file.ports.beat {
            self.ports.beat = v;
        }
        if let Some(v) = file.ports.control {
            self.ports.control = v;
        }
        if let Some(v) = file.ports.admin {
            self.ports.admin = v;
        }
        if let Some(v) = file.mixing.panning_enabled {
            self.panning_enabled = v;
        }
        if let Some(v) = file.mixing.intensity_scaling_enabled {
            self.intensity_scaling_enabled = v;
        }
        if let Some(table) = file.lighting.bulb_zone_table {
            let table: [String; 4] = table.try_into().map_err(|v: Vec<String>| {
                format!("lighting.bulb_zone_table must have exactly 4 entries, found {}", v.len())
            })?;
            self.lighting.bulb_zone_table = table;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overrides_only_specified_fields() {
        let base = EngineConfig::default();
        let file = ConfigFile {
            ports: PortsOverride {
                ppg: Some(9100),
                beat: None,
                control: None,
                admin: None,
            },
            mixing: MixingOverride::default(),
            lighting: LightingOverride::default(),
        };
        let merged = base.merge(file).expect("merge should succeed");
        assert_eq!(merged.ports.ppg, 9100);
        assert_eq!(merged.ports.beat, BusPorts::default().beat);
    }

    #[test]
    fn merge_rejects_a_zone_table_with_the_wrong_arity() {
        let base = EngineConfig::default();
        let file = ConfigFile {
            ports: PortsOverride::default(),
            mixing: MixingOverride::default(),
            lighting: LightingOverride {
                bulb_zone_table: Some(vec!["only-one".to_string()]),
            },
        };
        assert!(base.merge(file).is_err());
    }
}
