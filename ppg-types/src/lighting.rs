//! Lighting program tags and zone identity.

use std::fmt;

/// Spatial lighting region, one per physical sensor (0..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Zone(u8);

impl Zone {
    pub fn new(raw: u8) -> Option<Self> {
        if raw < 4 {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Zone> {
        (0..4).map(Self)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag identifying which canonical lighting program is active. The runtime
/// keeps exactly one of these live at a time, along with its opaque
/// program-local state (owned by `ppg-lighting`, not here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightingProgramKind {
    FastAttack,
    SlowPulse,
    RotatingGradient,
    BreathingSync,
    Convergence,
    WaveChase,
    IntensityReactive,
    IntensitySlowPulse,
}

impl LightingProgramKind {
    const ALL: [LightingProgramKind; 8] = [
        LightingProgramKind::FastAttack,
        LightingProgramKind::SlowPulse,
        LightingProgramKind::RotatingGradient,
        LightingProgramKind::BreathingSync,
        LightingProgramKind::Convergence,
        LightingProgramKind::WaveChase,
        LightingProgramKind::IntensityReactive,
        LightingProgramKind::IntensitySlowPulse,
    ];

    /// Wire index used by `/lighting/program` (grid controller/REPL live
    /// program swap).
    pub fn as_index(self) -> u8 {
        Self::ALL.iter().position(|k| *k == self).expect("self is in ALL") as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrips_every_variant() {
        for kind in LightingProgramKind::ALL {
            assert_eq!(LightingProgramKind::from_index(kind.as_index()), Some(kind));
        }
    }
}
