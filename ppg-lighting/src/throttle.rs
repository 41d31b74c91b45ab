//! Bulb-write throttling. Hardware transitions >= 2000ms are smooth, so
//! the engine limits writes to at most one per bulb every 2s, trusting the
//! hardware to cover the gap with its own transition.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ppg_types::Zone;

use crate::backend::{BackendError, BulbBackend, Color, ShutdownStats};

pub struct ThrottlingBackend<B: BulbBackend> {
    inner: B,
    throttle: Duration,
    last_write: HashMap<String, Instant>,
}

impl<B: BulbBackend> ThrottlingBackend<B> {
    pub fn new(inner: B, throttle_ms: u64) -> Self {
        Self {
            inner,
            throttle: Duration::from_millis(throttle_ms),
            last_write: HashMap::new(),
        }
    }
}

impl<B: BulbBackend> BulbBackend for ThrottlingBackend<B> {
    fn authenticate(&mut self) -> Result<(), BackendError> {
        self.inner.authenticate()
    }

    fn set_color(&mut self, bulb_id: &str, color: Color, transition_ms: Option<u64>) {
        let now = Instant::now();
        if let Some(last) = self.last_write.get(bulb_id) {
            if now.duration_since(*last) < self.throttle {
                log::debug!(target: "lighting::throttle", "{bulb_id}: write throttled");
                return;
            }
        }
        self.last_write.insert(bulb_id.to_string(), now);
        self.inner.set_color(bulb_id, color, transition_ms);
    }

    fn set_all_baseline(&mut self) {
        self.last_write.clear();
        self.inner.set_all_baseline();
    }

    fn get_bulb_for_zone(&self, zone: Zone) -> String {
        self.inner.get_bulb_for_zone(zone)
    }

    fn get_latency_estimate(&self) -> Duration {
        self.inner.get_latency_estimate()
    }

    fn shutdown(&mut self) -> ShutdownStats {
        self.inner.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoggingBackend;
    use ppg_types::config::LightingConfig;

    #[test]
    fn second_write_within_window_is_dropped() {
        let config = LightingConfig::default();
        let mut backend = ThrottlingBackend::new(LoggingBackend::new(&config), 2_000);
        backend.set_color("zone-0", Color::baseline(), None);
        backend.set_color("zone-0", Color::new(10.0, 10.0, 10.0), None);
        let stats = backend.shutdown();
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn writes_to_different_bulbs_are_independent() {
        let config = LightingConfig::default();
        let mut backend = ThrottlingBackend::new(LoggingBackend::new(&config), 2_000);
        backend.set_color("zone-0", Color::baseline(), None);
        backend.set_color("zone-1", Color::baseline(), None);
        let stats = backend.shutdown();
        assert_eq!(stats.writes, 2);
    }
}
