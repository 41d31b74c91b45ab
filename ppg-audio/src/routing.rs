//! Lock-protected routing table. Reads and writes are serialized under a
//! single `RwLock`; callers must drop the read before doing any I/O or DSP
//! work so the real-time audio callback never contends on it.

use std::sync::RwLock;

use ppg_types::voice::{RoutingTable, SampleIndex};
use ppg_types::ChannelId;

#[derive(Default)]
pub struct SharedRouting {
    table: RwLock<RoutingTable>,
}

impl SharedRouting {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(RoutingTable::new()),
        }
    }

    /// Read the routed sample index for `ch`. Callers must drop the
    /// returned value (it's owned, not a guard) before doing any I/O.
    pub fn get(&self, ch: ChannelId) -> SampleIndex {
        self.table.read().expect("routing lock poisoned").get(ch)
    }

    pub fn set(&self, ch: ChannelId, sample_index: SampleIndex) {
        self.table
            .write()
            .expect("routing lock poisoned")
            .set(ch, sample_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let routing = SharedRouting::new();
        let ch = ChannelId::new(3).unwrap();
        routing.set(ch, 5);
        assert_eq!(routing.get(ch), 5);
    }
}
