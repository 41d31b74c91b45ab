//! Type-partitioned loop voice-limit manager.

use ppg_types::loops::LoopId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Was already active; no-op.
    AlreadyActive,
    /// Newly started, evicting the oldest of its type if the limit was hit.
    Started { evicted: Option<LoopId> },
}

/// Tracks which loops are active and enforces per-type concurrency limits,
/// evicting the oldest-started loop of a type when a new one would exceed
/// it. Start failures never evict; stop is idempotent.
#[derive(Default)]
pub struct LoopManager {
    active: Vec<(LoopId, u64)>,
    next_seq: u64,
}

impl LoopManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, id: LoopId) -> bool {
        self.active.iter().any(|(i, _)| *i == id)
    }

    pub fn active_ids(&self) -> Vec<LoopId> {
        self.active.iter().map(|(i, _)| *i).collect()
    }

    pub fn start(&mut self, id: LoopId) -> StartOutcome {
        if self.is_active(id) {
            return StartOutcome::AlreadyActive;
        }

        let kind = id.kind();
        let limit = kind.limit();
        let count_of_kind = self.active.iter().filter(|(i, _)| i.kind() == kind).count();

        let mut evicted = None;
        if count_of_kind >= limit {
            let oldest = self
                .active
                .iter()
                .enumerate()
                .filter(|(_, (i, _))| i.kind() == kind)
                .min_by_key(|(_, (_, seq))| *seq)
                .map(|(idx, _)| idx);
            if let Some(idx) = oldest {
                evicted = Some(self.active.remove(idx).0);
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.active.push((id, seq));
        StartOutcome::Started { evicted }
    }

    /// Idempotent: stopping an inactive loop is a no-op.
    pub fn stop(&mut self, id: LoopId) {
        self.active.retain(|(i, _)| *i != id);
    }
}
