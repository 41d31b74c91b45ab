//! The predictor's beat-emission worker.
//!
//! A single thread, shared by every channel's predictor, holds pending
//! future-timestamped beats in a min-heap keyed by a monotonic deadline. It
//! sleeps until the earliest deadline (or wakes early when a new, earlier
//! beat arrives), then broadcasts `/beat/{ch}` on the beat bus carrying the
//! beat's original unix-ms timestamp. The sleep itself is always driven by
//! `Instant`, not wall-clock time, so an NTP step or clock adjustment while
//! a beat is pending cannot stretch or compress the scheduled interval; the
//! wire format's unix-ms timestamp is only ever read off the `PendingBeat`
//! the predictor already computed, never recomputed from the clock.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use ppg_osc::{BusMessage, OscBus};

use crate::predictor::PendingBeat;

/// How often the worker wakes with nothing scheduled, to observe shutdown.
const IDLE_POLL: Duration = Duration::from_millis(200);

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Anchors a unix-ms timestamp to a monotonic instant, established once per
/// worker lifetime, so every later deadline is computed by offsetting the
/// anchor rather than by re-reading the wall clock.
#[derive(Clone, Copy)]
struct ClockAnchor {
    instant: Instant,
    unix_ms: u64,
}

impl ClockAnchor {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            unix_ms: now_unix_ms(),
        }
    }

    fn deadline_for(&self, ts_ms: u64) -> Instant {
        if ts_ms <= self.unix_ms {
            self.instant
        } else {
            self.instant + Duration::from_millis(ts_ms - self.unix_ms)
        }
    }
}

struct HeapEntry {
    deadline: Instant,
    beat: PendingBeat,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest deadline.
        other.deadline.cmp(&self.deadline)
    }
}

pub struct BeatEmitter {
    sender: Sender<PendingBeat>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl BeatEmitter {
    pub fn spawn(name: &str, bus: Arc<OscBus>) -> Self {
        let (sender, receiver): (Sender<PendingBeat>, Receiver<PendingBeat>) =
            crossbeam_channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_name = name.to_string();

        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run(receiver, bus, thread_shutdown, thread_name))
            .expect("failed to spawn beat emission thread");

        Self {
            sender,
            shutdown,
            join: Some(join),
        }
    }

    /// Schedule a beat for emission at its (possibly future) timestamp.
    pub fn schedule(&self, beat: PendingBeat) {
        let _ = self.sender.send(beat);
    }

    pub fn stop(mut self) {
        self.shutdown.store(true, AtomicOrdering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for BeatEmitter {
    fn drop(&mut self) {
        self.shutdown.store(true, AtomicOrdering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

fn run(
    receiver: Receiver<PendingBeat>,
    bus: Arc<OscBus>,
    shutdown: Arc<AtomicBool>,
    thread_name: String,
) {
    let anchor = ClockAnchor::now();
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();

    loop {
        if shutdown.load(AtomicOrdering::Relaxed) {
            break;
        }

        let now = Instant::now();
        let timeout = match heap.peek() {
            None => IDLE_POLL,
            Some(entry) => entry
                .deadline
                .saturating_duration_since(now)
                .min(IDLE_POLL),
        };

        match receiver.recv_timeout(timeout) {
            Ok(beat) => heap.push(HeapEntry {
                deadline: anchor.deadline_for(beat.ts_ms),
                beat,
            }),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        while let Some(entry) = heap.peek() {
            if entry.deadline > now {
                break;
            }
            let beat = heap.pop().unwrap().beat;
            let msg = BusMessage::Beat {
                channel: beat.channel,
                ts_ms: beat.ts_ms,
                bpm: beat.bpm,
                intensity: beat.intensity,
            };
            if let Err(e) = bus.broadcast(&msg) {
                log::warn!(target: "detect::emission", "{thread_name}: failed to broadcast beat: {e}");
            }
        }
    }
}
