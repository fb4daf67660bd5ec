//! ## netglobe-core::store
//! **Mutex-guarded flow aggregation with per-window deduplication**
//!
//! ### Invariants:
//! - A [`FlowKey`] appears at most once in the pending buffer between two drains
//! - `counts` is a lifetime total and is never reset
//! - Draining hands every buffered event to exactly one caller, in enqueue order
//!
//! The per-remote byte ledger shares the same lock, so no second lock domain
//! exists inside the store.

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::Mutex;

use crate::events::{Direction, FlowEvent, FlowKey};

/// Payload bytes exchanged with one remote address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoteBytes {
    pub upload: u64,
    pub download: u64,
}

impl RemoteBytes {
    pub fn total(&self) -> u64 {
        self.upload + self.download
    }
}

/// Contents of one dedup window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainedWindow {
    pub events: Vec<FlowEvent>,
    /// Number of enqueues the window absorbed, duplicates included
    pub observations: u64,
}

/// What an enqueue did with the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enqueued {
    /// Lifetime occurrence count of the event's key, including this one
    pub count: u64,
    /// `true` when the event was appended, `false` when its key was already
    /// pending in the current window
    pub appended: bool,
}

#[derive(Default)]
struct StoreState {
    counts: HashMap<FlowKey, u64>,
    /// Keys queued since the last drain, mapped to their slot in `pending`
    queued: HashMap<FlowKey, usize>,
    pending: Vec<FlowEvent>,
    /// Enqueues since the last drain, duplicates included
    window_observations: u64,
    remote_bytes: HashMap<IpAddr, RemoteBytes>,
}

/// Process-wide aggregation state shared by the capture loop and the
/// broadcast scheduler.
#[derive(Default)]
pub struct AggregationStore {
    state: Mutex<StoreState>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts `event` under its key and buffers it unless the key is already
    /// pending. A pending entry always carries the latest lifetime count.
    pub fn enqueue(&self, mut event: FlowEvent) -> Enqueued {
        let key = event.key();
        let mut state = self.state.lock();
        state.window_observations += 1;

        let count = {
            let counter = state.counts.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if let Some(&slot) = state.queued.get(&key) {
            state.pending[slot].occurrence_count = count;
            return Enqueued {
                count,
                appended: false,
            };
        }

        event.occurrence_count = count;
        let slot = state.pending.len();
        state.pending.push(event);
        state.queued.insert(key, slot);
        Enqueued {
            count,
            appended: true,
        }
    }

    /// Takes the pending buffer and opens a new dedup window.
    pub fn drain(&self) -> Vec<FlowEvent> {
        self.drain_window().events
    }

    /// Like [`AggregationStore::drain`], also reporting how many enqueues
    /// the closed window absorbed.
    pub fn drain_window(&self) -> DrainedWindow {
        let mut state = self.state.lock();
        state.queued.clear();
        DrainedWindow {
            events: std::mem::take(&mut state.pending),
            observations: std::mem::take(&mut state.window_observations),
        }
    }

    /// Adds `bytes` to the ledger of `remote` in the given direction.
    pub fn bytes_record(&self, remote: IpAddr, direction: Direction, bytes: usize) {
        let mut state = self.state.lock();
        let entry = state.remote_bytes.entry(remote).or_default();
        match direction {
            Direction::Upload => entry.upload += bytes as u64,
            Direction::Download => entry.download += bytes as u64,
        }
    }

    pub fn remote_bytes(&self, remote: &IpAddr) -> Option<RemoteBytes> {
        self.state.lock().remote_bytes.get(remote).copied()
    }

    /// Copy of the whole byte ledger.
    pub fn remote_bytes_snapshot(&self) -> HashMap<IpAddr, RemoteBytes> {
        self.state.lock().remote_bytes.clone()
    }

    /// Lifetime occurrence count of `key`.
    pub fn count(&self, key: &FlowKey) -> u64 {
        self.state.lock().counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys ever seen.
    pub fn distinct_flows(&self) -> usize {
        self.state.lock().counts.len()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Coordinate;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn event(peer: u8) -> FlowEvent {
        FlowEvent::new(
            Coordinate::new(10.0, 20.0),
            Coordinate::new(peer as f64, -(peer as f64)),
            Direction::Upload,
            format!("country-{peer}"),
        )
    }

    #[test]
    fn duplicate_keys_are_buffered_once() {
        let store = AggregationStore::new();
        assert!(store.enqueue(event(1)).appended);
        assert!(!store.enqueue(event(1)).appended);
        assert!(!store.enqueue(event(1)).appended);
        assert_eq!(store.pending_len(), 1);
    }

    #[test]
    fn pending_entry_carries_latest_count() {
        let store = AggregationStore::new();
        for _ in 0..4 {
            store.enqueue(event(1));
        }
        let drained = store.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].occurrence_count, 4);
    }

    #[test]
    fn counts_survive_drains() {
        let store = AggregationStore::new();
        store.enqueue(event(1));
        store.enqueue(event(1));
        store.drain();
        let outcome = store.enqueue(event(1));
        assert_eq!(outcome, Enqueued { count: 3, appended: true });
        assert_eq!(store.drain()[0].occurrence_count, 3);
        assert_eq!(store.count(&event(1).key()), 3);
    }

    #[test]
    fn second_drain_is_empty() {
        let store = AggregationStore::new();
        store.enqueue(event(1));
        store.enqueue(event(2));
        assert_eq!(store.drain().len(), 2);
        assert!(store.drain().is_empty());
    }

    #[test]
    fn drain_preserves_enqueue_order() {
        let store = AggregationStore::new();
        for peer in [3, 1, 2, 1, 3] {
            store.enqueue(event(peer));
        }
        let names: Vec<_> = store
            .drain()
            .into_iter()
            .map(|e| e.country_name)
            .collect();
        assert_eq!(names, ["country-3", "country-1", "country-2"]);
    }

    #[test]
    fn window_counts_duplicates() {
        let store = AggregationStore::new();
        for peer in [1, 1, 2, 1] {
            store.enqueue(event(peer));
        }
        let window = store.drain_window();
        assert_eq!(window.events.len(), 2);
        assert_eq!(window.observations, 4);
        assert_eq!(store.drain_window().observations, 0);
    }

    #[test]
    fn byte_ledger_sums_per_direction() {
        let store = AggregationStore::new();
        let remote = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));
        store.bytes_record(remote, Direction::Upload, 100);
        store.bytes_record(remote, Direction::Download, 40);
        store.bytes_record(remote, Direction::Upload, 1);
        assert_eq!(
            store.remote_bytes(&remote),
            Some(RemoteBytes {
                upload: 101,
                download: 40
            })
        );
        assert_eq!(store.remote_bytes_snapshot().len(), 1);
    }

    #[test]
    fn concurrent_enqueue_and_drain_lose_nothing() {
        let store = Arc::new(AggregationStore::new());
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        store.enqueue(event((i % 8) as u8));
                    }
                })
            })
            .collect();

        let drainer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let batch = store.drain();
                    let mut keys: Vec<_> = batch.iter().map(FlowEvent::key).collect();
                    let before = keys.len();
                    keys.sort();
                    keys.dedup();
                    assert_eq!(before, keys.len(), "duplicate key in one window");
                }
            })
        };

        for handle in producers {
            handle.join().unwrap();
        }
        drainer.join().unwrap();

        let total: u64 = (0..8).map(|peer| store.count(&event(peer).key())).sum();
        assert_eq!(total, 4000);
    }

    proptest! {
        #[test]
        fn one_event_per_key_with_lifetime_count(
            rounds in prop::collection::vec(prop::collection::vec(0u8..6, 0..40), 1..5)
        ) {
            let store = AggregationStore::new();
            let mut lifetime: HashMap<u8, u64> = HashMap::new();

            for round in rounds {
                let mut first_seen = Vec::new();
                for peer in &round {
                    *lifetime.entry(*peer).or_default() += 1;
                    if !first_seen.contains(peer) {
                        first_seen.push(*peer);
                    }
                    store.enqueue(event(*peer));
                }

                let drained = store.drain();
                prop_assert_eq!(drained.len(), first_seen.len());
                for (event, peer) in drained.iter().zip(&first_seen) {
                    prop_assert_eq!(&event.country_name, &format!("country-{peer}"));
                    prop_assert_eq!(event.occurrence_count, lifetime[peer]);
                }
                prop_assert!(store.drain().is_empty());
            }
        }
    }
}
