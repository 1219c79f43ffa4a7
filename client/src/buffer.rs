//! Snapshot buffer: received world states ordered by when the server produced them
//!
//! Snapshots can arrive late, twice, or out of order. The buffer keeps them
//! sorted by `server_time` and learns how the local clock maps onto the
//! server's: the smallest `received_at - server_time` seen so far is the
//! least-delayed observation, and it converts a local instant into a point
//! on the server timeline.

use log::debug;
use shared::WorldSnapshot;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<WorldSnapshot>,
    /// Milliseconds, local clock minus server clock
    clock_offset: Option<i64>,
    retention_ms: u64,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            clock_offset: None,
            retention_ms: retention.as_millis() as u64,
            capacity: capacity.max(2),
        }
    }

    /// Adds a snapshot received at local time `received_at`
    ///
    /// Returns false for a duplicate of an already buffered snapshot.
    pub fn insert(&mut self, snapshot: WorldSnapshot, received_at: u64) -> bool {
        let offset = received_at as i64 - snapshot.server_time as i64;
        self.clock_offset = Some(match self.clock_offset {
            Some(current) => current.min(offset),
            None => offset,
        });
        self.store(snapshot)
    }

    /// Adds a snapshot that did not travel the datagram path
    ///
    /// The start snapshot comes over the session connection without the
    /// artificial delays, so its arrival says nothing about how late datagram
    /// snapshots are and it leaves the clock offset alone.
    pub fn seed(&mut self, snapshot: WorldSnapshot) -> bool {
        self.store(snapshot)
    }

    fn store(&mut self, snapshot: WorldSnapshot) -> bool {
        if self
            .snapshots
            .iter()
            .any(|s| s.sequence_number == snapshot.sequence_number)
        {
            return false;
        }

        let index = self
            .snapshots
            .partition_point(|s| s.server_time <= snapshot.server_time);
        if index < self.snapshots.len() {
            debug!(
                "Snapshot {} arrived out of order",
                snapshot.sequence_number
            );
        }
        self.snapshots.insert(index, snapshot);
        self.evict();
        true
    }

    fn evict(&mut self) {
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }

        let Some(newest) = self.snapshots.back().map(|s| s.server_time) else {
            return;
        };
        let horizon = newest.saturating_sub(self.retention_ms);
        while self
            .snapshots
            .front()
            .is_some_and(|s| s.server_time < horizon)
        {
            self.snapshots.pop_front();
        }
    }

    /// Drops snapshots that no render target at or after `server_time` can use
    ///
    /// The last snapshot at or before `server_time` is kept as the lower
    /// bracket for the next interpolation.
    pub fn discard_before(&mut self, server_time: u64) {
        let bracket = self
            .snapshots
            .partition_point(|s| s.server_time <= server_time);
        let removable = bracket.saturating_sub(1);
        self.snapshots.drain(..removable);
    }

    /// Maps a local wall-clock instant onto the server timeline
    pub fn to_server_time(&self, local_time: u64) -> Option<u64> {
        let offset = self.clock_offset?;
        Some((local_time as i64 - offset).max(0) as u64)
    }

    pub fn clock_offset(&self) -> Option<i64> {
        self.clock_offset
    }

    pub fn get(&self, index: usize) -> Option<&WorldSnapshot> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldSnapshot> {
        self.snapshots.iter()
    }

    pub fn oldest(&self) -> Option<&WorldSnapshot> {
        self.snapshots.front()
    }

    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.snapshots.back()
    }

    /// Index of the first snapshot produced after `server_time`
    pub fn successor_index(&self, server_time: u64) -> usize {
        self.snapshots
            .partition_point(|s| s.server_time <= server_time)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(sequence_number: u64, server_time: u64) -> WorldSnapshot {
        WorldSnapshot {
            sequence_number,
            server_time,
            players: Vec::new(),
            coins: Vec::new(),
        }
    }

    fn server_times(buffer: &SnapshotBuffer) -> Vec<u64> {
        buffer.iter().map(|s| s.server_time).collect()
    }

    #[test]
    fn test_keeps_snapshots_ordered_by_server_time() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);

        assert!(buffer.insert(snapshot(1, 1000), 1100));
        assert!(buffer.insert(snapshot(3, 1066), 1170));
        assert!(buffer.insert(snapshot(2, 1033), 1180));

        assert_eq!(server_times(&buffer), vec![1000, 1033, 1066]);
        assert_eq!(buffer.oldest().unwrap().sequence_number, 1);
        assert_eq!(buffer.latest().unwrap().sequence_number, 3);
    }

    #[test]
    fn test_ignores_duplicates() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);
        assert!(buffer.insert(snapshot(5, 1000), 1100));
        assert!(!buffer.insert(snapshot(5, 1000), 1120));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clock_offset_tracks_least_delayed_arrival() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);
        assert_eq!(buffer.to_server_time(5000), None);

        buffer.insert(snapshot(1, 1000), 1150);
        assert_eq!(buffer.clock_offset(), Some(150));

        buffer.insert(snapshot(2, 1033), 1133);
        assert_eq!(buffer.clock_offset(), Some(100));

        // A slower arrival never widens the offset again.
        buffer.insert(snapshot(3, 1066), 1300);
        assert_eq!(buffer.clock_offset(), Some(100));
        assert_eq!(buffer.to_server_time(1200), Some(1100));
    }

    #[test]
    fn test_seed_does_not_learn_the_clock() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);
        assert!(buffer.seed(snapshot(0, 1000)));
        assert_eq!(buffer.clock_offset(), None);
        assert_eq!(buffer.to_server_time(1000), None);

        // Datagram snapshots trail the server by 200ms; only they set the offset.
        buffer.insert(snapshot(1, 1033), 1233);
        buffer.insert(snapshot(2, 1066), 1266);
        assert_eq!(buffer.clock_offset(), Some(200));

        // 100ms behind the newest arrival lands between buffered snapshots.
        let target = buffer.to_server_time(1266).unwrap() - 100;
        assert_eq!(target, 966);
        let later_target = buffer.to_server_time(1340).unwrap() - 100;
        assert!(buffer.oldest().unwrap().server_time <= later_target);
        assert!(later_target < buffer.latest().unwrap().server_time);
    }

    #[test]
    fn test_negative_offset_from_skewed_clocks() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);
        buffer.insert(snapshot(1, 10_000), 2_000);
        assert_eq!(buffer.clock_offset(), Some(-8_000));
        assert_eq!(buffer.to_server_time(2_100), Some(10_100));
    }

    #[test]
    fn test_evicts_beyond_retention() {
        let mut buffer = SnapshotBuffer::new(Duration::from_millis(100), 10);
        for (i, time) in [1000, 1050, 1100, 1150].into_iter().enumerate() {
            buffer.insert(snapshot(i as u64, time), time);
        }
        assert_eq!(server_times(&buffer), vec![1050, 1100, 1150]);
    }

    #[test]
    fn test_evicts_beyond_capacity() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(10), 3);
        for i in 0..5 {
            buffer.insert(snapshot(i, 1000 + i * 10), 1000 + i * 10);
        }
        assert_eq!(server_times(&buffer), vec![1020, 1030, 1040]);
    }

    #[test]
    fn test_discard_before_keeps_lower_bracket() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);
        for (i, time) in [1000, 1033, 1066, 1100].into_iter().enumerate() {
            buffer.insert(snapshot(i as u64, time), time);
        }

        buffer.discard_before(1070);
        assert_eq!(server_times(&buffer), vec![1066, 1100]);

        // Before the oldest snapshot nothing goes.
        buffer.discard_before(500);
        assert_eq!(server_times(&buffer), vec![1066, 1100]);
    }

    #[test]
    fn test_successor_index() {
        let mut buffer = SnapshotBuffer::new(Duration::from_secs(1), 10);
        buffer.insert(snapshot(0, 1000), 1000);
        buffer.insert(snapshot(1, 1100), 1100);

        assert_eq!(buffer.successor_index(900), 0);
        assert_eq!(buffer.successor_index(1000), 1);
        assert_eq!(buffer.successor_index(1050), 1);
        assert_eq!(buffer.successor_index(1100), 2);
    }
}
