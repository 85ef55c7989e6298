//! Offset bookkeeping for one partition.
//!
//! The tracker holds the three offsets that tell the whole consumption story:
//!
//! - `current`: the next offset to request from the broker,
//! - `acked`: highest offset + 1 considered delivered and commit-eligible,
//! - `committed`: highest offset + 1 known durable at the broker,
//!
//! together with the outstanding downstream demand and the commit clock.
//! It is pure data and arithmetic; all I/O decisions live with the caller.
//!
//! The tracker does not exist until the initial offset load has resolved a
//! starting position; the consumer holds `Option<OffsetTracker>` and `None`
//! is the not-yet-loaded state.

use std::time::Duration;

use tokio::time::Instant;
use weir_core::Offset;

/// Offset and demand bookkeeping for one partition.
#[derive(Debug, Clone)]
pub struct OffsetTracker {
    /// Next offset to request from the broker. Monotonic non-decreasing.
    current: Offset,
    /// Highest offset + 1 delivered downstream and eligible for commit.
    acked: Offset,
    /// Highest offset + 1 known durable at the broker.
    committed: Offset,
    /// Records the subscriber still wants.
    demand: u64,
    /// When the last commit (or the initial load) happened.
    last_commit_at: Instant,
}

impl OffsetTracker {
    /// Creates a tracker with all three offsets at `offset` and the commit
    /// clock started at `now`.
    #[must_use]
    pub const fn new(offset: Offset, now: Instant) -> Self {
        Self {
            current: offset,
            acked: offset,
            committed: offset,
            demand: 0,
            last_commit_at: now,
        }
    }

    /// Advances past a delivered batch: the cursor and the ack watermark move
    /// to one past `last_offset`, and demand shrinks by `delivered`, clamped
    /// at zero.
    pub fn advance(&mut self, delivered: u64, last_offset: Offset) {
        self.current = last_offset.next();
        self.acked = self.current;
        self.demand = self.demand.saturating_sub(delivered);
        debug_assert!(self.committed <= self.acked && self.acked <= self.current);
    }

    /// Rewinds or forwards all three offsets to `offset`. Used after
    /// offset-out-of-range recovery and on first load.
    pub fn reset(&mut self, offset: Offset) {
        self.current = offset;
        self.acked = offset;
        self.committed = offset;
    }

    /// Raises the ack watermark to `offset` if it is ahead of the current
    /// one. Returns whether the watermark moved; `offset <= acked` is a
    /// no-op.
    pub fn mark_acked(&mut self, offset: Offset) -> bool {
        if offset > self.acked {
            self.acked = offset;
            debug_assert!(self.committed <= self.acked);
            true
        } else {
            false
        }
    }

    /// Records a successful broker commit of `offset`.
    pub fn record_commit(&mut self, offset: Offset, now: Instant) {
        self.committed = offset;
        self.last_commit_at = now;
        debug_assert!(self.committed <= self.acked);
    }

    /// Restarts the commit interval clock without a broker call.
    pub fn touch(&mut self, now: Instant) {
        self.last_commit_at = now;
    }

    /// Replaces the outstanding demand.
    pub fn set_demand(&mut self, demand: u64) {
        self.demand = demand;
    }

    /// Returns the next offset to fetch.
    #[must_use]
    pub const fn current(&self) -> Offset {
        self.current
    }

    /// Returns the ack watermark.
    #[must_use]
    pub const fn acked(&self) -> Offset {
        self.acked
    }

    /// Returns the committed watermark.
    #[must_use]
    pub const fn committed(&self) -> Offset {
        self.committed
    }

    /// Returns the outstanding demand.
    #[must_use]
    pub const fn demand(&self) -> u64 {
        self.demand
    }

    /// Returns true while the subscriber wants more records.
    #[must_use]
    pub const fn has_demand(&self) -> bool {
        self.demand > 0
    }

    /// Returns the number of acked-but-uncommitted offsets.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.committed.distance_to(self.acked)
    }

    /// Returns how far the cursor trails the partition's high watermark.
    #[must_use]
    pub const fn lag(&self, high_watermark: Offset) -> u64 {
        self.current.distance_to(high_watermark)
    }

    /// Returns time elapsed since the last commit (or initial load). Zero if
    /// `now` is earlier than the last commit.
    #[must_use]
    pub fn since_last_commit(&self, now: Instant) -> Duration {
        now.duration_since(self.last_commit_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_at(offset: u64) -> OffsetTracker {
        OffsetTracker::new(Offset::new(offset), Instant::now())
    }

    #[test]
    fn test_new_tracker_is_aligned() {
        let tracker = tracker_at(10);
        assert_eq!(tracker.current(), Offset::new(10));
        assert_eq!(tracker.acked(), Offset::new(10));
        assert_eq!(tracker.committed(), Offset::new(10));
        assert_eq!(tracker.pending(), 0);
        assert!(!tracker.has_demand());
    }

    #[test]
    fn test_advance_moves_cursor_and_ack() {
        let mut tracker = tracker_at(0);
        tracker.set_demand(10);

        tracker.advance(5, Offset::new(4));

        assert_eq!(tracker.current(), Offset::new(5));
        assert_eq!(tracker.acked(), Offset::new(5));
        assert_eq!(tracker.committed(), Offset::new(0));
        assert_eq!(tracker.demand(), 5);
        assert_eq!(tracker.pending(), 5);
    }

    #[test]
    fn test_advance_clamps_demand_at_zero() {
        let mut tracker = tracker_at(0);
        tracker.set_demand(3);

        // The broker over-delivered relative to outstanding demand.
        tracker.advance(8, Offset::new(7));

        assert_eq!(tracker.demand(), 0);
        assert_eq!(tracker.current(), Offset::new(8));
    }

    #[test]
    fn test_reset_aligns_all_offsets() {
        let mut tracker = tracker_at(0);
        tracker.set_demand(10);
        tracker.advance(5, Offset::new(4));

        tracker.reset(Offset::new(100));

        assert_eq!(tracker.current(), Offset::new(100));
        assert_eq!(tracker.acked(), Offset::new(100));
        assert_eq!(tracker.committed(), Offset::new(100));
        assert_eq!(tracker.pending(), 0);
        // Demand survives a reset; the subscriber still wants its records.
        assert_eq!(tracker.demand(), 5);
    }

    #[test]
    fn test_mark_acked_is_monotone() {
        let mut tracker = tracker_at(20);

        assert!(tracker.mark_acked(Offset::new(30)));
        assert_eq!(tracker.acked(), Offset::new(30));

        // Lower or equal offsets never regress the watermark.
        assert!(!tracker.mark_acked(Offset::new(25)));
        assert!(!tracker.mark_acked(Offset::new(30)));
        assert_eq!(tracker.acked(), Offset::new(30));
    }

    #[test]
    fn test_record_commit_catches_up() {
        let mut tracker = tracker_at(0);
        tracker.advance(5, Offset::new(4));
        assert_eq!(tracker.pending(), 5);

        tracker.record_commit(Offset::new(5), Instant::now());
        assert_eq!(tracker.committed(), Offset::new(5));
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_since_last_commit_and_touch() {
        let start = Instant::now();
        let mut tracker = OffsetTracker::new(Offset::new(0), start);

        let later = start + Duration::from_millis(500);
        assert_eq!(tracker.since_last_commit(later), Duration::from_millis(500));

        tracker.touch(later);
        assert_eq!(tracker.since_last_commit(later), Duration::ZERO);
    }

    #[test]
    fn test_lag() {
        let mut tracker = tracker_at(3);
        assert_eq!(tracker.lag(Offset::new(10)), 7);
        assert_eq!(tracker.lag(Offset::new(3)), 0);

        tracker.advance(7, Offset::new(9));
        assert_eq!(tracker.lag(Offset::new(10)), 0);
    }
}
