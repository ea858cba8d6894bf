//! Shared-RAM ring buffer index arithmetic (spec.md §4.C). Used by the
//! log fifo (`scu-log`), the DAQ ring (`scu-daq`), and any other
//! producer/consumer pair that shares a region of bulk RAM.
//!
//! Grounded on `daq_ramBuffer_lm32.h`'s `RAM_RING_INDEXES_T` (`offset,
//! capacity, start, end, wasRead` word-granular indices) and the
//! producer/consumer split spec.md §4.C describes: the producer writes
//! at `end` and publishes by storing the new `end`; the consumer reads
//! at `start` and releases slots by writing a count into `was_read`,
//! which only the producer ever clears.
#![cfg_attr(not(feature = "std"), no_std)]

/// Indices are tracked over a doubled range `0..2*capacity` rather than
/// `0..capacity`, the classic trick for disambiguating "empty"
/// (`start == end`) from "full" (`size == capacity`) without a
/// separate boolean flag or a wasted slot. The actual word offset
/// within the backing region is always `index % capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingAdmin {
    /// Byte/word offset of this ring's payload region within shared RAM.
    /// Not used in the index arithmetic itself; carried so callers can
    /// compute absolute addresses.
    pub offset: u32,
    /// Capacity in words (spec.md §4.C: "indices are word-granular").
    pub capacity: u32,
    pub start: u32,
    pub end: u32,
    /// Consumer-written count of words it has finished reading;
    /// single-writer per spec.md §4.C ("concurrent write to was_read by
    /// the producer is not permitted").
    pub was_read: u32,
}

impl RingAdmin {
    pub fn new(offset: u32, capacity: u32) -> Self {
        debug_assert!(capacity > 0);
        Self { offset, capacity, start: 0, end: 0, was_read: 0 }
    }

    fn modulus(&self) -> u32 {
        self.capacity * 2
    }

    /// Advances `index` by `n` words, wrapping at the doubled modulus
    /// (spec.md §4.C: "increment(index, n) with modular wrap").
    pub fn increment(&self, index: u32, n: u32) -> u32 {
        (index + n) % self.modulus()
    }

    /// Occupied words currently published between `start` and `end`.
    pub fn size(&self) -> u32 {
        (self.end + self.modulus() - self.start) % self.modulus()
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.capacity - self.size()
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The actual word offset `index` maps to within the backing
    /// region, after folding the doubled range back to `0..capacity`.
    pub fn slot(&self, index: u32) -> u32 {
        index % self.capacity
    }

    /// Producer-side: publishes `n` freshly written words by advancing
    /// `end`. Caller must not have written past `start + capacity`
    /// (spec.md §4.C); debug-asserts that invariant here.
    pub fn publish(&mut self, n: u32) {
        debug_assert!(n <= self.remaining_capacity(), "publish would overrun the ring");
        self.end = self.increment(self.end, n);
    }

    /// Producer-side consumption of `was_read`: advances `start` by
    /// whatever the consumer has acknowledged, then clears the cell
    /// (spec.md §4.C: "the producer subtracts this from size and clears
    /// was_read").
    pub fn synchronize_read_index(&mut self) {
        let consumed = self.was_read;
        self.start = self.increment(self.start, consumed);
        self.was_read = 0;
    }

    /// Producer-side drop of the oldest `n` words, used by overwrite-
    /// on-full producers (the log fifo, spec.md §4.D) to make room
    /// without waiting for a consumer acknowledgement.
    pub fn add_to_read_index(&mut self, n: u32) {
        let n = n.min(self.size());
        self.start = self.increment(self.start, n);
    }

    /// Consumer-side: adds `n` to `was_read`, for the producer to fold
    /// into `start` on its next `synchronize_read_index`. Additive
    /// rather than an overwrite so a consumer that drains the ring
    /// incrementally (one item per tick, as the FG engine does with its
    /// per-channel segment ring) can accumulate acknowledgements across
    /// several ticks before the producer gets around to syncing.
    pub fn acknowledge(&mut self, n: u32) {
        self.was_read += n;
    }

    /// The consumer's own current read position: `start` advanced by
    /// whatever it has already acknowledged but the producer has not
    /// yet folded back in. Spec.md §4.C's "the consumer reads at
    /// start" holds exactly when `was_read == 0`; this generalizes it
    /// to the steady state where acknowledgements lag a sync.
    pub fn read_index(&self) -> u32 {
        self.increment(self.start, self.was_read)
    }

    /// Words available for the consumer to read right now: published
    /// data between its true read position and `end`, independent of
    /// whether the producer has synced yet.
    pub fn unread(&self) -> u32 {
        (self.end + self.modulus() - self.read_index()) % self.modulus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ring_is_empty() {
        let r = RingAdmin::new(0x1000, 16);
        assert_eq!(r.size(), 0);
        assert_eq!(r.remaining_capacity(), 16);
        assert!(r.is_empty());
    }

    #[test]
    fn publish_then_full_disambiguated_from_empty() {
        let mut r = RingAdmin::new(0, 4);
        r.publish(4);
        assert!(r.is_full());
        assert_eq!(r.size(), 4);
        assert_ne!(r.start, r.end, "doubled-range indices disambiguate full from empty");
    }

    #[test]
    fn synchronize_read_index_advances_start_and_clears_was_read() {
        let mut r = RingAdmin::new(0, 8);
        r.publish(5);
        r.acknowledge(3);
        r.synchronize_read_index();
        assert_eq!(r.was_read, 0);
        assert_eq!(r.size(), 2);
    }

    #[test]
    fn add_to_read_index_drops_oldest_without_consumer_ack() {
        let mut r = RingAdmin::new(0, 8);
        r.publish(8);
        r.add_to_read_index(1);
        assert_eq!(r.size(), 7);
        assert_eq!(r.remaining_capacity(), 1);
    }

    #[test]
    fn wrap_around_keeps_size_within_capacity() {
        let mut r = RingAdmin::new(0, 4);
        for _ in 0..10 {
            r.publish(1);
            r.acknowledge(1);
            r.synchronize_read_index();
        }
        assert_eq!(r.size(), 0);
    }

    #[test]
    fn incremental_acknowledgement_tracks_unread_across_several_ticks() {
        let mut r = RingAdmin::new(0, 8);
        r.publish(5);
        assert_eq!(r.unread(), 5);
        r.acknowledge(1);
        assert_eq!(r.unread(), 4, "own unsynced ack is reflected immediately");
        r.acknowledge(1);
        assert_eq!(r.unread(), 3, "acknowledgements accumulate before a sync");
        r.synchronize_read_index();
        assert_eq!(r.unread(), 3, "sync folds was_read into start without changing unread");
        assert_eq!(r.was_read, 0);
    }

    #[test]
    fn slot_folds_doubled_index_into_backing_range() {
        let r = RingAdmin::new(0, 4);
        assert_eq!(r.slot(5), 1);
        assert_eq!(r.slot(7), 3);
    }
}
