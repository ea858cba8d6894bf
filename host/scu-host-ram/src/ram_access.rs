//! Burst-aware bulk-RAM access (spec.md §4.J: "`Ddr3Access` supports
//! burst reads with a configurable threshold; `SramAccess` is the SCU-4
//! equivalent"). Both are read-only collaborators from the rest of the
//! workspace's standpoint -- "atomic 64-bit reads and writes to a
//! numbered offset in bulk RAM" -- so they share one implementation
//! parameterized only by their default burst threshold, grounded on
//! `mem-mon.cpp`'s fallback from `Ddr3Access` to `SramAccess` on a
//! vendor-id mismatch (SCU3 vs SCU4 hardware).

use crate::Error;
use scu_bus::{Bus, BurstReader};

/// Item size every `RamAccess` read/write is denominated in (spec.md
/// §6: "Bulk RAM... 64-bit word-addressable").
pub const ITEM_BYTES: u32 = 8;

/// Common contract `Ddr3Access`/`SramAccess` both satisfy: numbered
/// 64-bit items in bulk RAM, with an optional burst path for runs long
/// enough to be worth a single multi-word transfer.
pub trait RamAccess {
    fn read_item(&self, index: u32) -> Result<u64, Error>;
    fn write_item(&mut self, index: u32, value: u64) -> Result<(), Error>;

    /// Reads `out.len()` consecutive items starting at `index`. The
    /// default walks one item at a time; `Ddr3Access`/`SramAccess`
    /// override it once `out.len()` clears their burst threshold.
    fn read_items(&mut self, index: u32, out: &mut [u64]) -> Result<(), Error> {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read_item(index + i as u32)?;
        }
        Ok(())
    }
}

/// `base_addr` is the byte offset bulk RAM starts at on this bus
/// (typically 0: the whole `Bus` handle is the RAM window).
struct RamBus<B: Bus> {
    bus: B,
    base_addr: u32,
    burst_limit: u32,
}

impl<B: Bus> RamBus<B> {
    fn item_addr(&self, index: u32) -> u32 {
        self.base_addr + index * ITEM_BYTES
    }

    fn read_item(&self, index: u32) -> Result<u64, Error> {
        Ok(self.bus.read_u64(self.item_addr(index))?)
    }

    fn write_item(&mut self, index: u32, value: u64) -> Result<(), Error> {
        self.bus.write_u64(self.item_addr(index), value)?;
        Ok(())
    }

    /// Below `burst_limit`, reads one item at a time (matches
    /// `setBurstLimit`'s documented "0 means always burst" by making a
    /// limit of 0 never take this branch). At or above it, defers to
    /// `BurstReader` for the whole run, reassembling pairs of 32-bit
    /// words into items -- `Bus::read_burst` is word-granular, not
    /// item-granular.
    fn read_items(&mut self, index: u32, out: &mut [u64]) -> Result<(), Error> {
        let word_threshold = (self.burst_limit as usize).saturating_mul(2);
        let mut words = vec![0u32; out.len() * 2];
        BurstReader::new(&self.bus, word_threshold).read_words(self.item_addr(index), &mut words)?;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = ((words[i * 2] as u64) << 32) | words[i * 2 + 1] as u64;
        }
        Ok(())
    }
}

/// SCU3's bulk RAM: DDR3, where burst reads pay off past a few words
/// (spec.md §4.J). Default threshold chosen the same way
/// `setBurstLimit`'s own doc comment frames it -- "number of 64-bit
/// data words at which burst reading becomes active" -- picked here as
/// an implementer default rather than carried from hardware docs the
/// retrieved pack does not include.
pub struct Ddr3Access<B: Bus> {
    inner: RamBus<B>,
}

impl<B: Bus> Ddr3Access<B> {
    const DEFAULT_BURST_LIMIT: u32 = 8;

    pub fn new(bus: B, base_addr: u32) -> Self {
        Self { inner: RamBus { bus, base_addr, burst_limit: Self::DEFAULT_BURST_LIMIT } }
    }

    /// `0` means "always burst", matching `setBurstLimit`'s documented
    /// convention.
    pub fn set_burst_limit(&mut self, burst_limit: u32) {
        self.inner.burst_limit = burst_limit;
    }
}

impl<B: Bus> RamAccess for Ddr3Access<B> {
    fn read_item(&self, index: u32) -> Result<u64, Error> {
        self.inner.read_item(index)
    }

    fn write_item(&mut self, index: u32, value: u64) -> Result<(), Error> {
        self.inner.write_item(index, value)
    }

    fn read_items(&mut self, index: u32, out: &mut [u64]) -> Result<(), Error> {
        self.inner.read_items(index, out)
    }
}

/// SCU4's bulk RAM: SRAM, fast enough that burst transfers rarely pay
/// for their own overhead, so bursting defaults to off (spec.md §4.J:
/// "`SramAccess` is the SCU-4 equivalent").
pub struct SramAccess<B: Bus> {
    inner: RamBus<B>,
}

impl<B: Bus> SramAccess<B> {
    pub fn new(bus: B, base_addr: u32) -> Self {
        Self { inner: RamBus { bus, base_addr, burst_limit: u32::MAX } }
    }

    pub fn set_burst_limit(&mut self, burst_limit: u32) {
        self.inner.burst_limit = burst_limit;
    }
}

impl<B: Bus> RamAccess for SramAccess<B> {
    fn read_item(&self, index: u32) -> Result<u64, Error> {
        self.inner.read_item(index)
    }

    fn write_item(&mut self, index: u32, value: u64) -> Result<(), Error> {
        self.inner.write_item(index, value)
    }

    fn read_items(&mut self, index: u32, out: &mut [u64]) -> Result<(), Error> {
        self.inner.read_items(index, out)
    }
}
