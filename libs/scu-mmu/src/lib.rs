//! Tag-keyed shared-RAM allocator directory (spec.md §4.B). A singly
//! linked list of fixed headers threads the directory, but headers and
//! payloads live in two separate regions of the same window: payloads
//! bump-allocate upward from the anchor, headers bump-allocate downward
//! from the capacity ceiling, so consecutive payload starts stay
//! contiguous (spec.md §8 scenario 3: `S1 = S0 + length0`) instead of
//! leaving a header-sized gap between them.
//!
//! Grounded on `scu_mmu.h`'s `mmuAlloc`/`mmuInit`: scan forward from
//! the anchor's `first_index` until `next_index == 0`, append a new
//! entry on a miss, and treat a second `allocate` for the same tag as
//! idempotent -- the directory must survive firmware restarts with RAM
//! contents intact (spec.md §3: "reallocation with identical tag
//! returns the existing entry and its length").
#![cfg_attr(not(feature = "std"), no_std)]

use scu_bus::{Bus, BusError};
use scu_proto::mmu::{MmuAnchor, MmuEntry, MMU_MAGIC};

/// Well-known tags used by the firmware's own consumers (spec.md §8
/// scenario 3). Not part of the wire protocol itself -- just stable
/// identifiers the firmware and host agree on out of band.
pub mod tags {
    pub const ADDAC_DAQ: u16 = 1;
    pub const MIL_DAQ: u16 = 2;
    pub const LM32_LOG: u16 = 3;
}

const ANCHOR_WORDS: u32 = MmuAnchor::WIRE_WORDS as u32;
const ENTRY_WORDS: u32 = MmuEntry::WIRE_WORDS as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    AlreadyPresent,
    TagNotFound,
    OutOfMem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Bus(BusError),
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Error::Bus(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A view over the directory placed at `base_addr` in `bus`'s address
/// space, spanning `capacity_words` 32-bit words (spec.md §6: "MMU
/// anchor at a fixed word offset from the bulk-RAM base").
pub struct Mmu<'b, B: Bus> {
    bus: &'b mut B,
    base_addr: u32,
    capacity_words: u32,
}

impl<'b, B: Bus> Mmu<'b, B> {
    pub fn new(bus: &'b mut B, base_addr: u32, capacity_words: u32) -> Self {
        Self { bus, base_addr, capacity_words }
    }

    fn byte_addr(&self, word_index: u32) -> u32 {
        self.base_addr + word_index * 4
    }

    fn read_anchor(&self) -> Result<MmuAnchor, Error> {
        let mut words = [0u32; MmuAnchor::WIRE_WORDS];
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.bus.read_u32(self.byte_addr(i as u32))?;
        }
        Ok(MmuAnchor::from_words(&words))
    }

    fn write_anchor(&mut self, anchor: &MmuAnchor) -> Result<(), Error> {
        for (i, word) in anchor.to_words().iter().enumerate() {
            self.bus.write_u32(self.byte_addr(i as u32), *word)?;
        }
        Ok(())
    }

    fn read_entry(&self, header_index: u32) -> Result<MmuEntry, Error> {
        let mut words = [0u32; MmuEntry::WIRE_WORDS];
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.bus.read_u32(self.byte_addr(header_index + i as u32))?;
        }
        Ok(MmuEntry::from_words_firmware(&words))
    }

    fn write_entry(&mut self, header_index: u32, entry: &MmuEntry) -> Result<(), Error> {
        for (i, word) in entry.to_words_firmware().iter().enumerate() {
            self.bus.write_u32(self.byte_addr(header_index + i as u32), *word)?;
        }
        Ok(())
    }

    /// Ensures the anchor contains the magic number, formatting an
    /// empty directory if it was absent (spec.md §4.B `init`).
    pub fn init(&mut self) -> Result<(), Error> {
        let anchor = self.read_anchor()?;
        if !anchor.is_present() {
            self.write_anchor(&MmuAnchor { magic: MMU_MAGIC, first_index: 0 })?;
        }
        Ok(())
    }

    /// Scans the list for `tag`. On a match, overwrites `start`/`length`
    /// with the existing entry's values and returns `AlreadyPresent`.
    /// On a miss: bump-allocates a fresh payload region right after the
    /// last entry's payload and a fresh header right below the lowest
    /// header index seen so far, when `create` is set (returning `Ok`
    /// with the fresh `start`), otherwise returns `TagNotFound`. Returns
    /// `OutOfMem` once the payload region would collide with the header
    /// table.
    pub fn allocate(
        &mut self,
        tag: u16,
        start: &mut u32,
        length: &mut u32,
        create: bool,
    ) -> Result<Status, Error> {
        let anchor = self.read_anchor()?;
        let mut header_index = anchor.first_index;
        let mut last: Option<(u32, MmuEntry)> = None;
        let mut min_header_index = self.capacity_words;
        while header_index != 0 {
            min_header_index = min_header_index.min(header_index);
            let entry = self.read_entry(header_index)?;
            if entry.tag == tag {
                *start = entry.start_index;
                *length = entry.length;
                return Ok(Status::AlreadyPresent);
            }
            let next = entry.next_index;
            last = Some((header_index, entry));
            header_index = next;
        }

        if !create {
            return Ok(Status::TagNotFound);
        }

        let new_payload_start = match &last {
            Some((_, entry)) => entry.start_index + entry.length,
            None => ANCHOR_WORDS,
        };
        if min_header_index < ENTRY_WORDS {
            return Ok(Status::OutOfMem);
        }
        let new_header = min_header_index - ENTRY_WORDS;
        if new_payload_start as u64 + *length as u64 > new_header as u64 {
            return Ok(Status::OutOfMem);
        }

        let new_entry = MmuEntry { tag, flags: 0, next_index: 0, start_index: new_payload_start, length: *length };
        self.write_entry(new_header, &new_entry)?;

        match last {
            Some((prev_header, mut prev_entry)) => {
                prev_entry.next_index = new_header;
                self.write_entry(prev_header, &prev_entry)?;
            }
            None => {
                self.write_anchor(&MmuAnchor { magic: MMU_MAGIC, first_index: new_header })?;
            }
        }

        *start = new_payload_start;
        Ok(Status::Ok)
    }

    /// Zeroes the magic; a subsequent `init` re-formats an empty
    /// directory (spec.md §4.B `delete`). The payload words themselves
    /// are left untouched -- only the anchor is cleared.
    pub fn delete(&mut self) -> Result<(), Error> {
        self.write_anchor(&MmuAnchor { magic: 0, first_index: 0 })
    }

    /// Walks the directory from `first_index` and returns every entry
    /// in on-disk order, for tooling (`scu-memmon`) that browses the
    /// whole directory rather than looking up one tag.
    #[cfg(feature = "std")]
    pub fn list(&self) -> Result<std::vec::Vec<MmuEntry>, Error> {
        let anchor = self.read_anchor()?;
        let mut out = std::vec::Vec::new();
        let mut header_index = anchor.first_index;
        while header_index != 0 {
            let entry = self.read_entry(header_index)?;
            header_index = entry.next_index;
            out.push(entry);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_bus::SimBus;

    fn fresh(capacity_words: u32) -> SimBus {
        SimBus::new(capacity_words as usize * 4)
    }

    #[test]
    fn allocate_then_relookup_is_idempotent() {
        let mut bus = fresh(4096);
        let mut mmu = Mmu::new(&mut bus, 0, 4096);
        mmu.init().unwrap();

        let mut start = 0;
        let mut length = 256;
        assert_eq!(mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut length, true).unwrap(), Status::Ok);
        let first_start = start;

        let mut start2 = 0;
        let mut length2 = 0;
        assert_eq!(mmu.allocate(tags::ADDAC_DAQ, &mut start2, &mut length2, false).unwrap(), Status::AlreadyPresent);
        assert_eq!(start2, first_start);
        assert_eq!(length2, 256);
    }

    #[test]
    fn two_consecutive_creates_are_ok_then_already_present() {
        let mut bus = fresh(4096);
        let mut mmu = Mmu::new(&mut bus, 0, 4096);
        mmu.init().unwrap();

        let mut start = 0;
        let mut length = 128;
        assert_eq!(mmu.allocate(tags::MIL_DAQ, &mut start, &mut length, true).unwrap(), Status::Ok);
        let (first_start, first_length) = (start, length);

        assert_eq!(mmu.allocate(tags::MIL_DAQ, &mut start, &mut length, true).unwrap(), Status::AlreadyPresent);
        assert_eq!(start, first_start);
        assert_eq!(length, first_length);
    }

    #[test]
    fn three_tags_survive_reinit_with_same_offsets() {
        // spec.md §8 scenario 3.
        let mut bus = fresh(1 << 20);
        {
            let mut mmu = Mmu::new(&mut bus, 0, 1 << 18);
            mmu.init().unwrap();
            let mut start = 0;
            let mut len = 1024;
            assert_eq!(mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut len, true).unwrap(), Status::Ok);
            let s0 = start;
            let mut start = 0;
            let mut len = 2048;
            assert_eq!(mmu.allocate(tags::MIL_DAQ, &mut start, &mut len, true).unwrap(), Status::Ok);
            assert_eq!(start, s0 + 1024);
            let s1 = start;
            let mut start = 0;
            let mut len = 512;
            assert_eq!(mmu.allocate(tags::LM32_LOG, &mut start, &mut len, true).unwrap(), Status::Ok);
            assert_eq!(start, s1 + 2048);
        }
        // Re-init over the same (preserved) RAM: same three lookups now
        // report ALREADY_PRESENT with unchanged starts.
        let mut mmu = Mmu::new(&mut bus, 0, 1 << 18);
        mmu.init().unwrap();
        let mut start = 0;
        let mut len = 0;
        assert_eq!(mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut len, false).unwrap(), Status::AlreadyPresent);
        assert_eq!(len, 1024);
    }

    #[test]
    fn missing_tag_without_create_is_not_found() {
        let mut bus = fresh(4096);
        let mut mmu = Mmu::new(&mut bus, 0, 4096);
        mmu.init().unwrap();
        let mut start = 0;
        let mut length = 0;
        assert_eq!(mmu.allocate(99, &mut start, &mut length, false).unwrap(), Status::TagNotFound);
    }

    #[test]
    fn allocation_beyond_capacity_is_out_of_mem() {
        let mut bus = fresh(64);
        let mut mmu = Mmu::new(&mut bus, 0, 64);
        mmu.init().unwrap();
        let mut start = 0;
        let mut length = 1000;
        assert_eq!(mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut length, true).unwrap(), Status::OutOfMem);
    }

    #[test]
    fn delete_then_init_reformats() {
        let mut bus = fresh(4096);
        let mut mmu = Mmu::new(&mut bus, 0, 4096);
        mmu.init().unwrap();
        let mut start = 0;
        let mut length = 64;
        mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut length, true).unwrap();
        mmu.delete().unwrap();
        mmu.init().unwrap();
        let mut start = 0;
        let mut length = 0;
        assert_eq!(mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut length, false).unwrap(), Status::TagNotFound);
    }
}
