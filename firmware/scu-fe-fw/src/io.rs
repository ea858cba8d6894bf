//! Bridges `scu-fg`'s [`ChannelIo`] surface onto the two concrete
//! transports a flat channel might be driven through: direct MMIO for
//! ADDAC (`key` is a byte address), the MIL task-slot register write
//! for MIL (`key` is a task-slot index, spec.md §4.F).

use crate::platform::Platform;
use scu_bus::Bus;
use scu_fg::{ChannelIo, Error};

/// ADDAC's direct memory-mapped path: `key` is already the absolute
/// byte address `scu-fg::AddacChannel` computed from its `base_addr`.
pub struct BusChannelIo<'a, B: Bus> {
    pub bus: &'a mut B,
}

impl<'a, B: Bus> ChannelIo for BusChannelIo<'a, B> {
    fn write_words(&mut self, key: u32, words: &[u32]) -> Result<(), Error> {
        for (i, word) in words.iter().enumerate() {
            self.bus.write_u32(key + i as u32 * 4, *word).map_err(Error::Bus)?;
        }
        Ok(())
    }

    fn read_words(&mut self, key: u32, words: &mut [u32]) -> Result<(), Error> {
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.bus.read_u32(key + i as u32 * 4).map_err(Error::Bus)?;
        }
        Ok(())
    }
}

/// MIL's serial path: `key` is the task-slot index allocated to this
/// channel by `scu_mil::TaskSlotTable`. Bound to one link at
/// construction, since a task slot is only meaningful relative to the
/// link it belongs to.
pub struct MilChannelIo<'a, P: Platform> {
    pub platform: &'a mut P,
    pub link: u8,
}

impl<'a, P: Platform> ChannelIo for MilChannelIo<'a, P> {
    fn write_words(&mut self, key: u32, words: &[u32]) -> Result<(), Error> {
        self.platform
            .write_mil_registers(self.link, key as u8, words)
            .map_err(|_| Error::Bus(scu_bus::BusError::Transport(0)))
    }

    /// MIL channels have no hardware register to read back (spec.md
    /// §4.F: "the hardware has no ramp counter"); `scu_fg::MilChannel`
    /// never calls this, so it is a harmless no-op rather than a real
    /// transfer.
    fn read_words(&mut self, _key: u32, words: &mut [u32]) -> Result<(), Error> {
        words.fill(0);
        Ok(())
    }
}
