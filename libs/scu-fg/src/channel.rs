//! Hardware-channel abstraction (spec.md §4.F): ADDAC (direct
//! memory-mapped) and MIL (serial task-slot) function generator
//! channels, unified behind one `{prepare, start, disable_irq,
//! disable, feed_next, read_status}` surface.
//!
//! Grounded on spec.md's own Design Notes: "In a systems-language
//! rewrite use a tagged variant `Channel ∈ {Addac(AddacChannel),
//! Mil(MilChannel)}` with a shared trait/interface ... Dispatch is by
//! variant match; dynamic cast is not needed." `ChannelIo` is the
//! minimal I/O surface both variants drive through: ADDAC interprets
//! its `key` as a byte address on the shared bus (`libs/xous-pio`'s
//! `CSR<T>` base+offset pattern, generalized); MIL interprets it as a
//! hardware task-slot index, left for `scu-mil` to implement since
//! that crate owns the serial link's task-slot allocation (spec.md
//! §4.H).

use crate::Error;
use scu_proto::poly::PolySegment;

/// Snapshot of a channel's hardware status, as read by `read_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    /// `false` once the hardware reports the ramp has stopped running
    /// (spec.md §4.G: "if hardware says 'no longer running'").
    pub running: bool,
    pub ramp_count: u32,
}

/// The I/O surface a channel variant drives through. `write_words`/
/// `read_words` move a small burst of 32-bit words to/from whatever
/// `key` addresses in the underlying transport -- a byte address for
/// ADDAC's direct MMIO, a task-slot index for MIL's serial link.
pub trait ChannelIo {
    fn write_words(&mut self, key: u32, words: &[u32]) -> Result<(), Error>;
    fn read_words(&mut self, key: u32, words: &mut [u32]) -> Result<(), Error>;
}

/// Register offsets within an ADDAC channel's MMIO block. Concrete
/// values are this implementation's choice -- the retrieved pack does
/// not carry the original SCU-bus ADDAC register map -- but the field
/// set and write ordering follow spec.md §4.F exactly.
pub(crate) mod addac_regs {
    pub const COEFF_A: u32 = 0x00;
    pub const COEFF_B: u32 = 0x04;
    pub const COEFF_C: u32 = 0x08;
    pub const CONTROL: u32 = 0x0c;
    pub const TAG: u32 = 0x10;
    pub const RAMP_COUNT: u32 = 0x14;
    pub const ENABLE: u32 = 0x18;
    pub const STATUS: u32 = 0x1c;

    pub const ENABLE_BIT: u32 = 1 << 0;
    pub const IRQ_ENABLE_BIT: u32 = 1 << 1;
    pub const FG_MODE_BIT: u32 = 1 << 2;
    pub const STATUS_RUNNING_BIT: u32 = 1 << 0;
}

/// Direct memory-mapped FG channel (spec.md §4.F "ADDAC").
#[derive(Debug, Clone, Copy)]
pub struct AddacChannel {
    pub base_addr: u32,
    pub channel_number: u8,
}

impl AddacChannel {
    pub fn new(base_addr: u32, channel_number: u8) -> Self {
        Self { base_addr, channel_number }
    }

    /// Resets the on-device ramp counter, programs the ECA event tag,
    /// enables the slave IRQ, and sets the DAC to FG mode (spec.md
    /// §4.F). The original hardware splits a 64-bit ECA tag into
    /// low/high halves; this data model carries a single `u32` tag
    /// (spec.md §3), so only one register write is needed here.
    pub fn prepare(&mut self, io: &mut dyn ChannelIo, tag: u32) -> Result<(), Error> {
        use addac_regs::*;
        io.write_words(self.base_addr + RAMP_COUNT, &[0])?;
        io.write_words(self.base_addr + TAG, &[tag])?;
        io.write_words(self.base_addr + STATUS, &[IRQ_ENABLE_BIT | FG_MODE_BIT])?;
        Ok(())
    }

    /// Programs the first segment's coefficients, then sets the
    /// enable bit -- order matters (spec.md §4.F: "program
    /// coefficients, then set the enable bit").
    pub fn start(&mut self, io: &mut dyn ChannelIo, first: PolySegment) -> Result<(), Error> {
        self.write_coefficients(io, first)?;
        use addac_regs::*;
        io.write_words(self.base_addr + ENABLE, &[ENABLE_BIT])?;
        Ok(())
    }

    pub fn disable_irq(&mut self, io: &mut dyn ChannelIo) -> Result<(), Error> {
        io.write_words(self.base_addr + addac_regs::STATUS, &[0])
    }

    pub fn disable(&mut self, io: &mut dyn ChannelIo) -> Result<(), Error> {
        io.write_words(self.base_addr + addac_regs::ENABLE, &[0])
    }

    /// Writes the next segment's coefficients and the packed
    /// control-register bitfield, keeping the channel number in the
    /// control word the way `getFgControlRegValue` does (spec.md
    /// §4.F).
    pub fn feed_next(&mut self, io: &mut dyn ChannelIo, segment: PolySegment) -> Result<(), Error> {
        self.write_coefficients(io, segment)
    }

    fn write_coefficients(&mut self, io: &mut dyn ChannelIo, segment: PolySegment) -> Result<(), Error> {
        use addac_regs::*;
        let control = segment.control.hw_control_reg(self.channel_number) as u32;
        io.write_words(
            self.base_addr + COEFF_A,
            &[segment.coeff_a as u32, segment.coeff_b as u32, segment.coeff_c as u32, control],
        )
    }

    pub fn read_status(&mut self, io: &mut dyn ChannelIo) -> Result<ChannelStatus, Error> {
        use addac_regs::*;
        let mut words = [0u32; 2];
        io.read_words(self.base_addr + RAMP_COUNT, &mut words[0..1])?;
        io.read_words(self.base_addr + STATUS, &mut words[1..2])?;
        Ok(ChannelStatus { ramp_count: words[0], running: words[1] & STATUS_RUNNING_BIT != 0 })
    }
}

/// A `FG_MIL_REGISTER_T`-shaped register block transferred as a burst
/// to a MIL channel's task slot (spec.md §4.F, §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct MilRegisterBlock {
    pub coeff_a: i16,
    pub coeff_b: i16,
    pub coeff_c: i32,
    pub control: u16,
}

impl MilRegisterBlock {
    fn from_segment(segment: PolySegment, channel_number: u8) -> Self {
        Self {
            coeff_a: segment.coeff_a,
            coeff_b: segment.coeff_b,
            coeff_c: segment.coeff_c,
            control: segment.control.hw_control_reg(channel_number),
        }
    }

    fn to_words(self) -> [u32; 4] {
        [self.coeff_a as u32, self.coeff_b as u32, self.coeff_c as u32, self.control as u32]
    }
}

/// Serial-link FG channel reached through a task slot (spec.md §4.F
/// "MIL"). Has no on-device ramp counter; `scu-fg`'s engine increments
/// a software counter on every `feed_next`, tracked here as
/// `ramp_count`.
#[derive(Debug, Clone, Copy)]
pub struct MilChannel {
    pub task_slot: u8,
    pub channel_number: u8,
    ramp_count: u32,
    last_status: ChannelStatus,
}

impl MilChannel {
    pub fn new(task_slot: u8, channel_number: u8) -> Self {
        Self { task_slot, channel_number, ramp_count: 0, last_status: ChannelStatus::default() }
    }

    pub fn prepare(&mut self, _io: &mut dyn ChannelIo, _tag: u32) -> Result<(), Error> {
        self.ramp_count = 0;
        Ok(())
    }

    /// Transfers the register block as a burst, then a single final
    /// write of the control register (spec.md §4.F: "transferred as a
    /// burst followed by a single write of the final control
    /// register").
    pub fn start(&mut self, io: &mut dyn ChannelIo, first: PolySegment) -> Result<(), Error> {
        self.transfer(io, first)
    }

    pub fn disable_irq(&mut self, _io: &mut dyn ChannelIo) -> Result<(), Error> {
        Ok(())
    }

    pub fn disable(&mut self, _io: &mut dyn ChannelIo) -> Result<(), Error> {
        Ok(())
    }

    pub fn feed_next(&mut self, io: &mut dyn ChannelIo, segment: PolySegment) -> Result<(), Error> {
        self.transfer(io, segment)?;
        self.ramp_count += 1;
        Ok(())
    }

    fn transfer(&mut self, io: &mut dyn ChannelIo, segment: PolySegment) -> Result<(), Error> {
        let block = MilRegisterBlock::from_segment(segment, self.channel_number);
        let words = block.to_words();
        io.write_words(self.task_slot as u32, &words)?;
        io.write_words(self.task_slot as u32, &words[3..4])?;
        Ok(())
    }

    /// MIL channels have no hardware ramp counter; status comes from
    /// whatever the MIL FSM (`scu-mil`) last observed on this link and
    /// handed back here.
    pub fn read_status(&mut self, _io: &mut dyn ChannelIo) -> Result<ChannelStatus, Error> {
        Ok(ChannelStatus { ramp_count: self.ramp_count, running: self.last_status.running })
    }

    /// Called by the MIL FSM after it reads the link's status register
    /// for this channel (spec.md §4.H `FETCH_STATUS`/`HANDLE_IRQS`).
    pub fn set_running(&mut self, running: bool) {
        self.last_status.running = running;
    }
}

/// Tagged variant unifying both channel families behind one call
/// surface, matching spec.md's Design Notes verbatim: dispatch by
/// `match`, no dynamic cast.
#[derive(Debug, Clone, Copy)]
pub enum Channel {
    Addac(AddacChannel),
    Mil(MilChannel),
}

impl Channel {
    pub fn prepare(&mut self, io: &mut dyn ChannelIo, tag: u32) -> Result<(), Error> {
        match self {
            Channel::Addac(c) => c.prepare(io, tag),
            Channel::Mil(c) => c.prepare(io, tag),
        }
    }

    pub fn start(&mut self, io: &mut dyn ChannelIo, first: PolySegment) -> Result<(), Error> {
        match self {
            Channel::Addac(c) => c.start(io, first),
            Channel::Mil(c) => c.start(io, first),
        }
    }

    pub fn disable_irq(&mut self, io: &mut dyn ChannelIo) -> Result<(), Error> {
        match self {
            Channel::Addac(c) => c.disable_irq(io),
            Channel::Mil(c) => c.disable_irq(io),
        }
    }

    pub fn disable(&mut self, io: &mut dyn ChannelIo) -> Result<(), Error> {
        match self {
            Channel::Addac(c) => c.disable(io),
            Channel::Mil(c) => c.disable(io),
        }
    }

    pub fn feed_next(&mut self, io: &mut dyn ChannelIo, segment: PolySegment) -> Result<(), Error> {
        match self {
            Channel::Addac(c) => c.feed_next(io, segment),
            Channel::Mil(c) => c.feed_next(io, segment),
        }
    }

    pub fn read_status(&mut self, io: &mut dyn ChannelIo) -> Result<ChannelStatus, Error> {
        match self {
            Channel::Addac(c) => c.read_status(io),
            Channel::Mil(c) => c.read_status(io),
        }
    }

    /// Pass-through to `MilChannel::set_running` (spec.md §4.H: the MIL
    /// FSM calls this after reading a link's status register). A no-op
    /// for `Addac`, whose running state is read straight from hardware.
    pub fn set_mil_running(&mut self, running: bool) {
        if let Channel::Mil(c) = self {
            c.set_running(running);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_proto::poly::ControlWord;
    use std::collections::HashMap;

    struct FakeIo {
        regs: HashMap<u32, u32>,
    }

    impl ChannelIo for FakeIo {
        fn write_words(&mut self, key: u32, words: &[u32]) -> Result<(), Error> {
            for (i, w) in words.iter().enumerate() {
                self.regs.insert(key + i as u32 * 4, *w);
            }
            Ok(())
        }
        fn read_words(&mut self, key: u32, words: &mut [u32]) -> Result<(), Error> {
            for (i, slot) in words.iter_mut().enumerate() {
                *slot = *self.regs.get(&(key + i as u32 * 4)).unwrap_or(&0);
            }
            Ok(())
        }
    }

    fn segment() -> PolySegment {
        PolySegment { coeff_a: 100, coeff_b: 200, coeff_c: 300, control: ControlWord::new(1, 0, 0, 0) }
    }

    #[test]
    fn addac_start_programs_coefficients_then_enables() {
        let mut io = FakeIo { regs: HashMap::new() };
        let mut chan = AddacChannel::new(0x1000, 2);
        chan.prepare(&mut io, 0xaabb).unwrap();
        chan.start(&mut io, segment()).unwrap();
        assert_eq!(*io.regs.get(&(0x1000 + addac_regs::COEFF_A)).unwrap(), 100);
        assert_eq!(*io.regs.get(&(0x1000 + addac_regs::ENABLE)).unwrap(), addac_regs::ENABLE_BIT);
    }

    #[test]
    fn mil_channel_has_no_hardware_ramp_counter_software_tracks_it() {
        let mut io = FakeIo { regs: HashMap::new() };
        let mut chan = MilChannel::new(3, 1);
        chan.start(&mut io, segment()).unwrap();
        assert_eq!(chan.read_status(&mut io).unwrap().ramp_count, 0);
        chan.feed_next(&mut io, segment()).unwrap();
        assert_eq!(chan.read_status(&mut io).unwrap().ramp_count, 1);
    }

    #[test]
    fn channel_enum_dispatches_by_match() {
        let mut io = FakeIo { regs: HashMap::new() };
        let mut chan = Channel::Mil(MilChannel::new(4, 0));
        chan.prepare(&mut io, 0).unwrap();
        chan.feed_next(&mut io, segment()).unwrap();
        assert_eq!(chan.read_status(&mut io).unwrap().ramp_count, 1);
    }
}
