//! DAQ block descriptor (spec.md §3, §6). Fixed layout placed at the
//! tail of each DAQ block on the wire; DAQ ingest (scu-daq) moves it to
//! the head in RAM so consumers observe `descriptor || payload`.

use num_derive::{FromPrimitive, ToPrimitive};

/// Exactly one of these bits is set in a well-formed descriptor
/// (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum DaqMode {
    Continuous = 0,
    HiRes = 1,
    PostMortem = 2,
}

impl DaqMode {
    /// `true` for the long block-size class (spec.md §4.I).
    pub fn is_long(self) -> bool {
        matches!(self, DaqMode::HiRes | DaqMode::PostMortem)
    }
}

/// Short (continuous) block length in 16-bit words, before the
/// trailing descriptor (spec.md §6).
pub const SHORT_BLOCK_LEN: usize = 8;
/// Long (hi-res / post-mortem) block length in 16-bit words.
pub const LONG_BLOCK_LEN: usize = 512;

/// Wire layout (spec.md §6): `{control-bits, crc, sequence,
/// sample-time-us, timestamp-hi, timestamp-lo, slot|channel}`, each
/// field a 16-bit word except `sample-time-us` and the two timestamp
/// halves, which are 32 bits (two words each).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaqDescriptor {
    pub slot: u8,
    pub channel: u8,
    pub mode: DaqMode,
    pub sequence: u8,
    /// White Rabbit TAI nanoseconds of the first sample in the block.
    pub timestamp: u64,
    /// Sample spacing, microseconds.
    pub sample_time_us: u32,
    pub crc: u8,
}

impl DaqDescriptor {
    /// control-bits(1) + crc(1) + sequence(1) + sample-time-us(2) +
    /// timestamp-hi(2) + timestamp-lo(2) + slot|channel(1) = 10 words.
    pub const WIRE_WORDS: usize = 10;

    pub fn to_words(&self) -> [u16; Self::WIRE_WORDS] {
        let ts_hi = (self.timestamp >> 32) as u32;
        let ts_lo = self.timestamp as u32;
        [
            (self.mode as u16) << 8,
            self.crc as u16,
            self.sequence as u16,
            (self.sample_time_us >> 16) as u16,
            (self.sample_time_us & 0xffff) as u16,
            (ts_hi >> 16) as u16,
            (ts_hi & 0xffff) as u16,
            (ts_lo >> 16) as u16,
            (ts_lo & 0xffff) as u16,
            ((self.slot as u16) << 8) | self.channel as u16,
        ]
    }

    /// Decodes a descriptor from its on-wire words. Returns `None` if
    /// `mode` doesn't decode to a known value -- the framing-error
    /// path in spec.md §4.I step 3 invokes the error-descriptor hook
    /// and drops the block in that case.
    pub fn from_words(words: &[u16; Self::WIRE_WORDS]) -> Option<Self> {
        use num_traits::FromPrimitive;
        let mode = DaqMode::from_u16((words[0] >> 8) & 0xff)?;
        let crc = words[1] as u8;
        let sequence = words[2] as u8;
        let sample_time_us = ((words[3] as u32) << 16) | words[4] as u32;
        let ts_hi = ((words[5] as u32) << 16) | words[6] as u32;
        let ts_lo = ((words[7] as u32) << 16) | words[8] as u32;
        let timestamp = ((ts_hi as u64) << 32) | ts_lo as u64;
        let slot = (words[9] >> 8) as u8;
        let channel = (words[9] & 0xff) as u8;
        Some(Self { slot, channel, mode, sequence, timestamp, sample_time_us, crc })
    }
}

/// One MIL-DAQ sample as written into the MIL-DAQ ring (spec.md §4.I
/// "MIL-DAQ writing to shared RAM"), allocated via (4.B) under
/// `scu_mmu::tags::MIL_DAQ`. Unlike the ADDAC path, MIL channels
/// deliver pre-paired tuples directly -- there is no separate set/
/// actual fusion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilDaqItem {
    pub timestamp: u64,
    pub act_value: u32,
    pub set_value: u32,
    /// The `(socket, device)` pair packed as `ChannelId::macro_number`,
    /// or `SCU_INVALID` for a gap-read sample not attributable to a
    /// armed channel.
    pub fg_macro: u32,
}

impl MilDaqItem {
    pub const WIRE_WORDS: usize = 5;

    /// Firmware-side layout: the 64-bit `timestamp` as two consecutive
    /// big-endian 32-bit words (high half first), then `act_value`,
    /// `set_value`, `fg_macro`.
    pub fn to_words_firmware(&self) -> [u32; Self::WIRE_WORDS] {
        [
            (self.timestamp >> 32) as u32,
            self.timestamp as u32,
            self.act_value,
            self.set_value,
            self.fg_macro,
        ]
    }

    pub fn from_words_firmware(words: &[u32; Self::WIRE_WORDS]) -> Self {
        let timestamp = ((words[0] as u64) << 32) | words[1] as u64;
        Self { timestamp, act_value: words[2], set_value: words[3], fg_macro: words[4] }
    }

    /// Host-side view: firmware swaps the hi/lo halves of the 64-bit
    /// `timestamp` field before writing it, so that the transport's
    /// automatic 32-bit word swap (big-endian firmware -> little-endian
    /// host) recovers the correct 64-bit value on the host without the
    /// host needing any MIL-specific unswapping logic (spec.md §4.I).
    pub fn to_words_host(&self) -> [u32; Self::WIRE_WORDS] {
        [
            self.timestamp as u32,
            (self.timestamp >> 32) as u32,
            self.act_value,
            self.set_value,
            self.fg_macro,
        ]
    }

    pub fn from_words_host(words: &[u32; Self::WIRE_WORDS]) -> Self {
        let timestamp = ((words[1] as u64) << 32) | words[0] as u64;
        Self { timestamp, act_value: words[2], set_value: words[3], fg_macro: words[4] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mil_daq_item_firmware_roundtrip() {
        let item = MilDaqItem { timestamp: 0x0102_0304_0506_0708, act_value: 111, set_value: 222, fg_macro: 9 };
        assert_eq!(MilDaqItem::from_words_firmware(&item.to_words_firmware()), item);
    }

    #[test]
    fn mil_daq_item_host_roundtrip() {
        let item = MilDaqItem { timestamp: 0xdead_beef_0000_1111, act_value: 5, set_value: 6, fg_macro: 3 };
        assert_eq!(MilDaqItem::from_words_host(&item.to_words_host()), item);
    }

    #[test]
    fn descriptor_roundtrip() {
        let d = DaqDescriptor {
            slot: 4,
            channel: 1,
            mode: DaqMode::Continuous,
            sequence: 200,
            timestamp: 0x0102_0304_0506_0708,
            sample_time_us: 1_000_000,
            crc: 0x1f,
        };
        assert_eq!(DaqDescriptor::from_words(&d.to_words()), Some(d));
    }

    #[test]
    fn unknown_mode_rejected() {
        let mut words = [0u16; DaqDescriptor::WIRE_WORDS];
        words[0] = 0xff00; // invalid mode
        assert_eq!(DaqDescriptor::from_words(&words), None);
    }
}
