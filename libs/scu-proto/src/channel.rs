//! FG channel identification: `(socket, device)` address pairs and the
//! flat `channel` index used as an array key throughout the firmware.
//!
//! Grounded on `scu_fg_macros.h`/`scu_fg_handler.c`, which address a
//! function generator by a physical `slot` in `1..=MAX_SCU_SLAVES` plus
//! a sub-`device` index, and separately track a flat `channel` used to
//! index `g_aFgChannels[MAX_FG_CHANNELS]`.

/// Number of physical SCU bus slots (`scu_fg_handler.c`: "Slot number,
/// valid range 1 .. MAX_SCU_SLAVES (12)").
pub const MAX_SCU_SLAVES: u8 = 12;

/// Upper bound on flat channel indices. The original firmware's exact
/// array bound lives in a header this pack did not retain; 128 is
/// chosen generously to cover 12 ADDAC slots * 2 devices plus the MIL
/// channels multiplexed behind the SIO slots, and is documented as an
/// implementer decision in DESIGN.md rather than guessed at the
/// original's exact value.
pub const MAX_FG_CHANNELS: usize = 128;

/// Hardware family a socket belongs to, encoded as the top bit of
/// `socket` per spec.md §3 ("socket encodes both a physical bus slot
/// (1..12) and a family bit distinguishing ADDAC from MIL").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Addac,
    Mil,
}

/// `(bus-slot, family)` address of an FG device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Socket {
    pub slot: u8,
    pub family: Family,
}

const FAMILY_BIT: u8 = 0x80;

impl Socket {
    pub fn new(slot: u8, family: Family) -> Self {
        debug_assert!(slot >= 1 && slot <= MAX_SCU_SLAVES, "slot out of range");
        Self { slot, family }
    }

    /// Packs `(slot, family)` into the single byte the original wire
    /// format uses: low bits are the slot, the top bit is the family.
    pub fn encode(self) -> u8 {
        let family_bit = match self.family {
            Family::Addac => 0,
            Family::Mil => FAMILY_BIT,
        };
        (self.slot & !FAMILY_BIT) | family_bit
    }

    pub fn decode(raw: u8) -> Self {
        let family = if raw & FAMILY_BIT != 0 { Family::Mil } else { Family::Addac };
        Socket { slot: raw & !FAMILY_BIT, family }
    }
}

/// `(socket, device)` pair addressing one FG channel, plus its flat
/// array index. Invariant (spec.md §3): every flat channel has at most
/// one owning `(socket, device)` pair at any time; this is enforced by
/// the owning registry (`scu-fg::Engine`), not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub socket: Socket,
    pub device: u8,
    pub channel: u16,
}

/// Sentinel written into `macro_number` / `tag` fields for an
/// unassigned channel (`SCU_INVALID` in the original source).
pub const SCU_INVALID: u32 = 0xffff_ffff;

impl ChannelId {
    pub fn new(socket: Socket, device: u8, channel: u16) -> Self {
        Self { socket, device, channel }
    }

    /// Packs `(socket, device)` into the 32-bit `macro_number` field.
    pub fn macro_number(self) -> u32 {
        ((self.socket.encode() as u32) << 8) | self.device as u32
    }

    pub fn from_macro_number(macro_number: u32, channel: u16) -> Option<Self> {
        if macro_number == SCU_INVALID {
            return None;
        }
        let socket = Socket::decode(((macro_number >> 8) & 0xff) as u8);
        let device = (macro_number & 0xff) as u8;
        Some(Self { socket, device, channel })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_roundtrip() {
        for family in [Family::Addac, Family::Mil] {
            for slot in 1..=MAX_SCU_SLAVES {
                let s = Socket::new(slot, family);
                assert_eq!(Socket::decode(s.encode()), s);
            }
        }
    }

    #[test]
    fn macro_number_roundtrip() {
        let id = ChannelId::new(Socket::new(4, Family::Addac), 0, 7);
        let packed = id.macro_number();
        let back = ChannelId::from_macro_number(packed, 7).unwrap();
        assert_eq!(back.socket, id.socket);
        assert_eq!(back.device, id.device);
    }

    #[test]
    fn invalid_macro_number_is_unassigned() {
        assert!(ChannelId::from_macro_number(SCU_INVALID, 0).is_none());
    }
}
