//! Host-to-firmware mailbox commands (spec.md §6). Numeric codes are
//! an implementation choice stable within a firmware build, as spec.md
//! allows.

use num_derive::{FromPrimitive, ToPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum Subsystem {
    Mil = 0,
    Addac = 1,
    Log = 2,
}

/// One mailbox command, carried as `(opcode, channel_or_arg)` in the
/// single 32-bit host mailbox slot (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable { channel: u16 },
    Disable { channel: u16 },
    Reset { subsystem: Subsystem },
    MilGapInterval { ms: u16 },
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
enum Opcode {
    Enable = 0,
    Disable = 1,
    Reset = 2,
    MilGapInterval = 3,
    Scan = 4,
}

impl Command {
    /// Packs into the single mailbox word: top byte opcode, next byte
    /// subsystem (Reset only), low 16 bits channel/arg.
    pub fn encode(self) -> u32 {
        use num_traits::ToPrimitive;
        match self {
            Command::Enable { channel } => (Opcode::Enable.to_u32().unwrap() << 24) | channel as u32,
            Command::Disable { channel } => (Opcode::Disable.to_u32().unwrap() << 24) | channel as u32,
            Command::Reset { subsystem } => {
                (Opcode::Reset.to_u32().unwrap() << 24) | (subsystem.to_u32().unwrap() << 16)
            }
            Command::MilGapInterval { ms } => (Opcode::MilGapInterval.to_u32().unwrap() << 24) | ms as u32,
            Command::Scan => Opcode::Scan.to_u32().unwrap() << 24,
        }
    }

    pub fn decode(word: u32) -> Option<Self> {
        use num_traits::FromPrimitive;
        let opcode = Opcode::from_u32(word >> 24)?;
        let low16 = (word & 0xffff) as u16;
        Some(match opcode {
            Opcode::Enable => Command::Enable { channel: low16 },
            Opcode::Disable => Command::Disable { channel: low16 },
            Opcode::Reset => Command::Reset { subsystem: Subsystem::from_u32((word >> 16) & 0xff)? },
            Opcode::MilGapInterval => Command::MilGapInterval { ms: low16 },
            Opcode::Scan => Command::Scan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_variants() {
        let cmds = [
            Command::Enable { channel: 7 },
            Command::Disable { channel: 42 },
            Command::Reset { subsystem: Subsystem::Mil },
            Command::MilGapInterval { ms: 500 },
            Command::Scan,
        ];
        for c in cmds {
            assert_eq!(Command::decode(c.encode()), Some(c));
        }
    }
}
