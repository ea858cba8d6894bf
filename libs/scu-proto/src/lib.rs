//! Wire types shared between the SCU front-end firmware and the Linux
//! host tools that talk to it over Etherbone. Every type in this crate
//! is `no_std` and defines its on-wire shape explicitly via
//! `to_words`/`from_words` rather than relying on native struct layout,
//! since the firmware is big-endian and the host is little-endian.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod command;
pub mod daq;
pub mod log;
pub mod mmu;
pub mod poly;
pub mod signal;

pub use channel::{ChannelId, Family, Socket, MAX_FG_CHANNELS, MAX_SCU_SLAVES};
pub use command::Command;
pub use daq::{DaqDescriptor, DaqMode};
pub use log::{LogRecord, LOG_PARAM_COUNT};
pub use mmu::MmuEntry;
pub use poly::{ControlWord, PolySegment};
pub use signal::Signal;
