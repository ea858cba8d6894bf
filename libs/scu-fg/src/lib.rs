//! Hardware-channel abstraction and per-channel FG execution engine
//! (spec.md §4.F, §4.G).
//!
//! Grounded on spec.md's own Design Notes for the `Channel` tagged
//! variant, and on `scu_fg_macros.h`/`scu_fg_handler.c` for the
//! ADDAC/MIL register shapes and the `UNARMED/ARMED/ACTIVE/STOPPED`
//! state machine. `scu-bus` supplies the `Bus` trait both the segment
//! ring and (indirectly, through `ChannelIo` implementors built in
//! `scu-mil` and the firmware binary) the hardware register access go
//! through.
#![cfg_attr(not(feature = "std"), no_std)]

mod channel;
mod engine;
mod segment_ring;

pub use channel::{
    AddacChannel, Channel, ChannelIo, ChannelStatus, MilChannel, MilRegisterBlock,
};
pub use engine::{EngineChannel, State, DEFAULT_REFILL_THRESHOLD, DEFAULT_TIMEOUT_NS};
pub use segment_ring::SegmentRing;

use scu_bus::BusError;

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
