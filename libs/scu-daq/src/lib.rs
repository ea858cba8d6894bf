//! DAQ block ingest (spec.md §4.I): frames fixed-size descriptor+payload
//! blocks off the firmware-side hardware fifo into shared-RAM rings,
//! checking descriptor integrity and sequence continuity on the way in,
//! then fuses ADDAC set/actual streams into timestamped tuples.
//!
//! Grounded on `daq_ramBuffer_lm32.c`'s two-phase read ("fetch the short
//! window, then the remainder for long blocks") and on
//! `scu_fg_feedback.cpp`'s sequence/timestamp pairing windows. The ring
//! storage itself reuses `scu-ring`'s `RingAdmin` and `scu-log`'s
//! producer/consumer split (only the producer writes `start`/`end`,
//! only the consumer writes `was_read`).
#![cfg_attr(not(feature = "std"), no_std)]

mod crc5;
mod ingest;
mod mil_ring;
mod pairing;
mod registry;
mod ring;

pub use crc5::compute_crc5;
pub use ingest::{DaqFifo, Ingest, IngestHooks};
pub use mil_ring::{MilDaqConsumer, MilDaqProducer};
pub use pairing::{AddacPairing, PairingHooks, PairingPolicy};
pub use registry::{DeviceRegistry, MAX_CHANNELS_PER_DEVICE};
pub use ring::{DaqBlock, DaqRingConsumer, DaqRingProducer};

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
