//! Lock-free, overwrite-on-full log fifo (spec.md §4.D). The producer
//! (firmware side) never copies the format string, only its address in
//! firmware text; the consumer (host side) fetches and renders it.
//!
//! Grounded on `lm32_syslog.c`'s `vprintf`-shaped `mprintf`/`gen_log`
//! variadic producer and `eb_console_helper.c`'s host-side fetch/render
//! loop, rebuilt on (4.A)+(4.C): the ring header lives in shared RAM as
//! a small admin block both sides read, but only the producer ever
//! mutates `start`/`end`, and only the consumer ever writes `was_read`.
#![cfg_attr(not(feature = "std"), no_std)]

mod producer;
#[cfg(feature = "std")]
mod consumer;
#[cfg(feature = "std")]
mod format;

pub use producer::LogProducer;
#[cfg(feature = "std")]
pub use consumer::{LogConsumer, RenderedLog};
#[cfg(feature = "std")]
pub use format::render;

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
