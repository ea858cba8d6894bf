//! Cooperative MIL finite-state machine (spec.md §4.H): multiplexes up
//! to [`MAX_LINKS`] half-duplex serial links, each carrying up to
//! [`MAX_TASK_SLOTS`] channels, across one round-robin task loop or
//! interrupt tick.
//!
//! Grounded on `scu_mil_fg_handler.c`'s `milTask`/`mg_aMilTaskData[5]`:
//! a fixed array of per-link state records driven by a single
//! `milTask()` call per scheduler tick, with states named `ST_WAIT`,
//! `ST_POST_IRQ_WAITING` (compile-time optional, spec.md §9 Open
//! Question -- kept configurable, off by default here), `ST_FETCH_STATUS`,
//! `ST_HANDLE_IRQS`, `ST_FETCH_DATA`. [`MilLink`] is the explicit state
//! enum plus stateful driver spec.md's Design Notes ask for: each
//! `tick()` call advances at most one state, and all side effects
//! (status requests, IRQ acks, sample reads) go through the
//! [`MilTransport`] trait so the transition logic stays host/firmware
//! agnostic and testable against a fake transport.
#![cfg_attr(not(feature = "std"), no_std)]

mod fsm;
mod tasks;

pub use fsm::{
    ChannelIrqStatus, ChannelRecord, LinkState, MilLink, MilTransport, MIL_FSM_TIMEOUT, POST_IRQ_WAITING_NS,
};
pub use tasks::{TaskSlotTable, MAX_CHANNELS_PER_LINK, MAX_LINKS, MAX_TASK_SLOTS};

/// Hardware error codes a MIL task response can carry (spec.md §4.H
/// "Failure handling", §7). Grounded on `scu_mil.c`'s return-code
/// macros (`RCV_TIMEOUT`, `RCV_PARITY`, `RCV_ERROR`, `TRM_NOT_FREE`,
/// `RCV_TASK_BSY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilError {
    RcvTimeout,
    RcvParity,
    RcvError,
    TrmNotFree,
    /// Device busy: not a hard failure. The FSM stays in its current
    /// state and increments a timeout counter (spec.md §4.H
    /// `FETCH_STATUS`).
    RcvTaskBsy,
}

impl MilError {
    /// `true` for errors that skip only the offending channel, not the
    /// whole link (spec.md §7: "other hardware errors cause the
    /// channel ... to be skipped for this round").
    pub fn skips_channel_only(self) -> bool {
        !matches!(self, MilError::RcvTaskBsy)
    }
}

impl core::fmt::Display for MilError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MilError::RcvTimeout => write!(f, "MIL receive timeout"),
            MilError::RcvParity => write!(f, "MIL receive parity error"),
            MilError::RcvError => write!(f, "MIL receive error"),
            MilError::TrmNotFree => write!(f, "MIL transmitter not free"),
            MilError::RcvTaskBsy => write!(f, "MIL task busy"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MilError {}
