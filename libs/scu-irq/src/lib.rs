//! Interrupt dispatcher and nested critical sections (spec.md §4.E).
//!
//! Grounded on `kernel/src/irq.rs`'s IRQ table (`IRQ_HANDLERS: [Option<
//! (PID, fn, arg)>; 32]`, dispatched by scanning set bits and masking
//! off any bit with no registered handler to prevent livelock) and on
//! `services/llio/src/llio_hw.rs`'s per-source handlers
//! (`fn handle_event_irq(_irq_no: usize, arg: *mut usize)`), which take
//! a raw context pointer cast back to the owning struct -- the same
//! shape this crate's `IrqHandlerFn` uses, generalized to a
//! `no_std`, non-scheduler-owned dispatcher.
#![cfg_attr(not(feature = "std"), no_std)]

mod critical_section;
mod dispatcher;

pub use critical_section::{CriticalSectionCounter, InterruptGate};
pub use dispatcher::{Dispatcher, Error, InterruptController, IrqHandlerFn, MAX_IRQ};
