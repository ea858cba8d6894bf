//! FG signal mailbox payloads (spec.md §3, §6: "Mailbox signals to
//! host"). Grounded on `scu_fg_macros.h`'s `sendSignal(SIGNAL_T sig,
//! channel)` and the `IRQ_DAT_*` constants it writes to the per-channel
//! mailbox slot.

use num_derive::{FromPrimitive, ToPrimitive};

/// One signal, emitted exactly once per matching condition (spec.md
/// §3). `Refill` is emitted when the per-channel producer ring drops
/// to the fixed low-water mark (spec.md §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum Signal {
    Armed = 0,
    Refill = 1,
    Start = 2,
    StopEmpty = 3,
    StopNotEmpty = 4,
    Disarmed = 5,
}
