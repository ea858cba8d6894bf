//! FG feedback administration (spec.md §4.K): the host-side consumer of
//! the two DAQ rings `scu-daq` fills, fusing ADDAC set/actual streams
//! and routing pre-paired MIL tuples to per-channel application
//! callbacks, throttled independently per stream.

mod administration;
mod throttle;

pub use administration::{FgFeedbackAdministration, FgFeedbackChannel, FgFeedbackDevice, ThrottleConfig};
pub use throttle::PairThrottle;

use scu_proto::channel::Socket;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("daq ring error: {0}")]
    Daq(#[from] scu_daq::Error),
    #[error("duplicate registration for fg_number {fg_number} on socket {socket:?}")]
    DuplicateRegistration { socket: Socket, fg_number: u16 },
}
