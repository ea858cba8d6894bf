//! Host-side bulk-RAM access (spec.md §4.J): the Linux-side mirror of
//! `scu-bus`/`scu-mmu`, reached over Etherbone instead of direct MMIO.
//! Exposes the same `Bus`/`Mmu` abstractions the firmware uses, plus
//! `Ddr3Access`/`SramAccess` for the burst-read path spec.md §4.J calls
//! out explicitly.

mod etherbone;
mod ram_access;

pub use etherbone::{connect, EtherboneBus};
pub use ram_access::{Ddr3Access, RamAccess, SramAccess, ITEM_BYTES};

pub use scu_mmu::{tags, Mmu, Status};

/// `scu_mmu::Mmu` parameterized over the live transport this crate
/// connects, so callers (`scu-feedback`, `scu-logd`, `scu-memmon`)
/// don't each have to spell out the same generic.
pub type HostMmu<'b> = Mmu<'b, EtherboneBus<std::net::TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bus error: {0:?}")]
    Bus(#[from] scu_bus::BusError),
    #[error("mmu error: {0:?}")]
    Mmu(#[from] scu_mmu::Error),
    #[error("unsupported front-end URL: {0} (expected tcp/host[:port] or dev/wbmN)")]
    UnsupportedUrl(String),
    #[error("could not connect to {0}: {1}")]
    Connect(String, String),
}
