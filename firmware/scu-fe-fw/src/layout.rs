//! Flat 32-bit address-space layout (spec.md §6: "visible to host as a
//! flat 32-bit address space"). None of these offsets come from the
//! retrieved pack -- the original SCU bus memory map lives in headers
//! this pack does not carry -- so every constant here is this crate's
//! own implementer decision, recorded in DESIGN.md rather than guessed
//! at the original's exact values.
//!
//! Two address ranges are threaded through [`crate::ctx::FirmwareCtx`]
//! as two independent [`scu_bus::Bus`] handles: `regs` (the per-channel
//! register file, the host mailbox, and per-channel signal slots) and
//! `ram` (bulk RAM: the MMU directory, the DAQ rings, the log ring, and
//! the per-channel segment rings). Keeping them on separate handles
//! lets [`scu_fg::EngineChannel::on_irq`] borrow its `io` (the channel's
//! register block) and its `bus` (the segment ring) independently,
//! rather than forcing two live `&mut` borrows of one object.

use scu_proto::channel::MAX_FG_CHANNELS;

/// Single 32-bit host->firmware command word (spec.md §6).
pub const MAILBOX_ADDR: u32 = 0x0000_0000;

/// Per-channel control block: `{macro_number, tag, armed_by_host,
/// mailbox_signal}`, four words. The host writes `macro_number` and
/// `tag` (and optionally `armed_by_host`) before issuing `ENABLE`
/// (spec.md §3: "created when host writes a macro_number into a free
/// slot"); the firmware writes `mailbox_signal` back on every emitted
/// `Signal` (spec.md §4.G).
pub const CHANNEL_CTRL_BASE: u32 = 0x0000_1000;
pub const CHANNEL_CTRL_STRIDE: u32 = 16;
pub const CHANNEL_CTRL_MACRO_OFFSET: u32 = 0;
pub const CHANNEL_CTRL_TAG_OFFSET: u32 = 4;
pub const CHANNEL_CTRL_ARMED_BY_HOST_OFFSET: u32 = 8;
pub const CHANNEL_CTRL_SIGNAL_OFFSET: u32 = 12;

pub fn channel_ctrl_addr(channel: usize) -> u32 {
    CHANNEL_CTRL_BASE + channel as u32 * CHANNEL_CTRL_STRIDE
}

/// ADDAC per-channel hardware register block (spec.md §4.F); indexed by
/// the same flat channel number as the control block above.
pub const ADDAC_REGS_BASE: u32 = 0x0008_0000;
pub const ADDAC_REGS_STRIDE: u32 = 0x40;

pub fn addac_base_addr(channel: usize) -> u32 {
    ADDAC_REGS_BASE + channel as u32 * ADDAC_REGS_STRIDE
}

/// Per-channel segment producer/consumer ring (spec.md §3, §4.C): one
/// admin block (16 bytes) plus a payload region sized for
/// [`SEGMENT_RING_CAPACITY`] wire-sized segments, per flat channel.
pub const SEGMENT_RING_ADMIN_BASE: u32 = 0x0010_0000;
pub const SEGMENT_RING_ADMIN_STRIDE: u32 = 16;
pub const SEGMENT_RING_PAYLOAD_BASE: u32 = 0x0018_0000;
pub const SEGMENT_RING_CAPACITY: u32 = 16;
pub const SEGMENT_RING_PAYLOAD_STRIDE: u32 = SEGMENT_RING_CAPACITY * scu_proto::poly::PolySegment::WIRE_LEN as u32;

pub fn segment_ring_admin_addr(channel: usize) -> u32 {
    SEGMENT_RING_ADMIN_BASE + channel as u32 * SEGMENT_RING_ADMIN_STRIDE
}

pub fn segment_ring_payload_addr(channel: usize) -> u32 {
    SEGMENT_RING_PAYLOAD_BASE + channel as u32 * SEGMENT_RING_PAYLOAD_STRIDE
}

const _: () = assert!(MAX_FG_CHANNELS > 0);

/// Bulk-RAM base the MMU directory is anchored at (spec.md §4.B).
/// `scu_mmu::Mmu` is word-granular throughout (`capacity_words`,
/// `start_index`, `length` are all 32-bit-word counts); this crate
/// converts to a byte address only at the point it hands an offset to
/// a `Bus` call (`BULK_RAM_BASE + word_index * 4`).
pub const BULK_RAM_BASE: u32 = 0x1000_0000;
pub const MMU_CAPACITY_WORDS: u32 = 1 << 20; // 4 MiB of bulk RAM

/// Fixed slot counts, rather than MMU-driven sizing, for the two DAQ
/// rings and the log ring -- the MMU directory still tracks each under
/// its well-known tag (`scu_mmu::tags`) so a host reattaching after a
/// restart discovers the same offsets (spec.md §8 scenario 3); the
/// capacities themselves are this crate's implementer choice.
pub const ADDAC_DAQ_CAPACITY_BLOCKS: u32 = 256;
pub const MIL_DAQ_CAPACITY_ITEMS: u32 = 256;
pub const LOG_CAPACITY_RECORDS: u32 = 256;

/// Word length `FirmwareCtx::init` requests from `scu_mmu::Mmu::allocate`
/// for each well-known tag: a 4-word admin header immediately followed
/// by its payload ring, sized from the same public wire constants the
/// ring producer/consumer pair uses, so the MMU-tracked region always
/// matches what gets formatted into it.
const RING_ADMIN_WORDS: u32 = 4;

pub fn addac_ring_length_words() -> u32 {
    let slot_halfwords = (scu_proto::daq::LONG_BLOCK_LEN + scu_proto::daq::DaqDescriptor::WIRE_WORDS) as u32;
    debug_assert_eq!(slot_halfwords % 2, 0, "slot size must pack evenly into 32-bit words");
    RING_ADMIN_WORDS + ADDAC_DAQ_CAPACITY_BLOCKS * (slot_halfwords / 2)
}

pub fn mil_ring_length_words() -> u32 {
    RING_ADMIN_WORDS + MIL_DAQ_CAPACITY_ITEMS * scu_proto::daq::MilDaqItem::WIRE_WORDS as u32
}

pub fn log_ring_length_words() -> u32 {
    RING_ADMIN_WORDS + LOG_CAPACITY_RECORDS * scu_proto::log::LogRecord::WIRE_WORDS as u32
}
