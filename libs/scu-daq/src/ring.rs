//! ADDAC DAQ ring: producer (firmware, ingest side) and consumer (host,
//! feedback administration side) sharing one `RingAdmin` the same way
//! `scu-log`'s producer/consumer pair does (spec.md §4.C), except each
//! ring slot holds a fixed-size descriptor+payload block instead of a
//! single log record.
//!
//! Slots are sized for the long block class so either block size fits
//! without the ring needing variable-length slot addressing; short
//! blocks simply leave the tail of their slot unused. This trades a
//! little RAM for a simpler, off-by-one-free ring than the original's
//! tightly packed variable-length layout (documented in DESIGN.md).

use crate::Error;
use scu_bus::Bus;
use scu_proto::daq::{DaqDescriptor, DaqMode, LONG_BLOCK_LEN, SHORT_BLOCK_LEN};
use scu_ring::RingAdmin;

const SLOT_LEN_WORDS: usize = LONG_BLOCK_LEN + DaqDescriptor::WIRE_WORDS;

/// One ingested DAQ block: descriptor moved to the head (spec.md §4.I
/// "Framing"), payload words following, `payload_len` telling consumers
/// how many of `payload` are live (`SHORT_BLOCK_LEN` or
/// `LONG_BLOCK_LEN`).
#[derive(Debug, Clone, Copy)]
pub struct DaqBlock {
    pub descriptor: DaqDescriptor,
    pub payload: [u16; LONG_BLOCK_LEN],
    pub payload_len: usize,
}

impl DaqBlock {
    pub fn samples(&self) -> &[u16] {
        &self.payload[..self.payload_len]
    }
}

fn payload_len_for(mode: DaqMode) -> usize {
    if mode.is_long() {
        LONG_BLOCK_LEN
    } else {
        SHORT_BLOCK_LEN
    }
}

pub struct DaqRingProducer<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> DaqRingProducer<'b, B> {
    pub fn format(bus: &'b mut B, admin_addr: u32, payload_base: u32, capacity_blocks: u32) -> Result<Self, Error> {
        let mut producer = Self { bus, admin_addr, payload_base };
        producer.write_admin(&RingAdmin::new(payload_base, capacity_blocks))?;
        Ok(producer)
    }

    pub fn attach(bus: &'b mut B, admin_addr: u32, payload_base: u32) -> Self {
        Self { bus, admin_addr, payload_base }
    }

    fn read_admin(&self) -> Result<RingAdmin, Error> {
        let capacity = self.bus.read_u32(self.admin_addr)?;
        let start = self.bus.read_u32(self.admin_addr + 4)?;
        let end = self.bus.read_u32(self.admin_addr + 8)?;
        let was_read = self.bus.read_u32(self.admin_addr + 12)?;
        Ok(RingAdmin { offset: self.payload_base, capacity, start, end, was_read })
    }

    fn write_admin(&mut self, ring: &RingAdmin) -> Result<(), Error> {
        self.bus.write_u32(self.admin_addr, ring.capacity)?;
        self.bus.write_u32(self.admin_addr + 4, ring.start)?;
        self.bus.write_u32(self.admin_addr + 8, ring.end)?;
        self.bus.write_u32(self.admin_addr + 12, ring.was_read)?;
        Ok(())
    }

    fn slot_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * SLOT_LEN_WORDS as u32 * 2
    }

    /// Pushes one block (spec.md §4.I step 5: "push to the consumer
    /// ring; acknowledge via `was_read`"). Returns `false` without
    /// writing anything if the ring is full -- the caller invokes
    /// `IngestHooks::on_fifo_alarm` in that case (spec.md §7).
    pub fn push(&mut self, block: &DaqBlock) -> Result<bool, Error> {
        let mut ring = self.read_admin()?;
        ring.synchronize_read_index();
        if ring.remaining_capacity() == 0 {
            return Ok(false);
        }
        let addr = self.slot_addr(&ring, ring.end);
        for (i, word) in block.descriptor.to_words().iter().enumerate() {
            self.bus.write_u16(addr + i as u32 * 2, *word)?;
        }
        let descriptor_bytes = DaqDescriptor::WIRE_WORDS as u32 * 2;
        for (i, word) in block.samples().iter().enumerate() {
            self.bus.write_u16(addr + descriptor_bytes + i as u32 * 2, *word)?;
        }
        ring.publish(1);
        self.write_admin(&ring)?;
        Ok(true)
    }
}

pub struct DaqRingConsumer<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> DaqRingConsumer<'b, B> {
    pub fn new(bus: &'b mut B, admin_addr: u32, payload_base: u32) -> Self {
        Self { bus, admin_addr, payload_base }
    }

    fn read_admin(&self) -> Result<RingAdmin, Error> {
        let capacity = self.bus.read_u32(self.admin_addr)?;
        let start = self.bus.read_u32(self.admin_addr + 4)?;
        let end = self.bus.read_u32(self.admin_addr + 8)?;
        let was_read = self.bus.read_u32(self.admin_addr + 12)?;
        Ok(RingAdmin { offset: self.payload_base, capacity, start, end, was_read })
    }

    fn write_was_read(&mut self, n: u32) -> Result<(), Error> {
        self.bus.write_u32(self.admin_addr + 12, n)
    }

    fn slot_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * SLOT_LEN_WORDS as u32 * 2
    }

    /// Pops the oldest unread block, or `None` if the ring is empty or
    /// the producer has not yet folded back a previous acknowledgement
    /// (same "no new data until synced" rule `scu-log`'s consumer uses).
    pub fn pop(&mut self) -> Result<Option<DaqBlock>, Error> {
        let ring = self.read_admin()?;
        if ring.was_read != 0 || ring.size() == 0 {
            return Ok(None);
        }
        let addr = self.slot_addr(&ring, ring.start);
        let mut descriptor_words = [0u16; DaqDescriptor::WIRE_WORDS];
        for (i, slot) in descriptor_words.iter_mut().enumerate() {
            *slot = self.bus.read_u16(addr + i as u32 * 2)?;
        }
        let descriptor = DaqDescriptor::from_words(&descriptor_words).ok_or(Error::Bus(scu_bus::BusError::OutOfRange))?;
        let payload_len = payload_len_for(descriptor.mode);
        let descriptor_bytes = DaqDescriptor::WIRE_WORDS as u32 * 2;
        let mut payload = [0u16; LONG_BLOCK_LEN];
        for i in 0..payload_len {
            payload[i] = self.bus.read_u16(addr + descriptor_bytes + i as u32 * 2)?;
        }
        self.write_was_read(1)?;
        Ok(Some(DaqBlock { descriptor, payload, payload_len }))
    }
}
