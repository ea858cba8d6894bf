//! MIL-DAQ ring (spec.md §4.I "MIL-DAQ writing to shared RAM"): unlike
//! the ADDAC path, MIL samples arrive already paired as
//! `{timestamp, actValue, setValue, fgMacro}` tuples (spec.md §4.H
//! `FETCH_DATA`), so there is no separate pairing stage here.

use crate::Error;
use scu_bus::Bus;
use scu_proto::daq::MilDaqItem;
use scu_ring::RingAdmin;

pub struct MilDaqProducer<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> MilDaqProducer<'b, B> {
    pub fn format(bus: &'b mut B, admin_addr: u32, payload_base: u32, capacity_items: u32) -> Result<Self, Error> {
        let mut producer = Self { bus, admin_addr, payload_base };
        producer.write_admin(&RingAdmin::new(payload_base, capacity_items))?;
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

    fn item_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * MilDaqItem::WIRE_WORDS as u32 * 4
    }

    /// Pushes one item, per spec.md's firmware-side byte order (the
    /// 64-bit timestamp halves swapped so the host's automatic 32-bit
    /// word swap recovers it). Returns `false` without writing if full.
    pub fn push(&mut self, item: &MilDaqItem) -> Result<bool, Error> {
        let mut ring = self.read_admin()?;
        ring.synchronize_read_index();
        if ring.remaining_capacity() == 0 {
            return Ok(false);
        }
        let addr = self.item_addr(&ring, ring.end);
        for (i, word) in item.to_words_firmware().iter().enumerate() {
            self.bus.write_u32(addr + i as u32 * 4, *word)?;
        }
        ring.publish(1);
        self.write_admin(&ring)?;
        Ok(true)
    }
}

pub struct MilDaqConsumer<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> MilDaqConsumer<'b, B> {
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

    fn item_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * MilDaqItem::WIRE_WORDS as u32 * 4
    }

    pub fn pop(&mut self) -> Result<Option<MilDaqItem>, Error> {
        let ring = self.read_admin()?;
        if ring.was_read != 0 || ring.size() == 0 {
            return Ok(None);
        }
        let addr = self.item_addr(&ring, ring.start);
        let mut words = [0u32; MilDaqItem::WIRE_WORDS];
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.bus.read_u32(addr + i as u32 * 4)?;
        }
        self.write_was_read(1)?;
        Ok(Some(MilDaqItem::from_words_host(&words)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_bus::SimBus;

    const ADMIN: u32 = 0;
    const PAYLOAD: u32 = 64;

    #[test]
    fn push_then_pop_roundtrips() {
        let mut bus = SimBus::new(4096);
        let item = MilDaqItem { timestamp: 0x1122_3344_5566_7788, act_value: 10, set_value: 20, fg_macro: 1 };
        {
            let mut producer = MilDaqProducer::format(&mut bus, ADMIN, PAYLOAD, 4).unwrap();
            assert!(producer.push(&item).unwrap());
        }
        // host-side reader: producer wrote the firmware layout, but this
        // test runs as if the transport had already performed its
        // 32-bit word swap by reading with from_words_host semantics
        // applied to the same words -- exercised properly end-to-end in
        // scu_proto::daq's own roundtrip tests; here we only check the
        // ring mechanics push/pop correctly round one item through.
        let mut consumer = MilDaqConsumer::new(&mut bus, ADMIN, PAYLOAD);
        assert!(consumer.pop().unwrap().is_some());
        assert!(consumer.pop().unwrap().is_none(), "ring now empty");
    }

    #[test]
    fn full_ring_rejects_push() {
        let mut bus = SimBus::new(4096);
        let mut producer = MilDaqProducer::format(&mut bus, ADMIN, PAYLOAD, 1).unwrap();
        let item = MilDaqItem { timestamp: 1, act_value: 1, set_value: 1, fg_macro: 1 };
        assert!(producer.push(&item).unwrap());
        assert!(!producer.push(&item).unwrap());
    }
}
