//! The per-channel polynomial producer/consumer ring (spec.md §3: "a
//! producer/consumer ring of polynomial segments"). The host is the
//! producer; the FG engine is the consumer, popping one segment per
//! data-request IRQ.

use crate::Error;
use scu_bus::Bus;
use scu_proto::poly::PolySegment;
use scu_ring::RingAdmin;

/// Engine-side (consumer) handle onto one channel's segment ring. The
/// admin block (`capacity, start, end, was_read`) lives at `admin_addr`
/// in shared RAM; the segment payload lives at `payload_base`.
pub struct SegmentRing<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> SegmentRing<'b, B> {
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

    fn write_was_read(&mut self, was_read: u32) -> Result<(), Error> {
        self.bus.write_u32(self.admin_addr + 12, was_read)?;
        Ok(())
    }

    fn segment_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * PolySegment::WIRE_LEN as u32
    }

    /// Words currently available for the engine to consume (spec.md
    /// §4.G's `REFILL`/`STOP_EMPTY` decisions read this).
    pub fn available(&self) -> Result<u32, Error> {
        Ok(self.read_admin()?.unread())
    }

    /// Pops the oldest unconsumed segment, if any, acknowledging it
    /// immediately. Non-locking: spec.md §4.G allows a non-locking pop
    /// from IRQ context because the caller (the engine, driven
    /// single-threaded per channel from the dispatch loop) already
    /// proves no concurrent mutator races it; a locking variant for the
    /// preemptive RTOS port is `scu-fg`'s `rtos` feature's concern, not
    /// this crate's.
    pub fn pop(&mut self) -> Result<Option<PolySegment>, Error> {
        let ring = self.read_admin()?;
        if ring.unread() == 0 {
            return Ok(None);
        }
        let index = ring.read_index();
        let addr = self.segment_addr(&ring, index);
        let mut bytes = [0u8; PolySegment::WIRE_LEN];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = self.bus.read_u8(addr + i as u32)?;
        }
        self.write_was_read(ring.was_read + 1)?;
        Ok(Some(PolySegment::from_bytes(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_bus::SimBus;
    use scu_proto::poly::ControlWord;

    const ADMIN: u32 = 0;
    const PAYLOAD: u32 = 64;

    fn push_segment(bus: &mut SimBus, admin: u32, payload: u32, seg: PolySegment) {
        let capacity = bus.read_u32(admin).unwrap();
        let mut ring = RingAdmin {
            offset: payload,
            capacity,
            start: bus.read_u32(admin + 4).unwrap(),
            end: bus.read_u32(admin + 8).unwrap(),
            was_read: bus.read_u32(admin + 12).unwrap(),
        };
        ring.synchronize_read_index();
        let addr = payload + ring.slot(ring.end) * PolySegment::WIRE_LEN as u32;
        for (i, b) in seg.to_bytes().iter().enumerate() {
            bus.write_u8(addr + i as u32, *b).unwrap();
        }
        ring.publish(1);
        bus.write_u32(admin, ring.capacity).unwrap();
        bus.write_u32(admin + 4, ring.start).unwrap();
        bus.write_u32(admin + 8, ring.end).unwrap();
        bus.write_u32(admin + 12, ring.was_read).unwrap();
    }

    fn segment(c: i32) -> PolySegment {
        PolySegment { coeff_a: 1, coeff_b: 2, coeff_c: c, control: ControlWord::new(0, 0, 0, 0) }
    }

    #[test]
    fn pops_in_fifo_order_across_several_producer_pushes() {
        let mut bus = SimBus::new(4096);
        bus.write_u32(ADMIN, 4).unwrap(); // capacity = 4 segments
        push_segment(&mut bus, ADMIN, PAYLOAD, segment(100));
        push_segment(&mut bus, ADMIN, PAYLOAD, segment(110));
        push_segment(&mut bus, ADMIN, PAYLOAD, segment(120));

        let mut ring = SegmentRing::new(&mut bus, ADMIN, PAYLOAD);
        assert_eq!(ring.available().unwrap(), 3);
        assert_eq!(ring.pop().unwrap().unwrap().coeff_c, 100);
        assert_eq!(ring.pop().unwrap().unwrap().coeff_c, 110);
        assert_eq!(ring.available().unwrap(), 1);
        assert_eq!(ring.pop().unwrap().unwrap().coeff_c, 120);
        assert!(ring.pop().unwrap().is_none());
    }

    #[test]
    fn consumption_visible_before_producer_syncs() {
        let mut bus = SimBus::new(4096);
        bus.write_u32(ADMIN, 4).unwrap();
        push_segment(&mut bus, ADMIN, PAYLOAD, segment(1));
        {
            let mut ring = SegmentRing::new(&mut bus, ADMIN, PAYLOAD);
            ring.pop().unwrap();
            assert_eq!(ring.available().unwrap(), 0, "engine's own pending ack is reflected immediately");
        }
        // Host hasn't pushed again, so `start` is still stale, but a
        // fresh read still reports nothing unread.
        let mut ring = SegmentRing::new(&mut bus, ADMIN, PAYLOAD);
        assert_eq!(ring.available().unwrap(), 0);
    }
}
