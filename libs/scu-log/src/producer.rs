use crate::Error;
use scu_bus::Bus;
use scu_proto::log::{LogRecord, LOG_PARAM_COUNT};
use scu_ring::RingAdmin;

/// Firmware-side producer. The ring admin block (`capacity, start, end,
/// was_read`, four words) lives at `admin_addr`; the record payload
/// ring lives at `payload_base`. Only this producer ever writes
/// `start`/`end`; only the consumer ever writes `was_read`.
pub struct LogProducer<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> LogProducer<'b, B> {
    /// Formats a fresh, empty ring at `admin_addr`/`payload_base` with
    /// room for `capacity_records` entries.
    pub fn format(bus: &'b mut B, admin_addr: u32, payload_base: u32, capacity_records: u32) -> Result<Self, Error> {
        let mut producer = Self { bus, admin_addr, payload_base };
        producer.write_admin(&RingAdmin::new(payload_base, capacity_records))?;
        Ok(producer)
    }

    /// Attaches to an already-formatted ring (e.g. after a firmware
    /// restart, where the fifo's contents are allowed to persist).
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

    fn record_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * LogRecord::WIRE_WORDS as u32 * 4
    }

    /// Pushes one log record. The caller is expected to already hold
    /// the producer-side critical section (spec.md §4.D: "a critical
    /// section ensures atomicity of the read admin, compute, write
    /// record, publish sequence") -- this crate does not itself touch
    /// interrupts, so callers compose it with
    /// `scu_irq::CriticalSectionCounter` at the call site, the same way
    /// `scu-bus`'s zycle lock composes rather than owning the gate.
    ///
    /// If the ring has no free slot, the oldest unacknowledged record
    /// is dropped first (spec.md's overflow policy), independent of
    /// whatever the consumer has or hasn't acknowledged yet.
    pub fn log(
        &mut self,
        timestamp: u64,
        filter: u32,
        format_addr: u32,
        params: [u32; LOG_PARAM_COUNT],
    ) -> Result<(), Error> {
        let mut ring = self.read_admin()?;
        ring.synchronize_read_index();
        if ring.remaining_capacity() == 0 {
            ring.add_to_read_index(1);
        }
        let record = LogRecord { timestamp, filter, format_addr, params };
        let addr = self.record_addr(&ring, ring.end);
        for (i, word) in record.to_words().iter().enumerate() {
            self.bus.write_u32(addr + i as u32 * 4, *word)?;
        }
        ring.publish(1);
        self.write_admin(&ring)?;
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use scu_bus::SimBus;

    const ADMIN: u32 = 0;
    const PAYLOAD: u32 = 64;

    #[test]
    fn pushes_record_and_advances_end() {
        let mut bus = SimBus::new(4096);
        let mut producer = LogProducer::format(&mut bus, ADMIN, PAYLOAD, 4).unwrap();
        producer.log(1000, 1, 0x4000_0100, [42, 0, 0, 0]).unwrap();
        let ring = producer.read_admin().unwrap();
        assert_eq!(ring.size(), 1);
    }

    #[test]
    fn overflow_drops_oldest_before_appending() {
        let mut bus = SimBus::new(4096);
        let mut producer = LogProducer::format(&mut bus, ADMIN, PAYLOAD, 2).unwrap();
        producer.log(1, 0, 0, [0; 4]).unwrap();
        producer.log(2, 0, 0, [0; 4]).unwrap();
        assert!(producer.read_admin().unwrap().is_full());
        producer.log(3, 0, 0, [0; 4]).unwrap();
        let ring = producer.read_admin().unwrap();
        assert_eq!(ring.size(), 2, "ring stays at capacity, not beyond");
    }
}
