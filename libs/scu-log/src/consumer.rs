use crate::format::render;
use crate::Error;
use scu_bus::Bus;
use scu_proto::log::LogRecord;
use scu_ring::RingAdmin;

/// One pulled-and-rendered log line, ready for the log daemon (4.L) to
/// filter, timestamp-convert, and write out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLog {
    pub timestamp: u64,
    pub filter: u32,
    pub text: String,
}

/// Host-side consumer (spec.md §4.D). Shares the same admin block and
/// payload ring `LogProducer` writes; only ever writes the `was_read`
/// cell.
pub struct LogConsumer<'b, B: Bus> {
    bus: &'b mut B,
    admin_addr: u32,
    payload_base: u32,
}

impl<'b, B: Bus> LogConsumer<'b, B> {
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
        self.bus.write_u32(self.admin_addr + 12, n)?;
        Ok(())
    }

    fn record_addr(&self, ring: &RingAdmin, index: u32) -> u32 {
        self.payload_base + ring.slot(index) * LogRecord::WIRE_WORDS as u32 * 4
    }

    /// Reads up to `max_items` records in one pass, releases the slots
    /// by writing `was_read`, and renders each record's format string.
    /// Per spec.md §4.D: if `was_read != 0` already, the producer has
    /// not caught up with the previous batch yet, so no new records are
    /// reported this call.
    pub fn pull(&mut self, max_items: usize) -> Result<Vec<RenderedLog>, Error> {
        let ring = self.read_admin()?;
        if ring.was_read != 0 {
            return Ok(Vec::new());
        }
        let available = ring.size().min(max_items as u32);
        let mut out = Vec::with_capacity(available as usize);
        for i in 0..available {
            let addr = self.record_addr(&ring, ring.start + i);
            let mut words = [0u32; LogRecord::WIRE_WORDS];
            for (j, slot) in words.iter_mut().enumerate() {
                *slot = self.bus.read_u32(addr + j as u32 * 4)?;
            }
            let record = LogRecord::from_words(&words);
            let format = read_cstr(self.bus, record.format_addr, 256)?;
            let text =
                render(&format, &record.params, |param_addr| read_cstr(self.bus, param_addr, 256).unwrap_or_default());
            out.push(RenderedLog { timestamp: record.timestamp, filter: record.filter, text });
        }
        self.write_was_read(available)?;
        Ok(out)
    }
}

/// Fetches a NUL-terminated ASCII string from firmware code/RAM memory
/// by address (spec.md §3: "format is a NUL-terminated ASCII string
/// reachable from format_addr"). Also used for `%s`/`%S` parameters,
/// which spec.md §4.D likewise treats as addresses.
pub fn read_cstr<B: Bus>(bus: &B, addr: u32, max_len: usize) -> Result<String, Error> {
    let mut s = String::new();
    for i in 0..max_len as u32 {
        let byte = bus.read_u8(addr + i)?;
        if byte == 0 {
            break;
        }
        s.push(byte as char);
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_bus::SimBus;

    const ADMIN: u32 = 0;
    const PAYLOAD: u32 = 64;
    const STR_TABLE: u32 = 4096;

    fn write_cstr(bus: &mut SimBus, addr: u32, s: &str) {
        for (i, b) in s.bytes().enumerate() {
            bus.write_u8(addr + i as u32, b).unwrap();
        }
        bus.write_u8(addr + s.len() as u32, 0).unwrap();
    }

    #[test]
    fn pulls_and_renders_one_record() {
        let mut bus = SimBus::new(8192);
        write_cstr(&mut bus, STR_TABLE, "%d %s");
        write_cstr(&mut bus, STR_TABLE + 64, "x");

        {
            let mut producer = crate::LogProducer::format(&mut bus, ADMIN, PAYLOAD, 4).unwrap();
            producer.log(123, 1, STR_TABLE, [42, STR_TABLE + 64, 0, 0]).unwrap();
        }

        let mut consumer = LogConsumer::new(&mut bus, ADMIN, PAYLOAD);
        let pulled = consumer.pull(8).unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].text, "42 x");
        assert_eq!(pulled[0].timestamp, 123);
    }

    #[test]
    fn no_new_records_while_was_read_unacknowledged() {
        let mut bus = SimBus::new(8192);
        {
            let mut producer = crate::LogProducer::format(&mut bus, ADMIN, PAYLOAD, 4).unwrap();
            producer.log(1, 0, STR_TABLE, [0; 4]).unwrap();
        }
        bus.write_u32(ADMIN + 12, 1).unwrap(); // simulate an in-flight, unsynced ack
        let mut consumer = LogConsumer::new(&mut bus, ADMIN, PAYLOAD);
        assert!(consumer.pull(8).unwrap().is_empty());
    }
}
