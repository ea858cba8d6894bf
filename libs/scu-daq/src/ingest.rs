//! Block ingest pipeline (spec.md §4.I "Read procedure"): pulls one
//! block off the hardware fifo, verifies its descriptor, checks
//! sequence continuity, and pushes it into the destination ring.
//!
//! Grounded on `daq_ramBuffer_lm32.c`'s `ramBufferAppendDaqData`: read
//! the block's fixed word count for its configured mode, move the
//! trailing descriptor to the front, validate, then copy into the
//! shared ring.

use crate::registry::{DeviceRegistry, MAX_CHANNELS_PER_DEVICE};
use crate::ring::{DaqBlock, DaqRingProducer};
use crate::{crc5, Error};
use scu_bus::Bus;
use scu_proto::channel::MAX_SCU_SLAVES;
use scu_proto::daq::{DaqDescriptor, DaqMode, LONG_BLOCK_LEN, SHORT_BLOCK_LEN};

/// The hardware fifo surface ingest reads from. Block length class is
/// known ahead of the read (each DAQ channel is statically configured
/// continuous/hiRes/postMortem, spec.md §3's "DAQ descriptor" field
/// set), so `block_ready` reports it directly rather than ingest
/// having to guess a length from a still-unread descriptor.
pub trait DaqFifo {
    /// `Some((slot, channel, mode))` once a full block for that channel
    /// is ready to read.
    fn block_ready(&self) -> Option<(u8, u8, DaqMode)>;
    /// Reads `buf.len()` consecutive 16-bit words in one burst.
    fn read_words(&mut self, buf: &mut [u16]) -> Result<(), Error>;
}

/// User-visible failure callbacks (spec.md §7 "User-visible failure
/// behavior"). Default methods log and otherwise do nothing --
/// spec.md's own wording ("defaults throw; applications override as
/// needed") maps to "log a warning" in a `no_std` context with no
/// exception mechanism; callers that need stronger behavior override.
pub trait IngestHooks {
    fn on_error_descriptor(&mut self, slot: u8, channel: u8) {
        log::warn!("daq: malformed descriptor from slot {slot} channel {channel}");
    }
    fn on_unregistered_device(&mut self, slot: u8, channel: u8) {
        log::warn!("daq: block from unregistered device slot {slot} channel {channel}");
    }
    fn on_block_error(&mut self, slot: u8, channel: u8) {
        log::warn!("daq: block error slot {slot} channel {channel}");
    }
    fn on_fifo_alarm(&mut self, slot: u8, channel: u8) {
        log::warn!("daq: ring full, dropping block from slot {slot} channel {channel}");
    }
    fn on_crc_mismatch(&mut self, slot: u8, channel: u8) {
        log::warn!("daq: crc mismatch slot {slot} channel {channel} (advisory only)");
    }
    /// Sequence jumped by more than 1 (spec.md §4.I step 4).
    fn on_sequence_error(&mut self, slot: u8, channel: u8, last: u8, got: u8) {
        log::warn!("daq: sequence gap slot {slot} channel {channel}: {last} -> {got}");
    }
}

/// Tracks per-channel sequence continuity and drives one fifo's
/// read/verify/push cycle.
pub struct Ingest {
    last_sequence: [[Option<u8>; MAX_CHANNELS_PER_DEVICE]; MAX_SCU_SLAVES as usize + 1],
}

impl Ingest {
    pub fn new() -> Self {
        Self { last_sequence: [[None; MAX_CHANNELS_PER_DEVICE]; MAX_SCU_SLAVES as usize + 1] }
    }

    /// Runs one ingest step: no-op if no block is ready. Returns
    /// `Ok(true)` if a block was consumed (whether delivered or
    /// dropped for framing), `Ok(false)` if nothing was ready.
    pub fn ingest_one<F: DaqFifo, B: Bus>(
        &mut self,
        fifo: &mut F,
        registry: &DeviceRegistry,
        ring: &mut DaqRingProducer<B>,
        hooks: &mut impl IngestHooks,
    ) -> Result<bool, Error> {
        let Some((slot, channel, expected_mode)) = fifo.block_ready() else {
            return Ok(false);
        };

        let payload_len = if expected_mode.is_long() { LONG_BLOCK_LEN } else { SHORT_BLOCK_LEN };
        let total = payload_len + DaqDescriptor::WIRE_WORDS;
        let mut buf = [0u16; LONG_BLOCK_LEN + DaqDescriptor::WIRE_WORDS];
        fifo.read_words(&mut buf[..total])?;

        let mut descriptor_words = [0u16; DaqDescriptor::WIRE_WORDS];
        descriptor_words.copy_from_slice(&buf[payload_len..total]);

        let descriptor = match DaqDescriptor::from_words(&descriptor_words) {
            Some(d) => d,
            None => {
                hooks.on_error_descriptor(slot, channel);
                return Ok(true);
            }
        };

        if descriptor.mode != expected_mode
            || descriptor.slot != slot
            || descriptor.channel != channel
            || channel as usize >= MAX_CHANNELS_PER_DEVICE
        {
            hooks.on_error_descriptor(slot, channel);
            return Ok(true);
        }

        if !registry.is_registered(slot, channel) {
            hooks.on_unregistered_device(slot, channel);
            return Ok(true);
        }

        let computed_crc = crc5::compute_crc5(&[
            descriptor_words[0],
            descriptor_words[2],
            descriptor_words[3],
            descriptor_words[4],
            descriptor_words[5],
            descriptor_words[6],
            descriptor_words[7],
            descriptor_words[8],
            descriptor_words[9],
        ]);
        if computed_crc != descriptor.crc {
            // Advisory only (spec.md §7, §9): log and still deliver.
            hooks.on_crc_mismatch(slot, channel);
        }

        let last = self.last_sequence[slot as usize][channel as usize];
        if let Some(last_seq) = last {
            let gap = descriptor.sequence.wrapping_sub(last_seq);
            if gap != 1 && gap != 0 {
                hooks.on_sequence_error(slot, channel, last_seq, descriptor.sequence);
            }
        }
        self.last_sequence[slot as usize][channel as usize] = Some(descriptor.sequence);

        let mut payload = [0u16; LONG_BLOCK_LEN];
        payload[..payload_len].copy_from_slice(&buf[..payload_len]);
        let block = DaqBlock { descriptor, payload, payload_len };

        if !ring.push(&block)? {
            hooks.on_fifo_alarm(slot, channel);
        }
        Ok(true)
    }
}

impl Default for Ingest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_bus::SimBus;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct CountingHooks {
        error_descriptor: u32,
        unregistered: u32,
        sequence_error: u32,
        crc_mismatch: u32,
    }

    impl IngestHooks for CountingHooks {
        fn on_error_descriptor(&mut self, _slot: u8, _channel: u8) {
            self.error_descriptor += 1;
        }
        fn on_unregistered_device(&mut self, _slot: u8, _channel: u8) {
            self.unregistered += 1;
        }
        fn on_sequence_error(&mut self, _slot: u8, _channel: u8, _last: u8, _got: u8) {
            self.sequence_error += 1;
        }
        fn on_crc_mismatch(&mut self, _slot: u8, _channel: u8) {
            self.crc_mismatch += 1;
        }
    }

    struct FakeFifo {
        ready: Option<(u8, u8, DaqMode)>,
        words: VecDeque<u16>,
    }

    impl DaqFifo for FakeFifo {
        fn block_ready(&self) -> Option<(u8, u8, DaqMode)> {
            self.ready
        }
        fn read_words(&mut self, buf: &mut [u16]) -> Result<(), Error> {
            for slot in buf.iter_mut() {
                *slot = self.words.pop_front().unwrap_or(0);
            }
            Ok(())
        }
    }

    fn descriptor_words(slot: u8, channel: u8, mode: DaqMode, sequence: u8) -> Vec<u16> {
        let mut d = DaqDescriptor {
            slot,
            channel,
            mode,
            sequence,
            timestamp: 5_000,
            sample_time_us: 10,
            crc: 0,
        };
        let words_without_crc: Vec<u16> = {
            let w = d.to_words();
            vec![w[0], w[2], w[3], w[4], w[5], w[6], w[7], w[8], w[9]]
        };
        d.crc = crc5::compute_crc5(&words_without_crc);
        d.to_words().to_vec()
    }

    fn fifo_for(slot: u8, channel: u8, mode: DaqMode, sequence: u8) -> FakeFifo {
        let mut words = VecDeque::new();
        for i in 0..SHORT_BLOCK_LEN {
            words.push_back(i as u16);
        }
        for w in descriptor_words(slot, channel, mode, sequence) {
            words.push_back(w);
        }
        FakeFifo { ready: Some((slot, channel, mode)), words }
    }

    #[test]
    fn well_formed_block_is_pushed_without_error() {
        let mut ingest = Ingest::new();
        let mut registry = DeviceRegistry::new();
        registry.register(4, 0);
        let mut bus = SimBus::new(1 << 20);
        let mut ring = DaqRingProducer::format(&mut bus, 0, 256, 4).unwrap();
        let mut hooks = CountingHooks::default();
        let mut fifo = fifo_for(4, 0, DaqMode::Continuous, 10);

        let consumed = ingest.ingest_one(&mut fifo, &registry, &mut ring, &mut hooks).unwrap();
        assert!(consumed);
        assert_eq!(hooks.error_descriptor, 0);
        assert_eq!(hooks.unregistered, 0);
        assert_eq!(hooks.crc_mismatch, 0);
    }

    #[test]
    fn unregistered_device_is_flagged_and_block_still_consumed() {
        let mut ingest = Ingest::new();
        let registry = DeviceRegistry::new();
        let mut bus = SimBus::new(1 << 20);
        let mut ring = DaqRingProducer::format(&mut bus, 0, 256, 4).unwrap();
        let mut hooks = CountingHooks::default();
        let mut fifo = fifo_for(4, 0, DaqMode::Continuous, 10);

        assert!(ingest.ingest_one(&mut fifo, &registry, &mut ring, &mut hooks).unwrap());
        assert_eq!(hooks.unregistered, 1);
    }

    #[test]
    fn malformed_mode_bits_trigger_error_descriptor_and_drop() {
        // spec.md §8 scenario 4: all three mode bits set.
        let mut ingest = Ingest::new();
        let mut registry = DeviceRegistry::new();
        registry.register(4, 0);
        let mut bus = SimBus::new(1 << 20);
        let mut ring = DaqRingProducer::format(&mut bus, 0, 256, 4).unwrap();
        let mut hooks = CountingHooks::default();

        let mut words = VecDeque::new();
        for i in 0..LONG_BLOCK_LEN {
            words.push_back(i as u16);
        }
        let mut descriptor_words_arr = [0u16; DaqDescriptor::WIRE_WORDS];
        descriptor_words_arr[0] = 0b111 << 8; // invalid: not a single DaqMode discriminant
        for w in descriptor_words_arr {
            words.push_back(w);
        }
        let mut fifo = FakeFifo { ready: Some((4, 0, DaqMode::HiRes)), words };

        assert!(ingest.ingest_one(&mut fifo, &registry, &mut ring, &mut hooks).unwrap());
        assert_eq!(hooks.error_descriptor, 1);
    }

    #[test]
    fn sequence_gap_greater_than_one_is_flagged() {
        let mut ingest = Ingest::new();
        let mut registry = DeviceRegistry::new();
        registry.register(4, 0);
        let mut bus = SimBus::new(1 << 20);
        let mut ring = DaqRingProducer::format(&mut bus, 0, 256, 8).unwrap();
        let mut hooks = CountingHooks::default();

        let mut fifo1 = fifo_for(4, 0, DaqMode::Continuous, 10);
        ingest.ingest_one(&mut fifo1, &registry, &mut ring, &mut hooks).unwrap();
        let mut fifo2 = fifo_for(4, 0, DaqMode::Continuous, 13);
        ingest.ingest_one(&mut fifo2, &registry, &mut ring, &mut hooks).unwrap();
        assert_eq!(hooks.sequence_error, 1);
    }

    #[test]
    fn no_block_ready_is_a_noop() {
        let mut ingest = Ingest::new();
        let registry = DeviceRegistry::new();
        let mut bus = SimBus::new(1 << 20);
        let mut ring = DaqRingProducer::format(&mut bus, 0, 256, 4).unwrap();
        let mut hooks = CountingHooks::default();
        let mut fifo = FakeFifo { ready: None, words: VecDeque::new() };
        assert!(!ingest.ingest_one(&mut fifo, &registry, &mut ring, &mut hooks).unwrap());
    }
}
