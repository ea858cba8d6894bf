//! The single abstraction point for everything spec.md §1 calls
//! "explicitly out of scope": the Wishbone/Etherbone bus transport
//! itself is reached through [`scu_bus::Bus`], but the MIL serial
//! link's request/poll primitives, ADDAC's data-request IRQ line, the
//! hardware DAQ capture fifo, ECA timing-event delivery, the host
//! mailbox doorbell, and SDB device discovery are all lower than this
//! crate's concern -- spec.md: "specify only the interfaces consumed
//! from them."
//!
//! `Platform` composes the two hardware-facing traits `scu-mil` and
//! `scu-daq` already define (`MilTransport`, `DaqFifo`) with the
//! handful of additional primitives the scheduler loop needs, so one
//! concrete implementation (real registers on the firmware target, a
//! scripted fake under `std`) satisfies every collaborator at once.

use scu_daq::DaqFifo;
use scu_mil::{MilError, MilTransport};

/// One ADDAC channel's data-request line, polled once per `schedule()`
/// tick (spec.md §4.G "on each IRQ"). The firmware target's
/// implementation reads the real per-channel status bit; tests use a
/// scripted queue.
pub trait Platform: MilTransport + DaqFifo {
    fn now_ns(&self) -> u64;

    /// Pops the single host->firmware mailbox word, if a new command
    /// has been written since the last poll (spec.md §6 "a single
    /// 32-bit mailbox slot").
    fn take_command(&mut self) -> Option<u32>;

    /// SDB-style device lookup (spec.md §9: "the bus driver provides
    /// `find_device(vendor, device) -> Address`"), out of scope beyond
    /// this signature.
    fn find_device(&self, vendor: u32, device: u32) -> Option<u32>;

    /// One matched ECA timing event, if any arrived since the last
    /// poll: the event tag and its White Rabbit timestamp (spec.md
    /// §4.G "ARMED -> (timing event matching tag) -> ACTIVE").
    fn poll_timing_event(&mut self) -> Option<(u32, u64)>;

    /// Whether ADDAC flat channel `channel` has a pending data-request
    /// IRQ (spec.md §4.F "ADDAC": direct memory-mapped, polled per
    /// channel rather than dispatched by vector -- see DESIGN.md).
    fn poll_addac_irq(&mut self, channel: usize) -> bool;

    /// Writes one MIL task-slot register block (spec.md §4.F "MIL": "a
    /// burst transfer followed by a single write of the final control
    /// register"), as distinct from the FSM's own
    /// request/poll primitives which only ever move status and sample
    /// words, never a channel's coefficient block.
    fn write_mil_registers(&mut self, link: u8, task_slot: u8, words: &[u32]) -> Result<(), MilError>;

    /// Gates the hardware interrupt-enable flag (spec.md §4.E).
    fn set_interrupts_enabled(&self, enabled: bool);

    /// Gates the hardware "atomic access" register the bus zycle lock
    /// brackets multi-word transactions with (spec.md §4.A).
    fn set_zycle_locked(&self, locked: bool);
}

/// Adapts a `&Platform` to [`scu_irq::InterruptGate`] without requiring
/// `Platform` itself to depend on `scu-irq`.
pub struct InterruptGateAdapter<'a, P: Platform>(pub &'a P);

impl<'a, P: Platform> scu_irq::InterruptGate for InterruptGateAdapter<'a, P> {
    fn set_enabled(&self, enabled: bool) {
        self.0.set_interrupts_enabled(enabled);
    }
}

/// Adapts a `&Platform` to [`scu_bus::AtomicAccessGate`].
pub struct ZycleGateAdapter<'a, P: Platform>(pub &'a P);

impl<'a, P: Platform> scu_bus::AtomicAccessGate for ZycleGateAdapter<'a, P> {
    fn set_locked(&self, locked: bool) {
        self.0.set_zycle_locked(locked);
    }
}

/// A scripted [`Platform`] for `FirmwareCtx` unit tests: every queue is
/// pushed by the test before `schedule()`/`apply_command()` drains it,
/// standing in for the real ECA/MIL/ADDAC/mailbox hardware the way
/// `scu-mil::fsm::tests::FakeTransport` and `scu-daq::ingest::tests::
/// FakeFifo` stand in for their own hardware surfaces.
#[cfg(any(test, feature = "std"))]
pub mod tests {
    use super::Platform;
    use scu_daq::DaqFifo;
    use scu_mil::{ChannelIrqStatus, MilError, MilTransport};
    use scu_proto::daq::DaqMode;
    use std::collections::VecDeque;

    pub struct FakePlatform {
        now_ns: u64,
        command_queue: VecDeque<u32>,
        timing_events: VecDeque<(u32, u64)>,
        addac_irq: [bool; scu_proto::channel::MAX_FG_CHANNELS],
        devices: std::collections::HashMap<(u32, u32), u32>,
        mil_data_requests: [VecDeque<(usize, u64)>; scu_mil::MAX_LINKS],
        mil_status: [[Option<Result<ChannelIrqStatus, MilError>>; scu_mil::MAX_CHANNELS_PER_LINK]; scu_mil::MAX_LINKS],
        mil_samples: [[Option<Result<u32, MilError>>; scu_mil::MAX_CHANNELS_PER_LINK]; scu_mil::MAX_LINKS],
        mil_registers: std::collections::HashMap<(u8, u8), [u32; 4]>,
        daq_block_ready: Option<(u8, u8, DaqMode)>,
        daq_words: VecDeque<u16>,
    }

    impl Default for FakePlatform {
        fn default() -> Self {
            Self {
                now_ns: 0,
                command_queue: VecDeque::new(),
                timing_events: VecDeque::new(),
                addac_irq: [false; scu_proto::channel::MAX_FG_CHANNELS],
                devices: std::collections::HashMap::new(),
                mil_data_requests: core::array::from_fn(|_| VecDeque::new()),
                mil_status: core::array::from_fn(|_| core::array::from_fn(|_| None)),
                mil_samples: core::array::from_fn(|_| core::array::from_fn(|_| None)),
                mil_registers: std::collections::HashMap::new(),
                daq_block_ready: None,
                daq_words: VecDeque::new(),
            }
        }
    }

    impl FakePlatform {
        pub fn set_now_ns(&mut self, now_ns: u64) {
            self.now_ns = now_ns;
        }

        pub fn queue_command(&mut self, word: u32) {
            self.command_queue.push_back(word);
        }

        pub fn queue_timing_event(&mut self, tag: u32, event_ts: u64) {
            self.timing_events.push_back((tag, event_ts));
        }

        pub fn set_addac_irq(&mut self, channel: usize, pending: bool) {
            self.addac_irq[channel] = pending;
        }

        pub fn register_device(&mut self, vendor: u32, device: u32, addr: u32) {
            self.devices.insert((vendor, device), addr);
        }

        pub fn queue_mil_data_request(&mut self, link: u8, channel: usize, msg_time: u64) {
            self.mil_data_requests[link as usize].push_back((channel, msg_time));
        }

        pub fn queue_mil_status(&mut self, link: u8, channel: usize, status: Result<ChannelIrqStatus, MilError>) {
            self.mil_status[link as usize][channel] = Some(status);
        }

        pub fn queue_mil_sample(&mut self, link: u8, channel: usize, sample: Result<u32, MilError>) {
            self.mil_samples[link as usize][channel] = Some(sample);
        }

        pub fn written_mil_registers(&self, link: u8, task_slot: u8) -> Option<[u32; 4]> {
            self.mil_registers.get(&(link, task_slot)).copied()
        }

        pub fn queue_daq_block(&mut self, slot: u8, channel: u8, mode: DaqMode, words: &[u16]) {
            self.daq_block_ready = Some((slot, channel, mode));
            self.daq_words = words.iter().copied().collect();
        }
    }

    impl Platform for FakePlatform {
        fn now_ns(&self) -> u64 {
            self.now_ns
        }

        fn take_command(&mut self) -> Option<u32> {
            self.command_queue.pop_front()
        }

        fn find_device(&self, vendor: u32, device: u32) -> Option<u32> {
            self.devices.get(&(vendor, device)).copied()
        }

        fn poll_timing_event(&mut self) -> Option<(u32, u64)> {
            self.timing_events.pop_front()
        }

        fn poll_addac_irq(&mut self, channel: usize) -> bool {
            let pending = self.addac_irq[channel];
            self.addac_irq[channel] = false;
            pending
        }

        fn write_mil_registers(&mut self, link: u8, task_slot: u8, words: &[u32]) -> Result<(), MilError> {
            let entry = self.mil_registers.entry((link, task_slot)).or_insert([0; 4]);
            for (i, w) in words.iter().enumerate() {
                if let Some(slot) = entry.get_mut(i) {
                    *slot = *w;
                }
            }
            Ok(())
        }

        fn set_interrupts_enabled(&self, _enabled: bool) {}

        fn set_zycle_locked(&self, _locked: bool) {}
    }

    impl MilTransport for FakePlatform {
        fn poll_data_request(&mut self, link: u8) -> Option<(usize, u64)> {
            self.mil_data_requests[link as usize].pop_front()
        }

        fn request_status(&mut self, _link: u8, _task_slot: u8, _channel: usize) -> Result<(), MilError> {
            Ok(())
        }

        fn poll_status(&mut self, link: u8, _task_slot: u8, channel: usize) -> Result<Option<ChannelIrqStatus>, MilError> {
            match self.mil_status[link as usize][channel].take() {
                Some(Ok(status)) => Ok(Some(status)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }

        fn ack_irq(&mut self, _link: u8, _task_slot: u8, _channel: usize) -> Result<(), MilError> {
            Ok(())
        }

        fn request_read(&mut self, _link: u8, _task_slot: u8, _channel: usize) -> Result<(), MilError> {
            Ok(())
        }

        fn poll_sample(&mut self, link: u8, _task_slot: u8, channel: usize) -> Result<Option<u32>, MilError> {
            match self.mil_samples[link as usize][channel].take() {
                Some(Ok(sample)) => Ok(Some(sample)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    impl DaqFifo for FakePlatform {
        fn block_ready(&self) -> Option<(u8, u8, DaqMode)> {
            self.daq_block_ready
        }

        fn read_words(&mut self, buf: &mut [u16]) -> Result<(), scu_daq::Error> {
            for slot in buf.iter_mut() {
                *slot = self.daq_words.pop_front().unwrap_or(0);
            }
            self.daq_block_ready = None;
            Ok(())
        }
    }
}
