//! FG feedback administration (spec.md §4.K): the host-side registry
//! that turns raw DAQ-ring traffic into per-channel application
//! callbacks.
//!
//! Grounded on `scu_fg_feedback.cpp`'s `FgFeedbackAdministration` /
//! `FgFeedbackDevice` / `FgFeedbackChannel` three-level registry and its
//! `distributeData()` drain loop. ADDAC pairing is delegated entirely
//! to `scu_daq::AddacPairing`; MIL samples arrive pre-paired and only
//! need routing. `Channel::armed_by_host` (the supplemented "active by
//! SAFTLIB" flag, `libs/scu-fg/src/engine.rs`) has no host-side
//! equivalent to read back over the wire, so this crate tracks its own
//! copy, set at registration time by whichever caller issued the
//! `ENABLE` command -- the same filtering effect, applied where the
//! host actually has the information.

use crate::throttle::PairThrottle;
use crate::Error;
use scu_bus::Bus;
use scu_daq::{AddacPairing, MilDaqConsumer, DaqRingConsumer, PairingHooks, PairingPolicy};
use scu_proto::channel::{ChannelId, Family, Socket};

struct LogOnlyHooks;
impl PairingHooks for LogOnlyHooks {}

enum ChannelKind {
    Addac { set_channel: u8, act_channel: u8, pairing: AddacPairing },
    Mil,
}

/// One registered feedback channel, keyed by `fg_number` within its
/// owning device (spec.md §4.K).
pub struct FgFeedbackChannel {
    fg_number: u16,
    armed_by_host: bool,
    kind: ChannelKind,
    throttle: PairThrottle,
}

impl FgFeedbackChannel {
    pub fn fg_number(&self) -> u16 {
        self.fg_number
    }

    pub fn armed_by_host(&self) -> bool {
        self.armed_by_host
    }

    pub fn set_armed_by_host(&mut self, armed: bool) {
        self.armed_by_host = armed;
    }
}

/// One registered device, addressed by `socket` (spec.md §4.K: "one per
/// `socket`").
pub struct FgFeedbackDevice {
    socket: Socket,
    channels: Vec<FgFeedbackChannel>,
}

impl FgFeedbackDevice {
    pub fn socket(&self) -> Socket {
        self.socket
    }

    pub fn channels(&self) -> &[FgFeedbackChannel] {
        &self.channels
    }

    fn find_mut(&mut self, fg_number: u16) -> Option<&mut FgFeedbackChannel> {
        self.channels.iter_mut().find(|c| c.fg_number == fg_number)
    }
}

/// Throttle knobs a registered channel forwards samples under (spec.md
/// §4.K). Exposed as one struct rather than four loose parameters so
/// call sites read as "register this channel with this forwarding
/// policy" instead of an unlabeled parameter list.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    pub act_threshold: u32,
    pub set_threshold: u32,
    pub timeout_ns: u64,
}

impl Default for ThrottleConfig {
    /// Forward on any change, at least once a second -- a conservative
    /// default absent hardware-specific guidance from the retrieved
    /// pack (documented in DESIGN.md).
    fn default() -> Self {
        Self { act_threshold: 1, set_threshold: 1, timeout_ns: 1_000_000_000 }
    }
}

/// Top-level registry (spec.md §4.K). Registration is an O(n) linear
/// scan over devices, then channels, exactly as spec.md specifies;
/// tables are expected to hold at most a few hundred entries
/// (`MAX_FG_CHANNELS`), so this is not a hot path worth a hash map.
#[derive(Default)]
pub struct FgFeedbackAdministration {
    devices: Vec<FgFeedbackDevice>,
}

impl FgFeedbackAdministration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &[FgFeedbackDevice] {
        &self.devices
    }

    fn device_mut(&mut self, socket: Socket) -> &mut FgFeedbackDevice {
        if let Some(idx) = self.devices.iter().position(|d| d.socket == socket) {
            return &mut self.devices[idx];
        }
        self.devices.push(FgFeedbackDevice { socket, channels: Vec::new() });
        self.devices.last_mut().expect("just pushed")
    }

    fn register(&mut self, socket: Socket, fg_number: u16, kind: ChannelKind, armed_by_host: bool, throttle: ThrottleConfig) -> Result<(), Error> {
        let device = self.device_mut(socket);
        if device.channels.iter().any(|c| c.fg_number == fg_number) {
            return Err(Error::DuplicateRegistration { socket, fg_number });
        }
        device.channels.push(FgFeedbackChannel {
            fg_number,
            armed_by_host,
            kind,
            throttle: PairThrottle::new(throttle.act_threshold, throttle.set_threshold, throttle.timeout_ns),
        });
        Ok(())
    }

    /// Registers an ADDAC feedback channel: `set_channel`/`act_channel`
    /// are the sibling `DaqDescriptor::channel` values the set-point and
    /// actual-value streams arrive on within `socket`'s slot.
    pub fn register_addac(
        &mut self,
        socket: Socket,
        fg_number: u16,
        set_channel: u8,
        act_channel: u8,
        policy: PairingPolicy,
        armed_by_host: bool,
        throttle: ThrottleConfig,
    ) -> Result<(), Error> {
        debug_assert_eq!(socket.family, Family::Addac);
        let pairing = AddacPairing::new(fg_number as u8, policy);
        self.register(socket, fg_number, ChannelKind::Addac { set_channel, act_channel, pairing }, armed_by_host, throttle)
    }

    /// Registers a MIL feedback channel; `fg_number` must equal the
    /// `device` sub-index MIL samples for this channel carry in
    /// `MilDaqItem::fg_macro` (spec.md §4.H `FETCH_DATA`'s
    /// `fgMacro = (socket, device)`).
    pub fn register_mil(&mut self, socket: Socket, fg_number: u16, armed_by_host: bool, throttle: ThrottleConfig) -> Result<(), Error> {
        debug_assert_eq!(socket.family, Family::Mil);
        self.register(socket, fg_number, ChannelKind::Mil, armed_by_host, throttle)
    }

    /// Removes a channel; a no-op if it was never registered (mirrors
    /// `scu-fg::engine::unassign`'s tolerance of a redundant teardown).
    pub fn unregister(&mut self, socket: Socket, fg_number: u16) {
        if let Some(device) = self.devices.iter_mut().find(|d| d.socket == socket) {
            device.channels.retain(|c| c.fg_number != fg_number);
        }
    }

    pub fn channel_mut(&mut self, socket: Socket, fg_number: u16) -> Option<&mut FgFeedbackChannel> {
        self.devices.iter_mut().find(|d| d.socket == socket)?.find_mut(fg_number)
    }

    /// Drains both DAQ rings in one pass (spec.md §4.K), pairing ADDAC
    /// set/actual streams, routing pre-paired MIL tuples, throttling
    /// per channel, and invoking `on_data(socket, fg_number, timestamp,
    /// actValue, setValue)` for each tuple that clears the gate.
    ///
    /// Returns the number of samples that were drained but could not be
    /// routed to any registered, armed channel -- either because no
    /// channel claims their `(socket, channel)`/`fg_macro`, or because
    /// the owning channel is not `armed_by_host`. Both rings are always
    /// fully drained in one call (spec.md §4.I's rings are bounded, so
    /// this terminates); this differs from the original's
    /// batch-limited `distributeData`, which could leave samples
    /// pending for a later call -- documented as a simplification in
    /// DESIGN.md.
    pub fn distribute_data<B1: Bus, B2: Bus>(
        &mut self,
        addac: &mut DaqRingConsumer<'_, B1>,
        mil: &mut MilDaqConsumer<'_, B2>,
        on_data: &mut dyn FnMut(Socket, u16, u64, u32, u32),
    ) -> Result<usize, Error> {
        let mut undelivered = 0usize;

        while let Some(block) = addac.pop()? {
            let socket = Socket::new(block.descriptor.slot, Family::Addac);
            let wire_channel = block.descriptor.channel;

            let Some(device) = self.devices.iter_mut().find(|d| d.socket == socket) else {
                undelivered += 1;
                continue;
            };
            let Some(channel) = device.channels.iter_mut().find(|c| {
                matches!(&c.kind, ChannelKind::Addac { set_channel, act_channel, .. }
                    if *set_channel == wire_channel || *act_channel == wire_channel)
            }) else {
                undelivered += 1;
                continue;
            };

            let tuples = {
                let ChannelKind::Addac { set_channel, pairing, .. } = &mut channel.kind else {
                    unreachable!("matched above")
                };
                let mut tuples = Vec::new();
                let mut hooks = LogOnlyHooks;
                let mut on_tuple = |t, act, set| tuples.push((t, act, set));
                if wire_channel == *set_channel {
                    pairing.submit_set(&block, &mut hooks, &mut on_tuple);
                } else {
                    pairing.submit_act(&block, &mut hooks, &mut on_tuple);
                }
                tuples
            };

            if !channel.armed_by_host {
                undelivered += tuples.len();
                continue;
            }
            for tuple in tuples {
                for (t, act, set) in channel.throttle.offer(tuple) {
                    on_data(socket, channel.fg_number, t, act, set);
                }
            }
        }

        while let Some(item) = mil.pop()? {
            let Some(id) = ChannelId::from_macro_number(item.fg_macro, 0) else {
                undelivered += 1;
                continue;
            };
            let fg_number = id.device as u16;
            let Some(device) = self.devices.iter_mut().find(|d| d.socket == id.socket) else {
                undelivered += 1;
                continue;
            };
            let Some(channel) = device.channels.iter_mut().find(|c| c.fg_number == fg_number && matches!(c.kind, ChannelKind::Mil)) else {
                undelivered += 1;
                continue;
            };
            if !channel.armed_by_host {
                undelivered += 1;
                continue;
            }
            for (t, act, set) in channel.throttle.offer((item.timestamp, item.act_value, item.set_value)) {
                on_data(id.socket, channel.fg_number, t, act, set);
            }
        }

        if undelivered > 0 {
            log::debug!("feedback: {undelivered} sample(s) drained without a registered, armed destination");
        }
        Ok(undelivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scu_bus::SimBus;
    use scu_daq::{DaqRingProducer, MilDaqProducer};
    use scu_proto::daq::{DaqDescriptor, DaqMode, MilDaqItem, LONG_BLOCK_LEN};

    const ADDAC_ADMIN: u32 = 0;
    const ADDAC_PAYLOAD: u32 = 4096;
    const MIL_ADMIN: u32 = 8192;
    const MIL_PAYLOAD: u32 = 16384;

    fn addac_socket() -> Socket {
        Socket::new(4, Family::Addac)
    }

    fn push_addac(bus: &mut SimBus, sequence: u8, channel: u8, timestamp: u64, value: u16) {
        let descriptor = DaqDescriptor { slot: 4, channel, mode: DaqMode::Continuous, sequence, timestamp, sample_time_us: 10, crc: 0 };
        let mut payload = [0u16; LONG_BLOCK_LEN];
        payload[0] = value;
        let block = scu_daq::DaqBlock { descriptor, payload, payload_len: 1 };
        let mut producer = DaqRingProducer::attach(bus, ADDAC_ADMIN, ADDAC_PAYLOAD);
        assert!(producer.push(&block).unwrap());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut admin = FgFeedbackAdministration::new();
        admin.register_addac(addac_socket(), 0, 0, 1, PairingPolicy::BySequence, true, ThrottleConfig::default()).unwrap();
        let err = admin
            .register_addac(addac_socket(), 0, 0, 1, PairingPolicy::BySequence, true, ThrottleConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { fg_number: 0, .. }));
    }

    #[test]
    fn addac_pair_is_routed_paired_and_forwarded() {
        let mut bus = SimBus::new(1 << 16);
        DaqRingProducer::format(&mut bus, ADDAC_ADMIN, ADDAC_PAYLOAD, 8).unwrap();
        push_addac(&mut bus, 1, 0, 1000, 300);
        push_addac(&mut bus, 1, 1, 1000, 310);

        let mut admin = FgFeedbackAdministration::new();
        admin.register_addac(addac_socket(), 7, 0, 1, PairingPolicy::BySequence, true, ThrottleConfig::default()).unwrap();

        let mut mil_bus = SimBus::new(4096);
        let mut addac_consumer = DaqRingConsumer::new(&mut bus, ADDAC_ADMIN, ADDAC_PAYLOAD);
        let mut mil_consumer = MilDaqConsumer::new(&mut mil_bus, 0, 64);

        let mut delivered = Vec::new();
        let undelivered = admin
            .distribute_data(&mut addac_consumer, &mut mil_consumer, &mut |socket, fg_number, t, act, set| {
                delivered.push((socket, fg_number, t, act, set));
            })
            .unwrap();

        assert_eq!(delivered, vec![(addac_socket(), 7, 1000, 310, 300)]);
        assert_eq!(undelivered, 0);
    }

    #[test]
    fn unarmed_channel_counts_as_undelivered_and_drops_silently() {
        let mut bus = SimBus::new(1 << 16);
        DaqRingProducer::format(&mut bus, ADDAC_ADMIN, ADDAC_PAYLOAD, 8).unwrap();
        push_addac(&mut bus, 1, 0, 1000, 1);
        push_addac(&mut bus, 1, 1, 1000, 2);

        let mut admin = FgFeedbackAdministration::new();
        admin.register_addac(addac_socket(), 1, 0, 1, PairingPolicy::BySequence, false, ThrottleConfig::default()).unwrap();

        let mut mil_bus = SimBus::new(4096);
        let mut addac_consumer = DaqRingConsumer::new(&mut bus, ADDAC_ADMIN, ADDAC_PAYLOAD);
        let mut mil_consumer = MilDaqConsumer::new(&mut mil_bus, 0, 64);

        let mut delivered = Vec::new();
        let undelivered = admin
            .distribute_data(&mut addac_consumer, &mut mil_consumer, &mut |s, n, t, a, v| delivered.push((s, n, t, a, v)))
            .unwrap();

        assert!(delivered.is_empty());
        assert_eq!(undelivered, 1, "one paired tuple produced, but the channel is not armed_by_host");
    }

    #[test]
    fn mil_item_routes_by_fg_macro_device_index() {
        let mut addac_bus = SimBus::new(1024);
        let mut mil_bus = SimBus::new(1 << 16);
        {
            let mut producer = MilDaqProducer::format(&mut mil_bus, MIL_ADMIN, MIL_PAYLOAD, 4).unwrap();
            let socket = Socket::new(2, Family::Mil);
            let id = ChannelId::new(socket, 3, 0);
            let item = MilDaqItem { timestamp: 5_000, act_value: 42, set_value: 40, fg_macro: id.macro_number() };
            assert!(producer.push(&item).unwrap());
        }

        let mut admin = FgFeedbackAdministration::new();
        admin.register_mil(Socket::new(2, Family::Mil), 3, true, ThrottleConfig::default()).unwrap();

        let mut addac_consumer = DaqRingConsumer::new(&mut addac_bus, 0, 64);
        let mut mil_consumer = MilDaqConsumer::new(&mut mil_bus, MIL_ADMIN, MIL_PAYLOAD);

        let mut delivered = Vec::new();
        admin
            .distribute_data(&mut addac_consumer, &mut mil_consumer, &mut |s, n, t, a, v| delivered.push((s, n, t, a, v)))
            .unwrap();

        assert_eq!(delivered, vec![(Socket::new(2, Family::Mil), 3, 5_000, 42, 40)]);
    }
}
