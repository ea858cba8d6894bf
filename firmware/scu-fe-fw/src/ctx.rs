//! The firmware-wide singleton (spec.md §5 "mode 1"): owns every piece
//! of state `schedule()` steps through, on two independent
//! [`scu_bus::Bus`] handles (`regs`, `ram`) plus the [`Platform`]'s
//! hardware collaborators.
//!
//! `schedule()` runs the cooperative order spec.md §5 lays out for a
//! bare-metal main loop: DAQ ingest, then MIL FSM advancement, then any
//! per-channel timing/IRQ event, then the host mailbox command, once
//! per call. Log records are written eagerly at the point of
//! `log_event`, so there is no separate flush step -- unlike
//! `scu-log::LogProducer::log`'s own doc comment, which expects the
//! caller to bracket each call with the critical section itself.

use crate::io::{BusChannelIo, MilChannelIo};
use crate::layout;
#[path = "commands.rs"]
mod commands;
use crate::platform::{InterruptGateAdapter, Platform, ZycleGateAdapter};
use scu_bus::Bus;
use scu_daq::{DaqRingProducer, DeviceRegistry, Ingest, IngestHooks, MilDaqProducer};
use scu_fg::{Channel, EngineChannel};
use scu_irq::CriticalSectionCounter;
use scu_log::LogProducer;
use scu_mil::{ChannelIrqStatus, ChannelRecord, MilLink, TaskSlotTable, MAX_CHANNELS_PER_LINK, MAX_LINKS};
use scu_mmu::{tags, Mmu, Status};
use scu_proto::channel::{Family, MAX_FG_CHANNELS, SCU_INVALID};
use scu_proto::daq::MilDaqItem;
use scu_proto::log::LOG_PARAM_COUNT;
use scu_proto::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Bus(scu_bus::BusError),
    Fg(scu_fg::Error),
    Daq(scu_daq::Error),
    Mmu(scu_mmu::Error),
    Mil(scu_mil::MilError),
    InvalidChannel,
    NoTaskSlot,
}

impl From<scu_bus::BusError> for Error {
    fn from(e: scu_bus::BusError) -> Self {
        Error::Bus(e)
    }
}

impl From<scu_fg::Error> for Error {
    fn from(e: scu_fg::Error) -> Self {
        Error::Fg(e)
    }
}

impl From<scu_daq::Error> for Error {
    fn from(e: scu_daq::Error) -> Self {
        Error::Daq(e)
    }
}

impl From<scu_mmu::Error> for Error {
    fn from(e: scu_mmu::Error) -> Self {
        Error::Mmu(e)
    }
}

/// Small fixed-capacity buffer for `Signal`s emitted during one engine
/// call. A single `enable`/`on_irq`/`on_timing_event`/`disable` call
/// emits at most two signals (e.g. `StopEmpty` + `Disarmed`), so eight
/// is ample headroom without reaching for an allocator.
pub(crate) struct SignalBuf {
    items: [Option<Signal>; 8],
    len: usize,
}

impl SignalBuf {
    pub(crate) fn new() -> Self {
        Self { items: [None; 8], len: 0 }
    }

    pub(crate) fn push(&mut self, signal: Signal) {
        if self.len < self.items.len() {
            self.items[self.len] = Some(signal);
            self.len += 1;
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        self.items[..self.len].iter().filter_map(|s| *s)
    }
}

struct IngestLogHooks;
impl IngestHooks for IngestLogHooks {}

/// Firmware-wide state. Generic over `B: Bus` (shared by `regs`/`ram`,
/// same concrete type on a real deployment) and `P: Platform`, so unit
/// tests drive it with `scu_bus::SimBus` and a scripted `Platform` fake
/// without any `#[cfg]` forking of this module's logic.
pub struct FirmwareCtx<B: Bus, P: Platform> {
    regs: B,
    ram: B,
    platform: P,
    channels: [Option<EngineChannel>; MAX_FG_CHANNELS],
    /// `flat channel -> MIL link`, populated on `ENABLE` for MIL
    /// sockets, cleared on teardown.
    pub(crate) mil_link_of: [Option<u8>; MAX_FG_CHANNELS],
    /// `(link, local channel) -> flat channel`, the reverse of
    /// `mil_link_of`, consulted while draining a `MilLink::tick()`'s
    /// deferred IRQ/sample events.
    link_channels: [[Option<usize>; MAX_CHANNELS_PER_LINK]; MAX_LINKS],
    pub(crate) registry: DeviceRegistry,
    pub(crate) task_slots: TaskSlotTable,
    pub(crate) mil_links: [MilLink<MAX_CHANNELS_PER_LINK>; MAX_LINKS],
    ingest: Ingest,
    critical_section: CriticalSectionCounter,
    zycle: ZycleLock,
    addac_admin_addr: u32,
    addac_payload_addr: u32,
    mil_admin_addr: u32,
    mil_payload_addr: u32,
    log_admin_addr: u32,
    log_payload_addr: u32,
    pub(crate) enable_logging: bool,
}

use scu_bus::ZycleLock;

impl<B: Bus, P: Platform> FirmwareCtx<B, P> {
    pub fn new(regs: B, ram: B, platform: P) -> Self {
        Self {
            regs,
            ram,
            platform,
            channels: core::array::from_fn(|_| None),
            mil_link_of: [None; MAX_FG_CHANNELS],
            link_channels: [[None; MAX_CHANNELS_PER_LINK]; MAX_LINKS],
            registry: DeviceRegistry::new(),
            task_slots: TaskSlotTable::new(),
            mil_links: Self::fresh_mil_links(),
            ingest: Ingest::new(),
            critical_section: CriticalSectionCounter::new(),
            zycle: ZycleLock::new(),
            addac_admin_addr: 0,
            addac_payload_addr: 0,
            mil_admin_addr: 0,
            mil_payload_addr: 0,
            log_admin_addr: 0,
            log_payload_addr: 0,
            enable_logging: true,
        }
    }

    pub(crate) fn fresh_mil_links() -> [MilLink<MAX_CHANNELS_PER_LINK>; MAX_LINKS] {
        core::array::from_fn(|i| MilLink::new(i as u8, core::array::from_fn(|_| ChannelRecord::new(0))))
    }

    pub(crate) fn bind_mil_channel(&mut self, flat: usize, link: u8, local: usize, task_slot: u8) {
        self.mil_link_of[flat] = Some(link);
        self.link_channels[link as usize][local] = Some(flat);
        self.mil_links[link as usize].bind_task_slot(local, task_slot);
    }

    pub(crate) fn clear_mil_routing(&mut self) {
        self.mil_link_of = [None; MAX_FG_CHANNELS];
        self.link_channels = [[None; MAX_CHANNELS_PER_LINK]; MAX_LINKS];
        self.mil_links = Self::fresh_mil_links();
        self.task_slots.clear();
    }

    pub(crate) fn channel_family(&self, flat: usize) -> Option<Family> {
        match self.channels[flat].as_ref()?.channel {
            Channel::Addac(_) => Some(Family::Addac),
            Channel::Mil(_) => Some(Family::Mil),
        }
    }

    pub(crate) fn channel_slot(&mut self, flat: usize) -> &mut Option<EngineChannel> {
        &mut self.channels[flat]
    }

    pub(crate) fn flush_signals(&mut self, flat: usize, signals: &SignalBuf) -> Result<(), Error> {
        let addr = layout::channel_ctrl_addr(flat) + layout::CHANNEL_CTRL_SIGNAL_OFFSET;
        for signal in signals.iter() {
            self.regs.write_u32(addr, signal as u32)?;
        }
        Ok(())
    }

    pub(crate) fn mil_io(&mut self, link: u8) -> MilChannelIo<'_, P> {
        MilChannelIo { platform: &mut self.platform, link }
    }

    pub(crate) fn bus_io(&mut self) -> BusChannelIo<'_, B> {
        BusChannelIo { bus: &mut self.regs }
    }

    pub(crate) fn ram_mut(&mut self) -> &mut B {
        &mut self.ram
    }

    pub(crate) fn regs_mut(&mut self) -> &mut B {
        &mut self.regs
    }

    /// Reverse lookup of [`Self::bind_mil_channel`]'s `link_channels`
    /// table: which local channel index on `link` a flat channel was
    /// bound to, if any.
    pub(crate) fn mil_local_for_flat(&self, flat: usize, link: u8) -> Option<usize> {
        self.link_channels[link as usize].iter().position(|slot| *slot == Some(flat))
    }

    /// Runtime toggle for whether `ENABLE`/`DISABLE` transitions get an
    /// extra log record (spec.md's supplemented `isFgEnableLoggingActive`
    /// flag, SPEC_FULL.md §4 "Supplemented from original_source").
    pub fn set_enable_logging(&mut self, enabled: bool) {
        self.enable_logging = enabled;
    }

    /// Allocates the three well-known MMU-tracked regions (ADDAC DAQ,
    /// MIL DAQ, log) and formats each fresh -- or, on a restart where
    /// the directory already carries the tag, leaves its contents
    /// untouched so the host reattaches to the same ring state (spec.md
    /// §8 scenario 3).
    pub fn init(&mut self) -> Result<(), Error> {
        let addac_admin;
        let addac_payload;
        let addac_status;
        let mil_admin;
        let mil_payload;
        let mil_status;
        let log_admin;
        let log_payload;
        let log_status;
        {
            let mut mmu = Mmu::new(&mut self.ram, layout::BULK_RAM_BASE, layout::MMU_CAPACITY_WORDS);
            mmu.init()?;

            let mut start = 0u32;
            let mut length = layout::addac_ring_length_words();
            addac_status = mmu.allocate(tags::ADDAC_DAQ, &mut start, &mut length, true)?;
            addac_admin = layout::BULK_RAM_BASE + start * 4;
            addac_payload = addac_admin + 16;

            let mut start = 0u32;
            let mut length = layout::mil_ring_length_words();
            mil_status = mmu.allocate(tags::MIL_DAQ, &mut start, &mut length, true)?;
            mil_admin = layout::BULK_RAM_BASE + start * 4;
            mil_payload = mil_admin + 16;

            let mut start = 0u32;
            let mut length = layout::log_ring_length_words();
            log_status = mmu.allocate(tags::LM32_LOG, &mut start, &mut length, true)?;
            log_admin = layout::BULK_RAM_BASE + start * 4;
            log_payload = log_admin + 16;
        }

        self.addac_admin_addr = addac_admin;
        self.addac_payload_addr = addac_payload;
        self.mil_admin_addr = mil_admin;
        self.mil_payload_addr = mil_payload;
        self.log_admin_addr = log_admin;
        self.log_payload_addr = log_payload;

        if addac_status == Status::Ok {
            DaqRingProducer::format(&mut self.ram, addac_admin, addac_payload, layout::ADDAC_DAQ_CAPACITY_BLOCKS)?;
        }
        if mil_status == Status::Ok {
            MilDaqProducer::format(&mut self.ram, mil_admin, mil_payload, layout::MIL_DAQ_CAPACITY_ITEMS)?;
        }
        if log_status == Status::Ok {
            LogProducer::format(&mut self.ram, log_admin, log_payload, layout::LOG_CAPACITY_RECORDS)?;
        }

        self.clear_mil_routing();
        Ok(())
    }

    /// One cooperative scheduler pass (spec.md §5 mode 1): DAQ ingest,
    /// MIL FSM tick, per-channel timing/IRQ advance, then the host
    /// mailbox command.
    pub fn schedule(&mut self) -> Result<(), Error> {
        self.run_daq_ingest()?;
        self.run_mil_tick()?;
        self.run_channel_events()?;
        self.run_command()?;
        Ok(())
    }

    fn run_daq_ingest(&mut self) -> Result<(), Error> {
        let mut ring = DaqRingProducer::attach(&mut self.ram, self.addac_admin_addr, self.addac_payload_addr);
        let mut hooks = IngestLogHooks;
        self.ingest.ingest_one(&mut self.platform, &self.registry, &mut ring, &mut hooks)?;
        Ok(())
    }

    fn run_mil_tick(&mut self) -> Result<(), Error> {
        let now_ns = self.platform.now_ns();
        for link_idx in 0..MAX_LINKS {
            let mut irq_events: [Option<(usize, ChannelIrqStatus)>; MAX_CHANNELS_PER_LINK] =
                [None; MAX_CHANNELS_PER_LINK];
            let mut irq_count = 0usize;
            let mut sample_events: [Option<(usize, u32, bool)>; MAX_CHANNELS_PER_LINK] =
                [None; MAX_CHANNELS_PER_LINK];
            let mut sample_count = 0usize;

            {
                let mut on_irq = |local: usize, status: ChannelIrqStatus| {
                    if irq_count < MAX_CHANNELS_PER_LINK {
                        irq_events[irq_count] = Some((local, status));
                        irq_count += 1;
                    }
                };
                let mut on_sample = |local: usize, sample: u32, gap: bool| {
                    if sample_count < MAX_CHANNELS_PER_LINK {
                        sample_events[sample_count] = Some((local, sample, gap));
                        sample_count += 1;
                    }
                };
                self.mil_links[link_idx].tick(&mut self.platform, now_ns, &mut on_irq, &mut on_sample);
            }

            for slot in irq_events.iter().take(irq_count) {
                let (local, status) = slot.expect("populated up to irq_count");
                self.handle_mil_irq(link_idx as u8, local, status, now_ns)?;
            }
            for slot in sample_events.iter().take(sample_count) {
                let (local, sample, gap) = slot.expect("populated up to sample_count");
                self.handle_mil_sample(link_idx, local, sample, gap)?;
            }
        }
        Ok(())
    }

    fn handle_mil_irq(&mut self, link: u8, local: usize, status: ChannelIrqStatus, now_ns: u64) -> Result<(), Error> {
        let Some(flat) = self.flat_for_mil(link, local) else { return Ok(()) };
        let mut signals = SignalBuf::new();
        {
            let Some(engine) = self.channels[flat].as_mut() else { return Ok(()) };
            engine.channel.set_mil_running(status.running);
            let mut io = MilChannelIo { platform: &mut self.platform, link };
            engine.on_irq(&mut io, &mut self.ram, now_ns, &mut |s| signals.push(s))?;
        }
        self.flush_signals(flat, &signals)
    }

    fn handle_mil_sample(&mut self, link: usize, local: usize, sample: u32, gap: bool) -> Result<(), Error> {
        let Some(flat) = self.flat_for_mil(link as u8, local) else { return Ok(()) };
        let (fg_macro, set_value) = if gap {
            (SCU_INVALID, 0)
        } else {
            match self.channels[flat].as_ref() {
                Some(engine) => {
                    let macro_number = engine.id.map(|id| id.macro_number()).unwrap_or(SCU_INVALID);
                    (macro_number, engine.last_coeff_c() as u32)
                }
                None => (SCU_INVALID, 0),
            }
        };
        let now_ns = self.platform.now_ns();
        let mut producer = MilDaqProducer::attach(&mut self.ram, self.mil_admin_addr, self.mil_payload_addr);
        let item = MilDaqItem { timestamp: now_ns, act_value: sample, set_value, fg_macro };
        producer.push(&item)?;
        Ok(())
    }

    fn flat_for_mil(&self, link: u8, local: usize) -> Option<usize> {
        self.link_channels.get(link as usize)?.get(local).copied().flatten()
    }

    fn run_channel_events(&mut self) -> Result<(), Error> {
        let now_ns = self.platform.now_ns();
        let timing_event = self.platform.poll_timing_event();

        for flat in 0..MAX_FG_CHANNELS {
            if self.channels[flat].is_none() {
                continue;
            }
            if let Some((tag, event_ts)) = timing_event {
                self.advance_timing(flat, tag, event_ts)?;
            }
            if self.channel_family(flat) == Some(Family::Addac) && self.platform.poll_addac_irq(flat) {
                self.advance_addac_irq(flat, now_ns)?;
            }
        }
        Ok(())
    }

    fn advance_timing(&mut self, flat: usize, tag: u32, event_ts: u64) -> Result<(), Error> {
        let Some(family) = self.channel_family(flat) else { return Ok(()) };
        let mut signals = SignalBuf::new();
        match family {
            Family::Mil => {
                let Some(link) = self.mil_link_of[flat] else { return Ok(()) };
                let Some(engine) = self.channels[flat].as_mut() else { return Ok(()) };
                let mut io = MilChannelIo { platform: &mut self.platform, link };
                engine.on_timing_event(&mut io, &mut self.ram, tag, event_ts, &mut |s| signals.push(s))?;
            }
            Family::Addac => {
                let Some(engine) = self.channels[flat].as_mut() else { return Ok(()) };
                let mut io = BusChannelIo { bus: &mut self.regs };
                engine.on_timing_event(&mut io, &mut self.ram, tag, event_ts, &mut |s| signals.push(s))?;
            }
        }
        self.flush_signals(flat, &signals)
    }

    fn advance_addac_irq(&mut self, flat: usize, now_ns: u64) -> Result<(), Error> {
        let mut signals = SignalBuf::new();
        {
            let Some(engine) = self.channels[flat].as_mut() else { return Ok(()) };
            let mut io = BusChannelIo { bus: &mut self.regs };
            engine.on_irq(&mut io, &mut self.ram, now_ns, &mut |s| signals.push(s))?;
        }
        self.flush_signals(flat, &signals)
    }

    fn run_command(&mut self) -> Result<(), Error> {
        let Some(word) = self.platform.take_command() else { return Ok(()) };
        let Some(cmd) = scu_proto::command::Command::decode(word) else {
            log::warn!("scu-fe-fw: unrecognized mailbox command word {word:#x}");
            return Ok(());
        };
        self.apply_command(cmd)
    }

    /// Writes one structured log event (spec.md §4.D), bracketing the
    /// producer-side ring update with the critical section its own doc
    /// comment asks callers to supply.
    pub fn log_event(&mut self, filter: u32, format_addr: u32, params: [u32; LOG_PARAM_COUNT]) -> Result<(), Error> {
        let now_ns = self.platform.now_ns();
        let gate = InterruptGateAdapter(&self.platform);
        self.critical_section.enter(&gate);
        let mut producer = LogProducer::attach(&mut self.ram, self.log_admin_addr, self.log_payload_addr);
        let result = producer.log(now_ns, filter, format_addr, params);
        drop(producer);
        self.critical_section.exit(&gate);
        result.map_err(Error::from)
    }

    /// Brackets a multi-word bulk-RAM transaction with the bus zycle
    /// lock (spec.md §4.A).
    pub(crate) fn with_zycle<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let gate = ZycleGateAdapter(&self.platform);
        self.zycle.enter(&gate);
        let result = f(self);
        let gate = ZycleGateAdapter(&self.platform);
        self.zycle.exit(&gate);
        result
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::platform::tests::FakePlatform;
    use scu_bus::SimBus;

    fn ctx() -> FirmwareCtx<SimBus, FakePlatform> {
        let regs = SimBus::new(1 << 20);
        let ram = SimBus::new(1 << 20);
        let mut ctx = FirmwareCtx::new(regs, ram, FakePlatform::default());
        ctx.init().unwrap();
        ctx
    }

    #[test]
    fn init_allocates_three_rings_and_is_idempotent_across_reinit() {
        let mut c = ctx();
        let admin_after_first = c.addac_admin_addr;
        c.init().unwrap();
        assert_eq!(c.addac_admin_addr, admin_after_first, "reattach must not move the ring");
    }

    #[test]
    fn schedule_is_a_noop_on_an_idle_platform() {
        let mut c = ctx();
        c.schedule().unwrap();
        c.schedule().unwrap();
    }
}
