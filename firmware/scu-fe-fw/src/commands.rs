//! Applies one decoded [`scu_proto::command::Command`] to a
//! [`FirmwareCtx`] (spec.md §6 "Commands host -> firmware"). Each
//! variant maps to one lifecycle transition spec.md §3 describes:
//! `ENABLE`/`DISABLE` create and tear down a flat channel's engine slot,
//! `RESET` reinitializes one subsystem, `MIL_GAP_INTERVAL` toggles gap
//! reading on every link, `SCAN` drops the stable task-slot allocation
//! so the next round of `ENABLE`s rebuilds it.
//!
//! Declared as a child module of `ctx` (see the `#[path]` attribute on
//! `ctx`'s `mod commands;`) rather than a crate-level sibling, so its
//! methods can split-borrow `FirmwareCtx`'s private fields the same way
//! `ctx.rs`'s own scheduler methods do (spec.md's single-writer-per-
//! field discipline maps directly onto Rust's disjoint-field borrows).

use super::{Error, FirmwareCtx, SignalBuf};
use crate::io::{BusChannelIo, MilChannelIo};
use crate::layout;
use crate::platform::Platform;
use scu_bus::Bus;
use scu_fg::{AddacChannel, Channel, EngineChannel, MilChannel};
use scu_log::LogProducer;
use scu_mil::MAX_CHANNELS_PER_LINK;
use scu_proto::channel::{ChannelId, Family, MAX_FG_CHANNELS};
use scu_proto::command::{Command, Subsystem};

/// `(socket, device) -> (link, local channel)` split for MIL sockets.
/// The retrieved pack carries no header defining the exact SIO-slot
/// encoding (spec.md §9 scopes SDB/slot-numbering details out); this
/// implementation's choice, recorded in DESIGN.md: a MIL socket's slot
/// selects the link round-robin, `device` selects the local channel
/// within that link's task-slot table.
fn mil_link_and_local(id: ChannelId) -> Option<(u8, usize)> {
    let link = (id.socket.slot.saturating_sub(1) as usize) % scu_mil::MAX_LINKS;
    let local = id.device as usize;
    if local >= MAX_CHANNELS_PER_LINK {
        return None;
    }
    Some((link as u8, local))
}

impl<B: Bus, P: Platform> FirmwareCtx<B, P> {
    pub(crate) fn apply_command(&mut self, cmd: Command) -> Result<(), Error> {
        match cmd {
            Command::Enable { channel } => self.cmd_enable(channel as usize),
            Command::Disable { channel } => self.cmd_disable(channel as usize),
            Command::Reset { subsystem } => self.cmd_reset(subsystem),
            Command::MilGapInterval { ms } => self.cmd_mil_gap_interval(ms),
            Command::Scan => self.cmd_scan(),
        }
    }

    /// `UNARMED -> ARMED` (spec.md §3, §4.G): the host has already
    /// written `macro_number`, `tag` and (optionally) `armed_by_host`
    /// into the channel's control block before issuing `ENABLE`.
    fn cmd_enable(&mut self, flat: usize) -> Result<(), Error> {
        if flat >= MAX_FG_CHANNELS {
            return Err(Error::InvalidChannel);
        }
        let ctrl = layout::channel_ctrl_addr(flat);
        let macro_number = self.regs.read_u32(ctrl + layout::CHANNEL_CTRL_MACRO_OFFSET)?;
        let tag = self.regs.read_u32(ctrl + layout::CHANNEL_CTRL_TAG_OFFSET)?;
        let armed_by_host = self.regs.read_u32(ctrl + layout::CHANNEL_CTRL_ARMED_BY_HOST_OFFSET)? != 0;

        let Some(id) = ChannelId::from_macro_number(macro_number, flat as u16) else {
            log::warn!("scu-fe-fw: ENABLE on channel {flat} with no macro_number staged");
            return Ok(());
        };

        self.registry.register(id.socket.slot, (id.device as usize % scu_daq::MAX_CHANNELS_PER_DEVICE) as u8);

        let ring_admin = layout::segment_ring_admin_addr(flat);
        let ring_payload = layout::segment_ring_payload_addr(flat);
        let enable_logging = self.enable_logging;

        let mut engine = match id.socket.family {
            Family::Addac => {
                let base = layout::addac_base_addr(flat);
                EngineChannel::new(Channel::Addac(AddacChannel::new(base, id.device)), ring_admin, ring_payload)
            }
            Family::Mil => {
                let Some((link, local)) = mil_link_and_local(id) else {
                    log::warn!("scu-fe-fw: ENABLE on channel {flat} has no room on its MIL link");
                    return Ok(());
                };
                let Some(task_slot) = self.task_slots.allocate(link as usize, local) else {
                    return Err(Error::NoTaskSlot);
                };
                self.bind_mil_channel(flat, link, local, task_slot);
                EngineChannel::new(Channel::Mil(MilChannel::new(task_slot, id.device)), ring_admin, ring_payload)
            }
        };

        let mut signals = SignalBuf::new();
        match id.socket.family {
            Family::Addac => {
                let mut io = BusChannelIo { bus: &mut self.regs };
                engine.enable(&mut io, id, tag, armed_by_host, enable_logging, &mut |s| signals.push(s))?;
            }
            Family::Mil => {
                let link = self.mil_link_of[flat].expect("bound above");
                let mut io = MilChannelIo { platform: &mut self.platform, link };
                engine.enable(&mut io, id, tag, armed_by_host, enable_logging, &mut |s| signals.push(s))?;
            }
        }
        self.channels[flat] = Some(engine);
        self.flush_signals(flat, &signals)
    }

    /// `ACTIVE/ARMED -> STOPPED -> unassigned` (spec.md §3 lifecycle,
    /// §4.G "DISABLE command"): tears the engine down, then frees the
    /// flat channel's slot so a later `ENABLE` starts clean.
    fn cmd_disable(&mut self, flat: usize) -> Result<(), Error> {
        if flat >= MAX_FG_CHANNELS {
            return Err(Error::InvalidChannel);
        }
        let Some(family) = self.channel_family(flat) else {
            return Ok(()); // already unassigned; DISABLE on an idle slot is a no-op
        };
        let mut signals = SignalBuf::new();
        match family {
            Family::Addac => {
                let Some(engine) = self.channels[flat].as_mut() else { return Ok(()) };
                let mut io = BusChannelIo { bus: &mut self.regs };
                engine.disable(&mut io, &mut self.ram, &mut |s| signals.push(s))?;
            }
            Family::Mil => {
                let Some(link) = self.mil_link_of[flat] else { return Ok(()) };
                let Some(engine) = self.channels[flat].as_mut() else { return Ok(()) };
                let mut io = MilChannelIo { platform: &mut self.platform, link };
                engine.disable(&mut io, &mut self.ram, &mut |s| signals.push(s))?;
            }
        }
        if let Some(link) = self.mil_link_of[flat] {
            if let Some(local) = self.mil_local_for_flat(flat, link) {
                self.mil_links[link as usize].mark_stopped(local, true);
            }
            self.mil_link_of[flat] = None;
        }
        self.channels[flat] = None;
        self.flush_signals(flat, &signals)
    }

    /// `RESET(subsystem)` (spec.md §6): reinitializes just that
    /// subsystem's runtime state; other subsystems are untouched
    /// (spec.md §7 "errors local to one link/channel do not propagate").
    fn cmd_reset(&mut self, subsystem: Subsystem) -> Result<(), Error> {
        match subsystem {
            Subsystem::Addac => {
                for flat in 0..MAX_FG_CHANNELS {
                    if self.channel_family(flat) == Some(Family::Addac) {
                        self.channels[flat] = None;
                    }
                }
            }
            Subsystem::Mil => {
                for flat in 0..MAX_FG_CHANNELS {
                    if self.channel_family(flat) == Some(Family::Mil) {
                        self.channels[flat] = None;
                    }
                }
                self.clear_mil_routing();
            }
            Subsystem::Log => {
                LogProducer::format(&mut self.ram, self.log_admin_addr, self.log_payload_addr, layout::LOG_CAPACITY_RECORDS)?;
            }
        }
        Ok(())
    }

    /// `MIL_GAP_INTERVAL(ms)` (spec.md §6): `0` disables gap reading,
    /// matching spec.md §9's "off by default" stance on the
    /// experimental feature.
    fn cmd_mil_gap_interval(&mut self, ms: u16) -> Result<(), Error> {
        let interval_ns = if ms == 0 { None } else { Some(ms as u64 * 1_000_000) };
        for link in self.mil_links.iter_mut() {
            link.set_gap_interval(interval_ns);
        }
        Ok(())
    }

    /// `SCAN` (spec.md §6): drops the stable `(link, channel) ->
    /// task_slot` allocation. Device rediscovery itself goes through
    /// `Platform::find_device`, out of this crate's scope (spec.md §9).
    fn cmd_scan(&mut self) -> Result<(), Error> {
        for flat in 0..MAX_FG_CHANNELS {
            self.channels[flat] = None;
        }
        self.clear_mil_routing();
        Ok(())
    }
}
