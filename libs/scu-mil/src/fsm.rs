//! The per-link cooperative state machine (spec.md §4.H table).
//! Grounded on `scu_mil_fg_handler.c`'s `milTask()`: one call per
//! scheduler tick advances exactly one link by at most one state
//! transition, so N links interleave without any link blocking
//! another (spec.md §5: "no component holds a critical section across
//! a bus zycle on a different domain").

use crate::tasks::MAX_CHANNELS_PER_LINK;
use crate::MilError;

/// Duration of `PostIrqWait` (spec.md §4.H: "`wait_until = msg_time +
/// 200µs`"). Grounded on `scu_mil_fg_handler.c`'s
/// `POST_IRQ_WAITING_TIME` / `INTERVAL_200US`.
pub const POST_IRQ_WAITING_NS: u64 = 200_000;

/// Busy-retry bound before `FETCH_STATUS` gives up on a channel for
/// this round (spec.md §4.H, §8: "10 001 iterations: channel is
/// skipped"). Grounded on `scu_mil_fg_handler.c`'s `MIL_FSM_TIMEOUT`.
pub const MIL_FSM_TIMEOUT: u32 = 10_000;

/// Per-link FSM state (spec.md §4.H table). `PostIrqWait` is the
/// compile-time-optional phase spec.md §9 leaves open; this crate
/// treats it as a runtime choice (`MilLink::with_post_irq_waiting`)
/// defaulting to off, per spec.md's instruction not to guess past an
/// Open Question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Wait,
    PostIrqWait,
    FetchStatus,
    HandleIrqs,
    FetchData,
}

/// Result of polling one channel's status register (spec.md §4.H
/// `FETCH_STATUS`/`HANDLE_IRQS`): `state_irq` mirrors a channel
/// state-change IRQ (engine `ACTIVE`/`STOPPED` transitions, spec.md
/// §4.G), `data_request_irq` a data-request for the next segment,
/// `running` the hardware's own notion of whether the ramp is still
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelIrqStatus {
    pub state_irq: bool,
    pub data_request_irq: bool,
    pub running: bool,
}

/// The hardware I/O surface one MIL link is driven through. Every
/// method is non-blocking: a request that cannot complete immediately
/// returns `Err(MilError::RcvTaskBsy)` (device busy, caller retries) or
/// `Ok(None)` (request accepted, result not ready yet) rather than
/// parking the cooperative task loop.
pub trait MilTransport {
    /// Pops the next queued data-request message for this link, if
    /// any (spec.md §4.E's `queue_mil_fg`), returning the local channel
    /// index and its White Rabbit timestamp.
    fn poll_data_request(&mut self, link: u8) -> Option<(usize, u64)>;

    /// Issues a status-request task for `channel` at `task_slot`
    /// (spec.md §4.H `FETCH_STATUS`).
    fn request_status(&mut self, link: u8, task_slot: u8, channel: usize) -> Result<(), MilError>;

    /// Polls whether a previously issued status request has completed.
    fn poll_status(
        &mut self,
        link: u8,
        task_slot: u8,
        channel: usize,
    ) -> Result<Option<ChannelIrqStatus>, MilError>;

    /// Acknowledges a handled IRQ / writes end-of-block (spec.md §4.H
    /// `HANDLE_IRQS`: "write ack/end-of-block").
    fn ack_irq(&mut self, link: u8, task_slot: u8, channel: usize) -> Result<(), MilError>;

    /// Issues a sample read-task (spec.md §4.H `FETCH_DATA`).
    fn request_read(&mut self, link: u8, task_slot: u8, channel: usize) -> Result<(), MilError>;

    /// Polls whether the read issued above has completed, returning
    /// the raw sample (the "actual value"; `setValue` is supplied by
    /// the caller from the channel's last fed coefficient, spec.md
    /// §4.H `FETCH_DATA`: "`setValue = last_c_coeff`").
    fn poll_sample(&mut self, link: u8, task_slot: u8, channel: usize) -> Result<Option<u32>, MilError>;
}

/// Per-channel bookkeeping the FSM carries across ticks.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRecord {
    pub task_slot: u8,
    /// Set once the owning FG engine channel transitions to `Stopped`
    /// (spec.md §4.H: "one status-request task per non-stopped
    /// channel"); excluded from `FETCH_STATUS`/`FETCH_DATA` rounds.
    pub stopped: bool,
    busy_retries: u32,
    awaiting_data: bool,
    gap_due_at: Option<u64>,
}

impl ChannelRecord {
    pub fn new(task_slot: u8) -> Self {
        Self { task_slot, stopped: false, busy_retries: 0, awaiting_data: false, gap_due_at: None }
    }
}

/// Drives one serial link's cooperative FSM across `N` multiplexed
/// channels (`N <= MAX_CHANNELS_PER_LINK`). One `tick` call advances
/// the link by at most one state transition, the same granularity
/// `milTask()` gives the bare-metal scheduler loop (spec.md §5 mode 1).
pub struct MilLink<const N: usize> {
    link: u8,
    state: LinkState,
    wait_until_ns: u64,
    cursor: usize,
    /// Bitset of channels with a handled IRQ awaiting `FETCH_DATA`
    /// (`N <= 32`, enforced by `MilLink::new`).
    pending_reads: u32,
    post_irq_waiting_enabled: bool,
    gap_interval_ns: Option<u64>,
    /// `true` while the current `FetchData` round was entered from a
    /// gap timer rather than a served IRQ (spec.md §4.H "Gap reading":
    /// "gap-read samples carry a setValue invalid flag").
    gap_round: bool,
    channels: [ChannelRecord; N],
}

impl<const N: usize> MilLink<N> {
    pub fn new(link: u8, channels: [ChannelRecord; N]) -> Self {
        assert!(N <= MAX_CHANNELS_PER_LINK, "a link cannot multiplex more channels than task slots");
        Self {
            link,
            state: LinkState::Wait,
            wait_until_ns: 0,
            cursor: 0,
            pending_reads: 0,
            post_irq_waiting_enabled: false,
            gap_interval_ns: None,
            gap_round: false,
            channels,
        }
    }

    /// Enables the `PostIrqWait` phase (spec.md §9: configurable,
    /// off by default).
    pub fn with_post_irq_waiting(mut self, enabled: bool) -> Self {
        self.post_irq_waiting_enabled = enabled;
        self
    }

    /// Enables gap reading at the given interval (spec.md §4.H "Gap
    /// reading (optional)"); `None` (the default) disables it, per the
    /// source's own "experimental, does not work with the FESA class"
    /// warning (spec.md §9).
    pub fn with_gap_reading(mut self, interval_ns: Option<u64>) -> Self {
        self.gap_interval_ns = interval_ns;
        self
    }

    /// Runtime equivalent of `with_gap_reading`, for the host's
    /// `MIL_GAP_INTERVAL` command (spec.md §6) toggling gap reading on
    /// a link that may already be mid-cycle.
    pub fn set_gap_interval(&mut self, interval_ns: Option<u64>) {
        self.gap_interval_ns = interval_ns;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Binds `channel`'s task slot, for the host's `ENABLE` command
    /// assigning a freshly scanned-in channel its
    /// `scu_mil::TaskSlotTable`-allocated slot (spec.md §4.H "Task-slot
    /// allocation"). Also clears `stopped`, since a slot is only bound
    /// when a channel is being armed.
    pub fn bind_task_slot(&mut self, channel: usize, task_slot: u8) {
        if let Some(rec) = self.channels.get_mut(channel) {
            rec.task_slot = task_slot;
            rec.stopped = false;
        }
    }

    pub fn mark_stopped(&mut self, channel: usize, stopped: bool) {
        if let Some(rec) = self.channels.get_mut(channel) {
            rec.stopped = stopped;
            if stopped {
                rec.gap_due_at = None;
            }
        }
    }

    /// Advances the link by one step. `on_irq` is called once per
    /// channel whose status indicates a state-IRQ or data-request
    /// (spec.md §4.H `HANDLE_IRQS`: "advance engine (4.G)"); `on_sample`
    /// once per completed read, with the gap-invalid flag set for
    /// gap-triggered rounds.
    pub fn tick(
        &mut self,
        transport: &mut impl MilTransport,
        now_ns: u64,
        on_irq: &mut dyn FnMut(usize, ChannelIrqStatus),
        on_sample: &mut dyn FnMut(usize, u32, bool),
    ) {
        match self.state {
            LinkState::Wait => self.tick_wait(transport, now_ns),
            LinkState::PostIrqWait => self.tick_post_irq_wait(now_ns),
            LinkState::FetchStatus => self.tick_fetch_status(transport),
            LinkState::HandleIrqs => self.tick_handle_irqs(transport, on_irq),
            LinkState::FetchData => self.tick_fetch_data(transport, now_ns, on_sample),
        }
    }

    fn begin_fetch_status(&mut self) {
        self.cursor = 0;
        self.state = LinkState::FetchStatus;
    }

    fn tick_wait(&mut self, transport: &mut impl MilTransport, now_ns: u64) {
        if let Some((_channel, msg_time)) = transport.poll_data_request(self.link) {
            if self.post_irq_waiting_enabled {
                self.wait_until_ns = msg_time + POST_IRQ_WAITING_NS;
                self.state = LinkState::PostIrqWait;
            } else {
                self.begin_fetch_status();
            }
            return;
        }
        let Some(gap_ns) = self.gap_interval_ns else { return };
        let _ = gap_ns;
        for i in 0..N {
            if self.channels[i].stopped {
                continue;
            }
            if let Some(due) = self.channels[i].gap_due_at {
                if now_ns >= due {
                    self.channels[i].gap_due_at = None;
                    self.pending_reads = 1 << i;
                    self.gap_round = true;
                    self.cursor = 0;
                    self.state = LinkState::FetchData;
                    return;
                }
            }
        }
    }

    fn tick_post_irq_wait(&mut self, now_ns: u64) {
        if now_ns >= self.wait_until_ns {
            self.begin_fetch_status();
        }
    }

    fn tick_fetch_status(&mut self, transport: &mut impl MilTransport) {
        while self.cursor < N {
            let idx = self.cursor;
            if self.channels[idx].stopped {
                self.cursor += 1;
                continue;
            }
            let slot = self.channels[idx].task_slot;
            match transport.request_status(self.link, slot, idx) {
                Ok(()) => {
                    self.channels[idx].busy_retries = 0;
                    self.cursor += 1;
                }
                Err(MilError::RcvTaskBsy) => {
                    self.channels[idx].busy_retries += 1;
                    if self.channels[idx].busy_retries > MIL_FSM_TIMEOUT {
                        log::warn!("mil link {} channel {idx}: status request busy timeout, skipping", self.link);
                        self.channels[idx].busy_retries = 0;
                        self.cursor += 1;
                        continue;
                    }
                    return; // remain in FetchStatus, retry this channel next tick
                }
                Err(e) => {
                    log::warn!("mil link {} channel {idx}: status request error {e:?}", self.link);
                    self.cursor += 1;
                }
            }
        }
        self.cursor = 0;
        self.state = LinkState::HandleIrqs;
    }

    fn tick_handle_irqs(&mut self, transport: &mut impl MilTransport, on_irq: &mut dyn FnMut(usize, ChannelIrqStatus)) {
        let mut handled_any = false;
        while self.cursor < N {
            let idx = self.cursor;
            if self.channels[idx].stopped {
                self.cursor += 1;
                continue;
            }
            let slot = self.channels[idx].task_slot;
            match transport.poll_status(self.link, slot, idx) {
                Ok(Some(status)) => {
                    if status.state_irq || status.data_request_irq {
                        on_irq(idx, status);
                        if let Err(e) = transport.ack_irq(self.link, slot, idx) {
                            log::warn!("mil link {} channel {idx}: ack failed {e:?}", self.link);
                        }
                        self.pending_reads |= 1 << idx;
                        handled_any = true;
                    }
                    self.cursor += 1;
                }
                Ok(None) => return, // still pending; retry same channel next tick
                Err(e) => {
                    log::warn!("mil link {} channel {idx}: status poll error {e:?}", self.link);
                    self.cursor += 1;
                }
            }
        }
        self.gap_round = false;
        if handled_any {
            self.cursor = 0;
            self.state = LinkState::FetchData;
        } else {
            log::debug!("mil link {}: no channel reported an irq this round", self.link);
            self.state = LinkState::Wait;
        }
    }

    fn tick_fetch_data(&mut self, transport: &mut impl MilTransport, now_ns: u64, on_sample: &mut dyn FnMut(usize, u32, bool)) {
        while self.cursor < N {
            let idx = self.cursor;
            if self.pending_reads & (1 << idx) == 0 {
                self.cursor += 1;
                continue;
            }
            let slot = self.channels[idx].task_slot;
            if !self.channels[idx].awaiting_data {
                match transport.request_read(self.link, slot, idx) {
                    Ok(()) => self.channels[idx].awaiting_data = true,
                    Err(e) => {
                        log::warn!("mil link {} channel {idx}: read request error {e:?}", self.link);
                        self.pending_reads &= !(1 << idx);
                        self.cursor += 1;
                        continue;
                    }
                }
            }
            match transport.poll_sample(self.link, slot, idx) {
                Ok(Some(sample)) => {
                    on_sample(idx, sample, self.gap_round);
                    if !self.gap_round {
                        if let Some(gap_ns) = self.gap_interval_ns {
                            self.channels[idx].gap_due_at = Some(now_ns + gap_ns);
                        }
                    }
                    self.channels[idx].awaiting_data = false;
                    self.pending_reads &= !(1 << idx);
                    self.cursor += 1;
                }
                Ok(None) => return, // still pending
                Err(e) => {
                    log::warn!("mil link {} channel {idx}: sample read error {e:?}", self.link);
                    self.channels[idx].awaiting_data = false;
                    self.pending_reads &= !(1 << idx);
                    self.cursor += 1;
                }
            }
        }
        self.state = LinkState::Wait;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeTransport {
        data_requests: VecDeque<(usize, u64)>,
        busy_once: bool,
        status: [Option<ChannelIrqStatus>; 4],
        samples: [Option<u32>; 4],
    }

    impl MilTransport for FakeTransport {
        fn poll_data_request(&mut self, _link: u8) -> Option<(usize, u64)> {
            self.data_requests.pop_front()
        }
        fn request_status(&mut self, _link: u8, _task_slot: u8, channel: usize) -> Result<(), MilError> {
            if self.busy_once {
                self.busy_once = false;
                return Err(MilError::RcvTaskBsy);
            }
            let _ = channel;
            Ok(())
        }
        fn poll_status(&mut self, _link: u8, _task_slot: u8, channel: usize) -> Result<Option<ChannelIrqStatus>, MilError> {
            Ok(self.status[channel].take())
        }
        fn ack_irq(&mut self, _link: u8, _task_slot: u8, _channel: usize) -> Result<(), MilError> {
            Ok(())
        }
        fn request_read(&mut self, _link: u8, _task_slot: u8, _channel: usize) -> Result<(), MilError> {
            Ok(())
        }
        fn poll_sample(&mut self, _link: u8, _task_slot: u8, channel: usize) -> Result<Option<u32>, MilError> {
            Ok(self.samples[channel].take())
        }
    }

    fn link() -> MilLink<2> {
        MilLink::new(0, [ChannelRecord::new(1), ChannelRecord::new(2)])
    }

    #[test]
    fn full_round_trip_wait_to_fetch_data_to_wait() {
        let mut l = link();
        let mut transport = FakeTransport::default();
        transport.data_requests.push_back((0, 1_000));
        transport.status[0] = Some(ChannelIrqStatus { data_request_irq: true, ..Default::default() });
        transport.samples[0] = Some(4242);

        let mut irqs = Vec::new();
        let mut samples = Vec::new();
        let mut on_irq = |ch: usize, st: ChannelIrqStatus| irqs.push((ch, st));
        let mut on_sample = |ch: usize, v: u32, gap: bool| samples.push((ch, v, gap));

        assert_eq!(l.state(), LinkState::Wait);
        l.tick(&mut transport, 0, &mut on_irq, &mut on_sample); // Wait -> FetchStatus
        assert_eq!(l.state(), LinkState::FetchStatus);
        l.tick(&mut transport, 0, &mut on_irq, &mut on_sample); // FetchStatus -> HandleIrqs
        assert_eq!(l.state(), LinkState::HandleIrqs);
        l.tick(&mut transport, 0, &mut on_irq, &mut on_sample); // HandleIrqs -> FetchData
        assert_eq!(l.state(), LinkState::FetchData);
        assert_eq!(irqs.len(), 1);
        l.tick(&mut transport, 0, &mut on_irq, &mut on_sample); // FetchData -> Wait
        assert_eq!(l.state(), LinkState::Wait);
        assert_eq!(samples, vec![(0, 4242, false)]);
    }

    #[test]
    fn post_irq_wait_delays_fetch_status_until_deadline() {
        let mut l = link().with_post_irq_waiting(true);
        let mut transport = FakeTransport::default();
        transport.data_requests.push_back((0, 1_000));
        let mut noop_irq = |_: usize, _: ChannelIrqStatus| {};
        let mut noop_sample = |_: usize, _: u32, _: bool| {};

        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample);
        assert_eq!(l.state(), LinkState::PostIrqWait);
        l.tick(&mut transport, 1_000 + POST_IRQ_WAITING_NS - 1, &mut noop_irq, &mut noop_sample);
        assert_eq!(l.state(), LinkState::PostIrqWait, "deadline not yet reached");
        l.tick(&mut transport, 1_000 + POST_IRQ_WAITING_NS, &mut noop_irq, &mut noop_sample);
        assert_eq!(l.state(), LinkState::FetchStatus);
    }

    #[test]
    fn task_busy_retries_then_recovers_without_losing_the_round() {
        let mut l = link();
        let mut transport = FakeTransport::default();
        transport.data_requests.push_back((0, 0));
        transport.busy_once = true;
        let mut noop_irq = |_: usize, _: ChannelIrqStatus| {};
        let mut noop_sample = |_: usize, _: u32, _: bool| {};

        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample); // Wait -> FetchStatus
        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample); // busy, stays in FetchStatus
        assert_eq!(l.state(), LinkState::FetchStatus);
        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample); // retries, now succeeds -> HandleIrqs
        assert_eq!(l.state(), LinkState::HandleIrqs);
    }

    #[test]
    fn handle_irqs_with_no_irqs_returns_to_wait() {
        let mut l = link();
        let mut transport = FakeTransport::default();
        transport.data_requests.push_back((0, 0));
        transport.status[0] = Some(ChannelIrqStatus::default());
        transport.status[1] = Some(ChannelIrqStatus::default());
        let mut noop_irq = |_: usize, _: ChannelIrqStatus| {};
        let mut noop_sample = |_: usize, _: u32, _: bool| {};

        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample); // -> FetchStatus
        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample); // -> HandleIrqs
        l.tick(&mut transport, 0, &mut noop_irq, &mut noop_sample); // no irqs -> Wait
        assert_eq!(l.state(), LinkState::Wait);
    }

    #[test]
    fn stopped_channel_is_skipped_in_fetch_status() {
        let mut l = link();
        l.mark_stopped(1, true);
        let mut transport = FakeTransport::default();
        transport.data_requests.push_back((0, 0));
        transport.status[0] = Some(ChannelIrqStatus { data_request_irq: true, ..Default::default() });
        transport.samples[0] = Some(1);
        let mut irqs = Vec::new();
        let mut on_irq = |ch: usize, _: ChannelIrqStatus| irqs.push(ch);
        let mut noop_sample = |_: usize, _: u32, _: bool| {};

        for _ in 0..4 {
            l.tick(&mut transport, 0, &mut on_irq, &mut noop_sample);
        }
        assert_eq!(irqs, vec![0], "channel 1 was stopped and never polled");
    }

    #[test]
    fn gap_read_round_marks_sample_as_set_value_invalid() {
        let mut l = link().with_gap_reading(Some(1_000));
        l.channels[0].gap_due_at = Some(500);
        let mut transport = FakeTransport::default();
        transport.samples[0] = Some(77);
        let mut noop_irq = |_: usize, _: ChannelIrqStatus| {};
        let mut samples = Vec::new();
        let mut on_sample = |ch: usize, v: u32, gap: bool| samples.push((ch, v, gap));

        l.tick(&mut transport, 500, &mut noop_irq, &mut on_sample); // Wait -> FetchData (gap)
        assert_eq!(l.state(), LinkState::FetchData);
        l.tick(&mut transport, 500, &mut noop_irq, &mut on_sample);
        assert_eq!(samples, vec![(0, 77, true)]);
    }
}
