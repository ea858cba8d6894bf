//! Per-channel tuple throttling (spec.md §4.K "Throttling").
//!
//! Grounded on `scu_fg_feedback.cpp`'s combined act/set forwarding
//! window: rather than gating the act-value and set-value streams
//! separately (the tuple callback only ever hands both values across in
//! one call), this keeps one last-forwarded/last-suppressed tuple per
//! channel and forwards as soon as either value clears its own
//! threshold or the timeout elapses -- documented as an implementer
//! decision in DESIGN.md since spec.md phrases the two thresholds as
//! "independent" without specifying how a single combined callback
//! should reconcile them.

/// One forwarded or suppressed `(timestamp, actValue, setValue)` tuple.
pub type Tuple = (u64, u32, u32);

/// Forwards a tuple if either value has moved by at least its own
/// threshold since the last *forwarded* tuple, or enough time has
/// passed. A suppressed tuple is remembered and, if the very next
/// tuple is forwarded, emitted first -- so a plotted line still
/// connects through the gap (spec.md §4.K).
pub struct PairThrottle {
    act_threshold: u32,
    set_threshold: u32,
    timeout_ns: u64,
    last_forwarded: Option<Tuple>,
    pending_suppressed: Option<Tuple>,
}

impl PairThrottle {
    pub fn new(act_threshold: u32, set_threshold: u32, timeout_ns: u64) -> Self {
        Self { act_threshold, set_threshold, timeout_ns, last_forwarded: None, pending_suppressed: None }
    }

    /// Returns the tuples that should now be delivered to the
    /// application callback, in order: at most one carried-over
    /// suppressed tuple, then `tuple` itself if it clears the gate.
    /// Empty if `tuple` is suppressed.
    pub fn offer(&mut self, tuple: Tuple) -> impl Iterator<Item = Tuple> {
        let (timestamp, act, set) = tuple;
        let should_forward = match self.last_forwarded {
            None => true,
            Some((last_ts, last_act, last_set)) => {
                let act_moved = act.abs_diff(last_act) >= self.act_threshold;
                let set_moved = set.abs_diff(last_set) >= self.set_threshold;
                let timed_out = timestamp.saturating_sub(last_ts) >= self.timeout_ns;
                act_moved || set_moved || timed_out
            }
        };

        let mut out = [None, None];
        if should_forward {
            out[0] = self.pending_suppressed.take();
            out[1] = Some(tuple);
            self.last_forwarded = Some(tuple);
        } else {
            self.pending_suppressed = Some(tuple);
        }
        out.into_iter().flatten()
    }
}
