//! Registered-device table consulted during descriptor verification
//! (spec.md §4.I step 3: "`slot` corresponds to a registered device;
//! `channel < MAX_CHANNELS_PER_DEVICE`").

use scu_proto::channel::MAX_SCU_SLAVES;

/// Sub-channels per physical slot. The retrieved pack does not carry
/// the original ADDAC device's exact channel count; 4 covers a set
/// value, an actual value, and headroom for a second FG sharing the
/// slot, and is recorded as an implementer decision in DESIGN.md rather
/// than guessed at the original's exact constant.
pub const MAX_CHANNELS_PER_DEVICE: usize = 4;

/// Fixed-size table of which `(slot, channel)` pairs are registered.
/// Slots are `1..=MAX_SCU_SLAVES`; index 0 is unused so `slot` can
/// index directly without an off-by-one subtraction.
pub struct DeviceRegistry {
    registered: [[bool; MAX_CHANNELS_PER_DEVICE]; MAX_SCU_SLAVES as usize + 1],
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { registered: [[false; MAX_CHANNELS_PER_DEVICE]; MAX_SCU_SLAVES as usize + 1] }
    }

    pub fn register(&mut self, slot: u8, channel: u8) {
        if let Some(row) = self.registered.get_mut(slot as usize) {
            if let Some(cell) = row.get_mut(channel as usize) {
                *cell = true;
            }
        }
    }

    pub fn unregister(&mut self, slot: u8, channel: u8) {
        if let Some(row) = self.registered.get_mut(slot as usize) {
            if let Some(cell) = row.get_mut(channel as usize) {
                *cell = false;
            }
        }
    }

    /// `slot` in range and `channel` within bounds and registered
    /// (spec.md §4.I step 3's three combined checks).
    pub fn is_registered(&self, slot: u8, channel: u8) -> bool {
        if slot == 0 || slot as u16 > MAX_SCU_SLAVES as u16 {
            return false;
        }
        self.registered
            .get(slot as usize)
            .and_then(|row| row.get(channel as usize))
            .copied()
            .unwrap_or(false)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_slot_is_rejected() {
        let reg = DeviceRegistry::new();
        assert!(!reg.is_registered(4, 0));
    }

    #[test]
    fn registered_channel_is_accepted_only_after_register() {
        let mut reg = DeviceRegistry::new();
        assert!(!reg.is_registered(4, 1));
        reg.register(4, 1);
        assert!(reg.is_registered(4, 1));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let reg = DeviceRegistry::new();
        assert!(!reg.is_registered(MAX_SCU_SLAVES + 1, 0));
        assert!(!reg.is_registered(0, 0));
    }

    #[test]
    fn channel_out_of_bounds_is_rejected() {
        let mut reg = DeviceRegistry::new();
        reg.register(1, 0);
        assert!(!reg.is_registered(1, MAX_CHANNELS_PER_DEVICE as u8));
    }
}
