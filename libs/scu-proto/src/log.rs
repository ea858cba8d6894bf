//! Log record wire layout (spec.md §3, §4.D, §6). Grounded on
//! `lm32_syslog.c`'s `SYSLOG_FIFO_ITEM_T` and the variadic `log(filter,
//! format, ...)` producer API: the format string is not copied, only
//! its address in firmware text is stored, and each argument occupies
//! one fixed-width parameter slot.

/// Build-time parameter slot count (`K` in spec.md §3/§4.D); must be
/// >= 4. Each `%`-conversion in a format string consumes exactly one
/// slot; conversions beyond this count are silently dropped.
pub const LOG_PARAM_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    /// White Rabbit TAI nanoseconds at the moment of the `log()` call.
    pub timestamp: u64,
    /// Caller-chosen filter value; the host daemon (4.L) can restrict
    /// which filter values it renders.
    pub filter: u32,
    /// Address of a NUL-terminated format string in firmware code
    /// memory (spec.md §3 invariant).
    pub format_addr: u32,
    pub params: [u32; LOG_PARAM_COUNT],
}

impl LogRecord {
    /// `timestamp(2 words) + filter(1) + format_addr(1) + K params`,
    /// each word a 32-bit RAM unit (spec.md §6's `u64 || u32 || u32 ||
    /// K x u32`).
    pub const WIRE_WORDS: usize = 4 + LOG_PARAM_COUNT;

    pub fn to_words(&self) -> [u32; Self::WIRE_WORDS] {
        let mut out = [0u32; Self::WIRE_WORDS];
        out[0] = (self.timestamp >> 32) as u32;
        out[1] = self.timestamp as u32;
        out[2] = self.filter;
        out[3] = self.format_addr;
        out[4..4 + LOG_PARAM_COUNT].copy_from_slice(&self.params);
        out
    }

    pub fn from_words(words: &[u32; Self::WIRE_WORDS]) -> Self {
        let timestamp = ((words[0] as u64) << 32) | words[1] as u64;
        let mut params = [0u32; LOG_PARAM_COUNT];
        params.copy_from_slice(&words[4..4 + LOG_PARAM_COUNT]);
        Self { timestamp, filter: words[2], format_addr: words[3], params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let rec = LogRecord {
            timestamp: 0xdead_beef_0000_0001,
            filter: 1,
            format_addr: 0x4000_1000,
            params: [42, 0x2000, 7, 0],
        };
        assert_eq!(LogRecord::from_words(&rec.to_words()), rec);
    }
}
