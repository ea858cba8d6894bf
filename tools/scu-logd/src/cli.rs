//! Command-line surface (spec.md §4.L), grounded on the `lm32-logd`
//! C++ tool's `CommandLine` flag set. Flags the daemonization,
//! build-id and firmware-reset paths covered -- out of scope per
//! SPEC_FULL.md -- are not carried over.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "scu-logd", about = "Pulls, filters and relays a front-end's log fifo")]
pub struct Cli {
    /// Front-end URL, e.g. `tcp/scuxl0123.acc` or `tcp/192.168.1.5:60368`.
    /// Falls back to the `SCU_DEVICE` environment variable if omitted.
    #[arg(env = "SCU_DEVICE")]
    pub device: String,

    /// Address of the log ring's admin block.
    #[arg(long, default_value_t = 0x2000)]
    pub admin_addr: u32,

    /// Address of the log ring's payload base.
    #[arg(long, default_value_t = 0x2100)]
    pub payload_addr: u32,

    /// Byte length of the front-end's address space, for bounds checks.
    #[arg(long, default_value_t = 0x10_0000)]
    pub window_len: u32,

    /// Verbose (`-v`) enables debug-level logging of scu-logd itself.
    #[arg(short, long)]
    pub verbose: bool,

    /// Omit the timestamp column entirely.
    #[arg(long)]
    pub no_timestamp: bool,

    /// Render timestamps as human-readable date/time instead of raw
    /// TAI nanoseconds.
    #[arg(long)]
    pub human_timestamp: bool,

    /// Human timestamps are rendered in UTC (default: local time, per
    /// `--local-time-offset`).
    #[arg(long)]
    pub utc: bool,

    /// Minutes east of UTC to apply when rendering local human
    /// timestamps (ignored with `--utc` or raw timestamps).
    #[arg(long, default_value_t = 0)]
    pub local_time_offset: i64,

    /// Prefix each line with its numeric filter value.
    #[arg(long)]
    pub print_filter: bool,

    /// Only forward records whose filter value has at least one bit
    /// in common with this mask (default: all filters pass).
    #[arg(long, value_parser = parse_hex_u32, default_value = "0xffffffff")]
    pub filter_flags: u32,

    /// Pass ANSI escape sequences embedded in rendered text through
    /// unmodified. Without this, they are stripped (e.g. when
    /// `--logfile` or `--syslog` is used).
    #[arg(long)]
    pub esc_sequences: bool,

    /// Pull once, write out whatever is available, and exit (rather
    /// than polling forever).
    #[arg(long)]
    pub exit: bool,

    /// Polling interval in milliseconds between ring pulls.
    #[arg(long, default_value_t = 200)]
    pub poll_interval_ms: u64,

    /// Upper bound on records pulled per poll.
    #[arg(long, default_value_t = 64)]
    pub max_items_per_interval: usize,

    /// Write rendered lines to this file instead of stdout.
    #[arg(long)]
    pub logfile: Option<std::path::PathBuf>,

    /// Write rendered lines to the local syslog instead of stdout.
    #[arg(long, conflicts_with = "logfile")]
    pub syslog: bool,
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(s, 16).map_err(|e| e.to_string())
}
