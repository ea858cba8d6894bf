//! Log daemon (spec.md §4.L): pulls the front-end's log fifo over
//! Etherbone, filters, timestamp-converts and relays each record to
//! stdout, a log file or syslog. Grounded on the `lm32-logd` C++
//! tool's `Lm32Logd::operator()` poll loop.

mod ansi;
mod cli;
mod filter;
mod single_instance;
mod sink;
mod timestamp;

use std::thread;
use std::time::Duration;

use clap::Parser;
use cli::Cli;
use filter::FilterMask;
use scu_log::LogConsumer;
use single_instance::InstanceLock;
use sink::Sink;
use timestamp::TimestampMode;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(&cli) {
        log::error!("scu-logd: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = InstanceLock::acquire(&cli.device)?;

    let mut bus = scu_host_ram::connect(&cli.device, cli.window_len)?;
    let mut consumer = LogConsumer::new(&mut bus, cli.admin_addr, cli.payload_addr);

    let mut sink = match (&cli.logfile, cli.syslog) {
        (Some(path), false) => Sink::file(path)?,
        (None, true) => Sink::syslog()?,
        (None, false) => Sink::stdout(),
        (Some(_), true) => unreachable!("clap rejects --logfile with --syslog"),
    };

    let mask = FilterMask::new(cli.filter_flags);
    let strip_escapes = !cli.esc_sequences && !sink.is_terminal();
    let timestamp_mode = if cli.no_timestamp {
        None
    } else if cli.human_timestamp {
        Some(TimestampMode::Human { utc: cli.utc, local_offset_minutes: cli.local_time_offset })
    } else {
        Some(TimestampMode::Raw)
    };

    loop {
        let pulled = consumer.pull(cli.max_items_per_interval)?;
        for record in &pulled {
            if !mask.allows(record.filter) {
                continue;
            }
            let text = if strip_escapes { ansi::strip_csi(&record.text) } else { record.text.clone() };
            let line = render_line(cli, record.timestamp, record.filter, &text, timestamp_mode);
            if let Err(e) = sink.write_line(&line) {
                log::error!("scu-logd: write failed: {e}");
            }
        }
        sink.flush().ok();

        if cli.exit {
            break;
        }
        thread::sleep(Duration::from_millis(cli.poll_interval_ms));
    }
    Ok(())
}

fn render_line(cli: &Cli, timestamp: u64, filter: u32, text: &str, mode: Option<TimestampMode>) -> String {
    let mut line = String::new();
    if let Some(mode) = mode {
        line.push_str(&timestamp::render_timestamp(timestamp, mode));
        line.push(' ');
    }
    if cli.print_filter {
        line.push_str(&format!("[{filter:#010x}] "));
    }
    line.push_str(text);
    line
}
