//! Output sinks (spec.md §4.L), grounded on `logd_core.hpp`'s
//! `StringBuffer::sync()`, which dispatches a rendered line to
//! syslog, stdout or a log file depending on the command line.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use syslog::{Facility, Formatter3164, Logger, LoggerBackend};

pub enum Sink {
    Stdout,
    File(File),
    Syslog(Box<Logger<LoggerBackend, Formatter3164>>),
}

impl Sink {
    pub fn stdout() -> Self {
        Sink::Stdout
    }

    pub fn file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Sink::File(file))
    }

    pub fn syslog() -> Result<Self, syslog::Error> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: "scu-logd".into(),
            pid: std::process::id() as i32,
        };
        let logger = syslog::unix(formatter)?;
        Ok(Sink::Syslog(Box::new(logger)))
    }

    /// Whether this sink renders to a terminal-like destination, i.e.
    /// whether ANSI escape sequences embedded in text make sense here
    /// absent an explicit `--esc-sequences` override.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Sink::Stdout)
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{line}")
            }
            Sink::File(file) => writeln!(file, "{line}"),
            Sink::Syslog(logger) => logger.info(line).map_err(|e| io::Error::other(e.to_string())),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout => io::stdout().flush(),
            Sink::File(file) => file.flush(),
            Sink::Syslog(_) => Ok(()),
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
