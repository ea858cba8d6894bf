//! Command-line surface (spec.md §4.B tooling), grounded on
//! `mem_cmdline.hpp`'s `CommandLine`: browse the MMU directory, force
//! an allocation with an explicit tag and size, or clear it.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "scu-memmon", about = "Lists, allocates and clears tagged bulk-RAM segments")]
pub struct Cli {
    /// Front-end URL, e.g. `tcp/scuxl0123.acc`.
    #[arg(env = "SCU_DEVICE")]
    pub device: String,

    /// Byte address of the MMU anchor.
    #[arg(long, default_value_t = 0x1000)]
    pub mmu_addr: u32,

    /// MMU directory capacity, in 32-bit words.
    #[arg(long, default_value_t = 1 << 18)]
    pub capacity_words: u32,

    /// Byte length of the front-end's address space, for bounds checks.
    #[arg(long, default_value_t = 0x10_0000)]
    pub window_len: u32,

    #[arg(short, long)]
    pub verbose: bool,

    /// Clears the whole directory before any requested allocations.
    #[arg(short = 'd', long = "delete")]
    pub delete: bool,

    /// Allocates (or confirms) a segment: `TAG:SIZE_WORDS`, repeatable.
    #[arg(short = 'a', long = "alloc", value_parser = parse_segment)]
    pub segments: Vec<Segment>,

    /// Exits immediately after processing `--alloc`/`--delete`, without
    /// printing the directory listing.
    #[arg(short = 'x', long = "exit")]
    pub exit: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub tag: u16,
    pub size_words: u32,
}

fn parse_segment(s: &str) -> Result<Segment, String> {
    let (tag, size) = s.split_once(':').ok_or_else(|| format!("expected TAG:SIZE_WORDS, got '{s}'"))?;
    let tag = tag.trim().parse::<u16>().map_err(|e| e.to_string())?;
    let size_words = size.trim().parse::<u32>().map_err(|e| e.to_string())?;
    Ok(Segment { tag, size_words })
}
