//! MMU directory browser (spec.md §4.B tooling), grounded on
//! `mem-mon.cpp`'s `main()`: connect, optionally clear the directory,
//! process any requested allocations, then print the listing.
//!
//! `mem-mon.cpp` picks between `Ddr3Access` and `SramAccess` on a
//! vendor-id mismatch, since both wrap the RAM transport its `Browser`
//! reads through. Here `scu_mmu::Mmu` addresses the bus directly
//! rather than through a `RamAccess` wrapper, so there is no
//! generation-specific transport to pick between -- the same
//! `EtherboneBus` connection works for either hardware generation, and
//! the vendor-id branch has no counterpart to carry over (noted in
//! DESIGN.md).

mod cli;

use clap::Parser;
use cli::Cli;
use scu_mmu::{Mmu, Status};

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(&cli) {
        log::error!("scu-memmon: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut bus = scu_host_ram::connect(&cli.device, cli.window_len)?;
    let mut mmu = Mmu::new(&mut bus, cli.mmu_addr, cli.capacity_words);
    mmu.init()?;

    if cli.delete {
        if cli.verbose {
            println!("Deleting memory management partitions!");
        }
        mmu.delete()?;
        mmu.init()?;
    }

    for seg in &cli.segments {
        if cli.verbose {
            println!("Creating memory segment with tag: 0x{:x}, size: {}", seg.tag, seg.size_words);
        }
        let mut start = 0;
        let mut length = seg.size_words;
        match mmu.allocate(seg.tag, &mut start, &mut length, true)? {
            Status::Ok => {}
            Status::AlreadyPresent if length == seg.size_words => {}
            Status::AlreadyPresent => {
                log::warn!(
                    "segment 0x{:x} already allocated: requested {} words, actual {} words",
                    seg.tag,
                    seg.size_words,
                    length
                );
            }
            Status::OutOfMem => {
                return Err(format!("out of MMU space allocating tag 0x{:x} ({} words)", seg.tag, seg.size_words).into());
            }
            Status::TagNotFound => unreachable!("allocate was called with create=true"),
        }
    }

    if cli.exit {
        return Ok(());
    }

    print_directory(&mmu)?;
    Ok(())
}

fn print_directory<B: scu_bus::Bus>(mmu: &Mmu<'_, B>) -> Result<(), scu_mmu::Error> {
    let entries = mmu.list()?;
    if entries.is_empty() {
        println!("No memory management found!");
        return Ok(());
    }
    println!("{:>8} {:>10} {:>10} {:>6}", "tag", "start", "length", "flags");
    for entry in entries {
        println!("0x{:06x} {:>10} {:>10} {:>6}", entry.tag, entry.start_index, entry.length, entry.flags);
    }
    Ok(())
}
