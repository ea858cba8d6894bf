#![cfg_attr(not(test), no_main)]
#![cfg_attr(not(test), no_std)]

//! SCU front-end firmware entry point (spec.md §5 "mode 1: bare-metal
//! cooperative scheduler"): constructs the two `VolatileBus` handles
//! (register file, bulk RAM) and the target [`platform::Platform`],
//! wires them into one [`ctx::FirmwareCtx`], and loops on `schedule()`
//! forever. Grounded on the teacher's own bare-metal entry points
//! (`loader/src/main.rs`, `bao1x-boot/boot0|boot1/src/main.rs`): same
//! `no_main`/`no_std` split against `test`, same bare `#[panic_handler]`.

mod ctx;
mod hw_platform;
mod io;
mod layout;
mod platform;

use hw_platform::HwPlatform;
use scu_bus::VolatileBus;

/// Register file base address (spec.md §6: "visible to host as a flat
/// 32-bit address space"); `ram` is the much larger bulk-RAM window
/// `layout::BULK_RAM_BASE` offsets are relative to. Both are this
/// crate's own implementer choice (see `layout.rs`), not values carried
/// from the retrieved pack.
const REGS_BASE: usize = 0x4000_0000;
const REGS_LEN: u32 = 0x0020_0000;
// The `ram` bus carries both the fixed-offset segment rings (low
// addresses, see layout::SEGMENT_RING_*_BASE) and the MMU-allocated
// DAQ/log rings anchored at `layout::BULK_RAM_BASE`, so its length
// must cover the latter's end, not just the 4 MiB directory itself.
const RAM_LEN: u32 = layout::BULK_RAM_BASE + layout::MMU_CAPACITY_WORDS * 4;

#[cfg(not(test))]
mod panic_handler {
    use core::panic::PanicInfo;

    #[panic_handler]
    fn handle_panic(_info: &PanicInfo) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}

/// Entrypoint, jumped to from the target's reset-vector/assembly stub
/// (out of scope per spec.md §1 -- the retrieved pack's own
/// `asm.rs`/linker-script bring-up is board-specific and this crate
/// does not ship one).
///
/// # Safety
/// Called exactly once, before any other firmware code runs, on a
/// target where `REGS_BASE`/`layout::BULK_RAM_BASE` are live, correctly
/// sized MMIO and RAM windows.
#[cfg_attr(not(test), export_name = "rust_entry")]
pub unsafe extern "C" fn rust_entry() -> ! {
    let regs = VolatileBus::new(REGS_BASE as *mut u8, REGS_LEN);
    let ram = VolatileBus::new(layout::BULK_RAM_BASE as *mut u8, RAM_LEN);
    let hw_platform = HwPlatform::new(REGS_BASE as *mut u32);

    let mut fw = ctx::FirmwareCtx::new(regs, ram, hw_platform);
    fw.init().expect("firmware init failed");

    loop {
        // A bus or downstream error here is fatal on this cooperative
        // target: there is no supervisor to restart `schedule()`, and
        // spec.md §4.A treats `BusError` as the caller's to decide --
        // for the bare-metal main loop that decision is "halt, don't
        // silently skip a pass".
        fw.schedule().expect("schedule() failed");
    }
}
