use crate::{Bus, BusError};
use core::sync::atomic::{compiler_fence, Ordering};

/// Direct memory-mapped access to device registers and bulk RAM,
/// grounded on `libs/xous-pio/src/pio_generated.rs`'s `CSR<T>::r`/`w`:
/// a raw base pointer plus a `compiler_fence` bracketing every access
/// to prevent the compiler from reordering volatile reads/writes
/// relative to surrounding code. Firmware-only; never constructed on
/// the host side.
///
/// # Safety
/// `base` must point at a live, correctly sized MMIO or RAM region for
/// the lifetime of this struct. This is exactly the contract
/// `CSR::new` documents for its own raw base pointer.
pub struct VolatileBus {
    base: *mut u8,
    len: u32,
}

impl VolatileBus {
    /// # Safety
    /// See the struct-level safety note.
    pub unsafe fn new(base: *mut u8, len: u32) -> Self {
        Self { base, len }
    }

    fn check(&self, addr: u32, width: u32) -> Result<(), BusError> {
        if addr.saturating_add(width) > self.len {
            Err(BusError::OutOfRange)
        } else {
            Ok(())
        }
    }
}

macro_rules! volatile_accessors {
    ($read:ident, $write:ident, $ty:ty, $width:expr) => {
        fn $read(&self, addr: u32) -> Result<$ty, BusError> {
            self.check(addr, $width)?;
            compiler_fence(Ordering::SeqCst);
            let ptr = unsafe { self.base.add(addr as usize) } as *const $ty;
            Ok(unsafe { ptr.read_volatile() })
        }

        fn $write(&mut self, addr: u32, value: $ty) -> Result<(), BusError> {
            self.check(addr, $width)?;
            let ptr = unsafe { self.base.add(addr as usize) } as *mut $ty;
            unsafe { ptr.write_volatile(value) };
            compiler_fence(Ordering::SeqCst);
            Ok(())
        }
    };
}

impl Bus for VolatileBus {
    volatile_accessors!(read_u8, write_u8, u8, 1);
    volatile_accessors!(read_u16, write_u16, u16, 2);
    volatile_accessors!(read_u32, write_u32, u32, 4);
    volatile_accessors!(read_u64, write_u64, u64, 8);
}
