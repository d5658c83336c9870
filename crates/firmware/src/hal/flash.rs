//! Flash array under test, backed by the embassy flash driver.
//!
//! The driver already speaks `embedded-storage`; this wrapper pins the page
//! and write granularity to the dual-bank G473 layout and adds the cache
//! reset the diagnostics need.

use embassy_stm32::flash::{Blocking, Error, Flash};
use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
use platform::memory_map::{FLASH_BASE, FLASH_PAGE_SIZE, FLASH_WRITE_SIZE};
use platform::FlashArray;

use super::registers::reset_flash_caches;

/// Whole flash array; offsets are relative to `0x0800_0000`.
pub struct FlashController {
    inner: Flash<'static, Blocking>,
}

impl FlashController {
    /// Take ownership of the blocking flash driver.
    pub fn new(inner: Flash<'static, Blocking>) -> Self {
        Self { inner }
    }
}

impl ErrorType for FlashController {
    type Error = Error;
}

impl ReadNorFlash for FlashController {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.inner.blocking_read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        usize::try_from(platform::memory_map::FLASH_SIZE).unwrap_or(0)
    }
}

impl NorFlash for FlashController {
    const WRITE_SIZE: usize = FLASH_WRITE_SIZE as usize;
    const ERASE_SIZE: usize = FLASH_PAGE_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.inner.blocking_erase(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.inner.blocking_write(offset, bytes)
    }
}

impl FlashArray for FlashController {
    const BUS_BASE: u32 = FLASH_BASE;

    fn reset_cache(&mut self) {
        reset_flash_caches();
    }
}
