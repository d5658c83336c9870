//! Volatile register access for the STM32G473 (RM0440).
//!
//! Everything here is a zero-sized view over fixed MMIO addresses, so fault
//! handlers can build their own instances without sharing state with the
//! main loop.

use core::ptr;

use platform::backup::{BackupRegisters, BackupSlot};
use platform::reset::{ResetCauseSource, CSR_RMVF};
use platform::RawMemory;

const RCC_BASE: u32 = 0x4002_1000;
const RCC_APB1ENR1: u32 = RCC_BASE + 0x58;
const RCC_CSR: u32 = RCC_BASE + 0x94;
const APB1ENR1_RTCAPBEN: u32 = 1 << 10;
const APB1ENR1_PWREN: u32 = 1 << 28;

const PWR_CR1: u32 = 0x4000_7000;
const CR1_DBP: u32 = 1 << 8;

const TAMP_BKP0R: u32 = 0x4000_2400 + 0x100;

const FLASH_ACR: u32 = 0x4002_2000;
const FLASH_ECCR: u32 = FLASH_ACR + 0x18;
const ACR_ICEN: u32 = 1 << 9;
const ACR_DCEN: u32 = 1 << 10;
const ACR_ICRST: u32 = 1 << 11;
const ACR_DCRST: u32 = 1 << 12;

#[inline(always)]
fn reg(addr: u32) -> *mut u32 {
    addr as usize as *mut u32
}

/// # Safety
/// `addr` must be a readable, word-aligned device or memory address.
#[inline(always)]
unsafe fn read(addr: u32) -> u32 {
    // SAFETY: forwarded to the caller.
    unsafe { ptr::read_volatile(reg(addr)) }
}

/// # Safety
/// `addr` must be a writable, word-aligned device or memory address whose
/// contents nothing else relies on.
#[inline(always)]
unsafe fn write(addr: u32, value: u32) {
    // SAFETY: forwarded to the caller.
    unsafe { ptr::write_volatile(reg(addr), value) }
}

/// # Safety
/// As for [`write`].
#[inline(always)]
unsafe fn modify(addr: u32, f: impl FnOnce(u32) -> u32) {
    // SAFETY: forwarded to the caller.
    unsafe { write(addr, f(read(addr))) }
}

// ── Memory under test ───────────────────────────────────────────────────────

/// Direct bus access to SRAM1, SRAM2, CCM SRAM and flash.
///
/// The scheduler only ever passes addresses inside a test window, and
/// `memory.x` keeps the firmware's own RAM inside the SRAM1 safety margin.
pub struct VolatileBus {
    _private: (),
}

impl VolatileBus {
    /// # Safety
    /// At most one instance may exist, and nothing else may own the memory
    /// covered by the configured test windows.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RawMemory for VolatileBus {
    fn read_word(&mut self, addr: u32) -> u32 {
        // SAFETY: addresses come from a planned window (see `new`).
        unsafe { read(addr) }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        // SAFETY: addresses come from a planned window (see `new`).
        unsafe { write(addr, value) }
    }
}

// ── Backup domain ───────────────────────────────────────────────────────────

/// TAMP_BKP0R..BKP3R, the four slots of the fault-diagnosis store.
///
/// Retained across every reset except a backup-domain reset or loss of both
/// VDD and VBAT.
#[derive(Clone, Copy)]
pub struct TampBackupRegisters {
    _private: (),
}

impl TampBackupRegisters {
    /// Clock the backup interface and lift its write protection, then return
    /// a handle.
    ///
    /// # Safety
    /// Must run once at boot, before any [`steal`](Self::steal).
    pub unsafe fn unlock() -> Self {
        // SAFETY: RCC and PWR are fixed MMIO; setting enable bits is idempotent.
        unsafe {
            modify(RCC_APB1ENR1, |v| v | APB1ENR1_PWREN | APB1ENR1_RTCAPBEN);
            modify(PWR_CR1, |v| v | CR1_DBP);
        }
        Self { _private: () }
    }

    /// Another handle to the already-unlocked registers.
    ///
    /// # Safety
    /// [`unlock`](Self::unlock) must have run. Callers racing the main loop
    /// accept the tearing described on `FaultDiagnosisStore`.
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }

    fn addr(slot: BackupSlot) -> u32 {
        // index() < 4, so the offset cannot overflow.
        let offset = u32::try_from(slot.index()).unwrap_or(0).wrapping_mul(4);
        TAMP_BKP0R.wrapping_add(offset)
    }
}

impl BackupRegisters for TampBackupRegisters {
    fn read(&self, slot: BackupSlot) -> u32 {
        // SAFETY: TAMP_BKPxR is always readable once RTCAPB is clocked.
        unsafe { read(Self::addr(slot)) }
    }

    fn write(&mut self, slot: BackupSlot, value: u32) {
        // SAFETY: the backup registers hold nothing but the diagnostic record.
        unsafe { write(Self::addr(slot), value) }
    }
}

// ── Reset cause ─────────────────────────────────────────────────────────────

/// RCC_CSR reset flags.
pub struct RccCsr {
    _private: (),
}

impl RccCsr {
    /// # Safety
    /// At most one instance; nothing else may clear the reset flags.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl ResetCauseSource for RccCsr {
    fn take_raw(&mut self) -> u32 {
        // SAFETY: RCC_CSR is fixed MMIO; RMVF only clears the reset flags.
        unsafe {
            let csr = read(RCC_CSR);
            modify(RCC_CSR, |v| v | CSR_RMVF);
            csr
        }
    }
}

// ── Flash controller ────────────────────────────────────────────────────────

/// Invalidate both flash caches: disable, pulse the reset bit, re-enable.
///
/// The caches can only be reset while disabled.
pub fn reset_flash_caches() {
    // SAFETY: FLASH_ACR is fixed MMIO; only the cache bits are touched, and
    // executing from flash with the caches off is merely slower.
    unsafe {
        modify(FLASH_ACR, |v| v & !(ACR_ICEN | ACR_DCEN));
        modify(FLASH_ACR, |v| v | ACR_ICRST | ACR_DCRST);
        modify(FLASH_ACR, |v| v & !(ACR_ICRST | ACR_DCRST));
        modify(FLASH_ACR, |v| v | ACR_ICEN | ACR_DCEN);
    }
}

/// Raw FLASH_ECCR.
pub fn flash_eccr() -> u32 {
    // SAFETY: read-only access to a status register.
    unsafe { read(FLASH_ECCR) }
}

/// Clear the ECC flags reported in `eccr` (write-1-to-clear), keeping the
/// interrupt enable as it was.
pub fn clear_flash_ecc(eccr: u32) {
    use platform::flash::{ECCR_ECCC, ECCR_ECCCIE, ECCR_ECCD};
    let flags = eccr & (ECCR_ECCC | ECCR_ECCD);
    // SAFETY: ECCC/ECCD are rc_w1; writing zero elsewhere leaves the address
    // fields (read-only) and other flags alone.
    unsafe { write(FLASH_ECCR, flags | (eccr & ECCR_ECCCIE)) }
}

/// Enable the single-error ECC interrupt. Double errors always raise NMI.
pub fn enable_flash_ecc_interrupt() {
    use platform::flash::ECCR_ECCCIE;
    // SAFETY: only the interrupt enable is set; flag bits are written as zero.
    unsafe { write(FLASH_ECCR, ECCR_ECCCIE) }
}
