//! Memory diagnostic firmware - Main Entry Point
//!
//! Hardware-only entry point for STM32G473CB.

#![no_std]
#![no_main]

use cortex_m::peripheral::scb::Exception;
use embassy_executor::Spawner;
use embassy_stm32::flash::Flash;
use embassy_stm32::interrupt::{self, InterruptExt};
use embassy_time::Instant;

use firmware::boot;
use firmware::hal::registers::enable_flash_ecc_interrupt;
use firmware::hal::{
    DefmtSink, FlashController, HardwareBoard, Iwdg, RccCsr, TampBackupRegisters, VolatileBus,
    ECC_COUNTERS,
};
use memtest::CoverageScheduler;

// RTT transport for defmt
use defmt_rtt as _;
// Panic handler
use panic_probe as _;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    defmt::info!("Memory diagnostic firmware v{=str}", env!("CARGO_PKG_VERSION"));
    defmt::info!("Initializing STM32G473CB (Cortex-M4F, dual-bank flash)");

    // Step 1: clocks. The RTC source stays off so the backup domain survives.
    let p = embassy_stm32::init(boot::build_embassy_config());

    // Step 2: backup domain.
    // SAFETY: first and only unlock; no trap is enabled yet.
    let backup = unsafe { TampBackupRegisters::unlock() };

    // Steps 3-5: reset cause, IWDG, reconciliation.
    // SAFETY: nothing else reads or clears the RCC_CSR reset flags.
    let mut csr = unsafe { RccCsr::new() };
    let mut iwdg = Iwdg::new(p.IWDG);
    let mut sink = DefmtSink;
    let outcome = boot::recover_session(&mut csr, backup, &mut iwdg, &mut sink);
    defmt::info!("boot diagnosis: {}", outcome.diagnosis);

    // Step 6: route configurable faults to their own handlers instead of
    // escalating to HardFault, and take single-bit ECC events on FLASH.
    match cortex_m::Peripherals::take() {
        Some(mut cp) => {
            cp.SCB.enable(Exception::MemoryManagement);
            cp.SCB.enable(Exception::BusFault);
            cp.SCB.enable(Exception::UsageFault);
        }
        None => defmt::warn!("core peripherals already taken; faults escalate to HardFault"),
    }
    enable_flash_ecc_interrupt();
    // SAFETY: the FLASH handler only touches the backup registers, the
    // atomic ECC counters and FLASH_ECCR.
    unsafe { interrupt::FLASH.enable() };

    // Step 7: scheduler.
    let flash = FlashController::new(Flash::new_blocking(p.FLASH));
    // SAFETY: single instance; memory.x keeps firmware RAM inside the SRAM1
    // margin, so no test window overlaps our own data or stack.
    let memory = unsafe { VolatileBus::new() };
    let mut scheduler = CoverageScheduler::<HardwareBoard>::new(
        boot::coverage_config(),
        memory,
        flash,
        outcome.store,
        iwdg,
        sink,
    );
    scheduler.report_configuration();

    loop {
        let summary = scheduler.run_cycle(Instant::now().as_millis(), ECC_COUNTERS.snapshot());
        defmt::debug!(
            "cycle {=u64}: errors={=u32} advanced={=bool}",
            summary.cycle,
            summary.errors,
            summary.advanced
        );
    }
}
