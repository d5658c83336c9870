//! Independent watchdog as the supervisory timer.

use embassy_stm32::peripherals::IWDG;
use embassy_stm32::wdg::IndependentWatchdog;
use platform::SupervisoryTimer;

/// IWDG driven through embassy.
///
/// The peripheral is held until [`SupervisoryTimer::configure`] so the
/// timeout can come from the recovery monitor rather than from boot code.
pub struct Iwdg {
    peripheral: Option<IWDG>,
    running: Option<IndependentWatchdog<'static, IWDG>>,
}

impl Iwdg {
    /// Wrap the (not yet started) watchdog peripheral.
    pub fn new(peripheral: IWDG) -> Self {
        Self {
            peripheral: Some(peripheral),
            running: None,
        }
    }
}

impl SupervisoryTimer for Iwdg {
    fn configure(&mut self, timeout_ms: u32) {
        // The IWDG can be started once per boot; later calls are ignored.
        let Some(peripheral) = self.peripheral.take() else {
            return;
        };
        let mut wdg = IndependentWatchdog::new(peripheral, timeout_ms.saturating_mul(1_000));
        wdg.unleash();
        self.running = Some(wdg);
    }

    fn service(&mut self) {
        if let Some(wdg) = self.running.as_mut() {
            wdg.pet();
        }
    }
}
