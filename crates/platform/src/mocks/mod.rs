//! Mock implementations for testing
//!
//! Host-side stand-ins for every platform trait, with fault injection so the
//! diagnostic engine can be shown to actually find the faults it looks for.

#![cfg(any(test, feature = "std"))]

extern crate std;

use std::string::String;
use std::vec;
use std::vec::Vec;

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use crate::*;

// ── Simulated address space ─────────────────────────────────────────────────

struct Region {
    base: u32,
    words: Vec<u32>,
}

impl Region {
    fn slot(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(self.base)?;
        let index = usize::try_from(offset / WORD_BYTES).ok()?;
        (index < self.words.len()).then_some(index)
    }
}

#[derive(Clone, Copy)]
struct StuckBits {
    addr: u32,
    mask: u32,
    value: u32,
}

/// Word-addressable RAM simulator with fault injection.
///
/// Accesses outside every mapped region read as zero, drop writes, and are
/// counted so tests can assert that nothing strayed out of bounds.
#[derive(Default)]
pub struct SimulatedMemory {
    regions: Vec<Region>,
    stuck: Vec<StuckBits>,
    aliases: Vec<(u32, u32)>,
    reads: u64,
    writes: u64,
    out_of_range: u64,
    write_bounds: Option<(u32, u32)>,
}

impl SimulatedMemory {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `size` bytes of zeroed RAM at `base`.
    pub fn with_region(mut self, base: u32, size: u32) -> Self {
        self.map(base, size);
        self
    }

    /// Map `size` bytes of zeroed RAM at `base`.
    pub fn map(&mut self, base: u32, size: u32) {
        let words = usize::try_from(size / WORD_BYTES).unwrap_or(0);
        self.regions.push(Region {
            base,
            words: vec![0; words],
        });
    }

    /// Force the bits in `mask` of the word at `addr` to read as `value`.
    pub fn inject_stuck_bits(&mut self, addr: u32, mask: u32, value: u32) {
        self.stuck.push(StuckBits {
            addr: align_down(addr),
            mask,
            value: value & mask,
        });
    }

    /// Make accesses to `from` land on `to`, as a shorted address line would.
    pub fn inject_alias(&mut self, from: u32, to: u32) {
        self.aliases.push((align_down(from), align_down(to)));
    }

    /// Remove every injected fault.
    pub fn clear_faults(&mut self) {
        self.stuck.clear();
        self.aliases.clear();
    }

    /// Number of word reads performed.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of word writes performed.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Number of accesses that hit no mapped region.
    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }

    /// Lowest and highest word address written so far.
    pub fn write_bounds(&self) -> Option<(u32, u32)> {
        self.write_bounds
    }

    /// Forget the recorded write bounds.
    pub fn reset_write_bounds(&mut self) {
        self.write_bounds = None;
    }

    /// Stored word at `addr`, bypassing faults and counters.
    pub fn peek(&self, addr: u32) -> Option<u32> {
        self.regions
            .iter()
            .find_map(|r| r.slot(addr).and_then(|i| r.words.get(i).copied()))
    }

    fn resolve(&self, addr: u32) -> u32 {
        let addr = align_down(addr);
        self.aliases
            .iter()
            .find(|(from, _)| *from == addr)
            .map_or(addr, |(_, to)| *to)
    }

    fn cell(&mut self, addr: u32) -> Option<&mut u32> {
        self.regions
            .iter_mut()
            .find_map(|r| r.slot(addr).and_then(|i| r.words.get_mut(i)))
    }
}

impl RawMemory for SimulatedMemory {
    fn read_word(&mut self, addr: u32) -> u32 {
        self.reads = self.reads.saturating_add(1);
        let target = self.resolve(addr);
        let Some(stored) = self.cell(target).map(|w| *w) else {
            self.out_of_range = self.out_of_range.saturating_add(1);
            return 0;
        };
        self.stuck
            .iter()
            .filter(|s| s.addr == target)
            .fold(stored, |v, s| (v & !s.mask) | s.value)
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        self.writes = self.writes.saturating_add(1);
        let aligned = align_down(addr);
        self.write_bounds = Some(match self.write_bounds {
            Some((lo, hi)) => (lo.min(aligned), hi.max(aligned)),
            None => (aligned, aligned),
        });
        let target = self.resolve(addr);
        match self.cell(target) {
            Some(w) => *w = value,
            None => self.out_of_range = self.out_of_range.saturating_add(1),
        }
    }
}

// ── Backup registers ────────────────────────────────────────────────────────

/// In-memory backup registers. Survive "resets" as long as the value lives.
#[derive(Debug, Default, Clone)]
pub struct MockBackupRegisters {
    slots: [u32; 4],
    writes: u32,
}

impl MockBackupRegisters {
    /// All slots zero, as after a backup-domain reset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload slots as a previous session would have left them.
    pub fn with_values(op: u32, cycle: u32, error: u32, resets: u32) -> Self {
        Self {
            slots: [op, cycle, error, resets],
            writes: 0,
        }
    }

    /// Raw slot contents in index order.
    pub fn raw(&self) -> [u32; 4] {
        self.slots
    }

    /// Number of slot writes performed.
    pub fn write_count(&self) -> u32 {
        self.writes
    }
}

impl BackupRegisters for MockBackupRegisters {
    fn read(&self, slot: BackupSlot) -> u32 {
        self.slots.get(slot.index()).copied().unwrap_or(0)
    }

    fn write(&mut self, slot: BackupSlot, value: u32) {
        if let Some(s) = self.slots.get_mut(slot.index()) {
            *s = value;
            self.writes = self.writes.saturating_add(1);
        }
    }
}

// ── Supervisory timer ───────────────────────────────────────────────────────

/// Records configuration and service calls.
#[derive(Debug, Default, Clone)]
pub struct MockSupervisor {
    timeout_ms: Option<u32>,
    services: u32,
}

impl MockSupervisor {
    /// Unconfigured timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout passed to `configure`, if any.
    pub fn timeout_ms(&self) -> Option<u32> {
        self.timeout_ms
    }

    /// Number of `service` calls.
    pub fn services(&self) -> u32 {
        self.services
    }
}

impl SupervisoryTimer for MockSupervisor {
    fn configure(&mut self, timeout_ms: u32) {
        self.timeout_ms = Some(timeout_ms);
    }

    fn service(&mut self) {
        self.services = self.services.saturating_add(1);
    }
}

// ── Flash ───────────────────────────────────────────────────────────────────

/// NOR flash simulator with a model of a stale read cache.
///
/// Programming clears bits (`old & new`) and erase sets a page to `0xFF`, as
/// on real NOR flash. With [`MockFlash::set_stale_cache`] enabled, reads
/// return the array contents as of the last [`FlashArray::reset_cache`].
pub struct MockFlash {
    data: Vec<u8>,
    cached: Option<Vec<u8>>,
    stale_cache: bool,
    fail_erase: bool,
    fail_write: bool,
    flips: Vec<(u32, u8)>,
    erases: u32,
    cache_resets: u32,
}

impl MockFlash {
    /// Flash bus address used for reports.
    pub const BASE: u32 = 0x0800_0000;
    /// Page size.
    pub const PAGE: usize = 2048;

    /// Fully erased flash of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0xFF; capacity],
            cached: None,
            stale_cache: false,
            fail_erase: false,
            fail_write: false,
            flips: Vec::new(),
            erases: 0,
            cache_resets: 0,
        }
    }

    /// Make every following erase fail.
    pub fn fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    /// Make every following program operation fail.
    pub fn fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }

    /// XOR `mask` into the byte at `offset` on every read.
    pub fn inject_bit_flip(&mut self, offset: u32, mask: u8) {
        self.flips.push((offset, mask));
    }

    /// Serve reads from a snapshot taken at the last cache reset.
    pub fn set_stale_cache(&mut self, stale: bool) {
        self.stale_cache = stale;
        self.cached = stale.then(|| self.data.clone());
    }

    /// Number of successful page erases.
    pub fn erases(&self) -> u32 {
        self.erases
    }

    /// Number of `reset_cache` calls.
    pub fn cache_resets(&self) -> u32 {
        self.cache_resets
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(&*self, offset, bytes.len())?;
        let source = self.cached.as_ref().unwrap_or(&self.data);
        let start = usize::try_from(offset).map_err(|_| NorFlashErrorKind::OutOfBounds)?;
        let end = start
            .checked_add(bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        let src = source.get(start..end).ok_or(NorFlashErrorKind::OutOfBounds)?;
        bytes.copy_from_slice(src);
        for (flip_at, mask) in &self.flips {
            let Some(rel) = flip_at.checked_sub(offset) else {
                continue;
            };
            if let Some(b) = usize::try_from(rel).ok().and_then(|i| bytes.get_mut(i)) {
                *b ^= mask;
            }
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 8;
    const ERASE_SIZE: usize = Self::PAGE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(&*self, from, to)?;
        if self.fail_erase {
            return Err(NorFlashErrorKind::Other);
        }
        let from = usize::try_from(from).map_err(|_| NorFlashErrorKind::OutOfBounds)?;
        let to = usize::try_from(to).map_err(|_| NorFlashErrorKind::OutOfBounds)?;
        let page = self
            .data
            .get_mut(from..to)
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        page.fill(0xFF);
        self.erases = self.erases.saturating_add(1);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(&*self, offset, bytes.len())?;
        if self.fail_write {
            return Err(NorFlashErrorKind::Other);
        }
        let start = usize::try_from(offset).map_err(|_| NorFlashErrorKind::OutOfBounds)?;
        let end = start
            .checked_add(bytes.len())
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        let dst = self
            .data
            .get_mut(start..end)
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        for (d, s) in dst.iter_mut().zip(bytes) {
            *d &= *s;
        }
        Ok(())
    }
}

impl FlashArray for MockFlash {
    const BUS_BASE: u32 = Self::BASE;

    fn reset_cache(&mut self) {
        self.cache_resets = self.cache_resets.saturating_add(1);
        if self.stale_cache {
            self.cached = Some(self.data.clone());
        }
    }
}

// ── Report sink ─────────────────────────────────────────────────────────────

/// Collects every emitted line.
#[derive(Debug, Default, Clone)]
pub struct LineRecorder {
    lines: Vec<String>,
}

impl LineRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// `true` if any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Number of lines containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines.iter().filter(|l| l.contains(needle)).count()
    }

    /// Drop every recorded line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl ReportSink for LineRecorder {
    fn write_line(&mut self, line: &str) {
        self.lines.push(String::from(line));
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn simulated_memory_round_trips() {
        let mut mem = SimulatedMemory::new().with_region(0x2000_0000, 0x100);
        mem.write_word(0x2000_0010, 0xDEAD_BEEF);
        assert_eq!(mem.read_word(0x2000_0010), 0xDEAD_BEEF);
        assert_eq!(mem.out_of_range(), 0);
        assert_eq!(mem.write_bounds(), Some((0x2000_0010, 0x2000_0010)));
    }

    #[test]
    fn out_of_range_is_counted() {
        let mut mem = SimulatedMemory::new().with_region(0x2000_0000, 0x100);
        mem.write_word(0x2000_0100, 1);
        assert_eq!(mem.read_word(0x1FFF_FFFC), 0);
        assert_eq!(mem.out_of_range(), 2);
    }

    #[test]
    fn stuck_bits_override_reads() {
        let mut mem = SimulatedMemory::new().with_region(0x2000_0000, 0x100);
        mem.inject_stuck_bits(0x2000_0004, 0x0000_0100, 0);
        mem.write_word(0x2000_0004, 0xFFFF_FFFF);
        assert_eq!(mem.read_word(0x2000_0004), 0xFFFF_FEFF);
        assert_eq!(mem.peek(0x2000_0004), Some(0xFFFF_FFFF));
    }

    #[test]
    fn alias_redirects_both_directions() {
        let mut mem = SimulatedMemory::new().with_region(0x2000_0000, 0x100);
        mem.inject_alias(0x2000_0040, 0x2000_0000);
        mem.write_word(0x2000_0000, 7);
        mem.write_word(0x2000_0040, 9);
        assert_eq!(mem.read_word(0x2000_0000), 9);
        assert_eq!(mem.read_word(0x2000_0040), 9);
    }

    #[test]
    fn backup_registers_keep_values() {
        let mut regs = MockBackupRegisters::with_values(0x41, 37, 6, 2);
        assert_eq!(regs.read(BackupSlot::Cycle), 37);
        regs.write(BackupSlot::ErrorCode, 0);
        assert_eq!(regs.raw(), [0x41, 37, 0, 2]);
        assert_eq!(regs.write_count(), 1);
    }

    #[test]
    fn flash_programs_like_nor() {
        let mut flash = MockFlash::new(4 * MockFlash::PAGE);
        flash.write(0, &[0x0F; 8]).unwrap();
        flash.write(0, &[0xF1; 8]).unwrap();
        let mut buf = [0u8; 8];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x01; 8]);

        flash.erase(0, 2048).unwrap();
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);
        assert_eq!(flash.erases(), 1);
    }

    #[test]
    fn flash_rejects_misaligned_write() {
        let mut flash = MockFlash::new(MockFlash::PAGE);
        assert_eq!(flash.write(3, &[0; 8]), Err(NorFlashErrorKind::NotAligned));
    }

    #[test]
    fn flash_failure_injection() {
        let mut flash = MockFlash::new(MockFlash::PAGE);
        flash.fail_erase(true);
        assert_eq!(flash.erase(0, 2048), Err(NorFlashErrorKind::Other));
        assert_eq!(flash.erases(), 0);
    }

    #[test]
    fn stale_cache_hides_writes_until_reset() {
        let mut flash = MockFlash::new(MockFlash::PAGE);
        flash.set_stale_cache(true);
        flash.write(0, &[0; 8]).unwrap();
        let mut buf = [0u8; 8];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);
        flash.reset_cache();
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn bit_flip_applies_inside_read_window_only() {
        let mut flash = MockFlash::new(MockFlash::PAGE);
        flash.inject_bit_flip(10, 0x01);
        let mut buf = [0u8; 4];
        flash.read(8, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0xFF, 0xFE, 0xFF]);
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn supervisor_counts_services() {
        let mut wd = MockSupervisor::new();
        wd.configure(2_000);
        wd.service();
        wd.service();
        assert_eq!(wd.timeout_ms(), Some(2_000));
        assert_eq!(wd.services(), 2);
    }

    #[test]
    fn recorder_searches_lines() {
        let mut rec = LineRecorder::new();
        rec.write_line("Address Error: addr=0x20000000");
        rec.write_line("clean start");
        assert!(rec.contains("Address Error"));
        assert_eq!(rec.count_containing("a"), 2);
    }
}
