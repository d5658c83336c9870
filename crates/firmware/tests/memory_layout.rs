//! Linker layout vs. test windows
//!
//! The firmware tests the same memory it runs from. These tests read the
//! workspace `memory.x` and check that no window the scheduler can ever
//! plan overlaps the image in flash or the firmware's RAM.
//!
//! Run with: cargo test -p firmware --test memory_layout
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use firmware::boot::coverage_config;
use memtest::{BankKind, WindowPlanner};
use platform::memory_map as map;

const MEMORY_X: &str = include_str!("../../../memory.x");

/// Value token following `key` on a `memory.x` region line.
fn field<'a>(line: &'a str, key: &str) -> &'a str {
    let rest = &line[line.find(key).unwrap() + key.len()..];
    let rest = rest.trim_start_matches([' ', '=']);
    rest.split(|c: char| c == ',' || c.is_whitespace()).next().unwrap()
}

/// `(origin, length)` of the named region in `memory.x`.
fn region(name: &str) -> (u32, u32) {
    let line = MEMORY_X
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(name) && l.contains("ORIGIN"))
        .unwrap_or_else(|| panic!("memory.x has no {name} region"));

    let origin = u32::from_str_radix(field(line, "ORIGIN").trim_start_matches("0x"), 16).unwrap();
    let length = field(line, "LENGTH");
    let length = match length.strip_suffix('K') {
        Some(k) => k.parse::<u32>().unwrap() * 1024,
        None => length.parse::<u32>().unwrap(),
    };
    (origin, length)
}

fn overlaps(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 < b.0 + b.1 && b.0 < a.0 + a.1
}

#[test]
fn image_fits_in_flash_bank_one() {
    let (origin, length) = region("FLASH");
    assert_eq!(origin, map::FLASH_BASE);
    assert!(origin + length <= map::FLASH_BANK2_BASE);
}

#[test]
fn firmware_ram_is_inside_the_sram1_top_margin() {
    let (origin, length) = region("RAM");
    let sram1_end = map::SRAM1_BASE + map::SRAM1_SIZE;
    assert!(origin >= sram1_end - map::SRAM1_MARGIN, "RAM at {origin:#x}");
    assert!(origin + length <= sram1_end);
}

#[test]
fn no_planned_window_touches_the_firmware() {
    let flash = region("FLASH");
    let ram = region("RAM");

    let cfg = coverage_config();
    for plan in &cfg.banks {
        let guarded = match plan.bank.kind {
            BankKind::Flash => flash,
            BankKind::Ram => ram,
        };
        let mut planner = WindowPlanner::new(plan.bank, plan.coverage);
        for cycle in 1..=500u64 {
            let w = planner.rotate(cycle, cfg.rotation);
            let span = (w.start(), w.size);
            assert!(
                !overlaps(span, guarded),
                "{} window {:#x}+{:#x} overlaps firmware at {:#x}+{:#x} (cycle {cycle})",
                plan.bank.name,
                span.0,
                span.1,
                guarded.0,
                guarded.1
            );
        }
    }
}

#[test]
fn sram2_and_ccm_are_not_given_to_the_linker() {
    let ram = region("RAM");
    assert!(!overlaps(ram, (map::SRAM2_BASE, map::SRAM2_SIZE)));
    assert!(!overlaps(ram, (map::CCM_BASE, map::CCM_SIZE)));
}
