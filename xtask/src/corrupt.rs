//! Corruption test runner: verify recovery handles a damaged flash image.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::persist::FLASH_SIM_ADDR;
use crate::qemu::{MemoryLoad, run_qemu};
use crate::runner::RunOptions;

/// Byte offset of a sector header's `header_crc` field, relative to the
/// start of the flash region (sector 0's header starts at offset 0).
const SECTOR_HEADER_CRC_OFFSET: usize = 8;

/// Byte offset of the first record's status word, relative to the start
/// of the flash region (sector header is 16 bytes, record header's
/// status word is the last 4 of its 12).
const FIRST_RECORD_STATUS_OFFSET: usize = 16 + 8;

/// Marker the corrupt_test example prints when it took the
/// reinitialize-as-fresh path rather than recovering anything.
const FRESH_PATH_MARKER: &str = "corrupt test: fresh buffer";

#[derive(Debug, Clone, Copy)]
enum Scenario {
    /// No corruption: recovery should reconstruct everything.
    None,
    /// Corrupt the sector header's CRC: the whole sector becomes
    /// untrustworthy, recovery must reinitialize rather than use it.
    SectorHeader,
    /// Corrupt the first record's status word: that record becomes
    /// unreadable, but the sector header is still valid.
    RecordStatus,
}

impl Scenario {
    fn name(self) -> &'static str {
        match self {
            Scenario::None => "none",
            Scenario::SectorHeader => "sector header",
            Scenario::RecordStatus => "record status",
        }
    }

    fn apply(self, snapshot: &[u8]) -> Vec<u8> {
        let mut corrupted = snapshot.to_vec();
        match self {
            Scenario::None => {}
            Scenario::SectorHeader => corrupted[SECTOR_HEADER_CRC_OFFSET] ^= 0xFF,
            Scenario::RecordStatus => {
                corrupted[FIRST_RECORD_STATUS_OFFSET..FIRST_RECORD_STATUS_OFFSET + 4].fill(0x00)
            }
        }
        corrupted
    }
}

const SCENARIOS: [Scenario; 3] = [Scenario::None, Scenario::SectorHeader, Scenario::RecordStatus];

/// Run a corruption test across every [`Scenario`].
pub fn run_corrupt(elf_path: &PathBuf, opts: &RunOptions) -> Result<bool> {
    println!("Phase 1: normal run to capture the flash region...");
    let phase1 = run_qemu(elf_path, None)?;

    if phase1.uart1.is_empty() {
        println!("  FAIL: no flash region captured in phase 1");
        return Ok(false);
    }

    if opts.verbose {
        println!(
            "Captured {} bytes from the flash region\n",
            phase1.uart1.len()
        );
    }

    let snapshot_file = NamedTempFile::new().context("Failed to create snapshot file")?;
    let mut all_passed = true;

    for scenario in SCENARIOS {
        let corrupted = scenario.apply(&phase1.uart1);
        fs::write(snapshot_file.path(), &corrupted)?;

        println!("  Scenario: corrupt={}", scenario.name());

        let result = run_qemu(
            elf_path,
            Some(MemoryLoad {
                file: &snapshot_file.path().to_path_buf(),
                addr: FLASH_SIM_ADDR,
            }),
        )?;
        let semihosting = String::from_utf8_lossy(&result.semihosting).into_owned();
        let uart0 = String::from_utf8_lossy(&result.uart0).into_owned();

        if opts.verbose {
            println!("    --- semihosting ---");
            print!("{semihosting}");
            println!("    --- uart0 ---");
            print!("{uart0}");
        }

        let took_fresh_path = semihosting.contains(FRESH_PATH_MARKER);
        let passed = match scenario {
            Scenario::SectorHeader if took_fresh_path => {
                println!("    PASS: sector header damage forced reinitialization");
                true
            }
            Scenario::None | Scenario::RecordStatus if !took_fresh_path && !uart0.is_empty() => {
                println!("    PASS: recovered without reinitializing");
                true
            }
            _ => {
                println!("    FAIL: unexpected path for this scenario");
                println!("    --- semihosting ---");
                print!("{semihosting}");
                println!("    --- uart0 ---");
                print!("{uart0}");
                false
            }
        };

        if !passed {
            all_passed = false;
        }
    }

    if all_passed {
        println!("  PASS: all {} scenarios passed", SCENARIOS.len());
    } else {
        println!("  FAIL: some scenarios failed");
    }

    Ok(all_passed)
}
