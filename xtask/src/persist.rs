//! Recovery test runner: two-phase run with a flash-region snapshot.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::qemu::{MemoryLoad, run_qemu};
use crate::runner::RunOptions;

/// Address of the simulated flash region, fixed by `testsuite/memory.x`.
pub const FLASH_SIM_ADDR: u32 = 0x2000_FC00;

/// Run a recovery test.
///
/// Phase 1: append records and capture the flash region via UART1.
/// Phase 2: load that snapshot and verify the drained records match.
pub fn run_persist(elf_path: &PathBuf, opts: &RunOptions) -> Result<bool> {
    println!("Phase 1: appending records...");
    let phase1 = run_qemu(elf_path, None)?;
    let phase1_uart0 = String::from_utf8_lossy(&phase1.uart0).into_owned();

    if opts.verbose {
        println!("--- uart0 ---");
        print!("{phase1_uart0}");
        println!("--- Phase 1 end ---");
    }

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
    fs::write(snapshot_file.path(), &phase1.uart1)?;

    println!("Phase 2: recovering from snapshot...");
    let phase2 = run_qemu(
        elf_path,
        Some(MemoryLoad {
            file: &snapshot_file.path().to_path_buf(),
            addr: FLASH_SIM_ADDR,
        }),
    )?;
    let phase2_uart0 = String::from_utf8_lossy(&phase2.uart0).into_owned();

    if opts.verbose {
        println!("--- uart0 ---");
        print!("{phase2_uart0}");
        println!("--- Phase 2 end ---\n");
    }

    if phase1_uart0 == phase2_uart0 {
        println!("  PASS: recovered records match what was written");
        Ok(true)
    } else {
        println!("  FAIL: recovered records don't match");
        println!("--- phase 1 (written) ---");
        print!("{phase1_uart0}");
        println!("--- phase 2 (recovered) ---");
        print!("{phase2_uart0}");
        Ok(false)
    }
}
