//! Standard test runner: single run, compare output against expected file.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use crate::build::project_root;
use crate::qemu::run_qemu;
use crate::runner::RunOptions;

/// Run a standard test.
///
/// Executes the example once and compares UART0 output against an
/// expected file.
pub fn run_standard(example: &str, elf_path: &PathBuf, opts: &RunOptions) -> Result<bool> {
    println!("Running in QEMU...");
    let output = run_qemu(elf_path, None)?;
    let semihosting = String::from_utf8_lossy(&output.semihosting).into_owned();
    let uart0 = String::from_utf8_lossy(&output.uart0).into_owned();

    if opts.verbose {
        print!("{semihosting}");
        println!("--- QEMU run end ---");
        return Ok(true);
    }

    let root = project_root();
    let expected_path = root
        .join("testsuite")
        .join("expected")
        .join(format!("{example}.expected"));

    if opts.bless {
        let filename = expected_path.file_name().unwrap().to_string_lossy();
        let status = if expected_path.exists() {
            let existing = fs::read_to_string(&expected_path)?;
            if existing == uart0 {
                "No change"
            } else {
                fs::write(&expected_path, &uart0)?;
                "Updated"
            }
        } else {
            fs::create_dir_all(expected_path.parent().unwrap())?;
            fs::write(&expected_path, &uart0)?;
            "Created"
        };
        println!("  {filename}: {status}");
        Ok(true)
    } else if expected_path.exists() {
        let expected = fs::read_to_string(&expected_path)?;
        if uart0 == expected {
            println!("  PASS");
            Ok(true)
        } else {
            println!("  FAIL: output differs from expected");
            println!("--- expected ---");
            print!("{expected}");
            println!("--- uart0 ---");
            print!("{uart0}");
            Ok(false)
        }
    } else {
        println!("  No expected output file, run with --bless to create");
        println!("--- output ---");
        print!("{uart0}");
        Ok(false)
    }
}
