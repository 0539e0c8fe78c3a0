//! @test-run: single
//!
//! Smoke test: mount a fresh simulated flash region, append one record,
//! and read it back.

#![no_std]
#![no_main]

use cortex_m_semihosting::hprintln;
use defmt_rtt as _;
use panic_semihosting as _;
use testsuite::{FlashSim, entry, exit_failure, exit_success, uart};

const SECTOR_SIZE: u32 = 256;
const MAX_PAYLOAD: usize = 256 - 16 - 12;

#[entry]
fn main() -> ! {
    hprintln!("mounting...");

    let config = fcb::FcbConfig {
        first_sector: 0,
        last_sector: 3,
        sector_size: SECTOR_SIZE,
    };
    let device = FlashSim::new(SECTOR_SIZE as usize);
    let Ok(mut handle) = fcb::FcbHandle::<_, MAX_PAYLOAD>::mount(config, device) else {
        hprintln!("mount failed");
        exit_failure();
    };

    if handle.append(b"hello fcb").is_err() {
        hprintln!("append failed");
        exit_failure();
    }

    match handle.peek() {
        Some(view) => uart::write_bytes(view.as_bytes()),
        None => {
            hprintln!("peek returned nothing");
            exit_failure();
        }
    }
    uart::write_byte(b'\n');

    hprintln!("mount test complete");
    exit_success();
}
