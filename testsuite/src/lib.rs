#![no_std]

pub mod flash_sim;
pub mod uart;

use cortex_m_semihosting::debug::{self, EXIT_FAILURE, EXIT_SUCCESS};

pub use cortex_m_rt::entry;
pub use flash_sim::FlashSim;

pub fn exit_success() -> ! {
    debug::exit(EXIT_SUCCESS);
    #[allow(clippy::empty_loop)]
    loop {}
}

pub fn exit_failure() -> ! {
    debug::exit(EXIT_FAILURE);
    #[allow(clippy::empty_loop)]
    loop {}
}

/// Dump the simulated flash region via UART1.
///
/// This outputs the raw bytes of the region reserved for [`FlashSim`] in
/// `memory.x`, which the host-side runner captures and re-injects into a
/// subsequent QEMU run via `-device loader` to simulate a power cycle.
pub fn dump_flash_region() {
    uart::write_bytes_uart1(flash_sim::raw());
}

/// Dump the simulated flash region via UART1 and exit successfully.
pub fn dump_flash_region_and_exit() -> ! {
    dump_flash_region();
    exit_success();
}

/// Drain every unpopped record from `fcb`, writing each payload to UART0
/// followed by a `\n` so the host-side runner can diff output byte-for-byte
/// across phases.
pub fn drain_to_uart<D: fcb::BlockDevice, const MAX_PAYLOAD: usize>(
    fcb: &mut fcb::FcbHandle<D, MAX_PAYLOAD>,
) {
    while let Some(view) = fcb.peek() {
        uart::write_bytes(view.as_bytes());
        uart::write_byte(b'\n');
        let _ = fcb.pop();
    }
}
