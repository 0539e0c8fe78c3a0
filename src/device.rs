//! The block device abstraction the core is built on.
//!
//! This is deliberately minimal and infallible: `read`/`write`/`erase_sector`
//! never return a `Result`. Implementations that sit on top of a device
//! which can fail (a SPI NOR chip with bus errors, say) are expected to
//! retry or panic internally — there is no device-error variant anywhere
//! in this crate's public error types, by design (see [`crate::MountError`]).

/// Raw read/write/erase primitives over a byte-addressed NOR-flash-like
/// device, divided into fixed-size sectors.
///
/// - `read` copies bytes out; out-of-range reads are a defensive no-op.
/// - `write` clears bits (1→0) to match `buf`; the caller guarantees the
///   target region currently reads all-ones wherever `buf` has a zero
///   bit, the standard NOR bit-clear rule. Implementations need not
///   enforce this themselves.
/// - `erase_sector` resets every byte of the sector containing `addr`
///   back to `0xFF`.
///
/// No write is assumed atomic: a power loss may truncate any `write` at
/// an arbitrary byte. The on-flash layout (see the crate root docs) is
/// designed so recovery can always tell a torn write from a complete one.
pub trait BlockDevice {
    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    fn read(&mut self, addr: u32, buf: &mut [u8]);

    /// Clears bits to match `buf`, starting at `addr`.
    fn write(&mut self, addr: u32, buf: &[u8]);

    /// Resets every byte of the sector containing `addr` to `0xFF`.
    fn erase_sector(&mut self, addr: u32);
}

/// A RAM-backed [`BlockDevice`] used by this crate's own tests and by the
/// on-target `testsuite` crate, gated behind the `test-util` feature so
/// both can exercise the same double rather than hand-rolling their own.
///
/// `TOTAL_SIZE` is a const generic (rather than a constructor argument)
/// so the backing array lives inline with no allocator, matching how the
/// rest of this crate avoids `alloc`. `sector_size` is a runtime field
/// since `erase_sector` needs it to find a sector's bounds but it need
/// not be known at compile time.
#[cfg(any(test, feature = "test-util"))]
pub struct FakeFlash<const TOTAL_SIZE: usize> {
    sector_size: usize,
    data: [u8; TOTAL_SIZE],
}

#[cfg(any(test, feature = "test-util"))]
impl<const TOTAL_SIZE: usize> FakeFlash<TOTAL_SIZE> {
    /// Creates a fully-erased (all-`0xFF`) fake flash of `sector_size`-byte
    /// sectors.
    pub fn new(sector_size: usize) -> Self {
        Self {
            sector_size,
            data: [0xFF; TOTAL_SIZE],
        }
    }

    /// Total size in bytes of the simulated device.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the simulated device has zero capacity.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw contents, for test assertions and corruption injection.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Raw contents, mutable, for corruption injection in tests.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(any(test, feature = "test-util"))]
impl<const TOTAL_SIZE: usize> BlockDevice for FakeFlash<TOTAL_SIZE> {
    fn read(&mut self, addr: u32, buf: &mut [u8]) {
        let addr = addr as usize;
        if addr >= self.data.len() {
            return;
        }
        let end = (addr + buf.len()).min(self.data.len());
        let n = end - addr;
        buf[..n].copy_from_slice(&self.data[addr..end]);
    }

    fn write(&mut self, addr: u32, buf: &[u8]) {
        let addr = addr as usize;
        if addr >= self.data.len() {
            return;
        }
        let end = (addr + buf.len()).min(self.data.len());
        let n = end - addr;
        for (dst, src) in self.data[addr..end].iter_mut().zip(&buf[..n]) {
            // NOR bit-clear: a write can only turn 1-bits into 0-bits.
            *dst &= *src;
        }
    }

    fn erase_sector(&mut self, addr: u32) {
        if self.sector_size == 0 {
            return;
        }
        let sector_idx = addr as usize / self.sector_size;
        let start = sector_idx * self.sector_size;
        if start >= self.data.len() {
            return;
        }
        let end = (start + self.sector_size).min(self.data.len());
        self.data[start..end].fill(0xFF);
    }
}
