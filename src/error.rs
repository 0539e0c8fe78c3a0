//! Error kinds surfaced by the public API.
//!
//! Only capacity (`Full`), emptiness (`Empty`), and argument-validation
//! failures ever reach the caller. Integrity failures found while
//! scanning flash (a bad sector header CRC, a bad record payload CRC) are
//! recovered locally — the offending sector or record is skipped and a
//! counter in [`crate::Stats`] is bumped instead. There is deliberately
//! no `DeviceError` variant: [`crate::BlockDevice`] is infallible by
//! contract.
//!
//! These mirror the teacher crate's `InitError`: plain `Copy` enums
//! implementing `defmt::Format`, not `std::error::Error` — this crate is
//! `no_std` with no `alloc`.

/// Failure mode of [`crate::FcbHandle::mount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum MountError {
    /// `last_sector < first_sector`, the sector range exceeds
    /// [`crate::MAX_SECTORS`], or `MAX_PAYLOAD` doesn't match
    /// `sector_size - 16 - 12` for the given configuration.
    InvalidConfig,
}

/// Failure mode of [`crate::FcbHandle::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AppendError {
    /// The payload was empty or larger than `MAX_PAYLOAD`.
    InvalidArg,
    /// Appending would overwrite the oldest unread sector.
    Full,
}

/// Failure mode of [`crate::FcbHandle::pop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum PopError {
    /// `read_cursor == write_cursor`: there is nothing to pop.
    Empty,
}
