//! A Flash Circular Buffer: a persistent FIFO queue of variable-length
//! records stored on a range of NOR-flash sectors.
//!
//! Records (log entries, telemetry events, configuration deltas) survive
//! power loss because every piece of mutable state the queue needs —
//! `write_cursor`, `read_cursor`, `delete_cursor`, `current_sequence_id` —
//! is *derived* from the flash image at [`mount`] time rather than stored
//! separately. Recovery tolerates power loss at any byte boundary: a
//! record header is written before its payload, and its `status` word is
//! written last, so a torn write is always distinguishable from a
//! complete one (see [`record::RecordOutcome`]).
//!
//! Wear is spread by rotation: `append` never rewrites a sector in place,
//! it only ever erases the next sector in the ring and allocates a fresh
//! header on it. There is no compaction — a popped record's space is
//! reclaimed only when the whole sector it lives in is erased.
//!
//! # Non-goals
//!
//! Multi-writer concurrency across processes, encryption, cross-sector
//! compaction, and random access by key are all out of scope. Callers
//! that need concurrent access must serialize it externally (this queue
//! has no internal locking, see [`FcbHandle`]).
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

mod crc;
mod device;
mod error;
mod mount;
mod record;
#[cfg(test)]
mod scenarios;
mod sector;

pub use crc::crc32;
pub use device::BlockDevice;
pub use error::{AppendError, MountError, PopError};
pub use sector::seq_cmp;

#[cfg(any(test, feature = "test-util"))]
pub use device::FakeFlash;

use heapless::Vec as HVec;

use mount::Cursors;
use record::{RecordOutcome, record_header_len};
use sector::{SECTOR_HEADER_LEN, SectorState, sector_base};

/// Upper bound on the number of sectors a single [`FcbHandle`] may span.
///
/// The rollover-safe sequence comparison in [`seq_cmp`] assumes the gap
/// between any two simultaneously-live sequence ids stays well under
/// `2^31`; with one allocation per sector that only holds if the sector
/// range is bounded, so mount refuses ranges wider than this.
pub const MAX_SECTORS: usize = 64;

/// Static configuration for one [`FcbHandle`] instance.
///
/// Sectors `first_sector..=last_sector` (inclusive) are exclusively owned
/// by the instance; overlapping ranges between two handles on the same
/// device is undefined behavior at the flash level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct FcbConfig {
    /// Index of the first sector in the ring.
    pub first_sector: u32,
    /// Index of the last sector in the ring (inclusive).
    pub last_sector: u32,
    /// Size in bytes of every sector in the ring. All sectors must be the
    /// same size.
    pub sector_size: u32,
}

impl FcbConfig {
    fn sector_count(&self) -> u32 {
        self.last_sector - self.first_sector + 1
    }

    fn next_sector(&self, idx: u32) -> u32 {
        if idx == self.last_sector {
            self.first_sector
        } else {
            idx + 1
        }
    }

    fn max_payload(&self) -> u32 {
        self.sector_size - SECTOR_HEADER_LEN as u32 - record_header_len() as u32
    }
}

/// Diagnostic counters accumulated while walking the flash image.
///
/// These never gate control flow: corrupt headers and records are always
/// skipped silently per §7 of the design (integrity failures are local
/// recoveries, not surfaced errors). They exist purely for observability,
/// mirroring how the teacher crate's `ConsumerAndMetadata` surfaces
/// `recovered_logs_len` as incidental recovery metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct Stats {
    /// Number of sector headers rejected during survey (bad magic or CRC).
    pub corrupt_headers: u32,
    /// Number of records skipped during peek due to a payload CRC mismatch.
    pub corrupt_records: u32,
}

/// A view of a record's payload, valid for the lifetime of the borrow of
/// the [`FcbHandle`] that produced it.
///
/// `peek` copies the payload into a scratch buffer owned by the handle
/// (the block device interface is copy-based, not memory-mapped, so
/// there is no flash-backed slice to borrow directly).
pub struct PayloadView<'a> {
    bytes: &'a [u8],
}

impl<'a> PayloadView<'a> {
    /// The payload bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The payload length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty. Always `false` in practice: `append`
    /// rejects zero-length payloads, so this only exists for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A mounted flash circular buffer.
///
/// `MAX_PAYLOAD` bounds the scratch buffer used by [`FcbHandle::peek`] and
/// must equal `sector_size - 16 - 12` for the configuration this handle
/// was mounted with (`mount` asserts this at runtime since const generics
/// cannot yet express the arithmetic at the type level).
///
/// All operations run to completion without internal yielding and touch
/// no shared state: concurrent callers must serialize access externally
/// (see the crate-level docs).
pub struct FcbHandle<D: BlockDevice, const MAX_PAYLOAD: usize> {
    device: D,
    config: FcbConfig,
    cursors: Cursors,
    stats: Stats,
    scratch: [u8; MAX_PAYLOAD],
}

impl<D: BlockDevice, const MAX_PAYLOAD: usize> FcbHandle<D, MAX_PAYLOAD> {
    /// Reconstructs a [`FcbHandle`] from whatever image is currently on
    /// `device`, per the mount/recovery algorithm.
    ///
    /// This is the only place cursors are computed; they are never
    /// persisted, so every power cycle re-derives them by scanning flash.
    pub fn mount(config: FcbConfig, mut device: D) -> Result<Self, MountError> {
        if config.last_sector < config.first_sector {
            return Err(MountError::InvalidConfig);
        }
        if config.sector_count() as usize > MAX_SECTORS {
            return Err(MountError::InvalidConfig);
        }
        if config.max_payload() as usize != MAX_PAYLOAD {
            return Err(MountError::InvalidConfig);
        }

        let (cursors, stats) = mount::recover(&config, &mut device)?;

        defmt::debug!(
            "fcb: mounted, write_cursor={:?} read_cursor={:?} current_sequence_id={:?}",
            cursors.write_cursor,
            cursors.read_cursor,
            cursors.current_sequence_id,
        );

        Ok(Self {
            device,
            config,
            cursors,
            stats,
            scratch: [0; MAX_PAYLOAD],
        })
    }

    /// Erases every sector in the configured range and re-mounts as a
    /// pristine (empty) buffer.
    pub fn erase_all(&mut self) -> Result<(), MountError> {
        let mut idx = self.config.first_sector;
        loop {
            self.device.erase_sector(sector_base(&self.config, idx));
            if idx == self.config.last_sector {
                break;
            }
            idx += 1;
        }
        let (cursors, stats) = mount::recover(&self.config, &mut self.device)?;
        self.cursors = cursors;
        self.stats = stats;
        Ok(())
    }

    /// Diagnostic counters accumulated since mount.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Reclaims the underlying device, discarding the derived cursors.
    ///
    /// Used by tests to simulate a power cycle: drop the handle, keep the
    /// bytes, mount again. Not exposed outside the crate — callers have
    /// no legitimate reason to separate a device from its cursors without
    /// going through `mount`.
    #[cfg(test)]
    pub(crate) fn into_device(self) -> D {
        self.device
    }

    /// Appends `payload` to the tail of the queue.
    ///
    /// Rejects empty or oversized payloads. Rotates into the next sector
    /// (erasing and allocating it) when the current sector lacks room;
    /// fails with [`AppendError::Full`] if doing so would catch up to the
    /// oldest unread sector.
    pub fn append(&mut self, payload: &[u8]) -> Result<(), AppendError> {
        if payload.is_empty() || payload.len() as u32 > self.config.max_payload() {
            return Err(AppendError::InvalidArg);
        }

        let needed = record_header_len() as u32 + payload.len() as u32;
        if self.remaining_in_current_sector() < needed {
            self.roll_to_next_sector()?;
        }

        record::write_record(&mut self.device, self.cursors.write_cursor, payload);
        self.cursors.write_cursor += needed;
        Ok(())
    }

    /// Returns the next unpopped record without consuming it.
    ///
    /// Skips past already-popped records and CRC-corrupt records
    /// transparently (bumping [`Stats::corrupt_records`] for the latter),
    /// returning the first genuinely valid record, or `None` if the
    /// queue is empty.
    pub fn peek(&mut self) -> Option<PayloadView<'_>> {
        loop {
            if self.cursors.read_cursor == self.cursors.write_cursor {
                return None;
            }

            match record::read_record(&mut self.device, self.cursors.read_cursor) {
                RecordOutcome::Valid { len, payload_crc } => {
                    let len = len as usize;
                    if len > self.scratch.len() {
                        // A length this large can't have been written by
                        // `append` (it enforces MAX_PAYLOAD); treat it as
                        // corrupt rather than trust it to size a read.
                        self.stats.corrupt_records += 1;
                        self.advance_read_cursor_to_next_sector();
                        continue;
                    }
                    self.device.read(
                        self.cursors.read_cursor + record_header_len() as u32,
                        &mut self.scratch[..len],
                    );
                    if crc::crc32(&self.scratch[..len]) == payload_crc {
                        return Some(PayloadView {
                            bytes: &self.scratch[..len],
                        });
                    }
                    self.stats.corrupt_records += 1;
                    defmt::warn!(
                        "fcb: corrupt record payload at {:?}, skipping",
                        self.cursors.read_cursor
                    );
                    self.cursors.read_cursor += record_header_len() as u32 + len as u32;
                }
                RecordOutcome::Popped { len } => {
                    self.cursors.read_cursor += record_header_len() as u32 + len as u32;
                }
                RecordOutcome::EndOfSectorFill | RecordOutcome::PartialWrite => {
                    self.advance_read_cursor_to_next_sector();
                }
                RecordOutcome::Corrupt => {
                    self.stats.corrupt_records += 1;
                    self.advance_read_cursor_to_next_sector();
                }
            }
        }
    }

    /// Marks the record at `delete_cursor` as popped and advances past it.
    ///
    /// Fails with [`PopError::Empty`] if there is nothing left to
    /// acknowledge. Calling `pop` without a preceding `peek` still works:
    /// it re-derives the next record the same way `peek` does, so the two
    /// calls may be freely interleaved or split across power cycles.
    pub fn pop(&mut self) -> Result<(), PopError> {
        // Re-run peek's skip logic so delete_cursor always lands on a
        // record worth popping, mirroring read_cursor.
        if self.peek().is_none() {
            return Err(PopError::Empty);
        }
        self.cursors.delete_cursor = self.cursors.read_cursor;

        let len = match record::read_record(&mut self.device, self.cursors.delete_cursor) {
            RecordOutcome::Valid { len, .. } => len,
            _ => return Err(PopError::Empty),
        };

        record::mark_popped(&mut self.device, self.cursors.delete_cursor);
        let advance = record_header_len() as u32 + len as u32;
        self.cursors.delete_cursor += advance;
        self.cursors.read_cursor = self.cursors.delete_cursor;

        self.maybe_consume_crossed_sector();
        Ok(())
    }

    /// Index of the sector containing absolute offset `addr`.
    ///
    /// An `addr` that lands exactly on a sector boundary is attributed to
    /// the sector that ends there, not the one that begins there: a
    /// cursor sitting at `next_sector_base` means "this sector is full",
    /// not "we are already inside the next (unallocated) sector". Naive
    /// `(addr - base) / size` rounding gets this backwards and lets
    /// `remaining_in_current_sector` see a full sector's worth of
    /// headroom in a sector that hasn't been erased or allocated yet.
    fn sector_idx_of(&self, addr: u32) -> u32 {
        let relative = addr - self.config.first_sector * self.config.sector_size;
        if relative == 0 {
            return self.config.first_sector;
        }
        (relative - 1) / self.config.sector_size + self.config.first_sector
    }

    fn remaining_in_current_sector(&self) -> u32 {
        let sector_idx = self.sector_idx_of(self.cursors.write_cursor);
        let sector_end = sector_base(&self.config, sector_idx) + self.config.sector_size;
        sector_end - self.cursors.write_cursor
    }

    fn roll_to_next_sector(&mut self) -> Result<(), AppendError> {
        let current = self.sector_idx_of(self.cursors.write_cursor);
        let next = self.config.next_sector(current);
        let read_sector = self.sector_idx_of(self.cursors.read_cursor);

        if next == read_sector && self.cursors.read_cursor != self.cursors.write_cursor {
            return Err(AppendError::Full);
        }

        self.device.erase_sector(sector_base(&self.config, next));
        self.cursors.current_sequence_id += 1;
        sector::allocate(
            &mut self.device,
            &self.config,
            next,
            self.cursors.current_sequence_id,
        );
        self.cursors.write_cursor = sector_base(&self.config, next) + SECTOR_HEADER_LEN as u32;
        defmt::debug!(
            "fcb: rolled into sector {:?} sequence_id={:?}",
            next,
            self.cursors.current_sequence_id
        );
        Ok(())
    }

    fn advance_read_cursor_to_next_sector(&mut self) {
        let sector_idx = self.sector_idx_of(self.cursors.read_cursor);
        let next = self.config.next_sector(sector_idx);
        self.cursors.read_cursor = sector_base(&self.config, next) + SECTOR_HEADER_LEN as u32;
    }

    fn maybe_consume_crossed_sector(&mut self) {
        let sector_idx = self.sector_idx_of(self.cursors.delete_cursor);
        let sector_end = sector_base(&self.config, sector_idx) + self.config.sector_size;
        let crossed = self.cursors.delete_cursor + record_header_len() as u32 * 2 > sector_end;
        if crossed && sector_idx != self.sector_idx_of(self.cursors.write_cursor) {
            sector::transition(
                &mut self.device,
                &self.config,
                sector_idx,
                SectorState::Consumed,
            );
        }
    }
}

/// Fixed-capacity collection of `(sector_idx, sequence_id)` pairs used
/// while surveying flash at mount time. Bounded by [`MAX_SECTORS`].
pub(crate) type SectorSurvey = HVec<(u32, u32, SectorState), MAX_SECTORS>;
