//! Sector header encode/decode, sector lifecycle, and the rollover-safe
//! sequence comparison that orders sectors across wraparound.

use core::cmp::Ordering;

use crate::FcbConfig;
use crate::crc::crc32;
use crate::device::BlockDevice;

/// Size in bytes of a sector header.
pub(crate) const SECTOR_HEADER_LEN: usize = 16;

const MAGIC: u32 = 0xCAFE_BABE;

/// A sector's lifecycle state. Transitions only ever clear bits:
/// `Fresh` (`0xFFFFFFFF`) → `Allocated` (`0x7FFFFFFF`) → `Consumed`
/// (`0x0FFFFFFF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SectorState {
    /// Born by erase; no header has been written yet.
    Fresh,
    /// Header written, currently receiving or holding records.
    Allocated,
    /// Every record has been popped and the consumer has moved past it;
    /// eligible for erase back to `Fresh` on the next append that needs
    /// space.
    Consumed,
}

impl SectorState {
    const FRESH_RAW: u32 = 0xFFFF_FFFF;
    const ALLOCATED_RAW: u32 = 0x7FFF_FFFF;
    const CONSUMED_RAW: u32 = 0x0FFF_FFFF;

    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            Self::FRESH_RAW => Some(Self::Fresh),
            Self::ALLOCATED_RAW => Some(Self::Allocated),
            Self::CONSUMED_RAW => Some(Self::Consumed),
            _ => None,
        }
    }

    fn to_raw(self) -> u32 {
        match self {
            Self::Fresh => Self::FRESH_RAW,
            Self::Allocated => Self::ALLOCATED_RAW,
            Self::Consumed => Self::CONSUMED_RAW,
        }
    }
}

/// A decoded, integrity-checked sector header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SectorHeader {
    pub sequence_id: u32,
    pub state: SectorState,
}

/// Result of classifying a sector's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectorClass {
    /// Never written since the last erase.
    Fresh,
    /// A header with valid magic and CRC.
    Valid(SectorHeader),
    /// Bad magic, bad CRC, or an unrecognized state word.
    Invalid,
}

/// Absolute byte offset of the base of sector `idx`.
pub(crate) fn sector_base(config: &FcbConfig, idx: u32) -> u32 {
    idx * config.sector_size
}

/// Encodes and writes a sector header with `magic=0xCAFEBABE`, the given
/// `sequence_id`, a freshly computed `header_crc`, and the given `state`.
///
/// The caller must have erased the sector first: this never clears bits
/// that are currently `0`, it relies on the erase-before-write contract.
pub(crate) fn write_header<D: BlockDevice>(
    device: &mut D,
    config: &FcbConfig,
    idx: u32,
    sequence_id: u32,
    state: SectorState,
) {
    let mut buf = [0u8; SECTOR_HEADER_LEN];
    buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&sequence_id.to_le_bytes());
    let header_crc = crc32(&buf[0..8]);
    buf[8..12].copy_from_slice(&header_crc.to_le_bytes());
    buf[12..16].copy_from_slice(&state.to_raw().to_le_bytes());
    device.write(sector_base(config, idx), &buf);
}

/// Reads and classifies the header of sector `idx`.
pub(crate) fn classify<D: BlockDevice>(
    device: &mut D,
    config: &FcbConfig,
    idx: u32,
) -> SectorClass {
    let mut buf = [0u8; SECTOR_HEADER_LEN];
    device.read(sector_base(config, idx), &mut buf);

    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic == 0xFFFF_FFFF {
        // A sector with an all-ones magic is fresh by definition,
        // without even attempting a CRC check (§4.3).
        return SectorClass::Fresh;
    }
    if magic != MAGIC {
        return SectorClass::Invalid;
    }

    let sequence_id = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let stored_crc = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let computed_crc = crc32(&buf[0..8]);
    if stored_crc != computed_crc {
        return SectorClass::Invalid;
    }

    let raw_state = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    match SectorState::from_raw(raw_state) {
        Some(state) => SectorClass::Valid(SectorHeader { sequence_id, state }),
        None => SectorClass::Invalid,
    }
}

/// Writes an `Allocated` header at `idx` with the given `sequence_id`.
/// The caller must have erased `idx` first.
pub(crate) fn allocate<D: BlockDevice>(
    device: &mut D,
    config: &FcbConfig,
    idx: u32,
    sequence_id: u32,
) {
    write_header(device, config, idx, sequence_id, SectorState::Allocated);
}

/// Rewrites the `state` word of an already-valid header at `idx`,
/// preserving its `sequence_id`. Only called to move `Allocated` to
/// `Consumed`, a pure bit-clear that leaves `magic`/`header_crc` intact.
pub(crate) fn transition<D: BlockDevice>(
    device: &mut D,
    config: &FcbConfig,
    idx: u32,
    state: SectorState,
) {
    let raw = state.to_raw().to_le_bytes();
    device.write(sector_base(config, idx) + 12, &raw);
}

/// Rollover-safe comparison of two sequence ids.
///
/// `a` is `Greater` than `b` iff `(a - b)` reinterpreted as a signed
/// 32-bit integer is positive. This is not a general time-ordering: it
/// assumes the gap between any two simultaneously-live sequence ids
/// stays under `2^31`, which holds as long as the sector range stays
/// bounded (see [`crate::MAX_SECTORS`]).
pub fn seq_cmp(a: u32, b: u32) -> Ordering {
    let diff = a.wrapping_sub(b) as i32;
    diff.cmp(&0)
}
