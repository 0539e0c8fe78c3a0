//! Record header encode/decode and the status-word state machine that
//! lets recovery distinguish a torn write from a committed one.
//!
//! A record is laid out as:
//!
//! ```text
//! offset  0..2   magic        (0xA55A)
//! offset  2..4   len          (payload length in bytes)
//! offset  4..8   payload_crc  (CRC32 of the payload)
//! offset  8..12  status       (written last, see below)
//! ```
//!
//! `write_record` performs two writes in order: the first 8 bytes
//! (magic/len/payload_crc), then the payload itself, then the status
//! word last. Because every write only clears bits, a reader can always
//! tell how far a write got: `status` still reading all-ones means the
//! header (and maybe the payload) never finished committing.

use crate::device::BlockDevice;

const MAGIC: u16 = 0xA55A;

const STATUS_ERASED: u32 = 0xFFFF_FFFF;
const STATUS_VALID: u32 = 0x0000_FFFF;
const STATUS_POPPED: u32 = 0x0000_0000;

/// Size in bytes of a record header (excludes the payload).
pub(crate) const RECORD_HEADER_LEN: usize = 12;

/// Size in bytes of a record header.
pub(crate) fn record_header_len() -> usize {
    RECORD_HEADER_LEN
}

/// What scanning found at a given offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordOutcome {
    /// All-ones: the erased tail of the sector, no record starts here.
    EndOfSectorFill,
    /// A header with a recognized magic but an unrecognized status word,
    /// or no recognizable magic at all.
    Corrupt,
    /// The header committed (magic/len/payload_crc present) but the
    /// status word is still erased: the write was torn before it
    /// committed.
    PartialWrite,
    /// A committed record that has since been popped.
    Popped {
        /// Payload length in bytes.
        len: u16,
    },
    /// A committed, unpopped record.
    Valid {
        /// Payload length in bytes.
        len: u16,
        /// CRC32 of the payload, to be checked against the payload itself.
        payload_crc: u32,
    },
}

/// Writes a record's header and payload at `addr`, committing it by
/// writing the status word last. The caller must have already ensured
/// `addr..addr + record_header_len() + payload.len()` reads all-ones.
pub(crate) fn write_record<D: BlockDevice>(device: &mut D, addr: u32, payload: &[u8]) {
    let mut head = [0u8; 8];
    head[0..2].copy_from_slice(&MAGIC.to_le_bytes());
    head[2..4].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    let payload_crc = crate::crc::crc32(payload);
    head[4..8].copy_from_slice(&payload_crc.to_le_bytes());
    device.write(addr, &head);

    device.write(addr + RECORD_HEADER_LEN as u32, payload);

    device.write(addr + 8, &STATUS_VALID.to_le_bytes());
}

/// Reads and classifies the record header at `addr`.
pub(crate) fn read_record<D: BlockDevice>(device: &mut D, addr: u32) -> RecordOutcome {
    let mut buf = [0u8; RECORD_HEADER_LEN];
    device.read(addr, &mut buf);

    let magic = u16::from_le_bytes(buf[0..2].try_into().unwrap());
    if magic == 0xFFFF {
        return RecordOutcome::EndOfSectorFill;
    }
    if magic != MAGIC {
        return RecordOutcome::Corrupt;
    }

    let len = u16::from_le_bytes(buf[2..4].try_into().unwrap());
    let payload_crc = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let status = u32::from_le_bytes(buf[8..12].try_into().unwrap());

    match status {
        STATUS_ERASED => RecordOutcome::PartialWrite,
        STATUS_VALID => RecordOutcome::Valid { len, payload_crc },
        STATUS_POPPED => RecordOutcome::Popped { len },
        _ => RecordOutcome::Corrupt,
    }
}

/// Rewrites the status word of the committed record at `addr` to
/// `Popped`, a pure bit-clear from `Valid`.
pub(crate) fn mark_popped<D: BlockDevice>(device: &mut D, addr: u32) {
    device.write(addr + 8, &STATUS_POPPED.to_le_bytes());
}
