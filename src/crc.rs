//! The CRC32 primitive used for both sector-header and record-payload
//! integrity checks.
//!
//! Parameters: polynomial `0xEDB88320` (reflected), initial register
//! `0xFFFFFFFF`, final XOR `0xFFFFFFFF`. These are exactly the parameters
//! of "CRC-32/ISO-HDLC" (the algorithm zlib and Ethernet FCS use), so
//! rather than hand-maintain a lookup table this crate treats CRC32 as an
//! external collaborator and sources it from the `crc` crate.
use crc::{CRC_32_ISO_HDLC, Crc};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the CRC32 checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
