//! Mount-time recovery: reconstructing `write_cursor`, `read_cursor`,
//! `delete_cursor`, and `current_sequence_id` purely by surveying
//! whatever is currently on flash.
//!
//! Nothing here is ever persisted between power cycles; every mount
//! starts from scratch and re-derives the same cursors a previous,
//! uninterrupted session would have reached, regardless of where power
//! was lost.

use heapless::Vec as HVec;

use crate::error::MountError;
use crate::record::{RecordOutcome, read_record, record_header_len};
use crate::sector::{SECTOR_HEADER_LEN, SectorClass, SectorState, classify, sector_base, seq_cmp};
use crate::{FcbConfig, SectorSurvey, Stats};

/// The cursors an [`crate::FcbHandle`] needs to operate, all derived at
/// mount time and held only in RAM thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursors {
    pub(crate) write_cursor: u32,
    pub(crate) read_cursor: u32,
    pub(crate) delete_cursor: u32,
    pub(crate) current_sequence_id: u32,
}

/// Surveys every sector in `config`'s range and reconstructs [`Cursors`].
pub(crate) fn recover<D: crate::BlockDevice>(
    config: &FcbConfig,
    device: &mut D,
) -> Result<(Cursors, Stats), MountError> {
    let mut stats = Stats::default();
    let mut survey: SectorSurvey = HVec::new();

    let mut idx = config.first_sector;
    loop {
        match classify(device, config, idx) {
            SectorClass::Fresh => {}
            SectorClass::Invalid => {
                stats.corrupt_headers += 1;
            }
            SectorClass::Valid(header) => {
                // Unreachable in practice: MAX_SECTORS bounds sector_count.
                let _ = survey.push((idx, header.sequence_id, header.state));
            }
        }
        if idx == config.last_sector {
            break;
        }
        idx += 1;
    }

    if survey.is_empty() {
        return Ok((reinitialize(config, device), stats));
    }

    let head_idx = survey
        .iter()
        .max_by(|a, b| seq_cmp(a.1, b.1))
        .map(|(idx, ..)| *idx)
        .expect("survey is non-empty");

    let tail_idx = survey
        .iter()
        .filter(|(_, _, state)| *state != SectorState::Consumed)
        .min_by(|a, b| seq_cmp(a.1, b.1))
        .map(|(idx, ..)| *idx)
        .unwrap_or(head_idx);

    let mut current_sequence_id = survey
        .iter()
        .find(|(idx, ..)| *idx == head_idx)
        .map(|(_, seq, _)| *seq)
        .expect("head_idx came from survey");

    // `effective_head_idx` tracks whichever sector `write_cursor` actually
    // lands in: ordinarily that's `head_idx` itself, but a head sector
    // with no room left for another record gets rolled past at mount
    // time (per the eager-rollover rule below), and the tail scan needs
    // to know about the *new* head to recognize when it has caught up.
    let mut effective_head_idx = head_idx;
    let write_cursor = match scan_head(config, device, head_idx, &mut stats) {
        Some(pos) => pos,
        None => {
            let next = config.next_sector(head_idx);
            if next == tail_idx {
                // No free sector to roll into: the ring is full. Pin
                // write_cursor at the exhausted sector's end so the next
                // `append` sees zero remaining room, rolls, and fails
                // with `Full` via the ordinary `roll_to_next_sector` path.
                sector_base(config, head_idx) + config.sector_size
            } else {
                device.erase_sector(sector_base(config, next));
                current_sequence_id += 1;
                crate::sector::allocate(device, config, next, current_sequence_id);
                effective_head_idx = next;
                sector_base(config, next) + SECTOR_HEADER_LEN as u32
            }
        }
    };

    let read_cursor = scan_tail(
        config,
        device,
        tail_idx,
        effective_head_idx,
        write_cursor,
        &mut stats,
    );

    let cursors = Cursors {
        write_cursor,
        read_cursor,
        delete_cursor: read_cursor,
        current_sequence_id,
    };
    Ok((cursors, stats))
}

/// Erases every sector in range and allocates `first_sector` as a fresh,
/// empty buffer. Used both when mounting a never-used device and when a
/// survey finds nothing it trusts.
fn reinitialize<D: crate::BlockDevice>(config: &FcbConfig, device: &mut D) -> Cursors {
    let mut idx = config.first_sector;
    loop {
        device.erase_sector(sector_base(config, idx));
        if idx == config.last_sector {
            break;
        }
        idx += 1;
    }
    crate::sector::allocate(device, config, config.first_sector, 0);
    let base = sector_base(config, config.first_sector) + SECTOR_HEADER_LEN as u32;
    Cursors {
        write_cursor: base,
        read_cursor: base,
        delete_cursor: base,
        current_sequence_id: 0,
    }
}

/// Scans sector `head_idx` from its first record forward to find the
/// first free slot.
///
/// Returns `None` if, once scanning stops, fewer than two record headers'
/// worth of space remains in the sector: one header width is reserved
/// for a future write, the other guarantees an unambiguous all-ones
/// terminator always follows it. A `None` here means `head_idx` is
/// exhausted and recovery must roll into the next sector before it can
/// report a usable `write_cursor` (see the caller in [`recover`]).
fn scan_head<D: crate::BlockDevice>(
    config: &FcbConfig,
    device: &mut D,
    head_idx: u32,
    stats: &mut Stats,
) -> Option<u32> {
    let sector_end = sector_base(config, head_idx) + config.sector_size;
    let mut pos = sector_base(config, head_idx) + SECTOR_HEADER_LEN as u32;

    loop {
        if pos + record_header_len() as u32 > sector_end {
            break;
        }
        match read_record(device, pos) {
            RecordOutcome::EndOfSectorFill | RecordOutcome::PartialWrite => break,
            RecordOutcome::Corrupt => {
                stats.corrupt_records += 1;
                break;
            }
            RecordOutcome::Valid { len, .. } | RecordOutcome::Popped { len } => {
                let advance = record_header_len() as u32 + len as u32;
                if pos + advance > sector_end {
                    break;
                }
                pos += advance;
            }
        }
    }

    if pos + 2 * record_header_len() as u32 > sector_end {
        None
    } else {
        Some(pos)
    }
}

/// Scans forward from `tail_idx`'s first record, skipping popped and
/// corrupt slots and crossing into later sectors in sequence-id order,
/// until it finds the first unpopped record or catches up to
/// `write_cursor` in `head_idx`, returning that offset as `read_cursor`.
fn scan_tail<D: crate::BlockDevice>(
    config: &FcbConfig,
    device: &mut D,
    tail_idx: u32,
    head_idx: u32,
    write_cursor: u32,
    stats: &mut Stats,
) -> u32 {
    let mut sector = tail_idx;
    let mut pos = sector_base(config, sector) + SECTOR_HEADER_LEN as u32;

    // Bounded by sector_count: each iteration either advances pos within
    // a sector or moves to the next sector, and there are finitely many
    // of each before catching up to write_cursor.
    for _ in 0..config.sector_count() {
        loop {
            if sector == head_idx && pos == write_cursor {
                return pos;
            }
            let sector_end = sector_base(config, sector) + config.sector_size;
            if pos + record_header_len() as u32 > sector_end {
                break;
            }
            match read_record(device, pos) {
                RecordOutcome::Valid { .. } => return pos,
                RecordOutcome::Popped { len } => {
                    pos += record_header_len() as u32 + len as u32;
                }
                RecordOutcome::EndOfSectorFill | RecordOutcome::PartialWrite => break,
                RecordOutcome::Corrupt => {
                    // If this is the head sector, read_cursor lands exactly
                    // on this slot and the first `peek()` call will hit the
                    // same record and count it there — counting it here too
                    // would double-charge `corrupt_records`. Otherwise this
                    // sector is abandoned for good (see module docs), so
                    // `peek()` will never see it: count it now or not at all.
                    if sector != head_idx {
                        stats.corrupt_records += 1;
                    }
                    break;
                }
            }
        }
        if sector == head_idx {
            return pos;
        }
        sector = config.next_sector(sector);
        pos = sector_base(config, sector) + SECTOR_HEADER_LEN as u32;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockDevice;
    use crate::device::FakeFlash;

    fn config() -> FcbConfig {
        FcbConfig {
            first_sector: 0,
            last_sector: 3,
            sector_size: 128,
        }
    }

    #[test]
    fn fresh_device_initializes_empty_ring() {
        let mut dev = FakeFlash::<512>::new(128);
        let cfg = config();
        let (cursors, stats) = recover(&cfg, &mut dev).unwrap();
        let base = sector_base(&cfg, 0) + SECTOR_HEADER_LEN as u32;
        assert_eq!(cursors.write_cursor, base);
        assert_eq!(cursors.read_cursor, base);
        assert_eq!(cursors.current_sequence_id, 0);
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn recovers_write_cursor_after_existing_records() {
        let mut dev = FakeFlash::<512>::new(128);
        let cfg = config();
        dev.erase_sector(sector_base(&cfg, 0));
        crate::sector::allocate(&mut dev, &cfg, 0, 5);
        let base = sector_base(&cfg, 0) + SECTOR_HEADER_LEN as u32;
        crate::record::write_record(&mut dev, base, b"abc");
        let after = base + record_header_len() as u32 + 3;
        crate::record::write_record(&mut dev, after, b"de");

        let (cursors, _stats) = recover(&cfg, &mut dev).unwrap();
        assert_eq!(cursors.write_cursor, after + record_header_len() as u32 + 2);
        assert_eq!(cursors.read_cursor, base);
        assert_eq!(cursors.current_sequence_id, 5);
    }

    #[test]
    fn skips_popped_records_when_recovering_read_cursor() {
        let mut dev = FakeFlash::<512>::new(128);
        let cfg = config();
        dev.erase_sector(sector_base(&cfg, 0));
        crate::sector::allocate(&mut dev, &cfg, 0, 1);
        let base = sector_base(&cfg, 0) + SECTOR_HEADER_LEN as u32;
        crate::record::write_record(&mut dev, base, b"abc");
        crate::record::mark_popped(&mut dev, base);
        let second = base + record_header_len() as u32 + 3;
        crate::record::write_record(&mut dev, second, b"de");

        let (cursors, _stats) = recover(&cfg, &mut dev).unwrap();
        assert_eq!(cursors.read_cursor, second);
    }

    #[test]
    fn exhausted_head_sector_rolls_over_eagerly_at_mount() {
        let mut dev = FakeFlash::<512>::new(128);
        let cfg = config();
        dev.erase_sector(sector_base(&cfg, 0));
        crate::sector::allocate(&mut dev, &cfg, 0, 7);
        let base = sector_base(&cfg, 0) + SECTOR_HEADER_LEN as u32;
        // 80-byte payload leaves only 20 bytes in the 112-byte sector body,
        // short of the 24 bytes two record headers need.
        let payload = [0xAAu8; 80];
        crate::record::write_record(&mut dev, base, &payload);

        let (cursors, _stats) = recover(&cfg, &mut dev).unwrap();
        let next_base = sector_base(&cfg, 1) + SECTOR_HEADER_LEN as u32;
        assert_eq!(cursors.write_cursor, next_base);
        assert_eq!(cursors.current_sequence_id, 8);
        // The old record is still there and still unpopped; only the
        // leftover tail space of sector 0 is abandoned.
        assert_eq!(cursors.read_cursor, base);

        match classify(&mut dev, &cfg, 1) {
            SectorClass::Valid(header) => {
                assert_eq!(header.sequence_id, 8);
                assert_eq!(header.state, SectorState::Allocated);
            }
            other => panic!("expected sector 1 to be allocated, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_head_sector_defers_full_when_next_is_the_tail() {
        let mut dev = FakeFlash::<512>::new(128);
        let cfg = config();
        // Sector 1 is the oldest sector still holding unpopped data (the
        // tail); sector 0 is the newest (the head) and has just run out
        // of room. The sector physically after the head is the tail
        // itself, so there is nowhere to roll into.
        dev.erase_sector(sector_base(&cfg, 0));
        crate::sector::allocate(&mut dev, &cfg, 0, 5);
        let base = sector_base(&cfg, 0) + SECTOR_HEADER_LEN as u32;
        let payload = [0xAAu8; 80];
        crate::record::write_record(&mut dev, base, &payload);

        dev.erase_sector(sector_base(&cfg, 1));
        crate::sector::allocate(&mut dev, &cfg, 1, 3);
        let second_base = sector_base(&cfg, 1) + SECTOR_HEADER_LEN as u32;
        crate::record::write_record(&mut dev, second_base, b"x");

        let (cursors, _stats) = recover(&cfg, &mut dev).unwrap();
        // write_cursor is pinned at sector 0's end: no sector was erased
        // or allocated, and the next `append` will see zero room left.
        assert_eq!(cursors.write_cursor, sector_base(&cfg, 0) + cfg.sector_size);
        assert_eq!(cursors.current_sequence_id, 5);
        assert_eq!(cursors.read_cursor, second_base);
        match classify(&mut dev, &cfg, 1) {
            SectorClass::Valid(header) => {
                assert_eq!(header.state, SectorState::Allocated);
                assert_eq!(header.sequence_id, 3);
            }
            other => panic!("sector 1 should be untouched, got {other:?}"),
        }
    }
}
