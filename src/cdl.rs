//! Code/Data Logger: per-ROM-byte flag accumulator, persisted across sessions.
//!
//! Monotonic by design (§8 "CDL monotonicity"): every entry point here only
//! sets bits; [`CdlRecorder::reset`] is the sole operation that clears them.
//! Callers on the emulation thread race freely against each other (§4.4: "no
//! locking... worst case a bit is set twice"), which is harmless because OR
//! is idempotent.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use bitflags::bitflags;
use crc::{Crc, CRC_32_ISO_HDLC};
use multidbg_arch::MemoryRegion;
use thiserror::Error;

bitflags! {
    /// Per-byte flag set accumulated by the Code/Data Logger.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CdlFlags: u8 {
        /// Byte was executed as an opcode or operand.
        const CODE = 0x01;
        /// Byte was read or written as data.
        const DATA = 0x02;
        /// Byte was the target of a jump/branch/call.
        const JUMP_TARGET = 0x04;
        /// Byte was the entry point of a subroutine.
        const SUB_ENTRY_POINT = 0x08;
        /// Byte was reached via indirect addressing.
        const INDIRECT_CODE = 0x10;
    }
}

const HEADER_MAGIC: &[u8; 5] = b"CDLv2";
const HEADER_LEN: usize = 5 + 4;
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Per-byte statistics over one region's flag array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CdlStats {
    /// Total tracked bytes.
    pub total_bytes: usize,
    /// Bytes with the [`CdlFlags::CODE`] bit set.
    pub code_bytes: usize,
    /// Bytes with the [`CdlFlags::DATA`] bit set.
    pub data_bytes: usize,
    /// Bytes with the [`CdlFlags::JUMP_TARGET`] bit set.
    pub jump_targets: usize,
    /// Bytes with the [`CdlFlags::SUB_ENTRY_POINT`] bit set.
    pub sub_entry_points: usize,
}

/// Code/Data Logger: one `u8` flag byte per tracked byte, per region.
#[derive(Debug, Default)]
pub struct CdlRecorder {
    regions: std::collections::HashMap<MemoryRegion, Vec<u8>>,
}

impl CdlRecorder {
    /// Creates a recorder tracking nothing. Call [`Self::track`] once per
    /// region to be tracked after ROM load.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins tracking `region` at `size` bytes, all flags clear. Replaces
    /// any prior tracking of the same region (a ROM hot-swap).
    pub fn track(&mut self, region: MemoryRegion, size: usize) {
        self.regions.insert(region, vec![0; size]);
    }

    /// Marks `width` consecutive bytes starting at `offset` as code.
    /// `extra_flags` (e.g. jump-target, sub-entry-point) apply only to the
    /// first byte; subsequent bytes receive only [`CdlFlags::CODE`].
    pub fn mark_code(
        &mut self,
        region: MemoryRegion,
        offset: usize,
        extra_flags: CdlFlags,
        width: usize,
    ) {
        self.mark(region, offset, CdlFlags::CODE, extra_flags, width);
    }

    /// Marks `width` consecutive bytes starting at `offset` as data.
    /// `extra_flags` applies only to the first byte, as in
    /// [`Self::mark_code`].
    pub fn mark_data(
        &mut self,
        region: MemoryRegion,
        offset: usize,
        extra_flags: CdlFlags,
        width: usize,
    ) {
        self.mark(region, offset, CdlFlags::DATA, extra_flags, width);
    }

    fn mark(
        &mut self,
        region: MemoryRegion,
        offset: usize,
        base: CdlFlags,
        extra_flags: CdlFlags,
        width: usize,
    ) {
        let Some(bytes) = self.regions.get_mut(&region) else {
            return;
        };
        let end = (offset + width).min(bytes.len());
        for (i, byte) in bytes.get_mut(offset..end).into_iter().flatten().enumerate() {
            let flags = if i == 0 { base | extra_flags } else { base };
            *byte |= flags.bits();
        }
    }

    /// Current flags for a single byte, or empty if the region isn't tracked
    /// or the offset is out of range.
    #[must_use]
    pub fn flags_at(&self, region: MemoryRegion, offset: usize) -> CdlFlags {
        self.regions
            .get(&region)
            .and_then(|bytes| bytes.get(offset))
            .map_or(CdlFlags::empty(), |&b| CdlFlags::from_bits_truncate(b))
    }

    /// Statistics over one tracked region.
    #[must_use]
    pub fn stats(&self, region: MemoryRegion) -> CdlStats {
        let Some(bytes) = self.regions.get(&region) else {
            return CdlStats::default();
        };
        let mut stats = CdlStats {
            total_bytes: bytes.len(),
            ..CdlStats::default()
        };
        for &b in bytes {
            let flags = CdlFlags::from_bits_truncate(b);
            stats.code_bytes += usize::from(flags.contains(CdlFlags::CODE));
            stats.data_bytes += usize::from(flags.contains(CdlFlags::DATA));
            stats.jump_targets += usize::from(flags.contains(CdlFlags::JUMP_TARGET));
            stats.sub_entry_points += usize::from(flags.contains(CdlFlags::SUB_ENTRY_POINT));
        }
        stats
    }

    /// Clears every flag in every tracked region. The only operation that
    /// clears bits (§8 "CDL monotonicity").
    pub fn reset(&mut self) {
        for bytes in self.regions.values_mut() {
            bytes.fill(0);
        }
    }

    /// Saves `region`'s flag array to `path` in the CDL file format (§6),
    /// atomically (write to a temp file in the same directory, then
    /// rename).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on any filesystem failure, or [`Error::Untracked`]
    /// if `region` is not currently tracked.
    pub fn save(&self, region: MemoryRegion, rom_crc: u32, path: impl AsRef<Path>) -> Result<(), Error> {
        let bytes = self.regions.get(&region).ok_or(Error::Untracked)?;
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(HEADER_MAGIC)?;
        tmp.write_all(&rom_crc.to_le_bytes())?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Loads `region`'s flag array from `path`, checking it against
    /// `expected_crc`.
    ///
    /// A CRC mismatch is reported as [`LoadOutcome::CrcMismatch`] but the
    /// data is still applied unless `force` is `false`, matching §7's
    /// "warn; proceed on user confirmation" policy — the caller decides
    /// whether "confirmation" has been given via `force`. A truncated file
    /// is always a hard failure: the recorder's prior state is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on any filesystem failure, [`Error::BadHeader`]
    /// if the magic bytes don't match, or [`Error::Truncated`] if the file
    /// is shorter than the tracked region's size.
    pub fn load(
        &mut self,
        region: MemoryRegion,
        expected_crc: u32,
        force: bool,
        path: impl AsRef<Path>,
    ) -> Result<LoadOutcome, Error> {
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        if buf.len() < HEADER_LEN || &buf[..5] != HEADER_MAGIC {
            return Err(Error::BadHeader);
        }
        let file_crc = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);
        let body = &buf[HEADER_LEN..];
        let expected_len = self.regions.get(&region).map_or(body.len(), Vec::len);
        if body.len() != expected_len {
            return Err(Error::Truncated {
                expected: expected_len,
                found: body.len(),
            });
        }
        let mismatch = file_crc != expected_crc;
        if mismatch && !force {
            return Ok(LoadOutcome::CrcMismatch);
        }
        self.regions.insert(region, body.to_vec());
        Ok(if mismatch {
            LoadOutcome::LoadedDespiteMismatch
        } else {
            LoadOutcome::Loaded
        })
    }

    /// Computes the ISO-HDLC CRC-32 of `rom`, the checksum embedded in and
    /// checked against the CDL file format.
    #[must_use]
    pub fn crc32(rom: &[u8]) -> u32 {
        CRC32.checksum(rom)
    }
}

/// Outcome of a [`CdlRecorder::load`] call that did not hard-fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Loaded; the stored CRC matched.
    Loaded,
    /// Not loaded; the stored CRC did not match and `force` was `false`.
    CrcMismatch,
    /// Loaded despite a CRC mismatch, at the caller's request (`force`).
    LoadedDespiteMismatch,
}

/// Failure modes for CDL persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// File does not start with the `CDLv2` magic header.
    #[error("not a CDL file (bad header)")]
    BadHeader,
    /// File body length does not match the tracked region's size.
    #[error("truncated CDL file: expected {expected} bytes, found {found}")]
    Truncated {
        /// Bytes the tracked region requires.
        expected: usize,
        /// Bytes actually present in the file body.
        found: usize,
    },
    /// Attempted to save/load a region that isn't currently tracked.
    #[error("region is not tracked by this CDL recorder")]
    Untracked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_code_sets_extra_flags_on_first_byte_only() {
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 16);
        cdl.mark_code(MemoryRegion::PrgRom, 4, CdlFlags::SUB_ENTRY_POINT, 3);
        assert!(cdl
            .flags_at(MemoryRegion::PrgRom, 4)
            .contains(CdlFlags::CODE | CdlFlags::SUB_ENTRY_POINT));
        assert_eq!(
            cdl.flags_at(MemoryRegion::PrgRom, 5),
            CdlFlags::CODE
        );
        assert_eq!(
            cdl.flags_at(MemoryRegion::PrgRom, 6),
            CdlFlags::CODE
        );
    }

    #[test]
    fn marks_are_monotonic() {
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 4);
        cdl.mark_data(MemoryRegion::PrgRom, 0, CdlFlags::empty(), 1);
        cdl.mark_code(MemoryRegion::PrgRom, 0, CdlFlags::empty(), 1);
        // Both bits remain set; marking as code never clears the data bit.
        assert!(cdl
            .flags_at(MemoryRegion::PrgRom, 0)
            .contains(CdlFlags::CODE | CdlFlags::DATA));
    }

    #[test]
    fn reset_clears_all_tracked_regions() {
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 4);
        cdl.mark_code(MemoryRegion::PrgRom, 0, CdlFlags::empty(), 1);
        cdl.reset();
        assert_eq!(cdl.flags_at(MemoryRegion::PrgRom, 0), CdlFlags::empty());
    }

    #[test]
    fn stats_count_each_flag_kind() {
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 4);
        cdl.mark_code(MemoryRegion::PrgRom, 0, CdlFlags::SUB_ENTRY_POINT, 1);
        cdl.mark_code(MemoryRegion::PrgRom, 1, CdlFlags::JUMP_TARGET, 1);
        cdl.mark_data(MemoryRegion::PrgRom, 2, CdlFlags::empty(), 1);
        let stats = cdl.stats(MemoryRegion::PrgRom);
        assert_eq!(stats.total_bytes, 4);
        assert_eq!(stats.code_bytes, 2);
        assert_eq!(stats.data_bytes, 1);
        assert_eq!(stats.sub_entry_points, 1);
        assert_eq!(stats.jump_targets, 1);
    }

    #[test]
    fn save_then_load_round_trips_on_matching_crc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.cdl");
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 8);
        cdl.mark_code(MemoryRegion::PrgRom, 0, CdlFlags::SUB_ENTRY_POINT, 4);
        let rom = vec![0u8; 0x8000];
        let crc = CdlRecorder::crc32(&rom);
        cdl.save(MemoryRegion::PrgRom, crc, &path).unwrap();

        let mut loaded = CdlRecorder::new();
        loaded.track(MemoryRegion::PrgRom, 8);
        let outcome = loaded.load(MemoryRegion::PrgRom, crc, false, &path).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(
            loaded.flags_at(MemoryRegion::PrgRom, 0),
            cdl.flags_at(MemoryRegion::PrgRom, 0)
        );
    }

    #[test]
    fn load_reports_crc_mismatch_without_forcing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.cdl");
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 4);
        cdl.save(MemoryRegion::PrgRom, 0x1111_1111, &path).unwrap();

        let mut loaded = CdlRecorder::new();
        loaded.track(MemoryRegion::PrgRom, 4);
        let outcome = loaded
            .load(MemoryRegion::PrgRom, 0x2222_2222, false, &path)
            .unwrap();
        assert_eq!(outcome, LoadOutcome::CrcMismatch);
    }

    #[test]
    fn load_forced_despite_mismatch_applies_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.cdl");
        let mut cdl = CdlRecorder::new();
        cdl.track(MemoryRegion::PrgRom, 4);
        cdl.mark_code(MemoryRegion::PrgRom, 0, CdlFlags::empty(), 1);
        cdl.save(MemoryRegion::PrgRom, 0x1111_1111, &path).unwrap();

        let mut loaded = CdlRecorder::new();
        loaded.track(MemoryRegion::PrgRom, 4);
        let outcome = loaded
            .load(MemoryRegion::PrgRom, 0x2222_2222, true, &path)
            .unwrap();
        assert_eq!(outcome, LoadOutcome::LoadedDespiteMismatch);
        assert_eq!(loaded.flags_at(MemoryRegion::PrgRom, 0), CdlFlags::CODE);
    }

    #[test]
    fn truncated_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.cdl");
        let mut short = CdlRecorder::new();
        short.track(MemoryRegion::PrgRom, 2);
        short.save(MemoryRegion::PrgRom, 0, &path).unwrap();

        let mut loaded = CdlRecorder::new();
        loaded.track(MemoryRegion::PrgRom, 8);
        assert!(matches!(
            loaded.load(MemoryRegion::PrgRom, 0, true, &path),
            Err(Error::Truncated { .. })
        ));
    }
}
