//! One lazily-populated instruction slot per byte of each memory region.
//!
//! The fast path (§4.3: "bounds-check, load one slot, branch on initialised
//! flag, return") is [`DisassemblyCache::get`]; everything else exists to
//! keep that path cheap.

use std::collections::HashMap;

use multidbg_arch::{AddressInfo, Disassembler, DisassemblyInfo, MemoryBus, MemoryRegion};

/// Per-region table of decoded-instruction slots.
///
/// One `Vec<DisassemblyInfo>` per region, sized to the region's byte count
/// and reallocated whenever that size changes (a ROM hot-swap, per §3's
/// lifetime note). Slots race under concurrent access — acceptable per §9,
/// since re-decoding the same bytes is idempotent.
#[derive(Debug, Default)]
pub struct DisassemblyCache {
    regions: HashMap<MemoryRegion, Vec<DisassemblyInfo>>,
}

impl DisassemblyCache {
    /// Creates an empty cache. Regions are allocated lazily on first
    /// [`Self::set_region_size`] or first access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)allocates `region`'s slot table to `size` bytes, clearing any
    /// previous contents. Called on ROM load and on any region-size change.
    pub fn set_region_size(&mut self, region: MemoryRegion, size: usize) {
        self.regions
            .insert(region, vec![DisassemblyInfo::EMPTY; size]);
    }

    /// Returns the cached instruction at `addr`, decoding and populating the
    /// slot via `decoder` if it was not already initialized.
    ///
    /// Returns `None` if `addr` does not resolve into a tracked region or
    /// falls outside its bounds.
    pub fn get(
        &mut self,
        addr: AddressInfo,
        cpu_flags: u8,
        bus: &dyn MemoryBus,
        decoder: &dyn Disassembler,
    ) -> Option<DisassemblyInfo> {
        let slots = self.regions.get_mut(&addr.region)?;
        let offset = usize::try_from(addr.offset).ok()?;
        let slot = slots.get_mut(offset)?;
        if !slot.initialized {
            *slot = decoder.decode(addr, cpu_flags, bus);
        }
        Some(*slot)
    }

    /// Returns the cached instruction at `addr` without decoding, for
    /// read-only consumers (e.g. a trace logger that only wants to annotate
    /// an instruction that was already decoded by `after_exec`).
    #[must_use]
    pub fn peek(&self, addr: AddressInfo) -> Option<DisassemblyInfo> {
        let slots = self.regions.get(&addr.region)?;
        let offset = usize::try_from(addr.offset).ok()?;
        slots.get(offset).filter(|s| s.initialized).copied()
    }

    /// Invalidates the slot at `addr` plus every slot starting within
    /// `max_instruction_length - 1` bytes before it, per the conservative
    /// policy recorded for the disassembly-cache invalidation Open Question:
    /// a write may have landed inside an instruction decoded starting at an
    /// earlier offset.
    pub fn invalidate(&mut self, addr: AddressInfo, max_instruction_length: usize) {
        let Some(slots) = self.regions.get_mut(&addr.region) else {
            return;
        };
        let Ok(offset) = usize::try_from(addr.offset) else {
            return;
        };
        let radius = max_instruction_length.saturating_sub(1);
        let start = offset.saturating_sub(radius);
        let end = (offset + 1).min(slots.len());
        for slot in &mut slots[start..end] {
            *slot = DisassemblyInfo::EMPTY;
        }
    }

    /// Clears every slot in `region`. The simpler, always-correct
    /// alternative to [`Self::invalidate`] that §4.3 explicitly permits.
    pub fn invalidate_region(&mut self, region: MemoryRegion) {
        if let Some(slots) = self.regions.get_mut(&region) {
            slots.fill(DisassemblyInfo::EMPTY);
        }
    }

    /// Length, in bytes, covered by the cached slot at `addr`, or `1` as a
    /// safe single-byte advance if nothing is cached there.
    #[must_use]
    pub fn instruction_len(&self, addr: AddressInfo) -> usize {
        self.peek(addr)
            .map_or(1, |info| usize::from(info.length).max(1))
    }
}
