//! Blocks emulation writes to a small set of user-frozen addresses (§4.10).

use rustc_hash::FxHashSet;

use multidbg_arch::MemoryRegion;

/// A set of `(region, offset)` addresses the UI has frozen.
///
/// Typically empty or tiny (a handful of watched RAM cells), hence the
/// `len() == 0` short-circuit ahead of the hash lookup on every write.
#[derive(Default, Clone)]
pub struct FrozenAddresses {
    addrs: FxHashSet<(MemoryRegion, i32)>,
}

impl FrozenAddresses {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes `(region, offset)`: the façade blocks emulation writes to it
    /// until [`Self::unfreeze`] is called.
    pub fn freeze(&mut self, region: MemoryRegion, offset: i32) {
        self.addrs.insert((region, offset));
    }

    /// Un-freezes `(region, offset)`. No-op if it wasn't frozen.
    pub fn unfreeze(&mut self, region: MemoryRegion, offset: i32) {
        self.addrs.remove(&(region, offset));
    }

    /// Freezes or unfreezes every address in `start..=end` within `region`,
    /// per the `set_frozen_range(start, end, freeze)` API surface (§6).
    pub fn set_range(&mut self, region: MemoryRegion, start: i32, end: i32, freeze: bool) {
        for offset in start..=end {
            if freeze {
                self.freeze(region, offset);
            } else {
                self.unfreeze(region, offset);
            }
        }
    }

    /// Whether `(region, offset)` is currently frozen. Emulation writes
    /// (not debugger-UI writes, which bypass the freeze per §4.10) consult
    /// this before applying.
    #[must_use]
    pub fn is_frozen(&self, region: MemoryRegion, offset: i32) -> bool {
        !self.addrs.is_empty() && self.addrs.contains(&(region, offset))
    }

    /// Number of currently frozen addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether no address is currently frozen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Un-freezes every address.
    pub fn clear(&mut self) {
        self.addrs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_reports_nothing_frozen() {
        let set = FrozenAddresses::new();
        assert!(!set.is_frozen(MemoryRegion::WorkRam, 0x10));
    }

    #[test]
    fn freeze_then_unfreeze_round_trips() {
        let mut set = FrozenAddresses::new();
        set.freeze(MemoryRegion::WorkRam, 0x10);
        assert!(set.is_frozen(MemoryRegion::WorkRam, 0x10));
        set.unfreeze(MemoryRegion::WorkRam, 0x10);
        assert!(!set.is_frozen(MemoryRegion::WorkRam, 0x10));
    }

    #[test]
    fn set_range_freezes_inclusive_bounds() {
        let mut set = FrozenAddresses::new();
        set.set_range(MemoryRegion::WorkRam, 0x10, 0x12, true);
        assert!(set.is_frozen(MemoryRegion::WorkRam, 0x10));
        assert!(set.is_frozen(MemoryRegion::WorkRam, 0x11));
        assert!(set.is_frozen(MemoryRegion::WorkRam, 0x12));
        assert!(!set.is_frozen(MemoryRegion::WorkRam, 0x13));
    }

    #[test]
    fn different_regions_are_independent() {
        let mut set = FrozenAddresses::new();
        set.freeze(MemoryRegion::WorkRam, 0x10);
        assert!(!set.is_frozen(MemoryRegion::SaveRam, 0x10));
    }
}
