//! Per-subroutine call-count and cycle accounting.
//!
//! Keyed on a packed `region_offset | (region_tag << 24)` `u32` (§4.7: "a
//! flat vector... or a hash map; a hash map is acceptable if memory
//! footprint matters"). The mandatory optimization regardless of storage
//! choice is avoiding re-deriving that key and re-hashing on pop: each
//! active call caches its already-computed key (an index, not a raw
//! pointer, since an [`rustc_hash::FxHashMap`] offers no pointer stability
//! across inserts) so [`Profiler::on_pop`] looks the function up exactly
//! once.

use rustc_hash::FxHashMap;

use multidbg_arch::{AddressInfo, MemoryRegion};

use crate::callstack::StackFrameFlags;

/// Opaque key identifying one profiled function's table entry.
pub type ProfilerKey = u32;

/// Packs a `(region, offset)` address into a [`ProfilerKey`].
///
/// The top 8 bits hold the region's enum discriminant, the low 24 bits the
/// offset — enough for any region up to 16 MiB, comfortably above every
/// console family's addressable ROM/RAM in this spec's scope.
#[must_use]
pub fn pack_key(addr: AddressInfo) -> ProfilerKey {
    let region_tag = region_tag(addr.region);
    let offset = u32::try_from(addr.offset.max(0)).unwrap_or(0) & 0x00FF_FFFF;
    offset | (region_tag << 24)
}

fn region_tag(region: MemoryRegion) -> u32 {
    // Stable small tag, independent of enum discriminant layout.
    match region {
        MemoryRegion::PrgRom => 0,
        MemoryRegion::ChrRom => 1,
        MemoryRegion::WorkRam => 2,
        MemoryRegion::SaveRam => 3,
        MemoryRegion::Vram => 4,
        MemoryRegion::Oam => 5,
        MemoryRegion::PaletteRam => 6,
        MemoryRegion::Registers => 7,
        MemoryRegion::HighRam => 8,
        MemoryRegion::BootRom => 9,
    }
}

/// Accumulated statistics for one subroutine entry point.
#[derive(Clone, Copy, Debug)]
pub struct ProfiledFunction {
    /// The subroutine's entry address.
    pub address: AddressInfo,
    /// Number of times this function has been entered.
    pub call_count: u64,
    /// Cycles spent in this function across all calls, including callees,
    /// for the outermost activation of any self-recursive run (so
    /// recursion does not inflate this beyond the actual wall-clock time
    /// spent under the function).
    pub inclusive_cycles: u64,
    /// Cycles spent in this function's own code, across all calls,
    /// excluding time spent in callees.
    pub exclusive_cycles: u64,
    /// Shortest single-call duration observed.
    pub min_cycles: u64,
    /// Longest single-call duration observed.
    pub max_cycles: u64,
    /// Flags from the most recent call's stack frame.
    pub frame_flags: StackFrameFlags,
}

impl ProfiledFunction {
    fn new(address: AddressInfo) -> Self {
        Self {
            address,
            call_count: 0,
            inclusive_cycles: 0,
            exclusive_cycles: 0,
            min_cycles: u64::MAX,
            max_cycles: 0,
            frame_flags: StackFrameFlags::empty(),
        }
    }
}

struct ActiveCall {
    key: ProfilerKey,
    push_cycle: u64,
    child_total: u64,
    interrupt_child_total: u64,
    flags: StackFrameFlags,
    outermost: bool,
}

/// Subroutine profiler, driven in lockstep with [`crate::callstack::CallStack`]
/// push/pop events.
#[derive(Default)]
pub struct Profiler {
    functions: FxHashMap<ProfilerKey, ProfiledFunction>,
    active: Vec<ActiveCall>,
    active_depth: FxHashMap<ProfilerKey, u32>,
}

impl Profiler {
    /// Creates an empty profiler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records entry into `addr` at `cycle`, returning the key to pass back
    /// to [`Self::on_pop`].
    pub fn on_push(&mut self, addr: AddressInfo, cycle: u64, flags: StackFrameFlags) -> ProfilerKey {
        let key = pack_key(addr);
        let depth = self.active_depth.entry(key).or_insert(0);
        let outermost = *depth == 0;
        *depth += 1;

        let entry = self
            .functions
            .entry(key)
            .or_insert_with(|| ProfiledFunction::new(addr));
        entry.call_count += 1;

        self.active.push(ActiveCall {
            key,
            push_cycle: cycle,
            child_total: 0,
            interrupt_child_total: 0,
            flags,
            outermost,
        });
        key
    }

    /// Records a return at `cycle`, the counterpart to the most recent
    /// unmatched [`Self::on_push`]. No-op (returns `None`) if nothing is
    /// active — the call-stack component is the authority on underflow
    /// detection; the profiler simply declines to account for a pop it
    /// never saw a push for.
    ///
    /// Per §4.7, an IRQ/NMI frame's elapsed time is added to its own
    /// inclusive total but never propagates past it into whatever it
    /// interrupted: this frame's own span still includes that time (cycles
    /// elapsed are cycles elapsed), so `interrupt_child_total` is subtracted
    /// back out before crediting `inclusive_cycles`, stopping the
    /// propagation exactly at the interrupt boundary.
    pub fn on_pop(&mut self, cycle: u64) -> Option<ProfilerKey> {
        let entry = self.active.pop()?;
        let total = cycle.saturating_sub(entry.push_cycle);
        let exclusive = total.saturating_sub(entry.child_total);
        let inclusive = total.saturating_sub(entry.interrupt_child_total);

        if let Some(depth) = self.active_depth.get_mut(&entry.key) {
            *depth = depth.saturating_sub(1);
        }

        if let Some(func) = self.functions.get_mut(&entry.key) {
            func.exclusive_cycles += exclusive;
            if entry.outermost {
                func.inclusive_cycles += inclusive;
            }
            func.min_cycles = func.min_cycles.min(total);
            func.max_cycles = func.max_cycles.max(total);
            func.frame_flags = entry.flags;
        }

        if let Some(parent) = self.active.last_mut() {
            parent.child_total += total;
            if entry.flags.intersects(StackFrameFlags::NMI | StackFrameFlags::IRQ) {
                parent.interrupt_child_total += total;
            }
        }

        Some(entry.key)
    }

    /// Looks up one function's accumulated statistics.
    #[must_use]
    pub fn get(&self, key: ProfilerKey) -> Option<&ProfiledFunction> {
        self.functions.get(&key)
    }

    /// Iterates every profiled function.
    pub fn iter(&self) -> impl Iterator<Item = (&ProfilerKey, &ProfiledFunction)> {
        self.functions.iter()
    }

    /// Number of distinct functions profiled so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no function has been profiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Clears all accumulated statistics and in-flight call tracking (ROM
    /// reload).
    pub fn reset(&mut self) {
        self.functions.clear();
        self.active.clear();
        self.active_depth.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multidbg_arch::MemoryRegion;

    fn addr(offset: i32) -> AddressInfo {
        AddressInfo {
            region: MemoryRegion::PrgRom,
            offset,
        }
    }

    #[test]
    fn non_recursive_conservation() {
        let mut p = Profiler::new();
        let outer = p.on_push(addr(0x100), 0, StackFrameFlags::empty());
        // inner runs from cycle 10 to cycle 30 (20 cycles)
        let inner = p.on_push(addr(0x200), 10, StackFrameFlags::empty());
        p.on_pop(30);
        // outer runs from cycle 0 to cycle 40 (40 cycles total, 20 exclusive)
        p.on_pop(40);

        let outer_fn = p.get(outer).unwrap();
        let inner_fn = p.get(inner).unwrap();
        assert_eq!(outer_fn.exclusive_cycles, 20);
        assert_eq!(outer_fn.inclusive_cycles, 40);
        assert_eq!(inner_fn.exclusive_cycles, 20);
        assert_eq!(inner_fn.inclusive_cycles, 20);
        // outer.inclusive >= inner.inclusive + outer.exclusive, equal here.
        assert_eq!(outer_fn.inclusive_cycles, inner_fn.inclusive_cycles + outer_fn.exclusive_cycles);
    }

    #[test]
    fn deep_recursion_flat_summation() {
        let mut p = Profiler::new();
        const DEPTH: u64 = 50;
        const OWN: u64 = 7;
        let r = addr(0x400);
        let mut cycle = 0u64;
        let mut keys = Vec::new();
        for _ in 0..DEPTH {
            keys.push(p.on_push(r, cycle, StackFrameFlags::empty()));
            cycle += OWN;
        }
        for _ in 0..DEPTH {
            p.on_pop(cycle);
        }
        let func = p.get(keys[0]).unwrap();
        assert_eq!(func.call_count, DEPTH);
        assert_eq!(func.exclusive_cycles, DEPTH * OWN);
        assert_eq!(func.inclusive_cycles, DEPTH * OWN);
        assert!(func.max_cycles >= OWN);
    }

    #[test]
    fn interrupt_frame_does_not_inflate_interrupted_exclusive() {
        let mut p = Profiler::new();
        let main = p.on_push(addr(0x100), 0, StackFrameFlags::empty());
        // An NMI interrupts main for 100 cycles.
        let nmi = p.on_push(addr(0x900), 10, StackFrameFlags::NMI);
        p.on_pop(110);
        p.on_pop(120); // main resumes and finishes shortly after

        let main_fn = p.get(main).unwrap();
        let nmi_fn = p.get(nmi).unwrap();
        // main's exclusive excludes the 100 cycles spent in the NMI handler.
        assert_eq!(main_fn.exclusive_cycles, 120 - 100);
        assert_eq!(nmi_fn.exclusive_cycles, 100);
        assert_eq!(nmi_fn.inclusive_cycles, 100);
        // main's inclusive also excludes the interrupt: the NMI's time never
        // propagates past the interrupt boundary into the interrupted function.
        assert_eq!(main_fn.inclusive_cycles, 120 - 100);
    }

    #[test]
    fn pack_key_distinguishes_regions() {
        let a = pack_key(AddressInfo {
            region: MemoryRegion::PrgRom,
            offset: 0x10,
        });
        let b = pack_key(AddressInfo {
            region: MemoryRegion::WorkRam,
            offset: 0x10,
        });
        assert_ne!(a, b);
    }
}
