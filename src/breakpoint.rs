//! Address/value/operation matching with conditional expression evaluation.
//!
//! Breakpoints are partitioned by [`AccessKind`] (§4.5) so the per-access
//! check can short-circuit on "no breakpoint exists for this op type"
//! before touching a single breakpoint definition.

use std::collections::HashMap;

use bitflags::bitflags;
use indexmap::IndexMap;
use multidbg_arch::{AccessKind, CpuKind, MemoryOperation, MemoryRegion};

use crate::expr::{EvalContext, ExpressionCache};

bitflags! {
    /// Which operation types a breakpoint applies to.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct BreakpointFlags: u8 {
        /// Matches ordinary and dummy/DMA/PPU-rendering reads.
        const READ = 0x01;
        /// Matches ordinary and dummy/DMA writes.
        const WRITE = 0x02;
        /// Matches opcode and operand fetches.
        const EXECUTE = 0x04;
        /// A forbid breakpoint: suppresses other breaks instead of causing
        /// one. Checked separately from ordinary breakpoints (§4.5).
        const FORBID = 0x08;
    }
}

/// One breakpoint definition.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Breakpoint {
    /// Stable identity, assigned by the caller (§6: "a stable key for
    /// breakpoint identity").
    pub id: u32,
    /// The CPU family this breakpoint's condition (if any) is compiled
    /// against.
    pub cpu: CpuKind,
    /// Region this breakpoint watches.
    pub region: MemoryRegion,
    /// Which operation types and category (forbid or not) this breakpoint
    /// applies to.
    pub flags: BreakpointFlags,
    /// Start of the matched address range, inclusive. `-1` means "any
    /// address in the region".
    pub start: i32,
    /// End of the matched address range, inclusive. Invariant: `start <=
    /// end` (when `start != -1`).
    pub end: i32,
    /// Whether this breakpoint currently participates in matching.
    pub enabled: bool,
    /// Record an event but never pause emulation.
    pub mark_only: bool,
    /// Never match dummy-kind accesses.
    pub ignore_dummy: bool,
    /// Bounded-length condition expression; `None` always matches.
    pub condition: Option<String>,
}

impl Breakpoint {
    /// Maximum accepted length of a condition string, per §3's "bounded
    /// length" invariant.
    pub const MAX_CONDITION_LEN: usize = 512;
}

/// Outcome of a per-access breakpoint check (§4.5 steps 3-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakpointMatch {
    /// No enabled breakpoint matched this access.
    None,
    /// A mark-only breakpoint matched: record an event, do not pause.
    MarkOnly(u32),
    /// A breakpoint matched and is eligible to pause emulation.
    Hit(u32),
}

fn kind_index(kind: AccessKind) -> usize {
    match kind {
        AccessKind::Read => 0,
        AccessKind::Write => 1,
        AccessKind::ExecOpcode => 2,
        AccessKind::ExecOperand => 3,
        AccessKind::DummyRead => 4,
        AccessKind::DummyWrite => 5,
        AccessKind::DmaRead => 6,
        AccessKind::DmaWrite => 7,
        AccessKind::PpuRenderingRead => 8,
    }
}

const NUM_KINDS: usize = 9;

fn flag_allows(flags: BreakpointFlags, kind: AccessKind) -> bool {
    if kind.is_exec() {
        flags.contains(BreakpointFlags::EXECUTE)
    } else if kind.is_read() {
        flags.contains(BreakpointFlags::READ)
    } else if kind.is_write() {
        flags.contains(BreakpointFlags::WRITE)
    } else {
        false
    }
}

/// Width-aware address match: the matched range is extended by `width - 1`
/// bytes so a multi-byte access that merely overlaps the breakpoint's range
/// is caught (§4.5 "Access width").
fn addr_in_range(start: i32, end: i32, addr: u32, width: u8) -> bool {
    if start < 0 {
        return true; // "any address in the region"
    }
    let addr = i64::from(addr);
    let access_end = addr + i64::from(width.max(1)) - 1;
    access_end >= i64::from(start) && addr <= i64::from(end)
}

/// Per-access-type partitioned breakpoint store plus the compiled-condition
/// caches that back it.
pub struct BreakpointEngine {
    by_id: IndexMap<u32, Breakpoint>,
    partitions: [Vec<u32>; NUM_KINDS],
    forbid_partitions: [Vec<u32>; NUM_KINDS],
    caches: HashMap<CpuKind, ExpressionCache>,
    any_forbid: bool,
}

impl Default for BreakpointEngine {
    fn default() -> Self {
        Self {
            by_id: IndexMap::new(),
            partitions: std::array::from_fn(|_| Vec::new()),
            forbid_partitions: std::array::from_fn(|_| Vec::new()),
            caches: HashMap::new(),
            any_forbid: false,
        }
    }
}

impl BreakpointEngine {
    /// Creates an engine with no breakpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full breakpoint set, copy-on-write style (§5: "UI builds
    /// a new list, one atomic pointer swap" — here realized as the caller
    /// building a fresh engine and swapping it into whatever `RwLock<Arc<_>>`
    /// the façade holds).
    pub fn set_breakpoints(&mut self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        *self = Self::new();
        for bp in breakpoints {
            self.insert(bp);
        }
    }

    /// Adds or replaces one breakpoint by id.
    pub fn insert(&mut self, bp: Breakpoint) {
        self.by_id.shift_remove(&bp.id);
        for partition in &mut self.partitions {
            partition.retain(|id| *id != bp.id);
        }
        for partition in &mut self.forbid_partitions {
            partition.retain(|id| *id != bp.id);
        }

        let forbid = bp.flags.contains(BreakpointFlags::FORBID);
        for kind in [
            AccessKind::Read,
            AccessKind::Write,
            AccessKind::ExecOpcode,
            AccessKind::ExecOperand,
            AccessKind::DummyRead,
            AccessKind::DummyWrite,
            AccessKind::DmaRead,
            AccessKind::DmaWrite,
            AccessKind::PpuRenderingRead,
        ] {
            if flag_allows(bp.flags, kind) {
                let bucket = if forbid {
                    &mut self.forbid_partitions
                } else {
                    &mut self.partitions
                };
                bucket[kind_index(kind)].push(bp.id);
            }
        }
        self.any_forbid |= forbid;
        self.caches
            .entry(bp.cpu)
            .or_insert_with(|| ExpressionCache::new(bp.cpu));
        self.by_id.insert(bp.id, bp);
    }

    /// Removes a breakpoint by id.
    pub fn remove(&mut self, id: u32) -> Option<Breakpoint> {
        for partition in &mut self.partitions {
            partition.retain(|i| *i != id);
        }
        for partition in &mut self.forbid_partitions {
            partition.retain(|i| *i != id);
        }
        self.by_id.shift_remove(&id)
    }

    /// Looks up a breakpoint by id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.by_id.get(&id)
    }

    /// Whether any breakpoint (of any kind) exists.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.by_id.is_empty()
    }

    /// Whether any breakpoint exists for the given op type — the engine's
    /// cheap "is anything armed?" query for this op type (§4.5).
    #[must_use]
    pub fn is_armed_for(&self, kind: AccessKind) -> bool {
        !self.partitions[kind_index(kind)].is_empty()
            || (self.any_forbid && !self.forbid_partitions[kind_index(kind)].is_empty())
    }

    /// Whether any forbid breakpoint exists at all.
    #[must_use]
    pub fn has_forbid(&self) -> bool {
        self.any_forbid
    }

    /// Runs the per-access check for an ordinary (non-forbid) breakpoint
    /// match (§4.5 steps 1-5).
    pub fn check(
        &self,
        kind: AccessKind,
        op: &MemoryOperation,
        width: u8,
        ctx: &EvalContext<'_>,
    ) -> BreakpointMatch {
        self.scan(&self.partitions[kind_index(kind)], kind, op, width, ctx)
    }

    /// Runs the forbid-breakpoint check: returns the id of the first
    /// matching forbid breakpoint, or `None`. The step coordinator uses this
    /// to decide whether to suppress an exception break (§4.5, §9 glossary).
    pub fn check_forbid(
        &self,
        kind: AccessKind,
        op: &MemoryOperation,
        width: u8,
        ctx: &EvalContext<'_>,
    ) -> Option<u32> {
        if !self.any_forbid {
            return None;
        }
        match self.scan(&self.forbid_partitions[kind_index(kind)], kind, op, width, ctx) {
            BreakpointMatch::Hit(id) | BreakpointMatch::MarkOnly(id) => Some(id),
            BreakpointMatch::None => None,
        }
    }

    fn scan(
        &self,
        ids: &[u32],
        kind: AccessKind,
        op: &MemoryOperation,
        width: u8,
        ctx: &EvalContext<'_>,
    ) -> BreakpointMatch {
        if ids.is_empty() {
            return BreakpointMatch::None;
        }
        for &id in ids {
            let Some(bp) = self.by_id.get(&id) else {
                continue;
            };
            if !bp.enabled || bp.region != op.region {
                continue;
            }
            if bp.ignore_dummy && kind.is_dummy() {
                continue;
            }
            if !addr_in_range(bp.start, bp.end, op.addr, width) {
                continue;
            }
            if let Some(cond) = &bp.condition {
                let cache = self
                    .caches
                    .get(&bp.cpu)
                    .expect("cache populated for every cpu kind seen by insert");
                let Ok(expr) = cache.get_or_compile(cond) else {
                    continue; // malformed condition never matches
                };
                if !crate::expr::evaluate(&expr, ctx).is_true() {
                    continue;
                }
            }
            return if bp.mark_only {
                BreakpointMatch::MarkOnly(id)
            } else {
                BreakpointMatch::Hit(id)
            };
        }
        BreakpointMatch::None
    }

    /// Ensures a condition-expression cache exists for `cpu`, compiling any
    /// conditions already set for breakpoints of that family. Called by
    /// [`Self::insert`]'s caller up front (via [`Self::prime`]) so `check`
    /// never needs to insert into `self.caches` on the hot path.
    pub fn prime(&mut self, cpu: CpuKind) {
        self.caches.entry(cpu).or_insert_with(|| ExpressionCache::new(cpu));
    }
}
