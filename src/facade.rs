//! The single entry point an emulation core talks to (§4.11).
//!
//! Composes every subsystem in this crate. Grounded on `rugby`'s own
//! `extras/gbd::Debugger` — a single struct an emulation core drives every
//! cycle (`Block::cycle`, `Block::ready`) and that the UI thread reaches into
//! for snapshots (`Debugger::sync`, `Debugger::inform`) — generalized here
//! from one hardcoded Game Boy core to any [`CpuKind`] and from a single
//! emulation loop to the explicit before/after-access hooks §4.11's table
//! names.
//!
//! Lock discipline follows §5's table: the breakpoint list, label store, and
//! frozen-address set are copy-on-write (`RwLock<Arc<_>>`, UI-thread writers
//! build a whole new value and swap the pointer); the disassembly cache, CDL
//! recorder, call stack, profiler, and event recorder are emulation-thread-only
//! data that still need a `Mutex` in safe Rust to live behind `&Debugger`
//! shared by both threads — uncontended in the steady state, so this costs
//! nothing close to what a true lock-free design would race to avoid, which
//! is the pragmatic reading of §9's "document the relaxation explicitly"
//! guidance applied to a language that won't let us skip synchronization
//! outright. [`crate::event::EventRecorder`]'s own internal split (a plain
//! `current` vector, a separately `Mutex`-guarded `previous` one) only pays
//! off when a type's `&mut self` methods are reachable without going through
//! an outer lock first; composed behind this façade's own `Mutex`, every
//! `record_event` call still takes one lock, same as the other four.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use multidbg_arch::{
    AccessKind, AddressInfo, CpuKind, Disassembler, EmulatedCpu, MemoryBus, MemoryOperation,
    MemoryRegion,
};

use crate::breakpoint::{Breakpoint, BreakpointEngine, BreakpointMatch};
use crate::callstack::{CallStack, StackFrame, StackFrameFlags};
use crate::cdl::{CdlFlags, CdlRecorder, LoadOutcome};
use crate::cfg::DebuggerConfig;
use crate::error::Result;
use crate::event::{DebugEvent, EventFlags, EventKind, EventRecorder};
use crate::expr::EvalContext;
use crate::frozen::FrozenAddresses;
use crate::label::{Label, LabelStore};
use crate::profiler::{ProfiledFunction, Profiler, ProfilerKey};
use crate::script::{ExecCallback, ReadCallback, ScriptBridge, WriteCallback};
use crate::step::{BreakSource, Rewind, StepCoordinator, StepRequest, StepType};
use crate::trace::TraceLogger;

/// A minimal UI-facing snapshot of debugger-owned state (§4.11
/// `get_state()`). CPU/PPU register snapshots are the emulation core's own
/// concern (`&dyn EmulatedCpu`/`&dyn PpuState` already expose them live) —
/// this struct carries only what the debugger itself accumulates.
#[derive(Clone, Copy, Debug)]
pub struct DebuggerState {
    /// Whether the emulation thread is currently halted.
    pub halted: bool,
    /// The cause that would be reported if halted right now.
    pub effective_source: BreakSource,
    /// Current call-stack depth.
    pub callstack_depth: usize,
    /// Total reads observed since construction (or the last [`Debugger::reset_counters`]).
    pub reads: u64,
    /// Total writes observed since construction.
    pub writes: u64,
}

/// Debugger core for one running console instance.
///
/// Constructed after ROM load with the full memory map known (regions
/// tracked via [`Self::track_region`]); torn down on ROM unload. One instance
/// per emulated console; never shared across consoles.
pub struct Debugger {
    cpu_kind: CpuKind,
    cfg: DebuggerConfig,

    labels: RwLock<Arc<LabelStore>>,
    breakpoints: RwLock<Arc<BreakpointEngine>>,
    frozen: RwLock<Arc<FrozenAddresses>>,

    disasm: Mutex<crate::disasm::DisassemblyCache>,
    cdl: Mutex<CdlRecorder>,
    events: Mutex<EventRecorder>,
    callstack: Mutex<CallStack>,
    profiler: Mutex<Profiler>,
    trace: Mutex<TraceLogger>,
    script: Mutex<ScriptBridge>,
    step: StepCoordinator,

    reads: AtomicU64,
    writes: AtomicU64,
}

impl Debugger {
    /// Constructs a debugger for a console of the given family.
    #[must_use]
    pub fn new(cpu_kind: CpuKind, cfg: DebuggerConfig) -> Self {
        let mut breakpoints = BreakpointEngine::new();
        breakpoints.prime(cpu_kind);
        Self {
            cpu_kind,
            cfg,
            labels: RwLock::new(Arc::new(LabelStore::new())),
            breakpoints: RwLock::new(Arc::new(breakpoints)),
            frozen: RwLock::new(Arc::new(FrozenAddresses::new())),
            disasm: Mutex::new(crate::disasm::DisassemblyCache::new()),
            cdl: Mutex::new(CdlRecorder::new()),
            events: Mutex::new(EventRecorder::new()),
            callstack: Mutex::new(CallStack::new(cfg.callstack_capacity)),
            profiler: Mutex::new(Profiler::new()),
            trace: Mutex::new(TraceLogger::new()),
            script: Mutex::new(ScriptBridge::new()),
            step: StepCoordinator::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// The CPU family this instance was constructed for.
    #[must_use]
    pub fn cpu_kind(&self) -> CpuKind {
        self.cpu_kind
    }

    // ---- ROM load / hot-swap lifecycle --------------------------------

    /// Begins tracking `region` at `size` bytes for the disassembly cache and
    /// CDL recorder. Call once per region after ROM load, and again on a
    /// region-size change (a ROM hot-swap), per §7's "region size change
    /// mid-session" row: caches are torn down and rebuilt, but breakpoints,
    /// labels, and the frozen set are untouched since they don't depend on
    /// region size.
    pub fn track_region(&self, region: MemoryRegion, size: usize) {
        self.disasm.lock().set_region_size(region, size);
        self.cdl.lock().track(region, size);
    }

    // ---- Setters: copy-on-write swaps (§5) -----------------------------

    /// Replaces the full breakpoint set.
    pub fn set_breakpoints(&self, list: impl IntoIterator<Item = Breakpoint>) {
        let mut engine = BreakpointEngine::new();
        engine.prime(self.cpu_kind);
        for bp in list {
            engine.prime(bp.cpu);
            engine.insert(bp);
        }
        *self.breakpoints.write() = Arc::new(engine);
    }

    /// Replaces the full label set.
    pub fn set_labels(&self, list: impl IntoIterator<Item = (String, Label)>) {
        let mut store = LabelStore::new();
        for (name, label) in list {
            store.insert(name.clone(), label.region, label.offset);
            if let Some(comment) = label.comment {
                store.set_comment(&name, comment);
            }
        }
        *self.labels.write() = Arc::new(store);
    }

    /// Freezes or unfreezes every address in `start..=end` within `region`.
    pub fn set_frozen_range(&self, region: MemoryRegion, start: i32, end: i32, freeze: bool) {
        let mut frozen = (**self.frozen.read()).clone();
        frozen.set_range(region, start, end, freeze);
        *self.frozen.write() = Arc::new(frozen);
    }

    // ---- Step/run control -----------------------------------------------

    /// Arms `request` and releases the emulation thread if it was halted.
    pub fn set_step(&self, request: StepRequest) {
        self.step.set_step(request);
    }

    /// Clears every terminating condition and frees the emulation thread to
    /// run until the next armed condition.
    pub fn run(&self) {
        self.step.run();
    }

    /// Arms an immediate pause.
    pub fn pause(&self) {
        self.step.pause();
    }

    /// Steps one instruction, descending into calls.
    pub fn step_into(&self) {
        self.step.set_step(StepRequest {
            step_count: 1,
            step_type: StepType::StepInto,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Steps one instruction, running through (not into) a call at `pc`.
    /// `call_len` is the length in bytes of the call instruction at `pc`;
    /// `sp` is the stack pointer before the call executes. Per spec.md §8
    /// scenario #3, the step also completes via `sp` if the call is
    /// diverted by an interrupt that never returns to `pc + call_len`.
    pub fn step_over(&self, pc: u32, call_len: u32, sp: u32) {
        self.step.set_step(StepRequest {
            break_address: i64::from(pc + call_len),
            break_stack_pointer: i64::from(sp),
            step_type: StepType::StepOver,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Runs until the stack pointer returns to `sp` (the pre-call value).
    pub fn step_out(&self, sp: u32) {
        self.step.set_step(StepRequest {
            break_stack_pointer: i64::from(sp),
            step_type: StepType::StepOut,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Steps a fixed number of CPU cycles.
    pub fn step_cycles(&self, cycles: u32) {
        self.step.set_step(StepRequest {
            cpu_cycle_step_count: i32::try_from(cycles).unwrap_or(i32::MAX),
            step_type: StepType::StepCycles,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Steps a fixed number of PPU dots.
    pub fn step_ppu_dots(&self, dots: u32) {
        self.step.set_step(StepRequest {
            ppu_step_count: i32::try_from(dots).unwrap_or(i32::MAX),
            step_type: StepType::StepPpuDots,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Runs until the PPU reaches `scanline`.
    pub fn run_to_scanline(&self, scanline: i32) {
        self.step.set_step(StepRequest {
            break_scanline: scanline,
            step_type: StepType::RunToScanline,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Runs until the next maskable interrupt.
    pub fn run_to_irq(&self) {
        self.step.set_step(StepRequest {
            step_type: StepType::RunToIrq,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Runs until the next non-maskable interrupt.
    pub fn run_to_nmi(&self) {
        self.step.set_step(StepRequest {
            step_type: StepType::RunToNmi,
            has_request: true,
            ..StepRequest::default()
        });
    }

    /// Rewinds `instructions` instructions via `rewind`, then resumes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RewindOutOfWindow`] if the rewind target falls
    /// outside retained history.
    pub fn step_back_instructions(&self, rewind: &mut dyn Rewind, instructions: u32) -> Result<()> {
        self.step.step_back_instructions(rewind, instructions)
    }

    /// Rewinds `scanlines` scanlines' worth of cycles via `rewind`, then
    /// resumes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RewindOutOfWindow`] if the rewind target falls
    /// outside retained history.
    pub fn step_back_scanlines(&self, rewind: &mut dyn Rewind, scanlines: u32) -> Result<()> {
        self.step.step_back_scanlines(rewind, scanlines)
    }

    /// Rewinds `scanlines_per_frame` scanlines' worth of cycles via `rewind`
    /// (one frame), then resumes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RewindOutOfWindow`] if the rewind target falls
    /// outside retained history.
    pub fn step_back_frame(&self, rewind: &mut dyn Rewind, scanlines_per_frame: u32) -> Result<()> {
        self.step.step_back_frame(rewind, scanlines_per_frame)
    }

    /// Blocks the calling (emulation) thread until the armed step
    /// request's break classification is cleared.
    pub fn block_until_resumed(&self) {
        self.step.block_until_resumed();
    }

    // ---- Per-access hooks (§4.11) ---------------------------------------

    /// Pre-fetch hook: suspends the emulation thread if halted, then marks
    /// the upcoming fetch as an opcode fetch for the script bridge's
    /// exec-dispatch gate.
    pub fn before_exec(&self, _cpu: &dyn EmulatedCpu, pc: u32) {
        self.step.block_until_resumed();
        self.script.lock().set_process_exec(true);
        trace!("before_exec: cpu={pc:#06x}");
    }

    /// Post-retire hook: marks the opcode byte(s) as code in the CDL,
    /// populates the disassembly cache slot, logs a trace line, and checks
    /// the step coordinator's per-instruction termination conditions (PC
    /// reach and, for step-out/step-over, SP reach).
    pub fn after_exec(
        &self,
        addr: AddressInfo,
        cpu_addr: u32,
        sp: u32,
        cpu_flags: u8,
        width: usize,
        extra_flags: CdlFlags,
        bus: &dyn MemoryBus,
        decoder: &dyn Disassembler,
    ) {
        let Ok(offset) = usize::try_from(addr.offset) else {
            return;
        };
        self.cdl.lock().mark_code(addr.region, offset, extra_flags, width);
        self.disasm.lock().get(addr, cpu_flags, bus, decoder);
        {
            let disasm = self.disasm.lock();
            let labels = self.labels.read();
            let mut trace = self.trace.lock();
            let _ = trace.log(cpu_addr, addr, &disasm, &labels);
        }
        self.step.on_after_instruction(cpu_addr);
        self.step.on_sp_reach(sp);
    }

    /// Per-CPU-cycle hook, forwarded from the CPU core.
    pub fn after_cpu_cycle(&self) {
        self.step.on_cpu_cycle();
    }

    /// Per-PPU-cycle hook, forwarded from the PPU core.
    pub fn after_ppu_cycle(&self, scanline: i32) {
        self.step.on_ppu_cycle(scanline);
    }

    /// Read-access hook. Returns a script-supplied override value, if any.
    pub fn on_read(&self, op: MemoryOperation, addr: AddressInfo, width: u8, ctx: &EvalContext<'_>) -> Option<i64> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        if let Ok(offset) = usize::try_from(addr.offset) {
            self.cdl.lock().mark_data(op.region, offset, CdlFlags::empty(), usize::from(width));
        }

        self.check_breakpoint(op.kind, &op, width, ctx);

        self.script.lock().dispatch(&op)
    }

    /// Write-access hook. Returns `false` if the write is blocked by a
    /// frozen address (the caller must not apply it); writes issued by the
    /// debugger UI itself should bypass this hook entirely, per §4.10.
    pub fn on_write(&self, op: MemoryOperation, addr: AddressInfo, width: u8, ctx: &EvalContext<'_>) -> bool {
        if self.frozen.read().is_frozen(op.region, addr.offset) {
            return false;
        }

        self.writes.fetch_add(1, Ordering::Relaxed);

        if let Ok(offset) = usize::try_from(addr.offset) {
            self.cdl.lock().mark_data(op.region, offset, CdlFlags::empty(), usize::from(width));
        }

        self.check_breakpoint(op.kind, &op, width, ctx);
        self.script.lock().dispatch(&op);

        self.disasm.lock().invalidate(addr, self.cpu_kind.max_instruction_length());

        true
    }

    fn check_breakpoint(&self, kind: AccessKind, op: &MemoryOperation, width: u8, ctx: &EvalContext<'_>) {
        let engine = self.breakpoints.read();
        if !engine.is_armed_for(kind) {
            return;
        }
        match engine.check(kind, op, width, ctx) {
            BreakpointMatch::Hit(id) => {
                self.step.set_break_source(BreakSource::Breakpoint, true);
                self.record_event(EventKind::Breakpoint, op, Some(id));
                debug!("breakpoint {id} hit at {:#06x}", op.addr);
            }
            BreakpointMatch::MarkOnly(id) => {
                self.record_event(EventKind::Breakpoint, op, Some(id));
            }
            BreakpointMatch::None => {}
        }
    }

    /// Checks forbid breakpoints for `kind`/`op`, suppressing `src` (an
    /// exception cause) rather than raising it if one matches. Returns
    /// whether the exception was suppressed.
    pub fn check_forbid_then_raise(&self, kind: AccessKind, op: &MemoryOperation, width: u8, ctx: &EvalContext<'_>, src: BreakSource) -> bool {
        let engine = self.breakpoints.read();
        if let Some(id) = engine.check_forbid(kind, op, width, ctx) {
            debug!("forbid breakpoint {id} suppressed exception {src}");
            return true;
        }
        drop(engine);
        self.step.set_break_source(src, true);
        false
    }

    /// Interrupt hook: records an event, pushes a call-stack/profiler frame
    /// tagged NMI/IRQ, and checks the step coordinator's run-to-IRQ/NMI
    /// condition.
    pub fn on_interrupt(&self, mut frame: StackFrame, cycle: u64, kind: BreakSource) {
        frame.flags |= if matches!(kind, BreakSource::Nmi) {
            StackFrameFlags::NMI
        } else {
            StackFrameFlags::IRQ
        };

        self.record_event(
            if matches!(kind, BreakSource::Nmi) { EventKind::Nmi } else { EventKind::Irq },
            &MemoryOperation {
                addr: frame.dest_cpu_addr,
                value: 0,
                kind: AccessKind::ExecOpcode,
                region: frame.dest.region,
            },
            None,
        );
        self.on_call(frame, cycle);
        self.step.on_interrupt(kind);
    }

    /// Pushes a call-stack frame and the matching profiler entry.
    pub fn on_call(&self, frame: StackFrame, cycle: u64) {
        let key = self.profiler.lock().on_push(frame.dest, cycle, frame.flags);
        self.callstack.lock().push(frame, key);
    }

    /// Pops the most recent call-stack frame and its matching profiler
    /// entry. Records a [`EventKind::StackUnderflow`] event instead of
    /// panicking if the stack was already empty.
    pub fn on_return(&self, cycle: u64) {
        let popped = self.callstack.lock().pop();
        if popped.is_some() {
            self.profiler.lock().on_pop(cycle);
        } else {
            self.record_event(
                EventKind::StackUnderflow,
                &MemoryOperation {
                    addr: 0,
                    value: 0,
                    kind: AccessKind::ExecOpcode,
                    region: MemoryRegion::PrgRom,
                },
                None,
            );
        }
    }

    fn record_event(&self, kind: EventKind, op: &MemoryOperation, breakpoint_id: Option<u32>) {
        self.events.lock().record(DebugEvent {
            kind,
            pc: op.addr,
            scanline: 0,
            cycle: 0,
            operation: *op,
            target: None,
            register_id: -1,
            breakpoint_id: breakpoint_id.map_or(-1, |id| i32::try_from(id).unwrap_or(-1)),
            flags: EventFlags::empty(),
            color: 0,
        });
    }

    // ---- Snapshots & accessors ------------------------------------------

    /// A snapshot of debugger-owned state, for `get_state()`.
    #[must_use]
    pub fn get_state(&self) -> DebuggerState {
        DebuggerState {
            halted: self.step.should_halt(),
            effective_source: self.step.effective_source(),
            callstack_depth: self.callstack.lock().len(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Resets the read/write access counters to zero.
    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    /// Current call-stack frames, newest first.
    #[must_use]
    pub fn get_callstack(&self) -> Vec<StackFrame> {
        self.callstack.lock().iter().copied().collect()
    }

    /// A snapshot of every profiled function.
    #[must_use]
    pub fn get_profiler_data(&self) -> Vec<(ProfilerKey, ProfiledFunction)> {
        self.profiler.lock().iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// CDL flags for `length` consecutive bytes starting at `offset` in
    /// `region`.
    #[must_use]
    pub fn get_cdl(&self, region: MemoryRegion, offset: usize, length: usize) -> Vec<CdlFlags> {
        let cdl = self.cdl.lock();
        (offset..offset + length).map(|o| cdl.flags_at(region, o)).collect()
    }

    /// Saves `region`'s CDL flag array to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cdl`] on any filesystem failure or if `region`
    /// is not tracked.
    pub fn save_cdl(&self, region: MemoryRegion, rom_crc: u32, path: impl AsRef<Path>) -> Result<()> {
        Ok(self.cdl.lock().save(region, rom_crc, path)?)
    }

    /// Loads `region`'s CDL flag array from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cdl`] on any filesystem failure, header
    /// mismatch, or truncation.
    pub fn load_cdl(
        &self,
        region: MemoryRegion,
        expected_crc: u32,
        force: bool,
        path: impl AsRef<Path>,
    ) -> Result<LoadOutcome> {
        Ok(self.cdl.lock().load(region, expected_crc, force, path)?)
    }

    /// Events recorded so far in the current (in-progress) frame.
    #[must_use]
    pub fn current_frame_events(&self) -> Vec<DebugEvent> {
        self.events.lock().current_frame().to_vec()
    }

    /// Events from the most recently completed frame.
    #[must_use]
    pub fn previous_frame_events(&self) -> Vec<DebugEvent> {
        self.events.lock().previous_frame()
    }

    /// Ends the current frame's event log, per the emulation core's vblank
    /// boundary.
    pub fn end_event_frame(&self) {
        self.events.lock().end_frame();
    }

    /// Registers (or replaces) the script read callback.
    pub fn set_read_callback(&self, cb: ReadCallback) {
        self.script.lock().set_read_callback(cb);
    }

    /// Registers (or replaces) the script write callback.
    pub fn set_write_callback(&self, cb: WriteCallback) {
        self.script.lock().set_write_callback(cb);
    }

    /// Registers (or replaces) the script exec callback.
    pub fn set_exec_callback(&self, cb: ExecCallback) {
        self.script.lock().set_exec_callback(cb);
    }

    /// Clears every registered script callback.
    pub fn clear_scripts(&self) {
        self.script.lock().clear();
    }

    /// Enables or disables per-instruction trace logging.
    pub fn set_trace_enabled(&self, enabled: bool) {
        self.trace.lock().set_enabled(enabled);
    }

    /// The configuration this instance was constructed with.
    #[must_use]
    pub fn config(&self) -> DebuggerConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multidbg_arch::{AccessKind, MemoryBus, MemoryRegion};

    struct FakeCpu;
    impl EmulatedCpu for FakeCpu {
        fn kind(&self) -> CpuKind {
            CpuKind::GbCpu
        }
        fn pc(&self) -> u32 {
            0x8000
        }
        fn sp(&self) -> u32 {
            0xFFFE
        }
        fn cycle(&self) -> u64 {
            0
        }
        fn register(&self, _id: u16) -> i64 {
            0
        }
    }
    struct FakeBus;
    impl MemoryBus for FakeBus {
        fn peek(&self, _addr: u32, _width: u8) -> Option<i64> {
            None
        }
        fn region_size(&self, _region: MemoryRegion) -> u32 {
            0x8000
        }
    }
    fn no_labels(_: &str) -> Option<(MemoryRegion, i32)> {
        None
    }
    fn ctx<'a>(cpu: &'a FakeCpu, bus: &'a FakeBus, op: &'a MemoryOperation) -> EvalContext<'a> {
        EvalContext {
            cpu,
            ppu: None,
            bus,
            op: Some(op),
            resolve_label: &no_labels,
        }
    }

    fn bp(id: u32, flags: crate::breakpoint::BreakpointFlags, start: i32, end: i32) -> Breakpoint {
        Breakpoint {
            id,
            cpu: CpuKind::GbCpu,
            region: MemoryRegion::PrgRom,
            flags,
            start,
            end,
            enabled: true,
            mark_only: false,
            ignore_dummy: false,
            condition: None,
        }
    }

    #[test]
    fn execute_breakpoint_sets_user_break_needed() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        dbg.set_breakpoints([bp(1, crate::breakpoint::BreakpointFlags::EXECUTE, 0x8000, 0x8000)]);

        let cpu = FakeCpu;
        let bus = FakeBus;
        let op = MemoryOperation {
            addr: 0x8000,
            value: 0,
            kind: AccessKind::ExecOpcode,
            region: MemoryRegion::PrgRom,
        };
        let c = ctx(&cpu, &bus, &op);
        dbg.check_breakpoint(AccessKind::ExecOpcode, &op, 1, &c);

        assert!(dbg.get_state().halted);
        assert_eq!(dbg.get_state().effective_source, BreakSource::Breakpoint);
    }

    #[test]
    fn conditional_read_breakpoint_fires_only_in_range_and_value() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        let mut b = bp(1, crate::breakpoint::BreakpointFlags::READ, 0x200, 0x2FF);
        b.region = MemoryRegion::WorkRam;
        b.condition = Some("value > $7F".to_string());
        dbg.set_breakpoints([b]);

        let cpu = FakeCpu;
        let bus = FakeBus;
        let addr = AddressInfo {
            region: MemoryRegion::WorkRam,
            offset: 0x250,
        };

        let hit = MemoryOperation {
            addr: 0x250,
            value: 0x80,
            kind: AccessKind::Read,
            region: MemoryRegion::WorkRam,
        };
        let c = ctx(&cpu, &bus, &hit);
        dbg.on_read(hit, addr, 1, &c);
        assert!(dbg.get_state().halted);

        let dbg2 = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        let mut b2 = bp(1, crate::breakpoint::BreakpointFlags::READ, 0x200, 0x2FF);
        b2.region = MemoryRegion::WorkRam;
        b2.condition = Some("value > $7F".to_string());
        dbg2.set_breakpoints([b2]);
        let miss = MemoryOperation {
            value: 0x40,
            ..hit
        };
        let c = ctx(&cpu, &bus, &miss);
        dbg2.on_read(miss, addr, 1, &c);
        assert!(!dbg2.get_state().halted);
    }

    #[test]
    fn frozen_write_is_blocked() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        dbg.set_frozen_range(MemoryRegion::WorkRam, 0x10, 0x10, true);

        let cpu = FakeCpu;
        let bus = FakeBus;
        let addr = AddressInfo {
            region: MemoryRegion::WorkRam,
            offset: 0x10,
        };
        let op = MemoryOperation {
            addr: 0xC010,
            value: 0x42,
            kind: AccessKind::Write,
            region: MemoryRegion::WorkRam,
        };
        let c = ctx(&cpu, &bus, &op);
        assert!(!dbg.on_write(op, addr, 1, &c));

        dbg.set_frozen_range(MemoryRegion::WorkRam, 0x10, 0x10, false);
        assert!(dbg.on_write(op, addr, 1, &c));
    }

    #[test]
    fn cdl_accumulates_across_instructions() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        dbg.track_region(MemoryRegion::PrgRom, 0x8000);

        struct OneByteDecoder;
        impl Disassembler for OneByteDecoder {
            fn decode(&self, _addr: AddressInfo, _flags: u8, _bus: &dyn MemoryBus) -> multidbg_arch::DisassemblyInfo {
                multidbg_arch::DisassemblyInfo {
                    initialized: true,
                    byte_code: [0xAA; multidbg_arch::MAX_INSTRUCTION_BYTES],
                    length: 1,
                    cpu_flags: 0,
                    cpu: CpuKind::GbCpu,
                }
            }
        }
        let bus = FakeBus;
        let decoder = OneByteDecoder;
        for i in 0..100u32 {
            let addr = AddressInfo {
                region: MemoryRegion::PrgRom,
                offset: i as i32,
            };
            dbg.after_exec(addr, i, 0xFFFE, 0, 1, CdlFlags::empty(), &bus, &decoder);
        }
        let flags = dbg.get_cdl(MemoryRegion::PrgRom, 0, 100);
        assert!(flags.iter().all(|f| f.contains(CdlFlags::CODE)));
    }

    #[test]
    fn cdl_marks_data_on_non_rom_region_from_read_and_write() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        dbg.track_region(MemoryRegion::WorkRam, 0x2000);

        let cpu = FakeCpu;
        let bus = FakeBus;
        let addr = AddressInfo {
            region: MemoryRegion::WorkRam,
            offset: 0x10,
        };
        let read_op = MemoryOperation {
            addr: 0xC010,
            value: 0,
            kind: AccessKind::Read,
            region: MemoryRegion::WorkRam,
        };
        let c = ctx(&cpu, &bus, &read_op);
        dbg.on_read(read_op, addr, 1, &c);

        let write_addr = AddressInfo {
            region: MemoryRegion::WorkRam,
            offset: 0x20,
        };
        let write_op = MemoryOperation {
            addr: 0xC020,
            value: 0x42,
            kind: AccessKind::Write,
            region: MemoryRegion::WorkRam,
        };
        let c = ctx(&cpu, &bus, &write_op);
        dbg.on_write(write_op, write_addr, 1, &c);

        let flags = dbg.get_cdl(MemoryRegion::WorkRam, 0, 0x21);
        assert!(flags[0x10].contains(CdlFlags::DATA));
        assert!(flags[0x20].contains(CdlFlags::DATA));
    }

    #[test]
    fn forbid_breakpoint_suppresses_exception() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        dbg.set_breakpoints([bp(
            1,
            crate::breakpoint::BreakpointFlags::EXECUTE | crate::breakpoint::BreakpointFlags::FORBID,
            0xFFFE,
            0xFFFE,
        )]);

        let cpu = FakeCpu;
        let bus = FakeBus;
        let op = MemoryOperation {
            addr: 0xFFFE,
            value: 0,
            kind: AccessKind::ExecOpcode,
            region: MemoryRegion::PrgRom,
        };
        let c = ctx(&cpu, &bus, &op);
        let suppressed = dbg.check_forbid_then_raise(AccessKind::ExecOpcode, &op, 1, &c, BreakSource::BreakOnBrk);
        assert!(suppressed);
        assert!(!dbg.get_state().halted);
    }

    #[test]
    fn profiler_deep_recursion_reports_flat_summation() {
        let dbg = Debugger::new(CpuKind::GbCpu, DebuggerConfig::default());
        let addr = AddressInfo {
            region: MemoryRegion::PrgRom,
            offset: 0x400,
        };
        let frame = |cpu_addr: u32| StackFrame {
            src: addr,
            src_cpu_addr: cpu_addr,
            dest: addr,
            dest_cpu_addr: cpu_addr,
            ret: addr,
            ret_cpu_addr: cpu_addr,
            ret_sp: 0,
            flags: StackFrameFlags::empty(),
        };
        const DEPTH: u64 = 50;
        for i in 0..DEPTH {
            dbg.on_call(frame(0x400), i * 7);
        }
        for _ in 0..DEPTH {
            dbg.on_return(DEPTH * 7);
        }
        let data = dbg.get_profiler_data();
        assert_eq!(data.len(), 1);
        let (_, func) = data[0];
        assert_eq!(func.call_count, DEPTH);
        assert_eq!(func.inclusive_cycles, func.exclusive_cycles);
    }
}
