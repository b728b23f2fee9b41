//! Routes memory operations to user-script callbacks (§4.9).
//!
//! The bridge never evaluates anything itself — the script host owns its own
//! evaluation model entirely outside this crate's scope. This module's only
//! job is dispatch: group the nine [`AccessKind`] variants into the three
//! callback buckets a script can register against, and skip the call
//! entirely when nothing is registered.

use multidbg_arch::{AccessKind, MemoryOperation};

/// A read callback: `(op) -> Option<override value>`. Returning `Some`
/// overrides the value the CPU core observes; `None` leaves it untouched.
pub type ReadCallback = Box<dyn FnMut(&MemoryOperation) -> Option<i64> + Send>;
/// A write callback, observing (never overriding) a write.
pub type WriteCallback = Box<dyn FnMut(&MemoryOperation) + Send>;
/// An exec callback, observing an opcode or operand fetch.
pub type ExecCallback = Box<dyn FnMut(&MemoryOperation) + Send>;

/// Dispatches memory operations to whichever script callbacks are
/// registered.
///
/// [`Self::has_script`] is the fast-path single-field check the façade
/// consults before doing any dispatch work at all (§4.9).
#[derive(Default)]
pub struct ScriptBridge {
    read: Option<ReadCallback>,
    write: Option<WriteCallback>,
    exec: Option<ExecCallback>,
    /// Set by the CPU core for opcode fetches only; gates exec dispatch so
    /// operand-fetch bookkeeping reads don't also trigger it redundantly
    /// unless the core explicitly asks for it.
    process_exec: bool,
}

impl ScriptBridge {
    /// Creates a bridge with no callbacks registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any callback is registered at all — the single-byte fast
    /// path every access checks before anything else.
    #[must_use]
    pub fn has_script(&self) -> bool {
        self.read.is_some() || self.write.is_some() || self.exec.is_some()
    }

    /// Registers (or replaces) the read callback.
    pub fn set_read_callback(&mut self, cb: ReadCallback) {
        self.read = Some(cb);
    }

    /// Registers (or replaces) the write callback.
    pub fn set_write_callback(&mut self, cb: WriteCallback) {
        self.write = Some(cb);
    }

    /// Registers (or replaces) the exec callback.
    pub fn set_exec_callback(&mut self, cb: ExecCallback) {
        self.exec = Some(cb);
    }

    /// Clears every registered callback (ROM unload).
    pub fn clear(&mut self) {
        self.read = None;
        self.write = None;
        self.exec = None;
    }

    /// Sets whether exec dispatch is active for the current fetch. The CPU
    /// core sets this for opcode fetches and leaves it unset for operand
    /// fetches reported through the same `ExecOpcode`/`ExecOperand` path.
    pub fn set_process_exec(&mut self, process: bool) {
        self.process_exec = process;
    }

    /// Routes one memory operation to the appropriate callback bucket, per
    /// §4.9's grouping: `Read | DmaRead | PpuRenderingRead | DummyRead` to
    /// the read callback, `Write | DmaWrite | DummyWrite` to the write
    /// callback, `ExecOpcode | ExecOperand` to the exec callback (only when
    /// [`Self::set_process_exec`] most recently set `true`).
    ///
    /// Returns a read override value if the read callback supplied one.
    pub fn dispatch(&mut self, op: &MemoryOperation) -> Option<i64> {
        if !self.has_script() {
            return None;
        }
        match op.kind {
            AccessKind::Read | AccessKind::DmaRead | AccessKind::PpuRenderingRead | AccessKind::DummyRead => {
                self.read.as_mut().and_then(|cb| cb(op))
            }
            AccessKind::Write | AccessKind::DmaWrite | AccessKind::DummyWrite => {
                if let Some(cb) = self.write.as_mut() {
                    cb(op);
                }
                None
            }
            AccessKind::ExecOpcode | AccessKind::ExecOperand => {
                if self.process_exec {
                    if let Some(cb) = self.exec.as_mut() {
                        cb(op);
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multidbg_arch::MemoryRegion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn op(kind: AccessKind) -> MemoryOperation {
        MemoryOperation {
            addr: 0x100,
            value: 0x42,
            kind,
            region: MemoryRegion::WorkRam,
        }
    }

    #[test]
    fn has_script_false_until_a_callback_is_registered() {
        let mut bridge = ScriptBridge::new();
        assert!(!bridge.has_script());
        bridge.set_read_callback(Box::new(|_| None));
        assert!(bridge.has_script());
    }

    #[test]
    fn read_callback_can_override_value() {
        let mut bridge = ScriptBridge::new();
        bridge.set_read_callback(Box::new(|_| Some(0x99)));
        assert_eq!(bridge.dispatch(&op(AccessKind::Read)), Some(0x99));
        assert_eq!(bridge.dispatch(&op(AccessKind::DmaRead)), Some(0x99));
        assert_eq!(bridge.dispatch(&op(AccessKind::PpuRenderingRead)), Some(0x99));
    }

    #[test]
    fn write_callback_observes_but_never_overrides() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let mut bridge = ScriptBridge::new();
        bridge.set_write_callback(Box::new(move |_| {
            counted.fetch_add(1, Ordering::Relaxed);
        }));
        assert_eq!(bridge.dispatch(&op(AccessKind::Write)), None);
        assert_eq!(bridge.dispatch(&op(AccessKind::DummyWrite)), None);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn exec_callback_gated_by_process_exec_flag() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let mut bridge = ScriptBridge::new();
        bridge.set_exec_callback(Box::new(move |_| {
            counted.fetch_add(1, Ordering::Relaxed);
        }));
        bridge.dispatch(&op(AccessKind::ExecOpcode));
        assert_eq!(count.load(Ordering::Relaxed), 0);
        bridge.set_process_exec(true);
        bridge.dispatch(&op(AccessKind::ExecOpcode));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dispatch_is_a_no_op_with_no_callbacks() {
        let mut bridge = ScriptBridge::new();
        assert_eq!(bridge.dispatch(&op(AccessKind::Read)), None);
    }
}
