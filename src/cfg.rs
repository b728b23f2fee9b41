//! Debugger lifecycle configuration.
//!
//! Not a module `spec.md` names, but every real emulator-debugger repo in
//! the pack carries one (`rugby-cfg`, `rugby/apps/cli/src/cfg.rs`): a plain
//! config struct with a sane [`Default`], serializable behind the crate's
//! `serde` feature exactly like `rugby-cfg` does.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::callstack::DEFAULT_CAPACITY as DEFAULT_CALLSTACK_CAPACITY;
use crate::step::DEFAULT_STEP_BACK_CLOCK_LIMIT;

/// Tunables governing a [`crate::facade::Debugger`] instance's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DebuggerConfig {
    /// Capacity of the call-stack ring buffer.
    pub callstack_capacity: usize,
    /// Clock limit (cycles) observed while replaying forward after a
    /// step-back rewind, to avoid catastrophic boundaries such as NES
    /// sprite DMA's ~512-cycle window.
    pub step_back_clock_limit: u64,
    /// Default on-disk path for the CDL coverage file, relative to the
    /// per-ROM debug workspace directory (§6).
    pub cdl_file_name: &'static str,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            callstack_capacity: DEFAULT_CALLSTACK_CAPACITY,
            step_back_clock_limit: DEFAULT_STEP_BACK_CLOCK_LIMIT,
            cdl_file_name: "coverage.cdl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_subsystem_defaults() {
        let cfg = DebuggerConfig::default();
        assert_eq!(cfg.callstack_capacity, 512);
        assert_eq!(cfg.step_back_clock_limit, 600);
    }
}
