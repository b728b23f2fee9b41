//! The decoded-instruction data model and the capability that produces it.

use crate::cpu::CpuKind;
use crate::mem::{AddressInfo, MemoryBus};

/// Maximum instruction encoding length this crate caches space for.
///
/// Bounded by the widest family in [`CpuKind::max_instruction_length`] (the
/// WonderSwan's V30MZ, at 8 bytes for its longest prefixed form).
pub const MAX_INSTRUCTION_BYTES: usize = 8;

/// A single decoded instruction, as cached by the debugger core's
/// disassembly cache.
///
/// Invariant: `initialized ⇒ length > 0`. An uninitialized slot (the zero
/// value) has `length == 0`, so the invariant holds vacuously until the slot
/// is first populated.
#[derive(Clone, Copy, Debug)]
pub struct DisassemblyInfo {
    /// Whether this slot holds a decoded instruction.
    pub initialized: bool,
    /// Raw encoding, left-aligned; only the first `length` bytes are valid.
    pub byte_code: [u8; MAX_INSTRUCTION_BYTES],
    /// Length of the encoding in bytes.
    pub length: u8,
    /// Mode-sensitive decode flags (e.g. 65816 M/X width bits) in effect
    /// when this instruction was decoded; re-decoded if the mode later
    /// differs, since the same bytes can decode differently.
    pub cpu_flags: u8,
    /// The family this instruction was decoded for.
    pub cpu: CpuKind,
}

impl DisassemblyInfo {
    /// The zero value: an uninitialized slot.
    pub const EMPTY: Self = Self {
        initialized: false,
        byte_code: [0; MAX_INSTRUCTION_BYTES],
        length: 0,
        cpu_flags: 0,
        cpu: CpuKind::GbCpu,
    };

    /// The valid encoding bytes, i.e. `byte_code[..length]`.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.byte_code[..usize::from(self.length)]
    }
}

impl Default for DisassemblyInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Non-owning capability that decodes one instruction starting at a given
/// address.
///
/// Implementations live entirely with the emulation core (decoding is
/// console-specific and explicitly out of scope for the debugger core); the
/// cache in `multidbg::disasm` only ever borrows `&dyn Disassembler`.
pub trait Disassembler {
    /// Decodes the instruction starting at `addr`, given the current CPU
    /// mode flags and a bus to read operand bytes from.
    fn decode(&self, addr: AddressInfo, cpu_flags: u8, bus: &dyn MemoryBus) -> DisassemblyInfo;
}
