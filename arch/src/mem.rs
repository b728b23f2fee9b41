//! The addressable-memory data model shared by every debugger artifact.

use displaydoc::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A named, size-bounded span of addressable storage.
///
/// Every debugger artifact (CDL, labels, disassembly cache) is keyed on a
/// `(region, offset)` pair. Region sizes are fixed after ROM load; a
/// region-size change (a ROM hot-swap) forces the debugger to tear down and
/// rebuild every region-sized cache (see [`crate`] crate docs and §7 of the
/// spec).
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemoryRegion {
    /// Cartridge program ROM.
    PrgRom,
    /// Cartridge character/graphics ROM.
    ChrRom,
    /// Main work RAM.
    WorkRam,
    /// Battery-backed cartridge save RAM.
    SaveRam,
    /// Video RAM (tile/tilemap data).
    Vram,
    /// Object attribute memory (sprite table).
    Oam,
    /// Palette RAM.
    PaletteRam,
    /// Memory-mapped hardware registers.
    Registers,
    /// High-speed scratch RAM (e.g. Game Boy HRAM, SNES direct page).
    HighRam,
    /// Boot/system ROM.
    BootRom,
}

impl MemoryRegion {
    /// Whether writes to this region are meaningful (as opposed to a ROM,
    /// where a "write" is either ignored or a mapper-control side effect).
    #[must_use]
    pub const fn is_rom(self) -> bool {
        matches!(self, Self::PrgRom | Self::ChrRom | Self::BootRom)
    }

    /// Whether this region is owned by the graphics subsystem.
    #[must_use]
    pub const fn is_ppu_memory(self) -> bool {
        matches!(self, Self::Vram | Self::Oam | Self::PaletteRam)
    }

    /// Whether this region's contents can change outside of CPU writes
    /// (DMA, PPU rendering side effects, hardware latches).
    #[must_use]
    pub const fn is_volatile(self) -> bool {
        matches!(
            self,
            Self::Registers | Self::Vram | Self::Oam | Self::PaletteRam
        )
    }
}

/// A resolved `(region, offset)` address.
///
/// `offset == -1` means "not mapped"; otherwise the invariant `0 <= offset <
/// region.size` holds (enforced by whichever capability constructs this
/// value, not by this type).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AddressInfo {
    /// The region this address resolves into.
    pub region: MemoryRegion,
    /// Byte offset within the region, or `-1` if unmapped.
    pub offset: i32,
}

impl AddressInfo {
    /// An address that does not resolve into any region.
    pub const UNMAPPED: Self = Self {
        region: MemoryRegion::Registers,
        offset: -1,
    };

    /// Whether this address resolves into its region.
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        self.offset >= 0
    }
}

/// The kind of bus transaction a [`MemoryOperation`] represents.
///
/// Classification matters: forbid-breakpoints and the CDL recorder treat
/// dummy/DMA/rendering accesses differently from ordinary reads and writes.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AccessKind {
    /// Ordinary CPU read.
    Read,
    /// Ordinary CPU write.
    Write,
    /// Opcode fetch.
    ExecOpcode,
    /// Operand fetch (part of the same instruction as a prior opcode fetch).
    ExecOperand,
    /// A read performed for bus-timing reasons whose result is discarded.
    DummyRead,
    /// A write performed for bus-timing reasons with no architectural
    /// effect.
    DummyWrite,
    /// A read performed on behalf of a DMA controller.
    DmaRead,
    /// A write performed on behalf of a DMA controller.
    DmaWrite,
    /// A read performed by the PPU while actively rendering.
    PpuRenderingRead,
}

impl AccessKind {
    /// Whether this access kind represents an instruction fetch.
    #[must_use]
    pub const fn is_exec(self) -> bool {
        matches!(self, Self::ExecOpcode | Self::ExecOperand)
    }

    /// Whether this access kind is a read of any variety (ordinary, dummy,
    /// DMA, or PPU rendering).
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::Read | Self::DummyRead | Self::DmaRead | Self::PpuRenderingRead
        )
    }

    /// Whether this access kind is a write of any variety.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::DummyWrite | Self::DmaWrite)
    }

    /// Whether this access kind is a dummy (discarded-effect) access.
    #[must_use]
    pub const fn is_dummy(self) -> bool {
        matches!(self, Self::DummyRead | Self::DummyWrite)
    }

    /// Whether this access kind is performed by a DMA controller.
    #[must_use]
    pub const fn is_dma(self) -> bool {
        matches!(self, Self::DmaRead | Self::DmaWrite)
    }
}

/// A single bus transaction, as observed by the debugger core.
#[derive(Clone, Copy, Debug)]
pub struct MemoryOperation {
    /// CPU-visible address.
    pub addr: u32,
    /// Value read or written.
    pub value: i32,
    /// What kind of transaction this was.
    pub kind: AccessKind,
    /// The region this address resolved into.
    pub region: MemoryRegion,
}

/// Non-owning view onto the memory bus, used by the expression evaluator's
/// dereference operators and by components that need to peek at memory
/// outside of the access currently being processed.
pub trait MemoryBus {
    /// Reads `width` bytes (1, 2, or 4) little-endian starting at `addr`
    /// using the given CPU's default memory region, returning `None` if the
    /// read falls outside any mapped region.
    fn peek(&self, addr: u32, width: u8) -> Option<i64>;

    /// Size in bytes of the given region, or `0` if the console has no such
    /// region (e.g. querying `SaveRam` on a cartridge with none).
    fn region_size(&self, region: MemoryRegion) -> u32;
}
