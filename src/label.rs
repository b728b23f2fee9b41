//! Bidirectional name ↔ `(region, offset)` mapping, with attached comments.
//!
//! Supplies the disassembler with symbolic names for pretty-printing and the
//! expression evaluator with symbolic addresses (§4.2). Per the recorded
//! Open Question decision, a name is unique globally: inserting a name that
//! is already in use overwrites its previous address rather than permitting
//! two addresses to share a name.

use indexmap::IndexMap;
use multidbg_arch::MemoryRegion;

/// One labeled address, with an optional comment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Label {
    /// The address this name refers to.
    pub region: MemoryRegion,
    /// Byte offset within `region`.
    pub offset: i32,
    /// Free-form annotation, shown alongside the label in the disassembler.
    pub comment: Option<String>,
}

/// Bidirectional label store.
///
/// The forward map (name → address) is the source of truth; the reverse
/// index is rebuilt from it on every mutation, which is cheap at the label
/// counts a debugging session accumulates (hundreds, not millions) and keeps
/// the invariant "a name maps to at most one address" trivially true by
/// construction rather than by upkeep.
#[derive(Clone, Debug, Default)]
pub struct LabelStore {
    by_name: IndexMap<String, Label>,
}

impl LabelStore {
    /// Creates an empty label store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the label named `name`. If `name` already names a
    /// different address, the old mapping is silently overwritten (spec
    /// default: names are unique globally).
    pub fn insert(&mut self, name: impl Into<String>, region: MemoryRegion, offset: i32) {
        self.by_name.insert(
            name.into(),
            Label {
                region,
                offset,
                comment: None,
            },
        );
    }

    /// Attaches or replaces the comment on an existing label. No-op if
    /// `name` is not a known label.
    pub fn set_comment(&mut self, name: &str, comment: impl Into<String>) {
        if let Some(label) = self.by_name.get_mut(name) {
            label.comment = Some(comment.into());
        }
    }

    /// Removes the label named `name`, if any.
    pub fn remove(&mut self, name: &str) -> Option<Label> {
        self.by_name.shift_remove(name)
    }

    /// Resolves a label by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Label> {
        self.by_name.get(name)
    }

    /// Resolves the first label found at `(region, offset)`, for
    /// disassembler annotation. Linear in the number of labels; the
    /// disassembly cache, not this store, is the hot path, so this is
    /// acceptable.
    #[must_use]
    pub fn by_address(&self, region: MemoryRegion, offset: i32) -> Option<(&str, &Label)> {
        self.by_name
            .iter()
            .find(|(_, l)| l.region == region && l.offset == offset)
            .map(|(name, label)| (name.as_str(), label))
    }

    /// Number of labels currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the store holds no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Iterates all labels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Label)> {
        self.by_name.iter().map(|(name, label)| (name.as_str(), label))
    }

    /// Clears every label. Atomic by construction: a single `IndexMap::clear`
    /// call, so no reader can ever observe a partially-cleared store.
    pub fn clear(&mut self) {
        self.by_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_by_name() {
        let mut store = LabelStore::new();
        store.insert("entry", MemoryRegion::PrgRom, 0);
        store.insert("entry", MemoryRegion::PrgRom, 0x10);
        assert_eq!(store.len(), 1);
        assert_eq!(store.by_name("entry").unwrap().offset, 0x10);
    }

    #[test]
    fn by_address_finds_matching_label() {
        let mut store = LabelStore::new();
        store.insert("entry", MemoryRegion::PrgRom, 0x10);
        let (name, _) = store.by_address(MemoryRegion::PrgRom, 0x10).unwrap();
        assert_eq!(name, "entry");
        assert!(store.by_address(MemoryRegion::PrgRom, 0x11).is_none());
    }

    #[test]
    fn comment_attaches_to_existing_label() {
        let mut store = LabelStore::new();
        store.insert("entry", MemoryRegion::PrgRom, 0);
        store.set_comment("entry", "reset vector target");
        assert_eq!(
            store.by_name("entry").unwrap().comment.as_deref(),
            Some("reset vector target")
        );
        // Setting a comment on an unknown label is a no-op, not an error.
        store.set_comment("missing", "ignored");
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = LabelStore::new();
        store.insert("a", MemoryRegion::WorkRam, 0);
        store.insert("b", MemoryRegion::WorkRam, 1);
        store.clear();
        assert!(store.is_empty());
    }
}
