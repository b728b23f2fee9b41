//! Compile-once cache for breakpoint condition strings.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use multidbg_arch::CpuKind;

use super::compile::compile;
use super::{Error, ExpressionData};

/// A cached mapping from condition string to compiled expression (or the
/// syntax error it produced).
///
/// A malformed condition compiles to an `Err` exactly once; every later
/// lookup of the same string is a plain map read, so a user mistyping a
/// condition never re-pays the lexer/shunting-yard cost on every access.
pub struct ExpressionCache {
    cpu: CpuKind,
    entries: RwLock<FxHashMap<String, Result<Arc<ExpressionData>, Error>>>,
}

impl ExpressionCache {
    /// Creates an empty cache for the given CPU family's token vocabulary.
    #[must_use]
    pub fn new(cpu: CpuKind) -> Self {
        Self {
            cpu,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Compiles `source`, or returns the cached result of a previous
    /// compilation of the identical string.
    ///
    /// # Errors
    ///
    /// Returns the [`Error`] produced by [`compile`] the first time `source`
    /// is seen; the same error is replayed on every later call.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<ExpressionData>, Error> {
        if let Some(cached) = self.entries.read().get(source) {
            return cached.clone();
        }
        let compiled = compile(source, self.cpu).map(Arc::new);
        self.entries
            .write()
            .entry(source.to_string())
            .or_insert(compiled)
            .clone()
    }

    /// Drops every cached entry. Called when a ROM is reloaded and the
    /// label/register vocabulary it was compiled against may no longer
    /// apply.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of distinct condition strings currently cached, valid or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
