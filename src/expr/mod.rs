//! Breakpoint condition expressions: lex, compile to RPN, cache, evaluate.
//!
//! A condition string is compiled once (on `set_breakpoint`/`set_watch`) and
//! evaluated many times (on every matching memory access), so the hot path
//! is the stack-machine evaluator in [`eval`]; [`cache`] makes repeat
//! compilation of the same string, valid or not, effectively free.

mod cache;
mod compile;
mod eval;
mod lex;
mod token;

pub use self::cache::ExpressionCache;
pub use self::compile::compile;
pub use self::eval::{evaluate, EvalContext, EvalKind, EvalResult};
pub use self::token::{BinOp, CtxToken, PpuToken, RpnToken, UnaryOp};

use thiserror::Error;

/// A compiled breakpoint condition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpressionData {
    /// The expression body, in Reverse Polish Notation.
    pub ops: Vec<RpnToken>,
    /// Label names referenced by [`RpnToken::Label`] indices, in first-seen
    /// order. Resolved against the label store at evaluation time, not at
    /// compile time, so a condition can reference a label defined later.
    pub labels: Vec<String>,
}

/// A condition string failed to compile.
///
/// This covers only true syntax failures. An expression that compiles but
/// references an out-of-scope label, divides by zero, or otherwise fails at
/// evaluation time does not produce an `Error` — it produces an
/// [`EvalResult`] of the appropriate kind, so a single malformed condition
/// never interrupts emulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The expression is empty.
    #[error("expression is empty")]
    Empty,
    /// Byte offset `{0}` is not the start of any valid token.
    #[error("invalid token at offset {0}")]
    InvalidToken(usize),
    /// Parentheses, brackets, or braces do not balance.
    #[error("mismatched parentheses or brackets")]
    MismatchedParens,
}
