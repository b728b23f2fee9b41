//! The RPN stack-machine evaluator.

use multidbg_arch::{EmulatedCpu, MemoryBus, MemoryOperation, MemoryRegion, PpuState};

use super::token::{BinOp, CtxToken, PpuToken as CondPpuToken, RpnToken, UnaryOp};
use super::ExpressionData;

/// How an [`EvalResult`] should be interpreted by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalKind {
    /// `value` holds a plain numeric result (of a non-comparison expression).
    Numeric,
    /// `value` is `0` or `1`, the result of a comparison/logical expression.
    Boolean,
    /// The expression could not be evaluated in this context (unresolved
    /// label, stack underflow/overflow) — never matches a breakpoint.
    Invalid,
    /// A `/` or `%` by zero occurred; the expression never matches.
    DivideByZero,
    /// A referenced label has no known address yet; the expression never
    /// matches but is re-tried on the next evaluation (the label may be
    /// defined later).
    OutOfScope,
}

/// The outcome of evaluating a compiled expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalResult {
    /// The computed value; meaningless unless `kind` is `Numeric` or
    /// `Boolean`.
    pub value: i64,
    /// How to interpret `value`.
    pub kind: EvalKind,
}

impl EvalResult {
    const INVALID: Self = Self {
        value: 0,
        kind: EvalKind::Invalid,
    };
    const DIVIDE_BY_ZERO: Self = Self {
        value: 0,
        kind: EvalKind::DivideByZero,
    };
    const OUT_OF_SCOPE: Self = Self {
        value: 0,
        kind: EvalKind::OutOfScope,
    };

    /// Whether this result should be treated as "condition satisfied" by a
    /// breakpoint or watch.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self.kind, EvalKind::Numeric | EvalKind::Boolean) && self.value != 0
    }
}

/// Everything the evaluator needs to resolve context-dependent tokens.
///
/// Borrowed for the duration of one `evaluate` call; none of it is retained.
pub struct EvalContext<'a> {
    pub cpu: &'a dyn EmulatedCpu,
    pub ppu: Option<&'a dyn PpuState>,
    pub bus: &'a dyn MemoryBus,
    pub op: Option<&'a MemoryOperation>,
    /// Resolves a label name to a mapped address, if any.
    pub resolve_label: &'a dyn Fn(&str) -> Option<(MemoryRegion, i32)>,
}

/// Evaluates a compiled expression's RPN body against the given context.
#[must_use]
pub fn evaluate(expr: &ExpressionData, ctx: &EvalContext<'_>) -> EvalResult {
    let mut stack: Vec<i64> = Vec::with_capacity(expr.ops.len());

    macro_rules! pop2 {
        () => {
            match (stack.pop(), stack.pop()) {
                (Some(rhs), Some(lhs)) => (lhs, rhs),
                _ => return EvalResult::INVALID,
            }
        };
    }
    macro_rules! pop1 {
        () => {
            match stack.pop() {
                Some(v) => v,
                None => return EvalResult::INVALID,
            }
        };
    }

    for token in &expr.ops {
        match *token {
            RpnToken::Const(n) => stack.push(n),
            RpnToken::Reg(id) => stack.push(ctx.cpu.register(id)),
            RpnToken::Ppu(tok) => {
                let Some(ppu) = ctx.ppu else {
                    return EvalResult::INVALID;
                };
                stack.push(match tok {
                    CondPpuToken::Scanline => i64::from(ppu.scanline()),
                    CondPpuToken::Cycle => i64::from(ppu.cycle()),
                    CondPpuToken::Frame => i64::try_from(ppu.frame()).unwrap_or(i64::MAX),
                    CondPpuToken::Vram => i64::from(ppu.vram_addr()),
                });
            }
            RpnToken::Ctx(tok) => {
                let Some(op) = ctx.op else {
                    return EvalResult::INVALID;
                };
                stack.push(match tok {
                    CtxToken::IsWrite => i64::from(op.kind.is_write()),
                    CtxToken::IsRead => i64::from(op.kind.is_read()),
                    CtxToken::IsDma => i64::from(op.kind.is_dma()),
                    CtxToken::IsDummy => i64::from(op.kind.is_dummy()),
                    CtxToken::Value => i64::from(op.value),
                    CtxToken::Address => i64::from(op.addr),
                });
            }
            RpnToken::Label(idx) => {
                let Some(name) = expr.labels.get(idx) else {
                    return EvalResult::INVALID;
                };
                match (ctx.resolve_label)(name) {
                    Some((_, offset)) if offset >= 0 => stack.push(i64::from(offset)),
                    _ => return EvalResult::OUT_OF_SCOPE,
                }
            }
            RpnToken::Deref(width) => {
                let addr = pop1!();
                let Ok(addr) = u32::try_from(addr) else {
                    return EvalResult::INVALID;
                };
                match ctx.bus.peek(addr, width) {
                    Some(v) => stack.push(v),
                    None => return EvalResult::INVALID,
                }
            }
            RpnToken::Unary(op) => {
                let v = pop1!();
                stack.push(match op {
                    UnaryOp::Pos => v,
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => i64::from(v == 0),
                    UnaryOp::BitNot => !v,
                });
            }
            RpnToken::Binary(op) => {
                let (lhs, rhs) = pop2!();
                let value = match op {
                    BinOp::Add => lhs.wrapping_add(rhs),
                    BinOp::Sub => lhs.wrapping_sub(rhs),
                    BinOp::Mul => lhs.wrapping_mul(rhs),
                    BinOp::Div => {
                        if rhs == 0 {
                            return EvalResult::DIVIDE_BY_ZERO;
                        }
                        lhs.wrapping_div(rhs)
                    }
                    BinOp::Rem => {
                        if rhs == 0 {
                            return EvalResult::DIVIDE_BY_ZERO;
                        }
                        lhs.wrapping_rem(rhs)
                    }
                    BinOp::Pow => {
                        u32::try_from(rhs).map_or(0, |exp| lhs.wrapping_pow(exp.min(63)))
                    }
                    BinOp::BitAnd => lhs & rhs,
                    BinOp::BitOr => lhs | rhs,
                    BinOp::BitXor => lhs ^ rhs,
                    BinOp::Shl => lhs.wrapping_shl(rhs.rem_euclid(64) as u32),
                    BinOp::Shr => lhs.wrapping_shr(rhs.rem_euclid(64) as u32),
                    BinOp::Eq => i64::from(lhs == rhs),
                    BinOp::Ne => i64::from(lhs != rhs),
                    BinOp::Lt => i64::from(lhs < rhs),
                    BinOp::Le => i64::from(lhs <= rhs),
                    BinOp::Gt => i64::from(lhs > rhs),
                    BinOp::Ge => i64::from(lhs >= rhs),
                    BinOp::And => i64::from(lhs != 0 && rhs != 0),
                    BinOp::Or => i64::from(lhs != 0 || rhs != 0),
                };
                stack.push(value);
            }
        }
    }

    match stack.pop() {
        Some(value) if stack.is_empty() => EvalResult {
            value,
            kind: if is_boolean_result(expr) {
                EvalKind::Boolean
            } else {
                EvalKind::Numeric
            },
        },
        _ => EvalResult::INVALID,
    }
}

/// Whether the expression's final operator produces a boolean result, purely
/// for `EvalKind` labeling — both kinds are truthy by the same `!= 0` rule,
/// so this only affects how a caller might display the value.
fn is_boolean_result(expr: &ExpressionData) -> bool {
    matches!(
        expr.ops.last(),
        Some(RpnToken::Binary(
            BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
                | BinOp::And
                | BinOp::Or
        )) | Some(RpnToken::Unary(UnaryOp::Not))
    )
}
