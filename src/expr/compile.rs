//! Shunting-yard compilation of a condition string into an [`ExpressionData`].

use multidbg_arch::CpuKind;

use super::lex::{lex, Lexeme};
use super::token::{BinOp, CtxToken, PpuToken, RpnToken, UnaryOp};
use super::{Error, ExpressionData};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Group {
    Paren,
    Bracket,
    Brace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StackEntry {
    Group(Group),
    Unary(UnaryOp),
    Binary(BinOp),
    At,
}

/// Precedence of an operator; higher binds tighter. Grouping tokens never
/// sit on the precedence ladder — they are popped explicitly by their
/// matching closer.
fn precedence(entry: StackEntry) -> u8 {
    match entry {
        StackEntry::Group(_) => 0,
        StackEntry::Binary(BinOp::Or) => 1,
        StackEntry::Binary(BinOp::And) => 2,
        StackEntry::Binary(
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge,
        ) => 3,
        StackEntry::Binary(BinOp::Shl | BinOp::Shr) => 4,
        StackEntry::Binary(BinOp::BitOr | BinOp::BitXor) => 5,
        StackEntry::Binary(BinOp::BitAnd) => 6,
        StackEntry::Binary(BinOp::Add | BinOp::Sub) => 7,
        StackEntry::Binary(BinOp::Mul | BinOp::Div | BinOp::Rem) => 8,
        StackEntry::Binary(BinOp::Pow) => 9,
        StackEntry::Unary(_) | StackEntry::At => 10,
    }
}

/// Right-associative operators only pop while the stack holds a *strictly*
/// higher-precedence entry; left-associative operators also pop on equal
/// precedence.
fn right_assoc(entry: StackEntry) -> bool {
    matches!(
        entry,
        StackEntry::Binary(BinOp::Pow) | StackEntry::Unary(_) | StackEntry::At
    )
}

/// Compiles a condition string into Reverse Polish Notation for the given
/// CPU family's token vocabulary.
///
/// # Errors
///
/// Returns an [`Error`] for any malformed expression: invalid tokens,
/// mismatched parentheses/brackets, or an empty input.
pub fn compile(input: &str, cpu: CpuKind) -> Result<ExpressionData, Error> {
    let lexemes = lex(input)?;
    if lexemes.is_empty() {
        return Err(Error::Empty);
    }

    let mut output = Vec::new();
    let mut stack: Vec<StackEntry> = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut expect_operand = true;

    for lexeme in lexemes {
        match lexeme {
            Lexeme::Number(n) => {
                output.push(RpnToken::Const(n));
                expect_operand = false;
            }
            Lexeme::Ident(name) => {
                output.push(resolve_ident(&name, cpu, &mut labels));
                expect_operand = false;
            }
            Lexeme::LParen => {
                stack.push(StackEntry::Group(Group::Paren));
                expect_operand = true;
            }
            Lexeme::RParen => {
                pop_until_group(&mut stack, &mut output, Group::Paren)?;
                expect_operand = false;
            }
            Lexeme::LBracket => {
                stack.push(StackEntry::Group(Group::Bracket));
                expect_operand = true;
            }
            Lexeme::RBracket => {
                pop_until_group(&mut stack, &mut output, Group::Bracket)?;
                output.push(RpnToken::Deref(1));
                expect_operand = false;
            }
            Lexeme::LBrace => {
                stack.push(StackEntry::Group(Group::Brace));
                expect_operand = true;
            }
            Lexeme::RBrace => {
                pop_until_group(&mut stack, &mut output, Group::Brace)?;
                output.push(RpnToken::Deref(2));
                expect_operand = false;
            }
            Lexeme::At => {
                push_op(&mut stack, &mut output, StackEntry::At);
                expect_operand = true;
            }
            Lexeme::Bang if expect_operand => {
                push_op(&mut stack, &mut output, StackEntry::Unary(UnaryOp::Not));
                expect_operand = true;
            }
            Lexeme::Tilde => {
                push_op(&mut stack, &mut output, StackEntry::Unary(UnaryOp::BitNot));
                expect_operand = true;
            }
            Lexeme::Plus if expect_operand => {
                push_op(&mut stack, &mut output, StackEntry::Unary(UnaryOp::Pos));
                expect_operand = true;
            }
            Lexeme::Minus if expect_operand => {
                push_op(&mut stack, &mut output, StackEntry::Unary(UnaryOp::Neg));
                expect_operand = true;
            }
            _ => {
                let op = binary_op(&lexeme).ok_or(Error::InvalidToken(0))?;
                push_op(&mut stack, &mut output, StackEntry::Binary(op));
                expect_operand = true;
            }
        }
    }

    while let Some(entry) = stack.pop() {
        match entry {
            StackEntry::Group(_) => return Err(Error::MismatchedParens),
            other => emit(&mut output, other),
        }
    }
    if expect_operand {
        // The expression ended expecting an operand (e.g. trailing operator).
        return Err(Error::InvalidToken(input.len()));
    }

    Ok(ExpressionData {
        ops: output,
        labels,
    })
}

fn binary_op(lexeme: &Lexeme) -> Option<BinOp> {
    Some(match lexeme {
        Lexeme::Plus => BinOp::Add,
        Lexeme::Minus => BinOp::Sub,
        Lexeme::Star => BinOp::Mul,
        Lexeme::Slash => BinOp::Div,
        Lexeme::Percent => BinOp::Rem,
        Lexeme::StarStar => BinOp::Pow,
        Lexeme::Amp => BinOp::BitAnd,
        Lexeme::Pipe => BinOp::BitOr,
        Lexeme::Caret => BinOp::BitXor,
        Lexeme::Shl => BinOp::Shl,
        Lexeme::Shr => BinOp::Shr,
        Lexeme::Eq => BinOp::Eq,
        Lexeme::Ne => BinOp::Ne,
        Lexeme::Lt => BinOp::Lt,
        Lexeme::Le => BinOp::Le,
        Lexeme::Gt => BinOp::Gt,
        Lexeme::Ge => BinOp::Ge,
        Lexeme::AndAnd => BinOp::And,
        Lexeme::OrOr => BinOp::Or,
        _ => return None,
    })
}

fn push_op(stack: &mut Vec<StackEntry>, output: &mut Vec<RpnToken>, entry: StackEntry) {
    let prec = precedence(entry);
    while let Some(&top) = stack.last() {
        if matches!(top, StackEntry::Group(_)) {
            break;
        }
        let top_prec = precedence(top);
        let should_pop = if right_assoc(entry) {
            top_prec > prec
        } else {
            top_prec >= prec
        };
        if !should_pop {
            break;
        }
        stack.pop();
        emit(output, top);
    }
    stack.push(entry);
}

fn pop_until_group(
    stack: &mut Vec<StackEntry>,
    output: &mut Vec<RpnToken>,
    want: Group,
) -> Result<(), Error> {
    loop {
        match stack.pop() {
            Some(StackEntry::Group(g)) if g == want => return Ok(()),
            Some(StackEntry::Group(_)) => return Err(Error::MismatchedParens),
            Some(other) => emit(output, other),
            None => return Err(Error::MismatchedParens),
        }
    }
}

fn emit(output: &mut Vec<RpnToken>, entry: StackEntry) {
    match entry {
        StackEntry::Unary(op) => output.push(RpnToken::Unary(op)),
        StackEntry::Binary(op) => output.push(RpnToken::Binary(op)),
        StackEntry::At => output.push(RpnToken::Deref(4)),
        StackEntry::Group(_) => unreachable!("groups are discarded, never emitted"),
    }
}

fn resolve_ident(name: &str, cpu: CpuKind, labels: &mut Vec<String>) -> RpnToken {
    let lower = name.to_ascii_lowercase();
    if let Some(ctx) = context_token(&lower) {
        return RpnToken::Ctx(ctx);
    }
    if let Some(reg) = cpu.register_tokens().iter().find(|t| t.name == lower) {
        return RpnToken::Reg(reg.id);
    }
    if let Some(ppu) = cpu.ppu_tokens().iter().find(|t| t.name == lower) {
        return RpnToken::Ppu(ppu_token(ppu.name));
    }
    let idx = labels.iter().position(|l| l == name).unwrap_or_else(|| {
        labels.push(name.to_string());
        labels.len() - 1
    });
    RpnToken::Label(idx)
}

fn context_token(name: &str) -> Option<CtxToken> {
    Some(match name {
        "iswrite" => CtxToken::IsWrite,
        "isread" => CtxToken::IsRead,
        "isdma" => CtxToken::IsDma,
        "isdummy" => CtxToken::IsDummy,
        "value" => CtxToken::Value,
        "address" => CtxToken::Address,
        _ => return None,
    })
}

fn ppu_token(name: &str) -> PpuToken {
    match name {
        "scanline" => PpuToken::Scanline,
        "cycle" => PpuToken::Cycle,
        "frame" => PpuToken::Frame,
        _ => PpuToken::Vram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpn(input: &str) -> Vec<RpnToken> {
        compile(input, CpuKind::GbCpu).unwrap().ops
    }

    #[test]
    fn precedence_mul_before_add() {
        assert_eq!(
            rpn("1+2*3"),
            vec![
                RpnToken::Const(1),
                RpnToken::Const(2),
                RpnToken::Const(3),
                RpnToken::Binary(BinOp::Mul),
                RpnToken::Binary(BinOp::Add),
            ]
        );
    }

    #[test]
    fn parens_override_precedence() {
        assert_eq!(
            rpn("(1+2)*3"),
            vec![
                RpnToken::Const(1),
                RpnToken::Const(2),
                RpnToken::Binary(BinOp::Add),
                RpnToken::Const(3),
                RpnToken::Binary(BinOp::Mul),
            ]
        );
    }

    #[test]
    fn unary_minus_binds_before_pow() {
        // -2**2 == (-2)**2
        assert_eq!(
            rpn("-2**2"),
            vec![
                RpnToken::Const(2),
                RpnToken::Unary(UnaryOp::Neg),
                RpnToken::Const(2),
                RpnToken::Binary(BinOp::Pow),
            ]
        );
    }

    #[test]
    fn short_circuit_ordering() {
        assert_eq!(
            rpn("value > $7F && iswrite"),
            vec![
                RpnToken::Ctx(CtxToken::Value),
                RpnToken::Const(0x7F),
                RpnToken::Binary(BinOp::Gt),
                RpnToken::Ctx(CtxToken::IsWrite),
                RpnToken::Binary(BinOp::And),
            ]
        );
    }

    #[test]
    fn deref_widths() {
        assert_eq!(
            rpn("[$c000]"),
            vec![RpnToken::Const(0xc000), RpnToken::Deref(1)]
        );
        assert_eq!(
            rpn("{$c000}"),
            vec![RpnToken::Const(0xc000), RpnToken::Deref(2)]
        );
        assert_eq!(
            rpn("@$c000"),
            vec![RpnToken::Const(0xc000), RpnToken::Deref(4)]
        );
    }

    #[test]
    fn label_reference_dedup() {
        let data = compile("loop_start == loop_start", CpuKind::GbCpu).unwrap();
        assert_eq!(data.labels, vec!["loop_start".to_string()]);
        assert_eq!(
            data.ops,
            vec![
                RpnToken::Label(0),
                RpnToken::Label(0),
                RpnToken::Binary(BinOp::Eq),
            ]
        );
    }

    #[test]
    fn mismatched_parens() {
        assert!(matches!(
            compile("(1+2", CpuKind::GbCpu),
            Err(Error::MismatchedParens)
        ));
    }

    #[test]
    fn register_token() {
        assert_eq!(rpn("a"), vec![RpnToken::Reg(0)]);
    }
}
