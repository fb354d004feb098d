//! Constant folding over typed expressions.
//!
//! Static initializers, template value arguments, and immediate asm
//! operands must be compile time constants; this module decides whether a
//! typed expression is one and computes its value.  Returning `None` means
//! "not a constant"; the caller reports the policy error for its context.

use crate::compiler::ast::{BinaryOperator, UnaryOperator};
use crate::compiler::context::CompilationContext;

use super::tree::{ConstValue, SemExpr, SemExprKind};

pub fn fold(ctx: &CompilationContext, e: &SemExpr) -> Option<ConstValue> {
    match &e.kind {
        SemExprKind::Const(v) => Some(v.clone()),
        SemExprKind::StringLit(id) => Some(ConstValue::Str(*id)),
        SemExprKind::Convert(inner) | SemExprKind::Cast(inner) => fold(ctx, inner),
        SemExprKind::Unary(op, inner) => {
            let v = fold(ctx, inner)?;
            match (op, v) {
                (UnaryOperator::Negate, ConstValue::Int(i)) => Some(ConstValue::Int(-i)),
                (UnaryOperator::Negate, ConstValue::Real(r)) => Some(ConstValue::Real(-r)),
                (UnaryOperator::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
                (UnaryOperator::BNot, ConstValue::Int(i)) => Some(ConstValue::Int(!i)),
                _ => None,
            }
        }
        SemExprKind::Binary(op, l, r) => {
            let l = fold(ctx, l)?;
            let r = fold(ctx, r)?;
            fold_binary(*op, l, r)
        }
        SemExprKind::AddrOf(inner) => match &inner.kind {
            // Only symbols with static storage duration have compile time
            // addresses.
            SemExprKind::Global(s) => Some(ConstValue::SymAddr(*s)),
            _ => None,
        },
        SemExprKind::Global(s) => {
            // A non-mutable static with a constant initializer folds to its
            // value.
            let var = ctx.symbols.get(*s).as_variable()?;
            if var.decl.mutable {
                return None;
            }
            var.init.clone()
        }
        SemExprKind::StructLit { agg, inits } => {
            let mut folded = Vec::with_capacity(inits.len());
            for (index, value) in inits {
                folded.push((*index, fold(ctx, value)?));
            }
            Some(ConstValue::Struct(*agg, folded))
        }
        SemExprKind::ArrayLit(elems) => {
            let folded: Option<Vec<_>> = elems.iter().map(|el| fold(ctx, el)).collect();
            Some(ConstValue::Array(folded?))
        }
        _ => None,
    }
}

fn fold_binary(op: BinaryOperator, l: ConstValue, r: ConstValue) -> Option<ConstValue> {
    use BinaryOperator::*;
    match (l, r) {
        (ConstValue::Int(a), ConstValue::Int(b)) => Some(match op {
            Add => ConstValue::Int(a.wrapping_add(b)),
            Sub => ConstValue::Int(a.wrapping_sub(b)),
            Mul => ConstValue::Int(a.wrapping_mul(b)),
            Div => {
                if b == 0 {
                    return None;
                }
                ConstValue::Int(a / b)
            }
            Rem => {
                if b == 0 {
                    return None;
                }
                ConstValue::Int(a % b)
            }
            BAnd => ConstValue::Int(a & b),
            BOr => ConstValue::Int(a | b),
            BXor => ConstValue::Int(a ^ b),
            Shl => ConstValue::Int(a << (b as u32 & 127)),
            Shr => ConstValue::Int(a >> (b as u32 & 127)),
            Eq => ConstValue::Bool(a == b),
            NEq => ConstValue::Bool(a != b),
            Ls => ConstValue::Bool(a < b),
            LsEq => ConstValue::Bool(a <= b),
            Gr => ConstValue::Bool(a > b),
            GrEq => ConstValue::Bool(a >= b),
            And | Or => return None,
        }),
        (ConstValue::Real(a), ConstValue::Real(b)) => Some(match op {
            Add => ConstValue::Real(a + b),
            Sub => ConstValue::Real(a - b),
            Mul => ConstValue::Real(a * b),
            Div => ConstValue::Real(a / b),
            Eq => ConstValue::Bool(a == b),
            NEq => ConstValue::Bool(a != b),
            Ls => ConstValue::Bool(a < b),
            LsEq => ConstValue::Bool(a <= b),
            Gr => ConstValue::Bool(a > b),
            GrEq => ConstValue::Bool(a >= b),
            _ => return None,
        }),
        (ConstValue::Bool(a), ConstValue::Bool(b)) => Some(match op {
            And => ConstValue::Bool(a && b),
            Or => ConstValue::Bool(a || b),
            Eq => ConstValue::Bool(a == b),
            NEq => ConstValue::Bool(a != b),
            _ => return None,
        }),
        _ => None,
    }
}
