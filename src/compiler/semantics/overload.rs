//! Overload resolution.
//!
//! Given the overload set visible at a call site and the argument types,
//! compute a per-parameter match level for every candidate, eliminate
//! candidates with any non-matching parameter, and pick the candidate with
//! the lexicographically best match-level vector.  A full tie between two or
//! more candidates is an ambiguity error at the call site.  Candidates are
//! considered in declaration order and the comparison is total, so
//! resolution is deterministic run to run.

use crate::compiler::context::CompilationContext;
use crate::compiler::sym::SymbolId;
use crate::compiler::types::{BasicKind, TypeId, TypeShape};

use super::resolve::fn_signature;

/// How well one argument matches one parameter.  Order matters: a higher
/// level always beats a lower one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchLevel {
    NoMatch,
    /// Implicit conversion (numeric widening, array bridging, ...).
    Implicit,
    /// Identical up to qualifiers, and the qualifiers are compatible.
    Qualifier,
    Exact,
}

/// Whether `src` implicitly converts to `dst` without qualifier changes.
pub fn implicit_converts(ctx: &CompilationContext, dst: TypeId, src: TypeId) -> bool {
    let dst_shape = ctx.types.shape(ctx.types.unqualified(dst));
    let src_shape = ctx.types.shape(ctx.types.unqualified(src));
    match (&src_shape, &dst_shape) {
        (TypeShape::Basic(s), TypeShape::Basic(d)) => {
            if s.is_integer() && d.is_integer() {
                // Widening only, without changing signedness; bool and char
                // widen into anything at least as large.
                if matches!(s, BasicKind::Bool | BasicKind::Char) {
                    d.size() >= s.size()
                } else {
                    s.is_signed() == d.is_signed() && d.size() > s.size()
                }
            } else if s.is_integer() && d.is_float() {
                true
            } else {
                *s == BasicKind::F32 && *d == BasicKind::F64
            }
        }
        // A fixed array supplies a pointer+length view of itself.
        (TypeShape::SArray(se, _), TypeShape::DArray(de)) => se == de,
        // Null (typed as *void) converts to any pointer, and any pointer to
        // *void.
        (TypeShape::Pointer(s), TypeShape::Pointer(d)) => {
            let void = ctx.types.basic(BasicKind::Void);
            *s == void || *d == void
        }
        _ => false,
    }
}

/// Match level of one argument against one parameter.
pub fn match_arg(ctx: &CompilationContext, param: TypeId, arg: TypeId) -> MatchLevel {
    if ctx.types.is_error(param) || ctx.types.is_error(arg) {
        // Error placeholders match anything so one bad argument does not
        // cascade into a second diagnostic here.
        return MatchLevel::Exact;
    }
    if param == arg {
        return MatchLevel::Exact;
    }
    // Arguments pass by value, so any qualifier mix over the same base type
    // is a qualification conversion.
    if ctx.types.unqualified(param) == ctx.types.unqualified(arg) {
        return MatchLevel::Qualifier;
    }
    if implicit_converts(ctx, param, arg) {
        return MatchLevel::Implicit;
    }
    MatchLevel::NoMatch
}

#[derive(Clone, Debug, PartialEq)]
pub enum CallResolution {
    Chosen(SymbolId),
    Ambiguous(Vec<SymbolId>),
    NoMatch,
}

/// Picks exactly one candidate from an overload set, or reports why not.
pub fn resolve_call(
    ctx: &mut CompilationContext,
    set: &[SymbolId],
    args: &[TypeId],
) -> CallResolution {
    let mut best: Option<(Vec<MatchLevel>, Vec<SymbolId>)> = None;

    for &candidate in set {
        let shape = match fn_signature(ctx, candidate) {
            Some(s) => s,
            None => continue,
        };

        if args.len() < shape.params.len()
            || (args.len() > shape.params.len() && !shape.variadic)
        {
            continue;
        }

        let mut vector = Vec::with_capacity(args.len());
        let mut eliminated = false;
        for (i, arg) in args.iter().enumerate() {
            let level = if i < shape.params.len() {
                match_arg(ctx, shape.params[i], *arg)
            } else {
                // Arguments consumed by the variadic tail.
                MatchLevel::Implicit
            };
            if level == MatchLevel::NoMatch {
                eliminated = true;
                break;
            }
            vector.push(level);
        }
        if eliminated {
            continue;
        }

        match &mut best {
            None => best = Some((vector, vec![candidate])),
            Some((best_vec, tied)) => {
                if vector > *best_vec {
                    *best_vec = vector;
                    tied.clear();
                    tied.push(candidate);
                } else if vector == *best_vec {
                    tied.push(candidate);
                }
            }
        }
    }

    match best {
        None => CallResolution::NoMatch,
        Some((_, tied)) if tied.len() == 1 => CallResolution::Chosen(tied[0]),
        Some((_, tied)) => CallResolution::Ambiguous(tied),
    }
}
