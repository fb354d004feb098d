//! Name and type resolution shared by all three passes.
//!
//! Resolution is re-entrant by design: resolving one symbol's header may
//! require resolving another's, in any module.  The per-symbol, per-pass
//! state machine in the symbol arena is what keeps that recursion safe -
//! every entry point checks it, so a true cycle surfaces as a reported
//! circular dependency instead of unbounded recursion.

use std::collections::HashMap;

use crate::compiler::ast::{self, TypeExpr, TypeExprKind};
use crate::compiler::context::CompilationContext;
use crate::compiler::sym::{
    lookup_in_module, LookupOutcome, ModuleId, SymbolId, SymbolKind, TemplateArgKey,
};
use crate::compiler::types::{CallConv, FnShape, TypeId, TypeShape};
use crate::compiler::Span;
use crate::StringId;

use super::error::SemanticError;
use super::passes::ensure_pass1;
use super::template;

/// The resolution environment: which module names resolve in, and the
/// template parameter bindings active for the symbol being resolved (empty
/// outside template instances).
#[derive(Clone, Debug, Default)]
pub struct TypeEnv {
    pub module: ModuleId,
    pub bindings: HashMap<StringId, TemplateArgKey>,
}

impl TypeEnv {
    pub fn new(module: ModuleId) -> TypeEnv {
        TypeEnv {
            module,
            bindings: HashMap::new(),
        }
    }
}

/// Resolves a possibly qualified name to a symbol in scope.  Unqualified
/// names search the current module and its imports; qualified names name a
/// module explicitly and search only its public surface (unless it is the
/// current module itself).
///
/// Ambiguities are reported here, once, and an `Err` means the caller should
/// substitute an error placeholder and continue.
pub fn lookup_symbol(
    ctx: &CompilationContext,
    module: ModuleId,
    path: &ast::Path,
    span: Span,
) -> Result<SymbolId, ()> {
    let name = match path.item() {
        Some(n) => n,
        None => return Err(()),
    };

    if path.len() == 1 {
        match lookup_in_module(&ctx.symbols, &ctx.module_syms, module, name, true) {
            LookupOutcome::Found(s) => Ok(s),
            LookupOutcome::NotFound => {
                ctx.error(span, SemanticError::NotDefined(name));
                Err(())
            }
            LookupOutcome::Ambiguous(_) => {
                ctx.error(span, SemanticError::AmbiguousSymbol(name));
                Err(())
            }
        }
    } else {
        let target = match ctx.find_module(path.parent()) {
            Some(m) => m,
            None => {
                ctx.error(span, SemanticError::PathNotFound(path.clone()));
                return Err(());
            }
        };
        let internal = target == module;
        match lookup_in_module(&ctx.symbols, &ctx.module_syms, target, name, internal) {
            LookupOutcome::Found(s) => Ok(s),
            LookupOutcome::NotFound => {
                ctx.error(span, SemanticError::PathNotFound(path.clone()));
                Err(())
            }
            LookupOutcome::Ambiguous(_) => {
                ctx.error(span, SemanticError::AmbiguousSymbol(name));
                Err(())
            }
        }
    }
}

/// Folds an AST expression to a compile time integer, for array dimensions
/// and template value arguments.  Returns `None` when the expression is not
/// a compile time integer constant.
pub fn fold_const_int(
    ctx: &mut CompilationContext,
    env: &TypeEnv,
    e: &ast::Expression,
) -> Option<i128> {
    use ast::{BinaryOperator, ExprKind, UnaryOperator};
    match &e.kind {
        ExprKind::Integer(v, _) => Some(*v),
        ExprKind::Boolean(b) => Some(*b as i128),
        ExprKind::Unary(UnaryOperator::Negate, inner) => {
            fold_const_int(ctx, env, inner).map(|v| -v)
        }
        ExprKind::Unary(UnaryOperator::BNot, inner) => {
            fold_const_int(ctx, env, inner).map(|v| !v)
        }
        ExprKind::Binary(op, l, r) => {
            let l = fold_const_int(ctx, env, l)?;
            let r = fold_const_int(ctx, env, r)?;
            Some(match op {
                BinaryOperator::Add => l + r,
                BinaryOperator::Sub => l - r,
                BinaryOperator::Mul => l * r,
                BinaryOperator::Div if r != 0 => l / r,
                BinaryOperator::Rem if r != 0 => l % r,
                BinaryOperator::Shl => l << r,
                BinaryOperator::Shr => l >> r,
                BinaryOperator::BAnd => l & r,
                BinaryOperator::BOr => l | r,
                BinaryOperator::BXor => l ^ r,
                _ => return None,
            })
        }
        ExprKind::SizeOf(te) => {
            let ty = resolve_type_expr(ctx, env, te);
            let (size, _) =
                crate::compiler::types::layout::size_of(&ctx.types, &ctx.symbols, ty).ok()?;
            Some(size as i128)
        }
        ExprKind::Identifier(path, targs) if path.len() == 1 && targs.is_empty() => {
            // A template value parameter in scope folds to its bound value.
            match env.bindings.get(&path.item()?) {
                Some(TemplateArgKey::Value(v)) => Some(*v),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Resolves a syntactic type to its canonical [`TypeId`].  Failure reports a
/// diagnostic and yields the error type, so callers never see a missing
/// type.
pub fn resolve_type_expr(
    ctx: &mut CompilationContext,
    env: &TypeEnv,
    te: &TypeExpr,
) -> TypeId {
    match &te.kind {
        TypeExprKind::Basic(kind) => ctx.types.basic(*kind),
        TypeExprKind::Pointer(inner) => {
            let t = resolve_type_expr(ctx, env, inner);
            ctx.types.pointer_to(t)
        }
        TypeExprKind::SArray(elem, dim) => {
            let t = resolve_type_expr(ctx, env, elem);
            match fold_const_int(ctx, env, dim) {
                Some(d) if d > 0 => ctx.types.canonicalize(TypeShape::SArray(t, d as u64)),
                Some(d) => {
                    ctx.error(dim.span, SemanticError::ArrayInvalidSize(d));
                    ctx.types.error_type()
                }
                None => {
                    ctx.error(dim.span, SemanticError::NonConstantExpression);
                    ctx.types.error_type()
                }
            }
        }
        TypeExprKind::DArray(elem) => {
            let t = resolve_type_expr(ctx, env, elem);
            ctx.types.canonicalize(TypeShape::DArray(t))
        }
        TypeExprKind::AArray(key, value) => {
            let k = resolve_type_expr(ctx, env, key);
            let v = resolve_type_expr(ctx, env, value);
            ctx.types.canonicalize(TypeShape::AArray(k, v))
        }
        TypeExprKind::Qualified(q, inner) => {
            let t = resolve_type_expr(ctx, env, inner);
            ctx.types.qualify(t, *q)
        }
        TypeExprKind::Function(params, ret, variadic) => {
            let params = params
                .iter()
                .map(|p| resolve_type_expr(ctx, env, p))
                .collect();
            let ret = resolve_type_expr(ctx, env, ret);
            ctx.types.canonicalize(TypeShape::Function(FnShape {
                params,
                ret,
                conv: CallConv::Native,
                variadic: *variadic,
            }))
        }
        TypeExprKind::Named(path, targs) => resolve_named_type(ctx, env, te.span, path, targs),
    }
}

fn resolve_named_type(
    ctx: &mut CompilationContext,
    env: &TypeEnv,
    span: Span,
    path: &ast::Path,
    targs: &[ast::TemplateArgExpr],
) -> TypeId {
    // Template parameter bindings shadow everything else.
    if path.len() == 1 && targs.is_empty() {
        if let Some(name) = path.item() {
            match env.bindings.get(&name) {
                Some(TemplateArgKey::Type(t)) => return *t,
                Some(TemplateArgKey::Value(_)) => {
                    ctx.error(span, SemanticError::NotAType(name));
                    return ctx.types.error_type();
                }
                None => (),
            }
        }
    }

    let sym = match lookup_symbol(ctx, env.module, path, span) {
        Ok(s) => s,
        Err(()) => return ctx.types.error_type(),
    };

    match &ctx.symbols.get(sym).kind {
        SymbolKind::Aggregate(_) => {
            if !targs.is_empty() {
                ctx.error(span, SemanticError::NotATemplate(path.item().unwrap()));
                return ctx.types.error_type();
            }
            // The aggregate's own resolution is NOT forced here: a type
            // reference alone (e.g. through a pointer) must not look like a
            // dependency cycle.  Whoever needs the member list or layout
            // forces the pass it needs.
            ctx.types.canonicalize(TypeShape::Aggregate(sym))
        }
        SymbolKind::Alias(_) => {
            ensure_pass1(ctx, sym);
            ctx.symbols
                .get(sym)
                .as_alias()
                .and_then(|a| a.target)
                .unwrap_or_else(|| ctx.types.error_type())
        }
        SymbolKind::Template(_) => {
            let args = match eval_template_args(ctx, env, targs) {
                Some(a) => a,
                None => return ctx.types.error_type(),
            };
            let instance = template::instantiate(ctx, sym, args, env.module, span);
            match &ctx.symbols.get(instance).kind {
                SymbolKind::Aggregate(_) => {
                    ctx.types.canonicalize(TypeShape::Aggregate(instance))
                }
                SymbolKind::Error => ctx.types.error_type(),
                _ => {
                    ctx.error(span, SemanticError::NotAType(path.item().unwrap()));
                    ctx.types.error_type()
                }
            }
        }
        SymbolKind::Error => ctx.types.error_type(),
        _ => {
            ctx.error(span, SemanticError::NotAType(path.item().unwrap()));
            ctx.types.error_type()
        }
    }
}

/// Evaluates explicit template arguments to their canonical keys.
pub fn eval_template_args(
    ctx: &mut CompilationContext,
    env: &TypeEnv,
    targs: &[ast::TemplateArgExpr],
) -> Option<Vec<TemplateArgKey>> {
    let mut keys = vec![];
    for targ in targs {
        match targ {
            ast::TemplateArgExpr::Type(te) => {
                keys.push(TemplateArgKey::Type(resolve_type_expr(ctx, env, te)));
            }
            ast::TemplateArgExpr::Value(e) => match fold_const_int(ctx, env, e) {
                Some(v) => keys.push(TemplateArgKey::Value(v)),
                None => {
                    ctx.error(e.span, SemanticError::NonConstantExpression);
                    return None;
                }
            },
        }
    }
    Some(keys)
}

/// The canonical signature of a function symbol, resolving it on demand.
/// Functions with an inferred return type force body analysis first.
pub fn fn_signature(ctx: &mut CompilationContext, sym: SymbolId) -> Option<FnShape> {
    ensure_pass1(ctx, sym);
    let needs_infer = {
        let f = ctx.symbols.get(sym).as_function()?;
        f.decl.ret.is_none() && f.decl.body.is_some()
    };
    if needs_infer {
        super::passes::ensure_pass3(ctx, sym);
    }
    let f = ctx.symbols.get(sym).as_function()?;
    let sig = f.sig?;
    match ctx.types.shape(sig) {
        TypeShape::Function(shape) => Some(shape),
        _ => None,
    }
}
