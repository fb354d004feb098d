//! Pass 3: statement and expression analysis of function bodies.
//!
//! Every function body is rewritten from the untyped AST into a typed
//! [`SemBlock`].  Errors follow the recovery policy: report into the sink,
//! substitute an error-typed node, keep analyzing.  Pass 3 never aborts a
//! body; a body full of errors still produces a complete (error-laden)
//! tree so later statements get their own diagnostics.

use crate::compiler::ast::{self, BinaryOperator, ExprKind, StmtKind, UnaryOperator};
use crate::compiler::context::CompilationContext;
use crate::compiler::sym::{LocalDef, SymbolId, SymbolKind};
use crate::compiler::types::{layout, BasicKind, TypeId, TypeShape};
use crate::compiler::Span;
use crate::StringId;

use super::error::SemanticError;
use super::overload::{self, CallResolution};
use super::resolve::{self, TypeEnv};
use super::scope::ScopeStack;
use super::template::{self, TemplateSelection};
use super::tree::*;

/// Per-function analysis state.
pub struct FnContext {
    pub env: TypeEnv,
    pub func: SymbolId,
    /// Parameter names and types, in order.
    pub params: Vec<(StringId, TypeId)>,
    /// The declared return type; `None` while it is being inferred.
    pub ret_ty: Option<TypeId>,
    pub locals: Vec<LocalDef>,
    pub scopes: ScopeStack,
    /// Labels defined anywhere in the body, collected up front so forward
    /// gotos resolve.
    pub labels: Vec<StringId>,
    seen_labels: Vec<StringId>,
}

impl FnContext {
    pub fn new(env: TypeEnv, func: SymbolId, params: Vec<(StringId, TypeId)>, ret_ty: Option<TypeId>) -> FnContext {
        FnContext {
            env,
            func,
            params,
            ret_ty,
            locals: vec![],
            scopes: ScopeStack::new(),
            labels: vec![],
            seen_labels: vec![],
        }
    }

    fn new_local(&mut self, name: StringId, ty: TypeId, mutable: bool, span: Span) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalDef {
            name,
            ty,
            mutable,
            span,
        });
        id
    }
}

pub fn collect_labels(stmts: &[ast::Statement], out: &mut Vec<StringId>) {
    for s in stmts {
        match &s.kind {
            StmtKind::Label(id) => out.push(*id),
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                collect_labels(then_block, out);
                collect_labels(else_block, out);
            }
            StmtKind::While { body, .. } => collect_labels(body, out),
            StmtKind::Block(b) => collect_labels(b, out),
            _ => (),
        }
    }
}

/// Analyzes a block, producing typed statements plus the locals the block
/// itself declared (for binding-level bookkeeping during lowering).
pub fn analyze_block(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    stmts: &[ast::Statement],
) -> SemBlock {
    fc.scopes.enter_scope();
    let mut out = vec![];
    for s in stmts {
        out.push(analyze_stmt(ctx, fc, s));
    }
    let locals = fc.scopes.leave_scope();
    SemBlock { stmts: out, locals }
}

fn error_expr(ctx: &CompilationContext, span: Span) -> SemExpr {
    SemExpr::error(span, ctx.types.error_type())
}

/// Inserts an implicit conversion node when the value's type differs from
/// the target but converts implicitly; identical types pass through.
fn convert_to(ctx: &CompilationContext, e: SemExpr, target: TypeId) -> SemExpr {
    if e.ty == target || ctx.types.is_error(e.ty) || ctx.types.is_error(target) {
        e
    } else {
        SemExpr {
            span: e.span,
            ty: target,
            kind: SemExprKind::Convert(Box::new(e)),
        }
    }
}

/// Coerces `e` to `target`, or returns `Err(e)` when no implicit path
/// exists; the caller reports the mismatch.
fn try_coerce(ctx: &CompilationContext, e: SemExpr, target: TypeId) -> Result<SemExpr, SemExpr> {
    match overload::match_arg(ctx, target, e.ty) {
        overload::MatchLevel::NoMatch => Err(e),
        _ => Ok(convert_to(ctx, e, target)),
    }
}

fn is_lvalue(e: &SemExpr) -> bool {
    match &e.kind {
        SemExprKind::Local(_) | SemExprKind::Global(_) | SemExprKind::Param(_) => true,
        SemExprKind::Deref(_) => true,
        SemExprKind::Field { base, .. } => is_lvalue(base),
        SemExprKind::Index { base, .. } => is_lvalue(base) || matches!(base.kind, SemExprKind::Deref(_)),
        SemExprKind::Error => true,
        _ => false,
    }
}

fn is_mutable_lvalue(ctx: &CompilationContext, fc: &FnContext, e: &SemExpr) -> bool {
    match &e.kind {
        SemExprKind::Local(l) => fc.locals[l.index()].mutable,
        SemExprKind::Global(s) => ctx
            .symbols
            .get(*s)
            .as_variable()
            .map(|v| v.decl.mutable)
            .unwrap_or(false),
        SemExprKind::Param(_) => false,
        SemExprKind::Deref(_) => true,
        SemExprKind::Field { base, .. } => is_mutable_lvalue(ctx, fc, base),
        SemExprKind::Index { base, .. } => is_mutable_lvalue(ctx, fc, base),
        SemExprKind::Error => true,
        _ => false,
    }
}

/// Common type for a numeric binary operation, by widening.
fn unify_numeric(ctx: &CompilationContext, l: TypeId, r: TypeId) -> Option<TypeId> {
    if l == r {
        return Some(l);
    }
    if overload::implicit_converts(ctx, r, l) {
        return Some(r);
    }
    if overload::implicit_converts(ctx, l, r) {
        return Some(l);
    }
    None
}

fn analyze_stmt(ctx: &mut CompilationContext, fc: &mut FnContext, s: &ast::Statement) -> SemStmt {
    let kind = match &s.kind {
        StmtKind::Let {
            name,
            mutable,
            ty,
            init,
        } => {
            let init_expr = analyze_expr(ctx, fc, init);
            let declared = ty
                .as_ref()
                .map(|t| resolve::resolve_type_expr(ctx, &fc.env.clone(), t));
            let (local_ty, init_expr) = match declared {
                Some(want) => match try_coerce(ctx, init_expr, want) {
                    Ok(e) => (want, e),
                    Err(e) => {
                        ctx.error(
                            s.span,
                            SemanticError::BindMismatch(
                                ctx.type_name(want),
                                ctx.type_name(e.ty),
                            ),
                        );
                        (want, error_expr(ctx, e.span))
                    }
                },
                None => (init_expr.ty, init_expr),
            };
            let local = fc.new_local(*name, local_ty, *mutable, s.span);
            if fc.scopes.declare(*name, local).is_err() {
                ctx.error(s.span, SemanticError::AlreadyDeclared(*name));
            }
            SemStmtKind::Let {
                local,
                init: init_expr,
            }
        }
        StmtKind::Assign { lhs, rhs } => {
            let lhs_expr = analyze_expr(ctx, fc, lhs);
            let rhs_expr = analyze_expr(ctx, fc, rhs);
            if !is_lvalue(&lhs_expr) {
                ctx.error(lhs.span, SemanticError::NotAnLValue);
            } else if !is_mutable_lvalue(ctx, fc, &lhs_expr) {
                ctx.error(lhs.span, SemanticError::ExpressionNotMutable);
            }
            let rhs_expr = match try_coerce(ctx, rhs_expr, lhs_expr.ty) {
                Ok(e) => e,
                Err(e) => {
                    ctx.error(
                        s.span,
                        SemanticError::AssignMismatch(
                            ctx.type_name(lhs_expr.ty),
                            ctx.type_name(e.ty),
                        ),
                    );
                    error_expr(ctx, e.span)
                }
            };
            SemStmtKind::Assign {
                lhs: lhs_expr,
                rhs: rhs_expr,
            }
        }
        StmtKind::Expr(e) => SemStmtKind::Expr(analyze_expr(ctx, fc, e)),
        StmtKind::If {
            cond,
            then_block,
            else_block,
        } => {
            let cond = self::condition(ctx, fc, cond);
            let then_block = analyze_block(ctx, fc, then_block);
            let else_block = analyze_block(ctx, fc, else_block);
            SemStmtKind::If {
                cond,
                then_block,
                else_block,
            }
        }
        StmtKind::While { cond, body } => {
            let cond = self::condition(ctx, fc, cond);
            let body = analyze_block(ctx, fc, body);
            SemStmtKind::While { cond, body }
        }
        StmtKind::Return(value) => {
            let value = value.as_ref().map(|v| analyze_expr(ctx, fc, v));
            let value_ty = value
                .as_ref()
                .map(|v| v.ty)
                .unwrap_or_else(|| ctx.types.basic(BasicKind::Void));
            match fc.ret_ty {
                None => {
                    // Inferred-return-type function: the first return fixes
                    // the type.
                    fc.ret_ty = Some(value_ty);
                    SemStmtKind::Return(value)
                }
                Some(want) => {
                    let void = ctx.types.basic(BasicKind::Void);
                    if want == void {
                        if value.is_some() {
                            ctx.error(
                                s.span,
                                SemanticError::ReturnExpected(
                                    ctx.type_name(want),
                                    ctx.type_name(value_ty),
                                ),
                            );
                        }
                        SemStmtKind::Return(None)
                    } else {
                        match value {
                            Some(v) => match try_coerce(ctx, v, want) {
                                Ok(v) => SemStmtKind::Return(Some(v)),
                                Err(v) => {
                                    ctx.error(
                                        s.span,
                                        SemanticError::ReturnExpected(
                                            ctx.type_name(want),
                                            ctx.type_name(v.ty),
                                        ),
                                    );
                                    SemStmtKind::Return(Some(error_expr(ctx, s.span)))
                                }
                            },
                            None => {
                                ctx.error(
                                    s.span,
                                    SemanticError::ReturnExpected(
                                        ctx.type_name(want),
                                        "void".into(),
                                    ),
                                );
                                SemStmtKind::Return(None)
                            }
                        }
                    }
                }
            }
        }
        StmtKind::Block(stmts) => SemStmtKind::Block(analyze_block(ctx, fc, stmts)),
        StmtKind::Label(name) => {
            if fc.seen_labels.contains(name) {
                ctx.error(s.span, SemanticError::DuplicateLabel(*name));
            } else {
                fc.seen_labels.push(*name);
            }
            SemStmtKind::Label(*name)
        }
        StmtKind::Goto(name) => {
            if !fc.labels.contains(name) {
                ctx.error(s.span, SemanticError::UnknownLabel(*name));
            }
            SemStmtKind::Goto(*name)
        }
        StmtKind::Asm(asm) => analyze_asm(ctx, fc, asm, s.span),
    };
    SemStmt { span: s.span, kind }
}

fn condition(ctx: &mut CompilationContext, fc: &mut FnContext, cond: &ast::Expression) -> SemExpr {
    let e = analyze_expr(ctx, fc, cond);
    let bool_ty = ctx.types.basic(BasicKind::Bool);
    if e.ty != bool_ty && !ctx.types.is_error(e.ty) {
        ctx.error(cond.span, SemanticError::CondExpectedBool(ctx.type_name(e.ty)));
        return error_expr(ctx, cond.span);
    }
    e
}

pub fn analyze_expr(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    e: &ast::Expression,
) -> SemExpr {
    let span = e.span;
    match &e.kind {
        ExprKind::Integer(v, suffix) => {
            let kind = suffix.unwrap_or({
                if *v >= i32::MIN as i128 && *v <= i32::MAX as i128 {
                    BasicKind::I32
                } else {
                    BasicKind::I64
                }
            });
            SemExpr::new(span, ctx.types.basic(kind), SemExprKind::Const(ConstValue::Int(*v)))
        }
        ExprKind::Real(v, suffix) => {
            let kind = suffix.unwrap_or(BasicKind::F64);
            SemExpr::new(span, ctx.types.basic(kind), SemExprKind::Const(ConstValue::Real(*v)))
        }
        ExprKind::Boolean(b) => SemExpr::new(
            span,
            ctx.types.basic(BasicKind::Bool),
            SemExprKind::Const(ConstValue::Bool(*b)),
        ),
        ExprKind::Null => {
            let voidp = ctx.types.pointer_to(ctx.types.basic(BasicKind::Void));
            SemExpr::new(span, voidp, SemExprKind::Const(ConstValue::Null))
        }
        ExprKind::StringLit(id) => {
            let elem = ctx
                .types
                .qualify(ctx.types.basic(BasicKind::Char), ast::Qualifier::Immutable);
            let ty = ctx.types.canonicalize(TypeShape::DArray(elem));
            SemExpr::new(span, ty, SemExprKind::StringLit(*id))
        }
        ExprKind::SizeOf(te) => {
            let env = fc.env.clone();
            let ty = resolve::resolve_type_expr(ctx, &env, te);
            match layout::size_of(&ctx.types, &ctx.symbols, ty) {
                Ok((size, _)) => SemExpr::new(
                    span,
                    ctx.types.basic(BasicKind::U64),
                    SemExprKind::Const(ConstValue::Int(size as i128)),
                ),
                Err(layout::LayoutError::Unresolved(sym)) => {
                    ensure_pass2_then_size(ctx, sym, ty, span)
                }
                Err(_) => {
                    ctx.error(span, SemanticError::TypeHasNoSize(ctx.type_name(ty)));
                    error_expr(ctx, span)
                }
            }
        }
        ExprKind::Identifier(path, targs) => {
            if path.len() == 1 && targs.is_empty() {
                let name = path.item().unwrap();
                if let Some(local) = fc.scopes.lookup(name) {
                    let ty = fc.locals[local.index()].ty;
                    return SemExpr::new(span, ty, SemExprKind::Local(local));
                }
                if let Some(idx) = fc.params.iter().position(|(n, _)| *n == name) {
                    let ty = fc.params[idx].1;
                    return SemExpr::new(span, ty, SemExprKind::Param(idx as u32));
                }
            }
            let sym = match resolve::lookup_symbol(ctx, fc.env.module, path, span) {
                Ok(s) => s,
                Err(()) => return error_expr(ctx, span),
            };
            match &ctx.symbols.get(sym).kind {
                SymbolKind::Variable(_) => {
                    super::passes::ensure_pass1(ctx, sym);
                    let ty = ctx
                        .symbols
                        .get(sym)
                        .as_variable()
                        .and_then(|v| v.ty)
                        .unwrap_or_else(|| ctx.types.error_type());
                    SemExpr::new(span, ty, SemExprKind::Global(sym))
                }
                SymbolKind::Error => error_expr(ctx, span),
                _ => {
                    ctx.error(span, SemanticError::NotAVariable(path.item().unwrap()));
                    error_expr(ctx, span)
                }
            }
        }
        ExprKind::Unary(op, operand) => analyze_unary(ctx, fc, span, *op, operand),
        ExprKind::Binary(op, l, r) => analyze_binary(ctx, fc, span, *op, l, r),
        ExprKind::Call {
            callee,
            template_args,
            args,
        } => analyze_call(ctx, fc, span, callee, template_args, args),
        ExprKind::Field(base, field) => {
            let base_expr = analyze_expr(ctx, fc, base);
            analyze_field(ctx, fc, span, base_expr, *field)
        }
        ExprKind::Index(base, index) => {
            let base_expr = analyze_expr(ctx, fc, base);
            let index_expr = analyze_expr(ctx, fc, index);
            analyze_index(ctx, span, base_expr, index_expr)
        }
        ExprKind::Cast(te, inner) => {
            let env = fc.env.clone();
            let target = resolve::resolve_type_expr(ctx, &env, te);
            let inner = analyze_expr(ctx, fc, inner);
            if cast_allowed(ctx, inner.ty, target) {
                SemExpr::new(span, target, SemExprKind::Cast(Box::new(inner)))
            } else {
                ctx.error(
                    span,
                    SemanticError::InvalidTypeCast(
                        ctx.type_name(inner.ty),
                        ctx.type_name(target),
                    ),
                );
                error_expr(ctx, span)
            }
        }
        ExprKind::StructLit {
            path,
            template_args,
            fields,
        } => analyze_struct_lit(ctx, fc, span, path, template_args, fields),
        ExprKind::ArrayLit(elems) => {
            let mut sem = vec![];
            for el in elems {
                sem.push(analyze_expr(ctx, fc, el));
            }
            if sem.is_empty() {
                ctx.error(span, SemanticError::ArrayInvalidSize(0));
                return error_expr(ctx, span);
            }
            let elem_ty = sem[0].ty;
            let mut out = vec![];
            for el in sem {
                match try_coerce(ctx, el, elem_ty) {
                    Ok(e) => out.push(e),
                    Err(e) => {
                        ctx.error(e.span, SemanticError::ArrayInconsistentElementTypes);
                        out.push(error_expr(ctx, span));
                    }
                }
            }
            let ty = ctx
                .types
                .canonicalize(TypeShape::SArray(elem_ty, out.len() as u64));
            SemExpr::new(span, ty, SemExprKind::ArrayLit(out))
        }
    }
}

fn ensure_pass2_then_size(
    ctx: &mut CompilationContext,
    sym: SymbolId,
    ty: TypeId,
    span: Span,
) -> SemExpr {
    super::passes::ensure_pass2(ctx, sym);
    match layout::size_of(&ctx.types, &ctx.symbols, ty) {
        Ok((size, _)) => SemExpr::new(
            span,
            ctx.types.basic(BasicKind::U64),
            SemExprKind::Const(ConstValue::Int(size as i128)),
        ),
        Err(_) => {
            ctx.error(span, SemanticError::TypeHasNoSize(ctx.type_name(ty)));
            error_expr(ctx, span)
        }
    }
}

fn analyze_unary(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    span: Span,
    op: UnaryOperator,
    operand: &ast::Expression,
) -> SemExpr {
    let inner = analyze_expr(ctx, fc, operand);
    if ctx.types.is_error(inner.ty) {
        return inner;
    }
    let shape = ctx.types.shape(ctx.types.unqualified(inner.ty));
    match op {
        UnaryOperator::Negate => match shape {
            TypeShape::Basic(k) if (k.is_integer() && k.is_signed()) || k.is_float() => {
                let ty = inner.ty;
                SemExpr::new(span, ty, SemExprKind::Unary(op, Box::new(inner)))
            }
            _ => {
                ctx.error(
                    span,
                    SemanticError::UnaryOpExpected("-".into(), ctx.type_name(inner.ty)),
                );
                error_expr(ctx, span)
            }
        },
        UnaryOperator::Not => {
            let bool_ty = ctx.types.basic(BasicKind::Bool);
            if inner.ty == bool_ty {
                SemExpr::new(span, bool_ty, SemExprKind::Unary(op, Box::new(inner)))
            } else {
                ctx.error(
                    span,
                    SemanticError::UnaryOpExpected("!".into(), ctx.type_name(inner.ty)),
                );
                error_expr(ctx, span)
            }
        }
        UnaryOperator::BNot => match shape {
            TypeShape::Basic(k) if k.is_integer() => {
                let ty = inner.ty;
                SemExpr::new(span, ty, SemExprKind::Unary(op, Box::new(inner)))
            }
            _ => {
                ctx.error(
                    span,
                    SemanticError::UnaryOpExpected("~".into(), ctx.type_name(inner.ty)),
                );
                error_expr(ctx, span)
            }
        },
        UnaryOperator::AddressOf => {
            if !is_lvalue(&inner) {
                ctx.error(span, SemanticError::NotAnLValue);
                return error_expr(ctx, span);
            }
            let ty = ctx.types.pointer_to(inner.ty);
            SemExpr::new(span, ty, SemExprKind::AddrOf(Box::new(inner)))
        }
        UnaryOperator::Deref => match shape {
            TypeShape::Pointer(t) => SemExpr::new(span, t, SemExprKind::Deref(Box::new(inner))),
            _ => {
                ctx.error(
                    span,
                    SemanticError::UnaryOpExpected("*".into(), ctx.type_name(inner.ty)),
                );
                error_expr(ctx, span)
            }
        },
    }
}

fn analyze_binary(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    span: Span,
    op: BinaryOperator,
    l: &ast::Expression,
    r: &ast::Expression,
) -> SemExpr {
    let le = analyze_expr(ctx, fc, l);
    let re = analyze_expr(ctx, fc, r);
    if ctx.types.is_error(le.ty) || ctx.types.is_error(re.ty) {
        return error_expr(ctx, span);
    }
    let bool_ty = ctx.types.basic(BasicKind::Bool);

    let mismatch = |ctx: &CompilationContext, le: &SemExpr, re: &SemExpr| {
        ctx.error(
            span,
            SemanticError::OpExpected(
                format!("{}", op),
                ctx.type_name(le.ty),
                ctx.type_name(re.ty),
            ),
        );
    };

    match op {
        BinaryOperator::And | BinaryOperator::Or => {
            if le.ty == bool_ty && re.ty == bool_ty {
                SemExpr::new(
                    span,
                    bool_ty,
                    SemExprKind::Binary(op, Box::new(le), Box::new(re)),
                )
            } else {
                mismatch(ctx, &le, &re);
                error_expr(ctx, span)
            }
        }
        BinaryOperator::Eq
        | BinaryOperator::NEq
        | BinaryOperator::Ls
        | BinaryOperator::LsEq
        | BinaryOperator::Gr
        | BinaryOperator::GrEq => match unify_numeric(ctx, le.ty, re.ty) {
            Some(common) => {
                let le = convert_to(ctx, le, common);
                let re = convert_to(ctx, re, common);
                SemExpr::new(
                    span,
                    bool_ty,
                    SemExprKind::Binary(op, Box::new(le), Box::new(re)),
                )
            }
            None => {
                mismatch(ctx, &le, &re);
                error_expr(ctx, span)
            }
        },
        _ => {
            // Arithmetic, bitwise, and shift operators.
            let integral_only = matches!(
                op,
                BinaryOperator::Rem
                    | BinaryOperator::BAnd
                    | BinaryOperator::BOr
                    | BinaryOperator::BXor
                    | BinaryOperator::Shl
                    | BinaryOperator::Shr
            );
            let ok_kind = |ctx: &CompilationContext, ty: TypeId| match ctx
                .types
                .shape(ctx.types.unqualified(ty))
            {
                TypeShape::Basic(k) => {
                    k != BasicKind::Void
                        && k != BasicKind::Bool
                        && (k.is_integer() || (!integral_only && k.is_float()))
                }
                _ => false,
            };
            if !ok_kind(ctx, le.ty) || !ok_kind(ctx, re.ty) {
                mismatch(ctx, &le, &re);
                return error_expr(ctx, span);
            }
            match unify_numeric(ctx, le.ty, re.ty) {
                Some(common) => {
                    let le = convert_to(ctx, le, common);
                    let re = convert_to(ctx, re, common);
                    SemExpr::new(
                        span,
                        common,
                        SemExprKind::Binary(op, Box::new(le), Box::new(re)),
                    )
                }
                None => {
                    mismatch(ctx, &le, &re);
                    error_expr(ctx, span)
                }
            }
        }
    }
}

fn analyze_field(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    span: Span,
    base: SemExpr,
    field: StringId,
) -> SemExpr {
    if ctx.types.is_error(base.ty) {
        return base;
    }
    // `.` auto-dereferences a single pointer level.
    let (base, base_ty) = match ctx.types.shape(ctx.types.unqualified(base.ty)) {
        TypeShape::Pointer(t) => {
            let deref = SemExpr::new(span, t, SemExprKind::Deref(Box::new(base)));
            (deref, t)
        }
        _ => {
            let t = base.ty;
            (base, t)
        }
    };

    match ctx.types.shape(ctx.types.unqualified(base_ty)) {
        TypeShape::Aggregate(agg) => {
            super::passes::ensure_pass1(ctx, agg);
            let found = ctx
                .symbols
                .get(agg)
                .as_aggregate()
                .and_then(|a| {
                    a.fields
                        .iter()
                        .position(|f| f.name == field)
                        .map(|i| (i, a.fields[i].ty))
                });
            match found {
                Some((index, fty)) => SemExpr::new(
                    span,
                    fty,
                    SemExprKind::Field {
                        base: Box::new(base),
                        field_index: index,
                    },
                ),
                None => {
                    ctx.error(
                        span,
                        SemanticError::MemberNotFound(field, ctx.type_name(base_ty)),
                    );
                    error_expr(ctx, span)
                }
            }
        }
        // The built-in length view of a dynamic array.
        TypeShape::DArray(_) if ctx.strings.get(field).map(|s| s == "len").unwrap_or(false) => {
            SemExpr::new(
                span,
                ctx.types.basic(BasicKind::U64),
                SemExprKind::Field {
                    base: Box::new(base),
                    field_index: usize::MAX,
                },
            )
        }
        _ => {
            ctx.error(
                span,
                SemanticError::MemberAccessInvalidRootType(ctx.type_name(base_ty)),
            );
            error_expr(ctx, span)
        }
    }
}

fn analyze_index(
    ctx: &mut CompilationContext,
    span: Span,
    base: SemExpr,
    index: SemExpr,
) -> SemExpr {
    if ctx.types.is_error(base.ty) || ctx.types.is_error(index.ty) {
        return error_expr(ctx, span);
    }
    let idx_ok = match ctx.types.shape(ctx.types.unqualified(index.ty)) {
        TypeShape::Basic(k) => k.is_integer(),
        _ => false,
    };
    if !idx_ok {
        ctx.error(
            span,
            SemanticError::IndexInvalidIndexType(ctx.type_name(index.ty)),
        );
        return error_expr(ctx, span);
    }
    let elem = match ctx.types.shape(ctx.types.unqualified(base.ty)) {
        TypeShape::SArray(t, _) | TypeShape::DArray(t) | TypeShape::Pointer(t) => t,
        _ => {
            ctx.error(
                span,
                SemanticError::IndexingInvalidType(ctx.type_name(base.ty)),
            );
            return error_expr(ctx, span);
        }
    };
    SemExpr::new(
        span,
        elem,
        SemExprKind::Index {
            base: Box::new(base),
            index: Box::new(index),
        },
    )
}

fn cast_allowed(ctx: &CompilationContext, from: TypeId, to: TypeId) -> bool {
    if from == to || ctx.types.is_error(from) || ctx.types.is_error(to) {
        return true;
    }
    let f = ctx.types.shape(ctx.types.unqualified(from));
    let t = ctx.types.shape(ctx.types.unqualified(to));
    let numeric = |s: &TypeShape| match s {
        TypeShape::Basic(k) => k.is_integer() || k.is_float(),
        _ => false,
    };
    let pointerish = |s: &TypeShape| matches!(s, TypeShape::Pointer(_));
    (numeric(&f) && numeric(&t))
        || (pointerish(&f) && pointerish(&t))
        || (pointerish(&f) && numeric(&t))
        || (numeric(&f) && pointerish(&t))
}

fn analyze_struct_lit(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    span: Span,
    path: &ast::Path,
    template_args: &[ast::TemplateArgExpr],
    fields: &[ast::StructLitField],
) -> SemExpr {
    let env = fc.env.clone();
    let sym = match resolve::lookup_symbol(ctx, env.module, path, span) {
        Ok(s) => s,
        Err(()) => return error_expr(ctx, span),
    };

    let agg = match &ctx.symbols.get(sym).kind {
        SymbolKind::Aggregate(_) => sym,
        SymbolKind::Template(_) => {
            let args = match resolve::eval_template_args(ctx, &env, template_args) {
                Some(a) => a,
                None => return error_expr(ctx, span),
            };
            template::instantiate(ctx, sym, args, env.module, span)
        }
        SymbolKind::Error => return error_expr(ctx, span),
        _ => {
            ctx.error(span, SemanticError::NotAType(path.item().unwrap()));
            return error_expr(ctx, span);
        }
    };
    super::passes::ensure_pass1(ctx, agg);

    let mut inits = vec![];
    for f in fields {
        let value = analyze_expr(ctx, fc, &f.value);
        let found = ctx.symbols.get(agg).as_aggregate().and_then(|a| {
            a.fields
                .iter()
                .position(|fi| fi.name == f.name)
                .map(|i| (i, a.fields[i].ty))
        });
        match found {
            Some((index, fty)) => match try_coerce(ctx, value, fty) {
                Ok(v) => inits.push((index, v)),
                Err(v) => {
                    ctx.error(
                        f.name_span,
                        SemanticError::BindMismatch(ctx.type_name(fty), ctx.type_name(v.ty)),
                    );
                    inits.push((index, error_expr(ctx, f.name_span)));
                }
            },
            None => {
                let ty_name = ctx
                    .strings
                    .get(ctx.symbols.get(agg).name)
                    .unwrap_or_default();
                ctx.error(f.name_span, SemanticError::MemberNotFound(f.name, ty_name));
            }
        }
    }

    let ty = ctx.types.canonicalize(TypeShape::Aggregate(agg));
    SemExpr::new(span, ty, SemExprKind::StructLit { agg, inits })
}

fn analyze_call(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    span: Span,
    callee: &ast::Path,
    template_args: &[ast::TemplateArgExpr],
    args: &[ast::Expression],
) -> SemExpr {
    let mut sem_args = vec![];
    for a in args {
        sem_args.push(analyze_expr(ctx, fc, a));
    }
    let arg_tys: Vec<TypeId> = sem_args.iter().map(|a| a.ty).collect();
    let env = fc.env.clone();
    let name = match callee.item() {
        Some(n) => n,
        None => return error_expr(ctx, span),
    };

    let first = match resolve::lookup_symbol(ctx, env.module, callee, span) {
        Ok(s) => s,
        Err(()) => return error_expr(ctx, span),
    };

    let set = match &ctx.symbols.get(first).kind {
        SymbolKind::Function(_) => ctx.symbols.overload_set(first),
        SymbolKind::Template(_) => {
            let chain = ctx.symbols.overload_set(first);
            let chosen = if !template_args.is_empty() {
                let keys = match resolve::eval_template_args(ctx, &env, template_args) {
                    Some(k) => k,
                    None => return error_expr(ctx, span),
                };
                match template::select_template(ctx, &chain, &keys) {
                    TemplateSelection::Chosen(t) => {
                        Some(template::instantiate(ctx, t, keys, env.module, span))
                    }
                    TemplateSelection::Ambiguous(_) => {
                        ctx.error(span, SemanticError::AmbiguousTemplateMatch(name));
                        None
                    }
                    TemplateSelection::NoMatch => {
                        ctx.error(span, SemanticError::NoMatchingOverload(name));
                        None
                    }
                }
            } else {
                // Deduce arguments per candidate; prefer the candidate with
                // the most satisfied specializations; a tie is ambiguous.
                let mut best: Option<(usize, Vec<(SymbolId, Vec<_>)>)> = None;
                for &cand in &chain {
                    if let Some(deduced) = template::deduce_args(ctx, cand, &arg_tys) {
                        let score = template::score_candidate(ctx, cand, &deduced).unwrap_or(0);
                        match &mut best {
                            None => best = Some((score, vec![(cand, deduced)])),
                            Some((bs, tied)) => {
                                if score > *bs {
                                    *bs = score;
                                    tied.clear();
                                    tied.push((cand, deduced));
                                } else if score == *bs {
                                    tied.push((cand, deduced));
                                }
                            }
                        }
                    }
                }
                match best {
                    Some((_, mut tied)) if tied.len() == 1 => {
                        let (t, deduced) = tied.pop().unwrap();
                        Some(template::instantiate(ctx, t, deduced, env.module, span))
                    }
                    Some(_) => {
                        ctx.error(span, SemanticError::AmbiguousTemplateMatch(name));
                        None
                    }
                    None => {
                        ctx.error(span, SemanticError::NoMatchingOverload(name));
                        None
                    }
                }
            };
            match chosen {
                Some(inst) if ctx.symbols.get(inst).as_function().is_some() => vec![inst],
                Some(_) | None => return error_expr(ctx, span),
            }
        }
        SymbolKind::Error => return error_expr(ctx, span),
        _ => {
            ctx.error(span, SemanticError::NotCallable(name));
            return error_expr(ctx, span);
        }
    };

    match overload::resolve_call(ctx, &set, &arg_tys) {
        CallResolution::Chosen(func) => {
            let shape = match resolve::fn_signature(ctx, func) {
                Some(s) => s,
                None => return error_expr(ctx, span),
            };
            let mut converted = vec![];
            for (i, a) in sem_args.into_iter().enumerate() {
                if i < shape.params.len() {
                    match try_coerce(ctx, a, shape.params[i]) {
                        Ok(v) => converted.push(v),
                        Err(v) => converted.push(v),
                    }
                } else {
                    converted.push(a);
                }
            }
            SemExpr::new(
                span,
                shape.ret,
                SemExprKind::Call {
                    func,
                    args: converted,
                },
            )
        }
        CallResolution::Ambiguous(_) => {
            ctx.error(span, SemanticError::AmbiguousCall(name));
            error_expr(ctx, span)
        }
        CallResolution::NoMatch => {
            ctx.error(span, SemanticError::NoMatchingOverload(name));
            error_expr(ctx, span)
        }
    }
}

// ---- inline assembly ---------------------------------------------------

fn const_string(e: &SemExpr) -> Option<StringId> {
    match &e.kind {
        SemExprKind::StringLit(id) => Some(*id),
        SemExprKind::Const(ConstValue::Str(id)) => Some(*id),
        _ => None,
    }
}

fn parse_constraint(s: &str) -> Option<(AsmArgMode, AsmArgKind)> {
    let (mode, rest) = if let Some(rest) = s.strip_prefix('=') {
        (AsmArgMode::Output, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (AsmArgMode::Update, rest)
    } else {
        (AsmArgMode::Input, s)
    };
    let kind = match rest {
        "i" => AsmArgKind::Integer,
        "p" => AsmArgKind::Pointer,
        "m" => AsmArgKind::Memory,
        "f" => AsmArgKind::FrameRelative,
        "s" => AsmArgKind::LocalSize,
        "$" => AsmArgKind::Dollar,
        _ => return None,
    };
    Some((mode, kind))
}

/// Semantic analysis of one inline assembly statement: the template and
/// every constraint must be compile time string constants, outputs must be
/// assignable, and the clobber list must name registers the target knows
/// (or "memory").  The result is the [`AsmCode`] the lowering stage
/// consumes.
fn analyze_asm(
    ctx: &mut CompilationContext,
    fc: &mut FnContext,
    asm: &ast::AsmStatement,
    span: Span,
) -> SemStmtKind {
    if ctx.params.target.inline_asm.is_none() {
        ctx.error(span, SemanticError::AsmNotSupported);
        return SemStmtKind::Expr(error_expr(ctx, span));
    }

    let template_expr = analyze_expr(ctx, fc, &asm.template);
    let template = match const_string(&template_expr) {
        Some(id) => ctx.strings.get(id).unwrap_or_default(),
        None => {
            ctx.error(asm.template.span, SemanticError::AsmTemplateNotConstant);
            return SemStmtKind::Expr(error_expr(ctx, span));
        }
    };

    let mut args = vec![];
    let mut dollar_label = None;
    let mut bad = false;

    for (group_is_output, ops) in [(true, &asm.outputs), (false, &asm.inputs)] {
        for op in ops.iter() {
            let cexpr = analyze_expr(ctx, fc, &op.constraint);
            let ctext = match const_string(&cexpr) {
                Some(id) => ctx.strings.get(id).unwrap_or_default(),
                None => {
                    ctx.error(op.constraint.span, SemanticError::AsmConstraintNotConstant);
                    bad = true;
                    continue;
                }
            };
            let (mode, kind) = match parse_constraint(&ctext) {
                Some(mk) => mk,
                None => {
                    ctx.error(
                        op.constraint.span,
                        SemanticError::AsmInvalidConstraint(ctext),
                    );
                    bad = true;
                    continue;
                }
            };
            if group_is_output != (mode != AsmArgMode::Input) {
                ctx.error(
                    op.constraint.span,
                    SemanticError::AsmInvalidConstraint(ctext),
                );
                bad = true;
                continue;
            }

            let value = analyze_expr(ctx, fc, &op.expr);
            match mode {
                AsmArgMode::Output | AsmArgMode::Update => {
                    if !is_lvalue(&value) || !is_mutable_lvalue(ctx, fc, &value) {
                        ctx.error(op.expr.span, SemanticError::AsmOutputNotLValue);
                        bad = true;
                    }
                }
                AsmArgMode::Input => {
                    // Immediate operands must fold to compile time
                    // constants.
                    if kind == AsmArgKind::Integer
                        && !matches!(value.kind, SemExprKind::Const(_))
                    {
                        ctx.error(op.expr.span, SemanticError::NonConstantExpression);
                        bad = true;
                    }
                }
            }
            if kind == AsmArgKind::FrameRelative
                && !matches!(value.kind, SemExprKind::Local(_))
            {
                ctx.error(op.expr.span, SemanticError::AsmOutputNotLValue);
                bad = true;
            }
            if kind == AsmArgKind::Dollar && dollar_label.is_none() {
                dollar_label = Some(ctx.next_asm_label());
            }

            args.push(AsmArg {
                kind,
                mode,
                name: op.name,
                expr: value,
            });
        }
    }

    let mut regs = 0u64;
    let mut clobbers_memory = false;
    for c in &asm.clobbers {
        let cexpr = analyze_expr(ctx, fc, c);
        let text = match const_string(&cexpr) {
            Some(id) => ctx.strings.get(id).unwrap_or_default(),
            None => {
                ctx.error(c.span, SemanticError::AsmClobberNotConstant);
                bad = true;
                continue;
            }
        };
        if text == "memory" {
            clobbers_memory = true;
        } else if text == "cc" {
            // Condition codes are always considered clobbered.
        } else {
            match ctx.params.target.register_index(&text) {
                Some(i) => regs |= 1 << i,
                None => {
                    ctx.error(c.span, SemanticError::AsmUnknownClobber(text));
                    bad = true;
                }
            }
        }
    }

    if bad {
        return SemStmtKind::Expr(error_expr(ctx, span));
    }

    SemStmtKind::Asm(AsmCode {
        insn_template: template,
        args,
        regs,
        clobbers_memory,
        dollar_label,
    })
}
