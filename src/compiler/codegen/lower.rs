//! Translation of semantically resolved declarations into backend trees.
//!
//! One [`BackendUnit`] per emitted module.  Statics are declared first (so
//! initializers can take each other's addresses), then their initializers
//! are encoded, then every function body is lowered.  The typed trees from
//! pass 3 carry all resolution; this stage only maps them onto the
//! backend's vocabulary, preserving sizes, offsets, and external names
//! exactly.
//!
//! Lowering errors are recoverable: report, emit a zero placeholder, keep
//! going.  The nonzero error count suppresses the object file at end of
//! run, so a placeholder never reaches a linker.

use std::collections::HashMap;

use log::debug;

use crate::compiler::ast::{BinaryOperator, Linkage, UnaryOperator};
use crate::compiler::backend::{
    BackendUnit, BlockInfo, DataDef, DtList, FuncDef, LabelId, Tree, TreeOp, TreeUnOp,
};
use crate::compiler::context::{BoundsCheck, CompilationContext, EmitTemplates};
use crate::compiler::semantics::tree::{
    ConstValue, SemBlock, SemExpr, SemExprKind, SemStmt, SemStmtKind,
};
use crate::compiler::sym::{LocalDef, ModuleId, SymbolId};
use crate::compiler::types::{layout, TypeId, TypeShape};
use crate::compiler::{CompilerError, Span};
use crate::StringId;

use super::asm_lower;
use super::dt::{self, DataMap};
use super::error::LowerError;
use super::mangle;

/// Lowers one module into the backend unit.
pub fn lower_module(ctx: &CompilationContext, unit: &mut BackendUnit, module: ModuleId) {
    let decls = ctx
        .symbols
        .get(ctx.module_syms[module.index()])
        .as_module()
        .map(|m| m.decls.clone())
        .unwrap_or_default();

    // Declare every defined static first so initializers can reference one
    // another by address.
    let mut globals: DataMap = HashMap::new();
    for &sym in &decls {
        if let Some(v) = ctx.symbols.get(sym).as_variable() {
            let defined = v.linkage == Linkage::Native || v.decl.init.is_some();
            if !defined {
                continue;
            }
            let name = report_or(ctx, ctx.symbols.get(sym).span, mangle::mangled_name(ctx, sym));
            let data = unit.define_data(DataDef {
                name,
                readonly: !v.decl.mutable,
                external: true,
                dt: DtList::new(),
            });
            globals.insert(sym, data);
        }
    }

    // Encode initializers.
    for &sym in &decls {
        if let Some(&data) = globals.get(&sym) {
            let v = ctx.symbols.get(sym).as_variable().unwrap();
            let ty = v.ty.unwrap_or_else(|| ctx.types.error_type());
            let span = ctx.symbols.get(sym).span;
            let encoded = match &v.init {
                Some(value) => dt::const_to_dt(ctx, unit, &globals, value, ty),
                None => dt::default_to_dt(ctx, unit, &globals, ty),
            };
            let dtl = match encoded {
                Ok(dtl) => dtl,
                Err(e) => {
                    report(ctx, span, e);
                    let mut zeros = DtList::new();
                    zeros.push_zeros(size_or_zero(ctx, ty).0);
                    zeros
                }
            };
            unit.set_data_init(data, dtl);
        }
    }

    // Lower function bodies.
    for &sym in &decls {
        if let Some(f) = ctx.symbols.get(sym).as_function() {
            if f.body.is_none() {
                continue;
            }
            if f.template_origin.is_some()
                && ctx.params.emit_templates == EmitTemplates::None
            {
                continue;
            }
            lower_function(ctx, unit, &globals, sym);
        }
    }
}

fn report(ctx: &CompilationContext, span: Span, e: LowerError) {
    ctx.diagnostics
        .report(CompilerError::new(span, e), &ctx.source_map, &ctx.strings);
}

fn report_or(ctx: &CompilationContext, span: Span, r: Result<String, LowerError>) -> String {
    match r {
        Ok(s) => s,
        Err(e) => {
            report(ctx, span, e);
            // Placeholder name; emission is suppressed anyway once the
            // error counter is nonzero.
            "<mangling-error>".into()
        }
    }
}

fn size_or_zero(ctx: &CompilationContext, ty: TypeId) -> (u64, u64) {
    layout::size_of(&ctx.types, &ctx.symbols, ty).unwrap_or((0, 1))
}

struct FuncLowering<'a> {
    ctx: &'a CompilationContext,
    unit: &'a mut BackendUnit,
    globals: &'a DataMap,
    locals: &'a [LocalDef],
    bindings: super::bindings::Bindings,
    labels: HashMap<StringId, LabelId>,
    /// Filled when the function's outermost binding level pops.
    routine_scopes: Option<BlockInfo>,
}

fn lower_function(
    ctx: &CompilationContext,
    unit: &mut BackendUnit,
    globals: &DataMap,
    sym: SymbolId,
) {
    let f = ctx.symbols.get(sym).as_function().unwrap();
    let body = f.body.as_ref().unwrap();
    let span = ctx.symbols.get(sym).span;
    let name = report_or(ctx, span, mangle::mangled_name(ctx, sym));
    debug!("lower fn {}", name);

    let mut fl = FuncLowering {
        ctx,
        unit: &mut *unit,
        globals,
        locals: &f.locals,
        bindings: super::bindings::Bindings::new(),
        labels: HashMap::new(),
        routine_scopes: None,
    };
    collect_label_ids(&mut fl, body);

    fl.bindings.init();
    let body_tree = fl.lower_block(body);
    debug_assert!(fl.bindings.global_bindings_p());

    // The outermost scope was popped by lower_block and attached nowhere;
    // rebuild the routine body record from the tree's block id.
    let debug_scopes = fl.take_routine_scopes();

    unit.define_function(FuncDef {
        name,
        param_count: f.decl.params.len() as u32,
        local_count: f.locals.len() as u32,
        body: body_tree,
        debug_scopes,
    });
}

fn collect_label_ids(fl: &mut FuncLowering, block: &SemBlock) {
    for s in &block.stmts {
        match &s.kind {
            SemStmtKind::Label(name) => {
                let id = fl.unit.new_label();
                fl.labels.insert(*name, id);
            }
            SemStmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                collect_label_ids(fl, then_block);
                collect_label_ids(fl, else_block);
            }
            SemStmtKind::While { body, .. } => collect_label_ids(fl, body),
            SemStmtKind::Block(b) => collect_label_ids(fl, b),
            _ => (),
        }
    }
}

impl<'a> FuncLowering<'a> {
    fn take_routine_scopes(&mut self) -> Option<BlockInfo> {
        self.routine_scopes.take()
    }

    fn lower_block(&mut self, block: &SemBlock) -> Tree {
        let id = self.unit.new_block();
        self.bindings.push_level();
        self.bindings.set_block(id);

        let mut body = vec![];
        for s in &block.stmts {
            self.lower_stmt(s, &mut body);
        }

        let routine_body = self.bindings.depth() == 2;
        let info = self
            .bindings
            .pop_level(true, true, routine_body, || id);
        if routine_body {
            self.routine_scopes = info;
        }

        Tree::Scope { block: id, body }
    }

    fn lower_stmt(&mut self, s: &SemStmt, out: &mut Vec<Tree>) {
        match &s.kind {
            SemStmtKind::Let { local, init } => {
                let def = &self.locals[local.index()];
                if let Ok(name) = self.ctx.strings.get(def.name) {
                    self.bindings.push_decl(name);
                }
                let value = self.lower_expr(init);
                out.push(Tree::Assign {
                    dst: Box::new(Tree::Local(local.0)),
                    src: Box::new(value),
                });
            }
            SemStmtKind::Assign { lhs, rhs } => {
                let dst = self.lower_expr(lhs);
                let src = self.lower_expr(rhs);
                out.push(Tree::Assign {
                    dst: Box::new(dst),
                    src: Box::new(src),
                });
            }
            SemStmtKind::Expr(e) => out.push(self.lower_expr(e)),
            SemStmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.lower_expr(cond);
                let then_body = self.lower_block(then_block);
                let else_body = self.lower_block(else_block);
                out.push(Tree::If {
                    cond: Box::new(cond),
                    then_body: Box::new(then_body),
                    else_body: Box::new(else_body),
                });
            }
            SemStmtKind::While { cond, body } => {
                let cond = self.lower_expr(cond);
                let body = self.lower_block(body);
                out.push(Tree::Loop {
                    cond: Box::new(cond),
                    body: Box::new(body),
                });
            }
            SemStmtKind::Return(value) => {
                let value = value.as_ref().map(|v| Box::new(self.lower_expr(v)));
                out.push(Tree::Return(value));
            }
            SemStmtKind::Block(b) => {
                let t = self.lower_block(b);
                out.push(t);
            }
            SemStmtKind::Label(name) => {
                if let Some(id) = self.labels.get(name) {
                    out.push(Tree::Label(*id));
                }
            }
            SemStmtKind::Goto(name) => {
                if let Some(id) = self.labels.get(name) {
                    out.push(Tree::Goto(*id));
                }
            }
            SemStmtKind::Asm(code) => {
                let operand_trees: Vec<Tree> =
                    code.args.iter().map(|a| self.lower_expr(&a.expr)).collect();
                asm_lower::lower_asm(self.ctx, self.unit, code, operand_trees, out);
            }
        }
    }

    fn lower_expr(&mut self, e: &SemExpr) -> Tree {
        let ctx = self.ctx;
        match &e.kind {
            SemExprKind::Const(v) => self.lower_const(v, e.ty, e.span),
            SemExprKind::StringLit(id) => {
                let (data, _) = dt::pool_string(ctx, self.unit, *id);
                Tree::DataRef(data)
            }
            SemExprKind::Local(l) => Tree::Local(l.0),
            SemExprKind::Param(i) => Tree::Param(*i),
            SemExprKind::Global(sym) => self.global_ref(*sym, e.span),
            SemExprKind::Binary(op, l, r) => {
                let lhs = self.lower_expr(l);
                let rhs = self.lower_expr(r);
                Tree::Binary {
                    op: tree_op(*op),
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            SemExprKind::Unary(op, inner) => {
                let value = self.lower_expr(inner);
                let op = match op {
                    UnaryOperator::Negate => TreeUnOp::Neg,
                    UnaryOperator::Not => TreeUnOp::Not,
                    UnaryOperator::BNot => TreeUnOp::BitNot,
                    // Resolved to dedicated nodes during analysis; kept for
                    // completeness.
                    UnaryOperator::AddressOf => {
                        return Tree::AddrOf(Box::new(value));
                    }
                    UnaryOperator::Deref => {
                        let (bytes, _) = size_or_zero(ctx, e.ty);
                        return Tree::Deref {
                            ptr: Box::new(value),
                            bytes,
                        };
                    }
                };
                Tree::Unary {
                    op,
                    value: Box::new(value),
                }
            }
            SemExprKind::Convert(inner) | SemExprKind::Cast(inner) => {
                let value = self.lower_expr(inner);
                let (bytes, signed, float) = scalar_info(ctx, e.ty);
                Tree::Convert {
                    value: Box::new(value),
                    bytes,
                    signed,
                    float,
                }
            }
            SemExprKind::Call { func, args } => {
                let callee = report_or(ctx, e.span, mangle::mangled_name(ctx, *func));
                let args = args.iter().map(|a| self.lower_expr(a)).collect();
                Tree::Call { callee, args }
            }
            SemExprKind::Field { base, field_index } => self.lower_field(e, base, *field_index),
            SemExprKind::Index { base, index } => self.lower_index(e, base, index),
            SemExprKind::AddrOf(inner) => {
                let value = self.lower_expr(inner);
                Tree::AddrOf(Box::new(value))
            }
            SemExprKind::Deref(inner) => {
                let value = self.lower_expr(inner);
                let (bytes, _) = size_or_zero(ctx, e.ty);
                Tree::Deref {
                    ptr: Box::new(value),
                    bytes,
                }
            }
            SemExprKind::StructLit { agg, inits } => {
                let agg_layout = ctx.symbols.agg_layout(*agg).cloned();
                let (bytes, offsets) = match agg_layout {
                    Some(l) => (l.size, l.offsets),
                    None => (0, vec![]),
                };
                let elems = inits
                    .iter()
                    .map(|(index, value)| {
                        let offset = offsets.get(*index).copied().unwrap_or(0);
                        (offset, self.lower_expr(value))
                    })
                    .collect();
                Tree::Constructor { elems, bytes }
            }
            SemExprKind::ArrayLit(elems) => {
                let elem_bytes = match ctx.types.shape(ctx.types.unqualified(e.ty)) {
                    TypeShape::SArray(t, _) => size_or_zero(ctx, t).0,
                    _ => 0,
                };
                let lowered = elems
                    .iter()
                    .enumerate()
                    .map(|(i, el)| (i as u64 * elem_bytes, self.lower_expr(el)))
                    .collect();
                Tree::Constructor {
                    elems: lowered,
                    bytes: elem_bytes * elems.len() as u64,
                }
            }
            // The zero/error placeholder: semantic analysis already
            // reported, lowering keeps the unit going.
            SemExprKind::Error => Tree::IntCst { value: 0, bytes: 4 },
        }
    }

    fn lower_const(&mut self, v: &ConstValue, ty: TypeId, span: Span) -> Tree {
        let ctx = self.ctx;
        match v {
            ConstValue::Int(i) => {
                let (bytes, _, _) = scalar_info(ctx, ty);
                Tree::IntCst {
                    value: *i,
                    bytes,
                }
            }
            ConstValue::Bool(b) => Tree::IntCst {
                value: *b as i128,
                bytes: 1,
            },
            ConstValue::Real(r) => {
                let (bytes, _, _) = scalar_info(ctx, ty);
                Tree::RealCst { value: *r, bytes }
            }
            ConstValue::Null => Tree::IntCst {
                value: 0,
                bytes: ctx.types.target().ptr_size as u8,
            },
            ConstValue::Str(id) => {
                let (data, _) = dt::pool_string(ctx, self.unit, *id);
                Tree::DataRef(data)
            }
            ConstValue::SymAddr(sym) => {
                let base = self.global_ref(*sym, span);
                Tree::AddrOf(Box::new(base))
            }
            // Constant aggregates are hoisted into read-only data and
            // referenced, never rebuilt element by element at run time.
            ConstValue::Array(_) | ConstValue::Struct(_, _) => {
                match dt::const_to_dt(ctx, self.unit, self.globals, v, ty) {
                    Ok(dtl) => {
                        let data = self.unit.define_private_rodata(dtl);
                        Tree::DataRef(data)
                    }
                    Err(err) => {
                        report(ctx, span, err);
                        Tree::IntCst { value: 0, bytes: 4 }
                    }
                }
            }
        }
    }

    fn global_ref(&mut self, sym: SymbolId, span: Span) -> Tree {
        match self.globals.get(&sym) {
            Some(data) => Tree::DataRef(*data),
            None => {
                let name = report_or(self.ctx, span, mangle::mangled_name(self.ctx, sym));
                Tree::SymRef(name)
            }
        }
    }

    fn lower_field(&mut self, e: &SemExpr, base: &SemExpr, field_index: usize) -> Tree {
        let ctx = self.ctx;
        let base_tree = self.lower_expr(base);
        let (bytes, _) = size_or_zero(ctx, e.ty);

        // The built-in length field of a dynamic array lives at offset 0
        // of the length+pointer pair.
        if field_index == usize::MAX {
            return Tree::FieldRef {
                base: Box::new(base_tree),
                offset: 0,
                bytes: ctx.types.target().ptr_size,
            };
        }

        let offset = match ctx.types.shape(ctx.types.unqualified(base.ty)) {
            TypeShape::Aggregate(agg) => ctx
                .symbols
                .agg_layout(agg)
                .and_then(|l| l.offsets.get(field_index).copied())
                .unwrap_or(0),
            _ => 0,
        };
        Tree::FieldRef {
            base: Box::new(base_tree),
            offset,
            bytes,
        }
    }

    fn lower_index(&mut self, e: &SemExpr, base: &SemExpr, index: &SemExpr) -> Tree {
        let ctx = self.ctx;
        let elem_bytes = size_or_zero(ctx, e.ty).0;
        let base_tree = self.lower_expr(base);
        let index_tree = self.lower_expr(index);

        let limit = if ctx.params.bounds_check != BoundsCheck::Off {
            match ctx.types.shape(ctx.types.unqualified(base.ty)) {
                TypeShape::SArray(_, dim) => Some(Tree::IntCst {
                    value: dim as i128,
                    bytes: 8,
                }),
                TypeShape::DArray(_) => Some(Tree::FieldRef {
                    base: Box::new(base_tree.clone()),
                    offset: 0,
                    bytes: ctx.types.target().ptr_size,
                }),
                _ => None,
            }
        } else {
            None
        };

        let index_ref = Tree::IndexRef {
            base: Box::new(base_tree),
            index: Box::new(index_tree.clone()),
            elem_bytes,
        };
        match limit {
            Some(limit) => Tree::Seq(vec![
                Tree::BoundsCheck {
                    index: Box::new(index_tree),
                    limit: Box::new(limit),
                },
                index_ref,
            ]),
            None => index_ref,
        }
    }
}

fn scalar_info(ctx: &CompilationContext, ty: TypeId) -> (u8, bool, bool) {
    match ctx.types.shape(ctx.types.unqualified(ty)) {
        TypeShape::Basic(kind) => (kind.size() as u8, kind.is_signed(), kind.is_float()),
        _ => (ctx.types.target().ptr_size as u8, false, false),
    }
}

fn tree_op(op: BinaryOperator) -> TreeOp {
    match op {
        BinaryOperator::Add => TreeOp::Add,
        BinaryOperator::Sub => TreeOp::Sub,
        BinaryOperator::Mul => TreeOp::Mul,
        BinaryOperator::Div => TreeOp::Div,
        BinaryOperator::Rem => TreeOp::Rem,
        BinaryOperator::BAnd => TreeOp::And,
        BinaryOperator::BOr => TreeOp::Or,
        BinaryOperator::BXor => TreeOp::Xor,
        BinaryOperator::Shl => TreeOp::Shl,
        BinaryOperator::Shr => TreeOp::Shr,
        BinaryOperator::And => TreeOp::LogAnd,
        BinaryOperator::Or => TreeOp::LogOr,
        BinaryOperator::Eq => TreeOp::Eq,
        BinaryOperator::NEq => TreeOp::Ne,
        BinaryOperator::Ls => TreeOp::Lt,
        BinaryOperator::LsEq => TreeOp::Le,
        BinaryOperator::Gr => TreeOp::Gt,
        BinaryOperator::GrEq => TreeOp::Ge,
    }
}
