//! The multi-pass semantic pipeline.
//!
//! Per module and in strict order: item declaration (building the skeleton
//! symbol table), import resolution, then the three passes; headers,
//! members, bodies; run globally over the whole module set.  A reference to
//! a symbol that has not reached the required pass triggers that symbol's
//! resolution recursively, whatever module it lives in; the per-symbol state
//! machine converts genuine cycles into reported errors.  Work that cannot
//! proceed yet is parked on the deferred queue and drained to a fixpoint
//! after the pass-1 loop.

use std::path::PathBuf;
use std::rc::Rc;

use log::debug;

use crate::compiler::ast::{self, Item, VersionCond};
use crate::compiler::context::{CompilationContext, DeferredItem, FatalError};
use crate::compiler::lexer::Lexer;
use crate::compiler::parser;
use crate::compiler::sym::{
    AggSymbol, AliasSymbol, DeclareError, FuncSymbol, ModuleId, PassId, PassState, Symbol,
    SymbolId, SymbolKind, TemplateArgKey, TemplateDeclKind, TemplateSymbol, VarSymbol,
    Visibility,
};
use crate::compiler::types::{layout, CallConv, FnShape, TypeShape};
use crate::compiler::Span;

use super::const_eval;
use super::error::SemanticError;
use super::expr::{self, FnContext};
use super::resolve::{self, TypeEnv};
use super::template;

/// Bound on full re-drains of the deferred queue.  Exceeding it means the
/// queue is not converging, which is a front end bug, not a user error -
/// reported as an internal error rather than hanging.
const MAX_DEFER_ROUNDS: usize = 100;

/// Whether a `version(...)` condition holds under the active version set.
fn version_active(ctx: &CompilationContext, cond: &VersionCond) -> bool {
    match cond {
        VersionCond::Ident(id) => ctx
            .strings
            .get(*id)
            .map(|s| ctx.versions.ident_active(&s))
            .unwrap_or(false),
        VersionCond::Level(n) => ctx.versions.level_active(*n),
    }
}

/// Creates skeleton symbols for every top-level item of a module,
/// evaluating conditional-compilation blocks as it goes.  Bodies and types
/// stay untouched until the passes run.
pub fn declare_module_items(ctx: &mut CompilationContext, module: ModuleId) {
    let ast = match ctx.modules[module.index()].ast.clone() {
        Some(a) => a,
        None => return,
    };
    let scope = ctx.module_syms[module.index()];
    declare_items(ctx, module, scope, &ast.items);
}

fn declare_items(
    ctx: &mut CompilationContext,
    module: ModuleId,
    scope: SymbolId,
    items: &[Item],
) {
    for item in items {
        match item {
            Item::Func(f) => {
                let kind = if f.template_params.is_empty() {
                    SymbolKind::Function(FuncSymbol {
                        decl: Rc::new(f.clone()),
                        sig: None,
                        linkage: f.linkage,
                        next_overload: None,
                        template_origin: None,
                        bindings: vec![],
                        locals: vec![],
                        body: None,
                    })
                } else {
                    SymbolKind::Template(TemplateSymbol {
                        decl: TemplateDeclKind::Func(Rc::new(f.clone())),
                        params: f.template_params.clone(),
                        instances: Default::default(),
                        next_overload: None,
                    })
                };
                declare_one(ctx, scope, Symbol::new(f.name, f.span, Some(scope), module, kind));
            }
            Item::Struct(s) => {
                let kind = if s.template_params.is_empty() {
                    SymbolKind::Aggregate(AggSymbol {
                        decl: Rc::new(s.clone()),
                        kind: s.kind,
                        fields: vec![],
                        layout: None,
                        template_origin: None,
                        bindings: vec![],
                    })
                } else {
                    SymbolKind::Template(TemplateSymbol {
                        decl: TemplateDeclKind::Struct(Rc::new(s.clone())),
                        params: s.template_params.clone(),
                        instances: Default::default(),
                        next_overload: None,
                    })
                };
                declare_one(ctx, scope, Symbol::new(s.name, s.span, Some(scope), module, kind));
            }
            Item::Static(v) => {
                let kind = SymbolKind::Variable(VarSymbol {
                    decl: Rc::new(v.clone()),
                    ty: None,
                    linkage: v.linkage,
                    init: None,
                });
                declare_one(ctx, scope, Symbol::new(v.name, v.span, Some(scope), module, kind));
            }
            Item::Alias(a) => {
                let kind = SymbolKind::Alias(AliasSymbol {
                    decl: Rc::new(a.clone()),
                    target: None,
                });
                declare_one(ctx, scope, Symbol::new(a.name, a.span, Some(scope), module, kind));
            }
            Item::Import(_) => (),
            Item::Version(v) => {
                if version_active(ctx, &v.cond) {
                    declare_items(ctx, module, scope, &v.then_items);
                } else {
                    declare_items(ctx, module, scope, &v.else_items);
                }
            }
        }
    }
}

fn declare_one(ctx: &mut CompilationContext, scope: SymbolId, sym: Symbol) {
    let name = sym.name;
    let span = sym.span;
    match ctx.symbols.declare(scope, sym) {
        Ok(_) => (),
        Err(DeclareError::Duplicate { .. }) => {
            ctx.error(span, SemanticError::AlreadyDeclared(name));
        }
        Err(DeclareError::NotAScope) => {
            ctx.diagnostics
                .report_internal("declaration into a non-scope symbol".into());
        }
    }
}

/// Resolves a module's imports, loading modules off the lookup path as
/// needed.  With `deep`, the imports of every newly loaded module are
/// resolved as well, so the whole unconditionally-visible import closure is
/// present before pass 1 begins.  A named module that cannot be located is
/// fatal: the unit cannot be type-checked without it.
pub fn resolve_imports(
    ctx: &mut CompilationContext,
    module: ModuleId,
    deep: bool,
) -> Result<(), FatalError> {
    if ctx.modules[module.index()].imports_resolved {
        return Ok(());
    }
    ctx.modules[module.index()].imports_resolved = true;

    let ast = match ctx.modules[module.index()].ast.clone() {
        Some(a) => a,
        None => return Ok(()),
    };

    let mut imports = vec![];
    collect_imports(ctx, &ast.items, &mut imports);

    for imp in imports {
        let target = match ctx.find_module(&imp.path) {
            Some(m) => m,
            None => load_module(ctx, &imp)?,
        };

        let vis = if imp.public {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let scope = ctx.module_syms[module.index()];
        let already = ctx
            .symbols
            .get(scope)
            .as_module()
            .map(|m| m.imports.iter().any(|(t, _)| *t == target))
            .unwrap_or(false);
        if !already {
            ctx.symbols
                .get_mut(scope)
                .as_module_mut()
                .unwrap()
                .imports
                .push((target, vis));
            if ctx.params.deps_file.is_some() {
                ctx.record_dep(module, target, imp.public);
            }
        }

        if deep {
            resolve_imports(ctx, target, deep)?;
        }
    }
    Ok(())
}

fn collect_imports(ctx: &CompilationContext, items: &[Item], out: &mut Vec<ast::ImportDecl>) {
    for item in items {
        match item {
            Item::Import(i) => out.push(i.clone()),
            Item::Version(v) => {
                if version_active(ctx, &v.cond) {
                    collect_imports(ctx, &v.then_items, out);
                } else {
                    collect_imports(ctx, &v.else_items, out);
                }
            }
            _ => (),
        }
    }
}

/// Reads, lexes, and parses a module named by an import, registering it in
/// the context.  Lex and parse errors inside the loaded module are ordinary
/// recoverable errors; an unlocatable module is fatal.
fn load_module(
    ctx: &mut CompilationContext,
    imp: &ast::ImportDecl,
) -> Result<ModuleId, FatalError> {
    let dotted: Vec<String> = imp
        .path
        .iter()
        .filter_map(|p| ctx.strings.get(*p).ok())
        .collect();
    let display = dotted.join(".");

    let file = ctx
        .locate_module_file(&imp.path)
        .ok_or_else(|| FatalError::UnresolvedImport(display.clone()))?;
    debug!("import    {} ({})", display, file.display());

    let text = std::fs::read_to_string(&file)
        .map_err(|e| FatalError::Unreadable(file.clone(), format!("{}", e)))?;
    let id = ctx.add_module(imp.path.clone(), file, false);
    parse_into_module(ctx, id, text);
    declare_module_items(ctx, id);
    Ok(id)
}

/// Lexes and parses text into an already registered module, reporting any
/// errors through the sink.
pub fn parse_into_module(ctx: &mut CompilationContext, module: ModuleId, text: String) {
    let file: PathBuf = ctx.modules[module.index()].file.clone();
    let file_span = ctx.source_map.add(file, text.clone());

    let mut tokens = vec![];
    for t in Lexer::new(&text, file_span.low(), &ctx.strings).tokenize() {
        match t {
            Ok(tok) => tokens.push(tok),
            Err(e) => ctx.diagnostics.report(e, &ctx.source_map, &ctx.strings),
        }
    }

    match parser::parse_module(&tokens, file_span, &ctx.strings) {
        Ok(ast) => ctx.modules[module.index()].ast = Some(Rc::new(ast)),
        Err(e) => {
            ctx.diagnostics.report(e, &ctx.source_map, &ctx.strings);
            ctx.modules[module.index()].ast = Some(Rc::new(ast::SourceModule {
                span: file_span,
                name: None,
                items: vec![],
            }));
        }
    }
}

// ---- pass drivers -----------------------------------------------------

fn module_decls(ctx: &CompilationContext, module: ModuleId) -> Vec<SymbolId> {
    ctx.symbols
        .get(ctx.module_syms[module.index()])
        .as_module()
        .map(|m| m.decls.clone())
        .unwrap_or_default()
}

pub fn pass1_module(ctx: &mut CompilationContext, module: ModuleId) {
    ctx.current_pass = 1;
    for sym in module_decls(ctx, module) {
        ensure_pass1(ctx, sym);
    }
}

pub fn pass2_module(ctx: &mut CompilationContext, module: ModuleId) {
    ctx.current_pass = 2;
    for sym in module_decls(ctx, module) {
        ensure_pass2(ctx, sym);
    }
}

pub fn pass3_module(ctx: &mut CompilationContext, module: ModuleId) {
    ctx.current_pass = 3;
    for sym in module_decls(ctx, module) {
        ensure_pass3(ctx, sym);
    }
}

/// Drains the deferred queue to a fixpoint.  Re-entrant pushes during the
/// drain are normal; the queue is drained repeatedly until a full round adds
/// nothing, with an iteration bound converting a wedged queue into a
/// reported internal error rather than a hang.
pub fn run_deferred(ctx: &mut CompilationContext) {
    let mut rounds = 0;
    while !ctx.deferred.is_empty() {
        rounds += 1;
        if rounds > MAX_DEFER_ROUNDS {
            let pending = ctx.deferred.len();
            ctx.error(Span::zero(), SemanticError::DeferredQueueStuck(pending));
            ctx.deferred.clear();
            break;
        }
        let n = ctx.deferred.len();
        for _ in 0..n {
            match ctx.deferred.pop_front() {
                Some(DeferredItem::Pass1(sym)) => ensure_pass1(ctx, sym),
                Some(DeferredItem::Instantiate {
                    template,
                    args,
                    site_module,
                    site_span,
                }) => {
                    let inst = template::instantiate(ctx, template, args, site_module, site_span);
                    ensure_pass1(ctx, inst);
                }
                None => break,
            }
        }
    }
}

// ---- per-symbol state machines ----------------------------------------

fn enter(ctx: &mut CompilationContext, sym: SymbolId, pass: PassId) -> bool {
    match ctx.symbols.pass_state(sym, pass) {
        PassState::Resolved => false,
        PassState::InProgress => {
            // Re-entering a pass that is already running on this symbol is
            // the circular dependency signal.
            let (name, span) = {
                let s = ctx.symbols.get(sym);
                (s.name, s.span)
            };
            match pass {
                PassId::Two => ctx.error(span, SemanticError::RecursiveValueType(name)),
                _ => ctx.error(span, SemanticError::CircularDependency(name)),
            }
            poison(ctx, sym);
            ctx.symbols.set_pass_state(sym, pass, PassState::Resolved);
            false
        }
        PassState::Unresolved => {
            ctx.symbols.set_pass_state(sym, pass, PassState::InProgress);
            true
        }
    }
}

/// Replaces the symbol's unresolved pieces with error placeholders so later
/// passes never see a missing type.
fn poison(ctx: &mut CompilationContext, sym: SymbolId) {
    let err_ty = ctx.types.error_type();
    match &mut ctx.symbols.get_mut(sym).kind {
        SymbolKind::Variable(v) => {
            if v.ty.is_none() {
                v.ty = Some(err_ty);
            }
        }
        SymbolKind::Aggregate(a) => {
            if a.layout.is_none() {
                a.layout = Some(layout::AggLayout {
                    size: 0,
                    align: 1,
                    offsets: a.fields.iter().map(|_| 0).collect(),
                });
            }
        }
        _ => (),
    }
}

fn env_for(ctx: &CompilationContext, sym: SymbolId) -> TypeEnv {
    let s = ctx.symbols.get(sym);
    let bindings: Vec<(crate::StringId, TemplateArgKey)> = match &s.kind {
        SymbolKind::Function(f) => f.bindings.clone(),
        SymbolKind::Aggregate(a) => a.bindings.clone(),
        _ => vec![],
    };
    let mut env = TypeEnv::new(s.module);
    env.bindings = bindings.into_iter().collect();
    env
}

/// Pass 1: resolve the symbol's header; its type or signature.
pub fn ensure_pass1(ctx: &mut CompilationContext, sym: SymbolId) {
    if !enter(ctx, sym, PassId::One) {
        return;
    }
    let env = env_for(ctx, sym);

    match &ctx.symbols.get(sym).kind {
        SymbolKind::Function(_) => {
            let decl = ctx.symbols.get(sym).as_function().unwrap().decl.clone();
            let params: Vec<_> = decl
                .params
                .iter()
                .map(|p| resolve::resolve_type_expr(ctx, &env, &p.ty))
                .collect();
            let ret = match &decl.ret {
                Some(te) => Some(resolve::resolve_type_expr(ctx, &env, te)),
                None if decl.body.is_none() => {
                    Some(ctx.types.basic(crate::compiler::types::BasicKind::Void))
                }
                // Inferred from the body during pass 3.
                None => None,
            };
            if let Some(ret) = ret {
                let conv = match decl.linkage {
                    ast::Linkage::Native => CallConv::Native,
                    _ => CallConv::Foreign,
                };
                let sig = ctx.types.canonicalize(TypeShape::Function(FnShape {
                    params,
                    ret,
                    conv,
                    variadic: decl.is_variadic,
                }));
                ctx.symbols.get_mut(sym).as_function_mut().unwrap().sig = Some(sig);
            }
        }
        SymbolKind::Aggregate(_) => {
            let decl = ctx.symbols.get(sym).as_aggregate().unwrap().decl.clone();
            let fields: Vec<_> = decl
                .fields
                .iter()
                .map(|f| {
                    let ty = resolve::resolve_type_expr(ctx, &env, &f.ty);
                    crate::compiler::sym::FieldInfo {
                        name: f.name,
                        span: f.span,
                        ty,
                        align: f.align,
                        default: None,
                    }
                })
                .collect();
            ctx.symbols.get_mut(sym).as_aggregate_mut().unwrap().fields = fields;
        }
        SymbolKind::Variable(_) => {
            let decl = ctx.symbols.get(sym).as_variable().unwrap().decl.clone();
            let ty = resolve::resolve_type_expr(ctx, &env, &decl.ty);
            ctx.symbols.get_mut(sym).as_variable_mut().unwrap().ty = Some(ty);
        }
        SymbolKind::Alias(_) => {
            let decl = ctx.symbols.get(sym).as_alias().unwrap().decl.clone();
            let target = resolve::resolve_type_expr(ctx, &env, &decl.target);
            match &mut ctx.symbols.get_mut(sym).kind {
                SymbolKind::Alias(a) => a.target = Some(target),
                _ => unreachable!(),
            }
        }
        SymbolKind::Template(_) | SymbolKind::Module(_) | SymbolKind::Error => (),
    }

    ctx.symbols
        .set_pass_state(sym, PassId::One, PassState::Resolved);
}

/// Pass 2: member semantics; aggregate layout and static initializers.
pub fn ensure_pass2(ctx: &mut CompilationContext, sym: SymbolId) {
    ensure_pass1(ctx, sym);
    if !enter(ctx, sym, PassId::Two) {
        return;
    }

    match &ctx.symbols.get(sym).kind {
        SymbolKind::Aggregate(_) => resolve_aggregate_layout(ctx, sym),
        SymbolKind::Variable(_) => resolve_static_init(ctx, sym),
        _ => (),
    }

    ctx.symbols
        .set_pass_state(sym, PassId::Two, PassState::Resolved);
}

fn resolve_aggregate_layout(ctx: &mut CompilationContext, sym: SymbolId) {
    let (agg_kind, fields, decl) = {
        let a = ctx.symbols.get(sym).as_aggregate().unwrap();
        (a.kind, a.fields.clone(), a.decl.clone())
    };

    // Field types that are themselves unlaid-out aggregates are resolved
    // first; the state machine turns a by-value cycle into an error.
    let field_tys: Vec<_> = fields.iter().map(|f| (f.ty, f.align)).collect();
    let mut guard = 0;
    let computed = loop {
        match layout::layout_fields(&ctx.types, &ctx.symbols, agg_kind, &field_tys) {
            Ok(l) => break Some(l),
            Err(layout::LayoutError::Unresolved(dep)) => {
                guard += 1;
                if guard > field_tys.len() + 1 {
                    break None;
                }
                ensure_pass2(ctx, dep);
            }
            Err(layout::LayoutError::Opaque(ty)) => {
                let span = ctx.symbols.get(sym).span;
                ctx.error(span, SemanticError::TypeHasNoSize(ctx.type_name(ty)));
                break None;
            }
        }
    };

    match computed {
        Some(l) => ctx.symbols.get_mut(sym).as_aggregate_mut().unwrap().layout = Some(l),
        None => poison(ctx, sym),
    }

    // Declared field default initializers must be compile time constants;
    // they feed static initializer encoding.
    let env = env_for(ctx, sym);
    for (i, fdecl) in decl.fields.iter().enumerate() {
        if let Some(init) = &fdecl.init {
            let mut fc = FnContext::new(env.clone(), sym, vec![], None);
            fc.scopes.enter_scope();
            let value = expr::analyze_expr(ctx, &mut fc, init);
            match const_eval::fold(ctx, &value) {
                Some(v) => {
                    let agg = ctx.symbols.get_mut(sym).as_aggregate_mut().unwrap();
                    if let Some(f) = agg.fields.get_mut(i) {
                        f.default = Some(v);
                    }
                }
                None => ctx.error(init.span, SemanticError::NonConstantExpression),
            }
        }
    }
}

fn resolve_static_init(ctx: &mut CompilationContext, sym: SymbolId) {
    let decl = ctx.symbols.get(sym).as_variable().unwrap().decl.clone();
    let env = env_for(ctx, sym);
    if let Some(init) = &decl.init {
        let declared = ctx.symbols.get(sym).as_variable().unwrap().ty;
        let mut fc = FnContext::new(env, sym, vec![], None);
        fc.scopes.enter_scope();
        let value = expr::analyze_expr(ctx, &mut fc, init);
        if let Some(want) = declared {
            if !ctx.types.is_error(want)
                && !ctx.types.is_error(value.ty)
                && ctx.types.unqualified(want) != ctx.types.unqualified(value.ty)
                && !super::overload::implicit_converts(ctx, want, value.ty)
            {
                ctx.error(
                    init.span,
                    SemanticError::BindMismatch(ctx.type_name(want), ctx.type_name(value.ty)),
                );
                return;
            }
        }
        match const_eval::fold(ctx, &value) {
            Some(v) => {
                ctx.symbols.get_mut(sym).as_variable_mut().unwrap().init = Some(v);
            }
            None => ctx.error(init.span, SemanticError::NonConstantExpression),
        }
    }
}

/// Pass 3: function body semantics.
pub fn ensure_pass3(ctx: &mut CompilationContext, sym: SymbolId) {
    ensure_pass1(ctx, sym);
    if !enter(ctx, sym, PassId::Three) {
        return;
    }

    if let SymbolKind::Function(_) = ctx.symbols.get(sym).kind {
        analyze_function_body(ctx, sym);
    }

    ctx.symbols
        .set_pass_state(sym, PassId::Three, PassState::Resolved);
}

fn analyze_function_body(ctx: &mut CompilationContext, sym: SymbolId) {
    let decl = ctx.symbols.get(sym).as_function().unwrap().decl.clone();
    let body_ast = match &decl.body {
        Some(b) => b.clone(),
        None => return,
    };
    let env = env_for(ctx, sym);

    // Parameter types come from the resolved signature when pass 1 built
    // one, so errors there are not re-reported.
    let param_tys: Vec<_> = match ctx
        .symbols
        .get(sym)
        .as_function()
        .and_then(|f| f.sig)
        .map(|s| ctx.types.shape(s))
    {
        Some(TypeShape::Function(shape)) => shape.params,
        _ => decl
            .params
            .iter()
            .map(|p| resolve::resolve_type_expr(ctx, &env, &p.ty))
            .collect(),
    };
    let params: Vec<_> = decl
        .params
        .iter()
        .map(|p| p.name)
        .zip(param_tys.iter().copied())
        .collect();

    let declared_ret = match ctx
        .symbols
        .get(sym)
        .as_function()
        .and_then(|f| f.sig)
        .map(|s| ctx.types.shape(s))
    {
        Some(TypeShape::Function(shape)) => Some(shape.ret),
        _ => None,
    };

    let mut fc = FnContext::new(env, sym, params.clone(), declared_ret);
    collect_labels_into(&body_ast, &mut fc);
    let block = expr::analyze_block(ctx, &mut fc, &body_ast);

    // Inferred-return-type functions get their final signature now.
    let ret = fc
        .ret_ty
        .unwrap_or_else(|| ctx.types.basic(crate::compiler::types::BasicKind::Void));
    if declared_ret.is_none() {
        let conv = match decl.linkage {
            ast::Linkage::Native => CallConv::Native,
            _ => CallConv::Foreign,
        };
        let sig = ctx.types.canonicalize(TypeShape::Function(FnShape {
            params: param_tys,
            ret,
            conv,
            variadic: decl.is_variadic,
        }));
        ctx.symbols.get_mut(sym).as_function_mut().unwrap().sig = Some(sig);
    }

    let locals = std::mem::take(&mut fc.locals);
    let f = ctx.symbols.get_mut(sym).as_function_mut().unwrap();
    f.locals = locals;
    f.body = Some(block);
}

fn collect_labels_into(stmts: &[ast::Statement], fc: &mut FnContext) {
    let mut labels = vec![];
    expr::collect_labels(stmts, &mut labels);
    fc.labels = labels;
}
