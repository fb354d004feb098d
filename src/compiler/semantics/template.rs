//! Template instantiation.
//!
//! Instantiating a template clones its declaration AST, binds the template
//! parameters to the supplied arguments, and runs the semantic passes over
//! the clone in the context of the *instantiating* module; the instance is
//! recorded there so that private template emission lands in the right
//! object file.  Instantiation is memoized by the argument tuple: the same
//! template instantiated twice with structurally equal arguments yields the
//! identical symbol, and no duplicate code is generated.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::compiler::ast::{self, TemplateParam, TypeExpr, TypeExprKind};
use crate::compiler::context::{CompilationContext, DeferredItem};
use crate::compiler::sym::{
    AggSymbol, FuncSymbol, InstanceKey, ModuleId, PassId, PassState, Symbol, SymbolId, SymbolKind,
    TemplateArgKey, TemplateDeclKind,
};
use crate::compiler::types::{TypeId, TypeShape};
use crate::compiler::Span;
use crate::StringId;

use super::error::SemanticError;
use super::passes::{ensure_pass1, ensure_pass2, ensure_pass3};

/// Result of selecting one template from a same-name chain.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateSelection {
    Chosen(SymbolId),
    Ambiguous(Vec<SymbolId>),
    NoMatch,
}

/// Picks the template in `set` whose parameter patterns best match `args`,
/// preferring more specialized candidates: a candidate scores one point per
/// specialization pattern its arguments satisfy, and the highest score wins.
/// Ties between distinct candidates are ambiguous.
pub fn select_template(
    ctx: &mut CompilationContext,
    set: &[SymbolId],
    args: &[TemplateArgKey],
) -> TemplateSelection {
    let mut best: Option<(usize, Vec<SymbolId>)> = None;

    for &candidate in set {
        let params = match ctx.symbols.get(candidate).as_template() {
            Some(t) => t.params.clone(),
            None => continue,
        };
        if params.len() != args.len() {
            continue;
        }

        let score = match specialization_score(ctx, candidate, &params, args) {
            Some(s) => s,
            None => continue,
        };

        match &mut best {
            None => best = Some((score, vec![candidate])),
            Some((best_score, tied)) => {
                if score > *best_score {
                    *best_score = score;
                    tied.clear();
                    tied.push(candidate);
                } else if score == *best_score {
                    tied.push(candidate);
                }
            }
        }
    }

    match best {
        None => TemplateSelection::NoMatch,
        Some((_, tied)) if tied.len() == 1 => TemplateSelection::Chosen(tied[0]),
        Some((_, tied)) => TemplateSelection::Ambiguous(tied),
    }
}

/// Specialization score of one candidate against an argument tuple; used by
/// call sites that deduce arguments per candidate.
pub fn score_candidate(
    ctx: &mut CompilationContext,
    template: SymbolId,
    args: &[TemplateArgKey],
) -> Option<usize> {
    let params = ctx.symbols.get(template).as_template()?.params.clone();
    if params.len() != args.len() {
        return None;
    }
    specialization_score(ctx, template, &params, args)
}

/// Number of satisfied specialization patterns, or `None` when some pattern
/// rejects its argument.
fn specialization_score(
    ctx: &mut CompilationContext,
    template: SymbolId,
    params: &[TemplateParam],
    args: &[TemplateArgKey],
) -> Option<usize> {
    let param_names: Vec<StringId> = params.iter().map(|p| p.name()).collect();
    let mut bindings = HashMap::new();
    let mut score = 0;

    for (param, arg) in params.iter().zip(args) {
        match (param, arg) {
            (TemplateParam::Type { specialization, .. }, TemplateArgKey::Type(ty)) => {
                if let Some(pattern) = specialization {
                    if !match_pattern(ctx, template, pattern, *ty, &param_names, &mut bindings) {
                        return None;
                    }
                    score += 1;
                }
                bindings.insert(param.name(), arg.clone());
            }
            (TemplateParam::Value { .. }, TemplateArgKey::Value(_)) => {
                bindings.insert(param.name(), arg.clone());
            }
            _ => return None,
        }
    }
    Some(score)
}

/// Structural match of an argument type against a specialization pattern.
/// Identifiers naming template parameters bind (consistently); everything
/// else must match the argument's shape.
fn match_pattern(
    ctx: &mut CompilationContext,
    template: SymbolId,
    pattern: &TypeExpr,
    arg: TypeId,
    param_names: &[StringId],
    bindings: &mut HashMap<StringId, TemplateArgKey>,
) -> bool {
    match &pattern.kind {
        TypeExprKind::Named(path, targs) if path.len() == 1 && targs.is_empty() => {
            let name = path.item().unwrap();
            if param_names.contains(&name) {
                match bindings.get(&name) {
                    Some(TemplateArgKey::Type(bound)) => *bound == arg,
                    Some(TemplateArgKey::Value(_)) => false,
                    None => {
                        bindings.insert(name, TemplateArgKey::Type(arg));
                        true
                    }
                }
            } else {
                // A concrete named type: resolve it in the template's home
                // module and require identity.
                let module = ctx.symbols.get(template).module;
                let env = super::resolve::TypeEnv::new(module);
                let resolved = super::resolve::resolve_type_expr(ctx, &env, pattern);
                resolved == arg
            }
        }
        TypeExprKind::Basic(kind) => ctx.types.basic(*kind) == arg,
        TypeExprKind::Pointer(inner) => match ctx.types.shape(arg) {
            TypeShape::Pointer(t) => {
                match_pattern(ctx, template, inner, t, param_names, bindings)
            }
            _ => false,
        },
        TypeExprKind::SArray(inner, _) => match ctx.types.shape(arg) {
            TypeShape::SArray(t, _) => {
                match_pattern(ctx, template, inner, t, param_names, bindings)
            }
            _ => false,
        },
        TypeExprKind::DArray(inner) => match ctx.types.shape(arg) {
            TypeShape::DArray(t) => {
                match_pattern(ctx, template, inner, t, param_names, bindings)
            }
            _ => false,
        },
        TypeExprKind::Qualified(q, inner) => {
            let (quals, base) = ctx.types.peel_qualifiers(arg);
            quals.contains(q) && match_pattern(ctx, template, inner, base, param_names, bindings)
        }
        _ => false,
    }
}

/// Deduces template arguments for a function template from call argument
/// types.  Returns `None` when deduction fails for any parameter.
pub fn deduce_args(
    ctx: &mut CompilationContext,
    template: SymbolId,
    arg_types: &[TypeId],
) -> Option<Vec<TemplateArgKey>> {
    let (params, fn_params) = match ctx.symbols.get(template).as_template() {
        Some(t) => match &t.decl {
            TemplateDeclKind::Func(f) => (t.params.clone(), f.params.clone()),
            TemplateDeclKind::Struct(_) => return None,
        },
        None => return None,
    };
    if fn_params.len() != arg_types.len() {
        return None;
    }

    let param_names: Vec<StringId> = params.iter().map(|p| p.name()).collect();
    let mut bindings = HashMap::new();
    for (fp, arg) in fn_params.iter().zip(arg_types) {
        if !match_pattern(ctx, template, &fp.ty, *arg, &param_names, &mut bindings) {
            return None;
        }
    }

    // Specialization patterns participate in deduction: `[T: *E, E]` binds
    // `E` by destructuring whatever `T` deduced to.
    for p in &params {
        if let TemplateParam::Type {
            name,
            specialization: Some(spec),
        } = p
        {
            if let Some(TemplateArgKey::Type(bound)) = bindings.get(name).cloned() {
                if !match_pattern(ctx, template, spec, bound, &param_names, &mut bindings) {
                    return None;
                }
            }
        }
    }

    params
        .iter()
        .map(|p| bindings.get(&p.name()).cloned())
        .collect()
}

/// Instantiates `template` with `args`, reusing the memoized instance when
/// one exists.  New instances are recorded in `site_module` so emission
/// policy can place their code with the code that triggered them.
pub fn instantiate(
    ctx: &mut CompilationContext,
    template: SymbolId,
    args: Vec<TemplateArgKey>,
    site_module: ModuleId,
    site_span: Span,
) -> SymbolId {
    let key = InstanceKey { args: args.clone() };

    let (params, decl) = match ctx.symbols.get(template).as_template() {
        Some(t) => {
            if let Some(existing) = t.instances.get(&key) {
                return *existing;
            }
            (t.params.clone(), t.decl.clone())
        }
        None => {
            ctx.error(
                site_span,
                SemanticError::NotATemplate(ctx.symbols.get(template).name),
            );
            return template;
        }
    };

    if params.len() != args.len() {
        ctx.error(
            site_span,
            SemanticError::WrongNumberOfTemplateArgs(
                ctx.symbols.get(template).name,
                params.len(),
                args.len(),
            ),
        );
        let err =
            ctx.symbols
                .alloc(Symbol::new(
                    ctx.symbols.get(template).name,
                    site_span,
                    None,
                    site_module,
                    SymbolKind::Error,
                ));
        return err;
    }

    let bindings: Vec<(StringId, TemplateArgKey)> = params
        .iter()
        .map(|p| p.name())
        .zip(args.iter().cloned())
        .collect();

    // Deterministic mangled identity for the instance: the template's
    // qualified name plus the canonical rendering of the argument tuple.
    let instance_name = instance_name(ctx, template, &args);
    let name_id = ctx.intern(&instance_name);
    debug!("instantiate {}", instance_name);

    let parent = ctx.module_syms[site_module.index()];
    let kind = match &decl {
        TemplateDeclKind::Func(f) => SymbolKind::Function(FuncSymbol {
            decl: Rc::new(ast::FunctionDecl::clone(f)),
            sig: None,
            linkage: f.linkage,
            next_overload: None,
            template_origin: Some(template),
            bindings,
            locals: vec![],
            body: None,
        }),
        TemplateDeclKind::Struct(s) => SymbolKind::Aggregate(AggSymbol {
            decl: Rc::new(ast::StructDecl::clone(s)),
            kind: s.kind,
            fields: vec![],
            layout: None,
            template_origin: Some(template),
            bindings,
        }),
    };
    let span = ctx.symbols.get(template).span;
    let instance = ctx
        .symbols
        .alloc(Symbol::new(name_id, span, Some(parent), site_module, kind));

    // Memoize before running any pass so self-referential instantiations
    // land on the same symbol.
    ctx.symbols
        .get_mut(template)
        .as_template_mut()
        .unwrap()
        .instances
        .insert(key, instance);

    // Record the instance in the instantiating module for emission.
    ctx.symbols
        .get_mut(parent)
        .as_module_mut()
        .unwrap()
        .decls
        .push(instance);

    // If the originating template is itself still mid-resolution, the
    // instance's passes are postponed onto the deferred queue; otherwise
    // catch it up to the pass the pipeline is currently running.
    if ctx.symbols.pass_state(template, PassId::One) == PassState::InProgress {
        ctx.deferred.push_back(DeferredItem::Instantiate {
            template,
            args,
            site_module,
            site_span,
        });
        return instance;
    }

    ensure_pass1(ctx, instance);
    if ctx.current_pass >= 2 {
        ensure_pass2(ctx, instance);
    }
    if ctx.current_pass >= 3 {
        ensure_pass3(ctx, instance);
    }
    instance
}

/// `pkg.max!(i64,4)`; the deterministic identity of an instance.
fn instance_name(
    ctx: &CompilationContext,
    template: SymbolId,
    args: &[TemplateArgKey],
) -> String {
    let base = ctx.qualified_name(template);
    let rendered: Vec<String> = args
        .iter()
        .map(|a| match a {
            TemplateArgKey::Type(t) => ctx.type_name(*t),
            TemplateArgKey::Value(v) => format!("{}", v),
        })
        .collect();
    format!("{}!({})", base, rendered.join(","))
}
