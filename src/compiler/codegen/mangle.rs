//! External name mangling.
//!
//! Two schemes.  The native scheme prefixes `_S` and encodes the fully
//! qualified symbol path plus, for functions, the full signature; it is a
//! pure function of the symbol's identity, so separate compilations of
//! different translation units agree on every shared symbol's name.  The
//! foreign scheme produces Itanium-style names for `extern "cpp"` symbols;
//! its per-translation-unit substitution table is purely a compression
//! optimization; back-references shorten repeated components without
//! affecting the decoded identity.  Plain C linkage uses the identifier
//! unchanged.

use crate::compiler::ast::{Linkage, Qualifier};
use crate::compiler::context::CompilationContext;
use crate::compiler::sym::{SymbolId, SymbolKind};
use crate::compiler::types::{BasicKind, TypeId, TypeShape};

use super::error::LowerError;

/// The external name of a symbol.  Deterministic and stable across runs.
pub fn mangled_name(ctx: &CompilationContext, sym: SymbolId) -> Result<String, LowerError> {
    let s = ctx.symbols.get(sym);
    let linkage = match &s.kind {
        SymbolKind::Function(f) => f.linkage,
        SymbolKind::Variable(v) => v.linkage,
        _ => Linkage::Native,
    };
    match linkage {
        Linkage::Foreign => Ok(ctx.strings.get(s.name).unwrap_or_default()),
        Linkage::ForeignCpp => foreign_mangle(ctx, sym),
        Linkage::Native => Ok(native_mangle(ctx, sym)),
    }
}

// ---- native scheme ----------------------------------------------------

fn native_mangle(ctx: &CompilationContext, sym: SymbolId) -> String {
    let s = ctx.symbols.get(sym);
    let mut out = String::from("_S");
    for part in &ctx.modules[s.module.index()].name {
        if let Ok(p) = ctx.strings.get(*part) {
            out.push_str(&format!("{}{}", p.len(), p));
        }
    }
    if let Ok(name) = ctx.strings.get(s.name) {
        out.push_str(&format!("{}{}", name.len(), name));
    }
    if let Some(f) = s.as_function() {
        if let Some(sig) = f.sig {
            if let TypeShape::Function(shape) = ctx.types.shape(sig) {
                out.push('F');
                for p in &shape.params {
                    out.push_str(&native_type_code(ctx, *p));
                }
                if shape.variadic {
                    out.push('X');
                }
                out.push('Z');
                out.push_str(&native_type_code(ctx, shape.ret));
            }
        }
    }
    out
}

fn native_type_code(ctx: &CompilationContext, ty: TypeId) -> String {
    match ctx.types.shape(ty) {
        TypeShape::Basic(kind) => native_basic_code(kind).into(),
        TypeShape::Pointer(t) => format!("P{}", native_type_code(ctx, t)),
        TypeShape::DArray(t) => format!("A{}", native_type_code(ctx, t)),
        TypeShape::SArray(t, dim) => format!("G{}{}", dim, native_type_code(ctx, t)),
        TypeShape::AArray(k, v) => format!(
            "H{}{}",
            native_type_code(ctx, k),
            native_type_code(ctx, v)
        ),
        TypeShape::Aggregate(sym) => {
            let qn = ctx.qualified_name(sym);
            format!("S{}{}", qn.len(), qn)
        }
        TypeShape::Function(shape) => {
            let mut out = String::from("F");
            for p in &shape.params {
                out.push_str(&native_type_code(ctx, *p));
            }
            out.push('Z');
            out.push_str(&native_type_code(ctx, shape.ret));
            out
        }
        TypeShape::Qualified(q, t) => {
            let c = match q {
                Qualifier::Const => 'q',
                Qualifier::Immutable => 'y',
                Qualifier::Shared => 'O',
            };
            format!("{}{}", c, native_type_code(ctx, t))
        }
        TypeShape::VaList => "v@".into(),
        TypeShape::Error => "E".into(),
    }
}

fn native_basic_code(kind: BasicKind) -> &'static str {
    match kind {
        BasicKind::Void => "v",
        BasicKind::Bool => "b",
        BasicKind::Char => "a",
        BasicKind::I8 => "g",
        BasicKind::I16 => "s",
        BasicKind::I32 => "i",
        BasicKind::I64 => "l",
        BasicKind::U8 => "h",
        BasicKind::U16 => "t",
        BasicKind::U32 => "k",
        BasicKind::U64 => "m",
        BasicKind::F32 => "f",
        BasicKind::F64 => "d",
    }
}

// ---- foreign (Itanium-style) scheme -----------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum SubstEntry {
    Sym(SymbolId),
    Type(TypeId),
}

/// Per-translation-unit mangling state: the substitution table.  Components
/// already emitted are referenced as `S<base36>_` instead of being repeated.
struct ForeignMangleState {
    substitutions: Vec<SubstEntry>,
}

impl ForeignMangleState {
    fn new() -> ForeignMangleState {
        ForeignMangleState {
            substitutions: vec![],
        }
    }

    /// If `entry` was emitted before, writes its back-reference into `buf`
    /// and returns true.
    fn has_substitute(&self, entry: SubstEntry, buf: &mut String) -> bool {
        for (i, e) in self.substitutions.iter().enumerate() {
            if *e == entry {
                buf.push('S');
                if i > 0 {
                    to_base36((i - 1) as u32, buf);
                }
                buf.push('_');
                return true;
            }
        }
        false
    }

    fn add(&mut self, entry: SubstEntry) {
        self.substitutions.push(entry);
    }
}

fn to_base36(mut n: u32, buf: &mut String) {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        buf.push('0');
        return;
    }
    let mut tmp = [0u8; 8];
    let mut i = tmp.len();
    while n > 0 {
        i -= 1;
        tmp[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    for b in &tmp[i..] {
        buf.push(*b as char);
    }
}

/// `_Z`-prefixed foreign mangling of a function or variable.
fn foreign_mangle(ctx: &CompilationContext, sym: SymbolId) -> Result<String, LowerError> {
    let mut out = String::from("_Z");
    let mut state = ForeignMangleState::new();
    foreign_mangle_entity(ctx, sym, &mut out, &mut state)?;
    Ok(out)
}

fn foreign_mangle_entity(
    ctx: &CompilationContext,
    sym: SymbolId,
    buf: &mut String,
    state: &mut ForeignMangleState,
) -> Result<(), LowerError> {
    if state.has_substitute(SubstEntry::Sym(sym), buf) {
        return Ok(());
    }

    let s = ctx.symbols.get(sym);
    // The qualified prefix: module path components, then the identifier.
    let mut components: Vec<String> = ctx.modules[s.module.index()]
        .name
        .iter()
        .filter_map(|p| ctx.strings.get(*p).ok())
        .collect();
    if ctx.module_syms[s.module.index()] != sym {
        components.push(ctx.strings.get(s.name).unwrap_or_default());
    }

    let nested = components.len() > 1;
    if nested {
        buf.push('N');
    }
    for c in &components {
        buf.push_str(&format!("{}{}", c.len(), c));
    }
    // Functions never enter the substitution table; their prefix components
    // do.
    if s.as_function().is_none() {
        state.add(SubstEntry::Sym(sym));
    }
    if nested {
        buf.push('E');
    }

    if let Some(f) = s.as_function() {
        if let Some(sig) = f.sig {
            if let TypeShape::Function(shape) = ctx.types.shape(sig) {
                if shape.params.is_empty() && !shape.variadic {
                    buf.push('v');
                } else {
                    for p in &shape.params {
                        foreign_mangle_type(ctx, *p, buf, state)?;
                    }
                    if shape.variadic {
                        buf.push('z');
                    }
                }
            }
        }
    }
    Ok(())
}

fn foreign_mangle_type(
    ctx: &CompilationContext,
    ty: TypeId,
    buf: &mut String,
    state: &mut ForeignMangleState,
) -> Result<(), LowerError> {
    match ctx.types.shape(ty) {
        TypeShape::Basic(kind) => {
            buf.push_str(foreign_basic_code(kind));
            Ok(())
        }
        TypeShape::Pointer(t) => {
            if state.has_substitute(SubstEntry::Type(ty), buf) {
                return Ok(());
            }
            buf.push('P');
            foreign_mangle_type(ctx, t, buf, state)?;
            state.add(SubstEntry::Type(ty));
            Ok(())
        }
        TypeShape::SArray(t, dim) => {
            if state.has_substitute(SubstEntry::Type(ty), buf) {
                return Ok(());
            }
            buf.push_str(&format!("A{}_", dim));
            foreign_mangle_type(ctx, t, buf, state)?;
            state.add(SubstEntry::Type(ty));
            Ok(())
        }
        TypeShape::Qualified(Qualifier::Const, t)
        | TypeShape::Qualified(Qualifier::Immutable, t) => {
            buf.push('K');
            foreign_mangle_type(ctx, t, buf, state)
        }
        TypeShape::Qualified(Qualifier::Shared, t) => {
            // Shared has no C++ counterpart; encode the base type.
            foreign_mangle_type(ctx, t, buf, state)
        }
        TypeShape::Aggregate(sym) => foreign_mangle_entity(ctx, sym, buf, state),
        TypeShape::Function(shape) => {
            if state.has_substitute(SubstEntry::Type(ty), buf) {
                return Ok(());
            }
            buf.push('F');
            foreign_mangle_type(ctx, shape.ret, buf, state)?;
            if shape.params.is_empty() {
                buf.push('v');
            }
            for p in &shape.params {
                foreign_mangle_type(ctx, *p, buf, state)?;
            }
            buf.push('E');
            state.add(SubstEntry::Type(ty));
            Ok(())
        }
        // Dynamic arrays fall back to an embedded native encoding, length
        // prefixed so the name remains decodable.
        TypeShape::DArray(_) => {
            let deco = native_type_code(ctx, ty);
            buf.push_str(&format!("{}{}", deco.len(), deco));
            Ok(())
        }
        TypeShape::VaList => {
            buf.push('z');
            Ok(())
        }
        TypeShape::AArray(_, _) | TypeShape::Error => Err(LowerError::NoForeignEncoding(
            ctx.type_name(ty),
        )),
    }
}

fn foreign_basic_code(kind: BasicKind) -> &'static str {
    match kind {
        BasicKind::Void => "v",
        BasicKind::Bool => "b",
        BasicKind::Char => "c",
        BasicKind::I8 => "a",
        BasicKind::I16 => "s",
        BasicKind::I32 => "i",
        BasicKind::I64 => "x",
        BasicKind::U8 => "h",
        BasicKind::U16 => "t",
        BasicKind::U32 => "j",
        BasicKind::U64 => "y",
        BasicKind::F32 => "f",
        BasicKind::F64 => "d",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_expected_digits() {
        let mut s = String::new();
        to_base36(0, &mut s);
        to_base36(10, &mut s);
        to_base36(36, &mut s);
        assert_eq!(s, "0A10");
    }
}
