//! Static initializer encoding.
//!
//! Turns a compile time constant value into the linear byte/zero/relocation
//! list ([`DtList`]) the backend's data segment format consumes.  Aggregates
//! walk their field list in declaration order: an instance-specific
//! initializer wins, else the field's declared default, else the field's
//! type default; tracking a running byte offset, padding gaps with zeros
//! and rejecting overlapping writes.  Legitimate union
//! reinitialization-by-omission is allowed (a defaulted field overlapped by
//! a later explicit initializer is skipped); two explicit initializers
//! touching the same bytes are an error and the aggregate's byte stream is
//! suppressed.
//!
//! Non-inline array and pointer values are never emitted by value: they are
//! hoisted into a synthesized read-only symbol and referenced by address
//! (plus length for dynamic arrays), because the data segment format needs a
//! concrete symbol to take an address of.

use std::collections::HashMap;

use crate::compiler::backend::{BackendUnit, DtList};
use crate::compiler::context::CompilationContext;
use crate::compiler::semantics::tree::ConstValue;
use crate::compiler::sym::{SymbolId, SymbolKind};
use crate::compiler::target::Endian;
use crate::compiler::types::{layout, BasicKind, TypeId, TypeShape};

use super::error::LowerError;
use super::mangle;

/// Mapping from data symbols of the current unit to their backend ids.
pub type DataMap = HashMap<SymbolId, crate::compiler::backend::DataId>;

fn int_bytes(value: i128, width: u64, endian: Endian) -> Vec<u8> {
    let le = value.to_le_bytes();
    let mut out: Vec<u8> = le[..width as usize].to_vec();
    if endian == Endian::Big {
        out.reverse();
    }
    out
}

fn real_bytes(value: f64, width: u64, endian: Endian) -> Vec<u8> {
    match (width, endian) {
        (4, Endian::Little) => (value as f32).to_le_bytes().to_vec(),
        (4, Endian::Big) => (value as f32).to_be_bytes().to_vec(),
        (_, Endian::Little) => value.to_le_bytes().to_vec(),
        (_, Endian::Big) => value.to_be_bytes().to_vec(),
    }
}

fn type_size(ctx: &CompilationContext, ty: TypeId) -> Result<u64, LowerError> {
    layout::size_of(&ctx.types, &ctx.symbols, ty)
        .map(|(s, _)| s)
        .map_err(|_| LowerError::Unrepresentable(ctx.type_name(ty)))
}

/// Pools a string literal into the unit's read-only data (NUL terminated)
/// and returns its symbol.
pub(super) fn pool_string(
    ctx: &CompilationContext,
    unit: &mut BackendUnit,
    id: crate::StringId,
) -> (crate::compiler::backend::DataId, u64) {
    let text = ctx.strings.get(id).unwrap_or_default();
    let len = text.len() as u64;
    let mut dt = DtList::new();
    let mut bytes = text.into_bytes();
    bytes.push(0);
    dt.push_bytes(bytes);
    (unit.define_private_rodata(dt), len)
}

/// Encodes one constant value against its declared type.
pub fn const_to_dt(
    ctx: &CompilationContext,
    unit: &mut BackendUnit,
    globals: &DataMap,
    value: &ConstValue,
    ty: TypeId,
) -> Result<DtList, LowerError> {
    let endian = ctx.types.target().endian;
    let ptr_size = ctx.types.target().ptr_size;
    let naked = ctx.types.unqualified(ty);
    let mut dt = DtList::new();

    match (ctx.types.shape(naked), value) {
        (TypeShape::Basic(kind), ConstValue::Int(v)) if kind.is_integer() => {
            if *v == 0 {
                dt.push_zeros(kind.size());
            } else {
                dt.push_bytes(int_bytes(*v, kind.size(), endian));
            }
        }
        (TypeShape::Basic(kind), ConstValue::Bool(b)) if kind.is_integer() => {
            dt.push_bytes(int_bytes(*b as i128, kind.size(), endian));
        }
        (TypeShape::Basic(kind), ConstValue::Real(r)) if kind.is_float() => {
            dt.push_bytes(real_bytes(*r, kind.size(), endian));
        }
        (TypeShape::Basic(kind), ConstValue::Int(v)) if kind.is_float() => {
            dt.push_bytes(real_bytes(*v as f64, kind.size(), endian));
        }

        (TypeShape::Pointer(_), ConstValue::Null)
        | (TypeShape::AArray(_, _), ConstValue::Null)
        | (TypeShape::VaList, ConstValue::Null) => dt.push_zeros(ptr_size),
        (TypeShape::Pointer(_), ConstValue::SymAddr(sym)) => {
            push_symbol_addr(ctx, globals, &mut dt, *sym)?;
        }
        (TypeShape::Pointer(_), ConstValue::Str(id)) => {
            let (data, _) = pool_string(ctx, unit, *id);
            dt.push_sym_off(data, 0);
        }
        (TypeShape::Pointer(_), ConstValue::Array(elems)) => {
            // A pointer to a hoisted array literal.
            let elem_ty = match ctx.types.shape(naked) {
                TypeShape::Pointer(e) => e,
                _ => unreachable!(),
            };
            let data = hoist_array(ctx, unit, globals, elems, elem_ty)?;
            dt.push_sym_off(data, 0);
        }

        (TypeShape::DArray(_), ConstValue::Null) => dt.push_zeros(ptr_size * 2),
        (TypeShape::DArray(_), ConstValue::Str(id)) => {
            let (data, len) = pool_string(ctx, unit, *id);
            dt.push_bytes(int_bytes(len as i128, ptr_size, endian));
            dt.push_sym_off(data, 0);
        }
        (TypeShape::DArray(elem_ty), ConstValue::Array(elems)) => {
            // Hoist the elements into a read-only symbol and reference it
            // as a length + address pair.
            let data = hoist_array(ctx, unit, globals, elems, elem_ty)?;
            dt.push_bytes(int_bytes(elems.len() as i128, ptr_size, endian));
            dt.push_sym_off(data, 0);
        }

        (TypeShape::SArray(elem_ty, dim), ConstValue::Array(elems)) => {
            if elems.len() as u64 > dim {
                return Err(LowerError::Unrepresentable(format!(
                    "too many initializers, {}, for array[{}]",
                    elems.len(),
                    dim
                )));
            }
            for el in elems {
                dt.cat(const_to_dt(ctx, unit, globals, el, elem_ty)?);
            }
            if (elems.len() as u64) < dim {
                let esize = type_size(ctx, elem_ty)?;
                dt.push_zeros(esize * (dim - elems.len() as u64));
            }
        }
        (TypeShape::SArray(elem_ty, dim), ConstValue::Str(id)) => {
            // A string literal filling a fixed char array, padded with NULs.
            let text = ctx.strings.get(*id).unwrap_or_default();
            let esize = type_size(ctx, elem_ty)?;
            let mut bytes = text.into_bytes();
            bytes.truncate(dim as usize);
            let used = bytes.len() as u64;
            dt.push_bytes(bytes);
            dt.push_zeros(esize * dim - used);
        }
        (TypeShape::SArray(elem_ty, dim), single) => {
            // One value replicated across every element.
            let one = const_to_dt(ctx, unit, globals, single, elem_ty)?;
            for _ in 0..dim {
                dt.cat(one.clone());
            }
        }

        (TypeShape::Aggregate(agg), ConstValue::Struct(lit_agg, inits)) if agg == *lit_agg => {
            dt = struct_to_dt(ctx, unit, globals, agg, inits)?;
        }

        (_, ConstValue::Int(0)) => dt.push_zeros(type_size(ctx, naked)?),

        _ => return Err(LowerError::Unrepresentable(ctx.type_name(ty))),
    }
    Ok(dt)
}

fn push_symbol_addr(
    ctx: &CompilationContext,
    globals: &DataMap,
    dt: &mut DtList,
    sym: SymbolId,
) -> Result<(), LowerError> {
    match globals.get(&sym) {
        Some(data) => dt.push_sym_off(*data, 0),
        None => {
            // A symbol outside this unit (or a function): reference by
            // external name.
            match &ctx.symbols.get(sym).kind {
                SymbolKind::Function(_) | SymbolKind::Variable(_) => {
                    dt.push_named_addr(mangle::mangled_name(ctx, sym)?);
                }
                _ => return Err(LowerError::NonConstantInitializer),
            }
        }
    }
    Ok(())
}

fn hoist_array(
    ctx: &CompilationContext,
    unit: &mut BackendUnit,
    globals: &DataMap,
    elems: &[ConstValue],
    elem_ty: TypeId,
) -> Result<crate::compiler::backend::DataId, LowerError> {
    let mut dt = DtList::new();
    for el in elems {
        dt.cat(const_to_dt(ctx, unit, globals, el, elem_ty)?);
    }
    Ok(unit.define_private_rodata(dt))
}

/// The default encoding of a type: an aggregate's field defaults, zeros
/// otherwise.
pub fn default_to_dt(
    ctx: &CompilationContext,
    unit: &mut BackendUnit,
    globals: &DataMap,
    ty: TypeId,
) -> Result<DtList, LowerError> {
    let naked = ctx.types.unqualified(ty);
    match ctx.types.shape(naked) {
        TypeShape::Aggregate(agg) => struct_to_dt(ctx, unit, globals, agg, &[]),
        TypeShape::SArray(elem_ty, dim) => {
            let one = default_to_dt(ctx, unit, globals, elem_ty)?;
            let mut dt = DtList::new();
            for _ in 0..dim {
                dt.cat(one.clone());
            }
            Ok(dt)
        }
        _ => {
            let mut dt = DtList::new();
            dt.push_zeros(type_size(ctx, naked)?);
            Ok(dt)
        }
    }
}

/// Encodes an aggregate from its sparse explicit initializers.
///
/// `inits` holds `(field index, value)` pairs.  Fields walk in declaration
/// order; the running offset detects overlapping writes.  A union member
/// that would be *defaulted* into bytes an explicit initializer of a later
/// field covers is skipped (reinitialization-by-omission); two explicit
/// initializers in the same bytes are the duplicate-union error and no byte
/// stream is produced.
pub fn struct_to_dt(
    ctx: &CompilationContext,
    unit: &mut BackendUnit,
    globals: &DataMap,
    agg: SymbolId,
    inits: &[(usize, ConstValue)],
) -> Result<DtList, LowerError> {
    let ptr_size = ctx.types.target().ptr_size;
    let (fields, agg_layout) = {
        let a = ctx
            .symbols
            .get(agg)
            .as_aggregate()
            .ok_or_else(|| LowerError::Unrepresentable("<not an aggregate>".into()))?;
        let l = a
            .layout
            .clone()
            .ok_or_else(|| LowerError::Unrepresentable("<unlaid-out aggregate>".into()))?;
        (a.fields.clone(), l)
    };

    let field_name = |i: usize| {
        fields
            .get(i)
            .and_then(|f| ctx.strings.get(f.name).ok())
            .unwrap_or_else(|| format!("#{}", i))
    };

    // Instance-specific initializers, indexed by field.
    let mut dts: Vec<Option<DtList>> = vec![None; fields.len()];
    let mut explicit = vec![false; fields.len()];
    for (index, value) in inits {
        if *index >= fields.len() {
            return Err(LowerError::Unrepresentable(field_name(*index)));
        }
        if dts[*index].is_some() {
            return Err(LowerError::DuplicateFieldInitialization(field_name(*index)));
        }
        dts[*index] = Some(const_to_dt(ctx, unit, globals, value, fields[*index].ty)?);
        explicit[*index] = true;
    }

    let mut out = DtList::new();
    let mut offset = 0u64;

    for j in 0..fields.len() {
        let field_offset = agg_layout.offsets[j];
        let field_size = type_size(ctx, fields[j].ty)?;

        let mut d = dts[j].take();
        if d.is_none() {
            // No instance initializer: use the declared default, else the
            // type's default; but only when the bytes are not claimed by a
            // later field's explicit initializer (union
            // reinitialization-by-omission).
            if let Some(default) = &fields[j].default {
                d = Some(const_to_dt(ctx, unit, globals, default, fields[j].ty)?);
            } else if field_offset >= offset {
                let end = field_offset + field_size;
                let overlapped = (j + 1..fields.len())
                    .any(|k| explicit[k] && agg_layout.offsets[k] < end);
                if !overlapped {
                    d = Some(default_to_dt(ctx, unit, globals, fields[j].ty)?);
                }
            }
        }

        if let Some(d) = d {
            if field_offset < offset {
                return Err(LowerError::DuplicateUnionInitialization(field_name(j)));
            }
            if offset < field_offset {
                out.push_zeros(field_offset - offset);
            }
            let sz = d.size(ptr_size);
            out.cat(d);
            offset = field_offset + sz;
        }
    }

    if offset < agg_layout.size {
        out.push_zeros(agg_layout.size - offset);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{AggKind, StructDecl};
    use crate::compiler::backend::Dt;
    use crate::compiler::context::{CompilationContext, Params};
    use crate::compiler::sym::{AggSymbol, FieldInfo, ModuleId, Symbol, SymbolKind};
    use crate::compiler::Span;
    use std::rc::Rc;

    fn test_ctx() -> CompilationContext {
        let mut ctx = CompilationContext::new(Params::default());
        ctx.add_module(
            vec![ctx.intern("testmod")],
            std::path::PathBuf::from("testmod.sbl"),
            true,
        );
        ctx
    }

    /// Registers an aggregate with the given fields (type, explicit align)
    /// and computes its layout.
    fn make_agg(
        ctx: &mut CompilationContext,
        kind: AggKind,
        fields: &[(&str, TypeId)],
    ) -> SymbolId {
        let decl = Rc::new(StructDecl {
            span: Span::zero(),
            name: ctx.intern("T"),
            kind,
            template_params: vec![],
            fields: vec![],
        });
        let infos: Vec<FieldInfo> = fields
            .iter()
            .map(|(n, t)| FieldInfo {
                name: ctx.intern(n),
                span: Span::zero(),
                ty: *t,
                align: None,
                default: None,
            })
            .collect();
        let shapes: Vec<_> = infos.iter().map(|f| (f.ty, f.align)).collect();
        let l = layout::layout_fields(&ctx.types, &ctx.symbols, kind, &shapes).unwrap();
        let name = decl.name;
        ctx.symbols.alloc(Symbol::new(
            name,
            Span::zero(),
            None,
            ModuleId(0),
            SymbolKind::Aggregate(AggSymbol {
                decl,
                kind,
                fields: infos,
                layout: Some(l),
                template_origin: None,
                bindings: vec![],
            }),
        ))
    }

    #[test]
    fn byte_then_int_has_padding_and_exact_coverage() {
        let mut ctx = test_ctx();
        let i8t = ctx.types.basic(BasicKind::I8);
        let i32t = ctx.types.basic(BasicKind::I32);
        let agg = make_agg(&mut ctx, AggKind::Struct, &[("b", i8t), ("i", i32t)]);
        let mut unit = BackendUnit::new("t", 8);

        let dt = struct_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            agg,
            &[(0, ConstValue::Int(1)), (1, ConstValue::Int(2))],
        )
        .unwrap();

        // 1 byte value, 3 bytes pad, 4 bytes value: exactly [0, 8).
        assert_eq!(dt.size(8), 8);
        assert_eq!(
            dt.items(),
            &[
                Dt::Bytes(vec![1]),
                Dt::Zeros(3),
                Dt::Bytes(vec![2, 0, 0, 0]),
            ]
        );
    }

    #[test]
    fn write_regions_are_monotonic_and_cover_struct() {
        let mut ctx = test_ctx();
        let i32t = ctx.types.basic(BasicKind::I32);
        let i64t = ctx.types.basic(BasicKind::I64);
        let agg = make_agg(&mut ctx, AggKind::Struct, &[("a", i32t), ("b", i64t)]);
        let mut unit = BackendUnit::new("t", 8);

        // Only the second field is explicitly initialized: the first is
        // type-defaulted, the gap padded, total size exact.
        let dt = struct_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            agg,
            &[(1, ConstValue::Int(7))],
        )
        .unwrap();
        assert_eq!(dt.size(8), 16);
    }

    #[test]
    fn duplicate_union_initialization_is_rejected_without_stream() {
        let mut ctx = test_ctx();
        let i32t = ctx.types.basic(BasicKind::I32);
        let u32t = ctx.types.basic(BasicKind::U32);
        let agg = make_agg(&mut ctx, AggKind::Union, &[("a", i32t), ("b", u32t)]);
        let mut unit = BackendUnit::new("t", 8);

        let r = struct_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            agg,
            &[(0, ConstValue::Int(1)), (1, ConstValue::Int(2))],
        );
        assert!(matches!(
            r,
            Err(LowerError::DuplicateUnionInitialization(_))
        ));
    }

    #[test]
    fn union_single_explicit_member_is_fine() {
        let mut ctx = test_ctx();
        let i32t = ctx.types.basic(BasicKind::I32);
        let i64t = ctx.types.basic(BasicKind::I64);
        let agg = make_agg(&mut ctx, AggKind::Union, &[("a", i32t), ("b", i64t)]);
        let mut unit = BackendUnit::new("t", 8);

        // Initializing only the larger member: the smaller one's default is
        // skipped because its bytes are claimed (reinitialization by
        // omission).
        let dt = struct_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            agg,
            &[(1, ConstValue::Int(-1))],
        )
        .unwrap();
        assert_eq!(dt.size(8), 8);
    }

    #[test]
    fn repeated_field_initializer_is_rejected() {
        let mut ctx = test_ctx();
        let i32t = ctx.types.basic(BasicKind::I32);
        let agg = make_agg(&mut ctx, AggKind::Struct, &[("a", i32t)]);
        let mut unit = BackendUnit::new("t", 8);

        let r = struct_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            agg,
            &[(0, ConstValue::Int(1)), (0, ConstValue::Int(2))],
        );
        assert!(matches!(r, Err(LowerError::DuplicateFieldInitialization(_))));
    }

    #[test]
    fn dynamic_array_literal_is_hoisted_with_length() {
        let ctx = test_ctx();
        let u8t = ctx.types.basic(BasicKind::U8);
        let da = ctx.types.canonicalize(TypeShape::DArray(u8t));
        let mut unit = BackendUnit::new("t", 8);

        let dt = const_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            &ConstValue::Array(vec![
                ConstValue::Int(1),
                ConstValue::Int(2),
                ConstValue::Int(3),
            ]),
            da,
        )
        .unwrap();

        // Length word followed by an address into the synthesized symbol.
        assert_eq!(dt.size(8), 16);
        assert!(matches!(dt.items()[1], Dt::SymOff { .. }));
    }

    #[test]
    fn fixed_array_literal_is_inlined_and_padded() {
        let ctx = test_ctx();
        let i16t = ctx.types.basic(BasicKind::I16);
        let sa = ctx.types.canonicalize(TypeShape::SArray(i16t, 4));
        let mut unit = BackendUnit::new("t", 8);

        let dt = const_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            &ConstValue::Array(vec![ConstValue::Int(256), ConstValue::Int(2)]),
            sa,
        )
        .unwrap();
        assert_eq!(dt.size(8), 8);
        assert_eq!(
            dt.items()[0],
            Dt::Bytes(vec![0, 1]) // 256 little endian
        );
    }

    #[test]
    fn big_endian_targets_flip_byte_order() {
        let mut params = Params::default();
        params.target.endian = Endian::Big;
        let ctx = CompilationContext::new(params);
        let i32t = ctx.types.basic(BasicKind::I32);
        let mut unit = BackendUnit::new("t", 8);

        let dt = const_to_dt(
            &ctx,
            &mut unit,
            &DataMap::new(),
            &ConstValue::Int(0x01020304),
            i32t,
        )
        .unwrap();
        assert_eq!(dt.items()[0], Dt::Bytes(vec![1, 2, 3, 4]));
    }
}
