//! Size and alignment computation.
//!
//! This is a hard external contract, not a free design choice: the numbers
//! computed here must match the backend's own layout rules bit for bit,
//! because the object file layout is dictated by the ABI the backend also
//! targets.  Scalars come from the target tables; aggregates are laid out
//! sequentially, honoring each field's required alignment and any explicit
//! `align(n)` override, with padding inserted to satisfy alignment and
//! trailing padding rounding the total up to the aggregate's own alignment.

use crate::compiler::ast::AggKind;
use crate::compiler::sym::{SymbolId, Symbols};

use super::{BasicKind, TypeId, TypeShape, TypeTable};

#[derive(Clone, Debug, PartialEq)]
pub enum LayoutError {
    /// The type has no size (function types, void in a field position, or an
    /// error placeholder).
    Opaque(TypeId),
    /// An aggregate whose layout has not been computed yet; a forward
    /// reference cycle the caller reports as a circular dependency.
    Unresolved(SymbolId),
}

/// The computed layout of one aggregate: total size, alignment, and the byte
/// offset of each field in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct AggLayout {
    pub size: u64,
    pub align: u64,
    pub offsets: Vec<u64>,
}

fn round_up(n: u64, align: u64) -> u64 {
    debug_assert!(align > 0);
    (n + align - 1) / align * align
}

fn basic_layout(kind: BasicKind, table: &TypeTable) -> (u64, u64) {
    let size = kind.size();
    let align = match kind {
        BasicKind::I64 | BasicKind::U64 | BasicKind::F64 => table.target().scalar8_align,
        _ => size.max(1),
    };
    (size, align.max(1))
}

/// `(size, alignment)` of a type, both in bytes.
pub fn size_of(table: &TypeTable, syms: &Symbols, id: TypeId) -> Result<(u64, u64), LayoutError> {
    match table.shape(id) {
        TypeShape::Basic(BasicKind::Void) => Err(LayoutError::Opaque(id)),
        TypeShape::Basic(kind) => Ok(basic_layout(kind, table)),
        TypeShape::Pointer(_) | TypeShape::AArray(_, _) | TypeShape::VaList => {
            Ok((table.target().ptr_size, table.target().ptr_align))
        }
        // Pointer + length pair.
        TypeShape::DArray(_) => Ok((table.target().ptr_size * 2, table.target().ptr_align)),
        TypeShape::SArray(elem, dim) => {
            let (esize, ealign) = size_of(table, syms, elem)?;
            Ok((esize * dim, ealign))
        }
        TypeShape::Aggregate(sym) => match syms.agg_layout(sym) {
            Some(l) => Ok((l.size, l.align)),
            None => Err(LayoutError::Unresolved(sym)),
        },
        TypeShape::Qualified(_, base) => size_of(table, syms, base),
        TypeShape::Function(_) | TypeShape::Error => Err(LayoutError::Opaque(id)),
    }
}

/// Lays out the fields of a struct or union.  `fields` carries each field's
/// type and explicit alignment override in declaration order.
pub fn layout_fields(
    table: &TypeTable,
    syms: &Symbols,
    kind: AggKind,
    fields: &[(TypeId, Option<u64>)],
) -> Result<AggLayout, LayoutError> {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut size = 0u64;
    let mut align = 1u64;

    for (ty, align_override) in fields {
        let (fsize, natural_align) = size_of(table, syms, *ty)?;
        let falign = align_override.unwrap_or(natural_align).max(1);
        align = align.max(falign);

        match kind {
            AggKind::Struct => {
                let offset = round_up(size, falign);
                offsets.push(offset);
                size = offset + fsize;
            }
            AggKind::Union => {
                offsets.push(0);
                size = size.max(fsize);
            }
        }
    }

    if fields.is_empty() {
        // A degenerate aggregate still occupies one byte so that distinct
        // instances have distinct addresses.
        return Ok(AggLayout {
            size: 1,
            align: 1,
            offsets,
        });
    }

    Ok(AggLayout {
        size: round_up(size, align),
        align,
        offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::target::TargetConfig;

    fn table() -> TypeTable {
        TypeTable::new(TargetConfig::default_host())
    }

    #[test]
    fn byte_then_int_pads_to_eight() {
        let tt = table();
        let syms = Symbols::new();
        let fields = [
            (tt.basic(BasicKind::I8), None),
            (tt.basic(BasicKind::I32), None),
        ];
        let l = layout_fields(&tt, &syms, AggKind::Struct, &fields).unwrap();
        assert_eq!(l.offsets, vec![0, 4]);
        assert_eq!(l.size, 8);
        assert_eq!(l.align, 4);
    }

    #[test]
    fn trailing_padding_rounds_to_struct_alignment() {
        let tt = table();
        let syms = Symbols::new();
        let fields = [
            (tt.basic(BasicKind::I64), None),
            (tt.basic(BasicKind::I8), None),
        ];
        let l = layout_fields(&tt, &syms, AggKind::Struct, &fields).unwrap();
        assert_eq!(l.offsets, vec![0, 8]);
        assert_eq!(l.size, 16);
        assert_eq!(l.align, 8);
    }

    #[test]
    fn explicit_align_override_wins() {
        let tt = table();
        let syms = Symbols::new();
        let fields = [
            (tt.basic(BasicKind::I8), None),
            (tt.basic(BasicKind::I8), Some(4)),
        ];
        let l = layout_fields(&tt, &syms, AggKind::Struct, &fields).unwrap();
        assert_eq!(l.offsets, vec![0, 4]);
        assert_eq!(l.size, 8);
        assert_eq!(l.align, 4);
    }

    #[test]
    fn union_fields_share_offset_zero() {
        let tt = table();
        let syms = Symbols::new();
        let fields = [
            (tt.basic(BasicKind::I32), None),
            (tt.basic(BasicKind::I64), None),
            (tt.basic(BasicKind::U8), None),
        ];
        let l = layout_fields(&tt, &syms, AggKind::Union, &fields).unwrap();
        assert_eq!(l.offsets, vec![0, 0, 0]);
        assert_eq!(l.size, 8);
        assert_eq!(l.align, 8);
    }

    #[test]
    fn static_array_multiplies_element_size() {
        let tt = table();
        let syms = Symbols::new();
        let arr = tt.canonicalize(TypeShape::SArray(tt.basic(BasicKind::I32), 6));
        assert_eq!(size_of(&tt, &syms, arr).unwrap(), (24, 4));
    }

    #[test]
    fn dynamic_array_is_pointer_length_pair() {
        let tt = table();
        let syms = Symbols::new();
        let arr = tt.canonicalize(TypeShape::DArray(tt.basic(BasicKind::U8)));
        assert_eq!(size_of(&tt, &syms, arr).unwrap(), (16, 8));
    }
}
