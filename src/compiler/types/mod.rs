//! Canonical representation of types.
//!
//! Every type the compiler works with is interned in the [`TypeTable`]:
//! structurally identical types always canonicalize to the same [`TypeId`],
//! so type equality anywhere else in the compiler is an integer comparison.
//! Qualified variants (`const T`, ...) are built lazily and cached against
//! their base type.  The table is created once per compilation run and lives
//! for the whole run; nothing is ever removed from it.

pub mod layout;

use std::cell::RefCell;
use std::collections::HashMap;

use crate::compiler::ast::Qualifier;
use crate::compiler::sym::SymbolId;
use crate::compiler::target::TargetConfig;

/// The fixed width scalar kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BasicKind {
    Void,
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl BasicKind {
    pub fn size(self) -> u64 {
        use BasicKind::*;
        match self {
            Void => 0,
            Bool | Char | I8 | U8 => 1,
            I16 | U16 => 2,
            I32 | U32 | F32 => 4,
            I64 | U64 | F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        use BasicKind::*;
        matches!(self, I8 | I16 | I32 | I64 | U8 | U16 | U32 | U64 | Char | Bool)
    }

    pub fn is_signed(self) -> bool {
        use BasicKind::*;
        matches!(self, I8 | I16 | I32 | I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, BasicKind::F32 | BasicKind::F64)
    }

    /// The source spelling, used when reporting and mangling.
    pub fn name(self) -> &'static str {
        use BasicKind::*;
        match self {
            Void => "void",
            Bool => "bool",
            Char => "char",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            F32 => "f32",
            F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<BasicKind> {
        use BasicKind::*;
        Some(match name {
            "void" => Void,
            "bool" => Bool,
            "char" => Char,
            "i8" => I8,
            "i16" => I16,
            "i32" => I32,
            "i64" => I64,
            "u8" => U8,
            "u16" => U16,
            "u32" => U32,
            "u64" => U64,
            "f32" => F32,
            "f64" => F64,
            _ => return None,
        })
    }
}

/// Calling convention tag carried by function types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallConv {
    Native,
    Foreign,
}

/// The structural description of a function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnShape {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub conv: CallConv,
    pub variadic: bool,
}

/// A canonical type handle.  Two `TypeId`s are equal iff the types are
/// structurally identical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The structural shape a [`TypeId`] canonicalizes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeShape {
    Basic(BasicKind),
    Pointer(TypeId),
    /// Fixed dimension array.
    SArray(TypeId, u64),
    /// Pointer + length pair.
    DArray(TypeId),
    AArray(TypeId, TypeId),
    /// Nominal aggregate; layout lives on the declaring symbol.
    Aggregate(SymbolId),
    Function(FnShape),
    Qualified(Qualifier, TypeId),
    /// The variadic argument list type.  Compatible with the backend's
    /// native equivalent (a raw pointer) when bridging.
    VaList,
    /// Placeholder substituted wherever resolution failed; compatible with
    /// nothing, but tolerated by every traversal.
    Error,
}

pub struct TypeTable {
    shapes: RefCell<Vec<TypeShape>>,
    index: RefCell<HashMap<TypeShape, TypeId>>,
    /// Cache of qualifier applications: `(base, qualifier) -> wrapped`.
    qual_cache: RefCell<HashMap<(TypeId, Qualifier), TypeId>>,
    target: TargetConfig,
}

impl TypeTable {
    pub fn new(target: TargetConfig) -> TypeTable {
        TypeTable {
            shapes: RefCell::new(Vec::new()),
            index: RefCell::new(HashMap::new()),
            qual_cache: RefCell::new(HashMap::new()),
            target,
        }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Interns a structurally described type.  Repeated calls with an equal
    /// shape return the identical [`TypeId`].
    pub fn canonicalize(&self, shape: TypeShape) -> TypeId {
        if let Some(id) = self.index.borrow().get(&shape) {
            return *id;
        }
        let mut shapes = self.shapes.borrow_mut();
        let id = TypeId(shapes.len() as u32);
        shapes.push(shape.clone());
        self.index.borrow_mut().insert(shape, id);
        id
    }

    pub fn basic(&self, kind: BasicKind) -> TypeId {
        self.canonicalize(TypeShape::Basic(kind))
    }

    pub fn pointer_to(&self, target: TypeId) -> TypeId {
        self.canonicalize(TypeShape::Pointer(target))
    }

    pub fn error_type(&self) -> TypeId {
        self.canonicalize(TypeShape::Error)
    }

    pub fn shape(&self, id: TypeId) -> TypeShape {
        self.shapes.borrow()[id.index()].clone()
    }

    /// Returns the qualifier wrapped variant of `base`, creating and caching
    /// it if absent.  Idempotent: applying a qualifier a type already
    /// carries returns the type unchanged.  Nested qualifiers are kept in a
    /// canonical order so that the application order does not affect
    /// identity, and `immutable` absorbs `const`.
    pub fn qualify(&self, base: TypeId, q: Qualifier) -> TypeId {
        if let Some(cached) = self.qual_cache.borrow().get(&(base, q)) {
            return *cached;
        }

        let (mut quals, naked) = self.peel_qualifiers(base);
        if !quals.contains(&q) {
            quals.push(q);
        }
        if quals.contains(&Qualifier::Immutable) {
            quals.retain(|&x| x != Qualifier::Const);
        }
        quals.sort();

        // Rebuild outermost-first so that the canonical nesting is always
        // sorted from the outside in.
        let mut ty = naked;
        for qq in quals.iter().rev() {
            ty = self.canonicalize(TypeShape::Qualified(*qq, ty));
        }

        self.qual_cache.borrow_mut().insert((base, q), ty);
        ty
    }

    /// Splits a type into its qualifier set and its unqualified base.
    pub fn peel_qualifiers(&self, mut id: TypeId) -> (Vec<Qualifier>, TypeId) {
        let mut quals = vec![];
        loop {
            match self.shape(id) {
                TypeShape::Qualified(q, inner) => {
                    if !quals.contains(&q) {
                        quals.push(q);
                    }
                    id = inner;
                }
                _ => break,
            }
        }
        (quals, id)
    }

    /// The type with every qualifier removed.
    pub fn unqualified(&self, id: TypeId) -> TypeId {
        self.peel_qualifiers(id).1
    }

    pub fn is_error(&self, id: TypeId) -> bool {
        matches!(self.shape(id), TypeShape::Error)
    }

    /// Compatibility query used when bridging front end types to the
    /// backend's type nodes.  Types are compatible when canonically
    /// identical; additionally the variadic argument list type matches the
    /// backend's native equivalent (a raw pointer), arrays of the identical
    /// element type match each other across fixed/dynamic kinds, and
    /// function types match when their shapes differ only in nothing at all
    /// (identical attribute sets required).
    pub fn is_compatible(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.shape(a), self.shape(b)) {
            (TypeShape::VaList, TypeShape::Pointer(t))
            | (TypeShape::Pointer(t), TypeShape::VaList) => {
                matches!(self.shape(t), TypeShape::Basic(BasicKind::Void))
            }
            (TypeShape::SArray(e1, _), TypeShape::DArray(e2))
            | (TypeShape::DArray(e1), TypeShape::SArray(e2, _)) => e1 == e2,
            _ => false,
        }
    }

    /// Whether a value of type `src` may initialize or assign a location of
    /// type `dst` without an explicit conversion, considering qualifiers:
    /// identical types always; `immutable` sources satisfy `const`
    /// destinations.
    pub fn is_assign_compatible(&self, dst: TypeId, src: TypeId) -> bool {
        if dst == src {
            return true;
        }
        let (dst_q, dst_base) = self.peel_qualifiers(dst);
        let (src_q, src_base) = self.peel_qualifiers(src);
        if dst_base != src_base {
            return false;
        }
        // Every qualifier the destination demands must be satisfied by the
        // source.  `const` is satisfied by any source (it only restricts the
        // destination's view, and immutable implies const); `immutable` and
        // `shared` must be supplied exactly.
        dst_q.iter().all(|q| match q {
            Qualifier::Const => true,
            Qualifier::Immutable | Qualifier::Shared => src_q.contains(q),
        })
    }

    pub fn len(&self) -> usize {
        self.shapes.borrow().len()
    }
}

impl std::fmt::Debug for TypeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeTable")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypeTable {
        TypeTable::new(TargetConfig::default_host())
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let tt = table();
        let i32a = tt.basic(BasicKind::I32);
        let i32b = tt.canonicalize(TypeShape::Basic(BasicKind::I32));
        assert_eq!(i32a, i32b);

        let p1 = tt.pointer_to(i32a);
        let p2 = tt.canonicalize(TypeShape::Pointer(i32b));
        assert_eq!(p1, p2);

        let a1 = tt.canonicalize(TypeShape::SArray(i32a, 4));
        let a2 = tt.canonicalize(TypeShape::SArray(i32a, 4));
        let a3 = tt.canonicalize(TypeShape::SArray(i32a, 5));
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);
    }

    #[test]
    fn qualify_is_idempotent() {
        let tt = table();
        let t = tt.basic(BasicKind::I64);
        let c1 = tt.qualify(t, Qualifier::Const);
        let c2 = tt.qualify(c1, Qualifier::Const);
        assert_eq!(c1, c2);
        assert_ne!(c1, t);
    }

    #[test]
    fn qualifier_application_order_does_not_matter() {
        let tt = table();
        let t = tt.basic(BasicKind::U8);
        let a = tt.qualify(tt.qualify(t, Qualifier::Const), Qualifier::Shared);
        let b = tt.qualify(tt.qualify(t, Qualifier::Shared), Qualifier::Const);
        assert_eq!(a, b);
    }

    #[test]
    fn immutable_absorbs_const() {
        let tt = table();
        let t = tt.basic(BasicKind::I32);
        let im = tt.qualify(t, Qualifier::Immutable);
        let im_c = tt.qualify(im, Qualifier::Const);
        assert_eq!(im, im_c);
    }

    #[test]
    fn immutable_assigns_to_const() {
        let tt = table();
        let t = tt.basic(BasicKind::I32);
        let c = tt.qualify(t, Qualifier::Const);
        let im = tt.qualify(t, Qualifier::Immutable);
        assert!(tt.is_assign_compatible(c, im));
        assert!(!tt.is_assign_compatible(im, c));
    }

    #[test]
    fn va_list_bridges_to_void_pointer() {
        let tt = table();
        let va = tt.canonicalize(TypeShape::VaList);
        let voidp = tt.pointer_to(tt.basic(BasicKind::Void));
        let i32p = tt.pointer_to(tt.basic(BasicKind::I32));
        assert!(tt.is_compatible(va, voidp));
        assert!(tt.is_compatible(voidp, va));
        assert!(!tt.is_compatible(va, i32p));
    }

    #[test]
    fn arrays_of_identical_element_bridge() {
        let tt = table();
        let e = tt.basic(BasicKind::U8);
        let sa = tt.canonicalize(TypeShape::SArray(e, 16));
        let da = tt.canonicalize(TypeShape::DArray(e));
        let da64 = tt.canonicalize(TypeShape::DArray(tt.basic(BasicKind::U64)));
        assert!(tt.is_compatible(sa, da));
        assert!(!tt.is_compatible(sa, da64));
    }
}
