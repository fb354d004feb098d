//! The symbol table: every named entity the compiler knows about.
//!
//! Symbols live in a single arena owned by the [`CompilationContext`] and
//! persist for the whole run; later passes and code generation keep
//! referring to them, so nothing is ever freed.  All relationships between
//! symbols (enclosing scope, template instance to originating template,
//! overload chains) are plain [`SymbolId`] references into the arena, never
//! ownership edges.
//!
//! Symbol kinds are a closed enum with safe downcasts (`as_function`,
//! `as_aggregate`, ...) rather than a virtual hierarchy; a `match` that
//! forgets a kind fails to compile instead of failing at runtime.
//!
//! [`CompilationContext`]: crate::compiler::context::CompilationContext

mod imports;

pub use imports::{lookup_in_module, LookupOutcome};

use std::collections::HashMap;
use std::rc::Rc;

use crate::compiler::ast;
use crate::compiler::semantics::tree::{ConstValue, SemBlock};
use crate::compiler::types::layout::AggLayout;
use crate::compiler::types::TypeId;
use crate::compiler::Span;
use crate::StringId;

/// Index of a symbol in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Index of a module in the compilation context's module list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Visibility of an import edge.  A private import's symbols are visible
/// only within the importing module; a public import re-exports them to the
/// module's own importers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// The three semantic passes a symbol moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassId {
    /// Headers: types of globals, function signatures, member lists.
    One,
    /// Member bodies: layouts and static initializer types.
    Two,
    /// Function bodies.
    Three,
}

impl PassId {
    fn index(self) -> usize {
        match self {
            PassId::One => 0,
            PassId::Two => 1,
            PassId::Three => 2,
        }
    }
}

/// Per-pass resolution state.  Entering `InProgress` while already
/// `InProgress` for the same pass is how a circular dependency is detected:
/// the guard is explicit so a true cycle becomes a reported error instead of
/// unbounded recursion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Unresolved,
    InProgress,
    Resolved,
}

/// One local variable of a function body, assigned during pass 3.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalDef {
    pub name: StringId,
    pub ty: TypeId,
    pub mutable: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncSymbol {
    pub decl: Rc<ast::FunctionDecl>,
    /// Canonical function type; absent until pass 1 resolves the signature.
    pub sig: Option<TypeId>,
    pub linkage: ast::Linkage,
    /// Next function with the same name in the same scope.  Same-name
    /// function declarations chain into an overload set, in declaration
    /// order, rather than being duplicate declaration errors.
    pub next_overload: Option<SymbolId>,
    /// The originating template when this function is an instantiation.
    pub template_origin: Option<SymbolId>,
    /// Template parameter bindings active while resolving this function;
    /// empty outside template instances.
    pub bindings: Vec<(StringId, TemplateArgKey)>,
    /// Locals allocated while analyzing the body, indexed by local id.
    pub locals: Vec<LocalDef>,
    /// The typed body produced by pass 3.  Absent for extern declarations.
    pub body: Option<SemBlock>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarSymbol {
    pub decl: Rc<ast::StaticDecl>,
    pub ty: Option<TypeId>,
    pub linkage: ast::Linkage,
    /// Constant-folded initializer, computed in pass 2 and consumed by
    /// static initializer encoding.
    pub init: Option<ConstValue>,
}

/// A resolved aggregate field.  `default` is the constant-folded declared
/// initializer used by static initializer encoding when an instance does not
/// supply its own value.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub name: StringId,
    pub span: Span,
    pub ty: TypeId,
    pub align: Option<u64>,
    pub default: Option<ConstValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggSymbol {
    pub decl: Rc<ast::StructDecl>,
    pub kind: ast::AggKind,
    /// Resolved fields, filled during pass 1; layout during pass 2.
    pub fields: Vec<FieldInfo>,
    pub layout: Option<AggLayout>,
    pub template_origin: Option<SymbolId>,
    /// Template parameter bindings active while resolving this aggregate;
    /// empty outside template instances.
    pub bindings: Vec<(StringId, TemplateArgKey)>,
}

/// Key identifying one instantiation of a template: the argument tuple.
/// Structural equality of the key is what memoizes instantiation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub args: Vec<TemplateArgKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TemplateArgKey {
    Type(TypeId),
    Value(i128),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateDeclKind {
    Func(Rc<ast::FunctionDecl>),
    Struct(Rc<ast::StructDecl>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemplateSymbol {
    pub decl: TemplateDeclKind,
    pub params: Vec<ast::TemplateParam>,
    /// Memoized instantiations: repeated instantiation with an identical
    /// argument tuple reuses the same symbol.
    pub instances: HashMap<InstanceKey, SymbolId>,
    /// Next same-name template in this scope; same-name templates chain
    /// like function overloads so specialization ordering can pick between
    /// them.
    pub next_overload: Option<SymbolId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasSymbol {
    pub decl: Rc<ast::TypeAliasDecl>,
    pub target: Option<TypeId>,
}

/// The scope body of a module symbol: declarations in source order (for
/// deterministic emission), a name index, and the resolved import edges.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ModuleScope {
    pub decls: Vec<SymbolId>,
    pub members: HashMap<StringId, SymbolId>,
    pub imports: Vec<(ModuleId, Visibility)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolKind {
    Module(ModuleScope),
    Function(FuncSymbol),
    Variable(VarSymbol),
    Aggregate(AggSymbol),
    Template(TemplateSymbol),
    Alias(AliasSymbol),
    /// Placeholder substituted for a symbol that could not be resolved, so
    /// analysis can continue past the error.
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: StringId,
    pub span: Span,
    /// Enclosing scope: the owning module or aggregate.  A back-reference,
    /// not an ownership edge.
    pub parent: Option<SymbolId>,
    pub module: ModuleId,
    pub kind: SymbolKind,
    pass: [PassState; 3],
}

impl Symbol {
    pub fn new(
        name: StringId,
        span: Span,
        parent: Option<SymbolId>,
        module: ModuleId,
        kind: SymbolKind,
    ) -> Symbol {
        Symbol {
            name,
            span,
            parent,
            module,
            kind,
            pass: [PassState::Unresolved; 3],
        }
    }

    pub fn as_function(&self) -> Option<&FuncSymbol> {
        match &self.kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FuncSymbol> {
        match &mut self.kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggSymbol> {
        match &self.kind {
            SymbolKind::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_aggregate_mut(&mut self) -> Option<&mut AggSymbol> {
        match &mut self.kind {
            SymbolKind::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VarSymbol> {
        match &self.kind {
            SymbolKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variable_mut(&mut self) -> Option<&mut VarSymbol> {
        match &mut self.kind {
            SymbolKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&TemplateSymbol> {
        match &self.kind {
            SymbolKind::Template(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_template_mut(&mut self) -> Option<&mut TemplateSymbol> {
        match &mut self.kind {
            SymbolKind::Template(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleScope> {
        match &self.kind {
            SymbolKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleScope> {
        match &mut self.kind {
            SymbolKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&AliasSymbol> {
        match &self.kind {
            SymbolKind::Alias(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, SymbolKind::Error)
    }
}

/// Failure modes of [`Symbols::declare`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeclareError {
    /// An incompatible symbol with the same identifier already exists in the
    /// exact same scope.
    Duplicate { existing: SymbolId },
    /// The scope symbol is not something declarations can be inserted into.
    NotAScope,
}

/// The arena owning every symbol for the compilation run.
#[derive(Debug, Default)]
pub struct Symbols {
    arena: Vec<Symbol>,
}

impl Symbols {
    pub fn new() -> Symbols {
        Symbols::default()
    }

    pub fn alloc(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(self.arena.len() as u32);
        self.arena.push(sym);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.arena[id.index()]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn pass_state(&self, id: SymbolId, pass: PassId) -> PassState {
        self.arena[id.index()].pass[pass.index()]
    }

    pub fn set_pass_state(&mut self, id: SymbolId, pass: PassId, state: PassState) {
        self.arena[id.index()].pass[pass.index()] = state;
    }

    pub fn agg_layout(&self, id: SymbolId) -> Option<&AggLayout> {
        self.get(id).as_aggregate().and_then(|a| a.layout.as_ref())
    }

    fn chain_next(&self, id: SymbolId) -> Option<SymbolId> {
        match &self.get(id).kind {
            SymbolKind::Function(f) => f.next_overload,
            SymbolKind::Template(t) => t.next_overload,
            _ => None,
        }
    }

    fn set_chain_next(&mut self, id: SymbolId, next: SymbolId) {
        match &mut self.get_mut(id).kind {
            SymbolKind::Function(f) => f.next_overload = Some(next),
            SymbolKind::Template(t) => t.next_overload = Some(next),
            _ => unreachable!("overload chain contains a non-overloadable symbol"),
        }
    }

    /// Inserts `sym` into the member list of the scope symbol `scope`.
    ///
    /// Same-name overloadable declarations (functions, and templates which
    /// carry specializations) are chained into an overload set in
    /// declaration order rather than rejected; any other same-name pairing
    /// is a duplicate declaration error, reported by the caller.
    pub fn declare(&mut self, scope: SymbolId, sym: Symbol) -> Result<SymbolId, DeclareError> {
        let name = sym.name;
        let new_overloadable = matches!(
            sym.kind,
            SymbolKind::Function(_) | SymbolKind::Template(_)
        );

        let existing = match self.get(scope).as_module() {
            Some(m) => m.members.get(&name).copied(),
            None => return Err(DeclareError::NotAScope),
        };

        if let Some(existing) = existing {
            let existing_overloadable = matches!(
                self.get(existing).kind,
                SymbolKind::Function(_) | SymbolKind::Template(_)
            );
            if !(new_overloadable && existing_overloadable) {
                return Err(DeclareError::Duplicate { existing });
            }
            // Append to the end of the chain so resolution order is
            // declaration order.
            let id = self.alloc(sym);
            let mut tail = existing;
            while let Some(n) = self.chain_next(tail) {
                tail = n;
            }
            self.set_chain_next(tail, id);
            let scope_mut = self.get_mut(scope).as_module_mut().unwrap();
            scope_mut.decls.push(id);
            Ok(id)
        } else {
            let id = self.alloc(sym);
            let scope_mut = self.get_mut(scope).as_module_mut().unwrap();
            scope_mut.decls.push(id);
            scope_mut.members.insert(name, id);
            Ok(id)
        }
    }

    /// All members of an overload set starting at its first declaration.
    pub fn overload_set(&self, first: SymbolId) -> Vec<SymbolId> {
        let mut set = vec![first];
        let mut cur = first;
        while let Some(next) = self.chain_next(cur) {
            set.push(next);
            cur = next;
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{FunctionDecl, Linkage, TypeExpr, TypeExprKind};
    use crate::compiler::types::BasicKind;

    fn module_symbol() -> Symbol {
        Symbol::new(
            StringId::default(),
            Span::zero(),
            None,
            ModuleId(0),
            SymbolKind::Module(ModuleScope::default()),
        )
    }

    fn func_symbol(name: StringId) -> Symbol {
        let decl = Rc::new(FunctionDecl {
            span: Span::zero(),
            name,
            template_params: vec![],
            params: vec![],
            ret: Some(TypeExpr::new(Span::zero(), TypeExprKind::Basic(BasicKind::Void))),
            is_variadic: false,
            linkage: Linkage::Native,
            body: Some(vec![]),
        });
        Symbol::new(
            name,
            Span::zero(),
            None,
            ModuleId(0),
            SymbolKind::Function(FuncSymbol {
                decl,
                sig: None,
                linkage: Linkage::Native,
                next_overload: None,
                template_origin: None,
                bindings: vec![],
                locals: vec![],
                body: None,
            }),
        )
    }

    #[test]
    fn same_name_functions_chain_into_overload_set() {
        let mut syms = Symbols::new();
        let st = crate::StringTable::new();
        let name = st.insert("f".into());
        let scope = syms.alloc(module_symbol());

        let a = syms.declare(scope, func_symbol(name)).unwrap();
        let b = syms.declare(scope, func_symbol(name)).unwrap();
        let c = syms.declare(scope, func_symbol(name)).unwrap();

        assert_eq!(syms.overload_set(a), vec![a, b, c]);
        // The name index still points at the first declaration.
        assert_eq!(syms.get(scope).as_module().unwrap().members[&name], a);
    }

    #[test]
    fn incompatible_same_name_declaration_is_rejected() {
        let mut syms = Symbols::new();
        let st = crate::StringTable::new();
        let name = st.insert("x".into());
        let scope = syms.alloc(module_symbol());

        let first = syms.declare(scope, func_symbol(name)).unwrap();
        let dup = Symbol::new(name, Span::zero(), None, ModuleId(0), SymbolKind::Error);
        assert_eq!(
            syms.declare(scope, dup),
            Err(DeclareError::Duplicate { existing: first })
        );
    }

    #[test]
    fn pass_state_machine_starts_unresolved() {
        let mut syms = Symbols::new();
        let id = syms.alloc(module_symbol());
        assert_eq!(syms.pass_state(id, PassId::One), PassState::Unresolved);
        syms.set_pass_state(id, PassId::One, PassState::InProgress);
        assert_eq!(syms.pass_state(id, PassId::One), PassState::InProgress);
        assert_eq!(syms.pass_state(id, PassId::Two), PassState::Unresolved);
    }
}
