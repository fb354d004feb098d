//! The typed trees produced by semantic analysis.
//!
//! Pass 3 rewrites each function body from the untyped AST into this form:
//! every expression carries its resolved [`TypeId`], every name is a
//! resolved local/parameter/symbol reference, and implicit conversions are
//! explicit nodes.  Code generation consumes these trees without ever
//! looking back at the AST.

use crate::compiler::sym::SymbolId;
use crate::compiler::types::TypeId;
use crate::compiler::Span;
use crate::StringId;

use super::super::ast::{BinaryOperator, UnaryOperator};

/// Index into the owning function's local list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compile time constant value.  Produced by constant folding; consumed by
/// static initializer encoding, template value arguments, and array
/// dimensions.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i128),
    Bool(bool),
    Real(f64),
    Str(StringId),
    Null,
    Array(Vec<ConstValue>),
    /// Explicit field initializers as `(field index, value)` pairs, sparse
    /// and in source order.
    Struct(SymbolId, Vec<(usize, ConstValue)>),
    /// The address of a symbol with static storage duration.
    SymAddr(SymbolId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SemExpr {
    pub span: Span,
    pub ty: TypeId,
    pub kind: SemExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SemExprKind {
    Const(ConstValue),
    StringLit(StringId),
    Local(LocalId),
    Param(u32),
    Global(SymbolId),
    Binary(BinaryOperator, Box<SemExpr>, Box<SemExpr>),
    Unary(UnaryOperator, Box<SemExpr>),
    /// Implicit conversion inserted by the analyzer; the node's `ty` is the
    /// conversion target.
    Convert(Box<SemExpr>),
    Cast(Box<SemExpr>),
    Call {
        func: SymbolId,
        args: Vec<SemExpr>,
    },
    Field {
        base: Box<SemExpr>,
        field_index: usize,
    },
    Index {
        base: Box<SemExpr>,
        index: Box<SemExpr>,
    },
    AddrOf(Box<SemExpr>),
    Deref(Box<SemExpr>),
    StructLit {
        agg: SymbolId,
        inits: Vec<(usize, SemExpr)>,
    },
    ArrayLit(Vec<SemExpr>),
    /// Placeholder for an expression that failed to resolve; its type is
    /// the error type and lowering emits a zero in its place.
    Error,
}

impl SemExpr {
    pub fn new(span: Span, ty: TypeId, kind: SemExprKind) -> SemExpr {
        SemExpr { span, ty, kind }
    }

    pub fn error(span: Span, error_ty: TypeId) -> SemExpr {
        SemExpr {
            span,
            ty: error_ty,
            kind: SemExprKind::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SemBlock {
    pub stmts: Vec<SemStmt>,
    /// Locals declared directly in this block, in declaration order.  The
    /// binding level stack uses this to attach debug scoping.
    pub locals: Vec<LocalId>,
}

impl SemBlock {
    pub fn empty() -> SemBlock {
        SemBlock {
            stmts: vec![],
            locals: vec![],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SemStmt {
    pub span: Span,
    pub kind: SemStmtKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SemStmtKind {
    Let {
        local: LocalId,
        init: SemExpr,
    },
    Assign {
        lhs: SemExpr,
        rhs: SemExpr,
    },
    Expr(SemExpr),
    If {
        cond: SemExpr,
        then_block: SemBlock,
        else_block: SemBlock,
    },
    While {
        cond: SemExpr,
        body: SemBlock,
    },
    Return(Option<SemExpr>),
    Block(SemBlock),
    Label(StringId),
    Goto(StringId),
    Asm(AsmCode),
}

/// Operand kind of an inline assembly argument, derived from its constraint
/// string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsmArgKind {
    Integer,
    Pointer,
    Memory,
    FrameRelative,
    LocalSize,
    /// A private synthetic label operand; see the codegen asm module for
    /// why these are emitted twice.
    Dollar,
}

/// Access mode of an inline assembly argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsmArgMode {
    Input,
    Output,
    Update,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AsmArg {
    pub kind: AsmArgKind,
    pub mode: AsmArgMode,
    pub name: Option<StringId>,
    pub expr: SemExpr,
}

/// The analyzed form of one inline assembly statement.  Built during
/// semantic analysis of the statement, consumed once when the statement is
/// lowered, then discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmCode {
    pub insn_template: String,
    pub args: Vec<AsmArg>,
    /// Bitmask over the target's register table.
    pub regs: u64,
    pub clobbers_memory: bool,
    /// Serial of the private label this statement defines, when it does.
    pub dollar_label: Option<u32>,
}
