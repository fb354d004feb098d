//! The abstract syntax tree produced by the parser.
//!
//! The AST is untyped and immutable: semantic analysis never mutates these
//! nodes, it reads them and produces symbols and typed trees of its own.
//! Template instantiation relies on that immutability; instantiating a
//! template clones the declaration nodes and re-analyzes the clone with the
//! template parameters bound.

mod decl;
mod expression;
mod path;
mod statement;
mod ty;

pub use self::decl::{
    AggKind, FieldDecl, FunctionDecl, ImportDecl, Item, Linkage, Parameter, SourceModule,
    StaticDecl, StructDecl, TemplateParam, TypeAliasDecl, VersionCond, VersionDecl,
};
pub use self::expression::{
    BinaryOperator, ExprKind, Expression, StructLitField, TemplateArgExpr, UnaryOperator,
};
pub use self::path::Path;
pub use self::statement::{AsmOperand, AsmStatement, Statement, StmtKind};
pub use self::ty::{Qualifier, TypeExpr, TypeExprKind};
