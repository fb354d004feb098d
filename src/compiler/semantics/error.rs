use crate::{
    compiler::{ast::Path, CompilerDisplay, CompilerDisplayError, SourceMap},
    StringId, StringTable,
};

/// Errors generated during semantic analysis of a compilation unit.
///
/// Type operands are carried pre-rendered (the canonical type table is not
/// available at display time), everything else as the ids the analyzer
/// worked with.
#[derive(Clone, Debug, PartialEq)]
pub enum SemanticError {
    NotDefined(StringId),
    PathNotFound(Path),
    AmbiguousSymbol(StringId),
    AlreadyDeclared(StringId),
    CircularDependency(StringId),
    NotAVariable(StringId),
    NotCallable(StringId),
    NotAType(StringId),
    NotATemplate(StringId),
    AmbiguousCall(StringId),
    AmbiguousTemplateMatch(StringId),
    NoMatchingOverload(StringId),
    WrongNumberOfArgs(StringId, usize, usize),
    WrongNumberOfTemplateArgs(StringId, usize, usize),
    BindMismatch(String, String),
    AssignMismatch(String, String),
    ReturnExpected(String, String),
    CondExpectedBool(String),
    OpExpected(String, String, String),
    UnaryOpExpected(String, String),
    ExpressionNotMutable,
    NotAnLValue,
    MemberNotFound(StringId, String),
    MemberAccessInvalidRootType(String),
    IndexingInvalidType(String),
    IndexInvalidIndexType(String),
    ArrayInconsistentElementTypes,
    ArrayInvalidSize(i128),
    InvalidTypeCast(String, String),
    NonConstantExpression,
    TypeHasNoSize(String),
    RecursiveValueType(StringId),
    AsmConstraintNotConstant,
    AsmClobberNotConstant,
    AsmTemplateNotConstant,
    AsmUnknownClobber(String),
    AsmInvalidConstraint(String),
    AsmNotSupported,
    AsmOutputNotLValue,
    UnknownLabel(StringId),
    DuplicateLabel(StringId),
    DeferredQueueStuck(usize),
}

impl CompilerDisplay for SemanticError {
    /// Turn a SemanticError into a human readable message, converting ids to
    /// their string values.
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        use SemanticError::*;
        match self {
            NotDefined(sid) => Ok(format!(
                "could not find definition for {} in this scope",
                sid.fmt(sm, st)?
            )),
            PathNotFound(path) => Ok(format!(
                "could not find item with the given path: {}",
                path.fmt(sm, st)?
            )),
            AmbiguousSymbol(sid) => Ok(format!(
                "{} is reachable through more than one import and the uses conflict",
                sid.fmt(sm, st)?
            )),
            AlreadyDeclared(sid) => Ok(format!("{} already declared", sid.fmt(sm, st)?)),
            CircularDependency(sid) => Ok(format!(
                "circular dependency while resolving {}",
                sid.fmt(sm, st)?
            )),
            NotAVariable(sid) => Ok(format!("{} is not a variable", sid.fmt(sm, st)?)),
            NotCallable(sid) => Ok(format!("{} is not a function", sid.fmt(sm, st)?)),
            NotAType(sid) => Ok(format!("{} does not name a type", sid.fmt(sm, st)?)),
            NotATemplate(sid) => Ok(format!("{} is not a template", sid.fmt(sm, st)?)),
            AmbiguousCall(sid) => Ok(format!(
                "call of {} is ambiguous: multiple overloads match equally well",
                sid.fmt(sm, st)?
            )),
            AmbiguousTemplateMatch(sid) => Ok(format!(
                "template {} matches multiple specializations equally well",
                sid.fmt(sm, st)?
            )),
            NoMatchingOverload(sid) => Ok(format!(
                "no overload of {} matches the argument types",
                sid.fmt(sm, st)?
            )),
            WrongNumberOfArgs(sid, expected, actual) => Ok(format!(
                "{} expects {} arguments but got {}",
                sid.fmt(sm, st)?,
                expected,
                actual
            )),
            WrongNumberOfTemplateArgs(sid, expected, actual) => Ok(format!(
                "template {} expects {} arguments but got {}",
                sid.fmt(sm, st)?,
                expected,
                actual
            )),
            BindMismatch(expected, actual) => {
                Ok(format!("bind expected {} but got {}", expected, actual))
            }
            AssignMismatch(expected, actual) => Ok(format!(
                "cannot assign {} to a location of type {}",
                actual, expected
            )),
            ReturnExpected(expected, actual) => {
                Ok(format!("return expected {} but got {}", expected, actual))
            }
            CondExpectedBool(actual) => Ok(format!(
                "expected boolean expression in conditional, got: {}",
                actual
            )),
            OpExpected(op, l, r) => Ok(format!(
                "{} cannot be applied to operands of type {} and {}",
                op, l, r
            )),
            UnaryOpExpected(op, ty) => {
                Ok(format!("{} cannot be applied to an operand of type {}", op, ty))
            }
            ExpressionNotMutable => Ok("expression is not mutable".into()),
            NotAnLValue => Ok("expression is not addressable".into()),
            MemberNotFound(sid, ty) => Ok(format!(
                "{} does not have member {}",
                ty,
                sid.fmt(sm, st)?
            )),
            MemberAccessInvalidRootType(ty) => {
                Ok(format!("member access requires an aggregate, got {}", ty))
            }
            IndexingInvalidType(ty) => Ok(format!(
                "expected array or pointer type on left of [] but found {}",
                ty
            )),
            IndexInvalidIndexType(ty) => Ok(format!(
                "expected integral type for index but found {}",
                ty
            )),
            ArrayInconsistentElementTypes => Ok("inconsistent types in array value".into()),
            ArrayInvalidSize(sz) => {
                Ok(format!("expected length > 0 for array, but found {}", sz))
            }
            InvalidTypeCast(from, to) => Ok(format!("cannot cast {} to {}", from, to)),
            NonConstantExpression => {
                Ok("expression must be a compile time constant".into())
            }
            TypeHasNoSize(ty) => Ok(format!("{} has no size", ty)),
            RecursiveValueType(sid) => Ok(format!(
                "{} contains itself by value and would have infinite size",
                sid.fmt(sm, st)?
            )),
            AsmConstraintNotConstant => {
                Ok("constraint must be a constant char string".into())
            }
            AsmClobberNotConstant => {
                Ok("clobber specification must be a constant char string".into())
            }
            AsmTemplateNotConstant => {
                Ok("instruction template must be a constant char string".into())
            }
            AsmUnknownClobber(name) => {
                Ok(format!("unknown register in clobber list: {}", name))
            }
            AsmInvalidConstraint(c) => Ok(format!("invalid operand constraint: {}", c)),
            AsmNotSupported => {
                Ok("assembler statements are not supported on this target".into())
            }
            AsmOutputNotLValue => Ok("asm output operand must be assignable".into()),
            UnknownLabel(sid) => Ok(format!("label {} is not defined", sid.fmt(sm, st)?)),
            DuplicateLabel(sid) => Ok(format!("label {} already defined", sid.fmt(sm, st)?)),
            DeferredQueueStuck(len) => Ok(format!(
                "deferred semantic queue failed to make progress with {} items pending",
                len
            )),
        }
    }
}
