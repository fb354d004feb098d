use crate::compiler::Span;
use crate::StringId;

use super::{Expression, TypeExpr};

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    /// `let x: T := init;`; the type may be omitted and inferred from the
    /// initializer.
    Let {
        name: StringId,
        mutable: bool,
        ty: Option<TypeExpr>,
        init: Expression,
    },

    /// `lhs := rhs;`
    Assign {
        lhs: Expression,
        rhs: Expression,
    },

    Expr(Expression),

    If {
        cond: Expression,
        then_block: Vec<Statement>,
        else_block: Vec<Statement>,
    },

    While {
        cond: Expression,
        body: Vec<Statement>,
    },

    Return(Option<Expression>),

    Block(Vec<Statement>),

    /// `'name:`; a jump target.  Labels referenced from inline assembly get
    /// special handling during lowering (see the codegen asm module).
    Label(StringId),

    /// `goto 'name;`
    Goto(StringId),

    Asm(AsmStatement),
}

/// One operand of an asm statement: a constraint string expression and the
/// value expression it binds.  The constraint must resolve to a compile time
/// string constant; that is enforced during semantic analysis, not parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmOperand {
    pub name: Option<StringId>,
    pub constraint: Expression,
    pub expr: Expression,
}

/// An extended inline assembly statement:
///
/// ```text
/// asm("addq %1, %0" : "+m"(total) : "i"(5) : "rax", "memory");
/// ```
///
/// The first operand group is outputs, the second inputs, the third the
/// clobber list.  Groups may be omitted from the right.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmStatement {
    pub template: Expression,
    pub outputs: Vec<AsmOperand>,
    pub inputs: Vec<AsmOperand>,
    pub clobbers: Vec<Expression>,
}

impl Statement {
    pub fn new(span: Span, kind: StmtKind) -> Statement {
        Statement { span, kind }
    }
}
