//! Recursive descent parser from tokens to the AST.
//!
//! The parser is deliberately mechanical; all interesting judgement
//! (name resolution, typing, constant-ness) is left to semantic analysis.
//! It stops at the first syntax error in a file; unlike semantic errors,
//! a malformed token stream leaves nothing sensible to recover into.

use log::trace;
use stdext::function_name;

use crate::compiler::ast::*;
use crate::compiler::lexer::{Lex, Token};
use crate::compiler::types::BasicKind;
use crate::compiler::{
    CompilerDisplay, CompilerDisplayError, CompilerError, SourceMap, Span,
};
use crate::{StringId, StringTable};

#[derive(Clone, Debug, PartialEq)]
pub enum ParserError {
    UnexpectedEndOfFile,
    ExpectedButFound(String, Lex),
    ExpectedExpression(Lex),
    ExpectedType(Lex),
    ExpectedIdentifier(Lex),
    InvalidAlignValue,
    UnknownAbi(String),
}

impl CompilerDisplay for ParserError {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            ParserError::UnexpectedEndOfFile => "unexpected end of file".into(),
            ParserError::ExpectedButFound(expected, found) => {
                format!("expected {} but found {}", expected, found.fmt(sm, st)?)
            }
            ParserError::ExpectedExpression(found) => {
                format!("expected expression but found {}", found.fmt(sm, st)?)
            }
            ParserError::ExpectedType(found) => {
                format!("expected type but found {}", found.fmt(sm, st)?)
            }
            ParserError::ExpectedIdentifier(found) => {
                format!("expected identifier but found {}", found.fmt(sm, st)?)
            }
            ParserError::InvalidAlignValue => "align expects a positive power of two".into(),
            ParserError::UnknownAbi(abi) => format!("unknown linkage \"{}\"", abi),
        })
    }
}

type ParserResult<T> = Result<T, CompilerError<ParserError>>;

/// Parses one file's token stream into a [`SourceModule`].
pub fn parse_module(
    tokens: &[Token],
    file_span: Span,
    strings: &StringTable,
) -> ParserResult<SourceModule> {
    let mut p = Parser::new(tokens, file_span, strings);
    p.source_module()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file_span: Span,
    strings: &'a StringTable,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], file_span: Span, strings: &'a StringTable) -> Parser<'a> {
        Parser {
            tokens,
            pos: 0,
            file_span,
            strings,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn next(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::new(self.file_span.high(), self.file_span.high()))
    }

    fn eof_err<T>(&self) -> ParserResult<T> {
        Err(CompilerError::new(
            self.span(),
            ParserError::UnexpectedEndOfFile,
        ))
    }

    fn expect(&mut self, lex: Lex, what: &str) -> ParserResult<Span> {
        match self.peek() {
            Some(t) if t.lex == lex => {
                let span = t.span;
                self.pos += 1;
                Ok(span)
            }
            Some(t) => Err(CompilerError::new(
                t.span,
                ParserError::ExpectedButFound(what.into(), t.lex.clone()),
            )),
            None => self.eof_err(),
        }
    }

    fn consume_if(&mut self, lex: Lex) -> bool {
        match self.peek() {
            Some(t) if t.lex == lex => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn identifier(&mut self, what: &str) -> ParserResult<(StringId, Span)> {
        match self.peek() {
            Some(t) => match t.lex {
                Lex::Ident(id) => {
                    let span = t.span;
                    self.pos += 1;
                    Ok((id, span))
                }
                _ => Err(CompilerError::new(
                    t.span,
                    ParserError::ExpectedButFound(what.into(), t.lex.clone()),
                )),
            },
            None => self.eof_err(),
        }
    }

    // ---- declarations -------------------------------------------------

    fn source_module(&mut self) -> ParserResult<SourceModule> {
        trace!("{}", function_name!());
        let start = self.span();

        let name = if self.consume_if(Lex::Module) {
            let name = self.dotted_name()?;
            self.expect(Lex::Semicolon, ";")?;
            Some(name)
        } else {
            None
        };

        let mut items = vec![];
        while self.peek().is_some() {
            items.push(self.item()?);
        }

        Ok(SourceModule {
            span: start.extend_to(self.file_span),
            name,
            items,
        })
    }

    fn dotted_name(&mut self) -> ParserResult<Vec<StringId>> {
        let mut parts = vec![self.identifier("module name")?.0];
        while self.consume_if(Lex::Dot) {
            parts.push(self.identifier("module name")?.0);
        }
        Ok(parts)
    }

    fn item(&mut self) -> ParserResult<Item> {
        trace!("{} <- {:?}", function_name!(), self.peek().map(|t| &t.lex));
        match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Pub) | Some(Lex::Import) => self.import_decl().map(Item::Import),
            Some(Lex::Fn) => self.function_decl(Linkage::Native).map(Item::Func),
            Some(Lex::Extern) => self.extern_decl(),
            Some(Lex::Struct) | Some(Lex::Union) => self.struct_decl().map(Item::Struct),
            Some(Lex::Static) => self.static_decl(Linkage::Native).map(Item::Static),
            Some(Lex::Alias) => self.alias_decl().map(Item::Alias),
            Some(Lex::Version) => self.version_decl().map(Item::Version),
            Some(lex) => Err(CompilerError::new(
                self.span(),
                ParserError::ExpectedButFound("declaration".into(), lex),
            )),
            None => self.eof_err(),
        }
    }

    fn import_decl(&mut self) -> ParserResult<ImportDecl> {
        let start = self.span();
        let public = self.consume_if(Lex::Pub);
        self.expect(Lex::Import, "import")?;
        let path = self.dotted_name()?;
        let end = self.expect(Lex::Semicolon, ";")?;
        Ok(ImportDecl {
            span: start.extend_to(end),
            path,
            public,
        })
    }

    fn extern_decl(&mut self) -> ParserResult<Item> {
        self.expect(Lex::Extern, "extern")?;
        // `extern fn` defaults to C linkage; `extern "cpp" fn` selects the
        // foreign C++ mangling scheme.
        let linkage = match self.peek().map(|t| (t.lex.clone(), t.span)) {
            Some((Lex::Str(abi), span)) => {
                self.next();
                let abi = self.strings.get(abi).unwrap_or_default();
                match abi.as_str() {
                    "c" | "C" => Linkage::Foreign,
                    "cpp" | "c++" | "C++" => Linkage::ForeignCpp,
                    _ => return Err(CompilerError::new(span, ParserError::UnknownAbi(abi))),
                }
            }
            _ => Linkage::Foreign,
        };
        match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Fn) => self.function_decl(linkage).map(Item::Func),
            Some(Lex::Static) => self.static_decl(linkage).map(Item::Static),
            Some(lex) => Err(CompilerError::new(
                self.span(),
                ParserError::ExpectedButFound("fn or static after extern".into(), lex),
            )),
            None => self.eof_err(),
        }
    }

    fn function_decl(&mut self, linkage: Linkage) -> ParserResult<FunctionDecl> {
        trace!("{}", function_name!());
        let start = self.expect(Lex::Fn, "fn")?;
        let (name, _) = self.identifier("function name")?;
        let template_params = self.template_params()?;

        self.expect(Lex::LParen, "(")?;
        let mut params = vec![];
        let mut is_variadic = false;
        while !self.consume_if(Lex::RParen) {
            if self.consume_if(Lex::DotDotDot) {
                is_variadic = true;
                self.expect(Lex::RParen, ")")?;
                break;
            }
            let (pname, pspan) = self.identifier("parameter name")?;
            self.expect(Lex::Colon, ":")?;
            let ty = self.type_expr()?;
            params.push(Parameter {
                span: pspan.extend_to(ty.span),
                name: pname,
                ty,
            });
            if !self.consume_if(Lex::Comma) {
                self.expect(Lex::RParen, ")")?;
                break;
            }
        }

        let ret = if self.consume_if(Lex::Arrow) {
            Some(self.type_expr()?)
        } else {
            None
        };

        let (body, end) = if self.consume_if(Lex::Semicolon) {
            (None, self.span())
        } else {
            let b = self.block()?;
            (Some(b), self.span())
        };

        Ok(FunctionDecl {
            span: start.extend_to(end),
            name,
            template_params,
            params,
            ret,
            is_variadic,
            linkage,
            body,
        })
    }

    fn template_params(&mut self) -> ParserResult<Vec<TemplateParam>> {
        if !self.consume_if(Lex::LBracket) {
            return Ok(vec![]);
        }
        let mut params = vec![];
        loop {
            if self.consume_if(Lex::Const) {
                let (name, _) = self.identifier("template value parameter")?;
                self.expect(Lex::Colon, ":")?;
                let ty = self.type_expr()?;
                params.push(TemplateParam::Value { name, ty });
            } else {
                let (name, _) = self.identifier("template type parameter")?;
                let specialization = if self.consume_if(Lex::Colon) {
                    Some(self.type_expr()?)
                } else {
                    None
                };
                params.push(TemplateParam::Type {
                    name,
                    specialization,
                });
            }
            if !self.consume_if(Lex::Comma) {
                self.expect(Lex::RBracket, "]")?;
                break;
            }
        }
        Ok(params)
    }

    fn struct_decl(&mut self) -> ParserResult<StructDecl> {
        trace!("{}", function_name!());
        let (start, kind) = match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Struct) => (self.next().unwrap().span, AggKind::Struct),
            Some(Lex::Union) => (self.next().unwrap().span, AggKind::Union),
            _ => unreachable!("struct_decl called without struct/union token"),
        };
        let (name, _) = self.identifier("aggregate name")?;
        let template_params = self.template_params()?;
        self.expect(Lex::LBrace, "{")?;

        let mut fields = vec![];
        while !self.consume_if(Lex::RBrace) {
            let (fname, fspan) = self.identifier("field name")?;
            self.expect(Lex::Colon, ":")?;
            let ty = self.type_expr()?;

            let align = if self.consume_if(Lex::Align) {
                self.expect(Lex::LParen, "(")?;
                let v = match self.next() {
                    Some(Token {
                        lex: Lex::Integer(v, _),
                        ..
                    }) if *v > 0 && (*v as u64).is_power_of_two() => *v as u64,
                    _ => {
                        return Err(CompilerError::new(
                            self.span(),
                            ParserError::InvalidAlignValue,
                        ))
                    }
                };
                self.expect(Lex::RParen, ")")?;
                Some(v)
            } else {
                None
            };

            let init = if self.consume_if(Lex::Assign) {
                Some(self.expression()?)
            } else {
                None
            };

            fields.push(FieldDecl {
                span: fspan,
                name: fname,
                ty,
                align,
                init,
            });
            if !self.consume_if(Lex::Comma) {
                self.expect(Lex::RBrace, "}")?;
                break;
            }
        }

        Ok(StructDecl {
            span: start.extend_to(self.span()),
            name,
            kind,
            template_params,
            fields,
        })
    }

    fn static_decl(&mut self, linkage: Linkage) -> ParserResult<StaticDecl> {
        let start = self.expect(Lex::Static, "static")?;
        let mutable = self.consume_if(Lex::Mut);
        let (name, _) = self.identifier("static name")?;
        self.expect(Lex::Colon, ":")?;
        let ty = self.type_expr()?;
        let init = if self.consume_if(Lex::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        let end = self.expect(Lex::Semicolon, ";")?;
        Ok(StaticDecl {
            span: start.extend_to(end),
            name,
            mutable,
            ty,
            init,
            linkage,
        })
    }

    fn alias_decl(&mut self) -> ParserResult<TypeAliasDecl> {
        let start = self.expect(Lex::Alias, "alias")?;
        let (name, _) = self.identifier("alias name")?;
        self.expect(Lex::Assign, ":=")?;
        let target = self.type_expr()?;
        let end = self.expect(Lex::Semicolon, ";")?;
        Ok(TypeAliasDecl {
            span: start.extend_to(end),
            name,
            target,
        })
    }

    fn version_decl(&mut self) -> ParserResult<VersionDecl> {
        let start = self.expect(Lex::Version, "version")?;
        self.expect(Lex::LParen, "(")?;
        let cond = match self.next() {
            Some(Token {
                lex: Lex::Ident(id),
                ..
            }) => VersionCond::Ident(*id),
            Some(Token {
                lex: Lex::Integer(v, _),
                ..
            }) => VersionCond::Level(*v as u32),
            Some(t) => {
                return Err(CompilerError::new(
                    t.span,
                    ParserError::ExpectedButFound(
                        "version identifier or level".into(),
                        t.lex.clone(),
                    ),
                ))
            }
            None => return self.eof_err(),
        };
        self.expect(Lex::RParen, ")")?;

        self.expect(Lex::LBrace, "{")?;
        let mut then_items = vec![];
        while !self.consume_if(Lex::RBrace) {
            then_items.push(self.item()?);
        }

        let mut else_items = vec![];
        if self.consume_if(Lex::Else) {
            self.expect(Lex::LBrace, "{")?;
            while !self.consume_if(Lex::RBrace) {
                else_items.push(self.item()?);
            }
        }

        Ok(VersionDecl {
            span: start.extend_to(self.span()),
            cond,
            then_items,
            else_items,
        })
    }

    // ---- types --------------------------------------------------------

    fn type_expr(&mut self) -> ParserResult<TypeExpr> {
        trace!("{} <- {:?}", function_name!(), self.peek().map(|t| &t.lex));
        let start = self.span();

        for (lex, q) in [
            (Lex::Const, Qualifier::Const),
            (Lex::Immutable, Qualifier::Immutable),
            (Lex::Shared, Qualifier::Shared),
        ]
        .iter()
        {
            if self.consume_if(lex.clone()) {
                let inner = self.type_expr()?;
                let span = start.extend_to(inner.span);
                return Ok(TypeExpr::new(span, TypeExprKind::Qualified(*q, Box::new(inner))));
            }
        }

        match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Mul) => {
                self.next();
                let inner = self.type_expr()?;
                let span = start.extend_to(inner.span);
                Ok(TypeExpr::new(span, TypeExprKind::Pointer(Box::new(inner))))
            }
            Some(Lex::LBracket) => {
                self.next();
                let elem = self.type_expr()?;
                if self.consume_if(Lex::Semicolon) {
                    let dim = self.expression()?;
                    let end = self.expect(Lex::RBracket, "]")?;
                    Ok(TypeExpr::new(
                        start.extend_to(end),
                        TypeExprKind::SArray(Box::new(elem), Box::new(dim)),
                    ))
                } else if self.consume_if(Lex::Colon) {
                    let value = self.type_expr()?;
                    let end = self.expect(Lex::RBracket, "]")?;
                    Ok(TypeExpr::new(
                        start.extend_to(end),
                        TypeExprKind::AArray(Box::new(elem), Box::new(value)),
                    ))
                } else {
                    let end = self.expect(Lex::RBracket, "]")?;
                    Ok(TypeExpr::new(
                        start.extend_to(end),
                        TypeExprKind::DArray(Box::new(elem)),
                    ))
                }
            }
            Some(Lex::Fn) => {
                self.next();
                self.expect(Lex::LParen, "(")?;
                let mut params = vec![];
                let mut variadic = false;
                while !self.consume_if(Lex::RParen) {
                    if self.consume_if(Lex::DotDotDot) {
                        variadic = true;
                        self.expect(Lex::RParen, ")")?;
                        break;
                    }
                    params.push(self.type_expr()?);
                    if !self.consume_if(Lex::Comma) {
                        self.expect(Lex::RParen, ")")?;
                        break;
                    }
                }
                self.expect(Lex::Arrow, "->")?;
                let ret = self.type_expr()?;
                let span = start.extend_to(ret.span);
                Ok(TypeExpr::new(
                    span,
                    TypeExprKind::Function(params, Box::new(ret), variadic),
                ))
            }
            Some(Lex::Ident(first)) => {
                self.next();
                // A lone identifier naming a basic type resolves here; any
                // dotted path is a named type left for semantic analysis.
                if self.peek().map(|t| t.lex == Lex::Dot).unwrap_or(false)
                    || self.peek().map(|t| t.lex == Lex::Bang).unwrap_or(false)
                {
                    let mut parts = vec![first];
                    while self.consume_if(Lex::Dot) {
                        parts.push(self.identifier("type name")?.0);
                    }
                    let targs = self.template_args()?;
                    Ok(TypeExpr::new(
                        start.extend_to(self.span()),
                        TypeExprKind::Named(Path::new(parts, false), targs),
                    ))
                } else if let Some(basic) = self
                    .strings
                    .get(first)
                    .ok()
                    .and_then(|s| BasicKind::from_name(&s))
                {
                    Ok(TypeExpr::new(start, TypeExprKind::Basic(basic)))
                } else {
                    Ok(TypeExpr::new(
                        start,
                        TypeExprKind::Named(Path::single(first), vec![]),
                    ))
                }
            }
            Some(lex) => Err(CompilerError::new(self.span(), ParserError::ExpectedType(lex))),
            None => self.eof_err(),
        }
    }

    /// `![targ, ...]`; explicit template arguments.
    fn template_args(&mut self) -> ParserResult<Vec<TemplateArgExpr>> {
        if !(self.peek().map(|t| t.lex == Lex::Bang).unwrap_or(false)
            && self
                .peek_at(1)
                .map(|t| t.lex == Lex::LBracket)
                .unwrap_or(false))
        {
            return Ok(vec![]);
        }
        self.next(); // !
        self.next(); // [
        let mut args = vec![];
        loop {
            // A leading literal or minus sign marks a value argument;
            // anything else parses as a type.
            let arg = match self.peek().map(|t| t.lex.clone()) {
                Some(Lex::Integer(..))
                | Some(Lex::Real(..))
                | Some(Lex::True)
                | Some(Lex::False)
                | Some(Lex::Minus) => TemplateArgExpr::Value(self.expression()?),
                _ => TemplateArgExpr::Type(self.type_expr()?),
            };
            args.push(arg);
            if !self.consume_if(Lex::Comma) {
                self.expect(Lex::RBracket, "]")?;
                break;
            }
        }
        Ok(args)
    }

    // ---- statements ---------------------------------------------------

    fn block(&mut self) -> ParserResult<Vec<Statement>> {
        self.expect(Lex::LBrace, "{")?;
        let mut stmts = vec![];
        while !self.consume_if(Lex::RBrace) {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> ParserResult<Statement> {
        trace!("{} <- {:?}", function_name!(), self.peek().map(|t| &t.lex));
        let start = self.span();
        match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Let) => {
                self.next();
                let mutable = self.consume_if(Lex::Mut);
                let (name, _) = self.identifier("variable name")?;
                let ty = if self.consume_if(Lex::Colon) {
                    Some(self.type_expr()?)
                } else {
                    None
                };
                self.expect(Lex::Assign, ":=")?;
                let init = self.expression()?;
                let end = self.expect(Lex::Semicolon, ";")?;
                Ok(Statement::new(
                    start.extend_to(end),
                    StmtKind::Let {
                        name,
                        mutable,
                        ty,
                        init,
                    },
                ))
            }
            Some(Lex::If) => {
                self.next();
                self.expect(Lex::LParen, "(")?;
                let cond = self.expression()?;
                self.expect(Lex::RParen, ")")?;
                let then_block = self.block()?;
                let else_block = if self.consume_if(Lex::Else) {
                    if self.peek().map(|t| t.lex == Lex::If).unwrap_or(false) {
                        vec![self.statement()?]
                    } else {
                        self.block()?
                    }
                } else {
                    vec![]
                };
                Ok(Statement::new(
                    start.extend_to(self.span()),
                    StmtKind::If {
                        cond,
                        then_block,
                        else_block,
                    },
                ))
            }
            Some(Lex::While) => {
                self.next();
                self.expect(Lex::LParen, "(")?;
                let cond = self.expression()?;
                self.expect(Lex::RParen, ")")?;
                let body = self.block()?;
                Ok(Statement::new(
                    start.extend_to(self.span()),
                    StmtKind::While { cond, body },
                ))
            }
            Some(Lex::Return) => {
                self.next();
                let value = if self.peek().map(|t| t.lex == Lex::Semicolon).unwrap_or(false) {
                    None
                } else {
                    Some(self.expression()?)
                };
                let end = self.expect(Lex::Semicolon, ";")?;
                Ok(Statement::new(start.extend_to(end), StmtKind::Return(value)))
            }
            Some(Lex::Goto) => {
                self.next();
                let label = match self.next() {
                    Some(Token {
                        lex: Lex::LabelName(id),
                        ..
                    }) => *id,
                    Some(t) => {
                        return Err(CompilerError::new(
                            t.span,
                            ParserError::ExpectedButFound("label".into(), t.lex.clone()),
                        ))
                    }
                    None => return self.eof_err(),
                };
                let end = self.expect(Lex::Semicolon, ";")?;
                Ok(Statement::new(start.extend_to(end), StmtKind::Goto(label)))
            }
            Some(Lex::LabelName(id)) => {
                self.next();
                let end = self.expect(Lex::Colon, ":")?;
                Ok(Statement::new(start.extend_to(end), StmtKind::Label(id)))
            }
            Some(Lex::Asm) => self.asm_statement(),
            Some(Lex::LBrace) => {
                let stmts = self.block()?;
                Ok(Statement::new(
                    start.extend_to(self.span()),
                    StmtKind::Block(stmts),
                ))
            }
            Some(_) => {
                let lhs = self.expression()?;
                if self.consume_if(Lex::Assign) {
                    let rhs = self.expression()?;
                    let end = self.expect(Lex::Semicolon, ";")?;
                    Ok(Statement::new(
                        start.extend_to(end),
                        StmtKind::Assign { lhs, rhs },
                    ))
                } else {
                    let end = self.expect(Lex::Semicolon, ";")?;
                    Ok(Statement::new(start.extend_to(end), StmtKind::Expr(lhs)))
                }
            }
            None => self.eof_err(),
        }
    }

    fn asm_statement(&mut self) -> ParserResult<Statement> {
        let start = self.expect(Lex::Asm, "asm")?;
        self.expect(Lex::LParen, "(")?;
        let template = self.expression()?;

        let mut outputs = vec![];
        let mut inputs = vec![];
        let mut clobbers = vec![];

        if self.consume_if(Lex::Colon) {
            outputs = self.asm_operands()?;
            if self.consume_if(Lex::Colon) {
                inputs = self.asm_operands()?;
                if self.consume_if(Lex::Colon) {
                    while !self.peek().map(|t| t.lex == Lex::RParen).unwrap_or(true) {
                        clobbers.push(self.expression()?);
                        if !self.consume_if(Lex::Comma) {
                            break;
                        }
                    }
                }
            }
        }

        self.expect(Lex::RParen, ")")?;
        let end = self.expect(Lex::Semicolon, ";")?;
        Ok(Statement::new(
            start.extend_to(end),
            StmtKind::Asm(AsmStatement {
                template,
                outputs,
                inputs,
                clobbers,
            }),
        ))
    }

    fn asm_operands(&mut self) -> ParserResult<Vec<AsmOperand>> {
        let mut ops = vec![];
        // An empty group is allowed: asm("..." :: "i"(x));
        if self
            .peek()
            .map(|t| t.lex == Lex::Colon || t.lex == Lex::RParen)
            .unwrap_or(true)
        {
            return Ok(ops);
        }
        loop {
            let name = if self.consume_if(Lex::LBracket) {
                let (id, _) = self.identifier("operand name")?;
                self.expect(Lex::RBracket, "]")?;
                Some(id)
            } else {
                None
            };
            let constraint = self.expression()?;
            self.expect(Lex::LParen, "(")?;
            let expr = self.expression()?;
            self.expect(Lex::RParen, ")")?;
            ops.push(AsmOperand {
                name,
                constraint,
                expr,
            });
            if !self.consume_if(Lex::Comma) {
                break;
            }
        }
        Ok(ops)
    }

    // ---- expressions --------------------------------------------------

    fn expression(&mut self) -> ParserResult<Expression> {
        self.logical_or()
    }

    fn binary_level<F>(
        &mut self,
        ops: &[(Lex, BinaryOperator)],
        next: F,
    ) -> ParserResult<Expression>
    where
        F: Fn(&mut Self) -> ParserResult<Expression>,
    {
        let mut lhs = next(self)?;
        'outer: loop {
            for (lex, op) in ops {
                if self.peek().map(|t| t.lex == *lex).unwrap_or(false) {
                    self.next();
                    let rhs = next(self)?;
                    let span = lhs.span.extend_to(rhs.span);
                    lhs = Expression::new(
                        span,
                        ExprKind::Binary(*op, Box::new(lhs), Box::new(rhs)),
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn logical_or(&mut self) -> ParserResult<Expression> {
        self.binary_level(&[(Lex::BarBar, BinaryOperator::Or)], |p| p.logical_and())
    }

    fn logical_and(&mut self) -> ParserResult<Expression> {
        self.binary_level(&[(Lex::AmpAmp, BinaryOperator::And)], |p| p.equality())
    }

    fn equality(&mut self) -> ParserResult<Expression> {
        self.binary_level(
            &[
                (Lex::Eq, BinaryOperator::Eq),
                (Lex::BangEq, BinaryOperator::NEq),
            ],
            |p| p.comparison(),
        )
    }

    fn comparison(&mut self) -> ParserResult<Expression> {
        self.binary_level(
            &[
                (Lex::LsEq, BinaryOperator::LsEq),
                (Lex::GrEq, BinaryOperator::GrEq),
                (Lex::Ls, BinaryOperator::Ls),
                (Lex::Gr, BinaryOperator::Gr),
            ],
            |p| p.bitwise(),
        )
    }

    fn bitwise(&mut self) -> ParserResult<Expression> {
        self.binary_level(
            &[
                (Lex::Bar, BinaryOperator::BOr),
                (Lex::Caret, BinaryOperator::BXor),
                (Lex::Amp, BinaryOperator::BAnd),
            ],
            |p| p.shift(),
        )
    }

    fn shift(&mut self) -> ParserResult<Expression> {
        self.binary_level(
            &[
                (Lex::Shl, BinaryOperator::Shl),
                (Lex::Shr, BinaryOperator::Shr),
            ],
            |p| p.additive(),
        )
    }

    fn additive(&mut self) -> ParserResult<Expression> {
        self.binary_level(
            &[
                (Lex::Add, BinaryOperator::Add),
                (Lex::Minus, BinaryOperator::Sub),
            ],
            |p| p.multiplicative(),
        )
    }

    fn multiplicative(&mut self) -> ParserResult<Expression> {
        self.binary_level(
            &[
                (Lex::Mul, BinaryOperator::Mul),
                (Lex::Div, BinaryOperator::Div),
                (Lex::Rem, BinaryOperator::Rem),
            ],
            |p| p.unary(),
        )
    }

    fn unary(&mut self) -> ParserResult<Expression> {
        let start = self.span();
        let op = match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Minus) => Some(UnaryOperator::Negate),
            Some(Lex::Bang)
                // `!` immediately followed by `[` is template-argument
                // syntax, not logical not.
                if !self
                    .peek_at(1)
                    .map(|t| t.lex == Lex::LBracket)
                    .unwrap_or(false) =>
            {
                Some(UnaryOperator::Not)
            }
            Some(Lex::Tilde) => Some(UnaryOperator::BNot),
            Some(Lex::Amp) => Some(UnaryOperator::AddressOf),
            Some(Lex::Mul) => Some(UnaryOperator::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let operand = self.unary()?;
            let span = start.extend_to(operand.span);
            return Ok(Expression::new(span, ExprKind::Unary(op, Box::new(operand))));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParserResult<Expression> {
        let mut e = self.primary()?;
        loop {
            match self.peek().map(|t| t.lex.clone()) {
                Some(Lex::Dot) => {
                    self.next();
                    let (field, fspan) = self.identifier("field name")?;
                    let span = e.span.extend_to(fspan);
                    e = Expression::new(span, ExprKind::Field(Box::new(e), field));
                }
                Some(Lex::LBracket) => {
                    self.next();
                    let idx = self.expression()?;
                    let end = self.expect(Lex::RBracket, "]")?;
                    let span = e.span.extend_to(end);
                    e = Expression::new(span, ExprKind::Index(Box::new(e), Box::new(idx)));
                }
                Some(Lex::As) => {
                    self.next();
                    let ty = self.type_expr()?;
                    let span = e.span.extend_to(ty.span);
                    e = Expression::new(span, ExprKind::Cast(ty, Box::new(e)));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn primary(&mut self) -> ParserResult<Expression> {
        trace!("{} <- {:?}", function_name!(), self.peek().map(|t| &t.lex));
        let start = self.span();
        match self.peek().map(|t| t.lex.clone()) {
            Some(Lex::Integer(v, suffix)) => {
                self.next();
                Ok(Expression::new(start, ExprKind::Integer(v, suffix)))
            }
            Some(Lex::Real(v, suffix)) => {
                self.next();
                Ok(Expression::new(start, ExprKind::Real(v, suffix)))
            }
            Some(Lex::True) => {
                self.next();
                Ok(Expression::new(start, ExprKind::Boolean(true)))
            }
            Some(Lex::False) => {
                self.next();
                Ok(Expression::new(start, ExprKind::Boolean(false)))
            }
            Some(Lex::Null) => {
                self.next();
                Ok(Expression::new(start, ExprKind::Null))
            }
            Some(Lex::Str(id)) => {
                self.next();
                Ok(Expression::new(start, ExprKind::StringLit(id)))
            }
            Some(Lex::SizeOf) => {
                self.next();
                self.expect(Lex::LParen, "(")?;
                let ty = self.type_expr()?;
                let end = self.expect(Lex::RParen, ")")?;
                Ok(Expression::new(start.extend_to(end), ExprKind::SizeOf(ty)))
            }
            Some(Lex::LParen) => {
                self.next();
                let e = self.expression()?;
                self.expect(Lex::RParen, ")")?;
                Ok(e)
            }
            Some(Lex::LBracket) => {
                self.next();
                let mut elems = vec![];
                while !self.consume_if(Lex::RBracket) {
                    elems.push(self.expression()?);
                    if !self.consume_if(Lex::Comma) {
                        self.expect(Lex::RBracket, "]")?;
                        break;
                    }
                }
                Ok(Expression::new(
                    start.extend_to(self.span()),
                    ExprKind::ArrayLit(elems),
                ))
            }
            Some(Lex::Ident(first)) => {
                self.next();
                let mut parts = vec![first];
                while self.peek().map(|t| t.lex == Lex::Dot).unwrap_or(false)
                    && self
                        .peek_at(1)
                        .map(|t| matches!(t.lex, Lex::Ident(_)))
                        .unwrap_or(false)
                    && self
                        .peek_at(2)
                        .map(|t| {
                            matches!(
                                t.lex,
                                Lex::Dot | Lex::LParen | Lex::Bang | Lex::LBrace
                            )
                        })
                        .unwrap_or(false)
                {
                    // Consume dotted qualifiers only when the tail still
                    // looks like a path; a plain `.ident` is field access
                    // handled by postfix().
                    self.next();
                    parts.push(self.identifier("name")?.0);
                }
                let path = Path::new(parts, false);
                let template_args = self.template_args()?;

                match self.peek().map(|t| t.lex.clone()) {
                    Some(Lex::LParen) => {
                        self.next();
                        let mut args = vec![];
                        while !self.consume_if(Lex::RParen) {
                            args.push(self.expression()?);
                            if !self.consume_if(Lex::Comma) {
                                self.expect(Lex::RParen, ")")?;
                                break;
                            }
                        }
                        Ok(Expression::new(
                            start.extend_to(self.span()),
                            ExprKind::Call {
                                callee: path,
                                template_args,
                                args,
                            },
                        ))
                    }
                    Some(Lex::LBrace) => {
                        self.next();
                        let mut fields = vec![];
                        while !self.consume_if(Lex::RBrace) {
                            let (fname, fspan) = self.identifier("field name")?;
                            self.expect(Lex::Colon, ":")?;
                            let value = self.expression()?;
                            fields.push(StructLitField {
                                name: fname,
                                name_span: fspan,
                                value,
                            });
                            if !self.consume_if(Lex::Comma) {
                                self.expect(Lex::RBrace, "}")?;
                                break;
                            }
                        }
                        Ok(Expression::new(
                            start.extend_to(self.span()),
                            ExprKind::StructLit {
                                path,
                                template_args,
                                fields,
                            },
                        ))
                    }
                    _ => Ok(Expression::new(
                        start.extend_to(self.span()),
                        ExprKind::Identifier(path, template_args),
                    )),
                }
            }
            Some(lex) => Err(CompilerError::new(
                self.span(),
                ParserError::ExpectedExpression(lex),
            )),
            None => self.eof_err(),
        }
    }
}
