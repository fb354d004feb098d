use super::parser::parse_module;
use crate::compiler::ast::*;
use crate::compiler::lexer::Lexer;
use crate::compiler::{Offset, Span};
use crate::StringTable;

fn parse(text: &str) -> SourceModule {
    let st = StringTable::new();
    let tokens: Vec<_> = Lexer::new(text, Offset::new(0), &st)
        .tokenize()
        .into_iter()
        .map(|t| t.unwrap())
        .collect();
    parse_module(
        &tokens,
        Span::new(Offset::new(0), Offset::new(text.len() as u32)),
        &st,
    )
    .unwrap()
}

#[test]
fn module_header_and_imports() {
    let m = parse("module geo.shapes; import std.core; pub import geo.points;");
    assert_eq!(m.name.as_ref().map(|n| n.len()), Some(2));
    assert_eq!(m.items.len(), 2);
    match (&m.items[0], &m.items[1]) {
        (Item::Import(a), Item::Import(b)) => {
            assert!(!a.public);
            assert!(b.public);
        }
        _ => panic!("expected two imports"),
    }
}

#[test]
fn function_with_params_and_body() {
    let m = parse(
        "fn add(a: i32, b: i32) -> i32 {
            return a + b;
        }",
    );
    match &m.items[0] {
        Item::Func(f) => {
            assert_eq!(f.params.len(), 2);
            assert!(f.ret.is_some());
            assert_eq!(f.body.as_ref().unwrap().len(), 1);
            assert_eq!(f.linkage, Linkage::Native);
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn extern_function_has_no_body() {
    let m = parse("extern fn putchar(c: i32) -> i32;");
    match &m.items[0] {
        Item::Func(f) => {
            assert_eq!(f.linkage, Linkage::Foreign);
            assert!(f.body.is_none());
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn struct_with_field_align_and_default() {
    let m = parse("struct Packet { kind: u8, seq: u32 align(8), crc: u32 := 0 }");
    match &m.items[0] {
        Item::Struct(s) => {
            assert_eq!(s.kind, AggKind::Struct);
            assert_eq!(s.fields.len(), 3);
            assert_eq!(s.fields[1].align, Some(8));
            assert!(s.fields[2].init.is_some());
        }
        _ => panic!("expected struct"),
    }
}

#[test]
fn union_declaration() {
    let m = parse("union Word { w: u32, b: [u8; 4] }");
    match &m.items[0] {
        Item::Struct(s) => assert_eq!(s.kind, AggKind::Union),
        _ => panic!("expected union"),
    }
}

#[test]
fn template_function_with_specialized_param() {
    let m = parse("fn deref[T: *E, E](p: T) -> E { return *p; }");
    match &m.items[0] {
        Item::Func(f) => {
            assert_eq!(f.template_params.len(), 2);
            match &f.template_params[0] {
                TemplateParam::Type { specialization, .. } => {
                    assert!(specialization.is_some())
                }
                _ => panic!("expected type parameter"),
            }
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn call_with_explicit_template_args() {
    let m = parse("fn caller() { let x := max![i64](1, 2); }");
    match &m.items[0] {
        Item::Func(f) => match &f.body.as_ref().unwrap()[0].kind {
            StmtKind::Let { init, .. } => match &init.kind {
                ExprKind::Call { template_args, args, .. } => {
                    assert_eq!(template_args.len(), 1);
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected let, got {:?}", other),
        },
        _ => panic!("expected function"),
    }
}

#[test]
fn types_round_trip_through_parser() {
    let m = parse(
        "static a: *i32;
         static b: [u8; 16];
         static c: [i64];
         static d: [i32: bool];
         static e: const i32;
         static f: fn(i32, ...) -> void;",
    );
    let kinds: Vec<_> = m
        .items
        .iter()
        .map(|i| match i {
            Item::Static(s) => &s.ty.kind,
            _ => panic!("expected static"),
        })
        .collect();
    assert!(matches!(kinds[0], TypeExprKind::Pointer(_)));
    assert!(matches!(kinds[1], TypeExprKind::SArray(..)));
    assert!(matches!(kinds[2], TypeExprKind::DArray(_)));
    assert!(matches!(kinds[3], TypeExprKind::AArray(..)));
    assert!(matches!(kinds[4], TypeExprKind::Qualified(Qualifier::Const, _)));
    assert!(matches!(kinds[5], TypeExprKind::Function(_, _, true)));
}

#[test]
fn version_block_with_else() {
    let m = parse(
        "version (LittleEndian) {
            static order: i32 := 0;
        } else {
            static order: i32 := 1;
        }",
    );
    match &m.items[0] {
        Item::Version(v) => {
            assert!(matches!(v.cond, VersionCond::Ident(_)));
            assert_eq!(v.then_items.len(), 1);
            assert_eq!(v.else_items.len(), 1);
        }
        _ => panic!("expected version block"),
    }
}

#[test]
fn asm_statement_groups() {
    let m = parse(
        "fn spin(n: i64) {
            asm(\"pause\" : \"+m\"(n) : \"i\"(5) : \"rax\", \"memory\");
        }",
    );
    match &m.items[0] {
        Item::Func(f) => match &f.body.as_ref().unwrap()[0].kind {
            StmtKind::Asm(a) => {
                assert_eq!(a.outputs.len(), 1);
                assert_eq!(a.inputs.len(), 1);
                assert_eq!(a.clobbers.len(), 2);
            }
            other => panic!("expected asm, got {:?}", other),
        },
        _ => panic!("expected function"),
    }
}

#[test]
fn labels_and_goto() {
    let m = parse(
        "fn f() {
            'top:
            goto 'top;
        }",
    );
    match &m.items[0] {
        Item::Func(f) => {
            let body = f.body.as_ref().unwrap();
            assert!(matches!(body[0].kind, StmtKind::Label(_)));
            assert!(matches!(body[1].kind, StmtKind::Goto(_)));
        }
        _ => panic!("expected function"),
    }
}

#[test]
fn operator_precedence_mul_binds_tighter() {
    let m = parse("fn f() -> i32 { return 1 + 2 * 3; }");
    match &m.items[0] {
        Item::Func(f) => match &f.body.as_ref().unwrap()[0].kind {
            StmtKind::Return(Some(e)) => match &e.kind {
                ExprKind::Binary(BinaryOperator::Add, _, rhs) => {
                    assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOperator::Mul, ..)))
                }
                other => panic!("expected +, got {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        },
        _ => panic!("expected function"),
    }
}

#[test]
fn struct_literal_expression() {
    let m = parse("fn f() { let p := Point { x: 1, y: 2 }; }");
    match &m.items[0] {
        Item::Func(f) => match &f.body.as_ref().unwrap()[0].kind {
            StmtKind::Let { init, .. } => match &init.kind {
                ExprKind::StructLit { fields, .. } => assert_eq!(fields.len(), 2),
                other => panic!("expected struct literal, got {:?}", other),
            },
            other => panic!("expected let, got {:?}", other),
        },
        _ => panic!("expected function"),
    }
}

#[test]
fn syntax_error_reports_expected_token() {
    let st = StringTable::new();
    let text = "fn f( {";
    let tokens: Vec<_> = Lexer::new(text, Offset::new(0), &st)
        .tokenize()
        .into_iter()
        .map(|t| t.unwrap())
        .collect();
    let r = parse_module(
        &tokens,
        Span::new(Offset::new(0), Offset::new(text.len() as u32)),
        &st,
    );
    assert!(r.is_err());
}
