//! End-to-end semantic pipeline tests: each compiles real source text
//! through the full driver (lexer → parser → imports → passes 1–3 →
//! lowering) and inspects the outcome.

use crate::compiler::context::{FatalError, Params};
use crate::compiler::driver::{compile_strings, CompileOutcome};
use crate::compiler::semantics::tree::ConstValue;
use crate::compiler::sym::SymbolId;

fn compile(sources: &[(&str, &str)]) -> CompileOutcome {
    compile_strings(sources, Params::default()).expect("unexpected fatal error")
}

fn member(outcome: &CompileOutcome, module: usize, name: &str) -> Option<SymbolId> {
    let id = outcome.ctx.strings.find(name)?;
    let scope = outcome.ctx.module_syms[module];
    outcome
        .ctx
        .symbols
        .get(scope)
        .as_module()
        .and_then(|m| m.members.get(&id).copied())
}

#[test]
fn clean_module_compiles_and_emits() {
    let outcome = compile(&[(
        "main",
        "fn add(a: i64, b: i64) -> i64 {
            return a + b;
        }
        fn start() -> i64 {
            let x: i64 := add(1, 2);
            return x;
        }",
    )]);
    assert_eq!(outcome.error_count, 0);
    assert!(outcome.emitted);
    assert_eq!(outcome.summaries.len(), 1);
    assert_eq!(outcome.summaries[0].functions, 2);
}

#[test]
fn bind_type_mismatch_reports_and_suppresses_output() {
    let outcome = compile(&[(
        "main",
        "fn start() -> i64 {
            let k: i64 := false;
            return k;
        }",
    )]);
    assert_eq!(outcome.error_count, 1);
    assert!(!outcome.emitted);
    assert!(outcome.summaries.is_empty());
    let messages = outcome.ctx.diagnostics.records();
    assert!(messages[0].message.contains("bind expected i64 but got bool"));
}

#[test]
fn all_passes_complete_despite_errors() {
    // Two independent errors in two functions: recovery must reach both.
    let outcome = compile(&[(
        "main",
        "fn one() -> i64 {
            return missing_a;
        }
        fn two() -> i64 {
            return missing_b;
        }",
    )]);
    assert_eq!(outcome.error_count, 2);
}

#[test]
fn circular_imports_are_tolerated() {
    let outcome = compile(&[
        (
            "a",
            "import b;
             struct FromA { x: i32 }
             fn use_b(v: b.FromB) -> i32 { return v.y; }",
        ),
        (
            "b",
            "import a;
             struct FromB { y: i32 }
             fn use_a(v: a.FromA) -> i32 { return v.x; }",
        ),
    ]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
    assert!(outcome.emitted);
}

#[test]
fn value_cycle_in_aggregate_is_an_error() {
    let outcome = compile(&[("main", "struct S { s: S }")]);
    assert!(outcome.error_count >= 1);
    assert!(!outcome.emitted);
}

#[test]
fn pointer_to_self_is_fine() {
    let outcome = compile(&[(
        "main",
        "struct Node { next: *Node, value: i64 }
         fn head_value(n: *Node) -> i64 {
            return n.value;
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn ambiguous_overload_is_reported_and_recovered() {
    // i16 widens to i32 and i64 with the same rank: ambiguous, but pass 3
    // must finish (the call becomes an error-typed expression).
    let outcome = compile(&[(
        "main",
        "fn pick(v: i32) -> i32 { return v; }
         fn pick(v: i64) -> i32 { return 1; }
         fn start() -> i32 {
            let small: i16 := 3i16;
            let r: i32 := pick(small);
            return r;
         }",
    )]);
    assert!(!outcome.emitted);
    let messages = outcome.ctx.diagnostics.records();
    assert!(
        messages.iter().any(|m| m.message.contains("ambiguous")),
        "{:?}",
        messages
    );
}

#[test]
fn exact_overload_beats_widening() {
    let outcome = compile(&[(
        "main",
        "fn pick(v: i32) -> i32 { return 32; }
         fn pick(v: i64) -> i32 { return 64; }
         fn start() -> i32 {
            return pick(7);
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn overload_resolution_is_deterministic() {
    let src = &[(
        "main",
        "fn pick(v: i32) -> i32 { return 32; }
         fn pick(v: i64) -> i32 { return 64; }
         fn start() -> i32 {
            let small: i16 := 3i16;
            return pick(small);
         }",
    )];
    let first = compile(src).ctx.diagnostics.records();
    for _ in 0..3 {
        let again = compile(src).ctx.diagnostics.records();
        assert_eq!(first.len(), again.len());
        for (a, b) in first.iter().zip(again.iter()) {
            assert_eq!(a.message, b.message);
        }
    }
}

#[test]
fn template_instantiation_is_memoized() {
    let outcome = compile(&[(
        "main",
        "fn id[T](v: T) -> T { return v; }
         fn start() -> i64 {
            let a: i64 := id(5i64);
            let b: i64 := id(6i64);
            let c: i32 := id(7);
            return a + b;
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());

    let template = member(&outcome, 0, "id").unwrap();
    let instances = outcome
        .ctx
        .symbols
        .get(template)
        .as_template()
        .unwrap()
        .instances
        .clone();
    // Two distinct argument tuples only: i64 (reused) and i32.
    assert_eq!(instances.len(), 2);
}

#[test]
fn struct_template_instantiates_with_layout() {
    let outcome = compile(&[(
        "main",
        "struct Pair[T] { first: T, second: T }
         static width: u64 := size_of(Pair![i32]);
         fn get(p: Pair![i32]) -> i32 { return p.second; }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());

    let width = member(&outcome, 0, "width").unwrap();
    let init = outcome
        .ctx
        .symbols
        .get(width)
        .as_variable()
        .unwrap()
        .init
        .clone();
    assert_eq!(init, Some(ConstValue::Int(8)));
}

#[test]
fn template_specialization_is_preferred() {
    let outcome = compile(&[(
        "main",
        "fn rank[T](v: T) -> i32 { return 0; }
         fn rank[T: *E, E](v: T) -> i32 { return 1; }
         fn start(p: *i64) -> i32 {
            return rank(p);
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn struct_layout_matches_abi_rules() {
    // { i8; i32 } on a 4-byte-int-alignment target: size 8, offsets 0/4.
    let outcome = compile(&[(
        "main",
        "struct Mixed { b: i8, i: i32 }
         static total: u64 := size_of(Mixed);",
    )]);
    assert_eq!(outcome.error_count, 0);

    let total = member(&outcome, 0, "total").unwrap();
    let init = outcome
        .ctx
        .symbols
        .get(total)
        .as_variable()
        .unwrap()
        .init
        .clone();
    assert_eq!(init, Some(ConstValue::Int(8)));

    let mixed = member(&outcome, 0, "Mixed").unwrap();
    let l = outcome.ctx.symbols.agg_layout(mixed).unwrap();
    assert_eq!(l.offsets, vec![0, 4]);
    assert_eq!(l.size, 8);
}

#[test]
fn duplicate_union_initialization_suppresses_emission() {
    let outcome = compile(&[(
        "main",
        "union Both { a: i32, b: u32 }
         static clash: Both := Both { a: 1, b: 2u32 };",
    )]);
    assert_eq!(outcome.error_count, 1);
    assert!(!outcome.emitted);
    let messages = outcome.ctx.diagnostics.records();
    assert!(
        messages[0].message.contains("duplicate union initialization"),
        "{:?}",
        messages
    );
}

#[test]
fn union_single_member_initialization_is_allowed() {
    let outcome = compile(&[(
        "main",
        "union Both { a: i32, b: u32 }
         static one: Both := Both { b: 2u32 };",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
    assert!(outcome.emitted);
}

#[test]
fn version_condition_selects_branch() {
    // LittleEndian is predefined on the default host target.
    let outcome = compile(&[(
        "main",
        "version (LittleEndian) {
            static order: i32 := 0;
         } else {
            static disorder: i32 := 1;
         }",
    )]);
    assert_eq!(outcome.error_count, 0);
    assert!(member(&outcome, 0, "order").is_some());
    assert!(member(&outcome, 0, "disorder").is_none());
}

#[test]
fn user_version_ident_activates_blocks() {
    let mut params = Params::default();
    params.version_idents.push("Extra".into());
    let outcome = compile_strings(
        &[(
            "main",
            "version (Extra) { static found: i32 := 1; }",
        )],
        params,
    )
    .unwrap();
    assert!(member(&outcome, 0, "found").is_some());
}

#[test]
fn unresolved_import_is_fatal() {
    let r = compile_strings(&[("main", "import definitely_missing;")], Params::default());
    assert!(matches!(r, Err(FatalError::UnresolvedImport(_))));
}

#[test]
fn private_imports_do_not_leak_transitively() {
    let outcome = compile(&[
        ("a", "import b;\nfn start() -> i32 { return hidden(); }"),
        ("b", "import c;\nfn from_b() -> i32 { return hidden(); }"),
        ("c", "fn hidden() -> i32 { return 3; }"),
    ]);
    // `b` sees `hidden` through its own import; `a` must not.
    let messages = outcome.ctx.diagnostics.records();
    assert_eq!(outcome.error_count, 1, "{:?}", messages);
    assert!(messages[0].message.contains("hidden"));
}

#[test]
fn public_import_reexports() {
    let outcome = compile(&[
        ("a", "import b;\nfn start() -> i32 { return shared_fn(); }"),
        ("b", "pub import c;"),
        ("c", "fn shared_fn() -> i32 { return 3; }"),
    ]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn inferred_return_type_propagates_to_callers() {
    let outcome = compile(&[(
        "main",
        "fn five() { return 5i64; }
         fn start() -> i64 {
            let v: i64 := five();
            return v;
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn asm_statement_checks_operand_constness() {
    let outcome = compile(&[(
        "main",
        "fn spin() {
            let mut n: i64 := 0;
            asm(\"pause\" : \"+m\"(n));
         }",
    )]);
    // Valid asm: no errors.
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());

    let bad = compile(&[(
        "main",
        "fn start() {
            let mut n: i64 := 0;
            asm(\"pause\" : \"+m\"(n) : \"i\"(n));
         }",
    )]);
    // The second `n` is not a compile time constant for an immediate
    // operand.
    assert_eq!(bad.error_count, 1);
}

#[test]
fn asm_unknown_clobber_register_is_reported() {
    let outcome = compile(&[(
        "main",
        "fn start() {
            let mut n: i64 := 0;
            asm(\"nop\" : \"+m\"(n) : : \"not_a_register\");
         }",
    )]);
    assert_eq!(outcome.error_count, 1);
    let messages = outcome.ctx.diagnostics.records();
    assert!(messages[0].message.contains("not_a_register"));
}

#[test]
fn goto_to_unknown_label_is_reported() {
    let outcome = compile(&[(
        "main",
        "fn start() {
            goto 'nowhere;
         }",
    )]);
    assert_eq!(outcome.error_count, 1);
}

#[test]
fn forward_goto_resolves() {
    let outcome = compile(&[(
        "main",
        "fn start() {
            goto 'end;
            'end:
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn qualified_static_initializer_accepts_immutable_into_const() {
    let outcome = compile(&[(
        "main",
        "static source: immutable i32 := 5;
         static viewer: const i32 := 5;",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
}

#[test]
fn duplicate_declaration_is_reported_once_and_analysis_continues() {
    let outcome = compile(&[(
        "main",
        "static x: i32 := 1;
         static x: i64 := 2;
         fn start() -> i32 { return x; }",
    )]);
    assert_eq!(outcome.error_count, 1);
}

#[test]
fn dependency_lines_record_import_edges() {
    let mut params = Params::default();
    params.deps_file = Some(std::path::PathBuf::from("/dev/null"));
    let outcome = compile_strings(
        &[
            ("a", "import b;\npub import c;"),
            ("b", ""),
            ("c", ""),
        ],
        params,
    )
    .unwrap();
    assert_eq!(outcome.ctx.deps_lines.len(), 2);
    assert!(outcome.ctx.deps_lines[0].contains("private"));
    assert!(outcome.ctx.deps_lines[1].contains("public"));
}

#[test]
fn extern_foreign_function_uses_plain_name() {
    let outcome = compile(&[(
        "main",
        "extern fn putchar(c: i32) -> i32;
         fn start() -> i32 {
            return putchar(65);
         }",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());

    let sym = member(&outcome, 0, "putchar").unwrap();
    let name =
        crate::compiler::codegen::mangle::mangled_name(&outcome.ctx, sym).unwrap();
    assert_eq!(name, "putchar");
}

#[test]
fn native_mangling_is_deterministic_and_signature_qualified() {
    let outcome = compile(&[(
        "main",
        "fn add(a: i32, b: i64) -> i64 { return b; }",
    )]);
    let sym = member(&outcome, 0, "add").unwrap();
    let a = crate::compiler::codegen::mangle::mangled_name(&outcome.ctx, sym).unwrap();
    let b = crate::compiler::codegen::mangle::mangled_name(&outcome.ctx, sym).unwrap();
    assert_eq!(a, b);
    assert!(a.starts_with("_S"));
    assert!(a.contains("3add"));

    // A second, identical run produces the same external name.
    let outcome2 = compile(&[(
        "main",
        "fn add(a: i32, b: i64) -> i64 { return b; }",
    )]);
    let sym2 = member(&outcome2, 0, "add").unwrap();
    let c = crate::compiler::codegen::mangle::mangled_name(&outcome2.ctx, sym2).unwrap();
    assert_eq!(a, c);
}

#[test]
fn foreign_cpp_mangling_compresses_repeats() {
    let outcome = compile(&[(
        "main",
        "struct Big { x: i64 }
         extern \"cpp\" fn takes_two(a: *Big, b: *Big) -> i32;",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());

    let sym = member(&outcome, 0, "takes_two").unwrap();
    let name =
        crate::compiler::codegen::mangle::mangled_name(&outcome.ctx, sym).unwrap();
    assert!(name.starts_with("_Z"));
    // The second `*Big` parameter is a substitution back-reference, not a
    // repeat of the encoding.
    assert!(name.contains("S"), "{}", name);
    assert_eq!(name.matches("3Big").count(), 1, "{}", name);
}

#[test]
fn foreign_cpp_rejects_unencodable_parameter() {
    let outcome = compile(&[(
        "main",
        "extern \"cpp\" fn bad(map: [i32: bool]) -> i32;
         fn start(m: [i32: bool]) -> i32 { return bad(m); }",
    )]);
    // Reported at lowering time (mangling), not fatal.
    assert!(outcome.error_count >= 1);
    assert!(!outcome.emitted);
}

#[test]
fn static_array_global_hoists_dynamic_view() {
    let outcome = compile(&[(
        "main",
        "static table: [i32; 4] := [1, 2, 3, 4];
         static view: [i32] := [5, 6];",
    )]);
    assert_eq!(outcome.error_count, 0, "{:?}", outcome.ctx.diagnostics.records());
    assert!(outcome.emitted);
    // table (16 bytes inline) + view (len+ptr) + the hoisted literal
    // (8 bytes) all land in the data segment.
    let summary = &outcome.summaries[0];
    assert_eq!(summary.data_bytes, 16 + 16 + 8);
}
