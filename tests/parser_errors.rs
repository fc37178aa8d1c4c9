//! Diagnostic-code assertions: every parse error is recorded through the
//! reporter and parsing continues to end of input.

use pawnc::error::Message;
use pawnc::{parse_source, parse_source_with, ParseOptions};

fn codes(src: &str) -> Vec<Message> {
    match parse_source(src) {
        Ok(_) => panic!("expected diagnostics for:\n{src}"),
        Err(f) => f.codes,
    }
}

#[test]
fn chained_relational_operators_are_rejected_once() {
    let codes = codes("void f(int x, int y, int z) {\n    if (x < y < z) {}\n}\n");
    let count = codes
        .iter()
        .filter(|c| matches!(c, Message::NoChainedRelationalOps))
        .count();
    assert_eq!(count, 1, "{codes:?}");
}

#[test]
fn const_twice_is_diagnosed() {
    let codes = codes("const const int x = 1\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::ConstSpecifiedTwice)));
}

#[test]
fn switch_case_structure_is_policed_in_one_pass() {
    // The first case has a trailing statement, and a case follows the
    // default: both must be reported in a single parse.
    let src = r#"
int f(int k) {
    switch (k) {
        case 1: a()
        b()
        default: c()
        case 3: d()
    }
    return 0
}
"#;
    let codes = codes(src);
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::SingleStatementPerCase)));
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::DefaultMustBeLastCase)));
}

#[test]
fn only_one_default_per_switch() {
    let src = r#"
int f(int k) {
    switch (k) {
        default: {
            return 1
        }
        default: {
            return 2
        }
    }
    return 0
}
"#;
    let codes = codes(src);
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::OneDefaultPerSwitch)));
}

#[test]
fn new_keyword_rejects_new_style_types() {
    let codes = codes("new int x = 1\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::NewStyleBadKeyword)));
}

#[test]
fn labels_in_new_type_positions_require_new_decls() {
    let codes = codes("typedef Handler = function Foo: (int x)\n");
    assert!(codes.iter().any(|c| matches!(c, Message::NewDeclsRequired)));
}

#[test]
fn deprecated_type_names_still_parse() {
    let err = parse_source("Float x = 1.0\nString s[8]\n_ u = 1\n").unwrap_err();
    let deprecated: Vec<&str> = err
        .codes
        .iter()
        .filter_map(|c| match c {
            Message::TypeIsDeprecated { name, .. } => Some(*name),
            _ => None,
        })
        .collect();
    assert_eq!(deprecated, vec!["Float", "String", "_"]);

    // All three declarations survived into the partial tree.
    let tree = err.partial.expect("partial tree");
    assert_eq!(tree.statements.len(), 3);
}

#[test]
fn arrays_cannot_be_passed_by_reference() {
    let codes = codes("int f(int[] &x) {\n    return 0\n}\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::TypeCannotBeReference { .. })));
}

#[test]
fn fixed_dimensions_before_the_name_are_rejected() {
    let codes = codes("int[3] x = 1\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::FixedArrayInPrefix)));
}

#[test]
fn double_array_dimensions_are_rejected() {
    let codes = codes("int[] x[2] = 1\n");
    assert!(codes.iter().any(|c| matches!(c, Message::DoubleArrayDims)));
}

#[test]
fn bad_type_expressions_are_diagnosed() {
    let codes = codes("typedef T = 3\n");
    assert!(codes.iter().any(|c| matches!(c, Message::ExpectedTypeExpr)));
}

#[test]
fn missing_expressions_are_diagnosed() {
    let codes = codes("int x = ;\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::ExpectedExpression { .. })));
}

#[test]
fn stray_tokens_at_global_scope_are_diagnosed() {
    let codes = codes(";\nint ok = 1\n");
    assert!(codes.iter().any(|c| matches!(c, Message::ExpectedGlobal)));
}

#[test]
fn methodmap_members_must_be_methods_or_properties() {
    let codes = codes("methodmap M {\n    int x\n}\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::ExpectedLayoutMember)));
}

#[test]
fn accessors_must_be_get_or_set_and_unique() {
    let src = r#"
methodmap M {
    property int P {
        public fetch() {
            return 0
        }
        public get() {
            return 0
        }
        public get() {
            return 1
        }
    }
}
"#;
    let codes = codes(src);
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::InvalidAccessorName)));
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::AccessorRedeclared { name } if name == "get")));
}

#[test]
fn local_declarations_need_a_block() {
    let codes = codes("void f(int a) {\n    if (a)\n        int x = 1\n}\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::VariableMustBeInBlock)));
}

#[test]
fn only_one_variadic_parameter_is_allowed() {
    let codes = codes("native f(..., ...);\n");
    assert!(codes.iter().any(|c| matches!(c, Message::MultipleVarargs)));
}

#[test]
fn functags_are_rejected_with_recovery() {
    let err = parse_source("functag public OldStyle(value)\nint ok = 1\n").unwrap_err();
    assert!(err
        .codes
        .iter()
        .any(|c| matches!(c, Message::FunctagsNotSupported)));
    // Recovery skipped the rest of the line and kept going.
    assert_eq!(err.partial.expect("partial tree").statements.len(), 1);
}

#[test]
fn relaxed_dialect_still_needs_a_terminator() {
    let codes = codes("void f() {\n    int x = 1 int y = 2\n    return\n}\n");
    assert!(codes
        .iter()
        .any(|c| matches!(c, Message::ExpectedNewlineOrSemi)));
}

#[test]
fn block_statements_must_end_their_line() {
    let codes = codes("void f(int a) {\n    if (a) {} a()\n}\n");
    assert!(codes.iter().any(|c| matches!(c, Message::ExpectedNewline)));
}

#[test]
fn strict_dialect_demands_semicolons() {
    let err = parse_source_with(
        "int x = 1\n",
        ParseOptions {
            require_semicolons: true,
        },
    )
    .unwrap_err();
    assert!(err
        .codes
        .iter()
        .any(|c| matches!(c, Message::WrongToken { expected: ";", .. })));
}

#[test]
fn wrong_tokens_name_both_sides() {
    let err = parse_source("int f(int a {\n    return a\n}\n").unwrap_err();
    assert!(err
        .codes
        .iter()
        .any(|c| matches!(c, Message::WrongToken { .. })));
}
