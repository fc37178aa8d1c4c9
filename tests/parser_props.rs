//! Grammar properties: the precedence ladder, associativity, and the spots
//! where the ladder's right-operand descent rejects an operator mix.

use proptest::prelude::*;

use pawnc::ast::Stmt;
use pawnc::dump::dump_expr;
use pawnc::error::Message;
use pawnc::parse_source;

/// Binary operators with their binding strength (higher binds tighter).
const OPS: &[(&str, u8)] = &[
    ("||", 1),
    ("&&", 2),
    ("==", 3),
    ("!=", 3),
    ("<", 4),
    ("<=", 4),
    (">", 4),
    (">=", 4),
    ("|", 5),
    ("^", 6),
    ("&", 7),
    ("<<", 8),
    (">>", 8),
    (">>>", 8),
    ("+", 9),
    ("-", 9),
    ("*", 10),
    ("/", 10),
    ("%", 10),
];

fn is_relational(prec: u8) -> bool {
    prec == 4
}

/// Mixes the grammar rejects outright: chained relational operators, and
/// operators that the relational/bitxor right-operand descent skips over
/// (their productions descend into `shift` on the right).
fn rejected(op1: (&str, u8), op2: (&str, u8)) -> bool {
    (is_relational(op1.1) && is_relational(op2.1))
        || (is_relational(op1.1) && matches!(op2.0, "|" | "^" | "&"))
        || (op1.0 == "^" && op2.0 == "&")
}

/// Parses `int t = <expr>` and returns the dump of the initializer.
fn parse_init(expr: &str) -> Result<String, ()> {
    let src = format!("int t = {expr}\n");
    let parsed = parse_source(&src).map_err(|_| ())?;
    let arena = &parsed.arena;
    let stmts = arena.stmts_list(parsed.tree.statements);
    if stmts.len() != 1 {
        return Err(());
    }
    let Stmt::VarDecl(id) = *arena.stmts.get(stmts[0]) else {
        return Err(());
    };
    let init = arena.var_decls.get(id).init.ok_or(())?;
    Ok(dump_expr(arena, init))
}

fn name_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["a", "b", "c", "lhs", "rhs", "mid", "v0", "tmp_"])
}

proptest! {
    /// For every operator pair, `a OP1 b OP2 c` either parses to the
    /// canonical parenthesization of the ladder or is one of the mixes the
    /// grammar rejects.
    #[test]
    fn precedence_pairs_match_the_ladder(
        i in 0..OPS.len(),
        j in 0..OPS.len(),
        a in name_strategy(),
        b in name_strategy(),
        c in name_strategy(),
    ) {
        let op1 = OPS[i];
        let op2 = OPS[j];
        let flat = format!("{a} {} {b} {} {c}", op1.0, op2.0);

        if rejected(op1, op2) {
            prop_assert!(parse_init(&flat).is_err(), "expected rejection: {flat}");
        } else {
            let got = parse_init(&flat).expect("flat form must parse");
            let canonical = if op1.1 < op2.1 {
                format!("{a} {} ({b} {} {c})", op1.0, op2.0)
            } else {
                format!("({a} {} {b}) {} {c}", op1.0, op2.0)
            };
            let want = parse_init(&canonical).expect("canonical form must parse");
            prop_assert_eq!(got, want, "{} != {}", flat, canonical);
        }
    }

    /// Parsing is deterministic: the same source dumps to the same bytes.
    #[test]
    fn parse_is_deterministic(
        i in 0..OPS.len(),
        a in name_strategy(),
        b in name_strategy(),
    ) {
        let expr = format!("{a} {} {b}", OPS[i].0);
        let first = parse_init(&expr).expect("must parse");
        let second = parse_init(&expr).expect("must parse");
        prop_assert_eq!(first, second);
    }
}

#[test]
fn binary_operators_are_left_associative() {
    for op in ["+", "-", "*", "/", "%", "<<", "|", "&&", "=="] {
        let flat = parse_init(&format!("a {op} b {op} c")).unwrap();
        let left = parse_init(&format!("(a {op} b) {op} c")).unwrap();
        let right = parse_init(&format!("a {op} (b {op} c)")).unwrap();
        assert_eq!(flat, left, "{op} must associate left");
        assert_ne!(flat, right, "{op} grouping must be observable");
    }
}

#[test]
fn assignment_is_right_associative() {
    let flat = parse_init("a = b = c").unwrap();
    let right = parse_init("a = (b = c)").unwrap();
    assert_eq!(flat, right);
}

#[test]
fn compound_assignment_is_right_associative() {
    let flat = parse_init("a += b = c").unwrap();
    let right = parse_init("a += (b = c)").unwrap();
    assert_eq!(flat, right);
}

#[test]
fn ternary_nests_to_the_right() {
    let flat = parse_init("a ? b : c ? d : e").unwrap();
    let right = parse_init("a ? b : (c ? d : e)").unwrap();
    assert_eq!(flat, right);
}

#[test]
fn relational_chains_report_the_dedicated_code() {
    let err = parse_source("int t = a < b < c\n").unwrap_err();
    assert!(err
        .codes
        .iter()
        .any(|c| matches!(c, Message::NoChainedRelationalOps)));
}

#[test]
fn unary_binds_tighter_than_multiplication() {
    let flat = parse_init("-a * b").unwrap();
    let grouped = parse_init("(-a) * b").unwrap();
    assert_eq!(flat, grouped);
}

#[test]
fn postfix_binds_tighter_than_prefix() {
    let flat = parse_init("-a[0]").unwrap();
    let grouped = parse_init("-(a[0])").unwrap();
    assert_eq!(flat, grouped);
}
