//! Declaration disambiguation: old-style vs. new-style declarators, shared
//! base types across comma lists, and the `name [ ] name` reparse.

use pawnc::ast::{Resolver, Stmt, TypeSpecifier, VarDeclId};
use pawnc::token::TokenKind;
use pawnc::{parse_source, Parsed};

fn parse(src: &str) -> Parsed {
    match parse_source(src) {
        Ok(parsed) => parsed,
        Err(f) => panic!("expected parse ok, got diagnostics: {:#?}", f.diags),
    }
}

fn global_var(parsed: &Parsed, index: usize) -> VarDeclId {
    let stmts = parsed.arena.stmts_list(parsed.tree.statements);
    let Stmt::VarDecl(id) = *parsed.arena.stmts.get(stmts[index]) else {
        panic!("statement {index} is not a variable declaration");
    };
    id
}

fn name_of(parsed: &Parsed, id: VarDeclId) -> String {
    let decl = parsed.arena.var_decls.get(id);
    let atom = decl.name.and_then(|t| t.atom()).expect("unnamed declarator");
    parsed.arena.interner.resolve(atom).to_string()
}

fn spec_of(parsed: &Parsed, id: VarDeclId) -> TypeSpecifier {
    parsed.arena.var_decls.get(id).spec
}

#[test]
fn post_dims_do_not_stick_to_later_declarators() {
    // int x[], y;  -- x has rank 1, y rank 0, both share the int base.
    let parsed = parse("int x[], y\n");
    let x = global_var(&parsed, 0);

    assert_eq!(name_of(&parsed, x), "x");
    let x_spec = spec_of(&parsed, x);
    assert_eq!(x_spec.rank(), 1);
    assert!(x_spec.has_post_dims());
    assert!(matches!(
        x_spec.resolver(),
        Some(Resolver::Builtin(TokenKind::Int))
    ));

    let y = parsed.arena.var_decls.get(x).next.expect("missing sibling");
    assert_eq!(name_of(&parsed, y), "y");
    let y_spec = spec_of(&parsed, y);
    assert_eq!(y_spec.rank(), 0);
    assert!(!y_spec.is_array());
    assert!(matches!(
        y_spec.resolver(),
        Some(Resolver::Builtin(TokenKind::Int))
    ));
    assert!(parsed.arena.var_decls.get(y).next.is_none());
}

#[test]
fn name_dims_name_means_the_first_name_is_a_type() {
    // "x[] y" must reparse with x as the declared type of y.
    let parsed = parse("int wrap() {\n    x[] y\n    return 0\n}\n");
    let stmts = parsed.arena.stmts_list(parsed.tree.statements);
    let Stmt::Function { body, .. } = *parsed.arena.stmts.get(stmts[0]) else {
        panic!("expected a function");
    };
    let body = body.expect("missing body");
    let first = parsed.arena.stmts_list(body.stmts)[0];
    let Stmt::VarDecl(id) = *parsed.arena.stmts.get(first) else {
        panic!("expected a local declaration");
    };

    assert_eq!(name_of(&parsed, id), "y");
    let spec = spec_of(&parsed, id);
    assert_eq!(spec.rank(), 1);
    assert!(!spec.has_post_dims());
    let Some(Resolver::Named(proxy)) = spec.resolver() else {
        panic!("expected a named type, got {:?}", spec.resolver());
    };
    assert_eq!(parsed.arena.interner.resolve(proxy.name), "x");
}

#[test]
fn old_style_label_and_implicit_int() {
    let parsed = parse("new Foo:tagged = 1\nnew untyped = 2\n");

    let tagged = global_var(&parsed, 0);
    let Some(Resolver::LabeledName(proxy)) = spec_of(&parsed, tagged).resolver() else {
        panic!("expected a labeled type");
    };
    assert_eq!(parsed.arena.interner.resolve(proxy.name), "Foo");

    let untyped = global_var(&parsed, 1);
    assert!(matches!(
        spec_of(&parsed, untyped).resolver(),
        Some(Resolver::ImplicitInt)
    ));
}

#[test]
fn dimension_lists_keep_rank_consistent() {
    // A sized dimension followed by an unsized one.
    let parsed = parse("int m[2][]\n");
    let m = global_var(&parsed, 0);
    let spec = spec_of(&parsed, m);

    assert_eq!(spec.rank(), 2);
    let dims = spec.dims().expect("expected explicit dims");
    let slots = parsed.arena.dims_list(dims);
    assert_eq!(slots.len(), 2);
    assert!(slots[0].is_some());
    assert!(slots[1].is_none());
}

#[test]
fn argument_declarators_cover_both_grammars() {
    let parsed =
        parse("native probe(&a, const Tag:b, int &c, float d[3], ...);\n");
    let stmts = parsed.arena.stmts_list(parsed.tree.statements);
    let Stmt::Function { signature, .. } = *parsed.arena.stmts.get(stmts[0]) else {
        panic!("expected a native");
    };
    let sig = parsed.arena.signatures.get(signature);
    let params = parsed.arena.var_decls_list(sig.params).to_vec();
    assert_eq!(params.len(), 5);

    // &a: old-style by-ref implicit int.
    let a = spec_of(&parsed, params[0]);
    assert!(a.is_by_ref());
    assert!(matches!(a.resolver(), Some(Resolver::ImplicitInt)));

    // const Tag:b: old-style labeled, const.
    let b = spec_of(&parsed, params[1]);
    assert!(b.is_const());
    assert!(matches!(b.resolver(), Some(Resolver::LabeledName(_))));

    // int &c: new-style by-ref.
    let c = spec_of(&parsed, params[2]);
    assert!(c.is_by_ref());
    assert!(matches!(
        c.resolver(),
        Some(Resolver::Builtin(TokenKind::Int))
    ));

    // float d[3]: new-style with post dims.
    let d = spec_of(&parsed, params[3]);
    assert!(d.has_post_dims());
    assert_eq!(d.rank(), 1);

    // ...: variadic and unnamed.
    let rest = spec_of(&parsed, params[4]);
    assert!(rest.is_variadic());
    assert!(parsed.arena.var_decls.get(params[4]).name.is_none());
}

#[test]
fn prefix_rank_survives_reparse() {
    // "bool flags[], extra": prefix-less arrays via post dims on the first
    // declarator only.
    let parsed = parse("bool flags[], extra\n");
    let flags = global_var(&parsed, 0);
    assert_eq!(spec_of(&parsed, flags).rank(), 1);

    let extra = parsed.arena.var_decls.get(flags).next.expect("sibling");
    assert_eq!(spec_of(&parsed, extra).rank(), 0);
    assert!(matches!(
        spec_of(&parsed, extra).resolver(),
        Some(Resolver::Builtin(TokenKind::Bool))
    ));
}

#[test]
fn function_type_specifier_carries_a_signature() {
    let parsed = parse("typedef Handler = function int (int a, int b)\n");
    let stmts = parsed.arena.stmts_list(parsed.tree.statements);
    let Stmt::Typedef { name, spec } = *parsed.arena.stmts.get(stmts[0]) else {
        panic!("expected a typedef");
    };
    assert_eq!(parsed.arena.interner.resolve(name), "Handler");

    let Some(Resolver::FunctionType(sig)) = spec.resolver() else {
        panic!("expected a function type");
    };
    let sig = parsed.arena.signatures.get(sig);
    assert!(matches!(
        sig.return_type.resolver(),
        Some(Resolver::Builtin(TokenKind::Int))
    ));
    assert_eq!(parsed.arena.var_decls_list(sig.params).len(), 2);
}
