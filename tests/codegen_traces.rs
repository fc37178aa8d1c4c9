//! Instruction-trace tests: build checked expression trees by hand and
//! assert the exact primitive sequence the generator produces.

use std::rc::Rc;

use pawnc::ast::Atom;
use pawnc::codegen::CodeGen;
use pawnc::emitter::{BinOp, Insn, InsnBuffer, MemUse, Reg};
use pawnc::sema::{
    Arg, ArgKind, CallArg, DefaultValue, ExprKind, IncDecOp, LogicOp, TypedExpr, UnaryOp,
};
use pawnc::value::{Accessor, ArrayShape, Ident, Symbol, UserOp, Value};

fn atom(raw: u32) -> Atom {
    Atom::from_raw(raw)
}

fn var(raw: u32, addr: i64) -> Rc<Symbol> {
    Rc::new(Symbol::new(atom(raw), Ident::Variable, addr))
}

fn array(raw: u32, addr: i64, length: u32) -> Rc<Symbol> {
    Rc::new(Symbol::new(atom(raw), Ident::Array, addr).with_array(ArrayShape {
        length,
        level: 0,
        packed: false,
    }))
}

fn func(raw: u32) -> Rc<Symbol> {
    Rc::new(Symbol::new(atom(raw), Ident::Function, 0))
}

fn num(v: i64) -> TypedExpr {
    TypedExpr::number(v)
}

/// A variable in r-value position: `Rvalue(SymbolRef)`.
fn load(sym: &Rc<Symbol>) -> TypedExpr {
    let inner = TypedExpr::new_lvalue(ExprKind::SymbolRef, Value::from_symbol(sym.clone()));
    TypedExpr::new(ExprKind::Rvalue(inner.boxed()), Value::expression())
}

fn lval(sym: &Rc<Symbol>) -> TypedExpr {
    TypedExpr::new_lvalue(ExprKind::SymbolRef, Value::from_symbol(sym.clone()))
}

fn binary(op: BinOp, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    TypedExpr::new(
        ExprKind::Binary {
            assign: false,
            oper: Some(op),
            left: left.boxed(),
            right: right.boxed(),
            userop: UserOp::default(),
            assignop: UserOp::default(),
            array_copy_length: 0,
        },
        Value::expression(),
    )
}

fn store(left: TypedExpr, right: TypedExpr) -> TypedExpr {
    TypedExpr::new(
        ExprKind::Binary {
            assign: true,
            oper: None,
            left: left.boxed(),
            right: right.boxed(),
            userop: UserOp::default(),
            assignop: UserOp::default(),
            array_copy_length: 0,
        },
        Value::expression(),
    )
}

fn logical(op: LogicOp, left: TypedExpr, right: TypedExpr) -> TypedExpr {
    TypedExpr::new(
        ExprKind::Logical {
            op,
            left: left.boxed(),
            right: right.boxed(),
        },
        Value::expression(),
    )
}

fn emit(expr: &TypedExpr) -> Vec<Insn> {
    let mut cg = CodeGen::new(InsnBuffer::new());
    cg.emit(expr);
    cg.into_emitter().into_insns()
}

/// Labels 100/101 are caller-provided, so generator-allocated labels
/// (0, 1, ...) are easy to tell apart in assertions.
fn emit_test(expr: &TypedExpr, jump_on_true: bool) -> Vec<Insn> {
    let mut cg = CodeGen::new(InsnBuffer::new());
    cg.emit_test(expr, jump_on_true, 100, 101);
    cg.into_emitter().into_insns()
}

use Insn::*;
use Reg::{Alt, Pri};

#[test]
fn assignment_of_nested_constants_matches_the_case_table() {
    // a = 1 + 2 * 3
    let a = var(0, 12);
    let rhs = binary(BinOp::Add, num(1), binary(BinOp::Mul, num(2), num(3)));
    let expr = store(lval(&a), rhs);

    assert_eq!(
        emit(&expr),
        vec![
            LdConst(3, Pri),
            LdConst(2, Alt),
            Op(BinOp::Mul),
            LdConst(1, Alt),
            Op(BinOp::Add),
            Store,
        ]
    );
}

#[test]
fn constant_expression_short_circuits_do_emit() {
    // The wrapper emits the folded value; the node body never runs.
    let expr = TypedExpr::new(
        ExprKind::Binary {
            assign: false,
            oper: Some(BinOp::Add),
            left: num(1).boxed(),
            right: num(2).boxed(),
            userop: UserOp::default(),
            assignop: UserOp::default(),
            array_copy_length: 0,
        },
        Value::constexpr(3),
    );
    assert_eq!(emit(&expr), vec![LdConst(3, Pri)]);
}

#[test]
fn emit_inner_register_discipline() {
    let x = var(0, 4);
    let y = var(1, 8);

    // Both operands dynamic: LHS saved across the RHS emission.
    assert_eq!(
        emit(&binary(BinOp::Add, load(&x), load(&y))),
        vec![Rvalue, PushReg(Pri), Rvalue, PopReg(Alt), Op(BinOp::Add)]
    );

    // Constant RHS, commutative operator: load straight into ALT.
    assert_eq!(
        emit(&binary(BinOp::Add, load(&x), num(5))),
        vec![Rvalue, LdConst(5, Alt), Op(BinOp::Add)]
    );

    // Constant RHS, non-commutative: the save dance.
    assert_eq!(
        emit(&binary(BinOp::Sub, load(&x), num(5))),
        vec![
            Rvalue,
            PushReg(Pri),
            LdConst(5, Pri),
            PopReg(Alt),
            Op(BinOp::Sub)
        ]
    );

    // Constant LHS: RHS first, then LHS straight into ALT.
    assert_eq!(
        emit(&binary(BinOp::Sub, num(7), load(&y))),
        vec![Rvalue, LdConst(7, Alt), Op(BinOp::Sub)]
    );
}

#[test]
fn compound_assignment_reloads_the_lvalue() {
    // x += 5 on a plain variable: no address to save.
    let x = var(0, 4);
    let expr = TypedExpr::new(
        ExprKind::Binary {
            assign: true,
            oper: Some(BinOp::Add),
            left: lval(&x).boxed(),
            right: num(5).boxed(),
            userop: UserOp::default(),
            assignop: UserOp::default(),
            array_copy_length: 0,
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![Rvalue, LdConst(5, Alt), Op(BinOp::Add), Store]
    );
}

#[test]
fn whole_array_assignment_uses_memcopy() {
    let dst = array(0, 16, 8);
    let src = array(1, 64, 8);
    let lhs = TypedExpr::new_lvalue(ExprKind::SymbolRef, Value::from_symbol(dst.clone()));
    let rhs = TypedExpr::new(ExprKind::SymbolRef, Value::from_symbol(src.clone()));
    let expr = TypedExpr::new(
        ExprKind::Binary {
            assign: true,
            oper: None,
            left: lhs.boxed(),
            right: rhs.boxed(),
            userop: UserOp::default(),
            assignop: UserOp::default(),
            array_copy_length: 8,
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![
            Address(16, Pri),
            PushReg(Pri),
            Address(64, Pri),
            PopReg(Alt),
            MemCopy(32),
        ]
    );
}

#[test]
fn chained_compare_keeps_the_middle_operand_in_alt() {
    // a < b < c, flattened: leftmost emitted once, then one relop per link
    // with prefix/suffix around every link but the first.
    let a = var(0, 0);
    let b = var(1, 4);
    let c = var(2, 8);
    let inner = binary(BinOp::Lt, load(&a), load(&b));
    let expr = binary(BinOp::Lt, inner, load(&c));

    assert_eq!(
        emit(&expr),
        vec![
            Rvalue, // a
            PushReg(Pri),
            Rvalue, // b
            PopReg(Alt),
            Op(BinOp::Lt),
            RelopPrefix,
            Rvalue, // c; b is still live in ALT
            Op(BinOp::Lt),
            RelopSuffix,
        ]
    );
}

#[test]
fn short_circuit_truth_tables() {
    let a = var(0, 0);
    let b = var(1, 4);
    let c = var(2, 8);

    let or3 = || logical(LogicOp::Or, logical(LogicOp::Or, load(&a), load(&b)), load(&c));
    let and3 = || logical(LogicOp::And, logical(LogicOp::And, load(&a), load(&b)), load(&c));

    // a||b||c, jumpOnTrue: each operand jumps taken when true.
    assert_eq!(
        emit_test(&or3(), true),
        vec![
            Rvalue,
            JumpNe0(100),
            Rvalue,
            JumpNe0(100),
            Rvalue,
            JumpNe0(100),
        ]
    );

    // a||b||c, jumpOnFalse: early operands bail out to a local fallthrough,
    // the last jumps taken when false, and the local label binds at the end.
    assert_eq!(
        emit_test(&or3(), false),
        vec![
            Rvalue,
            JumpNe0(0),
            Rvalue,
            JumpNe0(0),
            Rvalue,
            JumpEq0(100),
            SetLabel(0),
        ]
    );

    // a&&b&&c, jumpOnTrue: mirror image.
    assert_eq!(
        emit_test(&and3(), true),
        vec![
            Rvalue,
            JumpEq0(0),
            Rvalue,
            JumpEq0(0),
            Rvalue,
            JumpNe0(100),
            SetLabel(0),
        ]
    );

    // a&&b&&c, jumpOnFalse: each operand jumps taken when false.
    assert_eq!(
        emit_test(&and3(), false),
        vec![
            Rvalue,
            JumpEq0(100),
            Rvalue,
            JumpEq0(100),
            Rvalue,
            JumpEq0(100),
        ]
    );
}

#[test]
fn mixed_and_or_resumes_at_the_next_operand() {
    // (a && b) || c with jump_on_true: a false must still test c.
    let a = var(0, 0);
    let b = var(1, 4);
    let c = var(2, 8);
    let expr = logical(LogicOp::Or, logical(LogicOp::And, load(&a), load(&b)), load(&c));

    assert_eq!(
        emit_test(&expr, true),
        vec![
            Rvalue,
            JumpEq0(0), // a false: resume at c
            Rvalue,
            JumpNe0(100), // b true: whole condition true
            SetLabel(0),
            Rvalue,
            JumpNe0(100), // c true: whole condition true
        ]
    );
}

#[test]
fn logical_value_materializes_zero_or_one() {
    let a = var(0, 0);
    let b = var(1, 4);
    let expr = logical(LogicOp::Or, load(&a), load(&b));

    // done=0, taken=1, fallthrough=2.
    assert_eq!(
        emit(&expr),
        vec![
            Rvalue,
            JumpNe0(1),
            Rvalue,
            JumpNe0(1),
            SetLabel(2),
            LdConst(0, Pri),
            Jump(0),
            SetLabel(1),
            LdConst(1, Pri),
            SetLabel(0),
        ]
    );
}

/// A call to a function whose return is a refarray of `cells` cells.
fn array_call(fn_atom: u32, ret_atom: u32, cells: u32) -> TypedExpr {
    let ret_sym = Rc::new(
        Symbol::new(atom(ret_atom), Ident::RefArray, 0).with_array(ArrayShape {
            length: cells,
            level: 0,
            packed: false,
        }),
    );
    TypedExpr::new(
        ExprKind::Call {
            sym: func(fn_atom),
            args: Vec::new(),
        },
        Value {
            ident: Some(Ident::RefArray),
            constval: 0,
            sym: Some(ret_sym),
            accessor: None,
        },
    )
}

#[test]
fn ternary_scopes_per_branch_heap_use() {
    // x ? f() : g() where both branches return arrays: each branch's static
    // heap use is re-anchored past the join, and a refarray result marks a
    // dynamic join allocation.
    let x = var(0, 0);
    let expr = TypedExpr::new(
        ExprKind::Ternary {
            first: load(&x).boxed(),
            second: array_call(1, 2, 2).boxed(),
            third: array_call(3, 4, 2).boxed(),
        },
        Value {
            ident: Some(Ident::RefArray),
            constval: 0,
            sym: None,
            accessor: None,
        },
    );

    let insns = emit(&expr);
    assert_eq!(
        insns,
        vec![
            Rvalue, // condition
            PushHeapList,
            JumpEq0(0),
            // then-branch call
            ModHeap(8),
            PushReg(Alt),
            MarkHeap(MemUse::Static, 2),
            PushHeapList,
            FfCall(atom(1), 0),
            PopReg(Pri),
            PopHeapList(true),
            // branch join bookkeeping
            PopStaticHeapList(2),
            SetHeapSave(8),
            PushHeapList,
            Jump(1),
            SetLabel(0),
            // else-branch call
            ModHeap(8),
            PushReg(Alt),
            MarkHeap(MemUse::Static, 2),
            PushHeapList,
            FfCall(atom(3), 0),
            PopReg(Pri),
            PopHeapList(true),
            PopStaticHeapList(2),
            SetHeapSave(8),
            SetLabel(1),
            MarkHeap(MemUse::Dynamic, 0),
        ]
    );

    // Heap balance: every frame opened is closed exactly once.
    let opens = insns.iter().filter(|i| matches!(i, PushHeapList)).count();
    let closes = insns
        .iter()
        .filter(|i| matches!(i, PopHeapList(_) | PopStaticHeapList(_)))
        .count();
    assert_eq!(opens, closes);
}

#[test]
fn ternary_without_heap_use_skips_the_save() {
    let x = var(0, 0);
    let expr = TypedExpr::new(
        ExprKind::Ternary {
            first: load(&x).boxed(),
            second: num(1).boxed(),
            third: num(2).boxed(),
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![
            Rvalue,
            PushHeapList,
            JumpEq0(0),
            LdConst(1, Pri),
            PopStaticHeapList(0),
            PushHeapList,
            Jump(1),
            SetLabel(0),
            LdConst(2, Pri),
            PopStaticHeapList(0),
            SetLabel(1),
        ]
    );
}

fn index_expr(arr: Rc<Symbol>, index: TypedExpr) -> TypedExpr {
    let base = TypedExpr::new(ExprKind::SymbolRef, Value::from_symbol(arr));
    TypedExpr::new_lvalue(
        ExprKind::Index {
            base: base.boxed(),
            index: index.boxed(),
        },
        Value {
            ident: Some(Ident::ArrayCell),
            constval: 0,
            sym: None,
            accessor: None,
        },
    )
}

#[test]
fn index_with_dynamic_subscript_bounds_checks() {
    let arr = array(0, 16, 10);
    let i = var(1, 4);
    let expr = index_expr(arr, load(&i));

    assert_eq!(
        emit(&expr),
        vec![
            Address(16, Pri),
            PushReg(Pri),
            Rvalue, // index
            Bounds(Some(9)),
            Cell2Addr,
            PopReg(Alt),
            Op(BinOp::Add),
        ]
    );
}

#[test]
fn index_constant_subscripts() {
    let arr = array(0, 16, 10);

    // Nonzero constant: scaled offset into ALT, no bounds check.
    assert_eq!(
        emit(&index_expr(arr.clone(), num(3))),
        vec![Address(16, Pri), LdConst(12, Alt), Op(BinOp::Add)]
    );

    // Zero subscript: no offset at all.
    assert_eq!(emit(&index_expr(arr, num(0))), vec![Address(16, Pri)]);
}

#[test]
fn packed_string_index_uses_char_addressing() {
    let arr = Rc::new(
        Symbol::new(atom(0), Ident::Array, 16).with_array(ArrayShape {
            length: 10,
            level: 0,
            packed: true,
        }),
    );
    let i = var(1, 4);

    assert_eq!(
        emit(&index_expr(arr.clone(), load(&i))),
        vec![
            Address(16, Pri),
            PushReg(Pri),
            Rvalue,
            Bounds(Some(39)), // length * (32 / charbits) - 1
            Char2Addr,
            PopReg(Alt),
            Op(BinOp::Add),
        ]
    );

    // Packed constant index: unscaled character offset.
    assert_eq!(
        emit(&index_expr(arr, num(3))),
        vec![Address(16, Pri), LdConst(3, Alt), Op(BinOp::Add)]
    );
}

#[test]
fn multi_dimensional_index_follows_the_indirection_vector() {
    let arr = Rc::new(
        Symbol::new(atom(0), Ident::Array, 16).with_array(ArrayShape {
            length: 4,
            level: 1,
            packed: false,
        }),
    );

    assert_eq!(
        emit(&index_expr(arr, num(1))),
        vec![
            Address(16, Pri),
            LdConst(4, Alt),
            Op(BinOp::Add),
            // follow the sub-array offset
            PushReg(Pri),
            Rvalue,
            PopReg(Alt),
            Op(BinOp::Add),
        ]
    );
}

#[test]
fn post_increment_of_an_array_cell_preserves_the_old_value() {
    let arr = array(0, 16, 4);
    let cell = index_expr(arr, num(1));
    let expr = TypedExpr::new(
        ExprKind::PostInc {
            op: IncDecOp::Inc,
            expr: cell.boxed(),
            userop: UserOp::default(),
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![
            Address(16, Pri),
            LdConst(4, Alt),
            Op(BinOp::Add),
            PushReg(Pri), // save address
            Rvalue,       // old value into PRI
            Swap1,        // old value to stack, address back to PRI
            Inc,
            PopReg(Pri), // old value is the result
        ]
    );
}

#[test]
fn pre_increment_of_a_variable_bumps_then_reloads() {
    let x = var(0, 4);
    let expr = TypedExpr::new(
        ExprKind::PreInc {
            op: IncDecOp::Dec,
            expr: lval(&x).boxed(),
            userop: UserOp::default(),
        },
        Value::expression(),
    );

    assert_eq!(emit(&expr), vec![Dec, Rvalue]);
}

fn accessor_operand(acc: &Rc<Accessor>) -> TypedExpr {
    let this_sym = var(9, 0);
    let base = TypedExpr::new(ExprKind::This, Value::from_symbol(this_sym));
    TypedExpr::new_lvalue(
        ExprKind::FieldAccess {
            base: base.boxed(),
            field_offset: 0,
        },
        Value::accessor(acc.clone()),
    )
}

#[test]
fn accessor_pre_increment_protocol() {
    let acc = Rc::new(Accessor {
        name: atom(7),
        getter: Some(func(8)),
        setter: Some(func(9)),
    });
    let expr = TypedExpr::new(
        ExprKind::PreInc {
            op: IncDecOp::Inc,
            expr: accessor_operand(&acc).boxed(),
            userop: UserOp::default(),
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![
            PushReg(Pri),
            InvokeGetter(atom(7)),
            IncPri,
            PopReg(Alt),
            InvokeSetter(atom(7), true),
        ]
    );
}

#[test]
fn accessor_post_increment_protocol() {
    let acc = Rc::new(Accessor {
        name: atom(7),
        getter: Some(func(8)),
        setter: Some(func(9)),
    });
    let expr = TypedExpr::new(
        ExprKind::PostInc {
            op: IncDecOp::Inc,
            expr: accessor_operand(&acc).boxed(),
            userop: UserOp::default(),
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![
            PushReg(Pri),
            InvokeGetter(atom(7)),
            MoveAlt,
            Swap1,
            PushReg(Pri),
            MoveTo1,
            IncPri,
            PopReg(Alt),
            InvokeSetter(atom(7), false),
            PopReg(Pri),
        ]
    );
}

#[test]
fn compound_assignment_through_an_accessor() {
    let acc = Rc::new(Accessor {
        name: atom(7),
        getter: Some(func(8)),
        setter: Some(func(9)),
    });
    let expr = TypedExpr::new(
        ExprKind::Binary {
            assign: true,
            oper: Some(BinOp::Add),
            left: accessor_operand(&acc).boxed(),
            right: num(5).boxed(),
            userop: UserOp::default(),
            assignop: UserOp::default(),
            array_copy_length: 0,
        },
        Value::expression(),
    );

    assert_eq!(
        emit(&expr),
        vec![
            PushReg(Pri), // save the object
            Rvalue,       // getter load
            LdConst(5, Alt),
            Op(BinOp::Add),
            PopReg(Alt), // restore the destination
            Store,
        ]
    );
}

#[test]
fn call_pushes_arguments_right_to_left_inside_a_heap_scope() {
    let f = func(0);
    let x = var(1, 4);

    let args = vec![
        CallArg {
            arg: Rc::new(Arg::new(ArgKind::Variable)),
            expr: load(&x),
        },
        CallArg {
            arg: Rc::new(Arg::new(ArgKind::Variable)),
            expr: num(5),
        },
    ];
    let expr = TypedExpr::new(ExprKind::Call { sym: f, args }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![
            PushHeapList,
            LdConst(5, Pri),
            PushReg(Pri),
            MarkParam,
            Rvalue,
            PushReg(Pri),
            MarkParam,
            FfCall(atom(0), 2),
            PopHeapList(true),
        ]
    );
}

#[test]
fn default_arguments_push_unconditionally_without_a_marker() {
    let f = func(0);
    let args = vec![CallArg {
        arg: Rc::new(Arg::new(ArgKind::Variable).with_default(DefaultValue::Cell(7))),
        expr: TypedExpr::new(
            ExprKind::DefaultArg {
                arg: Rc::new(Arg::new(ArgKind::Variable).with_default(DefaultValue::Cell(7))),
            },
            Value::expression(),
        ),
    }];
    let expr = TypedExpr::new(ExprKind::Call { sym: f, args }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![
            PushHeapList,
            LdConst(7, Pri),
            PushReg(Pri),
            FfCall(atom(0), 1),
            PopHeapList(true),
        ]
    );
}

#[test]
fn reference_default_reserves_a_heap_cell() {
    let arg = Rc::new(Arg::new(ArgKind::Reference).with_default(DefaultValue::Cell(3)));
    let expr = TypedExpr::new(ExprKind::DefaultArg { arg }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![SetHeap(3), MarkHeap(MemUse::Static, 1)]
    );
}

#[test]
fn refarray_default_uses_setdefarray() {
    let arg = Rc::new(
        Arg::new(ArgKind::RefArray)
            .constant()
            .with_default(DefaultValue::Array {
                data: true,
                size: 4,
                array_size: 4,
                addr: 96,
            }),
    );
    let expr = TypedExpr::new(ExprKind::DefaultArg { arg }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![SetDefArray {
            data: true,
            size: 4,
            array_size: 4,
            addr: 96,
            is_const: true,
        }]
    );
}

#[test]
fn const_vararg_is_boxed_on_the_heap() {
    let f = func(0);
    let args = vec![CallArg {
        arg: Rc::new(Arg::new(ArgKind::Varargs)),
        expr: num(42),
    }];
    let expr = TypedExpr::new(ExprKind::Call { sym: f, args }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![
            PushHeapList,
            LdConst(42, Pri),
            SetHeapPri,
            PushReg(Pri),
            MarkParam,
            FfCall(atom(0), 1),
            PopHeapList(true),
        ]
    );
}

#[test]
fn variable_vararg_passes_its_address() {
    let f = func(0);
    let x = var(1, 4);
    let args = vec![CallArg {
        arg: Rc::new(Arg::new(ArgKind::Varargs)),
        expr: lval(&x),
    }];
    let expr = TypedExpr::new(ExprKind::Call { sym: f, args }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![
            PushHeapList,
            Address(4, Pri),
            MarkUsage(atom(1), pawnc::value::USAGE_WRITTEN),
            PushReg(Pri),
            MarkParam,
            FfCall(atom(0), 1),
            PopHeapList(true),
        ]
    );
}

#[test]
fn const_variable_to_nonconst_vararg_decays_to_a_copy() {
    let f = func(0);
    let x = Rc::new(Symbol::new(atom(1), Ident::Variable, 4).constant());
    let args = vec![CallArg {
        arg: Rc::new(Arg::new(ArgKind::Varargs)),
        expr: TypedExpr::new_lvalue(ExprKind::SymbolRef, Value::from_symbol(x)),
    }];
    let expr = TypedExpr::new(ExprKind::Call { sym: f, args }, Value::expression());

    assert_eq!(
        emit(&expr),
        vec![
            PushHeapList,
            Rvalue,
            SetHeapPri,
            MarkUsage(atom(1), pawnc::value::USAGE_WRITTEN),
            PushReg(Pri),
            MarkParam,
            FfCall(atom(0), 1),
            PopHeapList(true),
        ]
    );
}

#[test]
fn call_returning_an_array_reserves_hidden_storage() {
    let expr = array_call(0, 1, 3);

    assert_eq!(
        emit(&expr),
        vec![
            ModHeap(12),
            PushReg(Alt),
            MarkHeap(MemUse::Static, 3),
            PushHeapList,
            FfCall(atom(0), 0),
            PopReg(Pri),
            PopHeapList(true),
        ]
    );
}

#[test]
fn unary_operators_apply_to_pri() {
    let x = var(0, 4);

    for (op, insn) in [
        (UnaryOp::Invert, Invert),
        (UnaryOp::LogNot, LogNeg),
        (UnaryOp::Negate, Neg),
    ] {
        let expr = TypedExpr::new(
            ExprKind::Unary {
                op,
                expr: load(&x).boxed(),
                userop: UserOp::default(),
            },
            Value::expression(),
        );
        assert_eq!(emit(&expr), vec![Rvalue, insn]);
    }
}

#[test]
fn unary_with_dispatched_userop_emits_nothing_extra() {
    let x = var(0, 4);
    let expr = TypedExpr::new(
        ExprKind::Unary {
            op: UnaryOp::Negate,
            expr: load(&x).boxed(),
            userop: UserOp {
                sym: Some(func(5)),
                two_args: false,
                oper: true,
            },
        },
        Value::expression(),
    );
    assert_eq!(emit(&expr), vec![Rvalue]);
}

#[test]
fn user_op_call_pushes_operand_and_calls() {
    let x = var(0, 4);
    let expr = TypedExpr::new(
        ExprKind::CallUserOp {
            expr: load(&x).boxed(),
            userop: UserOp {
                sym: Some(func(5)),
                two_args: false,
                oper: true,
            },
        },
        Value::expression(),
    );
    assert_eq!(
        emit(&expr),
        vec![Rvalue, PushReg(Pri), FfCall(atom(5), 1)]
    );
}

#[test]
fn comma_discards_intermediate_values() {
    let x = var(0, 4);
    let expr = TypedExpr::new(
        ExprKind::Comma(vec![num(1), load(&x)]),
        Value::expression(),
    );
    assert_eq!(emit(&expr), vec![LdConst(1, Pri), Rvalue]);
}

#[test]
fn cast_is_transparent() {
    let expr = TypedExpr::new(ExprKind::Cast(num(3).boxed()), Value::expression());
    assert_eq!(emit(&expr), vec![LdConst(3, Pri)]);
}

#[test]
fn field_access_adds_scaled_offset_without_loading() {
    let obj = var(0, 4);
    let expr = TypedExpr::new_lvalue(
        ExprKind::FieldAccess {
            base: lval(&obj).boxed(),
            field_offset: 2,
        },
        Value::expression(),
    );
    assert_eq!(emit(&expr), vec![LdConst(8, Alt), Op(BinOp::Add)]);
}

#[test]
fn default_emit_test_jumps_on_the_value() {
    let x = var(0, 4);
    assert_eq!(emit_test(&load(&x), true), vec![Rvalue, JumpNe0(100)]);
    assert_eq!(emit_test(&load(&x), false), vec![Rvalue, JumpEq0(100)]);
    assert_eq!(
        emit_test(&num(1), false),
        vec![LdConst(1, Pri), JumpEq0(100)]
    );
}

#[test]
fn function_symbol_reference_marks_callback_usage() {
    let f = func(3);
    let expr = TypedExpr::new(ExprKind::SymbolRef, Value::from_symbol(f.clone()));
    assert_eq!(
        emit(&expr),
        vec![
            LoadGlbFn(atom(3)),
            MarkUsage(atom(3), pawnc::value::USAGE_CALLBACK)
        ]
    );
    assert_ne!(f.usage() & pawnc::value::USAGE_CALLBACK, 0);
}

#[test]
fn string_and_array_literals_load_pool_addresses() {
    let s = TypedExpr::new(
        ExprKind::String { lit_addr: 640 },
        Value {
            ident: Some(Ident::Array),
            constval: 0,
            sym: None,
            accessor: None,
        },
    );
    assert_eq!(emit(&s), vec![LdConst(640, Pri)]);

    let a = TypedExpr::new(
        ExprKind::ArrayLit { addr: 720 },
        Value {
            ident: Some(Ident::Array),
            constval: 0,
            sym: None,
            accessor: None,
        },
    );
    assert_eq!(emit(&a), vec![LdConst(720, Pri)]);
}
