//! Tree-walking code generation onto the two-register machine.
//!
//! Emission is total over a well-typed tree: nothing here reports user
//! diagnostics. Checker invariants are `debug_assert!`ed; a violated
//! assertion is a compiler bug, not user error.
//!
//! The emission protocol: `emit()` leaves the node's r-value in PRI, except
//! for l-value nodes, which leave whatever address (or nothing, for
//! directly-addressable symbols) a following `rvalue`/`store` needs.
//! `emit_test()` lowers a boolean context into a conditional branch.

use std::rc::Rc;

use crate::emitter::{BinOp, Emitter, Label, MemUse, Reg, CELL_SIZE, CHAR_BITS};
use crate::sema::{
    Arg, ArgKind, CallArg, DefaultValue, ExprKind, IncDecOp, LogicOp, TypedExpr, UnaryOp,
};
use crate::value::{Ident, Symbol, UserOp, Value, USAGE_CALLBACK, USAGE_WRITTEN};

pub struct CodeGen<E: Emitter> {
    asm: E,
}

impl<E: Emitter> CodeGen<E> {
    pub fn new(asm: E) -> Self {
        Self { asm }
    }

    pub fn emitter(&self) -> &E {
        &self.asm
    }

    pub fn into_emitter(self) -> E {
        self.asm
    }

    /// Emits `expr`, leaving its value (or l-value address) in PRI.
    /// Constant expressions never reach their node-specific emission.
    pub fn emit(&mut self, expr: &TypedExpr) {
        if expr.val.ident() == Ident::ConstExpr {
            self.asm.ldconst(expr.val.constval, Reg::Pri);
            return;
        }
        self.do_emit(expr);
    }

    /// Emits `expr` as a conditional branch: jump to `taken` when the value
    /// matches `jump_on_true`, fall through to `fallthrough` otherwise.
    pub fn emit_test(&mut self, expr: &TypedExpr, jump_on_true: bool, taken: Label, fallthrough: Label) {
        if let ExprKind::Logical { op, .. } = &expr.kind {
            self.emit_logical_test(*op, expr, jump_on_true, taken, fallthrough);
            return;
        }

        self.emit(expr);
        if jump_on_true {
            self.asm.jmp_ne0(taken);
        } else {
            self.asm.jmp_eq0(taken);
        }
    }

    fn do_emit(&mut self, expr: &TypedExpr) {
        match &expr.kind {
            // Always constants; handled by the emit() wrapper.
            ExprKind::Number
            | ExprKind::Float
            | ExprKind::Null
            | ExprKind::Sizeof
            | ExprKind::IsDefined => {
                debug_assert!(false, "constant node reached do_emit");
            }

            ExprKind::String { lit_addr } => {
                self.asm.ldconst(*lit_addr, Reg::Pri);
            }

            ExprKind::ArrayLit { addr } => {
                self.asm.ldconst(*addr, Reg::Pri);
            }

            ExprKind::This => {
                let sym = expr.val.sym.as_ref().expect("this without symbol");
                if sym.ident == Ident::RefArray {
                    self.asm.address(sym, Reg::Pri);
                }
            }

            ExprKind::SymbolRef => self.emit_symbol(expr),

            ExprKind::Rvalue(inner) => {
                self.emit(inner);
                self.asm.rvalue(&inner.val);
            }

            ExprKind::Unary { op, expr: operand, userop } => {
                self.emit(operand);

                // The checker already dispatched an override; nothing to do.
                if userop.is_some() {
                    return;
                }

                match op {
                    UnaryOp::Invert => self.asm.invert(),
                    UnaryOp::LogNot => self.asm.lneg(),
                    UnaryOp::Negate => self.asm.neg(),
                }
            }

            ExprKind::PreInc { op, expr: operand, userop } => {
                self.emit_pre_incdec(*op, operand, userop);
            }

            ExprKind::PostInc { op, expr: operand, userop } => {
                self.emit_post_incdec(*op, operand, userop);
            }

            ExprKind::Binary { .. } => self.emit_binary(expr),

            ExprKind::Logical { .. } => self.emit_logical_value(expr),

            ExprKind::Ternary { first, second, third } => {
                self.emit_ternary(expr, first, second, third);
            }

            ExprKind::Cast(inner) => self.emit(inner),

            ExprKind::Comma(exprs) => {
                for e in exprs {
                    self.emit(e);
                }
            }

            ExprKind::Index { base, index } => self.emit_index(base, index),

            ExprKind::FieldAccess { base, field_offset } => {
                // Only compute the base; loading an accessor or field is
                // reserved for Rvalue.
                self.emit(base);

                if *field_offset != 0 {
                    self.asm.ldconst(*field_offset << 2, Reg::Alt);
                    self.asm.ob_add();
                }
            }

            ExprKind::Call { sym, args } => self.emit_call(expr, sym, args),

            ExprKind::DefaultArg { arg } => self.emit_default_arg(arg),

            ExprKind::CallUserOp { expr: operand, userop } => {
                self.emit(operand);
                self.emit_userop(userop, None);
            }
        }
    }

    fn emit_symbol(&mut self, expr: &TypedExpr) {
        let sym = expr.val.sym.as_ref().expect("symbol ref without symbol").clone();
        match sym.ident {
            Ident::ConstExpr => self.asm.ldconst(sym.addr, Reg::Pri),
            Ident::Array | Ident::RefArray => self.asm.address(&sym, Reg::Pri),
            Ident::Function => {
                self.asm.load_glbfn(&sym);
                self.asm.markusage(&sym, USAGE_CALLBACK);
            }
            // Addressable directly; loads are deferred to Rvalue.
            Ident::Variable | Ident::Reference => {}
            _ => debug_assert!(false, "unexpected symbol ident"),
        }
    }

    fn emit_pre_incdec(&mut self, op: IncDecOp, operand: &TypedExpr, userop: &UserOp) {
        self.emit(operand);

        let val = &operand.val;

        if val.ident() != Ident::Accessor {
            if userop.is_some() {
                self.emit_userop(userop, Some(val));
            } else {
                // Bump the variable first.
                match op {
                    IncDecOp::Inc => self.asm.inc(val),
                    IncDecOp::Dec => self.asm.dec(val),
                }
            }
            // And read the result into PRI.
            self.asm.rvalue(val);
        } else {
            let accessor = val.accessor.as_ref().expect("accessor value without accessor").clone();
            self.asm.pushreg(Reg::Pri);
            self.asm.invoke_getter(&accessor);
            if userop.is_some() {
                self.emit_userop(userop, Some(val));
            } else {
                match op {
                    IncDecOp::Inc => self.asm.inc_pri(),
                    IncDecOp::Dec => self.asm.dec_pri(),
                }
            }
            self.asm.popreg(Reg::Alt);
            self.asm.invoke_setter(&accessor, true);
        }
    }

    fn emit_post_incdec(&mut self, op: IncDecOp, operand: &TypedExpr, userop: &UserOp) {
        self.emit(operand);

        let val = &operand.val;

        if val.ident() != Ident::Accessor {
            // When incrementing array cells, the address in PRI must survive
            // the increment while the old value must be in PRI on exit.
            let saveresult = matches!(val.ident(), Ident::ArrayCell | Ident::ArrayChar);
            if saveresult {
                self.asm.pushreg(Reg::Pri); // save address
            }
            self.asm.rvalue(val); // read current value into PRI
            if saveresult {
                self.asm.swap1(); // old value on stack, address in PRI
            }
            if userop.is_some() {
                self.emit_userop(userop, Some(val));
            } else {
                match op {
                    IncDecOp::Inc => self.asm.inc(val),
                    IncDecOp::Dec => self.asm.dec(val),
                }
            }
            if saveresult {
                self.asm.popreg(Reg::Pri); // restore the old value
            }
        } else {
            let accessor = val.accessor.as_ref().expect("accessor value without accessor").clone();
            self.asm.pushreg(Reg::Pri); // save obj
            self.asm.invoke_getter(&accessor);
            self.asm.move_alt(); // alt = oldval
            self.asm.swap1(); // pri = saved obj, stack = [oldval]
            self.asm.pushreg(Reg::Pri); // pri = obj, alt = oldval, stack = [obj, oldval]
            self.asm.moveto1(); // pri = oldval, stack = [obj, oldval]

            if userop.is_some() {
                self.emit_userop(userop, Some(val));
            } else {
                match op {
                    IncDecOp::Inc => self.asm.inc_pri(),
                    IncDecOp::Dec => self.asm.dec_pri(),
                }
            }

            self.asm.popreg(Reg::Alt);
            self.asm.invoke_setter(&accessor, false);
            self.asm.popreg(Reg::Pri);
        }
    }

    fn emit_binary(&mut self, expr: &TypedExpr) {
        let ExprKind::Binary {
            assign,
            oper,
            left,
            right,
            userop,
            assignop,
            array_copy_length,
        } = &expr.kind
        else {
            unreachable!()
        };

        // Chained relational comparisons have their own strategy.
        if !*assign && oper.is_some_and(BinOp::is_relational) {
            self.emit_chained_compare(expr);
            return;
        }

        let left_val = &left.val;

        // Constant left-hand sides are folded into the operator emission.
        if *assign || left_val.ident() != Ident::ConstExpr {
            self.emit(left);
        }

        let mut saved_lhs = false;
        if *assign {
            match left_val.ident() {
                Ident::ArrayCell | Ident::ArrayChar | Ident::Array | Ident::RefArray => {
                    if oper.is_some() {
                        self.asm.pushreg(Reg::Pri);
                        self.asm.rvalue(left_val);
                        saved_lhs = true;
                    }
                }
                Ident::Accessor => {
                    self.asm.pushreg(Reg::Pri);
                    if oper.is_some() {
                        self.asm.rvalue(left_val);
                    }
                    saved_lhs = true;
                }
                _ => {
                    debug_assert!(left.lvalue);
                    if oper.is_some() {
                        self.asm.rvalue(left_val);
                    }
                }
            }

            if *array_copy_length != 0 {
                debug_assert!(oper.is_none());
                debug_assert!(!assignop.is_some());

                self.asm.pushreg(Reg::Pri);
                self.emit(right);
                self.asm.popreg(Reg::Alt);
                self.asm.memcopy(array_copy_length * CELL_SIZE);
                return;
            }
        }

        debug_assert!(*array_copy_length == 0);
        debug_assert!(left_val.ident() != Ident::Array && left_val.ident() != Ident::RefArray);

        self.emit_inner(*oper, userop, left, right);

        if *assign {
            if saved_lhs {
                self.asm.popreg(Reg::Alt);
            }

            if assignop.is_some() {
                self.emit_userop(assignop, None);
            }
            self.asm.store(left_val);
        }
    }

    /// Flattens a left-leaning chain of relational comparisons and emits
    /// `(a<b) && (b<c)` keeping each middle operand alive in ALT between
    /// links.
    fn emit_chained_compare(&mut self, expr: &TypedExpr) {
        // Outermost first; the last element is the leftmost comparison.
        let mut chain: Vec<&TypedExpr> = Vec::new();
        let mut cur = expr;
        loop {
            chain.push(cur);
            let ExprKind::Binary { assign, oper, left, .. } = &cur.kind else {
                unreachable!()
            };
            debug_assert!(!*assign && oper.is_some_and(BinOp::is_relational));
            match &left.kind {
                ExprKind::Binary { assign: false, oper: Some(op), .. } if op.is_relational() => {
                    cur = left;
                }
                _ => break,
            }
        }

        let ExprKind::Binary { left, .. } = &chain.last().unwrap().kind else {
            unreachable!()
        };
        let mut prev: &TypedExpr = left;
        if prev.val.ident() != Ident::ConstExpr {
            self.emit(prev);
        }

        let mut count = 0;
        for link in chain.iter().rev() {
            let ExprKind::Binary { oper, userop, right, .. } = &link.kind else {
                unreachable!()
            };

            if count == 0 {
                self.emit_inner(*oper, userop, prev, right);
            } else {
                // The previous link's relational op preserved its right-hand
                // operand in ALT, so only the new right-hand side needs to be
                // materialized; relop_prefix/relop_suffix accumulate the
                // running boolean across links.
                self.asm.relop_prefix();
                if right.val.ident() == Ident::ConstExpr {
                    self.asm.ldconst(right.val.constval, Reg::Pri);
                } else {
                    self.emit(right);
                }
                if userop.is_some() {
                    self.emit_userop(userop, None);
                } else {
                    self.asm.oper(oper.expect("chained compare without operator"));
                }
                self.asm.relop_suffix();
            }

            prev = right;
            count += 1;
        }
    }

    /// Emits a binary operation with the LHS in ALT and the RHS in PRI,
    /// swapping for commutative operators when that saves traffic.
    ///
    /// On entry, the LHS has been emitted (unless constant); on exit the
    /// operator result is in PRI.
    fn emit_inner(
        &mut self,
        oper: Option<BinOp>,
        userop: &UserOp,
        left: &TypedExpr,
        right: &TypedExpr,
    ) {
        let left_val = &left.val;
        let right_val = &right.val;

        if left_val.ident() == Ident::ConstExpr {
            if right_val.ident() == Ident::ConstExpr {
                self.asm.ldconst(right_val.constval, Reg::Pri);
            } else {
                self.emit(right);
            }
            self.asm.ldconst(left_val.constval, Reg::Alt);
        } else {
            // For a binary operation the LHS must wind up in ALT. For a pure
            // store it only needs saving when it can't be re-emitted.
            let must_save_lhs = oper.is_some() || !left_val.can_rematerialize();
            if right_val.ident() == Ident::ConstExpr {
                if oper.is_some_and(BinOp::commutative) {
                    self.asm.ldconst(right_val.constval, Reg::Alt);
                } else {
                    if must_save_lhs {
                        self.asm.pushreg(Reg::Pri);
                    }
                    self.asm.ldconst(right_val.constval, Reg::Pri);
                    if must_save_lhs {
                        self.asm.popreg(Reg::Alt);
                    }
                }
            } else {
                if must_save_lhs {
                    self.asm.pushreg(Reg::Pri);
                }
                self.emit(right);
                if must_save_lhs {
                    self.asm.popreg(Reg::Alt);
                }
            }
        }

        if let Some(op) = oper {
            if userop.is_some() {
                self.emit_userop(userop, None);
            } else {
                self.asm.oper(op);
            }
        }
    }

    /// Materializes a logical expression's boolean value in PRI.
    fn emit_logical_value(&mut self, expr: &TypedExpr) {
        let done = self.asm.getlabel();
        let taken = self.asm.getlabel();
        let fallthrough = self.asm.getlabel();

        self.emit_test(expr, true, taken, fallthrough);
        self.asm.setlabel(fallthrough);
        self.asm.ldconst(0, Reg::Pri);
        self.asm.jumplabel(done);
        self.asm.setlabel(taken);
        self.asm.ldconst(1, Reg::Pri);
        self.asm.setlabel(done);
    }

    /// Short-circuit branch emission over the flattened operand list.
    ///
    /// ```text
    /// a||b||c, jumpOnTrue : each     jtrue TAKEN
    /// a||b||c, jumpOnFalse: each!=last jtrue FALLTHROUGH; last jfalse TAKEN; FALLTHROUGH:
    /// a&&b&&c, jumpOnTrue : each!=last jfalse FALLTHROUGH; last jtrue TAKEN; FALLTHROUGH:
    /// a&&b&&c, jumpOnFalse: each     jfalse TAKEN
    /// ```
    fn emit_logical_test(
        &mut self,
        op: LogicOp,
        expr: &TypedExpr,
        jump_on_true: bool,
        taken: Label,
        fallthrough: Label,
    ) {
        let mut sequence: Vec<&TypedExpr> = Vec::new();
        flatten_logical(op, expr, &mut sequence);
        debug_assert!(!sequence.is_empty());

        // The two "mixed" cases short-circuit to a label of their own, bound
        // right after the sequence, so a nested chain of the other operator
        // resumes at the correct operand.
        let local = match (op, jump_on_true) {
            (LogicOp::Or, false) | (LogicOp::And, true) => Some(self.asm.getlabel()),
            _ => None,
        };

        let (last, rest) = sequence.split_last().unwrap();
        for expr in rest {
            match op {
                LogicOp::Or => {
                    if jump_on_true {
                        self.emit_test(expr, true, taken, fallthrough);
                    } else {
                        self.emit_test(expr, true, local.unwrap(), taken);
                    }
                }
                LogicOp::And => {
                    if jump_on_true {
                        self.emit_test(expr, false, local.unwrap(), taken);
                    } else {
                        self.emit_test(expr, false, taken, fallthrough);
                    }
                }
            }
        }

        match local {
            Some(local) => {
                self.emit_test(last, jump_on_true, taken, local);
                self.asm.setlabel(local);
            }
            None => self.emit_test(last, jump_on_true, taken, fallthrough),
        }
    }

    /// Each branch evaluates inside its own heap frame; static allocations
    /// that survive the branch are re-anchored with `setheap_save` so the
    /// join point owns them.
    fn emit_ternary(
        &mut self,
        expr: &TypedExpr,
        first: &TypedExpr,
        second: &TypedExpr,
        third: &TypedExpr,
    ) {
        self.emit(first);

        let flab1 = self.asm.getlabel();
        let flab2 = self.asm.getlabel();

        self.asm.pushheaplist();
        self.asm.jmp_eq0(flab1); // take the second branch if PRI == 0

        self.emit(second);

        let total1 = self.asm.pop_static_heaplist();
        if total1 != 0 {
            self.asm.setheap_save(total1 * CELL_SIZE);
        }
        self.asm.pushheaplist();
        self.asm.jumplabel(flab2);
        self.asm.setlabel(flab1);

        self.emit(third);

        let total2 = self.asm.pop_static_heaplist();
        if total2 != 0 {
            self.asm.setheap_save(total2 * CELL_SIZE);
        }
        self.asm.setlabel(flab2);

        if expr.val.ident() == Ident::RefArray && total1 != 0 && total2 != 0 {
            self.asm.markheap(MemUse::Dynamic, 0);
        }
    }

    fn emit_index(&mut self, base: &TypedExpr, index: &TypedExpr) {
        self.emit(base);

        let sym = base.val.sym.as_ref().expect("indexed array without symbol").clone();
        let shape = sym.array_shape();
        let magic_string = shape.packed && shape.level == 0;

        let idxval = &index.val;
        if idxval.ident() == Ident::ConstExpr {
            // Zero subscripts emit no offset at all.
            if idxval.constval != 0 {
                if !magic_string {
                    self.asm.ldconst(idxval.constval << 2, Reg::Alt);
                } else {
                    // 8-bit character index.
                    self.asm.ldconst(idxval.constval, Reg::Alt);
                }
                self.asm.ob_add();
            }
        } else {
            self.asm.pushreg(Reg::Pri);
            self.emit(index);

            if !magic_string {
                if shape.length != 0 {
                    self.asm.ffbounds(Some(shape.length as i64 - 1));
                } else {
                    self.asm.ffbounds(None);
                }
                self.asm.cell2addr();
            } else {
                if shape.length != 0 {
                    self.asm.ffbounds(Some(shape.length as i64 * (32 / CHAR_BITS) - 1));
                } else {
                    self.asm.ffbounds(None);
                }
                self.asm.char2addr();
            }
            self.asm.popreg(Reg::Alt);
            self.asm.ob_add(); // base address was popped into ALT
        }

        // The indexed item may itself be an array (multi-dimensional case):
        // follow the stored offset to the sub-array.
        if shape.level > 0 {
            let mut val = base.val.clone();
            val.ident = Some(Ident::ArrayCell);
            self.asm.pushreg(Reg::Pri);
            self.asm.rvalue(&val);
            self.asm.popreg(Reg::Alt);
            self.asm.ob_add();
        }
    }

    fn emit_call(&mut self, expr: &TypedExpr, sym: &Rc<Symbol>, args: &[CallArg]) {
        // If returning an array, reserve hidden storage for the result and
        // push its address as a hidden parameter.
        if let Some(ret_sym) = &expr.val.sym {
            let retsize = ret_sym.array_shape().length as i64;
            debug_assert!(retsize > 0);

            self.asm.modheap(retsize * CELL_SIZE);
            self.asm.pushreg(Reg::Alt);
            self.asm.markheap(MemUse::Static, retsize);
        }

        // Everything heap-allocated from here on is owned by the callee.
        self.asm.pushheaplist();

        for CallArg { arg, expr } in args.iter().rev() {
            self.emit(expr);

            if matches!(expr.kind, ExprKind::DefaultArg { .. }) {
                self.asm.pushreg(Reg::Pri);
                continue;
            }

            let val = &expr.val;
            let lvalue = expr.lvalue;

            match arg.kind {
                ArgKind::Varargs => {
                    if matches!(val.ident(), Ident::Variable | Ident::Reference) {
                        let vsym = val.sym.as_ref().expect("variable without symbol").clone();
                        debug_assert!(lvalue);
                        // A "const" variable passed to a non-const variadic
                        // list decays to a boxed copy.
                        if vsym.is_const && !arg.is_const {
                            self.asm.rvalue(val);
                            self.asm.setheap_pri();
                        } else if lvalue {
                            self.asm.address(&vsym, Reg::Pri);
                        } else {
                            self.asm.setheap_pri();
                        }
                    } else if matches!(val.ident(), Ident::ConstExpr | Ident::Expression) {
                        // Box the value (already in PRI) in a heap cell.
                        self.asm.setheap_pri();
                    }
                    if let Some(vsym) = &val.sym {
                        self.asm.markusage(vsym, USAGE_WRITTEN);
                    }
                }
                ArgKind::Variable | ArgKind::RefArray => {}
                ArgKind::Reference => {
                    if matches!(val.ident(), Ident::Variable | Ident::Reference) {
                        let vsym = val.sym.as_ref().expect("variable without symbol").clone();
                        self.asm.address(&vsym, Reg::Pri);
                    }
                    if let Some(vsym) = &val.sym {
                        self.asm.markusage(vsym, USAGE_WRITTEN);
                    }
                }
            }

            self.asm.pushreg(Reg::Pri);
            self.asm.markexpr_param(); // mark the end of a sub-expression
        }

        self.asm.ffcall(sym, args.len() as u32);

        if expr.val.sym.is_some() {
            self.asm.popreg(Reg::Pri); // hidden parameter is the result
        }

        // Scrap all temporary heap allocations used to perform the call.
        self.asm.popheaplist(true);
    }

    fn emit_default_arg(&mut self, arg: &Arg) {
        match arg.kind {
            ArgKind::RefArray => {
                let Some(DefaultValue::Array { data, size, array_size, addr }) = arg.default else {
                    debug_assert!(false, "array default missing");
                    return;
                };
                self.asm.setdefarray(data, size, array_size, addr, arg.is_const);
            }
            ArgKind::Reference => {
                let Some(DefaultValue::Cell(v)) = arg.default else {
                    debug_assert!(false, "reference default missing");
                    return;
                };
                self.asm.setheap(v);
                self.asm.markheap(MemUse::Static, 1);
            }
            ArgKind::Variable => {
                let Some(DefaultValue::Cell(v)) = arg.default else {
                    debug_assert!(false, "value default missing");
                    return;
                };
                self.asm.ldconst(v, Reg::Pri);
            }
            ArgKind::Varargs => debug_assert!(false, "varargs have no default"),
        }
    }

    /// Invokes a user-defined operator: operands go on the stack (PRI last),
    /// the override is called, and for inc/dec-style operators the result is
    /// stored back through `save` (accessor write-back stays with the
    /// caller's setter protocol).
    fn emit_userop(&mut self, userop: &UserOp, save: Option<&Value>) {
        let sym = userop.sym.as_ref().expect("userop without symbol").clone();

        let argc = if userop.two_args {
            self.asm.pushreg(Reg::Alt);
            2
        } else {
            1
        };
        self.asm.pushreg(Reg::Pri);
        self.asm.ffcall(&sym, argc);

        if let Some(val) = save {
            if val.ident() != Ident::Accessor {
                self.asm.store(val);
            }
        }
    }
}

fn flatten_logical<'a>(op: LogicOp, expr: &'a TypedExpr, out: &mut Vec<&'a TypedExpr>) {
    match &expr.kind {
        ExprKind::Logical { op: inner, left, right } if *inner == op => {
            flatten_logical(op, left, out);
            flatten_logical(op, right, out);
        }
        _ => out.push(expr),
    }
}
