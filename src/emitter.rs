//! The two-register VM surface the code generator targets.
//!
//! PRI and ALT are deliberately exposed: operators consume the left operand
//! in ALT and leave results in PRI, and the generator plans register traffic
//! around that. [`InsnBuffer`] records every primitive as data so tests can
//! assert exact emission order; it also owns the label counter and models
//! the heap-list stack that scopes transient allocations.

use crate::ast::Atom;
use crate::value::{Accessor, Symbol, Value};
use std::rc::Rc;

/// Bytes per VM cell.
pub const CELL_SIZE: i64 = 4;
/// Bits per character in a packed string.
pub const CHAR_BITS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Pri,
    Alt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// Operands may be swapped freely for these.
    pub fn commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Eq | BinOp::Neq
        )
    }

    pub fn is_relational(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }
}

pub type Label = u32;

/// Lifetime class of a heap allocation within a heap-list frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemUse {
    Static,
    Dynamic,
}

/// One recorded primitive. The order of these is the generator's entire
/// observable behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    LdConst(i64, Reg),
    Rvalue,
    Store,
    Address(i64, Reg),
    PushReg(Reg),
    PopReg(Reg),
    MoveAlt,
    MoveTo1,
    Swap1,
    Invert,
    LogNeg,
    Neg,
    /// In-memory increment/decrement of an l-value.
    Inc,
    Dec,
    IncPri,
    DecPri,
    Op(BinOp),
    RelopPrefix,
    RelopSuffix,
    SetLabel(Label),
    Jump(Label),
    JumpEq0(Label),
    JumpNe0(Label),
    Cell2Addr,
    Char2Addr,
    Bounds(Option<i64>),
    MemCopy(i64),
    PushHeapList,
    PopStaticHeapList(i64),
    PopHeapList(bool),
    SetHeapSave(i64),
    SetHeapPri,
    SetHeap(i64),
    ModHeap(i64),
    MarkHeap(MemUse, i64),
    FfCall(Atom, u32),
    LoadGlbFn(Atom),
    MarkUsage(Atom, u8),
    InvokeGetter(Atom),
    InvokeSetter(Atom, bool),
    SetDefArray {
        data: bool,
        size: i64,
        array_size: i64,
        addr: i64,
        is_const: bool,
    },
    /// Argument boundary marker.
    MarkParam,
}

/// Instruction-emission primitives. Labels are allocated here; the code
/// generator never fabricates label ids itself.
pub trait Emitter {
    fn ldconst(&mut self, v: i64, reg: Reg);
    fn rvalue(&mut self, val: &Value);
    fn store(&mut self, val: &Value);
    fn address(&mut self, sym: &Rc<Symbol>, reg: Reg);

    fn pushreg(&mut self, reg: Reg);
    fn popreg(&mut self, reg: Reg);
    fn move_alt(&mut self);
    fn moveto1(&mut self);
    fn swap1(&mut self);

    fn invert(&mut self);
    fn lneg(&mut self);
    fn neg(&mut self);
    fn inc(&mut self, val: &Value);
    fn dec(&mut self, val: &Value);
    fn inc_pri(&mut self);
    fn dec_pri(&mut self);
    /// Applies `op` to ALT (left) and PRI (right), leaving the result in
    /// PRI. Relational operators additionally preserve their right-hand
    /// operand in ALT; chained comparisons depend on that.
    fn oper(&mut self, op: BinOp);
    fn ob_add(&mut self) {
        self.oper(BinOp::Add);
    }

    fn relop_prefix(&mut self);
    fn relop_suffix(&mut self);

    fn getlabel(&mut self) -> Label;
    fn setlabel(&mut self, label: Label);
    fn jumplabel(&mut self, label: Label);
    fn jmp_eq0(&mut self, label: Label);
    fn jmp_ne0(&mut self, label: Label);

    fn cell2addr(&mut self);
    fn char2addr(&mut self);
    fn ffbounds(&mut self, max: Option<i64>);
    fn memcopy(&mut self, bytes: i64);

    fn pushheaplist(&mut self);
    /// Closes the innermost frame, returning its cumulative static size.
    fn pop_static_heaplist(&mut self) -> i64;
    fn popheaplist(&mut self, scrap: bool);
    fn setheap_save(&mut self, bytes: i64);
    fn setheap_pri(&mut self);
    fn setheap(&mut self, val: i64);
    fn modheap(&mut self, bytes: i64);
    fn markheap(&mut self, kind: MemUse, size: i64);

    fn ffcall(&mut self, sym: &Rc<Symbol>, argc: u32);
    fn load_glbfn(&mut self, sym: &Rc<Symbol>);
    fn markusage(&mut self, sym: &Rc<Symbol>, flag: u8);

    fn invoke_getter(&mut self, accessor: &Rc<Accessor>);
    fn invoke_setter(&mut self, accessor: &Rc<Accessor>, pop_value_from_stack: bool);

    fn setdefarray(&mut self, data: bool, size: i64, array_size: i64, addr: i64, is_const: bool);

    fn markexpr_param(&mut self);
}

/// Recording emitter: every primitive becomes an [`Insn`], labels are handed
/// out sequentially, and heap-list frames track `markheap` sizes so
/// `pop_static_heaplist` returns real totals.
#[derive(Debug, Default)]
pub struct InsnBuffer {
    insns: Vec<Insn>,
    next_label: Label,
    heap_scopes: Vec<Vec<(MemUse, i64)>>,
}

impl InsnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn into_insns(self) -> Vec<Insn> {
        debug_assert!(self.heap_scopes.is_empty(), "unbalanced heap scopes");
        self.insns
    }

    pub fn open_heap_scopes(&self) -> usize {
        self.heap_scopes.len()
    }

    fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    fn mark(&mut self, kind: MemUse, size: i64) {
        if let Some(frame) = self.heap_scopes.last_mut() {
            frame.push((kind, size));
        }
    }
}

impl Emitter for InsnBuffer {
    fn ldconst(&mut self, v: i64, reg: Reg) {
        self.push(Insn::LdConst(v, reg));
    }

    fn rvalue(&mut self, _val: &Value) {
        self.push(Insn::Rvalue);
    }

    fn store(&mut self, _val: &Value) {
        self.push(Insn::Store);
    }

    fn address(&mut self, sym: &Rc<Symbol>, reg: Reg) {
        self.push(Insn::Address(sym.addr, reg));
    }

    fn pushreg(&mut self, reg: Reg) {
        self.push(Insn::PushReg(reg));
    }

    fn popreg(&mut self, reg: Reg) {
        self.push(Insn::PopReg(reg));
    }

    fn move_alt(&mut self) {
        self.push(Insn::MoveAlt);
    }

    fn moveto1(&mut self) {
        self.push(Insn::MoveTo1);
    }

    fn swap1(&mut self) {
        self.push(Insn::Swap1);
    }

    fn invert(&mut self) {
        self.push(Insn::Invert);
    }

    fn lneg(&mut self) {
        self.push(Insn::LogNeg);
    }

    fn neg(&mut self) {
        self.push(Insn::Neg);
    }

    fn inc(&mut self, _val: &Value) {
        self.push(Insn::Inc);
    }

    fn dec(&mut self, _val: &Value) {
        self.push(Insn::Dec);
    }

    fn inc_pri(&mut self) {
        self.push(Insn::IncPri);
    }

    fn dec_pri(&mut self) {
        self.push(Insn::DecPri);
    }

    fn oper(&mut self, op: BinOp) {
        self.push(Insn::Op(op));
    }

    fn relop_prefix(&mut self) {
        self.push(Insn::RelopPrefix);
    }

    fn relop_suffix(&mut self) {
        self.push(Insn::RelopSuffix);
    }

    fn getlabel(&mut self) -> Label {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    fn setlabel(&mut self, label: Label) {
        self.push(Insn::SetLabel(label));
    }

    fn jumplabel(&mut self, label: Label) {
        self.push(Insn::Jump(label));
    }

    fn jmp_eq0(&mut self, label: Label) {
        self.push(Insn::JumpEq0(label));
    }

    fn jmp_ne0(&mut self, label: Label) {
        self.push(Insn::JumpNe0(label));
    }

    fn cell2addr(&mut self) {
        self.push(Insn::Cell2Addr);
    }

    fn char2addr(&mut self) {
        self.push(Insn::Char2Addr);
    }

    fn ffbounds(&mut self, max: Option<i64>) {
        self.push(Insn::Bounds(max));
    }

    fn memcopy(&mut self, bytes: i64) {
        self.push(Insn::MemCopy(bytes));
    }

    fn pushheaplist(&mut self) {
        self.heap_scopes.push(Vec::new());
        self.push(Insn::PushHeapList);
    }

    fn pop_static_heaplist(&mut self) -> i64 {
        let frame = self.heap_scopes.pop().unwrap_or_default();
        let total = frame
            .iter()
            .filter(|(kind, _)| *kind == MemUse::Static)
            .map(|(_, size)| size)
            .sum();
        self.push(Insn::PopStaticHeapList(total));
        total
    }

    fn popheaplist(&mut self, scrap: bool) {
        self.heap_scopes.pop();
        self.push(Insn::PopHeapList(scrap));
    }

    fn setheap_save(&mut self, bytes: i64) {
        self.push(Insn::SetHeapSave(bytes));
    }

    fn setheap_pri(&mut self) {
        // Boxes PRI into a fresh heap cell; the cell is a static allocation
        // of the enclosing frame.
        self.push(Insn::SetHeapPri);
        self.mark(MemUse::Static, 1);
    }

    fn setheap(&mut self, val: i64) {
        self.push(Insn::SetHeap(val));
    }

    fn modheap(&mut self, bytes: i64) {
        self.push(Insn::ModHeap(bytes));
    }

    fn markheap(&mut self, kind: MemUse, size: i64) {
        self.push(Insn::MarkHeap(kind, size));
        self.mark(kind, size);
    }

    fn ffcall(&mut self, sym: &Rc<Symbol>, argc: u32) {
        self.push(Insn::FfCall(sym.name, argc));
    }

    fn load_glbfn(&mut self, sym: &Rc<Symbol>) {
        self.push(Insn::LoadGlbFn(sym.name));
    }

    fn markusage(&mut self, sym: &Rc<Symbol>, flag: u8) {
        sym.mark_usage(flag);
        self.push(Insn::MarkUsage(sym.name, flag));
    }

    fn invoke_getter(&mut self, accessor: &Rc<Accessor>) {
        self.push(Insn::InvokeGetter(accessor.name));
    }

    fn invoke_setter(&mut self, accessor: &Rc<Accessor>, pop_value_from_stack: bool) {
        self.push(Insn::InvokeSetter(accessor.name, pop_value_from_stack));
    }

    fn setdefarray(&mut self, data: bool, size: i64, array_size: i64, addr: i64, is_const: bool) {
        self.push(Insn::SetDefArray {
            data,
            size,
            array_size,
            addr,
            is_const,
        });
    }

    fn markexpr_param(&mut self) {
        self.push(Insn::MarkParam);
    }
}
