//! Type-checked expression tree consumed by the code generator.
//!
//! The checker rewrites parse-side expressions into this form: l-value
//! loads become explicit [`ExprKind::Rvalue`] wrappers, user-operator
//! dispatch becomes [`ExprKind::CallUserOp`], call arguments are paired
//! with their parameter descriptors, and defaulted arguments appear as
//! [`ExprKind::DefaultArg`]. Every node carries its [`Value`] descriptor
//! and l-value flag; the generator trusts both unconditionally.

use std::rc::Rc;

use crate::emitter::BinOp;
use crate::value::{UserOp, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `~`
    Invert,
    /// `!`
    LogNot,
    /// unary `-`
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Parameter addressing class, as the callee declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Variable,
    Reference,
    RefArray,
    Varargs,
}

/// Precomputed default value for an omitted argument.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Array {
        /// Whether literal data backs the default (vs. a zero fill).
        data: bool,
        size: i64,
        array_size: i64,
        addr: i64,
    },
    Cell(i64),
}

/// Formal parameter descriptor attached to call arguments.
#[derive(Debug)]
pub struct Arg {
    pub kind: ArgKind,
    pub is_const: bool,
    pub default: Option<DefaultValue>,
}

impl Arg {
    pub fn new(kind: ArgKind) -> Self {
        Self {
            kind,
            is_const: false,
            default: None,
        }
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug)]
pub struct CallArg {
    pub arg: Rc<Arg>,
    pub expr: TypedExpr,
}

#[derive(Debug)]
pub enum ExprKind {
    /// Constant-only leaves; their emission is handled entirely by the
    /// `emit()` wrapper and must never reach `do_emit`.
    Number,
    Float,
    Null,
    Sizeof,
    IsDefined,

    /// String literal; loads the pool address.
    String { lit_addr: i64 },
    /// Array literal; loads its arena address.
    ArrayLit { addr: i64 },
    /// `this` (symbol carried in the value descriptor).
    This,
    /// Symbol reference; behavior is driven by the symbol's ident.
    SymbolRef,
    /// L-value to r-value conversion.
    Rvalue(Box<TypedExpr>),

    Unary {
        op: UnaryOp,
        expr: Box<TypedExpr>,
        userop: UserOp,
    },
    PreInc {
        op: IncDecOp,
        expr: Box<TypedExpr>,
        userop: UserOp,
    },
    PostInc {
        op: IncDecOp,
        expr: Box<TypedExpr>,
        userop: UserOp,
    },

    Binary {
        /// Set when this node stores into its left operand.
        assign: bool,
        /// The arithmetic component; `None` for a plain store.
        oper: Option<BinOp>,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
        userop: UserOp,
        assignop: UserOp,
        /// Cell count for whole-array copies (0 otherwise).
        array_copy_length: i64,
    },

    Logical {
        op: LogicOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },

    Ternary {
        first: Box<TypedExpr>,
        second: Box<TypedExpr>,
        third: Box<TypedExpr>,
    },

    Cast(Box<TypedExpr>),
    Comma(Vec<TypedExpr>),

    Index {
        base: Box<TypedExpr>,
        index: Box<TypedExpr>,
    },

    FieldAccess {
        base: Box<TypedExpr>,
        /// Field cell offset within the object (0 emits no add).
        field_offset: i64,
    },

    Call {
        sym: Rc<crate::value::Symbol>,
        args: Vec<CallArg>,
    },

    /// Placeholder for an omitted argument with a declared default.
    DefaultArg { arg: Rc<Arg> },

    CallUserOp {
        expr: Box<TypedExpr>,
        userop: UserOp,
    },
}

#[derive(Debug)]
pub struct TypedExpr {
    pub kind: ExprKind,
    pub val: Value,
    pub lvalue: bool,
}

impl TypedExpr {
    pub fn new(kind: ExprKind, val: Value) -> Self {
        Self {
            kind,
            val,
            lvalue: false,
        }
    }

    pub fn new_lvalue(kind: ExprKind, val: Value) -> Self {
        Self {
            kind,
            val,
            lvalue: true,
        }
    }

    /// Constant integer leaf.
    pub fn number(v: i64) -> Self {
        Self::new(ExprKind::Number, Value::constexpr(v))
    }

    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }
}
