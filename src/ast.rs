//! Arena-allocated abstract syntax tree.
//!
//! All nodes live in typed arenas inside [`AstArena`] and are addressed by
//! `Id<T>` handles; variable-length children live in centralized extra
//! buffers addressed by [`ListRef<T>`]. Nodes are immutable once parsing
//! finishes, except for the per-expression `value` payload slot, which the
//! type checker fills exactly once between parse and code generation.

use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use std::collections::HashMap;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher, RandomState};

use smallvec::SmallVec;

use crate::error::Span;
use crate::token::{Token, TokenKind};
use crate::value::Value;

// =============================================================================
// Core Foundation Types
// =============================================================================

/// Type-safe identifier for arena-allocated nodes.
#[derive(Debug)]
#[repr(transparent)]
pub struct Id<T> {
    raw: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> Id<T> {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn to_usize(self) -> usize {
        self.raw as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.raw
    }
}

/// Typed reference into a centralized list buffer.
///
/// Lists are stored in `AstArena::extras` to avoid per-node `Vec` allocations.
#[derive(Debug)]
pub struct ListRef<T> {
    start: u32,
    len: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for ListRef<T> {}

impl<T> Clone for ListRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for ListRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.len == other.len
    }
}

impl<T> Eq for ListRef<T> {}

impl<T> Default for ListRef<T> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<T> ListRef<T> {
    pub const EMPTY: Self = Self {
        start: 0,
        len: 0,
        _marker: PhantomData,
    };

    #[inline]
    pub const fn new(start: u32, len: u32) -> Self {
        Self {
            start,
            len,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub const fn end(&self) -> u32 {
        self.start + self.len
    }
}

// =============================================================================
// Atom Interning
// =============================================================================

/// Interned identifier string, uniquely comparable by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Atom(u32);

impl Atom {
    #[inline]
    pub const fn from_raw(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Identity hasher for u64 values (used for atom hash buckets).
#[derive(Default)]
struct U64IdentityHasher(u64);

impl Hasher for U64IdentityHasher {
    fn write(&mut self, _b: &[u8]) {
        unreachable!("U64IdentityHasher only supports write_u64")
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

type U64IdentityBuild = BuildHasherDefault<U64IdentityHasher>;

/// String interner. Strings are stored once and looked up via hash buckets;
/// the table is append-only for the lifetime of the translation unit.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    buckets: HashMap<u64, SmallVec<[Atom; 1]>, U64IdentityBuild>,
    state: RandomState,
}

impl Interner {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.strings.reserve(additional);
        self.buckets.reserve(additional);
    }

    #[inline]
    pub fn intern(&mut self, s: &str) -> Atom {
        let h = self.state.hash_one(s);
        let entry = self.buckets.entry(h).or_default();

        for &atom in entry.iter() {
            if self.strings[atom.0 as usize].as_ref() == s {
                return atom;
            }
        }

        let atom = Atom(self.strings.len() as u32);
        self.strings.push(s.into());
        entry.push(atom);
        atom
    }

    /// Resolves an atom back to its string.
    #[inline]
    pub fn resolve(&self, atom: Atom) -> &str {
        debug_assert!((atom.0 as usize) < self.strings.len());
        self.strings
            .get(atom.0 as usize)
            .expect("invalid atom")
            .as_ref()
    }
}

// =============================================================================
// Type Specifiers
// =============================================================================

/// Unresolved identifier reference; the checker binds it to a symbol later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameProxy {
    pub pos: Span,
    pub name: Atom,
}

impl NameProxy {
    pub fn new(pos: Span, name: Atom) -> Self {
        Self { pos, name }
    }
}

/// How a type specifier resolves to an actual type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    /// New-style named type: `Foo x`.
    Named(NameProxy),
    /// Old-style tag: `Foo:x`.
    LabeledName(NameProxy),
    /// Builtin type keyword (`int`, `float`, ...).
    Builtin(TokenKind),
    /// `function` type with a full signature.
    FunctionType(SignatureId),
    /// Label-less old-style declaration.
    ImplicitInt,
}

/// Mutable builder for a declaration's type, immutable once parsing moves on.
///
/// Invariant: when `dims` is present, `rank` equals the number of dimension
/// slots in the list (`None` slots are unsized dimensions).
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSpecifier {
    const_loc: Option<Span>,
    by_ref_loc: Option<Span>,
    variadic_loc: Option<Span>,
    resolver: Option<Resolver>,
    rank: u32,
    dims: Option<ListRef<Option<ExprId>>>,
    dims_loc: Option<Span>,
    has_post_dims: bool,
    new_decl: bool,
}

impl TypeSpecifier {
    pub fn set_const(&mut self, loc: Span) {
        self.const_loc = Some(loc);
    }

    pub fn is_const(&self) -> bool {
        self.const_loc.is_some()
    }

    pub fn set_by_ref(&mut self, loc: Span) {
        self.by_ref_loc = Some(loc);
    }

    pub fn is_by_ref(&self) -> bool {
        self.by_ref_loc.is_some()
    }

    pub fn set_variadic(&mut self, loc: Span) {
        self.variadic_loc = Some(loc);
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic_loc.is_some()
    }

    pub fn variadic_loc(&self) -> Span {
        self.variadic_loc.unwrap_or_default()
    }

    pub fn set_builtin_type(&mut self, kind: TokenKind) {
        self.resolver = Some(Resolver::Builtin(kind));
    }

    pub fn set_named_type(&mut self, proxy: NameProxy) {
        self.resolver = Some(Resolver::Named(proxy));
    }

    pub fn set_labeled_type(&mut self, proxy: NameProxy) {
        self.resolver = Some(Resolver::LabeledName(proxy));
    }

    pub fn set_function_type(&mut self, sig: SignatureId) {
        self.resolver = Some(Resolver::FunctionType(sig));
    }

    pub fn set_implicit_int(&mut self) {
        self.resolver = Some(Resolver::ImplicitInt);
    }

    pub fn resolver(&self) -> Option<Resolver> {
        self.resolver
    }

    /// Marks this specifier as produced by the new-style type grammar.
    pub fn set_new_decl(&mut self) {
        self.new_decl = true;
    }

    pub fn is_new_decl(&self) -> bool {
        self.new_decl
    }

    pub fn set_rank(&mut self, loc: Span, rank: u32) {
        self.rank = rank;
        self.dims_loc = Some(loc);
    }

    pub fn set_dimension_sizes(&mut self, loc: Span, dims: ListRef<Option<ExprId>>) {
        self.rank = dims.len();
        self.dims = Some(dims);
        self.dims_loc = Some(loc);
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn dims(&self) -> Option<ListRef<Option<ExprId>>> {
        self.dims
    }

    pub fn is_array(&self) -> bool {
        self.rank > 0 || self.dims.is_some()
    }

    pub fn set_has_post_dims(&mut self) {
        self.has_post_dims = true;
    }

    pub fn unset_has_post_dims(&mut self) {
        self.has_post_dims = false;
    }

    pub fn has_post_dims(&self) -> bool {
        self.has_post_dims
    }

    /// Clears per-declarator array state for `reparse_decl`.
    pub fn reset_array(&mut self) {
        self.rank = 0;
        self.dims = None;
        self.dims_loc = None;
        self.has_post_dims = false;
    }

    /// Full reset keeping only the const attribute (comma-separated old-style
    /// declarators share `const` but nothing else).
    pub fn reset_keeping_const(&mut self) {
        *self = TypeSpecifier {
            const_loc: self.const_loc,
            ..TypeSpecifier::default()
        };
    }
}

/// Parser working set for one declarator: a type plus the declared name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Declaration {
    pub spec: TypeSpecifier,
    pub name: Option<Token>,
}

impl Declaration {
    pub fn name_atom(&self) -> Option<Atom> {
        self.name.and_then(|t| t.atom())
    }
}

// =============================================================================
// Node IDs
// =============================================================================

pub type ExprId = Id<Expr>;
pub type StmtId = Id<Stmt>;
pub type VarDeclId = Id<VarDecl>;
pub type SignatureId = Id<FunctionSignature>;
pub type LayoutEntryId = Id<LayoutEntry>;
pub type CaseId = Id<Case>;

// =============================================================================
// Expressions
// =============================================================================

/// `{name = expr}` pair inside a struct initializer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameAndValue {
    pub name: Token,
    pub expr: ExprId,
}

/// Entry of an `enum` body: `name (= init)?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumEntry {
    pub proxy: NameProxy,
    pub init: Option<ExprId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr {
    NameProxy(NameProxy),
    IntLit(i64),
    FloatLit(f64),
    CharLit(char),
    BoolLit(bool),
    StringLit(Atom),
    This,
    ArrayLit {
        items: ListRef<ExprId>,
    },
    StructInit {
        pairs: ListRef<NameAndValue>,
    },
    Call {
        callee: ExprId,
        args: ListRef<ExprId>,
    },
    Index {
        base: ExprId,
        index: ExprId,
    },
    /// `~`, `!`, negate, `sizeof`, or a `tag:` cast (`tag` set only then).
    Unary {
        op: TokenKind,
        expr: ExprId,
        tag: Option<NameProxy>,
    },
    IncDec {
        op: TokenKind,
        expr: ExprId,
        postfix: bool,
    },
    Binary {
        op: TokenKind,
        left: ExprId,
        right: ExprId,
    },
    Ternary {
        cond: ExprId,
        then: ExprId,
        other: ExprId,
    },
    Assign {
        op: TokenKind,
        lvalue: ExprId,
        expr: ExprId,
    },
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhileKind {
    While,
    Do,
}

/// One declarator; comma-siblings in the same statement chain through `next`.
#[derive(Debug, Clone, Copy)]
pub struct VarDecl {
    pub name: Option<Token>,
    pub spec: TypeSpecifier,
    pub init: Option<ExprId>,
    pub next: Option<VarDeclId>,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionSignature {
    pub return_type: TypeSpecifier,
    pub params: ListRef<VarDeclId>,
}

/// Function body; `has_return` feeds tagless-function return inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodBody {
    pub pos: Span,
    pub stmts: ListRef<StmtId>,
    pub has_return: bool,
}

/// Method definition, or an alias binding `public X() = Y`.
#[derive(Debug, Clone, Copy)]
pub enum FunctionOrAlias {
    Alias(NameProxy),
    Fun(FunctionNode),
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionNode {
    /// `TokenKind::Native` for natives, `TokenKind::Function` otherwise.
    pub kind: TokenKind,
    pub signature: SignatureId,
    pub body: Option<MethodBody>,
}

/// Member of a struct/union/methodmap body.
#[derive(Debug, Clone, Copy)]
pub enum LayoutEntry {
    Field {
        name: Option<Token>,
        spec: TypeSpecifier,
    },
    Method {
        name: Token,
        method: FunctionOrAlias,
    },
    Accessor {
        name: Token,
        spec: TypeSpecifier,
        getter: Option<FunctionOrAlias>,
        setter: Option<FunctionOrAlias>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Case {
    pub expr: ExprId,
    pub others: ListRef<ExprId>,
    pub body: StmtId,
}

#[derive(Debug, Clone, Copy)]
pub enum Stmt {
    Block {
        stmts: ListRef<StmtId>,
    },
    Expression(ExprId),
    If {
        cond: ExprId,
        if_true: StmtId,
        if_false: Option<StmtId>,
    },
    While {
        kind: WhileKind,
        cond: ExprId,
        body: StmtId,
    },
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        update: Option<StmtId>,
        body: StmtId,
    },
    Return {
        expr: Option<ExprId>,
    },
    Break,
    Continue,
    Switch {
        cond: ExprId,
        cases: ListRef<CaseId>,
        default: Option<StmtId>,
    },
    Enum {
        name: Option<Atom>,
        entries: ListRef<EnumEntry>,
    },
    VarDecl(VarDeclId),
    Function {
        name: Token,
        /// `Native`, `Forward`, or `Function`.
        kind: TokenKind,
        signature: SignatureId,
        body: Option<MethodBody>,
    },
    Layout {
        /// `Methodmap`, `Struct`, or `Union`.
        kind: TokenKind,
        name: Token,
        extends: Option<NameProxy>,
        entries: ListRef<LayoutEntryId>,
        nullable: bool,
    },
    Typedef {
        name: Atom,
        spec: TypeSpecifier,
    },
}

/// Root of a parsed translation unit: the global statement list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseTree {
    pub statements: ListRef<StmtId>,
}

// =============================================================================
// Arena Allocation
// =============================================================================

/// Arena for nodes with associated spans, stored in parallel vectors.
#[derive(Debug)]
pub struct SpannedArena<T> {
    data: Vec<T>,
    spans: Vec<Span>,
}

impl<T> Default for SpannedArena<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            spans: Vec::new(),
        }
    }
}

impl<T> SpannedArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc(&mut self, node: T, span: Span) -> Id<T> {
        let id = Id::from_raw(self.data.len() as u32);
        self.data.push(node);
        self.spans.push(span);
        id
    }

    #[inline]
    pub fn get(&self, id: Id<T>) -> &T {
        &self.data[id.to_usize()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.data[id.to_usize()]
    }

    #[inline]
    pub fn span(&self, id: Id<T>) -> Span {
        self.spans[id.to_usize()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Index<Id<T>> for SpannedArena<T> {
    type Output = T;
    fn index(&self, id: Id<T>) -> &T {
        self.get(id)
    }
}

impl<T> IndexMut<Id<T>> for SpannedArena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        self.get_mut(id)
    }
}

/// Centralized buffers for all list payloads.
#[derive(Debug, Default)]
pub struct ExtraData {
    pub expr_ids: Vec<ExprId>,
    pub opt_expr_ids: Vec<Option<ExprId>>,
    pub stmt_ids: Vec<StmtId>,
    pub var_decl_ids: Vec<VarDeclId>,
    pub case_ids: Vec<CaseId>,
    pub layout_entry_ids: Vec<LayoutEntryId>,
    pub name_values: Vec<NameAndValue>,
    pub enum_entries: Vec<EnumEntry>,
}

/// Central arena holding all AST nodes, list buffers, the interner, and the
/// per-expression `value` side table.
#[derive(Debug, Default)]
pub struct AstArena {
    pub exprs: SpannedArena<Expr>,
    pub stmts: SpannedArena<Stmt>,
    pub var_decls: SpannedArena<VarDecl>,
    pub signatures: SpannedArena<FunctionSignature>,
    pub layout_entries: SpannedArena<LayoutEntry>,
    pub cases: SpannedArena<Case>,
    pub extras: ExtraData,
    pub interner: Interner,
    values: Vec<Option<Value>>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an expression and reserves its checker payload slot.
    #[inline]
    pub fn alloc_expr(&mut self, node: Expr, span: Span) -> ExprId {
        let id = self.exprs.alloc(node, span);
        self.values.push(None);
        id
    }

    /// Fills an expression's value descriptor. Set-once by the type checker.
    pub fn set_value(&mut self, id: ExprId, value: Value) {
        let slot = &mut self.values[id.to_usize()];
        debug_assert!(slot.is_none(), "value descriptor set twice");
        *slot = Some(value);
    }

    pub fn value(&self, id: ExprId) -> Option<&Value> {
        self.values[id.to_usize()].as_ref()
    }

    #[inline]
    fn push_list<T>(buf: &mut Vec<T>, items: impl IntoIterator<Item = T>) -> ListRef<T> {
        let start = buf.len();
        buf.extend(items);
        let len = buf.len() - start;
        debug_assert!(start <= u32::MAX as usize);
        debug_assert!(len <= u32::MAX as usize);
        ListRef::new(start as u32, len as u32)
    }

    #[inline]
    fn slice<T>(buf: &[T], r: ListRef<T>) -> &[T] {
        &buf[r.start() as usize..r.end() as usize]
    }

    // List builders.

    pub fn list_exprs(&mut self, i: impl IntoIterator<Item = ExprId>) -> ListRef<ExprId> {
        Self::push_list(&mut self.extras.expr_ids, i)
    }

    pub fn list_dims(
        &mut self,
        i: impl IntoIterator<Item = Option<ExprId>>,
    ) -> ListRef<Option<ExprId>> {
        Self::push_list(&mut self.extras.opt_expr_ids, i)
    }

    pub fn list_stmts(&mut self, i: impl IntoIterator<Item = StmtId>) -> ListRef<StmtId> {
        Self::push_list(&mut self.extras.stmt_ids, i)
    }

    pub fn list_var_decls(
        &mut self,
        i: impl IntoIterator<Item = VarDeclId>,
    ) -> ListRef<VarDeclId> {
        Self::push_list(&mut self.extras.var_decl_ids, i)
    }

    pub fn list_cases(&mut self, i: impl IntoIterator<Item = CaseId>) -> ListRef<CaseId> {
        Self::push_list(&mut self.extras.case_ids, i)
    }

    pub fn list_layout_entries(
        &mut self,
        i: impl IntoIterator<Item = LayoutEntryId>,
    ) -> ListRef<LayoutEntryId> {
        Self::push_list(&mut self.extras.layout_entry_ids, i)
    }

    pub fn list_name_values(
        &mut self,
        i: impl IntoIterator<Item = NameAndValue>,
    ) -> ListRef<NameAndValue> {
        Self::push_list(&mut self.extras.name_values, i)
    }

    pub fn list_enum_entries(
        &mut self,
        i: impl IntoIterator<Item = EnumEntry>,
    ) -> ListRef<EnumEntry> {
        Self::push_list(&mut self.extras.enum_entries, i)
    }

    // List accessors.

    pub fn exprs_list(&self, r: ListRef<ExprId>) -> &[ExprId] {
        Self::slice(&self.extras.expr_ids, r)
    }

    pub fn dims_list(&self, r: ListRef<Option<ExprId>>) -> &[Option<ExprId>] {
        Self::slice(&self.extras.opt_expr_ids, r)
    }

    pub fn stmts_list(&self, r: ListRef<StmtId>) -> &[StmtId] {
        Self::slice(&self.extras.stmt_ids, r)
    }

    pub fn var_decls_list(&self, r: ListRef<VarDeclId>) -> &[VarDeclId] {
        Self::slice(&self.extras.var_decl_ids, r)
    }

    pub fn cases_list(&self, r: ListRef<CaseId>) -> &[CaseId] {
        Self::slice(&self.extras.case_ids, r)
    }

    pub fn layout_entries_list(&self, r: ListRef<LayoutEntryId>) -> &[LayoutEntryId] {
        Self::slice(&self.extras.layout_entry_ids, r)
    }

    pub fn name_values_list(&self, r: ListRef<NameAndValue>) -> &[NameAndValue] {
        Self::slice(&self.extras.name_values, r)
    }

    pub fn enum_entries_list(&self, r: ListRef<EnumEntry>) -> &[EnumEntry] {
        Self::slice(&self.extras.enum_entries, r)
    }
}
