//! Recursive-descent parser.
//!
//! Productions return `Option<...>`: `None` aborts the current production
//! after reporting through the [`Reporter`], and the caller decides whether
//! to resynchronize (statement boundary, closing brace, semicolon) or give
//! up on its own node. The top-level loop never aborts before end of input.
//!
//! The declaration grammar is ambiguous between the legacy ("old-style",
//! `new x[2]`, `Float:y`) and modern ("new-style", `int x[2]`) forms;
//! `parse_decl` disambiguates with bounded lookahead, and for the
//! `name [ ... ] name` sequence parses array dimensions before deciding,
//! handing the saved name token back to the scanner when the first name
//! turns out to be a type.

use crate::ast::{
    AstArena, Atom, Case, Declaration, EnumEntry, Expr, ExprId, FunctionNode, FunctionOrAlias,
    FunctionSignature, LayoutEntry, LayoutEntryId, ListRef, MethodBody, NameAndValue, NameProxy,
    ParseTree, Stmt, StmtId, TypeSpecifier, VarDecl, VarDeclId, WhileKind,
};
use crate::error::{Message, Reporter, Span};
use crate::scanner::{tokenize, Scanner};
use crate::token::{Token, TokenKind};

/// Context flags for `parse_decl`.
pub mod decl_flags {
    pub const ARGUMENT: u32 = 0x01;
    pub const VARIABLE: u32 = 0x02;
    pub const OLD: u32 = 0x04;
    pub const FIELD: u32 = 0x08;
    pub const MAYBE_FUNCTION: u32 = 0x10;
    pub const MAYBE_NAMED: u32 = 0x20;
    pub const INLINE: u32 = 0x40;

    /// Contexts in which the declarator carries a name.
    pub const NAMED_MASK: u32 = ARGUMENT | VARIABLE | FIELD | MAYBE_FUNCTION | MAYBE_NAMED;
}

use decl_flags::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Strict-terminator dialect: statements must end in `;`.
    pub require_semicolons: bool,
}

pub struct Parser {
    scanner: Scanner,
    arena: AstArena,
    reporter: Reporter,
    allow_declarations: bool,
    encountered_return: bool,
    atom_float: Atom,
    atom_string: Atom,
    atom_underbar: Atom,
}

impl Parser {
    pub fn new(src: &str, opts: ParseOptions) -> Self {
        let mut arena = AstArena::new();
        let (toks, lex_diags) = tokenize(src, &mut arena.interner);
        let mut reporter = Reporter::new();
        for d in lex_diags {
            reporter.report_lex(d.span, d.message);
        }
        let mut scanner = Scanner::new(toks);
        scanner.set_require_semicolons(opts.require_semicolons);

        let atom_float = arena.interner.intern("Float");
        let atom_string = arena.interner.intern("String");
        let atom_underbar = arena.interner.intern("_");

        Self {
            scanner,
            arena,
            reporter,
            allow_declarations: true,
            encountered_return: false,
            atom_float,
            atom_string,
            atom_underbar,
        }
    }

    pub fn arena(&self) -> &AstArena {
        &self.arena
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn into_parts(self) -> (AstArena, Reporter) {
        (self.arena, self.reporter)
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    fn peek(&mut self, kind: TokenKind) -> bool {
        self.scanner.peek() == kind
    }

    fn match_tok(&mut self, kind: TokenKind) -> bool {
        if self.scanner.next() == kind {
            return true;
        }
        self.scanner.undo();
        false
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        let got = self.scanner.next();
        if got == kind {
            return true;
        }
        self.report(
            self.scanner.begin(),
            Message::WrongToken {
                expected: kind.name(),
                got: got.name(),
            },
        );
        false
    }

    fn report(&mut self, span: Span, message: Message) {
        self.reporter.report(span, message);
    }

    fn expect_name(&mut self) -> Option<Atom> {
        if !self.expect(TokenKind::Name) {
            return None;
        }
        Some(self.scanner.current_name())
    }

    fn with_tags_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.scanner.set_allow_tags(false);
        let r = f(self);
        self.scanner.set_allow_tags(saved);
        r
    }

    /// Requires `;`, or a newline in the relaxed dialect.
    fn require_terminator(&mut self) -> bool {
        if self.scanner.require_semicolons() {
            return self.expect(TokenKind::Semicolon);
        }
        if self.match_tok(TokenKind::Semicolon) {
            return true;
        }
        if self.scanner.peek_token_same_line() == TokenKind::Eol {
            return true;
        }
        if self.scanner.peek_token_same_line() == TokenKind::Eof {
            return true;
        }
        self.report(self.scanner.begin(), Message::ExpectedNewlineOrSemi);
        false
    }

    /// Requires the line to end here.
    fn require_newline(&mut self) -> bool {
        match self.scanner.peek_token_same_line() {
            TokenKind::Eol | TokenKind::Eof => true,
            _ => {
                self.report(self.scanner.begin(), Message::ExpectedNewline);
                false
            }
        }
    }

    /// Requires `;` or the end of the line.
    fn require_newline_or_semi(&mut self) -> bool {
        if self.scanner.peek_token_same_line() == TokenKind::Semicolon {
            self.scanner.next();
        }
        match self.scanner.peek_token_same_line() {
            TokenKind::Eol | TokenKind::Eof => true,
            _ => {
                self.report(self.scanner.begin(), Message::ExpectedNewline);
                false
            }
        }
    }

    fn alloc_expr(&mut self, node: Expr, pos: Span) -> ExprId {
        self.arena.alloc_expr(node, pos)
    }

    fn alloc_stmt(&mut self, node: Stmt, pos: Span) -> StmtId {
        self.arena.stmts.alloc(node, pos)
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_new_typename(&mut self, spec: &mut TypeSpecifier) {
        let kind = self.scanner.next();
        let pos = self.scanner.begin();

        if kind.is_new_type_token() {
            spec.set_builtin_type(kind);
            return;
        }

        if kind == TokenKind::Label {
            let proxy = NameProxy::new(pos, self.scanner.current_name());
            spec.set_labeled_type(proxy);
            self.report(pos, Message::NewDeclsRequired);
            return;
        }

        if kind != TokenKind::Name {
            self.report(pos, Message::ExpectedTypeExpr);
            return;
        }

        let name = self.scanner.current_name();
        spec.set_named_type(NameProxy::new(pos, name));

        if name == self.atom_float {
            self.report(
                pos,
                Message::TypeIsDeprecated {
                    name: "Float",
                    replacement: "float",
                },
            );
        } else if name == self.atom_string {
            self.report(
                pos,
                Message::TypeIsDeprecated {
                    name: "String",
                    replacement: "char",
                },
            );
        } else if name == self.atom_underbar {
            self.report(
                pos,
                Message::TypeIsDeprecated {
                    name: "_",
                    replacement: "int",
                },
            );
        }
    }

    fn parse_function_type(&mut self, spec: &mut TypeSpecifier) {
        let mut return_type = TypeSpecifier::default();
        self.parse_new_type_expr(&mut return_type, 0);

        let Some(params) = self.arguments() else {
            return;
        };

        let sig = FunctionSignature {
            return_type,
            params,
        };
        let sig_id = self.arena.signatures.alloc(sig, self.scanner.begin());
        spec.set_function_type(sig_id);
    }

    fn parse_new_type_expr(&mut self, spec: &mut TypeSpecifier, flags: u32) {
        spec.set_new_decl();

        if self.match_tok(TokenKind::Const) {
            if spec.is_const() {
                self.report(self.scanner.begin(), Message::ConstSpecifiedTwice);
            }
            spec.set_const(self.scanner.begin());
        }

        let lparen = self.match_tok(TokenKind::LParen);
        let function = if lparen {
            self.expect(TokenKind::Function)
        } else {
            self.match_tok(TokenKind::Function)
        };
        if function {
            self.parse_function_type(spec);
        } else {
            self.parse_new_typename(spec);
        }

        if lparen {
            self.match_tok(TokenKind::RParen);
        }

        // If we didn't already fill out array dimensions, do so now.
        if !spec.is_array() && self.match_tok(TokenKind::LBracket) {
            let begin = self.scanner.begin();
            let mut rank = 0;
            loop {
                rank += 1;
                if !self.match_tok(TokenKind::RBracket) {
                    self.report(self.scanner.begin(), Message::FixedArrayInPrefix);
                }
                if !self.match_tok(TokenKind::LBracket) {
                    break;
                }
            }
            spec.set_rank(begin, rank);
        }

        if flags & ARGUMENT != 0 && self.match_tok(TokenKind::BitAnd) {
            if !spec.is_array() {
                spec.set_by_ref(self.scanner.begin());
            } else {
                self.report(
                    self.scanner.begin(),
                    Message::TypeCannotBeReference { what: "array" },
                );
            }
        }
    }

    fn parse_new_decl(&mut self, decl: &mut Declaration, flags: u32) -> bool {
        self.parse_new_type_expr(&mut decl.spec, flags);

        if flags & NAMED_MASK != 0 {
            let named = if flags & MAYBE_NAMED != 0 {
                self.match_tok(TokenKind::Name)
            } else {
                if !self.expect(TokenKind::Name) {
                    return false;
                }
                true
            };

            if named {
                decl.name = Some(*self.scanner.current());
                if self.match_tok(TokenKind::LBracket) {
                    self.parse_old_array_dims(decl, flags);
                }
            }
        }

        true
    }

    /// Parses `[size?]*` after a declarator name, with the first `[` already
    /// consumed.
    fn parse_old_array_dims(&mut self, decl: &mut Declaration, _flags: u32) {
        let loc = self.scanner.begin();
        if decl.spec.is_by_ref() {
            self.report(loc, Message::TypeCannotBeReference { what: "array" });
        }

        let mut rank: u32 = 0;
        let mut dims: Option<Vec<Option<ExprId>>> = None;
        loop {
            rank += 1;

            // Check if the size is unspecified.
            if self.match_tok(TokenKind::RBracket) {
                if let Some(dims) = dims.as_mut() {
                    dims.push(None);
                }
                if !self.match_tok(TokenKind::LBracket) {
                    break;
                }
                continue;
            }

            // First sized dimension: backfill earlier unsized slots.
            if dims.is_none() {
                dims = Some(vec![None; rank as usize - 1]);
            }

            let Some(expr) = self.expression() else {
                break;
            };
            dims.as_mut().unwrap().push(Some(expr));

            if !self.expect(TokenKind::RBracket) {
                break;
            }
            if !self.match_tok(TokenKind::LBracket) {
                break;
            }
        }

        if decl.spec.is_array() {
            self.report(loc, Message::DoubleArrayDims);
            return;
        }

        if let Some(dims) = dims {
            let list = self.arena.list_dims(dims);
            decl.spec.set_dimension_sizes(loc, list);
        } else {
            decl.spec.set_rank(loc, rank);
        }
        decl.spec.set_has_post_dims();
    }

    fn parse_old_decl(&mut self, decl: &mut Declaration, flags: u32) -> bool {
        if self.match_tok(TokenKind::Const) {
            if decl.spec.is_const() {
                self.report(self.scanner.begin(), Message::ConstSpecifiedTwice);
            }
            decl.spec.set_const(self.scanner.begin());
        }

        if flags & ARGUMENT != 0 && self.match_tok(TokenKind::BitAnd) {
            decl.spec.set_by_ref(self.scanner.begin());
        }

        if self.match_tok(TokenKind::Label) {
            let proxy = NameProxy::new(self.scanner.begin(), self.scanner.current_name());
            decl.spec.set_labeled_type(proxy);
        } else {
            decl.spec.set_implicit_int();
        }

        // Look for varargs and end early.
        if flags & ARGUMENT != 0 && self.match_tok(TokenKind::Ellipses) {
            decl.spec.set_variadic(self.scanner.begin());
            return true;
        }

        if flags & NAMED_MASK != 0 {
            // If this is label-less, check for something like "new int x".
            if !self.peek(TokenKind::Name) {
                let kind = self.scanner.next();
                if kind.is_new_type_token() {
                    self.report(self.scanner.begin(), Message::NewStyleBadKeyword);
                } else {
                    self.scanner.undo();
                }
            }
            if !self.expect(TokenKind::Name) {
                return false;
            }

            decl.name = Some(*self.scanner.current());

            if self.match_tok(TokenKind::LBracket) {
                self.parse_old_array_dims(decl, flags);
            }
        }

        true
    }

    /// Reuses a prior declarator's type for the next comma-separated name in
    /// the same statement, resetting only the per-declarator parts.
    fn reparse_decl(&mut self, decl: &mut Declaration, flags: u32) -> bool {
        if !decl.spec.is_new_decl() {
            decl.spec.reset_keeping_const();
            return self.parse_old_decl(decl, flags);
        }

        // Newer decls are more complex to reparse.
        if !self.expect(TokenKind::Name) {
            return false;
        }
        decl.name = Some(*self.scanner.current());

        if decl.spec.has_post_dims() {
            // We have something like:
            //   int x[], y...
            //
            // Reset the fact that we saw an array.
            decl.spec.reset_array();
            if self.match_tok(TokenKind::LBracket) {
                self.parse_old_array_dims(decl, flags);
            }
        } else {
            if self.match_tok(TokenKind::LBracket) && decl.spec.is_array() {
                self.report(self.scanner.begin(), Message::DoubleArrayDims);
            }
            debug_assert!(decl.spec.dims().is_none() || decl.spec.is_array());
        }

        true
    }

    /// The infamous old-vs-new declaration disambiguator.
    pub fn parse_decl(&mut self, decl: &mut Declaration, flags: u32) -> bool {
        // Match early varargs as old decls.
        if flags & ARGUMENT != 0 && self.peek(TokenKind::Ellipses) {
            return self.parse_old_decl(decl, flags);
        }

        // Match const first; it is a common prefix for old and new decls.
        if self.match_tok(TokenKind::Const) {
            decl.spec.set_const(self.scanner.begin());
        }

        // Sometimes we know ahead of time whether the declaration will be old,
        // for example if preceded by "new" or "decl".
        if flags & OLD != 0 {
            return self.parse_old_decl(decl, flags);
        }

        // If parsing an argument, there are two simple checks for whether this
        // is a new or old-style declaration.
        if flags & ARGUMENT != 0 && (self.peek(TokenKind::BitAnd) || self.peek(TokenKind::LBrace)) {
            return self.parse_old_decl(decl, flags);
        }

        // Another dead giveaway is a label.
        if self.peek(TokenKind::Label) {
            return self.parse_old_decl(decl, flags);
        }

        // Otherwise, eat a symbol and try to see what's after it.
        if self.match_tok(TokenKind::Name) {
            if self.peek(TokenKind::Name) || self.peek(TokenKind::BitAnd) {
                // This is a new-style declaration. Give the name back.
                self.scanner.undo();
                return self.parse_new_decl(decl, flags);
            }

            // Make sure to save the name token locally first.
            let name = *self.scanner.current();
            if flags & NAMED_MASK != 0 && self.match_tok(TokenKind::LBracket) {
                // We have to parse array dims before we can tell what kind of
                // declarator this is. It could be either:
                //   "x[] y" (new-style), or
                //   "y[],"  (old-style)
                self.parse_old_array_dims(decl, flags);

                if self.peek(TokenKind::Name) || self.peek(TokenKind::BitAnd) {
                    // This must be a newdecl, "x[] y" or "x[] &y", the latter
                    // of which is illegal, but we flow it through the right
                    // path anyway.
                    decl.spec.unset_has_post_dims();
                    self.scanner.push_back(name);
                    return self.parse_new_decl(decl, flags);
                }

                // We got something like "x[]". Just finish off the declaration.
                decl.name = Some(name);
                decl.spec.set_builtin_type(TokenKind::Int);
                return true;
            }

            // Give the symbol back to the scanner; this is an old decl.
            self.scanner.undo();
            return self.parse_old_decl(decl, flags);
        }

        // All else has failed. Probably got a type keyword. Try new-style.
        self.parse_new_decl(decl, flags)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn primitive(&mut self) -> Option<ExprId> {
        let kind = self.scanner.next();
        let pos = self.scanner.begin();
        match kind {
            TokenKind::FloatLiteral => {
                let v = self.scanner.current().double_value();
                Some(self.alloc_expr(Expr::FloatLit(v), pos))
            }

            TokenKind::HexLiteral | TokenKind::IntLiteral => {
                let v = self.scanner.current().int_value();
                Some(self.alloc_expr(Expr::IntLit(v), pos))
            }

            TokenKind::True | TokenKind::False => {
                Some(self.alloc_expr(Expr::BoolLit(kind == TokenKind::True), pos))
            }

            TokenKind::StringLiteral => {
                let lit = self.scanner.current_name();
                Some(self.alloc_expr(Expr::StringLit(lit), pos))
            }

            TokenKind::CharLiteral => {
                let v = self.scanner.current().char_value();
                Some(self.alloc_expr(Expr::CharLit(v), pos))
            }

            TokenKind::This => Some(self.alloc_expr(Expr::This, pos)),

            TokenKind::LBrace => self.parse_compound_literal(),

            _ => {
                if kind != TokenKind::Unknown {
                    self.report(pos, Message::ExpectedExpression { got: kind.name() });
                }
                None
            }
        }
    }

    fn parse_struct_initializer(&mut self, pos: Span) -> Option<ExprId> {
        let mut pairs = Vec::new();

        while !self.match_tok(TokenKind::RBrace) {
            if !self.expect(TokenKind::Name) {
                return None;
            }
            let name = *self.scanner.current();

            if !self.match_tok(TokenKind::Assign) {
                return None;
            }

            let expr = self.expression()?;

            // Eat an optional comma.
            self.match_tok(TokenKind::Comma);

            pairs.push(NameAndValue { name, expr });
        }

        let pairs = self.arena.list_name_values(pairs);
        Some(self.alloc_expr(Expr::StructInit { pairs }, pos))
    }

    fn parse_compound_literal(&mut self) -> Option<ExprId> {
        let pos = self.scanner.begin();

        // If the syntax is <name> "=" we treat this as a struct initializer.
        if self.match_tok(TokenKind::Name) {
            let assigns = self.peek(TokenKind::Assign);
            self.scanner.undo();
            if assigns {
                return self.parse_struct_initializer(pos);
            }
        }

        // Otherwise we're building an array literal.
        let mut items = Vec::new();
        while !self.peek(TokenKind::RBrace) {
            let item = self.expression()?;
            items.push(item);
            if !self.match_tok(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace);

        let items = self.arena.list_exprs(items);
        Some(self.alloc_expr(Expr::ArrayLit { items }, pos))
    }

    fn prefix(&mut self) -> Option<ExprId> {
        let kind = self.scanner.next();
        match kind {
            TokenKind::LParen => {
                let expr = self.expression()?;
                if !self.expect(TokenKind::RParen) {
                    return None;
                }
                Some(expr)
            }

            TokenKind::Name => {
                let pos = self.scanner.begin();
                let name = self.scanner.current_name();
                Some(self.alloc_expr(Expr::NameProxy(NameProxy::new(pos, name)), pos))
            }

            _ => {
                if kind.is_new_type_token() {
                    // Treat the type as a name, even though it's a keyword.
                    let pos = self.scanner.begin();
                    let atom = self.arena.interner.intern(kind.name());
                    return Some(self.alloc_expr(Expr::NameProxy(NameProxy::new(pos, atom)), pos));
                }

                self.scanner.undo();
                self.primitive()
            }
        }
    }

    fn call(&mut self, callee: ExprId) -> Option<ExprId> {
        self.expect(TokenKind::LParen);
        let pos = self.scanner.begin();

        let mut args = Vec::new();
        if !self.match_tok(TokenKind::RParen) {
            loop {
                let expr = self.expression()?;
                args.push(expr);
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }

            if !self.expect(TokenKind::RParen) {
                return None;
            }
        }

        let args = self.arena.list_exprs(args);
        Some(self.alloc_expr(Expr::Call { callee, args }, pos))
    }

    fn index(&mut self, base: ExprId) -> Option<ExprId> {
        self.expect(TokenKind::LBracket);
        let pos = self.scanner.begin();

        let index = self.expression()?;
        if !self.expect(TokenKind::RBracket) {
            return None;
        }

        Some(self.alloc_expr(Expr::Index { base, index }, pos))
    }

    fn primary(&mut self) -> Option<ExprId> {
        let mut expr = self.prefix()?;
        loop {
            match self.scanner.peek() {
                TokenKind::LParen => expr = self.call(expr)?,
                TokenKind::LBracket => expr = self.index(expr)?,
                _ => return Some(expr),
            }
        }
    }

    fn unary(&mut self) -> Option<ExprId> {
        let token = self.scanner.peek();

        match token {
            TokenKind::Increment | TokenKind::Decrement => {
                self.scanner.next();
                let pos = self.scanner.begin();
                let expr = self.unary()?;
                return Some(self.alloc_expr(
                    Expr::IncDec {
                        op: token,
                        expr,
                        postfix: false,
                    },
                    pos,
                ));
            }

            TokenKind::Minus | TokenKind::Not | TokenKind::Tilde => {
                self.scanner.next();
                let pos = self.scanner.begin();
                let expr = self.unary()?;
                let op = if token == TokenKind::Minus {
                    TokenKind::Negate
                } else {
                    token
                };
                return Some(self.alloc_expr(
                    Expr::Unary {
                        op,
                        expr,
                        tag: None,
                    },
                    pos,
                ));
            }

            TokenKind::Sizeof => {
                self.scanner.next();
                let pos = self.scanner.begin();
                if !self.expect(TokenKind::LParen) {
                    return None;
                }
                let expr = self.unary()?;
                if !self.expect(TokenKind::RParen) {
                    return None;
                }
                return Some(self.alloc_expr(
                    Expr::Unary {
                        op: TokenKind::Sizeof,
                        expr,
                        tag: None,
                    },
                    pos,
                ));
            }

            TokenKind::Label => {
                self.scanner.next();
                let pos = self.scanner.begin();
                let tag = NameProxy::new(pos, self.scanner.current_name());
                let expr = self.unary()?;
                return Some(self.alloc_expr(
                    Expr::Unary {
                        op: TokenKind::Label,
                        expr,
                        tag: Some(tag),
                    },
                    pos,
                ));
            }

            _ => {}
        }

        let expr = self.primary()?;

        let token = self.scanner.peek();
        if token == TokenKind::Increment || token == TokenKind::Decrement {
            self.scanner.next();
            let pos = self.scanner.begin();
            return Some(self.alloc_expr(
                Expr::IncDec {
                    op: token,
                    expr,
                    postfix: true,
                },
                pos,
            ));
        }

        Some(expr)
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> Option<TokenKind> {
        for &k in kinds {
            if self.match_tok(k) {
                return Some(k);
            }
        }
        None
    }

    fn multiplication(&mut self) -> Option<ExprId> {
        let mut left = self.unary()?;
        while let Some(op) =
            self.match_any(&[TokenKind::Slash, TokenKind::Star, TokenKind::Percent])
        {
            let pos = self.scanner.begin();
            let right = self.unary()?;
            left = self.alloc_expr(Expr::Binary { op, left, right }, pos);
        }
        Some(left)
    }

    fn addition(&mut self) -> Option<ExprId> {
        let mut left = self.multiplication()?;
        while let Some(op) = self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let pos = self.scanner.begin();
            let right = self.multiplication()?;
            left = self.alloc_expr(Expr::Binary { op, left, right }, pos);
        }
        Some(left)
    }

    fn shift(&mut self) -> Option<ExprId> {
        let mut left = self.addition()?;
        while let Some(op) = self.match_any(&[TokenKind::Shl, TokenKind::Shr, TokenKind::Ushr]) {
            let pos = self.scanner.begin();
            let right = self.addition()?;
            left = self.alloc_expr(Expr::Binary { op, left, right }, pos);
        }
        Some(left)
    }

    fn bitand(&mut self) -> Option<ExprId> {
        let mut left = self.shift()?;
        while self.match_tok(TokenKind::BitAnd) {
            let pos = self.scanner.begin();
            let right = self.shift()?;
            left = self.alloc_expr(
                Expr::Binary {
                    op: TokenKind::BitAnd,
                    left,
                    right,
                },
                pos,
            );
        }
        Some(left)
    }

    fn bitxor(&mut self) -> Option<ExprId> {
        let mut left = self.bitand()?;
        while self.match_tok(TokenKind::BitXor) {
            let pos = self.scanner.begin();
            // The right-hand side descends into shift, not bitand. This
            // asymmetry is part of the language.
            let right = self.shift()?;
            left = self.alloc_expr(
                Expr::Binary {
                    op: TokenKind::BitXor,
                    left,
                    right,
                },
                pos,
            );
        }
        Some(left)
    }

    fn bitor(&mut self) -> Option<ExprId> {
        let mut left = self.bitxor()?;
        while self.match_tok(TokenKind::BitOr) {
            let pos = self.scanner.begin();
            let right = self.bitxor()?;
            left = self.alloc_expr(
                Expr::Binary {
                    op: TokenKind::BitOr,
                    left,
                    right,
                },
                pos,
            );
        }
        Some(left)
    }

    fn relational(&mut self) -> Option<ExprId> {
        let mut left = self.bitor()?;
        let mut count = 0;
        loop {
            let kind = self.scanner.peek();
            if !kind.is_relational() {
                break;
            }
            self.scanner.next();
            let pos = self.scanner.begin();
            let right = self.shift()?;
            left = self.alloc_expr(
                Expr::Binary {
                    op: kind,
                    left,
                    right,
                },
                pos,
            );
            count += 1;
            if count > 1 {
                self.report(pos, Message::NoChainedRelationalOps);
                return None;
            }
        }
        Some(left)
    }

    fn equals(&mut self) -> Option<ExprId> {
        let mut left = self.relational()?;
        while let Some(op) = self.match_any(&[TokenKind::Equals, TokenKind::NotEquals]) {
            let pos = self.scanner.begin();
            let right = self.relational()?;
            left = self.alloc_expr(Expr::Binary { op, left, right }, pos);
        }
        Some(left)
    }

    fn logical_and(&mut self) -> Option<ExprId> {
        let mut left = self.equals()?;
        while self.match_tok(TokenKind::And) {
            let pos = self.scanner.begin();
            let right = self.equals()?;
            left = self.alloc_expr(
                Expr::Binary {
                    op: TokenKind::And,
                    left,
                    right,
                },
                pos,
            );
        }
        Some(left)
    }

    fn logical_or(&mut self) -> Option<ExprId> {
        let mut left = self.logical_and()?;
        while self.match_tok(TokenKind::Or) {
            let pos = self.scanner.begin();
            let right = self.logical_and()?;
            left = self.alloc_expr(
                Expr::Binary {
                    op: TokenKind::Or,
                    left,
                    right,
                },
                pos,
            );
        }
        Some(left)
    }

    fn ternary(&mut self) -> Option<ExprId> {
        let cond = self.logical_or()?;

        if !self.match_tok(TokenKind::QMark) {
            return Some(cond);
        }

        let pos = self.scanner.begin();
        // `x ? a:b` would otherwise lex `a:` as a label.
        let then = self.with_tags_disabled(|p| p.expression())?;

        if !self.expect(TokenKind::Colon) {
            return None;
        }

        let other = self.expression()?;

        Some(self.alloc_expr(Expr::Ternary { cond, then, other }, pos))
    }

    fn assignment(&mut self) -> Option<ExprId> {
        let mut left = self.ternary()?;
        loop {
            let token = self.scanner.peek();
            if !token.is_assign() {
                break;
            }
            self.scanner.next();
            let pos = self.scanner.begin();
            let expr = self.assignment()?;

            left = self.alloc_expr(
                Expr::Assign {
                    op: token,
                    lvalue: left,
                    expr,
                },
                pos,
            );
        }
        Some(left)
    }

    pub fn expression(&mut self) -> Option<ExprId> {
        self.assignment()
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn while_(&mut self) -> Option<StmtId> {
        // while ::= "while" "(" expr ")" statement
        let pos = self.scanner.begin();

        if !self.expect(TokenKind::LParen) {
            return None;
        }
        let cond = self.expression()?;
        if !self.expect(TokenKind::RParen) {
            return None;
        }

        let body = self.statement_or_block()?;

        self.require_newline();

        Some(self.alloc_stmt(
            Stmt::While {
                kind: WhileKind::While,
                cond,
                body,
            },
            pos,
        ))
    }

    fn do_(&mut self) -> Option<StmtId> {
        // do ::= "do" block "while" "(" expr ")"
        let pos = self.scanner.begin();

        let body = self.block()?;

        if !self.expect(TokenKind::While) {
            return None;
        }
        if !self.expect(TokenKind::LParen) {
            return None;
        }
        let cond = self.expression()?;
        if !self.expect(TokenKind::RParen) {
            return None;
        }

        self.require_terminator();

        Some(self.alloc_stmt(
            Stmt::While {
                kind: WhileKind::Do,
                cond,
                body,
            },
            pos,
        ))
    }

    /// Matches the `() =` prefix of a method-bind alias, rewinding entirely
    /// when it doesn't apply.
    fn match_method_bind(&mut self) -> bool {
        if !self.match_tok(TokenKind::LParen) {
            return false;
        }

        if self.match_tok(TokenKind::RParen) {
            if self.match_tok(TokenKind::Assign) {
                return true;
            }
            self.scanner.undo();
        }
        self.scanner.undo();
        false
    }

    fn parse_accessor(&mut self) -> Option<LayoutEntryId> {
        let mut spec = TypeSpecifier::default();
        self.parse_new_type_expr(&mut spec, 0);

        if !self.expect(TokenKind::Name) {
            return None;
        }
        let name = *self.scanner.current();
        let pos = self.scanner.begin();

        if !self.expect(TokenKind::LBrace) {
            return None;
        }

        let mut getter: Option<FunctionOrAlias> = None;
        let mut setter: Option<FunctionOrAlias> = None;

        while !self.match_tok(TokenKind::RBrace) {
            self.expect(TokenKind::Public);

            let native = self.match_tok(TokenKind::Native);

            let member = self.expect_name()?;
            let member_pos = self.scanner.begin();

            enum Slot {
                Get,
                Set,
                Dummy,
            }
            let slot = {
                let text = self.arena.interner.resolve(member);
                match text {
                    "get" => Slot::Get,
                    "set" => Slot::Set,
                    _ => Slot::Dummy,
                }
            };
            if matches!(slot, Slot::Dummy) {
                self.report(member_pos, Message::InvalidAccessorName);
            }

            let occupied = match slot {
                Slot::Get => getter.is_some(),
                Slot::Set => setter.is_some(),
                Slot::Dummy => false,
            };
            if occupied {
                let text = self.arena.interner.resolve(member).to_string();
                self.report(member_pos, Message::AccessorRedeclared { name: text });
            }

            let value = if self.match_method_bind() {
                if !self.expect(TokenKind::Name) {
                    return None;
                }
                let alias = NameProxy::new(self.scanner.begin(), self.scanner.current_name());
                self.require_newline_or_semi();
                FunctionOrAlias::Alias(alias)
            } else {
                let params = self.arguments()?;

                let body = if native { None } else { Some(self.method_body()?) };

                self.require_newline_or_semi();

                let sig = FunctionSignature {
                    return_type: spec,
                    params,
                };
                let sig_id = self.arena.signatures.alloc(sig, member_pos);
                FunctionOrAlias::Fun(FunctionNode {
                    kind: if native {
                        TokenKind::Native
                    } else {
                        TokenKind::Function
                    },
                    signature: sig_id,
                    body,
                })
            };

            match slot {
                Slot::Get => getter = Some(value),
                Slot::Set => setter = Some(value),
                Slot::Dummy => {}
            }
        }

        Some(self.arena.layout_entries.alloc(
            LayoutEntry::Accessor {
                name,
                spec,
                getter,
                setter,
            },
            pos,
        ))
    }

    fn parse_method(&mut self) -> Option<LayoutEntryId> {
        let native = self.match_tok(TokenKind::Native);
        let destructor = self.match_tok(TokenKind::Tilde);

        let mut decl = Declaration::default();
        if destructor {
            decl.spec.set_builtin_type(TokenKind::Void);

            if !self.expect(TokenKind::Name) {
                return None;
            }
            decl.name = Some(*self.scanner.current());
        } else if !self.parse_decl(&mut decl, MAYBE_FUNCTION) {
            return None;
        }

        let name = decl.name.unwrap_or_else(|| Token::synthetic(TokenKind::Name));
        let pos = self.scanner.begin();

        if self.match_method_bind() {
            if !self.expect(TokenKind::Name) {
                return None;
            }

            // An aliased definition, like "public X() = Y".
            let alias = NameProxy::new(self.scanner.begin(), self.scanner.current_name());
            self.require_newline_or_semi();
            return Some(self.arena.layout_entries.alloc(
                LayoutEntry::Method {
                    name,
                    method: FunctionOrAlias::Alias(alias),
                },
                pos,
            ));
        }

        let params = self.arguments()?;

        // Grab the body, or if none is required, require a terminator.
        let body = if native {
            self.require_newline_or_semi();
            None
        } else {
            Some(self.method_body()?)
        };

        let sig = FunctionSignature {
            return_type: decl.spec,
            params,
        };
        let sig_id = self.arena.signatures.alloc(sig, pos);
        let node = FunctionNode {
            kind: if native {
                TokenKind::Native
            } else {
                TokenKind::Function
            },
            signature: sig_id,
            body,
        };

        Some(self.arena.layout_entries.alloc(
            LayoutEntry::Method {
                name,
                method: FunctionOrAlias::Fun(node),
            },
            pos,
        ))
    }

    fn methodmap(&mut self) -> Option<StmtId> {
        let begin = self.scanner.begin();

        if !self.expect(TokenKind::Name) {
            return None;
        }
        let name = *self.scanner.current();

        let nullable = self.match_tok(TokenKind::Nullable);

        let mut extends = None;
        if self.match_tok(TokenKind::Lt) && self.expect(TokenKind::Name) {
            extends = Some(NameProxy::new(
                self.scanner.begin(),
                self.scanner.current_name(),
            ));
        }

        if !self.expect(TokenKind::LBrace) {
            return None;
        }

        let mut entries = Vec::new();
        while !self.match_tok(TokenKind::RBrace) {
            let entry = if self.match_tok(TokenKind::Public) {
                self.parse_method()
            } else if self.match_tok(TokenKind::Property) {
                self.parse_accessor()
            } else {
                self.report(self.scanner.begin(), Message::ExpectedLayoutMember);
                None
            };
            entries.push(entry?);
        }

        let entries = self.arena.list_layout_entries(entries);
        let stmt = self.alloc_stmt(
            Stmt::Layout {
                kind: TokenKind::Methodmap,
                name,
                extends,
                entries,
                nullable,
            },
            begin,
        );

        self.require_newline_or_semi();
        Some(stmt)
    }

    fn switch_(&mut self) -> Option<StmtId> {
        // switch ::= "switch" "(" expr ")" "{" case* defaultcase? "}"
        // case ::= "case" casevals ":" statement
        // defaultcase ::= "default" ":" statement
        let pos = self.scanner.begin();

        if !self.expect(TokenKind::LParen) {
            return None;
        }
        let cond = self.expression()?;
        if !self.expect(TokenKind::RParen) {
            return None;
        }

        if !self.expect(TokenKind::LBrace) {
            return None;
        }

        let mut default_pos = Span::default();
        let mut cases = Vec::new();
        let mut default_case: Option<StmtId> = None;

        while !self.peek(TokenKind::RBrace) {
            if self.peek(TokenKind::Eof) {
                self.expect(TokenKind::RBrace);
                return None;
            }

            let mut expr = None;
            let mut others = Vec::new();
            if self.match_tok(TokenKind::Default) {
                if default_case.is_some() {
                    self.report(self.scanner.begin(), Message::OneDefaultPerSwitch);
                }
                default_pos = self.scanner.begin();
            } else {
                if default_case.is_some() {
                    self.report(default_pos, Message::DefaultMustBeLastCase);
                }

                if !self.expect(TokenKind::Case) {
                    return None;
                }

                // |case <NAME>:| would otherwise be read as a label.
                let parsed = self.with_tags_disabled(|p| {
                    let expr = p.expression()?;
                    let mut others = Vec::new();
                    while p.match_tok(TokenKind::Comma) {
                        others.push(p.expression()?);
                    }
                    Some((expr, others))
                })?;
                expr = Some(parsed.0);
                others = parsed.1;
            }

            if !self.expect(TokenKind::Colon) {
                return None;
            }

            let stmt = self.statement_or_block()?;

            self.require_newline();

            if !self.peek(TokenKind::Case)
                && !self.peek(TokenKind::Default)
                && !self.peek(TokenKind::RBrace)
            {
                self.report(self.scanner.begin(), Message::SingleStatementPerCase);
                // Resynchronize at the next case boundary so later cases can
                // still be checked.
                loop {
                    match self.scanner.peek() {
                        TokenKind::Case
                        | TokenKind::Default
                        | TokenKind::RBrace
                        | TokenKind::Eof => break,
                        _ => {
                            self.scanner.next();
                        }
                    }
                }
            }

            if let Some(expr) = expr {
                let others = self.arena.list_exprs(others);
                let case = self.arena.cases.alloc(
                    Case {
                        expr,
                        others,
                        body: stmt,
                    },
                    pos,
                );
                cases.push(case);
            } else if default_case.is_none() {
                default_case = Some(stmt);
            }
        }

        if !self.expect(TokenKind::RBrace) {
            return None;
        }

        self.require_newline();

        let cases = self.arena.list_cases(cases);
        Some(self.alloc_stmt(
            Stmt::Switch {
                cond,
                cases,
                default: default_case,
            },
            pos,
        ))
    }

    fn for_(&mut self) -> Option<StmtId> {
        // for ::= "for" "(" forinit? ";" forcond? ";" forstep? ")" statement
        let pos = self.scanner.begin();
        if !self.expect(TokenKind::LParen) {
            return None;
        }

        let mut init = None;
        if !self.match_tok(TokenKind::Semicolon) {
            let is_decl = self.match_tok(TokenKind::New) || self.scanner.peek().is_new_type_token();

            init = if is_decl {
                Some(self.local_variable_declaration(TokenKind::New, INLINE)?)
            } else {
                Some(self.expression_statement()?)
            };
            if !self.expect(TokenKind::Semicolon) {
                return None;
            }
        }

        let mut cond = None;
        if !self.match_tok(TokenKind::Semicolon) {
            cond = Some(self.expression()?);
            if !self.expect(TokenKind::Semicolon) {
                return None;
            }
        }

        let mut update = None;
        if !self.match_tok(TokenKind::RParen) {
            update = Some(self.expression_statement()?);
            if !self.expect(TokenKind::RParen) {
                return None;
            }
        }

        let body = self.statement_or_block()?;

        self.require_newline();

        Some(self.alloc_stmt(
            Stmt::For {
                init,
                cond,
                update,
                body,
            },
            pos,
        ))
    }

    fn variable(&mut self, decl: &mut Declaration, flags: u32) -> Option<StmtId> {
        let pos = decl.name.map_or_else(|| self.scanner.begin(), |n| n.span);

        let mut init = None;
        if self.match_tok(TokenKind::Assign) {
            init = self.expression();
        }

        let first = self.arena.var_decls.alloc(
            VarDecl {
                name: decl.name,
                spec: decl.spec,
                init,
                next: None,
            },
            pos,
        );

        let mut prev = first;
        while self.match_tok(TokenKind::Comma) {
            // Parse the next declarator re-using any sticky information from
            // the first decl.
            if !self.reparse_decl(decl, VARIABLE) {
                break;
            }

            let mut init = None;
            if self.match_tok(TokenKind::Assign) {
                init = self.expression();
            }

            let var = self.arena.var_decls.alloc(
                VarDecl {
                    name: decl.name,
                    spec: decl.spec,
                    init,
                    next: None,
                },
                self.scanner.begin(),
            );
            self.arena.var_decls.get_mut(prev).next = Some(var);
            prev = var;
        }

        if flags & INLINE == 0 {
            self.require_terminator();
        }

        Some(self.alloc_stmt(Stmt::VarDecl(first), pos))
    }

    fn local_variable_declaration(&mut self, _kind: TokenKind, flags: u32) -> Option<StmtId> {
        let mut decl = Declaration::default();

        if !self.allow_declarations {
            self.report(self.scanner.begin(), Message::VariableMustBeInBlock);
        }

        let flags = flags | VARIABLE;
        if !self.parse_decl(&mut decl, flags) {
            return None;
        }

        self.variable(&mut decl, flags)
    }

    fn return_(&mut self) -> Option<StmtId> {
        let pos = self.scanner.begin();

        let mut expr = None;
        let next = self.scanner.peek_token_same_line();
        if next != TokenKind::Eol && next != TokenKind::Eof && next != TokenKind::Semicolon {
            expr = Some(self.expression()?);

            // Track non-void returns so tagless functions can be inferred.
            self.encountered_return = true;
        }

        self.require_terminator();
        Some(self.alloc_stmt(Stmt::Return { expr }, pos))
    }

    fn expression_statement(&mut self) -> Option<StmtId> {
        let expr = self.assignment()?;
        let pos = self.arena.exprs.span(expr);
        Some(self.alloc_stmt(Stmt::Expression(expr), pos))
    }

    /// Parses statements, expecting the `{` to have already been consumed.
    fn statements(&mut self) -> Option<Vec<StmtId>> {
        let mut list = Vec::new();
        while !self.match_tok(TokenKind::RBrace) {
            if self.peek(TokenKind::Eof) {
                self.expect(TokenKind::RBrace);
                return None;
            }
            // Call statement() directly so allowDeclarations stays on.
            let stmt = self.statement()?;
            list.push(stmt);
        }
        Some(list)
    }

    fn block(&mut self) -> Option<StmtId> {
        // block ::= "{" statement* "}"
        if !self.expect(TokenKind::LBrace) {
            return None;
        }

        let pos = self.scanner.begin();

        let saved = std::mem::replace(&mut self.allow_declarations, true);
        let list = self.statements();
        self.allow_declarations = saved;

        let list = list?;
        let stmts = self.arena.list_stmts(list);
        Some(self.alloc_stmt(Stmt::Block { stmts }, pos))
    }

    fn if_(&mut self) -> Option<StmtId> {
        // if ::= "if" "(" expr ")" statement ("else" "if" ...)* ("else" statement)?
        let pos = self.scanner.begin();
        if !self.expect(TokenKind::LParen) {
            return None;
        }

        let cond = self.expression()?;

        if !self.expect(TokenKind::RParen) {
            return None;
        }

        let if_true = self.statement_or_block()?;

        let outer = self.alloc_stmt(
            Stmt::If {
                cond,
                if_true,
                if_false: None,
            },
            pos,
        );

        let mut last = outer;
        while self.match_tok(TokenKind::Else) {
            if !self.match_tok(TokenKind::If) {
                let if_false = self.statement_or_block()?;
                set_if_false(&mut self.arena, last, if_false);
                break;
            }

            let pos = self.scanner.begin();
            if !self.expect(TokenKind::LParen) {
                return None;
            }

            let other_cond = self.expression()?;

            if !self.expect(TokenKind::RParen) {
                return None;
            }

            let other_true = self.statement_or_block()?;

            let inner = self.alloc_stmt(
                Stmt::If {
                    cond: other_cond,
                    if_true: other_true,
                    if_false: None,
                },
                pos,
            );
            set_if_false(&mut self.arena, last, inner);
            last = inner;
        }

        self.require_newline();

        Some(outer)
    }

    fn statement(&mut self) -> Option<StmtId> {
        // Shortcut out early for blocks, since block() expects "{".
        if self.peek(TokenKind::LBrace) {
            return self.block();
        }

        let kind = self.scanner.next();

        // We don't have enough lookahead to differentiate some declarations
        // from expressions, so pattern-match: "name[]" probably starts a
        // declaration, as does "name name".
        if kind == TokenKind::Name {
            let mut is_decl = false;

            if self.match_tok(TokenKind::LBracket) {
                if self.peek(TokenKind::RBracket) {
                    is_decl = true;
                }
                self.scanner.undo();
            } else if self.peek(TokenKind::Name) {
                is_decl = true;
            }

            if is_decl {
                self.scanner.undo();
                return self.local_variable_declaration(TokenKind::New, 0);
            }
        }

        // Other declarations don't need any special sniffing.
        if kind.is_new_type_token()
            || kind == TokenKind::Const
            || kind == TokenKind::Decl
            || kind == TokenKind::Static
            || kind == TokenKind::New
        {
            let kind = if kind.is_new_type_token() || kind == TokenKind::Const {
                self.scanner.undo();
                TokenKind::New
            } else {
                kind
            };
            return self.local_variable_declaration(kind, 0);
        }

        // Statements that must be followed by a terminator break out of the
        // match; the rest return immediately.
        let stmt = match kind {
            TokenKind::For => return self.for_(),
            TokenKind::While => return self.while_(),
            TokenKind::Do => return self.do_(),
            TokenKind::Return => return self.return_(),
            TokenKind::Enum => return self.enum_(),
            TokenKind::Switch => return self.switch_(),
            TokenKind::If => return self.if_(),

            TokenKind::Break => Some(self.alloc_stmt(Stmt::Break, self.scanner.begin())),
            TokenKind::Continue => Some(self.alloc_stmt(Stmt::Continue, self.scanner.begin())),

            _ => None,
        };

        let stmt = match stmt {
            Some(stmt) => stmt,
            None => {
                self.scanner.undo();
                self.expression_statement()?
            }
        };

        self.require_terminator();
        Some(stmt)
    }

    fn statement_or_block(&mut self) -> Option<StmtId> {
        let saved = std::mem::replace(&mut self.allow_declarations, false);
        let r = self.statement();
        self.allow_declarations = saved;
        r
    }

    fn enum_(&mut self) -> Option<StmtId> {
        // enum ::= "enum" name? "{" enum_members? "}"
        let pos = self.scanner.begin();

        let mut name = None;
        if self.match_tok(TokenKind::Name) || self.match_tok(TokenKind::Label) {
            name = Some(self.scanner.current_name());
        }

        let mut entries = Vec::new();

        if !self.expect(TokenKind::LBrace) {
            return None;
        }

        loop {
            if self.peek(TokenKind::RBrace) {
                break;
            }

            let entry_name = self.expect_name()?;
            let proxy = NameProxy::new(self.scanner.begin(), entry_name);

            let mut init = None;
            if self.match_tok(TokenKind::Assign) {
                init = Some(self.expression()?);
            }

            entries.push(EnumEntry { proxy, init });

            if !self.match_tok(TokenKind::Comma) {
                break;
            }
        }
        if !self.expect(TokenKind::RBrace) {
            return None;
        }

        self.require_terminator();

        let entries = self.arena.list_enum_entries(entries);
        Some(self.alloc_stmt(Stmt::Enum { name, entries }, pos))
    }

    fn arguments(&mut self) -> Option<ListRef<VarDeclId>> {
        if !self.expect(TokenKind::LParen) {
            return None;
        }

        let mut params = Vec::new();
        if self.match_tok(TokenKind::RParen) {
            return Some(self.arena.list_var_decls(params));
        }

        let mut variadic = false;
        loop {
            let mut decl = Declaration::default();
            if !self.parse_decl(&mut decl, ARGUMENT) {
                break;
            }

            let mut init = None;
            if self.match_tok(TokenKind::Assign) {
                init = self.expression();
            }

            if decl.spec.is_variadic() {
                if variadic {
                    self.report(decl.spec.variadic_loc(), Message::MultipleVarargs);
                }
                variadic = true;
            }

            let pos = decl.name.map_or_else(|| self.scanner.begin(), |n| n.span);
            let node = self.arena.var_decls.alloc(
                VarDecl {
                    name: decl.name,
                    spec: decl.spec,
                    init,
                    next: None,
                },
                pos,
            );
            params.push(node);
            if !self.match_tok(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen);
        Some(self.arena.list_var_decls(params))
    }

    fn method_body(&mut self) -> Option<MethodBody> {
        let saved_return = std::mem::replace(&mut self.encountered_return, false);
        let saved_decls = std::mem::replace(&mut self.allow_declarations, true);

        let result = (|p: &mut Self| {
            let mut pos = Span::default();
            let list = if p.match_tok(TokenKind::LBrace) {
                pos = p.scanner.begin();
                p.statements()?
            } else {
                vec![p.statement()?]
            };

            p.require_newline();

            let stmts = p.arena.list_stmts(list);
            Some(MethodBody {
                pos,
                stmts,
                has_return: p.encountered_return,
            })
        })(self);

        self.encountered_return = saved_return;
        self.allow_declarations = saved_decls;
        result
    }

    fn function(&mut self, kind: TokenKind, decl: Declaration) -> Option<StmtId> {
        let params = self.arguments()?;

        let body = if kind != TokenKind::Forward && kind != TokenKind::Native {
            Some(self.method_body()?)
        } else {
            None
        };

        if body.is_some() {
            self.require_newline();
        } else {
            self.require_terminator();
        }

        let name = decl.name.unwrap_or_else(|| Token::synthetic(TokenKind::Name));
        let sig = FunctionSignature {
            return_type: decl.spec,
            params,
        };
        let sig_id = self.arena.signatures.alloc(sig, name.span);
        Some(self.alloc_stmt(
            Stmt::Function {
                name,
                kind,
                signature: sig_id,
                body,
            },
            name.span,
        ))
    }

    fn global(&mut self, kind: TokenKind) -> Option<StmtId> {
        let mut decl = Declaration::default();

        if kind == TokenKind::Native || kind == TokenKind::Forward {
            if !self.parse_decl(&mut decl, MAYBE_FUNCTION) {
                return None;
            }
            return self.function(kind, decl);
        }

        // public/stock/static combine; "static stock" is accepted.
        if kind == TokenKind::Static {
            self.match_tok(TokenKind::Stock);
        }

        let old_style = kind == TokenKind::New || kind == TokenKind::Decl;

        let mut flags = MAYBE_FUNCTION | VARIABLE;
        if old_style {
            flags |= OLD;
        }

        if !self.parse_decl(&mut decl, flags) {
            return None;
        }

        if old_style || decl.spec.has_post_dims() || !self.peek(TokenKind::LParen) {
            if old_style && decl.spec.is_new_decl() {
                let pos = decl.name.map_or_else(|| self.scanner.begin(), |n| n.span);
                self.report(pos, Message::NewStyleBadKeyword);
            }
            return self.variable(&mut decl, 0);
        }
        self.function(TokenKind::Function, decl)
    }

    fn struct_(&mut self, kind: TokenKind) -> Option<StmtId> {
        let loc = self.scanner.begin();

        if !self.expect(TokenKind::Name) {
            return None;
        }
        let name = *self.scanner.current();

        if !self.expect(TokenKind::LBrace) {
            return None;
        }

        let mut flags = FIELD;
        if kind == TokenKind::Union {
            flags |= MAYBE_NAMED;
        }

        let mut entries = Vec::new();
        while !self.match_tok(TokenKind::RBrace) {
            if self.peek(TokenKind::Eof) {
                self.expect(TokenKind::RBrace);
                return None;
            }

            // Struct fields currently require a |public| keyword.
            if kind == TokenKind::Struct {
                self.expect(TokenKind::Public);
            }

            let mut decl = Declaration::default();
            if !self.parse_new_decl(&mut decl, flags) {
                return None;
            }

            let entry = self.arena.layout_entries.alloc(
                LayoutEntry::Field {
                    name: decl.name,
                    spec: decl.spec,
                },
                decl.name.map_or(loc, |n| n.span),
            );
            entries.push(entry);

            self.require_newline_or_semi();
        }

        self.require_newline_or_semi();
        let entries = self.arena.list_layout_entries(entries);
        Some(self.alloc_stmt(
            Stmt::Layout {
                kind,
                name,
                extends: None,
                entries,
                nullable: false,
            },
            loc,
        ))
    }

    fn typedef_(&mut self) -> Option<StmtId> {
        let begin = self.scanner.begin();

        let name = self.expect_name()?;

        self.expect(TokenKind::Assign);

        let mut spec = TypeSpecifier::default();
        self.parse_new_type_expr(&mut spec, 0);

        self.require_newline_or_semi();
        Some(self.alloc_stmt(Stmt::Typedef { name, spec }, begin))
    }

    /// Parses the whole translation unit, recording diagnostics and
    /// recovering until end of input.
    pub fn parse(&mut self) -> ParseTree {
        let mut list = Vec::new();

        loop {
            let marker = self.scanner.progress();

            let kind = self.scanner.next();
            let statement = match kind {
                TokenKind::Eof => break,

                // Lexer already diagnosed this token.
                TokenKind::Unknown => continue,

                TokenKind::Name
                | TokenKind::Label
                | TokenKind::Const
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Int
                | TokenKind::Void
                | TokenKind::Object
                | TokenKind::Float => {
                    self.scanner.undo();
                    self.global(kind)
                }

                TokenKind::New
                | TokenKind::Decl
                | TokenKind::Static
                | TokenKind::Public
                | TokenKind::Stock
                | TokenKind::Native
                | TokenKind::Forward => self.global(kind),

                TokenKind::Methodmap => self.methodmap(),

                TokenKind::Enum => self.enum_(),

                TokenKind::Struct | TokenKind::Union => self.struct_(kind),

                TokenKind::Typedef => self.typedef_(),

                TokenKind::Functag => {
                    self.report(self.scanner.begin(), Message::FunctagsNotSupported);
                    self.scanner.eat_rest_of_line();
                    continue;
                }

                _ => {
                    self.report(self.scanner.begin(), Message::ExpectedGlobal);
                    continue;
                }
            };

            match statement {
                Some(stmt) => list.push(stmt),
                None => {
                    // The production already reported; make sure we keep
                    // moving so recovery terminates.
                    if self.scanner.progress() == marker {
                        self.scanner.next();
                    }
                }
            }
        }

        let statements = self.arena.list_stmts(list);
        ParseTree { statements }
    }
}

fn set_if_false(arena: &mut AstArena, stmt: StmtId, if_false_val: StmtId) {
    if let Stmt::If { if_false, .. } = arena.stmts.get_mut(stmt) {
        debug_assert!(if_false.is_none());
        *if_false = Some(if_false_val);
    } else {
        debug_assert!(false, "set_if_false on a non-if statement");
    }
}
