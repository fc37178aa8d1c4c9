//! Debug observer: a stable, indented dump of the AST.
//!
//! The output format is append-only and byte-stable for a given tree, which
//! makes it suitable for golden-file tests of parser behavior.

use std::fmt::Write;

use crate::ast::{
    AstArena, CaseId, Expr, ExprId, FunctionOrAlias, LayoutEntry, ParseTree, Resolver, SignatureId,
    Stmt, StmtId, TypeSpecifier, VarDeclId, WhileKind,
};
use crate::token::Token;

/// Renders the whole tree.
pub fn dump(arena: &AstArena, tree: &ParseTree) -> String {
    let mut printer = AstPrinter {
        arena,
        out: String::new(),
        level: 0,
    };
    for &stmt in arena.stmts_list(tree.statements) {
        printer.visit_stmt(stmt);
    }
    printer.out
}

/// Renders a single expression (handy in tests).
pub fn dump_expr(arena: &AstArena, expr: ExprId) -> String {
    let mut printer = AstPrinter {
        arena,
        out: String::new(),
        level: 0,
    };
    printer.visit_expr(expr);
    printer.out
}

struct AstPrinter<'a> {
    arena: &'a AstArena,
    out: String,
    level: usize,
}

impl<'a> AstPrinter<'a> {
    fn prefix(&mut self) {
        for _ in 0..self.level {
            self.out.push_str("  ");
        }
    }

    fn indent(&mut self) {
        self.level += 1;
    }

    fn unindent(&mut self) {
        self.level -= 1;
    }

    fn name_of(&self, tok: Option<Token>) -> &'a str {
        match tok.and_then(|t| t.atom()) {
            Some(atom) => self.arena.interner.resolve(atom),
            None => "<anonymous>",
        }
    }

    fn dump_spec(&mut self, spec: &TypeSpecifier, name: Option<&str>) {
        if spec.is_const() {
            self.out.push_str("const ");
        }

        match spec.resolver() {
            Some(Resolver::Named(proxy)) => {
                let s = self.arena.interner.resolve(proxy.name);
                self.out.push_str(s);
            }
            Some(Resolver::LabeledName(proxy)) => {
                let s = self.arena.interner.resolve(proxy.name);
                let _ = write!(self.out, "{s}:");
            }
            Some(Resolver::Builtin(kind)) => self.out.push_str(kind.name()),
            Some(Resolver::ImplicitInt) => self.out.push_str("implicit-int"),
            Some(Resolver::FunctionType(sig)) => {
                self.out.push_str("function ");
                self.dump_sig(sig);
            }
            None => self.out.push_str("<unresolved>"),
        }

        let postfix_dims =
            matches!(spec.resolver(), Some(Resolver::LabeledName(_))) || spec.dims().is_some();

        if !postfix_dims {
            for _ in 0..spec.rank() {
                self.out.push_str("[]");
            }
        }

        if let Some(name) = name {
            let _ = write!(self.out, " {name}");
        }

        if postfix_dims {
            for _ in 0..spec.rank() {
                self.out.push_str("[]");
            }
        }
    }

    fn dump_sig(&mut self, sig: SignatureId) {
        let sig = *self.arena.signatures.get(sig);
        self.dump_spec(&sig.return_type, None);

        let params: Vec<VarDeclId> = self.arena.var_decls_list(sig.params).to_vec();
        if params.is_empty() {
            self.out.push_str(" ()");
            return;
        }

        self.out.push_str(" (\n");
        self.indent();
        for param in params {
            let decl = *self.arena.var_decls.get(param);
            self.prefix();
            let name = self.name_of(decl.name).to_string();
            self.dump_spec(&decl.spec, Some(&name));
            self.out.push('\n');
        }
        self.unindent();
        self.prefix();
        self.out.push(')');
    }

    fn dump_method(&mut self, entry_name: &str, method: &FunctionOrAlias, tag: Option<&str>) {
        match tag {
            Some(tag) => {
                let _ = write!(self.out, "{tag} method ");
            }
            None => self.out.push_str("method "),
        }
        match method {
            FunctionOrAlias::Alias(alias) => {
                let alias = self.arena.interner.resolve(alias.name);
                let _ = write!(self.out, "{entry_name} = {alias}");
            }
            FunctionOrAlias::Fun(node) => {
                let _ = write!(self.out, "{entry_name} ");
                self.dump_sig(node.signature);
            }
        }
    }

    fn visit_expr(&mut self, id: ExprId) {
        let expr = *self.arena.exprs.get(id);
        match expr {
            Expr::NameProxy(proxy) => {
                self.prefix();
                let name = self.arena.interner.resolve(proxy.name);
                let _ = writeln!(self.out, "[ NameProxy ({name})");
            }

            Expr::IntLit(v) => {
                self.prefix();
                let _ = writeln!(self.out, "[ IntegerLiteral ({v})");
            }

            Expr::FloatLit(v) => {
                self.prefix();
                let _ = writeln!(self.out, "[ FloatLiteral ({v:.6})");
            }

            Expr::CharLit(c) => {
                self.prefix();
                let _ = writeln!(self.out, "[ CharLiteral ({c})");
            }

            Expr::BoolLit(b) => {
                self.prefix();
                let _ = writeln!(self.out, "[ BooleanLiteral ({b})");
            }

            Expr::StringLit(_) => {
                self.prefix();
                self.out.push_str("[ StringLiteral\n");
            }

            Expr::This => {
                self.prefix();
                self.out.push_str("[ ThisExpression\n");
            }

            Expr::ArrayLit { items } => {
                self.prefix();
                self.out.push_str("[ ArrayLiteral\n");
                self.indent();
                for &item in self.arena.exprs_list(items) {
                    self.visit_expr(item);
                }
                self.unindent();
            }

            Expr::StructInit { pairs } => {
                self.prefix();
                self.out.push_str("[ StructInitializer\n");
                self.indent();
                for pair in self.arena.name_values_list(pairs).to_vec() {
                    self.prefix();
                    let name = self.name_of(Some(pair.name)).to_string();
                    let _ = writeln!(self.out, "{name} =");
                    self.indent();
                    self.visit_expr(pair.expr);
                    self.unindent();
                }
                self.unindent();
            }

            Expr::Call { callee, args } => {
                self.prefix();
                self.out.push_str("[ CallExpression\n");
                self.indent();
                self.visit_expr(callee);
                for &arg in self.arena.exprs_list(args) {
                    self.visit_expr(arg);
                }
                self.unindent();
            }

            Expr::Index { base, index } => {
                self.prefix();
                self.out.push_str("[ IndexExpression\n");
                self.indent();
                self.visit_expr(base);
                self.visit_expr(index);
                self.unindent();
            }

            Expr::Unary { op, expr, tag } => {
                self.prefix();
                match tag {
                    Some(proxy) => {
                        let name = self.arena.interner.resolve(proxy.name);
                        let _ = writeln!(self.out, "[ UnaryExpression ({name}:)");
                    }
                    None => {
                        let _ = writeln!(self.out, "[ UnaryExpression ({})", op.name());
                    }
                }
                self.indent();
                self.visit_expr(expr);
                self.unindent();
            }

            Expr::IncDec { op, expr, postfix } => {
                self.prefix();
                let _ = writeln!(
                    self.out,
                    "[ IncDecExpression ({} postfix={})",
                    op.name(),
                    postfix as u8
                );
                self.indent();
                self.visit_expr(expr);
                self.unindent();
            }

            Expr::Binary { op, left, right } => {
                self.prefix();
                let _ = writeln!(self.out, "[ BinaryExpression ({})", op.name());
                self.indent();
                self.visit_expr(left);
                self.visit_expr(right);
                self.unindent();
            }

            Expr::Ternary { cond, then, other } => {
                self.prefix();
                self.out.push_str("[ TernaryExpression\n");
                self.indent();
                self.visit_expr(cond);
                self.visit_expr(then);
                self.visit_expr(other);
                self.unindent();
            }

            Expr::Assign { op, lvalue, expr } => {
                self.prefix();
                let _ = writeln!(self.out, "[ Assignment ({})", op.name());
                self.indent();
                self.visit_expr(lvalue);
                self.visit_expr(expr);
                self.unindent();
            }
        }
    }

    fn visit_var_decl(&mut self, id: VarDeclId) {
        let decl = *self.arena.var_decls.get(id);
        self.prefix();
        let name = self.name_of(decl.name).to_string();
        let _ = writeln!(self.out, "[ VariableDeclaration ({name})");
        self.indent();
        if let Some(init) = decl.init {
            self.visit_expr(init);
        }
        self.unindent();
        if let Some(next) = decl.next {
            self.visit_var_decl(next);
        }
    }

    fn visit_case(&mut self, id: CaseId) {
        let case = *self.arena.cases.get(id);
        self.visit_expr(case.expr);
        for &other in self.arena.exprs_list(case.others) {
            self.visit_expr(other);
        }
        self.indent();
        self.visit_stmt(case.body);
        self.unindent();
    }

    fn visit_stmt(&mut self, id: StmtId) {
        let stmt = *self.arena.stmts.get(id);
        match stmt {
            Stmt::Block { stmts } => {
                self.prefix();
                self.out.push_str("[ BlockStatement\n");
                self.indent();
                for &s in self.arena.stmts_list(stmts) {
                    self.visit_stmt(s);
                }
                self.unindent();
            }

            Stmt::Expression(expr) => {
                self.prefix();
                self.out.push_str("[ ExpressionStatement\n");
                self.indent();
                self.visit_expr(expr);
                self.unindent();
            }

            Stmt::If {
                cond,
                if_true,
                if_false,
            } => {
                self.prefix();
                self.out.push_str("[ IfStatement\n");
                self.indent();
                self.visit_expr(cond);
                self.visit_stmt(if_true);
                if let Some(if_false) = if_false {
                    self.visit_stmt(if_false);
                }
                self.unindent();
            }

            Stmt::While { kind, cond, body } => {
                self.prefix();
                let kind = match kind {
                    WhileKind::Do => "do",
                    WhileKind::While => "while",
                };
                let _ = writeln!(self.out, "[ WhileStatement ({kind})");
                self.indent();
                self.visit_expr(cond);
                self.visit_stmt(body);
                self.unindent();
            }

            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                self.prefix();
                self.out.push_str("[ ForStatement\n");
                self.indent();
                if let Some(init) = init {
                    self.visit_stmt(init);
                }
                if let Some(cond) = cond {
                    self.visit_expr(cond);
                }
                if let Some(update) = update {
                    self.visit_stmt(update);
                }
                self.visit_stmt(body);
                self.unindent();
            }

            Stmt::Return { expr } => {
                self.prefix();
                self.out.push_str("[ ReturnStatement\n");
                self.indent();
                if let Some(expr) = expr {
                    self.visit_expr(expr);
                }
                self.unindent();
            }

            Stmt::Break => {
                self.prefix();
                self.out.push_str("[ BreakStatement\n");
            }

            Stmt::Continue => {
                self.prefix();
                self.out.push_str("[ ContinueStatement\n");
            }

            Stmt::Switch {
                cond,
                cases,
                default,
            } => {
                self.prefix();
                self.out.push_str("[ SwitchStatement\n");
                self.indent();
                self.visit_expr(cond);
                for &case in self.arena.cases_list(cases) {
                    self.visit_case(case);
                }
                if let Some(default) = default {
                    self.visit_stmt(default);
                }
                self.unindent();
            }

            Stmt::Enum { name, entries } => {
                self.prefix();
                let name = match name {
                    Some(atom) => self.arena.interner.resolve(atom),
                    None => "<anonymous>",
                };
                let _ = writeln!(self.out, "[ EnumStatement ({name})");
                self.indent();
                for entry in self.arena.enum_entries_list(entries).to_vec() {
                    self.prefix();
                    let entry_name = self.arena.interner.resolve(entry.proxy.name);
                    let _ = writeln!(self.out, "{entry_name} =");
                    if let Some(init) = entry.init {
                        self.indent();
                        self.visit_expr(init);
                        self.unindent();
                    }
                }
                self.unindent();
            }

            Stmt::VarDecl(decl) => self.visit_var_decl(decl),

            Stmt::Function {
                name,
                kind: _,
                signature,
                body,
            } => {
                self.prefix();
                let name = self.name_of(Some(name)).to_string();
                let _ = writeln!(self.out, "[ FunctionStatement ({name})");
                self.indent();
                self.prefix();
                self.dump_sig(signature);
                self.out.push('\n');
                if let Some(body) = body {
                    self.prefix();
                    self.out.push_str("[ BlockStatement\n");
                    self.indent();
                    for &s in self.arena.stmts_list(body.stmts) {
                        self.visit_stmt(s);
                    }
                    self.unindent();
                }
                self.unindent();
            }

            Stmt::Layout {
                kind,
                name,
                extends: _,
                entries,
                nullable: _,
            } => {
                self.prefix();
                let name = self.name_of(Some(name)).to_string();
                let _ = writeln!(self.out, "[ LayoutStatement {} {name}", kind.name());
                self.indent();
                for &entry in self.arena.layout_entries_list(entries).to_vec().iter() {
                    let entry = *self.arena.layout_entries.get(entry);
                    self.prefix();
                    match entry {
                        LayoutEntry::Field { name, spec } => {
                            self.out.push_str("field ");
                            let name = self.name_of(name).to_string();
                            self.dump_spec(&spec, Some(&name));
                        }
                        LayoutEntry::Method { name, method } => {
                            let name = self.name_of(Some(name)).to_string();
                            self.dump_method(&name, &method, None);
                        }
                        LayoutEntry::Accessor {
                            name,
                            spec: _,
                            getter,
                            setter,
                        } => {
                            let name = self.name_of(Some(name)).to_string();
                            if let Some(getter) = getter {
                                self.dump_method(&name, &getter, Some("getter"));
                            }
                            if let Some(setter) = setter {
                                self.dump_method(&name, &setter, Some("setter"));
                            }
                        }
                    }
                    self.out.push('\n');
                }
                self.unindent();
            }

            Stmt::Typedef { name, spec } => {
                self.prefix();
                self.out.push_str("[ TypedefStatement\n");
                self.indent();
                self.prefix();
                let name = self.arena.interner.resolve(name).to_string();
                self.dump_spec(&spec, Some(&name));
                self.out.push('\n');
                self.unindent();
            }
        }
    }
}
