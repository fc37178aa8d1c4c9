//! Tokenization and the buffered scanner the parser consumes.
//!
//! The raw recognizer is a Logos-derived state machine; the [`Scanner`] on
//! top of it owns the lookahead protocol: one-token `undo`, arbitrary
//! `push_back`, line-sensitive peeking, the strict-semicolon dialect flag,
//! and label composition (a NAME immediately followed by `:` becomes a
//! label token while tag recognition is enabled).

use logos::Logos;

use crate::ast::Interner;
use crate::error::{Diag, DiagKind, LexErrorKind, Span};
use crate::token::{Token, TokenKind, TokenPayload};

// =============================================================================
// Raw tokenizer
// =============================================================================

fn lex_block_comment(lex: &mut logos::Lexer<'_, RawTok>) -> Result<(), LexErrorKind> {
    let rem = lex.remainder().as_bytes();
    match rem.windows(2).position(|w| w == b"*/") {
        Some(pos) => {
            lex.bump(pos + 2);
            Ok(())
        }
        None => {
            lex.bump(rem.len());
            Err(LexErrorKind::UnterminatedComment)
        }
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[\t\x0C\v\r\n ]+")]
#[rustfmt::skip]
enum RawTok {
    #[regex(r"//[^\n\r]*", logos::skip)] _LineComment,
    #[token("/*", lex_block_comment)] _BlockComment,

    // Keywords (must precede Ident).
    #[token("bool")] KwBool,
    #[token("break")] KwBreak,
    #[token("case")] KwCase,
    #[token("char")] KwChar,
    #[token("const")] KwConst,
    #[token("continue")] KwContinue,
    #[token("decl")] KwDecl,
    #[token("default")] KwDefault,
    #[token("do")] KwDo,
    #[token("else")] KwElse,
    #[token("enum")] KwEnum,
    #[token("false")] KwFalse,
    #[token("float")] KwFloat,
    #[token("for")] KwFor,
    #[token("forward")] KwForward,
    #[token("functag")] KwFunctag,
    #[token("function")] KwFunction,
    #[token("if")] KwIf,
    #[token("int")] KwInt,
    #[token("methodmap")] KwMethodmap,
    #[token("native")] KwNative,
    #[token("new")] KwNew,
    #[token("__nullable__")] KwNullable,
    #[token("object")] KwObject,
    #[token("property")] KwProperty,
    #[token("public")] KwPublic,
    #[token("return")] KwReturn,
    #[token("sizeof")] KwSizeof,
    #[token("static")] KwStatic,
    #[token("stock")] KwStock,
    #[token("struct")] KwStruct,
    #[token("switch")] KwSwitch,
    #[token("this")] KwThis,
    #[token("true")] KwTrue,
    #[token("typedef")] KwTypedef,
    #[token("union")] KwUnion,
    #[token("void")] KwVoid,
    #[token("while")] KwWhile,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")] Ident,

    // Literals.
    #[regex(r"0[xX][0-9a-fA-F]+")] Hex,
    #[regex(r"[0-9]+")] Int,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")] Float,
    #[regex(r#""([^"\\\n\r]|\\.)*""#)] Str,
    #[regex(r"'([^'\\\n\r]|\\.)+'")] Chr,

    // Operators, multi-character first.
    #[token(">>>=")] AssignUshr,
    #[token(">>>")] Ushr,
    #[token(">>=")] AssignShr,
    #[token(">>")] Shr,
    #[token(">=")] Ge,
    #[token(">")] Gt,
    #[token("<<=")] AssignShl,
    #[token("<<")] Shl,
    #[token("<=")] Le,
    #[token("<")] Lt,
    #[token("...")] Ellipses,
    #[token("==")] Equals,
    #[token("=")] Assign,
    #[token("!=")] NotEquals,
    #[token("!")] Not,
    #[token("++")] Increment,
    #[token("+=")] AssignAdd,
    #[token("+")] Plus,
    #[token("--")] Decrement,
    #[token("-=")] AssignSub,
    #[token("-")] Minus,
    #[token("*=")] AssignMul,
    #[token("*")] Star,
    #[token("/=")] AssignDiv,
    #[token("/")] Slash,
    #[token("%=")] AssignMod,
    #[token("%")] Percent,
    #[token("&&")] And,
    #[token("&=")] AssignAnd,
    #[token("&")] BitAnd,
    #[token("||")] Or,
    #[token("|=")] AssignOr,
    #[token("|")] BitOr,
    #[token("^=")] AssignXor,
    #[token("^")] BitXor,
    #[token("~")] Tilde,
    #[token("?")] QMark,
    #[token(":")] Colon,
    #[token(";")] Semicolon,
    #[token(",")] Comma,
    #[token("(")] LParen,
    #[token(")")] RParen,
    #[token("{")] LBrace,
    #[token("}")] RBrace,
    #[token("[")] LBracket,
    #[token("]")] RBracket,
}

fn keyword_kind(raw: RawTok) -> TokenKind {
    use RawTok::*;
    match raw {
        KwBool => TokenKind::Bool,
        KwBreak => TokenKind::Break,
        KwCase => TokenKind::Case,
        KwChar => TokenKind::Char,
        KwConst => TokenKind::Const,
        KwContinue => TokenKind::Continue,
        KwDecl => TokenKind::Decl,
        KwDefault => TokenKind::Default,
        KwDo => TokenKind::Do,
        KwElse => TokenKind::Else,
        KwEnum => TokenKind::Enum,
        KwFalse => TokenKind::False,
        KwFloat => TokenKind::Float,
        KwFor => TokenKind::For,
        KwForward => TokenKind::Forward,
        KwFunctag => TokenKind::Functag,
        KwFunction => TokenKind::Function,
        KwIf => TokenKind::If,
        KwInt => TokenKind::Int,
        KwMethodmap => TokenKind::Methodmap,
        KwNative => TokenKind::Native,
        KwNew => TokenKind::New,
        KwNullable => TokenKind::Nullable,
        KwObject => TokenKind::Object,
        KwProperty => TokenKind::Property,
        KwPublic => TokenKind::Public,
        KwReturn => TokenKind::Return,
        KwSizeof => TokenKind::Sizeof,
        KwStatic => TokenKind::Static,
        KwStock => TokenKind::Stock,
        KwStruct => TokenKind::Struct,
        KwSwitch => TokenKind::Switch,
        KwThis => TokenKind::This,
        KwTrue => TokenKind::True,
        KwTypedef => TokenKind::Typedef,
        KwUnion => TokenKind::Union,
        KwVoid => TokenKind::Void,
        KwWhile => TokenKind::While,
        Ident => TokenKind::Name,
        Hex => TokenKind::HexLiteral,
        Int => TokenKind::IntLiteral,
        Float => TokenKind::FloatLiteral,
        Str => TokenKind::StringLiteral,
        Chr => TokenKind::CharLiteral,
        AssignUshr => TokenKind::AssignUshr,
        Ushr => TokenKind::Ushr,
        AssignShr => TokenKind::AssignShr,
        Shr => TokenKind::Shr,
        Ge => TokenKind::Ge,
        Gt => TokenKind::Gt,
        AssignShl => TokenKind::AssignShl,
        Shl => TokenKind::Shl,
        Le => TokenKind::Le,
        Lt => TokenKind::Lt,
        Ellipses => TokenKind::Ellipses,
        Equals => TokenKind::Equals,
        Assign => TokenKind::Assign,
        NotEquals => TokenKind::NotEquals,
        Not => TokenKind::Not,
        Increment => TokenKind::Increment,
        AssignAdd => TokenKind::AssignAdd,
        Plus => TokenKind::Plus,
        Decrement => TokenKind::Decrement,
        AssignSub => TokenKind::AssignSub,
        Minus => TokenKind::Minus,
        AssignMul => TokenKind::AssignMul,
        Star => TokenKind::Star,
        AssignDiv => TokenKind::AssignDiv,
        Slash => TokenKind::Slash,
        AssignMod => TokenKind::AssignMod,
        Percent => TokenKind::Percent,
        And => TokenKind::And,
        AssignAnd => TokenKind::AssignAnd,
        BitAnd => TokenKind::BitAnd,
        Or => TokenKind::Or,
        AssignOr => TokenKind::AssignOr,
        BitOr => TokenKind::BitOr,
        AssignXor => TokenKind::AssignXor,
        BitXor => TokenKind::BitXor,
        Tilde => TokenKind::Tilde,
        QMark => TokenKind::QMark,
        Colon => TokenKind::Colon,
        Semicolon => TokenKind::Semicolon,
        Comma => TokenKind::Comma,
        LParen => TokenKind::LParen,
        RParen => TokenKind::RParen,
        LBrace => TokenKind::LBrace,
        RBrace => TokenKind::RBrace,
        LBracket => TokenKind::LBracket,
        RBracket => TokenKind::RBracket,
        _LineComment | _BlockComment => TokenKind::Unknown,
    }
}

fn unescape(text: &str) -> Result<String, LexErrorKind> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('x') => {
                let hi = chars.next().and_then(|c| c.to_digit(16));
                let lo = chars.next().and_then(|c| c.to_digit(16));
                match (hi, lo) {
                    (Some(h), Some(l)) => out.push((h * 16 + l) as u8 as char),
                    _ => return Err(LexErrorKind::InvalidEscape),
                }
            }
            _ => return Err(LexErrorKind::InvalidEscape),
        }
    }
    Ok(out)
}

/// Tokenizes `src` in one pass, interning names and string literals.
///
/// Line numbers are 1-based and derived from byte offsets so that comments
/// spanning lines keep the count correct.
pub fn tokenize(src: &str, interner: &mut Interner) -> (Vec<Token>, Vec<Diag>) {
    let line_starts: Vec<u32> = std::iter::once(0)
        .chain(
            src.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| (i + 1) as u32),
        )
        .collect();
    let line_of = |offset: u32| -> u32 {
        (line_starts.partition_point(|&s| s <= offset)) as u32 // 1-based
    };

    let mut tokens = Vec::new();
    let mut diags = Vec::new();

    let mut lexer = RawTok::lexer(src);
    while let Some(item) = lexer.next() {
        let span = Span::from_range(lexer.span());
        let line = line_of(span.start);
        let text = lexer.slice();

        let raw = match item {
            Ok(raw) => raw,
            Err(kind) => {
                diags.push(Diag {
                    kind: DiagKind::Lex,
                    span,
                    message: kind.to_string(),
                });
                tokens.push(Token::new(TokenKind::Unknown, span, line));
                continue;
            }
        };

        if matches!(raw, RawTok::_LineComment | RawTok::_BlockComment) {
            continue;
        }

        let kind = keyword_kind(raw);
        let mut token = Token::new(kind, span, line);
        match kind {
            TokenKind::Name => {
                token.payload = TokenPayload::Atom(interner.intern(text));
            }
            TokenKind::IntLiteral => match text.parse::<i64>() {
                Ok(v) => token.payload = TokenPayload::Int(v),
                Err(_) => diags.push(Diag {
                    kind: DiagKind::Lex,
                    span,
                    message: LexErrorKind::InvalidNumber.to_string(),
                }),
            },
            TokenKind::HexLiteral => match i64::from_str_radix(&text[2..], 16) {
                Ok(v) => token.payload = TokenPayload::Int(v),
                Err(_) => diags.push(Diag {
                    kind: DiagKind::Lex,
                    span,
                    message: LexErrorKind::InvalidNumber.to_string(),
                }),
            },
            TokenKind::FloatLiteral => match text.parse::<f64>() {
                Ok(v) => token.payload = TokenPayload::Float(v),
                Err(_) => diags.push(Diag {
                    kind: DiagKind::Lex,
                    span,
                    message: LexErrorKind::InvalidNumber.to_string(),
                }),
            },
            TokenKind::StringLiteral => match unescape(&text[1..text.len() - 1]) {
                Ok(s) => token.payload = TokenPayload::Atom(interner.intern(&s)),
                Err(kind) => {
                    diags.push(Diag {
                        kind: DiagKind::Lex,
                        span,
                        message: kind.to_string(),
                    });
                    // Keep the raw text so downstream consumers still see a
                    // string payload.
                    token.payload = TokenPayload::Atom(interner.intern(&text[1..text.len() - 1]));
                }
            },
            TokenKind::CharLiteral => match unescape(&text[1..text.len() - 1]) {
                Ok(s) if s.chars().count() == 1 => {
                    token.payload = TokenPayload::Char(s.chars().next().unwrap());
                }
                _ => diags.push(Diag {
                    kind: DiagKind::Lex,
                    span,
                    message: LexErrorKind::InvalidToken.to_string(),
                }),
            },
            _ => {}
        }
        tokens.push(token);
    }

    (tokens, diags)
}

// =============================================================================
// Buffered scanner
// =============================================================================

/// Token stream with the lookahead protocol the parser relies on.
///
/// Tokens are composed lazily from the raw stream into a replay buffer, so
/// `undo` is a cursor decrement and works to arbitrary depth (the
/// declaration disambiguator rewinds through several tokens). A replayed
/// token keeps the tag mode it was composed under; the parser only toggles
/// tag recognition at expression boundaries, where nothing is buffered.
#[derive(Debug)]
pub struct Scanner {
    toks: Vec<Token>,
    raw_pos: usize,
    composed: Vec<Token>,
    cursor: usize,
    allow_tags: bool,
    require_semicolons: bool,
}

impl Scanner {
    pub fn new(toks: Vec<Token>) -> Self {
        Self {
            toks,
            raw_pos: 0,
            composed: Vec::new(),
            cursor: 0,
            allow_tags: true,
            require_semicolons: false,
        }
    }

    /// Strict-terminator dialect: statements must end in `;`.
    pub fn set_require_semicolons(&mut self, on: bool) {
        self.require_semicolons = on;
    }

    pub fn require_semicolons(&self) -> bool {
        self.require_semicolons
    }

    /// Toggles label-token composition; returns the previous setting so the
    /// caller can restore it.
    pub fn set_allow_tags(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.allow_tags, on)
    }

    /// Composes the next raw token, merging `NAME ':'` into a label when
    /// tags are enabled and the colon is adjacent. Returns the token and how
    /// many raw tokens it covers (zero at end of input).
    fn compose_raw(&self) -> (Token, usize) {
        let Some(&tok) = self.toks.get(self.raw_pos) else {
            let mut eof = Token::synthetic(TokenKind::Eof);
            eof.line = self.toks.last().map_or(1, |t| t.line);
            eof.span = self
                .toks
                .last()
                .map_or(Span::default(), |t| Span::empty_at(t.span.end as usize));
            return (eof, 0);
        };

        if tok.kind == TokenKind::Name && self.allow_tags {
            if let Some(colon) = self.toks.get(self.raw_pos + 1) {
                if colon.kind == TokenKind::Colon && colon.span.start == tok.span.end {
                    let mut label = tok;
                    label.kind = TokenKind::Label;
                    label.span = Span {
                        start: tok.span.start,
                        end: colon.span.end,
                    };
                    return (label, 2);
                }
            }
        }

        (tok, 1)
    }

    fn ensure_composed(&mut self) {
        while self.composed.len() <= self.cursor {
            let (tok, consumed) = self.compose_raw();
            self.raw_pos += consumed;
            self.composed.push(tok);
        }
    }

    fn peek_token(&mut self) -> Token {
        self.ensure_composed();
        self.composed[self.cursor]
    }

    /// Next token kind without consuming.
    pub fn peek(&mut self) -> TokenKind {
        self.peek_token().kind
    }

    /// Advances and returns the new current token's kind.
    pub fn next(&mut self) -> TokenKind {
        self.ensure_composed();
        let tok = self.composed[self.cursor];
        self.cursor += 1;
        tok.kind
    }

    /// Rewinds exactly one token; the rewound token is re-delivered by the
    /// next `next()`. May be applied repeatedly.
    pub fn undo(&mut self) {
        debug_assert!(self.cursor > 0, "undo past the beginning");
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Pushes a saved token to be re-delivered before the rest of the
    /// stream.
    pub fn push_back(&mut self, tok: Token) {
        self.composed.insert(self.cursor, tok);
    }

    /// Most recently consumed token.
    pub fn current(&self) -> &Token {
        static UNKNOWN: Token = Token {
            kind: TokenKind::Unknown,
            span: Span { start: 0, end: 0 },
            line: 0,
            payload: TokenPayload::None,
        };
        if self.cursor == 0 {
            &UNKNOWN
        } else {
            &self.composed[self.cursor - 1]
        }
    }

    /// Interned name of the current token (names, labels, strings).
    pub fn current_name(&self) -> crate::ast::Atom {
        self.current()
            .atom()
            .expect("current token carries no name payload")
    }

    /// Source location of the current token.
    pub fn begin(&self) -> Span {
        self.current().span
    }

    /// Next token's kind if it sits on the current line, else a synthetic
    /// end-of-line (end-of-file wins over both).
    pub fn peek_token_same_line(&mut self) -> TokenKind {
        let line = self.current().line;
        let tok = self.peek_token();
        if tok.kind == TokenKind::Eof {
            return TokenKind::Eof;
        }
        if tok.line == line {
            tok.kind
        } else {
            TokenKind::Eol
        }
    }

    /// Opaque cursor state; equal values mean the scanner has not moved.
    /// Used by the top-level recovery loop to guarantee forward progress.
    pub fn progress(&self) -> (usize, usize) {
        (self.cursor, self.composed.len())
    }

    /// Discards tokens to the end of the current line (error recovery).
    pub fn eat_rest_of_line(&mut self) {
        loop {
            match self.peek_token_same_line() {
                TokenKind::Eof | TokenKind::Eol => break,
                _ => {
                    self.next();
                }
            }
        }
    }
}
