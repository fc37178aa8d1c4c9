use thiserror::Error;

/// Compact byte-span used across the compiler.
///
/// The scanner produces `usize` offsets; we convert to `u32` for compactness.
/// If you need >4GiB inputs, change to `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32, // exclusive
}

impl Span {
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        // Production choice: clamp rather than panic.
        let s = if start > u32::MAX as usize {
            u32::MAX
        } else {
            start as u32
        };
        let e = if end > u32::MAX as usize {
            u32::MAX
        } else {
            end as u32
        };
        Self { start: s, end: e }
    }

    #[inline]
    pub const fn empty_at(pos: usize) -> Self {
        let p = if pos > u32::MAX as usize {
            u32::MAX
        } else {
            pos as u32
        };
        Self { start: p, end: p }
    }

    pub const fn from_range(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }

    #[inline]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One diagnostic code per user-visible condition. The display string is the
/// canonical message; tests match on the variant, not the text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Message {
    #[error("expected token {expected}, but got {got}")]
    WrongToken {
        expected: &'static str,
        got: &'static str,
    },

    #[error("'const' may not be specified twice")]
    ConstSpecifiedTwice,

    #[error("relational operators cannot be chained")]
    NoChainedRelationalOps,

    #[error("switch statements may have only one 'default' case")]
    OneDefaultPerSwitch,

    #[error("the 'default' case must be the last case in a switch")]
    DefaultMustBeLastCase,

    #[error("each switch case may have only one statement")]
    SingleStatementPerCase,

    #[error("type keywords may not be used in old-style declarations")]
    NewStyleBadKeyword,

    #[error("old-style declarations are not allowed here; use a new-style type")]
    NewDeclsRequired,

    #[error("type '{name}' is deprecated; use '{replacement}' instead")]
    TypeIsDeprecated {
        name: &'static str,
        replacement: &'static str,
    },

    #[error("{what} types cannot be passed by reference")]
    TypeCannotBeReference { what: &'static str },

    #[error("fixed array dimensions may not appear before the name")]
    FixedArrayInPrefix,

    #[error("array dimensions may only be specified once")]
    DoubleArrayDims,

    #[error("expected a type expression")]
    ExpectedTypeExpr,

    #[error("expected an expression, but got {got}")]
    ExpectedExpression { got: &'static str },

    #[error("expected a global declaration")]
    ExpectedGlobal,

    #[error("expected a method or property")]
    ExpectedLayoutMember,

    #[error("property members must be named 'get' or 'set'")]
    InvalidAccessorName,

    #[error("accessor '{name}' was already declared")]
    AccessorRedeclared { name: String },

    #[error("variable declarations must be inside a block")]
    VariableMustBeInBlock,

    #[error("a parameter list may have only one variadic parameter")]
    MultipleVarargs,

    #[error("'functag' is no longer supported; use 'typedef'")]
    FunctagsNotSupported,

    #[error("expected a newline or ';'")]
    ExpectedNewlineOrSemi,

    #[error("expected a newline")]
    ExpectedNewline,
}

/// Whether a diagnostic came out of the raw tokenizer or the parser proper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    Lex,
    Parse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    pub kind: DiagKind,
    pub span: Span,
    pub message: String,
}

/// Collects diagnostics without unwinding. Every parse production reports
/// here and returns a sentinel; nothing in the front-end panics on bad input.
#[derive(Debug, Default)]
pub struct Reporter {
    diags: Vec<Diag>,
    codes: Vec<Message>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, span: Span, message: Message) {
        self.diags.push(Diag {
            kind: DiagKind::Parse,
            span,
            message: message.to_string(),
        });
        self.codes.push(message);
    }

    pub fn report_lex(&mut self, span: Span, message: String) {
        self.diags.push(Diag {
            kind: DiagKind::Lex,
            span,
            message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn diags(&self) -> &[Diag] {
        &self.diags
    }

    /// Structured codes for the parse diagnostics, in report order.
    pub fn codes(&self) -> &[Message] {
        &self.codes
    }

    pub fn into_parts(self) -> (Vec<Diag>, Vec<Message>) {
        (self.diags, self.codes)
    }
}

/// Parse failure: diagnostics plus whatever partial tree was recovered.
#[derive(Debug)]
pub struct ParseFailure {
    pub partial: Option<crate::ast::ParseTree>,
    pub diags: Vec<Diag>,
    pub codes: Vec<Message>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid numeric literal")]
    InvalidNumber,
    #[error("invalid escape")]
    InvalidEscape,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unterminated comment")]
    UnterminatedComment,
}

impl Default for LexErrorKind {
    #[inline]
    fn default() -> Self {
        LexErrorKind::InvalidToken
    }
}
