//! Shell lexer.
//!
//! The lexer runs in one of two modes.  In expression mode it produces
//! literals, identifiers, keywords and operators.  At the start of a
//! statement it peeks at the raw text and, when the line looks like a
//! command (`ls -l`, `./build.sh`, `cat f | wc`), switches to command mode,
//! where input is split into whitespace-delimited [`Word`]s until the end of
//! the statement.
//!
//! Tokens are produced lazily through [`Iterator`]; the stream ends with one
//! [`TokenKind::Eof`] token.  [`Lexer::restart_at`] rewinds to the start of
//! any token already produced.

use std::fmt;

use super::error::{Error, Position, Result};

// ── Token ─────────────────────────────────────────────────────────────────────

/// One piece of a command word.
#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    Lit(String),
    /// `$name` or `${name}`
    Var(String),
}

/// A command word: literal text interleaved with variable references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Word(pub Vec<WordPart>);

impl Word {
    pub fn literal(s: impl Into<String>) -> Self {
        Word(vec![WordPart::Lit(s.into())])
    }

    /// The word's text if it has no variable references.
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.0 {
            match part {
                WordPart::Lit(s) => out.push_str(s),
                WordPart::Var(_) => return None,
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Num(f64),
    Str(String),
    Ident(String),
    Word(Word),

    // Keywords
    Fn,
    Return,
    Global,
    Exit,
    If,
    Else,
    While,

    // Punctuation
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Semi,
    Newline,

    // Operators
    Assign,
    Pipe,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,

    Eof,
}

impl TokenKind {
    fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "fn" => TokenKind::Fn,
            "return" => TokenKind::Return,
            "global" => TokenKind::Global,
            "exit" => TokenKind::Exit,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            _ => return None,
        })
    }
}

/// A lexed token: kind, the exact source text, and where it started.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Position,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

impl Token {
    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Eof => super::error::END_OF_INPUT.to_owned(),
            TokenKind::Newline => "newline".to_owned(),
            TokenKind::Int(_) | TokenKind::Num(_) => format!("number `{}`", self.text),
            TokenKind::Str(_) => format!("string {}", self.text),
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Word(_) => format!("word `{}`", self.text),
            _ => format!("`{}`", self.text),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    Expr,
    Command,
}

pub struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
    mode: LexMode,
    /// Next token begins a statement (command detection applies).
    stmt_start: bool,
    /// Last command-mode token was `|`; newlines are skipped.
    after_pipe: bool,
    /// Open brackets; newlines are insignificant inside `(` and `[`.
    nesting: Vec<char>,
    finished: bool,
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether the raw text following a statement-initial identifier makes the
/// statement a command.
///
/// `after` starts right after the identifier.  Commands are recognised by a
/// pipe, or by whitespace followed by something that cannot continue an
/// expression (a word, a quote, `$`, a path, or a flag such as `-l`).
pub fn command_follows(after: &str) -> bool {
    let mut chars = after.chars();
    match chars.next() {
        Some('.') => return true,
        Some('|') => return chars.next() != Some('|'),
        Some(' ' | '\t') => {}
        _ => return false,
    }
    let rest = after.trim_start_matches([' ', '\t']);
    let mut chars = rest.chars();
    match chars.next() {
        Some('|') => chars.next() != Some('|'),
        Some('"' | '\'' | '$' | '.' | '~') => true,
        Some('-' | '+' | '*' | '/') => {
            matches!(chars.next(), Some(n) if !n.is_whitespace() && n != '=')
        }
        Some(c) => c.is_alphanumeric() || c == '_',
        None => false,
    }
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            offset: 0,
            line: 1,
            column: 1,
            mode: LexMode::Expr,
            stmt_start: true,
            after_pipe: false,
            nesting: Vec::new(),
            finished: false,
        }
    }

    pub fn mode(&self) -> LexMode {
        self.mode
    }

    pub fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rewind to the start of `token` and lex from there in expression mode.
    pub fn restart_at(&mut self, token: &Token) {
        self.offset = token.offset;
        self.line = token.pos.line;
        self.column = token.pos.column;
        self.mode = LexMode::Expr;
        self.stmt_start = false;
        self.after_pipe = false;
        self.finished = false;
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.offset..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn token(&self, kind: TokenKind, start: usize, pos: Position) -> Token {
        Token {
            kind,
            text: self.src[start..self.offset].to_owned(),
            pos,
            offset: start,
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        match self.mode {
            LexMode::Expr => self.expr_token(),
            LexMode::Command => self.command_token(),
        }
    }

    /// Raw-text check for a command at the current offset.
    fn starts_command(&self) -> bool {
        let rest = &self.src[self.offset..];
        match rest.chars().next() {
            Some('.' | '/' | '~') => true,
            Some(c) if is_ident_start(c) => {
                let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
                TokenKind::keyword(&rest[..end]).is_none() && command_follows(&rest[end..])
            }
            _ => false,
        }
    }

    // ── Expression mode ───────────────────────────────────────────────────────

    fn skip_blanks(&mut self) {
        let in_brackets = matches!(self.nesting.last(), Some('(' | '['));
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' if in_brackets => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                _ => break,
            }
        }
    }

    fn expr_token(&mut self) -> Result<Token> {
        self.skip_blanks();
        let start = self.offset;
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, start, pos));
        };

        if std::mem::take(&mut self.stmt_start) {
            if self.starts_command() {
                self.mode = LexMode::Command;
                return self.command_token();
            }
            if c == '!' && self.peek_nth(1) != Some('=') {
                self.bump();
                self.mode = LexMode::Command;
                return Ok(self.token(TokenKind::Bang, start, pos));
            }
        }

        self.bump();
        let kind = match c {
            '0'..='9' => self.number(start, pos)?,
            '"' => TokenKind::Str(self.quoted(pos)?),
            '\'' => TokenKind::Str(self.raw_quoted(pos)?),
            c if is_ident_start(c) => {
                while self.peek().is_some_and(is_ident_char) {
                    self.bump();
                }
                let ident = &self.src[start..self.offset];
                TokenKind::keyword(ident).unwrap_or_else(|| TokenKind::Ident(ident.to_owned()))
            }
            '\n' => {
                self.stmt_start = true;
                TokenKind::Newline
            }
            ';' => {
                self.stmt_start = true;
                TokenKind::Semi
            }
            '(' | '[' => {
                self.nesting.push(c);
                if c == '(' {
                    TokenKind::LParen
                } else {
                    TokenKind::LBracket
                }
            }
            ')' | ']' => {
                self.nesting.pop();
                if c == ')' {
                    TokenKind::RParen
                } else {
                    TokenKind::RBracket
                }
            }
            '{' => {
                self.nesting.push('{');
                self.stmt_start = true;
                TokenKind::LBrace
            }
            '}' => {
                self.nesting.pop();
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => self.pick('=', TokenKind::Eq, TokenKind::Assign),
            '!' => self.pick('=', TokenKind::Ne, TokenKind::Bang),
            '<' => self.pick('=', TokenKind::Le, TokenKind::Lt),
            '>' => self.pick('=', TokenKind::Ge, TokenKind::Gt),
            '|' => self.pick('|', TokenKind::Or, TokenKind::Pipe),
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    TokenKind::And
                } else {
                    return Err(Error::lex(pos, "unexpected character `&` (did you mean `&&`?)"));
                }
            }
            other => return Err(Error::lex(pos, format!("unexpected character `{other}`"))),
        };
        Ok(self.token(kind, start, pos))
    }

    /// Two-character operator if the next char is `second`.
    fn pick(&mut self, second: char, double: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek() == Some(second) {
            self.bump();
            double
        } else {
            single
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn number(&mut self, start: usize, pos: Position) -> Result<TokenKind> {
        let malformed = |lexer: &Self| {
            let end = lexer.src[lexer.offset..]
                .find(|c: char| !(is_ident_char(c) || c == '.'))
                .map_or(lexer.src.len(), |i| lexer.offset + i);
            Error::lex(pos, format!("malformed numeric literal `{}`", &lexer.src[start..end]))
        };

        self.digits();
        let mut float = false;
        if self.peek() == Some('.') {
            if !self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                return Err(malformed(self));
            }
            self.bump();
            self.digits();
            float = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(malformed(self));
            }
            self.digits();
            float = true;
        }
        if self.peek().is_some_and(|c| is_ident_char(c) || c == '.') {
            return Err(malformed(self));
        }

        let text = &self.src[start..self.offset];
        if float {
            text.parse::<f64>()
                .map(TokenKind::Num)
                .map_err(|_| malformed(self))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| Error::lex(pos, format!("integer literal `{text}` out of range")))
        }
    }

    /// Escape after a backslash inside `"..."`.  The backslash is consumed.
    fn escape(&mut self, at: Position) -> Result<char> {
        Ok(match self.bump() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some(c @ ('\\' | '"' | '\'' | '$')) => c,
            Some(c) => return Err(Error::lex(at, format!("invalid escape sequence `\\{c}`"))),
            None => return Err(Error::lex(at, "unterminated string literal")),
        })
    }

    /// Body of a `"..."` literal; the opening quote at `open` is consumed.
    fn quoted(&mut self, open: Position) -> Result<String> {
        let mut s = String::new();
        loop {
            let at = self.pos();
            match self.bump() {
                None => return Err(Error::lex(open, "unterminated string literal")),
                Some('"') => return Ok(s),
                Some('\\') => s.push(self.escape(at)?),
                Some(c) => s.push(c),
            }
        }
    }

    fn raw_quoted(&mut self, open: Position) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(Error::lex(open, "unterminated string literal")),
                Some('\'') => return Ok(s),
                Some(c) => s.push(c),
            }
        }
    }

    // ── Command mode ──────────────────────────────────────────────────────────

    fn command_token(&mut self) -> Result<Token> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                }
                Some('\n') if self.after_pipe => {
                    self.bump();
                }
                Some('#') => self.skip_comment(),
                _ => break,
            }
        }
        let start = self.offset;
        let pos = self.pos();
        let kind = match self.peek() {
            None => {
                self.mode = LexMode::Expr;
                TokenKind::Eof
            }
            Some(c @ ('\n' | ';')) => {
                self.bump();
                self.mode = LexMode::Expr;
                self.stmt_start = true;
                if c == '\n' {
                    TokenKind::Newline
                } else {
                    TokenKind::Semi
                }
            }
            Some('}') => {
                self.bump();
                self.nesting.pop();
                self.mode = LexMode::Expr;
                TokenKind::RBrace
            }
            Some('|') => {
                self.bump();
                self.after_pipe = true;
                TokenKind::Pipe
            }
            Some(_) => {
                self.after_pipe = false;
                TokenKind::Word(self.word()?)
            }
        };
        Ok(self.token(kind, start, pos))
    }

    fn word(&mut self) -> Result<Word> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        while let Some(c) = self.peek() {
            let at = self.pos();
            match c {
                ' ' | '\t' | '\r' | '\n' | '|' | ';' | '}' => break,
                '\'' => {
                    self.bump();
                    lit.push_str(&self.raw_quoted(at)?);
                }
                '"' => {
                    self.bump();
                    self.quoted_word(at, &mut parts, &mut lit)?;
                }
                '\\' => {
                    self.bump();
                    match self.bump() {
                        Some(escaped) => lit.push(escaped),
                        None => return Err(Error::lex(at, "dangling `\\` at end of input")),
                    }
                }
                '$' => match self.var_ref(at)? {
                    Some(name) => {
                        if !lit.is_empty() {
                            parts.push(WordPart::Lit(std::mem::take(&mut lit)));
                        }
                        parts.push(WordPart::Var(name));
                    }
                    None => lit.push('$'),
                },
                _ => {
                    self.bump();
                    lit.push(c);
                }
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(WordPart::Lit(lit));
        }
        Ok(Word(parts))
    }

    /// Double-quoted section of a command word: escapes and `$name` apply.
    fn quoted_word(&mut self, open: Position, parts: &mut Vec<WordPart>, lit: &mut String) -> Result<()> {
        loop {
            let at = self.pos();
            match self.peek() {
                None => return Err(Error::lex(open, "unterminated string literal")),
                Some('"') => {
                    self.bump();
                    return Ok(());
                }
                Some('\\') => {
                    self.bump();
                    lit.push(self.escape(at)?);
                }
                Some('$') => match self.var_ref(at)? {
                    Some(name) => {
                        if !lit.is_empty() {
                            parts.push(WordPart::Lit(std::mem::take(lit)));
                        }
                        parts.push(WordPart::Var(name));
                    }
                    None => lit.push('$'),
                },
                Some(c) => {
                    self.bump();
                    lit.push(c);
                }
            }
        }
    }

    /// `$name` or `${name}` at the cursor.  Consumes the `$` in every case;
    /// `None` means the `$` was not followed by a name.
    fn var_ref(&mut self, at: Position) -> Result<Option<String>> {
        self.bump();
        let braced = self.peek() == Some('{');
        if braced {
            self.bump();
        }
        let start = self.offset;
        if self.peek().is_some_and(is_ident_start) {
            while self.peek().is_some_and(is_ident_char) {
                self.bump();
            }
        }
        let name = self.src[start..self.offset].to_owned();
        if braced {
            if name.is_empty() || self.peek() != Some('}') {
                return Err(Error::lex(at, "malformed `${...}` variable reference"));
            }
            self.bump();
        }
        Ok(if name.is_empty() { None } else { Some(name) })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tok = self.next_token();
        self.finished = match &tok {
            Ok(t) => t.kind == TokenKind::Eof,
            Err(_) => true,
        };
        Some(tok)
    }
}

/// Lex all of `src` eagerly.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
