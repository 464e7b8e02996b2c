//! Statement and expression parser.
//!
//! Recursive descent over the lazy token stream from [`Lexer`], with a small
//! lookahead buffer.  Expression precedence (lowest → highest):
//!   `||`  →  `&&`  →  comparison  →  additive  →  multiplicative  →
//!   unary  →  postfix (`[i]`, `(args)`)  →  primary
//!
//! Assignment is a statement, not an expression: `target = expr` ends at
//! the end of its right-hand side, so `x = 1 | wc` is rejected rather than
//! piped.
//!
//! Syntax trees are at most [`MAX_NESTING`] levels deep.  Brackets, blocks,
//! unary operators and each link of an operator chain count as a level;
//! deeper input is a parse error.

use std::collections::VecDeque;
use std::rc::Rc;

use super::error::{Error, Position, Result};
use super::lexer::{Lexer, Token, TokenKind, Word};
use super::stack::ensure_sufficient_stack;
use super::value::Value;

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Anonymous `fn (params) { ... }`
    Lambda(Rc<FnDecl>),
}

/// Parameter list and body shared by named and anonymous functions.
#[derive(Debug)]
pub struct FnDecl {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FnBody,
}

#[derive(Debug)]
pub enum FnBody {
    Block(Vec<Stmt>),
    /// Short form `f(n) = expr`
    Expr(Expr),
}

/// Left-hand side of an assignment: a variable plus zero or more subscripts.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub path: Vec<Expr>,
}

/// One stage of a pipeline; the first word is the program.
#[derive(Debug, Clone)]
pub struct CommandStage {
    pub words: Vec<Word>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign(Target, Expr),
    FnDef(Rc<FnDecl>),
    Pipeline(Vec<CommandStage>),
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Exit(Option<Expr>),
    Global(Vec<String>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest syntax tree a single input may produce.
pub const MAX_NESTING: usize = 1000;

/// Parse a complete input (one or more statements).
pub fn parse_program(src: &str) -> Result<Vec<Stmt>> {
    Parser::new(src).program()
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: VecDeque<Token>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(src),
            lookahead: VecDeque::new(),
            depth: 0,
        }
    }

    fn fill(&mut self, n: usize) -> Result<()> {
        while self.lookahead.len() < n {
            let tok = match self.lexer.next() {
                Some(tok) => tok?,
                None => Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    pos: self.lexer.pos(),
                    offset: self.lexer.offset(),
                },
            };
            self.lookahead.push_back(tok);
        }
        Ok(())
    }

    fn peek(&mut self) -> Result<&Token> {
        self.peek_nth(0)
    }

    fn peek_nth(&mut self, n: usize) -> Result<&Token> {
        self.fill(n + 1)?;
        Ok(&self.lookahead[n])
    }

    fn peek_kind(&mut self) -> Result<&TokenKind> {
        Ok(&self.peek()?.kind)
    }

    fn advance(&mut self) -> Result<Token> {
        self.fill(1)?;
        self.lookahead.pop_front().ok_or_else(|| Error::runtime("token buffer empty"))
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.peek_kind()? == kind {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn unexpected(&mut self, expected: &str) -> Error {
        match self.peek() {
            Ok(tok) => Error::parse(tok.pos, expected, tok.describe()),
            Err(e) => e,
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token> {
        if self.peek_kind()? == kind {
            self.advance()
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Go one level deeper, or fail once the tree would exceed [`MAX_NESTING`].
    fn deepen(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            let pos = self.peek()?.pos;
            return Err(Error::parse(
                pos,
                format!("at most {MAX_NESTING} levels of nesting"),
                "deeper nesting",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a recursive production one level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.deepen()?;
        let result = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    fn skip_newlines(&mut self) -> Result<()> {
        while self.eat(&TokenKind::Newline)? {}
        Ok(())
    }

    fn skip_separators(&mut self) -> Result<()> {
        while matches!(self.peek_kind()?, TokenKind::Newline | TokenKind::Semi) {
            self.advance()?;
        }
        Ok(())
    }

    fn at_statement_end(&mut self) -> Result<bool> {
        Ok(matches!(
            self.peek_kind()?,
            TokenKind::Newline | TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
        ))
    }

    // ── Statements ────────────────────────────────────────────────────────────

    pub fn program(&mut self) -> Result<Vec<Stmt>> {
        self.statements(false)
    }

    fn statements(&mut self, in_block: bool) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators()?;
            match self.peek_kind()? {
                TokenKind::Eof if !in_block => break,
                TokenKind::Eof => return Err(self.unexpected("`}`")),
                TokenKind::RBrace if in_block => break,
                _ => {}
            }
            stmts.push(self.statement()?);
            match self.peek_kind()? {
                TokenKind::Newline | TokenKind::Semi | TokenKind::Eof => {}
                TokenKind::RBrace if in_block => {}
                _ => return Err(self.unexpected("end of statement")),
            }
        }
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let stmts = self.nested(|p| p.statements(true))?;
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt> {
        let named_fn = self.peek_kind()? == &TokenKind::Fn
            && matches!(self.peek_nth(1)?.kind, TokenKind::Ident(_));
        if named_fn {
            self.advance()?;
            let name = self.ident("function name")?;
            let params = self.params()?;
            let body = FnBody::Block(self.block()?);
            return Ok(Stmt::FnDef(Rc::new(FnDecl {
                name: Some(name),
                params,
                body,
            })));
        }
        match self.peek_kind()? {
            TokenKind::Return => {
                self.advance()?;
                let value = if self.at_statement_end()? { None } else { Some(self.expr()?) };
                Ok(Stmt::Return(value))
            }
            TokenKind::Exit => {
                self.advance()?;
                let code = if self.at_statement_end()? { None } else { Some(self.expr()?) };
                Ok(Stmt::Exit(code))
            }
            TokenKind::Global => {
                self.advance()?;
                let mut names = vec![self.ident("variable name")?];
                while self.eat(&TokenKind::Comma)? {
                    names.push(self.ident("variable name")?);
                }
                Ok(Stmt::Global(names))
            }
            TokenKind::If => self.if_stmt(),
            TokenKind::While => {
                self.advance()?;
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            TokenKind::Bang | TokenKind::Word(_) => self.pipeline(),
            _ => self.expr_or_assign(),
        }
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        self.expect(&TokenKind::If, "`if`")?;
        let cond = self.expr()?;
        let then_block = self.block()?;
        let else_block = if self.eat(&TokenKind::Else)? {
            if self.peek_kind()? == &TokenKind::If {
                Some(vec![self.nested(Self::if_stmt)?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn expr_or_assign(&mut self) -> Result<Stmt> {
        let start = self.peek()?.pos;
        let lhs = self.expr()?;
        if !self.eat(&TokenKind::Assign)? {
            return Ok(Stmt::Expr(lhs));
        }
        let rhs = self.expr()?;
        match lhs {
            Expr::Call(callee, args) => {
                let Expr::Var(name) = *callee else {
                    return Err(Error::parse(start, "assignment target", "call expression"));
                };
                let mut params = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Expr::Var(p) => params.push(p),
                        _ => return Err(Error::parse(start, "parameter name", "expression")),
                    }
                }
                check_distinct(&params, start)?;
                Ok(Stmt::FnDef(Rc::new(FnDecl {
                    name: Some(name),
                    params,
                    body: FnBody::Expr(rhs),
                })))
            }
            other => Ok(Stmt::Assign(into_target(other, start)?, rhs)),
        }
    }

    fn pipeline(&mut self) -> Result<Stmt> {
        self.eat(&TokenKind::Bang)?;
        let mut stages = vec![self.stage("command")?];
        while self.eat(&TokenKind::Pipe)? {
            stages.push(self.stage("pipeline right-hand side")?);
        }
        Ok(Stmt::Pipeline(stages))
    }

    fn stage(&mut self, expected: &str) -> Result<CommandStage> {
        let mut words = Vec::new();
        while let TokenKind::Word(_) = self.peek_kind()? {
            if let TokenKind::Word(w) = self.advance()?.kind {
                words.push(w);
            }
        }
        if words.is_empty() {
            return Err(self.unexpected(expected));
        }
        Ok(CommandStage { words })
    }

    fn ident(&mut self, expected: &str) -> Result<String> {
        match self.peek_kind()? {
            TokenKind::Ident(_) => match self.advance()?.kind {
                TokenKind::Ident(name) => Ok(name),
                _ => Err(self.unexpected(expected)),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    fn params(&mut self) -> Result<Vec<String>> {
        let open = self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while self.peek_kind()? != &TokenKind::RParen {
            params.push(self.ident("parameter name")?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        check_distinct(&params, open.pos)?;
        Ok(params)
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    pub fn expr(&mut self) -> Result<Expr> {
        self.nested(Self::or)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        let mark = self.depth;
        while self.eat(&TokenKind::Or)? {
            self.deepen()?;
            let rhs = self.and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.comparison()?;
        let mark = self.depth;
        while self.eat(&TokenKind::And)? {
            self.deepen()?;
            let rhs = self.comparison()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.additive()?;
        let mark = self.depth;
        loop {
            let op = match self.peek_kind()? {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance()?;
            self.deepen()?;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        let mark = self.depth;
        loop {
            let op = match self.peek_kind()? {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance()?;
            self.deepen()?;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        let mark = self.depth;
        loop {
            let op = match self.peek_kind()? {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance()?;
            self.deepen()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek_kind()? {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.advance()?;
        Ok(Expr::Unary(op, Box::new(self.nested(Self::unary)?)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        let mark = self.depth;
        loop {
            if self.eat(&TokenKind::LBracket)? {
                self.deepen()?;
                let index = self.expr()?;
                self.expect(&TokenKind::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&TokenKind::LParen)? {
                self.deepen()?;
                let args = self.list(&TokenKind::RParen, "`)`")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                self.depth = mark;
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn list(&mut self, close: &TokenKind, expected: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while self.peek_kind()? != close {
            items.push(self.expr()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(close, expected)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr> {
        let kind = self.peek_kind()?.clone();
        let expr = match kind {
            TokenKind::Int(n) => Expr::Literal(Value::Integer(n)),
            TokenKind::Num(x) => Expr::Literal(Value::Number(x)),
            TokenKind::Str(s) => Expr::Literal(Value::String(s)),
            TokenKind::Ident(name) => Expr::Var(name),
            TokenKind::LParen => {
                self.advance()?;
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance()?;
                return Ok(Expr::Array(self.list(&TokenKind::RBracket, "`]`")?));
            }
            TokenKind::LBrace => return self.map_literal(),
            TokenKind::Fn => {
                self.advance()?;
                let params = self.params()?;
                let body = FnBody::Block(self.block()?);
                return Ok(Expr::Lambda(Rc::new(FnDecl {
                    name: None,
                    params,
                    body,
                })));
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance()?;
        Ok(expr)
    }

    fn map_literal(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut entries = Vec::new();
        loop {
            self.skip_newlines()?;
            if self.peek_kind()? == &TokenKind::RBrace {
                break;
            }
            let key = match self.peek_kind()?.clone() {
                TokenKind::Str(s) | TokenKind::Ident(s) => {
                    self.advance()?;
                    s
                }
                _ => return Err(self.unexpected("map key")),
            };
            self.skip_newlines()?;
            self.expect(&TokenKind::Colon, "`:`")?;
            self.skip_newlines()?;
            entries.push((key, self.expr()?));
            self.skip_newlines()?;
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.skip_newlines()?;
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(Expr::Map(entries))
    }
}

fn into_target(expr: Expr, pos: Position) -> Result<Target> {
    match expr {
        Expr::Var(name) => Ok(Target { name, path: Vec::new() }),
        Expr::Index(base, index) => {
            let mut target = into_target(*base, pos)?;
            target.path.push(*index);
            Ok(target)
        }
        _ => Err(Error::parse(pos, "assignment target", "expression")),
    }
}

fn check_distinct(params: &[String], pos: Position) -> Result<()> {
    for (i, p) in params.iter().enumerate() {
        if params[..i].contains(p) {
            return Err(Error::parse(
                pos,
                "distinct parameter names",
                format!("duplicate parameter `{p}`"),
            ));
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        parse_program(src).unwrap()
    }

    fn parse_err(src: &str) -> Error {
        parse_program(src).unwrap_err()
    }

    #[test]
    fn empty_program() {
        assert!(parse("").is_empty());
        assert!(parse("\n;\n# comment only\n").is_empty());
    }

    #[test]
    fn simple_assignment() {
        let stmts = parse("x = 5");
        assert!(matches!(
            &stmts[0],
            Stmt::Assign(Target { name, path }, Expr::Literal(Value::Integer(5)))
                if name == "x" && path.is_empty()
        ));
    }

    #[test]
    fn indexed_assignment() {
        let stmts = parse("m[\"k\"][0] = 1");
        let Stmt::Assign(target, _) = &stmts[0] else {
            panic!("expected assignment, got {stmts:?}");
        };
        assert_eq!(target.name, "m");
        assert_eq!(target.path.len(), 2);
    }

    #[test]
    fn short_function_definition() {
        let stmts = parse("f(n) = n");
        let Stmt::FnDef(decl) = &stmts[0] else {
            panic!("expected definition, got {stmts:?}");
        };
        assert_eq!(decl.name.as_deref(), Some("f"));
        assert_eq!(decl.params, vec!["n"]);
        assert!(matches!(decl.body, FnBody::Expr(Expr::Var(_))));
    }

    #[test]
    fn call_is_an_expression() {
        let stmts = parse("f(1, 2)");
        assert!(matches!(&stmts[0], Stmt::Expr(Expr::Call(_, args)) if args.len() == 2));
    }

    #[test]
    fn block_function_definition() {
        let stmts = parse("fn add(a, b) {\n  return a + b\n}");
        let Stmt::FnDef(decl) = &stmts[0] else {
            panic!("expected definition");
        };
        assert_eq!(decl.params, vec!["a", "b"]);
        assert!(matches!(&decl.body, FnBody::Block(b) if matches!(b[0], Stmt::Return(Some(_)))));
    }

    #[test]
    fn anonymous_function() {
        let stmts = parse("g = fn(x) { x * 2 }");
        assert!(matches!(&stmts[0], Stmt::Assign(_, Expr::Lambda(d)) if d.name.is_none()));
    }

    #[test]
    fn duplicate_parameters_rejected() {
        assert!(matches!(parse_err("fn f(a, a) { a }"), Error::Parse { .. }));
        assert!(matches!(parse_err("f(a, a) = a"), Error::Parse { .. }));
    }

    #[test]
    fn invalid_assignment_targets() {
        assert!(matches!(parse_err("1 = 2"), Error::Parse { .. }));
        assert!(matches!(parse_err("f(1) = 2"), Error::Parse { .. }));
        assert!(matches!(parse_err("(a + b) = 2"), Error::Parse { .. }));
    }

    #[test]
    fn precedence() {
        let stmts = parse("1 + 2 * 3 == 7 && !0");
        let Stmt::Expr(Expr::Binary(BinOp::And, lhs, rhs)) = &stmts[0] else {
            panic!("expected &&");
        };
        assert!(matches!(**lhs, Expr::Binary(BinOp::Eq, _, _)));
        assert!(matches!(**rhs, Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn array_and_map_literals_allow_trailing_commas() {
        let stmts = parse("[1, [2, 3], ]");
        assert!(matches!(&stmts[0], Stmt::Expr(Expr::Array(items)) if items.len() == 2));
        let stmts = parse("{a: 1, \"b c\": [2],\n}");
        let Stmt::Expr(Expr::Map(entries)) = &stmts[0] else {
            panic!("expected map");
        };
        assert_eq!(entries[0].0, "a");
        assert_eq!(entries[1].0, "b c");
    }

    #[test]
    fn multiline_map_literal() {
        let stmts = parse("m = {\n  a: 1,\n  b: 2\n}");
        assert!(matches!(&stmts[0], Stmt::Assign(_, Expr::Map(e)) if e.len() == 2));
    }

    #[test]
    fn pipelines() {
        let stmts = parse("ls -l | grep rs | wc -l");
        let Stmt::Pipeline(stages) = &stmts[0] else {
            panic!("expected pipeline");
        };
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].words[0], Word::literal("ls"));
        assert_eq!(stages[2].words.len(), 2);
    }

    #[test]
    fn missing_pipeline_rhs() {
        let err = parse_err("ls |");
        assert!(err.to_string().contains("pipeline right-hand side"));
        assert!(err.is_incomplete());
    }

    #[test]
    fn assignment_does_not_absorb_pipe() {
        let err = parse_err("x = 1 | wc");
        assert!(matches!(err, Error::Parse { ref expected, .. } if expected == "end of statement"));
    }

    #[test]
    fn unmatched_brackets() {
        assert!(parse_err("[1, 2").is_incomplete());
        assert!(parse_err("f(1").is_incomplete());
        assert!(!parse_err("[1, 2)").is_incomplete());
        assert!(parse_err("if x {").is_incomplete());
    }

    #[test]
    fn control_flow() {
        let stmts = parse("if a { 1 } else if b { 2 } else { 3 }\nwhile i < 3 { i = i + 1 }");
        assert!(matches!(&stmts[0], Stmt::If { else_block: Some(b), .. } if matches!(b[0], Stmt::If { .. })));
        assert!(matches!(&stmts[1], Stmt::While { body, .. } if body.len() == 1));
    }

    #[test]
    fn keywords_statements() {
        let stmts = parse("global a, b; exit; exit 2; return");
        assert!(matches!(&stmts[0], Stmt::Global(names) if names.len() == 2));
        assert!(matches!(&stmts[1], Stmt::Exit(None)));
        assert!(matches!(&stmts[2], Stmt::Exit(Some(_))));
        assert!(matches!(&stmts[3], Stmt::Return(None)));
    }

    #[test]
    fn statements_need_separators() {
        assert!(matches!(parse_err("1 2"), Error::Parse { .. }));
        assert_eq!(parse("1; 2\n3").len(), 3);
    }

    #[test]
    fn error_positions() {
        let err = parse_err("x = [1, 2]]");
        assert_eq!(err.position(), Some(Position::new(1, 11)));
    }

    #[test]
    fn deep_brackets_are_a_parse_error() {
        let src = format!("{}{}", "[".repeat(20_000), "]".repeat(20_000));
        let err = parse_err(&src);
        assert!(matches!(&err, Error::Parse { found, .. } if found == "deeper nesting"), "{err}");
        assert!(!err.is_incomplete());
    }

    #[test]
    fn moderate_nesting_parses() {
        let src = format!("x = {}1{}", "[".repeat(500), "]".repeat(500));
        assert_eq!(parse(&src).len(), 1);
        let src = format!("if a {{ {}1{} }}", "(".repeat(300), ")".repeat(300));
        assert_eq!(parse(&src).len(), 1);
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        assert_eq!(parse(&vec!["1"; 500].join(" + ")).len(), 1);
        assert!(matches!(parse_err(&vec!["1"; 5_000].join(" + ")), Error::Parse { .. }));
        assert!(matches!(parse_err(&format!("{}1", "-".repeat(5_000))), Error::Parse { .. }));
        assert!(matches!(parse_err(&format!("x{}", "[0]".repeat(5_000))), Error::Parse { .. }));
    }

    #[test]
    fn nesting_depth_resets_between_statements() {
        let line = format!("{}1{}", "[".repeat(600), "]".repeat(600));
        assert_eq!(parse(&[line.as_str(), line.as_str()].join("; ")).len(), 2);
    }
}
