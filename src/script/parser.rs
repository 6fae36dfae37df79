//! Recursive-descent parser for definition scripts.
//!
//! ```text
//! program  := (stmt? NEWLINE)*
//! stmt     := "fn" IDENT "(" params ")" "=" expr
//!           | "class" IDENT (":" IDENT ("," IDENT)*)? "{" item* "}"
//!           | "raise" expr
//! item     := "fn" IDENT "(" params ")" "=" expr | IDENT "=" expr
//! expr     := "set" "self" "." IDENT "=" expr | "raise" expr | sum
//! sum      := postfix ("+" postfix)*            (kept flat)
//! postfix  := primary ("." IDENT ("(" args ")")?)*
//! primary  := literal | IDENT ("(" args ")")? | "self" | "(" expr ")"
//! ```

use std::sync::Arc;

use thiserror::Error;

use super::ast::{ClassDef, ClassItem, ClassItemKind, Expr, FunctionDef, Literal, Program, Stmt, StmtKind};
use super::lexer::{Token, TokenKind, tokenize};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Deepest allowed nesting of parenthesized, argument and operand expressions.
pub const MAX_NESTING: usize = 64;

/// Member accesses allowed in one definition. Each one deepens the tree.
pub const MAX_MEMBER_ACCESSES: usize = 128;

/// Parse a whole script.
pub fn parse(text: &str) -> ParseResult<Program> {
    let tokens = tokenize(text)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    member_accesses: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            member_accesses: 0,
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Line of the current token, or of the last one at end of input.
    fn line(&self) -> usize {
        self.current()
            .or_else(|| self.tokens.last())
            .map_or(1, |token| token.line)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current().is_some_and(|token| &token.kind == kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = match self.current() {
            Some(token) => token.kind.describe(),
            None => "end of input".to_string(),
        };
        ParseError::new(format!("expected {expected}, found {found}"), self.line())
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> ParseResult<()> {
        if self.match_token(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> ParseResult<String> {
        match self.current().map(|token| &token.kind) {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.match_token(&TokenKind::Newline) {}
    }

    /// A statement must be followed by a newline, `}` or end of input.
    fn end_of_statement(&mut self, allow_brace: bool) -> ParseResult<()> {
        match self.current().map(|token| &token.kind) {
            None => Ok(()),
            Some(TokenKind::Newline) => {
                self.position += 1;
                Ok(())
            }
            Some(TokenKind::RBrace) if allow_brace => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn parse_program(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.current().is_none() {
                break;
            }
            statements.push(self.parse_statement()?);
            self.end_of_statement(false)?;
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        self.member_accesses = 0;
        let kind = match self.current().map(|token| &token.kind) {
            Some(TokenKind::Fn) => {
                self.position += 1;
                StmtKind::Function(self.parse_function()?)
            }
            Some(TokenKind::Class) => {
                self.position += 1;
                StmtKind::Class(self.parse_class()?)
            }
            Some(TokenKind::Raise) => {
                self.position += 1;
                StmtKind::Raise(self.parse_expr()?)
            }
            _ => return Err(self.unexpected("'fn', 'class' or 'raise'")),
        };
        Ok(Stmt { line, kind })
    }

    /// After `fn`: `NAME(PARAMS) = EXPR`.
    fn parse_function(&mut self) -> ParseResult<FunctionDef> {
        let name = self.expect_identifier("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let line = self.line();
                let param = self.expect_identifier("parameter name")?;
                if params.contains(&param) {
                    return Err(ParseError::new(
                        format!("duplicate parameter '{param}' in '{name}'"),
                        line,
                    ));
                }
                params.push(param);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::Equals, "'='")?;
        let body = self.parse_expr()?;

        Ok(FunctionDef {
            name,
            params,
            body: Arc::new(body),
        })
    }

    /// After `class`: `NAME [: BASE, ...] { ITEMS }`.
    fn parse_class(&mut self) -> ParseResult<ClassDef> {
        let name = self.expect_identifier("class name")?;

        let mut bases = Vec::new();
        if self.match_token(&TokenKind::Colon) {
            loop {
                bases.push(self.expect_identifier("base class name")?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.skip_newlines();
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.match_token(&TokenKind::RBrace) {
                break;
            }
            if self.current().is_none() {
                return Err(self.unexpected(&format!("'}}' closing class '{name}'")));
            }
            items.push(self.parse_class_item()?);
            self.end_of_statement(true)?;
        }

        Ok(ClassDef { name, bases, items })
    }

    fn parse_class_item(&mut self) -> ParseResult<ClassItem> {
        let line = self.line();
        self.member_accesses = 0;
        if self.match_token(&TokenKind::Fn) {
            return Ok(ClassItem {
                line,
                kind: ClassItemKind::Method(self.parse_function()?),
            });
        }

        let name = self.expect_identifier("'fn' or member name")?;
        self.expect(&TokenKind::Equals, "'='")?;
        let expr = self.parse_expr()?;
        Ok(ClassItem {
            line,
            kind: ClassItemKind::Value { name, expr },
        })
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::new(
                format!("expression nested deeper than {MAX_NESTING} levels"),
                self.line(),
            ));
        }
        self.depth += 1;
        let expr = self.parse_nested_expr();
        self.depth -= 1;
        expr
    }

    fn parse_nested_expr(&mut self) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::Set) {
            self.expect(&TokenKind::SelfKw, "'self'")?;
            self.expect(&TokenKind::Dot, "'.'")?;
            let name = self.expect_identifier("field name")?;
            self.expect(&TokenKind::Equals, "'='")?;
            let value = self.parse_expr()?;
            return Ok(Expr::SetField {
                name,
                value: Box::new(value),
            });
        }
        if self.match_token(&TokenKind::Raise) {
            return Ok(Expr::Raise(Box::new(self.parse_expr()?)));
        }

        let first = self.parse_postfix()?;
        if !self.check(&TokenKind::Plus) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.match_token(&TokenKind::Plus) {
            terms.push(self.parse_postfix()?);
        }
        Ok(Expr::Sum(terms))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.match_token(&TokenKind::Dot) {
            if self.member_accesses >= MAX_MEMBER_ACCESSES {
                return Err(ParseError::new(
                    format!("more than {MAX_MEMBER_ACCESSES} member accesses in one definition"),
                    self.line(),
                ));
            }
            self.member_accesses += 1;
            let name = self.expect_identifier("member name")?;
            expr = if self.match_token(&TokenKind::LParen) {
                Expr::MethodCall {
                    target: Box::new(expr),
                    name,
                    args: self.parse_args()?,
                }
            } else {
                Expr::Field {
                    target: Box::new(expr),
                    name,
                }
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let Some(token) = self.consume() else {
            return Err(self.unexpected("expression"));
        };

        let expr = match token.kind {
            TokenKind::Int(i) => Expr::Literal(Literal::Int(i)),
            TokenKind::Float(x) => Expr::Literal(Literal::Float(x)),
            TokenKind::Str(s) => Expr::Literal(Literal::Str(s)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::Null => Expr::Literal(Literal::Null),
            TokenKind::SelfKw => Expr::SelfRef,
            TokenKind::Ident(name) => {
                if self.match_token(&TokenKind::LParen) {
                    Expr::Call {
                        name,
                        args: self.parse_args()?,
                    }
                } else {
                    Expr::Name(name)
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                inner
            }
            other => {
                return Err(ParseError::new(
                    format!("expected expression, found {}", other.describe()),
                    token.line,
                ));
            }
        };
        Ok(expr)
    }

    /// After `(`: comma-separated expressions and the closing `)`.
    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }
}
