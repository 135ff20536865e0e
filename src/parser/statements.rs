//! Statement parsing.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::lexer::TokenKind;
use crate::parser::{ParseResult, Parser, Precedence};

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let stmt = match self.current_kind() {
            TokenKind::Let => self.parse_let_statement()?,
            TokenKind::Return => self.parse_return_statement()?,
            TokenKind::For => self.parse_for_statement()?,
            TokenKind::Break => {
                let span = self.advance().span;
                Stmt::new(StmtKind::Break, span)
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                Stmt::new(StmtKind::Continue, span)
            }
            TokenKind::Identifier(_) if *self.peek_kind() == TokenKind::Assign => {
                self.parse_assignment_statement()?
            }
            _ => self.parse_expression_statement()?,
        };

        // trailing semicolons are optional
        self.match_token(&TokenKind::Semicolon);
        Ok(stmt)
    }

    fn parse_let_statement(&mut self) -> ParseResult<Stmt> {
        let let_span = self.advance().span;
        let name = self.expect_identifier("an identifier after `let`")?;

        // bare `let x;` declares with a null initializer
        if !self.check(&TokenKind::Assign) {
            let span = let_span.to(self.current_span());
            return Ok(Stmt::new(StmtKind::Let { name, value: None }, span));
        }
        self.advance();

        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let ExprKind::Function {
            name: fn_name, ..
        } = &mut value.kind
        {
            // name the literal so the compiler can bind it for recursion
            *fn_name = name.clone();
        }

        let span = let_span.to(value.span);
        Ok(Stmt::new(
            StmtKind::Let {
                name,
                value: Some(value),
            },
            span,
        ))
    }

    fn parse_assignment_statement(&mut self) -> ParseResult<Stmt> {
        let name_token = self.advance();
        let name = match name_token.kind {
            TokenKind::Identifier(name) => name,
            _ => unreachable!(),
        };

        self.expect(TokenKind::Assign, "`=` in assignment")?;
        let value = self.parse_expression(Precedence::Lowest)?;

        let span = name_token.span.to(value.span);
        Ok(Stmt::new(StmtKind::Assign { name, value }, span))
    }

    fn parse_return_statement(&mut self) -> ParseResult<Stmt> {
        let return_span = self.advance().span;

        // bare `return;` yields null
        if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RightBrace) {
            return Ok(Stmt::new(StmtKind::Return(None), return_span));
        }

        let value = self.parse_expression(Precedence::Lowest)?;
        let span = return_span.to(value.span);
        Ok(Stmt::new(StmtKind::Return(Some(value)), span))
    }

    fn parse_for_statement(&mut self) -> ParseResult<Stmt> {
        let for_span = self.advance().span;

        let condition = if self.check(&TokenKind::LeftBrace) {
            None
        } else {
            Some(self.parse_expression(Precedence::Lowest)?)
        };

        let body = self.parse_block()?;
        let span = for_span.to(self.current_span());
        Ok(Stmt::new(StmtKind::For { condition, body }, span))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        let span = expr.span;
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    /// Parse a braced statement block.
    pub(crate) fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LeftBrace, "`{`")?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.at_end() {
            statements.push(self.parse_statement()?);
        }

        self.expect(TokenKind::RightBrace, "`}`")?;
        Ok(statements)
    }

    /// Parse a parenthesized condition, as used by `if`.
    pub(crate) fn parse_condition(&mut self) -> ParseResult<Expr> {
        self.expect(TokenKind::LeftParen, "`(`")?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RightParen, "`)`")?;
        Ok(condition)
    }

    /// Consume an identifier token and return its name.
    pub(crate) fn expect_identifier(&mut self, expected: &str) -> ParseResult<String> {
        match self.current_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(crate::error::ParserError::unexpected_token(
                expected,
                other.to_string(),
                self.current_span(),
            )),
        }
    }
}
