//! Expression parsing (Pratt).

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::parser::precedence::{token_precedence, Precedence};
use crate::parser::{ParseResult, Parser};

impl Parser {
    pub(crate) fn parse_expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.check(&TokenKind::Semicolon)
            && precedence < token_precedence(self.current_kind())
        {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let token = self.current_token().clone();
        match token.kind {
            TokenKind::IntLiteral(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLiteral(n), token.span))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(s), token.span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(true), token.span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(false), token.span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, token.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), token.span))
            }
            TokenKind::Builtin(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Builtin(name), token.span))
            }
            TokenKind::Bang => self.parse_prefix_op(UnaryOp::Bang),
            TokenKind::Minus => self.parse_prefix_op(UnaryOp::Minus),
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RightParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Fn => self.parse_function_literal(),
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::LeftBrace => self.parse_hash_literal(),
            TokenKind::Eof => Err(ParserError::UnexpectedEof(token.span)),
            other => Err(ParserError::NoParseRule(other.to_string(), token.span)),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.current_kind() {
            TokenKind::LeftParen => self.parse_call_expression(left),
            TokenKind::LeftBracket => self.parse_index_access(left),
            _ => self.parse_binary_op(left),
        }
    }

    fn parse_prefix_op(&mut self, operator: UnaryOp) -> ParseResult<Expr> {
        let op_span = self.advance().span;
        let rhs = self.parse_expression(Precedence::Prefix)?;
        let span = op_span.to(rhs.span);
        Ok(Expr::new(
            ExprKind::Prefix {
                operator,
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_binary_op(&mut self, lhs: Expr) -> ParseResult<Expr> {
        let token = self.current_token().clone();
        let operator = match token.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::LessEq => BinaryOp::LessEq,
            TokenKind::GreaterEq => BinaryOp::GreaterEq,
            other => {
                return Err(ParserError::NoParseRule(other.to_string(), token.span));
            }
        };
        let precedence = token_precedence(&token.kind);
        self.advance();

        let rhs = self.parse_expression(precedence)?;
        let span = lhs.span.to(rhs.span);
        Ok(Expr::new(
            ExprKind::Infix {
                operator,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_if_expression(&mut self) -> ParseResult<Expr> {
        let if_span = self.advance().span;

        let condition = self.parse_condition()?;
        let consequence = self.parse_block()?;

        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };

        let span = if_span.to(self.current_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn parse_function_literal(&mut self) -> ParseResult<Expr> {
        let fn_span = self.advance().span;

        self.expect(TokenKind::LeftParen, "`(` after `fn`")?;
        let mut parameters = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                parameters.push(self.expect_identifier("a parameter name")?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "`)` after parameters")?;

        let body = self.parse_block()?;
        let span = fn_span.to(self.current_span());
        Ok(Expr::new(
            ExprKind::Function {
                parameters,
                body,
                name: String::new(),
            },
            span,
        ))
    }

    fn parse_call_expression(&mut self, callee: Expr) -> ParseResult<Expr> {
        self.advance(); // (

        let mut arguments = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                arguments.push(self.parse_expression(Precedence::Lowest)?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RightParen, "`)` after arguments")?;

        let span = callee.span.to(close.span);
        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                arguments,
            },
            span,
        ))
    }

    fn parse_index_access(&mut self, container: Expr) -> ParseResult<Expr> {
        self.advance(); // [
        let index = self.parse_expression(Precedence::Lowest)?;
        let close = self.expect(TokenKind::RightBracket, "`]` after index")?;

        let span = container.span.to(close.span);
        Ok(Expr::new(
            ExprKind::Index {
                container: Box::new(container),
                index: Box::new(index),
            },
            span,
        ))
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expr> {
        let open_span = self.advance().span;

        let mut elements = Vec::new();
        if !self.check(&TokenKind::RightBracket) {
            loop {
                elements.push(self.parse_expression(Precedence::Lowest)?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RightBracket, "`]` after array elements")?;

        Ok(Expr::new(ExprKind::Array(elements), open_span.to(close.span)))
    }

    fn parse_hash_literal(&mut self) -> ParseResult<Expr> {
        let open_span = self.advance().span;

        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::Colon, "`:` between hash key and value")?;
                let value = self.parse_expression(Precedence::Lowest)?;
                pairs.push((key, value));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RightBrace, "`}` after hash entries")?;

        Ok(Expr::new(ExprKind::Hash(pairs), open_span.to(close.span)))
    }
}
