//! Error types for all phases: lexing, parsing, compilation, serialization,
//! and execution.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("No parse rule for token '{0}' at {1}")]
    NoParseRule(String, Span),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::NoParseRule(_, span) => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::UnexpectedToken {
            expected: "a valid token".to_string(),
            found: err.to_string(),
            span: err.span(),
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    #[error("variable {0} not declared in scope")]
    NotDeclared(String),

    #[error("cannot assign to builtin function")]
    AssignToBuiltin,

    #[error("cannot assign to captured variable {0}")]
    AssignToCaptured(String),

    #[error("cannot break without an enclosing `for` loop")]
    BreakOutsideLoop,

    #[error("cannot continue without an enclosing `for` loop")]
    ContinueOutsideLoop,

    #[error("unable to resolve builtin {0}")]
    UnknownBuiltin(String),
}

/// Bytecode encoding errors (compiled program → bytes).
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot serialize constant of type {0}")]
    UnsupportedConstant(&'static str),

    #[error("integer {0} does not fit in a varint slot")]
    VarintOverflow(i64),
}

/// Bytecode decoding errors (bytes → compiled program).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("made no progress at offset {0}")]
    NoProgress(usize),

    #[error("unknown serial type tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("truncated input at offset {0}")]
    Truncated(usize),

    #[error("malformed varint at offset {0}")]
    BadVarint(usize),

    #[error("reached the end of the input without a bytecode section")]
    MissingBytecode,
}

/// Runtime errors raised by either execution engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("frame overflow")]
    FrameOverflow,

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("calling non-function")]
    NotCallable,

    #[error("type mismatch: {0} {1}")]
    TypeMismatch(&'static str, &'static str),

    #[error("unknown operator: {op} for {operand}")]
    UnknownOperator {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("cannot use a {0} as a hash key")]
    UnhashableKey(&'static str),

    #[error("index error for key {0}")]
    MissingKey(String),

    #[error("cannot index into a {0}")]
    NotIndexable(&'static str),

    #[error("cannot use a {0} as an index")]
    BadIndexType(&'static str),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("closure constant {0} is not a compiled function")]
    BadClosureConstant(usize),

    #[error("builtin argument must be an array, got {0}")]
    BadBuiltinCall(&'static str),

    #[error("{0}")]
    General(String),
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum MonkeyError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
