//! Expression AST nodes.

use crate::ast::stmt::Stmt;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42
    IntLiteral(i64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BoolLiteral(bool),
    /// Null literal
    Null,

    /// Variable reference: foo
    Identifier(String),

    /// Reference to a builtin function: len, puts, ...
    Builtin(String),

    /// Prefix operation: -x, !x
    Prefix { operator: UnaryOp, rhs: Box<Expr> },

    /// Infix operation: a + b
    Infix {
        operator: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Conditional expression: if (cond) { ... } else { ... }
    If {
        condition: Box<Expr>,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },

    /// Function literal: fn(a, b) { ... }. `name` is filled in by the
    /// parser when the literal is bound by `let name = fn ...`, enabling
    /// self-recursion through the current closure.
    Function {
        parameters: Vec<String>,
        body: Vec<Stmt>,
        name: String,
    },

    /// Function call: foo(a, b)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Array literal: [1, 2, 3]
    Array(Vec<Expr>),

    /// Hash literal: {"key": value, ...}
    Hash(Vec<(Expr, Expr)>),

    /// Container index: arr[0], hash["key"]
    Index {
        container: Box<Expr>,
        index: Box<Expr>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!` truthiness negation
    Bang,
    /// `-` integer negation
    Minus,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Bang => "!",
            UnaryOp::Minus => "-",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEq => "<=",
            BinaryOp::GreaterEq => ">=",
        }
    }
}
