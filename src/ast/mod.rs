//! Abstract syntax tree: the parser's output and the compiler's input.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{Program, Stmt, StmtKind};
