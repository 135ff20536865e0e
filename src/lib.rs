//! Monkey: a small dynamically-typed scripting language with a bytecode
//! compiler and stack virtual machine.
//!
//! # Execution Modes
//!
//! Programs run on one of two engines:
//! - **Bytecode VM** (default): source compiles to a compact stack-oriented
//!   bytecode executed by a virtual machine
//! - **Tree-walk evaluator**: direct AST interpretation
//!
//! Compiled programs can also be serialized to a binary `.koko` stream and
//! executed later without the front end.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod repl;
pub mod span;

use error::MonkeyError;
use object::Value;

/// Which engine executes a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// Compile to bytecode and run on the VM (faster)
    #[default]
    Vm,
    /// Walk the AST directly
    Evaluator,
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, MonkeyError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<bytecode::Bytecode, MonkeyError> {
    let program = parse(source)?;
    let bytecode = bytecode::Compiler::new().compile(&program)?;
    Ok(bytecode)
}

/// Run a program and return its final value.
pub fn run(source: &str, engine: Engine) -> Result<Value, MonkeyError> {
    match engine {
        Engine::Vm => {
            let bytecode = compile(source)?;
            let mut vm = bytecode::Vm::new(bytecode);
            vm.run()?;
            Ok(vm.last_popped())
        }
        Engine::Evaluator => {
            let program = parse(source)?;
            Ok(interpreter::Interpreter::new().interpret(&program))
        }
    }
}

/// Execute a serialized bytecode stream and return its final value.
pub fn run_serialized(bytes: &[u8]) -> Result<Value, MonkeyError> {
    let bytecode = bytecode::Bytecode::deserialize(bytes)?;
    let mut vm = bytecode::Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_on_both_engines() {
        let source = "let f = fn(a, b) { a + b }; f(2, 3);";
        assert_eq!(run(source, Engine::Vm).unwrap(), Value::Integer(5));
        assert_eq!(run(source, Engine::Evaluator).unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_compile_serialize_run_roundtrip() {
        let bytecode = compile("let x = 20; x + 22").unwrap();
        let bytes = bytecode.serialize().unwrap();
        assert_eq!(run_serialized(&bytes).unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_compile_error_surfaces() {
        assert!(matches!(
            run("undefined_name", Engine::Vm),
            Err(MonkeyError::Compile(_))
        ));
    }
}
