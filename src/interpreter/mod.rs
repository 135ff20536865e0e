//! Tree-walking evaluator: direct AST interpretation.
//!
//! The slower of the two engines, kept for cross-checking the VM and for
//! environments where compilation is not wanted. Errors travel in-band as
//! `Value::Error`; `break`, `continue`, and `return` propagate as sentinel
//! values through block evaluation until a loop or call consumes them.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::object::{builtin_by_name, Environment, Function, Value};

/// The tree-walking interpreter. Holds the global environment so a REPL can
/// evaluate many programs against the same bindings.
pub struct Interpreter {
    env: Rc<RefCell<Environment>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Evaluate a program and return its final value. Failures come back as
    /// `Value::Error`.
    pub fn interpret(&mut self, program: &Program) -> Value {
        let env = self.env.clone();
        let mut result = Value::Null;

        for stmt in &program.statements {
            result = self.eval_statement(stmt, &env);

            match result {
                Value::ReturnValue(inner) => return *inner,
                Value::Error(_) => return result,
                _ => {}
            }
        }

        result
    }

    fn eval_statement(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Value {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.eval_expression(expr, env),

            StmtKind::Let { name, value } => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env),
                    None => Value::Null,
                };
                if value.is_error() {
                    return value;
                }
                env.borrow_mut().define(name.clone(), value);
                Value::Null
            }

            StmtKind::Assign { name, value } => {
                let value = self.eval_expression(value, env);
                if value.is_error() {
                    return value;
                }
                if !env.borrow_mut().assign(name, value) {
                    return Value::Error(format!("identifier not found: {}", name));
                }
                Value::Null
            }

            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env),
                    None => Value::Null,
                };
                if value.is_error() {
                    return value;
                }
                Value::ReturnValue(Box::new(value))
            }

            StmtKind::For { condition, body } => self.eval_for(condition.as_ref(), body, env),

            StmtKind::Break => Value::Break,
            StmtKind::Continue => Value::Continue,
        }
    }

    fn eval_block(&mut self, statements: &[Stmt], env: &Rc<RefCell<Environment>>) -> Value {
        let mut result = Value::Null;

        for stmt in statements {
            result = self.eval_statement(stmt, env);

            // sentinels unwind to the nearest loop or call without being
            // unwrapped here
            match result {
                Value::ReturnValue(_) | Value::Error(_) | Value::Break | Value::Continue => {
                    return result
                }
                _ => {}
            }
        }

        result
    }

    fn eval_for(
        &mut self,
        condition: Option<&Expr>,
        body: &[Stmt],
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        loop {
            if let Some(condition) = condition {
                let value = self.eval_expression(condition, env);
                if value.is_error() {
                    return value;
                }
                if !value.is_truthy() {
                    return Value::Null;
                }
            }

            match self.eval_block(body, env) {
                Value::Break => return Value::Null,
                Value::Continue => continue,
                result @ (Value::ReturnValue(_) | Value::Error(_)) => return result,
                _ => {}
            }
        }
    }

    fn eval_expression(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> Value {
        match &expr.kind {
            ExprKind::IntLiteral(n) => Value::Integer(*n),
            ExprKind::StringLiteral(s) => Value::string(s.clone()),
            ExprKind::BoolLiteral(b) => Value::Boolean(*b),
            ExprKind::Null => Value::Null,

            ExprKind::Identifier(name) => match env.borrow().get(name) {
                Some(value) => value,
                None => Value::Error(format!("identifier not found: {}", name)),
            },

            ExprKind::Builtin(name) => match builtin_by_name(name) {
                Some(builtin) => Value::Builtin(builtin),
                None => Value::Error(format!("{} is not a builtin function", name)),
            },

            ExprKind::Prefix { operator, rhs } => {
                let rhs = self.eval_expression(rhs, env);
                if rhs.is_error() {
                    return rhs;
                }
                eval_prefix(*operator, rhs)
            }

            ExprKind::Infix { operator, lhs, rhs } => {
                let lhs = self.eval_expression(lhs, env);
                if lhs.is_error() {
                    return lhs;
                }
                let rhs = self.eval_expression(rhs, env);
                if rhs.is_error() {
                    return rhs;
                }
                eval_infix(*operator, lhs, rhs)
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env);
                if condition.is_error() {
                    return condition;
                }
                if condition.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Value::Null
                }
            }

            ExprKind::Function {
                parameters, body, ..
            } => Value::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: body.to_vec(),
                env: env.clone(),
            })),

            ExprKind::Call { callee, arguments } => self.eval_call(callee, arguments, env),

            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    let value = self.eval_expression(element, env);
                    if value.is_error() {
                        return value;
                    }
                    values.push(value);
                }
                Value::array(values)
            }

            ExprKind::Hash(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (key_expr, value_expr) in pairs {
                    let key = self.eval_expression(key_expr, env);
                    if key.is_error() {
                        return key;
                    }
                    let Some(hash_key) = key.hash_key() else {
                        return Value::Error(format!(
                            "non-hashable literal key of type {}",
                            key.type_name()
                        ));
                    };
                    let value = self.eval_expression(value_expr, env);
                    if value.is_error() {
                        return value;
                    }
                    map.insert(hash_key, value);
                }
                Value::hash(map)
            }

            ExprKind::Index { container, index } => {
                let container = self.eval_expression(container, env);
                if container.is_error() {
                    return container;
                }
                let index = self.eval_expression(index, env);
                if index.is_error() {
                    return index;
                }
                eval_index(container, index)
            }
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        arguments: &[Expr],
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        let callee = self.eval_expression(callee, env);
        if callee.is_error() {
            return callee;
        }

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let value = self.eval_expression(argument, env);
            if value.is_error() {
                return value;
            }
            args.push(value);
        }

        match callee {
            Value::Function(func) => {
                if args.len() != func.parameters.len() {
                    return Value::Error(format!(
                        "incorrect number of parameters: need {}, got {}",
                        func.parameters.len(),
                        args.len()
                    ));
                }

                let call_env = Environment::new_enclosed(func.env.clone());
                for (name, value) in func.parameters.iter().zip(args) {
                    call_env.borrow_mut().define(name.clone(), value);
                }

                match self.eval_block(&func.body, &call_env) {
                    Value::ReturnValue(inner) => *inner,
                    other => other,
                }
            }

            Value::Builtin(builtin) => (builtin.func)(args).unwrap_or(Value::Null),

            other => Value::Error(format!(
                "attempted function call from a non-function expression: {}",
                other
            )),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn eval_prefix(operator: UnaryOp, rhs: Value) -> Value {
    match operator {
        UnaryOp::Bang => Value::Boolean(!rhs.is_truthy()),
        UnaryOp::Minus => match rhs {
            Value::Integer(n) => Value::Integer(n.wrapping_neg()),
            other => Value::Error(format!("unknown operator: -{}", other.type_name())),
        },
    }
}

fn eval_infix(operator: BinaryOp, lhs: Value, rhs: Value) -> Value {
    match (&lhs, &rhs) {
        (Value::Integer(left), Value::Integer(right)) => {
            eval_integer_infix(operator, *left, *right)
        }
        (Value::Boolean(left), Value::Boolean(right)) => match operator {
            BinaryOp::Eq => Value::Boolean(left == right),
            BinaryOp::NotEq => Value::Boolean(left != right),
            _ => unknown_operator(operator, &lhs, &rhs),
        },
        (Value::String(left), Value::String(right)) => match operator {
            BinaryOp::Add => Value::string(format!("{}{}", left, right)),
            BinaryOp::Eq => Value::Boolean(left == right),
            BinaryOp::NotEq => Value::Boolean(left != right),
            BinaryOp::Less => Value::Boolean(left < right),
            BinaryOp::Greater => Value::Boolean(left > right),
            BinaryOp::LessEq => Value::Boolean(left <= right),
            BinaryOp::GreaterEq => Value::Boolean(left >= right),
            _ => unknown_operator(operator, &lhs, &rhs),
        },
        _ if lhs.type_name() != rhs.type_name() => Value::Error(format!(
            "type mismatch: {} {} {}",
            lhs.type_name(),
            operator.symbol(),
            rhs.type_name()
        )),
        _ => unknown_operator(operator, &lhs, &rhs),
    }
}

fn eval_integer_infix(operator: BinaryOp, left: i64, right: i64) -> Value {
    match operator {
        BinaryOp::Add => Value::Integer(left.wrapping_add(right)),
        BinaryOp::Sub => Value::Integer(left.wrapping_sub(right)),
        BinaryOp::Mul => Value::Integer(left.wrapping_mul(right)),
        BinaryOp::Div => {
            if right == 0 {
                Value::Error("division by zero".to_string())
            } else {
                Value::Integer(left.wrapping_div(right))
            }
        }
        BinaryOp::Eq => Value::Boolean(left == right),
        BinaryOp::NotEq => Value::Boolean(left != right),
        BinaryOp::Less => Value::Boolean(left < right),
        BinaryOp::Greater => Value::Boolean(left > right),
        BinaryOp::LessEq => Value::Boolean(left <= right),
        BinaryOp::GreaterEq => Value::Boolean(left >= right),
    }
}

fn unknown_operator(operator: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    Value::Error(format!(
        "unknown operator: {} {} {}",
        lhs.type_name(),
        operator.symbol(),
        rhs.type_name()
    ))
}

fn eval_index(container: Value, index: Value) -> Value {
    match container {
        Value::Array(arr) => {
            let Value::Integer(idx) = index else {
                return Value::Error(format!(
                    "arrays may only be indexed with integer values, got {}",
                    index.type_name()
                ));
            };
            let arr = arr.borrow();
            let length = arr.len() as i64;
            if 0 <= idx && idx < length {
                arr[idx as usize].clone()
            } else if idx < 0 && idx >= -length {
                arr[(idx + length) as usize].clone()
            } else {
                Value::Error(format!(
                    "index error: {} is out of bounds for an array of length {}",
                    idx, length
                ))
            }
        }

        Value::Hash(hash) => {
            let Some(key) = index.hash_key() else {
                return Value::Error(format!("index is not hashable: {}", index.type_name()));
            };
            // a missing key reads as null rather than an error
            hash.borrow().get(&key).cloned().unwrap_or(Value::Null)
        }

        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn eval_source(source: &str) -> Value {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        Interpreter::new().interpret(&program)
    }

    fn expect_int(source: &str, expected: i64) {
        assert_eq!(
            eval_source(source),
            Value::Integer(expected),
            "wrong result for {:?}",
            source
        );
    }

    #[test]
    fn test_arithmetic() {
        expect_int("1 + 2 * 3", 7);
        expect_int("(1 + 2) * 3", 9);
        expect_int("-5 + 10", 5);
        expect_int("7 / 2", 3);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval_source("1 < 2"), Value::Boolean(true));
        assert_eq!(eval_source("2 >= 3"), Value::Boolean(false));
        assert_eq!(eval_source("\"a\" + \"b\" == \"ab\""), Value::Boolean(true));
    }

    #[test]
    fn test_let_and_identifiers() {
        expect_int("let a = 5; a;", 5);
        expect_int("let a = 5; let b = a + 1; b;", 6);
        assert!(matches!(eval_source("missing;"), Value::Error(_)));
    }

    #[test]
    fn test_if_else() {
        expect_int("if (true) { 10 } else { 20 }", 10);
        expect_int("if (0) { 10 } else { 20 }", 20);
        assert_eq!(eval_source("if (false) { 10 }"), Value::Null);
    }

    #[test]
    fn test_functions_and_closures() {
        expect_int("let f = fn(a, b) { a + b }; f(34, 35);", 69);
        expect_int(
            "let newAdder = fn(a, b) { fn(c) { a + b + c } }; newAdder(1, 2)(8);",
            11,
        );
        expect_int("let early = fn() { return 1; 2 }; early();", 1);
    }

    #[test]
    fn test_recursion() {
        expect_int(
            "let fib = fn(x) {
                 if (x == 0) { 0 } else {
                     if (x == 1) { 1 } else { fib(x - 1) + fib(x - 2) }
                 }
             };
             fib(10);",
            55,
        );
    }

    #[test]
    fn test_for_loops_with_break_and_continue() {
        expect_int("let x = 0; for (x < 5) { x = x + 1 }; x;", 5);
        expect_int(
            "let x = 0; for { x = x + 1; if (x == 3) { break } }; x;",
            3,
        );
        expect_int(
            "let total = 0;
             let i = 0;
             for (i < 5) {
                 i = i + 1;
                 if (i == 2) { continue };
                 total = total + i
             };
             total;",
            13,
        );
    }

    #[test]
    fn test_arrays_and_hashes() {
        expect_int("[1, 2, 3][1]", 2);
        expect_int("[1, 2, 3][-1]", 3);
        expect_int("let h = {\"a\": 1}; h[\"a\"]", 1);
        // evaluator reads a missing hash key as null
        assert_eq!(eval_source("let h = {\"a\": 1}; h[\"b\"]"), Value::Null);
        assert!(matches!(eval_source("[1][5]"), Value::Error(_)));
    }

    #[test]
    fn test_builtins() {
        expect_int("len(\"hello\")", 5);
        expect_int("let a = [1]; push(a, 2); len(a)", 2);
    }

    #[test]
    fn test_wrong_parameter_count() {
        assert!(matches!(
            eval_source("let f = fn(a) { a }; f();"),
            Value::Error(_)
        ));
    }

    #[test]
    fn test_errors_short_circuit() {
        assert!(matches!(
            eval_source("let x = missing + 1; 99;"),
            Value::Error(_)
        ));
        assert!(matches!(eval_source("1 + true"), Value::Error(_)));
    }

    #[test]
    fn test_engines_agree_on_scenarios() {
        use crate::bytecode::{Compiler, Vm};

        let scenarios = [
            "let f = fn(a, b) { a + b }; f(34, 35);",
            "let newAdder = fn(a, b) { fn(c) { a + b + c } }; newAdder(1, 2)(8);",
            "let x = 0; for (x < 5) { x = x + 1 }; x;",
            "len(\"monkey\") * 2",
        ];

        for source in scenarios {
            let tokens = Scanner::new(source).scan_tokens().unwrap();
            let program = Parser::new(tokens).parse().unwrap();

            let walked = Interpreter::new().interpret(&program);

            let bytecode = Compiler::new().compile(&program).unwrap();
            let mut vm = Vm::new(bytecode);
            vm.run().unwrap();

            assert_eq!(walked, vm.last_popped(), "engines diverge on {:?}", source);
        }
    }
}
