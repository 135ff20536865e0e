//! Stack-based virtual machine for executing bytecode.
//!
//! Execution state is a preallocated value stack, a flat globals store, and
//! a call-frame stack. Each frame tracks the running closure, an
//! instruction pointer that starts at -1 (the dispatch loop pre-increments
//! before fetching), and a base pointer marking where the frame's locals
//! begin on the value stack.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::chunk::Bytecode;
use crate::bytecode::instruction::{read_u16, OpCode};
use crate::error::RuntimeError;
use crate::object::{Closure, CompiledFunction, Value, BUILTINS};

/// Maximum value-stack depth.
pub const STACK_SIZE: usize = 2048;
/// Size of the flat globals store (16-bit index space).
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call-frame depth.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// One active call.
#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    /// Instruction pointer; -1 so the loop's pre-increment lands on byte 0.
    ip: i64,
    /// Stack slot where this frame's locals begin.
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }
}

/// The virtual machine.
pub struct Vm {
    constants: Vec<Value>,
    globals: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    frames: Vec<Frame>,
    /// Consult per-function native-code slots before frame-based calls.
    /// Off by default; the VM behaves identically with it disabled.
    jit_enabled: bool,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Construct a VM reusing an existing globals store; the REPL threads
    /// the same store through every input.
    pub fn new_with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        // the main program runs as a synthetic zero-argument closure
        let main_fn = CompiledFunction::new(bytecode.instructions, 0, 0);
        let main_closure = Closure::new(Rc::new(main_fn), Vec::new());

        Self {
            constants: bytecode.constants,
            globals,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            frames: vec![Frame::new(Rc::new(main_closure), 0)],
            jit_enabled: false,
        }
    }

    /// Enable the native-code call path. Functions without an attached
    /// native entry still interpret their bytecode.
    pub fn set_jit_enabled(&mut self, enabled: bool) {
        self.jit_enabled = enabled;
    }

    /// Give the globals store back for a later `new_with_globals`.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The element popped last: the program's result once `run` finishes.
    pub fn last_popped(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// Execute until the main frame runs off the end of its instructions.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip + 1
            < self.current_frame().closure.func.instructions.len() as i64
        {
            self.current_frame_mut().ip += 1;

            let frame = self.current_frame();
            let ip = frame.ip as usize;
            let byte = frame.closure.func.instructions[ip];
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            match op {
                OpCode::Constant => {
                    let idx = self.fetch_u16();
                    let constant = self.constant(idx)?;
                    self.push(constant)?;
                }

                OpCode::True => self.push(Value::Boolean(true))?,
                OpCode::False => self.push(Value::Boolean(false))?,
                OpCode::Null => self.push(Value::Null)?,

                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Eq
                | OpCode::NotEq
                | OpCode::LessThan
                | OpCode::LessThanEq => self.execute_binary_op(op)?,

                OpCode::Bang => {
                    let operand = self.pop();
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                OpCode::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(n) => self.push(Value::Integer(n.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::UnknownOperator {
                                op: "-",
                                operand: other.type_name(),
                            })
                        }
                    }
                }

                OpCode::Pop => {
                    self.pop();
                }

                OpCode::Jump => {
                    let target = self.fetch_u16();
                    // pre-increment compensates
                    self.current_frame_mut().ip = target as i64 - 1;
                }

                OpCode::JumpNotTruthy => {
                    let target = self.fetch_u16();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as i64 - 1;
                    }
                }

                OpCode::SetGlobal => {
                    let idx = self.fetch_u16();
                    self.globals[idx] = self.pop();
                }

                OpCode::GetGlobal => {
                    let idx = self.fetch_u16();
                    let value = self.globals[idx].clone();
                    self.push(value)?;
                }

                OpCode::SetLocal => {
                    let idx = self.fetch_u8();
                    let slot = self.current_frame().base_pointer + idx;
                    self.stack[slot] = self.pop();
                }

                OpCode::GetLocal => {
                    let idx = self.fetch_u8();
                    let slot = self.current_frame().base_pointer + idx;
                    let value = self.stack[slot].clone();
                    self.push(value)?;
                }

                OpCode::GetBuiltin => {
                    let idx = self.fetch_u8();
                    let builtin = BUILTINS.get(idx).ok_or_else(|| {
                        RuntimeError::General(format!("no builtin at index {}", idx))
                    })?;
                    self.push(Value::Builtin(builtin))?;
                }

                OpCode::GetFree => {
                    let idx = self.fetch_u8();
                    let value = self
                        .current_frame()
                        .closure
                        .free
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| {
                            RuntimeError::General(format!("no free variable at index {}", idx))
                        })?;
                    self.push(value)?;
                }

                OpCode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }

                OpCode::Array => {
                    let length = self.fetch_u16();
                    let elements = self.stack[self.sp - length..self.sp].to_vec();
                    self.sp -= length;
                    self.push(Value::array(elements))?;
                }

                OpCode::Hash => {
                    let length = self.fetch_u16();
                    let mut pairs = IndexMap::with_capacity(length);
                    let base = self.sp - 2 * length;
                    for i in 0..length {
                        let key = self.stack[base + 2 * i].clone();
                        let value = self.stack[base + 2 * i + 1].clone();
                        let hash_key = key
                            .hash_key()
                            .ok_or_else(|| RuntimeError::UnhashableKey(key.type_name()))?;
                        pairs.insert(hash_key, value);
                    }
                    self.sp = base;
                    self.push(Value::hash(pairs))?;
                }

                OpCode::Index => {
                    let index = self.pop();
                    let container = self.pop();
                    self.execute_index(container, index)?;
                }

                OpCode::Call => {
                    let num_args = self.fetch_u8();
                    self.call_function(num_args)?;
                }

                OpCode::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame()?;
                    // discard the callee's locals plus the callee slot
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }

                OpCode::Return => {
                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                OpCode::Closure => {
                    let const_idx = self.fetch_u16();
                    let num_free = self.fetch_u8();

                    let func = match self.constant(const_idx)? {
                        Value::CompiledFunction(func) => func,
                        _ => return Err(RuntimeError::BadClosureConstant(const_idx)),
                    };

                    // snapshot the captured values, preserving order
                    let free = self.stack[self.sp - num_free..self.sp].to_vec();
                    self.sp -= num_free;
                    self.push(Value::Closure(Rc::new(Closure::new(func, free))))?;
                }
            }
        }

        Ok(())
    }

    // ===== Calls =====

    fn call_function(&mut self, num_args: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();

        match callee {
            Value::Closure(closure) => {
                if closure.func.num_parameters != num_args {
                    return Err(RuntimeError::WrongArity {
                        want: closure.func.num_parameters,
                        got: num_args,
                    });
                }

                if self.jit_enabled {
                    if let Some(entry) = closure.func.native.get() {
                        // native fast path: same stack effect as a
                        // frame-based call and return
                        let result = entry(&self.stack[self.sp - num_args..self.sp]);
                        self.sp = self.sp - num_args - 1;
                        return self.push(result);
                    }
                }

                if self.frames.len() >= MAX_FRAMES {
                    return Err(RuntimeError::FrameOverflow);
                }

                // arguments already sit where the first locals go; reserve
                // the remaining local slots above them
                let base_pointer = self.sp - num_args;
                let new_sp = base_pointer + closure.func.num_locals;
                if new_sp > STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }

                self.frames.push(Frame::new(closure, base_pointer));
                self.sp = new_sp;
                Ok(())
            }

            Value::Builtin(builtin) => {
                // builtins receive their arguments squashed into one array
                let arg = self.stack[self.sp - num_args].clone();
                let Value::Array(arr) = arg else {
                    return Err(RuntimeError::BadBuiltinCall(arg.type_name()));
                };
                let args = arr.borrow().clone();

                let result = (builtin.func)(args);
                self.sp = self.sp - num_args - 1;
                self.push(result.unwrap_or(Value::Null))
            }

            _ => Err(RuntimeError::NotCallable),
        }
    }

    // ===== Operators =====

    fn execute_binary_op(&mut self, op: OpCode) -> VmResult<()> {
        let rhs = self.pop();
        let lhs = self.pop();

        match (&lhs, &rhs) {
            (Value::Integer(left), Value::Integer(right)) => {
                self.execute_integer_binary_op(*left, *right, op)
            }
            (Value::Boolean(left), Value::Boolean(right)) => match op {
                OpCode::Eq => self.push(Value::Boolean(left == right)),
                OpCode::NotEq => self.push(Value::Boolean(left != right)),
                _ => Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    operand: "Boolean",
                }),
            },
            (Value::String(left), Value::String(right)) => match op {
                OpCode::Add => self.push(Value::string(format!("{}{}", left, right))),
                OpCode::Eq => self.push(Value::Boolean(left == right)),
                OpCode::NotEq => self.push(Value::Boolean(left != right)),
                OpCode::LessThan => self.push(Value::Boolean(left < right)),
                OpCode::LessThanEq => self.push(Value::Boolean(left <= right)),
                _ => Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    operand: "String",
                }),
            },
            _ if lhs.type_name() != rhs.type_name() => Err(RuntimeError::TypeMismatch(
                lhs.type_name(),
                rhs.type_name(),
            )),
            _ => Err(RuntimeError::UnknownOperator {
                op: op.definition().name,
                operand: lhs.type_name(),
            }),
        }
    }

    fn execute_integer_binary_op(&mut self, left: i64, right: i64, op: OpCode) -> VmResult<()> {
        let value = match op {
            OpCode::Add => Value::Integer(left.wrapping_add(right)),
            OpCode::Sub => Value::Integer(left.wrapping_sub(right)),
            OpCode::Mul => Value::Integer(left.wrapping_mul(right)),
            OpCode::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                // truncates toward zero; MIN / -1 wraps
                Value::Integer(left.wrapping_div(right))
            }
            OpCode::Eq => Value::Boolean(left == right),
            OpCode::NotEq => Value::Boolean(left != right),
            OpCode::LessThan => Value::Boolean(left < right),
            OpCode::LessThanEq => Value::Boolean(left <= right),
            _ => {
                return Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    operand: "Integer",
                })
            }
        };
        self.push(value)
    }

    // ===== Indexing =====

    fn execute_index(&mut self, container: Value, index: Value) -> VmResult<()> {
        match container {
            Value::Array(arr) => {
                let Value::Integer(idx) = index else {
                    return Err(RuntimeError::BadIndexType(index.type_name()));
                };
                let arr = arr.borrow();
                match wrap_index(idx, arr.len()) {
                    Some(i) => {
                        let value = arr[i].clone();
                        drop(arr);
                        self.push(value)
                    }
                    None => {
                        let length = arr.len();
                        drop(arr);
                        // the error surfaces after null lands on the stack
                        self.push(Value::Null)?;
                        Err(RuntimeError::IndexOutOfBounds { index: idx, length })
                    }
                }
            }

            Value::Hash(hash) => {
                let key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnhashableKey(index.type_name()))?;
                let value = hash.borrow().get(&key).cloned();
                match value {
                    Some(value) => self.push(value),
                    None => {
                        self.push(Value::Null)?;
                        Err(RuntimeError::MissingKey(index.to_string()))
                    }
                }
            }

            Value::String(s) => {
                let Value::Integer(idx) = index else {
                    return Err(RuntimeError::BadIndexType(index.type_name()));
                };
                match wrap_index(idx, s.len()) {
                    Some(i) => {
                        let one = (s.as_bytes()[i] as char).to_string();
                        self.push(Value::string(one))
                    }
                    None => {
                        self.push(Value::Null)?;
                        Err(RuntimeError::IndexOutOfBounds {
                            index: idx,
                            length: s.len(),
                        })
                    }
                }
            }

            other => Err(RuntimeError::NotIndexable(other.type_name())),
        }
    }

    // ===== Stack & frames =====

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of stack. The slot keeps its value so `last_popped` can
    /// observe the program result.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn constant(&self, idx: usize) -> VmResult<Value> {
        self.constants
            .get(idx)
            .cloned()
            .ok_or_else(|| RuntimeError::General(format!("constant {} out of range", idx)))
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn pop_frame(&mut self) -> VmResult<Frame> {
        // the main frame has no caller to return into
        if self.frames.len() == 1 {
            return Err(RuntimeError::General(
                "return outside of a function".to_string(),
            ));
        }
        self.frames
            .pop()
            .ok_or_else(|| RuntimeError::General("return outside of a function".to_string()))
    }

    /// Read the u16 operand after the current opcode and advance `ip` past
    /// it.
    fn fetch_u16(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = read_u16(&frame.closure.func.instructions[ip + 1..]) as usize;
        frame.ip += 2;
        value
    }

    /// Read the u8 operand after the current opcode and advance `ip` past
    /// it.
    fn fetch_u8(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = frame.closure.func.instructions[ip + 1] as usize;
        frame.ip += 1;
        value
    }
}

/// Python-style index wrap: `-len <= i < len` maps into bounds, anything
/// else is out of range.
fn wrap_index(index: i64, length: usize) -> Option<usize> {
    let length = length as i64;
    if 0 <= index && index < length {
        Some(index as usize)
    } else if index < 0 && index >= -length {
        Some((index + length) as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run_source(source: &str) -> VmResult<Value> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        let bytecode = Compiler::new().compile(&program).expect("compile error");

        let mut vm = Vm::new(bytecode);
        vm.run()?;
        Ok(vm.last_popped())
    }

    fn expect_value(source: &str, expected: Value) {
        match run_source(source) {
            Ok(value) => assert_eq!(value, expected, "wrong result for {:?}", source),
            Err(err) => panic!("vm error for {:?}: {}", source, err),
        }
    }

    fn expect_int(source: &str, expected: i64) {
        expect_value(source, Value::Integer(expected));
    }

    fn expect_bool(source: &str, expected: bool) {
        expect_value(source, Value::Boolean(expected));
    }

    #[test]
    fn test_integer_arithmetic() {
        expect_int("1", 1);
        expect_int("1 + 2", 3);
        expect_int("1 - 2", -1);
        expect_int("4 * 5", 20);
        expect_int("50 / 2 * 2 + 10 - 5", 55);
        expect_int("5 * (2 + 10)", 60);
        expect_int("-5", -5);
        expect_int("-50 + 100 + -50", 0);
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        expect_int("7 / 2", 3);
        expect_int("-7 / 2", -3);
        expect_int("5 / 2 * 2", 4);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            run_source("1 / 0"),
            Err(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn test_negation_wraps_at_i64_min() {
        // -(-x) restores x everywhere except i64::MIN, which wraps to itself
        expect_bool("let min = 0 - 9223372036854775807 - 1; -min == min", true);
        expect_int("let x = 41; -(-x) + 1", 42);
    }

    #[test]
    fn test_boolean_expressions() {
        expect_bool("true", true);
        expect_bool("false", false);
        expect_bool("1 < 2", true);
        expect_bool("1 > 2", false);
        expect_bool("2 > 1", true);
        expect_bool("1 <= 1", true);
        expect_bool("2 >= 3", false);
        expect_bool("1 == 1", true);
        expect_bool("1 != 1", false);
        expect_bool("true == true", true);
        expect_bool("true != false", true);
        expect_bool("!true", false);
        expect_bool("!!5", true);
        expect_bool("!0", true);
        expect_bool("(1 < 2) == true", true);
    }

    #[test]
    fn test_string_operations() {
        expect_value("\"mon\" + \"key\"", Value::string("monkey"));
        expect_bool("\"a\" < \"b\"", true);
        expect_bool("\"abc\" == \"abc\"", true);
        expect_bool("\"abc\" != \"abd\"", true);
        expect_bool("\"b\" >= \"a\"", true);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        assert!(matches!(
            run_source("1 + \"a\""),
            Err(RuntimeError::TypeMismatch("Integer", "String"))
        ));
        assert!(matches!(
            run_source("true + true"),
            Err(RuntimeError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_conditionals() {
        expect_int("if (true) { 10 }", 10);
        expect_int("if (true) { 10 } else { 20 }", 10);
        expect_int("if (false) { 10 } else { 20 }", 20);
        expect_int("if (1) { 10 }", 10);
        expect_int("if (1 < 2) { 10 }", 10);
        expect_value("if (false) { 10 }", Value::Null);
        expect_value("if (1 > 2) { 10 }", Value::Null);
        expect_int("if (if (false) { 10 }) { 10 } else { 20 }", 20);
    }

    #[test]
    fn test_string_truthiness_in_conditions() {
        expect_int("if (\"\") { 1 } else { 2 }", 2);
        expect_int("if (\"x\") { 1 } else { 2 }", 1);
    }

    #[test]
    fn test_global_let_statements() {
        expect_int("let one = 1; one", 1);
        expect_int("let one = 1; let two = 2; one + two", 3);
        expect_int("let one = 1; let two = one + one; one + two", 3);
    }

    #[test]
    fn test_bare_let_yields_null() {
        expect_value("let a; a;", Value::Null);
    }

    #[test]
    fn test_assignment() {
        expect_int("let x = 1; x = x + 1; x", 2);
    }

    #[test]
    fn test_array_literals_and_indexing() {
        expect_int("[1, 2, 3][0]", 1);
        expect_int("[1, 2, 3][1 + 1]", 3);
        expect_int("[[1, 1, 1]][0][0]", 1);
        expect_int("[1, 2, 3][-1]", 3);
        expect_int("[1, 2, 3][-3]", 1);
    }

    #[test]
    fn test_array_index_out_of_bounds() {
        assert!(matches!(
            run_source("[1, 2, 3][3]"),
            Err(RuntimeError::IndexOutOfBounds {
                index: 3,
                length: 3
            })
        ));
        assert!(matches!(
            run_source("[1, 2, 3][-4]"),
            Err(RuntimeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_string_indexing() {
        expect_value("\"hello\"[1]", Value::string("e"));
        expect_value("\"hello\"[-1]", Value::string("o"));
        assert!(matches!(
            run_source("\"hi\"[5]"),
            Err(RuntimeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_hash_literals_and_indexing() {
        expect_int("let h = {\"a\": 1, \"b\": 2}; h[\"b\"]", 2);
        expect_int("{1: 100}[1]", 100);
        expect_int("{true: 5}[true]", 5);
        expect_int("{\"one\": 1, \"two\": 2}[\"one\" + \"\"]", 1);
    }

    #[test]
    fn test_missing_hash_key_is_an_error() {
        assert!(matches!(
            run_source("let h = {\"a\": 1, \"b\": 2}; h[\"c\"]"),
            Err(RuntimeError::MissingKey(_))
        ));
    }

    #[test]
    fn test_unhashable_key_is_an_error() {
        assert!(matches!(
            run_source("{[1]: 2}"),
            Err(RuntimeError::UnhashableKey("Array"))
        ));
        assert!(matches!(
            run_source("{\"a\": 1}[[1]]"),
            Err(RuntimeError::UnhashableKey("Array"))
        ));
    }

    #[test]
    fn test_indexing_non_containers_is_an_error() {
        assert!(matches!(
            run_source("1[0]"),
            Err(RuntimeError::NotIndexable("Integer"))
        ));
    }

    #[test]
    fn test_function_calls() {
        expect_int("let f = fn(a, b) { a + b }; f(34, 35);", 69);
        expect_int("fn() { 5 + 10 }()", 15);
        expect_int("let early = fn() { return 99; 100 }; early()", 99);
        expect_int(
            "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
            3,
        );
    }

    #[test]
    fn test_empty_function_returns_null() {
        expect_value("fn(){ }()", Value::Null);
        expect_value("let noReturn = fn() { }; noReturn();", Value::Null);
    }

    #[test]
    fn test_functions_with_locals() {
        expect_int("let f = fn() { let a = 1; let b = 2; a + b }; f()", 3);
        expect_int(
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two };
             let threeAndFour = fn() { let three = 3; let four = 4; three + four };
             oneAndTwo() + threeAndFour();",
            10,
        );
        // identically named locals get per-frame slots
        expect_int(
            "let firstFoobar = fn() { let foobar = 50; foobar };
             let secondFoobar = fn() { let foobar = 100; foobar };
             firstFoobar() + secondFoobar();",
            150,
        );
    }

    #[test]
    fn test_wrong_argument_count() {
        let err = run_source("fn(a) { a }()").unwrap_err();
        assert_eq!(err.to_string(), "wrong number of arguments: want=1, got=0");

        assert!(matches!(
            run_source("fn() { 1 }(1)"),
            Err(RuntimeError::WrongArity { want: 0, got: 1 })
        ));
    }

    #[test]
    fn test_calling_non_function() {
        assert!(matches!(
            run_source("1(2)"),
            Err(RuntimeError::NotCallable)
        ));
    }

    #[test]
    fn test_closures() {
        expect_int(
            "let newAdder = fn(a, b) { fn(c) { a + b + c } }; newAdder(1, 2)(8);",
            11,
        );
        expect_int(
            "let newClosure = fn(a) { fn() { a } }; let closure = newClosure(99); closure();",
            99,
        );
        expect_int(
            "let newAdderOuter = fn(a, b) {
                 let c = a + b;
                 fn(d) { let e = d + c; fn(f) { e + f } }
             };
             let newAdderInner = newAdderOuter(1, 2);
             let adder = newAdderInner(3);
             adder(8);",
            14,
        );
    }

    #[test]
    fn test_closure_capture_is_a_snapshot() {
        // mutation of a captured local after OpClosure is not observable
        // through the closure
        expect_int(
            "let f = fn() { let x = 1; let g = fn() { x }; x = 2; g() }; f();",
            1,
        );
    }

    #[test]
    fn test_recursion() {
        expect_int(
            "let countDown = fn(x) { if (x == 0) { 0 } else { countDown(x - 1) } };
             countDown(3);",
            0,
        );
        expect_int(
            "let fib = fn(x) {
                 if (x == 0) { 0 } else {
                     if (x == 1) { 1 } else { fib(x - 1) + fib(x - 2) }
                 }
             };
             fib(15);",
            610,
        );
    }

    #[test]
    fn test_recursive_closure_inside_function() {
        expect_int(
            "let wrapper = fn() {
                 let countDown = fn(x) { if (x == 0) { 0 } else { countDown(x - 1) } };
                 countDown(1)
             };
             wrapper();",
            0,
        );
    }

    #[test]
    fn test_for_loop() {
        expect_int("let x = 0; for (x < 5) { let x = x + 1 }; x;", 5);
        expect_int("let x = 0; for (x < 0) { let x = x + 1 }; x;", 0);
    }

    #[test]
    fn test_for_loop_with_break_and_continue() {
        expect_int(
            "let x = 0;
             let i = 0;
             for {
                 let i = i + 1;
                 let x = 2 * x;
                 if (i == i / 2 * 2) { continue };
                 let x = x + 1;
                 if (x > 16) { break }
             };
             x;",
            21,
        );
        expect_int("let x = 0; for { x = x + 1; if (x == 3) { break } }; x;", 3);
    }

    #[test]
    fn test_nested_loops() {
        expect_int(
            "let total = 0;
             let i = 0;
             for (i < 3) {
                 let j = 0;
                 for (j < 3) {
                     if (j == 2) { break };
                     total = total + 1;
                     j = j + 1
                 };
                 i = i + 1
             };
             total;",
            6,
        );
    }

    #[test]
    fn test_builtin_calls() {
        expect_int("len(\"hello\")", 5);
        expect_int("len([1, 2, 3])", 3);
        expect_int("len(\"\")", 0);
        expect_value("puts(\"ok\")", Value::Null);
        expect_int("let a = [1]; push(a, 2, 3); len(a)", 3);
        expect_int("let a = [1, 2]; pop(a) + len(a)", 3);
        expect_int("let a = [1, 2, 3]; del(a, 0); a[0]", 2);
    }

    #[test]
    fn test_builtin_failures_surface_as_error_values() {
        // builtins report failure in-band; the VM pushes the error as the
        // call's result instead of unwinding
        let result = run_source("len(1)").unwrap();
        assert!(matches!(result, Value::Error(_)));

        let result = run_source("pop([])").unwrap();
        assert!(matches!(result, Value::Error(_)));
    }

    #[test]
    fn test_builtin_mutation_is_visible_through_aliases() {
        expect_int("let a = [1]; let b = a; push(a, 2); len(b)", 2);
    }

    #[test]
    fn test_string_length_is_additive() {
        expect_bool("len(\"foo\" + \"bar\") == len(\"foo\") + len(\"bar\")", true);
    }

    #[test]
    fn test_runaway_recursion_overflows_the_frame_stack() {
        assert!(matches!(
            run_source("let f = fn() { f() }; f();"),
            Err(RuntimeError::FrameOverflow)
        ));
    }

    #[test]
    fn test_last_popped_tracks_final_statement() {
        expect_int("1; 2; 3", 3);
    }

    #[test]
    fn test_top_level_return_is_an_error() {
        assert!(matches!(
            run_source("return 5;"),
            Err(RuntimeError::General(_))
        ));
    }

    #[test]
    fn test_first_class_functions_returned_from_calls() {
        expect_int(
            "let returnsOne = fn() { 1 };
             let returnsOneReturner = fn() { returnsOne };
             returnsOneReturner()();",
            1,
        );
    }

    #[test]
    fn test_globals_survive_across_vms() {
        let tokens = Scanner::new("let g = 41;").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut compiler = Compiler::new();
        let bytecode = compiler.compile(&program).unwrap();
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        let globals = vm.into_globals();

        let (table, constants) = compiler.into_state();
        let tokens = Scanner::new("g + 1").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new_with_state(table, constants)
            .compile(&program)
            .unwrap();
        let mut vm = Vm::new_with_globals(bytecode, globals);
        vm.run().unwrap();
        assert_eq!(vm.last_popped(), Value::Integer(42));
    }

    #[test]
    fn test_jit_slot_short_circuits_the_call() {
        let tokens = Scanner::new("let f = fn(a) { a + 1 }; f(10)")
            .scan_tokens()
            .unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new().compile(&program).unwrap();

        // attach a native entry to the compiled function constant
        for constant in &bytecode.constants {
            if let Value::CompiledFunction(func) = constant {
                func.native
                    .set(|_args| Value::Integer(777))
                    .expect("slot written once");
            }
        }

        let mut vm = Vm::new(bytecode);
        vm.set_jit_enabled(true);
        vm.run().unwrap();
        assert_eq!(vm.last_popped(), Value::Integer(777));
    }

    #[test]
    fn test_jit_disabled_ignores_the_slot() {
        let tokens = Scanner::new("let f = fn(a) { a + 1 }; f(10)")
            .scan_tokens()
            .unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new().compile(&program).unwrap();

        for constant in &bytecode.constants {
            if let Value::CompiledFunction(func) = constant {
                func.native
                    .set(|_args| Value::Integer(777))
                    .expect("slot written once");
            }
        }

        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        assert_eq!(vm.last_popped(), Value::Integer(11));
    }
}
