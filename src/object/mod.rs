//! Runtime values shared by both execution engines.
//!
//! Scalars (integers, booleans, strings, null) behave as values; arrays and
//! hashes are shared by reference so that builtin mutation is observable
//! through every alias. Compiled functions and closures are immutable once
//! constructed and always live behind an `Rc`.

pub mod builtins;
pub mod environment;

pub use builtins::{builtin_by_name, Builtin, BUILTINS};
pub use environment::Environment;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use indexmap::IndexMap;

use crate::bytecode::instruction::Instructions;
use crate::bytecode::serializer::put_varint;

/// Entry point of a natively-compiled function body. Slotted onto a
/// `CompiledFunction` at most once; the interpreter falls back to bytecode
/// whenever the slot is empty.
pub type NativeEntry = fn(args: &[Value]) -> Value;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    String(Rc<String>),
    Null,
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<IndexMap<HashKey, Value>>>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    /// A function as the tree-walking engine sees it: parameters, body, and
    /// the environment it closed over.
    Function(Rc<Function>),
    Builtin(&'static Builtin),
    /// Wrapper carrying a `return` out of nested blocks (tree-walking engine).
    ReturnValue(Box<Value>),
    /// A runtime failure surfaced as a value; user programs can observe it.
    Error(String),
    /// Loop-control sentinel (tree-walking engine).
    Break,
    /// Loop-control sentinel (tree-walking engine).
    Continue,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Boolean(_) => "Boolean",
            Value::String(_) => "String",
            Value::Null => "Null",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::CompiledFunction(_) => "CompiledFunction",
            Value::Closure(_) => "Closure",
            Value::Function(_) => "Function",
            Value::Builtin(_) => "Builtin",
            Value::ReturnValue(_) => "ReturnValue",
            Value::Error(_) => "Error",
            Value::Break => "Break",
            Value::Continue => "Continue",
        }
    }

    /// Truthiness for conditional jumps: non-zero integers, non-empty
    /// strings, and canonical true are truthy; null is falsy; aggregates and
    /// callables are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            Value::Integer(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Build an array value from elements.
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    /// Build a hash value from pairs.
    pub fn hash(pairs: IndexMap<HashKey, Value>) -> Value {
        Value::Hash(Rc::new(RefCell::new(pairs)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::new(s.into()))
    }

    /// Compute this value's hash key, or `None` when the type cannot be
    /// used as a hash key.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => {
                let mut buf = [0u8; 10];
                let written = put_varint(&mut buf, *n);
                Some(HashKey {
                    kind: self.type_name(),
                    value: fnv1a_64(&buf[..written.max(8)]),
                    repr: n.to_string(),
                })
            }
            Value::String(s) => Some(HashKey {
                kind: self.type_name(),
                value: fnv1a_64(s.as_bytes()),
                repr: format!("\"{}\"", s),
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: self.type_name(),
                value: if *b { u64::MAX } else { 0 },
                repr: b.to_string(),
            }),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::ReturnValue(a), Value::ReturnValue(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Break, Value::Break) => true,
            (Value::Continue, Value::Continue) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Null => write!(f, "null"),
            Value::Array(arr) => {
                write!(f, "[ ")?;
                for (i, val) in arr.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, " ]")
            }
            Value::Hash(hash) => {
                write!(f, "{{ ")?;
                for (i, (key, val)) in hash.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key.repr, val)?;
                }
                write!(f, " }}")
            }
            Value::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Value::Closure(cl) => write!(f, "Closure[{:p}]", Rc::as_ptr(cl)),
            Value::Function(func) => write!(f, "fn({}) {{ ... }}", func.parameters.join(", ")),
            Value::Builtin(b) => write!(f, "builtin {}", b.name),
            Value::ReturnValue(inner) => write!(f, "{}", inner),
            Value::Error(message) => write!(f, "ERROR: {}", message),
            Value::Break => write!(f, "break"),
            Value::Continue => write!(f, "continue"),
        }
    }
}

/// The key of a hash entry: the owning type's tag plus a 64-bit hash.
/// Two keys of different types never collide because the tag discriminates
/// them. `repr` is carried for diagnostic output only.
#[derive(Debug, Clone)]
pub struct HashKey {
    pub kind: &'static str,
    pub value: u64,
    pub repr: String,
}

impl PartialEq for HashKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl Eq for HashKey {}

impl std::hash::Hash for HashKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.value.hash(state);
    }
}

/// A function lowered to bytecode: immutable once constructed.
#[derive(Debug)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
    /// Native-code slot: written at most once, read lock-free on the call
    /// path. Empty unless a native backend is attached.
    pub native: OnceLock<NativeEntry>,
}

impl CompiledFunction {
    pub fn new(instructions: Instructions, num_locals: usize, num_parameters: usize) -> Self {
        Self {
            instructions,
            num_locals,
            num_parameters,
            native: OnceLock::new(),
        }
    }
}

impl PartialEq for CompiledFunction {
    fn eq(&self, other: &Self) -> bool {
        self.instructions == other.instructions
            && self.num_locals == other.num_locals
            && self.num_parameters == other.num_parameters
    }
}

/// A function value for the tree-walking engine: the literal's parameters
/// and body plus the environment it was created in.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: Vec<crate::ast::Stmt>,
    pub env: Rc<RefCell<Environment>>,
}

/// A compiled function bundled with the values it captured at creation
/// time. Capture is a snapshot: later mutation of the captured locals does
/// not propagate into the closure.
#[derive(Debug)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

impl Closure {
    pub fn new(func: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Self { func, free }
    }
}

/// 64-bit FNV-1a over a byte slice.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
