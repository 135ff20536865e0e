//! The bytecode backend: compiler, binary format, and virtual machine.
//!
//! # Architecture
//!
//! - `instruction`: opcode definitions, the `make`/`read_operands`
//!   encoder/decoder, and instruction-stream disassembly
//! - `symbol_table`: lexically nested name resolution with free-variable
//!   promotion for closure conversion
//! - `compiler`: lowers the AST into instructions and a constant pool
//! - `chunk`: the `Bytecode` container pairing both
//! - `serializer`: binary encode/decode so compiled programs can be
//!   persisted and reloaded without the front end
//! - `disassembler`: whole-program listings for inspection
//! - `vm`: the stack machine that executes bytecode

pub mod chunk;
pub mod compiler;
pub mod disassembler;
pub mod instruction;
pub mod serializer;
pub mod symbol_table;
pub mod vm;

pub use chunk::Bytecode;
pub use compiler::Compiler;
pub use disassembler::{disassemble_bytecode, print_disassembly};
pub use instruction::OpCode;
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use vm::Vm;
