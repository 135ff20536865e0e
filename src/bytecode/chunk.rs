//! The compiled program: an instruction stream paired with its constant
//! pool.

use crate::bytecode::instruction::Instructions;
use crate::object::Value;

/// The compiler's output and the virtual machine's input. Constants are
/// appended in compilation order and referenced by 16-bit index from
/// `OpConstant` and `OpClosure`.
#[derive(Debug, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

impl Bytecode {
    pub fn new(instructions: Instructions, constants: Vec<Value>) -> Self {
        Self {
            instructions,
            constants,
        }
    }
}
