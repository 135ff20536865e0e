//! Whole-program disassembly listing for debugging.

use std::fmt::Write;

use crate::bytecode::chunk::Bytecode;
use crate::bytecode::instruction::disassemble;
use crate::object::Value;

/// Render the main instruction stream followed by every function constant's
/// body, labeled by constant index.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut out = String::new();

    writeln!(out, "== main ==").unwrap();
    out.push_str(&disassemble(&bytecode.instructions));

    for (idx, constant) in bytecode.constants.iter().enumerate() {
        if let Value::CompiledFunction(func) = constant {
            writeln!(
                out,
                "\n== fn @{} (locals: {}, params: {}) ==",
                idx, func.num_locals, func.num_parameters
            )
            .unwrap();
            out.push_str(&disassemble(&func.instructions));
        }
    }

    out
}

/// Print the disassembly to stdout.
pub fn print_disassembly(bytecode: &Bytecode) {
    print!("{}", disassemble_bytecode(bytecode));
}
