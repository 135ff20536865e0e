//! Interactive shell. Compiler and VM state survive across inputs, so
//! bindings defined on one line are visible on the next.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::{Compiler, Vm};
use crate::bytecode::vm::GLOBALS_SIZE;
use crate::interpreter::Interpreter;
use crate::lexer::Scanner;
use crate::object::Value;
use crate::parser::Parser;
use crate::Engine;

const PROMPT: &str = ">> ";

/// Run the REPL until EOF or interrupt.
pub fn start(engine: Engine) {
    println!("Hello! This is an interactive REPL for the Monkey programming language.");
    println!("Feel free to type in commands below.");

    let Ok(mut editor) = DefaultEditor::new() else {
        eprintln!("could not initialize line editing");
        return;
    };

    match engine {
        Engine::Vm => run_compiled(&mut editor),
        Engine::Evaluator => run_interpreted(&mut editor),
    }
}

fn run_compiled(editor: &mut DefaultEditor) {
    // builtins come pre-defined in a fresh compiler's table
    let (mut symbol_table, mut constants) = Compiler::new().into_state();
    let mut globals = vec![Value::Null; GLOBALS_SIZE];

    loop {
        let Some(line) = read_line(editor) else {
            return;
        };
        let Some(program) = parse_line(&line) else {
            continue;
        };

        let mut compiler = Compiler::new_with_state(symbol_table, constants);
        let compiled = compiler.compile(&program);
        (symbol_table, constants) = compiler.into_state();

        let bytecode = match compiled {
            Ok(bytecode) => bytecode,
            Err(err) => {
                eprintln!("compiler error: {}", err);
                continue;
            }
        };

        let mut vm = Vm::new_with_globals(bytecode, globals);
        match vm.run() {
            Ok(()) => println!("{}", vm.last_popped()),
            Err(err) => eprintln!("vm error: {}", err),
        }
        globals = vm.into_globals();
    }
}

fn run_interpreted(editor: &mut DefaultEditor) {
    let mut interpreter = Interpreter::new();

    loop {
        let Some(line) = read_line(editor) else {
            return;
        };
        let Some(program) = parse_line(&line) else {
            continue;
        };

        println!("{}", interpreter.interpret(&program));
    }
}

fn read_line(editor: &mut DefaultEditor) -> Option<String> {
    match editor.readline(PROMPT) {
        Ok(line) => {
            if !line.trim().is_empty() {
                let _ = editor.add_history_entry(&line);
            }
            Some(line)
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
        Err(err) => {
            eprintln!("read error: {}", err);
            None
        }
    }
}

fn parse_line(line: &str) -> Option<crate::ast::Program> {
    if line.trim().is_empty() {
        return None;
    }

    let tokens = match Scanner::new(line).scan_tokens() {
        Ok(tokens) => tokens,
        Err(err) => {
            eprintln!("lexer error: {}", err);
            return None;
        }
    };

    match Parser::new(tokens).parse() {
        Ok(program) => Some(program),
        Err(err) => {
            eprintln!("parser error: {}", err);
            None
        }
    }
}
