//! Monkey CLI: run scripts, compile to bytecode, execute bytecode, or start
//! the REPL.

use std::fs;
use std::process;

use monkeylang::{bytecode, parse, repl, Engine};

const USAGE: &str = "Usage: monkey [options] [file]

With no file, start an interactive REPL.

Options:
  -e, --engine <vm|evaluator>  Execution engine (default: vm)
  -o, --out <file>             Compile the input and write .koko bytecode
                               instead of running it (vm engine only)
  -k, --koko                   Treat the input file as compiled bytecode
                               (implied by a .koko extension)
  -h, --help                   Show this help message

Examples:
  monkey                       Start the REPL
  monkey script.monkey         Run a script and print its value
  monkey -o out.koko script.monkey
                               Compile a script to bytecode
  monkey out.koko              Run compiled bytecode";

struct Options {
    engine: Engine,
    out_path: Option<String>,
    koko: bool,
    file: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        engine: Engine::Vm,
        out_path: None,
        koko: false,
        file: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            "-e" | "--engine" => match args.next().as_deref() {
                Some("vm") => options.engine = Engine::Vm,
                Some("evaluator") => options.engine = Engine::Evaluator,
                Some(other) => {
                    return Err(format!(
                        "options are \"vm\" or \"evaluator\", got {:?}",
                        other
                    ))
                }
                None => return Err("missing value for --engine".to_string()),
            },
            "-o" | "--out" => match args.next() {
                Some(path) => options.out_path = Some(path),
                None => return Err("missing value for --out".to_string()),
            },
            "-k" | "--koko" => options.koko = true,
            _ if arg.starts_with('-') => return Err(format!("unknown option {:?}", arg)),
            _ => {
                if options.file.is_some() {
                    return Err("only one input file is supported".to_string());
                }
                options.file = Some(arg);
            }
        }
    }

    if options.file.as_deref().is_some_and(|f| f.ends_with(".koko"))
        && options.out_path.is_none()
    {
        options.koko = true;
    }

    // flag validation
    if options.koko && options.engine == Engine::Evaluator {
        return Err("bytecode can only be interpreted using the vm engine".to_string());
    }
    if options.koko && options.out_path.is_some() {
        return Err("bytecode can only be executed, not compiled".to_string());
    }
    if options.out_path.is_some() && options.engine == Engine::Evaluator {
        return Err("cannot compile to bytecode with the evaluator engine".to_string());
    }

    Ok(options)
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    let Some(file) = options.file else {
        if options.koko || options.out_path.is_some() {
            eprintln!("no input file");
            eprintln!("{}", USAGE);
            process::exit(2);
        }
        repl::start(options.engine);
        return;
    };

    if options.koko {
        run_koko(&file);
        return;
    }

    let source = match fs::read_to_string(&file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("could not read file {}: {}", file, err);
            process::exit(1);
        }
    };

    if let Some(out_path) = options.out_path {
        compile_to_file(&source, &out_path);
        return;
    }

    match monkeylang::run(&source, options.engine) {
        Ok(value) => println!("{}", value),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn run_koko(path: &str) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("could not read file {}: {}", path, err);
            process::exit(1);
        }
    };

    match monkeylang::run_serialized(&bytes) {
        Ok(value) => println!("{}", value),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn compile_to_file(source: &str, out_path: &str) {
    let result = parse(source)
        .and_then(|program| {
            bytecode::Compiler::new()
                .compile(&program)
                .map_err(Into::into)
        })
        .and_then(|bytecode| bytecode.serialize().map_err(Into::into));

    let bytes: Vec<u8> = match result {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    if let Err(err) = fs::write(out_path, bytes) {
        eprintln!("could not write to file {}: {}", out_path, err);
        process::exit(1);
    }
}
