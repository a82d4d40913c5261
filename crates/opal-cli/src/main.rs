//! Command-line driver for the Opal interpreter.
//!
//! `opal [options] <input.txt>` compiles and runs a source file. Options
//! can dump the syntax tree or the compiled bytecode, or stop after
//! compilation. Exit code 0 on success; 1 on user error, compile failure
//! or runtime error.

use std::env;
use std::fs;
use std::process::ExitCode;

use opal::{ast_dump, compile, StdPrint, Vm};

struct CliOptions {
    show_ast: bool,
    disasm_func: bool,
    dump_cpool: bool,
    run: bool,
    input: String,
}

fn print_help() {
    println!("Usage  : opal [options] <inputfile>");
    println!();
    println!("Opal expects input files with extension .txt");
    println!();
    println!("Options:");
    println!("========");
    println!();
    println!("[--help]  (-h)");
    println!("        Prints this help text");
    println!();
    println!("[--show-ast]  (-ast)");
    println!("        Prints the syntax tree generated after parsing");
    println!();
    println!("[--disasm-func]  (-dasm)");
    println!("        Prints the disassembled bytecode after compilation");
    println!();
    println!("[--dump-cpool]  (-cpool)");
    println!("        Prints the contents of the main function's constant pool after compilation");
    println!();
    println!("[--compile-only]  (-c)");
    println!("        Skips execution of the program after compilation");
}

fn is_option(arg: &str, longhand: &str, shorthand: &str) -> bool {
    arg == longhand || arg == shorthand
}

fn is_valid_input(input: &str) -> bool {
    input.len() >= 4 && input.ends_with(".txt")
}

/// Returns `Ok(None)` when help was requested, `Err` on a fatal usage error.
fn parse_cli_options(args: &[String]) -> Result<Option<CliOptions>, String> {
    if args.len() < 2 {
        return Err("No input file specified; use option --help (-h) for more information".to_owned());
    }
    if is_option(&args[1], "--help", "-h") {
        print_help();
        return Ok(None);
    }

    let input = &args[args.len() - 1];
    if !is_valid_input(input) {
        return Err("Invalid input file specified".to_owned());
    }

    let mut options = CliOptions {
        show_ast: false,
        disasm_func: false,
        dump_cpool: false,
        run: true,
        input: input.clone(),
    };

    for arg in &args[1..args.len() - 1] {
        if is_option(arg, "--show-ast", "-ast") {
            options.show_ast = true;
        } else if is_option(arg, "--disasm-func", "-dasm") {
            options.disasm_func = true;
        } else if is_option(arg, "--dump-cpool", "-cpool") {
            options.dump_cpool = true;
        } else if is_option(arg, "--compile-only", "-c") {
            options.run = false;
        } else {
            eprintln!("opal warning : Unknown option {arg}; use option --help (-h) for more information");
        }
    }

    Ok(Some(options))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let options = match parse_cli_options(&args) {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("opal fatal   : {message}");
            return ExitCode::FAILURE;
        }
    };

    let source = match fs::read_to_string(&options.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("opal fatal   : Could not load file {}: {err}", options.input);
            return ExitCode::FAILURE;
        }
    };

    if options.show_ast {
        match ast_dump(&source) {
            Ok(dump) => print!("{dump}"),
            Err(errors) => {
                eprint!("{errors}");
                return ExitCode::FAILURE;
            }
        }
    }

    let program = match compile(&source) {
        Ok(program) => program,
        Err(errors) => {
            eprint!("{errors}");
            eprintln!("opal fatal   : Compilation failed with {} error(s)", errors.count);
            return ExitCode::FAILURE;
        }
    };

    if options.disasm_func {
        print!("{}", program.disassemble());
    }
    if options.dump_cpool {
        print!("{}", program.dump_constants());
    }
    if !options.run {
        return ExitCode::SUCCESS;
    }

    let mut print = StdPrint;
    let mut vm = Vm::new(program, &mut print);
    match vm.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Runtime error: {err}");
            ExitCode::FAILURE
        }
    }
}
