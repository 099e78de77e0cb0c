//! ZVM runner.
//!
//! Runs an assembled program, or starts an interactive session when no
//! program is given.
//!
//! # Usage
//! ```text
//! vm [OPTIONS] [program.zvm]
//! ```
//!
//! # Options
//! - `-d`: Trace every executed instruction
//! - `-w`: Write heap changes through to the bootfile
//! - `-c <file>`: Configuration file (defaults to `vm.ini` when present)
//!
//! The configuration may name a `bootfile` the heap is loaded from before
//! execution. Command-line flags can only switch tracing and write-through
//! on, never off.

use std::env;
use std::path::PathBuf;
use std::process;
use zvm::utils::config::{Config, DEFAULT_CONFIG_FILE};
use zvm::utils::log::set_debug;
use zvm::virtual_machine::errors::VMError;
use zvm::virtual_machine::program::Program;
use zvm::virtual_machine::repl::run_repl;
use zvm::virtual_machine::vm::{Heap, Terminal, VM};
use zvm::{error, info, warn};

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut debug = false;
    let mut writeable = false;
    let mut config_path: Option<PathBuf> = None;
    let mut program_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            "-d" => {
                debug = true;
                i += 1;
            }
            "-w" => {
                writeable = true;
                i += 1;
            }
            "-c" => {
                i += 1;
                if i >= args.len() {
                    error!("-c requires an argument");
                    process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i]));
                i += 1;
            }
            other if other.starts_with('-') => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            other => {
                if program_path.is_some() {
                    error!("Only one program file can be given, got '{}'", other);
                    process::exit(1);
                }
                program_path = Some(other.to_string());
                i += 1;
            }
        }
    }

    // An explicit -c must exist; the default file is optional.
    let loaded = match &config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(DEFAULT_CONFIG_FILE),
    };
    let config = loaded.unwrap_or_else(|e| {
        error!("Invalid configuration: {e}");
        process::exit(1);
    });

    set_debug(debug || config.debug);
    let writeable = writeable || config.writeable;

    let heap = match &config.bootfile {
        Some(path) => Heap::open(path, writeable).unwrap_or_else(|e| {
            error!("Failed to load bootfile {}: {e}", path.display());
            process::exit(1);
        }),
        None => {
            if writeable {
                warn!("write-through requested but no bootfile is configured");
            }
            Heap::new()
        }
    };

    let mut vm = VM::new(heap);
    let mut console = Terminal::stdio();

    let result = match &program_path {
        Some(path) => Program::read_file(path).and_then(|program| {
            vm.load_program(&program);
            vm.run(&mut console)
        }),
        None => run_repl(&mut vm, &mut console),
    };

    if let Err(e) = result {
        report_fault(&vm, &e);
        process::exit(1);
    }
}

fn report_fault(vm: &VM, err: &VMError) {
    match err {
        VMError::IoError { .. } | VMError::InvalidProgram { .. } | VMError::Decode(_) => {
            error!("{err}")
        }
        _ => error!("{err} (pc {})", vm.pc()),
    }
}

const USAGE: &str = "\
ZVM

USAGE:
    {program} [OPTIONS] [program.zvm]

ARGS:
    [program.zvm]    Assembled program to run (starts an interactive session if omitted)

OPTIONS:
    -d               Trace every executed instruction
    -w               Write heap changes through to the bootfile
    -c <file>        Configuration file (default: vm.ini, skipped when absent)
    -h, --help       Print this help message

CONFIGURATION:
    [general]
    bootfile=boot.dat
    writeable=true
    debug=false

EXAMPLES:
    # Run a program
    {program} hello.zvm

    # Run with tracing and persist heap changes
    {program} -d -w hello.zvm

    # Interactive session
    {program}
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
