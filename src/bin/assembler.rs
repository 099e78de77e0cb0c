//! Assembly to bytecode compiler CLI.
//!
//! Reads an assembly source file and writes the `.zvm` program image.
//!
//! # Usage
//! ```text
//! assemble <input.asm> [output.zvm] [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file to compile
//! - `output.zvm`: Output file path (defaults to the input with a `.zvm` extension)
//!
//! # Options
//! - `-d`: Print the label table and encoded instructions
//!
//! # Examples
//! ```text
//! assemble hello.asm
//! assemble hello.asm build/hello.zvm -d
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use zvm::virtual_machine::assembler::assemble_file_detailed;
use zvm::{error, info};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<PathBuf> = None;
    let mut listing = false;

    for arg in &args[2..] {
        match arg.as_str() {
            "-d" => listing = true,
            other if other.starts_with('-') => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            other => {
                if output_path.is_some() {
                    error!("Only one output file can be given, got '{}'", other);
                    process::exit(1);
                }
                output_path = Some(PathBuf::from(other));
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| default_output_path(input_path));

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let assembled = match assemble_file_detailed(input_path) {
        Ok(a) => a,
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    if listing {
        print!("{}", assembled.listing());
    }

    let bytecode = assembled.program.to_bytes();

    if let Err(e) = fs::write(&output_path, &bytecode) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Compiled {} -> {} ({} instructions, {} bytes)",
        input_path,
        output_path.display(),
        assembled.program.len(),
        bytecode.len()
    );
}

/// `input` with its last extension replaced by `.zvm`, or `.zvm` appended.
fn default_output_path(input: &str) -> PathBuf {
    Path::new(input).with_extension("zvm")
}

const USAGE: &str = "\
ZVM Assembler

USAGE:
    {program} <input.asm> [output.zvm] [OPTIONS]

ARGS:
    <input.asm>     Assembly source file to compile
    [output.zvm]    Output file path (defaults to <input>.zvm)

OPTIONS:
    -d              Print the label table and encoded instructions
    -h, --help      Print this help message

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile with explicit output and a listing
    {program} program.asm out/program.zvm -d
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
