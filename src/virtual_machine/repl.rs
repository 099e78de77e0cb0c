//! Interactive session.
//!
//! Reads one line at a time from the [`Console`]. Session commands are
//! matched by prefix (`sta` is enough for `stack`); every other line is
//! assembled and its instructions run immediately against the live VM.

use crate::error;
use crate::virtual_machine::assembler::assemble_instructions;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::{Console, DisplayMode, VM};

const PROMPT: &str = "> ";

const BANNER: &str = "ZVM interactive mode, type 'help' for help\n";

const HELP: &str = "\
Available commands:
\tregister\tshow registers
\tstack\t\tshow stack
\tmemory\t\tshow memory
\tclear\t\tzero registers and stack
\tdisplay <n>\tdump format: 0 hex, 1 decimal, 2 char
\tload <file>\tload and run a program
\tquit\t\texit vm
Any other line is assembled and executed.
";

/// A session command, or a line of assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Stack,
    Memory,
    Registers,
    Clear,
    Display(Option<&'a str>),
    Load(Option<&'a str>),
    Quit,
    Source(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let argument = || line.split_whitespace().nth(1);
        if line.starts_with("sta") {
            Command::Stack
        } else if line.starts_with("mem") {
            Command::Memory
        } else if line.starts_with("reg") {
            Command::Registers
        } else if line.starts_with("quit") {
            Command::Quit
        } else if line.starts_with("help") {
            Command::Help
        } else if line.starts_with("clear") {
            Command::Clear
        } else if line.starts_with("dis") {
            Command::Display(argument())
        } else if line.starts_with("load") {
            Command::Load(argument())
        } else {
            Command::Source(line)
        }
    }
}

/// Runs the session until `quit`, end of input, or a fatal error.
///
/// Non-fatal errors are reported and the session continues with the VM
/// state as the failing instruction left it.
pub fn run_repl<C: Console>(vm: &mut VM, console: &mut C) -> Result<(), VMError> {
    console.write_str(BANNER)?;
    loop {
        console.write_str(PROMPT)?;
        let Some(line) = console.read_line()? else {
            console.write_str("\n")?;
            return Ok(());
        };

        let command = Command::parse(&line);
        if command == Command::Quit {
            return Ok(());
        }
        match dispatch(vm, console, command) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => error!("{err}"),
        }
    }
}

fn dispatch<C: Console>(vm: &mut VM, console: &mut C, command: Command) -> Result<(), VMError> {
    match command {
        Command::Help => console.write_str(HELP)?,
        Command::Stack => console.write_str(&vm.stack_dump())?,
        Command::Memory => console.write_str(&vm.memory_dump())?,
        Command::Registers => console.write_str(&vm.register_dump())?,
        Command::Clear => vm.clear(),
        Command::Display(code) => {
            match code.and_then(|c| c.parse().ok()).and_then(DisplayMode::from_code) {
                Some(mode) => vm.set_display_mode(mode),
                None => error!("usage: display <0|1|2>"),
            }
        }
        Command::Load(None) => error!("usage: load <file>"),
        Command::Load(Some(path)) => {
            let program = Program::read_file(path)?;
            vm.load_program(&program);
            vm.run(console)?;
        }
        Command::Quit => {}
        Command::Source(source) => {
            for instr in assemble_instructions(source)? {
                vm.execute(instr, console)?;
            }
            console.flush()?;
        }
    }
    Ok(())
}
