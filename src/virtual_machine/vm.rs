//! Core virtual machine implementation.
//!
//! The VM fetches `(word, value)` pairs from a flat 32-bit word stream,
//! decodes them and dispatches to one `op_*` handler per [`Opcode`].
//! Register contents are raw 4-byte cells; the arithmetic mode decides
//! whether `add`, `print` and friends see them as a signed byte, an `i32`
//! or an `f32`. Heap opcodes work on whole entries of the key-addressed
//! [`Heap`], which may write through to a record file.

mod console;
mod format;
mod heap;
mod registers;
mod stack;
#[cfg(test)]
mod tests;

pub use console::{Console, Terminal};
pub use heap::Heap;
pub use stack::STACK_SIZE;

use crate::virtual_machine::errors::{StackKind, VMError};
use crate::virtual_machine::isa::{Instruction, Opcode, Register};
use crate::virtual_machine::program::Program;
use crate::{debug, warn};
use format::{PrintValue, format_value};
use registers::Registers;
use stack::Stack;
use std::fmt::Write as _;
use std::process::{Command, Stdio};

const DUMP_RULE: &str = "# # # # # # # # # # # # # # # # # # # # # # # # # # # # # #";

/// Width of `ldm`/`stm`/`puts`/`gets` accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryMode {
    #[default]
    Byte,
    Word,
}

impl MemoryMode {
    pub const fn width(self) -> usize {
        match self {
            MemoryMode::Byte => 1,
            MemoryMode::Word => 4,
        }
    }
}

/// How arithmetic and `print` interpret register and stack cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArithMode {
    #[default]
    Char,
    Int,
    Float,
}

/// Number format used by the stack and memory dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Hex,
    Decimal,
    Char,
}

impl DisplayMode {
    /// `0` hex, `1` decimal, `2` character.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DisplayMode::Hex),
            1 => Some(DisplayMode::Decimal),
            2 => Some(DisplayMode::Char),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Loaded,
    Running,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn int(self, a: i32, b: i32) -> Result<i32, VMError> {
        Ok(match self {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div if b == 0 => return Err(VMError::DivisionByZero),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Mod if b == 0 => return Err(VMError::DivisionByZero),
            ArithOp::Mod => a.wrapping_rem(b),
        })
    }

    fn float(self, a: f32, b: f32) -> f32 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
        }
    }
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        console = $console:ident,
        instr = $instr:ident,
        opcode = $opcode:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                Opcode::$variant => {
                    let instr_name = $opcode.mnemonic();
                    exec_vm!(@call $vm, $console, $instr, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    // Handler that talks to the console (semicolon separator)
    (@call $vm:ident, $console:ident, $instr:ident, $instr_name:expr, $handler:ident,
        (console; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $instr, $kind); )*
        $vm.$handler($instr_name, $console, $( $field ),*)
    }};

    // Handler without console (no semicolon)
    (@call $vm:ident, $console:ident, $instr:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $instr, $kind); )*
        $vm.$handler($instr_name, $( $field ),*)
    }};

    (@read $instr:ident, Reg1) => { $instr.reg1() };
    (@read $instr:ident, Reg2) => { $instr.reg2() };
    (@read $instr:ident, Imm) => { $instr.value };
}

/// Stack virtual machine.
///
/// Holds the program words, the register file, both stacks, the heap and the
/// mode switches. A program runs from `pc = 0` until `end` or the first
/// error; the interactive session instead feeds single instructions to
/// [`VM::execute`] against the same state.
pub struct VM {
    /// Program as flat `(word, value)` pairs.
    code: Vec<i32>,
    /// Word offset of the next fetch; always even.
    pc: usize,
    registers: Registers,
    stack: Stack,
    call_stack: Stack,
    heap: Heap,
    /// Result of the last comparison.
    zero_flag: bool,
    memory_mode: MemoryMode,
    arith_mode: ArithMode,
    display_mode: DisplayMode,
    state: VmState,
}

impl VM {
    /// Creates a VM with no program around `heap`.
    pub fn new(heap: Heap) -> Self {
        Self {
            code: Vec::new(),
            pc: 0,
            registers: Registers::new(),
            stack: Stack::new(StackKind::Operand),
            call_stack: Stack::new(StackKind::Call),
            heap,
            zero_flag: false,
            memory_mode: MemoryMode::default(),
            arith_mode: ArithMode::default(),
            display_mode: DisplayMode::default(),
            state: VmState::Loaded,
        }
    }

    pub fn with_program(program: &Program, heap: Heap) -> Self {
        let mut vm = Self::new(heap);
        vm.load_program(program);
        vm
    }

    /// Replaces the program and rewinds `pc`. Registers, stacks, heap and
    /// modes are kept.
    pub fn load_program(&mut self, program: &Program) {
        self.code = program.words();
        self.pc = 0;
        self.state = VmState::Loaded;
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn zero_flag(&self) -> bool {
        self.zero_flag
    }

    pub fn memory_mode(&self) -> MemoryMode {
        self.memory_mode
    }

    pub fn arith_mode(&self) -> ArithMode {
        self.arith_mode
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    /// Integer view of a register.
    pub fn register(&self, reg: Register) -> i32 {
        self.registers
            .named()
            .find(|(r, _)| *r == reg)
            .map_or(0, |(_, v)| v)
    }

    /// Operand stack, bottom to top.
    pub fn stack(&self) -> &[i32] {
        self.stack.as_slice()
    }

    /// Zeroes the registers and empties the operand stack.
    pub fn clear(&mut self) {
        self.registers.clear();
        self.stack.clear();
    }

    /// Runs from the current `pc` until `end` or an error.
    ///
    /// The VM is halted afterwards either way and console output is flushed.
    pub fn run<C: Console>(&mut self, console: &mut C) -> Result<(), VMError> {
        self.state = VmState::Running;
        let mut result = Ok(());
        while self.state == VmState::Running {
            if let Err(err) = self.step(console) {
                result = Err(err);
                break;
            }
        }
        self.state = VmState::Halted;
        let flushed = console.flush();
        result?;
        Ok(flushed?)
    }

    /// Fetches, decodes and executes the instruction at `pc`.
    pub fn step<C: Console>(&mut self, console: &mut C) -> Result<(), VMError> {
        let (Some(&word), Some(&value)) = (self.code.get(self.pc), self.code.get(self.pc + 1))
        else {
            return Err(VMError::PcOutOfBounds {
                pc: self.pc,
                len: self.code.len(),
            });
        };
        self.pc += 2;
        self.execute(
            Instruction {
                word: word as u32,
                value,
            },
            console,
        )
    }

    /// Executes one decoded instruction against the current state.
    ///
    /// Unknown opcodes, including the reserved `addi`, are logged and skipped.
    pub fn execute<C: Console>(&mut self, instr: Instruction, console: &mut C) -> Result<(), VMError> {
        debug!(
            "rs: {}, ps: {}, pc: {}\t| ins: {}, r1: {}, r2: {}, val: {}",
            self.call_stack.len(),
            self.stack.len(),
            self.pc,
            instr.opcode(),
            instr.reg1(),
            instr.reg2(),
            instr.value
        );

        let opcode = match Opcode::try_from(instr.opcode()) {
            Ok(opcode) => opcode,
            Err(err) => {
                warn!("{err} at pc {}", self.pc);
                return Ok(());
            }
        };

        exec_vm! {
            vm = self,
            console = console,
            instr = instr,
            opcode = opcode,
            {
                End => op_end(),
                // Registers and stack
                Mov => op_mov(dst: Reg1, src: Reg2, imm: Imm),
                Push => op_push(src: Reg1, imm: Imm),
                Pop => op_pop(dst: Reg1),
                Ldr => op_ldr(src: Reg1),
                Str => op_str(dst: Reg1),
                // Heap access
                Ldm => op_ldm(),
                Stm => op_stm(),
                Ldmr => op_ldmr(),
                Stmr => op_stmr(),
                // Arithmetic
                Add => op_add(dst: Reg1, src: Reg2, imm: Imm),
                Addi => op_reserved(),
                Sub => op_sub(dst: Reg1, src: Reg2, imm: Imm),
                Mul => op_mul(dst: Reg1, src: Reg2, imm: Imm),
                Div => op_div(dst: Reg1, src: Reg2, imm: Imm),
                Mod => op_mod(dst: Reg1, src: Reg2, imm: Imm),
                // Comparison
                Eq => op_eq(),
                Lt => op_lt(),
                Gt => op_gt(),
                Leq => op_leq(),
                Geq => op_geq(),
                // Control flow
                Jmp => op_jmp(target: Imm),
                Jz => op_jz(target: Imm),
                Jnz => op_jnz(target: Imm),
                Ret => op_ret(),
                Call => op_call(target: Imm),
                // Console and heap I/O
                Print => op_print(console;),
                Printc => op_printc(console;),
                Read => op_read(console;),
                Write => op_write(console;),
                Puts => op_puts(),
                Gets => op_gets(),
                Readc => op_readc(console;),
                Cmp => op_cmp(),
                Prc => op_prc(console;),
                // Misc
                Si => op_si(dst: Reg1),
                Inc => op_inc(dst: Reg1),
                Dec => op_dec(dst: Reg1),
                Int => op_int(console; src: Reg1, imm: Imm),
            }
        }
    }

    // ==================== Dumps ====================

    /// Operand stack, top first, in the current display mode.
    pub fn stack_dump(&self) -> String {
        let mut out = String::from("\nSTACK DUMP # # # # # # # # # # # # # # # # # # # # # # # #\n");
        for (i, value) in self.stack.as_slice().iter().rev().enumerate() {
            let _ = write!(out, "{}", self.display_word(*value));
            out.push_str(if i == 0 { " <-- top\n" } else { "\n" });
        }
        let depth = self.stack.len();
        let _ = write!(out, "TOTAL: {} elements / {} bytes", depth, depth * 4);
        let _ = write!(out, "\n{DUMP_RULE}\n\n");
        out
    }

    /// Heap entries in key order, in the current display mode.
    pub fn memory_dump(&self) -> String {
        let mut out = String::from("\nMEMORY DUMP # # # # # # # # # # # # # # # # # # # # # # # #\n");
        for (key, data) in self.heap.iter() {
            let _ = write!(out, "[ {key} ] ");
            for byte in data {
                let _ = write!(out, "{}", self.display_byte(*byte));
            }
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "TOTAL: {} elements / {} bytes",
            self.heap.len(),
            self.heap.total_bytes()
        );
        let _ = write!(out, "{DUMP_RULE}\n\n");
        out
    }

    /// Every named register in binary, hex and decimal, then the zero flag.
    pub fn register_dump(&self) -> String {
        let mut out = String::from("\nREGISTERS # # # # # # # # # # # # # # # # # # # # # # # # #\n");
        for (i, (reg, value)) in self.registers.named().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            // Blank line before r1 and r6.
            if i == 4 || i == 9 {
                out.push('\n');
            }
            let _ = write!(
                out,
                "{}:\t{:032b} 0x{:08x} {}",
                reg.name().to_uppercase(),
                value,
                value,
                value
            );
        }
        let _ = write!(out, "\n\nzeroflag: {}", self.zero_flag as u8);
        let _ = write!(out, "\n{DUMP_RULE}\n\n");
        out
    }

    fn display_word(&self, value: i32) -> String {
        match self.display_mode {
            DisplayMode::Hex => format!("0x{value:08x} "),
            DisplayMode::Decimal => format!("{value} "),
            DisplayMode::Char => format!("{} ", char::from(value as u8)),
        }
    }

    fn display_byte(&self, byte: u8) -> String {
        match self.display_mode {
            DisplayMode::Hex => format!("0x{byte:02x} "),
            DisplayMode::Decimal => format!("{} ", byte as i8),
            DisplayMode::Char => format!("{} ", char::from(byte)),
        }
    }

    // ==================== Helpers ====================

    /// `len` bytes of entry `key` starting at `offset`.
    fn heap_slice(&self, key: i32, offset: i32, len: usize) -> Result<&[u8], VMError> {
        let data = self.heap.get(key)?;
        usize::try_from(offset)
            .ok()
            .and_then(|start| data.get(start..start.checked_add(len)?))
            .ok_or(VMError::HeapRange {
                key,
                offset: offset as i64,
                len: data.len(),
            })
    }

    /// Copy of entry `key`, grown with zeros to at least `min_len` bytes.
    fn heap_buffer(&self, key: i32, offset: i32, min_len: i64) -> Result<Vec<u8>, VMError> {
        let mut data = self.heap.get(key)?.to_vec();
        if offset < 0 {
            return Err(VMError::HeapRange {
                key,
                offset: offset as i64,
                len: data.len(),
            });
        }
        let min_len = usize::try_from(min_len).unwrap_or(0);
        if data.len() < min_len {
            data.resize(min_len, 0);
        }
        Ok(data)
    }

    fn compare(&mut self, test: fn(i32, i32) -> bool) -> Result<(), VMError> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.zero_flag = test(a, b);
        Ok(())
    }

    fn jump(&mut self, target: i32) {
        self.pc = (target as u32 as usize).saturating_mul(2);
    }

    fn arith(&mut self, op: ArithOp, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        let mode = match (op, self.arith_mode) {
            (ArithOp::Mod, ArithMode::Float) => ArithMode::Int,
            (_, mode) => mode,
        };
        match mode {
            ArithMode::Char => {
                let a = self.registers.get_char(dst)?;
                let b = if src != 0 {
                    self.registers.get_char(src)?
                } else {
                    imm as i8
                };
                let result = op.int(a as i32, b as i32)?;
                self.registers.set_char(dst, result as i8)
            }
            ArithMode::Int => {
                let a = self.registers.get_int(dst)?;
                let b = if src != 0 {
                    self.registers.get_int(src)?
                } else {
                    imm
                };
                let result = op.int(a, b)?;
                self.registers.set_int(dst, result)
            }
            ArithMode::Float => {
                let a = self.registers.get_float(dst)?;
                let b = if src != 0 {
                    self.registers.get_float(src)?
                } else {
                    imm as f32
                };
                self.registers.set_float(dst, op.float(a, b))
            }
        }
    }

    fn step_by_one(&mut self, dst: u8, delta: i32) -> Result<(), VMError> {
        match self.arith_mode {
            ArithMode::Char | ArithMode::Int => {
                let v = self.registers.get_int(dst)?;
                self.registers.set_int(dst, v.wrapping_add(delta))
            }
            ArithMode::Float => {
                let v = self.registers.get_float(dst)?;
                self.registers.set_float(dst, v + delta as f32)
            }
        }
    }

    // ==================== Handlers ====================

    fn op_end(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.state = VmState::Halted;
        Ok(())
    }

    fn op_reserved(&mut self, instr: &'static str) -> Result<(), VMError> {
        warn!("bad instruction '{instr}' at pc {}", self.pc);
        Ok(())
    }

    fn op_mov(&mut self, _instr: &'static str, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        let v = if src != 0 {
            self.registers.get_int(src)?
        } else {
            imm
        };
        self.registers.set_int(dst, v)
    }

    fn op_push(&mut self, _instr: &'static str, src: u8, imm: i32) -> Result<(), VMError> {
        if src == 0 {
            return self.stack.push(imm);
        }
        self.stack.push(self.registers.get_int(src)?)?;
        self.registers.set_int(src, 0)
    }

    fn op_pop(&mut self, _instr: &'static str, dst: u8) -> Result<(), VMError> {
        let v = self.stack.pop()?;
        self.registers.set_int(dst, v)
    }

    fn op_ldr(&mut self, _instr: &'static str, src: u8) -> Result<(), VMError> {
        self.stack.push(self.registers.get_int(src)?)
    }

    fn op_str(&mut self, _instr: &'static str, dst: u8) -> Result<(), VMError> {
        let v = self.stack.peek()?;
        self.registers.set_int(dst, v)
    }

    fn op_ldm(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let pos = self.stack.pop()?;
        let loc = self.stack.pop()?;
        let bytes = self.heap_slice(loc, pos, self.memory_mode.width())?;
        let v = match *bytes {
            [b] => b as i32,
            [b0, b1, b2, b3] => i32::from_le_bytes([b0, b1, b2, b3]),
            _ => 0,
        };
        self.stack.push(v)
    }

    fn op_stm(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let pos = self.stack.pop()?;
        let loc = self.stack.pop()?;
        let val = self.stack.pop()?;
        let width = self.memory_mode.width();
        let mut data = self.heap_buffer(loc, pos, pos as i64 + width as i64)?;
        let start = pos as usize;
        match self.memory_mode {
            MemoryMode::Byte => data[start] = val as u8,
            MemoryMode::Word => data[start..start + 4].copy_from_slice(&val.to_le_bytes()),
        }
        Ok(self.heap.store(loc, data)?)
    }

    fn op_ldmr(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let end = self.stack.pop()?;
        let start = self.stack.pop()?;
        let loc = self.stack.pop()?;
        if end < start {
            self.heap.get(loc)?;
            return Ok(());
        }
        let len = (end as i64 - start as i64 + 1) as usize;
        let bytes = self.heap_slice(loc, start, len)?.to_vec();
        for byte in bytes.iter().rev() {
            self.stack.push(*byte as i32)?;
        }
        Ok(())
    }

    fn op_stmr(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let end = self.stack.pop()?;
        let start = self.stack.pop()?;
        let loc = self.stack.pop()?;
        let mut data = self.heap_buffer(loc, start, end as i64 + 1)?;
        if end >= start {
            for i in start as usize..=end as usize {
                data[i] = self.stack.pop()? as u8;
            }
        }
        Ok(self.heap.store(loc, data)?)
    }

    fn op_add(&mut self, _instr: &'static str, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        self.arith(ArithOp::Add, dst, src, imm)
    }

    fn op_sub(&mut self, _instr: &'static str, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        self.arith(ArithOp::Sub, dst, src, imm)
    }

    fn op_mul(&mut self, _instr: &'static str, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        self.arith(ArithOp::Mul, dst, src, imm)
    }

    fn op_div(&mut self, _instr: &'static str, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        self.arith(ArithOp::Div, dst, src, imm)
    }

    fn op_mod(&mut self, _instr: &'static str, dst: u8, src: u8, imm: i32) -> Result<(), VMError> {
        self.arith(ArithOp::Mod, dst, src, imm)
    }

    fn op_eq(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|a, b| a == b)
    }

    fn op_lt(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|a, b| a < b)
    }

    fn op_gt(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|a, b| a > b)
    }

    fn op_leq(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|a, b| a <= b)
    }

    fn op_geq(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.compare(|a, b| a >= b)
    }

    fn op_jmp(&mut self, _instr: &'static str, target: i32) -> Result<(), VMError> {
        self.jump(target);
        Ok(())
    }

    fn op_jz(&mut self, _instr: &'static str, target: i32) -> Result<(), VMError> {
        if self.zero_flag {
            self.jump(target);
        }
        self.zero_flag = false;
        Ok(())
    }

    fn op_jnz(&mut self, _instr: &'static str, target: i32) -> Result<(), VMError> {
        if !self.zero_flag {
            self.jump(target);
        }
        self.zero_flag = false;
        Ok(())
    }

    fn op_ret(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.pc = self.call_stack.pop()? as u32 as usize;
        Ok(())
    }

    fn op_call(&mut self, _instr: &'static str, target: i32) -> Result<(), VMError> {
        self.call_stack.push(self.pc as i32)?;
        self.jump(target);
        Ok(())
    }

    fn op_print<C: Console>(&mut self, _instr: &'static str, console: &mut C) -> Result<(), VMError> {
        let spec = self.stack.pop()? as u8;
        let raw = self.stack.pop()?;
        let value = match self.arith_mode {
            ArithMode::Char => PrintValue::Char(raw as i8),
            ArithMode::Int => PrintValue::Int(raw),
            ArithMode::Float => PrintValue::Float(f32::from_bits(raw as u32)),
        };
        console.write_bytes(&format_value(spec, value)?)?;
        Ok(())
    }

    fn op_printc<C: Console>(&mut self, _instr: &'static str, console: &mut C) -> Result<(), VMError> {
        let c = self.stack.pop()? as u8;
        console.write_bytes(&[c])?;
        Ok(())
    }

    fn op_read<C: Console>(&mut self, _instr: &'static str, console: &mut C) -> Result<(), VMError> {
        let key = self.stack.pop()?;
        let mut data = console.read_line()?.unwrap_or_default().into_bytes();
        data.push(0);
        Ok(self.heap.store(key, data)?)
    }

    fn op_write<C: Console>(&mut self, _instr: &'static str, console: &mut C) -> Result<(), VMError> {
        let key = self.stack.pop()?;
        console.write_bytes(self.heap.get(key)?)?;
        Ok(())
    }

    fn op_puts(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let key = self.stack.pop()?;
        let count = self.stack.pop()?.max(0) as usize;
        // The count is program data; only what the stack holds is reserved.
        let mut data = Vec::with_capacity(count.min(self.stack.len()) * self.memory_mode.width());
        for _ in 0..count {
            let v = self.stack.pop()?;
            match self.memory_mode {
                MemoryMode::Byte => data.push(v as u8),
                MemoryMode::Word => data.extend_from_slice(&v.to_le_bytes()),
            }
        }
        Ok(self.heap.store(key, data)?)
    }

    fn op_gets(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let key = self.stack.pop()?;
        let elements: Vec<i32> = match self.memory_mode {
            MemoryMode::Byte => self.heap.get(key)?.iter().map(|b| *b as i32).collect(),
            MemoryMode::Word => self
                .heap
                .get(key)?
                .chunks(4)
                .map(|chunk| {
                    let mut word = [0u8; 4];
                    word[..chunk.len()].copy_from_slice(chunk);
                    i32::from_le_bytes(word)
                })
                .collect(),
        };
        for v in elements.into_iter().rev() {
            self.stack.push(v)?;
        }
        Ok(())
    }

    fn op_readc<C: Console>(&mut self, _instr: &'static str, console: &mut C) -> Result<(), VMError> {
        let c = console.read_byte()?.map_or(-1, i32::from);
        self.stack.push(c)
    }

    fn op_cmp(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.zero_flag = self.heap.get(a)? == self.heap.get(b)?;
        Ok(())
    }

    fn op_prc<C: Console>(&mut self, _instr: &'static str, console: &mut C) -> Result<(), VMError> {
        let dst = self.stack.pop()?;
        let cmd_key = self.stack.pop()?;
        let raw = self.heap.get(cmd_key)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        let command = String::from_utf8_lossy(&raw[..end]).into_owned();

        console.flush()?;
        let output = shell(&command)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|err| VMError::Subprocess {
                command: command.clone(),
                reason: err.to_string(),
            })?;
        Ok(self.heap.store(dst, output.stdout)?)
    }

    fn op_si(&mut self, _instr: &'static str, dst: u8) -> Result<(), VMError> {
        self.registers.set_int(dst, self.stack.len() as i32)
    }

    fn op_inc(&mut self, _instr: &'static str, dst: u8) -> Result<(), VMError> {
        self.step_by_one(dst, 1)
    }

    fn op_dec(&mut self, _instr: &'static str, dst: u8) -> Result<(), VMError> {
        self.step_by_one(dst, -1)
    }

    fn op_int<C: Console>(
        &mut self,
        _instr: &'static str,
        console: &mut C,
        src: u8,
        imm: i32,
    ) -> Result<(), VMError> {
        let code = if src != 0 {
            self.registers.get_int(src)?
        } else {
            imm
        };
        match code {
            1 => self.memory_mode = MemoryMode::Byte,
            2 => self.memory_mode = MemoryMode::Word,
            3 => console.write_str(&self.stack_dump())?,
            4 => console.write_str(&self.memory_dump())?,
            5 => console.write_str(&self.register_dump())?,
            9 => self.arith_mode = ArithMode::Char,
            10 => self.arith_mode = ArithMode::Int,
            11 => self.arith_mode = ArithMode::Float,
            _ => {}
        }
        Ok(())
    }
}

/// `command` run through the platform shell.
fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}
