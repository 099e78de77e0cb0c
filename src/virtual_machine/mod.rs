//! Stack virtual machine with a two-pass assembler.
//!
//! Source files are assembled into a flat stream of `(word, value)` pairs
//! and executed by [`vm::VM`], which owns 14 general-purpose registers, an
//! operand stack, a call stack and a key-addressed heap that can be
//! persisted to a record file.
//!
//! # Architecture
//!
//! - **Registers**: `ax bx cx dx r1 .. r10`, 4 bytes each, read as a signed
//!   byte, an `i32` or an `f32` depending on the arithmetic mode
//! - **Stacks**: 1024 slots each; overflow and underflow end execution
//! - **Heap**: byte buffers keyed by `i32`, optionally written through to disk
//! - **Modes**: `int` switches byte/word memory access and char/int/float
//!   arithmetic, and dumps the stack, heap or registers
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, diagnostics, and label resolution
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction table, opcodes and register encoding
//! - [`lexer`]: Tokens for the assembler
//! - [`program`]: Binary program images
//! - [`repl`]: Interactive session
//! - [`vm`]: Execution engine, heap and console

pub mod assembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod lexer;
pub mod program;
pub mod repl;
pub mod vm;
