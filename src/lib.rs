//! ZVM library.
//!
//! Provides the assembler, the stack virtual machine with its persistent
//! heap, and the interactive session used by the `vm` binary.

pub mod storage;
pub mod types;
pub mod utils;
pub mod virtual_machine;
