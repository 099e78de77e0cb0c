use crate::storage::record_file::StorageError;
use crate::types::encoding::DecodeError;
use std::fmt;
use std::io;
use zvm_derive::Error;

/// Which of the two bounded stacks faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Operand,
    Call,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Operand => write!(f, "operand stack"),
            StackKind::Call => write!(f, "call stack"),
        }
    }
}

/// Errors that can occur during assembly or VM execution.
#[derive(Debug, Error)]
pub enum VMError {
    // ----- assembly -----
    /// Character or literal the lexer cannot turn into a token.
    #[error("line {line}, column {column}: {message}")]
    LexError {
        line: usize,
        column: usize,
        message: String,
    },
    /// Token sequence that does not form an instruction.
    #[error("line {line}, column {column}: {message}")]
    SyntaxError {
        line: usize,
        column: usize,
        message: String,
    },
    /// Label defined more than once.
    #[error("line {line}, column {column}: duplicate label: {label}")]
    DuplicateLabel {
        label: String,
        line: usize,
        column: usize,
    },
    /// Jump or call to a label that is never defined.
    #[error("line {line}, column {column}: label {label} not found")]
    UndefinedLabel {
        label: String,
        line: usize,
        column: usize,
    },
    /// Source or program file could not be read or written.
    #[error("{path}: {source}")]
    IoError { path: String, source: io::Error },

    // ----- program loading -----
    /// Program image is not a whole number of instruction word pairs.
    #[error("invalid program: {reason}")]
    InvalidProgram { reason: String },
    #[error("decoding error: {0}")]
    Decode(#[from] DecodeError),

    // ----- execution -----
    /// Opcode byte outside the instruction table.
    #[error("bad instruction {opcode}")]
    InvalidOpcode { opcode: u8 },
    #[error("{stack} overflow")]
    StackOverflow { stack: StackKind },
    #[error("{stack} underflow")]
    StackUnderflow { stack: StackKind },
    /// Heap access to a key with no entry.
    #[error("heap key {key} not found")]
    HeapKey { key: i32 },
    /// Read outside the bounds of an existing heap entry.
    #[error("heap key {key}: offset {offset} out of range for {len} bytes")]
    HeapRange { key: i32, offset: i64, len: usize },
    #[error("division by zero")]
    DivisionByZero,
    /// `print` with an unsupported conversion character.
    #[error("malformed format specifier {spec:?}")]
    InvalidFormat { spec: char },
    /// `prc` could not launch or read its command.
    #[error("subprocess '{command}' failed: {reason}")]
    Subprocess { command: String, reason: String },
    #[error("register index {index} out of bounds")]
    InvalidRegisterIndex { index: u8 },
    /// Fetch past the last instruction of the program.
    #[error("program counter {pc} outside program of {len} words")]
    PcOutOfBounds { pc: usize, len: usize },
    /// Console read or write failed.
    #[error("console i/o: {0}")]
    Console(#[from] io::Error),
    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl VMError {
    /// Stack faults end the session; every other runtime error only stops the
    /// current program.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VMError::StackOverflow { .. } | VMError::StackUnderflow { .. }
        )
    }

    /// Line, column and bare message for errors tied to a source location.
    pub fn source_location(&self) -> Option<(usize, usize, String)> {
        match self {
            VMError::LexError {
                line,
                column,
                message,
            }
            | VMError::SyntaxError {
                line,
                column,
                message,
            } => Some((*line, *column, message.clone())),
            VMError::DuplicateLabel {
                label,
                line,
                column,
            } => Some((*line, *column, format!("duplicate label: {label}"))),
            VMError::UndefinedLabel {
                label,
                line,
                column,
            } => Some((*line, *column, format!("label {label} not found"))),
            _ => None,
        }
    }
}
