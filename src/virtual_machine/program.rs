//! Binary program representation and serialization.
//!
//! A program file is the concatenation of its encoded [`Instruction`]s: no
//! magic, no version, no length field. Assembled programs end with the
//! `(0, 0)` sentinel, which decodes as `end`.

use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use std::fs;
use std::path::Path;

/// Compiled program: an ordered list of instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The program as the flat 32-bit word stream the VM fetches from.
    pub fn words(&self) -> Vec<i32> {
        self.instructions
            .iter()
            .flat_map(|i| [i.word as i32, i.value])
            .collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * Instruction::SIZE);
        for instr in &self.instructions {
            instr.encode(&mut out);
        }
        out
    }

    /// Decodes a program image. The length must be a multiple of 8 bytes.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        if input.len() % Instruction::SIZE != 0 {
            return Err(VMError::InvalidProgram {
                reason: format!(
                    "{} bytes is not a whole number of {}-byte instructions",
                    input.len(),
                    Instruction::SIZE
                ),
            });
        }

        let mut instructions = Vec::with_capacity(input.len() / Instruction::SIZE);
        while !input.is_empty() {
            instructions.push(Instruction::decode(&mut input)?);
        }
        Ok(Self { instructions })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, VMError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| VMError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), VMError> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()).map_err(|source| VMError::IoError {
            path: path.display().to_string(),
            source,
        })
    }
}
