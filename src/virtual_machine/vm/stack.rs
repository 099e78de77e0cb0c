use crate::virtual_machine::errors::{StackKind, VMError};

/// Slots in each of the operand and call stacks.
pub const STACK_SIZE: usize = 1024;

/// Bounded LIFO of 32-bit slots.
#[derive(Debug, Clone)]
pub(super) struct Stack {
    kind: StackKind,
    slots: Vec<i32>,
}

impl Stack {
    pub(super) fn new(kind: StackKind) -> Self {
        Self {
            kind,
            slots: Vec::with_capacity(STACK_SIZE),
        }
    }

    pub(super) fn push(&mut self, value: i32) -> Result<(), VMError> {
        if self.slots.len() >= STACK_SIZE {
            return Err(VMError::StackOverflow { stack: self.kind });
        }
        self.slots.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<i32, VMError> {
        self.slots
            .pop()
            .ok_or(VMError::StackUnderflow { stack: self.kind })
    }

    pub(super) fn peek(&self) -> Result<i32, VMError> {
        self.slots
            .last()
            .copied()
            .ok_or(VMError::StackUnderflow { stack: self.kind })
    }

    pub(super) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(super) fn clear(&mut self) {
        self.slots.clear();
    }

    /// Bottom to top.
    pub(super) fn as_slice(&self) -> &[i32] {
        &self.slots
    }
}
