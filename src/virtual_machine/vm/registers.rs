use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Register;

/// Register file holding the 14 general-purpose cells.
///
/// Each cell is 4 little-endian bytes reinterpreted per arithmetic mode as a
/// signed byte (low byte only), an `i32`, or an `f32`. Index 0 is a scratch
/// sink for instructions whose register operand was omitted.
#[derive(Debug, Clone, Default)]
pub(super) struct Registers {
    cells: [[u8; 4]; Register::COUNT + 1],
}

impl Registers {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn clear(&mut self) {
        self.cells = Default::default();
    }

    fn cell(&self, idx: u8) -> Result<&[u8; 4], VMError> {
        self.cells
            .get(idx as usize)
            .ok_or(VMError::InvalidRegisterIndex { index: idx })
    }

    fn cell_mut(&mut self, idx: u8) -> Result<&mut [u8; 4], VMError> {
        self.cells
            .get_mut(idx as usize)
            .ok_or(VMError::InvalidRegisterIndex { index: idx })
    }

    pub(super) fn get_int(&self, idx: u8) -> Result<i32, VMError> {
        Ok(i32::from_le_bytes(*self.cell(idx)?))
    }

    pub(super) fn set_int(&mut self, idx: u8, v: i32) -> Result<(), VMError> {
        *self.cell_mut(idx)? = v.to_le_bytes();
        Ok(())
    }

    /// Low byte as a signed char.
    pub(super) fn get_char(&self, idx: u8) -> Result<i8, VMError> {
        Ok(self.cell(idx)?[0] as i8)
    }

    /// Replaces only the low byte; the upper three bytes are kept.
    pub(super) fn set_char(&mut self, idx: u8, v: i8) -> Result<(), VMError> {
        self.cell_mut(idx)?[0] = v as u8;
        Ok(())
    }

    pub(super) fn get_float(&self, idx: u8) -> Result<f32, VMError> {
        Ok(f32::from_le_bytes(*self.cell(idx)?))
    }

    pub(super) fn set_float(&mut self, idx: u8, v: f32) -> Result<(), VMError> {
        *self.cell_mut(idx)? = v.to_le_bytes();
        Ok(())
    }

    /// Named registers with their integer view, in dump order.
    pub(super) fn named(&self) -> impl Iterator<Item = (Register, i32)> + '_ {
        Register::ALL
            .into_iter()
            .map(|reg| (reg, i32::from_le_bytes(self.cells[reg.encoded() as usize])))
    }
}
