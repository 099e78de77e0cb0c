//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so the opcode enum and the assembler's mnemonic table are
//! derived from one list.
//!
//! This module generates:
//! - The [`Opcode`] enum with its fixed opcode numbers
//! - `TryFrom<u8>` for decoding opcodes
//! - Mnemonic and operand-syntax lookups used by the assembler
//!
//! # Instruction Format
//!
//! Every instruction is two 32-bit little-endian words:
//!
//! ```text
//! word  = opcode << 24 | reg1 << 16 | reg2 << 8
//! value = immediate, label index, or 0
//! ```
//!
//! Register ids are `1..=14` (`ax` .. `r10`); `0` means "no register".
//! Opcode numbers are part of the binary format and must not change.

use crate::virtual_machine::errors::VMError;
use zvm_derive::BinaryCodec;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// end ; halt
            End = 0, "end" => Nullary,
            // =========================
            // Registers and stack
            // =========================
            /// mov r, r|imm ; r = operand
            Mov = 1, "mov" => RegRegOrImm,
            /// push r|imm|"str" ; push operand (register is cleared)
            Push = 2, "push" => PushOperand,
            /// pop [r] ; pop into r or discard
            Pop = 3, "pop" => OptReg,
            /// ldr r ; push r, keep r
            Ldr = 4, "ldr" => Reg,
            /// str r ; r = top of stack, keep stack
            Str = 5, "str" => Reg,
            // =========================
            // Heap access
            // =========================
            /// ldm ; pop pos, loc ; push heap[loc][pos]
            Ldm = 6, "ldm" => OptRegOrImm,
            /// stm ; pop pos, loc, val ; heap[loc][pos] = val
            Stm = 7, "stm" => OptRegOrImm,
            /// ldmr ; pop end, start, loc ; push heap[loc][end..=start]
            Ldmr = 8, "ldmr" => Nullary,
            /// stmr ; pop end, start, loc ; heap[loc][start..=end] = popped bytes
            Stmr = 9, "stmr" => Nullary,
            // =========================
            // Arithmetic
            // =========================
            /// add r, r|imm
            Add = 10, "add" => RegRegOrImm,
            /// addi r, r|imm ; reserved, not executed
            Addi = 11, "addi" => RegRegOrImm,
            /// sub r, r|imm
            Sub = 12, "sub" => RegRegOrImm,
            /// mul r, r|imm
            Mul = 13, "mul" => RegRegOrImm,
            /// div r, r|imm
            Div = 14, "div" => RegRegOrImm,
            /// mod r, r|imm
            Mod = 15, "mod" => RegRegOrImm,
            // =========================
            // Comparison
            // =========================
            /// eq ; pop b, a ; flag = a == b
            Eq = 16, "eq" => Nullary,
            /// lt ; pop a, b ; flag = a < b
            Lt = 17, "lt" => Nullary,
            /// gt ; pop a, b ; flag = a > b
            Gt = 18, "gt" => Nullary,
            /// leq ; pop a, b ; flag = a <= b
            Leq = 19, "leq" => Nullary,
            /// geq ; pop a, b ; flag = a >= b
            Geq = 20, "geq" => Nullary,
            // =========================
            // Control flow
            // =========================
            /// jmp label
            Jmp = 21, "jmp" => Label,
            /// jz label ; jump if flag set, clear flag
            Jz = 22, "jz" => Label,
            /// jnz label ; jump if flag clear, clear flag
            Jnz = 23, "jnz" => Label,
            /// ret ; pc = pop call stack
            Ret = 24, "ret" => Nullary,
            // =========================
            // Console and heap I/O
            // =========================
            /// print ['fmt'] ; pop format char, pop value, print
            Print = 25, "print" => OptFormat,
            /// printc ; pop and print a character
            Printc = 26, "printc" => Nullary,
            /// read ; pop key ; heap[key] = input line + NUL
            Read = 27, "read" => Nullary,
            /// write ; pop key ; print heap[key]
            Write = 28, "write" => Nullary,
            /// puts ; pop key, n, n values ; heap[key] = values
            Puts = 29, "puts" => Nullary,
            /// gets ; pop key ; push heap[key] elements, element 0 on top
            Gets = 30, "gets" => Nullary,
            /// readc ; push one input byte (-1 at end of input)
            Readc = 31, "readc" => Nullary,
            /// cmp ; pop key a, key b ; flag = heap[a] == heap[b]
            Cmp = 32, "cmp" => Nullary,
            /// prc ; pop dst, cmd ; heap[dst] = stdout of shell(heap[cmd])
            Prc = 33, "prc" => Nullary,
            // =========================
            // Misc
            // =========================
            /// si r ; r = operand stack depth
            Si = 34, "si" => Reg,
            /// inc r
            Inc = 35, "inc" => Reg,
            /// dec r
            Dec = 36, "dec" => Reg,
            /// call label ; push return pc, jump
            Call = 37, "call" => Label,
            /// int r|imm ; mode switches and dumps
            Int = 38, "int" => RegOrImm,
        }
    };
}

/// Operand shape accepted by the assembler for a mnemonic.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Syntax {
    /// No operands.
    Nullary,
    /// One register.
    Reg,
    /// Optional register, bounded by end of line.
    OptReg,
    /// Register or integer.
    RegOrImm,
    /// Optional register or integer.
    OptRegOrImm,
    /// Register, then register or integer.
    RegRegOrImm,
    /// Register, integer, or string literal.
    PushOperand,
    /// Label reference.
    Label,
    /// Optional integer (format character).
    OptFormat,
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => $syntax:ident
        ),* $(,)?
    ) => {
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::InvalidOpcode { opcode: value }),
                }
            }
        }

        impl Opcode {
            /// Every opcode in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name ),* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand shape the assembler expects.
            pub const fn syntax(&self) -> Syntax {
                match self {
                    $( Opcode::$name => Syntax::$syntax, )*
                }
            }

            /// Looks up an opcode by mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

/// General-purpose registers, encoded as `rank + 1`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Register {
    Ax = 1,
    Bx = 2,
    Cx = 3,
    Dx = 4,
    R1 = 5,
    R2 = 6,
    R3 = 7,
    R4 = 8,
    R5 = 9,
    R6 = 10,
    R7 = 11,
    R8 = 12,
    R9 = 13,
    R10 = 14,
}

impl Register {
    pub const COUNT: usize = 14;

    pub const ALL: [Register; Register::COUNT] = [
        Register::Ax,
        Register::Bx,
        Register::Cx,
        Register::Dx,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
        Register::R9,
        Register::R10,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Register::Ax => "ax",
            Register::Bx => "bx",
            Register::Cx => "cx",
            Register::Dx => "dx",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::R7 => "r7",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
        }
    }

    pub fn from_name(name: &str) -> Option<Register> {
        Register::ALL.into_iter().find(|r| r.name() == name)
    }

    pub const fn encoded(&self) -> u8 {
        *self as u8
    }

    /// Inverse of [`Register::encoded`]. `0` and ids above 14 are not registers.
    pub fn from_encoded(id: u8) -> Option<Register> {
        Register::ALL.get((id as usize).checked_sub(1)?).copied()
    }
}

/// One encoded instruction: packed opcode/register word plus immediate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, BinaryCodec)]
pub struct Instruction {
    pub word: u32,
    pub value: i32,
}

impl Instruction {
    /// Size of one encoded instruction in bytes.
    pub const SIZE: usize = 8;

    /// Terminator appended to every assembled program.
    pub const SENTINEL: Instruction = Instruction { word: 0, value: 0 };

    /// Packs raw fields.
    pub const fn from_parts(opcode: u8, reg1: u8, reg2: u8, value: i32) -> Self {
        Self {
            word: (opcode as u32) << 24 | (reg1 as u32) << 16 | (reg2 as u32) << 8,
            value,
        }
    }

    pub fn new(
        opcode: Opcode,
        reg1: Option<Register>,
        reg2: Option<Register>,
        value: i32,
    ) -> Self {
        Self::from_parts(
            opcode as u8,
            reg1.map_or(0, |r| r.encoded()),
            reg2.map_or(0, |r| r.encoded()),
            value,
        )
    }

    pub const fn opcode(&self) -> u8 {
        (self.word >> 24) as u8
    }

    pub const fn reg1(&self) -> u8 {
        (self.word >> 16) as u8
    }

    pub const fn reg2(&self) -> u8 {
        (self.word >> 8) as u8
    }

    /// `(opcode, reg1, reg2, value)`, the inverse of [`Instruction::from_parts`].
    pub const fn fields(&self) -> (u8, u8, u8, i32) {
        (self.opcode(), self.reg1(), self.reg2(), self.value)
    }
}

/// Disassembly: mnemonic, register operands, then the value when the
/// operand shape carries one.
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Ok(op) = Opcode::try_from(self.opcode()) else {
            return write!(f, "?{:02x}", self.opcode());
        };
        write!(f, "{}", op.mnemonic())?;
        for id in [self.reg1(), self.reg2()] {
            match Register::from_encoded(id) {
                Some(reg) => write!(f, " {}", reg.name())?,
                None if id != 0 => write!(f, " ?{id}")?,
                None => {}
            }
        }
        let shows_value = match op.syntax() {
            Syntax::Label => true,
            Syntax::RegRegOrImm => self.reg2() == 0,
            Syntax::PushOperand | Syntax::RegOrImm => self.reg1() == 0,
            Syntax::OptRegOrImm => self.reg1() == 0 && self.value != 0,
            _ => false,
        };
        if shows_value {
            write!(f, " {}", self.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};
    use proptest::prelude::*;

    #[test]
    fn opcode_try_from_invalid() {
        assert!(matches!(
            Opcode::try_from(39),
            Err(VMError::InvalidOpcode { opcode: 39 })
        ));
        assert!(Opcode::try_from(0xFF).is_err());
    }

    #[test]
    fn opcode_numbers_are_stable() {
        assert_eq!(Opcode::End as u8, 0);
        assert_eq!(Opcode::Mov as u8, 1);
        assert_eq!(Opcode::Addi as u8, 11);
        assert_eq!(Opcode::Jmp as u8, 21);
        assert_eq!(Opcode::Print as u8, 25);
        assert_eq!(Opcode::Prc as u8, 33);
        assert_eq!(Opcode::Call as u8, 37);
        assert_eq!(Opcode::Int as u8, 38);
        assert_eq!(Opcode::ALL.len(), 39);
    }

    #[test]
    fn table_is_dense_and_consistent() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(Opcode::try_from(i as u8).unwrap(), *op);
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(*op));
        }
        assert_eq!(Opcode::from_mnemonic("MOV"), None);
    }

    #[test]
    fn register_bijection() {
        for (rank, reg) in Register::ALL.iter().enumerate() {
            assert_eq!(reg.encoded() as usize, rank + 1);
            assert_eq!(Register::from_encoded(reg.encoded()), Some(*reg));
            assert_eq!(Register::from_name(reg.name()), Some(*reg));
        }
        assert_eq!(Register::from_encoded(0), None);
        assert_eq!(Register::from_encoded(15), None);
        assert_eq!(Register::from_name("r0"), None);
        assert_eq!(Register::from_name("ex"), None);
    }

    #[test]
    fn instruction_word_layout() {
        let instr = Instruction::new(Opcode::Mov, Some(Register::Ax), Some(Register::R10), -3);
        assert_eq!(instr.word, 0x0101_0E00);
        assert_eq!(instr.to_bytes(), vec![0x00, 0x0E, 0x01, 0x01, 0xFD, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Instruction::from_bytes(&instr.to_bytes()).unwrap(), instr);
    }

    #[test]
    fn display_disassembles() {
        let show = |i: Instruction| i.to_string();
        assert_eq!(show(Instruction::new(Opcode::Mov, Some(Register::Ax), None, 5)), "mov ax 5");
        assert_eq!(
            show(Instruction::new(Opcode::Add, Some(Register::Ax), Some(Register::Bx), 0)),
            "add ax bx"
        );
        assert_eq!(show(Instruction::new(Opcode::Push, None, None, 0)), "push 0");
        assert_eq!(show(Instruction::new(Opcode::Jz, None, None, 4)), "jz 4");
        assert_eq!(show(Instruction::new(Opcode::Ldm, None, None, 0)), "ldm");
        assert_eq!(show(Instruction::SENTINEL), "end");
        assert_eq!(show(Instruction::from_parts(0x7f, 0, 0, 0)), "?7f");
    }

    proptest! {
        #[test]
        fn fields_invert_from_parts(op in 0u8..=38, r1 in 0u8..=14, r2 in 0u8..=14, value in any::<i32>()) {
            prop_assert_eq!(Instruction::from_parts(op, r1, r2, value).fields(), (op, r1, r2, value));
        }
    }
}
