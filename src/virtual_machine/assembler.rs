//! Assembly language parser and binary encoder.
//!
//! Converts assembly source into the fixed-width instruction stream executed
//! by the [`VM`](super::vm::VM). Operand shapes come from the
//! [`for_each_instruction!`](crate::for_each_instruction) table.
//!
//! # Syntax
//!
//! ```text
//! label:
//!     mov ax 10        ; register, then register or integer
//!     push "hi"        ; one push per character, last character first
//!     print 'd'        ; shorthand for `push 'd'` followed by `print`
//!     jnz label
//! ```
//!
//! - Operands are whitespace separated; `;` starts a comment
//! - Registers: `ax bx cx dx r1 .. r10`
//! - A label's value is the index of the instruction that follows it
//! - Forward references are patched once the whole source has been read

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Opcode, Register, Syntax};
use crate::virtual_machine::lexer::{Token, TokenKind, tokenize};
use crate::virtual_machine::program::Program;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

/// Placeholder stored in a jump's value word until its label is resolved.
const UNRESOLVED_LABEL: i32 = -1;

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    column: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emit a diagnostic to stderr for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    if cfg!(test) {
        return;
    }
    if let Some((line, column, message)) = err.source_location() {
        eprintln!(
            "{}",
            render_assembly_diagnostic(file, source, line, column, &message)
        );
    } else {
        eprintln!("error: {err}");
    }
}

/// A jump or call whose label was not yet defined when it was encoded.
#[derive(Debug, Clone)]
struct PendingLabel {
    label: String,
    /// Index of the instruction whose value word receives the target.
    site: usize,
    line: usize,
    column: usize,
}

/// Label table and pending forward references.
#[derive(Debug, Default)]
pub struct AsmContext {
    /// Label definitions mapping names to instruction indices.
    pub(crate) labels: HashMap<String, usize>,
    pending: Vec<PendingLabel>,
}

impl AsmContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a label at the given instruction index.
    pub(crate) fn define_label(&mut self, name: &str, index: usize, at: &Token) -> Result<(), VMError> {
        if self.labels.contains_key(name) {
            return Err(VMError::DuplicateLabel {
                label: name.to_string(),
                line: at.line,
                column: at.column,
            });
        }
        self.labels.insert(name.to_string(), index);
        Ok(())
    }

    /// Resolves `name` now, or records a patch for `site` and returns the placeholder.
    fn reference_label(&mut self, name: &str, site: usize, at: &Token) -> i32 {
        match self.labels.get(name) {
            Some(&index) => index as i32,
            None => {
                self.pending.push(PendingLabel {
                    label: name.to_string(),
                    site,
                    line: at.line,
                    column: at.column,
                });
                UNRESOLVED_LABEL
            }
        }
    }

    /// Labels sorted by instruction index.
    pub fn sorted_labels(&self) -> Vec<(&str, usize)> {
        let mut labels: Vec<_> = self.labels.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        labels.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));
        labels
    }
}

/// Result of a successful assembly: the program plus its label table.
#[derive(Debug)]
pub struct Assembled {
    pub program: Program,
    pub context: AsmContext,
}

impl Assembled {
    /// Human-readable listing of labels and encoded words.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "labels:");
        for (name, index) in self.context.sorted_labels() {
            let _ = writeln!(out, "0x{index:08x}\t{name}");
        }
        let _ = writeln!(out, "code:");
        for (index, instr) in self.program.instructions.iter().enumerate() {
            let _ = writeln!(
                out,
                "{index:04}: 0x{:08x} 0x{:08x}\t{instr}",
                instr.word, instr.value as u32
            );
        }
        out
    }
}

/// Cursor over the token stream with the instructions emitted so far.
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    ctx: AsmContext,
    out: Vec<Instruction>,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            ctx: AsmContext::new(),
            out: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn syntax_error(at: &Token, message: String) -> VMError {
        VMError::SyntaxError {
            line: at.line,
            column: at.column,
            message,
        }
    }

    /// Error for a missing operand after `instr`, located at the offending
    /// token or just after the mnemonic at end of input.
    fn expected(&self, instr: &Token, what: &str) -> VMError {
        let (at, found) = match self.peek() {
            Some(tok) => (tok, tok.kind.describe()),
            None => (instr, "end of input".to_string()),
        };
        Self::syntax_error(at, format!("expected {what}, found {found}"))
    }

    fn emit(&mut self, opcode: Opcode, reg1: Option<Register>, reg2: Option<Register>, value: i32) {
        self.out.push(Instruction::new(opcode, reg1, reg2, value));
    }

    fn take_register(&mut self) -> Option<Register> {
        match self.peek()?.kind {
            TokenKind::Register(reg) => {
                self.pos += 1;
                Some(reg)
            }
            _ => None,
        }
    }

    fn take_integer(&mut self) -> Option<i32> {
        match self.peek()?.kind {
            TokenKind::Integer(value) => {
                self.pos += 1;
                Some(value)
            }
            _ => None,
        }
    }

    fn expect_register(&mut self, instr: &Token) -> Result<Register, VMError> {
        self.take_register()
            .ok_or_else(|| self.expected(instr, "register"))
    }

    fn parse(mut self) -> Result<(Vec<Instruction>, AsmContext), VMError> {
        while let Some(tok) = self.next() {
            match &tok.kind {
                TokenKind::Eol => {}
                TokenKind::Identifier(name) => {
                    match self.next() {
                        Some(Token {
                            kind: TokenKind::Colon,
                            ..
                        }) => {}
                        _ => {
                            return Err(Self::syntax_error(
                                tok,
                                format!("expected ':' after label '{name}'"),
                            ));
                        }
                    }
                    let index = self.out.len();
                    self.ctx.define_label(name, index, tok)?;
                }
                TokenKind::Mnemonic(opcode) => self.instruction(*opcode, tok)?,
                other => {
                    return Err(Self::syntax_error(
                        tok,
                        format!("unexpected {}", other.describe()),
                    ));
                }
            }
        }
        self.resolve()
    }

    /// Parses the operands of one mnemonic and emits its instruction(s).
    fn instruction(&mut self, opcode: Opcode, tok: &'t Token) -> Result<(), VMError> {
        match opcode.syntax() {
            Syntax::Nullary => self.emit(opcode, None, None, 0),
            Syntax::Reg => {
                let reg = self.expect_register(tok)?;
                self.emit(opcode, Some(reg), None, 0);
            }
            Syntax::OptReg => {
                let reg = self.take_register();
                self.emit(opcode, reg, None, 0);
            }
            Syntax::RegOrImm => {
                if let Some(reg) = self.take_register() {
                    self.emit(opcode, Some(reg), None, 0);
                } else if let Some(value) = self.take_integer() {
                    self.emit(opcode, None, None, value);
                } else {
                    return Err(self.expected(tok, "register or integer"));
                }
            }
            Syntax::OptRegOrImm => {
                let reg = self.take_register();
                let value = if reg.is_none() { self.take_integer() } else { None };
                self.emit(opcode, reg, None, value.unwrap_or(0));
            }
            Syntax::RegRegOrImm => {
                let dst = self.expect_register(tok)?;
                if let Some(src) = self.take_register() {
                    self.emit(opcode, Some(dst), Some(src), 0);
                } else if let Some(value) = self.take_integer() {
                    self.emit(opcode, Some(dst), None, value);
                } else {
                    return Err(self.expected(tok, "register or integer"));
                }
            }
            Syntax::PushOperand => {
                if let Some(reg) = self.take_register() {
                    self.emit(opcode, Some(reg), None, 0);
                } else if let Some(value) = self.take_integer() {
                    self.emit(opcode, None, None, value);
                } else if let Some(Token {
                    kind: TokenKind::Str(text),
                    ..
                }) = self.peek()
                {
                    self.pos += 1;
                    for byte in text.bytes().rev() {
                        self.emit(opcode, None, None, byte as i32);
                    }
                } else {
                    return Err(self.expected(tok, "register, integer or string"));
                }
            }
            Syntax::Label => {
                let Some(at) = self.peek() else {
                    return Err(self.expected(tok, "label"));
                };
                let TokenKind::Identifier(name) = &at.kind else {
                    return Err(self.expected(tok, "label"));
                };
                self.pos += 1;
                let site = self.out.len();
                let value = self.ctx.reference_label(name, site, at);
                self.emit(opcode, None, None, value);
            }
            Syntax::OptFormat => {
                if let Some(format) = self.take_integer() {
                    self.emit(Opcode::Push, None, None, format);
                }
                self.emit(opcode, None, None, 0);
            }
        }
        Ok(())
    }

    /// Patches forward references; any label still unknown fails assembly.
    fn resolve(mut self) -> Result<(Vec<Instruction>, AsmContext), VMError> {
        for patch in std::mem::take(&mut self.ctx.pending) {
            let index = self
                .ctx
                .labels
                .get(&patch.label)
                .copied()
                .ok_or(VMError::UndefinedLabel {
                    label: patch.label.clone(),
                    line: patch.line,
                    column: patch.column,
                })?;
            self.out[patch.site].value = index as i32;
        }
        Ok((self.out, self.ctx))
    }
}

/// Assembles source into instructions without the terminating sentinel.
///
/// Used by the interactive session, which executes each line as it is typed.
pub fn assemble_instructions(source: &str) -> Result<Vec<Instruction>, VMError> {
    let tokens = tokenize(source)?;
    let (instructions, _) = Parser::new(&tokens).parse()?;
    Ok(instructions)
}

/// Assembles a full source string, keeping the label table for listings.
///
/// Logs a compiler-style diagnostic to stderr on failure.
pub fn assemble_source_detailed(source: &str, source_name: &str) -> Result<Assembled, VMError> {
    let result = tokenize(source).and_then(|tokens| {
        let (mut instructions, context) = Parser::new(&tokens).parse()?;
        instructions.push(Instruction::SENTINEL);
        Ok(Assembled {
            program: Program::new(instructions),
            context,
        })
    });

    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }

    result
}

/// Assemble a full source string into a program ending with the `(0, 0)` sentinel.
pub fn assemble_source(source: impl Into<String>) -> Result<Program, VMError> {
    assemble_source_detailed(&source.into(), "<source>").map(|a| a.program)
}

/// Reads and assembles a source file.
pub fn assemble_file_detailed<P: AsRef<Path>>(path: P) -> Result<Assembled, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|source| VMError::IoError {
        path: path_ref.display().to_string(),
        source,
    })?;
    assemble_source_detailed(&source, &path_ref.display().to_string())
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    assemble_file_detailed(path).map(|a| a.program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fields(source: &str) -> Vec<(u8, u8, u8, i32)> {
        assemble_source(source)
            .unwrap()
            .instructions
            .iter()
            .map(Instruction::fields)
            .collect()
    }

    fn syntax_message(source: &str) -> String {
        match assemble_source(source).unwrap_err() {
            VMError::SyntaxError { message, .. } => message,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    const MOV: u8 = Opcode::Mov as u8;
    const PUSH: u8 = Opcode::Push as u8;
    const AX: u8 = Register::Ax as u8;
    const BX: u8 = Register::Bx as u8;

    #[test]
    fn assemble_empty_source() {
        let program = assemble_source("").unwrap();
        assert_eq!(program.instructions, vec![Instruction::SENTINEL]);
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let program = assemble_source("; comment\n\n   ; another\n").unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn assemble_mov_forms() {
        assert_eq!(
            fields("mov ax 5\nmov bx ax"),
            vec![(MOV, AX, 0, 5), (MOV, BX, AX, 0), (0, 0, 0, 0)]
        );
    }

    #[test]
    fn assemble_push_forms() {
        assert_eq!(
            fields("push ax\npush -7\npush \"ab\""),
            vec![
                (PUSH, AX, 0, 0),
                (PUSH, 0, 0, -7),
                (PUSH, 0, 0, 'b' as i32),
                (PUSH, 0, 0, 'a' as i32),
                (0, 0, 0, 0),
            ]
        );
    }

    #[test]
    fn optional_operands_stop_at_end_of_line() {
        let pop = Opcode::Pop as u8;
        let ldm = Opcode::Ldm as u8;
        assert_eq!(
            fields("pop\npop cx\nldm\nldm 3\nldm dx"),
            vec![
                (pop, 0, 0, 0),
                (pop, Register::Cx as u8, 0, 0),
                (ldm, 0, 0, 0),
                (ldm, 0, 0, 3),
                (ldm, Register::Dx as u8, 0, 0),
                (0, 0, 0, 0),
            ]
        );
    }

    #[test]
    fn print_with_format_pushes_it_first() {
        let print = Opcode::Print as u8;
        assert_eq!(
            fields("print 'd'\nprint"),
            vec![(PUSH, 0, 0, 'd' as i32), (print, 0, 0, 0), (print, 0, 0, 0), (0, 0, 0, 0)]
        );
    }

    #[test]
    fn nullary_instructions() {
        let program = assemble_source("eq lt gt leq geq ret printc read write puts gets readc cmp prc ldmr stmr end").unwrap();
        let ops: Vec<u8> = program.instructions.iter().map(|i| i.opcode()).collect();
        assert_eq!(ops, vec![16, 17, 18, 19, 20, 24, 26, 27, 28, 29, 30, 31, 32, 33, 8, 9, 0, 0]);
        assert!(program.instructions.iter().all(|i| i.reg1() == 0 && i.value == 0));
    }

    #[test]
    fn int_accepts_register_or_integer() {
        let int = Opcode::Int as u8;
        assert_eq!(
            fields("int 10\nint r1"),
            vec![(int, 0, 0, 10), (int, Register::R1 as u8, 0, 0), (0, 0, 0, 0)]
        );
    }

    #[test]
    fn backward_label_reference() {
        let jmp = Opcode::Jmp as u8;
        assert_eq!(
            fields("mov ax 1\nloop:\ninc ax\njmp loop"),
            vec![
                (MOV, AX, 0, 1),
                (Opcode::Inc as u8, AX, 0, 0),
                (jmp, 0, 0, 1),
                (0, 0, 0, 0)
            ]
        );
    }

    #[test]
    fn forward_label_reference_is_patched() {
        let program = assemble_source("call f\nend\nf: push \"xy\"\nret").unwrap();
        assert_eq!(program.instructions[0].value, 2);
        assert!(program.instructions.iter().all(|i| i.value != UNRESOLVED_LABEL));
    }

    #[test]
    fn label_after_string_push_counts_expanded_instructions() {
        let program = assemble_source("push \"abc\"\nhere: jmp here").unwrap();
        assert_eq!(program.instructions[3].value, 3);
    }

    #[test]
    fn string_push_expands_utf8_bytes() {
        let program = assemble_source("push \"é€\"").unwrap();
        let values: Vec<i32> = program.instructions[..5].iter().map(|i| i.value).collect();
        assert_eq!(values, vec![0xAC, 0x82, 0xE2, 0xA9, 0xC3]);
        assert_eq!(program.instructions[5].word, 0);
    }

    #[test]
    fn undefined_label_error() {
        let err = assemble_source("mov ax 1\njz nowhere").unwrap_err();
        assert!(matches!(
            err,
            VMError::UndefinedLabel { ref label, line: 2, column: 4 } if label == "nowhere"
        ));
    }

    #[test]
    fn duplicate_label_error() {
        let err = assemble_source("a:\na:").unwrap_err();
        assert!(matches!(err, VMError::DuplicateLabel { line: 2, .. }));
    }

    #[test]
    fn label_requires_colon() {
        assert!(syntax_message("start\nmov ax 1").contains("expected ':'"));
    }

    #[test]
    fn stray_tokens_are_rejected() {
        assert!(syntax_message("mov ax 1 2").contains("unexpected integer 2"));
        assert!(syntax_message("ax").contains("unexpected register"));
        assert!(syntax_message(": foo").contains("unexpected ':'"));
    }

    #[test]
    fn missing_operands() {
        assert!(syntax_message("mov 5").contains("expected register, found integer 5"));
        assert!(syntax_message("mov ax").contains("expected register or integer"));
        assert!(syntax_message("jmp 3").contains("expected label"));
        assert!(syntax_message("push").contains("found end of input"));
        assert!(syntax_message("inc\nax").contains("found end of line"));
    }

    #[test]
    fn lex_errors_propagate() {
        assert!(matches!(
            assemble_source("push @"),
            Err(VMError::LexError { line: 1, column: 6, .. })
        ));
    }

    #[test]
    fn instructions_without_sentinel() {
        let instrs = assemble_instructions("mov ax 5").unwrap();
        assert_eq!(instrs, vec![Instruction::from_parts(MOV, AX, 0, 5)]);
    }

    #[test]
    fn listing_shows_labels_and_words() {
        let assembled = assemble_source_detailed("start: mov ax 5\njmp start", "t.asm").unwrap();
        let listing = assembled.listing();
        assert!(listing.contains("0x00000000\tstart"));
        assert!(listing.contains("0000: 0x01010000 0x00000005"));
        assert!(listing.contains("0001: 0x15000000 0x00000000"));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let diag = render_assembly_diagnostic("prog.asm", "mov ax 1\njz nowhere", 2, 4, "label nowhere not found");
        assert!(diag.starts_with("error: label nowhere not found"));
        assert!(diag.contains(" --> prog.asm:2:4"));
        assert!(diag.contains("   2 | jz nowhere"));
        assert!(diag.contains("  |    ^"));
    }

    #[test]
    fn assemble_file_reads_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.asm");
        fs::write(&path, "mov ax 5\n").unwrap();
        assert_eq!(assemble_file(&path).unwrap().len(), 2);
        assert!(matches!(
            assemble_file(dir.path().join("missing.asm")),
            Err(VMError::IoError { .. })
        ));
    }

    fn operand_line() -> impl Strategy<Value = (String, (u8, u8, u8, i32))> {
        let reg = prop::sample::select(Register::ALL.to_vec());
        let arith = prop::sample::select(vec![
            Opcode::Mov,
            Opcode::Add,
            Opcode::Addi,
            Opcode::Sub,
            Opcode::Mul,
            Opcode::Div,
            Opcode::Mod,
        ]);
        prop_oneof![
            (arith.clone(), reg.clone(), reg.clone()).prop_map(|(op, a, b)| (
                format!("{} {} {}", op.mnemonic(), a.name(), b.name()),
                (op as u8, a.encoded(), b.encoded(), 0)
            )),
            (arith, reg.clone(), any::<i32>()).prop_map(|(op, a, v)| (
                format!("{} {} {}", op.mnemonic(), a.name(), v),
                (op as u8, a.encoded(), 0, v)
            )),
            (prop::sample::select(vec![Opcode::Ldr, Opcode::Str, Opcode::Si, Opcode::Inc, Opcode::Dec]), reg.clone())
                .prop_map(|(op, a)| (
                    format!("{} {}", op.mnemonic(), a.name()),
                    (op as u8, a.encoded(), 0, 0)
                )),
            any::<i32>().prop_map(|v| (format!("push {v}"), (PUSH, 0, 0, v))),
            reg.prop_map(|a| (format!("pop {}", a.name()), (Opcode::Pop as u8, a.encoded(), 0, 0))),
        ]
    }

    proptest! {
        #[test]
        fn encoded_fields_match_source(lines in prop::collection::vec(operand_line(), 1..16)) {
            let source: Vec<&str> = lines.iter().map(|(s, _)| s.as_str()).collect();
            let expected: Vec<_> = lines.iter().map(|(_, f)| *f).collect();
            let mut actual = fields(&source.join("\n"));
            prop_assert_eq!(actual.pop(), Some((0, 0, 0, 0)));
            prop_assert_eq!(actual, expected);
        }
    }
}
