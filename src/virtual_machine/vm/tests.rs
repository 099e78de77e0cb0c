use super::*;
use crate::utils::test_utils::utils::{scratch_file, test_console as console};
use crate::virtual_machine::assembler::assemble_source;

fn run_full(source: &str, input: &str, heap: Heap) -> (VM, Result<(), VMError>, Vec<u8>) {
    let program = assemble_source(source).expect("assembly failed");
    let mut vm = VM::with_program(&program, heap);
    let mut term = console(input);
    let result = vm.run(&mut term);
    (vm, result, term.output().clone())
}

fn run_vm(source: &str) -> VM {
    let (vm, result, _) = run_full(source, "", Heap::new());
    result.expect("vm run failed");
    vm
}

fn run_with_heap(source: &str, heap: Heap) -> VM {
    let (vm, result, _) = run_full(source, "", heap);
    result.expect("vm run failed");
    vm
}

fn run_output(source: &str) -> String {
    run_output_with_input(source, "")
}

fn run_output_with_input(source: &str, input: &str) -> String {
    let (_, result, output) = run_full(source, input, Heap::new());
    result.expect("vm run failed");
    String::from_utf8_lossy(&output).into_owned()
}

fn run_expect_err(source: &str) -> VMError {
    let (vm, result, _) = run_full(source, "", Heap::new());
    assert_eq!(vm.state(), VmState::Halted);
    result.expect_err("expected error")
}

fn run_program(instructions: Vec<Instruction>) -> Result<VM, VMError> {
    let mut vm = VM::with_program(&Program::new(instructions), Heap::new());
    vm.run(&mut console(""))?;
    Ok(vm)
}

fn reg(vm: &VM, reg: Register) -> i32 {
    vm.register(reg)
}

/// Puts `bytes` at `key`: pushes the data, the length and the key.
fn puts_source(key: i32, bytes: &str) -> String {
    format!("push \"{bytes}\"\npush {}\npush {key}\nputs\n", bytes.len())
}

// ==================== Scenarios ====================

#[test]
fn push_register_and_print() {
    let source = "mov ax 5\npush ax\nprint 'd'";
    assert_eq!(run_output(source), "5");
    assert_eq!(reg(&run_vm(source), Register::Ax), 0);
}

#[test]
fn counted_loop_terminates() {
    let vm = run_vm(
        "int 10
         mov ax 0
         mov cx 0
         loop:
         add ax 3
         inc cx
         push 5
         ldr cx
         lt
         jz loop
         end",
    );
    assert_eq!(reg(&vm, Register::Cx), 5);
    assert_eq!(reg(&vm, Register::Ax), 15);
    assert!(vm.stack().is_empty());
}

#[test]
fn puts_then_gets_reverses_push_order() {
    let vm = run_vm(
        "push 'c'
         push 'b'
         push 'a'
         push 3
         push 7
         puts
         push 7
         gets
         pop ax
         pop bx
         pop cx",
    );
    assert_eq!(vm.heap().get(7).unwrap(), b"abc");
    assert_eq!(reg(&vm, Register::Ax), 'a' as i32);
    assert_eq!(reg(&vm, Register::Bx), 'b' as i32);
    assert_eq!(reg(&vm, Register::Cx), 'c' as i32);
}

#[test]
fn puts_is_written_through() {
    let (_dir, path) = scratch_file("boot.dat");
    let heap = Heap::open(&path, true).unwrap();
    run_with_heap("push 'c'\npush 'b'\npush 'a'\npush 3\npush 7\nputs", heap);

    let reloaded = Heap::open(&path, false).unwrap();
    assert_eq!(reloaded.get(7).unwrap(), b"abc");
    assert_eq!(reloaded.len(), 1);
}

// ==================== Registers and stack ====================

#[test]
fn mov_register_and_immediate() {
    let vm = run_vm("mov ax -9\nmov bx ax");
    assert_eq!(reg(&vm, Register::Ax), -9);
    assert_eq!(reg(&vm, Register::Bx), -9);
}

#[test]
fn push_immediate_and_pop() {
    let vm = run_vm("push 11\npush 12\npop r10\npop");
    assert_eq!(reg(&vm, Register::R10), 12);
    assert!(vm.stack().is_empty());
}

#[test]
fn ldr_keeps_register() {
    let vm = run_vm("mov ax 3\nldr ax");
    assert_eq!(vm.stack(), &[3]);
    assert_eq!(reg(&vm, Register::Ax), 3);
}

#[test]
fn str_keeps_stack() {
    let vm = run_vm("push 7\nstr dx");
    assert_eq!(reg(&vm, Register::Dx), 7);
    assert_eq!(vm.stack(), &[7]);
}

#[test]
fn si_reports_depth() {
    let vm = run_vm("push 1\npush 2\nsi r3");
    assert_eq!(reg(&vm, Register::R3), 2);
}

#[test]
fn operand_stack_underflow_is_fatal() {
    let err = run_expect_err("pop");
    assert!(matches!(
        err,
        VMError::StackUnderflow {
            stack: StackKind::Operand
        }
    ));
    assert!(err.is_fatal());
    assert!(matches!(run_expect_err("str ax"), VMError::StackUnderflow { .. }));
}

#[test]
fn operand_stack_overflow() {
    let err = run_expect_err("l:\npush 1\njmp l");
    assert!(matches!(
        err,
        VMError::StackOverflow {
            stack: StackKind::Operand
        }
    ));
}

#[test]
fn call_stack_faults() {
    assert!(matches!(
        run_expect_err("ret"),
        VMError::StackUnderflow {
            stack: StackKind::Call
        }
    ));
    assert!(matches!(
        run_expect_err("f:\ncall f"),
        VMError::StackOverflow {
            stack: StackKind::Call
        }
    ));
}

// ==================== Arithmetic ====================

#[test]
fn char_mode_wraps_low_byte() {
    let vm = run_vm("mov ax 100\nmov bx 100\nadd ax bx");
    assert_eq!(vm.registers.get_char(1).unwrap(), -56);
    assert_eq!(reg(&vm, Register::Ax), 200);
}

#[test]
fn char_mode_keeps_upper_bytes() {
    let vm = run_vm("mov ax 0x100\nadd ax 0x1ff");
    assert_eq!(reg(&vm, Register::Ax), 0x1ff);
}

#[test]
fn int_mode_wraps_i32() {
    let vm = run_vm("int 10\nmov ax 2147483647\nadd ax 1");
    assert_eq!(reg(&vm, Register::Ax), i32::MIN);
    let vm = run_vm("int 10\nmov ax 7\nmov bx -2\nmul ax bx\nsub ax 1");
    assert_eq!(reg(&vm, Register::Ax), -15);
}

#[test]
fn float_mode_reinterprets_registers() {
    let vm = run_vm("int 11\nmov ax 0x3FC00000\nmov bx 0x40100000\nadd ax bx");
    assert_eq!(vm.registers.get_float(1).unwrap(), 3.75);
}

#[test]
fn float_mode_converts_immediates() {
    let vm = run_vm("int 11\nmov ax 0x3FC00000\nadd ax 2\nmul ax 2");
    assert_eq!(vm.registers.get_float(1).unwrap(), 7.0);
}

#[test]
fn float_division_by_zero_is_infinite() {
    let vm = run_vm("int 11\nmov ax 0x3F800000\ndiv ax 0");
    assert_eq!(vm.registers.get_float(1).unwrap(), f32::INFINITY);
}

#[test]
fn same_bits_add_per_mode() {
    let (a, b) = (0x4000_0070_u32, 0x4040_0050_u32);
    let source = |mode: i32| format!("int {mode}\nmov ax {a}\nmov bx {b}\nadd ax bx");

    let vm = run_vm(&source(9));
    assert_eq!(reg(&vm, Register::Ax) as u32, 0x4000_00C0);

    let vm = run_vm(&source(10));
    assert_eq!(reg(&vm, Register::Ax) as u32, a.wrapping_add(b));

    let vm = run_vm(&source(11));
    assert_eq!(
        vm.registers.get_float(1).unwrap(),
        f32::from_bits(a) + f32::from_bits(b)
    );
}

#[test]
fn mod_in_float_mode_uses_integers() {
    let vm = run_vm("int 11\nmov ax 7\nmod ax 3");
    assert_eq!(reg(&vm, Register::Ax), 1);
}

#[test]
fn integer_division() {
    let vm = run_vm("int 10\nmov ax -7\ndiv ax 2\nmov bx -7\nmod bx 2");
    assert_eq!(reg(&vm, Register::Ax), -3);
    assert_eq!(reg(&vm, Register::Bx), -1);
}

#[test]
fn division_by_zero() {
    assert!(matches!(
        run_expect_err("int 10\nmov ax 1\ndiv ax 0"),
        VMError::DivisionByZero
    ));
    assert!(matches!(
        run_expect_err("mov ax 1\nmov bx 0x100\nmod ax bx"),
        VMError::DivisionByZero
    ));
}

#[test]
fn inc_dec_per_mode() {
    let vm = run_vm("mov ax 255\ninc ax\nmov bx 0\ndec bx");
    assert_eq!(reg(&vm, Register::Ax), 256);
    assert_eq!(reg(&vm, Register::Bx), -1);

    let vm = run_vm("int 11\nmov ax 0x3FC00000\ninc ax\nmov bx 0\ndec bx");
    assert_eq!(vm.registers.get_float(1).unwrap(), 2.5);
    assert_eq!(vm.registers.get_float(2).unwrap(), -1.0);
}

#[test]
fn addi_is_skipped() {
    let vm = run_vm("mov ax 1\naddi ax 5");
    assert_eq!(reg(&vm, Register::Ax), 1);
}

// ==================== Comparison and control flow ====================

#[test]
fn comparisons_pop_top_first() {
    assert!(run_vm("push 2\npush 1\nlt").zero_flag());
    assert!(!run_vm("push 1\npush 2\nlt").zero_flag());
    assert!(run_vm("push 1\npush 2\ngt").zero_flag());
    assert!(run_vm("push 2\npush 2\nleq").zero_flag());
    assert!(run_vm("push 2\npush 2\ngeq").zero_flag());
    assert!(!run_vm("push 2\npush 1\ngeq").zero_flag());
    assert!(run_vm("push 4\npush 4\neq").zero_flag());
    assert!(!run_vm("push 4\npush 5\neq").zero_flag());
}

#[test]
fn conditional_jumps_clear_flag() {
    let vm = run_vm("push 1\npush 1\neq\njnz skip\nmov ax 1\nskip:\nend");
    assert_eq!(reg(&vm, Register::Ax), 1);
    assert!(!vm.zero_flag());

    let vm = run_vm("push 1\npush 1\neq\njz skip\nmov ax 1\nskip:\nend");
    assert_eq!(reg(&vm, Register::Ax), 0);
    assert!(!vm.zero_flag());
}

#[test]
fn call_and_return() {
    let vm = run_vm("call f\nmov bx 2\nend\nf:\nmov ax 1\nret");
    assert_eq!(reg(&vm, Register::Ax), 1);
    assert_eq!(reg(&vm, Register::Bx), 2);
    assert_eq!(vm.call_stack.len(), 0);
}

#[test]
fn end_halts_before_remaining_code() {
    let vm = run_vm("end\nmov ax 1");
    assert_eq!(reg(&vm, Register::Ax), 0);
    assert_eq!(vm.state(), VmState::Halted);
    assert_eq!(vm.pc(), 2);
}

#[test]
fn fetch_past_end_is_a_fault() {
    let mov = Instruction::new(Opcode::Mov, Some(Register::Ax), None, 1);
    assert!(matches!(
        run_program(vec![mov]),
        Err(VMError::PcOutOfBounds { pc: 2, len: 2 })
    ));
    let jmp = Instruction::new(Opcode::Jmp, None, None, 5);
    assert!(matches!(
        run_program(vec![jmp, Instruction::SENTINEL]),
        Err(VMError::PcOutOfBounds { pc: 10, len: 4 })
    ));
}

#[test]
fn unknown_opcode_is_skipped() {
    let vm = run_program(vec![
        Instruction::from_parts(0x7f, 0, 0, 0),
        Instruction::new(Opcode::Mov, Some(Register::Ax), None, 4),
        Instruction::SENTINEL,
    ])
    .unwrap();
    assert_eq!(reg(&vm, Register::Ax), 4);
}

#[test]
fn register_id_out_of_range() {
    let result = run_program(vec![
        Instruction::from_parts(Opcode::Mov as u8, 15, 0, 1),
        Instruction::SENTINEL,
    ]);
    assert!(matches!(
        result,
        Err(VMError::InvalidRegisterIndex { index: 15 })
    ));
}

// ==================== Console ====================

#[test]
fn print_conversions_follow_mode() {
    assert_eq!(run_output("push 200\nprint 'd'"), "-56");
    assert_eq!(run_output("int 10\npush -1\nprint 'u'"), "4294967295");
    assert_eq!(run_output("int 10\npush 255\nprint 'X'"), "FF");
    assert_eq!(
        run_output("int 11\nmov ax 0x3FC00000\npush ax\nprint 'f'"),
        "1.500000"
    );
    assert_eq!(run_output("push 5\npush 'x'\nprint"), "5");
}

#[test]
fn print_rejects_unknown_conversion() {
    assert!(matches!(
        run_expect_err("push 1\nprint 'q'"),
        VMError::InvalidFormat { spec: 'q' }
    ));
}

#[test]
fn printc_prints_low_byte() {
    assert_eq!(run_output("push 'h'\nprintc\npush 0x169\nprintc"), "hi");
}

#[test]
fn write_prints_every_byte() {
    let source = format!("{}push 1\nwrite", puts_source(1, "hi"));
    assert_eq!(run_output(&source), "hi");

    let source = "push 'b'\npush 0\npush 'a'\npush 3\npush 1\nputs\npush 1\nwrite";
    assert_eq!(run_output(source), "a\0b");
}

#[test]
fn read_stores_line_with_nul() {
    let (vm, result, output) = run_full("push 4\nread\npush 4\nwrite", "hello\nrest\n", Heap::new());
    result.unwrap();
    assert_eq!(vm.heap().get(4).unwrap(), b"hello\0");
    assert_eq!(output, b"hello\0");
}

#[test]
fn read_at_end_of_input_stores_empty_string() {
    let (vm, result, _) = run_full("push 4\nread", "", Heap::new());
    result.unwrap();
    assert_eq!(vm.heap().get(4).unwrap(), b"\0");
}

#[test]
fn readc_pushes_bytes_then_eof() {
    let (vm, result, _) = run_full("readc\nreadc\npop bx\npop ax", "A", Heap::new());
    result.unwrap();
    assert_eq!(reg(&vm, Register::Ax), 'A' as i32);
    assert_eq!(reg(&vm, Register::Bx), -1);
}

// ==================== Heap ====================

#[test]
fn ldm_reads_byte() {
    let source = format!("{}push 9\npush 1\nldm\npop ax", puts_source(9, "abc"));
    assert_eq!(reg(&run_vm(&source), Register::Ax), 'b' as i32);
}

#[test]
fn ldm_bytes_are_zero_extended() {
    let mut heap = Heap::new();
    heap.insert(2, vec![0xF0]).unwrap();
    let vm = run_with_heap("push 2\npush 0\nldm\npop ax", heap);
    assert_eq!(reg(&vm, Register::Ax), 0xF0);
}

#[test]
fn stm_grows_buffer() {
    let source = format!("{}push 'Z'\npush 9\npush 5\nstm", puts_source(9, "abc"));
    assert_eq!(run_vm(&source).heap().get(9).unwrap(), b"abc\0\0Z");
}

#[test]
fn word_mode_stm_and_ldm() {
    let mut heap = Heap::new();
    heap.insert(9, vec![0xAA]).unwrap();
    let vm = run_with_heap(
        "int 2\npush 0x01020304\npush 9\npush 1\nstm\npush 9\npush 1\nldm\npop ax",
        heap,
    );
    assert_eq!(vm.heap().get(9).unwrap(), &[0xAA, 4, 3, 2, 1]);
    assert_eq!(reg(&vm, Register::Ax), 0x0102_0304);
    assert_eq!(vm.memory_mode(), MemoryMode::Word);
}

#[test]
fn ldm_out_of_range() {
    let source = format!("{}push 9\npush 3\nldm", puts_source(9, "abc"));
    let (_, result, _) = run_full(&source, "", Heap::new());
    let err = result.unwrap_err();
    assert!(matches!(err, VMError::HeapRange { key: 9, offset: 3, len: 3 }));
    assert!(!err.is_fatal());
}

#[test]
fn missing_heap_key() {
    for source in [
        "push 42\npush 0\nldm",
        "push 1\npush 42\npush 0\nstm",
        "push 42\npush 0\npush 1\nldmr",
        "push 42\nwrite",
        "push 42\ngets",
        "push 42\npush 42\ncmp",
    ] {
        assert!(
            matches!(run_expect_err(source), VMError::HeapKey { key: 42 }),
            "{source}"
        );
    }
}

#[test]
fn ldmr_pushes_start_on_top() {
    let source = format!("{}push 9\npush 0\npush 2\nldmr", puts_source(9, "abc"));
    let vm = run_vm(&source);
    assert_eq!(vm.stack(), &['c' as i32, 'b' as i32, 'a' as i32]);
}

#[test]
fn stmr_writes_popped_bytes_from_start() {
    let source = format!(
        "{}push 'z'\npush 'y'\npush 'x'\npush 9\npush 1\npush 3\nstmr",
        puts_source(9, "ab")
    );
    assert_eq!(run_vm(&source).heap().get(9).unwrap(), b"axyz");
}

#[test]
fn puts_count_beyond_stack_underflows() {
    let err = run_expect_err("int 2\npush 2147483647\npush 7\nputs");
    assert!(matches!(
        err,
        VMError::StackUnderflow {
            stack: StackKind::Operand
        }
    ));
}

#[test]
fn non_ascii_string_survives_heap() {
    let source = format!("{}push 2\nwrite", puts_source(2, "é€"));
    let (vm, result, output) = run_full(&source, "", Heap::new());
    result.expect("vm run failed");
    assert_eq!(vm.heap().get(2).unwrap(), "é€".as_bytes());
    assert_eq!(output, "é€".as_bytes());
}

#[test]
fn word_mode_puts_and_gets() {
    let vm = run_vm("int 2\npush 258\npush -1\npush 2\npush 3\nputs");
    assert_eq!(
        vm.heap().get(3).unwrap(),
        &[0xFF, 0xFF, 0xFF, 0xFF, 0x02, 0x01, 0x00, 0x00]
    );

    let mut heap = Heap::new();
    heap.insert(5, vec![1, 0, 0, 0, 2, 0]).unwrap();
    let vm = run_with_heap("int 2\npush 5\ngets", heap);
    assert_eq!(vm.stack(), &[2, 1]);
}

#[test]
fn cmp_compares_entries() {
    let same = format!("{}{}push 1\npush 2\ncmp", puts_source(1, "ab"), puts_source(2, "ab"));
    assert!(run_vm(&same).zero_flag());

    let longer = format!("{}{}push 1\npush 2\ncmp", puts_source(1, "ab"), puts_source(2, "abc"));
    assert!(!run_vm(&longer).zero_flag());
}

#[cfg(unix)]
#[test]
fn prc_captures_stdout() {
    let source = format!("{}push 1\npush 2\nprc", puts_source(1, "echo hi"));
    assert_eq!(run_vm(&source).heap().get(2).unwrap(), b"hi\n");
}

#[cfg(unix)]
#[test]
fn prc_stops_command_at_nul() {
    let mut heap = Heap::new();
    heap.insert(1, b"printf ok\0garbage".to_vec()).unwrap();
    let vm = run_with_heap("push 1\npush 2\nprc", heap);
    assert_eq!(vm.heap().get(2).unwrap(), b"ok");
}

// ==================== Modes and dumps ====================

#[test]
fn int_switches_modes() {
    let vm = run_vm("int 2\nint 10");
    assert_eq!(vm.memory_mode(), MemoryMode::Word);
    assert_eq!(vm.arith_mode(), ArithMode::Int);

    let vm = run_vm("int 2\nint 1\nint 11\nint 9\nint 77");
    assert_eq!(vm.memory_mode(), MemoryMode::Byte);
    assert_eq!(vm.arith_mode(), ArithMode::Char);

    let vm = run_vm("mov ax 11\nint ax");
    assert_eq!(vm.arith_mode(), ArithMode::Float);
}

#[test]
fn stack_dump_lists_top_first() {
    let output = run_output("push 1\npush 5\nint 3");
    assert!(output.contains("STACK DUMP"));
    assert!(output.contains("0x00000005  <-- top\n0x00000001 \n"));
    assert!(output.contains("TOTAL: 2 elements / 8 bytes"));
}

#[test]
fn memory_dump_in_key_order() {
    let mut heap = Heap::new();
    heap.insert(8, vec![0x41]).unwrap();
    heap.insert(-1, vec![1, 2]).unwrap();
    let mut vm = VM::new(heap);
    let dump = vm.memory_dump();
    assert!(dump.contains("[ -1 ] 0x01 0x02 \n[ 8 ] 0x41 \n"));
    assert!(dump.contains("TOTAL: 2 elements / 3 bytes"));

    vm.set_display_mode(DisplayMode::Char);
    assert!(vm.memory_dump().contains("[ 8 ] A \n"));
    vm.set_display_mode(DisplayMode::Decimal);
    assert!(vm.memory_dump().contains("[ -1 ] 1 2 \n"));
}

#[test]
fn register_dump_shows_all_views() {
    let output = run_output("mov ax 5\nmov r10 -1\nint 5");
    assert!(output.contains("AX:\t00000000000000000000000000000101 0x00000005 5"));
    assert!(output.contains("R10:\t11111111111111111111111111111111 0xffffffff -1"));
    assert!(output.contains("DX:\t"));
    assert!(output.contains("\n\nR1:\t"));
    assert!(output.contains("zeroflag: 0"));
}

#[test]
fn display_modes_for_stack() {
    let mut vm = run_vm("push -1\npush 'A'");
    vm.set_display_mode(DisplayMode::Decimal);
    assert!(vm.stack_dump().contains("65  <-- top\n-1 \n"));
    vm.set_display_mode(DisplayMode::Char);
    assert!(vm.stack_dump().contains("A  <-- top"));
    assert_eq!(DisplayMode::from_code(3), None);
}

// ==================== Interactive execution ====================

#[test]
fn execute_runs_against_live_state() {
    let mut vm = VM::new(Heap::new());
    let mut term = console("");
    for line in ["mov ax 2", "push ax", "push 'd'", "print"] {
        for instr in crate::virtual_machine::assembler::assemble_instructions(line).unwrap() {
            vm.execute(instr, &mut term).unwrap();
        }
    }
    assert_eq!(term.output(), b"2");
    assert_eq!(vm.register(Register::Ax), 0);

    vm.execute(Instruction::new(Opcode::Push, None, None, 3), &mut term)
        .unwrap();
    vm.clear();
    assert!(vm.stack().is_empty());
}

#[test]
fn load_program_keeps_registers() {
    let mut vm = run_vm("mov ax 9");
    vm.load_program(&assemble_source("mov bx 1").unwrap());
    assert_eq!(vm.state(), VmState::Loaded);
    vm.run(&mut console("")).unwrap();
    assert_eq!(reg(&vm, Register::Ax), 9);
    assert_eq!(reg(&vm, Register::Bx), 1);
}
