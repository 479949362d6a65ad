//! End-to-end scenarios driven entirely through assembly text: assemble,
//! run, and check the observable machine state matches by hand-traced
//! expectations for each instruction sequence.

use x86sim_vm::prelude::Runner;

fn run(source: &str) -> (Runner, x86sim_vm::runner::RunResult) {
    let mut runner = Runner::with_default_config();
    runner.load(source).unwrap();
    let result = runner.run().unwrap();
    (runner, result)
}

/// S1. Immediate MOV and ADD. `eax` is exited through `ebx` since exit code
/// comes from `ebx`; the add's flags survive the trailing `mov`s because
/// `Move` never touches `rflags`.
#[test]
fn immediate_mov_and_add() {
    let (runner, result) = run(
        "\
        mov eax, 5
        mov ecx, 7
        add eax, ecx
        mov ebx, eax
        mov eax, 1
        int 0x80
        ",
    );
    assert_eq!(result.exit_code, 12);
    assert_eq!(runner.registers.get32("ecx").unwrap(), 7);
    let flags = runner.registers.rflags();
    assert!(!flags.zf());
    assert!(!flags.sf());
    assert!(!flags.cf());
    assert!(!flags.of());
}

/// S2. Counted loop via `cmp`/`jne`.
#[test]
fn counted_loop_via_cmp_jne() {
    let (runner, result) = run(
        "\
        section .text
        _start:
          mov ecx, 0
        loop:
          inc ecx
          cmp ecx, 6
          jne loop
          mov ebx, ecx
          mov eax, 1
          int 0x80
        ",
    );
    assert_eq!(result.exit_code, 6);
    assert_eq!(runner.registers.get32("ecx").unwrap(), 6);
    assert!(runner.registers.rflags().zf());
}

/// S3. Unsigned DIV, then the zero-divisor fault path.
#[test]
fn unsigned_div_computes_quotient_and_remainder() {
    let (runner, result) = run(
        "\
        mov edx, 0
        mov eax, 100
        mov ebx, 7
        div ebx
        mov ebx, eax
        mov eax, 1
        int 0x80
        ",
    );
    assert_eq!(result.exit_code, 14);
    assert_eq!(runner.registers.get32("edx").unwrap(), 2);
}

#[test]
fn division_by_zero_halts_the_run() {
    let mut runner = Runner::with_default_config();
    runner
        .load(
            "\
            mov edx, 0
            mov eax, 100
            mov ebx, 0
            div ebx
            ",
        )
        .unwrap();
    assert!(runner.run().is_err());
}

/// S4. AVX vector add: every lane of ymm0 ends up 9.0.
#[test]
fn avx_vector_add_sums_complementary_lanes() {
    let mut runner = Runner::with_default_config();
    let lanes_1_to_8: [f32; 8] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let lanes_8_to_1: [f32; 8] = [8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
    runner.registers.set_ymm("ymm1", pack_f32x8(lanes_1_to_8)).unwrap();
    runner.registers.set_ymm("ymm2", pack_f32x8(lanes_8_to_1)).unwrap();

    // The assembler/decoder pair doesn't encode a register,register,register
    // VEX form from text in this simulator; exercise the interpreter layer
    // directly through the same IR the decoder would produce for
    // `vaddps ymm0, ymm1, ymm2`.
    use x86sim_asm::arch::ArchitectureMap;
    use x86sim_asm::ir::{IRInstruction, IROpcode, IROperand};
    let map = x86sim_vm::arch::X86ArchitectureMap::new();
    let ymm0 = map.register_for("ymm0").unwrap();
    let ymm1 = map.register_for("ymm1").unwrap();
    let ymm2 = map.register_for("ymm2").unwrap();
    let instr = IRInstruction {
        opcode: IROpcode::PackedAddPS,
        operands: vec![IROperand::Register(ymm0), IROperand::Register(ymm1), IROperand::Register(ymm2)],
        original_address: 0,
        original_size: 4,
    };
    x86sim_vm::interpreter::execute(&instr, &mut runner.registers, &mut runner.memory).unwrap();

    let result = unpack_f32x8(runner.registers.get_ymm("ymm0").unwrap());
    for lane in result {
        assert!((lane - 9.0).abs() < f32::EPSILON);
    }
}

/// S5. VPANDN semantics: `(~src1) & src2`.
#[test]
fn vpandn_complements_the_first_source_before_anding() {
    let mut runner = Runner::with_default_config();
    runner.registers.set_ymm("ymm1", [0xF0F0_F0F0_F0F0_F0F0; 4]).unwrap();
    runner.registers.set_ymm("ymm2", [0xFF00_FF00_FF00_FF00; 4]).unwrap();

    use x86sim_asm::arch::ArchitectureMap;
    use x86sim_asm::ir::{IRInstruction, IROpcode, IROperand};
    let map = x86sim_vm::arch::X86ArchitectureMap::new();
    let ymm0 = map.register_for("ymm0").unwrap();
    let ymm1 = map.register_for("ymm1").unwrap();
    let ymm2 = map.register_for("ymm2").unwrap();
    let instr = IRInstruction {
        opcode: IROpcode::PackedAndNot,
        operands: vec![IROperand::Register(ymm0), IROperand::Register(ymm1), IROperand::Register(ymm2)],
        original_address: 0,
        original_size: 4,
    };
    x86sim_vm::interpreter::execute(&instr, &mut runner.registers, &mut runner.memory).unwrap();

    let lanes = runner.registers.get_ymm("ymm0").unwrap();
    for lane in lanes {
        assert_eq!(lane, 0x0F00_0F00_0F00_0F00);
    }
}

/// S6. Stack discipline: push/pop round-trips and leaves `rsp` unchanged.
#[test]
fn push_pop_round_trips_and_writes_the_expected_byte() {
    let mut runner = Runner::with_default_config();
    runner.registers.set64("rax", 0x1122_3344_5566_7788).unwrap();
    let starting_rsp = runner.registers.get64("rsp").unwrap();
    assert_eq!(starting_rsp, runner.memory.stack_bottom());

    use x86sim_asm::arch::ArchitectureMap;
    use x86sim_asm::ir::{IRInstruction, IROpcode, IROperand};
    let map = x86sim_vm::arch::X86ArchitectureMap::new();
    let rax = map.register_for("rax").unwrap();
    let rbx = map.register_for("rbx").unwrap();

    let push = IRInstruction { opcode: IROpcode::Push, operands: vec![IROperand::Register(rax)], original_address: 0, original_size: 1 };
    let pop = IRInstruction { opcode: IROpcode::Pop, operands: vec![IROperand::Register(rbx)], original_address: 1, original_size: 1 };
    x86sim_vm::interpreter::execute(&push, &mut runner.registers, &mut runner.memory).unwrap();
    x86sim_vm::interpreter::execute(&pop, &mut runner.registers, &mut runner.memory).unwrap();

    assert_eq!(runner.registers.get64("rbx").unwrap(), 0x1122_3344_5566_7788);
    assert_eq!(runner.registers.get64("rsp").unwrap(), starting_rsp);

    let byte = runner.memory.read_byte(starting_rsp - 8).unwrap();
    assert_eq!(byte, 0x88);
}

fn pack_f32x8(lanes: [f32; 8]) -> [u64; 4] {
    let mut out = [0u64; 4];
    for i in 0..4 {
        let lo = lanes[i * 2].to_bits() as u64;
        let hi = lanes[i * 2 + 1].to_bits() as u64;
        out[i] = lo | (hi << 32);
    }
    out
}

fn unpack_f32x8(lanes: [u64; 4]) -> [f32; 8] {
    let mut out = [0.0f32; 8];
    for i in 0..4 {
        out[i * 2] = f32::from_bits(lanes[i] as u32);
        out[i * 2 + 1] = f32::from_bits((lanes[i] >> 32) as u32);
    }
    out
}
