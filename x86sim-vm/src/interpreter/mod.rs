//! IR instruction execution: one module per concern, dispatched from
//! [`execute`].

mod alu;
mod flow;
mod syscall;
mod vector;

use x86sim_asm::arch::ArchitectureMap;
use x86sim_asm::fault::SimFault;
use x86sim_asm::ir::{IRInstruction, IROpcode, IROperand, IRRegister};

use crate::arch::X86ArchitectureMap;
use crate::error::RuntimeError;
use crate::memory::Memory;
use crate::registers::RegisterFile;

/// What the run loop should do after one instruction executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Advance `rip` by the instruction's original size.
    Continue,
    /// The handler already set `rip`; don't advance it again.
    Branched,
    /// `int 0x80` with `eax = 1`: halt with this exit code.
    Halted(i64),
}

fn register_name<'a>(map: &'a X86ArchitectureMap, reg: IRRegister) -> Result<&'a str, RuntimeError> {
    map.name_of(reg)
        .ok_or_else(|| RuntimeError::from_fault(SimFault::RegisterNotFound { name: format!("{reg:?}") }))
}

fn operand_value32(regs: &RegisterFile, mem: &Memory, map: &X86ArchitectureMap, operand: &IROperand) -> Result<u32, RuntimeError> {
    match operand {
        IROperand::Register(r) => regs.get32(register_name(map, *r)?),
        IROperand::Immediate(v) => Ok(*v as u32),
        IROperand::Memory(m) => mem.read_dword(m.displacement as u64),
        _ => Err(RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: "non-value operand".into() })),
    }
}

fn operand_write32(
    regs: &mut RegisterFile,
    mem: &mut Memory,
    map: &X86ArchitectureMap,
    operand: &IROperand,
    value: u32,
) -> Result<(), RuntimeError> {
    match operand {
        IROperand::Register(r) => regs.set32(register_name(map, *r)?, value),
        IROperand::Memory(m) => mem.write_dword(m.displacement as u64, value),
        _ => Err(RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: "non-writable operand".into() })),
    }
}

fn operand_ymm(regs: &RegisterFile, mem: &Memory, map: &X86ArchitectureMap, operand: &IROperand) -> Result<[u64; 4], RuntimeError> {
    match operand {
        IROperand::Register(r) => regs.get_ymm(register_name(map, *r)?),
        IROperand::Memory(m) => mem.read_ymm(m.displacement as u64),
        _ => Err(RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: "non-vector operand".into() })),
    }
}

fn operand_write_ymm(
    regs: &mut RegisterFile,
    mem: &mut Memory,
    map: &X86ArchitectureMap,
    operand: &IROperand,
    lanes: [u64; 4],
) -> Result<(), RuntimeError> {
    match operand {
        IROperand::Register(r) => regs.set_ymm(register_name(map, *r)?, lanes),
        IROperand::Memory(m) => mem.write_ymm(m.displacement as u64, lanes),
        _ => Err(RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: "non-vector operand".into() })),
    }
}

/// Execute one lifted instruction against the machine state.
pub fn execute(instr: &IRInstruction, regs: &mut RegisterFile, mem: &mut Memory) -> Result<ExecOutcome, RuntimeError> {
    let map = X86ArchitectureMap::new();
    match instr.opcode {
        IROpcode::Move => {
            let v = operand_value32(regs, mem, &map, &instr.operands[1])?;
            operand_write32(regs, mem, &map, &instr.operands[0], v)?;
            Ok(ExecOutcome::Continue)
        }
        IROpcode::Load => {
            let lanes = operand_ymm(regs, mem, &map, &instr.operands[1])?;
            operand_write_ymm(regs, mem, &map, &instr.operands[0], lanes)?;
            Ok(ExecOutcome::Continue)
        }
        IROpcode::Store => {
            let lanes = operand_ymm(regs, mem, &map, &instr.operands[0])?;
            operand_write_ymm(regs, mem, &map, &instr.operands[1], lanes)?;
            Ok(ExecOutcome::Continue)
        }

        IROpcode::Add => alu::binary(regs, mem, &map, instr, alu::add32).map(|_| ExecOutcome::Continue),
        IROpcode::Sub => alu::binary(regs, mem, &map, instr, alu::sub32).map(|_| ExecOutcome::Continue),
        IROpcode::And => alu::binary(regs, mem, &map, instr, alu::and32).map(|_| ExecOutcome::Continue),
        IROpcode::Or => alu::binary(regs, mem, &map, instr, alu::or32).map(|_| ExecOutcome::Continue),
        IROpcode::Xor => alu::binary(regs, mem, &map, instr, alu::xor32).map(|_| ExecOutcome::Continue),
        IROpcode::Cmp => alu::compare(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::Not => alu::not(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::Inc => alu::inc(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::Dec => alu::dec(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::Shl => alu::binary(regs, mem, &map, instr, alu::shl32).map(|_| ExecOutcome::Continue),
        IROpcode::Shr => alu::binary(regs, mem, &map, instr, alu::shr32).map(|_| ExecOutcome::Continue),
        IROpcode::Sar => alu::binary(regs, mem, &map, instr, alu::sar32).map(|_| ExecOutcome::Continue),
        IROpcode::Mul => alu::mul(regs, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::IMul => alu::imul(regs, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::Div => alu::div(regs, &map, instr).map(|_| ExecOutcome::Continue),

        IROpcode::Jump => flow::jump(regs, &map, instr),
        IROpcode::Branch => flow::branch(regs, &map, instr),
        IROpcode::Call => flow::call(regs, mem, &map, instr),
        IROpcode::Ret => flow::ret(regs, mem),
        IROpcode::Nop => Ok(ExecOutcome::Continue),

        IROpcode::Push => flow::push(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::Pop => flow::pop(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),

        IROpcode::PackedAddPS => vector::binary_ps(regs, mem, &map, instr, |a, b| a + b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedSubPS => vector::binary_ps(regs, mem, &map, instr, |a, b| a - b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedMulPS => vector::binary_ps(regs, mem, &map, instr, |a, b| a * b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedDivPS => vector::binary_ps(regs, mem, &map, instr, |a, b| a / b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedMaxPS => vector::binary_ps(regs, mem, &map, instr, f32::max).map(|_| ExecOutcome::Continue),
        IROpcode::PackedMinPS => vector::binary_ps(regs, mem, &map, instr, f32::min).map(|_| ExecOutcome::Continue),
        IROpcode::PackedSqrtPS => vector::unary_ps(regs, mem, &map, instr, f32::sqrt).map(|_| ExecOutcome::Continue),
        IROpcode::PackedReciprocalPS => vector::unary_ps(regs, mem, &map, instr, |v| 1.0 / v).map(|_| ExecOutcome::Continue),
        IROpcode::PackedAnd => vector::binary_bits(regs, mem, &map, instr, |a, b| a & b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedAndNot => vector::binary_bits(regs, mem, &map, instr, |a, b| !a & b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedOr => vector::binary_bits(regs, mem, &map, instr, |a, b| a | b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedXor => vector::binary_bits(regs, mem, &map, instr, |a, b| a ^ b).map(|_| ExecOutcome::Continue),
        IROpcode::PackedMulLowI16 => vector::mul_low_i16(regs, mem, &map, instr).map(|_| ExecOutcome::Continue),
        IROpcode::VectorZero => vector::zero_upper(regs).map(|_| ExecOutcome::Continue),

        IROpcode::Syscall => syscall::interrupt(regs),
        IROpcode::In => syscall::port_in(regs).map(|_| ExecOutcome::Continue),
        IROpcode::Out => syscall::port_out(regs).map(|_| ExecOutcome::Continue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x86sim_asm::ir::{IRConditionCode, IRRegisterKind};

    fn reg32(idx: u32) -> IROperand {
        IROperand::Register(IRRegister::new(IRRegisterKind::Gpr, idx, 32))
    }

    #[test]
    fn move_copies_immediate_into_register() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::with_default_sizes();
        let instr = IRInstruction::new(IROpcode::Move, vec![reg32(0), IROperand::Immediate(42)]);
        execute(&instr, &mut regs, &mut mem).unwrap();
        assert_eq!(regs.get32("eax").unwrap(), 42);
    }

    #[test]
    fn add_sets_zero_flag_when_result_is_zero() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::with_default_sizes();
        regs.set32("eax", 0).unwrap();
        let instr = IRInstruction::new(IROpcode::Add, vec![reg32(0), IROperand::Immediate(0)]);
        execute(&instr, &mut regs, &mut mem).unwrap();
        assert!(regs.rflags().zf());
    }

    #[test]
    fn inc_does_not_touch_carry_flag() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::with_default_sizes();
        regs.set32("eax", 0xFFFF_FFFF).unwrap();
        let mut flags = regs.rflags();
        flags.set_cf(true);
        regs.set_rflags(flags);
        let instr = IRInstruction::new(IROpcode::Inc, vec![reg32(0)]);
        execute(&instr, &mut regs, &mut mem).unwrap();
        assert!(regs.rflags().cf(), "inc must preserve the incoming carry flag");
        assert_eq!(regs.get32("eax").unwrap(), 0);
    }

    #[test]
    fn branch_not_equal_jumps_when_zero_flag_clear() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::with_default_sizes();
        let mut flags = regs.rflags();
        flags.set_zf(false);
        regs.set_rflags(flags);
        let instr = IRInstruction::new(IROpcode::Branch, vec![IROperand::Immediate(0x100), IROperand::Condition(IRConditionCode::NotEqual)]);
        let outcome = execute(&instr, &mut regs, &mut mem).unwrap();
        assert_eq!(outcome, ExecOutcome::Branched);
        assert_eq!(regs.rip(), 0x100);
    }

    #[test]
    fn push_then_pop_round_trips_through_the_stack() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::with_default_sizes();
        regs.set64("rsp", mem.stack_bottom()).unwrap();
        regs.set32("eax", 0xCAFE).unwrap();
        execute(&IRInstruction::new(IROpcode::Push, vec![reg32(0)]), &mut regs, &mut mem).unwrap();
        regs.set32("ecx", 0).unwrap();
        execute(&IRInstruction::new(IROpcode::Pop, vec![reg32(1)]), &mut regs, &mut mem).unwrap();
        assert_eq!(regs.get32("ecx").unwrap(), 0xCAFE);
        assert_eq!(regs.get64("rsp").unwrap(), mem.stack_bottom());
    }

    #[test]
    fn sys_exit_halts_with_the_ebx_exit_code() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::with_default_sizes();
        regs.set32("eax", 1).unwrap();
        regs.set32("ebx", 7).unwrap();
        let outcome = execute(&IRInstruction::new(IROpcode::Syscall, vec![]), &mut regs, &mut mem).unwrap();
        assert_eq!(outcome, ExecOutcome::Halted(7));
    }
}
