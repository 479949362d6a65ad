//! Control flow and the stack: `Jump`/`Branch`/`Call`/`Ret`/`Push`/`Pop`.

use x86sim_asm::fault::SimFault;
use x86sim_asm::ir::{IRConditionCode, IRInstruction, IROperand};

use super::{operand_value32, operand_write32, register_name, ExecOutcome};
use crate::arch::X86ArchitectureMap;
use crate::error::RuntimeError;
use crate::memory::Memory;
use crate::registers::{Flags, RegisterFile};

fn target_address(instr: &IRInstruction) -> Result<u64, RuntimeError> {
    instr.operands[0]
        .as_immediate()
        .ok_or_else(|| RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: "non-immediate branch target".into() }))
}

pub fn jump(regs: &mut RegisterFile, _map: &X86ArchitectureMap, instr: &IRInstruction) -> Result<ExecOutcome, RuntimeError> {
    regs.set_rip(target_address(instr)?);
    Ok(ExecOutcome::Branched)
}

fn condition_holds(flags: Flags, condition: IRConditionCode) -> bool {
    match condition {
        IRConditionCode::Equal => flags.zf(),
        IRConditionCode::NotEqual => !flags.zf(),
        IRConditionCode::Below => flags.cf(),
        IRConditionCode::AboveOrEqual => !flags.cf(),
        IRConditionCode::Less => flags.sf() != flags.of(),
        IRConditionCode::GreaterOrEqual => flags.sf() == flags.of(),
        IRConditionCode::LessOrEqual => flags.zf() || (flags.sf() != flags.of()),
        IRConditionCode::Greater => !flags.zf() && (flags.sf() == flags.of()),
        IRConditionCode::Overflow => flags.of(),
        IRConditionCode::NotOverflow => !flags.of(),
        IRConditionCode::Sign => flags.sf(),
        IRConditionCode::NotSign => !flags.sf(),
    }
}

pub fn branch(regs: &mut RegisterFile, _map: &X86ArchitectureMap, instr: &IRInstruction) -> Result<ExecOutcome, RuntimeError> {
    let condition = instr.operands[1]
        .as_condition()
        .ok_or_else(|| RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: "branch missing condition".into() }))?;
    if condition_holds(regs.rflags(), condition) {
        regs.set_rip(target_address(instr)?);
        Ok(ExecOutcome::Branched)
    } else {
        Ok(ExecOutcome::Continue)
    }
}

fn push_value(regs: &mut RegisterFile, mem: &mut Memory, value: u64) -> Result<(), RuntimeError> {
    let rsp = regs.get64("rsp")?;
    let new_rsp = rsp
        .checked_sub(8)
        .filter(|addr| *addr >= mem.stack_start())
        .ok_or_else(|| RuntimeError::Fatal(SimFault::StackOverflow))?;
    mem.write_stack(new_rsp, value)?;
    regs.set64("rsp", new_rsp)
}

fn pop_value(regs: &mut RegisterFile, mem: &Memory) -> Result<u64, RuntimeError> {
    let rsp = regs.get64("rsp")?;
    if rsp + 8 > mem.stack_bottom() {
        return Err(RuntimeError::Fatal(SimFault::StackUnderflow));
    }
    let value = mem.read_stack(rsp)?;
    regs.set64("rsp", rsp + 8)?;
    Ok(value)
}

/// `push`/`pop` on an r64 operand move the full 64-bit value; any other
/// operand (r32 or memory) moves 32 bits zero-extended onto the stack, since
/// this interpreter's stack slots are always a qword wide.
fn is_r64(operand: &IROperand) -> bool {
    matches!(operand, IROperand::Register(r) if r.size_bits == 64)
}

pub fn push(regs: &mut RegisterFile, mem: &mut Memory, map: &X86ArchitectureMap, instr: &IRInstruction) -> Result<(), RuntimeError> {
    let operand = &instr.operands[0];
    let value = if let IROperand::Register(r) = operand {
        if is_r64(operand) {
            regs.get64(register_name(map, *r)?)?
        } else {
            operand_value32(regs, mem, map, operand)? as u64
        }
    } else {
        operand_value32(regs, mem, map, operand)? as u64
    };
    push_value(regs, mem, value)
}

pub fn pop(regs: &mut RegisterFile, mem: &mut Memory, map: &X86ArchitectureMap, instr: &IRInstruction) -> Result<(), RuntimeError> {
    let operand = &instr.operands[0];
    let value = pop_value(regs, mem)?;
    if let IROperand::Register(r) = operand {
        if is_r64(operand) {
            return regs.set64(register_name(map, *r)?, value);
        }
    }
    operand_write32(regs, mem, map, operand, value as u32)
}

pub fn call(regs: &mut RegisterFile, mem: &mut Memory, _map: &X86ArchitectureMap, instr: &IRInstruction) -> Result<ExecOutcome, RuntimeError> {
    push_value(regs, mem, instr.next_address())?;
    regs.set_rip(target_address(instr)?);
    Ok(ExecOutcome::Branched)
}

pub fn ret(regs: &mut RegisterFile, mem: &mut Memory) -> Result<ExecOutcome, RuntimeError> {
    let target = pop_value(regs, mem)?;
    regs.set_rip(target);
    Ok(ExecOutcome::Branched)
}
