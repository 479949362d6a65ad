//! Decoded instruction → architecture-neutral IR.
//!
//! One function per concern: [`lift`] dispatches on the mnemonic, delegating
//! operand translation to [`lift_operand`], which resolves concrete register
//! names through [`X86ArchitectureMap`].

use x86sim_asm::arch::ArchitectureMap;
use x86sim_asm::decoded::{DecodedInstruction, DecodedOperand};
use x86sim_asm::fault::SimFault;
use x86sim_asm::ir::{IRConditionCode, IRInstruction, IRMemoryOperand, IROpcode, IROperand};

use crate::arch::X86ArchitectureMap;
use crate::error::RuntimeError;

fn lift_operand(map: &X86ArchitectureMap, operand: &DecodedOperand, vector_width: u32) -> Result<IROperand, RuntimeError> {
    match operand {
        DecodedOperand::Register(name) | DecodedOperand::YmmRegister(name) => map
            .register_for(name)
            .map(IROperand::Register)
            .ok_or_else(|| RuntimeError::from_fault(SimFault::RegisterNotFound { name: name.clone() })),
        DecodedOperand::Immediate { value, .. } => Ok(IROperand::Immediate(*value)),
        DecodedOperand::Memory { effective_address, .. } => {
            Ok(IROperand::Memory(IRMemoryOperand::new(vector_width).with_displacement(*effective_address as i64)))
        }
        DecodedOperand::Label(label) => Err(RuntimeError::from_fault(SimFault::SymbolNotFound { label: label.clone() })),
    }
}

fn lift_operands(map: &X86ArchitectureMap, instr: &DecodedInstruction, vector_width: u32) -> Result<Vec<IROperand>, RuntimeError> {
    instr.operands.iter().map(|op| lift_operand(map, op, vector_width)).collect()
}

fn branch(instr: &DecodedInstruction, map: &X86ArchitectureMap, condition: IRConditionCode) -> Result<IRInstruction, RuntimeError> {
    let mut operands = lift_operands(map, instr, 32)?;
    operands.push(IROperand::Condition(condition));
    Ok(IRInstruction::new(IROpcode::Branch, operands))
}

/// Translate one decoded instruction into its IR form. `vmovups` splits into
/// [`IROpcode::Load`]/[`IROpcode::Store`] by direction (the decoder only
/// ever names the destination-first operand order); every other vector
/// mnemonic lifts to a single packed opcode.
pub fn lift(instr: &DecodedInstruction) -> Result<IRInstruction, RuntimeError> {
    let map = X86ArchitectureMap::new();
    let mnemonic = instr.mnemonic.as_str();

    let ir = match mnemonic {
        "mov" => IRInstruction::new(IROpcode::Move, lift_operands(&map, instr, 32)?),
        "add" => IRInstruction::new(IROpcode::Add, lift_operands(&map, instr, 32)?),
        "sub" => IRInstruction::new(IROpcode::Sub, lift_operands(&map, instr, 32)?),
        "or" => IRInstruction::new(IROpcode::Or, lift_operands(&map, instr, 32)?),
        "and" => IRInstruction::new(IROpcode::And, lift_operands(&map, instr, 32)?),
        "xor" => IRInstruction::new(IROpcode::Xor, lift_operands(&map, instr, 32)?),
        "cmp" => IRInstruction::new(IROpcode::Cmp, lift_operands(&map, instr, 32)?),
        "not" => IRInstruction::new(IROpcode::Not, lift_operands(&map, instr, 32)?),
        "inc" => IRInstruction::new(IROpcode::Inc, lift_operands(&map, instr, 32)?),
        "dec" => IRInstruction::new(IROpcode::Dec, lift_operands(&map, instr, 32)?),
        "mul" => IRInstruction::new(IROpcode::Mul, lift_operands(&map, instr, 32)?),
        "imul" => IRInstruction::new(IROpcode::IMul, lift_operands(&map, instr, 32)?),
        "div" => IRInstruction::new(IROpcode::Div, lift_operands(&map, instr, 32)?),
        "shl" => IRInstruction::new(IROpcode::Shl, lift_operands(&map, instr, 32)?),
        "shr" => IRInstruction::new(IROpcode::Shr, lift_operands(&map, instr, 32)?),
        "sar" => IRInstruction::new(IROpcode::Sar, lift_operands(&map, instr, 32)?),
        "push" => IRInstruction::new(IROpcode::Push, lift_operands(&map, instr, 32)?),
        "pop" => IRInstruction::new(IROpcode::Pop, lift_operands(&map, instr, 32)?),
        "nop" => IRInstruction::new(IROpcode::Nop, vec![]),
        "ret" => IRInstruction::new(IROpcode::Ret, vec![]),
        "call" => IRInstruction::new(IROpcode::Call, lift_operands(&map, instr, 32)?),
        "jmp" => IRInstruction::new(IROpcode::Jump, lift_operands(&map, instr, 32)?),
        "je" => branch(instr, &map, IRConditionCode::Equal)?,
        "jne" => branch(instr, &map, IRConditionCode::NotEqual)?,
        "jl" => branch(instr, &map, IRConditionCode::Less)?,
        "jge" => branch(instr, &map, IRConditionCode::GreaterOrEqual)?,
        "jg" => branch(instr, &map, IRConditionCode::Greater)?,
        "jle" => branch(instr, &map, IRConditionCode::LessOrEqual)?,
        "int" => IRInstruction::new(IROpcode::Syscall, lift_operands(&map, instr, 32)?),
        "in" => IRInstruction::new(IROpcode::In, lift_operands(&map, instr, 32)?),
        "out" => IRInstruction::new(IROpcode::Out, lift_operands(&map, instr, 32)?),

        "vaddps" => IRInstruction::new(IROpcode::PackedAddPS, lift_operands(&map, instr, 256)?),
        "vsubps" => IRInstruction::new(IROpcode::PackedSubPS, lift_operands(&map, instr, 256)?),
        "vminps" => IRInstruction::new(IROpcode::PackedMinPS, lift_operands(&map, instr, 256)?),
        "vmaxps" => IRInstruction::new(IROpcode::PackedMaxPS, lift_operands(&map, instr, 256)?),
        "vdivps" => IRInstruction::new(IROpcode::PackedDivPS, lift_operands(&map, instr, 256)?),
        "vsqrtps" => IRInstruction::new(IROpcode::PackedSqrtPS, lift_operands(&map, instr, 256)?),
        "vrcpps" => IRInstruction::new(IROpcode::PackedReciprocalPS, lift_operands(&map, instr, 256)?),
        "vpand" => IRInstruction::new(IROpcode::PackedAnd, lift_operands(&map, instr, 256)?),
        "vpandn" => IRInstruction::new(IROpcode::PackedAndNot, lift_operands(&map, instr, 256)?),
        "vpor" => IRInstruction::new(IROpcode::PackedOr, lift_operands(&map, instr, 256)?),
        "vpxor" => IRInstruction::new(IROpcode::PackedXor, lift_operands(&map, instr, 256)?),
        "vpmullw" => IRInstruction::new(IROpcode::PackedMulLowI16, lift_operands(&map, instr, 256)?),
        "vzeroupper" => IRInstruction::new(IROpcode::VectorZero, vec![]),
        "vmovups" => {
            let operands = lift_operands(&map, instr, 256)?;
            let stores_to_memory = matches!(instr.operands.first(), Some(DecodedOperand::Memory { .. }));
            let opcode = if stores_to_memory { IROpcode::Store } else { IROpcode::Load };
            IRInstruction::new(opcode, operands)
        }

        _ => return Err(RuntimeError::from_fault(SimFault::LiftFailure { mnemonic: mnemonic.to_string() })),
    };

    Ok(ir.with_origin(instr.address, instr.length_in_bytes))
}
