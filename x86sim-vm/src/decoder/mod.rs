//! Byte image → structured instruction stream.
//!
//! Three prefix families are recognized at the top level: VEX-prefixed AVX
//! opcodes (`C4`/`C5`), the two-byte `0F`-prefixed opcodes, and legacy
//! one-byte opcodes. A byte pattern that matches none of them is a decode
//! failure; the scanning walk and the run loop both advance by exactly one
//! byte in that case (see `SPEC_FULL.md` §9).

pub mod modrm;
pub mod vex;

use std::collections::HashMap;

use tracing::warn;
use x86sim_asm::decoded::{DecodedInstruction, DecodedOperand};

use self::modrm::ModRm;
use crate::error::RuntimeError;
use crate::memory::Memory;
use crate::registers::GPR32_NAMES_BY_INDEX;

fn reg_name(index: u8) -> &'static str {
    GPR32_NAMES_BY_INDEX.get(index as usize).copied().unwrap_or("err")
}

fn immediate(value: u64, text: String) -> DecodedOperand {
    DecodedOperand::Immediate { value, text }
}

fn rel_target_operand(target: u64) -> DecodedOperand {
    immediate(target, format!("0x{target:x}"))
}

/// Decode one instruction at `address`. Returns `Ok(None)` on a decode
/// failure (unrecognized byte pattern); `Err` only for a memory access that
/// falls outside the text segment entirely.
pub fn decode_at(mem: &Memory, address: u64) -> Result<Option<DecodedInstruction>, RuntimeError> {
    let lead = mem.read_text(address)?;

    if lead == 0xC4 || lead == 0xC5 {
        return decode_vex(mem, address, lead);
    }
    if lead == 0x0F {
        return decode_two_byte(mem, address);
    }
    decode_legacy(mem, address, lead)
}

fn decode_vex(mem: &Memory, address: u64, _lead: u8) -> Result<Option<DecodedInstruction>, RuntimeError> {
    let prefix = vex::parse(mem, address)?;
    let opcode_address = address + prefix.bytes as u64;
    let vex_opcode = mem.read_text(opcode_address)?;
    let modrm_address = opcode_address + 1;

    let Some(mnemonic) = vex::mnemonic_for(prefix.map_select, vex_opcode) else {
        return Ok(None);
    };

    let (operands, extra_bytes) = vex::operands_for(mem, mnemonic, vex_opcode, &prefix, address, modrm_address)?;
    let length = prefix.bytes + 1 + 1 + extra_bytes;

    Ok(Some(DecodedInstruction::new(address, mnemonic, operands, length)))
}

fn decode_two_byte(mem: &Memory, address: u64) -> Result<Option<DecodedInstruction>, RuntimeError> {
    let second = mem.read_text(address + 1)?;
    if second != 0x8E {
        return Ok(None);
    }
    let length = 6u32;
    let disp = mem.read_text_dword(address + 2)? as i32;
    let target = (address + length as u64).wrapping_add(disp as i64 as u64);
    Ok(Some(DecodedInstruction::new(
        address,
        "jle",
        vec![rel_target_operand(target)],
        length,
    )))
}

fn decode_rel8(mem: &Memory, address: u64, mnemonic: &'static str) -> Result<Option<DecodedInstruction>, RuntimeError> {
    let length = 2u32;
    let disp = mem.read_text(address + 1)? as i8;
    let target = (address + length as u64).wrapping_add(disp as i64 as u64);
    Ok(Some(DecodedInstruction::new(
        address,
        mnemonic,
        vec![rel_target_operand(target)],
        length,
    )))
}

fn decode_modrm_register_pair(mem: &Memory, address: u64, mnemonic: &'static str) -> Result<Option<DecodedInstruction>, RuntimeError> {
    let modrm = ModRm::from_byte(mem.read_text(address + 1)?);
    if !modrm.is_register_direct() {
        return Ok(None);
    }
    let dest = DecodedOperand::Register(reg_name(modrm.rm).to_string());
    let src = DecodedOperand::Register(reg_name(modrm.reg).to_string());
    Ok(Some(DecodedInstruction::new(address, mnemonic, vec![dest, src], 2)))
}

fn decode_legacy(mem: &Memory, address: u64, lead: u8) -> Result<Option<DecodedInstruction>, RuntimeError> {
    match lead {
        0x90 => Ok(Some(DecodedInstruction::new(address, "nop", vec![], 1))),

        0x50..=0x57 => {
            let reg = DecodedOperand::Register(reg_name(lead - 0x50).to_string());
            Ok(Some(DecodedInstruction::new(address, "push", vec![reg], 1)))
        }
        0x58..=0x5F => {
            let reg = DecodedOperand::Register(reg_name(lead - 0x58).to_string());
            Ok(Some(DecodedInstruction::new(address, "pop", vec![reg], 1)))
        }
        0xB8..=0xBF => {
            let reg = DecodedOperand::Register(reg_name(lead - 0xB8).to_string());
            let value = mem.read_text_dword(address + 1)? as u64;
            let imm = immediate(value, format!("0x{value:x}"));
            Ok(Some(DecodedInstruction::new(address, "mov", vec![reg, imm], 5)))
        }

        0x89 => decode_modrm_register_pair(mem, address, "mov"),
        0x01 => decode_modrm_register_pair(mem, address, "add"),
        0x29 => decode_modrm_register_pair(mem, address, "sub"),
        0x09 => decode_modrm_register_pair(mem, address, "or"),
        0x21 => decode_modrm_register_pair(mem, address, "and"),
        0x31 => decode_modrm_register_pair(mem, address, "xor"),
        0x39 => decode_modrm_register_pair(mem, address, "cmp"),

        0x83 => {
            let modrm = ModRm::from_byte(mem.read_text(address + 1)?);
            if !modrm.is_register_direct() {
                return Ok(None);
            }
            let mnemonic = match modrm.reg {
                6 => "xor",
                7 => "cmp",
                _ => return Ok(None),
            };
            let imm_byte = mem.read_text(address + 2)? as u64;
            let reg = DecodedOperand::Register(reg_name(modrm.rm).to_string());
            let imm = immediate(imm_byte, format!("0x{imm_byte:x}"));
            Ok(Some(DecodedInstruction::new(address, mnemonic, vec![reg, imm], 3)))
        }

        0xFF => {
            let modrm = ModRm::from_byte(mem.read_text(address + 1)?);
            if !modrm.is_register_direct() {
                return Ok(None);
            }
            let mnemonic = match modrm.reg {
                0 => "inc",
                1 => "dec",
                _ => return Ok(None),
            };
            let reg = DecodedOperand::Register(reg_name(modrm.rm).to_string());
            Ok(Some(DecodedInstruction::new(address, mnemonic, vec![reg], 2)))
        }

        0xF7 => {
            let modrm = ModRm::from_byte(mem.read_text(address + 1)?);
            if !modrm.is_register_direct() {
                return Ok(None);
            }
            let mnemonic = match modrm.reg {
                2 => "not",
                4 => "mul",
                6 => "div",
                _ => return Ok(None),
            };
            let reg = DecodedOperand::Register(reg_name(modrm.rm).to_string());
            Ok(Some(DecodedInstruction::new(address, mnemonic, vec![reg], 2)))
        }

        0x74 => decode_rel8(mem, address, "je"),
        0x75 => decode_rel8(mem, address, "jne"),
        0x7C => decode_rel8(mem, address, "jl"),
        0x7D => decode_rel8(mem, address, "jge"),
        0x7F => decode_rel8(mem, address, "jg"),

        0xE9 => {
            let length = 5u32;
            let disp = mem.read_text_dword(address + 1)? as i32;
            let target = (address + length as u64).wrapping_add(disp as i64 as u64);
            Ok(Some(DecodedInstruction::new(
                address,
                "jmp",
                vec![rel_target_operand(target)],
                length,
            )))
        }

        0xCD => {
            let value = mem.read_text(address + 1)? as u64;
            let imm = immediate(value, format!("0x{value:x}"));
            Ok(Some(DecodedInstruction::new(address, "int", vec![imm], 2)))
        }

        0xE4 => {
            let value = mem.read_text(address + 1)? as u64;
            let reg = DecodedOperand::Register("al".to_string());
            let imm = immediate(value, format!("0x{value:x}"));
            Ok(Some(DecodedInstruction::new(address, "in", vec![reg, imm], 2)))
        }
        0xE6 => {
            let value = mem.read_text(address + 1)? as u64;
            let imm = immediate(value, format!("0x{value:x}"));
            let reg = DecodedOperand::Register("al".to_string());
            Ok(Some(DecodedInstruction::new(address, "out", vec![imm, reg], 2)))
        }

        _ => Ok(None),
    }
}

/// Linearly scan the populated text segment, producing the decoded program
/// and an address→index map. Decode failures advance the scan by one byte,
/// matching the run loop's on-demand decode policy so the two never
/// disagree about instruction boundaries.
pub fn scan_program(mem: &Memory) -> Result<(Vec<DecodedInstruction>, HashMap<u64, usize>), RuntimeError> {
    let (start, size) = mem.text_range();
    let end = start + size;
    let mut program = Vec::new();
    let mut index = HashMap::new();
    let mut addr = start;
    while addr < end {
        match decode_at(mem, addr)? {
            Some(instr) if instr.length_in_bytes > 0 => {
                index.insert(addr, program.len());
                addr += instr.length_in_bytes as u64;
                program.push(instr);
            }
            _ => {
                warn!(address = addr, "decode failure during scan, advancing one byte");
                addr += 1;
            }
        }
    }
    Ok((program, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(bytes: &[u8]) -> Memory {
        let mut mem = Memory::with_default_sizes();
        for (i, b) in bytes.iter().enumerate() {
            mem.write_text(i as u64, *b).unwrap();
        }
        mem.set_text_size(bytes.len() as u64);
        mem
    }

    #[test]
    fn decodes_mov_and_add_scenario() {
        let mem = load(&[0xB8, 0x05, 0x00, 0x00, 0x00, 0xB9, 0x07, 0x00, 0x00, 0x00, 0x01, 0xC8]);
        let (program, index) = scan_program(&mem).unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program[0].mnemonic, "mov");
        assert_eq!(program[0].length_in_bytes, 5);
        assert_eq!(program[1].mnemonic, "mov");
        assert_eq!(program[2].mnemonic, "add");
        assert_eq!(program[2].length_in_bytes, 2);
        assert_eq!(index[&0], 0);
        assert_eq!(index[&5], 1);
        assert_eq!(index[&10], 2);
    }

    #[test]
    fn decode_failure_advances_by_one_byte() {
        let mem = load(&[0xFE, 0x90]);
        let (program, index) = scan_program(&mem).unwrap();
        // 0xFE matches no table entry; 0x90 (nop) decodes at address 1.
        assert_eq!(program.len(), 1);
        assert_eq!(program[0].mnemonic, "nop");
        assert_eq!(index.get(&1), Some(&0));
        assert!(!index.contains_key(&0));
    }

    #[test]
    fn inc_ecx_encodes_as_ff_c1() {
        let mem = load(&[0xFF, 0xC1]);
        let (program, _) = scan_program(&mem).unwrap();
        assert_eq!(program[0].mnemonic, "inc");
        assert_eq!(program[0].operands[0].text(), "ecx");
    }

    #[test]
    fn jne_rel8_target_is_pc_plus_length_plus_disp() {
        // jne -2 -> infinite loop to self
        let mem = load(&[0x75, 0xFE]);
        let (program, _) = scan_program(&mem).unwrap();
        assert_eq!(program[0].mnemonic, "jne");
        assert_eq!(program[0].operands[0].value(), Some(0));
    }

    #[test]
    fn two_byte_jle_decodes_with_length_six() {
        let mut bytes = vec![0x0F, 0x8E];
        bytes.extend_from_slice(&(-6i32).to_le_bytes());
        let mem = load(&bytes);
        let (program, _) = scan_program(&mem).unwrap();
        assert_eq!(program[0].mnemonic, "jle");
        assert_eq!(program[0].length_in_bytes, 6);
        assert_eq!(program[0].operands[0].value(), Some(0));
    }

    #[test]
    fn vex_three_operand_register_form_decodes() {
        // VEX.256.0F C5 FC 58 C2 -> vaddps ymm0, ymm0, ymm2
        let mem = load(&[0xC5, 0xFC, 0x58, 0xC2]);
        let (program, _) = scan_program(&mem).unwrap();
        assert_eq!(program[0].mnemonic, "vaddps");
        assert_eq!(program[0].length_in_bytes, 4);
        assert_eq!(program[0].operands.len(), 3);
        assert_eq!(program[0].operands[0].text(), "ymm0");
        assert_eq!(program[0].operands[1].text(), "ymm0");
        assert_eq!(program[0].operands[2].text(), "ymm2");
    }

    #[test]
    fn vmovups_rip_relative_resolves_effective_address() {
        // C5 FC 10 05 <disp32> -> vmovups ymm0, [rip+disp]
        let mut bytes = vec![0xC5, 0xFC, 0x10, 0x05];
        bytes.extend_from_slice(&0x10i32.to_le_bytes());
        let mem = load(&bytes);
        let (program, _) = scan_program(&mem).unwrap();
        assert_eq!(program[0].mnemonic, "vmovups");
        assert_eq!(program[0].length_in_bytes, 8);
        let expected = 0u64 + 8 + 0x10;
        assert_eq!(program[0].operands[1].value(), Some(expected));
    }
}
