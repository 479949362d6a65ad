//! VEX prefix parsing and AVX operand-family dispatch.

use x86sim_asm::decoded::DecodedOperand;

use super::modrm::ModRm;
use crate::memory::Memory;
use crate::error::RuntimeError;

/// A parsed 2- or 3-byte VEX prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VexPrefix {
    /// Total bytes the prefix itself occupies (2 for `C5`, 3 for `C4`).
    pub bytes: u32,
    /// Opcode map selector; `1` means the implicit two-byte (`0F`) map.
    pub map_select: u8,
    /// Vector length: `256` when `L=1`, `128` otherwise.
    pub vector_length: u32,
    /// The non-destructive source register index (already un-inverted).
    pub vvvv: u8,
}

impl VexPrefix {
    pub fn reg_prefix(&self) -> &'static str {
        if self.vector_length == 256 {
            "ymm"
        } else {
            "xmm"
        }
    }
}

/// Parse the VEX prefix starting at `address`. `address` must point at the
/// `C4`/`C5` lead byte.
pub fn parse(mem: &Memory, address: u64) -> Result<VexPrefix, RuntimeError> {
    let lead = mem.read_text(address)?;
    if lead == 0xC5 {
        let byte2 = mem.read_text(address + 1)?;
        let l = (byte2 >> 2) & 1;
        let vvvv_inverted = (byte2 >> 3) & 0b1111;
        Ok(VexPrefix {
            bytes: 2,
            map_select: 1,
            vector_length: if l == 1 { 256 } else { 128 },
            vvvv: (!vvvv_inverted) & 0b1111,
        })
    } else {
        let byte2 = mem.read_text(address + 1)?;
        let byte3 = mem.read_text(address + 2)?;
        let map_select = byte2 & 0b1_1111;
        let l = (byte3 >> 2) & 1;
        let vvvv_inverted = (byte3 >> 3) & 0b1111;
        Ok(VexPrefix {
            bytes: 3,
            map_select,
            vector_length: if l == 1 { 256 } else { 128 },
            vvvv: (!vvvv_inverted) & 0b1111,
        })
    }
}

const THREE_OPERAND_FAMILY: &[&str] = &[
    "vaddps", "vsubps", "vminps", "vdivps", "vmaxps", "vpandn", "vpand", "vpmullw", "vpxor", "vpor",
];
const UNARY_FAMILY: &[&str] = &["vrcpps", "vsqrtps"];

/// Build the operand list for a decoded VEX instruction. `modrm_address` is
/// the address of the ModR/M byte (immediately after the VEX opcode byte).
/// Returns the operands plus the number of trailing displacement bytes
/// consumed (0 or 4).
pub fn operands_for(
    mem: &Memory,
    mnemonic: &str,
    vex_opcode: u8,
    prefix: &VexPrefix,
    instr_address: u64,
    modrm_address: u64,
) -> Result<(Vec<DecodedOperand>, u32), RuntimeError> {
    let modrm = ModRm::from_byte(mem.read_text(modrm_address)?);
    let reg_prefix = prefix.reg_prefix();
    let dest_name = format!("{reg_prefix}{}", modrm.reg);
    let next_instr_if_memory = instr_address + prefix.bytes + 1 + 1 + 4;

    let memory_operand = |mem: &Memory, modrm_addr: u64| -> Result<DecodedOperand, RuntimeError> {
        let disp = mem.read_text_dword(modrm_addr + 1)? as i32;
        let effective = next_instr_if_memory.wrapping_add(disp as i64 as u64);
        Ok(DecodedOperand::Memory {
            effective_address: effective,
            text: format!("[0x{effective:x}]"),
        })
    };

    if THREE_OPERAND_FAMILY.contains(&mnemonic) {
        let dest = DecodedOperand::YmmRegister(dest_name);
        let src1 = DecodedOperand::YmmRegister(format!("{reg_prefix}{}", prefix.vvvv));
        if modrm.is_register_direct() {
            let src2 = DecodedOperand::YmmRegister(format!("{reg_prefix}{}", modrm.rm));
            Ok((vec![dest, src1, src2], 0))
        } else {
            // Memory src2 is not part of the required coverage for this
            // family; register-direct is the only supported form.
            Ok((vec![dest, src1], 0))
        }
    } else if mnemonic == "vmovups" {
        let reg_operand = DecodedOperand::YmmRegister(dest_name);
        if modrm.is_register_direct() {
            let rm_operand = DecodedOperand::YmmRegister(format!("{reg_prefix}{}", modrm.rm));
            if vex_opcode == 0x10 {
                Ok((vec![reg_operand, rm_operand], 0))
            } else {
                Ok((vec![rm_operand, reg_operand], 0))
            }
        } else if modrm.is_rip_relative() {
            let mem_operand = memory_operand(mem, modrm_address)?;
            if vex_opcode == 0x10 {
                Ok((vec![reg_operand, mem_operand], 4))
            } else {
                Ok((vec![mem_operand, reg_operand], 4))
            }
        } else {
            Ok((vec![], 0))
        }
    } else if UNARY_FAMILY.contains(&mnemonic) {
        let dest = DecodedOperand::YmmRegister(dest_name);
        if modrm.is_register_direct() {
            let src = DecodedOperand::YmmRegister(format!("{reg_prefix}{}", modrm.rm));
            Ok((vec![dest, src], 0))
        } else if modrm.is_rip_relative() {
            let src = memory_operand(mem, modrm_address)?;
            Ok((vec![dest, src], 4))
        } else {
            Ok((vec![dest], 0))
        }
    } else {
        // vzeroupper and anything else with no modelled operand layout: the
        // ModR/M byte is still consumed (matching the grounding source,
        // which always reads it before dispatching on mnemonic) but carries
        // no operands.
        Ok((vec![], 0))
    }
}

/// VEX opcode table for `map_select == 1` (the implicit `0F` map), per the
/// machine-code tables this decoder implements.
pub fn mnemonic_for(map_select: u8, opcode: u8) -> Option<&'static str> {
    if map_select != 1 {
        return None;
    }
    Some(match opcode {
        0x10 | 0x11 => "vmovups",
        0x51 => "vsqrtps",
        0x53 => "vrcpps",
        0x58 => "vaddps",
        0x5C => "vsubps",
        0x5D => "vminps",
        0x5E => "vdivps",
        0x5F => "vmaxps",
        0x77 => "vzeroupper",
        0xD5 => "vpmullw",
        0xDB => "vpand",
        0xDF => "vpandn",
        0xEB => "vpor",
        0xEF => "vpxor",
        _ => return None,
    })
}
