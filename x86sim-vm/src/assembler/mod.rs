//! Two-pass assembler: text → machine bytes + symbol table.

pub mod lexer;

use std::collections::HashMap;

use tracing::warn;
use x86sim_asm::fault::SimFault;

use self::lexer::{parse_line, Line};
use crate::error::RuntimeError;
use crate::memory::Memory;
use crate::registers::GPR32_NAMES_BY_INDEX;

/// Default label the run loop starts execution at, if present.
pub const ENTRY_POINT_LABEL: &str = "_start";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Text,
    Data,
    Bss,
}

fn parse_immediate(token: &str) -> Option<u64> {
    let token = token.trim_end_matches(',');
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    token.parse::<i64>().ok().map(|v| v as u64).or_else(|| token.parse::<u64>().ok())
}

fn data_directive_width(mnemonic: &str) -> Option<u64> {
    Some(match mnemonic {
        "db" | ".byte" => 1,
        "dw" | ".word" => 2,
        "dd" | ".long" => 4,
        "dq" | ".quad" => 8,
        _ => return None,
    })
}

fn bss_directive_width(mnemonic: &str) -> Option<u64> {
    Some(match mnemonic {
        "resb" => 1,
        "resw" => 2,
        "resd" => 4,
        "resq" => 8,
        _ => return None,
    })
}

/// One data operand's encoded bytes for a `db/dw/dd/dq` directive.
fn encode_data_operand(mnemonic: &str, width: u64, token: &str) -> Vec<u8> {
    let token = token.trim();
    if token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2 {
        return token[1..token.len() - 1].bytes().collect();
    }
    if mnemonic == "dd" || mnemonic == ".long" {
        if token.contains('.') {
            if let Ok(f) = token.parse::<f32>() {
                return f.to_le_bytes().to_vec();
            }
        }
    }
    let value = parse_immediate(token).unwrap_or(0);
    match width {
        1 => vec![value as u8],
        2 => (value as u16).to_le_bytes().to_vec(),
        4 => (value as u32).to_le_bytes().to_vec(),
        8 => value.to_le_bytes().to_vec(),
        _ => unreachable!("data directive widths are 1/2/4/8"),
    }
}

fn gpr32_index(name: &str) -> Option<u8> {
    GPR32_NAMES_BY_INDEX.iter().position(|n| *n == name).map(|i| i as u8)
}

/// Syntactic instruction length, independent of symbol resolution. Unknown
/// mnemonics size to zero, per the spec's "free to widen this table" note.
fn instruction_length(mnemonic: &str, operands: &[String]) -> u32 {
    match mnemonic {
        "mov" if operands.len() == 2 && gpr32_index(&operands[0]).is_some() && parse_immediate(&operands[1]).is_some() => 5,
        "mov" if operands.len() == 2 && gpr32_index(&operands[0]).is_some() && gpr32_index(&operands[1]).is_some() => 2,
        "add" | "sub" | "or" | "and" | "xor" | "cmp"
            if operands.len() == 2 && gpr32_index(&operands[0]).is_some() && gpr32_index(&operands[1]).is_some() =>
        {
            2
        }
        "cmp" | "xor" if operands.len() == 2 && gpr32_index(&operands[0]).is_some() && parse_immediate(&operands[1]).is_some() => 3,
        "inc" | "dec" | "not" | "mul" | "div" if operands.len() == 1 && gpr32_index(&operands[0]).is_some() => 2,
        "jne" | "je" | "jl" | "jge" | "jg" if operands.len() == 1 => 2,
        "jle" if operands.len() == 1 => 6,
        "jmp" if operands.len() == 1 => 5,
        "int" if operands.len() == 1 => 2,
        "in" | "out" if operands.len() == 2 => 2,
        "push" | "pop" if operands.len() == 1 && gpr32_index(&operands[0]).is_some() => 1,
        "nop" => 1,
        _ => 0,
    }
}

/// Emit the machine bytes for one text-section instruction. `address` is
/// where the first byte lands; `symbols` must be fully resolved by pass 2.
fn encode_instruction(mnemonic: &str, operands: &[String], address: u64, symbols: &HashMap<String, u64>) -> Result<Vec<u8>, RuntimeError> {
    let lookup = |label: &str| -> Result<u64, RuntimeError> {
        symbols
            .get(label)
            .copied()
            .ok_or_else(|| RuntimeError::Recoverable(SimFault::SymbolNotFound { label: label.to_string() }))
    };

    match mnemonic {
        "mov" if operands.len() == 2 => {
            if let (Some(rd), Some(imm)) = (gpr32_index(&operands[0]), parse_immediate(&operands[1])) {
                let mut bytes = vec![0xB8 + rd];
                bytes.extend_from_slice(&(imm as u32).to_le_bytes());
                return Ok(bytes);
            }
            if let (Some(rm), Some(reg)) = (gpr32_index(&operands[0]), gpr32_index(&operands[1])) {
                return Ok(vec![0x89, modrm_byte(reg, rm)]);
            }
            Ok(vec![])
        }
        "add" if operands.len() == 2 => modrm_pair(0x01, &operands[0], &operands[1]),
        "sub" if operands.len() == 2 => modrm_pair(0x29, &operands[0], &operands[1]),
        "or" if operands.len() == 2 => modrm_pair(0x09, &operands[0], &operands[1]),
        "and" if operands.len() == 2 => modrm_pair(0x21, &operands[0], &operands[1]),
        "xor" if operands.len() == 2 && gpr32_index(&operands[1]).is_some() => modrm_pair(0x31, &operands[0], &operands[1]),
        "xor" if operands.len() == 2 => modrm_imm8(0x83, 6, &operands[0], &operands[1]),
        "cmp" if operands.len() == 2 && gpr32_index(&operands[1]).is_some() => modrm_pair(0x39, &operands[0], &operands[1]),
        "cmp" if operands.len() == 2 => modrm_imm8(0x83, 7, &operands[0], &operands[1]),
        "inc" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|rm| vec![0xFF, modrm_byte(0, rm)])
            .ok_or_else(|| unsupported(mnemonic)),
        "dec" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|rm| vec![0xFF, modrm_byte(1, rm)])
            .ok_or_else(|| unsupported(mnemonic)),
        "not" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|rm| vec![0xF7, modrm_byte(2, rm)])
            .ok_or_else(|| unsupported(mnemonic)),
        "mul" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|rm| vec![0xF7, modrm_byte(4, rm)])
            .ok_or_else(|| unsupported(mnemonic)),
        "div" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|rm| vec![0xF7, modrm_byte(6, rm)])
            .ok_or_else(|| unsupported(mnemonic)),
        "jne" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 2)) as i8;
            Ok(vec![0x75, rel as u8])
        }
        "je" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 2)) as i8;
            Ok(vec![0x74, rel as u8])
        }
        "jl" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 2)) as i8;
            Ok(vec![0x7C, rel as u8])
        }
        "jge" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 2)) as i8;
            Ok(vec![0x7D, rel as u8])
        }
        "jg" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 2)) as i8;
            Ok(vec![0x7F, rel as u8])
        }
        "jle" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 6)) as i32;
            let mut bytes = vec![0x0F, 0x8E];
            bytes.extend_from_slice(&rel.to_le_bytes());
            Ok(bytes)
        }
        "jmp" if operands.len() == 1 => {
            let target = lookup(&operands[0])?;
            let rel = (target as i64 - (address as i64 + 5)) as i32;
            let mut bytes = vec![0xE9];
            bytes.extend_from_slice(&rel.to_le_bytes());
            Ok(bytes)
        }
        "int" if operands.len() == 1 => {
            let imm = parse_immediate(&operands[0]).unwrap_or(0);
            Ok(vec![0xCD, imm as u8])
        }
        "in" if operands.len() == 2 => {
            let imm = parse_immediate(&operands[1]).unwrap_or(0);
            Ok(vec![0xE4, imm as u8])
        }
        "out" if operands.len() == 2 => {
            let imm = parse_immediate(&operands[0]).unwrap_or(0);
            Ok(vec![0xE6, imm as u8])
        }
        "push" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|r| vec![0x50 + r])
            .ok_or_else(|| unsupported(mnemonic)),
        "pop" if operands.len() == 1 => gpr32_index(&operands[0])
            .map(|r| vec![0x58 + r])
            .ok_or_else(|| unsupported(mnemonic)),
        "nop" => Ok(vec![0x90]),
        _ => Ok(vec![]),
    }
}

fn modrm_byte(reg: u8, rm: u8) -> u8 {
    0b1100_0000 | (reg << 3) | rm
}

fn modrm_pair(opcode: u8, dest: &str, src: &str) -> Result<Vec<u8>, RuntimeError> {
    match (gpr32_index(dest), gpr32_index(src)) {
        (Some(rm), Some(reg)) => Ok(vec![opcode, modrm_byte(reg, rm)]),
        _ => Ok(vec![]),
    }
}

fn modrm_imm8(opcode: u8, reg_field: u8, dest: &str, src: &str) -> Result<Vec<u8>, RuntimeError> {
    match (gpr32_index(dest), parse_immediate(src)) {
        (Some(rm), Some(imm)) => Ok(vec![opcode, modrm_byte(reg_field, rm), imm as u8]),
        _ => Ok(vec![]),
    }
}

fn unsupported(mnemonic: &str) -> RuntimeError {
    RuntimeError::Recoverable(SimFault::LiftFailure { mnemonic: mnemonic.to_string() })
}

/// Drives the assembler's two passes over a program's source text.
#[derive(Debug, Default)]
pub struct Assembler {
    symbol_table: HashMap<String, u64>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol_table(&self) -> &HashMap<String, u64> {
        &self.symbol_table
    }

    /// Assemble `source` into `mem`'s text segment (and materialize `dd`
    /// initialized data into the data segment during pass 1), completing
    /// the symbol table. Returns the initial `RIP`.
    pub fn assemble(&mut self, mem: &mut Memory, source: &str) -> Result<u64, RuntimeError> {
        let lines: Vec<Line> = source.lines().map(parse_line).collect();
        self.pass1(mem, &lines)?;
        self.pass2(mem, &lines)?;

        Ok(self
            .symbol_table
            .get(ENTRY_POINT_LABEL)
            .copied()
            .unwrap_or_else(|| mem.text_range().0))
    }

    fn pass1(&mut self, mem: &mut Memory, lines: &[Line]) -> Result<(), RuntimeError> {
        let mut section = Section::Text;
        let (text_start, _) = mem.text_range();
        let mut text_lc = text_start;
        let mut data_lc = mem.data_start();
        let mut bss_lc = mem.bss_start();

        for line in lines {
            if let Some(label) = &line.label {
                let lc = match section {
                    Section::Text => text_lc,
                    Section::Data => data_lc,
                    Section::Bss => bss_lc,
                };
                self.symbol_table.insert(label.clone(), lc);
            }

            let Some(mnemonic) = &line.mnemonic else { continue };

            if mnemonic == "section" {
                section = match line.operands.first().map(String::as_str) {
                    Some(".text") => Section::Text,
                    Some(".data") => Section::Data,
                    Some(".bss") => Section::Bss,
                    _ => section,
                };
                continue;
            }

            match section {
                Section::Text => {
                    let len = instruction_length(mnemonic, &line.operands);
                    if len == 0 {
                        warn!(mnemonic, "unknown mnemonic sized to zero length in pass 1");
                    }
                    text_lc += len as u64;
                }
                Section::Data => {
                    if let Some(width) = data_directive_width(mnemonic) {
                        for token in &line.operands {
                            let bytes = encode_data_operand(mnemonic, width, token);
                            for b in &bytes {
                                mem.write_byte(data_lc, *b)?;
                                data_lc += 1;
                            }
                        }
                    }
                }
                Section::Bss => {
                    if let Some(width) = bss_directive_width(mnemonic) {
                        let count = line.operands.first().and_then(|t| parse_immediate(t)).unwrap_or(0);
                        bss_lc += count * width;
                    }
                }
            }
        }

        mem.set_text_size(text_lc - text_start);
        Ok(())
    }

    fn pass2(&mut self, mem: &mut Memory, lines: &[Line]) -> Result<(), RuntimeError> {
        let (text_start, _) = mem.text_range();
        let mut text_lc = text_start;

        for line in lines {
            let Some(mnemonic) = &line.mnemonic else { continue };
            if mnemonic == "section" || data_directive_width(mnemonic).is_some() || bss_directive_width(mnemonic).is_some() {
                continue;
            }

            let len = instruction_length(mnemonic, &line.operands);
            if len == 0 {
                continue;
            }
            let bytes = encode_instruction(mnemonic, &line.operands, text_lc, &self.symbol_table)?;
            for (i, byte) in bytes.iter().enumerate() {
                mem.write_text(text_lc + i as u64, *byte)?;
            }
            text_lc += len as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_and_add_encode_per_the_spec_table() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        asm.assemble(&mut mem, "mov eax, 5\nmov ecx, 7\nadd eax, ecx\n").unwrap();
        assert_eq!(mem.read_text(0).unwrap(), 0xB8);
        assert_eq!(mem.read_text_dword(1).unwrap(), 5);
        assert_eq!(mem.read_text(5).unwrap(), 0xB9);
        assert_eq!(mem.read_text_dword(6).unwrap(), 7);
        assert_eq!(mem.read_text(10).unwrap(), 0x01);
        assert_eq!(mem.read_text(11).unwrap(), 0xC8);
    }

    #[test]
    fn mov_ebx_eax_matches_89_c3() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        asm.assemble(&mut mem, "mov ebx, eax\n").unwrap();
        assert_eq!(mem.read_text(0).unwrap(), 0x89);
        assert_eq!(mem.read_text(1).unwrap(), 0xC3);
    }

    #[test]
    fn inc_ecx_matches_ff_c1() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        asm.assemble(&mut mem, "inc ecx\n").unwrap();
        assert_eq!(mem.read_text(0).unwrap(), 0xFF);
        assert_eq!(mem.read_text(1).unwrap(), 0xC1);
    }

    #[test]
    fn cmp_ecx_imm8_matches_83_f9_ib() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        asm.assemble(&mut mem, "cmp ecx, 6\n").unwrap();
        assert_eq!(mem.read_text(0).unwrap(), 0x83);
        assert_eq!(mem.read_text(1).unwrap(), 0xF9);
        assert_eq!(mem.read_text(2).unwrap(), 0x06);
    }

    #[test]
    fn jne_computes_relative_offset_from_next_instruction() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        let src = "loop:\n  inc ecx\n  cmp ecx, 6\n  jne loop\n";
        asm.assemble(&mut mem, src).unwrap();
        // loop: at 0, inc(2)=0..2, cmp(3)=2..5, jne at 5, target=0
        assert_eq!(mem.read_text(5).unwrap(), 0x75);
        let rel = mem.read_text(6).unwrap() as i8;
        assert_eq!(rel, -7);
    }

    #[test]
    fn jmp_rel32_target_formula() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        let src = "top:\n  nop\n  jmp top\n";
        asm.assemble(&mut mem, src).unwrap();
        assert_eq!(mem.read_text(1).unwrap(), 0xE9);
        let rel = mem.read_text_dword(2).unwrap() as i32;
        assert_eq!(rel, -6);
    }

    #[test]
    fn entry_point_label_sets_initial_rip() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        let src = "nop\n_start:\n  nop\n";
        let rip = asm.assemble(&mut mem, src).unwrap();
        assert_eq!(rip, 1);
    }

    #[test]
    fn dd_float_literal_materializes_during_pass_one() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        let src = "section .data\npi: dd 3.5\n";
        asm.assemble(&mut mem, src).unwrap();
        let addr = asm.symbol_table()["pi"];
        assert_eq!(mem.read_dword(addr).unwrap(), 3.5f32.to_bits());
    }

    #[test]
    fn resb_reserves_zeroed_bss_space() {
        let mut mem = Memory::with_default_sizes();
        let mut asm = Assembler::new();
        let src = "section .bss\nbuf: resb 16\n";
        asm.assemble(&mut mem, src).unwrap();
        let addr = asm.symbol_table()["buf"];
        assert_eq!(mem.read_byte(addr).unwrap(), 0);
    }
}
