//! The concrete x86 architecture map: the fixed table translating between
//! [`IRRegister`] and concrete register names.

use x86sim_asm::arch::ArchitectureMap;
use x86sim_asm::ir::{IRRegister, IRRegisterKind};

use crate::registers::GPR32_NAMES_BY_INDEX;

const GPR64_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];
const GPR32_NAMES: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d", "r15d",
];
const GPR16_NAMES: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w",
];
const GPR8_LOW_NAMES: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b",
];

/// Fixed `IRRegister ↔ concrete name` table for this simulator's x86 subset.
/// Covers all required GPRs at 64/32/16/8(low) bits, `rip`, and vector
/// registers at 128/256 bits. Lookup failure is the caller's concern, not a
/// panic; the lifter turns a miss into a recoverable `RegisterNotFound` fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct X86ArchitectureMap;

impl X86ArchitectureMap {
    pub const fn new() -> Self {
        Self
    }
}

fn gpr_index(name: &str) -> Option<(usize, u32)> {
    for (names, size) in [
        (&GPR64_NAMES, 64),
        (&GPR32_NAMES, 32),
        (&GPR16_NAMES, 16),
        (&GPR8_LOW_NAMES, 8),
    ] {
        if let Some(i) = names.iter().position(|n| *n == name) {
            return Some((i, size));
        }
    }
    None
}

impl ArchitectureMap for X86ArchitectureMap {
    fn name_of(&self, reg: IRRegister) -> Option<&str> {
        let idx = reg.index as usize;
        match (reg.kind, reg.size_bits) {
            (IRRegisterKind::Gpr, 64) => GPR64_NAMES.get(idx).copied(),
            (IRRegisterKind::Gpr, 32) => GPR32_NAMES.get(idx).copied(),
            (IRRegisterKind::Gpr, 16) => GPR16_NAMES.get(idx).copied(),
            (IRRegisterKind::Gpr, 8) => GPR8_LOW_NAMES.get(idx).copied(),
            (IRRegisterKind::Ip, _) => Some("rip"),
            (IRRegisterKind::Flags, _) => Some("rflags"),
            (IRRegisterKind::Vector, 256) => {
                static NAMES: [&str; 16] = [
                    "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "ymm8", "ymm9", "ymm10", "ymm11",
                    "ymm12", "ymm13", "ymm14", "ymm15",
                ];
                NAMES.get(idx).copied()
            }
            (IRRegisterKind::Vector, 128) => {
                static NAMES: [&str; 16] = [
                    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10", "xmm11",
                    "xmm12", "xmm13", "xmm14", "xmm15",
                ];
                NAMES.get(idx).copied()
            }
            _ => None,
        }
    }

    fn register_for(&self, name: &str) -> Option<IRRegister> {
        if name == "rip" || name == "eip" || name == "ip" {
            return Some(IRRegister::new(IRRegisterKind::Ip, 0, 64));
        }
        if name == "rflags" || name == "eflags" || name == "flags" {
            return Some(IRRegister::new(IRRegisterKind::Flags, 0, 64));
        }
        if let Some(rest) = name.strip_prefix("ymm") {
            return rest.parse::<u32>().ok().map(|i| IRRegister::new(IRRegisterKind::Vector, i, 256));
        }
        if let Some(rest) = name.strip_prefix("xmm") {
            return rest.parse::<u32>().ok().map(|i| IRRegister::new(IRRegisterKind::Vector, i, 128));
        }
        let (idx, size) = gpr_index(name)?;
        Some(IRRegister::new(IRRegisterKind::Gpr, idx as u32, size))
    }
}

/// The decoder's `reg_field` ordering (`eax=0 .. edi=7`) matches `GPR32_NAMES_BY_INDEX`.
pub const fn decoder_gpr32_names() -> &'static [&'static str; 8] {
    &GPR32_NAMES_BY_INDEX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eax_maps_to_gpr_0_32() {
        let map = X86ArchitectureMap::new();
        let reg = map.register_for("eax").unwrap();
        assert_eq!(reg, IRRegister::new(IRRegisterKind::Gpr, 0, 32));
        assert_eq!(map.name_of(reg), Some("eax"));
    }

    #[test]
    fn ymm1_maps_to_vector_1_256() {
        let map = X86ArchitectureMap::new();
        let reg = map.register_for("ymm1").unwrap();
        assert_eq!(reg, IRRegister::new(IRRegisterKind::Vector, 1, 256));
    }

    #[test]
    fn unknown_name_is_none_not_panic() {
        let map = X86ArchitectureMap::new();
        assert_eq!(map.register_for("zzz"), None);
    }
}
