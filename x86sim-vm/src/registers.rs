//! Named-register store: aliased 64/32/16/8-bit GPR views, YMM/XMM vectors,
//! segment registers, `rip`, and `rflags` with named bit accessors.

use tracing::warn;
use x86sim_asm::fault::SimFault;

use crate::consts::*;
use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    W64,
    W32,
    W16,
    W8Low,
    W8High,
}

#[derive(Clone, Copy)]
struct GprAlias {
    name: &'static str,
    slot: usize,
    width: Width,
}

macro_rules! gpr_group {
    ($slot:expr, $r64:literal, $r32:literal, $r16:literal, $r8l:literal, $r8h:literal) => {
        [
            GprAlias { name: $r64, slot: $slot, width: Width::W64 },
            GprAlias { name: $r32, slot: $slot, width: Width::W32 },
            GprAlias { name: $r16, slot: $slot, width: Width::W16 },
            GprAlias { name: $r8l, slot: $slot, width: Width::W8Low },
            GprAlias { name: $r8h, slot: $slot, width: Width::W8High },
        ]
    };
}

/// GPR slot index, matching the ModR/M register-number ordering the decoder
/// uses: `eax=0, ecx=1, edx=2, ebx=3, esp=4, ebp=5, esi=6, edi=7, r8..r15=8..15`.
fn gpr_alias_table() -> Vec<GprAlias> {
    let mut v = Vec::new();
    v.extend(gpr_group!(0, "rax", "eax", "ax", "al", "ah"));
    v.extend(gpr_group!(1, "rcx", "ecx", "cx", "cl", "ch"));
    v.extend(gpr_group!(2, "rdx", "edx", "dx", "dl", "dh"));
    v.extend(gpr_group!(3, "rbx", "ebx", "bx", "bl", "bh"));
    for (slot, (r64, r32, r16, r8)) in [
        (4, ("rsp", "esp", "sp", "spl")),
        (5, ("rbp", "ebp", "bp", "bpl")),
        (6, ("rsi", "esi", "si", "sil")),
        (7, ("rdi", "edi", "di", "dil")),
    ] {
        v.push(GprAlias { name: r64, slot, width: Width::W64 });
        v.push(GprAlias { name: r32, slot, width: Width::W32 });
        v.push(GprAlias { name: r16, slot, width: Width::W16 });
        v.push(GprAlias { name: r8, slot, width: Width::W8Low });
    }
    for i in 8..16usize {
        let names: [(&'static str, Width); 4] = match i {
            8 => [("r8", Width::W64), ("r8d", Width::W32), ("r8w", Width::W16), ("r8b", Width::W8Low)],
            9 => [("r9", Width::W64), ("r9d", Width::W32), ("r9w", Width::W16), ("r9b", Width::W8Low)],
            10 => [("r10", Width::W64), ("r10d", Width::W32), ("r10w", Width::W16), ("r10b", Width::W8Low)],
            11 => [("r11", Width::W64), ("r11d", Width::W32), ("r11w", Width::W16), ("r11b", Width::W8Low)],
            12 => [("r12", Width::W64), ("r12d", Width::W32), ("r12w", Width::W16), ("r12b", Width::W8Low)],
            13 => [("r13", Width::W64), ("r13d", Width::W32), ("r13w", Width::W16), ("r13b", Width::W8Low)],
            14 => [("r14", Width::W64), ("r14d", Width::W32), ("r14w", Width::W16), ("r14b", Width::W8Low)],
            15 => [("r15", Width::W64), ("r15d", Width::W32), ("r15w", Width::W16), ("r15b", Width::W8Low)],
            _ => unreachable!(),
        };
        for (name, width) in names {
            v.push(GprAlias { name, slot: i, width });
        }
    }
    v
}

/// The 32-bit GPR index → name ordering the decoder's ModR/M logic relies on.
pub const GPR32_NAMES_BY_INDEX: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];

bitflags::bitflags! {
    /// `RFLAGS`, with named bit accessors below for the flags this simulator
    /// actually computes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u64 {
        const CF = 1 << RFLAGS_CF_BIT;
        const RESERVED_ONE = 1 << RFLAGS_RESERVED_ONE_BIT;
        const PF = 1 << RFLAGS_PF_BIT;
        const AF = 1 << RFLAGS_AF_BIT;
        const ZF = 1 << RFLAGS_ZF_BIT;
        const SF = 1 << RFLAGS_SF_BIT;
        const DF = 1 << RFLAGS_DF_BIT;
        const OF = 1 << RFLAGS_OF_BIT;
    }
}

impl Flags {
    pub fn cf(self) -> bool {
        self.contains(Self::CF)
    }
    pub fn set_cf(&mut self, v: bool) {
        self.set(Self::CF, v);
    }
    pub fn pf(self) -> bool {
        self.contains(Self::PF)
    }
    pub fn set_pf(&mut self, v: bool) {
        self.set(Self::PF, v);
    }
    pub fn af(self) -> bool {
        self.contains(Self::AF)
    }
    pub fn set_af(&mut self, v: bool) {
        self.set(Self::AF, v);
    }
    pub fn zf(self) -> bool {
        self.contains(Self::ZF)
    }
    pub fn set_zf(&mut self, v: bool) {
        self.set(Self::ZF, v);
    }
    pub fn sf(self) -> bool {
        self.contains(Self::SF)
    }
    pub fn set_sf(&mut self, v: bool) {
        self.set(Self::SF, v);
    }
    pub fn df(self) -> bool {
        self.contains(Self::DF)
    }
    pub fn set_df(&mut self, v: bool) {
        self.set(Self::DF, v);
    }
    pub fn of(self) -> bool {
        self.contains(Self::OF)
    }
    pub fn set_of(&mut self, v: bool) {
        self.set(Self::OF, v);
    }

    /// Bit 1 is always set, matching real RFLAGS.
    pub fn with_reserved_bit(mut self) -> Self {
        self.insert(Self::RESERVED_ONE);
        self
    }
}

/// Named-register store.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    gpr: [u64; GPR_COUNT],
    ymm: [[u64; 4]; YMM_COUNT],
    segments: std::collections::HashMap<&'static str, u64>,
    rip: u64,
    rflags: Flags,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        let mut segments = std::collections::HashMap::new();
        for seg in ["cs", "ds", "es", "fs", "gs", "ss"] {
            segments.insert(seg, 0u64);
        }
        Self {
            gpr: [0; GPR_COUNT],
            ymm: [[0; 4]; YMM_COUNT],
            segments,
            rip: 0,
            rflags: Flags::default().with_reserved_bit(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn rip(&self) -> u64 {
        self.rip
    }

    pub fn set_rip(&mut self, value: u64) {
        self.rip = value;
    }

    pub fn rflags(&self) -> Flags {
        self.rflags
    }

    pub fn set_rflags(&mut self, flags: Flags) {
        self.rflags = flags.with_reserved_bit();
    }

    /// Refresh the store's `rflags` slot from a scratch value computed by
    /// the interpreter during instruction execution.
    pub fn sync_rflags_to_store(&mut self, scratch: Flags) {
        self.set_rflags(scratch);
    }

    fn find_alias(name: &str) -> Option<GprAlias> {
        static TABLE: std::sync::OnceLock<Vec<GprAlias>> = std::sync::OnceLock::new();
        TABLE.get_or_init(gpr_alias_table).iter().find(|a| a.name == name).copied()
    }

    pub fn get64(&self, name: &str) -> Result<u64, RuntimeError> {
        if let Some(alias) = Self::find_alias(name) {
            return Ok(self.gpr[alias.slot]);
        }
        self.get_special(name)
    }

    fn get_special(&self, name: &str) -> Result<u64, RuntimeError> {
        match name {
            "rip" | "eip" | "ip" => Ok(self.rip),
            "rflags" | "eflags" | "flags" => Ok(self.rflags.bits()),
            seg if self.segments.contains_key(seg) => Ok(self.segments[seg]),
            _ => Err(RuntimeError::Recoverable(SimFault::RegisterNotFound { name: name.to_string() })),
        }
    }

    pub fn get32(&self, name: &str) -> Result<u32, RuntimeError> {
        self.get_view(name, Width::W32).map(|v| v as u32)
    }

    pub fn get16(&self, name: &str) -> Result<u16, RuntimeError> {
        self.get_view(name, Width::W16).map(|v| v as u16)
    }

    pub fn get8(&self, name: &str) -> Result<u8, RuntimeError> {
        self.get_view(name, Width::W8Low).map(|v| v as u8)
    }

    fn get_view(&self, name: &str, expected_minimum: Width) -> Result<u64, RuntimeError> {
        if let Some(alias) = Self::find_alias(name) {
            let raw = self.gpr[alias.slot];
            return Ok(match alias.width {
                Width::W64 => raw,
                Width::W32 => raw & 0xFFFF_FFFF,
                Width::W16 => raw & 0xFFFF,
                Width::W8Low => raw & 0xFF,
                Width::W8High => (raw >> 8) & 0xFF,
            });
        }
        let _ = expected_minimum;
        self.get_special(name)
    }

    pub fn set64(&mut self, name: &str, value: u64) -> Result<(), RuntimeError> {
        if let Some(alias) = Self::find_alias(name) {
            self.gpr[alias.slot] = value;
            return Ok(());
        }
        self.set_special(name, value)
    }

    fn set_special(&mut self, name: &str, value: u64) -> Result<(), RuntimeError> {
        match name {
            "rip" | "eip" | "ip" => {
                self.rip = value;
                Ok(())
            }
            "rflags" | "eflags" | "flags" => {
                self.set_rflags(Flags::from_bits_retain(value));
                Ok(())
            }
            seg if self.segments.contains_key(seg) => {
                self.segments.insert(seg, value);
                Ok(())
            }
            _ => Err(RuntimeError::Recoverable(SimFault::RegisterNotFound { name: name.to_string() })),
        }
    }

    /// Write a 32-bit view; zero-extends into the full 64-bit slot (the x86
    /// rule this whole alias table exists to enforce).
    pub fn set32(&mut self, name: &str, value: u32) -> Result<(), RuntimeError> {
        if let Some(alias) = Self::find_alias(name) {
            if alias.width != Width::W32 {
                warn!(name, "set32 called on a non-32-bit view");
            }
            self.gpr[alias.slot] = value as u64;
            return Ok(());
        }
        self.set_special(name, value as u64)
    }

    pub fn set16(&mut self, name: &str, value: u16) -> Result<(), RuntimeError> {
        let alias = Self::find_alias(name).ok_or_else(|| RuntimeError::Recoverable(SimFault::RegisterNotFound { name: name.to_string() }))?;
        let slot = &mut self.gpr[alias.slot];
        *slot = (*slot & !0xFFFF) | value as u64;
        Ok(())
    }

    pub fn set8(&mut self, name: &str, value: u8) -> Result<(), RuntimeError> {
        let alias = Self::find_alias(name).ok_or_else(|| RuntimeError::Recoverable(SimFault::RegisterNotFound { name: name.to_string() }))?;
        let slot = &mut self.gpr[alias.slot];
        match alias.width {
            Width::W8High => *slot = (*slot & !0xFF00) | ((value as u64) << 8),
            _ => *slot = (*slot & !0xFF) | value as u64,
        }
        Ok(())
    }

    fn ymm_index(name: &str) -> Option<(usize, bool)> {
        if let Some(rest) = name.strip_prefix("ymm") {
            return rest.parse::<usize>().ok().filter(|i| *i < YMM_COUNT).map(|i| (i, false));
        }
        if let Some(rest) = name.strip_prefix("xmm") {
            return rest.parse::<usize>().ok().filter(|i| *i < YMM_COUNT).map(|i| (i, true));
        }
        None
    }

    pub fn get_ymm(&self, name: &str) -> Result<[u64; 4], RuntimeError> {
        let (idx, xmm_only) = Self::ymm_index(name).ok_or_else(|| RuntimeError::Recoverable(SimFault::RegisterNotFound { name: name.to_string() }))?;
        let full = self.ymm[idx];
        Ok(if xmm_only { [full[0], full[1], 0, 0] } else { full })
    }

    pub fn set_ymm(&mut self, name: &str, lanes: [u64; 4]) -> Result<(), RuntimeError> {
        let (idx, xmm_only) = Self::ymm_index(name).ok_or_else(|| RuntimeError::Recoverable(SimFault::RegisterNotFound { name: name.to_string() }))?;
        if xmm_only {
            self.ymm[idx][0] = lanes[0];
            self.ymm[idx][1] = lanes[1];
        } else {
            self.ymm[idx] = lanes;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set32_zero_extends_the_64_bit_slot() {
        let mut regs = RegisterFile::new();
        regs.set64("rax", 0xFFFF_FFFF_FFFF_FFFF).unwrap();
        regs.set32("eax", 0x1234_5678).unwrap();
        assert_eq!(regs.get64("rax").unwrap(), 0x0000_0000_1234_5678);
    }

    #[test]
    fn set16_preserves_upper_bits() {
        let mut regs = RegisterFile::new();
        regs.set64("rax", 0x1122_3344_5566_7788).unwrap();
        regs.set16("ax", 0xAABB).unwrap();
        assert_eq!(regs.get64("rax").unwrap(), 0x1122_3344_5566_AABB);
    }

    #[test]
    fn set8_high_byte_does_not_disturb_low_byte() {
        let mut regs = RegisterFile::new();
        regs.set64("rax", 0).unwrap();
        regs.set8("al", 0x11).unwrap();
        regs.set8("ah", 0x22).unwrap();
        assert_eq!(regs.get16("ax").unwrap(), 0x2211);
    }

    #[test]
    fn xmm_is_the_low_128_bits_of_ymm() {
        let mut regs = RegisterFile::new();
        regs.set_ymm("ymm0", [1, 2, 3, 4]).unwrap();
        assert_eq!(regs.get_ymm("xmm0").unwrap(), [1, 2, 0, 0]);
    }

    #[test]
    fn rflags_bit_1_is_always_set() {
        let regs = RegisterFile::new();
        assert!(regs.rflags().contains(Flags::RESERVED_ONE));
    }

    #[test]
    fn unknown_register_is_recoverable_not_found() {
        let regs = RegisterFile::new();
        let err = regs.get64("zzz").unwrap_err();
        assert!(!err.is_fatal());
    }
}
