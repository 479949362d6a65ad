//! Architecture-neutral intermediate representation.
//!
//! Decoded x86 instructions are lifted into this IR before execution; the
//! interpreter only ever matches on [`IROpcode`] and [`IROperand`], never on
//! x86 mnemonics or encodings.

/// The kind of an abstract register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IRRegisterKind {
    /// General purpose register.
    Gpr,
    /// SIMD/vector register (XMM/YMM).
    Vector,
    /// Flags register.
    Flags,
    /// Instruction pointer.
    Ip,
    /// Segment register.
    Segment,
}

/// An abstract register, independent of any concrete ISA name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IRRegister {
    pub kind: IRRegisterKind,
    pub index: u32,
    pub size_bits: u32,
}

impl IRRegister {
    pub const fn new(kind: IRRegisterKind, index: u32, size_bits: u32) -> Self {
        Self {
            kind,
            index,
            size_bits,
        }
    }
}

/// A flexible memory addressing mode: `[base + index*scale + displacement]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IRMemoryOperand {
    pub base: Option<IRRegister>,
    pub index: Option<IRRegister>,
    pub scale: u32,
    pub displacement: i64,
    pub size_bits: u32,
}

impl IRMemoryOperand {
    pub const fn new(size_bits: u32) -> Self {
        Self {
            base: None,
            index: None,
            scale: 1,
            displacement: 0,
            size_bits,
        }
    }

    pub const fn with_base(mut self, base: IRRegister) -> Self {
        self.base = Some(base);
        self
    }

    pub const fn with_index(mut self, index: IRRegister, scale: u32) -> Self {
        self.index = Some(index);
        self.scale = scale;
        self
    }

    pub const fn with_displacement(mut self, displacement: i64) -> Self {
        self.displacement = displacement;
        self
    }
}

/// Abstract condition codes for [`IROpcode::Branch`], free of any particular
/// ISA's mnemonic for the same test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IRConditionCode {
    Equal,
    NotEqual,
    Below,
    AboveOrEqual,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Greater,
    Overflow,
    NotOverflow,
    Sign,
    NotSign,
}

/// Any value an [`IRInstruction`] can operate on.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IROperand {
    Register(IRRegister),
    Memory(IRMemoryOperand),
    Immediate(u64),
    Label(String),
    Condition(IRConditionCode),
}

impl IROperand {
    pub fn as_register(&self) -> Option<IRRegister> {
        match self {
            IROperand::Register(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&IRMemoryOperand> {
        match self {
            IROperand::Memory(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_immediate(&self) -> Option<u64> {
        match self {
            IROperand::Immediate(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_condition(&self) -> Option<IRConditionCode> {
        match self {
            IROperand::Condition(c) => Some(*c),
            _ => None,
        }
    }
}

/// The closed set of architecture-neutral operations the interpreter
/// dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IROpcode {
    // Data movement
    Move,
    Load,
    Store,

    // Scalar arithmetic
    Add,
    Sub,
    Inc,
    Dec,
    Mul,
    IMul,
    Div,

    // Scalar logical
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,
    Cmp,

    // Control flow
    Jump,
    Branch,
    Call,
    Ret,
    Nop,

    // Stack
    Push,
    Pop,

    // Packed (AVX) arithmetic, 8 lanes of packed single-precision floats
    PackedAddPS,
    PackedSubPS,
    PackedMulPS,
    PackedDivPS,
    PackedMaxPS,
    PackedMinPS,
    PackedSqrtPS,
    PackedReciprocalPS,

    // Packed logical / integer
    PackedAnd,
    PackedAndNot,
    PackedOr,
    PackedXor,
    PackedMulLowI16,
    VectorZero,

    // System
    Syscall,
    In,
    Out,
}

/// A single architecture-neutral instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IRInstruction {
    pub opcode: IROpcode,
    pub operands: Vec<IROperand>,
    pub original_address: u64,
    pub original_size: u32,
}

impl IRInstruction {
    pub fn new(opcode: IROpcode, operands: Vec<IROperand>) -> Self {
        Self {
            opcode,
            operands,
            original_address: 0,
            original_size: 0,
        }
    }

    pub fn with_origin(mut self, address: u64, size: u32) -> Self {
        self.original_address = address;
        self.original_size = size;
        self
    }

    /// Address the instruction after this one starts at, assuming no branch.
    pub fn next_address(&self) -> u64 {
        self.original_address + self.original_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_opcode_round_trips_through_debug() {
        for op in IROpcode::iter() {
            let s = format!("{op:?}");
            assert!(!s.is_empty());
        }
    }

    #[test]
    fn memory_operand_builder_composes() {
        let base = IRRegister::new(IRRegisterKind::Gpr, 5, 64);
        let idx = IRRegister::new(IRRegisterKind::Gpr, 1, 64);
        let mem = IRMemoryOperand::new(32)
            .with_base(base)
            .with_index(idx, 4)
            .with_displacement(-8);
        assert_eq!(mem.base, Some(base));
        assert_eq!(mem.index, Some(idx));
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.displacement, -8);
    }
}
