//! Decoder output types: the structured form produced by walking the text
//! segment, before anything is lifted to IR.

/// One operand of a [`DecodedInstruction`].
///
/// `text` is always the printable form used by the instruction describer and
/// by assembler/decoder round-trip tests; `value` carries the numeric
/// payload where one exists.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedOperand {
    /// A general-purpose register operand, named by its concrete string
    /// (e.g. `"eax"`).
    Register(String),
    /// A 128/256-bit vector register operand, named by its concrete string
    /// (e.g. `"ymm1"`).
    YmmRegister(String),
    /// An immediate value together with its printable form.
    Immediate { value: u64, text: String },
    /// A memory operand: the effective address already resolved at decode
    /// time, together with its printable form (e.g. `"[rip+0x10]"`).
    Memory { effective_address: u64, text: String },
    /// A symbolic label reference (used by the assembler's own bookkeeping;
    /// the decoder never emits this variant since by the time bytes exist
    /// labels have already been resolved to addresses).
    Label(String),
}

impl DecodedOperand {
    pub fn text(&self) -> &str {
        match self {
            DecodedOperand::Register(s) | DecodedOperand::YmmRegister(s) | DecodedOperand::Label(s) => s,
            DecodedOperand::Immediate { text, .. } => text,
            DecodedOperand::Memory { text, .. } => text,
        }
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            DecodedOperand::Immediate { value, .. } => Some(*value),
            DecodedOperand::Memory { effective_address, .. } => Some(*effective_address),
            _ => None,
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self, DecodedOperand::Register(_) | DecodedOperand::YmmRegister(_))
    }
}

/// A single decoded instruction: mnemonic plus operands plus byte length.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstruction {
    pub address: u64,
    /// Always lowercase.
    pub mnemonic: String,
    pub operands: Vec<DecodedOperand>,
    pub length_in_bytes: u32,
}

impl DecodedInstruction {
    pub fn new(address: u64, mnemonic: impl Into<String>, operands: Vec<DecodedOperand>, length_in_bytes: u32) -> Self {
        Self {
            address,
            mnemonic: mnemonic.into(),
            operands,
            length_in_bytes,
        }
    }

    pub fn next_address(&self) -> u64 {
        self.address + self.length_in_bytes as u64
    }
}
