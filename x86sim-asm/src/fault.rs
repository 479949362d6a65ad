use core::fmt;

use thiserror::Error;

/// Closed set of failure reasons the simulator can surface.
///
/// Mirrors the shape of a reason enum attached to every error path rather
/// than a free-form string: callers can match on the variant instead of
/// parsing a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SimFault {
    /// A byte sequence did not match any known opcode pattern.
    #[error("decode failure at byte pattern starting 0x{0:02x}")]
    DecodeFailure(u8),
    /// A decoded mnemonic has no lifting rule.
    #[error("no lifting rule for mnemonic '{mnemonic}'")]
    LiftFailure {
        /// The mnemonic that failed to lift.
        mnemonic: String,
    },
    /// A named register does not exist in the register file.
    #[error("unknown register '{name}'")]
    RegisterNotFound {
        /// The register name that was looked up.
        name: String,
    },
    /// A label has no entry in the symbol table.
    #[error("unknown symbol '{label}'")]
    SymbolNotFound {
        /// The label that was looked up.
        label: String,
    },
    /// An access fell outside the owning segment or total memory.
    #[error("address 0x{address:x} is out of range for segment '{segment}'")]
    MemoryOutOfRange {
        /// The address that was accessed.
        address: u64,
        /// The segment (or "total") the access was checked against.
        segment: &'static str,
    },
    /// Division by zero.
    #[error("division by zero")]
    DivideByZero,
    /// Quotient does not fit in the destination width.
    #[error("quotient overflow")]
    DivideOverflow,
    /// A push moved the stack pointer below the stack segment.
    #[error("stack overflow")]
    StackOverflow,
    /// A pop moved the stack pointer above the stack segment's starting bound.
    #[error("stack underflow")]
    StackUnderflow,
    /// A decoded or lifted opcode has no interpreter handler.
    #[error("unsupported opcode '{opcode}'")]
    UnsupportedOpcode {
        /// Debug-formatted opcode that has no handler.
        opcode: String,
    },
}

impl SimFault {
    /// Whether this fault is recoverable (log-and-continue) per the error
    /// handling taxonomy, as opposed to fatal (halt the run loop).
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SimFault::LiftFailure { .. }
                | SimFault::RegisterNotFound { .. }
                | SimFault::SymbolNotFound { .. }
                | SimFault::UnsupportedOpcode { .. }
        )
    }
}

/// A thin `Display`-only wrapper used when an opcode needs to be named in a
/// fault but only its debug form is available.
pub fn opcode_name(opcode: impl fmt::Debug) -> String {
    format!("{opcode:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_faults_are_distinguished_from_fatal() {
        assert!(SimFault::RegisterNotFound { name: "zz".into() }.is_recoverable());
        assert!(!SimFault::DivideByZero.is_recoverable());
        assert!(!SimFault::StackOverflow.is_recoverable());
    }
}
