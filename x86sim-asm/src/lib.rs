//! Architecture-neutral types shared by the x86sim decoder, lifter and
//! interpreter: the IR, the decoded-instruction shapes the decoder produces,
//! the architecture-map contract, and the closed set of failure reasons.

pub mod arch;
pub mod decoded;
pub mod fault;
pub mod ir;

pub mod prelude {
    pub use crate::arch::ArchitectureMap;
    pub use crate::decoded::{DecodedInstruction, DecodedOperand};
    pub use crate::fault::SimFault;
    pub use crate::ir::{
        IRConditionCode, IRInstruction, IRMemoryOperand, IROpcode, IROperand, IRRegister, IRRegisterKind,
    };
}
