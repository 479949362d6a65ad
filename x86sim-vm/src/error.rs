//! Runtime error types.
//!
//! Mirrors the shape of the teacher's `RuntimeError`/`InterpreterError` split:
//! [`RuntimeError`] is what instruction handlers return, distinguishing a
//! recoverable fault (logged, execution continues) from a fatal one (the run
//! loop halts); [`InterpreterError`] is what the top-level driver surfaces.

use thiserror::Error;
use x86sim_asm::fault::SimFault;

/// The outcome of attempting to execute one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Logged and the run loop continues to the next instruction.
    #[error("recoverable fault: {0}")]
    Recoverable(SimFault),
    /// Logged and the run loop halts.
    #[error("fatal fault: {0}")]
    Fatal(SimFault),
}

impl RuntimeError {
    /// Classify a [`SimFault`] into [`RuntimeError::Recoverable`] or
    /// [`RuntimeError::Fatal`] per the error handling taxonomy.
    pub fn from_fault(fault: SimFault) -> Self {
        if fault.is_recoverable() {
            RuntimeError::Recoverable(fault)
        } else {
            RuntimeError::Fatal(fault)
        }
    }

    pub fn fault(&self) -> &SimFault {
        match self {
            RuntimeError::Recoverable(f) | RuntimeError::Fatal(f) => f,
        }
    }

    pub const fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::Fatal(_))
    }
}

/// Top-level error returned by the run loop's fallible entry points.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// Execution halted due to a fatal runtime fault.
    #[error("execution halted: {0}")]
    Halted(#[from] RuntimeError),
    /// The program to load was empty or exceeded the text segment.
    #[error("program load failed: {0}")]
    LoadFailed(String),
    /// The assembler failed on malformed input.
    #[error("assembly failed: {0}")]
    AssemblyFailed(String),
    /// The interactive UI asked to quit before the program halted on its own.
    #[error("run cancelled by the operator")]
    Cancelled,
}
