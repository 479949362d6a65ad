//! `int 0x80` syscalls and the single-byte `in`/`out` port I/O used by the
//! assembled programs this simulator runs.

use std::io::{Read, Write};

use tracing::info;
use x86sim_asm::fault::SimFault;

use super::ExecOutcome;
use crate::consts::SYS_EXIT;
use crate::error::RuntimeError;
use crate::registers::RegisterFile;

/// `int 0x80`: only `sys_exit` (`eax == 1`) is implemented, matching this
/// simulator's required syscall surface; anything else is a recoverable
/// unsupported-opcode fault so the run loop can log and continue.
pub fn interrupt(regs: &RegisterFile) -> Result<ExecOutcome, RuntimeError> {
    let number = regs.get32("eax")?;
    if number as u64 == SYS_EXIT {
        let code = regs.get32("ebx")? as i64;
        info!(exit_code = code, "program exited via sys_exit");
        return Ok(ExecOutcome::Halted(code));
    }
    Err(RuntimeError::from_fault(SimFault::UnsupportedOpcode { opcode: format!("syscall {number}") }))
}

/// `in al, imm8`: read one byte from stdin into `al`.
pub fn port_in(regs: &mut RegisterFile) -> Result<(), RuntimeError> {
    let mut byte = [0u8; 1];
    let read = std::io::stdin().read(&mut byte).unwrap_or(0);
    regs.set8("al", if read == 1 { byte[0] } else { 0 })
}

/// `out imm8, al`: write `al` to stdout.
pub fn port_out(regs: &RegisterFile) -> Result<(), RuntimeError> {
    let value = regs.get8("al")?;
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(&[value]);
    let _ = stdout.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_exit_returns_halted_with_exit_code() {
        let mut regs = RegisterFile::new();
        regs.set32("eax", 1).unwrap();
        regs.set32("ebx", 42).unwrap();
        let outcome = interrupt(&regs).unwrap();
        assert_eq!(outcome, ExecOutcome::Halted(42));
    }

    #[test]
    fn unknown_syscall_number_is_recoverable() {
        let mut regs = RegisterFile::new();
        regs.set32("eax", 999).unwrap();
        let err = interrupt(&regs).unwrap_err();
        assert!(!err.is_fatal());
    }
}
