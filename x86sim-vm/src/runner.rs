//! Top-level driver: assemble, then fetch/decode/lift/execute until `rip`
//! leaves the text segment or the program halts via `sys_exit`.

use tracing::warn;

use crate::arch::X86ArchitectureMap;
use crate::assembler::Assembler;
use crate::config::SimConfig;
use crate::decoder::decode_at;
use crate::describer::{describe, reverse_symbols};
use crate::error::{InterpreterError, RuntimeError};
use crate::interpreter::{execute, ExecOutcome};
use crate::lifter::lift;
use crate::log::{LogEvent, LogSink, NullLogSink};
use crate::memory::Memory;
use crate::registers::RegisterFile;
use crate::ui::{NullUi, Ui, UiCommand};

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i64,
    pub instructions_executed: u64,
}

/// Owns the machine state and drives the fetch/decode/lift/execute loop.
/// `X86ArchitectureMap` is stateless and created fresh per call; `Ui`/`LogSink`
/// are trait objects so a headless caller can pass [`NullUi`]/[`NullLogSink`].
pub struct Runner {
    pub memory: Memory,
    pub registers: RegisterFile,
    config: SimConfig,
}

impl Runner {
    pub fn new(config: SimConfig) -> Self {
        let memory = Memory::with_default_sizes();
        let mut registers = RegisterFile::new();
        registers.set64("rsp", memory.stack_bottom()).expect("rsp is always a valid register");
        Self { memory, registers, config }
    }

    pub fn with_default_config() -> Self {
        Self::new(SimConfig::default())
    }

    /// Zero memory and registers, then re-seed `rsp` at `stack_bottom` — the
    /// same invariant `new()` establishes, since `RegisterFile::reset()` alone
    /// has no way to know where the stack lives.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.registers.reset();
        self.registers.set64("rsp", self.memory.stack_bottom()).expect("rsp is always a valid register");
    }

    /// Assemble `source`, set `rip` to its entry point, and return the
    /// symbol table the describer uses for label back-substitution.
    pub fn load(&mut self, source: &str) -> Result<std::collections::HashMap<String, u64>, InterpreterError> {
        let mut assembler = Assembler::new();
        let entry = assembler
            .assemble(&mut self.memory, source)
            .map_err(|e| InterpreterError::AssemblyFailed(e.to_string()))?;
        self.registers.set_rip(entry);
        Ok(assembler.symbol_table().clone())
    }

    /// Run to completion using [`NullUi`]/[`NullLogSink`] (headless).
    pub fn run(&mut self) -> Result<RunResult, InterpreterError> {
        self.run_with(&mut NullUi, &mut NullLogSink, &std::collections::HashMap::new())
    }

    /// Run to completion, reporting through `ui`/`log` and resolving labels
    /// in descriptions through `symbols`.
    pub fn run_with(
        &mut self,
        ui: &mut dyn Ui,
        log: &mut dyn LogSink,
        symbols: &std::collections::HashMap<String, u64>,
    ) -> Result<RunResult, InterpreterError> {
        let labels = reverse_symbols(symbols);
        let (text_start, text_size) = self.memory.text_range();
        let text_end = text_start + text_size;
        let session = log.create_session("session");

        let mut executed = 0u64;
        loop {
            let rip = self.registers.rip();
            if rip < text_start || rip >= text_end {
                return Err(InterpreterError::LoadFailed(format!("rip 0x{rip:x} left the text segment")));
            }

            let Some(decoded) = decode_at(&self.memory, rip).map_err(InterpreterError::Halted)? else {
                warn!(address = rip, "decode failure during execution, advancing one byte");
                self.registers.set_rip(rip + 1);
                continue;
            };

            if self.config.ui_enabled {
                ui.draw_text(rip, &decoded.mnemonic);
                ui.draw_description(&describe(&decoded, &labels));
                ui.draw_registers(&self.registers);
                ui.draw_ymm(&self.registers);
                if ui.wait_for_input() == UiCommand::Quit {
                    return Err(InterpreterError::Cancelled);
                }
            }

            let outcome = match lift(&decoded).and_then(|ir| execute(&ir, &mut self.registers, &mut self.memory)) {
                Ok(outcome) => outcome,
                Err(RuntimeError::Recoverable(fault)) => {
                    log.log_event(session, LogEvent::FaultRecovered { address: rip, detail: fault.to_string() });
                    self.registers.set_rip(decoded.next_address());
                    executed += 1;
                    continue;
                }
                Err(fatal @ RuntimeError::Fatal(_)) => return Err(InterpreterError::Halted(fatal)),
            };

            log.log_event(session, LogEvent::InstructionExecuted { address: rip, mnemonic: decoded.mnemonic.clone() });
            executed += 1;

            match outcome {
                ExecOutcome::Continue => self.registers.set_rip(decoded.next_address()),
                ExecOutcome::Branched => {}
                ExecOutcome::Halted(exit_code) => {
                    log.log_event(session, LogEvent::Halted { exit_code });
                    return Ok(RunResult { exit_code, instructions_executed: executed });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct QuitAfterFirstStep {
        steps: u32,
    }

    impl Ui for QuitAfterFirstStep {
        fn draw_registers(&mut self, _regs: &RegisterFile) {}
        fn draw_ymm(&mut self, _regs: &RegisterFile) {}
        fn draw_text(&mut self, _address: u64, _raw_text: &str) {}
        fn draw_description(&mut self, _description: &str) {}
        fn wait_for_input(&mut self) -> UiCommand {
            self.steps += 1;
            UiCommand::Quit
        }
    }

    #[test]
    fn ui_quit_command_cancels_the_run() {
        let mut config = SimConfig::default();
        config.ui_enabled = true;
        let mut runner = Runner::new(config);
        runner.load("mov eax, 1\nmov eax, 2\nint 0x80").unwrap();
        let mut ui = QuitAfterFirstStep { steps: 0 };
        let err = runner.run_with(&mut ui, &mut NullLogSink, &std::collections::HashMap::new()).unwrap_err();
        assert!(matches!(err, InterpreterError::Cancelled));
        assert_eq!(ui.steps, 1);
    }

    #[test]
    fn counting_loop_halts_with_the_expected_exit_code() {
        let mut runner = Runner::with_default_config();
        let source = "\
            mov eax, 0
            mov ecx, 0
          loop:
            inc ecx
            add eax, ecx
            cmp ecx, 5
            jne loop
            mov ebx, eax
            mov eax, 1
            int 0x80
        ";
        runner.load(source).unwrap();
        let result = runner.run().unwrap();
        assert_eq!(result.exit_code, 15); // 1+2+3+4+5
    }

    #[test]
    fn div_computes_quotient_before_exiting() {
        let mut runner = Runner::with_default_config();
        let source = "\
            mov eax, 20
            mov ecx, 4
            mov edx, 0
            div ecx
            mov ebx, eax
            mov eax, 1
            int 0x80
        ";
        runner.load(source).unwrap();
        let result = runner.run().unwrap();
        assert_eq!(result.exit_code, 5);
    }

    #[test]
    fn reset_restores_the_stack_pointer_invariant() {
        let mut runner = Runner::with_default_config();
        runner.registers.set64("rax", 0x1122_3344_5566_7788).unwrap();
        runner.registers.set64("rsp", runner.memory.stack_bottom() - 64).unwrap();

        runner.reset();

        assert_eq!(runner.registers.get64("rax").unwrap(), 0);
        assert_eq!(runner.registers.get64("rsp").unwrap(), runner.memory.stack_bottom());
    }

    #[test]
    fn divide_by_zero_halts_the_run_with_an_error() {
        let mut runner = Runner::with_default_config();
        let source = "\
            mov eax, 1
            mov ecx, 0
            mov edx, 0
            div ecx
        ";
        runner.load(source).unwrap();
        assert!(runner.run().is_err());
    }
}
