//! Session logging sink, decoupled from `tracing`'s global subscriber so the
//! run loop can be driven headlessly (tests, scripted runs) without a
//! session log, and interactively with one.

use tracing::{debug, error, info, warn};

/// Opaque handle to a logging session, returned by [`LogSink::create_session`]
/// and threaded back into every later call against that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Severity of a [`LogSink::log`] call, matching `tracing`'s levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured event the run loop reports as it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    InstructionExecuted { address: u64, mnemonic: String },
    FaultRecovered { address: u64, detail: String },
    Halted { exit_code: i64 },
}

/// Where session events go. A simulator embedding this crate in a test
/// harness can swap in [`NullLogSink`]; an interactive run uses
/// [`TracingLogSink`].
pub trait LogSink {
    fn create_session(&mut self, program_name: &str) -> SessionId;
    fn log(&mut self, session: SessionId, message: &str, level: LogLevel, rip: u64, source_file: &'static str, source_line: u32);
    fn log_event(&mut self, session: SessionId, event: LogEvent);
    fn save_snapshot(&mut self, session: SessionId, payload: &[u8]);
}

/// Routes every event through `tracing`, matching this crate's ambient
/// logging style everywhere else.
#[derive(Debug, Default)]
pub struct TracingLogSink {
    next_session: u64,
}

impl LogSink for TracingLogSink {
    fn create_session(&mut self, program_name: &str) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        info!(program_name, session = id.0, "session started");
        id
    }

    fn log(&mut self, session: SessionId, message: &str, level: LogLevel, rip: u64, source_file: &'static str, source_line: u32) {
        let session = session.0;
        match level {
            LogLevel::Debug => debug!(session, rip, source_file, source_line, "{message}"),
            LogLevel::Info => info!(session, rip, source_file, source_line, "{message}"),
            LogLevel::Warn => warn!(session, rip, source_file, source_line, "{message}"),
            LogLevel::Error => error!(session, rip, source_file, source_line, "{message}"),
        }
    }

    fn log_event(&mut self, session: SessionId, event: LogEvent) {
        let session = session.0;
        match event {
            LogEvent::InstructionExecuted { address, mnemonic } => {
                info!(session, address, mnemonic, "instruction executed");
            }
            LogEvent::FaultRecovered { address, detail } => {
                warn!(session, address, detail, "recoverable fault");
            }
            LogEvent::Halted { exit_code } => {
                info!(session, exit_code, "session halted");
            }
        }
    }

    fn save_snapshot(&mut self, session: SessionId, payload: &[u8]) {
        info!(session = session.0, bytes = payload.len(), "snapshot");
    }
}

/// No-op sink for headless/test runs.
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn create_session(&mut self, _program_name: &str) -> SessionId {
        SessionId(0)
    }

    fn log(&mut self, _session: SessionId, _message: &str, _level: LogLevel, _rip: u64, _source_file: &'static str, _source_line: u32) {}

    fn log_event(&mut self, _session: SessionId, _event: LogEvent) {}

    fn save_snapshot(&mut self, _session: SessionId, _payload: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_every_event_without_panicking() {
        let mut sink = NullLogSink;
        let session = sink.create_session("demo");
        sink.log(session, "stepping", LogLevel::Debug, 0x10, file!(), line!());
        sink.log_event(session, LogEvent::Halted { exit_code: 0 });
        sink.save_snapshot(session, &[1, 2, 3]);
    }

    #[test]
    fn tracing_sink_hands_out_distinct_session_ids() {
        let mut sink = TracingLogSink::default();
        let a = sink.create_session("first");
        let b = sink.create_session("second");
        assert_ne!(a, b);
    }
}
