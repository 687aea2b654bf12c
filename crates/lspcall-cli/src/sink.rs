//! Echoes server stderr to the terminal.

use lspcall_mcp::DiagnosticSink;

/// Prints each server stderr line to our stderr with a `[server]` prefix,
/// or drops it when quiet.
pub struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl DiagnosticSink for ConsoleSink {
    fn line(&mut self, line: &str) {
        if !self.quiet {
            eprintln!("[server] {line}");
        }
    }

    fn undecodable(&mut self, raw: &[u8]) {
        if !self.quiet {
            eprintln!(
                "[server] <failed to decode line: {}>",
                String::from_utf8_lossy(raw).trim_end()
            );
        }
    }
}
