use std::io::{self, IsTerminal};

/// Reports whether the process streams are attached to a terminal.
///
/// Colour and log formatting depend on it; tests inject a fixed answer.
pub trait TerminalClient: Send + Sync {
    /// Returns whether human output goes to a terminal.
    fn stdout_is_terminal(&self) -> bool;

    /// Returns whether log output goes to a terminal.
    fn stderr_is_terminal(&self) -> bool;
}

/// Asks the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
