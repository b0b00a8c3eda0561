//! Core traits that decouple the pipe server from any specific host
//! application.
//!
//! The server only knows how to accept connections, parse requests, and
//! dispatch; everything a request ultimately *does* happens behind one of
//! these collaborator traits.  A real editor wires in its window manager and
//! command registry; tests wire in recording mocks.

use crate::protocol::{OpenOptions, OpenTarget};

/// Host collaborator that opens resources in application windows.
///
/// One call receives the complete classified batch from a single `"open"`
/// request together with its aggregated flags.  Implementations decide what
/// "opening" means — focusing an existing window, creating a new one, or just
/// logging in a development stand-in.
pub trait WindowOpener {
    /// The error type produced by this opener.
    type Error: std::error::Error + Send + 'static;

    /// Open `targets` with the given window `options`.
    fn open(&self, targets: Vec<OpenTarget>, options: OpenOptions) -> Result<(), Self::Error>;
}

/// Host collaborator that executes a named command with arbitrary JSON
/// arguments.
///
/// # Contract
///
/// * Implementations must be safe to call from multiple connection threads
///   at once; the server performs no mutual exclusion between in-flight
///   commands.
/// * A failed execution is reported to the remote caller as the `Display`
///   form of the returned error.
pub trait CommandExecutor {
    /// The error type produced by this executor.
    type Error: std::error::Error + Send + 'static;

    /// Execute `command` with `args` and return its JSON result.
    fn execute(
        &self,
        command: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, Self::Error>;
}

/// Host collaborator that reports the liveness/status of the running
/// application instance.
pub trait StatusReporter {
    /// The error type produced by this reporter.
    type Error: std::error::Error + Send + 'static;

    /// Produce a human-readable status payload.
    fn system_status(&self) -> Result<String, Self::Error>;
}
