//! **openpipe** — a local command pipe for a running desktop application.
//!
//! When an editor-style application is already running, a companion shell
//! launcher should be able to ask *that* instance to open paths, report its
//! status, or invoke a named command instead of spawning a second instance.
//! openpipe provides the server side of that channel: a Unix socket with a
//! freshly generated, non-guessable name, speaking whole-body JSON requests
//! with HTTP/1.1 response semantics.
//!
//! # Architecture
//!
//! The crate is organised around three collaborator traits in [`traits`]:
//!
//! * [`traits::WindowOpener`] — opens classified resources in application
//!   windows.
//! * [`traits::CommandExecutor`] — executes a named command with JSON
//!   arguments ([`registry::CommandRegistry`] is an in-process
//!   implementation).
//! * [`traits::StatusReporter`] — reports instance liveness.
//!
//! [`server::CliServer`] accepts connections and dispatches parsed
//! [`protocol::Request`]s to whichever implementations the composing
//! application wired in.

pub mod config;
pub mod endpoint;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod traits;
