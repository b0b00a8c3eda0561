//! Entry point for the **openpipe** daemon.
//!
//! A development harness around [`CliServer`]: wires the server to stand-in
//! collaborators (a logging window opener, a process status reporter, and a
//! registry with a couple of built-in commands), prints the generated socket
//! path to stdout so companion processes can find it, and serves until
//! killed.  A real editor embeds [`CliServer`] directly and wires in its own
//! collaborators instead.

use log::{error, info};
use openpipe::config::Config;
use openpipe::protocol::{OpenOptions, OpenTarget};
use openpipe::registry::{CommandError, CommandRegistry};
use openpipe::server::{CliServer, ServerConfig};
use openpipe::traits::{StatusReporter, WindowOpener};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Resolve the config directory (`$XDG_CONFIG_HOME/openpipe`).
fn config_dir() -> std::path::PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    std::path::PathBuf::from(base).join("openpipe")
}

/// Try to load the config from `$XDG_CONFIG_HOME/openpipe/config.json`,
/// falling back to compiled-in defaults.
fn load_config() -> Config {
    let path = config_dir().join("config.json");
    match Config::load(&path) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            info!("no config file ({}), using defaults", e);
            Config::default()
        }
    }
}

//  Stand-in collaborators

/// A [`WindowOpener`] that only logs what it would open.
struct LoggingOpener;

#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
struct NeverError;

impl WindowOpener for LoggingOpener {
    type Error = NeverError;

    fn open(&self, targets: Vec<OpenTarget>, options: OpenOptions) -> Result<(), NeverError> {
        for target in &targets {
            match target {
                OpenTarget::Folder(uri) => info!("open folder {}", uri),
                OpenTarget::Workspace(uri) => info!("open workspace {}", uri),
                OpenTarget::File(uri) => info!("open file {}", uri),
            }
        }
        info!(
            "window options: new_window={} diff={} add={} goto_line={} reuse={}",
            options.force_new_window,
            options.diff_mode,
            options.add_mode,
            options.goto_line_mode,
            options.force_reuse_window
        );
        Ok(())
    }
}

/// Reports pid, version, and uptime of this daemon.
struct ProcessStatus {
    started: Instant,
}

impl StatusReporter for ProcessStatus {
    type Error = NeverError;

    fn system_status(&self) -> Result<String, NeverError> {
        Ok(format!(
            "openpipe {} (pid {}, up {}s)",
            env!("CARGO_PKG_VERSION"),
            std::process::id(),
            self.started.elapsed().as_secs()
        ))
    }
}

fn builtin_commands() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register("echo", |args| Ok(serde_json::Value::Array(args)));
    registry.register("version", |_| Ok(json!(env!("CARGO_PKG_VERSION"))));
    registry.register("pid", |args| {
        if args.is_empty() {
            Ok(json!(std::process::id()))
        } else {
            Err(CommandError::Failed("pid takes no arguments".into()))
        }
    });
    registry
}

//  Main

fn main() {
    env_logger::init();

    let config = load_config();

    let mut server = CliServer::new(
        Arc::new(LoggingOpener),
        Arc::new(builtin_commands()),
        Arc::new(ProcessStatus {
            started: Instant::now(),
        }),
        ServerConfig::from(&config),
    );

    match server.start() {
        Ok(path) => {
            // Companion processes read the path from our stdout.
            println!("{}", path.display());
        }
        Err(e) => {
            error!("could not start command pipe server: {}", e);
            std::process::exit(1);
        }
    }

    server.join();
}
