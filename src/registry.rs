//! In-process command registry.
//!
//! A keyed map from command name to handler closure, implementing
//! [`CommandExecutor`].  Registration takes `&mut self` and happens while the
//! composing application still owns the registry exclusively; once it is
//! shared with the server (behind an [`Arc`](std::sync::Arc)) only `&self`
//! execution remains, so no locking is needed.

use crate::traits::CommandExecutor;
use serde_json::Value;
use std::collections::HashMap;

type CommandFn = Box<dyn Fn(Vec<Value>) -> Result<Value, CommandError> + Send + Sync>;

/// Errors produced by command execution.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
}

/// A registry of named commands.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandFn>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler with
    /// the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, CommandError> + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Box::new(handler));
    }

    /// Whether a command with `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }
}

impl CommandExecutor for CommandRegistry {
    type Error = CommandError;

    fn execute(&self, command: &str, args: Vec<Value>) -> Result<Value, CommandError> {
        let handler = self
            .commands
            .get(command)
            .ok_or_else(|| CommandError::NotFound(command.to_string()))?;
        handler(args)
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registered_command_executes() {
        let mut registry = CommandRegistry::new();
        registry.register("echo", |args| Ok(Value::Array(args)));
        let result = registry.execute("echo", vec![json!(1), json!("two")]).unwrap();
        assert_eq!(result, json!([1, "two"]));
    }

    #[test]
    fn unknown_command_is_not_found() {
        let registry = CommandRegistry::new();
        let err = registry.execute("nope", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "command not found: nope");
    }

    #[test]
    fn failing_command_reports_its_message() {
        let mut registry = CommandRegistry::new();
        registry.register("boom", |_| Err(CommandError::Failed("kaboom".into())));
        let err = registry.execute("boom", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
    }

    #[test]
    fn re_registration_replaces_the_handler() {
        let mut registry = CommandRegistry::new();
        registry.register("v", |_| Ok(json!(1)));
        registry.register("v", |_| Ok(json!(2)));
        assert_eq!(registry.execute("v", vec![]).unwrap(), json!(2));
        assert!(registry.contains("v"));
    }
}
