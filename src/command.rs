//! A single shell command line with named-placeholder substitution.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One command plus its whitespace-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandLine {
    command: String,
    arguments: Vec<String>,
}

impl CommandLine {
    /// Splits `line` on whitespace. The first token is the command, the rest
    /// are arguments. Returns `None` for empty or blank input.
    pub fn parse(line: &str) -> Option<CommandLine> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next()?.to_string();
        Some(CommandLine {
            command,
            arguments: tokens.map(str::to_string).collect(),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// True if the command token starts with `marker`.
    pub fn is_comment(&self, marker: &str) -> bool {
        self.command.starts_with(marker)
    }

    /// Replaces every literal `{marker}{{name}}` in the arguments with `value`.
    ///
    /// The command token itself is never rewritten.
    pub fn substitute(&mut self, marker: &str, name: &str, value: &str) {
        let placeholder = format!("{marker}{{{name}}}");
        for argument in self.arguments.iter_mut() {
            if argument.contains(&placeholder) {
                *argument = argument.replace(&placeholder, value);
            }
        }
    }

    /// Command followed by its arguments, single-space separated.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for argument in &self.arguments {
            write!(f, " {argument}")?;
        }
        Ok(())
    }
}
