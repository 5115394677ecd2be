//! Script loading.
//!
//! A script is plain text with one command per line. Blank lines and lines
//! whose first token starts with the comment marker are skipped; placeholders
//! are substituted before each line is serialized back to a command string.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, warn};

use crate::command::CommandLine;
use crate::config::ClientConfig;
use crate::error::ShellError;

/// Comment and placeholder markers used while reading scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSyntax {
    pub comment_marker: String,
    pub placeholder_marker: String,
}

impl Default for ScriptSyntax {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ScriptSyntax {
    fn from(config: &ClientConfig) -> Self {
        Self {
            comment_marker: config.comment_marker.clone(),
            placeholder_marker: config.placeholder_marker.clone(),
        }
    }
}

impl ScriptSyntax {
    /// Turns one script line into a command string, or `None` if it is blank
    /// or a comment. Substitutions are applied in key order.
    pub fn render_line(
        &self,
        line: &str,
        substitutions: &HashMap<String, String>,
    ) -> Option<String> {
        let mut command_line = CommandLine::parse(line)?;
        if command_line.is_comment(&self.comment_marker) {
            return None;
        }
        let mut names: Vec<&String> = substitutions.keys().collect();
        names.sort();
        for name in names {
            if let Some(value) = substitutions.get(name) {
                command_line.substitute(&self.placeholder_marker, name, value);
            }
        }
        Some(command_line.serialize())
    }

    /// Renders every line of an in-memory script, in order.
    pub fn render<'a, I>(&self, lines: I, substitutions: &HashMap<String, String>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.render_line(line, substitutions))
            .collect()
    }
}

/// Reads `path` into an ordered list of substituted command strings.
///
/// A file that cannot be opened yields [`ShellError::ScriptReadError`]. A read
/// failure part way through yields [`ShellError::ScriptTruncatedError`] carrying
/// the commands parsed so far; they are never returned as a complete script.
pub fn load_script(
    path: impl AsRef<Path>,
    substitutions: &HashMap<String, String>,
    syntax: &ScriptSyntax,
) -> Result<Vec<String>, ShellError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(ShellError::EmptyScriptPathError);
    }

    let file = File::open(path).map_err(|source| ShellError::ScriptReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let mut commands = Vec::new();
    for line in BufReader::new(file).lines() {
        match line {
            Ok(line) => {
                if let Some(command) = syntax.render_line(&line, substitutions) {
                    commands.push(command);
                }
            }
            Err(source) => {
                warn!(
                    "Script {:?} truncated after {} commands: {}",
                    path,
                    commands.len(),
                    source
                );
                return Err(ShellError::ScriptTruncatedError {
                    path: path.to_path_buf(),
                    parsed: commands,
                    source,
                });
            }
        }
    }

    debug!("Loaded {} commands from {:?}", commands.len(), path);
    Ok(commands)
}
