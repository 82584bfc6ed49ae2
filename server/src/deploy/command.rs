//! Typed shell command lines
//!
//! Commands are kept as argv tokens and only turned into shell text when the
//! runner composes the `cd <workspace> && ...` chain. Every token, the
//! workspace path included, is quoted with `shlex`, so no caller-supplied
//! string is ever interpreted by the shell.

use std::fmt;

use crate::errors::ServerError;

/// A single command as argv tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Quote the tokens into one shell word list
    pub fn to_shell(&self) -> Result<String, ServerError> {
        shlex::try_join(self.argv.iter().map(String::as_str))
            .map_err(|e| ServerError::InvalidParameter(format!("{}: {}", self.argv[0], e)))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Compose `cd <workspace> && <cmd1> && <cmd2> ...`.
///
/// The chain stops at the first failing command and the shell exits with
/// that command's code.
pub fn compose_script(workspace: &str, commands: &[CommandLine]) -> Result<String, ServerError> {
    if commands.is_empty() {
        return Err(ServerError::Internal("No commands to run".to_string()));
    }

    let mut parts = Vec::with_capacity(commands.len() + 1);
    parts.push(CommandLine::new("cd").arg(workspace).to_shell()?);
    for command in commands {
        parts.push(command.to_shell()?);
    }
    Ok(parts.join(" && "))
}
