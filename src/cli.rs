//! CLI utilities for exaws.
//!
//! The utilities present in this module can be used to create an interactive SQL shell.
use std::io::{self, BufRead, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("prompt IO error: {0}")]
    Io(#[from] io::Error),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`, also sent on end of input
    Exit,
    /// `.commit`
    Commit,
    /// `.rollback`
    Rollback,
    /// `.quote <identifier>`: print the identifier as it should appear in SQL
    Quote(String),
    /// SQL passed to the server unchanged
    Sql(String),
    /// Blank line
    Empty,
}

impl TryFrom<&str> for Command {
    type Error = PromptError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "" => Ok(Command::Empty),
            s if s.starts_with('.') => {
                let (name, arg) = s
                    .split_once(char::is_whitespace)
                    .map_or((s, ""), |(name, arg)| (name, arg.trim()));

                match name {
                    ".exit" => Ok(Command::Exit),
                    ".commit" => Ok(Command::Commit),
                    ".rollback" => Ok(Command::Rollback),
                    ".quote" if arg.is_empty() => Err(PromptError::InvalidCommandArguments {
                        command: String::from(".quote"),
                        reason: String::from("requires an identifier. Example: .quote select"),
                    }),
                    ".quote" => Ok(Command::Quote(arg.to_string())),
                    _ => Err(PromptError::UnrecognizedCommand(s.to_string())),
                }
            }
            s => Ok(Command::Sql(s.to_string())),
        }
    }
}

impl PromptError {
    /// Input can no longer be read, so prompting again is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PromptError::Io(_))
    }
}

/// Prompt user for the next command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "exa> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }
    Command::try_from(s.as_str())
}
