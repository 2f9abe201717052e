//! Line sources and input classification for the REPL.
//!
//! Lines starting with a single `:` are meta-commands; everything else is
//! code for the session. (`::std::...` paths start with two colons and are
//! code.)

use std::io::{BufRead, Write};

use crate::lex;

/// Supplies one line of input per call.
pub trait LineSource {
    /// Read the next line, showing `prompt` if the source is interactive.
    /// `Ok(None)` means end of input.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the underlying reader fails.
    fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>>;

    /// Remember a submitted input (for editors with history).
    fn add_history(&mut self, _entry: &str) {}
}

/// A [`LineSource`] over any buffered reader: piped stdin or a script file.
#[derive(Debug)]
pub struct ScriptSource<R> {
    reader: R,
    /// Echo the prompt to stdout before each read.
    show_prompt: bool,
}

impl<R: BufRead> ScriptSource<R> {
    #[must_use]
    pub fn new(reader: R, show_prompt: bool) -> Self {
        Self {
            reader,
            show_prompt,
        }
    }
}

impl<R: BufRead> LineSource for ScriptSource<R> {
    fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        if self.show_prompt {
            let mut stdout = std::io::stdout();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
        }
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        // Invalid UTF-8 is replaced, not fatal; rustc then rejects the line.
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// A REPL meta-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// `:help`: show available commands.
    Help,
    /// `:quit`: leave the REPL.
    Quit,
    /// `:history`: list accepted generations.
    History,
    /// `:source`: print the last accepted unit.
    Source,
    /// `:dir`: print the work directory.
    Dir,
    Unknown(String),
}

/// Parse `line` as a meta-command, or `None` if it is code.
#[must_use]
pub fn parse_command(line: &str) -> Option<ReplCommand> {
    let trimmed = line.trim();
    let cmd = trimmed.strip_prefix(':')?;
    if cmd.starts_with(':') {
        return None;
    }
    let name = cmd.split_whitespace().next().unwrap_or("");
    Some(match name {
        "help" | "h" | "?" => ReplCommand::Help,
        "quit" | "q" | "exit" => ReplCommand::Quit,
        "history" => ReplCommand::History,
        "source" | "src" => ReplCommand::Source,
        "dir" => ReplCommand::Dir,
        other => ReplCommand::Unknown(other.to_string()),
    })
}

/// Whether `input` opens more `{ ( [` than it closes, or leaves a string
/// literal or block comment open. Used to keep reading continuation lines.
///
/// Delimiters inside string, raw string and char literals or comments do
/// not count.
#[must_use]
pub fn has_unclosed_delimiters(input: &str) -> bool {
    let lexed = lex::tokenize(input);
    lexed.unterminated || lexed.open_delimiters() > 0
}
