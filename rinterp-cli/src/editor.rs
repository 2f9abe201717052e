//! Interactive line source backed by `rustyline`.

use rinterp_eval::input::LineSource;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// A terminal line editor with in-memory history.
pub struct Editor {
    inner: DefaultEditor,
}

impl Editor {
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be set up.
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self {
            inner: DefaultEditor::new()?,
        })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        match self.inner.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!();
                Ok(None)
            }
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(std::io::Error::other(e.to_string())),
        }
    }

    fn add_history(&mut self, entry: &str) {
        let _ = self.inner.add_history_entry(entry);
    }
}
