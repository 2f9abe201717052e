//! The read-eval-print loop: pulls lines from a [`LineSource`], feeds them
//! to a [`Session`] one at a time, and reports outcomes.

use std::collections::VecDeque;
use std::io::Write;

use crate::input::{self, LineSource, ReplCommand};
use crate::session::{Outcome, Session};
use crate::unit::IncrementStatus;

/// Prompt shown before each new increment.
pub const PROMPT: &str = "> ";
/// Prompt shown while a multi-line increment is still open.
pub const CONTINUATION_PROMPT: &str = "... ";

/// Message printed when neither form compiles.
pub const COMPILATION_FAILED: &str = "compilation failed";

/// How the loop treats its input.
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    /// Skip blank lines and `//` comment lines between increments instead
    /// of submitting them (script files).
    pub skip_blank: bool,
    /// Keep reading continuation lines while delimiters are open. Off when
    /// every line is already a complete increment (`-e` arguments).
    pub join_lines: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            skip_blank: false,
            join_lines: true,
        }
    }
}

/// Tally of a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub exec_failures: usize,
}

/// Run until the source is exhausted or `:quit` is entered.
///
/// Status lines go to `out`, diagnostics and failures to `err`. Output of
/// the executed code itself goes straight to the process's stdout.
///
/// # Errors
///
/// Returns an I/O error only when reading input or writing status fails;
/// rejected or failing increments never end the loop.
pub fn run(
    session: &mut Session,
    source: &mut dyn LineSource,
    out: &mut dyn Write,
    err: &mut dyn Write,
    options: LoopOptions,
) -> std::io::Result<RunSummary> {
    let mut summary = RunSummary::default();
    // Lines read ahead for an increment that never closed.
    let mut pending = VecDeque::new();

    while let Some(line) = next_line(source, &mut pending, PROMPT)? {
        if let Some(cmd) = input::parse_command(&line) {
            if cmd == ReplCommand::Quit {
                break;
            }
            run_command(session, &cmd, out, err)?;
            continue;
        }

        if options.skip_blank {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
        }

        let text = if options.join_lines {
            join_continuation(source, &mut pending, line)?
        } else {
            line
        };
        source.add_history(&text);

        // Anything the increment prints must land after our own output.
        out.flush()?;
        let eval = session.submit(&text);
        match eval.outcome {
            Outcome::Declared { .. } | Outcome::Executed { .. } => summary.accepted += 1,
            Outcome::ExecutionFailed { error, .. } => {
                summary.accepted += 1;
                summary.exec_failures += 1;
                writeln!(err, "execution failed: {error}")?;
            }
            Outcome::Rejected { diagnostics } => {
                summary.rejected += 1;
                for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
                    writeln!(err, "{}", diagnostic.display_text())?;
                }
                writeln!(out, "{COMPILATION_FAILED}")?;
            }
        }
    }

    out.flush()?;
    Ok(summary)
}

fn next_line(
    source: &mut dyn LineSource,
    pending: &mut VecDeque<String>,
    prompt: &str,
) -> std::io::Result<Option<String>> {
    match pending.pop_front() {
        Some(line) => Ok(Some(line)),
        None => source.read_line(prompt),
    }
}

/// Extend `first` with continuation lines until its delimiters close.
///
/// If input ends first, only `first` is returned and the lines read after
/// it go back to `pending`, so one stray `{` costs a single rejected
/// increment instead of swallowing the rest of the input.
fn join_continuation(
    source: &mut dyn LineSource,
    pending: &mut VecDeque<String>,
    first: String,
) -> std::io::Result<String> {
    if !input::has_unclosed_delimiters(&first) {
        return Ok(first);
    }
    let mut text = first.clone();
    let mut continuation = Vec::new();
    while let Some(cont) = next_line(source, pending, CONTINUATION_PROMPT)? {
        text.push('\n');
        text.push_str(&cont);
        continuation.push(cont);
        if !input::has_unclosed_delimiters(&text) {
            return Ok(text);
        }
    }
    pending.extend(continuation);
    Ok(first)
}

fn run_command(
    session: &Session,
    cmd: &ReplCommand,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> std::io::Result<()> {
    match cmd {
        ReplCommand::Help => out.write_all(help_text().as_bytes()),
        ReplCommand::History => {
            for increment in session.history() {
                let ran = if increment.status == IncrementStatus::CompiledAndExecuted {
                    "ran"
                } else {
                    "declared"
                };
                let first = increment.raw_input.lines().next().unwrap_or("");
                writeln!(out, "[{}] {ran:<8} {first}", increment.generation)?;
            }
            Ok(())
        }
        ReplCommand::Source => match session.last_unit() {
            Some(unit) => out.write_all(unit.source.as_bytes()),
            None => writeln!(err, "nothing accepted yet"),
        },
        ReplCommand::Dir => writeln!(out, "{}", session.work_dir().display()),
        ReplCommand::Unknown(name) => {
            writeln!(err, "Unknown command: :{name}. Type :help for help.")
        }
        // Handled by the loop.
        ReplCommand::Quit => Ok(()),
    }
}

fn help_text() -> &'static str {
    "\
Commands:
  :help, :h         Show this help message
  :quit, :q         Exit the REPL
  :history          List accepted generations
  :source           Show the source of the last accepted generation
  :dir              Show the work directory

Input:
  fn, static, ...   Items are declared and stay visible to later input
  <statements>      Anything else runs immediately
"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScriptSource;
    use crate::testing::harness;

    fn run_script(script: &str, options: LoopOptions) -> (RunSummary, String, String, usize) {
        let mut h = harness();
        let mut source = ScriptSource::new(script.as_bytes(), false);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let summary = run(&mut h.session, &mut source, &mut out, &mut err, options).unwrap();
        (
            summary,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
            h.session.generation(),
        )
    }

    #[test]
    fn every_line_is_an_increment() {
        let (summary, out, err, generation) = run_script(
            "fn one() -> i32 { 1 }\n\nprintln!(\"{}\", one());\n",
            LoopOptions::default(),
        );
        assert_eq!(summary.accepted, 3);
        assert_eq!(generation, 3);
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[test]
    fn script_mode_skips_blank_and_comment_lines() {
        let (summary, _, _, generation) = run_script(
            "// setup\nfn one() -> i32 { 1 }\n\n   \nlet x = one();\n",
            LoopOptions {
                skip_blank: true,
                ..LoopOptions::default()
            },
        );
        assert_eq!(summary.accepted, 2);
        assert_eq!(generation, 2);
    }

    #[test]
    fn rejection_is_reported_and_loop_continues() {
        let (summary, out, err, generation) = run_script(
            "let x = };\nlet y = 2;\n",
            LoopOptions::default(),
        );
        assert_eq!(
            summary,
            RunSummary {
                accepted: 1,
                rejected: 1,
                exec_failures: 0
            }
        );
        assert_eq!(out, "compilation failed\n");
        assert!(err.contains("syntax error"));
        assert_eq!(generation, 1);
    }

    #[test]
    fn multi_line_input_is_one_increment() {
        let (summary, _, _, generation) = run_script(
            "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\nlet s = add(1, 2);\n",
            LoopOptions::default(),
        );
        assert_eq!(summary.accepted, 2);
        assert_eq!(generation, 2);
    }

    #[test]
    fn unclosed_input_at_end_only_costs_one_increment() {
        let (summary, out, _, generation) = run_script(
            "let x = {\nlet y = 2;\nlet z = 3;\n",
            LoopOptions::default(),
        );
        assert_eq!(
            summary,
            RunSummary {
                accepted: 2,
                rejected: 1,
                exec_failures: 0
            }
        );
        assert_eq!(out, "compilation failed\n");
        assert_eq!(generation, 2);
    }

    #[test]
    fn delimiter_in_char_literal_does_not_join_lines() {
        let (summary, _, _, generation) = run_script(
            "let c = '(';\nprintln!(\"after\");\n",
            LoopOptions::default(),
        );
        assert_eq!(summary.accepted, 2);
        assert_eq!(generation, 2);
    }

    #[test]
    fn lines_are_not_joined_when_disabled() {
        let (summary, _, _, generation) = run_script(
            "fn f() {\n}\nlet a = 1;\n",
            LoopOptions {
                join_lines: false,
                ..LoopOptions::default()
            },
        );
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.accepted, 1);
        assert_eq!(generation, 1);
    }

    #[test]
    fn invalid_utf8_line_is_rejected_not_fatal() {
        let mut h = harness();
        let mut source = ScriptSource::new(&b"\xff\xfe\nlet a = 1;\n"[..], false);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let summary = run(
            &mut h.session,
            &mut source,
            &mut out,
            &mut err,
            LoopOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(h.session.generation(), 1);
    }

    #[test]
    fn execution_failure_is_reported() {
        let (summary, _, err, generation) =
            run_script("panic!(\"boom\");\n", LoopOptions::default());
        assert_eq!(summary.exec_failures, 1);
        assert!(err.starts_with("execution failed: interp_0 panicked"));
        assert_eq!(generation, 1);
    }

    #[test]
    fn quit_stops_reading() {
        let (summary, _, _, generation) =
            run_script("let a = 1;\n:quit\nlet b = 2;\n", LoopOptions::default());
        assert_eq!(summary.accepted, 1);
        assert_eq!(generation, 1);
    }

    #[test]
    fn commands_do_not_become_increments() {
        let (_, out, err, generation) = run_script(
            "fn f() {}\n:history\n:help\n:nope\n",
            LoopOptions::default(),
        );
        assert_eq!(generation, 1);
        assert!(out.contains("[0] declared fn f() {}"));
        assert!(out.contains("Commands:"));
        assert!(err.contains("Unknown command: :nope"));
    }

    #[test]
    fn source_command_prints_last_unit() {
        let (_, out, _, _) = run_script("let a = 1;\n:source\n", LoopOptions::default());
        assert!(out.contains("fn interp_exec() -> i32"));
        assert!(out.contains("let a = 1;"));
    }
}
