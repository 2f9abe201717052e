//! Session state machine. Owns the generation chain and drives each
//! increment through synthesis, compilation and execution.
//!
//! ```text
//! AwaitingInput
//!   -> Attempting(first form)  -- ok -->  Advanced
//!   -> Attempting(second form) -- ok -->  Advanced
//!   -> Rejected
//! ```
//!
//! Whichever form compiles, `Advanced` bumps the generation by exactly one.
//! A statement unit is executed before the session advances; if execution
//! fails the generation still advances, because the unit compiled and later
//! generations may already depend on what it declared.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{ExecError, SessionError};
use crate::loader::{DylibLoader, Executor};
use crate::synth::{Synthesizer, DEFAULT_PRELUDE};
use crate::toolchain::{self, Diagnostic, Toolchain, ToolchainDriver};
use crate::unit::{CompilationUnit, Form, FormOrder, Increment, IncrementStatus};

/// Knobs for a new session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub form_order: FormOrder,
    /// Lines emitted at the top of every unit.
    pub prelude: Vec<String>,
    /// Edition the units are written for.
    pub edition: String,
    /// Extra library directories searched after the work directory and the
    /// host's own.
    pub lib_paths: Vec<PathBuf>,
    /// Stage artifacts here instead of in a fresh temporary directory. The
    /// directory is created if needed and left in place afterwards.
    pub work_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            form_order: FormOrder::default(),
            prelude: DEFAULT_PRELUDE.iter().map(ToString::to_string).collect(),
            edition: "2021".to_string(),
            lib_paths: Vec::new(),
            work_dir: None,
        }
    }
}

/// Where the state machine stopped for the most recent input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingInput,
    Attempting(Form),
    Advanced,
    Rejected,
}

/// How one increment ended.
#[derive(Debug)]
pub enum Outcome {
    /// Compiled as a declaration; nothing ran.
    Declared { generation: usize },
    /// Compiled as statements and ran to completion.
    Executed { generation: usize },
    /// Compiled as statements but failed while loading or running.
    ExecutionFailed { generation: usize, error: ExecError },
    /// Neither form compiled. Carries the diagnostics of the last attempt.
    Rejected { diagnostics: Vec<Diagnostic> },
}

impl Outcome {
    /// Whether the session advanced to a new generation.
    #[must_use]
    pub fn advanced(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// An increment together with its outcome.
#[derive(Debug)]
pub struct Evaluation {
    pub increment: Increment,
    pub outcome: Outcome,
}

/// Staging directory for sources and artifacts.
#[derive(Debug)]
enum WorkDir {
    Temp(TempDir),
    Fixed(PathBuf),
}

impl WorkDir {
    fn create(fixed: Option<&Path>) -> Result<Self, SessionError> {
        match fixed {
            Some(path) => {
                std::fs::create_dir_all(path).map_err(|source| SessionError::WorkDirPath {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(Self::Fixed(path.to_path_buf()))
            }
            None => tempfile::Builder::new()
                .prefix("rinterp-")
                .tempdir()
                .map(Self::Temp)
                .map_err(SessionError::WorkDir),
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Fixed(path) => path,
        }
    }
}

/// The evolving REPL state: the chain of accepted generations plus the
/// components that extend it.
///
/// `submit` takes `&mut self`, so increments are strictly serialized.
pub struct Session {
    generation: usize,
    /// Accepted increments; `history.len() == generation`.
    history: Vec<Increment>,
    last_unit: Option<CompilationUnit>,
    phase: Phase,
    form_order: FormOrder,
    synthesizer: Synthesizer,
    driver: ToolchainDriver,
    // Declared before `work_dir` so loaded libraries are released before
    // their directory is removed.
    executor: Box<dyn Executor>,
    work_dir: WorkDir,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .field("phase", &self.phase)
            .field("form_order", &self.form_order)
            .field("work_dir", &self.work_dir.path())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session that compiles with `toolchain` and runs statement
    /// units in-process.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the work directory cannot be created.
    pub fn new(
        options: SessionOptions,
        toolchain: Box<dyn Toolchain>,
    ) -> Result<Self, SessionError> {
        let work_dir = WorkDir::create(options.work_dir.as_deref())?;
        let executor = Box::new(DylibLoader::new(work_dir.path()));
        Ok(Self::assemble(options, toolchain, executor, work_dir))
    }

    /// Start a session with a custom executor.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the work directory cannot be created.
    pub fn with_executor(
        options: SessionOptions,
        toolchain: Box<dyn Toolchain>,
        executor: Box<dyn Executor>,
    ) -> Result<Self, SessionError> {
        let work_dir = WorkDir::create(options.work_dir.as_deref())?;
        Ok(Self::assemble(options, toolchain, executor, work_dir))
    }

    fn assemble(
        options: SessionOptions,
        toolchain: Box<dyn Toolchain>,
        executor: Box<dyn Executor>,
        work_dir: WorkDir,
    ) -> Self {
        let mut lookup_path = toolchain::host_lookup_path();
        lookup_path.extend(options.lib_paths);
        info!(work_dir = %work_dir.path().display(), "session started");
        Self {
            generation: 0,
            history: Vec::new(),
            last_unit: None,
            phase: Phase::AwaitingInput,
            form_order: options.form_order,
            synthesizer: Synthesizer::new(options.prelude, &options.edition),
            driver: ToolchainDriver::new(toolchain, lookup_path),
            executor,
            work_dir,
        }
    }

    /// Number of accepted increments; also the id the next one will get.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Accepted increments, oldest first.
    #[must_use]
    pub fn history(&self) -> &[Increment] {
        &self.history
    }

    /// The unit of the most recently accepted increment.
    #[must_use]
    pub fn last_unit(&self) -> Option<&CompilationUnit> {
        self.last_unit.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Run one input through the state machine.
    ///
    /// Each form in the configured order is synthesized and compiled in
    /// turn; the first that compiles wins. Never fails: compile failures,
    /// staging failures and execution failures are all reported through
    /// the returned [`Outcome`].
    pub fn submit(&mut self, raw_input: &str) -> Evaluation {
        let generation = self.generation;
        let forms = self.form_order.forms();
        let mut increment = Increment::new(raw_input, generation, forms[0]);
        let mut diagnostics = Vec::new();

        for form in forms {
            self.phase = Phase::Attempting(form);
            increment.form = form;
            let unit = self.synthesizer.synthesize(raw_input, generation, form);
            debug!(generation, %form, "attempting");

            match self.driver.compile(self.work_dir.path(), &unit) {
                Ok(result) if result.ok => return self.advance(increment, unit),
                Ok(result) => {
                    debug!(generation, %form, errors = result.errors().count(), "attempt failed");
                    diagnostics = result.diagnostics;
                }
                Err(err) => {
                    warn!(generation, %form, "compile attempt aborted: {err}");
                    diagnostics = vec![Diagnostic::error(err.to_string())];
                }
            }
        }

        info!(generation, "increment rejected");
        self.phase = Phase::Rejected;
        increment.status = IncrementStatus::Rejected;
        Evaluation {
            increment,
            outcome: Outcome::Rejected { diagnostics },
        }
    }

    fn advance(&mut self, mut increment: Increment, unit: CompilationUnit) -> Evaluation {
        let generation = self.generation;
        let outcome = match unit.form {
            Form::Declaration => {
                increment.status = IncrementStatus::CompiledNoExec;
                Outcome::Declared { generation }
            }
            Form::Statement => {
                increment.status = IncrementStatus::CompiledAndExecuted;
                match self.executor.load_and_run(&unit.unit_name) {
                    Ok(()) => Outcome::Executed { generation },
                    Err(error) => {
                        warn!(generation, "execution failed: {error}");
                        Outcome::ExecutionFailed { generation, error }
                    }
                }
            }
        };

        self.generation += 1;
        self.history.push(increment.clone());
        self.last_unit = Some(unit);
        self.phase = Phase::Advanced;
        info!(generation, form = %increment.form, "advanced to generation {}", self.generation);

        Evaluation { increment, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::ENTRY_SYMBOL;
    use crate::testing::{harness, harness_with};

    #[test]
    fn fresh_session() {
        let h = harness();
        assert_eq!(h.session.generation(), 0);
        assert!(h.session.history().is_empty());
        assert_eq!(h.session.phase(), Phase::AwaitingInput);
        assert!(h.session.last_unit().is_none());
    }

    #[test]
    fn declaration_never_tries_statement_form() {
        let mut h = harness();
        let eval = h.session.submit("fn square(x: i32) -> i32 { x * x }");

        assert!(matches!(eval.outcome, Outcome::Declared { generation: 0 }));
        assert_eq!(eval.increment.form, Form::Declaration);
        assert_eq!(eval.increment.status, IncrementStatus::CompiledNoExec);
        assert_eq!(h.attempts.borrow().len(), 1);
        assert!(h.ran.borrow().is_empty());
        assert_eq!(h.session.generation(), 1);
        assert_eq!(h.session.phase(), Phase::Advanced);
    }

    #[test]
    fn item_shapes_are_declared_and_exported() {
        let mut h = harness();
        let inputs = [
            "#[derive(Debug, Clone)]\nstruct Point { x: i32, y: i32 }",
            "/// Origin.\nconst ORIGIN: i32 = 0;",
            "enum Shape { Dot, Line(i32) }",
            "trait Area { fn area(&self) -> i32; }",
            "impl Point { fn new(x: i32, y: i32) -> Self { Point { x, y } } }",
            "macro_rules! twice { ($e:expr) => { $e * 2 }; }",
        ];
        for input in inputs {
            let eval = h.session.submit(input);
            assert_eq!(eval.increment.form, Form::Declaration, "{input}");
            assert!(matches!(eval.outcome, Outcome::Declared { .. }), "{input}");
        }
        assert!(h.ran.borrow().is_empty());
        assert_eq!(h.session.generation(), inputs.len());

        let attempts = h.attempts.borrow();
        assert_eq!(attempts.len(), inputs.len());
        assert!(attempts[0].contains("#[derive(Debug, Clone)]\npub struct Point { pub x: i32,"));
        assert!(attempts[1].contains("/// Origin.\npub const ORIGIN"));
        assert!(attempts[4].contains("\nimpl Point { pub fn new("));
        assert!(attempts[5].contains("\n#[macro_export]\nmacro_rules! twice"));
    }

    #[test]
    fn bare_statement_falls_back_and_runs() {
        let mut h = harness();
        let eval = h.session.submit("println!(\"hello\");");

        assert!(matches!(eval.outcome, Outcome::Executed { generation: 0 }));
        assert_eq!(eval.increment.form, Form::Statement);
        assert_eq!(eval.increment.status, IncrementStatus::CompiledAndExecuted);
        let attempts = h.attempts.borrow();
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].contains(ENTRY_SYMBOL));
        assert!(attempts[1].contains(ENTRY_SYMBOL));
        assert_eq!(*h.ran.borrow(), ["interp_0"]);
    }

    #[test]
    fn state_chain_across_generations() {
        let mut h = harness();
        let inputs = [
            "static X: AtomicI32 = AtomicI32::new(5);",
            "X.fetch_add(1, Ordering::SeqCst);",
            "println!(\"{}\", X.load(Ordering::SeqCst));",
        ];
        for (expected, input) in inputs.iter().enumerate() {
            let eval = h.session.submit(input);
            assert!(eval.outcome.advanced());
            assert_eq!(eval.increment.generation, expected);
            assert_eq!(eval.increment.parent, expected.checked_sub(1));
            let unit = h.session.last_unit().unwrap();
            assert_eq!(
                unit.parent_unit_name,
                expected.checked_sub(1).map(|p| format!("interp_{p}"))
            );
        }
        assert_eq!(h.session.generation(), 3);
        assert_eq!(h.session.history().len(), 3);
        assert_eq!(h.session.history()[0].form, Form::Declaration);
        assert_eq!(*h.ran.borrow(), ["interp_1", "interp_2"]);
    }

    #[test]
    fn empty_line_is_a_silent_no_op_generation() {
        let mut h = harness();
        let eval = h.session.submit("");
        assert!(matches!(eval.outcome, Outcome::Executed { generation: 0 }));
        assert_eq!(h.session.generation(), 1);
        assert_eq!(*h.ran.borrow(), ["interp_0"]);
    }

    #[test]
    fn syntax_error_is_rejected_without_advancing() {
        let mut h = harness();
        h.session.submit("fn one() -> i32 { 1 }");

        let eval = h.session.submit("let broken = {;");
        match &eval.outcome {
            Outcome::Rejected { diagnostics } => assert!(diagnostics[0].is_error()),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(eval.increment.status, IncrementStatus::Rejected);
        assert_eq!(h.session.generation(), 1);
        assert_eq!(h.session.history().len(), 1);
        assert_eq!(h.session.phase(), Phase::Rejected);
        assert!(h.ran.borrow().is_empty());

        // The next input reuses generation 1 and still chains to interp_0.
        let eval = h.session.submit("println!(\"{}\", one());");
        assert!(matches!(eval.outcome, Outcome::Executed { generation: 1 }));
        assert_eq!(
            h.session.last_unit().unwrap().parent_unit_name.as_deref(),
            Some("interp_0")
        );
    }

    #[test]
    fn declared_function_is_usable_later() {
        let mut h = harness();
        let eval = h.session.submit("fn double(x: i64) -> i64 { x * 2 }");
        assert!(matches!(eval.outcome, Outcome::Declared { .. }));
        assert!(h.ran.borrow().is_empty());

        let eval = h.session.submit("println!(\"{}\", double(21));");
        assert!(matches!(eval.outcome, Outcome::Executed { generation: 1 }));
        assert!(h
            .session
            .last_unit()
            .unwrap()
            .source
            .contains("pub use interp_0::*;"));
    }

    #[test]
    fn execution_failure_still_advances() {
        let mut h = harness();
        let eval = h.session.submit("panic!(\"boom\");");
        assert!(matches!(
            eval.outcome,
            Outcome::ExecutionFailed {
                generation: 0,
                error: ExecError::Panicked { .. }
            }
        ));
        assert_eq!(eval.increment.status, IncrementStatus::CompiledAndExecuted);
        assert_eq!(h.session.generation(), 1);

        let eval = h.session.submit("let fine = 1;");
        assert!(matches!(eval.outcome, Outcome::Executed { generation: 1 }));
    }

    #[test]
    fn generation_is_monotonic() {
        let mut h = harness();
        let inputs = ["fn a() {}", "(", "let x = 1;", "}", "", "static B: i32 = 2;"];
        let mut previous = h.session.generation();
        for input in inputs {
            let eval = h.session.submit(input);
            let now = h.session.generation();
            if eval.outcome.advanced() {
                assert_eq!(now, previous + 1);
            } else {
                assert_eq!(now, previous);
            }
            assert_eq!(h.session.history().len(), now);
            previous = now;
        }
        assert_eq!(previous, 4);
    }

    #[test]
    fn statement_first_order_is_honoured() {
        let mut h = harness_with(FormOrder::StatementFirst, false);
        let eval = h.session.submit("let y = 2;");
        assert!(matches!(eval.outcome, Outcome::Executed { .. }));
        assert_eq!(h.attempts.borrow().len(), 1);

        let eval = h.session.submit("static Z: i32 = 3;");
        // A static is also a valid statement, so the first form wins.
        assert_eq!(eval.increment.form, Form::Statement);
    }

    #[test]
    fn toolchain_spawn_failure_rejects_the_increment() {
        let mut h = harness_with(FormOrder::DeclarationFirst, true);
        let eval = h.session.submit("let x = 1;");
        match eval.outcome {
            Outcome::Rejected { diagnostics } => {
                assert!(diagnostics[0].message.contains("cannot invoke fake-rustc"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(h.session.generation(), 0);
    }

    #[test]
    fn missing_fixed_work_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let options = SessionOptions {
            work_dir: Some(nested.clone()),
            ..SessionOptions::default()
        };
        let session = Session::new(options, Box::new(crate::toolchain::Rustc::default())).unwrap();
        assert_eq!(session.work_dir(), nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn temporary_work_dir_is_removed_on_drop() {
        let session =
            Session::new(SessionOptions::default(), Box::new(crate::toolchain::Rustc::default()))
                .unwrap();
        let path = session.work_dir().to_path_buf();
        assert!(path.is_dir());
        drop(session);
        assert!(!path.exists());
    }
}
