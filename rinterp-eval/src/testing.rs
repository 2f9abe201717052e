//! Stand-ins for `rustc` and the dynamic loader, shared by unit tests.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use tempfile::TempDir;

use crate::error::ExecError;
use crate::lex;
use crate::loader::Executor;
use crate::session::{Session, SessionOptions};
use crate::synth::ENTRY_SYMBOL;
use crate::toolchain::{Diagnostic, Toolchain, ToolchainReport, ToolchainRequest};
use crate::unit::{artifact_file_name, FormOrder};

/// Accepts a unit when its body is balanced and, for declarations, starts
/// (after comments and attributes) with an exported item, an `impl` block or
/// a `macro_rules!` definition. Refuses to "link" a unit whose parent artifact
/// is missing. Records every source it sees.
pub struct FakeToolchain {
    pub attempts: Rc<RefCell<Vec<String>>>,
    pub spawn_fails: bool,
}

const ITEM_STARTS: &[&str] = &[
    "pub fn ",
    "pub static ",
    "pub struct ",
    "pub enum ",
    "pub trait ",
    "pub const ",
    "pub type ",
    "pub use ",
    "pub mod ",
    "pub unsafe ",
    "impl ",
    "impl<",
    "macro_rules! ",
];

fn balanced(text: &str) -> bool {
    let lexed = lex::tokenize(text);
    !lexed.unterminated && lexed.open_delimiters() == 0
}

/// `body` past leading `//` lines and `#[...]` attributes.
fn item_start(body: &str) -> &str {
    let mut rest = body.trim_start();
    loop {
        if rest.starts_with("//") {
            rest = rest.split_once('\n').map_or("", |(_, r)| r).trim_start();
        } else if rest.starts_with("#[") {
            rest = rest.split_once(']').map_or("", |(_, r)| r).trim_start();
        } else {
            return rest;
        }
    }
}

impl Toolchain for FakeToolchain {
    fn program(&self) -> &str {
        "fake-rustc"
    }

    fn invoke(&self, request: &ToolchainRequest<'_>) -> std::io::Result<ToolchainReport> {
        if self.spawn_fails {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            ));
        }
        let source = std::fs::read_to_string(request.source)?;
        self.attempts.borrow_mut().push(source.clone());

        let body = source.split_once("\n\n").map_or("", |(_, body)| body);
        // rustc has no token starting with U+FFFD.
        let ok = !body.contains(char::REPLACEMENT_CHARACTER)
            && if body.contains(ENTRY_SYMBOL) {
                balanced(body)
            } else {
                let start = item_start(body);
                ITEM_STARTS.iter().any(|kw| start.starts_with(kw)) && balanced(body)
            };
        let linked = request
            .parent
            .as_ref()
            .map_or(true, |p| p.artifact.exists());

        if ok && linked {
            std::fs::write(
                request.out_dir.join(artifact_file_name(request.crate_name)),
                b"",
            )?;
            Ok(ToolchainReport {
                success: true,
                diagnostics: Vec::new(),
            })
        } else {
            Ok(ToolchainReport {
                success: false,
                diagnostics: vec![Diagnostic::error("syntax error")],
            })
        }
    }
}

/// Records executed units; "panics" when the unit's source contains
/// `panic!`.
pub struct FakeExecutor {
    pub dir: PathBuf,
    pub ran: Rc<RefCell<Vec<String>>>,
}

impl Executor for FakeExecutor {
    fn load_and_run(&mut self, unit_name: &str) -> Result<(), ExecError> {
        self.ran.borrow_mut().push(unit_name.to_string());
        let source = std::fs::read_to_string(self.dir.join(format!("{unit_name}.rs")))
            .unwrap_or_default();
        if source.contains("panic!") {
            Err(ExecError::Panicked {
                unit: unit_name.to_string(),
                status: 1,
            })
        } else {
            Ok(())
        }
    }
}

/// A session wired to the fakes, plus handles on what they recorded.
pub struct Harness {
    pub session: Session,
    pub attempts: Rc<RefCell<Vec<String>>>,
    pub ran: Rc<RefCell<Vec<String>>>,
    _dir: TempDir,
}

pub fn harness_with(form_order: FormOrder, spawn_fails: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let attempts = Rc::new(RefCell::new(Vec::new()));
    let ran = Rc::new(RefCell::new(Vec::new()));
    let options = SessionOptions {
        form_order,
        work_dir: Some(dir.path().to_path_buf()),
        ..SessionOptions::default()
    };
    let toolchain = FakeToolchain {
        attempts: Rc::clone(&attempts),
        spawn_fails,
    };
    let executor = FakeExecutor {
        dir: dir.path().to_path_buf(),
        ran: Rc::clone(&ran),
    };
    let session =
        Session::with_executor(options, Box::new(toolchain), Box::new(executor)).unwrap();
    Harness {
        session,
        attempts,
        ran,
        _dir: dir,
    }
}

pub fn harness() -> Harness {
    harness_with(FormOrder::DeclarationFirst, false)
}
