//! Toolchain driver: stages a unit's source in the work directory and runs
//! the external compiler on it.
//!
//! The compiler itself sits behind the [`Toolchain`] trait. [`Rustc`] is the
//! real implementation; the session tests swap in fakes.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::error::DriverError;
use crate::unit::{self, CompilationUnit};

/// Severity of a toolchain diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
    Help,
    Other,
}

impl Level {
    fn parse(level: &str) -> Self {
        match level {
            l if l.starts_with("error") => Self::Error,
            "warning" => Self::Warning,
            "note" | "failure-note" => Self::Note,
            "help" => Self::Help,
            _ => Self::Other,
        }
    }
}

/// One message reported by the toolchain. Surfaced to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    /// Human-readable rendering with source snippet, when the toolchain
    /// provides one.
    pub rendered: Option<String>,
}

impl Diagnostic {
    /// A plain error with no rendering.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            rendered: None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    /// The rendered form if present, otherwise `level: message`.
    #[must_use]
    pub fn display_text(&self) -> String {
        match &self.rendered {
            Some(rendered) => rendered.trim_end().to_string(),
            None => match self.level {
                Level::Error => format!("error: {}", self.message),
                Level::Warning => format!("warning: {}", self.message),
                Level::Note => format!("note: {}", self.message),
                Level::Help => format!("help: {}", self.message),
                Level::Other => self.message.clone(),
            },
        }
    }
}

/// A crate the unit being compiled depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternCrate {
    pub name: String,
    pub artifact: PathBuf,
}

/// Everything the toolchain needs to compile one unit.
#[derive(Debug, Clone)]
pub struct ToolchainRequest<'a> {
    pub crate_name: &'a str,
    pub source: &'a Path,
    pub out_dir: &'a Path,
    /// Library search path, work directory first.
    pub lookup_path: &'a [PathBuf],
    pub parent: Option<ExternCrate>,
}

/// What the toolchain said about one compile.
#[derive(Debug, Clone, Default)]
pub struct ToolchainReport {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// An external compiler, treated as a black box.
pub trait Toolchain {
    /// Program name, for error messages.
    fn program(&self) -> &str;

    /// Compile exactly one unit into `request.out_dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the compiler cannot be started.
    fn invoke(&self, request: &ToolchainRequest<'_>) -> std::io::Result<ToolchainReport>;
}

/// `rustc`, building each unit as a `dylib` linked against a shared `std`.
#[derive(Debug, Clone)]
pub struct Rustc {
    program: String,
    edition: String,
    opt_level: u8,
}

impl Default for Rustc {
    fn default() -> Self {
        Self::new("rustc", "2021", 0)
    }
}

impl Rustc {
    #[must_use]
    pub fn new(program: &str, edition: &str, opt_level: u8) -> Self {
        Self {
            program: program.to_string(),
            edition: edition.to_string(),
            opt_level,
        }
    }

    /// Build the full command line for `request`.
    fn command(&self, request: &ToolchainRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--edition")
            .arg(&self.edition)
            .args(["--crate-type", "dylib", "--crate-name", request.crate_name])
            // Every generation must share one `std` (and one copy of each
            // earlier generation), so link everything dynamically and record
            // where to find it.
            .args(["-C", "prefer-dynamic", "-C", "rpath"])
            .arg("-C")
            .arg(format!("opt-level={}", self.opt_level))
            .arg("--error-format=json")
            .arg("--out-dir")
            .arg(request.out_dir);
        for dir in request.lookup_path {
            cmd.arg("-L").arg(dir);
        }
        if let Some(parent) = &request.parent {
            let mut spec = std::ffi::OsString::from(format!("{}=", parent.name));
            spec.push(&parent.artifact);
            cmd.arg("--extern").arg(spec);
        }
        cmd.arg(request.source);
        cmd
    }
}

impl Toolchain for Rustc {
    fn program(&self) -> &str {
        &self.program
    }

    fn invoke(&self, request: &ToolchainRequest<'_>) -> std::io::Result<ToolchainReport> {
        let output = self.command(request).output()?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(ToolchainReport {
            success: output.status.success(),
            diagnostics: parse_diagnostics(&stderr),
        })
    }
}

/// Shape of one `--error-format=json` line.
#[derive(Debug, Deserialize)]
struct JsonDiagnostic {
    #[serde(rename = "$message_type")]
    message_type: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    level: String,
    rendered: Option<String>,
}

/// Parse `rustc`'s JSON diagnostic stream. Lines that are not JSON (linker
/// chatter, panics from the compiler itself) are kept as plain messages.
#[must_use]
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in stderr.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonDiagnostic>(line) {
            Ok(json) => {
                if json
                    .message_type
                    .as_deref()
                    .is_some_and(|t| t != "diagnostic")
                {
                    continue;
                }
                diagnostics.push(Diagnostic {
                    level: Level::parse(&json.level),
                    message: json.message,
                    rendered: json.rendered,
                });
            }
            Err(_) => diagnostics.push(Diagnostic {
                level: Level::Other,
                message: line.to_string(),
                rendered: None,
            }),
        }
    }
    diagnostics
}

/// Result of one compile attempt.
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    /// True iff the toolchain succeeded and reported no errors.
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    /// Error-level diagnostics only.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Stages units in a work directory and compiles them one at a time.
pub struct ToolchainDriver {
    toolchain: Box<dyn Toolchain>,
    /// Host library directories searched after the work directory.
    host_lookup_path: Vec<PathBuf>,
}

impl std::fmt::Debug for ToolchainDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolchainDriver")
            .field("toolchain", &self.toolchain.program())
            .field("host_lookup_path", &self.host_lookup_path)
            .finish()
    }
}

impl ToolchainDriver {
    #[must_use]
    pub fn new(toolchain: Box<dyn Toolchain>, host_lookup_path: Vec<PathBuf>) -> Self {
        Self {
            toolchain,
            host_lookup_path,
        }
    }

    /// Compile `unit` inside `work_dir`.
    ///
    /// Writes `<unit_name>.rs` (replacing any earlier attempt for the same
    /// unit), drops any stale artifact of that name, and runs the toolchain
    /// once. Never retries.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the source cannot be staged or the
    /// toolchain cannot be started. A compile that merely fails is
    /// `Ok` with `ok == false`.
    pub fn compile(
        &self,
        work_dir: &Path,
        unit: &CompilationUnit,
    ) -> Result<CompileResult, DriverError> {
        let source_path = work_dir.join(unit::source_file_name(&unit.unit_name));
        let artifact_path = work_dir.join(unit::artifact_file_name(&unit.unit_name));

        match std::fs::remove_file(&artifact_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(DriverError::Resource {
                    path: artifact_path,
                    source,
                })
            }
        }
        std::fs::write(&source_path, &unit.source).map_err(|source| DriverError::Resource {
            path: source_path.clone(),
            source,
        })?;

        let mut lookup_path = Vec::with_capacity(self.host_lookup_path.len() + 1);
        lookup_path.push(work_dir.to_path_buf());
        lookup_path.extend(self.host_lookup_path.iter().cloned());

        let parent = unit.parent_unit_name.as_ref().map(|name| ExternCrate {
            name: name.clone(),
            artifact: work_dir.join(unit::artifact_file_name(name)),
        });

        let request = ToolchainRequest {
            crate_name: &unit.unit_name,
            source: &source_path,
            out_dir: work_dir,
            lookup_path: &lookup_path,
            parent,
        };

        debug!(unit = %unit.unit_name, form = %unit.form, "invoking {}", self.toolchain.program());
        let report = self
            .toolchain
            .invoke(&request)
            .map_err(|source| DriverError::Spawn {
                program: self.toolchain.program().to_string(),
                source,
            })?;

        let ok = report.success && !report.diagnostics.iter().any(Diagnostic::is_error);
        debug!(
            unit = %unit.unit_name,
            ok,
            diagnostics = report.diagnostics.len(),
            "compile finished"
        );
        Ok(CompileResult {
            ok,
            diagnostics: report.diagnostics,
        })
    }
}

/// The host's own library directories: the directory holding the running
/// executable and its `deps/` subdirectory, when present. Crates built
/// alongside the host can then be pulled in with `extern crate`.
#[must_use]
pub fn host_lookup_path() -> Vec<PathBuf> {
    let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    else {
        return Vec::new();
    };
    let deps = exe_dir.join("deps");
    let mut paths = vec![exe_dir];
    if deps.is_dir() {
        paths.push(deps);
    }
    paths
}
