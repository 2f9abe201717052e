//! Generations, increments, and the compilation units synthesized for them.

use serde::Deserialize;

/// Prefix shared by every generation's crate name.
pub const UNIT_PREFIX: &str = "interp_";

/// How a raw input is wrapped into a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// The input is a complete item (`fn`, `static`, `struct`, `use`, ...)
    /// exported from this generation's crate.
    Declaration,
    /// The input is the body of the generation's entry point.
    Statement,
}

impl std::fmt::Display for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declaration => f.write_str("declaration"),
            Self::Statement => f.write_str("statement"),
        }
    }
}

/// Order in which the two forms are attempted for every increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormOrder {
    /// Try the input as an item first, then as statements.
    #[default]
    DeclarationFirst,
    /// Try the input as statements first, then as an item.
    StatementFirst,
}

impl FormOrder {
    /// The forms to attempt, in order.
    #[must_use]
    pub fn forms(self) -> [Form; 2] {
        match self {
            Self::DeclarationFirst => [Form::Declaration, Form::Statement],
            Self::StatementFirst => [Form::Statement, Form::Declaration],
        }
    }
}

/// Crate name of the unit for `generation`.
#[must_use]
pub fn unit_name(generation: usize) -> String {
    format!("{UNIT_PREFIX}{generation}")
}

/// File name of the dynamic library `rustc` emits for `unit_name`
/// (`libinterp_3.so` on Linux, `interp_3.dll` on Windows).
#[must_use]
pub fn artifact_file_name(unit_name: &str) -> String {
    format!(
        "{}{unit_name}{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// File name of the source written for `unit_name`.
#[must_use]
pub fn source_file_name(unit_name: &str) -> String {
    format!("{unit_name}.rs")
}

/// A full, self-contained crate source for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationUnit {
    /// Generation this unit would occupy.
    pub generation: usize,
    /// Crate name, derived from the generation.
    pub unit_name: String,
    /// Unit of the previous generation, `None` for generation 0.
    pub parent_unit_name: Option<String>,
    /// Form the input was wrapped in.
    pub form: Form,
    /// Complete Rust source text.
    pub source: String,
}

/// Lifecycle of one submitted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementStatus {
    Pending,
    /// Compiled as a declaration; nothing was executed.
    CompiledNoExec,
    /// Compiled as statements and handed to the executor.
    CompiledAndExecuted,
    /// Neither form compiled.
    Rejected,
}

/// One user-submitted input and what became of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub generation: usize,
    pub raw_input: String,
    /// Last form attempted (the accepted one unless rejected).
    pub form: Form,
    pub parent: Option<usize>,
    pub status: IncrementStatus,
}

impl Increment {
    /// A pending increment for `generation`.
    #[must_use]
    pub fn new(raw_input: &str, generation: usize, form: Form) -> Self {
        Self {
            generation,
            raw_input: raw_input.to_string(),
            form,
            parent: generation.checked_sub(1),
            status: IncrementStatus::Pending,
        }
    }
}
