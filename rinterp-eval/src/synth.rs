//! Unit synthesis: wraps raw input into a complete crate source.
//!
//! Every unit has the same shape:
//!
//! ```text
//! // interp_2: statement form, parent interp_1
//! #![allow(...)]
//! use std::collections::*;        <- prelude
//! pub use interp_1::*;            <- everything declared so far
//!
//! <body for the chosen form>
//! ```
//!
//! The `pub use` of the parent is what carries state forward: generation
//! `N` re-exports generation `N - 1`, which re-exports `N - 2`, and so on,
//! so every earlier public item resolves by its plain name.

use std::fmt::Write;

use crate::item;
use crate::unit::{self, CompilationUnit, Form};

/// Name of the unmangled entry point every statement unit exports.
pub const ENTRY_SYMBOL: &str = "interp_exec";

/// Lints that increments trip all the time and that say nothing useful in
/// a REPL.
const ALLOWED_LINTS: &[&str] = &[
    "unknown_lints",
    "dead_code",
    "unused_imports",
    "unused_variables",
    "unused_mut",
    "unused_must_use",
    "non_upper_case_globals",
    "static_mut_refs",
];

/// Prelude used when none is configured.
pub const DEFAULT_PRELUDE: &[&str] = &["use std::collections::*;", "use std::sync::atomic::*;"];

/// Builds compilation units. Pure and deterministic: the same input,
/// generation and form always produce byte-identical source.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    prelude: Vec<String>,
    edition: String,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_PRELUDE.iter().map(ToString::to_string).collect(),
            "2021",
        )
    }
}

impl Synthesizer {
    /// Create a synthesizer emitting `prelude` lines at the top of every unit,
    /// for crates compiled under `edition`.
    #[must_use]
    pub fn new(prelude: Vec<String>, edition: &str) -> Self {
        Self {
            prelude,
            edition: edition.to_string(),
        }
    }

    /// Wrap `raw_input` as generation `generation` in the given form.
    #[must_use]
    pub fn synthesize(&self, raw_input: &str, generation: usize, form: Form) -> CompilationUnit {
        let unit_name = unit::unit_name(generation);
        let parent_unit_name = generation.checked_sub(1).map(unit::unit_name);

        let mut source = String::new();
        let _ = writeln!(
            source,
            "// {unit_name}: {form} form, parent {}",
            parent_unit_name.as_deref().unwrap_or("none")
        );
        let _ = writeln!(source, "#![allow({})]", ALLOWED_LINTS.join(", "));
        for line in &self.prelude {
            source.push_str(line);
            source.push('\n');
        }
        if let Some(parent) = &parent_unit_name {
            let _ = writeln!(source, "pub use {parent}::*;");
        }
        source.push('\n');

        match form {
            Form::Declaration => {
                source.push_str(&item::export_items(raw_input));
                source.push('\n');
            }
            Form::Statement => {
                let _ = writeln!(source, "{}", self.no_mangle_attr());
                let _ = writeln!(source, "pub extern \"C\" fn {ENTRY_SYMBOL}() -> i32 {{");
                source.push_str("    let outcome = ::std::panic::catch_unwind(\n");
                source.push_str("        ::std::panic::AssertUnwindSafe(|| {\n");
                source.push_str(raw_input);
                source.push_str("\n    }));\n");
                source.push_str("    let _ = ::std::io::Write::flush(&mut ::std::io::stdout());\n");
                source.push_str("    if outcome.is_ok() { 0 } else { 1 }\n");
                source.push_str("}\n");
            }
        }

        CompilationUnit {
            generation,
            unit_name,
            parent_unit_name,
            form,
            source,
        }
    }

    /// Edition 2024 only accepts the `unsafe(...)` spelling.
    fn no_mangle_attr(&self) -> &'static str {
        if self.edition.as_str() >= "2024" {
            "#[unsafe(no_mangle)]"
        } else {
            "#[no_mangle]"
        }
    }
}
