//! Error types for each stage of an increment.
//!
//! Synthesis is pure string construction and has no error type. A failed
//! compile is not an error either: it is a normal [`CompileResult`] with
//! `ok == false`, which the session answers by trying the next form.
//!
//! [`CompileResult`]: crate::toolchain::CompileResult

use std::path::PathBuf;

/// Failure to start a session at all.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot create work directory: {0}")]
    WorkDir(#[source] std::io::Error),
    #[error("work directory {} is not usable: {source}", path.display())]
    WorkDirPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single compile attempt could not be carried out.
///
/// Aborts only the attempt that raised it; the session treats it like a
/// failed compile of that form.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("cannot write {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot invoke {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A compiled statement unit could not be run to completion.
///
/// The generation has already advanced when one of these is reported.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("cannot load {unit}: {source}")]
    Load {
        unit: String,
        #[source]
        source: libloading::Error,
    },
    #[error("{unit} has no entry point `{symbol}`")]
    MissingEntryPoint {
        unit: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("{unit} panicked (status {status})")]
    Panicked { unit: String, status: i32 },
}
