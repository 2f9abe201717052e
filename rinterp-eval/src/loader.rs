//! Dynamic loading and execution of compiled statement units.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use crate::error::ExecError;
use crate::synth::ENTRY_SYMBOL;
use crate::unit;

/// Signature of the entry point every statement unit exports: no
/// parameters, `0` when the body ran to completion.
type EntryPoint = unsafe extern "C" fn() -> i32;

/// Runs a compiled unit by name.
pub trait Executor {
    /// Load the artifact for `unit_name` and invoke its entry point.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] when the artifact or its entry point cannot be
    /// found, or when the increment's code panicked.
    fn load_and_run(&mut self, unit_name: &str) -> Result<(), ExecError>;
}

/// Loads unit libraries from one directory. A library, once opened, is
/// never closed.
///
/// Later generations link against earlier ones, so a library must never be
/// unloaded while the session is alive: doing so would reset the statics
/// declared in it.
#[derive(Debug)]
pub struct DylibLoader {
    dir: PathBuf,
    loaded: Vec<(String, Library)>,
}

impl DylibLoader {
    /// A loader resolving artifacts inside `dir`. Nothing is opened until
    /// [`Executor::load_and_run`] asks for a unit by name.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            loaded: Vec::new(),
        }
    }

    /// Names of the units opened so far, in load order.
    #[cfg(test)]
    fn loaded_units(&self) -> impl Iterator<Item = &str> {
        self.loaded.iter().map(|(name, _)| name.as_str())
    }

    fn open(&mut self, unit_name: &str) -> Result<&Library, ExecError> {
        if let Some(index) = self.loaded.iter().position(|(name, _)| name == unit_name) {
            return Ok(&self.loaded[index].1);
        }
        let path = self.dir.join(unit::artifact_file_name(unit_name));
        debug!(unit = unit_name, path = %path.display(), "loading unit");
        // SAFETY: the artifact was produced by the driver from a synthesized
        // unit whose only initializers are the user's own Rust code.
        let library = unsafe { Library::new(&path) }.map_err(|source| ExecError::Load {
            unit: unit_name.to_string(),
            source,
        })?;
        self.loaded.push((unit_name.to_string(), library));
        Ok(&self.loaded[self.loaded.len() - 1].1)
    }
}

impl Drop for DylibLoader {
    fn drop(&mut self) {
        // Unit libraries link a shared `std` and may have registered
        // thread-local destructors; closing them mid-process is not safe.
        // They stay mapped until the process exits.
        for (_, library) in self.loaded.drain(..) {
            std::mem::forget(library);
        }
    }
}

impl Executor for DylibLoader {
    fn load_and_run(&mut self, unit_name: &str) -> Result<(), ExecError> {
        let library = self.open(unit_name)?;
        // SAFETY: statement units export `ENTRY_SYMBOL` with exactly the
        // `EntryPoint` signature.
        let entry: Symbol<'_, EntryPoint> = unsafe { library.get(ENTRY_SYMBOL.as_bytes()) }
            .map_err(|source| ExecError::MissingEntryPoint {
                unit: unit_name.to_string(),
                symbol: ENTRY_SYMBOL,
                source,
            })?;
        // SAFETY: see above; the entry point catches its own panics.
        let status = unsafe { entry() };
        if status == 0 {
            Ok(())
        } else {
            Err(ExecError::Panicked {
                unit: unit_name.to_string(),
                status,
            })
        }
    }
}
