//! Incremental compile-and-load core for the `rinterp` REPL.
//!
//! Every line a user submits becomes one *generation*: a tiny Rust crate
//! synthesized from the input, compiled by `rustc` into a dynamic library
//! inside the session's work directory, and (for statements) loaded and run
//! in-process.
//!
//! # Architecture
//!
//! Generation `N` re-exports everything from generation `N - 1`
//! (`pub use interp_<N-1>::*;`) and links against its library dynamically,
//! so functions and statics declared earlier stay reachable by name and
//! share one copy of their state for the life of the session.
//!
//! Each input is tried first as an item declaration and then as a block of
//! statements; see [`session::Session::submit`].

pub mod error;
pub mod input;
mod item;
mod lex;
pub mod loader;
pub mod repl;
pub mod session;
pub mod synth;
pub mod toolchain;
pub mod unit;

#[cfg(test)]
mod testing;

pub use error::{DriverError, ExecError, SessionError};
pub use session::{Evaluation, Outcome, Phase, Session, SessionOptions};
pub use unit::{CompilationUnit, Form, FormOrder};
