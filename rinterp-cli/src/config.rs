//! User configuration for `rinterp` (`~/.rinterp/config.toml`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use rinterp_eval::synth::DEFAULT_PRELUDE;
use rinterp_eval::{FormOrder, SessionOptions};
use serde::Deserialize;

/// Top-level configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RinterpConfig {
    pub toolchain: ToolchainConfig,
    pub session: SessionConfig,
}

/// The `[toolchain]` table.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler binary, looked up on `PATH` unless absolute.
    pub rustc: String,
    pub edition: String,
    pub opt_level: u8,
    /// Extra library search directories.
    pub lib_paths: Vec<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            rustc: "rustc".to_string(),
            edition: "2021".to_string(),
            opt_level: 0,
            lib_paths: Vec::new(),
        }
    }
}

/// The `[session]` table.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub form_order: FormOrder,
    /// Lines placed at the top of every synthesized unit.
    pub prelude: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            form_order: FormOrder::default(),
            prelude: DEFAULT_PRELUDE.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RinterpConfig {
    /// Session options derived from this configuration, staging artifacts in
    /// `work_dir` when given.
    #[must_use]
    pub fn session_options(&self, work_dir: Option<PathBuf>) -> SessionOptions {
        SessionOptions {
            form_order: self.session.form_order,
            prelude: self.session.prelude.clone(),
            edition: self.toolchain.edition.clone(),
            lib_paths: self.toolchain.lib_paths.iter().map(|p| expand_tilde(p)).collect(),
            work_dir,
        }
    }
}

/// Load the configuration from `path`, or from `~/.rinterp/config.toml`
/// when `path` is `None`.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RinterpConfig> {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
        return Ok(RinterpConfig::default());
    };
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RinterpConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("cannot read {}", path.display()));
        }
    };
    toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

/// Return the path to `~/.rinterp/config.toml`, or `None` if `$HOME` is unset.
fn config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".rinterp").join("config.toml"))
}

/// Expand a leading `~/` to the value of `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var("HOME")) {
        (Ok(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
