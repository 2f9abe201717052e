//! `rinterp`: an interactive Rust REPL driven by `rustc`.
//!
//! ```text
//! rinterp                      # Interactive REPL
//! rinterp -f script.rs         # Feed a script through the session
//! rinterp -e "<input>" ...     # Evaluate each argument as one increment
//! ```

mod config;
mod editor;

use std::collections::VecDeque;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use rinterp_eval::input::{LineSource, ScriptSource};
use rinterp_eval::repl::{self, LoopOptions, RunSummary};
use rinterp_eval::toolchain::Rustc;
use rinterp_eval::Session;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rinterp", version, about = "Interactive Rust REPL driven by rustc")]
struct Cli {
    /// Execute a script file line by line
    #[arg(short = 'f', long = "file", value_name = "FILE", conflicts_with = "eval")]
    file: Option<PathBuf>,

    /// Evaluate one increment (repeatable)
    #[arg(short = 'e', long = "eval", value_name = "INPUT")]
    eval: Vec<String>,

    /// Config file [default: ~/.rinterp/config.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stage compiled units in DIR instead of a temporary directory
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Compiler binary to invoke
    #[arg(long, value_name = "PATH")]
    rustc: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Initialize tracing on stderr so stdout stays with the evaluated code.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "rinterp_eval=info,rinterp=info",
        _ => "rinterp_eval=debug,rinterp=debug",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Feeds each `-e` argument as one complete line.
struct ArgSource(VecDeque<String>);

impl LineSource for ArgSource {
    fn read_line(&mut self, _prompt: &str) -> std::io::Result<Option<String>> {
        Ok(self.0.pop_front())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    let rustc = cli.rustc.as_deref().unwrap_or(&config.toolchain.rustc);
    let toolchain = Rustc::new(rustc, &config.toolchain.edition, config.toolchain.opt_level);
    let mut session = Session::new(config.session_options(cli.work_dir), Box::new(toolchain))
        .context("cannot start session")?;

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    let summary = if let Some(path) = &cli.file {
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        let mut source = ScriptSource::new(std::io::BufReader::new(file), false);
        repl::run(
            &mut session,
            &mut source,
            &mut stdout,
            &mut stderr,
            LoopOptions {
                skip_blank: true,
                ..LoopOptions::default()
            },
        )?
    } else if !cli.eval.is_empty() {
        let mut source = ArgSource(cli.eval.into());
        repl::run(
            &mut session,
            &mut source,
            &mut stdout,
            &mut stderr,
            LoopOptions {
                join_lines: false,
                ..LoopOptions::default()
            },
        )?
    } else if std::io::stdin().is_terminal() {
        println!("rinterp v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");
        let mut source = editor::Editor::new().context("cannot initialize line editor")?;
        repl::run(
            &mut session,
            &mut source,
            &mut stdout,
            &mut stderr,
            LoopOptions::default(),
        )?
    } else {
        let mut source = ScriptSource::new(std::io::stdin().lock(), true);
        repl::run(
            &mut session,
            &mut source,
            &mut stdout,
            &mut stderr,
            LoopOptions::default(),
        )?
    };

    let RunSummary {
        accepted,
        rejected,
        exec_failures,
    } = summary;
    info!(
        generations = session.generation(),
        accepted, rejected, exec_failures, "session finished"
    );
    Ok(())
}
