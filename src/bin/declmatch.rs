//! Binary entry point for the declmatch CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Match a decl tree against a fixture and print the annotated tree
//! declmatch match --oracle fixture.json --decls tree.json
//!
//! # Print the synthetic probe source a tree needs
//! declmatch probe --decls tree.json
//! ```
//!
//! Logging goes to stderr and is controlled by `DECLMATCH_LOG`
//! (`EnvFilter` syntax, default `warn`).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use declmatch::output::{emit_response, ErrorResponse, MatchResponse};
use declmatch::{MatchError, OutputErrorCode};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "DECLMATCH_LOG";

/// Match binding declarations against native C++ declarations.
#[derive(Parser, Debug)]
#[command(
    name = "declmatch",
    version,
    about = "Match binding declarations against native C++ declarations"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a matching pass and print the annotated tree.
    Match {
        /// Fixture describing the native translation unit.
        #[arg(long)]
        oracle: PathBuf,
        /// Decl tree to match.
        #[arg(long)]
        decls: PathBuf,
        /// Match configuration (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also write the synthetic probe source to this file.
        #[arg(long)]
        probe_out: Option<PathBuf>,
    },
    /// Print the synthetic probe source for a decl tree.
    Probe {
        /// Decl tree to compose probes for.
        #[arg(long)]
        decls: PathBuf,
        /// Match configuration (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match execute(cli.command) {
        Ok(code) => code,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let _ = emit_response(&ErrorResponse::new(&err), &mut io::stderr());
            ExitCode::from(error_code.code())
        }
    }
}

/// Install the stderr subscriber.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .init();
    }
}

fn execute(command: Command) -> Result<ExitCode, MatchError> {
    match command {
        Command::Match {
            oracle,
            decls,
            config,
            probe_out,
        } => execute_match(&oracle, &decls, config.as_deref(), probe_out.as_deref()),
        Command::Probe { decls, config } => execute_probe(&decls, config.as_deref()),
    }
}

fn execute_match(
    oracle: &Path,
    decls: &Path,
    config: Option<&Path>,
    probe_out: Option<&Path>,
) -> Result<ExitCode, MatchError> {
    if let Some(out) = probe_out {
        let source = declmatch::probe_source(decls, config)?;
        fs::write(out, &source.text).map_err(|e| MatchError::Io {
            path: out.display().to_string(),
            source: e,
        })?;
        debug!("wrote {} probes to {}", source.probes.len(), out.display());
    }

    let (tree, report) = declmatch::run_pass(oracle, decls, config)?;
    let mut stdout = io::stdout();
    emit_response(&MatchResponse::new(&tree, &report), &mut stdout).map_err(|e| {
        MatchError::Internal {
            message: e.to_string(),
        }
    })?;
    let _ = stdout.flush();

    if report.all_matched() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(OutputErrorCode::Unmatched.code()))
    }
}

fn execute_probe(decls: &Path, config: Option<&Path>) -> Result<ExitCode, MatchError> {
    let source = declmatch::probe_source(decls, config)?;
    let mut stdout = io::stdout();
    write!(stdout, "{}", source.text).map_err(|e| MatchError::Internal {
        message: e.to_string(),
    })?;
    let _ = stdout.flush();
    Ok(ExitCode::SUCCESS)
}
