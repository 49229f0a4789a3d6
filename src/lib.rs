//! declmatch: match binding declarations against native C++ declarations.
//!
//! A decl tree describes functions, classes, enums, variables, constants and
//! opaque types in language-neutral terms. A matching pass resolves each node
//! against the declarations an [`Oracle`] reports and annotates the tree in
//! place with the concrete native results, or with a [`Diagnostic`].
//!
//! The engine lives in `declmatch-cpp`; the model in `declmatch-core`. This
//! crate is the file-level facade used by the `declmatch` binary.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

pub use declmatch_core::{
    names, DeclKind, DeclNode, DeclTree, Diagnostic, DiagnosticKind, FuncNode, MatchConfig,
    MatchError, MatchReport, MatchResult, MatchStatus, Oracle, OracleError, OutputErrorCode,
    ProbeKind, SyntheticSource,
};
pub use declmatch_cpp::{DeclMatcher, FixtureOracle, ProbePlan};

pub mod output;

/// Read a file, attributing I/O failures to its path.
fn read_input(path: &Path) -> MatchResult<String> {
    fs::read_to_string(path).map_err(|e| MatchError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load the configuration file if one is given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> MatchResult<MatchConfig> {
    match path {
        Some(path) => MatchConfig::load(path),
        None => Ok(MatchConfig::default()),
    }
}

/// Load a decl tree from a JSON file.
pub fn load_tree(path: &Path) -> MatchResult<DeclTree> {
    DeclTree::from_json(&read_input(path)?)
}

/// Run one matching pass over files on disk.
///
/// Returns the annotated tree and its report. Per-node failures are in the
/// report; only pass-level failures (unreadable input, oracle compile
/// failure) are errors.
pub fn run_pass(
    oracle_path: &Path,
    decls_path: &Path,
    config_path: Option<&Path>,
) -> MatchResult<(DeclTree, MatchReport)> {
    let config = load_config(config_path)?;
    let oracle = FixtureOracle::load(oracle_path)?;
    let mut tree = load_tree(decls_path)?;
    debug!(
        "matching {} top-level decls from {}",
        tree.decls.len(),
        decls_path.display()
    );

    let report = DeclMatcher::new(&oracle, &config).run(&mut tree)?;
    info!(
        matched = report.matched,
        failed = report.failed,
        pending = report.pending,
        "matching pass finished"
    );
    Ok((tree, report))
}

/// Compose the synthetic probe source for a decl tree without matching.
pub fn probe_source(decls_path: &Path, config_path: Option<&Path>) -> MatchResult<SyntheticSource> {
    let config = load_config(config_path)?;
    let tree = load_tree(decls_path)?;
    let plan = declmatch_cpp::probe::compose(&tree, &config);
    Ok(plan.source().clone())
}
