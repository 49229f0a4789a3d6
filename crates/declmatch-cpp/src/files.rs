//! Required-file constraints.
//!
//! A decl may require that its native declaration lives in a given header.
//! Auxiliary headers stand in for the header they extend: `D/X_aux.h` also
//! accepts `D/X.h` and `parent(D)/X.h`.

use std::path::{Path, PathBuf};

use declmatch_core::SourceLocation;

fn normalize(path: &str) -> String {
    let mut path = path;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}

/// Every file path satisfying a `required` constraint.
pub fn accepted_files(required: &str, aux_suffix: &str) -> Vec<String> {
    let required = normalize(required);
    let mut accepted = vec![required.clone()];

    let path = Path::new(&required);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if aux_suffix.is_empty() || !stem.ends_with(aux_suffix) {
        return accepted;
    }
    let base_stem = &stem[..stem.len() - aux_suffix.len()];
    let file_name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", base_stem, ext),
        None => base_stem.to_string(),
    };
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    accepted.push(join(dir, &file_name));
    if let Some(parent) = dir.parent() {
        let sibling = join(parent, &file_name);
        if !accepted.contains(&sibling) {
            accepted.push(sibling);
        }
    }
    accepted
}

fn join(dir: &Path, file_name: &str) -> String {
    let joined: PathBuf = dir.join(file_name);
    joined.to_string_lossy().into_owned()
}

fn satisfies(actual: &str, accepted: &str) -> bool {
    actual == accepted || actual.ends_with(&format!("/{}", accepted))
}

/// Check a declaration's location against a required file.
///
/// Returns the diagnostic detail on violation.
pub fn check_location(
    required: &str,
    location: &SourceLocation,
    aux_suffix: &str,
) -> Result<(), String> {
    let accepted = accepted_files(required, aux_suffix);
    let actual = normalize(&location.file);
    if accepted.iter().any(|file| satisfies(&actual, file)) {
        return Ok(());
    }
    let expected = match accepted.as_slice() {
        [only] => format!("the file {}", only),
        many => format!("one of the files {{{}}}", many.join(", ")),
    };
    Err(format!(
        "expects it in {} but found it at {}:{}",
        expected, actual, location.line
    ))
}
