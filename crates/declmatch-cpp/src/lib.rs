//! C++ matching engine for declmatch.
//!
//! This crate matches decl trees against C++ declarations reported by an
//! [`Oracle`](declmatch_core::Oracle):
//! - Synthetic probe composition for every concrete spelling a tree needs
//! - Type compatibility (roles, ranks, conversions, templates, callables)
//! - Name lookup and overload resolution
//! - Base class resolution with diamond detection
//! - Default argument validation and parameter layout
//! - Automatic type selection from type maps
//! - A fixture-backed oracle for tests and the CLI

pub mod bases;
pub mod compat;
pub mod context;
pub mod defaults;
pub mod files;
pub mod fixture;
pub mod lookup;
pub mod matcher;
pub mod overload;
pub mod probe;
pub mod selector;
pub mod spelling;

pub use fixture::FixtureOracle;
pub use matcher::DeclMatcher;
pub use probe::ProbePlan;
