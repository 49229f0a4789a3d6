//! Core model for declmatch.
//!
//! This crate holds everything that does not depend on how matching is done:
//!
//! - [`decl`]: the decl tree read from and written back to JSON
//! - [`native`]: native types and declarations as reported by an oracle
//! - [`oracle`]: the oracle port, synthetic source and compile snapshot
//! - [`diagnostic`]: structured per-node failures and their rendering
//! - [`error`]: pass-level errors and exit codes
//! - [`config`]: match configuration
//! - [`names`]: qualified-name helpers

pub mod config;
pub mod decl;
pub mod diagnostic;
pub mod error;
pub mod names;
pub mod native;
pub mod oracle;

pub use config::MatchConfig;
pub use decl::{
    BaseRef, CallableDescriptor, ClassNode, ConstNode, DeclKind, DeclName, DeclNode, DeclTree,
    DescriptorTraits, EnumMember, EnumNode, FuncFlags, FuncNode, MatchReport, MatchStatus,
    OpaqueTypeNode, Ownership, Param, ReportedDiagnostic, TypeDescriptor, TypeMap, VarNode,
    DEFAULT_MARKER,
};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{MatchError, MatchResult, OracleError, OutputErrorCode};
pub use native::{
    BaseEdge, Builtin, ClassDecl, Conversion, ConversionVia, EnumDecl, EnumeratorDecl,
    FunctionDecl, FunctionFlags, NativeDecl, NativeParam, NativeType, NumericCategory, Signature,
    SourceLocation, TemplateArg, TypeKind, TypeTraits, TypedefDecl, VarDecl,
};
pub use oracle::{Oracle, Probe, ProbeKind, Snapshot, SyntheticSource};
