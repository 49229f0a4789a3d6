//! The oracle port.
//!
//! The matching engine never parses or type-checks native source itself.
//! Everything it knows about the translation unit comes through the
//! [`Oracle`] trait: name lookup, overload sets, base edges, template
//! specialization, type traits, implicit conversions, and a single compile
//! step over synthetic probe source.
//!
//! # Lifecycle
//!
//! 1. The engine composes a [`SyntheticSource`] for the whole decl tree.
//! 2. [`Oracle::compile`] is called exactly once and returns a [`Snapshot`]
//!    mapping every probe alias to the concrete type it names (or recording
//!    why it does not type-check).
//! 3. The snapshot and the oracle are then only read for the rest of the pass.
//!
//! Implementations decide how to answer; a compiler-backed oracle and the
//! fixture-backed test double satisfy the same contract.

use std::collections::HashMap;

use crate::error::OracleError;
use crate::native::{
    BaseEdge, ClassDecl, Conversion, FunctionDecl, NativeDecl, NativeType, TemplateArg, TypeTraits,
};

// ============================================================================
// Synthetic Source
// ============================================================================

/// What a probe alias stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProbeKind {
    /// `typedef <spelling> alias;`
    Type,
    /// `template <typename... A> using alias = <spelling><A...>;`
    Template,
}

/// One alias declared by the synthetic source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub alias: String,
    /// Scope the spelling must be resolved in, as written in the decl tree
    /// (`::Namespace::Klass`), empty for the global scope.
    pub scope: String,
    pub spelling: String,
    pub kind: ProbeKind,
}

/// Synthetic source handed to [`Oracle::compile`].
///
/// `text` is the rendered translation unit; `probes` lists the aliases it
/// declares so an oracle can report per-alias results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntheticSource {
    pub text: String,
    pub includes: Vec<String>,
    pub probes: Vec<Probe>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable result of compiling synthetic source.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    types: HashMap<String, NativeType>,
    templates: HashMap<String, String>,
    failures: HashMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_type(&mut self, alias: impl Into<String>, ty: NativeType) {
        self.types.insert(alias.into(), ty);
    }

    pub fn insert_template(&mut self, alias: impl Into<String>, qualified_name: impl Into<String>) {
        self.templates.insert(alias.into(), qualified_name.into());
    }

    /// Record that an alias does not name a valid type in its scope.
    pub fn insert_failure(&mut self, alias: impl Into<String>, reason: impl Into<String>) {
        self.failures.insert(alias.into(), reason.into());
    }

    pub fn resolved_type(&self, alias: &str) -> Option<&NativeType> {
        self.types.get(alias)
    }

    pub fn resolved_template(&self, alias: &str) -> Option<&str> {
        self.templates.get(alias).map(String::as_str)
    }

    pub fn failure(&self, alias: &str) -> Option<&str> {
        self.failures.get(alias).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len() + self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Oracle Trait
// ============================================================================

/// Narrow contract the matching engine needs from a native semantic engine.
pub trait Oracle {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Every declaration whose fully qualified name is exactly `qualified_name`.
    fn lookup_qualified(&self, qualified_name: &str) -> Vec<NativeDecl>;

    /// Functions named `name` declared directly in `scope` (a namespace or a
    /// class, possibly a class template specialization). Deleted functions
    /// are included and flagged.
    fn enumerate_overloads(&self, scope: &str, name: &str) -> Vec<FunctionDecl>;

    /// Immediate bases of a class in declaration order.
    fn base_classes(&self, class_name: &str) -> Vec<BaseEdge>;

    /// The class declaration of `template<args...>`, instantiating the
    /// primary template when no explicit specialization exists.
    fn resolve_specialization(&self, template_name: &str, args: &[TemplateArg])
        -> Option<ClassDecl>;

    /// Traits of a type; `None` for types without meaningful traits (void,
    /// function types, unknown records).
    fn type_traits(&self, ty: &NativeType) -> Option<TypeTraits>;

    /// Single-step user-defined conversions available from `from`.
    fn implicit_conversions(&self, from: &NativeType) -> Vec<Conversion>;

    /// Compile the synthetic source. Called once per pass.
    fn compile(&self, source: &SyntheticSource) -> Result<Snapshot, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Builtin;

    #[test]
    fn test_snapshot_records_types_templates_and_failures() {
        let mut snapshot = Snapshot::new();
        assert!(snapshot.is_empty());
        snapshot.insert_type("probe_type_0", NativeType::builtin(Builtin::Int));
        snapshot.insert_template("probe_template_1", "::std::vector");
        snapshot.insert_failure("probe_type_2", "unknown type name 'Cord'");

        assert_eq!(
            snapshot.resolved_type("probe_type_0"),
            Some(&NativeType::builtin(Builtin::Int))
        );
        assert_eq!(snapshot.resolved_template("probe_template_1"), Some("::std::vector"));
        assert_eq!(snapshot.failure("probe_type_2"), Some("unknown type name 'Cord'"));
        assert_eq!(snapshot.resolved_type("probe_type_2"), None);
        assert_eq!(snapshot.len(), 2);
    }
}
