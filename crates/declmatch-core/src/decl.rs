//! The decl tree: a language-neutral description of a binding surface.
//!
//! A [`DeclTree`] is read from JSON, matched in place, and written back out.
//! Input fields (symbolic names, type tags, hints, default markers) are never
//! overwritten by matching; resolved fields live next to them and stay empty
//! until a node matches. A node's [`MatchStatus`] is `Matched` or
//! `Failed(diagnostic)` after a pass, never both.

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::error::MatchError;
use crate::native::TypeTraits;

/// Default marker: the symbolic side knows a default exists but not its value.
pub const DEFAULT_MARKER: &str = "default";

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Names and Types
// ============================================================================

/// Symbolic name of a decl node and its resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclName {
    /// Native name to look up: partial (`Namespace::Klass`), fully qualified
    /// (`::Klass`), operator-shaped (`operator==`) or specialized (`Box<int>`).
    pub name: String,
    /// Name exported to the binding language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Fully qualified native name, empty until matched.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qualified: String,
}

impl DeclName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Which ownership alternative a class-typed descriptor matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Value,
    Reference,
    RawPointer,
    UniquePtr,
    SharedPtr,
}

/// Traits inherited by a descriptor that references a class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorTraits {
    pub copyable: bool,
    pub movable: bool,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub has_default_ctor: bool,
    pub trivial_default_ctor: bool,
    pub trivial_dtor: bool,
    pub public_dtor: bool,
    /// The value may be handed over as a raw pointer.
    pub to_ptr_conversion: bool,
    /// The value may be handed over as a unique-ownership wrapper.
    pub to_unique_ptr_conversion: bool,
}

/// A symbolic type and, after matching, its concrete spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Symbolic type tag (`int`, `list`, `MyClass`).
    pub lang_type: String,
    /// Concrete-type hint. Without one, the tree's type maps are consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Concrete spelling chosen by matching.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resolved: String,
    /// Template arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<TypeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<CallableDescriptor>,
    /// Pointer semantics requested (input) or matched (output).
    #[serde(default, skip_serializing_if = "is_false")]
    pub raw_pointer: bool,
    /// The matched native type is const-qualified.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_const: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Ownership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<DescriptorTraits>,
}

impl TypeDescriptor {
    pub fn new(lang_type: impl Into<String>) -> Self {
        Self {
            lang_type: lang_type.into(),
            ..Default::default()
        }
    }

    pub fn with_hint(lang_type: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            hint: Some(hint.into()),
            ..Self::new(lang_type)
        }
    }

    /// Clear every resolved field, recursively.
    pub fn clear_resolution(&mut self) {
        self.resolved.clear();
        self.is_const = false;
        self.ownership = None;
        self.traits = None;
        for param in &mut self.params {
            param.clear_resolution();
        }
        if let Some(callable) = &mut self.callable {
            for param in callable.params.iter_mut().chain(callable.returns.iter_mut()) {
                param.ty.clear_resolution();
            }
        }
    }
}

/// A callable signature: ordered parameters and at most one return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableDescriptor {
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Vec<Param>,
}

/// A named parameter or return value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    /// Input: a default specifier (`default` or a value).
    /// Output: the surfaced native default, or `default` when not a literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Mapped onto a native output parameter.
    #[serde(default, skip_serializing_if = "is_false")]
    pub output_param: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            ..Default::default()
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

// ============================================================================
// Node Payloads
// ============================================================================

/// Function properties derived from the matched declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuncFlags {
    pub pure_virtual: bool,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub overloaded: bool,
    pub void_return: bool,
    /// Operator resolved as a free function with an implicit receiver.
    pub operator_function: bool,
    pub const_method: bool,
    pub noexcept: bool,
    pub deprecated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncNode {
    #[serde(flatten)]
    pub name: DeclName,
    #[serde(default, skip_serializing_if = "is_false")]
    pub constructor: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub classmethod: bool,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Vec<Param>,
    /// Drop the native return value.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_return: bool,
    #[serde(default)]
    pub flags: FuncFlags,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mangled_name: String,
}

impl FuncNode {
    /// Parameters whose default value is known to exist but not its literal value.
    pub fn unknown_default_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.default_value.as_deref() == Some(DEFAULT_MARKER))
            .count()
    }
}

/// A resolved base class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRef {
    pub qualified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    #[serde(flatten)]
    pub name: DeclName,
    #[serde(default)]
    pub members: Vec<DeclNode>,
    /// Request (input) and confirmation (output) that the class is final.
    #[serde(default, rename = "final", skip_serializing_if = "is_false")]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<BaseRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<TypeTraits>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qualified: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumNode {
    #[serde(flatten)]
    pub name: DeclName,
    #[serde(default)]
    pub members: Vec<EnumMember>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub scoped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarNode {
    #[serde(flatten)]
    pub name: DeclName,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstNode {
    #[serde(flatten)]
    pub name: DeclName,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueTypeNode {
    #[serde(flatten)]
    pub name: DeclName,
}

// ============================================================================
// Decl Nodes
// ============================================================================

/// The kind-specific payload of a decl node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum DeclKind {
    Func(FuncNode),
    Class(ClassNode),
    Enum(EnumNode),
    Var(VarNode),
    Const(ConstNode),
    OpaqueType(OpaqueTypeNode),
}

/// Outcome of matching one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Pending,
    Matched,
    Failed(Diagnostic),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclNode {
    #[serde(flatten)]
    pub kind: DeclKind,
    /// Header the matched declaration must live in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_file: Option<String>,
    /// Enclosing namespace for top-level nodes (`Namespace` or `::a::b`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub status: MatchStatus,
}

impl DeclNode {
    pub fn new(kind: DeclKind) -> Self {
        Self {
            kind,
            required_file: None,
            namespace: None,
            status: MatchStatus::Pending,
        }
    }

    pub fn name(&self) -> &DeclName {
        match &self.kind {
            DeclKind::Func(f) => &f.name,
            DeclKind::Class(c) => &c.name,
            DeclKind::Enum(e) => &e.name,
            DeclKind::Var(v) => &v.name,
            DeclKind::Const(c) => &c.name,
            DeclKind::OpaqueType(t) => &t.name,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            DeclKind::Func(_) => "func",
            DeclKind::Class(_) => "class",
            DeclKind::Enum(_) => "enum",
            DeclKind::Var(_) => "var",
            DeclKind::Const(_) => "const",
            DeclKind::OpaqueType(_) => "opaque_type",
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.status, MatchStatus::Matched)
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match &self.status {
            MatchStatus::Failed(diag) => Some(diag),
            _ => None,
        }
    }

    /// Child nodes (class members).
    pub fn children(&self) -> &[DeclNode] {
        match &self.kind {
            DeclKind::Class(c) => &c.members,
            _ => &[],
        }
    }

    /// Whether this node and every descendant matched.
    pub fn is_fully_matched(&self) -> bool {
        self.is_matched() && self.children().iter().all(DeclNode::is_fully_matched)
    }

    fn tally(&self, path: &str, report: &mut MatchReport) {
        let path = if path.is_empty() {
            self.name().name.clone()
        } else {
            format!("{}.{}", path, self.name().name)
        };
        match &self.status {
            MatchStatus::Pending => report.pending += 1,
            MatchStatus::Matched => report.matched += 1,
            MatchStatus::Failed(diag) => {
                report.failed += 1;
                report.diagnostics.push(ReportedDiagnostic {
                    path: path.clone(),
                    message: diag.render(),
                    diagnostic: diag.clone(),
                });
            }
        }
        for child in self.children() {
            child.tally(&path, report);
        }
    }
}

// ============================================================================
// Type Maps and the Tree
// ============================================================================

/// Ordered concrete candidates for one symbolic type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMap {
    pub lang_type: String,
    pub candidates: Vec<String>,
}

/// A full binding surface: decls, type maps and the root file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclTree {
    /// Root file constraint and the header included by synthetic probes.
    #[serde(default)]
    pub source_file: String,
    /// Additional headers to include in synthetic probes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default)]
    pub typemaps: Vec<TypeMap>,
    #[serde(default)]
    pub decls: Vec<DeclNode>,
}

impl DeclTree {
    pub fn from_json(content: &str) -> Result<Self, MatchError> {
        serde_json::from_str(content).map_err(|e| MatchError::DeclTree {
            message: e.to_string(),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, MatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Candidates registered for a symbolic type, in priority order.
    pub fn typemap(&self, lang_type: &str) -> Option<&TypeMap> {
        self.typemaps.iter().find(|m| m.lang_type == lang_type)
    }

    /// Summarise the outcome of the last pass.
    pub fn report(&self) -> MatchReport {
        let mut report = MatchReport::default();
        for decl in &self.decls {
            decl.tally("", &mut report);
        }
        report
    }
}

/// A diagnostic with the dotted path of the node it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedDiagnostic {
    pub path: String,
    pub message: String,
    pub diagnostic: Diagnostic,
}

/// Outcome counts of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub matched: usize,
    pub failed: usize,
    pub pending: usize,
    pub diagnostics: Vec<ReportedDiagnostic>,
}

impl MatchReport {
    pub fn all_matched(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{
        "source_file": "test.h",
        "typemaps": [{"lang_type": "int", "candidates": ["int", "long"]}],
        "decls": [
            {"decl": "func", "name": "Foo", "alias": "foo",
             "params": [
                {"name": "a", "type": {"lang_type": "int"}},
                {"name": "b", "type": {"lang_type": "int"}, "default_value": "default"}
             ]},
            {"decl": "class", "name": "Klass", "final": true,
             "members": [{"decl": "var", "name": "x", "type": {"lang_type": "int", "hint": "int"}}]},
            {"decl": "enum", "name": "Color", "namespace": "paint",
             "members": [{"name": "Red"}]}
        ]
    }"#;

    #[test]
    fn test_decl_tree_parses_all_kinds() {
        let tree = DeclTree::from_json(TREE).unwrap();
        assert_eq!(tree.decls.len(), 3);
        match &tree.decls[0].kind {
            DeclKind::Func(f) => {
                assert_eq!(f.name.name, "Foo");
                assert_eq!(f.name.alias.as_deref(), Some("foo"));
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.unknown_default_count(), 1);
            }
            other => panic!("expected func, got {:?}", other),
        }
        match &tree.decls[1].kind {
            DeclKind::Class(c) => {
                assert!(c.is_final);
                assert_eq!(c.members.len(), 1);
            }
            other => panic!("expected class, got {:?}", other),
        }
        assert_eq!(tree.decls[2].namespace.as_deref(), Some("paint"));
        assert_eq!(tree.decls[2].status, MatchStatus::Pending);
        assert_eq!(tree.typemap("int").unwrap().candidates, vec!["int", "long"]);
    }

    #[test]
    fn test_decl_tree_round_trips_status() {
        let mut tree = DeclTree::from_json(TREE).unwrap();
        tree.decls[0].status = MatchStatus::Failed(Diagnostic::not_found("Foo", ""));
        tree.decls[1].status = MatchStatus::Matched;
        let json = tree.to_json_pretty().unwrap();
        let back = DeclTree::from_json(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_decl_tree_report_counts_members() {
        let mut tree = DeclTree::from_json(TREE).unwrap();
        tree.decls[0].status = MatchStatus::Matched;
        tree.decls[1].status = MatchStatus::Matched;
        tree.decls[2].status = MatchStatus::Failed(Diagnostic::not_found("Color", ""));
        let report = tree.report();
        assert_eq!(report.matched, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.diagnostics[0].path, "Color");
        assert!(!report.all_matched());
    }

    #[test]
    fn test_decl_tree_rejects_unknown_kind() {
        let err = DeclTree::from_json(r#"{"decls": [{"decl": "macro", "name": "X"}]}"#).unwrap_err();
        assert!(matches!(err, MatchError::DeclTree { .. }));
    }
}
