//! Synthetic probe composer.
//!
//! Before matching, every concrete spelling the decl tree may need (hints,
//! type-map candidates, specialized class names) is gathered into one
//! synthetic translation unit. Each spelling becomes an alias declared in a
//! probe scope that sees the same names as the decl that uses it. The oracle
//! compiles the unit once and reports, per alias, the type it names.
//!
//! Type-map candidates are emitted once per (symbolic type, scope, shape),
//! no matter how many descriptors in that scope use the symbolic type. A
//! bare use and a use with template arguments are different shapes: the
//! first needs type aliases, the second template aliases.

use std::collections::{BTreeMap, HashMap};
use declmatch_core::names;
use declmatch_core::{
    DeclKind, DeclNode, DeclTree, MatchConfig, Probe, ProbeKind, SyntheticSource, TypeDescriptor,
};

use crate::spelling::parse_integral_literal;

/// How a probe scope sees names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeShape {
    /// `namespace probe_scope_N { using namespace <scope>; ... }`
    Namespace,
    /// `struct probe_scope_N : <scope> { ... };`
    Class,
}

#[derive(Debug, Clone)]
struct ProbeScope {
    written: String,
    shape: ScopeShape,
    probes: Vec<usize>,
}

/// Aliases composed for a decl tree, and the source declaring them.
#[derive(Debug, Clone, Default)]
pub struct ProbePlan {
    source: SyntheticSource,
    types: HashMap<(String, String), String>,
    templates: HashMap<(String, String), String>,
    bindings: BTreeMap<BindingKey, Vec<String>>,
}

/// (symbolic type, probe scope, shape)
type BindingKey = (String, String, ProbeKind);

impl ProbePlan {
    pub fn source(&self) -> &SyntheticSource {
        &self.source
    }

    /// Alias declared for `spelling` in probe scope `scope`.
    pub fn type_alias(&self, scope: &str, spelling: &str) -> Option<&str> {
        self.types
            .get(&(scope.to_string(), spelling.to_string()))
            .map(String::as_str)
    }

    pub fn template_alias(&self, scope: &str, spelling: &str) -> Option<&str> {
        self.templates
            .get(&(scope.to_string(), spelling.to_string()))
            .map(String::as_str)
    }

    /// Number of synthetic bindings emitted for a symbolic type in a scope,
    /// one per shape it is used with.
    pub fn binding_count(&self, lang_type: &str, scope: &str) -> usize {
        self.bindings
            .keys()
            .filter(|(t, s, _)| t == lang_type && s == scope)
            .count()
    }

    /// Candidate aliases of the binding for a symbolic type used with `kind`
    /// shape in a scope.
    pub fn binding(&self, lang_type: &str, scope: &str, kind: ProbeKind) -> Option<&[String]> {
        self.bindings
            .get(&(lang_type.to_string(), scope.to_string(), kind))
            .map(Vec::as_slice)
    }
}

/// Compose the probe plan for a whole tree.
pub fn compose(tree: &DeclTree, config: &MatchConfig) -> ProbePlan {
    let mut composer = Composer {
        tree,
        scopes: Vec::new(),
        scope_index: HashMap::new(),
        plan: ProbePlan::default(),
    };
    for decl in &tree.decls {
        let scope = decl
            .namespace
            .as_deref()
            .map(|ns| names::qualify("", ns))
            .unwrap_or_default();
        composer.visit_node(decl, &scope, ScopeShape::Namespace);
    }
    composer.render(config);
    tracing::debug!(
        "composed {} probes in {} scopes",
        composer.plan.source.probes.len(),
        composer.scopes.len()
    );
    composer.plan
}

struct Composer<'a> {
    tree: &'a DeclTree,
    scopes: Vec<ProbeScope>,
    scope_index: HashMap<String, usize>,
    plan: ProbePlan,
}

impl Composer<'_> {
    fn visit_node(&mut self, node: &DeclNode, scope: &str, shape: ScopeShape) {
        match &node.kind {
            DeclKind::Func(func) => {
                for param in func.params.iter().chain(func.returns.iter()) {
                    self.visit_descriptor(&param.ty, scope, shape);
                }
            }
            DeclKind::Class(class) => {
                if class.name.name.contains('<') {
                    self.probe(scope, shape, &class.name.name, ProbeKind::Type);
                }
                let inner = names::qualify(scope, &class.name.name);
                for member in &class.members {
                    self.visit_node(member, &inner, ScopeShape::Class);
                }
            }
            DeclKind::Var(var) => self.visit_descriptor(&var.ty, scope, shape),
            DeclKind::Const(constant) => self.visit_descriptor(&constant.ty, scope, shape),
            DeclKind::Enum(_) | DeclKind::OpaqueType(_) => {}
        }
    }

    fn visit_descriptor(&mut self, desc: &TypeDescriptor, scope: &str, shape: ScopeShape) {
        if let Some(callable) = &desc.callable {
            for param in callable.params.iter().chain(callable.returns.iter()) {
                self.visit_descriptor(&param.ty, scope, shape);
            }
            return;
        }
        for param in &desc.params {
            self.visit_descriptor(param, scope, shape);
        }

        let kind = if desc.params.is_empty() {
            ProbeKind::Type
        } else {
            ProbeKind::Template
        };
        if let Some(hint) = &desc.hint {
            if parse_integral_literal(hint).is_none() {
                self.probe(scope, shape, hint, kind);
            }
            return;
        }

        let key = (desc.lang_type.clone(), scope.to_string(), kind);
        if self.plan.bindings.contains_key(&key) {
            return;
        }
        let Some(typemap) = self.tree.typemap(&desc.lang_type) else {
            return;
        };
        let candidates = typemap.candidates.clone();
        let aliases = candidates
            .iter()
            .map(|candidate| self.probe(scope, shape, candidate, kind))
            .collect();
        self.plan.bindings.insert(key, aliases);
    }

    fn probe(&mut self, scope: &str, shape: ScopeShape, spelling: &str, kind: ProbeKind) -> String {
        let key = (scope.to_string(), spelling.to_string());
        let existing = match kind {
            ProbeKind::Type => self.plan.types.get(&key),
            ProbeKind::Template => self.plan.templates.get(&key),
        };
        if let Some(alias) = existing {
            return alias.clone();
        }

        let index = self.plan.source.probes.len();
        let alias = match kind {
            ProbeKind::Type => format!("probe_type_{}", index),
            ProbeKind::Template => format!("probe_template_{}", index),
        };
        self.plan.source.probes.push(Probe {
            alias: alias.clone(),
            scope: scope.to_string(),
            spelling: spelling.to_string(),
            kind,
        });
        match kind {
            ProbeKind::Type => self.plan.types.insert(key, alias.clone()),
            ProbeKind::Template => self.plan.templates.insert(key, alias.clone()),
        };

        let slot = match self.scope_index.get(scope) {
            Some(slot) => *slot,
            None => {
                self.scopes.push(ProbeScope {
                    written: scope.to_string(),
                    shape,
                    probes: Vec::new(),
                });
                self.scope_index
                    .insert(scope.to_string(), self.scopes.len() - 1);
                self.scopes.len() - 1
            }
        };
        self.scopes[slot].probes.push(index);
        alias
    }

    fn render(&mut self, config: &MatchConfig) {
        let mut includes = Vec::new();
        if !self.tree.source_file.is_empty() {
            includes.push(self.tree.source_file.clone());
        }
        includes.extend(self.tree.includes.iter().cloned());

        let mut lines: Vec<String> = includes
            .iter()
            .map(|include| format!("#include \"{}\"", include))
            .collect();
        lines.push(String::new());
        lines.push(format!("namespace {} {{", config.probe_namespace));
        for (n, scope) in self.scopes.iter().enumerate() {
            let (open, close) = match (scope.shape, scope.written.is_empty()) {
                (_, true) => (format!("namespace probe_scope_{} {{", n), "}"),
                (ScopeShape::Namespace, false) => (
                    format!(
                        "namespace probe_scope_{} {{\nusing namespace {};",
                        n, scope.written
                    ),
                    "}",
                ),
                (ScopeShape::Class, false) => (
                    format!("struct probe_scope_{} : {} {{", n, scope.written),
                    "};",
                ),
            };
            lines.push(open);
            for &index in &scope.probes {
                let probe = &self.plan.source.probes[index];
                lines.push(match probe.kind {
                    ProbeKind::Type => format!("typedef {} {};", probe.spelling, probe.alias),
                    ProbeKind::Template => format!(
                        "template <typename... A> using {} = {}<A...>;",
                        probe.alias, probe.spelling
                    ),
                });
            }
            lines.push(close.to_string());
        }
        for ((lang_type, scope, kind), aliases) in &self.plan.bindings {
            let scope = if scope.is_empty() { "::" } else { scope };
            let shape = match kind {
                ProbeKind::Type => "type",
                ProbeKind::Template => "template",
            };
            lines.push(format!(
                "// binding {} @ {} ({}): {}",
                lang_type,
                scope,
                shape,
                aliases.join(", ")
            ));
        }
        lines.push(format!("}}  // namespace {}", config.probe_namespace));

        let mut text = lines.join("\n");
        text.push('\n');
        self.plan.source.text = text;
        self.plan.source.includes = includes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(json: &str) -> DeclTree {
        DeclTree::from_json(json).unwrap()
    }

    #[test]
    fn test_probe_emits_one_binding_per_symbolic_type_and_scope() {
        let tree = tree(
            r#"{
            "source_file": "test.h",
            "typemaps": [{"lang_type": "int", "candidates": ["int", "long", "short"]}],
            "decls": [
                {"decl": "func", "name": "A", "params": [
                    {"name": "x", "type": {"lang_type": "int"}},
                    {"name": "y", "type": {"lang_type": "int"}}]},
                {"decl": "func", "name": "B", "returns": [{"type": {"lang_type": "int"}}]}
            ]
        }"#,
        );
        let plan = compose(&tree, &MatchConfig::default());
        assert_eq!(plan.binding_count("int", ""), 1);
        assert_eq!(plan.binding("int", "", ProbeKind::Type).unwrap().len(), 3);
        assert!(plan.binding("int", "", ProbeKind::Template).is_none());
        assert_eq!(plan.source().probes.len(), 3);
        assert_eq!(plan.type_alias("", "long"), Some("probe_type_1"));
    }

    #[test]
    fn test_probe_scopes_follow_namespace_and_class() {
        let tree = tree(
            r#"{
            "decls": [
                {"decl": "class", "name": "Klass", "namespace": "ns", "members": [
                    {"decl": "var", "name": "v", "type": {"lang_type": "int", "hint": "Inner"}}]},
                {"decl": "var", "name": "w", "namespace": "ns",
                 "type": {"lang_type": "int", "hint": "Inner"}}
            ]
        }"#,
        );
        let plan = compose(&tree, &MatchConfig::default());
        assert_eq!(plan.type_alias("::ns::Klass", "Inner"), Some("probe_type_0"));
        assert_eq!(plan.type_alias("::ns", "Inner"), Some("probe_type_1"));
        let text = &plan.source().text;
        assert!(text.contains("struct probe_scope_0 : ::ns::Klass {"));
        assert!(text.contains("using namespace ::ns;"));
    }

    #[test]
    fn test_probe_templates_and_integer_arguments() {
        let tree = tree(
            r#"{
            "decls": [
                {"decl": "var", "name": "v", "type": {"lang_type": "list", "hint": "Fixed",
                 "params": [{"lang_type": "int", "hint": "3"}, {"lang_type": "int", "hint": "int"}]}}
            ]
        }"#,
        );
        let plan = compose(&tree, &MatchConfig::default());
        assert_eq!(plan.source().probes.len(), 2);
        assert!(plan.type_alias("", "3").is_none());
        assert!(plan.template_alias("", "Fixed").is_some());
        assert!(plan
            .source()
            .text
            .contains("using probe_template_1 = Fixed<A...>;"));
    }

    #[test]
    fn test_probe_specialized_class_name() {
        let tree = tree(
            r#"{"source_file": "box.h", "decls": [{"decl": "class", "name": "Box<int>", "members": []}]}"#,
        );
        let plan = compose(&tree, &MatchConfig::default());
        assert_eq!(plan.type_alias("", "Box<int>"), Some("probe_type_0"));
        assert!(plan.source().text.starts_with("#include \"box.h\""));
        assert_eq!(plan.source().includes, vec!["box.h"]);
    }

    #[test]
    fn test_probe_binds_bare_and_templated_uses_separately() {
        let tree = tree(
            r#"{
            "typemaps": [{"lang_type": "obj", "candidates": ["::Plain", "::Box"]}],
            "decls": [
                {"decl": "var", "name": "a", "type": {"lang_type": "obj"}},
                {"decl": "var", "name": "b", "type": {"lang_type": "obj",
                 "params": [{"lang_type": "int", "hint": "int"}]}},
                {"decl": "var", "name": "c", "type": {"lang_type": "obj"}}
            ]
        }"#,
        );
        let plan = compose(&tree, &MatchConfig::default());
        assert_eq!(plan.binding_count("obj", ""), 2);
        assert_eq!(plan.binding("obj", "", ProbeKind::Type).unwrap().len(), 2);
        assert_eq!(plan.binding("obj", "", ProbeKind::Template).unwrap().len(), 2);
        assert!(plan.type_alias("", "::Box").is_some());
        assert!(plan.template_alias("", "::Box").is_some());
        let text = &plan.source().text;
        assert!(text.contains("// binding obj @ :: (type): "));
        assert!(text.contains("// binding obj @ :: (template): "));
    }
}
