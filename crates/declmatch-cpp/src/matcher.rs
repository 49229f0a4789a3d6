//! The decl matcher.
//!
//! Walks a decl tree depth-first against one compiled oracle and writes the
//! outcome into every node: resolved fields and `Matched`, or the node's
//! pre-attempt state and `Failed(diagnostic)`.
//!
//! ```text
//! compose probes -> Oracle::compile (once) -> MatchContext
//!     for each top-level node:
//!         namespace frame -> identity (lookup, overloads, types)
//!                         -> file constraint
//!                         -> class members in the class frame
//! ```
//!
//! A member's failure never touches its class or siblings. A class whose own
//! identity fails takes all of its members down with it.

use tracing::{debug, warn};

use declmatch_core::names;
use declmatch_core::{
    Builtin, ClassDecl, ClassNode, ConstNode, DeclKind, DeclNode, DeclTree, Diagnostic,
    DiagnosticKind, EnumMember, EnumNode, FuncNode, MatchConfig, MatchError, MatchReport,
    MatchStatus, NativeDecl, NativeType, OpaqueTypeNode, Oracle, SourceLocation, VarNode,
};

use crate::bases;
use crate::compat::{self, match_descriptor, Bindings, Mismatch, Role};
use crate::context::{Frame, MatchContext};
use crate::files;
use crate::lookup;
use crate::overload;
use crate::probe::{self, ProbePlan};

/// Detail given to the members of a class that failed to match.
pub const ENCLOSING_CLASS_FAILED: &str = "enclosing class was not matched";

/// What a node matched, before its file constraint is checked.
enum Identity {
    Leaf(SourceLocation),
    Class(ClassDecl),
}

impl Identity {
    fn location(&self) -> &SourceLocation {
        match self {
            Identity::Leaf(location) => location,
            Identity::Class(decl) => &decl.location,
        }
    }
}

/// Matches decl trees against one oracle.
pub struct DeclMatcher<'a> {
    oracle: &'a dyn Oracle,
    config: &'a MatchConfig,
}

impl<'a> DeclMatcher<'a> {
    pub fn new(oracle: &'a dyn Oracle, config: &'a MatchConfig) -> Self {
        Self { oracle, config }
    }

    /// The synthetic probes a pass over `tree` compiles.
    pub fn compose(&self, tree: &DeclTree) -> ProbePlan {
        probe::compose(tree, self.config)
    }

    /// Run one pass over `tree`, mutating it in place.
    ///
    /// Only a failure of the single compile step is an error; every node
    /// outcome is recorded on the node.
    pub fn run(&self, tree: &mut DeclTree) -> Result<MatchReport, MatchError> {
        let plan = self.compose(tree);
        let snapshot = self
            .oracle
            .compile(plan.source())
            .inspect_err(|e| warn!("{} rejected the synthetic source: {}", self.oracle.name(), e))?;
        debug!(
            "{} compiled {} probes",
            self.oracle.name(),
            plan.source().probes.len()
        );

        let mut ctx = MatchContext::new(self.oracle, self.config, snapshot, plan, tree);
        for node in &mut tree.decls {
            match_top(&mut ctx, node);
        }
        let report = tree.report();
        debug!(
            "pass finished: {} matched, {} failed",
            report.matched, report.failed
        );
        Ok(report)
    }
}

fn match_top(ctx: &mut MatchContext<'_>, node: &mut DeclNode) {
    let Some(namespace) = node.namespace.clone() else {
        match_node(ctx, node, true);
        return;
    };
    match lookup::find_namespace(ctx, &namespace) {
        Some(resolved) => {
            let frame = Frame::namespace(resolved, names::qualify("", &namespace));
            ctx.with_scope(frame, |ctx| match_node(ctx, node, true));
        }
        None => {
            let diagnostic = Diagnostic::not_found(
                node.name().name.clone(),
                format!("namespace \"{}\" is not declared", namespace),
            );
            fail(node, diagnostic);
        }
    }
}

fn required_file(ctx: &MatchContext<'_>, node: &DeclNode, top_level: bool) -> Option<String> {
    node.required_file.clone().or_else(|| {
        (top_level && ctx.config.enforce_root_file && !ctx.root_file().is_empty())
            .then(|| ctx.root_file().to_string())
    })
}

fn match_node(ctx: &mut MatchContext<'_>, node: &mut DeclNode, top_level: bool) {
    let pristine = node.clone();
    let subject = node.name().name.clone();
    let scope = ctx.frame().resolved.clone();
    let required = required_file(ctx, node, top_level);
    debug!("matching {} \"{}\" in \"{}\"", node.kind_name(), subject, scope);

    let outcome = match &mut node.kind {
        DeclKind::Func(func) => match_func(ctx, func),
        DeclKind::Class(class) => match_class(ctx, class),
        DeclKind::Enum(e) => match_enum(ctx, e),
        DeclKind::Var(var) => match_var(ctx, var),
        DeclKind::Const(constant) => match_const(ctx, constant),
        DeclKind::OpaqueType(opaque) => match_opaque(ctx, opaque),
    };
    let mut found_in = None;
    let outcome = outcome.and_then(|identity| {
        let location = identity.location();
        found_in = Some(location.file.clone());
        match &required {
            Some(required) => files::check_location(required, location, &ctx.config.aux_suffix)
                .map(|()| identity)
                .map_err(|detail| Mismatch::new(DiagnosticKind::FileConstraintViolation, detail)),
            None => Ok(identity),
        }
    });

    match outcome {
        Ok(identity) => {
            debug!("matched \"{}\" as {}", subject, node.name().qualified);
            node.status = MatchStatus::Matched;
            if let (Identity::Class(decl), DeclKind::Class(class)) = (identity, &mut node.kind) {
                let frame = Frame::class(decl, names::qualify(&ctx.frame().probe, &class.name.name));
                ctx.with_scope(frame, |ctx| {
                    for member in &mut class.members {
                        match_node(ctx, member, false);
                    }
                });
            }
        }
        Err(mismatch) => {
            debug!("\"{}\" failed: {}", subject, mismatch.detail);
            *node = pristine;
            let is_file_violation = mismatch.kind == DiagnosticKind::FileConstraintViolation;
            let mut diagnostic = mismatch.into_diagnostic(subject).in_scope(scope);
            if let (true, Some(file)) = (is_file_violation, found_in) {
                diagnostic = diagnostic.in_file(file);
            }
            fail(node, diagnostic);
        }
    }
}

/// Record a failure on `node`; members of a failed class fail with it.
fn fail(node: &mut DeclNode, diagnostic: Diagnostic) {
    node.status = MatchStatus::Failed(diagnostic);
    if let DeclKind::Class(class) = &mut node.kind {
        for member in &mut class.members {
            let diagnostic =
                Diagnostic::not_found(member.name().name.clone(), ENCLOSING_CLASS_FAILED)
                    .in_scope(class.name.name.clone());
            fail(member, diagnostic);
        }
    }
}

// ============================================================================
// Per-Kind Matching
// ============================================================================

fn match_func(ctx: &mut MatchContext<'_>, func: &mut FuncNode) -> Result<Identity, Mismatch> {
    let resolution = overload::resolve_function(ctx, func)?;
    overload::apply_resolution(func, &resolution);
    Ok(Identity::Leaf(resolution.decl.location.clone()))
}

fn match_class(ctx: &mut MatchContext<'_>, class: &mut ClassNode) -> Result<Identity, Mismatch> {
    let decl = lookup::find_class(ctx, &class.name.name)?;
    if class.is_final && !decl.is_final {
        return Err(Mismatch::structural(format!(
            "expects \"{}\" to be declared final",
            decl.qualified_name
        )));
    }
    let bases = bases::resolve_bases(ctx.oracle, &decl)
        .map_err(|e| Mismatch::structural(e.to_string()).with_note(&e.context()))?;

    class.name.qualified = decl.qualified_name.clone();
    class.is_final = decl.is_final;
    class.bases = bases;
    class.traits = Some(decl.traits);
    Ok(Identity::Class(decl))
}

fn match_enum(ctx: &mut MatchContext<'_>, e: &mut EnumNode) -> Result<Identity, Mismatch> {
    let NativeDecl::Enum(decl) =
        lookup::find_decl(ctx, &e.name.name, |d| matches!(d, NativeDecl::Enum(_)))?
    else {
        return Err(Mismatch::type_mismatch("not a native enum"));
    };

    let extra: Vec<&str> = e
        .members
        .iter()
        .filter(|m| !decl.enumerators.contains(&m.name))
        .map(|m| m.name.as_str())
        .collect();
    if !extra.is_empty() {
        return Err(Mismatch::not_found(format!(
            "Extra enumerators in enum declaration {}. native enum {} does not contain enumerator(s): {}",
            e.name.name,
            decl.qualified_name,
            extra.join(", ")
        )));
    }

    for member in &mut e.members {
        member.qualified = decl.qualify_enumerator(&member.name);
    }
    for enumerator in &decl.enumerators {
        if !e.members.iter().any(|m| &m.name == enumerator) {
            e.members.push(EnumMember {
                name: enumerator.clone(),
                alias: None,
                qualified: decl.qualify_enumerator(enumerator),
            });
        }
    }
    e.scoped = decl.scoped;
    e.name.qualified = decl.qualified_name.clone();
    Ok(Identity::Leaf(decl.location))
}

fn match_var(ctx: &mut MatchContext<'_>, var: &mut VarNode) -> Result<Identity, Mismatch> {
    let NativeDecl::Var(decl) =
        lookup::find_decl(ctx, &var.name.name, |d| matches!(d, NativeDecl::Var(_)))?
    else {
        return Err(Mismatch::type_mismatch("not a native variable"));
    };
    let matched = match_descriptor(ctx, &var.ty, &decl.ty, Role::Value, &mut Bindings::new())?;
    compat::apply(&mut var.ty, &matched);
    var.name.qualified = decl.qualified_name;
    Ok(Identity::Leaf(decl.location))
}

fn match_const(ctx: &mut MatchContext<'_>, constant: &mut ConstNode) -> Result<Identity, Mismatch> {
    let decl = lookup::find_decl(ctx, &constant.name.name, |d| {
        matches!(d, NativeDecl::Var(_) | NativeDecl::Enumerator(_))
    })?;
    let (target, qualified, location) = match decl {
        NativeDecl::Var(var) => {
            if !var.is_constant() {
                return Err(Mismatch::structural(format!(
                    "\"{}\" is not a constant",
                    var.qualified_name
                )));
            }
            (var.ty, var.qualified_name, var.location)
        }
        NativeDecl::Enumerator(enumerator) => {
            let target = if enumerator.scoped {
                NativeType::enumeration(enumerator.enum_name.clone(), true)
            } else {
                NativeType::builtin(Builtin::Int)
            };
            (target, enumerator.qualified_name, enumerator.location)
        }
        other => {
            return Err(Mismatch::type_mismatch(format!(
                "name matched \"{}\" which is a native {}",
                other.qualified_name(),
                other.kind_name()
            )))
        }
    };
    let matched = match_descriptor(ctx, &constant.ty, &target, Role::Value, &mut Bindings::new())?;
    compat::apply(&mut constant.ty, &matched);
    constant.name.qualified = qualified;
    Ok(Identity::Leaf(location))
}

fn match_opaque(ctx: &mut MatchContext<'_>, opaque: &mut OpaqueTypeNode) -> Result<Identity, Mismatch> {
    if opaque.name.name.contains('<') {
        let decl = lookup::find_class(ctx, &opaque.name.name)?;
        opaque.name.qualified = decl.qualified_name.clone();
        return Ok(Identity::Leaf(decl.location));
    }
    let decl = lookup::find_decl(ctx, &opaque.name.name, |d| {
        matches!(
            d,
            NativeDecl::Class(_) | NativeDecl::Enum(_) | NativeDecl::Typedef(_)
        )
    })?;
    opaque.name.qualified = decl.qualified_name().to_string();
    Ok(Identity::Leaf(decl.location().cloned().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureOracle;

    const FIXTURE: &str = r#"{
        "file": "shapes.h",
        "decls": [
            {"kind": "namespace", "name": "::geo"},
            {"kind": "class", "name": "::geo::Shape", "line": 3},
            {"kind": "function", "name": "::geo::Shape::Area", "returns": "double", "const": true, "virtual": true},
            {"kind": "class", "name": "::geo::Circle", "bases": [{"name": "Shape"}], "final": true, "line": 9},
            {"kind": "function", "name": "::geo::Circle::Circle", "params": [{"name": "r", "type": "double"}]},
            {"kind": "enum", "name": "::geo::Kind", "enumerators": ["Round", "Square"], "scoped": true},
            {"kind": "enum", "name": "::geo::Flag", "enumerators": ["kOn", "kOff"]},
            {"kind": "var", "name": "::geo::kPi", "type": "const double", "constexpr": true},
            {"kind": "var", "name": "::geo::gCount", "type": "int"},
            {"kind": "typedef", "name": "::geo::Handle", "target": "Shape *"}
        ]
    }"#;

    fn run(tree: &str) -> DeclTree {
        let oracle = FixtureOracle::from_json(FIXTURE).unwrap();
        let config = MatchConfig::default();
        let mut tree = DeclTree::from_json(tree).unwrap();
        DeclMatcher::new(&oracle, &config).run(&mut tree).unwrap();
        tree
    }

    fn diagnostic(node: &DeclNode) -> &Diagnostic {
        node.diagnostic().unwrap_or_else(|| panic!("{} matched", node.name().name))
    }

    #[test]
    fn test_matcher_class_with_members_and_bases() {
        let tree = run(r#"{
            "decls": [{"decl": "class", "name": "Circle", "namespace": "geo", "final": true,
                "members": [
                    {"decl": "func", "name": "Circle", "constructor": true,
                     "params": [{"name": "r", "type": {"lang_type": "float", "hint": "double"}}]},
                    {"decl": "func", "name": "Area",
                     "returns": [{"name": "", "type": {"lang_type": "float", "hint": "double"}}]},
                    {"decl": "func", "name": "Missing"}
                ]}]
        }"#);
        let class = &tree.decls[0];
        assert!(class.is_matched());
        let DeclKind::Class(node) = &class.kind else {
            panic!("expected class");
        };
        assert_eq!(node.name.qualified, "::geo::Circle");
        assert_eq!(node.bases[0].qualified, "::geo::Shape");
        assert!(node.traits.is_some());

        assert!(node.members[0].is_matched());
        let DeclKind::Func(area) = &node.members[1].kind else {
            panic!("expected func");
        };
        assert_eq!(area.name.qualified, "::geo::Shape::Area");
        assert!(area.flags.const_method);

        let missing = diagnostic(&node.members[2]);
        assert_eq!(missing.kind, DiagnosticKind::NotFound);
        assert_eq!(missing.scope, "::geo::Circle");
    }

    #[test]
    fn test_matcher_failed_class_fails_members() {
        let tree = run(r#"{
            "decls": [{"decl": "class", "name": "Shape", "namespace": "geo", "final": true,
                "members": [{"decl": "func", "name": "Area"}]}]
        }"#);
        let class = diagnostic(&tree.decls[0]);
        assert_eq!(class.kind, DiagnosticKind::StructuralViolation);
        let member = diagnostic(&tree.decls[0].children()[0]);
        assert_eq!(member.detail, ENCLOSING_CLASS_FAILED);
    }

    #[test]
    fn test_matcher_enum_appends_missing_enumerators() {
        let tree = run(r#"{
            "decls": [
                {"decl": "enum", "name": "Kind", "namespace": "geo", "members": [{"name": "Round"}]},
                {"decl": "enum", "name": "Flag", "namespace": "geo", "members": [{"name": "kMaybe"}]}
            ]
        }"#);
        let DeclKind::Enum(kind) = &tree.decls[0].kind else {
            panic!("expected enum");
        };
        assert!(kind.scoped);
        let qualified: Vec<&str> = kind.members.iter().map(|m| m.qualified.as_str()).collect();
        assert_eq!(qualified, vec!["::geo::Kind::Round", "::geo::Kind::Square"]);

        let extra = diagnostic(&tree.decls[1]);
        assert!(extra.detail.starts_with("Extra enumerators in enum declaration Flag."));
        assert!(extra.detail.ends_with("kMaybe"));
    }

    #[test]
    fn test_matcher_var_const_and_opaque() {
        let tree = run(r#"{
            "decls": [
                {"decl": "var", "name": "gCount", "namespace": "geo", "type": {"lang_type": "int", "hint": "int"}},
                {"decl": "const", "name": "kPi", "namespace": "geo", "type": {"lang_type": "float", "hint": "double"}},
                {"decl": "const", "name": "gCount", "namespace": "geo", "type": {"lang_type": "int", "hint": "int"}},
                {"decl": "const", "name": "kOn", "namespace": "geo", "type": {"lang_type": "int", "hint": "int"}},
                {"decl": "opaque_type", "name": "Handle", "namespace": "geo"},
                {"decl": "opaque_type", "name": "kPi", "namespace": "geo"}
            ]
        }"#);
        assert!(tree.decls[0].is_matched());
        assert!(tree.decls[1].is_matched());
        let not_constant = diagnostic(&tree.decls[2]);
        assert_eq!(not_constant.kind, DiagnosticKind::StructuralViolation);
        assert_eq!(not_constant.detail, "\"::geo::gCount\" is not a constant");
        assert!(tree.decls[3].is_matched());
        assert_eq!(tree.decls[4].name().qualified, "::geo::Handle");
        assert_eq!(diagnostic(&tree.decls[5]).kind, DiagnosticKind::TypeMismatch);
    }

    #[test]
    fn test_matcher_file_constraint() {
        let tree = run(r#"{
            "decls": [
                {"decl": "opaque_type", "name": "Shape", "namespace": "geo", "required_file": "shapes.h"},
                {"decl": "opaque_type", "name": "Circle", "namespace": "geo", "required_file": "other.h"}
            ]
        }"#);
        assert!(tree.decls[0].is_matched());
        let violation = diagnostic(&tree.decls[1]);
        assert_eq!(violation.kind, DiagnosticKind::FileConstraintViolation);
        assert_eq!(violation.file.as_deref(), Some("shapes.h"));
        assert_eq!(
            violation.detail,
            "expects it in the file other.h but found it at shapes.h:9"
        );
    }

    #[test]
    fn test_matcher_unknown_namespace() {
        let tree = run(r#"{"decls": [{"decl": "var", "name": "x", "namespace": "nowhere",
            "type": {"lang_type": "int", "hint": "int"}}]}"#);
        let diag = diagnostic(&tree.decls[0]);
        assert_eq!(diag.kind, DiagnosticKind::NotFound);
        assert!(diag.detail.contains("nowhere"));
    }

    #[test]
    fn test_matcher_failed_node_keeps_input_fields() {
        let tree = run(r#"{"decls": [{"decl": "var", "name": "kPi", "namespace": "geo",
            "type": {"lang_type": "int", "hint": "bool"}}]}"#);
        let DeclKind::Var(var) = &tree.decls[0].kind else {
            panic!("expected var");
        };
        assert!(var.name.qualified.is_empty());
        assert!(var.ty.resolved.is_empty());
        assert_eq!(var.ty.hint.as_deref(), Some("bool"));
    }
}
