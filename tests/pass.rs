//! End-to-end matching passes over on-disk fixtures.
//!
//! Each test writes a fixture, a decl tree and optionally a config into a
//! temporary directory and runs [`declmatch::run_pass`] over them.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use declmatch::{
    run_pass, DeclKind, DeclNode, DeclTree, Diagnostic, DiagnosticKind, FuncNode, MatchError,
    MatchReport, OutputErrorCode, ProbeKind,
};

// ============================================================================
// Test Infrastructure
// ============================================================================

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn run(&self, fixture: &str, tree: &str) -> (DeclTree, MatchReport) {
        self.run_with_config(fixture, tree, None)
    }

    fn run_with_config(
        &self,
        fixture: &str,
        tree: &str,
        config: Option<&str>,
    ) -> (DeclTree, MatchReport) {
        let oracle = self.write("fixture.json", fixture);
        let decls = self.write("decls.json", tree);
        let config = config.map(|c| self.write("declmatch.toml", c));
        run_pass(&oracle, &decls, config.as_deref()).unwrap()
    }
}

fn func(node: &DeclNode) -> &FuncNode {
    match &node.kind {
        DeclKind::Func(func) => func,
        other => panic!("expected a function, got {:?}", other),
    }
}

fn diagnostic(node: &DeclNode) -> &Diagnostic {
    node.diagnostic()
        .unwrap_or_else(|| panic!("\"{}\" unexpectedly matched", node.name().name))
}

const FUNCTIONS: &str = r#"{
    "file": "api.h",
    "decls": [
        {"kind": "function", "name": "::Foo", "line": 4,
         "params": [{"name": "a", "type": "int"}, {"name": "b", "type": "int", "default": "0"}]},
        {"kind": "function", "name": "::GetConst", "params": [{"name": "out", "type": "const int *"}]},
        {"kind": "function", "name": "::Fill", "params": [{"name": "out", "type": "int *"}]}
    ]
}"#;

fn foo_with_inputs(count: usize) -> String {
    let params: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"name": "p{}", "type": {{"lang_type": "int", "hint": "int"}}}}"#, i))
        .collect();
    format!(
        r#"{{"source_file": "api.h", "decls": [{{"decl": "func", "name": "Foo", "params": [{}]}}]}}"#,
        params.join(", ")
    )
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_pass_default_value_is_surfaced() {
    let ws = Workspace::new();
    let (tree, report) = ws.run(
        FUNCTIONS,
        r#"{"source_file": "api.h", "decls": [{"decl": "func", "name": "Foo", "alias": "foo",
            "params": [
                {"name": "a", "type": {"lang_type": "int", "hint": "int"}},
                {"name": "b", "type": {"lang_type": "int", "hint": "int"}, "default_value": "default"}
            ]}]}"#,
    );
    assert!(report.all_matched());
    assert_eq!(report.matched, 1);
    let foo = func(&tree.decls[0]);
    assert_eq!(foo.name.qualified, "::Foo");
    assert_eq!(foo.params[1].default_value.as_deref(), Some("0"));
    assert_eq!(foo.params[0].ty.resolved, "int");
    assert!(foo.flags.void_return);
}

#[test]
fn test_pass_arity_window() {
    let outcomes: Vec<bool> = (0..4)
        .map(|n| {
            let ws = Workspace::new();
            let (tree, _) = ws.run(FUNCTIONS, &foo_with_inputs(n));
            tree.decls[0].is_matched()
        })
        .collect();
    assert_eq!(outcomes, vec![false, true, true, false]);
}

#[test]
fn test_pass_const_output_parameter_fails() {
    let ws = Workspace::new();
    let (tree, report) = ws.run(
        FUNCTIONS,
        r#"{"decls": [
            {"decl": "func", "name": "GetConst", "returns": [{"name": "out", "type": {"lang_type": "int", "hint": "int"}}]},
            {"decl": "func", "name": "Fill", "returns": [{"name": "out", "type": {"lang_type": "int", "hint": "int"}}]}
        ]}"#,
    );
    assert_eq!(report.failed, 1);
    let failed = diagnostic(&tree.decls[0]);
    assert_eq!(failed.kind, DiagnosticKind::StructuralViolation);
    assert!(failed.detail.contains("Output parameter is constant."));
    // A failed node keeps none of the results of its attempt.
    assert!(func(&tree.decls[0]).name.qualified.is_empty());

    let fill = func(&tree.decls[1]);
    assert!(tree.decls[1].is_matched());
    assert!(fill.returns[0].output_param);
    assert_eq!(report.diagnostics[0].path, "GetConst");
}

#[test]
fn test_pass_operator_function_with_receiver() {
    let ws = Workspace::new();
    let (tree, report) = ws.run(
        r#"{"decls": [
            {"kind": "class", "name": "::Vec"},
            {"kind": "function", "name": "::operator==",
             "params": [{"name": "lhs", "type": "const Vec &"}, {"name": "rhs", "type": "const Vec &"}],
             "returns": "bool"}
        ]}"#,
        r#"{"decls": [{"decl": "class", "name": "Vec", "members": [
            {"decl": "func", "name": "operator==",
             "params": [{"name": "other", "type": {"lang_type": "Vec", "hint": "::Vec"}}],
             "returns": [{"type": {"lang_type": "bool", "hint": "bool"}}]}
        ]}]}"#,
    );
    assert!(report.all_matched(), "{:?}", report.diagnostics);
    let DeclKind::Class(class) = &tree.decls[0].kind else {
        panic!("expected a class");
    };
    let op = func(&class.members[0]);
    assert_eq!(op.name.qualified, "::operator==");
    assert!(op.flags.operator_function);
    assert!(!op.flags.void_return);
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_pass_copy_constructor_through_conversion_needs_explicit() {
    let ws = Workspace::new();
    let (tree, report) = ws.run(
        r#"{"decls": [
            {"kind": "class", "name": "::Meters"},
            {"kind": "function", "name": "::Meters::Meters", "params": [{"name": "other", "type": "const Meters &"}]},
            {"kind": "class", "name": "::Feet"},
            {"kind": "function", "name": "::Feet::operator Meters", "returns": "Meters", "const": true}
        ]}"#,
        r#"{"decls": [{"decl": "class", "name": "Meters", "members": [
            {"decl": "func", "name": "Meters", "constructor": true,
             "params": [{"name": "feet", "type": {"lang_type": "Feet", "hint": "::Feet"}}]}
        ]}]}"#,
    );
    assert!(tree.decls[0].is_matched());
    assert_eq!(report.failed, 1);
    let ctor = diagnostic(&tree.decls[0].children()[0]);
    assert_eq!(ctor.kind, DiagnosticKind::StructuralViolation);
    assert_eq!(
        ctor.detail,
        "Is the keyword \"explicit\" missing in the native definition of constructors?"
    );
}

const DIAMONDS: &str = r#"{
    "file": "shapes.h",
    "decls": [
        {"kind": "class", "name": "::Base"},
        {"kind": "class", "name": "::Left", "bases": [{"name": "Base", "virtual": true}]},
        {"kind": "class", "name": "::Right", "bases": [{"name": "Base", "virtual": true}]},
        {"kind": "class", "name": "::Joined", "bases": [{"name": "Left"}, {"name": "Right"}]},
        {"kind": "class", "name": "::PlainLeft", "bases": [{"name": "Base"}]},
        {"kind": "class", "name": "::PlainRight", "bases": [{"name": "Base"}]},
        {"kind": "class", "name": "::Broken", "bases": [{"name": "PlainLeft"}, {"name": "PlainRight"}]},
        {"kind": "function", "name": "::Broken::Size", "returns": "int"}
    ]
}"#;

#[test]
fn test_pass_virtual_diamond_matches() {
    let ws = Workspace::new();
    let (tree, report) = ws.run(DIAMONDS, r#"{"decls": [{"decl": "class", "name": "Joined"}]}"#);
    assert!(report.all_matched());
    let DeclKind::Class(class) = &tree.decls[0].kind else {
        panic!("expected a class");
    };
    let bases: Vec<&str> = class.bases.iter().map(|b| b.qualified.as_str()).collect();
    assert_eq!(bases, vec!["::Left", "::Base", "::Right"]);
}

#[test]
fn test_pass_non_virtual_diamond_fails_with_members() {
    let ws = Workspace::new();
    let (tree, report) = ws.run(
        DIAMONDS,
        r#"{"decls": [{"decl": "class", "name": "Broken",
            "members": [{"decl": "func", "name": "Size"}]}]}"#,
    );
    assert_eq!(report.failed, 2);
    let class = diagnostic(&tree.decls[0]);
    assert_eq!(class.kind, DiagnosticKind::StructuralViolation);
    assert!(class.detail.starts_with("Non-virtual diamond inheritance."));
    let member = diagnostic(&tree.decls[0].children()[0]);
    assert_eq!(member.kind, DiagnosticKind::NotFound);
}

// ============================================================================
// Type maps
// ============================================================================

#[test]
fn test_pass_typemap_probes_once_and_skips_failing_candidates() {
    let ws = Workspace::new();
    let tree_json = r#"{"typemaps": [{"lang_type": "handle", "candidates": ["::A", "::B"]}],
        "decls": [
            {"decl": "var", "name": "first", "type": {"lang_type": "handle"}},
            {"decl": "var", "name": "second", "type": {"lang_type": "handle"}}
        ]}"#;
    let tree = DeclTree::from_json(tree_json).unwrap();
    let plan = declmatch::DeclMatcher::new(
        &declmatch::FixtureOracle::default(),
        &declmatch::MatchConfig::default(),
    )
    .compose(&tree);
    assert_eq!(plan.binding_count("handle", ""), 1);
    assert_eq!(
        plan.binding("handle", "", ProbeKind::Type).map(|b| b.len()),
        Some(2)
    );

    let (tree, report) = ws.run(
        r#"{"decls": [
            {"kind": "class", "name": "::B"},
            {"kind": "var", "name": "::first", "type": "B"},
            {"kind": "var", "name": "::second", "type": "B"}
        ]}"#,
        tree_json,
    );
    assert!(report.all_matched(), "{:?}", report.diagnostics);
    for node in &tree.decls {
        let DeclKind::Var(var) = &node.kind else {
            panic!("expected a variable");
        };
        assert!(var.ty.resolved.ends_with('B'), "resolved {}", var.ty.resolved);
    }
}

const BOXES: &str = r#"{"decls": [
    {"kind": "class", "name": "::Plain"},
    {"kind": "class", "name": "::Box", "template_params": ["T"]},
    {"kind": "var", "name": "::a", "type": "Plain"},
    {"kind": "var", "name": "::b", "type": "Box<int>"}
]}"#;

fn boxes_tree(order: [&str; 2]) -> String {
    let decl = |name: &str| match name {
        "a" => r#"{"decl": "var", "name": "a", "type": {"lang_type": "obj"}}"#.to_string(),
        _ => r#"{"decl": "var", "name": "b", "type": {"lang_type": "obj",
                 "params": [{"lang_type": "int", "hint": "int"}]}}"#
            .to_string(),
    };
    format!(
        r#"{{"typemaps": [{{"lang_type": "obj", "candidates": ["::Plain", "::Box"]}}],
            "decls": [{}, {}]}}"#,
        decl(order[0]),
        decl(order[1])
    )
}

#[test]
fn test_pass_typemap_bare_and_templated_uses_in_one_scope() {
    for order in [["a", "b"], ["b", "a"]] {
        let ws = Workspace::new();
        let (tree, report) = ws.run(BOXES, &boxes_tree(order));
        assert!(report.all_matched(), "{:?}: {:?}", order, report.diagnostics);
        for node in &tree.decls {
            let DeclKind::Var(var) = &node.kind else {
                panic!("expected a variable");
            };
            let expected = if node.name().name == "a" { "Plain" } else { "Box" };
            assert!(
                var.ty.resolved.contains(expected),
                "{} resolved to {}",
                node.name().name,
                var.ty.resolved
            );
        }
    }
}

// ============================================================================
// Whole-pass properties
// ============================================================================

#[test]
fn test_pass_is_idempotent() {
    let ws = Workspace::new();
    let (first, first_report) = ws.run(FUNCTIONS, &foo_with_inputs(2));
    let first_json = first.to_json_pretty().unwrap();

    let (second, second_report) = ws.run(FUNCTIONS, &first_json);
    assert_eq!(first_report, second_report);
    assert_eq!(second.to_json_pretty().unwrap(), first_json);
}

#[test]
fn test_pass_annotated_tree_round_trips_through_json() {
    let ws = Workspace::new();
    let (tree, _) = ws.run(FUNCTIONS, &foo_with_inputs(1));
    let value: Value = serde_json::from_str(&tree.to_json_pretty().unwrap()).unwrap();
    assert_eq!(value["decls"][0]["decl"], "func");
    assert_eq!(value["decls"][0]["qualified"], "::Foo");
    assert_eq!(value["decls"][0]["status"]["state"], "matched");
}

#[test]
fn test_pass_config_enforces_root_file() {
    let fixture = r#"{"file": "other.h", "decls": [{"kind": "function", "name": "::Free", "line": 7}]}"#;
    let tree = r#"{"source_file": "root.h", "decls": [{"decl": "func", "name": "Free"}]}"#;

    let ws = Workspace::new();
    let (_, report) = ws.run(fixture, tree);
    assert!(report.all_matched());

    let (tree, report) = ws.run_with_config(fixture, tree, Some("enforce_root_file = true\n"));
    assert_eq!(report.failed, 1);
    let diag = diagnostic(&tree.decls[0]);
    assert_eq!(diag.kind, DiagnosticKind::FileConstraintViolation);
    assert_eq!(diag.file.as_deref(), Some("other.h"));
}

#[test]
fn test_pass_required_file_accepts_aux_header() {
    let ws = Workspace::new();
    let (_, report) = ws.run(
        r#"{"file": "lib/widget.h", "decls": [{"kind": "function", "name": "::Make"}]}"#,
        r#"{"decls": [{"decl": "func", "name": "Make", "required_file": "lib/widget_aux.h"}]}"#,
    );
    assert!(report.all_matched(), "{:?}", report.diagnostics);
}

// ============================================================================
// Pass-level errors
// ============================================================================

fn error_code(ws: &Workspace, fixture: &str, tree: Option<&Path>) -> OutputErrorCode {
    let oracle = ws.write("fixture.json", fixture);
    let decls = match tree {
        Some(path) => path.to_path_buf(),
        None => ws.write("decls.json", r#"{"decls": []}"#),
    };
    let err: MatchError = run_pass(&oracle, &decls, None).unwrap_err();
    OutputErrorCode::from(&err)
}

#[test]
fn test_pass_missing_decls_file_is_invalid_arguments() {
    let ws = Workspace::new();
    let missing = ws.dir.path().join("missing.json");
    assert_eq!(
        error_code(&ws, r#"{"decls": []}"#, Some(missing.as_path())),
        OutputErrorCode::InvalidArguments
    );
}

#[test]
fn test_pass_malformed_fixture_is_oracle_failure() {
    let ws = Workspace::new();
    assert_eq!(
        error_code(&ws, r#"{"decls": [{"kind": "class"#, None),
        OutputErrorCode::OracleFailure
    );
}
