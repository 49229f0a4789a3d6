//! Fixture-backed oracle.
//!
//! [`FixtureOracle`] answers every [`Oracle`] query from a JSON description
//! of a translation unit instead of a compiler. It is the oracle used by the
//! test suite and by the `declmatch` binary.
//!
//! ## Fixture format
//!
//! ```json
//! {
//!   "file": "test.h",
//!   "decls": [
//!     {"kind": "namespace", "name": "::ns"},
//!     {"kind": "class", "name": "::ns::Klass", "bases": [{"name": "Base", "virtual": true}]},
//!     {"kind": "function", "name": "::ns::Klass::Get", "params": [{"name": "i", "type": "int", "default": "0"}],
//!      "returns": "const Klass &", "const": true, "line": 12},
//!     {"kind": "enum", "name": "::ns::Color", "enumerators": ["Red", "Green"], "scoped": true},
//!     {"kind": "var", "name": "::ns::kLimit", "type": "const int"},
//!     {"kind": "typedef", "name": "::ns::KlassPtr", "target": "Klass *"}
//!   ]
//! }
//! ```
//!
//! Names in `name` fields are fully qualified. Type spellings are resolved
//! from the declaring scope outward, the way the compiler would. Names under
//! `std::` are known without being declared. Constructor, member and
//! conversion-function flags are derived from the name and the enclosing
//! class. Class traits are derived from the declared members and may be
//! overridden with a `traits` object.
//!
//! ## Compile
//!
//! [`Oracle::compile`] resolves every probe spelling in its scope. A syntax
//! error fails the whole compile; a spelling that names nothing is recorded
//! as a per-alias failure in the snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, trace};

use declmatch_core::names;
use declmatch_core::{
    BaseEdge, Builtin, ClassDecl, Conversion, ConversionVia, EnumDecl, EnumeratorDecl,
    FunctionDecl, FunctionFlags, NativeDecl, NativeParam, NativeType, Oracle, OracleError,
    ProbeKind, Snapshot, SourceLocation, SyntheticSource, TemplateArg, TypeKind, TypeTraits,
    TypedefDecl, VarDecl,
};

use crate::spelling::{parse_type_spelling, Declarator, ParsedArg, ParsedBase, ParsedType};

// ============================================================================
// Fixture Schema
// ============================================================================

/// A whole fixture file.
#[derive(Debug, Deserialize)]
pub struct Fixture {
    /// File used for declarations without their own `file`.
    #[serde(default = "default_fixture_file")]
    pub file: String,
    #[serde(default)]
    pub decls: Vec<FixtureDecl>,
}

fn default_fixture_file() -> String {
    "test.h".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixtureDecl {
    Namespace(FixtureNamespace),
    Class(FixtureClass),
    Enum(FixtureEnum),
    Function(FixtureFunction),
    Var(FixtureVar),
    Typedef(FixtureTypedef),
}

#[derive(Debug, Default, Deserialize)]
pub struct FixtureNamespace {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureClass {
    pub name: String,
    pub template_params: Vec<String>,
    /// Explicit specialization arguments (`["int"]` for `Box<int>`).
    pub template_args: Vec<String>,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub bases: Vec<FixtureBase>,
    /// Using-declared members, spelled relative to the class (`Base::Method`).
    pub using: Vec<String>,
    /// Bases whose constructors are inherited.
    pub inherit_constructors: Vec<String>,
    pub traits: FixtureTraits,
    pub file: Option<String>,
    pub line: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct FixtureBase {
    pub name: String,
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
}

/// Explicit trait overrides; unset fields are derived.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FixtureTraits {
    pub copyable: Option<bool>,
    pub movable: Option<bool>,
    #[serde(rename = "abstract")]
    pub is_abstract: Option<bool>,
    pub has_default_ctor: Option<bool>,
    pub trivial_default_ctor: Option<bool>,
    pub trivial_dtor: Option<bool>,
    pub public_dtor: Option<bool>,
    pub polymorphic: Option<bool>,
}

impl FixtureTraits {
    fn apply(&self, mut traits: TypeTraits) -> TypeTraits {
        let overrides = [
            (self.copyable, &mut traits.copyable),
            (self.movable, &mut traits.movable),
            (self.is_abstract, &mut traits.is_abstract),
            (self.has_default_ctor, &mut traits.has_default_ctor),
            (self.trivial_default_ctor, &mut traits.trivial_default_ctor),
            (self.trivial_dtor, &mut traits.trivial_dtor),
            (self.public_dtor, &mut traits.public_dtor),
            (self.polymorphic, &mut traits.polymorphic),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }
        traits
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureEnum {
    pub name: String,
    pub enumerators: Vec<String>,
    pub scoped: bool,
    pub file: Option<String>,
    pub line: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub default: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureFunction {
    pub name: String,
    pub params: Vec<FixtureParam>,
    /// Return type spelling; `void` when absent.
    pub returns: Option<String>,
    pub template_params: Vec<String>,
    #[serde(rename = "static")]
    pub is_static: bool,
    #[serde(rename = "const")]
    pub is_const: bool,
    pub explicit: bool,
    pub deleted: bool,
    pub deprecated: bool,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub pure_virtual: bool,
    pub noexcept: bool,
    pub must_use: bool,
    pub mangled: Option<String>,
    pub file: Option<String>,
    pub line: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureVar {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub constexpr: bool,
    pub file: Option<String>,
    pub line: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureTypedef {
    pub name: String,
    pub target: String,
    pub file: Option<String>,
    pub line: u32,
}

// ============================================================================
// Fixture Oracle
// ============================================================================

#[derive(Debug, Clone)]
struct ClassEntry {
    decl: ClassDecl,
    /// Base types, possibly mentioning the class's template parameters.
    bases: Vec<(NativeType, bool)>,
}

/// An [`Oracle`] backed by a fixture file.
#[derive(Debug, Clone, Default)]
pub struct FixtureOracle {
    file: String,
    namespaces: BTreeSet<String>,
    classes: BTreeMap<String, ClassEntry>,
    enums: BTreeMap<String, EnumDecl>,
    vars: BTreeMap<String, VarDecl>,
    typedefs: BTreeMap<String, TypedefDecl>,
    functions: Vec<FunctionDecl>,
}

fn invalid(message: impl Into<String>) -> OracleError {
    OracleError::InvalidFixture {
        message: message.into(),
    }
}

fn canonical(name: &str) -> String {
    names::qualify("", name)
}

/// Itanium-style mangling of the name only; enough to identify a symbol.
fn mangle(qualified_name: &str) -> String {
    let segments = names::segments(qualified_name);
    let mut out = String::from("_Z");
    if segments.len() > 1 {
        out.push('N');
    }
    for segment in &segments {
        out.push_str(&segment.len().to_string());
        out.push_str(segment);
    }
    if segments.len() > 1 {
        out.push('E');
    }
    out
}

impl FixtureOracle {
    /// Load a fixture from JSON text.
    pub fn from_json(content: &str) -> Result<Self, OracleError> {
        let fixture: Fixture =
            serde_json::from_str(content).map_err(|e| invalid(format!("malformed JSON: {}", e)))?;
        Self::from_fixture(fixture)
    }

    /// Load a fixture file.
    pub fn load(path: &Path) -> Result<Self, OracleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Build the oracle from a parsed fixture.
    pub fn from_fixture(fixture: Fixture) -> Result<Self, OracleError> {
        let mut oracle = FixtureOracle {
            file: fixture.file,
            ..Default::default()
        };

        let mut classes = Vec::new();
        let mut functions = Vec::new();
        let mut vars = Vec::new();
        let mut typedefs = Vec::new();
        for decl in fixture.decls {
            match decl {
                FixtureDecl::Namespace(ns) => {
                    oracle.namespaces.insert(canonical(&ns.name));
                }
                FixtureDecl::Enum(e) => oracle.add_enum(e),
                FixtureDecl::Class(c) => classes.push(c),
                FixtureDecl::Function(f) => functions.push(f),
                FixtureDecl::Var(v) => vars.push(v),
                FixtureDecl::Typedef(t) => typedefs.push(t),
            }
        }

        // Primary classes first so every later spelling can name them.
        for class in classes.iter().filter(|c| c.template_args.is_empty()) {
            let name = canonical(&class.name);
            let entry = oracle.class_shell(class, name.clone(), Vec::new());
            oracle.classes.insert(name, entry);
        }
        oracle.register_namespaces(&functions, &vars, &typedefs);

        for typedef in &typedefs {
            let decl = oracle.convert_typedef(typedef)?;
            oracle.typedefs.insert(decl.qualified_name.clone(), decl);
        }

        for class in classes.iter().filter(|c| !c.template_args.is_empty()) {
            let name = canonical(&class.name);
            let scope = names::split_last(&name).0;
            let args = class
                .template_args
                .iter()
                .map(|spelling| oracle.resolve_arg_spelling(spelling, &scope))
                .collect::<Result<Vec<_>, _>>()?;
            let key = specialization_key(&name, &args);
            let entry = oracle.class_shell(class, key.clone(), args);
            oracle.classes.insert(key, entry);
        }

        for class in &classes {
            oracle.resolve_class_edges(class)?;
        }

        for function in &functions {
            let decl = oracle.convert_function(function)?;
            oracle.functions.push(decl);
        }
        for var in &vars {
            let decl = oracle.convert_var(var)?;
            oracle.vars.insert(decl.qualified_name.clone(), decl);
        }

        let overrides: Vec<(String, FixtureTraits)> = classes
            .iter()
            .map(|c| (oracle.class_key(c), c.traits))
            .collect();
        for (key, traits) in overrides {
            let derived = oracle.derive_traits(&key);
            if let Some(entry) = oracle.classes.get_mut(&key) {
                entry.decl.traits = traits.apply(derived);
            }
        }

        debug!(
            "fixture oracle loaded: {} classes, {} functions, {} enums",
            oracle.classes.len(),
            oracle.functions.len(),
            oracle.enums.len()
        );
        Ok(oracle)
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    fn location(&self, file: &Option<String>, line: u32) -> SourceLocation {
        SourceLocation::new(file.clone().unwrap_or_else(|| self.file.clone()), line)
    }

    fn add_enum(&mut self, e: FixtureEnum) {
        let decl = EnumDecl {
            qualified_name: canonical(&e.name),
            enumerators: e.enumerators.clone(),
            scoped: e.scoped,
            location: self.location(&e.file, e.line),
        };
        self.enums.insert(decl.qualified_name.clone(), decl);
    }

    fn class_shell(&self, class: &FixtureClass, key: String, args: Vec<TemplateArg>) -> ClassEntry {
        ClassEntry {
            decl: ClassDecl {
                qualified_name: key,
                template_params: class.template_params.clone(),
                template_args: args,
                is_final: class.is_final,
                bases: Vec::new(),
                using_members: Vec::new(),
                inherited_constructors: Vec::new(),
                traits: TypeTraits::regular_class(),
                location: self.location(&class.file, class.line),
            },
            bases: Vec::new(),
        }
    }

    fn class_key(&self, class: &FixtureClass) -> String {
        let name = canonical(&class.name);
        if class.template_args.is_empty() {
            return name;
        }
        let scope = names::split_last(&name).0;
        let args: Vec<TemplateArg> = class
            .template_args
            .iter()
            .filter_map(|spelling| self.resolve_arg_spelling(spelling, &scope).ok())
            .collect();
        specialization_key(&name, &args)
    }

    /// Every enclosing scope that is not a class is a namespace.
    fn register_namespaces(
        &mut self,
        functions: &[FixtureFunction],
        vars: &[FixtureVar],
        typedefs: &[FixtureTypedef],
    ) {
        let mut qualified: Vec<String> = Vec::new();
        qualified.extend(functions.iter().map(|f| canonical(&f.name)));
        qualified.extend(vars.iter().map(|v| canonical(&v.name)));
        qualified.extend(typedefs.iter().map(|t| canonical(&t.name)));
        qualified.extend(self.classes.keys().cloned());
        qualified.extend(self.enums.keys().cloned());

        for name in qualified {
            let mut scope = names::split_last(&name).0;
            while !scope.is_empty() {
                if !self.classes.contains_key(&scope) {
                    self.namespaces.insert(scope.clone());
                }
                scope = names::split_last(&scope).0;
            }
        }
    }

    fn convert_typedef(&self, typedef: &FixtureTypedef) -> Result<TypedefDecl, OracleError> {
        let name = canonical(&typedef.name);
        let scope = names::split_last(&name).0;
        let target = self.resolve_spelling(&typedef.target, &scope, &[])?;
        Ok(TypedefDecl {
            qualified_name: name,
            target,
            location: self.location(&typedef.file, typedef.line),
        })
    }

    fn resolve_class_edges(&mut self, class: &FixtureClass) -> Result<(), OracleError> {
        let key = self.class_key(class);
        let tparams = class.template_params.clone();
        let mut bases = Vec::new();
        for base in &class.bases {
            let ty = self.resolve_spelling(&base.name, &key, &tparams)?;
            bases.push((ty, base.is_virtual));
        }
        let mut using_members = Vec::new();
        for member in &class.using {
            let (base_text, member_name) = names::split_last(member);
            let base_text = base_text.trim_start_matches("::");
            let base = self.resolve_spelling(base_text, &key, &tparams)?;
            using_members.push(names::qualify(&base.to_string(), &member_name));
        }
        let mut inherited = Vec::new();
        for base in &class.inherit_constructors {
            inherited.push(self.resolve_spelling(base, &key, &tparams)?.to_string());
        }

        if let Some(entry) = self.classes.get_mut(&key) {
            entry.bases = bases;
            entry.decl.using_members = using_members;
            entry.decl.inherited_constructors = inherited;
        }
        let edges = self.base_classes(&key);
        if let Some(entry) = self.classes.get_mut(&key) {
            entry.decl.bases = edges;
        }
        Ok(())
    }

    fn convert_function(&self, function: &FixtureFunction) -> Result<FunctionDecl, OracleError> {
        let name = canonical(&function.name);
        let (scope, simple) = names::split_last(&name);
        let class = self.classes.get(&scope);

        let mut tparams = function.template_params.clone();
        if let Some(entry) = class {
            tparams.extend(entry.decl.template_params.iter().cloned());
        }

        let mut params = Vec::new();
        for param in &function.params {
            params.push(NativeParam {
                name: param.name.clone(),
                ty: self.resolve_spelling(&param.ty, &scope, &tparams)?,
                default: param.default.clone(),
            });
        }
        let ret = match &function.returns {
            Some(spelling) => self.resolve_spelling(spelling, &scope, &tparams)?,
            None => NativeType::void(),
        };

        let is_constructor = class
            .map(|entry| entry.decl.constructor_name() == simple)
            .unwrap_or(false);
        let flags = FunctionFlags {
            is_member: class.is_some() && !function.is_static && !is_constructor,
            is_static: function.is_static,
            is_const: function.is_const,
            is_constructor,
            is_explicit: function.explicit,
            is_deleted: function.deleted,
            is_deprecated: function.deprecated,
            is_virtual: function.is_virtual || function.pure_virtual,
            is_pure_virtual: function.pure_virtual,
            is_noexcept: function.noexcept,
            must_use_result: function.must_use,
            is_conversion: names::is_conversion_operator(&simple),
        };

        Ok(FunctionDecl {
            mangled_name: function.mangled.clone().unwrap_or_else(|| mangle(&name)),
            qualified_name: name,
            params,
            ret,
            template_params: function.template_params.clone(),
            flags,
            location: self.location(&function.file, function.line),
        })
    }

    fn convert_var(&self, var: &FixtureVar) -> Result<VarDecl, OracleError> {
        let name = canonical(&var.name);
        let scope = names::split_last(&name).0;
        Ok(VarDecl {
            ty: self.resolve_spelling(&var.ty, &scope, &[])?,
            qualified_name: name,
            is_static: var.is_static,
            is_constexpr: var.constexpr,
            location: self.location(&var.file, var.line),
        })
    }

    /// Class traits implied by the declared members.
    fn derive_traits(&self, key: &str) -> TypeTraits {
        let mut traits = TypeTraits::regular_class();
        let ctor_name = match self.classes.get(key) {
            Some(entry) => entry.decl.constructor_name().to_string(),
            None => return traits,
        };
        let members: Vec<&FunctionDecl> = self
            .functions
            .iter()
            .filter(|f| f.scope() == key)
            .collect();

        let ctors: Vec<&&FunctionDecl> = members
            .iter()
            .filter(|f| f.simple_name() == ctor_name)
            .collect();
        if !ctors.is_empty() {
            traits.has_default_ctor = ctors
                .iter()
                .any(|f| !f.flags.is_deleted && f.required_params() == 0);
            traits.trivial_default_ctor = false;
        }
        for ctor in &ctors {
            if ctor.is_copy_or_move_ctor(key) && ctor.flags.is_deleted {
                match ctor.params[0].ty.kind {
                    TypeKind::RValueRef(_) => traits.movable = false,
                    _ => traits.copyable = false,
                }
            }
        }
        if members.iter().any(|f| f.flags.is_virtual) {
            traits.polymorphic = true;
            traits.trivial_dtor = false;
        }
        if members.iter().any(|f| f.flags.is_pure_virtual) {
            traits.is_abstract = true;
            traits.has_default_ctor = false;
        }
        traits
    }

    // ------------------------------------------------------------------------
    // Spelling Resolution
    // ------------------------------------------------------------------------

    fn resolve_spelling(
        &self,
        spelling: &str,
        scope: &str,
        tparams: &[String],
    ) -> Result<NativeType, OracleError> {
        let parsed = parse_type_spelling(spelling)?;
        self.to_native(&parsed, scope, tparams)
            .ok_or_else(|| invalid(format!("unknown type '{}' in scope '{}'", spelling, scope)))
    }

    fn resolve_arg_spelling(&self, spelling: &str, scope: &str) -> Result<TemplateArg, OracleError> {
        let parsed = parse_type_spelling(spelling);
        match parsed {
            Ok(parsed) => self
                .to_native(&parsed, scope, &[])
                .map(TemplateArg::Type)
                .ok_or_else(|| invalid(format!("unknown template argument '{}'", spelling))),
            Err(err) => spelling
                .trim()
                .parse::<i64>()
                .map(TemplateArg::Value)
                .map_err(|_| err),
        }
    }

    /// Resolve a parsed spelling in `scope`, or `None` if a name is unknown.
    fn to_native(&self, parsed: &ParsedType, scope: &str, tparams: &[String]) -> Option<NativeType> {
        let mut ty = match &parsed.base {
            ParsedBase::Builtin(b) => NativeType::builtin(*b),
            ParsedBase::Named { name, args } => self.resolve_named(name, args, scope, tparams)?,
        };
        if parsed.is_const {
            ty.is_const = true;
        }
        for declarator in &parsed.declarators {
            ty = match declarator {
                Declarator::Pointer { is_const } => NativeType::pointer_to(ty).with_const(*is_const),
                Declarator::LValueRef => NativeType::lvalue_ref_to(ty),
                Declarator::RValueRef => NativeType::rvalue_ref_to(ty),
            };
        }
        if let Some(params) = &parsed.function_params {
            let params = params
                .iter()
                .map(|p| self.to_native(p, scope, tparams))
                .collect::<Option<Vec<_>>>()?;
            ty = NativeType::function(ty, params);
        }
        Some(ty)
    }

    fn resolve_args(
        &self,
        args: &[ParsedArg],
        scope: &str,
        tparams: &[String],
    ) -> Option<Vec<TemplateArg>> {
        args.iter()
            .map(|arg| match arg {
                ParsedArg::Type(ty) => self.to_native(ty, scope, tparams).map(TemplateArg::Type),
                ParsedArg::Value(v) => Some(TemplateArg::Value(*v)),
            })
            .collect()
    }

    fn resolve_named(
        &self,
        name: &str,
        args: &[ParsedArg],
        scope: &str,
        tparams: &[String],
    ) -> Option<NativeType> {
        if args.is_empty() && tparams.iter().any(|p| p == name) {
            return Some(NativeType::template_param(name));
        }
        let bare = name.trim_start_matches("::");
        if bare == "std::nullptr_t" || bare == "nullptr_t" {
            return Some(NativeType::builtin(Builtin::NullPtr));
        }
        if bare.starts_with("std::") {
            let args = self.resolve_args(args, scope, tparams)?;
            return Some(NativeType::record_with_args(format!("::{}", bare), args));
        }

        let scopes = if name.starts_with("::") {
            vec![String::new()]
        } else {
            names::outward_scopes(scope)
        };
        for candidate_scope in scopes {
            let qualified = names::qualify(&candidate_scope, name);
            if let Some(ty) = self.named_type(&qualified, args, scope, tparams) {
                return Some(ty);
            }
        }
        None
    }

    fn named_type(
        &self,
        qualified: &str,
        args: &[ParsedArg],
        scope: &str,
        tparams: &[String],
    ) -> Option<NativeType> {
        if let Some(entry) = self.classes.get(qualified) {
            if args.is_empty() {
                return Some(entry.decl.as_type());
            }
            if entry.decl.template_params.is_empty() {
                return None;
            }
            let args = self.resolve_args(args, scope, tparams)?;
            return Some(NativeType::record_with_args(qualified, args));
        }
        if !args.is_empty() {
            return None;
        }
        if let Some(decl) = self.enums.get(qualified) {
            return Some(decl.as_type());
        }
        self.typedefs.get(qualified).map(|t| t.target.clone())
    }

    /// Resolve a probe scope as written in the decl tree.
    fn resolve_scope(&self, written: &str) -> Option<String> {
        if written.is_empty() {
            return Some(String::new());
        }
        let qualified = canonical(written);
        if self.namespaces.contains(&qualified) || self.class_entry(&qualified).is_some() {
            return Some(qualified);
        }
        if let Some(typedef) = self.typedefs.get(&qualified) {
            if typedef.target.record_name().is_some() {
                return Some(typedef.target.to_string());
            }
        }
        let (parent_written, last) = names::split_last(&qualified);
        let parent = self.resolve_scope(&parent_written)?;
        names::outward_scopes(&parent)
            .into_iter()
            .map(|s| names::qualify(&s, &last))
            .find(|q| self.namespaces.contains(q) || self.class_entry(q).is_some())
    }

    fn resolve_template_name(&self, written: &str, scope: &str) -> Option<String> {
        let bare = written.trim_start_matches("::");
        if bare.starts_with("std::") {
            return Some(format!("::{}", bare));
        }
        let scopes = if written.starts_with("::") {
            vec![String::new()]
        } else {
            names::outward_scopes(scope)
        };
        scopes
            .into_iter()
            .map(|s| names::qualify(&s, written))
            .find(|q| {
                self.classes
                    .get(q)
                    .map(|e| !e.decl.template_params.is_empty())
                    .unwrap_or(false)
            })
    }

    /// Class entry for a name, instantiating the primary template for
    /// specializations that are not declared explicitly.
    fn class_entry(&self, name: &str) -> Option<(ClassEntry, HashMap<String, NativeType>)> {
        if let Some(entry) = self.classes.get(name) {
            return Some((entry.clone(), HashMap::new()));
        }
        if !name.contains('<') {
            return None;
        }
        let parsed = parse_type_spelling(name).ok()?;
        let ty = self.to_native(&parsed, "", &[])?;
        let TypeKind::Record { name: template, args } = &ty.kind else {
            return None;
        };
        let primary = self.classes.get(template)?;
        if primary.decl.template_params.len() != args.len() {
            return None;
        }
        let mut bindings = HashMap::new();
        for (param, arg) in primary.decl.template_params.iter().zip(args) {
            if let TemplateArg::Type(arg) = arg {
                bindings.insert(param.clone(), arg.clone());
            }
        }
        let mut entry = primary.clone();
        entry.decl.qualified_name = ty.to_string();
        entry.decl.template_args = args.clone();
        Some((entry, bindings))
    }
}

fn specialization_key(name: &str, args: &[TemplateArg]) -> String {
    NativeType::record_with_args(name, args.to_vec()).to_string()
}

// ============================================================================
// Oracle Implementation
// ============================================================================

impl Oracle for FixtureOracle {
    fn name(&self) -> &str {
        "fixture"
    }

    fn lookup_qualified(&self, qualified_name: &str) -> Vec<NativeDecl> {
        let mut out = Vec::new();
        if self.namespaces.contains(qualified_name) {
            out.push(NativeDecl::Namespace(qualified_name.to_string()));
        }
        if let Some(entry) = self.classes.get(qualified_name) {
            out.push(NativeDecl::Class(entry.decl.clone()));
        }
        if let Some(decl) = self.enums.get(qualified_name) {
            out.push(NativeDecl::Enum(decl.clone()));
        }
        for decl in self.enums.values() {
            for enumerator in &decl.enumerators {
                let name = decl.qualify_enumerator(enumerator);
                if name == qualified_name {
                    out.push(NativeDecl::Enumerator(EnumeratorDecl {
                        qualified_name: name,
                        enum_name: decl.qualified_name.clone(),
                        scoped: decl.scoped,
                        location: decl.location.clone(),
                    }));
                }
            }
        }
        if let Some(decl) = self.vars.get(qualified_name) {
            out.push(NativeDecl::Var(decl.clone()));
        }
        if let Some(decl) = self.typedefs.get(qualified_name) {
            out.push(NativeDecl::Typedef(decl.clone()));
        }
        out.extend(
            self.functions
                .iter()
                .filter(|f| f.qualified_name == qualified_name)
                .cloned()
                .map(NativeDecl::Function),
        );
        trace!("lookup {} -> {} decls", qualified_name, out.len());
        out
    }

    fn enumerate_overloads(&self, scope: &str, name: &str) -> Vec<FunctionDecl> {
        let qualified = names::qualify(scope, name);
        let direct: Vec<FunctionDecl> = self
            .functions
            .iter()
            .filter(|f| f.qualified_name == qualified)
            .cloned()
            .collect();
        if !direct.is_empty() || self.classes.contains_key(scope) {
            return direct;
        }

        // Members of an implicit instantiation come from the primary template.
        let Some((entry, bindings)) = self.class_entry(scope) else {
            return direct;
        };
        let primary = entry.decl.template_name().to_string();
        let primary_name = names::qualify(&primary, name);
        self.functions
            .iter()
            .filter(|f| f.qualified_name == primary_name)
            .map(|f| {
                let mut decl = f.clone();
                decl.qualified_name = qualified.clone();
                decl.ret = decl.ret.substitute(&bindings);
                for param in &mut decl.params {
                    param.ty = param.ty.substitute(&bindings);
                }
                decl
            })
            .collect()
    }

    fn base_classes(&self, class_name: &str) -> Vec<BaseEdge> {
        let Some((entry, bindings)) = self.class_entry(class_name) else {
            return Vec::new();
        };
        entry
            .bases
            .iter()
            .map(|(ty, is_virtual)| {
                let name = ty.substitute(&bindings).to_string();
                let location = self
                    .class_entry(&name)
                    .map(|(base, _)| base.decl.location)
                    .unwrap_or_else(|| SourceLocation::new(self.file.clone(), 0));
                BaseEdge {
                    name,
                    is_virtual: *is_virtual,
                    location,
                }
            })
            .collect()
    }

    fn resolve_specialization(
        &self,
        template_name: &str,
        args: &[TemplateArg],
    ) -> Option<ClassDecl> {
        let key = specialization_key(template_name, args);
        let (entry, _) = self.class_entry(&key)?;
        let mut decl = entry.decl;
        decl.bases = self.base_classes(&key);
        Some(decl)
    }

    fn type_traits(&self, ty: &NativeType) -> Option<TypeTraits> {
        match &ty.kind {
            TypeKind::Builtin(Builtin::Void) => None,
            TypeKind::Builtin(_) | TypeKind::Enum { .. } | TypeKind::Pointer(_) => {
                Some(TypeTraits::scalar())
            }
            TypeKind::Record { name, .. } if name == "::std::unique_ptr" => Some(TypeTraits {
                copyable: false,
                ..TypeTraits::regular_class()
            }),
            TypeKind::Record { name, .. } if name.starts_with("::std::") => {
                Some(TypeTraits::regular_class())
            }
            TypeKind::Record { .. } => self
                .class_entry(&ty.unqualified().to_string())
                .map(|(entry, _)| entry.decl.traits),
            TypeKind::LValueRef(_)
            | TypeKind::RValueRef(_)
            | TypeKind::Function(_)
            | TypeKind::TemplateParam(_) => None,
        }
    }

    fn implicit_conversions(&self, from: &NativeType) -> Vec<Conversion> {
        let from = from.strip_reference().unqualified();
        let mut out = Vec::new();
        for f in &self.functions {
            if f.flags.is_explicit || f.flags.is_deleted {
                continue;
            }
            let scope = f.scope();
            if f.flags.is_constructor
                && !f.params.is_empty()
                && f.params[1..].iter().all(|p| p.default.is_some())
                && f.params[0].ty.strip_reference().unqualified() == from
                && from.record_name() != Some(scope.as_str())
            {
                if let Some(entry) = self.classes.get(&scope) {
                    out.push(Conversion {
                        target: entry.decl.as_type(),
                        via: ConversionVia::Constructor,
                        declared_by: f.qualified_name.clone(),
                    });
                }
            } else if f.flags.is_conversion && from.record_name() == Some(scope.as_str()) {
                out.push(Conversion {
                    target: f.ret.clone(),
                    via: ConversionVia::Operator,
                    declared_by: f.qualified_name.clone(),
                });
            }
        }
        out
    }

    fn compile(&self, source: &SyntheticSource) -> Result<Snapshot, OracleError> {
        let mut snapshot = Snapshot::new();
        for probe in &source.probes {
            let Some(scope) = self.resolve_scope(&probe.scope) else {
                snapshot.insert_failure(&probe.alias, format!("unknown scope '{}'", probe.scope));
                continue;
            };
            match probe.kind {
                ProbeKind::Type => {
                    let parsed = parse_type_spelling(&probe.spelling).map_err(|e| {
                        OracleError::CompileFailed {
                            message: format!("{}: {}", probe.alias, e),
                        }
                    })?;
                    match self.to_native(&parsed, &scope, &[]) {
                        Some(ty) => snapshot.insert_type(&probe.alias, ty),
                        None => snapshot.insert_failure(
                            &probe.alias,
                            format!("unknown type name '{}'", probe.spelling),
                        ),
                    }
                }
                ProbeKind::Template => match self.resolve_template_name(&probe.spelling, &scope) {
                    Some(name) => snapshot.insert_template(&probe.alias, name),
                    None => snapshot.insert_failure(
                        &probe.alias,
                        format!("no template named '{}'", probe.spelling),
                    ),
                },
            }
        }
        debug!(
            "fixture compile: {} probes, {} resolved",
            source.probes.len(),
            snapshot.len()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declmatch_core::Probe;

    const FIXTURE: &str = r#"{
        "file": "test.h",
        "decls": [
            {"kind": "namespace", "name": "::ns"},
            {"kind": "class", "name": "::ns::Base", "line": 3},
            {"kind": "class", "name": "::ns::Derived", "bases": [{"name": "Base"}], "line": 5},
            {"kind": "class", "name": "::Box", "template_params": ["T"], "bases": [{"name": "Holder<T>"}]},
            {"kind": "class", "name": "::Holder", "template_params": ["T"]},
            {"kind": "class", "name": "::Box", "template_args": ["bool"]},
            {"kind": "function", "name": "::Box::Box", "params": [{"name": "v", "type": "T"}]},
            {"kind": "function", "name": "::Box::get", "returns": "const T &", "const": true},
            {"kind": "function", "name": "::ns::Derived::Derived", "params": [{"type": "int"}]},
            {"kind": "function", "name": "::ns::Derived::Derived",
             "params": [{"type": "const Derived &"}], "deleted": true},
            {"kind": "function", "name": "::ns::Derived::operator bool", "returns": "bool"},
            {"kind": "function", "name": "::ns::Free", "params": [{"name": "d", "type": "Derived *"}]},
            {"kind": "enum", "name": "::ns::Color", "enumerators": ["Red", "Green"]},
            {"kind": "typedef", "name": "::ns::DerivedPtr", "target": "Derived *"},
            {"kind": "var", "name": "::ns::kLimit", "type": "const int", "constexpr": true}
        ]
    }"#;

    fn oracle() -> FixtureOracle {
        FixtureOracle::from_json(FIXTURE).unwrap()
    }

    #[test]
    fn test_fixture_resolves_param_types_in_scope() {
        let oracle = oracle();
        let free = oracle.enumerate_overloads("::ns", "Free");
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].params[0].ty.to_string(), "::ns::Derived *");
        assert_eq!(free[0].mangled_name, "_ZN2ns4FreeE");
    }

    #[test]
    fn test_fixture_derives_constructor_and_conversion_flags() {
        let oracle = oracle();
        let ctors = oracle.enumerate_overloads("::ns::Derived", "Derived");
        assert_eq!(ctors.len(), 2);
        assert!(ctors.iter().all(|c| c.flags.is_constructor && !c.flags.is_member));
        let conv = oracle.enumerate_overloads("::ns::Derived", "operator bool");
        assert!(conv[0].flags.is_conversion);
        assert!(conv[0].flags.is_member);
    }

    #[test]
    fn test_fixture_derives_traits_from_deleted_copy_ctor() {
        let oracle = oracle();
        let traits = oracle.type_traits(&NativeType::record("::ns::Derived")).unwrap();
        assert!(!traits.copyable);
        assert!(traits.movable);
        assert!(!traits.has_default_ctor);
    }

    #[test]
    fn test_fixture_lookup_kinds() {
        let oracle = oracle();
        assert!(matches!(
            oracle.lookup_qualified("::ns")[0],
            NativeDecl::Namespace(_)
        ));
        assert!(matches!(
            oracle.lookup_qualified("::ns::Red")[0],
            NativeDecl::Enumerator(_)
        ));
        assert!(matches!(
            oracle.lookup_qualified("::ns::DerivedPtr")[0],
            NativeDecl::Typedef(_)
        ));
        assert!(oracle.lookup_qualified("::ns::Missing").is_empty());
    }

    #[test]
    fn test_fixture_base_edges_with_location() {
        let oracle = oracle();
        let bases = oracle.base_classes("::ns::Derived");
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].name, "::ns::Base");
        assert_eq!(bases[0].location, SourceLocation::new("test.h", 3));
    }

    #[test]
    fn test_fixture_instantiates_primary_template() {
        let oracle = oracle();
        let args = vec![TemplateArg::Type(NativeType::builtin(Builtin::Int))];
        let decl = oracle.resolve_specialization("::Box", &args).unwrap();
        assert_eq!(decl.qualified_name, "::Box<int>");
        assert_eq!(decl.bases[0].name, "::Holder<int>");

        let ctors = oracle.enumerate_overloads("::Box<int>", "Box");
        assert_eq!(ctors.len(), 1);
        assert_eq!(ctors[0].qualified_name, "::Box<int>::Box");
        assert_eq!(ctors[0].params[0].ty.to_string(), "int");

        let get = oracle.enumerate_overloads("::Box<int>", "get");
        assert_eq!(get[0].ret.to_string(), "const int &");
    }

    #[test]
    fn test_fixture_explicit_specialization_has_own_members() {
        let oracle = oracle();
        assert!(oracle.lookup_qualified("::Box<bool>").len() == 1);
        assert!(oracle.enumerate_overloads("::Box<bool>", "get").is_empty());
    }

    #[test]
    fn test_fixture_implicit_conversions() {
        let oracle = oracle();
        let from_int = oracle.implicit_conversions(&NativeType::builtin(Builtin::Int));
        assert_eq!(from_int.len(), 1);
        assert_eq!(from_int[0].target, NativeType::record("::ns::Derived"));
        assert_eq!(from_int[0].via, ConversionVia::Constructor);

        let from_derived = oracle.implicit_conversions(&NativeType::record("::ns::Derived"));
        assert_eq!(from_derived.len(), 1);
        assert_eq!(from_derived[0].target, NativeType::builtin(Builtin::Bool));
        assert_eq!(from_derived[0].via, ConversionVia::Operator);
    }

    #[test]
    fn test_fixture_compile_records_per_alias_failures() {
        let oracle = oracle();
        let source = SyntheticSource {
            text: String::new(),
            includes: vec!["test.h".to_string()],
            probes: vec![
                Probe {
                    alias: "probe_type_0".to_string(),
                    scope: "ns".to_string(),
                    spelling: "const Derived &".to_string(),
                    kind: ProbeKind::Type,
                },
                Probe {
                    alias: "probe_type_1".to_string(),
                    scope: String::new(),
                    spelling: "Cord".to_string(),
                    kind: ProbeKind::Type,
                },
                Probe {
                    alias: "probe_template_2".to_string(),
                    scope: String::new(),
                    spelling: "Box".to_string(),
                    kind: ProbeKind::Template,
                },
            ],
        };
        let snapshot = oracle.compile(&source).unwrap();
        assert_eq!(
            snapshot.resolved_type("probe_type_0").unwrap().to_string(),
            "const ::ns::Derived &"
        );
        assert!(snapshot.failure("probe_type_1").is_some());
        assert_eq!(snapshot.resolved_template("probe_template_2"), Some("::Box"));
    }

    #[test]
    fn test_fixture_compile_fails_on_syntax_error() {
        let oracle = oracle();
        let source = SyntheticSource {
            probes: vec![Probe {
                alias: "probe_type_0".to_string(),
                scope: String::new(),
                spelling: "int <<".to_string(),
                kind: ProbeKind::Type,
            }],
            ..Default::default()
        };
        assert!(matches!(
            oracle.compile(&source),
            Err(OracleError::CompileFailed { .. })
        ));
    }

    #[test]
    fn test_fixture_rejects_unknown_type() {
        let err = FixtureOracle::from_json(
            r#"{"decls": [{"kind": "function", "name": "::f", "params": [{"type": "Nope"}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::InvalidFixture { .. }));
    }

    #[test]
    fn test_fixture_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", FIXTURE).unwrap();
        let loaded = FixtureOracle::load(file.path()).unwrap();
        assert_eq!(loaded.lookup_qualified("::ns::Color").len(), 1);

        let err = FixtureOracle::load(Path::new("/nonexistent/fixture.json")).unwrap_err();
        assert!(matches!(err, OracleError::InvalidFixture { .. }));
    }
}
