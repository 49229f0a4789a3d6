//! Native name lookup.
//!
//! Resolves a symbolic name against the oracle from the current scope:
//!
//! - `::a::b` is looked up exactly.
//! - Inside a class: the class itself (plus its using-declared members),
//!   then its bases in base-resolver order. Operators continue outward from
//!   the class's enclosing scope; found there they are free functions.
//! - Elsewhere: the current scope, then each enclosing scope outward.
//!
//! The first scope that declares the name decides; a name that resolves to
//! the wrong kind of declaration is a mismatch, not a reason to keep looking.

use tracing::trace;

use declmatch_core::names;
use declmatch_core::{
    ClassDecl, FunctionDecl, FunctionFlags, NativeDecl, NativeType, TypeKind,
};

use crate::bases;
use crate::compat::Mismatch;
use crate::context::MatchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    Exact,
    Class,
    Outer,
}

#[derive(Debug, Clone)]
struct SearchScope {
    scope: String,
    reach: Reach,
}

/// Functions found for one name.
#[derive(Debug, Clone, Default)]
pub struct FunctionSet {
    /// Live (not deleted) candidates.
    pub candidates: Vec<FunctionDecl>,
    pub deleted: usize,
    /// Found outside the enclosing class: a free function taking the
    /// receiver as a parameter.
    pub operator_function: bool,
}

fn search_scopes(ctx: &MatchContext<'_>, name: &str) -> Vec<SearchScope> {
    if name.starts_with("::") {
        return vec![SearchScope {
            scope: String::new(),
            reach: Reach::Exact,
        }];
    }
    match ctx.current_class() {
        Some(class) => {
            let mut scopes = vec![SearchScope {
                scope: class.qualified_name.clone(),
                reach: Reach::Class,
            }];
            for base in bases::resolve_bases(ctx.oracle, class).unwrap_or_default() {
                scopes.push(SearchScope {
                    scope: base.qualified,
                    reach: Reach::Class,
                });
            }
            let parent = names::split_last(&class.qualified_name).0;
            scopes.extend(names::outward_scopes(&parent).into_iter().map(|scope| {
                SearchScope {
                    scope,
                    reach: Reach::Outer,
                }
            }));
            scopes
        }
        None => names::outward_scopes(&ctx.frame().resolved)
            .into_iter()
            .map(|scope| SearchScope {
                scope,
                reach: Reach::Outer,
            })
            .collect(),
    }
}

fn wrong_kind(qualified: &str, decl: &NativeDecl) -> Mismatch {
    Mismatch::type_mismatch(format!(
        "name matched \"{}\" which is a native {}",
        qualified,
        decl.kind_name()
    ))
}

fn live_functions(
    found: Vec<FunctionDecl>,
    qualified: &str,
    operator_function: bool,
) -> Result<FunctionSet, Mismatch> {
    let total = found.len();
    let candidates: Vec<FunctionDecl> = found.into_iter().filter(|f| !f.flags.is_deleted).collect();
    if candidates.is_empty() {
        return Err(Mismatch::not_found(format!(
            "\"{}\" is deleted. Are you wrapping a deleted method?",
            qualified
        )));
    }
    Ok(FunctionSet {
        deleted: total - candidates.len(),
        candidates,
        operator_function,
    })
}

/// Find the overload set a function name refers to.
pub fn find_functions(ctx: &MatchContext<'_>, name: &str) -> Result<FunctionSet, Mismatch> {
    let class = ctx.current_class();
    let is_operator = names::is_operator(names::simple_name(name));

    for search in search_scopes(ctx, name) {
        if search.reach == Reach::Outer && class.is_some() && !is_operator {
            break;
        }
        let qualified = names::qualify(&search.scope, name);
        let (scope, simple) = names::split_last(&qualified);
        let mut found = ctx.oracle.enumerate_overloads(&scope, &simple);

        if let Some(class) = class {
            if search.reach == Reach::Class && search.scope == class.qualified_name {
                for member in &class.using_members {
                    let (member_scope, member_name) = names::split_last(member);
                    if member_name == simple {
                        found.extend(ctx.oracle.enumerate_overloads(&member_scope, &member_name));
                    }
                }
            }
        }

        if !found.is_empty() {
            let operator_function = class.is_some()
                && is_operator
                && match search.reach {
                    Reach::Outer => true,
                    Reach::Exact => class.map(|c| c.qualified_name != scope).unwrap_or(false),
                    Reach::Class => false,
                };
            trace!(
                "{} -> {} overloads in {} (operator function: {})",
                name,
                found.len(),
                scope,
                operator_function
            );
            return live_functions(found, &qualified, operator_function);
        }
        if let Some(other) = ctx
            .oracle
            .lookup_qualified(&qualified)
            .iter()
            .find(|d| !matches!(d, NativeDecl::Namespace(_) | NativeDecl::Function(_)))
        {
            return Err(wrong_kind(&qualified, other));
        }
    }
    Err(Mismatch::not_found(""))
}

/// Constructors of a class, including inherited ones.
///
/// A class that declares no constructor gets its implicit default
/// constructor when it has one.
pub fn find_constructors(ctx: &MatchContext<'_>, class: &ClassDecl) -> Result<FunctionSet, Mismatch> {
    let ctor_name = class.constructor_name();
    let mut found: Vec<FunctionDecl> = ctx
        .oracle
        .enumerate_overloads(&class.qualified_name, ctor_name)
        .into_iter()
        .filter(|f| f.flags.is_constructor)
        .collect();

    for base in &class.inherited_constructors {
        let base_ctor = names::strip_template_args(names::simple_name(base));
        let base_record = names::strip_template_args(base);
        found.extend(
            ctx.oracle
                .enumerate_overloads(base, base_ctor)
                .into_iter()
                .filter(|f| f.flags.is_constructor && !f.is_copy_or_move_ctor(base_record)),
        );
    }

    let qualified = names::qualify(&class.qualified_name, ctor_name);
    if found.is_empty() {
        if !class.traits.has_default_ctor {
            return Err(Mismatch::not_found(format!(
                "\"{}\" has no accessible constructor",
                class.qualified_name
            )));
        }
        found.push(FunctionDecl {
            qualified_name: qualified.clone(),
            params: Vec::new(),
            ret: NativeType::void(),
            template_params: Vec::new(),
            flags: FunctionFlags {
                is_constructor: true,
                ..Default::default()
            },
            mangled_name: String::new(),
            location: class.location.clone(),
        });
    }
    live_functions(found, &qualified, false)
}

/// Find a non-function declaration accepted by `accept`.
pub fn find_decl(
    ctx: &MatchContext<'_>,
    name: &str,
    accept: impl Fn(&NativeDecl) -> bool,
) -> Result<NativeDecl, Mismatch> {
    for search in search_scopes(ctx, name) {
        let qualified = names::qualify(&search.scope, name);
        let decls: Vec<NativeDecl> = ctx
            .oracle
            .lookup_qualified(&qualified)
            .into_iter()
            .filter(|d| !matches!(d, NativeDecl::Namespace(_)))
            .collect();
        if decls.is_empty() {
            continue;
        }
        if let Some(decl) = decls.iter().find(|d| accept(d)) {
            return Ok(decl.clone());
        }
        return Err(wrong_kind(&qualified, &decls[0]));
    }
    Err(Mismatch::not_found(""))
}

/// The class declaration of a record type.
pub fn class_of_type(ctx: &MatchContext<'_>, ty: &NativeType) -> Option<ClassDecl> {
    let TypeKind::Record { name, args } = &ty.kind else {
        return None;
    };
    if !args.is_empty() {
        return ctx.oracle.resolve_specialization(name, args);
    }
    ctx.oracle
        .lookup_qualified(name)
        .into_iter()
        .find_map(|decl| match decl {
            NativeDecl::Class(class) => Some(class),
            _ => None,
        })
}

/// Find the class a symbolic class name refers to, through typedefs and
/// template specializations.
pub fn find_class(ctx: &MatchContext<'_>, name: &str) -> Result<ClassDecl, Mismatch> {
    if name.contains('<') {
        let ty = ctx.hint_type(name).map_err(Mismatch::not_found)?;
        return class_of_type(ctx, &ty).ok_or_else(|| {
            Mismatch::type_mismatch(format!("\"{}\" does not name a native class", ty))
        });
    }
    let decl = find_decl(ctx, name, |decl| match decl {
        NativeDecl::Class(_) => true,
        NativeDecl::Typedef(typedef) => typedef.target.record_name().is_some(),
        _ => false,
    })?;
    match decl {
        NativeDecl::Class(class) => Ok(class),
        NativeDecl::Typedef(typedef) => class_of_type(ctx, &typedef.target).ok_or_else(|| {
            Mismatch::not_found(format!("typedef target \"{}\" is not declared", typedef.target))
        }),
        other => Err(wrong_kind(name, &other)),
    }
}

/// Resolve a namespace as written on a top-level decl.
pub fn find_namespace(ctx: &MatchContext<'_>, written: &str) -> Option<String> {
    let qualified = names::qualify("", written);
    ctx.oracle
        .lookup_qualified(&qualified)
        .iter()
        .any(|d| matches!(d, NativeDecl::Namespace(_)))
        .then_some(qualified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Frame;
    use crate::fixture::FixtureOracle;
    use crate::probe::ProbePlan;
    use declmatch_core::{DeclTree, DiagnosticKind, MatchConfig, Snapshot};

    const FIXTURE: &str = r#"{
        "decls": [
            {"kind": "namespace", "name": "::ns"},
            {"kind": "class", "name": "::ns::Base", "line": 2},
            {"kind": "function", "name": "::ns::Base::Inherited", "returns": "int"},
            {"kind": "function", "name": "::ns::Base::Shown", "params": [{"type": "int"}]},
            {"kind": "class", "name": "::ns::Klass", "bases": [{"name": "Base"}],
             "using": ["Base::Shown"], "inherit_constructors": ["Base"]},
            {"kind": "function", "name": "::ns::Klass::Klass", "params": [{"type": "int"}]},
            {"kind": "function", "name": "::ns::Klass::Klass", "params": [{"type": "double"}], "deleted": true},
            {"kind": "function", "name": "::ns::Klass::Shown", "params": [{"type": "bool"}]},
            {"kind": "function", "name": "::ns::Klass::Gone", "deleted": true},
            {"kind": "function", "name": "::ns::operator==",
             "params": [{"type": "const Klass &"}, {"type": "const Klass &"}], "returns": "bool"},
            {"kind": "function", "name": "::ns::Free"},
            {"kind": "enum", "name": "::ns::Color", "enumerators": ["Red"]},
            {"kind": "typedef", "name": "::ns::Alias", "target": "Klass"},
            {"kind": "class", "name": "::Plain"}
        ]
    }"#;

    fn with_ctx<R>(f: impl FnOnce(&mut MatchContext<'_>) -> R) -> R {
        let oracle = FixtureOracle::from_json(FIXTURE).unwrap();
        let config = MatchConfig::default();
        let tree = DeclTree::default();
        let mut ctx = MatchContext::new(&oracle, &config, Snapshot::new(), ProbePlan::default(), &tree);
        f(&mut ctx)
    }

    #[test]
    fn test_lookup_walks_outward_from_namespace() {
        with_ctx(|ctx| {
            ctx.with_scope(Frame::namespace("::ns", "::ns"), |ctx| {
                let set = find_functions(ctx, "Free").unwrap();
                assert_eq!(set.candidates[0].qualified_name, "::ns::Free");
                assert!(!set.operator_function);
            });
            assert!(find_functions(ctx, "Free").is_err());
            assert!(find_functions(ctx, "ns::Free").is_ok());
            assert!(find_functions(ctx, "::ns::Free").is_ok());
        });
    }

    #[test]
    fn test_lookup_class_members_using_and_bases() {
        with_ctx(|ctx| {
            let klass = find_class(ctx, "ns::Klass").unwrap();
            ctx.with_scope(Frame::class(klass, "::ns::Klass"), |ctx| {
                let shown = find_functions(ctx, "Shown").unwrap();
                assert_eq!(shown.candidates.len(), 2);
                let inherited = find_functions(ctx, "Inherited").unwrap();
                assert_eq!(inherited.candidates[0].qualified_name, "::ns::Base::Inherited");
                assert!(find_functions(ctx, "Free").is_err());
            });
        });
    }

    #[test]
    fn test_lookup_operator_outside_class_is_free_function() {
        with_ctx(|ctx| {
            let klass = find_class(ctx, "::ns::Klass").unwrap();
            ctx.with_scope(Frame::class(klass, "::ns::Klass"), |ctx| {
                let set = find_functions(ctx, "operator==").unwrap();
                assert!(set.operator_function);
                assert_eq!(set.candidates[0].params.len(), 2);
            });
        });
    }

    #[test]
    fn test_lookup_deleted_and_wrong_kind() {
        with_ctx(|ctx| {
            let klass = find_class(ctx, "::ns::Klass").unwrap();
            ctx.with_scope(Frame::class(klass, "::ns::Klass"), |ctx| {
                let err = find_functions(ctx, "Gone").unwrap_err();
                assert_eq!(err.kind, DiagnosticKind::NotFound);
                assert!(err.detail.contains("Are you wrapping a deleted method?"));
            });
            let err = find_functions(ctx, "::ns::Color").unwrap_err();
            assert_eq!(err.kind, DiagnosticKind::TypeMismatch);
            assert_eq!(err.detail, "name matched \"::ns::Color\" which is a native enum");
        });
    }

    #[test]
    fn test_lookup_constructors() {
        with_ctx(|ctx| {
            let klass = find_class(ctx, "::ns::Klass").unwrap();
            let set = find_constructors(ctx, &klass).unwrap();
            assert_eq!(set.candidates.len(), 1);
            assert_eq!(set.deleted, 1);

            let plain = find_class(ctx, "::Plain").unwrap();
            let implicit = find_constructors(ctx, &plain).unwrap();
            assert_eq!(implicit.candidates[0].qualified_name, "::Plain::Plain");
            assert!(implicit.candidates[0].params.is_empty());
        });
    }

    #[test]
    fn test_lookup_class_through_typedef() {
        with_ctx(|ctx| {
            let class = find_class(ctx, "::ns::Alias").unwrap();
            assert_eq!(class.qualified_name, "::ns::Klass");
            let err = find_class(ctx, "::ns::Color").unwrap_err();
            assert_eq!(err.kind, DiagnosticKind::TypeMismatch);
            assert_eq!(find_namespace(ctx, "ns").as_deref(), Some("::ns"));
            assert_eq!(find_namespace(ctx, "nope"), None);
        });
    }
}
