//! Type compatibility resolver.
//!
//! Decides whether a symbolic [`TypeDescriptor`] is satisfied by a concrete
//! native type in a given [`Role`], and with what [`Rank`]. A successful
//! match is a [`TypeMatch`]: the concrete spelling plus everything that is
//! written back into the descriptor. Nothing is written until the caller
//! commits the match with [`apply`].
//!
//! ## Rules
//!
//! - Identical types after qualification match exactly.
//! - Integral widths substitute for each other, as do floating widths
//!   (`Promotion`). `bool` substitutes for nothing.
//! - One level of pointer, reference or ownership wrapper is peeled from
//!   the native type depending on the role; the descriptor never sees more.
//! - Input positions accept a derived class for a base (`Upcast`) and a
//!   single unambiguous user-defined conversion (`Conversion`).
//! - Output positions must be non-const pointers or references.
//! - Values handed back across the boundary must be copyable or movable.

use std::collections::HashMap;

use tracing::trace;

use declmatch_core::{
    CallableDescriptor, ConversionVia, DescriptorTraits, Diagnostic, DiagnosticKind, NativeType,
    NumericCategory, Ownership, TemplateArg, TypeDescriptor, TypeKind,
};

use crate::bases;
use crate::context::MatchContext;
use crate::selector;
use crate::spelling::parse_integral_literal;

/// Template parameter bindings deduced so far.
pub type Bindings = HashMap<String, NativeType>;

/// Position of a type within a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Function parameter supplied by the caller.
    Input,
    /// Function parameter written by the callee.
    Output,
    /// The native return slot.
    Return,
    /// Variable, constant or callable signature element.
    Value,
    /// Template argument.
    Nested,
}

/// How far a match had to stretch. Lower is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    #[default]
    Exact,
    Promotion,
    Upcast,
    Conversion,
}

/// A successful descriptor match, not yet written back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMatch {
    pub spelling: String,
    pub rank: Rank,
    pub raw_pointer: bool,
    pub is_const: bool,
    pub ownership: Option<Ownership>,
    pub traits: Option<DescriptorTraits>,
    pub output_param: bool,
    pub params: Vec<TypeMatch>,
    pub callable_params: Vec<TypeMatch>,
    pub callable_returns: Vec<TypeMatch>,
}

/// Why a descriptor does not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub kind: DiagnosticKind,
    pub detail: String,
}

impl Mismatch {
    pub fn new(kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::NotFound, detail)
    }

    pub fn type_mismatch(detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::TypeMismatch, detail)
    }

    pub fn ambiguous(detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::AmbiguousMatch, detail)
    }

    pub fn structural(detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::StructuralViolation, detail)
    }

    /// Append a line of advice to the detail.
    pub fn with_note(mut self, note: &str) -> Self {
        if !self.detail.is_empty() {
            self.detail.push('\n');
        }
        self.detail.push_str(note);
        self
    }

    pub fn into_diagnostic(self, subject: impl Into<String>) -> Diagnostic {
        Diagnostic::new(self.kind, subject, self.detail)
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Match a descriptor against a native type.
///
/// Callables take precedence, then an explicit hint, then the type map of
/// the descriptor's symbolic type.
pub fn match_descriptor(
    ctx: &mut MatchContext<'_>,
    desc: &TypeDescriptor,
    target: &NativeType,
    role: Role,
    bindings: &mut Bindings,
) -> Result<TypeMatch, Mismatch> {
    if let Some(callable) = &desc.callable {
        return match_callable(ctx, callable, target, bindings);
    }
    if let Some(hint) = &desc.hint {
        return match_spelling(ctx, desc, hint, target, role, bindings, false);
    }
    if ctx.typemap_candidates(&desc.lang_type).is_some() {
        return selector::select(ctx, desc, target, role, bindings);
    }
    Err(Mismatch::not_found(format!(
        "no concrete type known for \"{}\"",
        desc.lang_type
    )))
}

/// Match a descriptor using one concrete spelling (a hint or a type-map
/// candidate). Descriptors with template arguments treat the spelling as a
/// template name.
pub fn match_spelling(
    ctx: &mut MatchContext<'_>,
    desc: &TypeDescriptor,
    spelling: &str,
    target: &NativeType,
    role: Role,
    bindings: &mut Bindings,
    strict: bool,
) -> Result<TypeMatch, Mismatch> {
    if !desc.params.is_empty() {
        let name = ctx.template_name(spelling).map_err(|reason| {
            Mismatch::not_found(format!(
                "\"{}\" does not name a native template: {}",
                spelling, reason
            ))
        })?;
        return match_core(ctx, desc, Wanted::Template(name), target, role, bindings, strict);
    }
    if parse_integral_literal(spelling).is_some() {
        return Err(Mismatch::type_mismatch(format!(
            "\"{}\" is a value, not a type",
            spelling
        )));
    }
    let wanted = ctx.hint_type(spelling).map_err(|reason| {
        Mismatch::not_found(format!(
            "\"{}\" does not name a native type: {}",
            spelling, reason
        ))
    })?;
    match_wanted(ctx, desc, &wanted, target, role, bindings, strict)
}

/// Match a descriptor whose concrete type is already known.
pub fn match_wanted(
    ctx: &mut MatchContext<'_>,
    desc: &TypeDescriptor,
    wanted: &NativeType,
    target: &NativeType,
    role: Role,
    bindings: &mut Bindings,
    strict: bool,
) -> Result<TypeMatch, Mismatch> {
    match_core(ctx, desc, Wanted::Type(wanted.clone()), target, role, bindings, strict)
}

/// Write a committed match into its descriptor.
pub fn apply(desc: &mut TypeDescriptor, matched: &TypeMatch) {
    desc.resolved = matched.spelling.clone();
    desc.raw_pointer = desc.raw_pointer || matched.raw_pointer;
    desc.is_const = matched.is_const;
    desc.ownership = matched.ownership;
    desc.traits = matched.traits;
    for (param, m) in desc.params.iter_mut().zip(&matched.params) {
        apply(param, m);
    }
    if let Some(callable) = &mut desc.callable {
        for (param, m) in callable.params.iter_mut().zip(&matched.callable_params) {
            apply(&mut param.ty, m);
        }
        for (ret, m) in callable.returns.iter_mut().zip(&matched.callable_returns) {
            apply(&mut ret.ty, m);
        }
    }
}

// ============================================================================
// Type Ranking
// ============================================================================

/// Rank `wanted` against `target`, binding template parameters of `target`.
///
/// Top-level const is ignored; const below a pointer or reference may be
/// added but never dropped. Under `strict` only exact matches count.
pub fn type_rank(
    wanted: &NativeType,
    target: &NativeType,
    bindings: &mut Bindings,
    strict: bool,
) -> Option<Rank> {
    if let TypeKind::TemplateParam(name) = &target.kind {
        let value = wanted.unqualified();
        return match bindings.get(name) {
            Some(bound) if *bound == value => Some(Rank::Exact),
            Some(_) => None,
            None => {
                bindings.insert(name.clone(), value);
                Some(Rank::Exact)
            }
        };
    }
    if wanted.unqualified() == target.unqualified() {
        return Some(Rank::Exact);
    }

    match (&wanted.kind, &target.kind) {
        (TypeKind::Builtin(w), TypeKind::Builtin(t)) => {
            let substitutable = w.category() == t.category()
                && matches!(
                    w.category(),
                    NumericCategory::Integral | NumericCategory::Floating
                );
            (substitutable && !strict).then_some(Rank::Promotion)
        }
        (
            TypeKind::Record { name: wn, args: wa },
            TypeKind::Record { name: tn, args: ta },
        ) => {
            if wn != tn || wa.len() != ta.len() {
                return None;
            }
            for (w, t) in wa.iter().zip(ta) {
                match (w, t) {
                    (TemplateArg::Type(w), TemplateArg::Type(t)) => {
                        type_rank(w, t, bindings, true)?;
                    }
                    (TemplateArg::Value(a), TemplateArg::Value(b)) if a == b => {}
                    _ => return None,
                }
            }
            Some(Rank::Exact)
        }
        (TypeKind::Pointer(w), TypeKind::Pointer(t))
        | (TypeKind::LValueRef(w), TypeKind::LValueRef(t))
        | (TypeKind::RValueRef(w), TypeKind::RValueRef(t)) => {
            if w.is_const && !t.is_const {
                return None;
            }
            type_rank(w, t, bindings, true)
        }
        (TypeKind::Function(w), TypeKind::Function(t)) => {
            if w.params.len() != t.params.len() {
                return None;
            }
            type_rank(&w.ret, &t.ret, bindings, true)?;
            for (wp, tp) in w.params.iter().zip(&t.params) {
                type_rank(wp, tp, bindings, true)?;
            }
            Some(Rank::Exact)
        }
        _ => None,
    }
}

// ============================================================================
// Core Matching
// ============================================================================

enum Wanted {
    Type(NativeType),
    /// Qualified template name; arguments come from the descriptor's params.
    Template(String),
}

impl Wanted {
    fn is_pointer(&self) -> bool {
        matches!(self, Wanted::Type(ty) if ty.is_pointer())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decoration {
    Plain,
    Pointer,
    Wrapper(String),
}

/// A native type with its role decoration peeled off.
#[derive(Debug, Clone)]
struct Peeled {
    core: NativeType,
    decoration: Decoration,
    ownership: Ownership,
    is_const: bool,
    by_value: bool,
}

impl Peeled {
    fn plain(core: NativeType, ownership: Ownership, is_const: bool, by_value: bool) -> Self {
        Self {
            core,
            decoration: Decoration::Plain,
            ownership,
            is_const,
            by_value,
        }
    }

    /// Re-apply the peeled decoration around `core`.
    fn spell(&self, core: &NativeType) -> String {
        match &self.decoration {
            Decoration::Plain => core.to_string(),
            Decoration::Pointer => {
                NativeType::pointer_to(core.clone().with_const(self.is_const)).to_string()
            }
            Decoration::Wrapper(template) => format!("{}<{}>", template, core),
        }
    }
}

fn peel(
    ctx: &MatchContext<'_>,
    target: &NativeType,
    role: Role,
    wanted_is_pointer: bool,
) -> Result<Peeled, Mismatch> {
    let (inner, by_ref) = match role {
        Role::Nested => {
            return Ok(Peeled::plain(target.clone(), Ownership::Value, false, false));
        }
        Role::Input => match &target.kind {
            TypeKind::LValueRef(inner) if !inner.is_const => {
                return Err(Mismatch::type_mismatch(format!(
                    "\"{}\" is a non-const reference and cannot receive an input value",
                    target
                )));
            }
            TypeKind::LValueRef(inner) => (inner.as_ref(), true),
            TypeKind::RValueRef(inner) => (inner.as_ref(), false),
            _ => (target, false),
        },
        Role::Output => match &target.kind {
            TypeKind::Pointer(inner) | TypeKind::LValueRef(inner) => {
                if inner.is_const {
                    return Err(Mismatch::structural("Output parameter is constant."));
                }
                (inner.as_ref(), false)
            }
            _ => {
                return Err(Mismatch::structural(
                    "An output parameter must be either a pointer or a reference.",
                ));
            }
        },
        Role::Return | Role::Value => match &target.kind {
            TypeKind::LValueRef(inner) | TypeKind::RValueRef(inner) => (inner.as_ref(), true),
            _ => (target, false),
        },
    };

    if wanted_is_pointer {
        let is_const = inner.pointee().map(|p| p.is_const).unwrap_or(false);
        return Ok(Peeled::plain(
            inner.unqualified(),
            Ownership::RawPointer,
            is_const,
            false,
        ));
    }
    if let TypeKind::Pointer(pointee) = &inner.kind {
        return Ok(Peeled {
            core: pointee.unqualified(),
            decoration: Decoration::Pointer,
            ownership: Ownership::RawPointer,
            is_const: pointee.is_const,
            by_value: false,
        });
    }
    let wrappers = [
        (&ctx.config.unique_ptr_template, Ownership::UniquePtr),
        (&ctx.config.shared_ptr_template, Ownership::SharedPtr),
    ];
    for (template, ownership) in wrappers {
        if let Some(wrapped) = inner.wrapped_by(template) {
            return Ok(Peeled {
                core: wrapped.unqualified(),
                decoration: Decoration::Wrapper(template.clone()),
                ownership,
                is_const: wrapped.is_const,
                by_value: false,
            });
        }
    }
    let ownership = if by_ref {
        Ownership::Reference
    } else {
        Ownership::Value
    };
    Ok(Peeled::plain(
        inner.unqualified(),
        ownership,
        by_ref && inner.is_const,
        !by_ref,
    ))
}

fn match_core(
    ctx: &mut MatchContext<'_>,
    desc: &TypeDescriptor,
    wanted: Wanted,
    target: &NativeType,
    role: Role,
    bindings: &mut Bindings,
    strict: bool,
) -> Result<TypeMatch, Mismatch> {
    let peeled = peel(ctx, target, role, wanted.is_pointer())?;
    if role == Role::Input && desc.raw_pointer && peeled.ownership != Ownership::RawPointer {
        return Err(Mismatch::type_mismatch(format!(
            "expects a pointer but the native type is \"{}\"",
            target
        )));
    }

    let mut trial = bindings.clone();
    let (rank, params, spelling) = match compare(ctx, desc, &wanted, &peeled.core, &mut trial, strict)
    {
        Ok((rank, params)) => {
            *bindings = trial;
            let core = peeled.core.substitute(bindings);
            (rank, params, peeled.spell(&core))
        }
        Err(mismatch) => {
            let Wanted::Type(wanted) = &wanted else {
                return Err(mismatch);
            };
            match relax(ctx, wanted, &peeled, role, strict)? {
                Some((rank, spelling)) => (rank, Vec::new(), spelling),
                None => return Err(mismatch),
            }
        }
    };

    let core = peeled.core.substitute(bindings);
    let is_record = core.record_name().is_some();
    let traits = if is_record {
        ctx.oracle.type_traits(&core)
    } else {
        None
    };
    if let Some(traits) = traits {
        let handed_back = matches!(role, Role::Output | Role::Return)
            && (peeled.by_value || peeled.ownership == Ownership::Reference);
        if handed_back && !traits.is_transferable() {
            return Err(Mismatch::structural(format!(
                "expects output parameters or return types to be copyable or movable; \"{}\" is neither",
                core
            )));
        }
        if role == Role::Input && peeled.by_value && !traits.is_transferable() {
            return Err(Mismatch::structural(format!(
                "\"{}\" is passed by value but is neither copyable nor movable",
                core
            )));
        }
    }

    trace!("matched {} against {} as {:?}", spelling, target, rank);
    Ok(TypeMatch {
        spelling,
        rank,
        raw_pointer: peeled.ownership == Ownership::RawPointer,
        is_const: peeled.is_const,
        ownership: is_record.then_some(peeled.ownership),
        traits: traits.map(|t| DescriptorTraits {
            copyable: t.copyable,
            movable: t.movable,
            is_abstract: t.is_abstract,
            has_default_ctor: t.has_default_ctor,
            trivial_default_ctor: t.trivial_default_ctor,
            trivial_dtor: t.trivial_dtor,
            public_dtor: t.public_dtor,
            to_ptr_conversion: peeled.ownership == Ownership::RawPointer,
            to_unique_ptr_conversion: peeled.ownership == Ownership::UniquePtr,
        }),
        output_param: role == Role::Output,
        params,
        callable_params: Vec::new(),
        callable_returns: Vec::new(),
    })
}

/// Compare the peeled core against what the descriptor wants.
fn compare(
    ctx: &mut MatchContext<'_>,
    desc: &TypeDescriptor,
    wanted: &Wanted,
    core: &NativeType,
    bindings: &mut Bindings,
    strict: bool,
) -> Result<(Rank, Vec<TypeMatch>), Mismatch> {
    match wanted {
        Wanted::Type(wanted) => type_rank(wanted, core, bindings, strict)
            .map(|rank| (rank, Vec::new()))
            .ok_or_else(|| {
                Mismatch::type_mismatch(format!(
                    "\"{}\" does not match native type \"{}\"",
                    wanted, core
                ))
            }),
        Wanted::Template(name) => {
            let TypeKind::Record { name: core_name, args } = &core.kind else {
                return Err(Mismatch::type_mismatch(format!(
                    "\"{}\" is not a specialization of \"{}\"",
                    core, name
                )));
            };
            if core_name != name {
                return Err(Mismatch::type_mismatch(format!(
                    "\"{}\" is not a specialization of \"{}\"",
                    core, name
                )));
            }
            if args.len() != desc.params.len() {
                return Err(Mismatch::type_mismatch(format!(
                    "\"{}\" takes {} template arguments but {} were given",
                    core,
                    args.len(),
                    desc.params.len()
                )));
            }
            let mut rank = Rank::Exact;
            let mut params = Vec::new();
            for (param, arg) in desc.params.iter().zip(args) {
                let matched = match arg {
                    TemplateArg::Value(value) => {
                        let literal = param.hint.as_deref().and_then(parse_integral_literal);
                        if literal != Some(*value) {
                            return Err(Mismatch::type_mismatch(format!(
                                "template argument {} of \"{}\" does not match \"{}\"",
                                value,
                                core,
                                param.hint.as_deref().unwrap_or(&param.lang_type)
                            )));
                        }
                        TypeMatch {
                            spelling: value.to_string(),
                            ..Default::default()
                        }
                    }
                    TemplateArg::Type(arg) => {
                        match_descriptor(ctx, param, arg, Role::Nested, bindings)?
                    }
                };
                rank = rank.max(matched.rank);
                params.push(matched);
            }
            Ok((rank, params))
        }
    }
}

/// Fallbacks after a failed comparison: upcast on input, then a single
/// implicit conversion.
fn relax(
    ctx: &MatchContext<'_>,
    wanted: &NativeType,
    peeled: &Peeled,
    role: Role,
    strict: bool,
) -> Result<Option<(Rank, String)>, Mismatch> {
    if role != Role::Input {
        return Ok(None);
    }
    let core = &peeled.core;
    if wanted.record_name().is_some()
        && core.record_name().is_some()
        && bases::derives_from(ctx.oracle, &wanted.to_string(), &core.to_string())
    {
        return Ok(Some((Rank::Upcast, peeled.spell(wanted))));
    }
    if strict || peeled.decoration != Decoration::Plain {
        return Ok(None);
    }

    let conversions: Vec<_> = ctx
        .oracle
        .implicit_conversions(wanted)
        .into_iter()
        .filter(|c| type_rank(&c.target, core, &mut Bindings::new(), true).is_some())
        .collect();
    match conversions.as_slice() {
        [] => Ok(None),
        [conversion] => {
            let spelling = match conversion.via {
                ConversionVia::Constructor => wanted.to_string(),
                ConversionVia::Operator => core.to_string(),
            };
            Ok(Some((Rank::Conversion, spelling)))
        }
        many => Err(Mismatch::ambiguous(format!(
            "more than one implicit conversion from \"{}\" to \"{}\": {}",
            wanted,
            core,
            many.iter()
                .map(|c| c.declared_by.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

// ============================================================================
// Callables
// ============================================================================

fn match_callable(
    ctx: &mut MatchContext<'_>,
    callable: &CallableDescriptor,
    target: &NativeType,
    bindings: &mut Bindings,
) -> Result<TypeMatch, Mismatch> {
    if callable.returns.len() > 1 {
        return Err(Mismatch::structural(
            "a callable may declare at most one return value",
        ));
    }

    let plain = target.strip_reference().unqualified();
    let signature = match &plain.kind {
        TypeKind::Function(sig) => Some(sig.as_ref().clone()),
        TypeKind::Pointer(inner) => match &inner.kind {
            TypeKind::Function(sig) => Some(sig.as_ref().clone()),
            _ => None,
        },
        TypeKind::Record { .. } => match plain.wrapped_by(&ctx.config.function_wrapper) {
            Some(NativeType {
                kind: TypeKind::Function(sig),
                ..
            }) => Some(sig.as_ref().clone()),
            _ => None,
        },
        _ => None,
    }
    .ok_or_else(|| {
        Mismatch::type_mismatch(format!(
            "expects a callable but the native type is \"{}\"",
            target
        ))
    })?;

    if signature.params.len() != callable.params.len() {
        return Err(Mismatch::type_mismatch(format!(
            "callable takes {} arguments but \"{}\" takes {}",
            callable.params.len(),
            target,
            signature.params.len()
        )));
    }

    let mut rank = Rank::Exact;
    let mut callable_params = Vec::new();
    for (param, native) in callable.params.iter().zip(&signature.params) {
        let matched = match_descriptor(ctx, &param.ty, native, Role::Value, bindings)?;
        rank = rank.max(matched.rank);
        callable_params.push(matched);
    }

    let mut callable_returns = Vec::new();
    match callable.returns.first() {
        None if !signature.ret.is_void() => {
            return Err(Mismatch::type_mismatch(format!(
                "callable returns nothing but \"{}\" returns \"{}\"",
                target, signature.ret
            )));
        }
        None => {}
        Some(_) if signature.ret.is_void() => {
            return Err(Mismatch::type_mismatch(format!(
                "callable returns a value but \"{}\" returns void",
                target
            )));
        }
        Some(ret) => {
            let matched = match_descriptor(ctx, &ret.ty, &signature.ret, Role::Value, bindings)?;
            rank = rank.max(matched.rank);
            callable_returns.push(matched);
        }
    }

    let resolved = NativeType::function(
        signature.ret.substitute(bindings),
        signature
            .params
            .iter()
            .map(|p| p.substitute(bindings))
            .collect(),
    );
    Ok(TypeMatch {
        spelling: format!("{}<{}>", ctx.config.function_wrapper, resolved),
        rank,
        callable_params,
        callable_returns,
        ..Default::default()
    })
}
