//! Overload resolution for functions, methods, operators and constructors.
//!
//! Every live candidate found by [`lookup`] is tried in full: parameter
//! layout, every input, the return slot and every output parameter. The
//! candidate's rank is the worst rank of any of its types. Among the
//! candidates that match, the best rank wins; remaining ties prefer
//! non-deprecated declarations, then non-const methods.

use tracing::trace;

use declmatch_core::{
    ClassDecl, FuncFlags, FuncNode, FunctionDecl, NativeParam, NativeType, Param, DEFAULT_MARKER,
};

use crate::compat::{self, match_descriptor, type_rank, Bindings, Mismatch, Rank, Role, TypeMatch};
use crate::context::MatchContext;
use crate::defaults::{check_order, is_output_shaped, plan_layout, surface_default};
use crate::lookup;

/// The winning candidate for a symbolic function, not yet written back.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub decl: FunctionDecl,
    pub rank: Rank,
    pub overloaded: bool,
    pub operator_function: bool,
    params: Vec<TypeMatch>,
    defaults: Vec<Option<String>>,
    returns: Vec<TypeMatch>,
}

#[derive(Debug)]
struct Candidate {
    decl: FunctionDecl,
    rank: Rank,
    params: Vec<TypeMatch>,
    defaults: Vec<Option<String>>,
    returns: Vec<TypeMatch>,
}

fn describe(decl: &FunctionDecl) -> String {
    let params: Vec<String> = decl.params.iter().map(|p| p.ty.to_string()).collect();
    let constness = if decl.flags.is_const { " const" } else { "" };
    format!(
        "{}({}){} at {}",
        decl.qualified_name,
        params.join(", "),
        constness,
        decl.location
    )
}

fn labelled(mut mismatch: Mismatch, what: &str, index: usize, param: &Param) -> Mismatch {
    let label = if param.name.is_empty() {
        format!("{} {}", what, index + 1)
    } else {
        format!("{} \"{}\"", what, param.name)
    };
    mismatch.detail = format!("{}: {}", label, mismatch.detail);
    mismatch
}

/// Whether a free operator takes the enclosing class as its leading
/// parameter without the symbolic side spelling it.
fn takes_receiver(decl: &FunctionDecl, func: &FuncNode, class: &ClassDecl) -> bool {
    decl.params.len() > func.params.len()
        && decl
            .params
            .first()
            .map(|p| p.ty.base().record_name() == Some(class.template_name()))
            .unwrap_or(false)
}

fn resolve_default(param: &Param, native: &NativeParam) -> Result<Option<String>, Mismatch> {
    match (&param.default_value, &native.default) {
        (None, _) => Ok(None),
        (Some(_), None) => Err(Mismatch::structural(format!(
            "parameter \"{}\" contains unexpected default specifiers",
            param.name
        ))),
        (Some(value), Some(text)) if value == DEFAULT_MARKER => Ok(Some(surface_default(text))),
        (Some(value), Some(_)) => Ok(Some(value.clone())),
    }
}

fn try_candidate(
    ctx: &mut MatchContext<'_>,
    func: &FuncNode,
    decl: &FunctionDecl,
    receiver: Option<&ClassDecl>,
) -> Result<Candidate, Mismatch> {
    if ctx.current_class().is_some() && receiver.is_none() && !decl.flags.is_constructor {
        if decl.flags.is_static && !func.classmethod {
            return Err(Mismatch::type_mismatch(
                "is a static method; declare it as a classmethod",
            ));
        }
        if func.classmethod && decl.flags.is_member {
            return Err(Mismatch::type_mismatch("is not a static method"));
        }
    }

    let ret = if decl.flags.is_constructor {
        NativeType::void()
    } else {
        decl.ret.clone()
    };
    if decl.flags.must_use_result
        && !ret.is_void()
        && (func.ignore_return || func.returns.is_empty())
    {
        return Err(Mismatch::structural("can not ignore must-use return values"));
    }

    let mut bindings = Bindings::new();
    let mut rank = Rank::Exact;
    let native: &[NativeParam] = match receiver {
        Some(class) if takes_receiver(decl, func, class) => {
            let receiver_ty = decl.params[0].ty.strip_reference().unqualified();
            rank = type_rank(&class.as_type(), &receiver_ty, &mut bindings, true).ok_or_else(|| {
                Mismatch::type_mismatch(format!(
                    "receiver \"{}\" does not accept \"{}\"",
                    receiver_ty, class.qualified_name
                ))
            })?;
            &decl.params[1..]
        }
        _ => &decl.params,
    };

    check_order(func)?;
    let layout = plan_layout(func, native, &ret)?;

    let mut params = Vec::with_capacity(func.params.len());
    let mut defaults = Vec::with_capacity(func.params.len());
    for (index, (param, &slot)) in func.params.iter().zip(&layout.inputs).enumerate() {
        let native_param = &native[slot];
        let matched = match_descriptor(ctx, &param.ty, &native_param.ty, Role::Input, &mut bindings)
            .map_err(|mismatch| {
                let mismatch = labelled(mismatch, "parameter", index, param);
                if is_output_shaped(&native_param.ty) {
                    mismatch.with_note("Do all output parameters follow all input parameters?")
                } else {
                    mismatch
                }
            })?;
        rank = rank.max(matched.rank);
        defaults.push(resolve_default(param, native_param)?);
        params.push(matched);
    }

    let targets: Vec<(&NativeType, Role)> = layout
        .return_slot
        .then_some((&ret, Role::Return))
        .into_iter()
        .chain(layout.outputs.iter().map(|&slot| (&native[slot].ty, Role::Output)))
        .collect();
    let mut returns = Vec::with_capacity(func.returns.len());
    for (index, (param, (target, role))) in func.returns.iter().zip(targets).enumerate() {
        let matched = match_descriptor(ctx, &param.ty, target, role, &mut bindings)
            .map_err(|mismatch| labelled(mismatch, "return value", index, param))?;
        rank = rank.max(matched.rank);
        returns.push(matched);
    }

    if !decl.template_params.iter().all(|p| bindings.contains_key(p)) {
        return Err(Mismatch::type_mismatch(
            "template argument deduction did not deduce a value for every template parameter",
        ));
    }

    Ok(Candidate {
        decl: decl.clone(),
        rank,
        params,
        defaults,
        returns,
    })
}

fn pick(ctx: &MatchContext<'_>, mut matched: Vec<Candidate>) -> Result<Candidate, Mismatch> {
    let best = matched.iter().map(|c| c.rank).min().unwrap_or_default();
    matched.retain(|c| c.rank == best);

    if matched.len() > 1
        && ctx.config.prefer_non_deprecated
        && matched.iter().any(|c| !c.decl.flags.is_deprecated)
    {
        matched.retain(|c| !c.decl.flags.is_deprecated);
    }
    if matched.len() > 1 && matched.iter().any(|c| !c.decl.flags.is_const) {
        matched.retain(|c| !c.decl.flags.is_const);
    }

    match matched.len() {
        1 => matched
            .pop()
            .ok_or_else(|| Mismatch::not_found("no candidate left")),
        _ => {
            let listing: Vec<String> = matched.iter().map(|c| describe(&c.decl)).collect();
            Err(Mismatch::ambiguous(format!(
                "{} candidates match equally well:\n{}",
                matched.len(),
                listing.join("\n")
            )))
        }
    }
}

/// Resolve a symbolic function in the current scope.
pub fn resolve_function(ctx: &mut MatchContext<'_>, func: &FuncNode) -> Result<Resolution, Mismatch> {
    let set = if func.constructor {
        let class = ctx
            .current_class()
            .cloned()
            .ok_or_else(|| Mismatch::structural("a constructor must be declared inside a class"))?;
        lookup::find_constructors(ctx, &class)?
    } else {
        lookup::find_functions(ctx, &func.name.name)?
    };
    let receiver = if set.operator_function {
        ctx.current_class().cloned()
    } else {
        None
    };

    let mut matched = Vec::new();
    let mut failures = Vec::new();
    for decl in &set.candidates {
        match try_candidate(ctx, func, decl, receiver.as_ref()) {
            Ok(candidate) => {
                trace!("{} matches at {:?}", describe(decl), candidate.rank);
                matched.push(candidate);
            }
            Err(mismatch) => {
                trace!("{} rejected: {}", describe(decl), mismatch.detail);
                failures.push((decl, mismatch));
            }
        }
    }

    if matched.is_empty() {
        if failures.len() == 1 {
            if let Some((_, mismatch)) = failures.pop() {
                return Err(mismatch);
            }
        }
        let reasons: Vec<String> = failures
            .iter()
            .map(|(decl, mismatch)| format!("{}: {}", describe(decl), mismatch.detail))
            .collect();
        return Err(Mismatch::not_found(format!(
            "none of {} candidates match:\n{}",
            failures.len(),
            reasons.join("\n")
        )));
    }

    let winner = pick(ctx, matched)?;
    if func.constructor && winner.rank == Rank::Conversion {
        let class_name = ctx
            .current_class()
            .map(|c| c.template_name().to_string())
            .unwrap_or_default();
        if winner.decl.is_copy_or_move_ctor(&class_name) {
            return Err(Mismatch::structural(
                "Is the keyword \"explicit\" missing in the native definition of constructors?",
            ));
        }
    }

    Ok(Resolution {
        decl: winner.decl,
        rank: winner.rank,
        overloaded: set.candidates.len() > 1,
        operator_function: set.operator_function,
        params: winner.params,
        defaults: winner.defaults,
        returns: winner.returns,
    })
}

/// Write a resolution into the symbolic function.
pub fn apply_resolution(func: &mut FuncNode, resolution: &Resolution) {
    let decl = &resolution.decl;
    func.name.qualified = decl.qualified_name.clone();
    for ((param, matched), default) in func
        .params
        .iter_mut()
        .zip(&resolution.params)
        .zip(&resolution.defaults)
    {
        compat::apply(&mut param.ty, matched);
        param.default_value = default.clone();
    }
    for (ret, matched) in func.returns.iter_mut().zip(&resolution.returns) {
        compat::apply(&mut ret.ty, matched);
        ret.output_param = matched.output_param;
        ret.default_value = None;
    }
    func.flags = FuncFlags {
        pure_virtual: decl.flags.is_pure_virtual,
        is_virtual: decl.flags.is_virtual,
        overloaded: resolution.overloaded,
        void_return: decl.flags.is_constructor || decl.ret.is_void(),
        operator_function: resolution.operator_function,
        const_method: decl.flags.is_const,
        noexcept: decl.flags.is_noexcept,
        deprecated: decl.flags.is_deprecated,
    };
    func.mangled_name = decl.mangled_name.clone();
}
