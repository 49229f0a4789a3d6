//! Automatic type selector.
//!
//! A symbolic type without a hint is resolved through its type map: the
//! ordered candidates are tried left to right and the first that matches
//! wins. The winning index is cached per (symbolic type, scope, shape) so
//! every later occurrence with the same shape reuses it; decoration is then
//! re-derived for each occurrence without searching again.
//!
//! Candidates are first tried strictly (exact types only), then again with
//! promotions and conversions allowed, so an exact candidate later in the
//! list beats a merely convertible one earlier in the list.

use tracing::trace;

use declmatch_core::{NativeType, TypeDescriptor};

use crate::compat::{match_spelling, Bindings, Mismatch, Role, TypeMatch};
use crate::context::{MatchContext, SelectionKey};

pub fn select(
    ctx: &mut MatchContext<'_>,
    desc: &TypeDescriptor,
    target: &NativeType,
    role: Role,
    bindings: &mut Bindings,
) -> Result<TypeMatch, Mismatch> {
    let candidates: Vec<String> = ctx
        .typemap_candidates(&desc.lang_type)
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    if candidates.is_empty() {
        return Err(Mismatch::not_found(format!(
            "type map for \"{}\" has no candidates",
            desc.lang_type
        )));
    }

    let key = SelectionKey::new(
        &desc.lang_type,
        &ctx.frame().probe,
        target,
        desc.params.len(),
    );
    if let Some(index) = ctx.selection(&key) {
        trace!(
            "reusing {} for {} ({})",
            candidates[index],
            desc.lang_type,
            key.shape
        );
        return match_spelling(ctx, desc, &candidates[index], target, role, bindings, false);
    }

    let mut reasons = Vec::new();
    for strict in [true, false] {
        for (index, candidate) in candidates.iter().enumerate() {
            let mut trial = bindings.clone();
            match match_spelling(ctx, desc, candidate, target, role, &mut trial, strict) {
                Ok(matched) => {
                    trace!(
                        "selected {} for {} against {} (strict: {})",
                        candidate,
                        desc.lang_type,
                        target,
                        strict
                    );
                    *bindings = trial;
                    ctx.remember_selection(key, index);
                    return Ok(matched);
                }
                Err(mismatch) if !strict => {
                    reasons.push(format!("{}: {}", candidate, mismatch.detail));
                }
                Err(_) => {}
            }
        }
    }

    Err(Mismatch::type_mismatch(format!(
        "no candidate for \"{}\" matches \"{}\":\n{}",
        desc.lang_type,
        target,
        reasons.join("\n")
    )))
}
