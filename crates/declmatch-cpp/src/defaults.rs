//! Default argument validation and parameter layout.
//!
//! Maps the symbolic inputs and returns of a function onto native parameter
//! slots, and decides which native parameters are left to their defaults.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use declmatch_core::{FuncNode, NativeParam, NativeType, TypeKind, DEFAULT_MARKER};

use crate::compat::Mismatch;

/// Where each symbolic value lives in the native signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Native slot of each symbolic input, in order.
    pub inputs: Vec<usize>,
    /// The first symbolic return maps to the native return value.
    pub return_slot: bool,
    /// Native slot of each remaining symbolic return, in order.
    pub outputs: Vec<usize>,
    /// Native slots left to their defaults.
    pub omitted: Vec<usize>,
}

/// Symbolic parameters with a default specifier must all follow the
/// required ones.
pub fn check_order(func: &FuncNode) -> Result<(), Mismatch> {
    let mut seen_default = false;
    for param in &func.params {
        match (&param.default_value, seen_default) {
            (Some(_), _) => seen_default = true,
            (None, true) => {
                return Err(Mismatch::structural(
                    "expects all required parameters to be placed before default arguments",
                ));
            }
            (None, false) => {}
        }
    }
    Ok(())
}

/// Non-const pointer or non-const lvalue reference.
pub fn is_output_shaped(ty: &NativeType) -> bool {
    match &ty.kind {
        TypeKind::Pointer(inner) | TypeKind::LValueRef(inner) => !inner.is_const,
        _ => false,
    }
}

/// Lay out a symbolic function over native parameters.
pub fn plan_layout(
    func: &FuncNode,
    native: &[NativeParam],
    native_ret: &NativeType,
) -> Result<Layout, Mismatch> {
    let n = func.params.len();
    let m = func.returns.len();
    let return_slot = !native_ret.is_void() && !func.ignore_return && m > 0;
    let k = m - usize::from(return_slot);
    let total = native.len();

    if n + k > total {
        return Err(Mismatch::type_mismatch(format!(
            "Too many arguments: {} inputs and {} outputs for {} native parameters",
            n, k, total
        )));
    }

    let inputs: Vec<usize> = (0..n).collect();
    let all_default = |range: Range<usize>| native[range].iter().all(|p| p.default.is_some());
    let all_output = |range: Range<usize>| native[range].iter().all(|p| is_output_shaped(&p.ty));

    let positional = n..n + k;
    let tail = total - k..total;
    let positional_omits_defaults = all_default(n + k..total);
    let tail_omits_defaults = all_default(n..total - k);

    let use_tail = k > 0
        && n + k < total
        && ((all_output(tail.clone()) && !all_output(positional.clone()))
            || (!positional_omits_defaults && tail_omits_defaults));

    if use_tail {
        if !tail_omits_defaults {
            return Err(Mismatch::structural(
                "output parameter follows an input parameter omitted without a default",
            ));
        }
        return Ok(Layout {
            inputs,
            return_slot,
            outputs: tail.collect(),
            omitted: (n..total - k).collect(),
        });
    }

    if !positional_omits_defaults {
        let missing: Vec<&str> = native[n + k..total]
            .iter()
            .filter(|p| p.default.is_none())
            .map(|p| p.name.as_str())
            .collect();
        return Err(Mismatch::type_mismatch(format!(
            "Too few arguments: no default for native parameter(s) {}",
            missing.join(", ")
        )));
    }
    Ok(Layout {
        inputs,
        return_slot,
        outputs: positional.collect(),
        omitted: (n + k..total).collect(),
    })
}

static SIMPLE_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:[-+]?(?:0[xX][0-9a-fA-F]+|\d+\.?\d*(?:[eE][-+]?\d+)?|\.\d+(?:[eE][-+]?\d+)?)[uUlLfF]*|true|false|nullptr|'(?:[^'\\]|\\.)+'|"(?:[^"\\]|\\.)*")$"#,
    )
    .unwrap()
});

/// The default value surfaced for a symbolic default specifier.
///
/// Simple literals are passed through; anything else stays the bare
/// marker, meaning "a default exists".
pub fn surface_default(native_default: &str) -> String {
    let text = native_default.trim();
    if SIMPLE_LITERAL.is_match(text) {
        text.to_string()
    } else {
        DEFAULT_MARKER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declmatch_core::{Builtin, Param, TypeDescriptor};

    fn native(specs: &[(&str, NativeType, Option<&str>)]) -> Vec<NativeParam> {
        specs
            .iter()
            .map(|(name, ty, default)| NativeParam {
                name: name.to_string(),
                ty: ty.clone(),
                default: default.map(str::to_string),
            })
            .collect()
    }

    fn int() -> NativeType {
        NativeType::builtin(Builtin::Int)
    }

    fn int_ptr() -> NativeType {
        NativeType::pointer_to(int())
    }

    fn func(inputs: usize, defaults: usize, returns: usize) -> FuncNode {
        let mut func = FuncNode::default();
        for i in 0..inputs {
            let mut param = Param::new(format!("a{}", i), TypeDescriptor::new("int"));
            if i >= inputs - defaults {
                param = param.with_default(DEFAULT_MARKER);
            }
            func.params.push(param);
        }
        for i in 0..returns {
            func.returns.push(Param::new(format!("r{}", i), TypeDescriptor::new("int")));
        }
        func
    }

    #[test]
    fn test_defaults_order_check() {
        let mut f = func(2, 1, 0);
        assert!(check_order(&f).is_ok());
        f.params.swap(0, 1);
        let err = check_order(&f).unwrap_err();
        assert!(err.detail.contains("required parameters to be placed before default"));
    }

    #[test]
    fn test_defaults_arity_window() {
        let params = native(&[
            ("a", int(), None),
            ("b", int(), Some("0")),
            ("c", int(), Some("1")),
        ]);
        let void = NativeType::void();
        assert!(plan_layout(&func(0, 0, 0), &params, &void).is_err());
        for n in 1..=3 {
            let layout = plan_layout(&func(n, 0, 0), &params, &void).unwrap();
            assert_eq!(layout.inputs.len(), n);
            assert_eq!(layout.omitted, (n..3).collect::<Vec<_>>());
        }
        let err = plan_layout(&func(4, 0, 0), &params, &void).unwrap_err();
        assert!(err.detail.starts_with("Too many arguments"));
    }

    #[test]
    fn test_defaults_outputs_follow_inputs() {
        let params = native(&[("a", int(), None), ("out", int_ptr(), None)]);
        let layout = plan_layout(&func(1, 0, 1), &params, &NativeType::void()).unwrap();
        assert!(!layout.return_slot);
        assert_eq!(layout.outputs, vec![1]);

        let layout = plan_layout(&func(1, 0, 1), &params[..1], &int()).unwrap();
        assert!(layout.return_slot);
        assert!(layout.outputs.is_empty());
    }

    #[test]
    fn test_defaults_outputs_move_to_tail_after_defaults() {
        let params = native(&[
            ("a", int(), None),
            ("b", int(), Some("3")),
            ("out", int_ptr(), None),
        ]);
        let layout = plan_layout(&func(1, 0, 1), &params, &NativeType::void()).unwrap();
        assert_eq!(layout.outputs, vec![2]);
        assert_eq!(layout.omitted, vec![1]);
    }

    #[test]
    fn test_defaults_output_after_omitted_required_input() {
        let params = native(&[
            ("a", int(), None),
            ("b", int(), None),
            ("out", int_ptr(), None),
        ]);
        let err = plan_layout(&func(1, 0, 1), &params, &NativeType::void()).unwrap_err();
        assert_eq!(
            err.detail,
            "output parameter follows an input parameter omitted without a default"
        );
    }

    #[test]
    fn test_defaults_surface_simple_literals() {
        assert_eq!(surface_default("0"), "0");
        assert_eq!(surface_default(" -1.5f "), "-1.5f");
        assert_eq!(surface_default("0x10u"), "0x10u");
        assert_eq!(surface_default("true"), "true");
        assert_eq!(surface_default("nullptr"), "nullptr");
        assert_eq!(surface_default("'a'"), "'a'");
        assert_eq!(surface_default("\"name\""), "\"name\"");
        assert_eq!(surface_default("Klass()"), DEFAULT_MARKER);
        assert_eq!(surface_default("kLimit * 2"), DEFAULT_MARKER);
    }

    #[test]
    fn test_defaults_output_shape() {
        assert!(is_output_shaped(&int_ptr()));
        assert!(is_output_shaped(&NativeType::lvalue_ref_to(int())));
        assert!(!is_output_shaped(&NativeType::lvalue_ref_to(int().with_const(true))));
        assert!(!is_output_shaped(&int()));
    }
}
