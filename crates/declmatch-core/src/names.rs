//! Qualified-name helpers.
//!
//! Native names are spelled with `::` separators and may carry template
//! arguments (`::ns::Box<int>::get`) or operator tokens (`::ns::operator<<`).
//! A leading `::` marks a fully qualified name; the global scope is the empty
//! string.

/// Split a name into its top-level `::` segments.
///
/// Separators nested inside template argument lists are not split points,
/// and an operator segment always runs to the end of the name.
pub fn segments(name: &str) -> Vec<&str> {
    let body = name.strip_prefix("::").unwrap_or(name);
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if depth == 0 && i == start && is_operator_bytes(&bytes[i..]) {
            break;
        }
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                out.push(&body[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    out.push(&body[start..]);
    out
}

/// Qualify `name` relative to `scope`. Fully qualified names are returned as given.
pub fn qualify(scope: &str, name: &str) -> String {
    if name.starts_with("::") {
        name.to_string()
    } else if scope.is_empty() {
        format!("::{}", name)
    } else {
        format!("{}::{}", scope, name)
    }
}

/// Parent of a qualified scope: `::a::b` -> `::a`, `::a` -> global, global -> none.
pub fn parent_scope(scope: &str) -> Option<String> {
    if scope.is_empty() {
        return None;
    }
    let (parent, _) = split_last(scope);
    Some(parent)
}

/// Split a qualified name into its enclosing scope and final segment.
pub fn split_last(name: &str) -> (String, String) {
    let mut segs = segments(name);
    let last = segs.pop().unwrap_or_default().to_string();
    if segs.is_empty() {
        (String::new(), last)
    } else {
        (format!("::{}", segs.join("::")), last)
    }
}

/// The final segment of a name.
pub fn simple_name(name: &str) -> &str {
    segments(name).pop().unwrap_or(name)
}

/// Scopes visited when resolving a partial name from `scope`, innermost first.
pub fn outward_scopes(scope: &str) -> Vec<String> {
    let mut out = vec![scope.to_string()];
    let mut current = scope.to_string();
    while let Some(parent) = parent_scope(&current) {
        out.push(parent.clone());
        current = parent;
    }
    out
}

/// Enclosing scope of a qualified name without the leading `::`.
///
/// Template arguments are not part of a namespace, so `::base<int>` has none.
pub fn namespace_of(name: &str) -> String {
    let (scope, _) = split_last(name);
    scope.trim_start_matches("::").to_string()
}

/// Drop a trailing template argument list: `Box<int>` -> `Box`.
pub fn strip_template_args(segment: &str) -> &str {
    if is_operator(segment) {
        return segment;
    }
    match segment.find('<') {
        Some(idx) => segment[..idx].trim_end(),
        None => segment,
    }
}

/// Whether a name segment spells an operator (`operator==`, `operator bool`).
pub fn is_operator(segment: &str) -> bool {
    is_operator_bytes(segment.as_bytes())
}

/// Whether a name segment spells a conversion function (`operator bool`).
pub fn is_conversion_operator(segment: &str) -> bool {
    segment
        .strip_prefix("operator")
        .map(|rest| rest.starts_with(char::is_whitespace))
        .unwrap_or(false)
        && is_operator(segment)
}

fn is_operator_bytes(bytes: &[u8]) -> bool {
    match bytes.strip_prefix(b"operator") {
        Some(rest) => match rest.first() {
            Some(c) => !(c.is_ascii_alphanumeric() || *c == b'_'),
            None => false,
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_segments_plain() {
        assert_eq!(segments("::a::b::c"), vec!["a", "b", "c"]);
        assert_eq!(segments("a"), vec!["a"]);
    }

    #[test]
    fn test_names_segments_template_args_not_split() {
        assert_eq!(
            segments("::ns::Box<::ns::Item>::get"),
            vec!["ns", "Box<::ns::Item>", "get"]
        );
    }

    #[test]
    fn test_names_segments_operator_runs_to_end() {
        assert_eq!(segments("::user::operator<<"), vec!["user", "operator<<"]);
        assert_eq!(segments("::operator*"), vec!["operator*"]);
    }

    #[test]
    fn test_names_operator_detection() {
        assert!(is_operator("operator=="));
        assert!(is_operator("operator bool"));
        assert!(!is_operator("operatorName"));
        assert!(!is_operator("operator_like"));
        assert!(is_conversion_operator("operator bool"));
        assert!(!is_conversion_operator("operator=="));
    }

    #[test]
    fn test_names_qualify_and_split() {
        assert_eq!(qualify("", "Foo"), "::Foo");
        assert_eq!(qualify("::ns", "Foo"), "::ns::Foo");
        assert_eq!(qualify("::ns", "::Foo"), "::Foo");
        assert_eq!(split_last("::ns::Foo"), ("::ns".to_string(), "Foo".to_string()));
        assert_eq!(split_last("::Foo"), (String::new(), "Foo".to_string()));
    }

    #[test]
    fn test_names_outward_scopes() {
        assert_eq!(outward_scopes("::a::b"), vec!["::a::b", "::a", ""]);
        assert_eq!(outward_scopes(""), vec![""]);
    }

    #[test]
    fn test_names_namespace_of() {
        assert_eq!(namespace_of("::GrandParents::grandparent"), "GrandParents");
        assert_eq!(namespace_of("::base<int>"), "");
    }

    #[test]
    fn test_names_strip_template_args() {
        assert_eq!(strip_template_args("Box<int>"), "Box");
        assert_eq!(strip_template_args("operator<"), "operator<");
    }
}
