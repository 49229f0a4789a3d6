//! Base class resolution.
//!
//! Flattens the inheritance graph of a matched class into an ordered,
//! deduplicated base list by depth-first traversal in declaration order.
//!
//! # Diamonds
//!
//! Each base is tracked by its fully qualified, template-substituted name.
//! A base reached again only through virtual edges shares one subobject and
//! is dropped silently. A base that would exist as two subobjects (two
//! non-virtual paths, or a non-virtual path next to a virtual one) makes the
//! whole class unusable.
//!
//! ```text
//!       A            A   A
//!      / \  virtual  |   |
//!     B   C          B   C
//!      \ /            \ /
//!       D              D
//!   A listed once    "Non-virtual diamond inheritance."
//! ```

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::trace;

use declmatch_core::names;
use declmatch_core::{BaseEdge, BaseRef, ClassDecl, Oracle};

/// Errors that make a base list impossible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BaseError {
    #[error("Non-virtual diamond inheritance.")]
    NonVirtualDiamond { class_name: String, base_name: String },

    #[error("cyclic inheritance through '{base_name}'")]
    Cycle { class_name: String, base_name: String },
}

impl BaseError {
    /// Extra context for diagnostics.
    pub fn context(&self) -> String {
        match self {
            BaseError::NonVirtualDiamond {
                class_name,
                base_name,
            } => format!(
                "{} is reachable from {} through more than one non-virtual path.",
                base_name, class_name
            ),
            BaseError::Cycle { class_name, .. } => {
                format!("{} inherits from itself.", class_name)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Subobjects {
    virtual_seen: bool,
    non_virtual: usize,
}

impl Subobjects {
    fn count(&self) -> usize {
        self.non_virtual + usize::from(self.virtual_seen)
    }
}

struct Walker<'a> {
    oracle: &'a dyn Oracle,
    root: &'a str,
    seen: HashMap<String, Subobjects>,
    in_progress: HashSet<String>,
    order: Vec<BaseRef>,
}

impl Walker<'_> {
    fn visit(&mut self, edges: &[BaseEdge]) -> Result<(), BaseError> {
        for edge in edges {
            if self.in_progress.contains(&edge.name) {
                return Err(BaseError::Cycle {
                    class_name: self.root.to_string(),
                    base_name: edge.name.clone(),
                });
            }
            let first_visit = !self.seen.contains_key(&edge.name);
            let state = self.seen.entry(edge.name.clone()).or_default();
            if edge.is_virtual {
                if state.virtual_seen {
                    trace!("shared virtual base {} of {}", edge.name, self.root);
                    continue;
                }
                state.virtual_seen = true;
            } else {
                state.non_virtual += 1;
            }
            if state.count() > 1 {
                return Err(BaseError::NonVirtualDiamond {
                    class_name: self.root.to_string(),
                    base_name: edge.name.clone(),
                });
            }
            if !first_visit {
                continue;
            }

            self.order.push(BaseRef {
                qualified: edge.name.clone(),
                namespace: names::namespace_of(&edge.name),
                file: edge.location.file.clone(),
            });
            self.in_progress.insert(edge.name.clone());
            let next = self.oracle.base_classes(&edge.name);
            self.visit(&next)?;
            self.in_progress.remove(&edge.name);
        }
        Ok(())
    }
}

/// Ordered, deduplicated bases of a matched class.
pub fn resolve_bases(oracle: &dyn Oracle, class: &ClassDecl) -> Result<Vec<BaseRef>, BaseError> {
    let mut walker = Walker {
        oracle,
        root: &class.qualified_name,
        seen: HashMap::new(),
        in_progress: HashSet::from([class.qualified_name.clone()]),
        order: Vec::new(),
    };
    walker.visit(&class.bases)?;
    Ok(walker.order)
}

/// Whether `derived` has `base` among its (transitive) bases.
pub fn derives_from(oracle: &dyn Oracle, derived: &str, base: &str) -> bool {
    let mut stack = vec![derived.to_string()];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        for edge in oracle.base_classes(&current) {
            if edge.name == base {
                return true;
            }
            stack.push(edge.name);
        }
    }
    false
}
