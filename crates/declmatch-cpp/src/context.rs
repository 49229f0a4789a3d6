//! Pass-scoped match context.
//!
//! One [`MatchContext`] lives for one pass. It owns the compiled snapshot,
//! the probe plan, the scope stack, and the type-selection cache, and is
//! threaded explicitly through every matching function.

use std::collections::HashMap;

use declmatch_core::{ClassDecl, DeclTree, MatchConfig, NativeType, Oracle, Snapshot};

use crate::probe::ProbePlan;

/// One level of the scope stack.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Fully qualified native scope, empty for the global scope.
    pub resolved: String,
    /// Scope as written in the decl tree; keys into the probe plan.
    pub probe: String,
    /// The matched class when this frame is a class body.
    pub class: Option<ClassDecl>,
}

impl Frame {
    pub fn namespace(resolved: impl Into<String>, probe: impl Into<String>) -> Self {
        Self {
            resolved: resolved.into(),
            probe: probe.into(),
            class: None,
        }
    }

    pub fn class(class: ClassDecl, probe: impl Into<String>) -> Self {
        Self {
            resolved: class.qualified_name.clone(),
            probe: probe.into(),
            class: Some(class),
        }
    }
}

/// Key of the type-selection cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionKey {
    pub lang_type: String,
    pub scope: String,
    /// Structural shape of the occurrence: the native base type it meets
    /// and the number of nested template arguments.
    pub shape: String,
}

impl SelectionKey {
    pub fn new(lang_type: &str, scope: &str, target: &NativeType, arity: usize) -> Self {
        Self {
            lang_type: lang_type.to_string(),
            scope: scope.to_string(),
            shape: format!("{}/{}", target.base(), arity),
        }
    }
}

pub struct MatchContext<'a> {
    pub oracle: &'a dyn Oracle,
    pub config: &'a MatchConfig,
    snapshot: Snapshot,
    plan: ProbePlan,
    typemaps: HashMap<String, Vec<String>>,
    root_file: String,
    frames: Vec<Frame>,
    selections: HashMap<SelectionKey, usize>,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        oracle: &'a dyn Oracle,
        config: &'a MatchConfig,
        snapshot: Snapshot,
        plan: ProbePlan,
        tree: &DeclTree,
    ) -> Self {
        let typemaps = tree
            .typemaps
            .iter()
            .map(|m| (m.lang_type.clone(), m.candidates.clone()))
            .collect();
        Self {
            oracle,
            config,
            snapshot,
            plan,
            typemaps,
            root_file: tree.source_file.clone(),
            frames: vec![Frame::default()],
            selections: HashMap::new(),
        }
    }

    pub fn root_file(&self) -> &str {
        &self.root_file
    }

    pub fn plan(&self) -> &ProbePlan {
        &self.plan
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// The innermost frame.
    pub fn frame(&self) -> &Frame {
        // The global frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    pub fn current_class(&self) -> Option<&ClassDecl> {
        self.frame().class.as_ref()
    }

    /// Whether the innermost frame is the global scope of the tree.
    pub fn at_top_level(&self) -> bool {
        self.frames.len() == 1
    }

    /// Run `f` with `frame` pushed on the scope stack.
    pub fn with_scope<R>(&mut self, frame: Frame, f: impl FnOnce(&mut Self) -> R) -> R {
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }

    // ------------------------------------------------------------------------
    // Snapshot Queries
    // ------------------------------------------------------------------------

    /// The native type a spelling names in the current scope.
    pub fn hint_type(&self, spelling: &str) -> Result<NativeType, String> {
        let scope = &self.frame().probe;
        let alias = self
            .plan
            .type_alias(scope, spelling)
            .ok_or_else(|| format!("no probe was composed for \"{}\"", spelling))?;
        match self.snapshot.resolved_type(alias) {
            Some(ty) => Ok(ty.clone()),
            None => Err(self
                .snapshot
                .failure(alias)
                .unwrap_or("does not name a type")
                .to_string()),
        }
    }

    /// The qualified template a spelling names in the current scope.
    pub fn template_name(&self, spelling: &str) -> Result<String, String> {
        let scope = &self.frame().probe;
        let alias = self
            .plan
            .template_alias(scope, spelling)
            .ok_or_else(|| format!("no probe was composed for template \"{}\"", spelling))?;
        match self.snapshot.resolved_template(alias) {
            Some(name) => Ok(name.to_string()),
            None => Err(self
                .snapshot
                .failure(alias)
                .unwrap_or("does not name a template")
                .to_string()),
        }
    }

    // ------------------------------------------------------------------------
    // Type Selection
    // ------------------------------------------------------------------------

    pub fn typemap_candidates(&self, lang_type: &str) -> Option<&[String]> {
        self.typemaps.get(lang_type).map(Vec::as_slice)
    }

    pub fn selection(&self, key: &SelectionKey) -> Option<usize> {
        self.selections.get(key).copied()
    }

    pub fn remember_selection(&mut self, key: SelectionKey, index: usize) {
        self.selections.insert(key, index);
    }
}
