/*!
# Semantic context store

Per-unit map from fingerprint to `Scope`, modelled as a two-state machine:

- `Resolved(map)`: lookups are answered from the map
- `Stale`: the next lookup resolves the unit again and moves back to `Resolved`

A committed structural replacement moves a lazy store to `Stale`. An eager
store is filled once from the reference tree before any rewrite and never
goes stale: replaced nodes simply stop matching its keys.
*/

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fingerprint::Fingerprint;
use crate::analyzer::{Analyzer, Scope};
use crate::parser::ast::AstNode;

pub type ContextMap = HashMap<Fingerprint, Rc<Scope>>;

/// When contexts are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Once per batch, over the reference trees, before any rewrite
    #[default]
    Eager,
    /// On first lookup, over the current working tree; cleared by replacements
    Lazy,
}

#[derive(Debug, Clone)]
enum State {
    Stale,
    Resolved(Rc<ContextMap>),
}

#[derive(Debug, Clone)]
pub struct ContextStore {
    mode: ContextMode,
    state: State,
    resolutions: usize,
}

impl ContextStore {
    /// Eager store holding contexts computed ahead of time.
    pub fn eager(contexts: ContextMap) -> Self {
        Self {
            mode: ContextMode::Eager,
            state: State::Resolved(Rc::new(contexts)),
            resolutions: 1,
        }
    }

    /// Lazy store; nothing is computed until the first lookup.
    pub fn lazy() -> Self {
        Self {
            mode: ContextMode::Lazy,
            state: State::Stale,
            resolutions: 0,
        }
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.state, State::Stale)
    }

    /// How many times the unit has been resolved
    pub fn resolutions(&self) -> usize {
        self.resolutions
    }

    /// Marks the contexts outdated after a structural replacement.
    pub fn invalidate(&mut self) {
        if self.mode == ContextMode::Lazy && !self.is_stale() {
            debug!("Context store invalidated");
            self.state = State::Stale;
        }
    }

    /// Current contexts, resolving first when stale.
    pub fn snapshot(&mut self, resolve: impl FnOnce() -> ContextMap) -> Rc<ContextMap> {
        match &self.state {
            State::Resolved(map) => map.clone(),
            State::Stale => {
                let map = Rc::new(resolve());
                self.resolutions += 1;
                debug!("Resolved {} contexts (resolution #{})", map.len(), self.resolutions);
                self.state = State::Resolved(map.clone());
                map
            }
        }
    }

    pub fn get(&mut self, key: &Fingerprint, resolve: impl FnOnce() -> ContextMap) -> Option<Rc<Scope>> {
        self.snapshot(resolve).get(key).cloned()
    }
}

/// Runs `analyzer` over `tree` and keys every visited node's scope by fingerprint.
/// The first context seen for a key wins.
pub fn collect_contexts(analyzer: &dyn Analyzer, path: &Path, tree: &AstNode) -> ContextMap {
    let mut contexts = ContextMap::new();
    analyzer.analyze(path, tree, &mut |node, scope| {
        if let Some(key) = Fingerprint::of(node) {
            contexts.entry(key).or_insert_with(|| scope.clone());
        }
    });
    contexts
}
