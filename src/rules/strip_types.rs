//! Removes allow-listed parameter types from methods that cannot be overridden.
//!
//! A method qualifies when it is private, final, or declared in a final class.
//! Promoted constructor parameters keep their types since they also type a property.

use std::rc::Rc;

use tracing::info;

use super::{log_progress, RewriteRule};
use crate::analyzer::Scope;
use crate::core::errors::Result;
use crate::engine::{Action, SourceUnit};
use crate::parser::ast::{AstNode, AstNodeType};

#[derive(Debug, Clone)]
pub struct StripParameterTypes {
    types: Vec<String>,
}

impl StripParameterTypes {
    /// `types` holds type names as written (`int`, `array`) or fully qualified class names.
    pub fn new<S: Into<String>>(types: impl IntoIterator<Item = S>) -> Self {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    fn allows(&self, written: &str, scope: &Scope) -> bool {
        let resolved = scope.resolve_class(written);
        self.types
            .iter()
            .any(|t| t == written || t.trim_start_matches('\\') == resolved)
    }

    fn strip(&self, method: &AstNode, scope: &Scope, class: &str, name: &str) -> Option<AstNode> {
        let final_class = scope.class_info().is_some_and(|c| c.is_final);
        if !(method.has_modifier("private") || method.has_modifier("final") || final_class) {
            return None;
        }
        let list = method.find_child(AstNodeType::ParameterList)?;
        let list_index = method.children.iter().position(|c| Rc::ptr_eq(c, list))?;

        let mut changed = false;
        let mut parameters = Vec::with_capacity(list.children.len());
        for param in &list.children {
            let promoted = param.child(0).is_some_and(|m| !m.text().is_empty());
            let hint = param.slot(1).filter(|_| !promoted);
            match hint {
                Some(hint) if self.allows(hint.text().trim_start_matches('?'), scope) => {
                    info!(
                        "Removed type {} from parameter \"{}\" of method {}::{}",
                        hint.text(),
                        param.text(),
                        class,
                        name
                    );
                    parameters.push(Rc::new(param.with_child(1, Rc::new(AstNode::empty(hint.span)))));
                    changed = true;
                }
                _ => parameters.push(param.clone()),
            }
        }
        if !changed {
            return None;
        }
        let list = Rc::new(list.with_children(parameters));
        Some(method.with_child(list_index, list))
    }
}

impl RewriteRule for StripParameterTypes {
    fn name(&self) -> &'static str {
        "strip-parameter-types"
    }

    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize> {
        let total = units.len();
        let mut rewrites = 0;
        for (done, unit) in units.iter_mut().enumerate() {
            log_progress(done + 1, total, unit, "Searching for types to remove");
            let mut strip = |node: &Rc<AstNode>, scope: &Rc<Scope>, class: &str, member: &str| {
                if !node.is(AstNodeType::ClassMethod) {
                    return Action::Keep;
                }
                match self.strip(node, scope, class, member) {
                    Some(stripped) => Action::Replace(Rc::new(stripped)),
                    None => Action::Keep,
                }
            };
            rewrites += unit.visit_declarations(&mut [&mut strip])?.replaced;
        }
        Ok(rewrites)
    }
}
