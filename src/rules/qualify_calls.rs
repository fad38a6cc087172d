/*!
Rewrites unqualified function calls to their fully qualified form, so the
runtime never has to try the namespaced name first.

A call is qualified only when its target is certain at that point:
- imported with `use function`, or
- written in the global namespace, or
- known to the universe as a global function while no function of the same
  name exists in the current namespace
*/

use std::collections::HashSet;
use std::rc::Rc;

use tracing::info;

use super::{log_progress, RewriteRule};
use crate::analyzer::{ClassIndex, FunctionName, NameContext};
use crate::core::errors::Result;
use crate::engine::{Action, SourceUnit};
use crate::parser::ast::{AstNode, AstNodeType};

/// Names that parse as calls but cannot be written with a leading backslash
const LANGUAGE_CONSTRUCTS: &[&str] = &["exit", "die"];

#[derive(Debug, Clone, Default)]
pub struct QualifyFunctionCalls;

impl QualifyFunctionCalls {
    pub fn new() -> Self {
        Self
    }
}

impl RewriteRule for QualifyFunctionCalls {
    fn name(&self) -> &'static str {
        "qualify-function-calls"
    }

    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize> {
        let total = units.len();
        let mut rewrites = 0;
        for (done, unit) in units.iter_mut().enumerate() {
            log_progress(done + 1, total, unit, "Searching for unqualified function calls");
            let mut qualifier = Qualifier::new(unit.universe().clone());
            let mut rule = |node: &Rc<AstNode>| qualifier.visit(node);
            rewrites += unit.visit(&mut [&mut rule])?.replaced;
        }
        Ok(rewrites)
    }
}

/// Per-unit state: names in effect and the call names chosen for rewriting.
struct Qualifier {
    universe: Rc<ClassIndex>,
    names: NameContext,
    pending: HashSet<*const AstNode>,
}

impl Qualifier {
    fn new(universe: Rc<ClassIndex>) -> Self {
        Self {
            universe,
            names: NameContext::global(),
            pending: HashSet::new(),
        }
    }

    fn visit(&mut self, node: &Rc<AstNode>) -> Action {
        match node.node_type {
            AstNodeType::Namespace => self.names = NameContext::in_namespace(node.text()),
            AstNodeType::Use => self.names.add_use(node),
            AstNodeType::FuncCall => {
                // the name child is visited next and replaced there, so arguments are still walked
                if let Some(name) = node.child(0).filter(|n| n.is(AstNodeType::Name)) {
                    if self.qualified(name.text()).is_some() {
                        self.pending.insert(Rc::as_ptr(name));
                    }
                }
            }
            AstNodeType::Name if self.pending.remove(&Rc::as_ptr(node)) => {
                if let Some(qualified) = self.qualified(node.text()) {
                    info!("Qualified {} as {}", node.text(), qualified);
                    let mut renamed = (**node).clone();
                    renamed.value = Some(qualified);
                    return Action::Replace(Rc::new(renamed));
                }
            }
            _ => {}
        }
        Action::Keep
    }

    /// Fully qualified spelling of an unqualified call name, when certain.
    fn qualified(&self, name: &str) -> Option<String> {
        if name.contains('\\') || LANGUAGE_CONSTRUCTS.contains(&name.to_ascii_lowercase().as_str()) {
            return None;
        }
        let target = match self.names.resolve_function(name) {
            FunctionName::Exact(target) => target,
            FunctionName::Fallback { namespaced, global } => {
                if self.universe.function(&namespaced).is_some() || self.universe.function(&global).is_none() {
                    return None;
                }
                global
            }
        };
        Some(format!("\\{}", target))
    }
}
