/*!
# Rewrite Rules

Catalog of batch rewrites. Every rule is built only from the source unit
adapters (`visit`, `visit_with_scope`, `visit_calls`, `visit_declarations`)
and sees the working trees as left by the previous rule.

| Rule | Adapter |
|---|---|
| `CommentOut` | `visit_calls` |
| `QualifyFunctionCalls` | `visit` |
| `InlineMethodCall` | `find_declaration` + `visit_calls` |
| `NarrowArrayIsset` | `visit_with_scope` |
| `StripParameterTypes` | `visit_declarations` |
| `InlineTrivialAccessors` | `visit_declarations` + `visit` + `visit_calls` |

## Usage

```rust,ignore
use php_preprocessor::rules::{CommentOut, RewriteRule};

let mut rule = CommentOut::new("Logger", "debug");
let rewrites = rule.apply(&mut units)?;
```
*/

pub mod comment_out;
pub mod inline_accessors;
pub mod inline_call;
pub mod narrow_isset;
pub mod qualify_calls;
pub mod strip_types;

pub use comment_out::CommentOut;
pub use inline_accessors::InlineTrivialAccessors;
pub use inline_call::InlineMethodCall;
pub use narrow_isset::NarrowArrayIsset;
pub use qualify_calls::QualifyFunctionCalls;
pub use strip_types::StripParameterTypes;

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analyzer::{FunctionName, Scope};
use crate::core::errors::{PreprocessError, Result};
use crate::engine::{traverse, Action, Declaration, SourceUnit};
use crate::parser::ast::{AstNode, AstNodeType};

/// A named batch rewrite over all units.
pub trait RewriteRule {
    /// Step name as used in configuration files
    fn name(&self) -> &'static str;

    /// Rewrites every unit, returning the number of rewrites made.
    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize>;
}

/// Rule application statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleStats {
    /// Number of times the rule was applied
    pub applications: u64,
    /// Number of nodes rewritten
    pub rewrites: u64,
    /// Average execution time in microseconds
    pub avg_execution_time_us: f64,
    /// Total execution time in microseconds
    pub total_execution_time_us: u64,
}

impl RuleStats {
    /// Update statistics with new execution
    pub fn update(&mut self, rewrites: u64, execution_time_us: u64) {
        self.applications += 1;
        self.rewrites += rewrites;
        self.total_execution_time_us += execution_time_us;
        self.avg_execution_time_us = self.total_execution_time_us as f64 / self.applications as f64;
    }
}

/// `Class::method` target parsed from command line or configuration text.
pub fn parse_target(target: &str) -> Result<(String, String)> {
    match target.rsplit_once("::") {
        Some((class, method)) if !class.is_empty() && !method.is_empty() => {
            Ok((class.trim_start_matches('\\').to_string(), method.to_string()))
        }
        _ => Err(PreprocessError::Config(format!(
            "expected Class::method, got '{}'",
            target
        ))),
    }
}

/// Fails when no unit's universe declares `class::method`.
fn ensure_method(units: &[SourceUnit], class: &str, method: &str) -> Result<()> {
    match units.first() {
        Some(unit) if unit.universe().find_method(class, method).is_none() => Err(PreprocessError::InvalidTarget {
            class: class.to_string(),
            member: method.to_string(),
        }),
        _ => Ok(()),
    }
}

/// The single declaration of `class::method` across all units.
pub fn find_declaration(units: &mut [SourceUnit], class: &str, method: &str) -> Result<Declaration> {
    let mut found = Vec::new();
    for unit in units.iter_mut() {
        found.extend(unit.declarations_of(class, method)?);
    }
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(PreprocessError::DeclarationNotFound {
            class: class.to_string(),
            member: method.to_string(),
        }),
        count => Err(PreprocessError::AmbiguousDeclaration {
            class: class.to_string(),
            member: method.to_string(),
            count,
        }),
    }
}

fn log_progress(done: usize, total: usize, unit: &SourceUnit, activity: &str) {
    info!(
        "[{} / {}] preprocessor >> {} in {}",
        done,
        total,
        activity,
        unit.path().display()
    );
}

/// Fully qualifies class and function names so the body means the same anywhere.
pub(crate) fn qualify_names(body: &Rc<AstNode>, scope: &Scope) -> Result<Rc<AstNode>> {
    let mut roles: HashMap<*const AstNode, Role> = HashMap::new();
    let mut qualify = |node: &Rc<AstNode>| {
        use AstNodeType::*;
        match node.node_type {
            New | StaticCall | StaticPropertyFetch | ClassConstFetch => mark(&mut roles, node.child(0), Role::Class),
            Binary if node.text().eq_ignore_ascii_case("instanceof") => mark(&mut roles, node.child(1), Role::Class),
            FuncCall => mark(&mut roles, node.child(0), Role::Function),
            Name => {
                let qualified = match roles.remove(&Rc::as_ptr(node)) {
                    Some(Role::Class) => Some(format!("\\{}", scope.resolve_class(node.text()))),
                    Some(Role::Function) => qualified_function(node.text(), scope),
                    None => None,
                };
                if let Some(qualified) = qualified.filter(|q| q != node.text()) {
                    let mut renamed = (**node).clone();
                    renamed.value = Some(qualified);
                    return Action::Replace(Rc::new(renamed));
                }
            }
            _ => {}
        }
        Action::Keep
    };
    let (body, _) = traverse(body, &mut [&mut qualify])?;
    Ok(body)
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Class,
    Function,
}

fn mark(roles: &mut HashMap<*const AstNode, Role>, name: Option<&Rc<AstNode>>, role: Role) {
    if let Some(name) = name.filter(|n| n.is(AstNodeType::Name)) {
        roles.insert(Rc::as_ptr(name), role);
    }
}

fn qualified_function(name: &str, scope: &Scope) -> Option<String> {
    let universe = scope.universe();
    let target = match scope.names.resolve_function(name) {
        FunctionName::Exact(target) => target,
        FunctionName::Fallback { namespaced, .. } if universe.function(&namespaced).is_some() => namespaced,
        FunctionName::Fallback { global, .. } if universe.function(&global).is_some() => global,
        FunctionName::Fallback { .. } => return None,
    };
    Some(format!("\\{}", target))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::rc::Rc;

    use crate::analyzer::{Analyzer, ClassIndex, SemanticAnalyzer};
    use crate::engine::{ContextMode, SourceUnit};
    use crate::parser::{PhpParser, SourceParser};

    /// Units sharing one universe built from all of `sources`.
    pub fn units(sources: &[(&str, &str)]) -> Vec<SourceUnit> {
        units_in(ContextMode::Eager, sources)
    }

    pub fn units_in(mode: ContextMode, sources: &[(&str, &str)]) -> Vec<SourceUnit> {
        let parser = PhpParser::new();
        let parsed: Vec<_> = sources.iter().map(|(_, code)| parser.parse(code).unwrap()).collect();
        let universe = Rc::new(ClassIndex::from_trees(
            sources.iter().zip(&parsed).map(|((path, _), p)| (Path::new(*path), p.tree.as_ref())),
        ));
        let analyzer: Rc<dyn Analyzer> = Rc::new(SemanticAnalyzer::new(universe.clone()));
        sources
            .iter()
            .zip(parsed)
            .map(|((path, _), p)| SourceUnit::new(Path::new(*path), p, analyzer.clone(), universe.clone(), mode))
            .collect()
    }

    pub fn unit(code: &str) -> Vec<SourceUnit> {
        units(&[("test.php", code)])
    }
}
