/*!
Replaces calls to a one-expression method with the method's expression.

The declaration must be unique across the batch and its body must be a single
expression statement or `return <expr>;`. At each call site, parameters are
substituted positionally by copies of the call's arguments (a parameter's
default stands in for a missing argument) and `$this` by a copy of the
receiver. Every occurrence gets its own copy, so an argument used twice is
evaluated twice and an unused argument is dropped. A call site is skipped when
an argument would land at the head of a string interpolation without being a
variable-rooted expression, since `{...}` only interpolates those.

Class and function names in the body are fully qualified against the
declaring file before being copied elsewhere.
*/

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{info, warn};

use super::{ensure_method, find_declaration, log_progress, qualify_names, RewriteRule};
use crate::analyzer::Scope;
use crate::core::errors::{PreprocessError, Result};
use crate::engine::{traverse, Action, Declaration, SourceUnit};
use crate::parser::ast::{AstNode, AstNodeType};
use crate::parser::lexer::is_nowdoc;

#[derive(Debug, Clone)]
pub struct InlineMethodCall {
    class: String,
    method: String,
}

/// Body expression and parameters of the inlined declaration.
struct Template {
    body: Rc<AstNode>,
    parameters: Vec<(String, Option<Rc<AstNode>>)>,
}

impl InlineMethodCall {
    pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }

    fn not_inlinable(&self, reason: &str) -> PreprocessError {
        PreprocessError::NotInlinable {
            class: self.class.clone(),
            member: self.method.clone(),
            reason: reason.to_string(),
        }
    }

    fn template(&self, declaration: &Declaration) -> Result<Template> {
        let method = &declaration.node;
        let body = method
            .slot(3)
            .filter(|b| b.is(AstNodeType::Block))
            .ok_or_else(|| self.not_inlinable("method has no body"))?;
        let statement = match body.children.as_slice() {
            [single] => single,
            _ => return Err(self.not_inlinable("body is not a single statement")),
        };
        let expression = match statement.node_type {
            AstNodeType::ExpressionStatement | AstNodeType::Return => statement.slot(0),
            _ => None,
        }
        .ok_or_else(|| self.not_inlinable("body is not an expression statement or return"))?;
        if !expression.find_all(AstNodeType::Closure).is_empty() {
            return Err(self.not_inlinable("body contains a closure"));
        }
        let interpolating_heredoc = expression
            .find_all(AstNodeType::StringLiteral)
            .iter()
            .any(|s| s.has_flag("heredoc") && !is_nowdoc(s.text()) && s.text().contains('$'));
        if interpolating_heredoc {
            return Err(self.not_inlinable("body interpolates variables in a heredoc"));
        }

        let mut parameters = Vec::new();
        for param in method.parameters() {
            if param.has_flag("variadic") || param.has_flag("by_ref") {
                return Err(self.not_inlinable("variadic and by-reference parameters are not supported"));
            }
            parameters.push((param.text().to_string(), param.slot(2).map(|d| d.fresh_clone())));
        }

        let body = qualify_names(&expression.fresh_clone(), &declaration.scope)?;
        Ok(Template { body, parameters })
    }
}

impl RewriteRule for InlineMethodCall {
    fn name(&self) -> &'static str {
        "inline-method-call"
    }

    fn apply(&mut self, units: &mut [SourceUnit]) -> Result<usize> {
        ensure_method(units, &self.class, &self.method)?;
        let declaration = find_declaration(units, &self.class, &self.method)?;
        let template = self.template(&declaration)?;
        let label = format!("{}::{}", declaration.class, declaration.member);

        let total = units.len();
        let mut rewrites = 0;
        for (done, unit) in units.iter_mut().enumerate() {
            let activity = format!("Searching for {}::{} references", self.class, self.method);
            log_progress(done + 1, total, unit, &activity);
            let mut inline = |call: &Rc<AstNode>, scope: &Rc<Scope>| match instantiate(&template, call) {
                Ok(expression) => {
                    info!("Inlined {} at {}", label, scope.location(call.line()));
                    Action::Replace(expression)
                }
                Err(reason) => {
                    warn!("[{}] Not inlining {}: {}", scope.location(call.line()), label, reason);
                    Action::Keep
                }
            };
            rewrites += unit.visit_calls(&self.class, &self.method, &mut [&mut inline])?.replaced;
        }
        Ok(rewrites)
    }
}

/// Copy of the template body for one call site.
fn instantiate(template: &Template, call: &AstNode) -> std::result::Result<Rc<AstNode>, String> {
    let arguments = call.child(2).map(|a| a.children.as_slice()).unwrap_or_default();
    if arguments.iter().any(|a| a.is(AstNodeType::Unary) && a.text() == "...") {
        return Err("argument unpacking".to_string());
    }
    if arguments.len() > template.parameters.len() {
        return Err("more arguments than parameters".to_string());
    }

    let mut bindings: HashMap<&str, Rc<AstNode>> = HashMap::new();
    for (i, (name, default)) in template.parameters.iter().enumerate() {
        let value = arguments.get(i).or(default.as_ref()).ok_or_else(|| format!("missing argument ${}", name))?;
        bindings.insert(name.as_str(), value.clone());
    }
    let receiver = match call.node_type {
        AstNodeType::MethodCall => call.child(0).cloned(),
        _ => None,
    };

    let mut failure = None;
    let mut substitute = |node: &Rc<AstNode>| {
        if node.is(AstNodeType::InterpolatedString) {
            let breaks_string = node.children.iter().filter_map(|part| head_variable(part)).any(|name| {
                let value = match name {
                    "this" => receiver.as_ref(),
                    other => bindings.get(other),
                };
                value.is_some_and(|v| head_variable(v).is_none())
            });
            if breaks_string {
                failure = Some("argument interpolated into string".to_string());
                return Action::Stop;
            }
            return Action::Keep;
        }
        if !node.is(AstNodeType::Variable) {
            return Action::Keep;
        }
        if node.text() == "this" {
            return match &receiver {
                Some(receiver) => Action::Replace(receiver.deep_clone()),
                None => {
                    failure = Some("$this in a static call".to_string());
                    Action::Stop
                }
            };
        }
        match bindings.get(node.text()) {
            Some(value) => Action::Replace(value.deep_clone()),
            None => Action::Keep,
        }
    };
    let (body, _) = traverse(&template.body, &mut [&mut substitute]).map_err(|e| e.to_string())?;
    match failure {
        Some(reason) => Err(reason),
        None => Ok(body),
    }
}

/// Name of the variable an access chain starts from: `$a` in `$a->b()[0]`.
fn head_variable(node: &AstNode) -> Option<&str> {
    match node.node_type {
        AstNodeType::Variable => Some(node.text()),
        AstNodeType::PropertyFetch | AstNodeType::MethodCall | AstNodeType::ArrayDimFetch => {
            node.child(0).and_then(|base| head_variable(base))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{unit, units};
    use pretty_assertions::assert_eq;

    const MATH: &str = "<?php
namespace App;

final class Math {
    public function twice(int $x) : int {
        return $x + $x;
    }

    public function scaled(int $x, int $by = 10) : int {
        return $x * $by * $this->factor;
    }

    public static function make() : self {
        return new self();
    }

    public function noisy() {
        echo 1;
        return 2;
    }
}

function run(Math $m) {
    $a = $m->twice(f(1));
    $b = 3 * $m->scaled(1 + 2);
    $c = Math::make();
}
";

    #[test]
    fn test_each_occurrence_gets_its_own_argument_copy() {
        let mut units = unit(MATH);
        let count = InlineMethodCall::new("App\\Math", "twice").apply(&mut units).unwrap();
        assert_eq!(count, 1);
        let output = units[0].regenerate().unwrap();
        assert!(output.contains("$a = f(1) + f(1);"), "{}", output);

        let working = units[0].working().clone();
        let sums: Vec<&AstNode> = working
            .find_all(AstNodeType::Binary)
            .into_iter()
            .filter(|b| b.text() == "+" && b.children.iter().all(|c| c.is(AstNodeType::FuncCall)))
            .collect();
        assert_eq!(sums.len(), 1);
        assert!(!Rc::ptr_eq(&sums[0].children[0], &sums[0].children[1]));
    }

    #[test]
    fn test_defaults_receiver_and_parentheses() {
        let mut units = unit(MATH);
        InlineMethodCall::new("App\\Math", "scaled").apply(&mut units).unwrap();
        let output = units[0].regenerate().unwrap();
        assert!(output.contains("$b = 3 * ((1 + 2) * 10 * $m->factor);"), "{}", output);
    }

    #[test]
    fn test_class_names_are_qualified() {
        let mut units = unit(MATH);
        InlineMethodCall::new("App\\Math", "make").apply(&mut units).unwrap();
        let output = units[0].regenerate().unwrap();
        assert!(output.contains("$c = new \\App\\Math();"), "{}", output);
    }

    #[test]
    fn test_multi_statement_body_is_rejected() {
        let mut units = unit(MATH);
        let err = InlineMethodCall::new("App\\Math", "noisy").apply(&mut units).unwrap_err();
        assert!(matches!(err, PreprocessError::NotInlinable { .. }));
        assert!(err.is_lookup());
    }

    #[test]
    fn test_ambiguous_declaration_across_units() {
        let mut units = units(&[
            ("a.php", "<?php class A { public function f() { return 1; } }"),
            ("b.php", "<?php class B extends A { public function f() { return 2; } }"),
        ]);
        let err = InlineMethodCall::new("A", "f").apply(&mut units).unwrap_err();
        assert!(matches!(err, PreprocessError::AmbiguousDeclaration { count: 2, .. }));
    }

    #[test]
    fn test_string_interpolation_only_takes_variables() {
        let code = "<?php
class Greeter {
    public function hi($name) { return \"Hello $name\"; }
    public function note($text) { return <<<EOT
Note: $text
EOT; }
}
function run(Greeter $g, $user) {
    $a = $g->hi(strtoupper('x'));
    $b = $g->hi($user->name);
}
";
        let mut units = unit(code);
        assert_eq!(InlineMethodCall::new("Greeter", "hi").apply(&mut units).unwrap(), 1);
        let output = units[0].regenerate().unwrap();
        assert!(output.contains("$a = $g->hi(strtoupper('x'));"), "{}", output);
        assert!(output.contains("$b = \"Hello {$user->name}\";"), "{}", output);

        let err = InlineMethodCall::new("Greeter", "note").apply(&mut units).unwrap_err();
        assert!(matches!(err, PreprocessError::NotInlinable { .. }));
    }
}
