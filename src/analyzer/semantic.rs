/*!
# Semantic Analyzer

Inference engine collaborator. Walks one tree in evaluation order and hands
every node, together with the `Scope` in effect at that node, to an injected
callback. The callback is the only output: nothing is registered globally and
nothing outlives the call.

Tracked facts:
- namespace and `use` imports
- enclosing class, method and function
- local variable types from parameters, `$this`, assignments, `foreach`,
  `catch` and closure captures; alternative branches are joined by union
*/

use std::path::Path;
use std::rc::Rc;

use super::index::ClassIndex;
use super::names::NameContext;
use super::scope::{Locals, Scope};
use super::types::Type;
use crate::parser::ast::{AstNode, AstNodeType};

/// Callback receiving each visited node with its semantic context.
pub type NodeCallback<'c> = &'c mut dyn FnMut(&AstNode, &Rc<Scope>);

/// Seam for the inference engine: visits every node reachable in normal
/// evaluation order and supplies a context for each.
pub trait Analyzer {
    fn analyze(&self, path: &Path, tree: &AstNode, on_node: NodeCallback<'_>);
}

/// Reference inference engine over a shared declaration universe.
#[derive(Debug, Clone)]
pub struct SemanticAnalyzer {
    universe: Rc<ClassIndex>,
}

impl SemanticAnalyzer {
    pub fn new(universe: Rc<ClassIndex>) -> Self {
        Self { universe }
    }

    pub fn universe(&self) -> &Rc<ClassIndex> {
        &self.universe
    }
}

impl Analyzer for SemanticAnalyzer {
    fn analyze(&self, path: &Path, tree: &AstNode, on_node: NodeCallback<'_>) {
        let mut scope = Rc::new(Scope::new(
            path,
            Rc::new(NameContext::global()),
            self.universe.clone(),
        ));
        let mut walker = Walker { on_node };
        walker.walk(tree, &mut scope);
    }
}

struct Walker<'c> {
    on_node: NodeCallback<'c>,
}

impl Walker<'_> {
    fn walk(&mut self, node: &AstNode, scope: &mut Rc<Scope>) {
        (self.on_node)(node, scope);

        use AstNodeType::*;
        match node.node_type {
            Namespace => {
                let names = Rc::new(NameContext::in_namespace(node.text()));
                match node.slot(0) {
                    Some(body) => {
                        let mut inner = Rc::new(scope.with_names(names));
                        self.walk(body, &mut inner);
                    }
                    None => {
                        *scope = Rc::new(scope.with_names(names));
                        self.walk_children(node, scope);
                    }
                }
            }
            Use => {
                let context = &mut Rc::make_mut(scope).names;
                Rc::make_mut(context).add_use(node);
                self.walk_children(node, scope);
            }
            ClassDeclaration => {
                let class = scope.names.declare(node.text());
                let mut inner = Rc::new(scope.in_class(class));
                self.walk_children(node, &mut inner);
            }
            ClassMethod => {
                let mut locals = self.parameters(node, scope);
                if let (false, Some(class)) = (node.has_modifier("static"), scope.class.clone()) {
                    locals.insert("this".to_string(), Type::object(class));
                }
                let mut inner = Rc::new(scope.in_function(Some(node.text().to_string()), locals));
                self.walk_children(node, &mut inner);
            }
            FunctionDeclaration => {
                let locals = self.parameters(node, scope);
                let mut inner = Rc::new(scope.in_function(Some(node.text().to_string()), locals));
                self.walk_children(node, &mut inner);
            }
            Closure => self.walk_closure(node, scope),
            ArrowFunction => {
                let mut locals = scope.locals().clone();
                locals.extend(self.parameters(node, scope));
                let mut inner = Rc::new(scope.with_locals(locals));
                self.walk_children(node, &mut inner);
            }
            Assign => {
                self.walk_children(node, scope);
                if let (Some(target), Some(value)) = (node.child(0), node.child(1)) {
                    let value_type = match node.text() {
                        "=" => scope.type_of(value),
                        _ => scope.type_of(node),
                    };
                    Self::assign(target, value_type, scope);
                }
            }
            Foreach => {
                // [subject, key, value, body]
                let Some(subject) = node.child(0) else {
                    return;
                };
                self.walk(subject, scope);
                let subject_type = scope.type_of(subject);
                let mut inner = scope.clone();
                if let Some(key) = node.slot(1) {
                    let key_type = match subject_type.is_array() {
                        true => Type::union([Type::Int, Type::String]),
                        false => Type::Mixed,
                    };
                    Self::assign(key, key_type, &mut inner);
                }
                if let Some(value) = node.child(2) {
                    Self::assign(value, subject_type.element(), &mut inner);
                }
                for child in node.children.iter().skip(1) {
                    self.walk(child, &mut inner);
                }
                Rc::make_mut(scope).merge(&[inner.locals().clone()]);
            }
            Catch => {
                let caught: Vec<Type> = node
                    .child(0)
                    .map(|types| {
                        types
                            .children
                            .iter()
                            .map(|name| Type::object(scope.resolve_class(name.text())))
                            .collect()
                    })
                    .unwrap_or_default();
                let mut inner = scope.clone();
                if !node.text().is_empty() {
                    Rc::make_mut(&mut inner).bind(node.text(), Type::union(caught));
                }
                self.walk_children(node, &mut inner);
                Rc::make_mut(scope).merge(&[inner.locals().clone()]);
            }
            If => {
                // [condition, body, elseifs, else]
                let mut children = node.children.iter();
                if let Some(condition) = children.next() {
                    self.walk(condition, scope);
                }
                let branches: Vec<&Rc<AstNode>> = children.collect();
                self.walk_branches(&branches, scope);
            }
            While => {
                if let Some(condition) = node.child(0) {
                    self.walk(condition, scope);
                }
                let body: Vec<&Rc<AstNode>> = node.children.iter().skip(1).collect();
                self.walk_branches(&body, scope);
            }
            Switch | Match => {
                // [subject, cases or arms]
                if let Some(subject) = node.child(0) {
                    self.walk(subject, scope);
                }
                if let Some(list) = node.child(1) {
                    (self.on_node)(list, scope);
                    let branches: Vec<&Rc<AstNode>> = list.children.iter().collect();
                    self.walk_branches(&branches, scope);
                }
            }
            StaticVar => {
                self.walk_children(node, scope);
                Rc::make_mut(scope).bind(node.text(), Type::Mixed);
            }
            ElseIfList | CatchList => {
                let branches: Vec<&Rc<AstNode>> = node.children.iter().collect();
                self.walk_branches(&branches, scope);
            }
            _ => self.walk_children(node, scope),
        }
    }

    fn walk_children(&mut self, node: &AstNode, scope: &mut Rc<Scope>) {
        for child in &node.children {
            self.walk(child, scope);
        }
    }

    /// Walks alternative paths from the same starting scope, then joins them.
    fn walk_branches(&mut self, branches: &[&Rc<AstNode>], scope: &mut Rc<Scope>) {
        let mut outcomes: Vec<Locals> = Vec::with_capacity(branches.len());
        for branch in branches {
            let mut inner = scope.clone();
            self.walk(branch, &mut inner);
            outcomes.push(inner.locals().clone());
        }
        Rc::make_mut(scope).merge(&outcomes);
    }

    fn walk_closure(&mut self, node: &AstNode, scope: &mut Rc<Scope>) {
        // [modifiers, params, uses, return type, body]
        let mut locals = self.parameters(node, scope);
        if !node.has_modifier("static") {
            if let Some(this) = scope.locals().get("this") {
                locals.insert("this".to_string(), this.clone());
            }
        }
        if let Some(uses) = node.child(2) {
            for captured in &uses.children {
                locals.insert(captured.text().to_string(), scope.variable(captured.text()));
            }
        }
        let mut inner = Rc::new(scope.in_function(scope.function.clone(), locals));
        for (i, child) in node.children.iter().enumerate() {
            match i {
                2 => self.walk(child, scope),
                _ => self.walk(child, &mut inner),
            }
        }
    }

    fn parameters(&self, node: &AstNode, scope: &Scope) -> Locals {
        node.parameters()
            .into_iter()
            .map(|param| {
                let declared = param
                    .slot(1)
                    .map(|hint| Type::from_hint(hint.text(), &|n| scope.resolve_class(n)))
                    .unwrap_or(Type::Mixed);
                let ty = match param.has_flag("variadic") {
                    true => Type::array_of(declared),
                    false => declared,
                };
                (param.text().to_string(), ty)
            })
            .collect()
    }

    fn assign(target: &AstNode, value: Type, scope: &mut Rc<Scope>) {
        match target.node_type {
            AstNodeType::Variable => Rc::make_mut(scope).bind(target.text(), value),
            AstNodeType::ArrayLiteral => {
                let element = value.element();
                for item in &target.children {
                    if let Some(inner) = item.slot(1) {
                        Self::assign(inner, element.clone(), scope);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PhpParser, SourceParser};
    use crate::printer::render_inline;

    /// Receiver types of every method call, keyed by the rendered call.
    fn receiver_types(code: &str) -> Vec<(String, Type)> {
        let parsed = PhpParser::new().parse(code).unwrap();
        let universe = Rc::new(ClassIndex::from_trees([(Path::new("t.php"), parsed.tree.as_ref())]));
        let analyzer = SemanticAnalyzer::new(universe);
        let mut seen = Vec::new();
        analyzer.analyze(Path::new("t.php"), &parsed.tree, &mut |node, scope| {
            if node.node_type == AstNodeType::MethodCall {
                let receiver = node.child(0).unwrap();
                seen.push((render_inline(node).unwrap(), scope.type_of(receiver)));
            }
        });
        seen
    }

    #[test]
    fn test_this_and_parameters() {
        let code = r#"<?php
namespace App;
use Lib\Logger;
class Service {
    public function run(Logger $log) {
        $this->helper();
        $log->debug('x');
    }
    private function helper() {}
}
"#;
        let seen = receiver_types(code);
        assert_eq!(seen[0], ("$this->helper()".to_string(), Type::object("App\\Service")));
        assert_eq!(seen[1], ("$log->debug('x')".to_string(), Type::object("Lib\\Logger")));
    }

    #[test]
    fn test_assignments_flow_forward() {
        let code = "<?php class A { function f() {} } $a = new A(); $a->f(); foreach ([new A()] as $b) { $b->f(); }";
        let seen = receiver_types(code);
        assert_eq!(seen[0].1, Type::object("A"));
        assert_eq!(seen[1].1, Type::object("A"));
    }

    #[test]
    fn test_branches_join_by_union() {
        let code = "<?php class A {} class B {} if ($c) { $x = new A(); } else { $x = new B(); } $x->f();";
        let seen = receiver_types(code);
        assert_eq!(seen[0].1, Type::Union(vec![Type::object("A"), Type::object("B")]));
    }

    #[test]
    fn test_switch_and_match_join_their_branches() {
        let code = "<?php class A {} class B {}
switch ($c) { case 1: $x = new A(); break; default: $x = new B(); }
$x->f();
$y = match ($c) { 1, 2 => new A(), default => new B() };
$y->g();
";
        let seen = receiver_types(code);
        let union = Type::Union(vec![Type::object("A"), Type::object("B")]);
        assert_eq!(seen[0].1, union);
        assert_eq!(seen[1].1, union);
    }

    #[test]
    fn test_closure_captures() {
        let code = "<?php class A { function f() { $g = function () use ($q) { $this->f(); $q->x(); }; } }";
        let seen = receiver_types(code);
        assert_eq!(seen[0].1, Type::object("A"));
        assert_eq!(seen[1].1, Type::Mixed);
    }

    #[test]
    fn test_every_node_is_visited() {
        let parsed = PhpParser::new().parse("<?php function f($a) { return $a + 1; }").unwrap();
        let analyzer = SemanticAnalyzer::new(Rc::new(ClassIndex::new()));
        let mut count = 0;
        analyzer.analyze(Path::new("t.php"), &parsed.tree, &mut |_, _| count += 1);
        assert_eq!(count, parsed.tree.count_nodes());
    }
}
