/*!
# Traversal engine

Depth-first, parent-before-children walk applying an ordered chain of rules
to every node. For each node the rules are asked in registration order and the
first one that does not answer `Keep` decides:

- `Keep` from every rule: descend into the children
- `Replace(node)`: splice `node` in; the replacement is not descended into.
  Its nodes without a source location take the span of the replaced node
- `Remove`: drop the node from a list parent, or leave an `Empty` slot in a
  fixed-arity parent
- `Stop`: keep this node and end the whole traversal

The input tree is never mutated. The result shares every untouched subtree
with the input; only the ancestors of changed nodes are copied.
*/

use std::rc::Rc;

use serde::Serialize;

use crate::core::errors::{PreprocessError, Result};
use crate::parser::ast::AstNode;

#[derive(Debug, Clone)]
pub enum Action {
    Keep,
    Replace(Rc<AstNode>),
    Remove,
    Stop,
}

/// One rewrite callback in a traversal chain.
pub trait NodeRule {
    fn visit(&mut self, node: &Rc<AstNode>) -> Action;
}

impl<F> NodeRule for F
where
    F: FnMut(&Rc<AstNode>) -> Action,
{
    fn visit(&mut self, node: &Rc<AstNode>) -> Action {
        self(node)
    }
}

/// What a traversal changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub visited: usize,
    pub replaced: usize,
    pub removed: usize,
    pub stopped: bool,
}

impl Outcome {
    pub fn changes(&self) -> usize {
        self.replaced + self.removed
    }

    pub fn merge(&mut self, other: Outcome) {
        self.visited += other.visited;
        self.replaced += other.replaced;
        self.removed += other.removed;
        self.stopped |= other.stopped;
    }
}

enum Step {
    Same,
    Changed(Rc<AstNode>),
    Removed,
}

struct Traversal<'a, 'r> {
    rules: &'a mut [&'r mut dyn NodeRule],
    outcome: Outcome,
}

/// Applies `rules` to `tree`, returning the rewritten tree.
pub fn traverse(tree: &Rc<AstNode>, rules: &mut [&mut dyn NodeRule]) -> Result<(Rc<AstNode>, Outcome)> {
    let mut traversal = Traversal {
        rules,
        outcome: Outcome::default(),
    };
    let tree = match traversal.walk(tree) {
        Step::Same => tree.clone(),
        Step::Changed(new) => new,
        Step::Removed => return Err(PreprocessError::RootRemoved),
    };
    Ok((tree, traversal.outcome))
}

impl Traversal<'_, '_> {
    fn walk(&mut self, node: &Rc<AstNode>) -> Step {
        if self.outcome.stopped {
            return Step::Same;
        }
        self.outcome.visited += 1;

        for rule in self.rules.iter_mut() {
            match rule.visit(node) {
                Action::Keep => continue,
                Action::Replace(replacement) => {
                    self.outcome.replaced += 1;
                    return Step::Changed(AstNode::anchored(&replacement, node.span));
                }
                Action::Remove => {
                    self.outcome.removed += 1;
                    return Step::Removed;
                }
                Action::Stop => {
                    self.outcome.stopped = true;
                    return Step::Same;
                }
            }
        }

        let mut rebuilt: Option<Vec<Rc<AstNode>>> = None;
        for (i, child) in node.children.iter().enumerate() {
            match self.walk(child) {
                Step::Same => {
                    if let Some(children) = rebuilt.as_mut() {
                        children.push(child.clone());
                    }
                }
                Step::Changed(new) => {
                    rebuilt.get_or_insert_with(|| node.children[..i].to_vec()).push(new);
                }
                Step::Removed => {
                    let children = rebuilt.get_or_insert_with(|| node.children[..i].to_vec());
                    if !node.node_type.is_list() {
                        children.push(Rc::new(AstNode::empty(child.span)));
                    }
                }
            }
        }

        match rebuilt {
            Some(children) => Step::Changed(Rc::new(node.with_children(children))),
            None => Step::Same,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{AstNodeType, PhpParser, SourceParser};
    use crate::printer::render_inline;

    fn tree(code: &str) -> Rc<AstNode> {
        PhpParser::new().parse(code).unwrap().tree
    }

    fn variable(name: &str) -> Rc<AstNode> {
        Rc::new(AstNode::synthetic(AstNodeType::Variable, Some(name.to_string()), Vec::new()))
    }

    #[test]
    fn test_untouched_tree_is_shared() {
        let input = tree("<?php $a = 1; $b = 2;");
        let mut keep = |_: &Rc<AstNode>| Action::Keep;
        let (output, outcome) = traverse(&input, &mut [&mut keep]).unwrap();
        assert!(Rc::ptr_eq(&input, &output));
        assert_eq!(outcome.changes(), 0);
        assert_eq!(outcome.visited, input.count_nodes());
    }

    #[test]
    fn test_path_copying_shares_siblings() {
        let input = tree("<?php $a = 1; $b = 2;");
        let mut rename = |node: &Rc<AstNode>| match node.is(AstNodeType::Variable) && node.text() == "a" {
            true => Action::Replace(variable("z")),
            false => Action::Keep,
        };
        let (output, outcome) = traverse(&input, &mut [&mut rename]).unwrap();
        assert_eq!(outcome.replaced, 1);
        assert!(!Rc::ptr_eq(&input.children[0], &output.children[0]));
        assert!(Rc::ptr_eq(&input.children[1], &output.children[1]));
        assert_eq!(render_inline(&output.children[0]).unwrap(), "$z = 1;");
        // the input is untouched
        assert_eq!(render_inline(&input.children[0]).unwrap(), "$a = 1;");
    }

    #[test]
    fn test_first_registered_rule_wins() {
        let input = tree("<?php $a;");
        let mut first = |node: &Rc<AstNode>| match node.is(AstNodeType::Variable) {
            true => Action::Replace(variable("first")),
            false => Action::Keep,
        };
        let mut calls = 0;
        let mut second = |node: &Rc<AstNode>| {
            if node.is(AstNodeType::Variable) {
                calls += 1;
                return Action::Replace(variable("second"));
            }
            Action::Keep
        };
        let (output, _) = traverse(&input, &mut [&mut first, &mut second]).unwrap();
        assert_eq!(render_inline(&output.children[0]).unwrap(), "$first;");
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_replacement_is_not_descended() {
        let input = tree("<?php f($a);");
        let mut seen = Vec::new();
        let mut rule = |node: &Rc<AstNode>| {
            seen.push(node.node_type);
            match node.node_type {
                AstNodeType::FuncCall => Action::Replace(Rc::new(AstNode::synthetic(
                    AstNodeType::FuncCall,
                    None,
                    vec![node.children[0].clone(), node.children[1].clone()],
                ))),
                _ => Action::Keep,
            }
        };
        traverse(&input, &mut [&mut rule]).unwrap();
        assert!(!seen.contains(&AstNodeType::Variable));
    }

    #[test]
    fn test_replacement_takes_the_replaced_span() {
        let input = tree("<?php\n$a = 1;\n$b = f($c);");
        let mut rule = |node: &Rc<AstNode>| match node.node_type {
            AstNodeType::FuncCall => {
                let argument = node.children[1].children[0].clone();
                Action::Replace(Rc::new(AstNode::synthetic(AstNodeType::Unary, Some("-".into()), vec![argument])))
            }
            _ => Action::Keep,
        };
        let (output, _) = traverse(&input, &mut [&mut rule]).unwrap();
        let call = input.find_all(AstNodeType::FuncCall)[0];
        let unary = output.find_all(AstNodeType::Unary)[0];
        assert_eq!(unary.span, call.span);
        assert_eq!(unary.line(), 3);
        // located children keep their own span
        let variable = &unary.children[0];
        assert_eq!(variable.span, input.find_all(AstNodeType::Variable)[2].span);
    }

    #[test]
    fn test_remove_from_list_and_slot() {
        let input = tree("<?php function f(int $a) { g(); h(); }");
        let mut rule = |node: &Rc<AstNode>| match node.node_type {
            AstNodeType::TypeHint => Action::Remove,
            AstNodeType::ExpressionStatement if render_inline(node).unwrap() == "g();" => Action::Remove,
            _ => Action::Keep,
        };
        let (output, outcome) = traverse(&input, &mut [&mut rule]).unwrap();
        assert_eq!(outcome.removed, 2);
        let function = &output.children[0];
        let param = function.parameters()[0];
        assert!(param.children[1].is_empty_slot());
        let body = function.child(2).unwrap();
        assert_eq!(body.children.len(), 1);
    }

    #[test]
    fn test_stop_and_root_removal() {
        let input = tree("<?php $a; $b;");
        let mut stop = |node: &Rc<AstNode>| match node.is(AstNodeType::ExpressionStatement) {
            true => Action::Stop,
            false => Action::Keep,
        };
        let (_, outcome) = traverse(&input, &mut [&mut stop]).unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.visited, 2);

        let mut remove_all = |_: &Rc<AstNode>| Action::Remove;
        let err = traverse(&input, &mut [&mut remove_all]).unwrap_err();
        assert!(matches!(err, PreprocessError::RootRemoved));
    }
}
