/*!
# Source unit

One input file: its reference tree (never mutated), its working tree (what
rules rewrite), the original tokens and the semantic context store. Rules
reach the working tree only through the adapters below, from the most general
to the most specific:

| Adapter | Callback receives |
|---|---|
| `visit` | every node |
| `visit_with_scope` | nodes that have a semantic context, with that context |
| `visit_calls` | calls to one member of one class (or a subtype), with context |
| `visit_declarations` | method and function declarations, with context and names |
*/

use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use super::context::{collect_contexts, ContextMap, ContextMode, ContextStore};
use super::fingerprint::Fingerprint;
use super::traverse::{traverse, Action, NodeRule, Outcome};
use crate::analyzer::{Analyzer, ClassIndex, Scope, Type};
use crate::core::errors::{PreprocessError, Result};
use crate::parser::ast::{AstNode, AstNodeType};
use crate::parser::{ParsedSource, TokenStream};
use crate::printer;

/// Callback for nodes carrying a semantic context.
pub trait ScopedRule {
    fn visit(&mut self, node: &Rc<AstNode>, scope: &Rc<Scope>) -> Action;
}

impl<F> ScopedRule for F
where
    F: FnMut(&Rc<AstNode>, &Rc<Scope>) -> Action,
{
    fn visit(&mut self, node: &Rc<AstNode>, scope: &Rc<Scope>) -> Action {
        self(node, scope)
    }
}

/// Callback for declarations: node, context, enclosing class and member name.
pub trait DeclarationRule {
    fn visit(&mut self, node: &Rc<AstNode>, scope: &Rc<Scope>, class: &str, member: &str) -> Action;
}

impl<F> DeclarationRule for F
where
    F: FnMut(&Rc<AstNode>, &Rc<Scope>, &str, &str) -> Action,
{
    fn visit(&mut self, node: &Rc<AstNode>, scope: &Rc<Scope>, class: &str, member: &str) -> Action {
        self(node, scope, class, member)
    }
}

/// A declaration found in a working tree.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub node: Rc<AstNode>,
    pub scope: Rc<Scope>,
    pub class: String,
    pub member: String,
}

pub struct SourceUnit {
    path: PathBuf,
    reference: Rc<AstNode>,
    working: Rc<AstNode>,
    tokens: Rc<TokenStream>,
    contexts: ContextStore,
    analyzer: Rc<dyn Analyzer>,
    universe: Rc<ClassIndex>,
}

impl SourceUnit {
    /// Builds the unit; in eager mode the analyzer runs here, over the reference tree.
    pub fn new(
        path: &Path,
        parsed: ParsedSource,
        analyzer: Rc<dyn Analyzer>,
        universe: Rc<ClassIndex>,
        mode: ContextMode,
    ) -> Self {
        let reference = parsed.tree;
        let contexts = match mode {
            ContextMode::Eager => ContextStore::eager(collect_contexts(analyzer.as_ref(), path, &reference)),
            ContextMode::Lazy => ContextStore::lazy(),
        };
        Self {
            path: path.to_path_buf(),
            working: reference.deep_clone(),
            reference,
            tokens: parsed.tokens,
            contexts,
            analyzer,
            universe,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reference(&self) -> &Rc<AstNode> {
        &self.reference
    }

    pub fn working(&self) -> &Rc<AstNode> {
        &self.working
    }

    pub fn tokens(&self) -> &TokenStream {
        &self.tokens
    }

    pub fn universe(&self) -> &Rc<ClassIndex> {
        &self.universe
    }

    pub fn context_store(&self) -> &ContextStore {
        &self.contexts
    }

    /// Whether any rewrite has been committed to the working tree
    pub fn is_modified(&self) -> bool {
        !self.working.as_ref().eq(self.reference.as_ref())
    }

    /// Context of `node` in the working tree, if it has one.
    pub fn scope_of(&mut self, node: &AstNode) -> Option<Rc<Scope>> {
        let key = Fingerprint::of(node)?;
        self.contexts().get(&key).cloned()
    }

    fn contexts(&mut self) -> Rc<ContextMap> {
        let (analyzer, path, working) = (&self.analyzer, &self.path, &self.working);
        self.contexts.snapshot(|| collect_contexts(analyzer.as_ref(), path, working))
    }

    /// Raw traversal of the working tree.
    pub fn visit(&mut self, rules: &mut [&mut dyn NodeRule]) -> Result<Outcome> {
        let (tree, outcome) = traverse(&self.working, rules)?;
        if outcome.changes() > 0 {
            self.working = tree;
            self.contexts.invalidate();
        }
        Ok(outcome)
    }

    /// Traversal that only offers nodes with a known context.
    pub fn visit_with_scope(&mut self, rules: &mut [&mut dyn ScopedRule]) -> Result<Outcome> {
        let contexts = self.contexts();
        let mut scoped = |node: &Rc<AstNode>| {
            let Some(scope) = Fingerprint::of(node).and_then(|key| contexts.get(&key)) else {
                return Action::Keep;
            };
            first_match(&mut *rules, |rule| rule.visit(node, scope))
        };
        self.visit(&mut [&mut scoped])
    }

    /// Traversal over calls to `class::member`, including calls through subtypes.
    /// Fails before traversing when the universe has no such method.
    pub fn visit_calls(&mut self, class: &str, member: &str, rules: &mut [&mut dyn ScopedRule]) -> Result<Outcome> {
        let class = class.trim_start_matches('\\');
        if self.universe.find_method(class, member).is_none() {
            return Err(PreprocessError::InvalidTarget {
                class: class.to_string(),
                member: member.to_string(),
            });
        }
        let target = Type::object(class);
        let contexts = self.contexts();
        let universe = self.universe.clone();
        let mut calls = |node: &Rc<AstNode>| {
            if !invokes(node, member) {
                return Action::Keep;
            }
            let Some(scope) = Fingerprint::of(node).and_then(|key| contexts.get(&key)) else {
                return Action::Keep;
            };
            let receiver_matches = match (node.node_type, node.child(0)) {
                (AstNodeType::MethodCall, Some(receiver)) => target.accepts(&scope.type_of(receiver), &universe),
                (AstNodeType::StaticCall, Some(class_part)) => scope
                    .class_of(class_part)
                    .is_some_and(|name| universe.is_subclass_of(&name, class)),
                _ => false,
            };
            match receiver_matches {
                true => first_match(&mut *rules, |rule| rule.visit(node, scope)),
                false => Action::Keep,
            }
        };
        self.visit(&mut [&mut calls])
    }

    /// Traversal over method and function declarations.
    pub fn visit_declarations(&mut self, rules: &mut [&mut dyn DeclarationRule]) -> Result<Outcome> {
        let mut declarations = |node: &Rc<AstNode>, scope: &Rc<Scope>| {
            if !matches!(node.node_type, AstNodeType::ClassMethod | AstNodeType::FunctionDeclaration) {
                return Action::Keep;
            }
            let class = match node.node_type {
                AstNodeType::ClassMethod => scope.class.clone().unwrap_or_default(),
                _ => String::new(),
            };
            first_match(&mut *rules, |rule| rule.visit(node, scope, &class, node.text()))
        };
        self.visit_with_scope(&mut [&mut declarations])
    }

    /// Declarations of `member` in `class` or one of its subtypes, in tree order.
    pub fn declarations_of(&mut self, class: &str, member: &str) -> Result<Vec<Declaration>> {
        let universe = self.universe.clone();
        let mut found = Vec::new();
        let mut collect = |node: &Rc<AstNode>, scope: &Rc<Scope>, declared_in: &str, name: &str| {
            if !declared_in.is_empty()
                && name.eq_ignore_ascii_case(member)
                && universe.is_subclass_of(declared_in, class)
            {
                found.push(Declaration {
                    node: node.clone(),
                    scope: scope.clone(),
                    class: declared_in.to_string(),
                    member: name.to_string(),
                });
            }
            Action::Keep
        };
        self.visit_declarations(&mut [&mut collect])?;
        Ok(found)
    }

    /// The single declaration of `class::member` in this unit.
    pub fn find_declaration(&mut self, class: &str, member: &str) -> Result<Declaration> {
        let mut found = self.declarations_of(class, member)?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(PreprocessError::DeclarationNotFound {
                class: class.to_string(),
                member: member.to_string(),
            }),
            count => Err(PreprocessError::AmbiguousDeclaration {
                class: class.to_string(),
                member: member.to_string(),
                count,
            }),
        }
    }

    /// Text of the working tree, original formatting kept wherever nothing changed.
    pub fn regenerate(&self) -> Result<String> {
        debug!("Regenerating {}", self.path.display());
        printer::regenerate(&self.working, &self.reference, &self.tokens)
    }
}

/// Method or static call whose member is the identifier `member` (case-insensitive).
fn invokes(node: &AstNode, member: &str) -> bool {
    node.node_type.is_call()
        && node
            .child(1)
            .is_some_and(|name| name.is(AstNodeType::Identifier) && name.text().eq_ignore_ascii_case(member))
}

/// First non-`Keep` answer of a rule chain.
fn first_match<R: ?Sized>(rules: &mut [&mut R], mut ask: impl FnMut(&mut R) -> Action) -> Action {
    for rule in rules.iter_mut() {
        match ask(&mut **rule) {
            Action::Keep => continue,
            decided => return decided,
        }
    }
    Action::Keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::SemanticAnalyzer;
    use crate::parser::{PhpParser, SourceParser};
    use pretty_assertions::assert_eq;

    const CODE: &str = r#"<?php
interface Logger { public function debug(string $m); }
class FileLogger implements Logger { public function debug(string $m) {} }
class Other { public function debug(string $m) {} }
class Service {
    private Logger $logger;
    public function run(Other $other) {
        $this->logger->debug("a");
        $other->debug("b");
        FileLogger::debug("c");
    }
}
"#;

    fn unit(code: &str, mode: ContextMode) -> SourceUnit {
        let parsed = PhpParser::new().parse(code).unwrap();
        let universe = Rc::new(ClassIndex::from_trees([(Path::new("t.php"), parsed.tree.as_ref())]));
        let analyzer: Rc<dyn Analyzer> = Rc::new(SemanticAnalyzer::new(universe.clone()));
        SourceUnit::new(Path::new("t.php"), parsed, analyzer, universe, mode)
    }

    fn matched_calls(unit: &mut SourceUnit, class: &str, member: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let mut record = |node: &Rc<AstNode>, _: &Rc<Scope>| {
            seen.push(printer::render_inline(node).unwrap());
            Action::Keep
        };
        unit.visit_calls(class, member, &mut [&mut record]).unwrap();
        seen
    }

    #[test]
    fn test_visit_calls_filters_by_receiver_type() {
        let mut unit = unit(CODE, ContextMode::Eager);
        assert_eq!(
            matched_calls(&mut unit, "Logger", "DEBUG"),
            vec!["$this->logger->debug(\"a\")".to_string(), "FileLogger::debug(\"c\")".to_string()]
        );
        assert_eq!(matched_calls(&mut unit, "Other", "debug"), vec!["$other->debug(\"b\")".to_string()]);
    }

    #[test]
    fn test_visit_calls_rejects_unknown_member() {
        let mut unit = unit(CODE, ContextMode::Eager);
        let mut noop = |_: &Rc<AstNode>, _: &Rc<Scope>| Action::Keep;
        let err = unit.visit_calls("Logger", "deebug", &mut [&mut noop]).unwrap_err();
        assert!(matches!(err, PreprocessError::InvalidTarget { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unmodified_unit_round_trips() {
        let unit = unit(CODE, ContextMode::Eager);
        assert!(!unit.is_modified());
        assert_eq!(unit.regenerate().unwrap(), CODE);
    }

    #[test]
    fn test_find_declaration() {
        let mut unit = unit(CODE, ContextMode::Lazy);
        let found = unit.find_declaration("Other", "debug").unwrap();
        assert_eq!(found.class, "Other");
        assert_eq!(found.node.node_type, AstNodeType::ClassMethod);

        let err = unit.find_declaration("Logger", "debug").unwrap_err();
        assert!(matches!(err, PreprocessError::AmbiguousDeclaration { count: 2, .. }));
        let err = unit.find_declaration("Service", "missing").unwrap_err();
        assert!(matches!(err, PreprocessError::DeclarationNotFound { .. }));
    }

    #[test]
    fn test_lazy_store_resolves_again_after_rewrite() {
        let mut unit = unit(CODE, ContextMode::Lazy);
        assert_eq!(unit.context_store().resolutions(), 0);
        matched_calls(&mut unit, "Other", "debug");
        assert_eq!(unit.context_store().resolutions(), 1);

        let mut elide = |_: &Rc<AstNode>, _: &Rc<Scope>| Action::Replace(Rc::new(AstNode::placeholder("gone")));
        let outcome = unit.visit_calls("Other", "debug", &mut [&mut elide]).unwrap();
        assert_eq!(outcome.replaced, 1);
        assert!(unit.context_store().is_stale());

        assert!(matched_calls(&mut unit, "Other", "debug").is_empty());
        assert_eq!(unit.context_store().resolutions(), 2);
        assert!(unit.regenerate().unwrap().contains("/* gone */;"));
    }
}
