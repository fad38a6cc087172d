//! Namespace and import tracking.

use std::collections::HashMap;
use std::rc::Rc;

use crate::parser::ast::{AstNode, AstNodeType};

/// Names in effect at some point of a file: current namespace plus imports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameContext {
    namespace: String,
    classes: HashMap<String, String>,
    functions: HashMap<String, String>,
    constants: HashMap<String, String>,
}

/// Outcome of resolving a function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionName {
    /// The name can only mean this function
    Exact(String),
    /// Unqualified name inside a namespace: the namespaced function wins if it exists
    Fallback { namespaced: String, global: String },
}

impl NameContext {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn in_namespace(namespace: &str) -> Self {
        Self {
            namespace: namespace.trim_matches('\\').to_string(),
            ..Self::default()
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Records every item of a `use` statement.
    pub fn add_use(&mut self, statement: &AstNode) {
        let kind = statement.text();
        for item in &statement.children {
            let target = item.text().trim_start_matches('\\').to_string();
            let alias = item
                .get_attribute("alias")
                .cloned()
                .unwrap_or_else(|| last_segment(&target).to_string());
            match kind {
                "function" => self.functions.insert(alias.to_ascii_lowercase(), target),
                "const" => self.constants.insert(alias, target),
                _ => self.classes.insert(alias.to_ascii_lowercase(), target),
            };
        }
    }

    /// Prefixes a declared name with the current namespace.
    pub fn declare(&self, name: &str) -> String {
        match self.namespace.is_empty() {
            true => name.to_string(),
            false => format!("{}\\{}", self.namespace, name),
        }
    }

    /// Fully qualified class name, without a leading backslash.
    /// `self`, `static` and `parent` are returned unchanged.
    pub fn resolve_class(&self, name: &str) -> String {
        if let Some(absolute) = name.strip_prefix('\\') {
            return absolute.to_string();
        }
        if matches!(name.to_ascii_lowercase().as_str(), "self" | "static" | "parent") {
            return name.to_string();
        }
        let (first, rest) = match name.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        match (self.classes.get(&first.to_ascii_lowercase()), rest) {
            (Some(target), Some(rest)) => format!("{}\\{}", target, rest),
            (Some(target), None) => target.clone(),
            (None, _) => self.declare(name),
        }
    }

    pub fn resolve_function(&self, name: &str) -> FunctionName {
        if let Some(absolute) = name.strip_prefix('\\') {
            return FunctionName::Exact(absolute.to_string());
        }
        if name.contains('\\') {
            return FunctionName::Exact(self.resolve_class(name));
        }
        if let Some(target) = self.functions.get(&name.to_ascii_lowercase()) {
            return FunctionName::Exact(target.clone());
        }
        if self.namespace.is_empty() {
            return FunctionName::Exact(name.to_string());
        }
        FunctionName::Fallback {
            namespaced: self.declare(name),
            global: name.to_string(),
        }
    }

    pub fn is_imported_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_lowercase())
    }
}

pub fn last_segment(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// Calls `f` for every top-level statement with the names in effect at that
/// statement. Braced namespace bodies are entered.
pub fn for_each_statement(module: &AstNode, f: &mut dyn FnMut(&Rc<AstNode>, &Rc<NameContext>)) {
    let mut context = Rc::new(NameContext::global());
    walk_statements(&module.children, &mut context, f);
}

fn walk_statements(
    statements: &[Rc<AstNode>],
    context: &mut Rc<NameContext>,
    f: &mut dyn FnMut(&Rc<AstNode>, &Rc<NameContext>),
) {
    for statement in statements {
        match statement.node_type {
            AstNodeType::Namespace => {
                let inner = Rc::new(NameContext::in_namespace(statement.text()));
                f(statement, &inner);
                match statement.slot(0) {
                    Some(body) => {
                        let mut scoped = inner;
                        walk_statements(&body.children, &mut scoped, f);
                    }
                    None => *context = inner,
                }
            }
            AstNodeType::Use => {
                Rc::make_mut(context).add_use(statement);
                f(statement, context);
            }
            _ => f(statement, context),
        }
    }
}
