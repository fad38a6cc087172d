/*!
# Declaration universe

Every class, interface, trait and function known to the batch: declarations
collected from all parsed units and stub files, plus a small table of
builtins. Inheritance (`extends`, `implements`, `use Trait`) is kept in a
petgraph graph with edges pointing from parent to child, so subtype checks
are path queries.

Class and function names are case-insensitive and stored lowercase; the
declared spelling is kept in the info structs.
*/

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::names::{for_each_statement, FunctionName, NameContext};
use super::types::Type;
use crate::parser::ast::{AstNode, AstNodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn from_modifiers(node: &AstNode) -> Self {
        if node.has_modifier("private") {
            Visibility::Private
        } else if node.has_modifier("protected") {
            Visibility::Protected
        } else {
            Visibility::Public
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub param_type: Type,
    pub has_default: bool,
    pub variadic: bool,
    pub by_ref: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    /// Fully qualified name of the declaring class
    pub class: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub parameters: Vec<ParameterInfo>,
    pub return_type: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    pub class: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub property_type: Type,
    /// Declared through a constructor parameter
    pub promoted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ClassKind,
    pub is_final: bool,
    pub is_abstract: bool,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub traits: Vec<String>,
    pub methods: HashMap<String, MethodInfo>,
    pub properties: HashMap<String, PropertyInfo>,
    pub file: Option<PathBuf>,
}

impl ClassInfo {
    fn builtin(name: &str, kind: ClassKind, parent: Option<&str>, interfaces: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            is_final: matches!(name, "Closure" | "Generator"),
            is_abstract: false,
            parent: parent.map(str::to_string),
            interfaces: interfaces.iter().map(|i| i.to_string()).collect(),
            traits: Vec::new(),
            methods: HashMap::new(),
            properties: HashMap::new(),
            file: None,
        }
    }

    /// Ancestors listed in lookup order: traits, parent, interfaces.
    fn supertypes(&self) -> impl Iterator<Item = &String> {
        self.traits.iter().chain(self.parent.iter()).chain(self.interfaces.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub return_type: Type,
    pub builtin: bool,
}

/// Builtin functions with the return types the rules care about.
const BUILTIN_FUNCTIONS: &[(&str, &str)] = &[
    ("abs", "int|float"),
    ("array_filter", "array"),
    ("array_key_exists", "bool"),
    ("array_keys", "array"),
    ("array_map", "array"),
    ("array_merge", "array"),
    ("array_slice", "array"),
    ("array_values", "array"),
    ("assert", "bool"),
    ("ceil", "float"),
    ("cos", "float"),
    ("count", "int"),
    ("deg2rad", "float"),
    ("explode", "array"),
    ("file_exists", "bool"),
    ("file_get_contents", "mixed"),
    ("floor", "float"),
    ("get_class", "string"),
    ("implode", "string"),
    ("in_array", "bool"),
    ("intval", "int"),
    ("is_array", "bool"),
    ("is_dir", "bool"),
    ("is_int", "bool"),
    ("is_string", "bool"),
    ("json_encode", "mixed"),
    ("max", "mixed"),
    ("method_exists", "bool"),
    ("microtime", "mixed"),
    ("min", "mixed"),
    ("mkdir", "bool"),
    ("mt_rand", "int"),
    ("printf", "int"),
    ("random_int", "int"),
    ("range", "array"),
    ("round", "float"),
    ("sin", "float"),
    ("spl_object_id", "int"),
    ("sprintf", "string"),
    ("sqrt", "float"),
    ("str_contains", "bool"),
    ("str_repeat", "string"),
    ("str_replace", "mixed"),
    ("strlen", "int"),
    ("strtolower", "string"),
    ("strtoupper", "string"),
    ("strval", "string"),
    ("substr", "string"),
    ("tan", "float"),
    ("time", "int"),
    ("trim", "string"),
    ("var_dump", "void"),
];

#[derive(Debug, Clone, Default)]
pub struct ClassIndex {
    classes: HashMap<String, ClassInfo>,
    functions: HashMap<String, FunctionInfo>,
    inheritance_graph: DiGraph<String, ()>,
    inheritance_node_map: HashMap<String, NodeIndex>,
}

impl ClassIndex {
    /// Index holding only builtins
    pub fn new() -> Self {
        let mut index = Self::default();
        for (name, return_type) in BUILTIN_FUNCTIONS {
            index.functions.insert(
                name.to_string(),
                FunctionInfo {
                    name: name.to_string(),
                    return_type: Type::from_hint(return_type, &|n| n.to_string()),
                    builtin: true,
                },
            );
        }
        let builtin_classes = [
            ClassInfo::builtin("stdClass", ClassKind::Class, None, &[]),
            ClassInfo::builtin("Closure", ClassKind::Class, None, &[]),
            ClassInfo::builtin("Traversable", ClassKind::Interface, None, &[]),
            ClassInfo::builtin("Iterator", ClassKind::Interface, None, &["Traversable"]),
            ClassInfo::builtin("IteratorAggregate", ClassKind::Interface, None, &["Traversable"]),
            ClassInfo::builtin("Generator", ClassKind::Class, None, &["Iterator"]),
            ClassInfo::builtin("Countable", ClassKind::Interface, None, &[]),
            ClassInfo::builtin("ArrayAccess", ClassKind::Interface, None, &[]),
            ClassInfo::builtin("Throwable", ClassKind::Interface, None, &[]),
            ClassInfo::builtin("Exception", ClassKind::Class, None, &["Throwable"]),
            ClassInfo::builtin("Error", ClassKind::Class, None, &["Throwable"]),
            ClassInfo::builtin("RuntimeException", ClassKind::Class, Some("Exception"), &[]),
            ClassInfo::builtin("LogicException", ClassKind::Class, Some("Exception"), &[]),
            ClassInfo::builtin("InvalidArgumentException", ClassKind::Class, Some("LogicException"), &[]),
        ];
        for class in builtin_classes {
            index.classes.insert(class.name.to_ascii_lowercase(), class);
        }
        index.build_inheritance_relationships();
        index
    }

    /// Builds the universe from parsed trees; the hierarchy is ready on return.
    pub fn from_trees<'a>(trees: impl IntoIterator<Item = (&'a Path, &'a AstNode)>) -> Self {
        let mut index = Self::new();
        for (path, tree) in trees {
            index.add_module(path, tree);
        }
        index.build_inheritance_relationships();
        index
    }

    /// Collects the declarations of one file. Call
    /// `build_inheritance_relationships` once all files are added.
    pub fn add_module(&mut self, path: &Path, module: &AstNode) {
        for_each_statement(module, &mut |statement, names| match statement.node_type {
            AstNodeType::ClassDeclaration => self.add_class(path, statement, names),
            AstNodeType::FunctionDeclaration => {
                let name = names.declare(statement.text());
                let return_type = statement
                    .slot(1)
                    .map(|hint| Type::from_hint(hint.text(), &|n| names.resolve_class(n)))
                    .unwrap_or(Type::Mixed);
                debug!("Indexed function {}", name);
                self.functions.insert(
                    name.to_ascii_lowercase(),
                    FunctionInfo { name, return_type, builtin: false },
                );
            }
            _ => {}
        });
    }

    fn add_class(&mut self, path: &Path, node: &AstNode, names: &NameContext) {
        let name = names.declare(node.text());
        let kind = match node.get_attribute("kind").map(String::as_str) {
            Some("interface") => ClassKind::Interface,
            Some("trait") => ClassKind::Trait,
            _ => ClassKind::Class,
        };
        let parent = node.slot(1).map(|n| names.resolve_class(n.text()));
        let interfaces: Vec<String> = node
            .child(2)
            .map(|list| list.children.iter().map(|n| names.resolve_class(n.text())).collect())
            .unwrap_or_default();
        let mut traits = Vec::new();

        let resolve = |hint: &str| -> String {
            match hint.to_ascii_lowercase().as_str() {
                "self" | "static" => name.clone(),
                "parent" => parent.clone().unwrap_or_else(|| hint.to_string()),
                _ => names.resolve_class(hint),
            }
        };

        let mut methods = HashMap::new();
        let mut properties = HashMap::new();
        let members = node.child(3).map(|body| body.children.as_slice()).unwrap_or_default();
        for member in members {
            match member.node_type {
                AstNodeType::TraitUse => {
                    traits.extend(member.children.iter().map(|n| names.resolve_class(n.text())));
                }
                AstNodeType::Property => {
                    let property_type = match member.slot(1) {
                        Some(hint) => Type::from_hint(hint.text(), &resolve),
                        None => member
                            .get_attribute("doc_comment")
                            .and_then(|doc| doc_tag_type(doc, "@var"))
                            .map(|hint| Type::from_hint(&hint, &resolve))
                            .unwrap_or(Type::Mixed),
                    };
                    properties.insert(
                        member.text().to_string(),
                        PropertyInfo {
                            name: member.text().to_string(),
                            class: name.clone(),
                            visibility: Visibility::from_modifiers(member),
                            is_static: member.has_modifier("static"),
                            property_type,
                            promoted: false,
                        },
                    );
                }
                AstNodeType::ClassMethod => {
                    let method = method_info(member, &name, &resolve);
                    if method.name.eq_ignore_ascii_case("__construct") {
                        for param in member.parameters() {
                            let promoted = param.child(0).is_some_and(|m| !m.text().is_empty());
                            if promoted {
                                properties.insert(
                                    param.text().to_string(),
                                    PropertyInfo {
                                        name: param.text().to_string(),
                                        class: name.clone(),
                                        visibility: Visibility::from_modifiers(param),
                                        is_static: false,
                                        property_type: parameter_type(param, &resolve),
                                        promoted: true,
                                    },
                                );
                            }
                        }
                    }
                    methods.insert(method.name.to_ascii_lowercase(), method);
                }
                _ => {}
            }
        }

        debug!("Indexed class {} ({} methods)", name, methods.len());
        let info = ClassInfo {
            name: name.clone(),
            kind,
            is_final: node.has_modifier("final"),
            is_abstract: node.has_modifier("abstract"),
            parent,
            interfaces,
            traits,
            methods,
            properties,
            file: Some(path.to_path_buf()),
        };
        self.classes.insert(name.to_ascii_lowercase(), info);
    }

    /// Rebuilds the inheritance graph from the collected declarations.
    pub fn build_inheritance_relationships(&mut self) {
        self.inheritance_graph = DiGraph::new();
        self.inheritance_node_map.clear();
        for key in self.classes.keys() {
            let node = self.inheritance_graph.add_node(key.clone());
            self.inheritance_node_map.insert(key.clone(), node);
        }
        for (key, class) in &self.classes {
            let Some(&child) = self.inheritance_node_map.get(key) else {
                continue;
            };
            for supertype in class.supertypes() {
                if let Some(&parent) = self.inheritance_node_map.get(&normalize(supertype)) {
                    self.inheritance_graph.add_edge(parent, child, ());
                }
            }
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(&normalize(name))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// `child` is `ancestor` or inherits from it.
    pub fn is_subclass_of(&self, child: &str, ancestor: &str) -> bool {
        let (child, ancestor) = (normalize(child), normalize(ancestor));
        if child == ancestor {
            return true;
        }
        match (self.inheritance_node_map.get(&child), self.inheritance_node_map.get(&ancestor)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.inheritance_graph, to, from, None),
            _ => false,
        }
    }

    /// Method lookup through traits, parents and interfaces.
    pub fn find_method(&self, class: &str, method: &str) -> Option<&MethodInfo> {
        let method = method.to_ascii_lowercase();
        self.lookup(class, |info| info.methods.get(&method))
    }

    pub fn find_property(&self, class: &str, property: &str) -> Option<&PropertyInfo> {
        self.lookup(class, |info| info.properties.get(property))
    }

    fn lookup<'a, T>(&'a self, class: &str, find: impl Fn(&'a ClassInfo) -> Option<&'a T>) -> Option<&'a T> {
        let mut queue = VecDeque::from([normalize(class)]);
        let mut seen = HashSet::new();
        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }
            let Some(info) = self.classes.get(&key) else {
                continue;
            };
            if let Some(found) = find(info) {
                return Some(found);
            }
            queue.extend(info.supertypes().map(|s| normalize(s)));
        }
        None
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(&normalize(name))
    }

    /// Function an unresolved call name refers to, following namespace fallback.
    pub fn resolve_function(&self, name: &FunctionName) -> Option<&FunctionInfo> {
        match name {
            FunctionName::Exact(name) => self.function(name),
            FunctionName::Fallback { namespaced, global } => {
                self.function(namespaced).or_else(|| self.function(global))
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

fn parameter_type(param: &AstNode, resolve: &dyn Fn(&str) -> String) -> Type {
    let base = param
        .slot(1)
        .map(|hint| Type::from_hint(hint.text(), resolve))
        .unwrap_or(Type::Mixed);
    match param.has_flag("variadic") {
        true => Type::array_of(base),
        false => base,
    }
}

fn method_info(node: &AstNode, class: &str, resolve: &dyn Fn(&str) -> String) -> MethodInfo {
    let parameters = node
        .parameters()
        .into_iter()
        .map(|param| ParameterInfo {
            name: param.text().to_string(),
            param_type: parameter_type(param, resolve),
            has_default: param.slot(2).is_some(),
            variadic: param.has_flag("variadic"),
            by_ref: param.has_flag("by_ref"),
        })
        .collect();
    let return_type = match node.slot(2) {
        Some(hint) => Type::from_hint(hint.text(), resolve),
        None => node
            .get_attribute("doc_comment")
            .and_then(|doc| doc_tag_type(doc, "@return"))
            .map(|hint| Type::from_hint(&hint, resolve))
            .unwrap_or(Type::Mixed),
    };
    MethodInfo {
        name: node.text().to_string(),
        class: class.to_string(),
        visibility: Visibility::from_modifiers(node),
        is_static: node.has_modifier("static"),
        is_final: node.has_modifier("final"),
        is_abstract: node.has_modifier("abstract") || node.slot(3).is_none(),
        parameters,
        return_type,
    }
}

/// Type written after a doc comment tag such as `@var`.
pub fn doc_tag_type(doc: &str, tag: &str) -> Option<String> {
    let start = doc.find(tag)? + tag.len();
    doc[start..]
        .split_whitespace()
        .next()
        .filter(|t| !t.starts_with('$') && !t.starts_with("*/"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PhpParser, SourceParser};

    const SOURCE: &str = r#"<?php
namespace App;

use Logger;

interface Named { public function getName() : string; }

abstract class Base implements Named {
    /** @var Logger */
    protected $logger;

    public function getLogger() : Logger { return $this->logger; }
}

final class Child extends Base {
    public function __construct(private int $id, ?string $label = null) {}
    public function getName() : string { return "child"; }
    public static function make() : self { return new self(1); }
}

function helper() : int { return 1; }
"#;

    fn index() -> ClassIndex {
        let parsed = PhpParser::new().parse(SOURCE).unwrap();
        ClassIndex::from_trees([(Path::new("a.php"), parsed.tree.as_ref())])
    }

    #[test]
    fn test_hierarchy() {
        let index = index();
        assert!(index.is_subclass_of("App\\Child", "App\\Base"));
        assert!(index.is_subclass_of("\\app\\child", "App\\Named"));
        assert!(!index.is_subclass_of("App\\Base", "App\\Child"));
        assert!(index.is_subclass_of("InvalidArgumentException", "Throwable"));
    }

    #[test]
    fn test_member_lookup() {
        let index = index();
        let method = index.find_method("App\\Child", "GETLOGGER").unwrap();
        assert_eq!(method.class, "App\\Base");
        assert_eq!(method.return_type, Type::object("Logger"));

        let make = index.find_method("App\\Child", "make").unwrap();
        assert!(make.is_static);
        assert_eq!(make.return_type, Type::object("App\\Child"));

        let logger = index.find_property("App\\Child", "logger").unwrap();
        assert_eq!(logger.property_type, Type::object("Logger"));
        assert_eq!(logger.visibility, Visibility::Protected);

        let id = index.find_property("App\\Child", "id").unwrap();
        assert!(id.promoted);
        assert_eq!(id.property_type, Type::Int);
        assert!(index.find_property("App\\Child", "label").is_none());

        assert!(index.class("App\\Child").unwrap().is_final);
        assert!(index.find_method("App\\Named", "getName").unwrap().is_abstract);
    }

    #[test]
    fn test_functions() {
        let index = index();
        assert_eq!(index.function("App\\helper").unwrap().return_type, Type::Int);
        let fallback = FunctionName::Fallback { namespaced: "App\\time".into(), global: "time".into() };
        assert!(index.resolve_function(&fallback).unwrap().builtin);
    }

    #[test]
    fn test_doc_tag_type() {
        assert_eq!(doc_tag_type("/** @var Logger */", "@var"), Some("Logger".to_string()));
        assert_eq!(doc_tag_type("/** nothing */", "@var"), None);
    }
}
