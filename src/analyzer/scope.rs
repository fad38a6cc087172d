/*!
# Semantic context

A `Scope` is the fact bundle attached to a node: file, names in effect,
enclosing class and function, known local variable types and the declaration
universe. Expression types are inferred on demand from these facts.
*/

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::index::{ClassIndex, ClassInfo};
use super::names::NameContext;
use super::types::Type;
use crate::parser::ast::{AstNode, AstNodeType};

pub type Locals = HashMap<String, Type>;

#[derive(Clone)]
pub struct Scope {
    pub file: PathBuf,
    pub names: Rc<NameContext>,
    /// Fully qualified name of the enclosing class
    pub class: Option<String>,
    /// Name of the enclosing method or function
    pub function: Option<String>,
    locals: Rc<Locals>,
    universe: Rc<ClassIndex>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("file", &self.file)
            .field("class", &self.class)
            .field("function", &self.function)
            .field("locals", &self.locals)
            .finish()
    }
}

impl Scope {
    pub fn new(file: &Path, names: Rc<NameContext>, universe: Rc<ClassIndex>) -> Self {
        Self {
            file: file.to_path_buf(),
            names,
            class: None,
            function: None,
            locals: Rc::new(Locals::new()),
            universe,
        }
    }

    pub fn with_names(&self, names: Rc<NameContext>) -> Self {
        Self { names, ..self.clone() }
    }

    pub fn in_class(&self, class: String) -> Self {
        Self {
            class: Some(class),
            function: None,
            locals: Rc::new(Locals::new()),
            ..self.clone()
        }
    }

    /// Fresh function scope with the given locals
    pub fn in_function(&self, function: Option<String>, locals: Locals) -> Self {
        Self {
            function,
            locals: Rc::new(locals),
            ..self.clone()
        }
    }

    pub fn with_locals(&self, locals: Locals) -> Self {
        Self {
            locals: Rc::new(locals),
            ..self.clone()
        }
    }

    pub fn with_variable(&self, name: &str, ty: Type) -> Self {
        let mut locals = (*self.locals).clone();
        locals.insert(name.to_string(), ty);
        self.with_locals(locals)
    }

    /// Binds a local in place; the locals map is copied only when shared.
    pub fn bind(&mut self, name: &str, ty: Type) {
        Rc::make_mut(&mut self.locals).insert(name.to_string(), ty);
    }

    /// Joins the locals of alternative control flow paths into this scope.
    pub fn merge(&mut self, branches: &[Locals]) {
        let mut merged = (*self.locals).clone();
        for branch in branches {
            for (name, ty) in branch {
                let joined = match merged.get(name) {
                    Some(existing) if existing == ty => continue,
                    Some(existing) => Type::union([existing.clone(), ty.clone()]),
                    None => ty.clone(),
                };
                merged.insert(name.clone(), joined);
            }
        }
        self.locals = Rc::new(merged);
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    pub fn universe(&self) -> &ClassIndex {
        &self.universe
    }

    pub fn universe_rc(&self) -> Rc<ClassIndex> {
        self.universe.clone()
    }

    pub fn is_in_class(&self) -> bool {
        self.class.is_some()
    }

    pub fn class_info(&self) -> Option<&ClassInfo> {
        self.class.as_deref().and_then(|c| self.universe.class(c))
    }

    pub fn variable(&self, name: &str) -> Type {
        self.locals.get(name).cloned().unwrap_or(Type::Mixed)
    }

    /// `Class:line` inside a class, `file:line` elsewhere.
    pub fn location(&self, line: usize) -> String {
        match &self.class {
            Some(class) => format!("{}:{}", class, line),
            None => format!("{}:{}", self.file.display(), line),
        }
    }

    /// Fully qualified class name written in code; handles `self`, `static` and `parent`.
    pub fn resolve_class(&self, name: &str) -> String {
        match name.to_ascii_lowercase().as_str() {
            "self" | "static" => self.class.clone().unwrap_or_else(|| name.to_string()),
            "parent" => self
                .class_info()
                .and_then(|c| c.parent.clone())
                .unwrap_or_else(|| name.to_string()),
            _ => self.names.resolve_class(name),
        }
    }

    /// Class named by the class part of a static access or `new`, if known statically.
    pub fn class_of(&self, class: &AstNode) -> Option<String> {
        match class.node_type {
            AstNodeType::Name => Some(self.resolve_class(class.text())),
            _ => match self.type_of(class) {
                Type::Object(name) => Some(name),
                _ => None,
            },
        }
    }

    pub fn type_of(&self, expr: &AstNode) -> Type {
        use AstNodeType::*;
        match expr.node_type {
            Variable => self.variable(expr.text()),
            IntLiteral => Type::Int,
            FloatLiteral => Type::Float,
            StringLiteral | InterpolatedString => Type::String,
            ConstFetch => match expr.child(0).map(|n| n.text().to_ascii_lowercase()).as_deref() {
                Some("true" | "false") => Type::Bool,
                Some("null") => Type::Null,
                Some("php_eol") => Type::String,
                Some("m_pi" | "m_pi_2" | "m_pi_4") => Type::Float,
                Some("php_int_max" | "php_int_min") => Type::Int,
                _ => Type::Mixed,
            },
            New => match expr.child(0).and_then(|c| self.class_of(c)) {
                Some(class) => Type::object(class),
                None => Type::Mixed,
            },
            Clone => expr.child(0).map_or(Type::Mixed, |e| self.type_of(e)),
            Closure | ArrowFunction => Type::object("Closure"),
            PropertyFetch => self.property_type(expr),
            StaticPropertyFetch => {
                let class = expr.child(0).and_then(|c| self.class_of(c));
                let property = expr.child(1).map(|p| p.text()).unwrap_or_default();
                class
                    .and_then(|c| self.universe.find_property(&c, property))
                    .map_or(Type::Mixed, |p| p.property_type.clone())
            }
            MethodCall => self.method_call_type(expr),
            StaticCall => {
                let class = expr.child(0).and_then(|c| self.class_of(c));
                let method = expr.child(1).map(|m| m.text()).unwrap_or_default();
                class.map_or(Type::Mixed, |c| self.return_type(&c, method))
            }
            FuncCall => match expr.child(0) {
                Some(name) if name.node_type == Name => {
                    let function = self.names.resolve_function(name.text());
                    self.universe
                        .resolve_function(&function)
                        .map_or(Type::Mixed, |f| f.return_type.clone())
                }
                _ => Type::Mixed,
            },
            ClassConstFetch => match expr.child(1).map(|m| m.text()) {
                Some(member) if member.eq_ignore_ascii_case("class") => Type::String,
                _ => Type::Mixed,
            },
            ArrayLiteral => {
                let values: Vec<Type> = expr
                    .children
                    .iter()
                    .filter_map(|item| item.slot(1))
                    .map(|value| self.type_of(value))
                    .collect();
                Type::array_of(if values.is_empty() { Type::Mixed } else { Type::union(values) })
            }
            ArrayDimFetch => expr.child(0).map_or(Type::Mixed, |base| self.type_of(base).element()),
            Isset | EmptyCheck => Type::Bool,
            Match => Type::union(
                expr.child(1)
                    .map(|arms| arms.children.iter().filter_map(|arm| arm.child(1)).map(|r| self.type_of(r)).collect::<Vec<_>>())
                    .unwrap_or_else(Vec::new),
            ),
            Cast => match expr.text() {
                "int" => Type::Int,
                "float" => Type::Float,
                "string" => Type::String,
                "bool" => Type::Bool,
                "array" => Type::array_of(Type::Mixed),
                "object" => Type::object("stdClass"),
                _ => Type::Mixed,
            },
            Unary => match expr.text() {
                "!" => Type::Bool,
                "-" | "+" | "++" | "--" | "@" | "&" => expr.child(0).map_or(Type::Mixed, |e| self.type_of(e)),
                "~" => Type::Int,
                _ => Type::Mixed,
            },
            Binary => self.binary_type(expr),
            Assign => match expr.text() {
                "=" => expr.child(1).map_or(Type::Mixed, |e| self.type_of(e)),
                ".=" => Type::String,
                _ => Type::Mixed,
            },
            Ternary => {
                let then = match expr.slot(1) {
                    Some(then) => self.type_of(then),
                    None => expr.child(0).map_or(Type::Mixed, |c| self.type_of(c).without_null()),
                };
                let otherwise = expr.child(2).map_or(Type::Mixed, |e| self.type_of(e));
                Type::union([then, otherwise])
            }
            _ => Type::Mixed,
        }
    }

    fn property_type(&self, fetch: &AstNode) -> Type {
        let (Some(receiver), Some(member)) = (fetch.child(0), fetch.child(1)) else {
            return Type::Mixed;
        };
        if member.node_type != AstNodeType::Identifier {
            return Type::Mixed;
        }
        let types: Vec<Type> = self
            .type_of(receiver)
            .class_names()
            .into_iter()
            .map(|class| {
                self.universe
                    .find_property(class, member.text())
                    .map_or(Type::Mixed, |p| p.property_type.clone())
            })
            .collect();
        if types.is_empty() {
            Type::Mixed
        } else {
            Type::union(types)
        }
    }

    fn method_call_type(&self, call: &AstNode) -> Type {
        let (Some(receiver), Some(member)) = (call.child(0), call.child(1)) else {
            return Type::Mixed;
        };
        if member.node_type != AstNodeType::Identifier {
            return Type::Mixed;
        }
        let receiver_type = self.type_of(receiver);
        let types: Vec<Type> = receiver_type
            .class_names()
            .into_iter()
            .map(|class| self.return_type(class, member.text()))
            .collect();
        if types.is_empty() {
            Type::Mixed
        } else {
            Type::union(types)
        }
    }

    /// Return type of `class::method`; `static` return types follow the called class.
    fn return_type(&self, class: &str, method: &str) -> Type {
        match self.universe.find_method(class, method) {
            Some(info) => match &info.return_type {
                Type::Object(declared) if declared.eq_ignore_ascii_case(&info.class) => Type::object(class),
                other => other.clone(),
            },
            None => Type::Mixed,
        }
    }

    fn binary_type(&self, expr: &AstNode) -> Type {
        let operand = |i: usize| expr.child(i).map_or(Type::Mixed, |e| self.type_of(e));
        match expr.text().to_ascii_lowercase().as_str() {
            "." => Type::String,
            "==" | "!=" | "<>" | "===" | "!==" | "<" | "<=" | ">" | ">=" | "&&" | "||" | "and" | "or" | "xor"
            | "instanceof" => Type::Bool,
            "<=>" | "%" | "<<" | ">>" | "&" | "|" | "^" => Type::Int,
            "??" => Type::union([operand(0).without_null(), operand(1)]),
            "+" | "-" | "*" | "**" => match (operand(0), operand(1)) {
                (Type::Int, Type::Int) => Type::Int,
                (l, r) if l.is_numeric() && r.is_numeric() => Type::Float,
                (l, r) if l.is_array() && r.is_array() && expr.text() == "+" => Type::union([l, r]),
                _ => Type::Mixed,
            },
            "/" => match (operand(0), operand(1)) {
                (l, r) if l.is_numeric() && r.is_numeric() => Type::union([Type::Int, Type::Float]),
                _ => Type::Mixed,
            },
            _ => Type::Mixed,
        }
    }
}
