/*!
# Type model

Inferred expression types. Deliberately small: enough to decide whether a
call receiver is an instance of a class, whether a value is an array and
whether a key is a valid array key.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use super::index::ClassIndex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Unknown type
    Mixed,
    Null,
    Bool,
    Int,
    Float,
    String,
    Void,
    /// Array with the given value type
    Array(Box<Type>),
    /// Instance of a fully qualified class name (no leading backslash)
    Object(String),
    Union(Vec<Type>),
}

impl Type {
    pub fn object(name: impl Into<String>) -> Self {
        Type::Object(name.into().trim_start_matches('\\').to_string())
    }

    pub fn array_of(value: Type) -> Self {
        Type::Array(Box::new(value))
    }

    /// Union that collapses duplicates and absorbs into `Mixed`.
    pub fn union(types: impl IntoIterator<Item = Type>) -> Self {
        let mut members: Vec<Type> = Vec::new();
        for ty in types {
            let flattened = match ty {
                Type::Union(inner) => inner,
                Type::Mixed => return Type::Mixed,
                other => vec![other],
            };
            for member in flattened {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }
        match members.len() {
            0 => Type::Mixed,
            1 => members.remove(0),
            _ => Type::Union(members),
        }
    }

    /// Parses a written type hint; `resolve` maps class names to fully qualified names.
    pub fn from_hint(hint: &str, resolve: &dyn Fn(&str) -> String) -> Self {
        let hint = hint.trim();
        if let Some(inner) = hint.strip_prefix('?') {
            return Type::union([Type::from_hint(inner, resolve), Type::Null]);
        }
        if hint.contains('|') {
            return Type::union(hint.split('|').map(|part| Type::from_hint(part, resolve)));
        }
        if hint.contains('&') {
            // intersections are approximated by their first member
            let first = hint.split('&').next().unwrap_or(hint);
            return Type::from_hint(first, resolve);
        }
        if let Some(element) = hint.strip_suffix("[]") {
            return Type::array_of(Type::from_hint(element, resolve));
        }
        if hint.contains('<') || hint.contains('{') {
            // generic and shaped doc types keep their outer kind only
            let outer = hint.split(['<', '{']).next().unwrap_or(hint).trim();
            return match outer.to_ascii_lowercase().as_str() {
                "array" | "list" | "non-empty-array" | "non-empty-list" => Type::array_of(Type::Mixed),
                _ => Type::from_hint(outer, resolve),
            };
        }

        match hint.to_ascii_lowercase().as_str() {
            "" | "mixed" => Type::Mixed,
            "null" => Type::Null,
            "bool" | "boolean" | "true" | "false" => Type::Bool,
            "int" | "integer" => Type::Int,
            "float" | "double" => Type::Float,
            "string" | "class-string" | "non-empty-string" => Type::String,
            "void" | "never" => Type::Void,
            "array" | "list" | "iterable" => Type::array_of(Type::Mixed),
            "callable" | "object" | "resource" => Type::Mixed,
            _ => Type::object(resolve(hint)),
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, Type::Mixed)
    }

    /// Definitely an array (no other member in a union)
    pub fn is_array(&self) -> bool {
        match self {
            Type::Array(_) => true,
            Type::Union(members) => members.iter().all(Type::is_array),
            _ => false,
        }
    }

    /// Definitely usable as an array key without conversion
    pub fn is_valid_key(&self) -> bool {
        match self {
            Type::Int | Type::String => true,
            Type::Union(members) => members.iter().all(Type::is_valid_key),
            _ => false,
        }
    }

    /// Value type of an array, `Mixed` for anything else.
    pub fn element(&self) -> Type {
        match self {
            Type::Array(value) => (**value).clone(),
            Type::Union(members) if self.is_array() => Type::union(members.iter().map(Type::element)),
            _ => Type::Mixed,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn without_null(&self) -> Type {
        match self {
            Type::Union(members) => Type::union(members.iter().filter(|m| **m != Type::Null).cloned()),
            other => other.clone(),
        }
    }

    /// Class names this type may be an instance of.
    pub fn class_names(&self) -> Vec<&str> {
        match self {
            Type::Object(name) => vec![name.as_str()],
            Type::Union(members) => members.iter().flat_map(Type::class_names).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether every value of `other` is an instance of this object type.
    /// Null members of `other` are tolerated, as long as one object member remains.
    pub fn accepts(&self, other: &Type, index: &ClassIndex) -> bool {
        let Type::Object(target) = self else {
            return self == other;
        };
        match other {
            Type::Object(name) => index.is_subclass_of(name, target),
            Type::Union(members) => {
                let objects: Vec<&Type> = members.iter().filter(|m| **m != Type::Null).collect();
                !objects.is_empty() && objects.iter().all(|m| self.accepts(m, index))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Mixed => write!(f, "mixed"),
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Array(value) => write!(f, "array<{}>", value),
            Type::Object(name) => write!(f, "{}", name),
            Type::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "{}", parts.join("|"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: &str) -> String {
        name.trim_start_matches('\\').to_string()
    }

    #[test]
    fn test_from_hint() {
        assert_eq!(Type::from_hint("?int", &global), Type::Union(vec![Type::Int, Type::Null]));
        assert_eq!(Type::from_hint("\\Logger", &global), Type::object("Logger"));
        assert_eq!(Type::from_hint("string[]", &global), Type::array_of(Type::String));
        assert_eq!(Type::from_hint("array{float, float}", &global), Type::array_of(Type::Mixed));
        assert_eq!(Type::from_hint("int|string", &global), Type::Union(vec![Type::Int, Type::String]));
    }

    #[test]
    fn test_array_and_key_checks() {
        assert!(Type::array_of(Type::Int).is_array());
        assert!(!Type::from_hint("?array", &global).is_array());
        assert!(!Type::Mixed.is_array());
        assert!(Type::from_hint("int|string", &global).is_valid_key());
        assert!(!Type::Float.is_valid_key());
        assert!(!Type::Mixed.is_valid_key());
    }

    #[test]
    fn test_union_collapses() {
        assert_eq!(Type::union([Type::Int, Type::Int]), Type::Int);
        assert_eq!(Type::union([Type::Int, Type::Mixed]), Type::Mixed);
        assert_eq!(Type::union([Type::Int, Type::Null]).without_null(), Type::Int);
    }
}
