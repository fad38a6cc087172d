/*!
# Abstract Syntax Tree (AST) for PHP

Generic node representation: every node is a kind, a span, an optional value,
string attributes and an ordered child list. Children are reference counted so
a rewritten working tree can share every untouched subtree with the reference
tree it was derived from.

Fixed-arity kinds hold `Empty` children in slots for absent optional parts
(missing default value, missing return type, ...). List kinds hold any number
of children.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::core::position::{Position, Span};

/// Stable identity assigned by the parser. Nodes built by rewrites carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// AST Node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AstNodeType {
    // Module level
    Module,
    Namespace,
    Use,
    UseItem,
    Declare,

    // Declarations
    ClassDeclaration,
    ClassBody,
    TraitUse,
    Property,
    ClassConstant,
    ClassMethod,
    FunctionDeclaration,
    ParameterList,
    Parameter,
    Modifiers,
    TypeHint,
    NameList,

    // Statements
    Block,
    ExpressionStatement,
    Return,
    Echo,
    Throw,
    If,
    ElseIfList,
    ElseIf,
    While,
    DoWhile,
    Switch,
    CaseList,
    Case,
    CaseBody,
    StaticVars,
    StaticVar,
    For,
    ExprList,
    Foreach,
    Try,
    CatchList,
    Catch,
    Break,
    Continue,
    Nop,

    // Expressions
    Variable,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    InterpolatedString,
    StringFragment,
    ConstFetch,
    Name,
    Identifier,
    Binary,
    Unary,
    Cast,
    Assign,
    Ternary,
    FuncCall,
    ArgumentList,
    MethodCall,
    StaticCall,
    PropertyFetch,
    StaticPropertyFetch,
    ClassConstFetch,
    New,
    ArrayLiteral,
    ArrayItem,
    ArrayDimFetch,
    Isset,
    EmptyCheck,
    Closure,
    ClosureUses,
    ArrowFunction,
    Match,
    MatchArmList,
    MatchArm,
    Clone,
    Include,
    Yield,

    /// Inert expression printed as an embedded comment.
    Placeholder,
    /// Absent optional part of a fixed-arity node.
    Empty,
}

impl AstNodeType {
    /// Kinds whose children form a variable-length sequence.
    pub fn is_list(self) -> bool {
        use AstNodeType::*;
        matches!(
            self,
            Module
                | Block
                | ClassBody
                | Use
                | TraitUse
                | ParameterList
                | NameList
                | Echo
                | ElseIfList
                | ExprList
                | CatchList
                | ArgumentList
                | ArrayLiteral
                | Isset
                | ClosureUses
                | InterpolatedString
                | CaseList
                | CaseBody
                | StaticVars
                | MatchArmList
        )
    }

    /// Expression kinds. Fingerprints of these use their rendered text.
    pub fn is_expression(self) -> bool {
        use AstNodeType::*;
        matches!(
            self,
            Variable
                | IntLiteral
                | FloatLiteral
                | StringLiteral
                | InterpolatedString
                | ConstFetch
                | Binary
                | Unary
                | Cast
                | Assign
                | Ternary
                | FuncCall
                | MethodCall
                | StaticCall
                | PropertyFetch
                | StaticPropertyFetch
                | ClassConstFetch
                | New
                | ArrayLiteral
                | ArrayDimFetch
                | Isset
                | EmptyCheck
                | Closure
                | ArrowFunction
                | Match
                | Clone
                | Include
                | Yield
                | Placeholder
        )
    }

    pub fn is_call(self) -> bool {
        matches!(self, AstNodeType::MethodCall | AstNodeType::StaticCall)
    }
}

impl fmt::Display for AstNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNodeType::Empty => write!(f, "Empty"),
            AstNodeType::Placeholder => write!(f, "Placeholder"),
            AstNodeType::EmptyCheck => write!(f, "Empty_"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Main AST Node
#[derive(Debug, Clone)]
pub struct AstNode {
    pub id: Option<NodeId>,
    pub node_type: AstNodeType,
    pub span: Span,
    pub value: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Rc<AstNode>>,
}

impl AstNode {
    /// Creates a new AST node
    pub fn new(node_type: AstNodeType, span: Span) -> Self {
        Self {
            id: None,
            node_type,
            span,
            value: None,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Creates node with value
    pub fn with_value(node_type: AstNodeType, span: Span, value: impl Into<String>) -> Self {
        let mut node = Self::new(node_type, span);
        node.value = Some(value.into());
        node
    }

    /// Node built by a rewrite: no identity, no source location.
    pub fn synthetic(node_type: AstNodeType, value: Option<String>, children: Vec<Rc<AstNode>>) -> Self {
        Self {
            id: None,
            node_type,
            span: Span::zero(),
            value,
            attributes: BTreeMap::new(),
            children,
        }
    }

    /// Absent optional part, anchored at `span`.
    pub fn empty(span: Span) -> Self {
        Self::new(AstNodeType::Empty, span)
    }

    /// Inert expression rendered as `/* text */`.
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::synthetic(AstNodeType::Placeholder, Some(text.into()), Vec::new())
    }

    /// Adds a child node
    pub fn add_child(&mut self, child: AstNode) {
        self.children.push(Rc::new(child));
    }

    /// Adds an attribute
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Marks a boolean attribute
    pub fn set_flag(&mut self, key: &str) {
        self.attributes.insert(key.to_string(), "true".to_string());
    }

    /// Gets attribute value
    pub fn get_attribute(&self, key: &str) -> Option<&String> {
        self.attributes.get(key)
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.get_attribute(key).is_some_and(|v| v == "true")
    }

    /// Gets the text value of the node
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    pub fn is(&self, node_type: AstNodeType) -> bool {
        self.node_type == node_type
    }

    pub fn is_empty_slot(&self) -> bool {
        self.node_type == AstNodeType::Empty
    }

    pub fn child(&self, index: usize) -> Option<&Rc<AstNode>> {
        self.children.get(index)
    }

    /// Child in a fixed slot, `None` when the slot is absent or `Empty`.
    pub fn slot(&self, index: usize) -> Option<&Rc<AstNode>> {
        self.children.get(index).filter(|c| !c.is_empty_slot())
    }

    /// Finds first child of given type
    pub fn find_child(&self, node_type: AstNodeType) -> Option<&Rc<AstNode>> {
        self.children.iter().find(|child| child.node_type == node_type)
    }

    /// Recursively finds all nodes of given type
    pub fn find_all(&self, node_type: AstNodeType) -> Vec<&AstNode> {
        let mut result = Vec::new();
        self.find_all_recursive(node_type, &mut result);
        result
    }

    fn find_all_recursive<'a>(&'a self, node_type: AstNodeType, result: &mut Vec<&'a AstNode>) {
        if self.node_type == node_type {
            result.push(self);
        }
        for child in &self.children {
            child.find_all_recursive(node_type, result);
        }
    }

    /// Gets the position of the node
    pub fn position(&self) -> Position {
        self.span.start
    }

    pub fn line(&self) -> usize {
        self.span.start.line
    }

    /// Declared name for declarations, variables, identifiers and names.
    pub fn name(&self) -> Option<&str> {
        use AstNodeType::*;
        match self.node_type {
            ClassDeclaration | ClassMethod | FunctionDeclaration | Property | ClassConstant | Parameter
            | Variable | Identifier | Name | Namespace => self.value.as_deref(),
            _ => None,
        }
    }

    /// Modifier keywords of a declaration (lowercase).
    pub fn modifiers(&self) -> Vec<&str> {
        let holder = if self.node_type == AstNodeType::Modifiers {
            Some(self)
        } else {
            self.find_child(AstNodeType::Modifiers).map(|m| m.as_ref())
        };
        holder.map_or_else(Vec::new, |m| m.text().split_whitespace().collect())
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers().iter().any(|m| m.eq_ignore_ascii_case(modifier))
    }

    /// Parameters of a method, function, closure or arrow function.
    pub fn parameters(&self) -> Vec<&Rc<AstNode>> {
        self.find_child(AstNodeType::ParameterList)
            .map(|list| list.children.iter().collect())
            .unwrap_or_default()
    }

    /// Copy with new children; identity, span and attributes are kept.
    pub fn with_children(&self, children: Vec<Rc<AstNode>>) -> AstNode {
        AstNode {
            id: self.id,
            node_type: self.node_type,
            span: self.span,
            value: self.value.clone(),
            attributes: self.attributes.clone(),
            children,
        }
    }

    /// Copy with one child slot replaced.
    pub fn with_child(&self, index: usize, child: Rc<AstNode>) -> AstNode {
        let mut children = self.children.clone();
        if index < children.len() {
            children[index] = child;
        }
        self.with_children(children)
    }

    /// Fully independent copy that keeps node identities.
    pub fn deep_clone(&self) -> Rc<AstNode> {
        Rc::new(AstNode {
            children: self.children.iter().map(|c| c.deep_clone()).collect(),
            ..self.shallow()
        })
    }

    /// Fully independent copy without identities or source locations.
    pub fn fresh_clone(&self) -> Rc<AstNode> {
        Rc::new(AstNode {
            id: None,
            span: Span::zero(),
            children: self.children.iter().map(|c| c.fresh_clone()).collect(),
            ..self.shallow()
        })
    }

    /// Copy where every node without a source location takes `span`.
    /// Subtrees that are located throughout are shared.
    pub fn anchored(node: &Rc<AstNode>, span: Span) -> Rc<AstNode> {
        let children: Vec<_> = node.children.iter().map(|c| AstNode::anchored(c, span)).collect();
        let shared = children.iter().zip(&node.children).all(|(new, old)| Rc::ptr_eq(new, old));
        if shared && !node.span.is_synthetic() {
            return node.clone();
        }
        let mut copy = node.with_children(children);
        if copy.span.is_synthetic() {
            copy.span = span;
        }
        Rc::new(copy)
    }

    fn shallow(&self) -> AstNode {
        AstNode {
            id: self.id,
            node_type: self.node_type,
            span: self.span,
            value: self.value.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }

    /// Same kind, value and attributes; children are not compared.
    pub fn same_shape(&self, other: &AstNode) -> bool {
        self.node_type == other.node_type && self.value == other.value && self.attributes == other.attributes
    }

    pub fn count_nodes(&self) -> usize {
        1 + self.children.iter().map(|c| c.count_nodes()).sum::<usize>()
    }
}

impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.same_shape(other) && self.children == other.children
    }
}

/// AST visitor trait for read-only traversal
pub trait AstVisitor {
    fn visit_node(&mut self, node: &AstNode);

    fn walk(&mut self, node: &AstNode) {
        self.visit_node(node);
        for child in &node.children {
            self.walk(child);
        }
    }
}
