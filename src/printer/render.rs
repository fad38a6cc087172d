/*!
# Canonical renderer

Prints any (sub)tree as PHP text without looking at the original tokens.
Used for nodes built by rewrites, for fingerprint text and for placeholder
text. Parentheses are inserted from operator binding powers, so a tree always
renders to text that parses back to the same shape.

A hook can intercept child rendering; the format-preserving printer uses it to
splice original text back in under a canonically rendered parent.
*/

use crate::core::errors::{PreprocessError, Result};
use crate::parser::ast::{AstNode, AstNodeType};
use crate::parser::grammar::{
    binary_binding_power, ASSIGN_BP, CLONE_BP, LOW_PREFIX_BP, NOT_BP, PRIMARY_BP, TERNARY_BP, UNARY_BP,
};

const INDENT: &str = "    ";

/// Child interceptor: `Some(text)` replaces canonical rendering of that child.
pub type RenderHook<'h> = &'h dyn Fn(&AstNode, usize) -> Option<Result<String>>;

/// Canonical PHP renderer
#[derive(Clone, Copy, Default)]
pub struct Renderer<'h> {
    hook: Option<RenderHook<'h>>,
}

impl<'h> Renderer<'h> {
    pub fn canonical() -> Renderer<'static> {
        Renderer { hook: None }
    }

    pub fn with_hook(hook: RenderHook<'h>) -> Self {
        Self { hook: Some(hook) }
    }

    /// Renders `node` itself canonically; children go through the hook.
    pub fn render(&self, node: &AstNode) -> Result<String> {
        self.node(node, 0)
    }

    /// Renders `node` at the given statement depth.
    pub fn render_at(&self, node: &AstNode, depth: usize) -> Result<String> {
        self.node(node, depth)
    }

    fn child(&self, node: &AstNode, depth: usize) -> Result<String> {
        if let Some(hook) = self.hook {
            if let Some(text) = hook(node, depth) {
                return text;
            }
        }
        self.node(node, depth)
    }

    fn required<'n>(&self, node: &'n AstNode, index: usize) -> Result<&'n AstNode> {
        node.slot(index).map(|c| c.as_ref()).ok_or_else(|| {
            PreprocessError::Render(format!("{} at {} is missing child {}", node.node_type, node.span.start, index))
        })
    }

    fn optional(&self, node: &AstNode, index: usize, depth: usize) -> Result<Option<String>> {
        match node.slot(index) {
            Some(child) => Ok(Some(self.child(child, depth)?)),
            None => Ok(None),
        }
    }

    fn join(&self, nodes: &[std::rc::Rc<AstNode>], separator: &str, depth: usize) -> Result<String> {
        let parts = nodes
            .iter()
            .map(|n| self.child(n, depth))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(separator))
    }

    fn node(&self, node: &AstNode, depth: usize) -> Result<String> {
        use AstNodeType::*;
        match node.node_type {
            Module => {
                let mut out = String::from("<?php\n\n");
                for statement in &node.children {
                    out.push_str(&self.child(statement, 0)?);
                    out.push('\n');
                }
                Ok(out)
            }
            Block | ClassBody | CaseList => self.block(&node.children, depth),
            Namespace => {
                let name = node.value.as_deref().map(|n| format!(" {}", n)).unwrap_or_default();
                match node.slot(0) {
                    Some(body) => Ok(format!("namespace{} {}", name, self.child(body, depth)?)),
                    None => Ok(format!("namespace{};", name)),
                }
            }
            Use => {
                let kind = match node.text() {
                    "class" | "" => String::new(),
                    other => format!("{} ", other),
                };
                Ok(format!("use {}{};", kind, self.join(&node.children, ", ", depth)?))
            }
            UseItem => Ok(match node.get_attribute("alias") {
                Some(alias) => format!("{} as {}", node.text(), alias),
                None => node.text().to_string(),
            }),
            Declare => Ok(format!("declare({}={});", node.text(), self.child(self.required(node, 0)?, depth)?)),
            ClassDeclaration => self.class(node, depth),
            TraitUse => Ok(format!("use {};", self.join(&node.children, ", ", depth)?)),
            Property => {
                let mut out = self.prefix(node, depth)?;
                out.push('$');
                out.push_str(node.text());
                if let Some(default) = self.optional(node, 2, depth)? {
                    out.push_str(" = ");
                    out.push_str(&default);
                }
                out.push(';');
                Ok(out)
            }
            ClassConstant => {
                let modifiers = self.modifiers_prefix(node, depth)?;
                let value = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("{}const {} = {};", modifiers, node.text(), value))
            }
            ClassMethod => {
                let modifiers = self.modifiers_prefix(node, depth)?;
                let signature = self.signature(node, 1, 2, depth)?;
                let by_ref = if node.has_flag("by_ref") { "&" } else { "" };
                let body = match node.slot(3) {
                    Some(body) => format!("\n{}{}", indent(depth), self.child(body, depth)?),
                    None => ";".to_string(),
                };
                Ok(format!("{}function {}{}{}{}", modifiers, by_ref, node.text(), signature, body))
            }
            FunctionDeclaration => {
                let signature = self.signature(node, 0, 1, depth)?;
                let by_ref = if node.has_flag("by_ref") { "&" } else { "" };
                let body = self.child(self.required(node, 2)?, depth)?;
                Ok(format!("function {}{}{}\n{}{}", by_ref, node.text(), signature, indent(depth), body))
            }
            ParameterList | ArgumentList => Ok(format!("({})", self.join(&node.children, ", ", depth)?)),
            Parameter => {
                let mut out = self.prefix(node, depth)?;
                if node.has_flag("by_ref") {
                    out.push('&');
                }
                if node.has_flag("variadic") {
                    out.push_str("...");
                }
                out.push('$');
                out.push_str(node.text());
                if let Some(default) = self.optional(node, 2, depth)? {
                    out.push_str(" = ");
                    out.push_str(&default);
                }
                Ok(out)
            }
            Modifiers | TypeHint | Name | Identifier | IntLiteral | FloatLiteral | StringLiteral | StringFragment => {
                Ok(node.text().to_string())
            }
            NameList | ExprList => self.join(&node.children, ", ", depth),
            ExpressionStatement => Ok(format!("{};", self.child(self.required(node, 0)?, depth)?)),
            Return => Ok(match self.optional(node, 0, depth)? {
                Some(value) => format!("return {};", value),
                None => "return;".to_string(),
            }),
            Echo => Ok(format!("echo {};", self.join(&node.children, ", ", depth)?)),
            Throw => Ok(format!("throw {};", self.child(self.required(node, 0)?, depth)?)),
            If => {
                let condition = self.child(self.required(node, 0)?, depth)?;
                let body = self.child(self.required(node, 1)?, depth)?;
                let mut out = format!("if ({}) {}", condition, body);
                if let Some(branches) = node.child(2) {
                    for branch in &branches.children {
                        out.push(' ');
                        out.push_str(&self.child(branch, depth)?);
                    }
                }
                if let Some(otherwise) = self.optional(node, 3, depth)? {
                    out.push_str(" else ");
                    out.push_str(&otherwise);
                }
                Ok(out)
            }
            ElseIfList => self.join(&node.children, " ", depth),
            ElseIf => {
                let condition = self.child(self.required(node, 0)?, depth)?;
                let body = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("elseif ({}) {}", condition, body))
            }
            While => {
                let condition = self.child(self.required(node, 0)?, depth)?;
                let body = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("while ({}) {}", condition, body))
            }
            DoWhile => {
                let body = self.child(self.required(node, 0)?, depth)?;
                let condition = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("do {} while ({});", body, condition))
            }
            Switch => {
                let subject = self.child(self.required(node, 0)?, depth)?;
                let cases = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("switch ({}) {}", subject, cases))
            }
            Case => {
                let mut out = match self.optional(node, 0, depth)? {
                    Some(test) => format!("case {}:", test),
                    None => "default:".to_string(),
                };
                if let Some(body) = node.child(1) {
                    out.push_str(&self.child(body, depth)?);
                }
                Ok(out)
            }
            CaseBody => {
                let mut out = String::new();
                for statement in &node.children {
                    out.push('\n');
                    out.push_str(&indent(depth + 1));
                    out.push_str(&self.child(statement, depth + 1)?);
                }
                Ok(out)
            }
            StaticVars => Ok(format!("static {};", self.join(&node.children, ", ", depth)?)),
            StaticVar => Ok(match self.optional(node, 0, depth)? {
                Some(default) => format!("${} = {}", node.text(), default),
                None => format!("${}", node.text()),
            }),
            For => {
                let part = |i: usize| -> Result<String> {
                    match node.child(i) {
                        Some(list) => self.child(list, depth),
                        None => Ok(String::new()),
                    }
                };
                let body = self.child(self.required(node, 3)?, depth)?;
                Ok(format!("for ({}; {}; {}) {}", part(0)?, part(1)?, part(2)?, body))
            }
            Foreach => {
                let subject = self.child(self.required(node, 0)?, depth)?;
                let key = self.optional(node, 1, depth)?.map(|k| format!("{} => ", k)).unwrap_or_default();
                let by_ref = if node.has_flag("by_ref") { "&" } else { "" };
                let value = self.child(self.required(node, 2)?, depth)?;
                let body = self.child(self.required(node, 3)?, depth)?;
                Ok(format!("foreach ({} as {}{}{}) {}", subject, key, by_ref, value, body))
            }
            Try => {
                let mut out = format!("try {}", self.child(self.required(node, 0)?, depth)?);
                if let Some(catches) = node.child(1) {
                    for catch in &catches.children {
                        out.push(' ');
                        out.push_str(&self.child(catch, depth)?);
                    }
                }
                if let Some(finally) = self.optional(node, 2, depth)? {
                    out.push_str(" finally ");
                    out.push_str(&finally);
                }
                Ok(out)
            }
            CatchList => self.join(&node.children, " ", depth),
            Catch => {
                let types = self.required(node, 0)?;
                let types = self.join(&types.children, "|", depth)?;
                let variable = node.value.as_deref().map(|v| format!(" ${}", v)).unwrap_or_default();
                let body = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("catch ({}{}) {}", types, variable, body))
            }
            Break | Continue => {
                let keyword = if node.node_type == Break { "break" } else { "continue" };
                Ok(match self.optional(node, 0, depth)? {
                    Some(levels) => format!("{} {};", keyword, levels),
                    None => format!("{};", keyword),
                })
            }
            Nop => Ok(";".to_string()),
            Empty => Ok(String::new()),
            _ => self.expression(node, depth),
        }
    }

    fn block(&self, statements: &[std::rc::Rc<AstNode>], depth: usize) -> Result<String> {
        let mut out = String::from("{\n");
        for statement in statements {
            out.push_str(&indent(depth + 1));
            out.push_str(&self.child(statement, depth + 1)?);
            out.push('\n');
        }
        out.push_str(&indent(depth));
        out.push('}');
        Ok(out)
    }

    fn modifiers_prefix(&self, node: &AstNode, depth: usize) -> Result<String> {
        match node.child(0) {
            Some(modifiers) if modifiers.node_type == AstNodeType::Modifiers && !modifiers.text().is_empty() => {
                Ok(format!("{} ", self.child(modifiers, depth)?))
            }
            _ => Ok(String::new()),
        }
    }

    /// Modifiers and type hint of properties and parameters
    fn prefix(&self, node: &AstNode, depth: usize) -> Result<String> {
        let mut out = self.modifiers_prefix(node, depth)?;
        if let Some(type_hint) = self.optional(node, 1, depth)? {
            out.push_str(&type_hint);
            out.push(' ');
        }
        Ok(out)
    }

    fn signature(&self, node: &AstNode, params: usize, return_type: usize, depth: usize) -> Result<String> {
        let params = match node.child(params) {
            Some(list) => self.child(list, depth)?,
            None => "()".to_string(),
        };
        Ok(match self.optional(node, return_type, depth)? {
            Some(return_type) => format!("{} : {}", params, return_type),
            None => params,
        })
    }

    fn class(&self, node: &AstNode, depth: usize) -> Result<String> {
        let kind = node.get_attribute("kind").map_or("class", String::as_str);
        let mut out = self.modifiers_prefix(node, depth)?;
        out.push_str(kind);
        out.push(' ');
        out.push_str(node.text());
        if let Some(parent) = self.optional(node, 1, depth)? {
            out.push_str(" extends ");
            out.push_str(&parent);
        }
        if let Some(interfaces) = node.child(2).filter(|list| !list.children.is_empty()) {
            out.push_str(if kind == "interface" { " extends " } else { " implements " });
            out.push_str(&self.child(interfaces, depth)?);
        }
        out.push('\n');
        out.push_str(&indent(depth));
        out.push_str(&self.child(self.required(node, 3)?, depth)?);
        Ok(out)
    }

    // ---------------------------------------------------------------------
    // expressions

    fn expression(&self, node: &AstNode, depth: usize) -> Result<String> {
        use AstNodeType::*;
        match node.node_type {
            Variable => Ok(match node.has_flag("by_ref") {
                true => format!("&${}", node.text()),
                false => format!("${}", node.text()),
            }),
            InterpolatedString => {
                let mut out = String::from("\"");
                for part in &node.children {
                    if part.node_type == StringFragment {
                        out.push_str(part.text());
                    } else {
                        out.push('{');
                        out.push_str(&self.child(part, depth)?);
                        out.push('}');
                    }
                }
                out.push('"');
                Ok(out)
            }
            ConstFetch => self.child(self.required(node, 0)?, depth),
            Binary => {
                let op = node.text();
                if binary_binding_power(&op.to_ascii_lowercase()).is_none() {
                    return Err(PreprocessError::Render(format!("unknown operator '{}'", op)));
                }
                Ok(format!("{} {} {}", self.operand(node, 0, depth)?, op, self.operand(node, 1, depth)?))
            }
            Assign => {
                let lhs = self.operand(node, 0, depth)?;
                Ok(format!("{} {} {}", lhs, node.text(), self.operand(node, 1, depth)?))
            }
            Unary => {
                let op = node.text();
                let text = self.operand(node, 0, depth)?;
                if node.has_flag("postfix") {
                    return Ok(format!("{}{}", text, op));
                }
                let spacer = if (op == "-" || op == "+") && text.starts_with(op) { " " } else { "" };
                Ok(format!("{}{}{}", op, spacer, text))
            }
            Cast => {
                Ok(format!("({}) {}", node.text(), self.operand(node, 0, depth)?))
            }
            Ternary => {
                let condition = self.operand(node, 0, depth)?;
                let otherwise = self.operand(node, 2, depth)?;
                Ok(match self.optional(node, 1, depth)? {
                    Some(then) => format!("{} ? {} : {}", condition, then, otherwise),
                    None => format!("{} ?: {}", condition, otherwise),
                })
            }
            FuncCall => {
                let callee = self.operand(node, 0, depth)?;
                Ok(format!("{}{}", callee, self.child(self.required(node, 1)?, depth)?))
            }
            MethodCall | PropertyFetch => {
                let receiver = self.operand(node, 0, depth)?;
                let arrow = if node.has_flag("nullsafe") { "?->" } else { "->" };
                let member = self.child(self.required(node, 1)?, depth)?;
                let args = match node.node_type {
                    MethodCall => self.child(self.required(node, 2)?, depth)?,
                    _ => String::new(),
                };
                Ok(format!("{}{}{}{}", receiver, arrow, member, args))
            }
            StaticCall | StaticPropertyFetch | ClassConstFetch => {
                let class = self.operand(node, 0, depth)?;
                let member = self.child(self.required(node, 1)?, depth)?;
                let args = match node.node_type {
                    StaticCall => self.child(self.required(node, 2)?, depth)?,
                    _ => String::new(),
                };
                Ok(format!("{}::{}{}", class, member, args))
            }
            New => {
                let class = self.required(node, 0)?;
                let class = match class.node_type {
                    Name | Variable => self.child(class, depth)?,
                    _ => format!("({})", self.child(class, depth)?),
                };
                let args = self.optional(node, 1, depth)?.unwrap_or_default();
                Ok(format!("new {}{}", class, args))
            }
            ArrayLiteral => {
                let items = self.join(&node.children, ", ", depth)?;
                Ok(match node.get_attribute("kind").map(String::as_str) {
                    Some("long") => format!("array({})", items),
                    Some("list") => format!("list({})", items),
                    _ => format!("[{}]", items),
                })
            }
            ArrayItem => {
                let value = self.child(self.required(node, 1)?, depth)?;
                let spread = if node.has_flag("spread") { "..." } else { "" };
                Ok(match self.optional(node, 0, depth)? {
                    Some(key) => format!("{} => {}{}", key, spread, value),
                    None => format!("{}{}", spread, value),
                })
            }
            ArrayDimFetch => {
                let base = self.operand(node, 0, depth)?;
                let dim = self.optional(node, 1, depth)?.unwrap_or_default();
                Ok(format!("{}[{}]", base, dim))
            }
            Isset => Ok(format!("isset({})", self.join(&node.children, ", ", depth)?)),
            EmptyCheck => Ok(format!("empty({})", self.child(self.required(node, 0)?, depth)?)),
            Closure => {
                let modifiers = self.modifiers_prefix(node, depth)?;
                let by_ref = if node.has_flag("by_ref") { "&" } else { "" };
                let params = self.child(self.required(node, 1)?, depth)?;
                let uses = match node.child(2).filter(|u| !u.children.is_empty()) {
                    Some(uses) => format!(" {}", self.child(uses, depth)?),
                    None => String::new(),
                };
                let return_type = self.optional(node, 3, depth)?.map(|t| format!(" : {}", t)).unwrap_or_default();
                let body = self.child(self.required(node, 4)?, depth)?;
                Ok(format!("{}function {}{}{}{} {}", modifiers, by_ref, params, uses, return_type, body))
            }
            ClosureUses => Ok(format!("use ({})", self.join(&node.children, ", ", depth)?)),
            ArrowFunction => {
                let modifiers = self.modifiers_prefix(node, depth)?;
                let params = self.child(self.required(node, 1)?, depth)?;
                let return_type = self.optional(node, 2, depth)?.map(|t| format!(" : {}", t)).unwrap_or_default();
                let body = self.child(self.required(node, 3)?, depth)?;
                Ok(format!("{}fn{}{} => {}", modifiers, params, return_type, body))
            }
            Match => {
                let subject = self.child(self.required(node, 0)?, depth)?;
                let arms = self.child(self.required(node, 1)?, depth)?;
                Ok(format!("match ({}) {}", subject, arms))
            }
            MatchArmList => Ok(format!("{{ {} }}", self.join(&node.children, ", ", depth)?)),
            MatchArm => {
                let conditions = match node.slot(0) {
                    Some(list) => self.join(&list.children, ", ", depth)?,
                    None => "default".to_string(),
                };
                Ok(format!("{} => {}", conditions, self.child(self.required(node, 1)?, depth)?))
            }
            Clone => {
                Ok(format!("clone {}", self.operand(node, 0, depth)?))
            }
            Include => {
                Ok(format!("{} {}", node.text(), self.operand(node, 0, depth)?))
            }
            Yield => {
                let mut out = String::from("yield");
                if node.has_flag("from") {
                    out.push_str(" from");
                }
                if node.slot(0).is_some() {
                    out.push(' ');
                    out.push_str(&self.operand(node, 0, depth)?);
                    out.push_str(" =>");
                }
                if node.slot(1).is_some() {
                    out.push(' ');
                    out.push_str(&self.operand(node, 1, depth)?);
                }
                Ok(out)
            }
            Placeholder => Ok(format!("/* {} */", node.text().replace("*/", "* /"))),
            other => Err(PreprocessError::Render(format!("{} cannot be rendered here", other))),
        }
    }

    /// Renders child `index` of an expression, parenthesized when needed.
    fn operand(&self, node: &AstNode, index: usize, depth: usize) -> Result<String> {
        let child = self.required(node, index)?;
        let text = self.child(child, depth)?;
        Ok(match needs_parens(node, index, child) {
            true => format!("({})", text),
            false => text,
        })
    }
}

/// Whether `child` needs parentheses as child `index` of `parent`.
pub fn needs_parens(parent: &AstNode, index: usize, child: &AstNode) -> bool {
    use AstNodeType::*;
    let (left, right) = binding(child);
    let primary = (left, right) == (PRIMARY_BP, PRIMARY_BP) && !matches!(child.node_type, Closure | Placeholder | Match);
    match (parent.node_type, index) {
        (Binary, 0) => binary_binding_power(&parent.text().to_ascii_lowercase()).is_some_and(|(l, _)| right <= l),
        (Binary, 1) => binary_binding_power(&parent.text().to_ascii_lowercase()).is_some_and(|(_, r)| left < r),
        (Assign, 0) => right <= ASSIGN_BP.0,
        (Assign, 1) => left < ASSIGN_BP.1,
        // nested ternaries are always parenthesized
        (Ternary, 0) => right <= TERNARY_BP.1,
        (Ternary, 2) => left < TERNARY_BP.1,
        (Unary, 0) if parent.has_flag("postfix") => !primary,
        (Unary, 0) | (Cast, 0) | (Clone, 0) => left < binding(parent).1,
        (Include, 0) | (Yield, _) => left < LOW_PREFIX_BP,
        (MethodCall | PropertyFetch | StaticCall | StaticPropertyFetch | ClassConstFetch | ArrayDimFetch, 0) => {
            !primary
        }
        (FuncCall, 0) => child.node_type != Name && !primary,
        _ => false,
    }
}

/// `(left, right)` binding power of an expression node as an operand
pub fn binding(node: &AstNode) -> (u8, u8) {
    match node.node_type {
        AstNodeType::Binary => binary_binding_power(&node.text().to_ascii_lowercase()).unwrap_or((PRIMARY_BP, PRIMARY_BP)),
        AstNodeType::Assign => ASSIGN_BP,
        AstNodeType::Ternary => TERNARY_BP,
        AstNodeType::Unary if node.has_flag("postfix") => (PRIMARY_BP, PRIMARY_BP),
        AstNodeType::Unary if node.text() == "!" => (PRIMARY_BP, NOT_BP),
        AstNodeType::Unary | AstNodeType::Cast => (PRIMARY_BP, UNARY_BP),
        AstNodeType::Clone | AstNodeType::New => (PRIMARY_BP, CLONE_BP),
        AstNodeType::Yield | AstNodeType::Include => (PRIMARY_BP, LOW_PREFIX_BP),
        AstNodeType::ArrowFunction => (PRIMARY_BP, 0),
        _ => (PRIMARY_BP, PRIMARY_BP),
    }
}

fn indent(depth: usize) -> String {
    INDENT.repeat(depth)
}

/// Canonical text of an expression on a single line.
pub fn render_inline(node: &AstNode) -> Result<String> {
    let text = Renderer::canonical().render(node)?;
    Ok(text.replace("\r\n", "").replace('\n', ""))
}
