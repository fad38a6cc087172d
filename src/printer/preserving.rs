//! Format-preserving regeneration.
//!
//! Subtrees shared with the reference tree are copied from the original token
//! stream. Nodes that kept their identity but got new children are re-emitted
//! piecewise: original gaps between children stay, changed children are
//! printed recursively. Anything else is rendered canonically, with its own
//! children going back through this printer.

use std::collections::HashMap;
use std::rc::Rc;

use crate::core::errors::Result;
use crate::core::position::TokenRange;
use crate::parser::ast::{AstNode, AstNodeType, NodeId};
use crate::parser::lexer::TokenStream;
use crate::printer::render::{needs_parens, Renderer};

/// Regenerates `working` against its `reference` tree and original tokens.
pub fn regenerate(working: &Rc<AstNode>, reference: &Rc<AstNode>, tokens: &TokenStream) -> Result<String> {
    FormatPreservingPrinter::new(reference, tokens).print(working)
}

pub struct FormatPreservingPrinter<'a> {
    reference: HashMap<NodeId, &'a Rc<AstNode>>,
    tokens: &'a TokenStream,
}

impl<'a> FormatPreservingPrinter<'a> {
    pub fn new(reference: &'a Rc<AstNode>, tokens: &'a TokenStream) -> Self {
        let mut index = HashMap::new();
        collect_ids(reference, &mut index);
        Self { reference: index, tokens }
    }

    pub fn print(&self, working: &Rc<AstNode>) -> Result<String> {
        self.node(working, 0)
    }

    fn original(&self, node: &AstNode) -> Option<&'a Rc<AstNode>> {
        node.id.and_then(|id| self.reference.get(&id).copied())
    }

    fn node(&self, node: &AstNode, depth: usize) -> Result<String> {
        let Some(original) = self.original(node) else {
            return self.canonical(node, depth);
        };
        if std::ptr::eq(node, original.as_ref()) {
            return Ok(self.tokens.text(original.span.tokens));
        }
        if node.node_type == AstNodeType::InterpolatedString && node == original.as_ref() {
            return Ok(self.tokens.text(original.span.tokens));
        }
        if !node.same_shape(original) || node.node_type == AstNodeType::InterpolatedString {
            return self.canonical(node, depth);
        }
        if node.children.len() != original.children.len() {
            return match node.node_type.is_list() && !original.children.is_empty() {
                true => self.reflow(node, original, depth),
                false => self.canonical(node, depth),
            };
        }
        self.patch(node, original, depth)
    }

    fn canonical(&self, node: &AstNode, depth: usize) -> Result<String> {
        if node.node_type == AstNodeType::InterpolatedString {
            // parts share the string token, so they can never be copied verbatim
            return Renderer::canonical().render_at(node, depth);
        }
        let hook = |child: &AstNode, child_depth: usize| Some(self.node(child, child_depth));
        Renderer::with_hook(&hook).render_at(node, depth)
    }

    /// Same node, same arity: keep original gaps, re-print children.
    fn patch(&self, node: &AstNode, original: &AstNode, depth: usize) -> Result<String> {
        let range = original.span.tokens;
        let child_depth = child_depth(node.node_type, depth);
        let mut out = String::new();
        let mut cursor = range.start;

        for (index, (child, before)) in node.children.iter().zip(&original.children).enumerate() {
            let start = before.span.tokens.start.max(cursor);
            let end = before.span.tokens.end.max(start);
            let gap = TokenRange::new(cursor, start);

            match (child.is_empty_slot(), before.is_empty_slot()) {
                (true, true) => out.push_str(&self.tokens.text(gap)),
                (true, false) => {
                    if self.has_significant(gap) {
                        return self.canonical(node, depth);
                    }
                    out.push_str(&self.tokens.text(gap));
                    cursor = self.skip_whitespace(end);
                    continue;
                }
                (false, true) => return self.canonical(node, depth),
                (false, false) => {
                    out.push_str(&self.tokens.text(gap));
                    let text = self.node(child, child_depth)?;
                    let moved = child.id.is_none() || child.id != before.id;
                    if moved && needs_parens(node, index, child) {
                        out.push('(');
                        out.push_str(&text);
                        out.push(')');
                    } else {
                        out.push_str(&text);
                    }
                }
            }
            cursor = end;
        }

        out.push_str(&self.tokens.text(TokenRange::new(cursor, range.end.max(cursor))));
        Ok(out)
    }

    /// List whose length changed: original separators are reused where possible.
    fn reflow(&self, node: &AstNode, original: &AstNode, depth: usize) -> Result<String> {
        let range = original.span.tokens;
        let before = &original.children;
        let child_depth = child_depth(node.node_type, depth);

        let first = before[0].span.tokens.start.max(range.start);
        let prefix = self.tokens.text(TokenRange::new(range.start, first));
        let separator = self.default_separator(node.node_type, before, &prefix);

        let mut out = prefix;
        for (position, child) in node.children.iter().enumerate() {
            let matched = child
                .id
                .and_then(|id| before.iter().position(|b| b.id == Some(id)));
            if position > 0 {
                match matched {
                    Some(index) if index > 0 => {
                        let gap = TokenRange::new(before[index - 1].span.tokens.end, before[index].span.tokens.start);
                        out.push_str(&self.tokens.text(gap));
                    }
                    _ => out.push_str(&separator),
                }
            }
            out.push_str(&self.node(child, child_depth)?);
        }

        let last = before.last().map_or(first, |b| b.span.tokens.end.max(first));
        out.push_str(&self.tokens.text(TokenRange::new(last, range.end.max(last))));
        Ok(out)
    }

    fn default_separator(&self, kind: AstNodeType, before: &[Rc<AstNode>], prefix: &str) -> String {
        if before.len() >= 2 {
            return self
                .tokens
                .text(TokenRange::new(before[0].span.tokens.end, before[1].span.tokens.start));
        }
        match kind {
            AstNodeType::Module
            | AstNodeType::Block
            | AstNodeType::ClassBody
            | AstNodeType::CaseList
            | AstNodeType::CaseBody => {
                let indentation = prefix.rsplit('\n').next().unwrap_or("");
                match indentation.trim().is_empty() {
                    true => format!("\n{}", indentation),
                    false => "\n".to_string(),
                }
            }
            AstNodeType::ElseIfList | AstNodeType::CatchList => " ".to_string(),
            _ => ", ".to_string(),
        }
    }

    fn has_significant(&self, range: TokenRange) -> bool {
        (range.start..range.end)
            .filter_map(|i| self.tokens.get(i))
            .any(|t| !t.token_type.is_trivia())
    }

    fn skip_whitespace(&self, mut index: usize) -> usize {
        while self
            .tokens
            .get(index)
            .is_some_and(|t| t.token_type == crate::parser::lexer::TokenType::Whitespace)
        {
            index += 1;
        }
        index
    }
}

fn child_depth(kind: AstNodeType, depth: usize) -> usize {
    match kind {
        AstNodeType::Module => 0,
        AstNodeType::Block | AstNodeType::ClassBody | AstNodeType::CaseList | AstNodeType::CaseBody => depth + 1,
        _ => depth,
    }
}

fn collect_ids<'a>(node: &'a Rc<AstNode>, index: &mut HashMap<NodeId, &'a Rc<AstNode>>) {
    if let Some(id) = node.id {
        index.insert(id, node);
    }
    for child in &node.children {
        collect_ids(child, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PhpParser, SourceParser};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "<?php\n\nclass A\n{\n    // keep me\n    public function run(int $x)\n    {\n        $this->log(\"x\");   # trailing\n        return  $x + 1 ;\n    }\n}\n";

    fn parse(code: &str) -> crate::parser::ParsedSource {
        PhpParser::new().parse(code).unwrap()
    }

    /// Replaces the first node matching `predicate` by `make(node)`.
    fn replace_first(
        node: &Rc<AstNode>,
        predicate: &dyn Fn(&AstNode) -> bool,
        make: &dyn Fn(&AstNode) -> AstNode,
    ) -> Option<Rc<AstNode>> {
        if predicate(node) {
            return Some(Rc::new(make(node)));
        }
        for (i, child) in node.children.iter().enumerate() {
            if let Some(replacement) = replace_first(child, predicate, make) {
                return Some(Rc::new(node.with_child(i, replacement)));
            }
        }
        None
    }

    #[test]
    fn test_untouched_tree_is_verbatim() {
        let parsed = parse(SOURCE);
        assert_eq!(regenerate(&parsed.tree, &parsed.tree, &parsed.tokens).unwrap(), SOURCE);

        let clone = parsed.tree.deep_clone();
        assert_eq!(regenerate(&clone, &parsed.tree, &parsed.tokens).unwrap(), SOURCE);
    }

    #[test]
    fn test_replaced_expression_keeps_surroundings() {
        let parsed = parse(SOURCE);
        let working = replace_first(
            &parsed.tree,
            &|n| n.node_type == AstNodeType::MethodCall,
            &|_| AstNode::placeholder("$this->log(\"x\")"),
        )
        .unwrap();
        let text = regenerate(&working, &parsed.tree, &parsed.tokens).unwrap();
        assert_eq!(text, SOURCE.replace("$this->log(\"x\");", "/* $this->log(\"x\") */;"));
    }

    #[test]
    fn test_removed_type_hint() {
        let parsed = parse(SOURCE);
        let working = replace_first(
            &parsed.tree,
            &|n| n.node_type == AstNodeType::TypeHint,
            &|n| AstNode::empty(n.span),
        )
        .unwrap();
        let text = regenerate(&working, &parsed.tree, &parsed.tokens).unwrap();
        assert_eq!(text, SOURCE.replace("run(int $x)", "run($x)"));
    }

    #[test]
    fn test_removed_statement_reflows_block() {
        let parsed = parse(SOURCE);
        let working = replace_first(
            &parsed.tree,
            &|n| n.node_type == AstNodeType::Block,
            &|n| n.with_children(n.children[1..].to_vec()),
        )
        .unwrap();
        let text = regenerate(&working, &parsed.tree, &parsed.tokens).unwrap();
        assert_eq!(text, SOURCE.replace("$this->log(\"x\");   # trailing\n        ", ""));
    }

    #[test]
    fn test_new_parent_reuses_original_children() {
        let parsed = parse("<?php\n$a = foo( 1,2 );\n");
        let working = replace_first(
            &parsed.tree,
            &|n| n.node_type == AstNodeType::Assign,
            &|n| {
                let mut node = AstNode::synthetic(AstNodeType::Assign, Some("+=".into()), n.children.clone());
                node.span = n.span;
                node
            },
        )
        .unwrap();
        let text = regenerate(&working, &parsed.tree, &parsed.tokens).unwrap();
        assert_eq!(text, "<?php\n$a += foo( 1,2 );\n");
    }

    #[test]
    fn test_spliced_expression_is_parenthesized() {
        let parsed = parse("<?php\n$y = $x * $o->sum(1, 2);\n");
        let working = replace_first(
            &parsed.tree,
            &|n| n.node_type == AstNodeType::MethodCall,
            &|n| {
                let args = &n.children[2].children;
                AstNode::synthetic(AstNodeType::Binary, Some("+".into()), vec![args[0].clone(), args[1].clone()])
            },
        )
        .unwrap();
        let text = regenerate(&working, &parsed.tree, &parsed.tokens).unwrap();
        assert_eq!(text, "<?php\n$y = $x * (1 + 2);\n");
    }

    #[test]
    fn test_strings_and_parentheses_survive_unrelated_edit() {
        let code = "<?php\nfunction f(int $n) {\n    $a = 'plain' . \"tab\\t\" . \"Hi {$user->name},  $n[0] items\";\n    $b = <<<EOT\n  Dear $name\n  EOT;\n    return ($n + 1) * 2;\n}\n";
        let parsed = parse(code);
        let working = replace_first(
            &parsed.tree.deep_clone(),
            &|n| n.node_type == AstNodeType::TypeHint,
            &|n| AstNode::empty(n.span),
        )
        .unwrap();
        let text = regenerate(&working, &parsed.tree, &parsed.tokens).unwrap();
        assert_eq!(text, code.replace("f(int $n)", "f($n)"));
    }
}
