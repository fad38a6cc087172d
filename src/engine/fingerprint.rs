/*!
# Fingerprints

Identity key correlating a node of the reference tree with the same node in
the working tree. Two nodes are the same node when kind, position (line and
token range) and, for expressions, canonical text agree. Node ids and pointer identity take no part,
so keys survive any clone.
*/

use std::fmt;

use tracing::warn;

use crate::parser::ast::{AstNode, AstNodeType};
use crate::printer::Renderer;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Detail {
    /// Canonical rendering of an expression and its token range
    Text {
        text: String,
        token_start: usize,
        token_end: usize,
    },
    /// Positional identity for statements, declarations and unrenderable expressions
    Position {
        start_line: usize,
        end_line: usize,
        token_start: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    pub kind: AstNodeType,
    pub line: usize,
    pub detail: Detail,
}

impl Fingerprint {
    /// Key of `node`, or `None` for kinds that cannot carry a context of their own.
    pub fn of(node: &AstNode) -> Option<Self> {
        if matches!(node.node_type, AstNodeType::StringFragment | AstNodeType::Empty) {
            return None;
        }
        let detail = match node.node_type.is_expression() {
            true => match Renderer::canonical().render(node) {
                Ok(text) => Detail::Text {
                    text,
                    token_start: node.span.tokens.start,
                    token_end: node.span.tokens.end,
                },
                Err(e) => {
                    warn!("Falling back to positional fingerprint for {} at line {}: {}", node.node_type, node.line(), e);
                    positional(node)
                }
            },
            false => positional(node),
        };
        Some(Self {
            kind: node.node_type,
            line: node.line(),
            detail,
        })
    }

    pub fn is_positional(&self) -> bool {
        matches!(self.detail, Detail::Position { .. })
    }
}

fn positional(node: &AstNode) -> Detail {
    Detail::Position {
        start_line: node.span.start_line(),
        end_line: node.span.end_line(),
        token_start: node.span.tokens.start,
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Detail::Text { text, token_start, token_end } => {
                write!(f, "{}:{}..{}:{}", self.line, token_start, token_end, text)
            }
            Detail::Position { start_line, end_line, token_start } => {
                write!(f, "{}:{}:{}:{}:{}", self.line, self.kind, start_line, end_line, token_start)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PhpParser, SourceParser};
    use std::rc::Rc;

    fn collect(node: &Rc<AstNode>, out: &mut Vec<Option<Fingerprint>>) {
        out.push(Fingerprint::of(node));
        for child in &node.children {
            collect(child, out);
        }
    }

    #[test]
    fn test_stable_across_clones_and_reparses() {
        let code = "<?php\nclass A {\n    function f() { $this->a()->b(\"x $y\"); return [1, 2]; }\n}\n";
        let first = PhpParser::new().parse(code).unwrap();
        let second = PhpParser::new().parse(code).unwrap();

        let (mut original, mut cloned, mut reparsed) = (Vec::new(), Vec::new(), Vec::new());
        collect(&first.tree, &mut original);
        collect(&first.tree.deep_clone(), &mut cloned);
        collect(&second.tree, &mut reparsed);
        assert_eq!(original, cloned);
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_same_line_chain_is_disambiguated() {
        let parsed = PhpParser::new().parse("<?php $a->b()->c();").unwrap();
        let calls = parsed.tree.find_all(AstNodeType::MethodCall);
        let keys: Vec<Fingerprint> = calls.iter().filter_map(|c| Fingerprint::of(c)).collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
        assert!(keys[0].to_string().starts_with("1:"));
        assert!(keys[0].to_string().ends_with(":$a->b()->c()"));
    }

    #[test]
    fn test_same_text_on_one_line_is_disambiguated() {
        let parsed = PhpParser::new()
            .parse("<?php function a(L $x) { $x->debug(1); } function b(O $x) { $x->debug(1); }")
            .unwrap();
        let calls = parsed.tree.find_all(AstNodeType::MethodCall);
        assert_eq!(calls.len(), 2);
        let (first, second) = (Fingerprint::of(calls[0]).unwrap(), Fingerprint::of(calls[1]).unwrap());
        assert_eq!(first.line, second.line);
        assert_ne!(first, second);
    }

    #[test]
    fn test_fragments_have_no_key() {
        let parsed = PhpParser::new().parse("<?php echo \"a $b\";").unwrap();
        let fragment = parsed.tree.find_all(AstNodeType::StringFragment)[0];
        assert!(Fingerprint::of(fragment).is_none());
    }

    #[test]
    fn test_render_failure_degrades_to_position() {
        let broken = AstNode::synthetic(AstNodeType::Binary, Some("+".into()), Vec::new());
        let key = Fingerprint::of(&broken).unwrap();
        assert!(key.is_positional());
    }
}
