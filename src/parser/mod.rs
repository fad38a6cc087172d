/*!
# PHP Parser

Lossless parser for the supported PHP subset.

## Usage

```rust,ignore
use php_preprocessor::parser::{PhpParser, SourceParser};

let parsed = PhpParser::new().parse("<?php $logger->debug('x');")?;
assert_eq!(parsed.tokens.full_text(), "<?php $logger->debug('x');");
```
*/

pub mod ast;
pub mod grammar;
pub mod lexer;

pub use ast::{AstNode, AstNodeType, AstVisitor, NodeId};
pub use lexer::{PhpLexer, Token, TokenStream, TokenType};

use std::path::Path;
use std::rc::Rc;

use crate::core::errors::Result;
use crate::core::fs_utils::read_source_file;

/// A parsed unit: the tree plus the token stream it was built from.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub tree: Rc<AstNode>,
    pub tokens: Rc<TokenStream>,
    /// Number of node ids handed out by the parser
    pub node_count: u32,
}

/// Front end seam: anything that can turn text into a tree and its tokens.
pub trait SourceParser {
    fn parse(&self, text: &str) -> Result<ParsedSource>;
}

/// Main PHP parser
#[derive(Debug, Default)]
pub struct PhpParser {
    lexer: PhpLexer,
}

impl PhpParser {
    pub fn new() -> Self {
        Self { lexer: PhpLexer::new() }
    }

    /// Parses a file, attaching the path to any syntax error
    pub fn parse_file(&self, path: &Path) -> Result<ParsedSource> {
        let content = read_source_file(path)?;
        self.parse(&content).map_err(|e| e.in_file(path))
    }
}

impl SourceParser for PhpParser {
    fn parse(&self, text: &str) -> Result<ParsedSource> {
        let tokens = self.lexer.tokenize(text)?;
        let (tree, node_count) = grammar::parse_module(&tokens)?;
        Ok(ParsedSource {
            tree: Rc::new(tree),
            tokens: Rc::new(TokenStream::new(tokens)),
            node_count,
        })
    }
}
