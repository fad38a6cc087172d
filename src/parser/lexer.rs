/*!
# PHP Lexical Analyzer

Lossless lexer for the supported PHP subset. Whitespace, comments, the open
tag and inline HTML are real tokens: concatenating the `value` of every token
reproduces the input byte for byte, which is what the format-preserving printer
relies on.
*/

use logos::Logos;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::{PreprocessError, Result};
use crate::core::position::{LineIndex, Position, TokenRange};

/// PHP token types
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    // Tags
    #[token("<?php", ignore(ascii_case))]
    OpenTag,
    #[token("?>")]
    CloseTag,
    InlineHtml,

    // Keywords - declarations
    #[token("namespace", ignore(ascii_case))]
    Namespace,
    #[token("use", ignore(ascii_case))]
    Use,
    #[token("declare", ignore(ascii_case))]
    Declare,
    #[token("class", ignore(ascii_case))]
    Class,
    #[token("interface", ignore(ascii_case))]
    Interface,
    #[token("trait", ignore(ascii_case))]
    Trait,
    #[token("extends", ignore(ascii_case))]
    Extends,
    #[token("implements", ignore(ascii_case))]
    Implements,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("fn", ignore(ascii_case))]
    Fn,
    #[token("const", ignore(ascii_case))]
    Const,
    #[token("var", ignore(ascii_case))]
    Var,
    #[token("as", ignore(ascii_case))]
    As,

    // Keywords - modifiers
    #[token("public", ignore(ascii_case))]
    Public,
    #[token("protected", ignore(ascii_case))]
    Protected,
    #[token("private", ignore(ascii_case))]
    Private,
    #[token("static", ignore(ascii_case))]
    Static,
    #[token("final", ignore(ascii_case))]
    Final,
    #[token("abstract", ignore(ascii_case))]
    Abstract,
    #[token("readonly", ignore(ascii_case))]
    Readonly,

    // Keywords - control flow
    #[token("if", ignore(ascii_case))]
    If,
    #[token("elseif", ignore(ascii_case))]
    ElseIf,
    #[token("else", ignore(ascii_case))]
    Else,
    #[token("while", ignore(ascii_case))]
    While,
    #[token("do", ignore(ascii_case))]
    Do,
    #[token("switch", ignore(ascii_case))]
    Switch,
    #[token("case", ignore(ascii_case))]
    Case,
    #[token("default", ignore(ascii_case))]
    Default,
    #[token("match", ignore(ascii_case))]
    Match,
    #[token("for", ignore(ascii_case))]
    For,
    #[token("foreach", ignore(ascii_case))]
    Foreach,
    #[token("return", ignore(ascii_case))]
    Return,
    #[token("break", ignore(ascii_case))]
    Break,
    #[token("continue", ignore(ascii_case))]
    Continue,
    #[token("echo", ignore(ascii_case))]
    Echo,
    #[token("throw", ignore(ascii_case))]
    Throw,
    #[token("try", ignore(ascii_case))]
    Try,
    #[token("catch", ignore(ascii_case))]
    Catch,
    #[token("finally", ignore(ascii_case))]
    Finally,

    // Keywords - expressions
    #[token("new", ignore(ascii_case))]
    New,
    #[token("clone", ignore(ascii_case))]
    Clone,
    #[token("instanceof", ignore(ascii_case))]
    Instanceof,
    #[token("isset", ignore(ascii_case))]
    Isset,
    #[token("empty", ignore(ascii_case))]
    Empty,
    #[token("array", ignore(ascii_case))]
    Array,
    #[token("list", ignore(ascii_case))]
    List,
    #[token("yield", ignore(ascii_case))]
    Yield,
    #[token("include", ignore(ascii_case))]
    Include,
    #[token("include_once", ignore(ascii_case))]
    IncludeOnce,
    #[token("require", ignore(ascii_case))]
    Require,
    #[token("require_once", ignore(ascii_case))]
    RequireOnce,
    #[token("and", ignore(ascii_case))]
    LogicalAnd,
    #[token("or", ignore(ascii_case))]
    LogicalOr,
    #[token("xor", ignore(ascii_case))]
    LogicalXor,

    // Arithmetic operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Multiply,
    #[token("/")]
    Divide,
    #[token("%")]
    Modulo,
    #[token("**")]
    Power,
    #[token(".")]
    Concat,
    #[token("++")]
    Increment,
    #[token("--")]
    Decrement,

    // Comparison operators
    #[token("==")]
    Equal,
    #[token("===")]
    Identical,
    #[token("!=")]
    NotEqual,
    #[token("<>")]
    NotEqualAlt,
    #[token("!==")]
    NotIdentical,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("<=>")]
    Spaceship,

    // Logical / bitwise operators
    #[token("&&")]
    BooleanAnd,
    #[token("||")]
    BooleanOr,
    #[token("!")]
    Not,
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token("??")]
    Coalesce,
    #[token("@")]
    Silence,

    // Assignment
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    MultiplyAssign,
    #[token("/=")]
    DivideAssign,
    #[token(".=")]
    ConcatAssign,
    #[token("%=")]
    ModuloAssign,
    #[token("**=")]
    PowerAssign,
    #[token("??=")]
    CoalesceAssign,

    // Member access
    #[token("->")]
    Arrow,
    #[token("?->")]
    NullsafeArrow,
    #[token("::")]
    DoubleColon,
    #[token("=>")]
    DoubleArrow,

    // Delimiters
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("...")]
    Ellipsis,

    // Literals
    #[regex(r"'([^'\\]|\\(.|\n))*'")]
    StringLiteral,
    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    InterpolatedString,
    /// Heredoc or nowdoc, opening label through closing label.
    #[token("<<<", heredoc)]
    Heredoc,
    #[regex(r"[0-9][0-9_]*|0[xX][0-9a-fA-F_]+|0[bB][01_]+")]
    IntLiteral,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?|[0-9][0-9_]*[eE][+-]?[0-9]+")]
    FloatLiteral,

    // Names
    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*")]
    Variable,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,
    #[regex(r"\\[A-Za-z_][A-Za-z0-9_]*(\\[A-Za-z_][A-Za-z0-9_]*)*")]
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\\[A-Za-z_][A-Za-z0-9_]*)+")]
    QualifiedName,

    // Trivia
    #[regex(r"//[^\r\n]*")]
    #[regex(r"#([^\[\r\n][^\r\n]*)?")]
    LineComment,
    #[token("/*", block_comment)]
    BlockComment,
    DocComment,
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,
}

impl TokenType {
    /// Tokens the parser never sees.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenType::Whitespace
                | TokenType::LineComment
                | TokenType::BlockComment
                | TokenType::DocComment
                | TokenType::OpenTag
                | TokenType::CloseTag
                | TokenType::InlineHtml
        )
    }

    pub fn is_keyword(self) -> bool {
        use TokenType::*;
        matches!(
            self,
            Namespace | Use | Declare | Class | Interface | Trait | Extends | Implements | Function | Fn
                | Const | Var | As | Public | Protected | Private | Static | Final | Abstract | Readonly
                | If | ElseIf | Else | While | Do | Switch | Case | Default | Match | For | Foreach | Return
                | Break | Continue | Echo | Throw
                | Try | Catch | Finally | New | Clone | Instanceof | Isset | Empty | Array | List | Yield
                | Include | IncludeOnce | Require | RequireOnce | LogicalAnd | LogicalOr | LogicalXor
        )
    }

    /// Identifiers and keywords: valid as member names after `->` and `::`.
    pub fn is_identifier_like(self) -> bool {
        self == TokenType::Identifier || self.is_keyword()
    }

    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            TokenType::Public
                | TokenType::Protected
                | TokenType::Private
                | TokenType::Static
                | TokenType::Final
                | TokenType::Abstract
                | TokenType::Readonly
                | TokenType::Var
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::OpenTag => write!(f, "<?php"),
            TokenType::CloseTag => write!(f, "?>"),
            TokenType::InlineHtml => write!(f, "INLINE_HTML"),
            TokenType::StringLiteral | TokenType::InterpolatedString | TokenType::Heredoc => write!(f, "STRING"),
            TokenType::IntLiteral => write!(f, "INT"),
            TokenType::FloatLiteral => write!(f, "FLOAT"),
            TokenType::Variable => write!(f, "VARIABLE"),
            TokenType::Identifier => write!(f, "IDENTIFIER"),
            TokenType::QualifiedName => write!(f, "NAME"),
            TokenType::LineComment | TokenType::BlockComment => write!(f, "COMMENT"),
            TokenType::DocComment => write!(f, "DOC_COMMENT"),
            TokenType::Whitespace => write!(f, "WHITESPACE"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Token with position information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub position: Position,
    pub length: usize,
}

impl Token {
    pub fn new(token_type: TokenType, value: String, position: Position) -> Self {
        let length = value.len();
        Self {
            token_type,
            value,
            position,
            length,
        }
    }

    /// Byte offset just past the token.
    pub fn end_offset(&self) -> usize {
        self.position.offset + self.length
    }

    /// Position just past the token.
    pub fn end_position(&self) -> Position {
        match self.value.rfind('\n') {
            Some(nl) => Position::new(
                self.position.line + self.value.matches('\n').count(),
                self.length - nl,
                self.end_offset(),
            ),
            None => Position::new(self.position.line, self.position.column + self.length, self.end_offset()),
        }
    }
}

/// The original token stream of one unit. Captured once, never mutated.
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Original text of the tokens in `range`.
    pub fn text(&self, range: TokenRange) -> String {
        let end = range.end.min(self.tokens.len());
        let start = range.start.min(end);
        self.tokens[start..end].iter().map(|t| t.value.as_str()).collect()
    }

    /// Original text of the whole stream.
    pub fn full_text(&self) -> String {
        self.text(TokenRange::new(0, self.tokens.len()))
    }
}

/// PHP lexer
#[derive(Debug, Default)]
pub struct PhpLexer;

impl PhpLexer {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize source code. Text outside `<?php ... ?>` becomes `InlineHtml`.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>> {
        let lines = LineIndex::new(input);
        let mut tokens = Vec::new();
        let mut cursor = 0usize;

        while cursor < input.len() {
            // inline HTML until the next open tag
            let html_end = find_open_tag(&input[cursor..]).map_or(input.len(), |at| cursor + at);
            if html_end > cursor {
                tokens.push(Token::new(
                    TokenType::InlineHtml,
                    input[cursor..html_end].to_string(),
                    lines.to_position(cursor),
                ));
                cursor = html_end;
                continue;
            }
            cursor = self.lex_code(input, cursor, &lines, &mut tokens)?;
        }

        Ok(tokens)
    }

    /// Tokenize a fragment that is PHP code from its first byte (no open tag).
    pub fn tokenize_code(&self, code: &str) -> Result<Vec<Token>> {
        let lines = LineIndex::new(code);
        let mut tokens = Vec::new();
        self.lex_code(code, 0, &lines, &mut tokens)?;
        Ok(tokens)
    }

    /// Lexes PHP code starting at `start` up to a close tag or the end of input.
    /// Returns the offset where lexing stopped.
    fn lex_code(&self, input: &str, start: usize, lines: &LineIndex, tokens: &mut Vec<Token>) -> Result<usize> {
        let mut lexer = TokenType::lexer(&input[start..]);
        while let Some(result) = lexer.next() {
            let span = lexer.span();
            let position = lines.to_position(start + span.start);
            match result {
                Ok(token_type) => {
                    let token_type = match token_type {
                        TokenType::BlockComment if is_doc_comment(lexer.slice()) => TokenType::DocComment,
                        other => other,
                    };
                    tokens.push(Token::new(token_type, lexer.slice().to_string(), position));
                    if token_type == TokenType::CloseTag {
                        return Ok(start + span.end);
                    }
                }
                Err(()) => {
                    return Err(PreprocessError::Lex {
                        line: position.line,
                        column: position.column,
                        text: lexer.slice().to_string(),
                    });
                }
            }
        }
        Ok(input.len())
    }

    /// Tokenize and drop trivia (tests, diagnostics).
    pub fn significant_tokens(&self, input: &str) -> Result<Vec<Token>> {
        Ok(self
            .tokenize(input)?
            .into_iter()
            .filter(|t| !t.token_type.is_trivia())
            .collect())
    }
}

fn find_open_tag(text: &str) -> Option<usize> {
    text.as_bytes()
        .windows(5)
        .position(|w| w.eq_ignore_ascii_case(b"<?php"))
}

/// Consumes a block comment body through the closing `*/`.
fn block_comment(lex: &mut logos::Lexer<TokenType>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

/// Consumes a heredoc or nowdoc after `<<<`: the label line, the body and the
/// closing label (which may be indented).
fn heredoc(lex: &mut logos::Lexer<TokenType>) -> bool {
    let rest = lex.remainder();
    let bytes = rest.as_bytes();
    let mut at = skip_blanks(bytes, 0);
    let quote = match bytes.get(at) {
        Some(&q) if q == b'\'' || q == b'"' => {
            at += 1;
            Some(q)
        }
        _ => None,
    };
    let label_start = at;
    if !matches!(bytes.get(at), Some(&b) if is_label_start(b)) {
        return false;
    }
    while matches!(bytes.get(at), Some(&b) if is_label_byte(b)) {
        at += 1;
    }
    let label = &rest[label_start..at];
    if let Some(q) = quote {
        if bytes.get(at) != Some(&q) {
            return false;
        }
        at += 1;
    }
    if bytes.get(at) == Some(&b'\r') {
        at += 1;
    }
    if bytes.get(at) != Some(&b'\n') {
        return false;
    }

    let mut line_start = at + 1;
    loop {
        let indent_end = skip_blanks(bytes, line_start);
        let label_end = indent_end + label.len();
        if rest[indent_end..].starts_with(label) && !matches!(bytes.get(label_end), Some(&b) if is_label_byte(b)) {
            lex.bump(label_end);
            return true;
        }
        match rest[line_start..].find('\n') {
            Some(nl) => line_start += nl + 1,
            None => return false,
        }
    }
}

fn skip_blanks(bytes: &[u8], mut at: usize) -> usize {
    while matches!(bytes.get(at), Some(b' ' | b'\t')) {
        at += 1;
    }
    at
}

fn is_label_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_label_byte(b: u8) -> bool {
    is_label_start(b) || b.is_ascii_digit()
}

/// Nowdoc bodies are never interpolated.
pub fn is_nowdoc(text: &str) -> bool {
    text.trim_start_matches('<').trim_start().starts_with('\'')
}

fn is_doc_comment(text: &str) -> bool {
    text.starts_with("/**") && text.len() > 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenization() {
        let lexer = PhpLexer::new();
        let tokens = lexer.significant_tokens("<?php $logger->debug(\"x\");").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::Variable,
                TokenType::Arrow,
                TokenType::Identifier,
                TokenType::LeftParen,
                TokenType::InterpolatedString,
                TokenType::RightParen,
                TokenType::Semicolon,
            ]
        );
    }

    #[test]
    fn test_lossless() {
        let lexer = PhpLexer::new();
        let source = "<html>\n<?php\n// note\n/** @var int */\nfunction f(int $a) : int { return $a ** 2; }\n?>\ntrailer\n";
        let tokens = lexer.tokenize(source).unwrap();
        let rebuilt: String = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(rebuilt, source);
        assert_eq!(tokens[0].token_type, TokenType::InlineHtml);
        assert!(tokens.iter().any(|t| t.token_type == TokenType::DocComment));
        assert_eq!(tokens.last().unwrap().token_type, TokenType::InlineHtml);
    }

    #[test]
    fn test_keywords_and_names() {
        let lexer = PhpLexer::new();
        let tokens = lexer.significant_tokens("<?php FINAL Class A extends \\Foo\\Bar {}").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Final);
        assert_eq!(tokens[1].token_type, TokenType::Class);
        assert_eq!(tokens[4].token_type, TokenType::QualifiedName);
        assert_eq!(tokens[4].value, "\\Foo\\Bar");
        let tokens = lexer.significant_tokens("<?php functional();").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Identifier);
    }

    #[test]
    fn test_positions() {
        let lexer = PhpLexer::new();
        let tokens = lexer.significant_tokens("<?php\n\n  $a = 1;").unwrap();
        assert_eq!(tokens[0].position.line, 3);
        assert_eq!(tokens[0].position.column, 3);
    }

    #[test]
    fn test_type_in_parens_is_not_a_token() {
        let lexer = PhpLexer::new();
        let tokens = lexer.significant_tokens("<?php f(int $x); $y = (int) $z;").unwrap();
        let kinds: Vec<_> = tokens.iter().take(5).map(|t| t.token_type).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::Identifier,
                TokenType::LeftParen,
                TokenType::Identifier,
                TokenType::Variable,
                TokenType::RightParen,
            ]
        );
        assert_eq!(tokens[8].token_type, TokenType::LeftParen);
        assert_eq!(tokens[9].value, "int");
    }

    #[test]
    fn test_comment_followed_by_code() {
        let lexer = PhpLexer::new();
        let tokens = lexer.tokenize("<?php /* x */ $a = 1; /** @var int */ $b = 2 /* a ** b */;").unwrap();
        let comments: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t.token_type, TokenType::BlockComment | TokenType::DocComment))
            .map(|t| (t.token_type, t.value.as_str()))
            .collect();
        assert_eq!(
            comments,
            vec![
                (TokenType::BlockComment, "/* x */"),
                (TokenType::DocComment, "/** @var int */"),
                (TokenType::BlockComment, "/* a ** b */"),
            ]
        );
        assert_eq!(tokens.last().unwrap().token_type, TokenType::Semicolon);
        assert!(lexer.tokenize("<?php /* open").is_err());
    }

    #[test]
    fn test_heredoc_and_nowdoc() {
        let lexer = PhpLexer::new();
        let source = "<?php\n$a = <<<EOT\nHello $name\n  EOT;\n$b = <<<'RAW'\n$kept\nRAWX\nRAW;\n";
        let tokens = lexer.significant_tokens(source).unwrap();
        let docs: Vec<_> = tokens
            .iter()
            .filter(|t| t.token_type == TokenType::Heredoc)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(docs, vec!["<<<EOT\nHello $name\n  EOT", "<<<'RAW'\n$kept\nRAWX\nRAW"]);
        assert!(!is_nowdoc(docs[0]));
        assert!(is_nowdoc(docs[1]));
        assert_eq!(tokens[3].token_type, TokenType::Semicolon);
        assert_eq!(tokens[4].position.line, 5);
    }

    #[test]
    fn test_lex_error() {
        let lexer = PhpLexer::new();
        let err = lexer.tokenize("<?php $a = `ls`;").unwrap_err();
        assert!(matches!(err, PreprocessError::Lex { line: 1, .. }));
    }
}
