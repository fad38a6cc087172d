/*!
# PHP Grammar

Recursive descent for statements and declarations, precedence climbing for
expressions. The parser walks the full token stream but only ever looks at
significant tokens; trivia stays in the gaps between child spans so the
printer can reproduce it.

Every node receives a `NodeId` in creation order. Absent optional parts of
fixed-arity nodes become zero-width `Empty` children.
*/

use crate::core::errors::{PreprocessError, Result};
use crate::core::position::{Position, Span, TokenRange};
use crate::parser::ast::{AstNode, AstNodeType, NodeId};
use crate::parser::lexer::{PhpLexer, Token, TokenType};

/// `(left, right)` binding power of assignment operators
pub const ASSIGN_BP: (u8, u8) = (12, 11);
/// `(left, right)` binding power of the ternary operator
pub const TERNARY_BP: (u8, u8) = (14, 15);
/// Operand binding power of `!`
pub const NOT_BP: u8 = 40;
/// Operand binding power of arithmetic prefix operators and casts
pub const UNARY_BP: u8 = 44;
/// Operand binding power of `clone` and `new`
pub const CLONE_BP: u8 = 50;
/// Operand binding power of `yield`, `include` and friends
pub const LOW_PREFIX_BP: u8 = 11;
/// Binding power of primary and postfix expressions
pub const PRIMARY_BP: u8 = u8::MAX;

/// Binding power of binary and assignment operators, keyed by lowercase text.
pub fn binary_binding_power(op: &str) -> Option<(u8, u8)> {
    Some(match op {
        "or" => (1, 2),
        "xor" => (3, 4),
        "and" => (5, 6),
        "=" | "+=" | "-=" | "*=" | "/=" | ".=" | "%=" | "**=" | "??=" => ASSIGN_BP,
        "??" => (17, 16),
        "||" => (18, 19),
        "&&" => (20, 21),
        "|" => (22, 23),
        "^" => (24, 25),
        "&" => (26, 27),
        "==" | "!=" | "<>" | "===" | "!==" | "<=>" => (28, 29),
        "<" | "<=" | ">" | ">=" => (30, 31),
        "." => (32, 33),
        "<<" | ">>" => (34, 35),
        "+" | "-" => (36, 37),
        "*" | "/" | "%" => (38, 39),
        "instanceof" => (42, 43),
        "**" => (47, 46),
        _ => return None,
    })
}

pub fn is_assignment_operator(op: &str) -> bool {
    matches!(op, "=" | "+=" | "-=" | "*=" | "/=" | ".=" | "%=" | "**=" | "??=")
}

/// Parses a whole token stream into a `Module` node.
/// Returns the tree and the number of ids handed out.
pub fn parse_module(tokens: &[Token]) -> Result<(AstNode, u32)> {
    let mut parser = Parser::new(tokens);
    let module = parser.parse_module()?;
    Ok((module, parser.next_id))
}

/// Recursive descent parser over a lossless token stream
pub struct Parser<'t> {
    tokens: &'t [Token],
    /// Index of the next significant token
    pos: usize,
    /// Index just past the last consumed significant token
    last_end: usize,
    next_id: u32,
    /// Forced span for nodes parsed out of an interpolated string
    span_override: Option<Span>,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        let mut parser = Self {
            tokens,
            pos: 0,
            last_end: 0,
            next_id: 0,
            span_override: None,
        };
        parser.skip_trivia();
        parser
    }

    // ---------------------------------------------------------------------
    // token cursor

    fn skip_trivia(&mut self) {
        while self.tokens.get(self.pos).is_some_and(|t| t.token_type.is_trivia()) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<TokenType> {
        self.tokens.get(self.pos).map(|t| t.token_type)
    }

    fn peek_token(&self) -> Option<&'t Token> {
        let tokens: &'t [Token] = self.tokens;
        tokens.get(self.pos)
    }

    /// n-th significant token after the current one
    fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        let tokens: &'t [Token] = self.tokens;
        tokens
            .get(self.pos..)
            .and_then(|rest| rest.iter().filter(|t| !t.token_type.is_trivia()).nth(n))
    }

    fn peek_nth_type(&self, n: usize) -> Option<TokenType> {
        self.peek_nth(n).map(|t| t.token_type)
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.peek() == Some(token_type)
    }

    fn bump(&mut self) -> Result<&'t Token> {
        let tokens: &'t [Token] = self.tokens;
        let token = tokens.get(self.pos).ok_or_else(|| self.unexpected("more input"))?;
        self.pos += 1;
        self.last_end = self.pos;
        self.skip_trivia();
        Ok(token)
    }

    fn eat(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.pos += 1;
            self.last_end = self.pos;
            self.skip_trivia();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<&'t Token> {
        if self.check(token_type) {
            self.bump()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<&'t Token> {
        match self.peek() {
            Some(t) if t.is_identifier_like() => self.bump(),
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_variable(&mut self) -> Result<String> {
        let token = self.expect(TokenType::Variable, "variable")?;
        Ok(token.value[1..].to_string())
    }

    fn unexpected(&self, expected: &str) -> PreprocessError {
        match self.peek_token() {
            Some(token) => PreprocessError::Parse {
                line: token.position.line,
                column: token.position.column,
                message: format!("expected {}, found '{}'", expected, token.value),
            },
            None => {
                let end = self.tokens.last().map_or_else(Position::zero, |t| t.end_position());
                PreprocessError::Parse {
                    line: end.line,
                    column: end.column,
                    message: format!("expected {}, found end of file", expected),
                }
            }
        }
    }

    /// `;`, or an implicit terminator before `?>` / end of file
    fn end_statement(&mut self) -> Result<()> {
        if self.eat(TokenType::Semicolon) {
            return Ok(());
        }
        let closed = self.tokens[self.last_end.min(self.pos)..self.pos]
            .iter()
            .any(|t| t.token_type == TokenType::CloseTag);
        if self.at_end() || closed {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    // ---------------------------------------------------------------------
    // node construction

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn span_from(&self, start: usize) -> Span {
        if let Some(span) = self.span_override {
            return span;
        }
        let end = self.last_end.max(start);
        let start_pos = self
            .tokens
            .get(start)
            .map(|t| t.position)
            .unwrap_or_else(|| self.end_position());
        let end_pos = if end > start {
            self.tokens[end - 1].end_position()
        } else {
            start_pos
        };
        Span::new(start_pos, end_pos, TokenRange::new(start, end))
    }

    fn end_position(&self) -> Position {
        self.tokens.last().map_or_else(Position::zero, |t| t.end_position())
    }

    fn span_at_index(&self, index: usize) -> Span {
        if let Some(span) = self.span_override {
            return span;
        }
        let position = match self.tokens.get(index) {
            Some(token) => token.position,
            None => self.end_position(),
        };
        Span::empty_at(position, index)
    }

    fn make(&mut self, node_type: AstNodeType, span: Span) -> AstNode {
        let mut node = AstNode::new(node_type, span);
        node.id = Some(self.alloc_id());
        node
    }

    fn leaf(&mut self, node_type: AstNodeType, start: usize, value: impl Into<String>) -> AstNode {
        let span = self.span_from(start);
        let mut node = self.make(node_type, span);
        node.value = Some(value.into());
        node
    }

    fn composite(
        &mut self,
        node_type: AstNodeType,
        start: usize,
        value: Option<String>,
        children: Vec<AstNode>,
    ) -> AstNode {
        let span = self.span_from(start);
        let mut node = self.make(node_type, span);
        node.value = value;
        for child in children {
            node.add_child(child);
        }
        node
    }

    /// Empty slot before the next significant token
    fn empty_here(&mut self) -> AstNode {
        let span = self.span_at_index(self.pos);
        self.make(AstNodeType::Empty, span)
    }

    /// Empty slot right after the last consumed token
    fn empty_after(&mut self) -> AstNode {
        let span = if self.span_override.is_some() || self.last_end == 0 {
            self.span_at_index(self.last_end)
        } else {
            let position = self.tokens[self.last_end - 1].end_position();
            Span::empty_at(position, self.last_end)
        };
        self.make(AstNodeType::Empty, span)
    }

    fn empty_at_index(&mut self, index: usize) -> AstNode {
        let span = self.span_at_index(index);
        self.make(AstNodeType::Empty, span)
    }

    fn doc_comment_before(&self, index: usize) -> Option<String> {
        self.tokens[..index.min(self.tokens.len())]
            .iter()
            .rev()
            .take_while(|t| t.token_type.is_trivia() && t.token_type != TokenType::OpenTag)
            .find(|t| t.token_type == TokenType::DocComment)
            .map(|t| t.value.clone())
    }

    // ---------------------------------------------------------------------
    // statements

    pub fn parse_module(&mut self) -> Result<AstNode> {
        let mut statements = Vec::new();
        while !self.at_end() {
            statements.push(self.parse_statement()?);
        }

        let span = match (self.tokens.first(), self.tokens.last()) {
            (Some(first), Some(last)) => {
                Span::new(first.position, last.end_position(), TokenRange::new(0, self.tokens.len()))
            }
            _ => Span::new(Position::new(1, 1, 0), Position::new(1, 1, 0), TokenRange::default()),
        };
        let mut module = self.make(AstNodeType::Module, span);
        for statement in statements {
            module.add_child(statement);
        }
        Ok(module)
    }

    fn parse_statement(&mut self) -> Result<AstNode> {
        let Some(token_type) = self.peek() else {
            return Err(self.unexpected("statement"));
        };

        match token_type {
            TokenType::LeftBrace => self.parse_block(),
            TokenType::Namespace => self.parse_namespace(),
            TokenType::Use => self.parse_use(),
            TokenType::Declare => self.parse_declare(),
            TokenType::Abstract | TokenType::Final | TokenType::Class | TokenType::Interface | TokenType::Trait => {
                self.parse_class()
            }
            TokenType::Readonly
                if matches!(
                    self.peek_nth_type(1),
                    Some(TokenType::Class | TokenType::Final | TokenType::Abstract)
                ) =>
            {
                self.parse_class()
            }
            TokenType::Function if self.is_function_declaration() => self.parse_function_declaration(),
            TokenType::If => self.parse_if(),
            TokenType::While => self.parse_while(),
            TokenType::Do => self.parse_do_while(),
            TokenType::Switch => self.parse_switch(),
            TokenType::Static if self.peek_nth_type(1) == Some(TokenType::Variable) => self.parse_static_vars(),
            TokenType::For => self.parse_for(),
            TokenType::Foreach => self.parse_foreach(),
            TokenType::Return => self.parse_return(),
            TokenType::Echo => self.parse_echo(),
            TokenType::Throw => self.parse_throw(),
            TokenType::Try => self.parse_try(),
            TokenType::Break | TokenType::Continue => self.parse_jump(),
            TokenType::Semicolon => {
                let start = self.pos;
                self.bump()?;
                Ok(self.composite(AstNodeType::Nop, start, None, Vec::new()))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn is_function_declaration(&self) -> bool {
        match self.peek_nth_type(1) {
            Some(TokenType::Ampersand) => self.peek_nth_type(2).is_some_and(|t| t.is_identifier_like()),
            Some(t) => t.is_identifier_like(),
            None => false,
        }
    }

    fn parse_block(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.expect(TokenType::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            statements.push(self.parse_statement()?);
        }
        self.bump()?;
        Ok(self.composite(AstNodeType::Block, start, None, statements))
    }

    /// Braced block or a single statement
    fn parse_body(&mut self) -> Result<AstNode> {
        if self.check(TokenType::LeftBrace) {
            self.parse_block()
        } else {
            self.parse_statement()
        }
    }

    fn parse_namespace(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let name = match self.peek() {
            Some(TokenType::Identifier | TokenType::QualifiedName) => Some(self.bump()?.value.clone()),
            _ => None,
        };
        let body = if self.check(TokenType::LeftBrace) {
            self.parse_block()?
        } else {
            self.end_statement()?;
            self.empty_after()
        };
        Ok(self.composite(AstNodeType::Namespace, start, name, vec![body]))
    }

    fn parse_use(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let kind = if self.eat(TokenType::Function) {
            "function"
        } else if self.eat(TokenType::Const) {
            "const"
        } else {
            "class"
        };

        let mut items = Vec::new();
        loop {
            let item_start = self.pos;
            let name = self.expect_name_token("imported name")?.value.clone();
            let alias = if self.eat(TokenType::As) {
                Some(self.expect_identifier("alias")?.value.clone())
            } else {
                None
            };
            let mut item = self.leaf(AstNodeType::UseItem, item_start, name);
            if let Some(alias) = alias {
                item.add_attribute("alias", alias);
            }
            items.push(item);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.end_statement()?;
        Ok(self.composite(AstNodeType::Use, start, Some(kind.to_string()), items))
    }

    fn parse_declare(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        self.expect(TokenType::LeftParen, "'('")?;
        let directive = self.expect_identifier("declare directive")?.value.clone();
        self.expect(TokenType::Assign, "'='")?;
        let value = self.parse_expression()?;
        self.expect(TokenType::RightParen, "')'")?;
        self.end_statement()?;
        Ok(self.composite(AstNodeType::Declare, start, Some(directive), vec![value]))
    }

    fn expect_name_token(&mut self, what: &str) -> Result<&'t Token> {
        match self.peek() {
            Some(TokenType::QualifiedName) => self.bump(),
            Some(t) if t.is_identifier_like() => self.bump(),
            _ => Err(self.unexpected(what)),
        }
    }

    fn parse_name(&mut self, what: &str) -> Result<AstNode> {
        let start = self.pos;
        let value = self.expect_name_token(what)?.value.clone();
        Ok(self.leaf(AstNodeType::Name, start, value))
    }

    fn parse_name_list(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let mut names = Vec::new();
        loop {
            names.push(self.parse_name("class name")?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        Ok(self.composite(AstNodeType::NameList, start, None, names))
    }

    fn empty_list(&mut self, node_type: AstNodeType) -> AstNode {
        let span = self.span_at_index(self.pos);
        self.make(node_type, span)
    }

    fn parse_modifiers(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let mut keywords = Vec::new();
        while self.peek().is_some_and(|t| t.is_modifier()) {
            keywords.push(self.bump()?.value.to_ascii_lowercase());
        }
        if keywords.is_empty() {
            let span = self.span_at_index(self.pos);
            let mut node = self.make(AstNodeType::Modifiers, span);
            node.value = Some(String::new());
            Ok(node)
        } else {
            Ok(self.leaf(AstNodeType::Modifiers, start, keywords.join(" ")))
        }
    }

    fn parse_class(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let doc = self.doc_comment_before(start);
        let modifiers = self.parse_modifiers()?;

        let kind = match self.peek() {
            Some(TokenType::Class) => "class",
            Some(TokenType::Interface) => "interface",
            Some(TokenType::Trait) => "trait",
            _ => return Err(self.unexpected("'class'")),
        };
        self.bump()?;
        let name = self.expect_identifier("class name")?.value.clone();

        let (extends, interfaces) = if kind == "interface" {
            let extends = self.empty_here();
            let interfaces = if self.eat(TokenType::Extends) {
                self.parse_name_list()?
            } else {
                self.empty_list(AstNodeType::NameList)
            };
            (extends, interfaces)
        } else {
            let extends = if self.eat(TokenType::Extends) {
                self.parse_name("parent class")?
            } else {
                self.empty_here()
            };
            let interfaces = if self.eat(TokenType::Implements) {
                self.parse_name_list()?
            } else {
                self.empty_list(AstNodeType::NameList)
            };
            (extends, interfaces)
        };

        let body = self.parse_class_body()?;
        let mut class = self.composite(
            AstNodeType::ClassDeclaration,
            start,
            Some(name),
            vec![modifiers, extends, interfaces, body],
        );
        class.add_attribute("kind", kind);
        if let Some(doc) = doc {
            class.add_attribute("doc_comment", doc);
        }
        Ok(class)
    }

    fn parse_class_body(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.expect(TokenType::LeftBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.check(TokenType::RightBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            members.push(self.parse_member()?);
        }
        self.bump()?;
        Ok(self.composite(AstNodeType::ClassBody, start, None, members))
    }

    fn parse_member(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let doc = self.doc_comment_before(start);

        if self.eat(TokenType::Use) {
            let mut traits = Vec::new();
            loop {
                traits.push(self.parse_name("trait name")?);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
            self.end_statement()?;
            return Ok(self.composite(AstNodeType::TraitUse, start, None, traits));
        }

        let modifiers = self.parse_modifiers()?;
        let mut member = match self.peek() {
            Some(TokenType::Const) => {
                self.bump()?;
                let name = self.expect_identifier("constant name")?.value.clone();
                self.expect(TokenType::Assign, "'='")?;
                let value = self.parse_expression()?;
                self.end_statement()?;
                self.composite(AstNodeType::ClassConstant, start, Some(name), vec![modifiers, value])
            }
            Some(TokenType::Function) => self.parse_method(start, modifiers)?,
            _ => self.parse_property(start, modifiers)?,
        };
        if let Some(doc) = doc {
            member.add_attribute("doc_comment", doc);
        }
        Ok(member)
    }

    fn parse_method(&mut self, start: usize, modifiers: AstNode) -> Result<AstNode> {
        self.bump()?;
        let by_ref = self.eat(TokenType::Ampersand);
        let name = self.expect_identifier("method name")?.value.clone();
        let params = self.parse_parameter_list()?;
        let return_type = self.parse_return_type()?;
        let body = if self.check(TokenType::LeftBrace) {
            self.parse_block()?
        } else {
            self.end_statement()?;
            self.empty_after()
        };
        let mut method = self.composite(
            AstNodeType::ClassMethod,
            start,
            Some(name),
            vec![modifiers, params, return_type, body],
        );
        if by_ref {
            method.set_flag("by_ref");
        }
        Ok(method)
    }

    fn parse_property(&mut self, start: usize, modifiers: AstNode) -> Result<AstNode> {
        let type_hint = if self.check(TokenType::Variable) {
            self.empty_here()
        } else {
            self.parse_type()?
        };
        let name = self.expect_variable()?;
        let default = if self.eat(TokenType::Assign) {
            self.parse_expression()?
        } else {
            self.empty_after()
        };
        if self.check(TokenType::Comma) {
            return Err(self.unexpected("one property per declaration"));
        }
        self.end_statement()?;
        Ok(self.composite(AstNodeType::Property, start, Some(name), vec![modifiers, type_hint, default]))
    }

    fn parse_function_declaration(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let doc = self.doc_comment_before(start);
        self.bump()?;
        let by_ref = self.eat(TokenType::Ampersand);
        let name = self.expect_identifier("function name")?.value.clone();
        let params = self.parse_parameter_list()?;
        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;
        let mut function = self.composite(
            AstNodeType::FunctionDeclaration,
            start,
            Some(name),
            vec![params, return_type, body],
        );
        if by_ref {
            function.set_flag("by_ref");
        }
        if let Some(doc) = doc {
            function.add_attribute("doc_comment", doc);
        }
        Ok(function)
    }

    fn parse_parameter_list(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.expect(TokenType::LeftParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(TokenType::RightParen) {
            params.push(self.parse_parameter()?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RightParen, "')'")?;
        Ok(self.composite(AstNodeType::ParameterList, start, None, params))
    }

    fn parse_parameter(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let modifiers = self.parse_modifiers()?;
        let type_hint = if self.starts_type() {
            self.parse_type()?
        } else {
            self.empty_here()
        };
        let by_ref = self.eat(TokenType::Ampersand);
        let variadic = self.eat(TokenType::Ellipsis);
        let name = self.expect_variable()?;
        let default = if self.eat(TokenType::Assign) {
            self.parse_expression()?
        } else {
            self.empty_after()
        };
        let mut param = self.composite(AstNodeType::Parameter, start, Some(name), vec![modifiers, type_hint, default]);
        if by_ref {
            param.set_flag("by_ref");
        }
        if variadic {
            param.set_flag("variadic");
        }
        Ok(param)
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                TokenType::Question
                    | TokenType::Identifier
                    | TokenType::QualifiedName
                    | TokenType::Array
                    | TokenType::Static
            )
        )
    }

    fn parse_return_type(&mut self) -> Result<AstNode> {
        if self.eat(TokenType::Colon) {
            self.parse_type()
        } else {
            Ok(self.empty_here())
        }
    }

    /// `?T`, `A|B`, `A&B`; the value is the written text without whitespace
    fn parse_type(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let mut text = String::new();
        if self.eat(TokenType::Question) {
            text.push('?');
        }
        loop {
            match self.peek() {
                Some(TokenType::Identifier | TokenType::QualifiedName | TokenType::Array | TokenType::Static) => {
                    text.push_str(&self.bump()?.value);
                }
                _ => return Err(self.unexpected("type")),
            }
            if self.eat(TokenType::Pipe) {
                text.push('|');
                continue;
            }
            let intersection = self.check(TokenType::Ampersand)
                && matches!(
                    self.peek_nth_type(1),
                    Some(TokenType::Identifier | TokenType::QualifiedName)
                );
            if intersection {
                self.bump()?;
                text.push('&');
                continue;
            }
            break;
        }
        Ok(self.leaf(AstNodeType::TypeHint, start, text))
    }

    fn parse_if(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let condition = self.parse_condition()?;
        let body = self.parse_body()?;

        let list_start = self.pos;
        let mut branches = Vec::new();
        while self.check(TokenType::ElseIf) {
            let branch_start = self.pos;
            self.bump()?;
            let branch_condition = self.parse_condition()?;
            let branch_body = self.parse_body()?;
            branches.push(self.composite(AstNodeType::ElseIf, branch_start, None, vec![branch_condition, branch_body]));
        }
        let else_ifs = if branches.is_empty() {
            self.empty_list(AstNodeType::ElseIfList)
        } else {
            self.composite(AstNodeType::ElseIfList, list_start, None, branches)
        };

        let otherwise = if self.eat(TokenType::Else) {
            self.parse_body()?
        } else {
            self.empty_after()
        };
        Ok(self.composite(AstNodeType::If, start, None, vec![condition, body, else_ifs, otherwise]))
    }

    fn parse_condition(&mut self) -> Result<AstNode> {
        self.expect(TokenType::LeftParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::RightParen, "')'")?;
        Ok(condition)
    }

    fn parse_while(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let condition = self.parse_condition()?;
        let body = self.parse_body()?;
        Ok(self.composite(AstNodeType::While, start, None, vec![condition, body]))
    }

    fn parse_do_while(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let body = self.parse_body()?;
        self.expect(TokenType::While, "'while'")?;
        let condition = self.parse_condition()?;
        self.end_statement()?;
        Ok(self.composite(AstNodeType::DoWhile, start, None, vec![body, condition]))
    }

    fn parse_switch(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let subject = self.parse_condition()?;

        let list_start = self.pos;
        self.expect(TokenType::LeftBrace, "'{'")?;
        let mut cases = Vec::new();
        while !self.check(TokenType::RightBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            cases.push(self.parse_case()?);
        }
        self.bump()?;
        let cases = self.composite(AstNodeType::CaseList, list_start, None, cases);
        Ok(self.composite(AstNodeType::Switch, start, None, vec![subject, cases]))
    }

    /// `case expr:` or `default:` and the statements up to the next label.
    /// The test slot is `Empty` for `default`.
    fn parse_case(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let test = if self.eat(TokenType::Default) {
            self.empty_after()
        } else {
            self.expect(TokenType::Case, "'case' or 'default'")?;
            self.parse_expression()?
        };
        if !self.eat(TokenType::Semicolon) {
            self.expect(TokenType::Colon, "':'")?;
        }

        let body_start = self.pos;
        let mut statements = Vec::new();
        while !matches!(
            self.peek(),
            None | Some(TokenType::Case | TokenType::Default | TokenType::RightBrace)
        ) {
            statements.push(self.parse_statement()?);
        }
        let body = if statements.is_empty() {
            self.empty_list(AstNodeType::CaseBody)
        } else {
            self.composite(AstNodeType::CaseBody, body_start, None, statements)
        };
        Ok(self.composite(AstNodeType::Case, start, None, vec![test, body]))
    }

    /// `static $a = 1, $b;` inside a function body
    fn parse_static_vars(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let mut variables = Vec::new();
        loop {
            let variable_start = self.pos;
            let name = self.expect_variable()?;
            let default = if self.eat(TokenType::Assign) {
                self.parse_expression()?
            } else {
                self.empty_after()
            };
            variables.push(self.composite(AstNodeType::StaticVar, variable_start, Some(name), vec![default]));
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.end_statement()?;
        Ok(self.composite(AstNodeType::StaticVars, start, None, variables))
    }

    fn parse_for(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        self.expect(TokenType::LeftParen, "'('")?;
        let init = self.parse_expr_list(TokenType::Semicolon)?;
        self.expect(TokenType::Semicolon, "';'")?;
        let condition = self.parse_expr_list(TokenType::Semicolon)?;
        self.expect(TokenType::Semicolon, "';'")?;
        let step = self.parse_expr_list(TokenType::RightParen)?;
        self.expect(TokenType::RightParen, "')'")?;
        let body = self.parse_body()?;
        Ok(self.composite(AstNodeType::For, start, None, vec![init, condition, step, body]))
    }

    fn parse_expr_list(&mut self, terminator: TokenType) -> Result<AstNode> {
        let start = self.pos;
        let mut expressions = Vec::new();
        while !self.check(terminator) {
            expressions.push(self.parse_expression()?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        Ok(self.composite(AstNodeType::ExprList, start, None, expressions))
    }

    fn parse_foreach(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        self.expect(TokenType::LeftParen, "'('")?;
        let subject = self.parse_expression()?;
        self.expect(TokenType::As, "'as'")?;

        let target_start = self.pos;
        let mut by_ref = self.eat(TokenType::Ampersand);
        let first = self.parse_expr_bp(ASSIGN_BP.0 + 1)?;
        let (key, value) = if self.eat(TokenType::DoubleArrow) {
            by_ref = self.eat(TokenType::Ampersand);
            let value = self.parse_expr_bp(ASSIGN_BP.0 + 1)?;
            (first, value)
        } else {
            (self.empty_at_index(target_start), first)
        };
        self.expect(TokenType::RightParen, "')'")?;
        let body = self.parse_body()?;

        let mut foreach = self.composite(AstNodeType::Foreach, start, None, vec![subject, key, value, body]);
        if by_ref {
            foreach.set_flag("by_ref");
        }
        Ok(foreach)
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(
                TokenType::Semicolon | TokenType::RightParen | TokenType::RightBracket | TokenType::Comma
            )
        )
    }

    fn parse_return(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let value = if self.at_expression_end() {
            self.empty_after()
        } else {
            self.parse_expression()?
        };
        self.end_statement()?;
        Ok(self.composite(AstNodeType::Return, start, None, vec![value]))
    }

    fn parse_echo(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_expression()?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.end_statement()?;
        Ok(self.composite(AstNodeType::Echo, start, None, values))
    }

    fn parse_throw(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let value = self.parse_expression()?;
        self.end_statement()?;
        Ok(self.composite(AstNodeType::Throw, start, None, vec![value]))
    }

    fn parse_try(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let body = self.parse_block()?;

        let list_start = self.pos;
        let mut catches = Vec::new();
        while self.check(TokenType::Catch) {
            let catch_start = self.pos;
            self.bump()?;
            self.expect(TokenType::LeftParen, "'('")?;
            let types_start = self.pos;
            let mut types = Vec::new();
            loop {
                types.push(self.parse_name("exception class")?);
                if !self.eat(TokenType::Pipe) {
                    break;
                }
            }
            let types = self.composite(AstNodeType::NameList, types_start, None, types);
            let variable = if self.check(TokenType::Variable) {
                Some(self.expect_variable()?)
            } else {
                None
            };
            self.expect(TokenType::RightParen, "')'")?;
            let handler = self.parse_block()?;
            catches.push(self.composite(AstNodeType::Catch, catch_start, variable, vec![types, handler]));
        }
        let catches = if catches.is_empty() {
            self.empty_list(AstNodeType::CatchList)
        } else {
            self.composite(AstNodeType::CatchList, list_start, None, catches)
        };

        let finally = if self.eat(TokenType::Finally) {
            self.parse_block()?
        } else {
            self.empty_after()
        };
        Ok(self.composite(AstNodeType::Try, start, None, vec![body, catches, finally]))
    }

    fn parse_jump(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let kind = if self.bump()?.token_type == TokenType::Break {
            AstNodeType::Break
        } else {
            AstNodeType::Continue
        };
        let depth = if self.check(TokenType::IntLiteral) {
            self.parse_expression()?
        } else {
            self.empty_after()
        };
        self.end_statement()?;
        Ok(self.composite(kind, start, None, vec![depth]))
    }

    fn parse_expression_statement(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let expression = self.parse_expression()?;
        self.end_statement()?;
        Ok(self.composite(AstNodeType::ExpressionStatement, start, None, vec![expression]))
    }

    // ---------------------------------------------------------------------
    // expressions

    pub fn parse_expression(&mut self) -> Result<AstNode> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<AstNode> {
        let start = self.pos;
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek_token() else {
                break;
            };

            match token.token_type {
                TokenType::Arrow
                | TokenType::NullsafeArrow
                | TokenType::DoubleColon
                | TokenType::LeftBracket
                | TokenType::LeftParen => {
                    lhs = self.parse_postfix(start, lhs)?;
                    continue;
                }
                TokenType::Increment | TokenType::Decrement if is_assignable(&lhs) => {
                    let op = self.bump()?.value.clone();
                    let mut node = self.composite(AstNodeType::Unary, start, Some(op), vec![lhs]);
                    node.set_flag("postfix");
                    lhs = node;
                    continue;
                }
                TokenType::Question => {
                    if TERNARY_BP.0 < min_bp {
                        break;
                    }
                    self.bump()?;
                    let then = if self.check(TokenType::Colon) {
                        self.empty_here()
                    } else {
                        self.parse_expr_bp(0)?
                    };
                    self.expect(TokenType::Colon, "':'")?;
                    let otherwise = self.parse_expr_bp(TERNARY_BP.1)?;
                    lhs = self.composite(AstNodeType::Ternary, start, None, vec![lhs, then, otherwise]);
                    continue;
                }
                _ => {}
            }

            let op = token.value.to_ascii_lowercase();
            let Some((l_bp, r_bp)) = binary_binding_power(&op) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            let written = self.bump()?.value.clone();

            lhs = if is_assignment_operator(&op) {
                let value = self.parse_expr_bp(r_bp)?;
                self.composite(AstNodeType::Assign, start, Some(written), vec![lhs, value])
            } else if op == "instanceof" {
                let class = match self.peek() {
                    Some(TokenType::Identifier | TokenType::QualifiedName | TokenType::Static) => {
                        self.parse_name("class name")?
                    }
                    _ => self.parse_expr_bp(r_bp)?,
                };
                self.composite(AstNodeType::Binary, start, Some(written), vec![lhs, class])
            } else {
                let rhs = self.parse_expr_bp(r_bp)?;
                self.composite(AstNodeType::Binary, start, Some(written), vec![lhs, rhs])
            };
        }

        Ok(lhs)
    }

    fn parse_postfix(&mut self, start: usize, lhs: AstNode) -> Result<AstNode> {
        if self.check(TokenType::LeftParen) {
            let args = self.parse_arguments()?;
            return Ok(self.composite(AstNodeType::FuncCall, start, None, vec![lhs, args]));
        }

        let token = self.bump()?;
        match token.token_type {
            TokenType::Arrow | TokenType::NullsafeArrow => {
                let nullsafe = token.token_type == TokenType::NullsafeArrow;
                let member = self.parse_member_name()?;
                let mut node = if self.check(TokenType::LeftParen) {
                    let args = self.parse_arguments()?;
                    self.composite(AstNodeType::MethodCall, start, None, vec![lhs, member, args])
                } else {
                    self.composite(AstNodeType::PropertyFetch, start, None, vec![lhs, member])
                };
                if nullsafe {
                    node.set_flag("nullsafe");
                }
                Ok(node)
            }
            TokenType::DoubleColon => {
                if self.check(TokenType::Variable) {
                    let member_start = self.pos;
                    let name = self.expect_variable()?;
                    let member = self.leaf(AstNodeType::Variable, member_start, name);
                    return Ok(self.composite(AstNodeType::StaticPropertyFetch, start, None, vec![lhs, member]));
                }
                let member_start = self.pos;
                let name = self.expect_identifier("member name")?.value.clone();
                let member = self.leaf(AstNodeType::Identifier, member_start, name);
                if self.check(TokenType::LeftParen) {
                    let args = self.parse_arguments()?;
                    Ok(self.composite(AstNodeType::StaticCall, start, None, vec![lhs, member, args]))
                } else {
                    Ok(self.composite(AstNodeType::ClassConstFetch, start, None, vec![lhs, member]))
                }
            }
            TokenType::LeftBracket => {
                let dim = if self.check(TokenType::RightBracket) {
                    self.empty_here()
                } else {
                    self.parse_expression()?
                };
                self.expect(TokenType::RightBracket, "']'")?;
                Ok(self.composite(AstNodeType::ArrayDimFetch, start, None, vec![lhs, dim]))
            }
            _ => Err(self.unexpected("member access")),
        }
    }

    fn parse_member_name(&mut self) -> Result<AstNode> {
        let start = self.pos;
        match self.peek() {
            Some(TokenType::Variable) => {
                let name = self.expect_variable()?;
                Ok(self.leaf(AstNodeType::Variable, start, name))
            }
            Some(t) if t.is_identifier_like() => {
                let name = self.bump()?.value.clone();
                Ok(self.leaf(AstNodeType::Identifier, start, name))
            }
            _ => Err(self.unexpected("member name")),
        }
    }

    fn parse_arguments(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.expect(TokenType::LeftParen, "'('")?;
        let mut args = Vec::new();
        while !self.check(TokenType::RightParen) {
            args.push(self.parse_argument()?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RightParen, "')'")?;
        Ok(self.composite(AstNodeType::ArgumentList, start, None, args))
    }

    fn parse_argument(&mut self) -> Result<AstNode> {
        let start = self.pos;
        if self.eat(TokenType::Ellipsis) {
            let value = self.parse_expression()?;
            return Ok(self.composite(AstNodeType::Unary, start, Some("...".to_string()), vec![value]));
        }
        self.parse_expression()
    }

    fn parse_prefix(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let Some(token) = self.peek_token() else {
            return Err(self.unexpected("expression"));
        };

        match token.token_type {
            TokenType::Not => {
                self.bump()?;
                let operand = self.parse_expr_bp(NOT_BP)?;
                Ok(self.composite(AstNodeType::Unary, start, Some("!".to_string()), vec![operand]))
            }
            TokenType::Minus
            | TokenType::Plus
            | TokenType::Tilde
            | TokenType::Silence
            | TokenType::Increment
            | TokenType::Decrement
            | TokenType::Ampersand => {
                let op = self.bump()?.value.clone();
                let operand = self.parse_expr_bp(UNARY_BP)?;
                Ok(self.composite(AstNodeType::Unary, start, Some(op), vec![operand]))
            }
            TokenType::Clone => {
                self.bump()?;
                let operand = self.parse_expr_bp(CLONE_BP)?;
                Ok(self.composite(AstNodeType::Clone, start, None, vec![operand]))
            }
            TokenType::Include | TokenType::IncludeOnce | TokenType::Require | TokenType::RequireOnce => {
                let kind = self.bump()?.value.to_ascii_lowercase();
                let operand = self.parse_expr_bp(LOW_PREFIX_BP)?;
                Ok(self.composite(AstNodeType::Include, start, Some(kind), vec![operand]))
            }
            TokenType::Yield => self.parse_yield(),
            TokenType::Match if self.peek_nth_type(1) == Some(TokenType::LeftParen) => self.parse_match(),
            TokenType::New => self.parse_new(),
            TokenType::Isset => {
                self.bump()?;
                self.expect(TokenType::LeftParen, "'('")?;
                let mut values = Vec::new();
                while !self.check(TokenType::RightParen) {
                    values.push(self.parse_expression()?);
                    if !self.eat(TokenType::Comma) {
                        break;
                    }
                }
                self.expect(TokenType::RightParen, "')'")?;
                Ok(self.composite(AstNodeType::Isset, start, None, values))
            }
            TokenType::Empty => {
                self.bump()?;
                let operand = self.parse_condition()?;
                Ok(self.composite(AstNodeType::EmptyCheck, start, None, vec![operand]))
            }
            TokenType::LeftBracket => self.parse_array(ArrayStyle::Short),
            TokenType::Array if self.peek_nth_type(1) == Some(TokenType::LeftParen) => {
                self.parse_array(ArrayStyle::Long)
            }
            TokenType::List => self.parse_array(ArrayStyle::List),
            TokenType::Function => self.parse_closure(),
            TokenType::Fn => self.parse_arrow_function(),
            TokenType::Static => match self.peek_nth_type(1) {
                Some(TokenType::Function) => self.parse_closure(),
                Some(TokenType::Fn) => self.parse_arrow_function(),
                _ => {
                    let name = self.bump()?.value.clone();
                    Ok(self.leaf(AstNodeType::Name, start, name))
                }
            },
            TokenType::LeftParen if self.at_cast() => {
                self.bump()?;
                let cast = normalize_cast(&self.bump()?.value);
                self.bump()?;
                let operand = self.parse_expr_bp(UNARY_BP)?;
                Ok(self.composite(AstNodeType::Cast, start, Some(cast), vec![operand]))
            }
            TokenType::LeftParen => {
                self.bump()?;
                let inner = self.parse_expression()?;
                self.expect(TokenType::RightParen, "')'")?;
                Ok(inner)
            }
            TokenType::Variable => {
                let name = self.expect_variable()?;
                Ok(self.leaf(AstNodeType::Variable, start, name))
            }
            TokenType::IntLiteral => {
                let raw = self.bump()?.value.clone();
                Ok(self.leaf(AstNodeType::IntLiteral, start, raw))
            }
            TokenType::FloatLiteral => {
                let raw = self.bump()?.value.clone();
                Ok(self.leaf(AstNodeType::FloatLiteral, start, raw))
            }
            TokenType::StringLiteral => {
                let raw = self.bump()?.value.clone();
                Ok(self.leaf(AstNodeType::StringLiteral, start, raw))
            }
            TokenType::InterpolatedString => self.parse_interpolated(),
            TokenType::Heredoc => {
                let raw = self.bump()?.value.clone();
                let mut node = self.leaf(AstNodeType::StringLiteral, start, raw);
                node.set_flag("heredoc");
                Ok(node)
            }
            TokenType::QualifiedName | TokenType::Identifier => self.parse_name_expression(),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `(` type name `)` in expression position
    fn at_cast(&self) -> bool {
        let is_type = self.peek_nth(1).is_some_and(|t| {
            matches!(t.token_type, TokenType::Identifier | TokenType::Array)
                && CAST_TYPES.contains(&t.value.to_ascii_lowercase().as_str())
        });
        is_type && self.peek_nth_type(2) == Some(TokenType::RightParen)
    }

    /// Function call, class reference before `::`, or constant fetch
    fn parse_name_expression(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let name = self.parse_name("name")?;
        match self.peek() {
            Some(TokenType::LeftParen) => {
                let args = self.parse_arguments()?;
                Ok(self.composite(AstNodeType::FuncCall, start, None, vec![name, args]))
            }
            Some(TokenType::DoubleColon) => Ok(name),
            _ => Ok(self.composite(AstNodeType::ConstFetch, start, None, vec![name])),
        }
    }

    fn parse_new(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let class = match self.peek() {
            Some(TokenType::Identifier | TokenType::QualifiedName | TokenType::Static) => {
                let class_start = self.pos;
                let name = self.bump()?.value.clone();
                self.leaf(AstNodeType::Name, class_start, name)
            }
            Some(TokenType::Variable) => {
                let class_start = self.pos;
                let name = self.expect_variable()?;
                self.leaf(AstNodeType::Variable, class_start, name)
            }
            Some(TokenType::LeftParen) => {
                self.bump()?;
                let inner = self.parse_expression()?;
                self.expect(TokenType::RightParen, "')'")?;
                inner
            }
            _ => return Err(self.unexpected("class name")),
        };
        let args = if self.check(TokenType::LeftParen) {
            self.parse_arguments()?
        } else {
            self.empty_after()
        };
        Ok(self.composite(AstNodeType::New, start, None, vec![class, args]))
    }

    /// `match (subject) { a, b => x, default => y }`; a `default` arm has an
    /// `Empty` condition slot.
    fn parse_match(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let subject = self.parse_condition()?;

        let list_start = self.pos;
        self.expect(TokenType::LeftBrace, "'{'")?;
        let mut arms = Vec::new();
        while !self.check(TokenType::RightBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}'"));
            }
            let arm_start = self.pos;
            let conditions = if self.eat(TokenType::Default) {
                self.empty_after()
            } else {
                self.parse_expr_list(TokenType::DoubleArrow)?
            };
            self.expect(TokenType::DoubleArrow, "'=>'")?;
            let result = self.parse_expression()?;
            arms.push(self.composite(AstNodeType::MatchArm, arm_start, None, vec![conditions, result]));
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RightBrace, "'}'")?;
        let arms = self.composite(AstNodeType::MatchArmList, list_start, None, arms);
        Ok(self.composite(AstNodeType::Match, start, None, vec![subject, arms]))
    }

    fn parse_yield(&mut self) -> Result<AstNode> {
        let start = self.pos;
        self.bump()?;
        let from = self
            .peek_token()
            .is_some_and(|t| t.token_type == TokenType::Identifier && t.value.eq_ignore_ascii_case("from"));

        let node = if from {
            self.bump()?;
            let key = self.empty_here();
            let value = self.parse_expr_bp(LOW_PREFIX_BP)?;
            let mut node = self.composite(AstNodeType::Yield, start, None, vec![key, value]);
            node.set_flag("from");
            node
        } else if self.at_expression_end() {
            let key = self.empty_after();
            let value = self.empty_after();
            self.composite(AstNodeType::Yield, start, None, vec![key, value])
        } else {
            let first_start = self.pos;
            let first = self.parse_expr_bp(LOW_PREFIX_BP)?;
            if self.eat(TokenType::DoubleArrow) {
                let value = self.parse_expr_bp(LOW_PREFIX_BP)?;
                self.composite(AstNodeType::Yield, start, None, vec![first, value])
            } else {
                let key = self.empty_at_index(first_start);
                self.composite(AstNodeType::Yield, start, None, vec![key, first])
            }
        };
        Ok(node)
    }

    fn parse_array(&mut self, style: ArrayStyle) -> Result<AstNode> {
        let start = self.pos;
        let close = match style {
            ArrayStyle::Short => {
                self.expect(TokenType::LeftBracket, "'['")?;
                TokenType::RightBracket
            }
            ArrayStyle::Long | ArrayStyle::List => {
                self.bump()?;
                self.expect(TokenType::LeftParen, "'('")?;
                TokenType::RightParen
            }
        };

        let mut items = Vec::new();
        while !self.check(close) {
            if self.check(TokenType::Comma) {
                items.push(self.empty_here());
                self.bump()?;
                continue;
            }
            items.push(self.parse_array_item()?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(close, "end of array")?;

        let mut array = self.composite(AstNodeType::ArrayLiteral, start, None, items);
        array.add_attribute("kind", style.as_str());
        Ok(array)
    }

    fn parse_array_item(&mut self) -> Result<AstNode> {
        let start = self.pos;
        if self.eat(TokenType::Ellipsis) {
            let key = self.empty_at_index(start);
            let value = self.parse_expression()?;
            let mut item = self.composite(AstNodeType::ArrayItem, start, None, vec![key, value]);
            item.set_flag("spread");
            return Ok(item);
        }
        let first = self.parse_expression()?;
        if self.eat(TokenType::DoubleArrow) {
            let value = self.parse_expression()?;
            Ok(self.composite(AstNodeType::ArrayItem, start, None, vec![first, value]))
        } else {
            let key = self.empty_at_index(start);
            Ok(self.composite(AstNodeType::ArrayItem, start, None, vec![key, first]))
        }
    }

    fn parse_static_marker(&mut self) -> Result<AstNode> {
        let start = self.pos;
        if self.eat(TokenType::Static) {
            Ok(self.leaf(AstNodeType::Modifiers, start, "static"))
        } else {
            let span = self.span_at_index(self.pos);
            let mut node = self.make(AstNodeType::Modifiers, span);
            node.value = Some(String::new());
            Ok(node)
        }
    }

    fn parse_closure(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let modifiers = self.parse_static_marker()?;
        self.expect(TokenType::Function, "'function'")?;
        let by_ref = self.eat(TokenType::Ampersand);
        let params = self.parse_parameter_list()?;

        let uses = if self.check(TokenType::Use) {
            let uses_start = self.pos;
            self.bump()?;
            self.expect(TokenType::LeftParen, "'('")?;
            let mut captured = Vec::new();
            while !self.check(TokenType::RightParen) {
                let capture_start = self.pos;
                let capture_by_ref = self.eat(TokenType::Ampersand);
                let name = self.expect_variable()?;
                let mut variable = self.leaf(AstNodeType::Variable, capture_start, name);
                if capture_by_ref {
                    variable.set_flag("by_ref");
                }
                captured.push(variable);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RightParen, "')'")?;
            self.composite(AstNodeType::ClosureUses, uses_start, None, captured)
        } else {
            self.empty_list(AstNodeType::ClosureUses)
        };

        let return_type = self.parse_return_type()?;
        let body = self.parse_block()?;
        let mut closure = self.composite(
            AstNodeType::Closure,
            start,
            None,
            vec![modifiers, params, uses, return_type, body],
        );
        if by_ref {
            closure.set_flag("by_ref");
        }
        Ok(closure)
    }

    fn parse_arrow_function(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let modifiers = self.parse_static_marker()?;
        self.expect(TokenType::Fn, "'fn'")?;
        let params = self.parse_parameter_list()?;
        let return_type = self.parse_return_type()?;
        self.expect(TokenType::DoubleArrow, "'=>'")?;
        let body = self.parse_expr_bp(LOW_PREFIX_BP)?;
        Ok(self.composite(
            AstNodeType::ArrowFunction,
            start,
            None,
            vec![modifiers, params, return_type, body],
        ))
    }

    // ---------------------------------------------------------------------
    // interpolated strings

    fn parse_interpolated(&mut self) -> Result<AstNode> {
        let start = self.pos;
        let raw = self.bump()?.value.clone();
        if !raw.contains('$') {
            return Ok(self.leaf(AstNodeType::StringLiteral, start, raw));
        }

        let span = self.span_from(start);
        let body = &raw[1..raw.len() - 1];
        let bytes = body.as_bytes();
        let mut parts = Vec::new();
        let mut fragment_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'$' if bytes.get(i + 1).is_some_and(|b| is_name_start(*b)) => {
                    self.push_fragment(&mut parts, &body[fragment_start..i], span);
                    let (expr, next) = self.parse_simple_interpolation(body, i, span);
                    parts.push(expr);
                    i = next;
                    fragment_start = i;
                }
                b'{' if bytes.get(i + 1) == Some(&b'$') => {
                    self.push_fragment(&mut parts, &body[fragment_start..i], span);
                    let close = matching_brace(bytes, i).ok_or_else(|| PreprocessError::Parse {
                        line: span.start.line,
                        column: span.start.column,
                        message: "unterminated '{' in string".to_string(),
                    })?;
                    parts.push(self.parse_embedded(&body[i + 1..close], span)?);
                    i = close + 1;
                    fragment_start = i;
                }
                _ => i += 1,
            }
        }
        let tail_start = fragment_start.min(body.len());
        self.push_fragment(&mut parts, &body[tail_start..], span);

        let mut node = self.make(AstNodeType::InterpolatedString, span);
        for part in parts {
            node.add_child(part);
        }
        Ok(node)
    }

    fn push_fragment(&mut self, parts: &mut Vec<AstNode>, text: &str, span: Span) {
        if !text.is_empty() {
            let mut fragment = self.make(AstNodeType::StringFragment, span);
            fragment.value = Some(text.to_string());
            parts.push(fragment);
        }
    }

    fn synthetic_leaf(&mut self, node_type: AstNodeType, span: Span, value: impl Into<String>) -> AstNode {
        let mut node = self.make(node_type, span);
        node.value = Some(value.into());
        node
    }

    /// `$name`, `$name->prop`, `$name[key]` inside a double-quoted string
    fn parse_simple_interpolation(&mut self, body: &str, dollar: usize, span: Span) -> (AstNode, usize) {
        let bytes = body.as_bytes();
        let name_end = scan_name(bytes, dollar + 1);
        let mut expr = self.synthetic_leaf(AstNodeType::Variable, span, &body[dollar + 1..name_end]);
        let mut next = name_end;

        if body[next..].starts_with("->") && bytes.get(next + 2).is_some_and(|b| is_name_start(*b)) {
            let prop_end = scan_name(bytes, next + 2);
            let member = self.synthetic_leaf(AstNodeType::Identifier, span, &body[next + 2..prop_end]);
            let mut fetch = self.make(AstNodeType::PropertyFetch, span);
            fetch.add_child(expr);
            fetch.add_child(member);
            expr = fetch;
            next = prop_end;
        } else if bytes.get(next) == Some(&b'[') {
            if let Some(offset) = body[next..].find(']') {
                let close = next + offset;
                let key_text = &body[next + 1..close];
                let key = if let Some(variable) = key_text.strip_prefix('$') {
                    self.synthetic_leaf(AstNodeType::Variable, span, variable)
                } else if !key_text.is_empty()
                    && key_text.trim_start_matches('-').bytes().all(|b| b.is_ascii_digit())
                {
                    self.synthetic_leaf(AstNodeType::IntLiteral, span, key_text)
                } else {
                    self.synthetic_leaf(AstNodeType::StringLiteral, span, format!("'{}'", key_text))
                };
                let mut fetch = self.make(AstNodeType::ArrayDimFetch, span);
                fetch.add_child(expr);
                fetch.add_child(key);
                expr = fetch;
                next = close + 1;
            }
        }
        (expr, next)
    }

    /// `{$expr}` inside a double-quoted string
    fn parse_embedded(&mut self, code: &str, span: Span) -> Result<AstNode> {
        let tokens = PhpLexer::new().tokenize_code(code)?;
        let mut sub = Parser::new(&tokens);
        sub.next_id = self.next_id;
        sub.span_override = Some(span);
        let expr = sub.parse_expression()?;
        if !sub.at_end() {
            return Err(PreprocessError::Parse {
                line: span.start.line,
                column: span.start.column,
                message: format!("unexpected '{}' in string interpolation", code),
            });
        }
        self.next_id = sub.next_id;
        Ok(expr)
    }
}

#[derive(Debug, Clone, Copy)]
enum ArrayStyle {
    Short,
    Long,
    List,
}

impl ArrayStyle {
    fn as_str(self) -> &'static str {
        match self {
            ArrayStyle::Short => "short",
            ArrayStyle::Long => "long",
            ArrayStyle::List => "list",
        }
    }
}

fn is_assignable(node: &AstNode) -> bool {
    matches!(
        node.node_type,
        AstNodeType::Variable
            | AstNodeType::PropertyFetch
            | AstNodeType::StaticPropertyFetch
            | AstNodeType::ArrayDimFetch
    )
}

const CAST_TYPES: &[&str] = &[
    "int", "integer", "float", "double", "string", "bool", "boolean", "array", "object",
];

fn normalize_cast(raw: &str) -> String {
    let inner = raw.to_ascii_lowercase();
    match inner.as_str() {
        "integer" => "int".to_string(),
        "boolean" => "bool".to_string(),
        "double" => "float".to_string(),
        _ => inner,
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn scan_name(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] >= 0x80) {
        end += 1;
    }
    end
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, b) in bytes[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::PhpLexer;

    fn parse(code: &str) -> AstNode {
        let tokens = PhpLexer::new().tokenize(code).unwrap();
        parse_module(&tokens).unwrap().0
    }

    fn first_expression(code: &str) -> AstNode {
        let module = parse(code);
        let statement = module.children[0].clone();
        assert_eq!(statement.node_type, AstNodeType::ExpressionStatement);
        (*statement.children[0]).clone()
    }

    #[test]
    fn test_method_call_chain() {
        let expr = first_expression("<?php $this->getLogger()->debug('x');");
        assert_eq!(expr.node_type, AstNodeType::MethodCall);
        assert_eq!(expr.children[1].text(), "debug");
        let receiver = &expr.children[0];
        assert_eq!(receiver.node_type, AstNodeType::MethodCall);
        assert_eq!(receiver.children[0].text(), "this");
    }

    #[test]
    fn test_concat_binds_looser_than_plus() {
        let expr = first_expression("<?php 'a' . 1 + 2;");
        assert_eq!(expr.node_type, AstNodeType::Binary);
        assert_eq!(expr.text(), ".");
        assert_eq!(expr.children[1].text(), "+");
    }

    #[test]
    fn test_power_is_right_associative_and_tighter_than_unary() {
        let expr = first_expression("<?php -2 ** 3 ** 2;");
        assert_eq!(expr.node_type, AstNodeType::Unary);
        let power = &expr.children[0];
        assert_eq!(power.text(), "**");
        assert_eq!(power.children[1].text(), "**");
    }

    #[test]
    fn test_class_structure() {
        let module = parse(
            "<?php\nfinal class A extends B implements C, D {\n    /** @var int */\n    private $x = 1;\n    public function f(?int $a, &...$rest) : void {}\n}\n",
        );
        let class = &module.children[0];
        assert_eq!(class.node_type, AstNodeType::ClassDeclaration);
        assert!(class.has_modifier("final"));
        assert_eq!(class.children[1].text(), "B");
        assert_eq!(class.children[2].children.len(), 2);

        let body = &class.children[3];
        let property = &body.children[0];
        assert_eq!(property.node_type, AstNodeType::Property);
        assert_eq!(property.get_attribute("doc_comment").map(String::as_str), Some("/** @var int */"));
        assert!(property.children[1].is_empty_slot());

        let method = &body.children[1];
        let params = method.parameters();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].children[1].text(), "?int");
        assert!(params[1].has_flag("variadic"));
        assert!(params[1].has_flag("by_ref"));
        assert_eq!(method.children[2].text(), "void");
    }

    #[test]
    fn test_interpolated_string_parts() {
        let expr = first_expression("<?php \"Logging from {$this->getName()} and $a[0]\";");
        assert_eq!(expr.node_type, AstNodeType::InterpolatedString);
        let kinds: Vec<_> = expr.children.iter().map(|c| c.node_type).collect();
        assert_eq!(
            kinds,
            vec![
                AstNodeType::StringFragment,
                AstNodeType::MethodCall,
                AstNodeType::StringFragment,
                AstNodeType::ArrayDimFetch,
            ]
        );
        assert!(expr.children.iter().all(|c| c.span == expr.span));
    }

    #[test]
    fn test_ids_are_unique() {
        let module = parse("<?php foreach ($a as $k => $v) { echo \"{$v}\"; }");
        let mut ids = Vec::new();
        fn collect(node: &AstNode, ids: &mut Vec<NodeId>) {
            ids.extend(node.id);
            for child in &node.children {
                collect(child, ids);
            }
        }
        collect(&module, &mut ids);
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert_eq!(count, module.count_nodes());
    }

    #[test]
    fn test_spans_exclude_surrounding_trivia() {
        let code = "<?php\n\n  $a = 1; // trailing\n";
        let tokens = PhpLexer::new().tokenize(code).unwrap();
        let module = parse_module(&tokens).unwrap().0;
        let statement = &module.children[0];
        let text: String = tokens[statement.span.tokens.start..statement.span.tokens.end]
            .iter()
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(text, "$a = 1;");
        assert_eq!(statement.line(), 3);
    }

    #[test]
    fn test_statement_forms() {
        let module = parse(
            "<?php\nnamespace App;\nuse function cos;\nuse Foo\\Bar as Baz;\nfor ($i = 0; $i < 3; ++$i) { list($a, , $b) = $x; }\ntry { f(); } catch (A|B $e) { } finally { }\nif ($a) { } elseif ($b) { } else { }\nyield $k => $v;\n",
        );
        let kinds: Vec<_> = module.children.iter().map(|c| c.node_type).collect();
        assert_eq!(
            kinds,
            vec![
                AstNodeType::Namespace,
                AstNodeType::Use,
                AstNodeType::Use,
                AstNodeType::For,
                AstNodeType::Try,
                AstNodeType::If,
                AstNodeType::ExpressionStatement,
            ]
        );
        assert_eq!(module.children[1].text(), "function");
        assert_eq!(module.children[2].children[0].get_attribute("alias").map(String::as_str), Some("Baz"));
        let yield_expr = &module.children[6].children[0];
        assert_eq!(yield_expr.node_type, AstNodeType::Yield);
        assert_eq!(yield_expr.children[0].text(), "k");
    }

    #[test]
    fn test_syntax_error_position() {
        let tokens = PhpLexer::new().tokenize("<?php\n$a = ;").unwrap();
        let err = parse_module(&tokens).unwrap_err();
        assert!(matches!(err, PreprocessError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_casts_come_from_parenthesized_type_names() {
        let expr = first_expression("<?php (INTEGER) $a + (string)$b;");
        assert_eq!(expr.node_type, AstNodeType::Binary);
        assert_eq!(expr.children[0].node_type, AstNodeType::Cast);
        assert_eq!(expr.children[0].text(), "int");
        assert_eq!(expr.children[1].text(), "string");

        let expr = first_expression("<?php (INT_MAX) + 1;");
        assert_eq!(expr.children[0].node_type, AstNodeType::ConstFetch);
    }

    #[test]
    fn test_switch_do_while_and_static_vars() {
        let module = parse(
            "<?php\nfunction f($a) {\n    static $n = 0, $m;\n    switch ($a) {\n        case 1:\n        case 2;\n            $n++;\n            break;\n        default:\n            return;\n    }\n    do { $n--; } while ($n > 0);\n}\n",
        );
        let body = &module.children[0].children[2];
        let kinds: Vec<_> = body.children.iter().map(|c| c.node_type).collect();
        assert_eq!(kinds, vec![AstNodeType::StaticVars, AstNodeType::Switch, AstNodeType::DoWhile]);

        let statics = &body.children[0];
        assert_eq!(statics.children[0].text(), "n");
        assert_eq!(statics.children[0].children[0].text(), "0");
        assert!(statics.children[1].children[0].is_empty_slot());

        let cases = &body.children[1].children[1];
        assert_eq!(cases.node_type, AstNodeType::CaseList);
        assert_eq!(cases.children.len(), 3);
        assert!(cases.children[0].children[1].children.is_empty());
        assert_eq!(cases.children[1].children[1].children.len(), 2);
        assert!(cases.children[2].children[0].is_empty_slot());

        let do_while = &body.children[2];
        assert_eq!(do_while.children[0].node_type, AstNodeType::Block);
        assert_eq!(do_while.children[1].text(), ">");
    }

    #[test]
    fn test_match_arms() {
        let expr = first_expression("<?php match ($a) { 1, 2, => 'low', default => 'high', };");
        assert_eq!(expr.node_type, AstNodeType::Match);
        let arms = &expr.children[1];
        assert_eq!(arms.children.len(), 2);
        assert_eq!(arms.children[0].children[0].children.len(), 2);
        assert!(arms.children[1].children[0].is_empty_slot());
        assert_eq!(arms.children[1].children[1].text(), "'high'");
    }

    #[test]
    fn test_heredoc_is_a_string_literal() {
        let expr = first_expression("<?php <<<EOT\nHi $name\nEOT;");
        assert_eq!(expr.node_type, AstNodeType::StringLiteral);
        assert!(expr.has_flag("heredoc"));
        assert_eq!(expr.text(), "<<<EOT\nHi $name\nEOT");
    }
}
