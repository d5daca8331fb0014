//! Recursive descent parser for the build description language.
//!
//! Precedence, lowest first: assignment, ternary, logical-or, logical-and,
//! equality, comparison (including `in` / `not in`), additive,
//! multiplicative, unary, postfix (call / method call / index), atom.
//! Assignment and ternary bind to the right, everything else to the left.
//!
//! The parser makes no attempt at recovery: the first unexpected token
//! fails the whole parse with a position-tagged error.

use std::path::{Path, PathBuf};

use super::ast::{Args, BinOp, Node, NodeKind};
use super::lexer::{Lexer, Token, TokenKind};
use super::Span;
use crate::error::{ConfigureError, Result};

/// Parse one build definition file into a code block.
pub fn parse(src: &str, file: impl AsRef<Path>) -> Result<Node> {
    let file = file.as_ref();
    let tokens = Lexer::tokenize(src, file)?;
    Parser::new(tokens, file).parse_root()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
}

impl Parser {
    fn new(tokens: Vec<Token>, file: &Path) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: file.to_path_buf(),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected {}, got {}",
                kind.describe(),
                self.peek().kind.describe()
            )))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ConfigureError {
        let span = self.peek().span;
        ConfigureError::parse(&self.file, span.line, span.column, message)
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> ConfigureError {
        ConfigureError::parse(&self.file, span.line, span.column, message)
    }

    fn parse_root(&mut self) -> Result<Node> {
        let block = self.parse_codeblock(&[TokenKind::Eof])?;
        self.expect(TokenKind::Eof)?;
        Ok(block)
    }

    /// Parse statements until one of the terminator tokens is next.
    fn parse_codeblock(&mut self, terminators: &[TokenKind]) -> Result<Node> {
        let start_span = self.peek().span;
        let mut statements = Vec::new();
        loop {
            while self.eat(&TokenKind::Eol) {}
            if terminators.iter().any(|t| self.check(t)) {
                break;
            }
            if self.check(&TokenKind::Eof) {
                // Hitting end of file while looking for 'endif' or
                // 'endforeach' is a parse error at the current position.
                return Err(self.error_here(format!(
                    "expected {}, got end of file",
                    terminators[0].describe()
                )));
            }
            let stmt = self.parse_statement()?;
            statements.push(stmt);
            if !terminators.iter().any(|t| self.check(t)) && !self.check(&TokenKind::Eof) {
                self.expect(TokenKind::Eol)?;
            }
        }
        let end = statements.last().map(|s| s.span.end).unwrap_or(start_span.start);
        Ok(Node::new(
            Span::new(start_span.line, start_span.column, start_span.start, end),
            NodeKind::CodeBlock(statements),
        ))
    }

    fn parse_statement(&mut self) -> Result<Node> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Continue => {
                let tok = self.advance();
                Ok(Node::new(tok.span, NodeKind::Continue))
            }
            TokenKind::Break => {
                let tok = self.advance();
                Ok(Node::new(tok.span, NodeKind::Break))
            }
            _ => self.parse_expression(),
        }
    }

    fn parse_if(&mut self) -> Result<Node> {
        let if_tok = self.expect(TokenKind::If)?;
        let mut branches = Vec::new();
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Eol)?;
        let block = self.parse_codeblock(&[TokenKind::Elif, TokenKind::Else, TokenKind::Endif])?;
        branches.push((condition, block));
        while self.eat(&TokenKind::Elif) {
            let condition = self.parse_expression()?;
            self.expect(TokenKind::Eol)?;
            let block =
                self.parse_codeblock(&[TokenKind::Elif, TokenKind::Else, TokenKind::Endif])?;
            branches.push((condition, block));
        }
        let else_block = if self.eat(&TokenKind::Else) {
            self.expect(TokenKind::Eol)?;
            Some(Box::new(self.parse_codeblock(&[TokenKind::Endif])?))
        } else {
            None
        };
        let end_tok = self.expect(TokenKind::Endif)?;
        Ok(Node::new(
            Span::new(
                if_tok.span.line,
                if_tok.span.column,
                if_tok.span.start,
                end_tok.span.end,
            ),
            NodeKind::If {
                branches,
                else_block,
            },
        ))
    }

    fn parse_foreach(&mut self) -> Result<Node> {
        let foreach_tok = self.expect(TokenKind::Foreach)?;
        let mut variables = Vec::new();
        variables.push(self.expect_identifier()?);
        if self.eat(&TokenKind::Comma) {
            variables.push(self.expect_identifier()?);
        }
        self.expect(TokenKind::Colon)?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::Eol)?;
        let body = self.parse_codeblock(&[TokenKind::Endforeach])?;
        let end_tok = self.expect(TokenKind::Endforeach)?;
        Ok(Node::new(
            Span::new(
                foreach_tok.span.line,
                foreach_tok.span.column,
                foreach_tok.span.start,
                end_tok.span.end,
            ),
            NodeKind::Foreach {
                variables,
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
        ))
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!(
                "expected identifier, got {}",
                other.describe()
            ))),
        }
    }

    fn parse_expression(&mut self) -> Result<Node> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek().kind {
            TokenKind::Assign => Some(false),
            TokenKind::PlusAssign => Some(true),
            _ => None,
        };
        if let Some(plus) = op {
            let name = match &lhs.kind {
                NodeKind::Id(name) => name.clone(),
                _ => {
                    return Err(
                        self.error_at(lhs.span, "assignment target must be an identifier")
                    );
                }
            };
            self.advance();
            let value = self.parse_expression()?;
            let span = Span::new(
                lhs.span.line,
                lhs.span.column,
                lhs.span.start,
                value.span.end,
            );
            let kind = if plus {
                NodeKind::PlusAssign {
                    name,
                    value: Box::new(value),
                }
            } else {
                NodeKind::Assign {
                    name,
                    value: Box::new(value),
                }
            };
            return Ok(Node::new(span, kind));
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> Result<Node> {
        let condition = self.parse_or()?;
        if self.eat(&TokenKind::Question) {
            let then = self.parse_ternary()?;
            self.expect(TokenKind::Colon)?;
            let otherwise = self.parse_ternary()?;
            let span = Span::new(
                condition.span.line,
                condition.span.column,
                condition.span.start,
                otherwise.span.end,
            );
            return Ok(Node::new(
                span,
                NodeKind::Ternary {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
            ));
        }
        Ok(condition)
    }

    fn binop(&self, lhs: Node, op: BinOp, rhs: Node) -> Node {
        let span = Span::new(
            lhs.span.line,
            lhs.span.column,
            lhs.span.start,
            rhs.span.end,
        );
        Node::new(
            span,
            NodeKind::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = self.binop(lhs, BinOp::Or, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_equality()?;
            lhs = self.binop(lhs, BinOp::And, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Node> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinOp::Eq,
                TokenKind::NotEqual => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = self.binop(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::In => BinOp::In,
                TokenKind::Not => {
                    // 'not' at infix position is only valid as 'not in'.
                    self.advance();
                    self.expect(TokenKind::In)?;
                    let rhs = self.parse_additive()?;
                    lhs = self.binop(lhs, BinOp::NotIn, rhs);
                    continue;
                }
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = self.binop(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Node> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.binop(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Node> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.binop(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        match self.peek().kind {
            TokenKind::Not => {
                let tok = self.advance();
                let operand = self.parse_unary()?;
                let span = Span::new(
                    tok.span.line,
                    tok.span.column,
                    tok.span.start,
                    operand.span.end,
                );
                Ok(Node::new(span, NodeKind::Not(Box::new(operand))))
            }
            TokenKind::Minus => {
                let tok = self.advance();
                let operand = self.parse_unary()?;
                let span = Span::new(
                    tok.span.line,
                    tok.span.column,
                    tok.span.start,
                    operand.span.end,
                );
                Ok(Node::new(span, NodeKind::Neg(Box::new(operand))))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Node> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_identifier()?;
                self.expect(TokenKind::LParen)?;
                let args = self.parse_args()?;
                let close = self.expect(TokenKind::RParen)?;
                let span = Span::new(
                    expr.span.line,
                    expr.span.column,
                    expr.span.start,
                    close.span.end,
                );
                expr = Node::new(
                    span,
                    NodeKind::MethodCall {
                        object: Box::new(expr),
                        name,
                        args,
                    },
                );
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let close = self.expect(TokenKind::RBracket)?;
                let span = Span::new(
                    expr.span.line,
                    expr.span.column,
                    expr.span.start,
                    close.span.end,
                );
                expr = Node::new(
                    span,
                    NodeKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Node> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::True => {
                self.advance();
                Ok(Node::new(tok.span, NodeKind::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Node::new(tok.span, NodeKind::Bool(false)))
            }
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Node::new(tok.span, NodeKind::Int(value)))
            }
            TokenKind::Str(value) | TokenKind::MultilineStr(value) => {
                self.advance();
                Ok(Node::new(tok.span, NodeKind::Str(value)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    let close = self.expect(TokenKind::RParen)?;
                    let span = Span::new(
                        tok.span.line,
                        tok.span.column,
                        tok.span.start,
                        close.span.end,
                    );
                    Ok(Node::new(span, NodeKind::FunctionCall { name, args }))
                } else {
                    Ok(Node::new(tok.span, NodeKind::Id(name)))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let close = self.expect(TokenKind::RBracket)?;
                let span = Span::new(
                    tok.span.line,
                    tok.span.column,
                    tok.span.start,
                    close.span.end,
                );
                Ok(Node::new(span, NodeKind::Array(elements)))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    let key = self.parse_expression()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let close = self.expect(TokenKind::RBrace)?;
                let span = Span::new(
                    tok.span.line,
                    tok.span.column,
                    tok.span.start,
                    close.span.end,
                );
                Ok(Node::new(span, NodeKind::Dict(entries)))
            }
            other => Err(self.error_here(format!(
                "expected an expression, got {}",
                other.describe()
            ))),
        }
    }

    /// Parse an argument list up to (not including) the closing paren.
    /// Keyword arguments must all come after every positional argument.
    fn parse_args(&mut self) -> Result<Args> {
        let list_span = self.peek().span;
        let mut args = Args {
            span: list_span,
            positional: Vec::new(),
            keywords: Vec::new(),
        };
        while !self.check(&TokenKind::RParen) {
            let is_keyword = matches!(self.peek().kind, TokenKind::Identifier(_))
                && matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::Colon)
                );
            if is_keyword {
                let name = self.expect_identifier()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expression()?;
                args.keywords.push((name, value));
            } else {
                if !args.keywords.is_empty() {
                    return Err(self.error_at(
                        list_span,
                        "positional argument after keyword argument",
                    ));
                }
                args.positional.push(self.parse_expression()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Node {
        parse(src, "test.build").unwrap()
    }

    fn statements(node: &Node) -> &[Node] {
        match &node.kind {
            NodeKind::CodeBlock(stmts) => stmts,
            other => panic!("expected code block, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_function_call() {
        let root = parse_ok("project('demo', 'c')\n");
        let stmts = statements(&root);
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            NodeKind::FunctionCall { name, args } => {
                assert_eq!(name, "project");
                assert_eq!(args.positional.len(), 2);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let root = parse_ok("x = true or false and false\n");
        let stmts = statements(&root);
        match &stmts[0].kind {
            NodeKind::Assign { value, .. } => match &value.kind {
                NodeKind::BinOp { op, rhs, .. } => {
                    assert_eq!(*op, BinOp::Or);
                    assert!(matches!(
                        rhs.kind,
                        NodeKind::BinOp { op: BinOp::And, .. }
                    ));
                }
                other => panic!("unexpected rhs {other:?}"),
            },
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_arith_precedence() {
        let root = parse_ok("x = 1 + 2 * 3\n");
        match &statements(&root)[0].kind {
            NodeKind::Assign { value, .. } => {
                assert!(matches!(
                    value.kind,
                    NodeKind::BinOp { op: BinOp::Add, .. }
                ));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_not_in() {
        let root = parse_ok("x = 'a' not in ['b']\n");
        match &statements(&root)[0].kind {
            NodeKind::Assign { value, .. } => {
                assert!(matches!(
                    value.kind,
                    NodeKind::BinOp {
                        op: BinOp::NotIn,
                        ..
                    }
                ));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_keyword_before_positional_is_parse_error() {
        let err = parse("executable(name: 'x', 'main.c')\n", "f.build").unwrap_err();
        assert!(err
            .to_string()
            .contains("positional argument after keyword argument"));
    }

    #[test]
    fn test_method_call_chain_and_index() {
        let root = parse_ok("x = conf.get('name').split(' ')[0]\n");
        match &statements(&root)[0].kind {
            NodeKind::Assign { value, .. } => {
                assert!(matches!(value.kind, NodeKind::Index { .. }));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let root = parse_ok("if a\n x = 1\nelif b\n x = 2\nelse\n x = 3\nendif\n");
        match &statements(&root)[0].kind {
            NodeKind::If {
                branches,
                else_block,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(else_block.is_some());
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_foreach_two_variables() {
        let root = parse_ok("foreach key, value : mapping\n x = key\nendforeach\n");
        match &statements(&root)[0].kind {
            NodeKind::Foreach { variables, .. } => {
                assert_eq!(variables, &["key".to_string(), "value".to_string()]);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_ternary_right_associative() {
        let root = parse_ok("x = a ? 1 : b ? 2 : 3\n");
        match &statements(&root)[0].kind {
            NodeKind::Assign { value, .. } => match &value.kind {
                NodeKind::Ternary { otherwise, .. } => {
                    assert!(matches!(otherwise.kind, NodeKind::Ternary { .. }));
                }
                other => panic!("unexpected value {other:?}"),
            },
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_if_is_parse_error() {
        assert!(parse("if a\n x = 1\n", "f.build").is_err());
    }

    #[test]
    fn test_preorder_offsets_non_decreasing() {
        fn walk(node: &Node, last: &mut usize) {
            assert!(node.span.start >= *last || node.span.start == node.span.end);
            *last = (*last).max(node.span.start);
            match &node.kind {
                NodeKind::Array(items) => items.iter().for_each(|n| walk(n, last)),
                NodeKind::Dict(entries) => entries.iter().for_each(|(k, v)| {
                    walk(k, last);
                    walk(v, last);
                }),
                NodeKind::Not(n) | NodeKind::Neg(n) => walk(n, last),
                NodeKind::BinOp { lhs, rhs, .. } => {
                    walk(lhs, last);
                    walk(rhs, last);
                }
                NodeKind::Index { object, index } => {
                    walk(object, last);
                    walk(index, last);
                }
                NodeKind::FunctionCall { args, .. } => {
                    args.positional.iter().for_each(|n| walk(n, last));
                    args.keywords.iter().for_each(|(_, n)| walk(n, last));
                }
                NodeKind::MethodCall { object, args, .. } => {
                    walk(object, last);
                    args.positional.iter().for_each(|n| walk(n, last));
                    args.keywords.iter().for_each(|(_, n)| walk(n, last));
                }
                NodeKind::Assign { value, .. } | NodeKind::PlusAssign { value, .. } => {
                    walk(value, last)
                }
                NodeKind::Ternary {
                    condition,
                    then,
                    otherwise,
                } => {
                    walk(condition, last);
                    walk(then, last);
                    walk(otherwise, last);
                }
                NodeKind::If {
                    branches,
                    else_block,
                } => {
                    for (c, b) in branches {
                        walk(c, last);
                        walk(b, last);
                    }
                    if let Some(e) = else_block {
                        walk(e, last);
                    }
                }
                NodeKind::Foreach {
                    iterable, body, ..
                } => {
                    walk(iterable, last);
                    walk(body, last);
                }
                NodeKind::CodeBlock(stmts) => stmts.iter().for_each(|n| walk(n, last)),
                _ => {}
            }
        }
        let src = "project('p', 'c')\nif true\n  lib = static_library('l', 'l.c')\n  e = executable('e', 'e.c', link_with : lib)\nendif\n";
        let root = parse(src, "f.build").unwrap();
        let mut last = 0;
        walk(&root, &mut last);
    }
}
