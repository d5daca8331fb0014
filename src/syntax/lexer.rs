//! Token stream for the build description language.
//!
//! The lexer consumes the full text of one source file and yields a lazy,
//! finite sequence of tokens ending in `Eof`. Newlines are significant
//! (they terminate statements) except while any parenthesis, bracket, or
//! brace is open, and a backslash immediately before a newline joins the
//! physical lines into one logical line.

use std::path::PathBuf;

use super::Span;
use crate::error::{ConfigureError, Result};

/// What a token is, with its payload where one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    /// Single-quoted string, escapes already resolved.
    Str(String),
    /// Triple-quoted string, taken verbatim.
    MultilineStr(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
    Assign,
    PlusAssign,
    EqualEqual,
    NotEqual,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    True,
    False,
    If,
    Elif,
    Else,
    Endif,
    Foreach,
    Endforeach,
    And,
    Or,
    Not,
    In,
    Continue,
    Break,

    Eol,
    Eof,
}

impl TokenKind {
    /// Short name used in "expected X, got Y" diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::Integer(v) => format!("integer {v}"),
            TokenKind::Str(_) | TokenKind::MultilineStr(_) => "string".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Question => "'?'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::PlusAssign => "'+='".to_string(),
            TokenKind::EqualEqual => "'=='".to_string(),
            TokenKind::NotEqual => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Percent => "'%'".to_string(),
            TokenKind::True => "'true'".to_string(),
            TokenKind::False => "'false'".to_string(),
            TokenKind::If => "'if'".to_string(),
            TokenKind::Elif => "'elif'".to_string(),
            TokenKind::Else => "'else'".to_string(),
            TokenKind::Endif => "'endif'".to_string(),
            TokenKind::Foreach => "'foreach'".to_string(),
            TokenKind::Endforeach => "'endforeach'".to_string(),
            TokenKind::And => "'and'".to_string(),
            TokenKind::Or => "'or'".to_string(),
            TokenKind::Not => "'not'".to_string(),
            TokenKind::In => "'in'".to_string(),
            TokenKind::Continue => "'continue'".to_string(),
            TokenKind::Break => "'break'".to_string(),
            TokenKind::Eol => "end of line".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

/// One lexed token with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "endif" => TokenKind::Endif,
        "foreach" => TokenKind::Foreach,
        "endforeach" => TokenKind::Endforeach,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "continue" => TokenKind::Continue,
        "break" => TokenKind::Break,
        _ => return None,
    })
}

/// Streaming lexer over one source file.
pub struct Lexer<'a> {
    src: &'a str,
    file: PathBuf,
    pos: usize,
    line: u32,
    column: u32,
    bracket_depth: u32,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file: impl Into<PathBuf>) -> Self {
        let mut lexer = Lexer {
            src,
            file: file.into(),
            pos: 0,
            line: 1,
            column: 1,
            bracket_depth: 0,
            finished: false,
        };
        // A UTF-8 byte order mark is tolerated but never part of a token.
        if lexer.src[lexer.pos..].starts_with('\u{feff}') {
            lexer.pos += '\u{feff}'.len_utf8();
        }
        lexer
    }

    /// Lex the whole input eagerly.
    pub fn tokenize(src: &'a str, file: impl Into<PathBuf>) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        for tok in Lexer::new(src, file) {
            tokens.push(tok?);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: u32, column: u32, message: impl Into<String>) -> ConfigureError {
        ConfigureError::lex(&self.file, line, column, message)
    }

    /// Consume whitespace, comments, line continuations, and newlines that
    /// are suppressed by an open bracket.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                Some('\\') if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.bump();
                    self.bump();
                    self.bump();
                }
                Some('\n') if self.bracket_depth > 0 => {
                    self.bump();
                }
                _ => return,
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let kind = keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        Token {
            kind,
            span: Span::new(line, column, start, self.pos),
        }
    }

    fn lex_integer(&mut self) -> Result<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let value = text
            .parse::<i64>()
            .map_err(|_| self.error(line, column, format!("integer literal '{text}' out of range")))?;
        Ok(Token {
            kind: TokenKind::Integer(value),
            span: Span::new(line, column, start, self.pos),
        })
    }

    fn lex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;

        if self.src[self.pos..].starts_with("'''") {
            return self.lex_multiline_string(start, line, column);
        }

        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error(line, column, "unterminated string"));
                }
                Some('\'') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error(line, column, "unterminated string"))?;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '0' => value.push('\0'),
                        'x' => value.push(self.hex_escape(2, line, column)?),
                        'u' => value.push(self.hex_escape(4, line, column)?),
                        'U' => value.push(self.hex_escape(8, line, column)?),
                        other => {
                            return Err(self.error(
                                line,
                                column,
                                format!("unknown escape sequence '\\{other}'"),
                            ));
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Str(value),
            span: Span::new(line, column, start, self.pos),
        })
    }

    fn hex_escape(&mut self, digits: usize, line: u32, column: u32) -> Result<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let c = self
                .peek()
                .filter(|c| c.is_ascii_hexdigit())
                .ok_or_else(|| self.error(line, column, "invalid hex escape in string"))?;
            code = code * 16 + c.to_digit(16).unwrap();
            self.bump();
        }
        char::from_u32(code)
            .ok_or_else(|| self.error(line, column, "escape does not name a valid character"))
    }

    fn lex_multiline_string(&mut self, start: usize, line: u32, column: u32) -> Result<Token> {
        for _ in 0..3 {
            self.bump();
        }
        let content_start = self.pos;
        loop {
            if self.src[self.pos..].starts_with("'''") {
                let value = self.src[content_start..self.pos].to_string();
                for _ in 0..3 {
                    self.bump();
                }
                return Ok(Token {
                    kind: TokenKind::MultilineStr(value),
                    span: Span::new(line, column, start, self.pos),
                });
            }
            if self.bump().is_none() {
                return Err(self.error(line, column, "unterminated string"));
            }
        }
    }

    fn punct(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        for _ in 0..len {
            self.bump();
        }
        Token {
            kind,
            span: Span::new(line, column, start, self.pos),
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();

        let c = match self.peek() {
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(self.line, self.column, self.pos, self.pos),
                });
            }
            Some(c) => c,
        };

        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.lex_identifier());
        }
        if c.is_ascii_digit() {
            return self.lex_integer();
        }

        match c {
            '\n' => {
                let tok = self.punct(TokenKind::Eol, 1);
                Ok(tok)
            }
            '\'' => self.lex_string(),
            '(' => {
                self.bracket_depth += 1;
                Ok(self.punct(TokenKind::LParen, 1))
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Ok(self.punct(TokenKind::RParen, 1))
            }
            '[' => {
                self.bracket_depth += 1;
                Ok(self.punct(TokenKind::LBracket, 1))
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Ok(self.punct(TokenKind::RBracket, 1))
            }
            '{' => {
                self.bracket_depth += 1;
                Ok(self.punct(TokenKind::LBrace, 1))
            }
            '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Ok(self.punct(TokenKind::RBrace, 1))
            }
            ',' => Ok(self.punct(TokenKind::Comma, 1)),
            '.' => Ok(self.punct(TokenKind::Dot, 1)),
            ':' => Ok(self.punct(TokenKind::Colon, 1)),
            '?' => Ok(self.punct(TokenKind::Question, 1)),
            '=' if self.peek_at(1) == Some('=') => Ok(self.punct(TokenKind::EqualEqual, 2)),
            '=' => Ok(self.punct(TokenKind::Assign, 1)),
            '!' if self.peek_at(1) == Some('=') => Ok(self.punct(TokenKind::NotEqual, 2)),
            '<' if self.peek_at(1) == Some('=') => Ok(self.punct(TokenKind::Le, 2)),
            '<' => Ok(self.punct(TokenKind::Lt, 1)),
            '>' if self.peek_at(1) == Some('=') => Ok(self.punct(TokenKind::Ge, 2)),
            '>' => Ok(self.punct(TokenKind::Gt, 1)),
            '+' if self.peek_at(1) == Some('=') => Ok(self.punct(TokenKind::PlusAssign, 2)),
            '+' => Ok(self.punct(TokenKind::Plus, 1)),
            '-' => Ok(self.punct(TokenKind::Minus, 1)),
            '*' => Ok(self.punct(TokenKind::Star, 1)),
            '/' => Ok(self.punct(TokenKind::Slash, 1)),
            '%' => Ok(self.punct(TokenKind::Percent, 1)),
            other => Err(self.error(
                self.line,
                self.column,
                format!("unexpected character '{other}'"),
            )),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tok = self.next_token();
        match &tok {
            Ok(t) if t.kind == TokenKind::Eof => self.finished = true,
            Err(_) => self.finished = true,
            _ => {}
        }
        Some(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src, "test.build")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        let toks = kinds("x = 3\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Assign,
                TokenKind::Integer(3),
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_reclassified() {
        let toks = kinds("if true and not false\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::If,
                TokenKind::True,
                TokenKind::And,
                TokenKind::Not,
                TokenKind::False,
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let toks = kinds(r"s = 'a\n\t\\\'\x41B'");
        assert_eq!(toks[2], TokenKind::Str("a\n\t\\'AB".to_string()));
    }

    #[test]
    fn test_unknown_escape_is_error() {
        let err = Lexer::tokenize(r"s = 'bad\q'", "f.build").unwrap_err();
        assert!(err.to_string().contains("unknown escape"));
        // The error points at the opening quote.
        assert!(err.to_string().contains("1:5"));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(Lexer::tokenize("s = 'oops\n", "f.build").is_err());
    }

    #[test]
    fn test_multiline_string_verbatim() {
        let toks = kinds("s = '''no \\n escapes\nhere'''\n");
        assert_eq!(
            toks[2],
            TokenKind::MultilineStr("no \\n escapes\nhere".to_string())
        );
    }

    #[test]
    fn test_newline_suppression_inside_brackets() {
        let toks = kinds("f(\n  'a',\n  'b',\n)\n");
        assert!(!toks[..toks.len() - 2].contains(&TokenKind::Eol));
    }

    #[test]
    fn test_line_continuation() {
        let toks = kinds("a = 1 + \\\n2\n");
        let eols = toks.iter().filter(|k| **k == TokenKind::Eol).count();
        assert_eq!(eols, 1);
    }

    #[test]
    fn test_comments_are_dropped() {
        let toks = kinds("a = 1 # a comment = with tokens\n");
        assert_eq!(toks.len(), 5);
    }

    #[test]
    fn test_bom_is_skipped() {
        let toks = kinds("\u{feff}x = 1\n");
        assert_eq!(toks[0], TokenKind::Identifier("x".to_string()));
    }

    #[test]
    fn test_spans_relex_to_same_token() {
        let src = "project('demo', 'c')\nval = 1 <= 2 ? 'a' : 'b'\n";
        let tokens = Lexer::tokenize(src, "f.build").unwrap();
        for tok in &tokens {
            if tok.kind == TokenKind::Eof || tok.kind == TokenKind::Eol {
                continue;
            }
            let slice = &src[tok.span.start..tok.span.end];
            let relexed = Lexer::tokenize(slice, "f.build").unwrap();
            assert_eq!(relexed[0].kind, tok.kind, "span {slice:?} did not round-trip");
        }
    }

    #[test]
    fn test_fused_after_eof() {
        let mut lexer = Lexer::new("x\n", "f.build");
        while let Some(t) = lexer.next() {
            t.unwrap();
        }
        assert!(lexer.next().is_none());
    }
}
