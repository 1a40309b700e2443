//! Hand-written scanner for SwiftScript source text.
//!
//! Whitespace and comments are skipped; statements self-delimit, with
//! optional semicolons. String literals carry their interpolation
//! segments (`"\(expr)"`) as raw source text for the parser to re-parse.

use crate::codegen::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum StringSegment {
    Text(String),
    /// Raw source of an interpolated expression.
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,

    // literals
    Int(i64),
    Float(f64),
    Str(Vec<StringSegment>),
    Ident(String),

    // keywords
    Func,
    Class,
    Struct,
    Enum,
    Protocol,
    Extension,
    Var,
    Let,
    Weak,
    Unowned,
    Nil,
    Guard,
    If,
    Else,
    Switch,
    Case,
    Default,
    For,
    While,
    Repeat,
    Break,
    Continue,
    Return,
    In,
    Import,
    Static,
    Override,
    Init,
    Deinit,
    SelfKw,
    Super,
    True,
    False,
    Throw,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    AndAnd,
    OrOr,
    Bang,
    Tilde,
    Question,
    QuestionQuestion,
    QuestionDot,
    Colon,
    Arrow,

    // delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,

    // ranges
    DotDot,
    DotDotDot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    source: &'a [u8],
    current: usize,
    line: u32,
    column: u32,
    token_line: u32,
    token_column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            source: source.as_bytes(),
            current: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
        }
    }

    pub fn tokenize_all(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace()?;
        self.token_line = self.line;
        self.token_column = self.column;

        if self.is_at_end() {
            return Ok(self.make(TokenKind::Eof));
        }

        let c = self.advance();
        match c {
            b'(' => Ok(self.make(TokenKind::LParen)),
            b')' => Ok(self.make(TokenKind::RParen)),
            b'{' => Ok(self.make(TokenKind::LBrace)),
            b'}' => Ok(self.make(TokenKind::RBrace)),
            b'[' => Ok(self.make(TokenKind::LBracket)),
            b']' => Ok(self.make(TokenKind::RBracket)),
            b',' => Ok(self.make(TokenKind::Comma)),
            b';' => Ok(self.make(TokenKind::Semicolon)),
            b':' => Ok(self.make(TokenKind::Colon)),
            b'~' => Ok(self.make(TokenKind::Tilde)),
            b'%' => Ok(self.make(TokenKind::Percent)),
            b'+' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::PlusEqual))
                } else {
                    Ok(self.make(TokenKind::Plus))
                }
            }
            b'-' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::MinusEqual))
                } else if self.match_byte(b'>') {
                    Ok(self.make(TokenKind::Arrow))
                } else {
                    Ok(self.make(TokenKind::Minus))
                }
            }
            b'*' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::StarEqual))
                } else {
                    Ok(self.make(TokenKind::Star))
                }
            }
            b'/' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::SlashEqual))
                } else {
                    Ok(self.make(TokenKind::Slash))
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::EqualEqual))
                } else {
                    Ok(self.make(TokenKind::Equal))
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::NotEqual))
                } else {
                    Ok(self.make(TokenKind::Bang))
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::LessEqual))
                } else {
                    Ok(self.make(TokenKind::Less))
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    Ok(self.make(TokenKind::GreaterEqual))
                } else {
                    Ok(self.make(TokenKind::Greater))
                }
            }
            b'&' => {
                if self.match_byte(b'&') {
                    Ok(self.make(TokenKind::AndAnd))
                } else {
                    Err(self.error("unexpected character '&'"))
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    Ok(self.make(TokenKind::OrOr))
                } else {
                    Err(self.error("unexpected character '|'"))
                }
            }
            b'?' => {
                if self.match_byte(b'?') {
                    Ok(self.make(TokenKind::QuestionQuestion))
                } else if self.match_byte(b'.') {
                    Ok(self.make(TokenKind::QuestionDot))
                } else {
                    Ok(self.make(TokenKind::Question))
                }
            }
            b'.' => {
                if self.match_byte(b'.') {
                    if self.match_byte(b'.') {
                        Ok(self.make(TokenKind::DotDotDot))
                    } else {
                        Ok(self.make(TokenKind::DotDot))
                    }
                } else {
                    Ok(self.make(TokenKind::Dot))
                }
            }
            b'"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(),
            c if c == b'_' || c.is_ascii_alphabetic() => self.scan_identifier(),
            other => Err(self.error(format!("unexpected character '{}'", other as char))),
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.advance();
                }
                Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_next() == Some(b'/') => {
                    while self.peek().is_some() && self.peek() != Some(b'\n') {
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_next() == Some(b'*') => {
                    self.advance();
                    self.advance();
                    let mut depth = 1;
                    while depth > 0 {
                        match self.peek() {
                            None => return Err(self.error("unterminated block comment")),
                            Some(b'*') if self.peek_next() == Some(b'/') => {
                                self.advance();
                                self.advance();
                                depth -= 1;
                            }
                            Some(b'/') if self.peek_next() == Some(b'*') => {
                                self.advance();
                                self.advance();
                                depth += 1;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token, ParseError> {
        let start = self.current - 1;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_float = false;
        // a '.' followed by a digit continues the number; '..' is a range
        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.current])
            .map_err(|_| self.error("invalid numeric literal"))?;
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid float literal '{text}'")))?;
            Ok(self.make(TokenKind::Float(value)))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid integer literal '{text}'")))?;
            Ok(self.make(TokenKind::Int(value)))
        }
    }

    fn scan_string(&mut self) -> Result<Token, ParseError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string literal"));
            };
            match c {
                b'"' => {
                    self.advance();
                    break;
                }
                b'\n' => return Err(self.error("unterminated string literal")),
                b'\\' => {
                    self.advance();
                    let Some(esc) = self.peek() else {
                        return Err(self.error("unterminated string literal"));
                    };
                    match esc {
                        b'n' => {
                            text.push('\n');
                            self.advance();
                        }
                        b't' => {
                            text.push('\t');
                            self.advance();
                        }
                        b'r' => {
                            text.push('\r');
                            self.advance();
                        }
                        b'0' => {
                            text.push('\0');
                            self.advance();
                        }
                        b'\\' => {
                            text.push('\\');
                            self.advance();
                        }
                        b'"' => {
                            text.push('"');
                            self.advance();
                        }
                        b'(' => {
                            // interpolation: capture balanced expression source
                            self.advance();
                            if !text.is_empty() {
                                segments.push(StringSegment::Text(std::mem::take(&mut text)));
                            }
                            let mut depth = 1;
                            let start = self.current;
                            while depth > 0 {
                                match self.peek() {
                                    None | Some(b'\n') => {
                                        return Err(self.error("unterminated interpolation"));
                                    }
                                    Some(b'(') => {
                                        depth += 1;
                                        self.advance();
                                    }
                                    Some(b')') => {
                                        depth -= 1;
                                        if depth > 0 {
                                            self.advance();
                                        }
                                    }
                                    Some(_) => {
                                        self.advance();
                                    }
                                }
                            }
                            let raw = std::str::from_utf8(&self.source[start..self.current])
                                .map_err(|_| self.error("invalid interpolation"))?
                                .to_string();
                            self.advance(); // closing ')'
                            segments.push(StringSegment::Expr(raw));
                        }
                        other => {
                            return Err(self.error(format!(
                                "unknown escape sequence '\\{}'",
                                other as char
                            )));
                        }
                    }
                }
                _ => {
                    text.push(self.advance() as char);
                }
            }
        }
        if !text.is_empty() || segments.is_empty() {
            segments.push(StringSegment::Text(text));
        }
        Ok(self.make(TokenKind::Str(segments)))
    }

    fn scan_identifier(&mut self) -> Result<Token, ParseError> {
        let start = self.current - 1;
        while self
            .peek()
            .is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric())
        {
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[start..self.current])
            .map_err(|_| self.error("invalid identifier"))?;
        let kind = match text {
            "func" => TokenKind::Func,
            "class" => TokenKind::Class,
            "struct" => TokenKind::Struct,
            "enum" => TokenKind::Enum,
            "protocol" => TokenKind::Protocol,
            "extension" => TokenKind::Extension,
            "var" => TokenKind::Var,
            "let" => TokenKind::Let,
            "weak" => TokenKind::Weak,
            "unowned" => TokenKind::Unowned,
            "nil" => TokenKind::Nil,
            "guard" => TokenKind::Guard,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "repeat" => TokenKind::Repeat,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "in" => TokenKind::In,
            "import" => TokenKind::Import,
            "static" => TokenKind::Static,
            "override" => TokenKind::Override,
            "init" => TokenKind::Init,
            "deinit" => TokenKind::Deinit,
            "self" => TokenKind::SelfKw,
            "super" => TokenKind::Super,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "throw" => TokenKind::Throw,
            other => TokenKind::Ident(other.to_string()),
        };
        Ok(self.make(kind))
    }

    // ---- low-level cursor ----

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.current + 1).copied()
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            line: self.token_line,
            column: self.token_column,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.token_line,
            column: self.token_column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize_all()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_numbers_and_ranges() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Int(1),
                TokenKind::DotDot,
                TokenKind::Int(5),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("1...5"),
            vec![
                TokenKind::Int(1),
                TokenKind::DotDotDot,
                TokenKind::Int(5),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Float(1.5), TokenKind::Eof]
        );
    }

    #[test]
    fn scans_optional_operators() {
        assert_eq!(
            kinds("a ?? b?.c!"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::QuestionQuestion,
                TokenKind::Ident("b".to_string()),
                TokenKind::QuestionDot,
                TokenKind::Ident("c".to_string()),
                TokenKind::Bang,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn scans_string_escapes() {
        let TokenKind::Str(segments) = &kinds(r#""a\nb\"c""#)[0] else {
            panic!("expected string token");
        };
        assert_eq!(segments, &[StringSegment::Text("a\nb\"c".to_string())]);
    }

    #[test]
    fn scans_interpolation_segments() {
        let TokenKind::Str(segments) = &kinds(r#""x = \(a + f(1)) end""#)[0] else {
            panic!("expected string token");
        };
        assert_eq!(
            segments,
            &[
                StringSegment::Text("x = ".to_string()),
                StringSegment::Expr("a + f(1)".to_string()),
                StringSegment::Text(" end".to_string()),
            ]
        );
    }

    #[test]
    fn keywords_and_contextual_identifiers() {
        assert_eq!(
            kinds("weak var mutating"),
            vec![
                TokenKind::Weak,
                TokenKind::Var,
                // mutating is contextual, not a hard keyword
                TokenKind::Ident("mutating".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn line_and_column_tracking() {
        let tokens = Lexer::new("a\n  b").tokenize_all().unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // line\n/* block /* nested */ */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn stray_ampersand_is_an_error() {
        let err = Lexer::new("a & b").tokenize_all().unwrap_err();
        assert!(err.message.contains("unexpected character"));
    }
}
