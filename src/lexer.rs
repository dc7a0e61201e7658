use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Mut,
    Fn,
    Functor,
    Box,
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    Pipe,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: SourceSpan::new(start, start),
                });
                return Ok(tokens);
            };
            let token = match ch {
                c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
                c if c.is_ascii_digit() => self.number_literal(),
                '"' => self.string_literal()?,
                _ => self.operator()?,
            };
            tokens.push(token);
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek_at(0) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skips whitespace, line comments, and nesting block comments. An
    /// unterminated block comment is a lexer error rather than silent EOF.
    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match (self.peek_at(0), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.peek_at(0) {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut depth = 1usize;
                    while depth > 0 {
                        match (self.peek_at(0), self.peek_at(1)) {
                            (Some(b'/'), Some(b'*')) => {
                                depth += 1;
                                self.pos += 2;
                            }
                            (Some(b'*'), Some(b'/')) => {
                                depth -= 1;
                                self.pos += 2;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                return Err(Diagnostic::new(
                                    DiagnosticKind::Lexer,
                                    "unterminated block comment",
                                )
                                .with_span(SourceSpan::new(start, self.pos)));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek_at(0) {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else if b >= 0x80 {
                // Permit non-ASCII identifier tails.
                self.advance();
            } else {
                break;
            }
        }
        let lexeme = self.source[start..self.pos].to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            span: SourceSpan::new(start, self.pos),
        }
    }

    fn number_literal(&mut self) -> Token {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(b) = self.peek_at(0) {
            match b {
                b'0'..=b'9' | b'_' => self.pos += 1,
                b'.' if !seen_dot && matches!(self.peek_at(1), Some(b'0'..=b'9')) => {
                    seen_dot = true;
                    self.pos += 1;
                }
                b'e' | b'E' if seen_dot => {
                    self.pos += 1;
                    if matches!(self.peek_at(0), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        Token {
            kind: TokenKind::Number,
            lexeme: self.source[start..self.pos].to_string(),
            span: SourceSpan::new(start, self.pos),
        }
    }

    fn string_literal(&mut self) -> Result<Token, Diagnostic> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut value = String::new();
        while let Some(ch) = self.advance() {
            match ch {
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        span: SourceSpan::new(start, self.pos),
                    });
                }
                '\\' => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => value.push(other),
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated string literal")
                .with_span(SourceSpan::new(start, self.pos)),
        )
    }

    fn operator(&mut self) -> Result<Token, Diagnostic> {
        use TokenKind::*;
        let start = self.pos;
        let ch = self.advance().unwrap_or('\0');
        let kind = match ch {
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ':' => Colon,
            ';' => Semicolon,
            '+' => Plus,
            '*' => Star,
            '/' => Slash,
            '%' => Percent,
            '-' => {
                if self.eat(b'>') {
                    Arrow
                } else {
                    Minus
                }
            }
            '=' => {
                if self.eat(b'=') {
                    EqualEqual
                } else {
                    Assign
                }
            }
            '!' => {
                if self.eat(b'=') {
                    BangEqual
                } else {
                    Bang
                }
            }
            '&' => {
                if self.eat(b'&') {
                    DoubleAmpersand
                } else {
                    Ampersand
                }
            }
            '|' => {
                if self.eat(b'|') {
                    DoublePipe
                } else {
                    Pipe
                }
            }
            '<' => {
                if self.eat(b'=') {
                    LessEqual
                } else {
                    Less
                }
            }
            '>' => {
                if self.eat(b'=') {
                    GreaterEqual
                } else {
                    Greater
                }
            }
            other => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Lexer,
                    format!("unexpected character `{other}`"),
                )
                .with_span(SourceSpan::new(start, self.pos)));
            }
        };
        Ok(Token {
            kind,
            lexeme: self.source[start..self.pos].to_string(),
            span: SourceSpan::new(start, self.pos),
        })
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "var" => Kw::Var,
        "mut" => Kw::Mut,
        "fn" => Kw::Fn,
        "functor" => Kw::Functor,
        "box" => Kw::Box,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "return" => Kw::Return,
        "true" => Kw::True,
        "false" => Kw::False,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}
