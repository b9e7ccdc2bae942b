//! Comment-skipping tokenizer shared by the preprocessing and parsing passes.

use crate::types::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    /// Backtick word, stored without the backtick.
    Directive,
    /// String literal, stored without quotes.
    Str,
    Number,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: Location,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }
}

/// Cheap to clone, so callers peek by cloning.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    line: u32,
    column: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

impl<'a> Lexer<'a> {
    pub fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = *self.chars.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek_at(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek_at(0), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => self.skip_line(),
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    while let Some(c) = self.bump() {
                        if c == '*' && self.peek_at(0) == Some('/') {
                            self.bump();
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek_at(0) {
            if !pred(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_trivia();
        let location = self.location();
        let c = self.peek_at(0)?;

        let token = |kind, text| Token {
            kind,
            text,
            location,
        };

        if c == '`' && self.peek_at(1).is_some_and(is_ident_start) {
            self.bump();
            let name = self.take_while(is_ident_char);
            return Some(token(TokenKind::Directive, name));
        }
        if is_ident_start(c) {
            let name = self.take_while(is_ident_char);
            return Some(token(TokenKind::Ident, name));
        }
        if c == '\\' {
            self.bump();
            let name = self.take_while(|c| !c.is_whitespace());
            return Some(token(TokenKind::Ident, name));
        }
        if c.is_ascii_digit() {
            let text = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '.'));
            return Some(token(TokenKind::Number, text));
        }
        if c == '"' {
            self.bump();
            let mut text = String::new();
            while let Some(c) = self.peek_at(0) {
                if c == '\n' {
                    break;
                }
                self.bump();
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = self.bump() {
                            text.push(escaped);
                        }
                    }
                    _ => text.push(c),
                }
            }
            return Some(token(TokenKind::Str, text));
        }
        if c == ':' && self.peek_at(1) == Some(':') {
            self.bump();
            self.bump();
            return Some(token(TokenKind::Punct, "::".to_string()));
        }

        self.bump();
        Some(token(TokenKind::Punct, c.to_string()))
    }

    /// Raw text up to the end of the logical line (backslash-newline continues it).
    /// A trailing `//` comment is dropped.
    pub fn rest_of_line(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek_at(0) {
            match (c, self.peek_at(1)) {
                ('\\', Some('\n')) => {
                    self.bump();
                    self.bump();
                    text.push('\n');
                }
                ('\\', Some('\r')) if self.peek_at(2) == Some('\n') => {
                    self.bump();
                    self.bump();
                    self.bump();
                    text.push('\n');
                }
                ('\n', _) => break,
                ('/', Some('/')) => {
                    self.skip_line();
                    break;
                }
                _ => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        text.trim().to_string()
    }

    /// Raw text up to (and consuming) `end`, not crossing a newline.
    pub fn read_until(&mut self, end: char) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek_at(0) {
            if c == '\n' {
                break;
            }
            self.bump();
            if c == end {
                break;
            }
            text.push(c);
        }
        text
    }
}
