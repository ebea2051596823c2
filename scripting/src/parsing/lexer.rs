use std::fmt;

use crate::utils::errors::{Result, ScriptingError};

/// Token of the payoff language. Identifiers are folded to upper case, so
/// keywords, builtins and variable names are all case-insensitive. `==`
/// spells the same comparator as `=`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{}", name),
            Token::Num(value) => write!(f, "{}", value),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Eq => write!(f, "="),
            Token::Neq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Leq => write!(f, "<="),
            Token::Geq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::Bang => write!(f, "!"),
        }
    }
}

pub struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(script: impl AsRef<str>) -> Self {
        Lexer {
            src: script.as_ref().chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Consume the next char when it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.src.get(self.pos + 1).copied() == Some(expected) {
            self.pos += 2;
            true
        } else {
            self.pos += 1;
            false
        }
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        self.src[start..self.pos]
            .iter()
            .collect::<String>()
            .to_ascii_uppercase()
    }

    fn read_number(&mut self) -> Result<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text: String = self.src[start..self.pos].iter().collect();
        if text == "." {
            return Err(ScriptingError::BadToken(text));
        }
        Ok(text.parse::<f64>()?)
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                _ if c.is_whitespace() => self.bump(),
                _ if c.is_ascii_alphabetic() => tokens.push(Token::Ident(self.read_ident())),
                _ if c.is_ascii_digit() || c == '.' => tokens.push(Token::Num(self.read_number()?)),
                '(' => {
                    tokens.push(Token::LParen);
                    self.bump();
                }
                ')' => {
                    tokens.push(Token::RParen);
                    self.bump();
                }
                '[' => {
                    tokens.push(Token::LBracket);
                    self.bump();
                }
                ']' => {
                    tokens.push(Token::RBracket);
                    self.bump();
                }
                ',' => {
                    tokens.push(Token::Comma);
                    self.bump();
                }
                ';' => {
                    tokens.push(Token::Semicolon);
                    self.bump();
                }
                ':' => {
                    tokens.push(Token::Colon);
                    self.bump();
                }
                '+' => {
                    tokens.push(Token::Plus);
                    self.bump();
                }
                '-' => {
                    tokens.push(Token::Minus);
                    self.bump();
                }
                '*' => {
                    tokens.push(Token::Star);
                    self.bump();
                }
                '/' => {
                    tokens.push(Token::Slash);
                    self.bump();
                }
                '^' => {
                    tokens.push(Token::Caret);
                    self.bump();
                }
                '=' => {
                    // '=' and '==' are the same comparator
                    self.eat('=');
                    tokens.push(Token::Eq);
                }
                '!' => {
                    if self.eat('=') {
                        tokens.push(Token::Neq);
                    } else {
                        tokens.push(Token::Bang);
                    }
                }
                '<' => {
                    if self.eat('=') {
                        tokens.push(Token::Leq);
                    } else {
                        tokens.push(Token::Lt);
                    }
                }
                '>' => {
                    if self.eat('=') {
                        tokens.push(Token::Geq);
                    } else {
                        tokens.push(Token::Gt);
                    }
                }
                _ => return Err(ScriptingError::BadToken(c.to_string())),
            }
        }
        Ok(tokens)
    }
}
