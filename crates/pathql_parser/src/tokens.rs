use std::fmt;

use pathql_error::{ParseDetails, QueryError, Result};

use crate::keywords::{Keyword, keyword_from_str};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    SingleQuotedString(String),
    Number(Number),
    Parameter(Parameter),
    /// '='
    Eq,
    /// '<>' or '!='
    Neq,
    /// '<'
    Lt,
    /// '<='
    LtEq,
    /// '>'
    Gt,
    /// '>='
    GtEq,
    /// '+'
    Plus,
    /// '-'
    Minus,
    /// '*'
    Mul,
    /// '/'
    Div,
    /// '%'
    Mod,
    /// '||'
    Concat,
    LeftParen,
    RightParen,
    Comma,
    Period,
}

impl Token {
    pub fn is_keyword(&self, other: Keyword) -> bool {
        match self {
            Token::Word(w) => w.keyword == Some(other),
            _ => false,
        }
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self {
            Token::Word(w) => w.keyword,
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{}", w.value),
            Self::SingleQuotedString(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Number(n) => write!(f, "{}", n.value),
            Self::Parameter(Parameter::Positional(Some(idx))) => write!(f, "?{idx}"),
            Self::Parameter(Parameter::Positional(None)) => write!(f, "?"),
            Self::Parameter(Parameter::Named(name)) => write!(f, ":{name}"),
            Self::Eq => write!(f, "="),
            Self::Neq => write!(f, "<>"),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::Mod => write!(f, "%"),
            Self::Concat => write!(f, "||"),
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::Comma => write!(f, ","),
            Self::Period => write!(f, "."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub value: String,
    pub keyword: Option<Keyword>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Integer,
    /// Suffixed with 'L'.
    Long,
    /// Contains a decimal point or exponent, or suffixed with 'F'/'D'.
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Number {
    /// Digits without any type suffix.
    pub value: String,
    pub kind: NumberKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    /// '?n', or a bare '?' when None.
    Positional(Option<u32>),
    /// ':name'
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithLocation {
    pub token: Token,
    /// Byte offset of the first character.
    pub offset: usize,
    /// Length of the lexeme in bytes.
    pub len: usize,
    pub line: usize,
    pub col: usize,
}

/// Hand-written scanner over the query text with single-character pushback.
#[derive(Debug)]
pub struct Tokenizer<'a> {
    query: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    col: usize,
    /// Line/column before the last read, restored on unread.
    prev: (usize, usize),
}

impl<'a> Tokenizer<'a> {
    pub fn new(query: &'a str) -> Self {
        Tokenizer {
            query,
            chars: query.char_indices().collect(),
            pos: 0,
            line: 1,
            col: 1,
            prev: (1, 1),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<TokenWithLocation>> {
        let mut toks = Vec::new();
        loop {
            self.skip_whitespace();
            let (offset, line, col) = (self.offset(), self.line, self.col);
            let token = match self.scan_token(offset)? {
                Some(tok) => tok,
                None => break,
            };
            toks.push(TokenWithLocation {
                token,
                offset,
                len: self.offset() - offset,
                line,
                col,
            });
        }
        Ok(toks)
    }

    fn scan_token(&mut self, start: usize) -> Result<Option<Token>> {
        let c = match self.read() {
            Some(c) => c,
            None => return Ok(None),
        };

        let tok = match c {
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Mul,
            '/' => Token::Div,
            '%' => Token::Mod,
            '=' => Token::Eq,
            '<' => match self.read() {
                Some('=') => Token::LtEq,
                Some('>') => Token::Neq,
                Some(_) => {
                    self.unread();
                    Token::Lt
                }
                None => Token::Lt,
            },
            '>' => match self.read() {
                Some('=') => Token::GtEq,
                Some(_) => {
                    self.unread();
                    Token::Gt
                }
                None => Token::Gt,
            },
            '!' => match self.read() {
                Some('=') => Token::Neq,
                _ => return Err(self.error(start, "Unexpected character '!'", Some("'!='"))),
            },
            '|' => match self.read() {
                Some('|') => Token::Concat,
                _ => return Err(self.error(start, "Unexpected character '|'", Some("'||'"))),
            },
            '.' => match self.peek() {
                Some(d) if d.is_ascii_digit() => {
                    self.unread();
                    self.scan_number(start)?
                }
                _ => Token::Period,
            },
            '\'' => self.scan_string(start)?,
            '?' => self.scan_positional(start)?,
            ':' => self.scan_named(start)?,
            c if c.is_ascii_digit() => {
                self.unread();
                self.scan_number(start)?
            }
            c if is_identifier_start(c) => {
                let mut value = String::new();
                value.push(c);
                while let Some(c) = self.read() {
                    if is_identifier_part(c) {
                        value.push(c);
                    } else {
                        self.unread();
                        break;
                    }
                }
                let keyword = keyword_from_str(&value);
                Token::Word(Word { value, keyword })
            }
            other => {
                return Err(self.error(start, format!("Unexpected character '{other}'"), None));
            }
        };

        Ok(Some(tok))
    }

    fn scan_string(&mut self, start: usize) -> Result<Token> {
        let mut s = String::new();
        loop {
            match self.read() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.read();
                        s.push('\'');
                    } else {
                        return Ok(Token::SingleQuotedString(s));
                    }
                }
                Some(c) => s.push(c),
                None => {
                    return Err(self.error(start, "Unterminated string literal", Some("'")));
                }
            }
        }
    }

    fn scan_number(&mut self, start: usize) -> Result<Token> {
        let mut value = String::new();
        let mut kind = NumberKind::Integer;

        self.read_digits(&mut value);
        if self.peek() == Some('.') {
            self.read();
            value.push('.');
            kind = NumberKind::Double;
            self.read_digits(&mut value);
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            self.read();
            value.push('e');
            kind = NumberKind::Double;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                self.read();
                value.push(sign);
            }
            let before = value.len();
            self.read_digits(&mut value);
            if value.len() == before {
                return Err(self.error(start, "Expected exponent digits", Some("digit")));
            }
        }

        match self.peek() {
            Some('l' | 'L') => {
                self.read();
                if kind == NumberKind::Double {
                    return Err(self.error(start, "Long suffix on a decimal number", None));
                }
                kind = NumberKind::Long;
            }
            Some('f' | 'F' | 'd' | 'D') => {
                self.read();
                kind = NumberKind::Double;
            }
            _ => (),
        }

        if matches!(self.peek(), Some(c) if is_identifier_part(c)) {
            return Err(self.error(start, "Invalid numeric literal", None));
        }

        Ok(Token::Number(Number { value, kind }))
    }

    fn scan_positional(&mut self, start: usize) -> Result<Token> {
        let mut digits = String::new();
        self.read_digits(&mut digits);
        if digits.is_empty() {
            return Ok(Token::Parameter(Parameter::Positional(None)));
        }

        let idx: u32 = match digits.parse() {
            Ok(idx) => idx,
            Err(_) => return Err(self.error(start, "Parameter index out of range", None)),
        };
        if idx == 0 {
            return Err(self.error(start, "Parameter index must be at least 1", None));
        }
        Ok(Token::Parameter(Parameter::Positional(Some(idx))))
    }

    fn scan_named(&mut self, start: usize) -> Result<Token> {
        let mut name = String::new();
        match self.read() {
            Some(c) if is_identifier_start(c) => name.push(c),
            _ => {
                return Err(self.error(
                    start,
                    "Expected a parameter name after ':'",
                    Some("identifier"),
                ));
            }
        }
        while let Some(c) = self.read() {
            if is_identifier_part(c) {
                name.push(c);
            } else {
                self.unread();
                break;
            }
        }
        Ok(Token::Parameter(Parameter::Named(name)))
    }

    fn read_digits(&mut self, buf: &mut String) {
        while let Some(c) = self.read() {
            if c.is_ascii_digit() {
                buf.push(c);
            } else {
                self.unread();
                break;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.read() {
            if !c.is_whitespace() {
                self.unread();
                break;
            }
        }
    }

    fn offset(&self) -> usize {
        match self.chars.get(self.pos) {
            Some((offset, _)) => *offset,
            None => self.query.len(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn read(&mut self) -> Option<char> {
        let (_, c) = *self.chars.get(self.pos)?;
        self.pos += 1;
        self.prev = (self.line, self.col);
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Push back the last character read. Only one character of pushback is
    /// supported.
    fn unread(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
            (self.line, self.col) = self.prev;
        }
    }

    fn error(&self, start: usize, msg: impl Into<String>, expected: Option<&str>) -> QueryError {
        let (line, col) = line_col(self.query, start);
        let end = self.offset().max(start);
        QueryError::parse(
            msg,
            ParseDetails {
                lexeme: self.query[start..end].to_string(),
                expected: expected.map(|s| s.to_string()),
                source_text: self.query.to_string(),
                offset: start,
                line,
                col,
            },
        )
    }
}

/// Compute the 1-based line and column for a byte offset.
pub fn line_col(query: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (idx, c) in query.char_indices() {
        if idx >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
