use pathql_error::{ParseDetails, QueryError, Result};

use crate::ast::{AstParseable, Ident, Location, Statement};
use crate::keywords::Keyword;
use crate::tokens::{Parameter, Token, TokenWithLocation, Tokenizer, line_col};

/// Parse a single query string into a statement.
pub fn parse(query: &str) -> Result<Statement> {
    let toks = Tokenizer::new(query).tokenize()?;
    let mut parser = Parser::with_tokens(query, toks);
    let statement = parser.parse_statement()?;

    if let Some(tok) = parser.peek() {
        let tok = tok.clone();
        return Err(parser.error_at(Some(&tok), "Expected end of query", None));
    }
    parser.validate_parameters()?;

    Ok(statement)
}

#[derive(Debug)]
pub struct Parser<'a> {
    query: &'a str,
    toks: Vec<TokenWithLocation>,
    /// Index of token we should process next.
    idx: usize,
    /// Highest positional index seen so far, used to number bare '?'.
    positional_count: u32,
    first_positional: Option<TokenWithLocation>,
    first_named: Option<TokenWithLocation>,
    /// Set while parsing a FROM clause, where MEMBER is a valid identifier.
    in_from: bool,
}

impl<'a> Parser<'a> {
    pub fn with_tokens(query: &'a str, toks: Vec<TokenWithLocation>) -> Self {
        Parser {
            query,
            toks,
            idx: 0,
            positional_count: 0,
            first_positional: None,
            first_named: None,
            in_from: false,
        }
    }

    pub fn with_query_string(query: &'a str) -> Result<Self> {
        let toks = Tokenizer::new(query).tokenize()?;
        Ok(Self::with_tokens(query, toks))
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek().and_then(|t| t.token.keyword()) {
            Some(Keyword::SELECT) => Ok(Statement::Select(AstParseable::parse(self)?)),
            Some(Keyword::UPDATE) => Ok(Statement::Update(AstParseable::parse(self)?)),
            Some(Keyword::DELETE) => Ok(Statement::Delete(AstParseable::parse(self)?)),
            // A bare FROM clause selects the first alias.
            Some(Keyword::FROM) => Ok(Statement::Select(AstParseable::parse(self)?)),
            _ => {
                let tok = self.peek().cloned();
                Err(self.error_at(
                    tok.as_ref(),
                    "Expected a query",
                    Some("SELECT, UPDATE or DELETE"),
                ))
            }
        }
    }

    /// Fails if both named and positional parameters were used.
    pub fn validate_parameters(&self) -> Result<()> {
        if let (Some(positional), Some(named)) = (&self.first_positional, &self.first_named) {
            let later = if positional.offset > named.offset {
                positional
            } else {
                named
            };
            return Err(self.error_at(
                Some(later),
                "Make sure named parameters are not mixed with positional parameters",
                None,
            ));
        }
        Ok(())
    }

    /// Resolve a parameter token, numbering bare '?' sequentially.
    pub(crate) fn parameter(&mut self, tok: &TokenWithLocation, param: &Parameter) -> Parameter {
        match param {
            Parameter::Positional(idx) => {
                if self.first_positional.is_none() {
                    self.first_positional = Some(tok.clone());
                }
                let idx = match idx {
                    Some(idx) => *idx,
                    None => self.positional_count + 1,
                };
                self.positional_count = self.positional_count.max(idx);
                Parameter::Positional(Some(idx))
            }
            Parameter::Named(name) => {
                if self.first_named.is_none() {
                    self.first_named = Some(tok.clone());
                }
                Parameter::Named(name.clone())
            }
        }
    }

    pub(crate) fn set_in_from(&mut self, in_from: bool) -> bool {
        std::mem::replace(&mut self.in_from, in_from)
    }

    /// Parse an identifier.
    ///
    /// Reserved words are rejected except ORDER when not followed by BY, and
    /// MEMBER inside a FROM clause.
    pub fn parse_ident(&mut self) -> Result<Ident> {
        let tok = match self.peek() {
            Some(tok) => tok.clone(),
            None => return Err(self.error_at(None, "Unexpected end of query", Some("identifier"))),
        };

        let ident = match &tok.token {
            Token::Word(w) => match w.keyword {
                None => Some(Ident::new(&w.value)),
                Some(Keyword::ORDER) if !self.peek_nth_is_keyword(1, Keyword::BY) => {
                    Some(Ident::new(&w.value))
                }
                Some(Keyword::MEMBER) if self.in_from => Some(Ident::new(&w.value)),
                Some(_) => None,
            },
            _ => None,
        };

        match ident {
            Some(ident) => {
                self.idx += 1;
                Ok(ident)
            }
            None => Err(self.error_at(Some(&tok), "Expected an identifier", Some("identifier"))),
        }
    }

    /// Parse any word, including reserved words. Used for field names after a
    /// '.' where there is no ambiguity.
    pub fn parse_any_word(&mut self) -> Result<Ident> {
        let tok = self.peek().cloned();
        match tok.as_ref().map(|t| &t.token) {
            Some(Token::Word(w)) => {
                self.idx += 1;
                Ok(Ident::new(&w.value))
            }
            _ => Err(self.error_at(tok.as_ref(), "Expected a field name", Some("identifier"))),
        }
    }

    /// Check if the next token could start an identifier.
    pub fn peek_is_ident(&self) -> bool {
        match self.peek().map(|t| &t.token) {
            Some(Token::Word(w)) => match w.keyword {
                None => true,
                Some(Keyword::ORDER) => !self.peek_nth_is_keyword(1, Keyword::BY),
                Some(Keyword::MEMBER) => self.in_from,
                Some(_) => false,
            },
            _ => false,
        }
    }

    /// Parse a single keyword.
    pub fn parse_keyword(&mut self, keyword: Keyword) -> bool {
        let idx = self.idx;
        if let Some(tok) = self.next_token() {
            if tok.token.is_keyword(keyword) {
                return true;
            }
        }

        // Keyword doesn't match. Reset index and return.
        self.idx = idx;
        false
    }

    /// Parse an exact sequence of keywords.
    ///
    /// If the sequence doesn't match, idx is not changed, and false is
    /// returned.
    pub fn parse_keyword_sequence(&mut self, keywords: &[Keyword]) -> bool {
        let idx = self.idx;
        for keyword in keywords {
            if let Some(tok) = self.next_token() {
                if tok.token.is_keyword(*keyword) {
                    continue;
                }
            }

            // Keyword doesn't match. Reset index and return.
            self.idx = idx;
            return false;
        }
        true
    }

    /// Parse one of the provided keywords, returning which one matched.
    pub fn parse_one_of_keywords(&mut self, keywords: &[Keyword]) -> Option<Keyword> {
        let idx = self.idx;
        let tok = self.next_token()?;

        if let Some(kw) = keywords.iter().find(|k| tok.token.is_keyword(**k)) {
            return Some(*kw);
        }

        // No matches, reset index.
        self.idx = idx;
        None
    }

    pub fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.parse_keyword(keyword) {
            return Ok(());
        }
        let tok = self.peek().cloned();
        Err(self.error_at(
            tok.as_ref(),
            format!("Expected {}", keyword.as_str()),
            Some(keyword.as_str()),
        ))
    }

    /// Consume the next token if it matches.
    pub fn consume_token(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(tok) if &tok.token == expected => {
                self.idx += 1;
                true
            }
            _ => false,
        }
    }

    pub fn expect_token(&mut self, expected: &Token) -> Result<()> {
        if self.consume_token(expected) {
            return Ok(());
        }
        let tok = self.peek().cloned();
        Err(self.error_at(
            tok.as_ref(),
            format!("Expected '{expected}'"),
            Some(&format!("'{expected}'")),
        ))
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Option<&TokenWithLocation> {
        let tok = self.toks.get(self.idx)?;
        self.idx += 1;
        Some(tok)
    }

    pub fn peek(&self) -> Option<&TokenWithLocation> {
        self.toks.get(self.idx)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&TokenWithLocation> {
        self.toks.get(self.idx + n)
    }

    pub fn peek_is_keyword(&self, keyword: Keyword) -> bool {
        self.peek_nth_is_keyword(0, keyword)
    }

    pub fn peek_nth_is_keyword(&self, n: usize, keyword: Keyword) -> bool {
        self.peek_nth(n)
            .map(|t| t.token.is_keyword(keyword))
            .unwrap_or(false)
    }

    pub fn peek_is_token(&self, token: &Token) -> bool {
        self.peek().map(|t| &t.token == token).unwrap_or(false)
    }

    /// Location of the next token, or the end of the query.
    pub fn location(&self) -> Location {
        match self.peek() {
            Some(tok) => Location {
                offset: tok.offset,
                line: tok.line,
                col: tok.col,
            },
            None => {
                let (line, col) = line_col(self.query, self.query.len());
                Location {
                    offset: self.query.len(),
                    line,
                    col,
                }
            }
        }
    }

    /// Build a parse error pointing at the next token.
    pub fn error(&self, msg: impl Into<String>, expected: Option<&str>) -> QueryError {
        let tok = self.peek().cloned();
        self.error_at(tok.as_ref(), msg, expected)
    }

    /// Build a parse error pointing at a token, or the end of the query if
    /// None.
    pub fn error_at(
        &self,
        tok: Option<&TokenWithLocation>,
        msg: impl Into<String>,
        expected: Option<&str>,
    ) -> QueryError {
        let details = match tok {
            Some(tok) => ParseDetails {
                lexeme: self.query[tok.offset..tok.offset + tok.len].to_string(),
                expected: expected.map(|s| s.to_string()),
                source_text: self.query.to_string(),
                offset: tok.offset,
                line: tok.line,
                col: tok.col,
            },
            None => {
                let (line, col) = line_col(self.query, self.query.len());
                ParseDetails {
                    lexeme: String::new(),
                    expected: expected.map(|s| s.to_string()),
                    source_text: self.query.to_string(),
                    offset: self.query.len(),
                    line,
                    col,
                }
            }
        };
        QueryError::parse(msg, details)
    }
}
