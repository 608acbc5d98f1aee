pub mod expr;
pub mod from;
pub mod modify;
pub mod select;

pub use expr::*;
pub use from::*;
pub use modify::*;
pub use select::*;

use std::fmt;

use pathql_error::Result;

use crate::parser::Parser;
use crate::tokens::Token;

pub trait AstParseable: Sized {
    /// Parse an instance of Self from the provided parser.
    ///
    /// It's assumed that the parser is in the correct state for parsing Self,
    /// and if it isn't, an error should be returned.
    fn parse(parser: &mut Parser) -> Result<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Byte offset into the query.
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub value: String,
}

impl Ident {
    pub fn new(s: impl Into<String>) -> Self {
        Ident { value: s.into() }
    }

    /// Lowercased value, used for case-insensitive alias matching.
    pub fn normalized(&self) -> String {
        self.value.to_lowercase()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A dotted navigation path, e.g. `o.customer.address.city`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathName {
    pub segments: Vec<Ident>,
    pub location: Location,
}

impl PathName {
    pub fn first(&self) -> &Ident {
        &self.segments[0]
    }
}

impl fmt::Display for PathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, seg) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl AstParseable for PathName {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let location = parser.location();
        let mut segments = vec![parser.parse_ident()?];
        while parser.consume_token(&Token::Period) {
            segments.push(parser.parse_any_word()?);
        }
        Ok(PathName { segments, location })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl AstParseable for Statement {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.parse_statement()
    }
}
