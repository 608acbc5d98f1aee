use pathql_error::Result;

use super::{AstParseable, Expr, Ident, Location, PathName};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub entity: Ident,
    pub alias: Option<Ident>,
    pub location: Location,
    pub assignments: Vec<Assignment>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: PathName,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub entity: Ident,
    pub alias: Option<Ident>,
    pub location: Location,
    pub selection: Option<Expr>,
}

/// Parse `Entity [AS] [alias]` for UPDATE and DELETE.
fn parse_target(parser: &mut Parser) -> Result<(Ident, Option<Ident>, Location)> {
    let prev = parser.set_in_from(true);
    let result = parse_target_inner(parser);
    parser.set_in_from(prev);
    result
}

fn parse_target_inner(parser: &mut Parser) -> Result<(Ident, Option<Ident>, Location)> {
    let location = parser.location();
    let entity = parser.parse_ident()?;
    let has_as = parser.parse_keyword(Keyword::AS);
    let alias = if has_as || parser.peek_is_ident() {
        Some(parser.parse_ident()?)
    } else {
        None
    };
    Ok((entity, alias, location))
}

impl AstParseable for UpdateStatement {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::UPDATE)?;
        let (entity, alias, location) = parse_target(parser)?;
        parser.expect_keyword(Keyword::SET)?;

        let mut assignments = vec![Assignment::parse(parser)?];
        while parser.consume_token(&Token::Comma) {
            assignments.push(Assignment::parse(parser)?);
        }

        let selection = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        Ok(UpdateStatement {
            entity,
            alias,
            location,
            assignments,
            selection,
        })
    }
}

impl AstParseable for Assignment {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let target = PathName::parse(parser)?;
        parser.expect_token(&Token::Eq)?;
        let value = Expr::parse_concat(parser)?;
        Ok(Assignment { target, value })
    }
}

impl AstParseable for DeleteStatement {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::DELETE)?;
        parser.expect_keyword(Keyword::FROM)?;
        let (entity, alias, location) = parse_target(parser)?;

        let selection = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        Ok(DeleteStatement {
            entity,
            alias,
            location,
            selection,
        })
    }
}
