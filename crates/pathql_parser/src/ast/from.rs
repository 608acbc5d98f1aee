use pathql_error::Result;

use super::{AstParseable, Ident, Location, PathName};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// One declaration in a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FromNode {
    /// `Entity [AS] alias`, either first or after a comma.
    Entity {
        entity: Ident,
        alias: Option<Ident>,
        location: Location,
    },
    /// `[INNER|LEFT [OUTER]] JOIN [FETCH] path [AS] alias`
    Join {
        kind: JoinKind,
        fetch: bool,
        path: PathName,
        alias: Option<Ident>,
    },
    /// `, IN(path) [AS] alias`
    In { path: PathName, alias: Ident },
}

impl FromNode {
    /// Parse the declarations following the FROM keyword.
    pub fn parse_list(parser: &mut Parser) -> Result<Vec<FromNode>> {
        let prev = parser.set_in_from(true);
        let result = Self::parse_list_inner(parser);
        parser.set_in_from(prev);
        result
    }

    fn parse_list_inner(parser: &mut Parser) -> Result<Vec<FromNode>> {
        let mut nodes = vec![Self::parse_entity(parser)?];

        loop {
            if parser.consume_token(&Token::Comma) {
                if parser.parse_keyword(Keyword::IN) {
                    parser.expect_token(&Token::LeftParen)?;
                    let path = PathName::parse(parser)?;
                    parser.expect_token(&Token::RightParen)?;
                    parser.parse_keyword(Keyword::AS);
                    let alias = parser.parse_ident()?;
                    nodes.push(FromNode::In { path, alias });
                } else {
                    nodes.push(Self::parse_entity(parser)?);
                }
                continue;
            }

            let kind = if parser.parse_keyword(Keyword::JOIN)
                || parser.parse_keyword_sequence(&[Keyword::INNER, Keyword::JOIN])
            {
                JoinKind::Inner
            } else if parser.parse_keyword_sequence(&[Keyword::LEFT, Keyword::JOIN])
                || parser.parse_keyword_sequence(&[Keyword::LEFT, Keyword::OUTER, Keyword::JOIN])
            {
                JoinKind::LeftOuter
            } else {
                break;
            };

            let fetch = parser.parse_keyword(Keyword::FETCH);
            let path = PathName::parse(parser)?;
            let has_as = parser.parse_keyword(Keyword::AS);
            let alias = if has_as || parser.peek_is_ident() {
                Some(parser.parse_ident()?)
            } else if fetch {
                None
            } else {
                return Err(
                    parser.error("Expected an alias for the joined path", Some("identifier"))
                );
            };

            nodes.push(FromNode::Join {
                kind,
                fetch,
                path,
                alias,
            });
        }

        Ok(nodes)
    }

    fn parse_entity(parser: &mut Parser) -> Result<FromNode> {
        let location = parser.location();
        let entity = parser.parse_ident()?;
        let has_as = parser.parse_keyword(Keyword::AS);
        let alias = if has_as || parser.peek_is_ident() {
            Some(parser.parse_ident()?)
        } else {
            None
        };
        Ok(FromNode::Entity {
            entity,
            alias,
            location,
        })
    }
}
