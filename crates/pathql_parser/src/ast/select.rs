use pathql_error::Result;

use super::{AstParseable, Expr, FromNode, Ident, Location, Literal};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    /// Empty when the query starts at FROM.
    pub items: Vec<SelectItem>,
    pub from: Vec<FromNode>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByNode>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Expr(Expr),
    /// OBJECT(alias)
    Object { alias: Ident, location: Location },
    /// NEW a.b.Type(args)
    Constructor {
        type_name: String,
        args: Vec<Expr>,
        location: Location,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByNode {
    pub expr: Expr,
    pub desc: bool,
}

impl AstParseable for SelectStatement {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_body(parser, true)
    }
}

impl SelectStatement {
    /// Parse a subquery. Subqueries may not have ORDER BY, OFFSET or LIMIT.
    pub fn parse_subquery(parser: &mut Parser) -> Result<Self> {
        if !parser.peek_is_keyword(Keyword::SELECT) {
            return Err(parser.error("Expected a subquery", Some("SELECT")));
        }
        Self::parse_body(parser, false)
    }

    fn parse_body(parser: &mut Parser, top_level: bool) -> Result<Self> {
        let mut distinct = false;
        let mut items = Vec::new();

        if parser.parse_keyword(Keyword::SELECT) {
            distinct = parser.parse_keyword(Keyword::DISTINCT);
            items.push(SelectItem::parse(parser)?);
            while parser.consume_token(&Token::Comma) {
                items.push(SelectItem::parse(parser)?);
            }
        }

        let from = if parser.parse_keyword(Keyword::FROM) {
            FromNode::parse_list(parser)?
        } else if items.is_empty() {
            return Err(parser.error("Expected FROM", Some("FROM")));
        } else {
            Vec::new()
        };

        let selection = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if parser.parse_keyword_sequence(&[Keyword::GROUP, Keyword::BY]) {
            group_by.push(Expr::parse(parser)?);
            while parser.consume_token(&Token::Comma) {
                group_by.push(Expr::parse(parser)?);
            }
        }

        let having = if parser.parse_keyword(Keyword::HAVING) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        let mut statement = SelectStatement {
            distinct,
            items,
            from,
            selection,
            group_by,
            having,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        };

        if !top_level {
            return Ok(statement);
        }

        if parser.parse_keyword_sequence(&[Keyword::ORDER, Keyword::BY]) {
            statement.order_by.push(OrderByNode::parse(parser)?);
            while parser.consume_token(&Token::Comma) {
                statement.order_by.push(OrderByNode::parse(parser)?);
            }
        }

        // OFFSET and LIMIT may come in either order.
        loop {
            if statement.offset.is_none() && parser.parse_keyword(Keyword::OFFSET) {
                statement.offset = Some(parse_row_count(parser)?);
            } else if statement.limit.is_none() && parser.parse_keyword(Keyword::LIMIT) {
                statement.limit = Some(parse_row_count(parser)?);
            } else {
                break;
            }
        }

        Ok(statement)
    }
}

fn parse_row_count(parser: &mut Parser) -> Result<u64> {
    let tok = parser.peek().cloned();
    match Expr::parse_simple_term(parser) {
        Ok(Expr::Literal(Literal::Integer(v) | Literal::Long(v))) if v >= 0 => Ok(v as u64),
        _ => Err(parser.error_at(
            tok.as_ref(),
            "Expected a non-negative integer",
            Some("integer"),
        )),
    }
}

impl AstParseable for SelectItem {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let location = parser.location();

        if parser.parse_keyword(Keyword::OBJECT) {
            parser.expect_token(&Token::LeftParen)?;
            let alias = parser.parse_ident()?;
            parser.expect_token(&Token::RightParen)?;
            return Ok(SelectItem::Object { alias, location });
        }

        if parser.parse_keyword(Keyword::NEW) {
            let mut type_name = parser.parse_ident()?.value;
            let mut qualified = false;
            while parser.consume_token(&Token::Period) {
                qualified = true;
                type_name.push('.');
                type_name.push_str(&parser.parse_any_word()?.value);
            }
            if !qualified {
                return Err(parser.error(
                    format!("Constructor type '{type_name}' must be fully qualified"),
                    Some("qualified type name"),
                ));
            }

            parser.expect_token(&Token::LeftParen)?;
            let mut args = vec![Expr::parse(parser)?];
            while parser.consume_token(&Token::Comma) {
                args.push(Expr::parse(parser)?);
            }
            parser.expect_token(&Token::RightParen)?;

            return Ok(SelectItem::Constructor {
                type_name,
                args,
                location,
            });
        }

        Ok(SelectItem::Expr(Expr::parse(parser)?))
    }
}

impl AstParseable for OrderByNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let expr = Expr::parse(parser)?;
        let desc = match parser.parse_one_of_keywords(&[Keyword::ASC, Keyword::DESC]) {
            Some(Keyword::DESC) => true,
            _ => false,
        };
        Ok(OrderByNode { expr, desc })
    }
}
