use pathql_error::Result;

use super::{AstParseable, Ident, Location, PathName, SelectStatement};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::{Number, NumberKind, Parameter, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Long(i64),
    Double(f64),
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
    And,
    Or,
}

impl BinaryOperator {
    fn from_comparison_token(tok: &Token) -> Option<Self> {
        Some(match tok {
            Token::Eq => Self::Eq,
            Token::Neq => Self::NotEq,
            Token::Lt => Self::Lt,
            Token::LtEq => Self::LtEq,
            Token::Gt => Self::Gt,
            Token::GtEq => Self::GtEq,
            _ => return None,
        })
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Any,
    Some,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSpec {
    Leading,
    Trailing,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeFunction {
    CurrentDate,
    CurrentTime,
    CurrentTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Ident,
    pub args: Vec<Expr>,
    pub distinct: bool,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(PathName),
    Literal(Literal),
    Parameter(Parameter),
    Null,
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryExpr {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// Parenthesized expression.
    Nested(Box<Expr>),
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        negated: bool,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
    },
    InList {
        expr: Box<Expr>,
        negated: bool,
        list: Vec<Expr>,
    },
    InSubquery {
        expr: Box<Expr>,
        negated: bool,
        subquery: Box<SelectStatement>,
    },
    MemberOf {
        expr: Box<Expr>,
        negated: bool,
        collection: PathName,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    IsEmpty {
        path: PathName,
        negated: bool,
    },
    Function(Function),
    Trim {
        spec: Option<TrimSpec>,
        trim_char: Option<Box<Expr>>,
        expr: Box<Expr>,
    },
    CurrentDateTime(DateTimeFunction),
    /// Scalar subquery.
    Subquery(Box<SelectStatement>),
    Exists(Box<SelectStatement>),
    /// ALL/ANY/SOME on the right side of a comparison.
    Quantified {
        quantifier: Quantifier,
        subquery: Box<SelectStatement>,
    },
}

impl AstParseable for Expr {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_or(parser)
    }
}

impl Expr {
    fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
        Expr::BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn parse_or(parser: &mut Parser) -> Result<Expr> {
        let mut expr = Self::parse_and(parser)?;
        while parser.parse_keyword(Keyword::OR) {
            let right = Self::parse_and(parser)?;
            expr = Self::binary(expr, BinaryOperator::Or, right);
        }
        Ok(expr)
    }

    pub fn parse_and(parser: &mut Parser) -> Result<Expr> {
        let mut expr = Self::parse_not(parser)?;
        while parser.parse_keyword(Keyword::AND) {
            let right = Self::parse_not(parser)?;
            expr = Self::binary(expr, BinaryOperator::And, right);
        }
        Ok(expr)
    }

    pub fn parse_not(parser: &mut Parser) -> Result<Expr> {
        if parser.parse_keyword(Keyword::NOT) {
            let expr = Self::parse_not(parser)?;
            return Ok(Expr::UnaryExpr {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        Self::parse_cmp(parser)
    }

    /// Parse a comparison, including the BETWEEN, LIKE, IN, MEMBER OF and IS
    /// forms.
    pub fn parse_cmp(parser: &mut Parser) -> Result<Expr> {
        let expr = Self::parse_concat(parser)?;

        let negated = if parser.peek_is_keyword(Keyword::NOT) {
            let follows = [Keyword::BETWEEN, Keyword::LIKE, Keyword::IN, Keyword::MEMBER]
                .iter()
                .any(|kw| parser.peek_nth_is_keyword(1, *kw));
            if !follows {
                return Err(parser.error(
                    "NOT must be followed by BETWEEN, LIKE, IN or MEMBER",
                    Some("BETWEEN, LIKE, IN or MEMBER"),
                ));
            }
            parser.parse_keyword(Keyword::NOT);
            true
        } else {
            false
        };

        let keyword = parser.parse_one_of_keywords(&[
            Keyword::BETWEEN,
            Keyword::LIKE,
            Keyword::IN,
            Keyword::MEMBER,
            Keyword::IS,
        ]);

        match keyword {
            Some(Keyword::BETWEEN) => {
                let low = Self::parse_concat(parser)?;
                parser.expect_keyword(Keyword::AND)?;
                let high = Self::parse_concat(parser)?;
                Ok(Expr::Between {
                    expr: Box::new(expr),
                    negated,
                    low: Box::new(low),
                    high: Box::new(high),
                })
            }
            Some(Keyword::LIKE) => {
                let pattern = Self::parse_concat(parser)?;
                let escape = if parser.parse_keyword(Keyword::ESCAPE) {
                    Some(Box::new(Self::parse_simple_term(parser)?))
                } else {
                    None
                };
                Ok(Expr::Like {
                    expr: Box::new(expr),
                    negated,
                    pattern: Box::new(pattern),
                    escape,
                })
            }
            Some(Keyword::IN) => {
                parser.expect_token(&Token::LeftParen)?;
                if parser.peek_is_keyword(Keyword::SELECT) {
                    let subquery = SelectStatement::parse_subquery(parser)?;
                    parser.expect_token(&Token::RightParen)?;
                    return Ok(Expr::InSubquery {
                        expr: Box::new(expr),
                        negated,
                        subquery: Box::new(subquery),
                    });
                }

                let mut list = vec![Self::parse_concat(parser)?];
                while parser.consume_token(&Token::Comma) {
                    list.push(Self::parse_concat(parser)?);
                }
                parser.expect_token(&Token::RightParen)?;
                Ok(Expr::InList {
                    expr: Box::new(expr),
                    negated,
                    list,
                })
            }
            Some(Keyword::MEMBER) => {
                parser.parse_keyword(Keyword::OF);
                let collection = PathName::parse(parser)?;
                Ok(Expr::MemberOf {
                    expr: Box::new(expr),
                    negated,
                    collection,
                })
            }
            Some(Keyword::IS) => Self::parse_is(parser, expr),
            _ => {
                let op = parser
                    .peek()
                    .and_then(|t| BinaryOperator::from_comparison_token(&t.token));
                match op {
                    Some(op) => {
                        parser.next_token();
                        let right = Self::parse_comparison_rhs(parser)?;
                        Ok(Self::binary(expr, op, right))
                    }
                    None => Ok(expr),
                }
            }
        }
    }

    fn parse_comparison_rhs(parser: &mut Parser) -> Result<Expr> {
        let quantifier = parser.parse_one_of_keywords(&[Keyword::ALL, Keyword::ANY, Keyword::SOME]);
        let quantifier = match quantifier {
            Some(Keyword::ALL) => Quantifier::All,
            Some(Keyword::ANY) => Quantifier::Any,
            Some(_) => Quantifier::Some,
            None => return Self::parse_concat(parser),
        };

        parser.expect_token(&Token::LeftParen)?;
        let subquery = SelectStatement::parse_subquery(parser)?;
        parser.expect_token(&Token::RightParen)?;
        Ok(Expr::Quantified {
            quantifier,
            subquery: Box::new(subquery),
        })
    }

    /// Parse the remainder of an `IS [NOT] NULL` or `IS [NOT] EMPTY` postfix.
    /// The IS keyword has already been consumed.
    fn parse_is(parser: &mut Parser, expr: Expr) -> Result<Expr> {
        let negated = parser.parse_keyword(Keyword::NOT);

        if parser.parse_keyword(Keyword::NULL) {
            return Ok(Expr::IsNull {
                expr: Box::new(expr),
                negated,
            });
        }

        if parser.peek_is_keyword(Keyword::EMPTY) {
            return match expr {
                Expr::Path(path) => {
                    parser.next_token();
                    Ok(Expr::IsEmpty { path, negated })
                }
                _ => Err(parser.error(
                    "IS EMPTY requires a collection-valued path",
                    Some("path expression"),
                )),
            };
        }

        Err(parser.error("Expected NULL or EMPTY after IS", Some("NULL or EMPTY")))
    }

    pub fn parse_concat(parser: &mut Parser) -> Result<Expr> {
        let mut expr = Self::parse_add(parser)?;
        while parser.consume_token(&Token::Concat) {
            let right = Self::parse_add(parser)?;
            expr = Self::binary(expr, BinaryOperator::Concat, right);
        }
        Ok(expr)
    }

    pub fn parse_add(parser: &mut Parser) -> Result<Expr> {
        let mut expr = Self::parse_mul(parser)?;
        loop {
            let op = if parser.consume_token(&Token::Plus) {
                BinaryOperator::Plus
            } else if parser.consume_token(&Token::Minus) {
                BinaryOperator::Minus
            } else {
                return Ok(expr);
            };
            let right = Self::parse_mul(parser)?;
            expr = Self::binary(expr, op, right);
        }
    }

    pub fn parse_mul(parser: &mut Parser) -> Result<Expr> {
        let mut expr = Self::parse_term(parser)?;
        loop {
            let op = if parser.consume_token(&Token::Mul) {
                BinaryOperator::Multiply
            } else if parser.consume_token(&Token::Div) {
                BinaryOperator::Divide
            } else if parser.consume_token(&Token::Mod) {
                BinaryOperator::Modulo
            } else {
                return Ok(expr);
            };
            let right = Self::parse_term(parser)?;
            expr = Self::binary(expr, op, right);
        }
    }

    pub fn parse_term(parser: &mut Parser) -> Result<Expr> {
        let op = if parser.consume_token(&Token::Minus) {
            UnaryOperator::Minus
        } else if parser.consume_token(&Token::Plus) {
            UnaryOperator::Plus
        } else {
            return Self::parse_simple_term(parser);
        };
        let expr = Self::parse_term(parser)?;
        Ok(Expr::UnaryExpr {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn parse_simple_term(parser: &mut Parser) -> Result<Expr> {
        let tok = match parser.peek() {
            Some(tok) => tok.clone(),
            None => return Err(parser.error("Unexpected end of query", Some("expression"))),
        };

        match &tok.token {
            Token::LeftParen => {
                parser.next_token();
                if parser.peek_is_keyword(Keyword::SELECT) {
                    let subquery = SelectStatement::parse_subquery(parser)?;
                    parser.expect_token(&Token::RightParen)?;
                    return Ok(Expr::Subquery(Box::new(subquery)));
                }
                let expr = Expr::parse(parser)?;
                parser.expect_token(&Token::RightParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            Token::Number(num) => {
                parser.next_token();
                match parse_number(num) {
                    Some(lit) => Ok(Expr::Literal(lit)),
                    None => Err(parser.error_at(Some(&tok), "Numeric literal out of range", None)),
                }
            }
            Token::SingleQuotedString(s) => {
                parser.next_token();
                Ok(Expr::Literal(Literal::String(s.clone())))
            }
            Token::Parameter(param) => {
                parser.next_token();
                Ok(Expr::Parameter(parser.parameter(&tok, param)))
            }
            Token::Word(word) => match word.keyword {
                Some(Keyword::TRUE) => {
                    parser.next_token();
                    Ok(Expr::Literal(Literal::Boolean(true)))
                }
                Some(Keyword::FALSE) => {
                    parser.next_token();
                    Ok(Expr::Literal(Literal::Boolean(false)))
                }
                Some(Keyword::NULL) => {
                    parser.next_token();
                    Ok(Expr::Null)
                }
                Some(Keyword::EXISTS) => {
                    parser.next_token();
                    parser.expect_token(&Token::LeftParen)?;
                    let subquery = SelectStatement::parse_subquery(parser)?;
                    parser.expect_token(&Token::RightParen)?;
                    Ok(Expr::Exists(Box::new(subquery)))
                }
                Some(Keyword::CURRENT_DATE) => {
                    parser.next_token();
                    Ok(Expr::CurrentDateTime(DateTimeFunction::CurrentDate))
                }
                Some(Keyword::CURRENT_TIME) => {
                    parser.next_token();
                    Ok(Expr::CurrentDateTime(DateTimeFunction::CurrentTime))
                }
                Some(Keyword::CURRENT_TIMESTAMP) => {
                    parser.next_token();
                    Ok(Expr::CurrentDateTime(DateTimeFunction::CurrentTimestamp))
                }
                Some(Keyword::TRIM) => {
                    parser.next_token();
                    Self::parse_trim(parser)
                }
                Some(kw) if kw.is_function() => {
                    let location = parser.location();
                    parser.next_token();
                    Self::parse_function_args(parser, Ident::new(&word.value), location)
                }
                _ if parser.peek_is_ident() => {
                    if matches!(parser.peek_nth(1).map(|t| &t.token), Some(Token::LeftParen)) {
                        let location = parser.location();
                        let name = parser.parse_ident()?;
                        return Self::parse_function_args(parser, name, location);
                    }
                    Ok(Expr::Path(PathName::parse(parser)?))
                }
                _ => Err(parser.error_at(
                    Some(&tok),
                    format!("Unexpected keyword {}", word.value.to_uppercase()),
                    Some("expression"),
                )),
            },
            other => Err(parser.error_at(
                Some(&tok),
                format!("Unexpected token '{other}'"),
                Some("expression"),
            )),
        }
    }

    /// Parse the parenthesized argument list of a function call. The function
    /// name has already been consumed.
    fn parse_function_args(parser: &mut Parser, name: Ident, location: Location) -> Result<Expr> {
        parser.expect_token(&Token::LeftParen)?;
        let distinct = parser.parse_keyword(Keyword::DISTINCT);

        let mut args = Vec::new();
        if !parser.consume_token(&Token::RightParen) {
            args.push(Expr::parse(parser)?);
            while parser.consume_token(&Token::Comma) {
                args.push(Expr::parse(parser)?);
            }
            parser.expect_token(&Token::RightParen)?;
        }

        Ok(Expr::Function(Function {
            name,
            args,
            distinct,
            location,
        }))
    }

    /// Parse `TRIM([[LEADING|TRAILING|BOTH] [char] FROM] expr)`. The TRIM
    /// keyword has already been consumed.
    fn parse_trim(parser: &mut Parser) -> Result<Expr> {
        parser.expect_token(&Token::LeftParen)?;

        let spec = match parser.parse_one_of_keywords(&[
            Keyword::LEADING,
            Keyword::TRAILING,
            Keyword::BOTH,
        ]) {
            Some(Keyword::LEADING) => Some(TrimSpec::Leading),
            Some(Keyword::TRAILING) => Some(TrimSpec::Trailing),
            Some(_) => Some(TrimSpec::Both),
            None => None,
        };

        let mut trim_char = None;
        let expr = if parser.parse_keyword(Keyword::FROM) {
            Self::parse_concat(parser)?
        } else if spec.is_some() {
            trim_char = Some(Box::new(Self::parse_concat(parser)?));
            parser.expect_keyword(Keyword::FROM)?;
            Self::parse_concat(parser)?
        } else {
            let first = Self::parse_concat(parser)?;
            if parser.parse_keyword(Keyword::FROM) {
                trim_char = Some(Box::new(first));
                Self::parse_concat(parser)?
            } else {
                first
            }
        };

        parser.expect_token(&Token::RightParen)?;
        Ok(Expr::Trim {
            spec,
            trim_char,
            expr: Box::new(expr),
        })
    }
}

fn parse_number(num: &Number) -> Option<Literal> {
    Some(match num.kind {
        NumberKind::Integer => Literal::Integer(num.value.parse().ok()?),
        NumberKind::Long => Literal::Long(num.value.parse().ok()?),
        NumberKind::Double => Literal::Double(num.value.parse().ok()?),
    })
}
