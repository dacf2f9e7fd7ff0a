use serde_json::Value;

use super::ast::{BinaryOperator, Expression, UnaryOperator};
use super::lexer::{Lexer, Token};
use crate::error::{DynSqlError, DynSqlResult};

/// Recursive-descent parser for the expression language.
///
/// Precedence, loosest first: `or`, `and`, equality, comparison,
/// additive, multiplicative, unary, postfix (`.field`, `[index]`).
pub struct Parser {
    source: String,
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(input: &str) -> DynSqlResult<Self> {
        let tokens = Lexer::new(input).tokenize()?;

        Ok(Self {
            source: input.to_string(),
            tokens,
            position: 0,
        })
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> DynSqlError {
        DynSqlError::expression(&self.source, message)
    }

    fn expect(&mut self, expected: Token) -> DynSqlResult<()> {
        if self.current_token() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {:?}, got {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    pub fn parse(&mut self) -> DynSqlResult<Expression> {
        let expr = self.parse_or()?;
        if self.current_token() != &Token::Eof {
            return Err(self.error(format!("trailing token {:?}", self.current_token())));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> DynSqlResult<Expression> {
        let mut left = self.parse_and()?;
        while self.current_token() == &Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expression::Binary(Box::new(left), BinaryOperator::Or, Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> DynSqlResult<Expression> {
        let mut left = self.parse_equality()?;
        while self.current_token() == &Token::And {
            self.advance();
            let right = self.parse_equality()?;
            left = Expression::Binary(Box::new(left), BinaryOperator::And, Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> DynSqlResult<Expression> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current_token() {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expression::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_comparison(&mut self) -> DynSqlResult<Expression> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current_token() {
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessThanEq => BinaryOperator::LessThanOrEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterThanEq => BinaryOperator::GreaterThanOrEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expression::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> DynSqlResult<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> DynSqlResult<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> DynSqlResult<Expression> {
        match self.current_token() {
            Token::Bang | Token::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::Unary(UnaryOperator::Not, Box::new(operand)))
            }
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::Unary(UnaryOperator::Minus, Box::new(operand)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> DynSqlResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current_token() {
                Token::Dot => {
                    self.advance();
                    let field = match self.current_token() {
                        Token::Identifier(name) => name.clone(),
                        other => {
                            return Err(
                                self.error(format!("expected field name after '.', got {other:?}"))
                            )
                        }
                    };
                    self.advance();
                    expr = Expression::FieldAccess(Box::new(expr), field);
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expression::IndexAccess(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> DynSqlResult<Expression> {
        let expr = match self.current_token().clone() {
            Token::Null => Expression::Literal(Value::Null),
            Token::True => Expression::Literal(Value::Bool(true)),
            Token::False => Expression::Literal(Value::Bool(false)),
            Token::Integer(i) => Expression::Literal(Value::from(i)),
            Token::Float(f) => Expression::Literal(
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| self.error("non-finite float literal"))?,
            ),
            Token::String(s) => Expression::Literal(Value::String(s)),
            Token::Identifier(name) => Expression::Identifier(name),
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RightParen)?;
                return Ok(inner);
            }
            other => return Err(self.error(format!("unexpected token {other:?}"))),
        };
        self.advance();
        Ok(expr)
    }
}
