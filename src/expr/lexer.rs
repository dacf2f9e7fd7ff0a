use crate::error::{DynSqlError, DynSqlResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,
    True,
    False,
    Null,

    // Identifiers and literals
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),

    // Operators
    Equal,         // ==
    NotEqual,      // !=
    LessThan,      // <
    LessThanEq,    // <=
    GreaterThan,   // >
    GreaterThanEq, // >=
    Plus,          // +
    Minus,         // -
    Star,          // *
    Slash,         // /
    Percent,       // %
    Bang,          // !

    // Delimiters
    Dot,          // .
    LeftBracket,  // [
    RightBracket, // ]
    LeftParen,    // (
    RightParen,   // )

    // Special
    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> DynSqlResult<Token> {
        let mut num_str = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                // A dot not followed by a digit belongs to member access
                match self.peek() {
                    Some(next) if next.is_ascii_digit() => {
                        has_dot = true;
                        num_str.push(ch);
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        if has_dot {
            num_str
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|e| DynSqlError::expression(&num_str, format!("invalid number: {e}")))
        } else {
            num_str
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|e| DynSqlError::expression(&num_str, format!("invalid number: {e}")))
        }
    }

    fn read_string(&mut self, quote: char) -> DynSqlResult<Token> {
        self.advance(); // consume the opening quote
        let mut s = String::new();

        loop {
            match self.current_char {
                Some(ch) if ch == quote => {
                    self.advance();
                    return Ok(Token::String(s));
                }
                Some('\\') => {
                    self.advance();
                    match self.current_char {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(DynSqlError::expression(
                                s,
                                "unterminated string literal",
                            ))
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    s.push(ch);
                    self.advance();
                }
                None => return Err(DynSqlError::expression(s, "unterminated string literal")),
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Identifier(ident),
        }
    }

    pub fn next_token(&mut self) -> DynSqlResult<Token> {
        self.skip_whitespace();

        let ch = match self.current_char {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        if ch.is_ascii_digit() {
            return self.read_number();
        }
        if ch.is_alphabetic() || ch == '_' {
            return Ok(self.read_identifier());
        }
        if ch == '\'' || ch == '"' {
            return self.read_string(ch);
        }

        let token = match ch {
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Equal
                } else {
                    return Err(DynSqlError::expression(
                        "=",
                        "unexpected '=' (use '==' for comparison)",
                    ));
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::NotEqual
                } else {
                    Token::Bang
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::LessThanEq
                } else {
                    Token::LessThan
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::GreaterThanEq
                } else {
                    Token::GreaterThan
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    Token::And
                } else {
                    return Err(DynSqlError::expression("&", "unexpected '&'"));
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    Token::Or
                } else {
                    return Err(DynSqlError::expression("|", "unexpected '|'"));
                }
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '.' => Token::Dot,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            other => {
                return Err(DynSqlError::expression(
                    other.to_string(),
                    "unexpected character",
                ))
            }
        };
        self.advance();
        Ok(token)
    }

    pub fn tokenize(&mut self) -> DynSqlResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}
