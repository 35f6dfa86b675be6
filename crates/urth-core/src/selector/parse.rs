// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Textual selector parser.

use super::{Operator, Requirement, Result, SelectorError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Comma,
    Open,
    Close,
    Bang,
    Eq,
    DoubleEq,
    NotEq,
    Gt,
    Lt,
}

fn is_special(c: char) -> bool {
    matches!(c, ',' | '(' | ')' | '!' | '=' | '<' | '>') || c.is_whitespace()
}

fn tokenize(input: &str) -> Vec<(usize, Token<'_>)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            ',' => Token::Comma,
            '(' => Token::Open,
            ')' => Token::Close,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '=' => {
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::DoubleEq
                } else {
                    Token::Eq
                }
            }
            '!' => {
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            _ => {
                let mut end = pos + c.len_utf8();
                while let Some((next, c)) = chars.next_if(|&(_, c)| !is_special(c)) {
                    end = next + c.len_utf8();
                }
                Token::Word(&input[pos..end])
            }
        };
        tokens.push((pos, token));
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<(usize, Token<'a>)>,
    cursor: usize,
    len: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(pos, _)| *pos)
            .unwrap_or(self.len)
    }

    fn error(&self, message: impl Into<String>) -> SelectorError {
        SelectorError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expect_word(&mut self, what: &str) -> Result<&'a str> {
        match self.peek() {
            Some(Token::Word(word)) => {
                let word = *word;
                self.cursor += 1;
                Ok(word)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn at_requirement_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Comma))
    }

    fn requirement(&mut self) -> Result<Requirement> {
        if self.peek() == Some(&Token::Bang) {
            self.cursor += 1;
            let key = self.expect_word("label key after '!'")?;
            return Requirement::new(key, Operator::DoesNotExist, std::iter::empty::<&str>());
        }

        let key = self.expect_word("label key")?;
        if self.at_requirement_end() {
            return Requirement::new(key, Operator::Exists, std::iter::empty::<&str>());
        }

        let operator = match self.peek() {
            Some(Token::Eq | Token::DoubleEq) => Operator::Equals,
            Some(Token::NotEq) => Operator::NotEquals,
            Some(Token::Gt) => Operator::GreaterThan,
            Some(Token::Lt) => Operator::LessThan,
            Some(Token::Word("in")) => Operator::In,
            Some(Token::Word("notin")) => Operator::NotIn,
            _ => return Err(self.error("expected operator")),
        };
        self.cursor += 1;

        match operator {
            Operator::In | Operator::NotIn => {
                let values = self.value_set()?;
                Requirement::new(key, operator, values)
            }
            Operator::Equals | Operator::NotEquals if self.at_requirement_end() => {
                Requirement::new(key, operator, [""])
            }
            _ => {
                let value = self.expect_word("value")?;
                Requirement::new(key, operator, [value])
            }
        }
    }

    fn value_set(&mut self) -> Result<Vec<&'a str>> {
        if self.peek() != Some(&Token::Open) {
            return Err(self.error("expected '('"));
        }
        self.cursor += 1;

        let mut values = Vec::new();
        loop {
            values.push(self.expect_word("value")?);
            match self.peek() {
                Some(Token::Comma) => self.cursor += 1,
                Some(Token::Close) => {
                    self.cursor += 1;
                    return Ok(values);
                }
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }
}

/// Parse a textual selector into requirements.
pub(super) fn parse(input: &str) -> Result<Vec<Requirement>> {
    let mut parser = Parser {
        tokens: tokenize(input),
        cursor: 0,
        len: input.len(),
    };

    let mut requirements = Vec::new();
    if parser.peek().is_none() {
        return Ok(requirements);
    }

    loop {
        requirements.push(parser.requirement()?);
        match parser.peek() {
            None => return Ok(requirements),
            Some(Token::Comma) => parser.cursor += 1,
            Some(_) => return Err(parser.error("expected ','")),
        }
    }
}
