//! Whitespace-delimited token reader shared by the calibration file parsers
//!
//! The calibration files are plain text where line breaks carry no meaning
//! beyond separating tokens, so the reader flattens them into one stream and
//! only remembers the line each token came from for error reporting.

use std::fmt;
use std::str::FromStr;

/// A parse failure at a given (1-based) line
#[derive(Debug, Clone, PartialEq)]
pub struct TokenError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

pub struct TokenReader<'a> {
    tokens: Vec<(&'a str, usize)>,
    pos: usize,
    last_line: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(content: &'a str) -> Self {
        let tokens: Vec<(&str, usize)> = content
            .lines()
            .enumerate()
            .flat_map(|(idx, line)| line.split_whitespace().map(move |tok| (tok, idx + 1)))
            .collect();
        let last_line = content.lines().count().max(1);

        Self {
            tokens,
            pos: 0,
            last_line,
        }
    }

    /// Line of the next unread token, or the last line at end of input
    pub fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, line)| *line)
            .unwrap_or(self.last_line)
    }

    /// Number of tokens not consumed yet
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    /// Read the next token and parse it, naming `what` in any error
    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, TokenError> {
        let Some(&(token, line)) = self.tokens.get(self.pos) else {
            return Err(TokenError {
                line: self.last_line,
                message: format!("unexpected end of file, expected {}", what),
            });
        };

        let value = token.parse::<T>().map_err(|_| TokenError {
            line,
            message: format!("expected {}, found {:?}", what, token),
        })?;
        self.pos += 1;
        Ok(value)
    }

    /// Fail if any token is left unread
    pub fn expect_end(&self) -> Result<(), TokenError> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(&(token, line)) => Err(TokenError {
                line,
                message: format!(
                    "unexpected trailing token {:?} ({} unread)",
                    token,
                    self.remaining()
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_span_lines() {
        let mut reader = TokenReader::new("1 2\n\n3\t4\n");
        assert_eq!(reader.parse::<u32>("a").unwrap(), 1);
        assert_eq!(reader.parse::<u32>("b").unwrap(), 2);
        assert_eq!(reader.line(), 3);
        assert_eq!(reader.parse::<f32>("c").unwrap(), 3.0);
        assert_eq!(reader.parse::<u8>("d").unwrap(), 4);
        assert!(reader.expect_end().is_ok());
    }

    #[test]
    fn test_end_of_input_reports_last_line() {
        let mut reader = TokenReader::new("5\n6\n");
        reader.parse::<u32>("x").unwrap();
        reader.parse::<u32>("y").unwrap();
        let err = reader.parse::<u32>("gpu count").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("gpu count"));
    }

    #[test]
    fn test_non_numeric_token() {
        let mut reader = TokenReader::new("abc");
        let err = reader.parse::<u32>("width").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("\"abc\""));
        // Failed parse does not consume the token
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_trailing_tokens() {
        let mut reader = TokenReader::new("1 2");
        reader.parse::<u32>("a").unwrap();
        let err = reader.expect_end().unwrap_err();
        assert!(err.message.contains("\"2\""));
    }
}
