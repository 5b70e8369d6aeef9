//! Literal-structure parser for module descriptors
//!
//! Descriptors are written as a single literal expression: dictionaries,
//! lists, tuples, strings, numbers, `True`, `False` and `None`. Nothing is
//! evaluated; any name, call or operator other than a unary sign is a parse
//! error.
//!
//! Supported lexical forms:
//! - `#` comments and arbitrary whitespace
//! - single, double and triple quoted strings with `r`/`u`/`b` prefixes
//! - adjacent string literals are concatenated
//! - decimal, hexadecimal, octal and binary integers; floats with exponent
//! - trailing commas in containers
//!
//! Tuples and lists both become JSON arrays. Dictionary keys must be
//! strings, integers or booleans; non-string keys are stringified.

use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

/// Deepest container nesting accepted
pub const MAX_DEPTH: usize = 128;

/// Parse failure with a 1-based source position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct LiteralError {
    /// 1-based line
    pub line: usize,
    /// 1-based column (in characters)
    pub column: usize,
    /// What went wrong
    pub message: String,
}

/// Parse a complete literal expression
pub fn parse_literal(src: &str) -> Result<JsonValue, LiteralError> {
    let mut parser = Parser {
        src,
        pos: 0,
        depth: 0,
    };
    parser.skip_trivia();
    let value = parser.parse_value()?;
    parser.skip_trivia();
    if parser.pos < src.len() {
        return Err(parser.error("unexpected trailing content"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        let consumed = &self.src[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit('\n')
            .next()
            .map(|l| l.chars().count())
            .unwrap_or(0)
            + 1;
        LiteralError {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('\\') if matches!(self.peek_nth(1), Some('\n')) => {
                    self.pos += 2;
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn parse_value(&mut self) -> Result<JsonValue, LiteralError> {
        match self.peek() {
            Some(open @ ('{' | '[' | '(')) => {
                if self.depth >= MAX_DEPTH {
                    return Err(self.error(format!("nested deeper than {} levels", MAX_DEPTH)));
                }
                self.depth += 1;
                let value = match open {
                    '{' => self.parse_dict(),
                    '[' => self.parse_sequence('[', ']'),
                    _ => self.parse_parenthesized(),
                };
                self.depth -= 1;
                value
            }
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() || c == '.' => {
                self.parse_number()
            }
            Some(c) if c == '\'' || c == '"' => self.parse_strings(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                if self.at_string_prefix() {
                    self.parse_strings()
                } else {
                    self.parse_keyword()
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_dict(&mut self) -> Result<JsonValue, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(JsonValue::Object(map));
            }
            let key = match self.parse_value()? {
                JsonValue::String(s) => s,
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => if b { "True" } else { "False" }.to_string(),
                _ => return Err(self.error("dictionary keys must be strings or numbers")),
            };
            self.skip_trivia();
            self.expect(':')?;
            self.skip_trivia();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                _ => return Err(self.error("expected ',' or '}' in dictionary")),
            }
        }
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<JsonValue, LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(JsonValue::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {}
                _ => return Err(self.error(format!("expected ',' or '{}'", close))),
            }
        }
    }

    /// `(x)` is a grouped value, `(x,)` and `()` are tuples
    fn parse_parenthesized(&mut self) -> Result<JsonValue, LiteralError> {
        self.expect('(')?;
        self.skip_trivia();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(JsonValue::Array(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_trivia();
        match self.peek() {
            Some(')') => {
                self.bump();
                Ok(first)
            }
            Some(',') => {
                self.bump();
                let mut items = vec![first];
                loop {
                    self.skip_trivia();
                    if self.peek() == Some(')') {
                        self.bump();
                        return Ok(JsonValue::Array(items));
                    }
                    items.push(self.parse_value()?);
                    self.skip_trivia();
                    match self.peek() {
                        Some(',') => {
                            self.bump();
                        }
                        Some(')') => {}
                        _ => return Err(self.error("expected ',' or ')'")),
                    }
                }
            }
            _ => Err(self.error("expected ',' or ')'")),
        }
    }

    fn parse_keyword(&mut self) -> Result<JsonValue, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "True" => Ok(JsonValue::Bool(true)),
            "False" => Ok(JsonValue::Bool(false)),
            "None" => Ok(JsonValue::Null),
            other => {
                self.pos = start;
                Err(self.error(format!("names are not allowed in literals: '{}'", other)))
            }
        }
    }

    fn parse_number(&mut self) -> Result<JsonValue, LiteralError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.bump();
                true
            }
            Some('+') => {
                self.bump();
                false
            }
            _ => false,
        };
        self.skip_trivia();
        let body_start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_alphanumeric() || c == '.' || c == '_'
        ) {
            let c = self.bump();
            // exponent sign
            if matches!(c, Some('e') | Some('E'))
                && matches!(self.peek(), Some('+') | Some('-'))
                && !self.src[body_start..self.pos].starts_with("0x")
            {
                self.bump();
            }
        }
        let body: String = self.src[body_start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if body.is_empty() {
            self.pos = start;
            return Err(self.error("expected a number"));
        }
        let lower = body.to_ascii_lowercase();
        let radix = match lower.get(..2) {
            Some("0x") => Some(16),
            Some("0o") => Some(8),
            Some("0b") => Some(2),
            _ => None,
        };
        let number = if let Some(radix) = radix {
            let digits = &lower[2..];
            i64::from_str_radix(digits, radix)
                .map(|n| Number::from(if negative { -n } else { n }))
                .map_err(|_| self.error(format!("invalid integer literal '{}'", body)))?
        } else if lower.contains(['.', 'e']) {
            let f: f64 = lower
                .parse()
                .map_err(|_| self.error(format!("invalid float literal '{}'", body)))?;
            let f = if negative { -f } else { f };
            Number::from_f64(f).ok_or_else(|| self.error("float is not finite"))?
        } else {
            let n: i64 = lower
                .parse()
                .map_err(|_| self.error(format!("invalid integer literal '{}'", body)))?;
            Number::from(if negative { -n } else { n })
        };
        Ok(JsonValue::Number(number))
    }

    fn at_string_prefix(&self) -> bool {
        let prefix: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        let quote_follows = matches!(
            self.peek_nth(prefix.chars().count()),
            Some('\'') | Some('"')
        );
        quote_follows
            && !prefix.is_empty()
            && prefix.len() <= 2
            && prefix
                .chars()
                .all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'u' | 'b'))
    }

    /// One or more adjacent string literals, concatenated
    fn parse_strings(&mut self) -> Result<JsonValue, LiteralError> {
        let mut out = self.parse_string()?;
        loop {
            let save = self.pos;
            self.skip_trivia();
            let next_is_string = match self.peek() {
                Some('\'') | Some('"') => true,
                Some(c) if c.is_ascii_alphabetic() => self.at_string_prefix(),
                _ => false,
            };
            if next_is_string {
                out.push_str(&self.parse_string()?);
            } else {
                self.pos = save;
                return Ok(JsonValue::String(out));
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, LiteralError> {
        let mut raw = false;
        while let Some(c) = self.peek() {
            if c == '\'' || c == '"' {
                break;
            }
            if c.eq_ignore_ascii_case(&'r') {
                raw = true;
            }
            self.bump();
        }
        let quote = self
            .bump()
            .ok_or_else(|| self.error("expected string"))?;
        let triple = self.peek() == Some(quote) && self.peek_nth(1) == Some(quote);
        if triple {
            self.pos += 2 * quote.len_utf8();
        }

        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.peek_nth(1) == Some(quote) {
                    self.pos += 2 * quote.len_utf8();
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error("newline in single-quoted string"));
            }
            if c == '\\' {
                let esc = self
                    .bump()
                    .ok_or_else(|| self.error("unterminated escape"))?;
                if raw {
                    out.push('\\');
                    out.push(esc);
                    continue;
                }
                match esc {
                    '\n' => {}
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    'x' => out.push(self.parse_hex_escape(2)?),
                    'u' => out.push(self.parse_hex_escape(4)?),
                    'U' => out.push(self.parse_hex_escape(8)?),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
        }
    }

    fn parse_hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let hex: String = self.rest().chars().take(digits).collect();
        if hex.len() != digits {
            return Err(self.error("truncated escape sequence"));
        }
        let code = u32::from_str_radix(&hex, 16)
            .map_err(|_| self.error(format!("invalid escape '{}'", hex)))?;
        self.pos += digits;
        char::from_u32(code).ok_or_else(|| self.error(format!("invalid code point {:x}", code)))
    }
}
