//! Permissive literal-expression decoder.
//!
//! Accepts the "repr" dialect that upstream exporters produce when a nested record is
//! stringified by a scripting runtime instead of a JSON encoder:
//!
//! - single- or double-quoted strings (with backslash escapes)
//! - `True`/`False`/`None` alongside `true`/`false`/`null`
//! - tuples `( .. )`, decoded as lists
//! - one trailing comma in lists, tuples and maps
//! - numeric, boolean or string map keys (non-string keys are rendered to text)
//!
//! It is still a *well-formed* dialect: bare identifiers, doubled commas, unbalanced
//! brackets and trailing garbage are rejected.

use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

const MAX_DEPTH: usize = 128;

/// Why a literal could not be decoded; `offset` is a byte offset into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for LiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl std::error::Error for LiteralError {}

/// Decode a whole string as one literal.
///
/// # Errors
/// Returns a [`LiteralError`] if the text is not a single well-formed literal.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut p = Parser {
        src: input.as_bytes(),
        pos: 0,
        depth: 0,
    };
    p.skip_ws();
    let v = p.value()?;
    p.skip_ws();
    if p.pos != p.src.len() {
        return Err(p.err("unexpected trailing characters"));
    }
    Ok(v)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn err(&self, message: &str) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        match self.peek() {
            Some(b'{') => self.nested(b'}', true),
            Some(b'[') => self.nested(b']', false),
            Some(b'(') => self.nested(b')', false),
            Some(q @ (b'\'' | b'"')) => self.string(q).map(Value::Str),
            Some(b'-' | b'+' | b'.' | b'0'..=b'9') => self.number(),
            Some(b) if b.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.err("unexpected character")),
            None => Err(self.err("unexpected end of input")),
        }
    }

    /// Shared comma-separated body for maps (`is_map`) and sequences.
    fn nested(&mut self, close: u8, is_map: bool) -> Result<Value, LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.err("nesting too deep"));
        }
        self.pos += 1; // opening bracket
        let mut items = Vec::new();
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                break;
            }
            if is_map {
                let key = self.key()?;
                self.skip_ws();
                if !self.eat(b':') {
                    return Err(self.err("expected ':' after key"));
                }
                self.skip_ws();
                let v = self.value()?;
                map.insert(key, v);
            } else {
                items.push(self.value()?);
            }
            self.skip_ws();
            if self.eat(b',') {
                // a single trailing comma is allowed, a doubled one is not
                self.skip_ws();
                if self.peek() == Some(b',') {
                    return Err(self.err("empty element"));
                }
                continue;
            }
            if self.eat(close) {
                break;
            }
            return Err(self.err("expected ',' or closing bracket"));
        }
        self.depth -= 1;
        Ok(if is_map { Value::Map(map) } else { Value::List(items) })
    }

    fn key(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        match self.value()? {
            Value::Str(s) => Ok(s),
            k @ (Value::Int(_) | Value::Float(_) | Value::Bool(_)) => Ok(k.render()),
            _ => {
                self.pos = start;
                Err(self.err("unsupported map key"))
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<String, LiteralError> {
        self.pos += 1;
        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.err("unterminated string"));
            };
            self.pos += 1;
            match b {
                b if b == quote => break,
                b'\\' => {
                    let Some(esc) = self.peek() else {
                        return Err(self.err("unterminated escape"));
                    };
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'0' => out.push(0),
                        b'\\' | b'\'' | b'"' | b'/' => out.push(esc),
                        b'x' => self.push_code_point(&mut out, 2)?,
                        b'u' => self.push_code_point(&mut out, 4)?,
                        _ => {
                            // unknown escapes are kept verbatim, like the source dialect does
                            out.push(b'\\');
                            out.push(esc);
                        }
                    }
                }
                b'\n' => return Err(self.err("newline in string")),
                _ => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| self.err("invalid utf-8 in string"))
    }

    fn push_code_point(&mut self, out: &mut Vec<u8>, digits: usize) -> Result<(), LiteralError> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .and_then(|h| std::str::from_utf8(h).ok())
            .ok_or_else(|| self.err("truncated escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.err("bad hex escape"))?;
        let ch = char::from_u32(code).ok_or_else(|| self.err("invalid code point"))?;
        self.pos = end;
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'-' | b'+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' | b'_' => {}
                b'.' | b'e' | b'E' => is_float = true,
                b'-' | b'+' if matches!(self.src.get(self.pos - 1), Some(b'e' | b'E')) => {}
                _ => break,
            }
            self.pos += 1;
        }
        let text: String = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.err("invalid number"))?
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if !text.bytes().any(|b| b.is_ascii_digit()) {
            self.pos = start;
            return Err(self.err("invalid number"));
        }
        let parsed = if is_float {
            text.parse::<f64>().ok().map(Value::Float)
        } else {
            text.parse::<i64>()
                .ok()
                .map(Value::Int)
                .or_else(|| text.parse::<f64>().ok().map(Value::Float))
        };
        parsed.ok_or_else(|| {
            let mut e = self.err("invalid number");
            e.offset = start;
            e
        })
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            b"True" | b"true" => Ok(Value::Bool(true)),
            b"False" | b"false" => Ok(Value::Bool(false)),
            b"None" | b"null" => Ok(Value::Null),
            _ => {
                self.pos = start;
                Err(self.err("bare identifier"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quoted_map() {
        let v = parse_literal("{'iv_total': 18, 'iv_max': 31}").unwrap();
        let m = v.as_map().unwrap();
        assert_eq!(m.get("iv_total"), Some(&Value::Int(18)));
        assert_eq!(m.get("iv_max"), Some(&Value::Int(31)));
    }

    #[test]
    fn script_keywords_tuples_and_trailing_comma() {
        let v = parse_literal("{'shiny': True, 'owner': None, 'pos': (1, -2.5,), }").unwrap();
        assert_eq!(v.get_path(&["shiny"]), Some(&Value::Bool(true)));
        assert_eq!(v.get_path(&["owner"]), Some(&Value::Null));
        assert_eq!(
            v.get_path(&["pos"]),
            Some(&Value::List(vec![Value::Int(1), Value::Float(-2.5)]))
        );
    }

    #[test]
    fn escapes_and_mixed_quotes() {
        let v = parse_literal(r#"["it\'s", 'say "hi"', "é"]"#).unwrap();
        assert_eq!(
            v,
            Value::List(vec!["it's".into(), "say \"hi\"".into(), "é".into()])
        );
    }

    #[test]
    fn rejects_malformed_dialects() {
        for bad in [
            "{iv_total: 18,,}",
            "{'a': 1,,}",
            "{'a' 1}",
            "[1, 2",
            "{'a': 1} extra",
            "undefined",
            "",
            "{[1]: 2}",
        ] {
            assert!(parse_literal(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn numeric_keys_render_to_text() {
        let v = parse_literal("{1: 'a', 2.5: 'b'}").unwrap();
        let m = v.as_map().unwrap();
        assert!(m.contains_key("1"));
        assert!(m.contains_key("2.5"));
    }
}
