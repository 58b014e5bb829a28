//! Canonical byte encoding (C1).
//!
//! [`Value`] is the structural AST canonicalization operates over: null,
//! booleans, signed integers, finite doubles, UTF-8 strings, ordered
//! sequences, and key -> value maps with unique text keys. [`canonical_bytes`]
//! is the single source of truth for both fingerprint hashing and signature
//! computation: two structurally equal values always produce identical
//! bytes, member keys are always emitted in lexicographic order, and there
//! is never whitespace between tokens.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{Error, Result};

/// A structured value canonicalizable to bytes.
///
/// `Map` is backed by a `BTreeMap` so key ordering is enforced by
/// construction rather than by a sort step at encode time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// A signed integer, emitted with no decimal point.
    Int(i64),
    /// A finite IEEE-754 double, emitted in shortest round-trip form.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A key -> value mapping with unique, lexicographically ordered keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Convenience constructor for a map from an iterator of pairs.
    pub fn map<I: IntoIterator<Item = (&'static str, Value)>>(pairs: I) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Produce the canonical byte form of `value`.
///
/// Rejects non-finite floats and (by construction of [`Value::Map`] on a
/// `BTreeMap`) can never contain duplicate keys.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(n) => {
            write!(out_as_string(out), "{n}").expect("writing to a Vec<u8> cannot fail");
        }
        Value::Float(f) => write_float(*f, out)?,
        Value::Str(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Map(map) => {
            out.push(b'{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(k, out);
                out.push(b':');
                write_value(v, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

/// A thin adapter so `write!` can target a `Vec<u8>` through `fmt::Write`.
struct ByteSink<'a>(&'a mut Vec<u8>);

impl std::fmt::Write for ByteSink<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

fn out_as_string(out: &mut Vec<u8>) -> ByteSink<'_> {
    ByteSink(out)
}

/// Write `f` using `ryu`'s shortest round-trip form, the same algorithm
/// `serde_json` uses internally. This is the load-bearing choice from the
/// design notes: every port of this pipeline must agree on this exact
/// textual representation or fingerprints diverge.
fn write_float(f: f64, out: &mut Vec<u8>) -> Result<()> {
    if !f.is_finite() {
        return Err(Error::encoding(format!("non-finite float: {f}")));
    }
    let mut buf = ryu::Buffer::new();
    let formatted = buf.format_finite(f);
    // ryu always emits a decimal point or exponent; an integral double like
    // 14.0 formats as "14.0" which is already free of trailing zeros beyond
    // the single mandatory digit, matching serde_json's float rendering.
    out.extend_from_slice(formatted.as_bytes());
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                write!(out_as_string(out), "\\u{:04x}", c as u32).expect("vec write cannot fail");
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

/// Parse canonical bytes back into a [`Value`].
///
/// Rejects duplicate keys, trailing content, and malformed number forms.
/// Used by the canonical-idempotence property and by any verifier that
/// needs to inspect a received envelope's structure.
pub fn parse(bytes: &[u8]) -> Result<Value> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| Error::encoding(format!("not valid UTF-8: {e}")))?;
    let mut parser = Parser { s: s.as_bytes(), pos: 0 };
    let value = parser.parse_value()?;
    if parser.pos != parser.s.len() {
        return Err(Error::encoding("trailing bytes after top-level value"));
    }
    Ok(value)
}

struct Parser<'a> {
    s: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.bump() == Some(b) {
            Ok(())
        } else {
            Err(Error::encoding(format!("expected '{}'", b as char)))
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'{') => self.parse_map(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => self.parse_string().map(Value::Str),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            _ => Err(Error::encoding("unexpected token")),
        }
    }

    fn parse_literal(&mut self, lit: &str, value: Value) -> Result<Value> {
        for expected in lit.bytes() {
            self.expect(expected)?;
        }
        Ok(value)
    }

    fn parse_map(&mut self) -> Result<Value> {
        self.expect(b'{')?;
        let mut map = BTreeMap::new();
        if self.peek() == Some(b'}') {
            self.bump();
            return Ok(Value::Map(map));
        }
        loop {
            let key = self.parse_string()?;
            self.expect(b':')?;
            let value = self.parse_value()?;
            if map.insert(key.clone(), value).is_some() {
                return Err(Error::encoding(format!("duplicate key: {key}")));
            }
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err(Error::encoding("expected ',' or '}' in map")),
            }
        }
        Ok(Value::Map(map))
    }

    fn parse_array(&mut self) -> Result<Value> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        if self.peek() == Some(b']') {
            self.bump();
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => break,
                _ => return Err(Error::encoding("expected ',' or ']' in array")),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'"') => s.push('"'),
                    Some(b'\\') => s.push('\\'),
                    Some(b'n') => s.push('\n'),
                    Some(b'r') => s.push('\r'),
                    Some(b't') => s.push('\t'),
                    Some(b'u') => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let d = self.bump().ok_or_else(|| Error::encoding("short \\u escape"))?;
                            code = code * 16
                                + (d as char)
                                    .to_digit(16)
                                    .ok_or_else(|| Error::encoding("bad \\u escape"))?;
                        }
                        s.push(char::from_u32(code).ok_or_else(|| Error::encoding("invalid codepoint"))?);
                    }
                    _ => return Err(Error::encoding("bad escape")),
                },
                Some(b) => {
                    // Re-decode as UTF-8 by collecting raw bytes until the closing quote.
                    let start = self.pos - 1;
                    let mut end = self.pos;
                    while self.peek().is_some() && self.peek() != Some(b'"') && self.peek() != Some(b'\\') {
                        end = self.pos + 1;
                        self.pos += 1;
                    }
                    let chunk = std::str::from_utf8(&self.s[start..end])
                        .map_err(|e| Error::encoding(format!("invalid UTF-8 in string: {e}")))?;
                    s.push_str(chunk);
                    let _ = b;
                }
                None => return Err(Error::encoding("unterminated string")),
            }
        }
        Ok(s)
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == b'.' || c == b'e' || c == b'E' || c == b'+' || c == b'-' {
                is_float = true;
                self.bump();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.s[start..self.pos]).expect("ascii number text");
        if is_float {
            let f: f64 = text
                .parse()
                .map_err(|_| Error::encoding(format!("bad number literal: {text}")))?;
            Ok(Value::Float(f))
        } else {
            let n: i64 = text
                .parse()
                .map_err(|_| Error::encoding(format!("bad integer literal: {text}")))?;
            Ok(Value::Int(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_without_whitespace() {
        let v = Value::map([("b", Value::Int(1)), ("a", Value::Bool(true))]);
        let bytes = canonical_bytes(&v).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"a":true,"b":1}"#);
    }

    #[test]
    fn zero_and_negative_zero_keep_decimal_point() {
        // Must agree with serde_json / Python json.dumps bit-for-bit: both emit
        // "0.0" and "-0.0", never a bare integer-looking "0".
        let bytes = canonical_bytes(&Value::Float(0.0)).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "0.0");
        let bytes = canonical_bytes(&Value::Float(-0.0)).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "-0.0");
    }

    #[test]
    fn rejects_non_finite_floats() {
        let v = Value::Float(f64::NAN);
        assert!(canonical_bytes(&v).is_err());
        let v = Value::Float(f64::INFINITY);
        assert!(canonical_bytes(&v).is_err());
    }

    #[test]
    fn floats_use_shortest_round_trip_form() {
        let v = Value::Float(0.1);
        let bytes = canonical_bytes(&v).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "0.1");
    }

    #[test]
    fn round_trips_through_parse() {
        let v = Value::map([
            ("name", Value::Str("qlx".into())),
            ("nums", Value::Array(vec![Value::Int(1), Value::Int(2), Value::Float(3.5)])),
        ]);
        let bytes = canonical_bytes(&v).unwrap();
        let parsed = parse(&bytes).unwrap();
        let bytes2 = canonical_bytes(&parsed).unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn parse_rejects_duplicate_keys() {
        let bad = br#"{"a":1,"a":2}"#;
        assert!(parse(bad).is_err());
    }

    #[test]
    fn parse_rejects_trailing_bytes() {
        let bad = br#"{"a":1}garbage"#;
        assert!(parse(bad).is_err());
    }
}
