//! Canonical bencode codec.
//!
//! Dictionaries are kept in a `BTreeMap` keyed by raw bytes, so encoding always
//! emits keys in ascending byte order and equal values always encode to equal
//! bytes. That property is what makes the fingerprint reproducible.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Nesting limit applied while decoding untrusted descriptor files.
const MAX_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string interpreted as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup by text key; `None` for non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key.as_bytes()))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

/// Incremental builder for dictionaries with text keys.
#[derive(Default)]
pub struct DictBuilder(BTreeMap<Vec<u8>, Value>);

impl DictBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.as_bytes().to_vec(), value.into());
        self
    }

    pub fn insert_opt(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.insert(key, v),
            None => self,
        }
    }

    pub fn build(self) -> Value {
        Value::Dict(self.0)
    }
}

pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => encode_bytes(b, out),
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(map) => {
            out.push(b'd');
            for (k, v) in map {
                encode_bytes(k, out);
                encode_into(v, out);
            }
            out.push(b'e');
        }
    }
}

fn encode_bytes(b: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(b.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(b);
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value> {
    let mut p = Parser { data, pos: 0 };
    let v = p.value(0)?;
    if p.pos != data.len() {
        return Err(Error::Codec(format!("{} trailing byte(s) after value", data.len() - p.pos)));
    }
    Ok(v)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::Codec(format!("unexpected end of input at offset {}", self.pos)))
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(Error::Codec(format!("nesting deeper than {MAX_DEPTH}")));
        }
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let i = self.int_until(b'e')?;
                Ok(Value::Int(i))
            }
            b'0'..=b'9' => Ok(Value::Bytes(self.bytes()?.to_vec())),
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            b'd' => {
                self.pos += 1;
                let mut map = BTreeMap::new();
                while self.peek()? != b'e' {
                    if !self.peek()?.is_ascii_digit() {
                        return Err(Error::Codec(format!(
                            "dictionary key is not a byte string at offset {}",
                            self.pos
                        )));
                    }
                    let key = self.bytes()?.to_vec();
                    let val = self.value(depth + 1)?;
                    if map.insert(key, val).is_some() {
                        return Err(Error::Codec("duplicate dictionary key".into()));
                    }
                }
                self.pos += 1;
                Ok(Value::Dict(map))
            }
            other => Err(Error::Codec(format!(
                "unexpected byte 0x{other:02x} at offset {}",
                self.pos
            ))),
        }
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.int_until(b':')?;
        let len = usize::try_from(len)
            .map_err(|_| Error::Codec(format!("negative string length {len}")))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::Codec(format!("string of length {len} runs past end")))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Parse a decimal integer terminated by `term`, rejecting `-0` and leading zeros.
    fn int_until(&mut self, term: u8) -> Result<i64> {
        let start = self.pos;
        let rel_end = self.data[start..]
            .iter()
            .position(|&b| b == term)
            .ok_or_else(|| Error::Codec(format!("unterminated integer at offset {start}")))?;
        let digits = &self.data[start..start + rel_end];
        let text = std::str::from_utf8(digits)
            .map_err(|_| Error::Codec(format!("non-ascii integer at offset {start}")))?;
        let unsigned = text.strip_prefix('-').unwrap_or(text);
        let well_formed = !unsigned.is_empty()
            && unsigned.bytes().all(|b| b.is_ascii_digit())
            && (unsigned == "0" || !unsigned.starts_with('0'))
            && text != "-0"
            && !(term == b':' && text.starts_with('-'));
        if !well_formed {
            return Err(Error::Codec(format!("malformed integer {text:?} at offset {start}")));
        }
        let v = text
            .parse::<i64>()
            .map_err(|e| Error::Codec(format!("integer {text:?} at offset {start}: {e}")))?;
        self.pos = start + rel_end + 1;
        Ok(v)
    }
}
