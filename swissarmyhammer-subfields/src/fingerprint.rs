//! Deterministic cache keys for heterogeneous inputs.
//!
//! Every memo table in a [`SubfieldSession`](crate::SubfieldSession) is keyed by a
//! [`Fingerprint`]. Inputs are first reduced to a [`KeyPart`] tree:
//!
//! - objects with a stable identity (definitions, records, storages) reduce to
//!   that identity
//! - item lists reduce to their first item's value
//! - nested maps and lists are normalized recursively, with map keys sorted,
//!   and folded into a content hash of their normalized form
//! - `null`, `false`, `""`, and empty containers collapse to one empty token,
//!   while numeric zero stays `0`
//!
//! Each normalized token is escaped to `[A-Za-z0-9_.]` plus `%XX`, prefixed
//! with its label, joined with `|`, and hashed with MD5 into 32 hex chars.
//! Escaping rather than stripping keeps distinct inputs distinct.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Token used for every empty input.
pub const EMPTY_TOKEN: &str = "~";

const PART_DELIMITER: char = '|';
const LABEL_SEPARATOR: char = ':';

/// A 128-bit content hash identifying a normalized input list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An input reduced to the shape that participates in a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Empty,
    Token(String),
    Map(Vec<(String, KeyPart)>),
    List(Vec<KeyPart>),
}

impl KeyPart {
    pub fn token(value: impl fmt::Display) -> Self {
        let s = value.to_string();
        if s.is_empty() {
            KeyPart::Empty
        } else {
            KeyPart::Token(s)
        }
    }

    /// Build a map part from labelled entries; empty maps collapse to [`KeyPart::Empty`].
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, KeyPart)>,
        K: Into<String>,
    {
        let entries: Vec<_> = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if entries.is_empty() {
            KeyPart::Empty
        } else {
            KeyPart::Map(entries)
        }
    }

    fn normalize(&self) -> String {
        match self {
            KeyPart::Empty => EMPTY_TOKEN.to_string(),
            KeyPart::Token(s) => escape(s),
            KeyPart::Map(entries) => {
                format!("h{}", digest(entries.iter().map(|(k, v)| (k.clone(), v))))
            }
            KeyPart::List(items) if items.is_empty() => EMPTY_TOKEN.to_string(),
            KeyPart::List(items) => format!(
                "h{}",
                digest(items.iter().enumerate().map(|(i, v)| (i.to_string(), v)))
            ),
        }
    }
}

/// Something that can take part in a fingerprint.
pub trait Fingerprintable {
    fn key_part(&self) -> KeyPart;
}

/// Collects labelled inputs and hashes them.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    parts: Vec<(String, KeyPart)>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input labelled by its position.
    pub fn push<T: Fingerprintable + ?Sized>(mut self, value: &T) -> Self {
        let label = self.parts.len().to_string();
        self.parts.push((label, value.key_part()));
        self
    }

    /// Add an input under an explicit label.
    pub fn with<T: Fingerprintable + ?Sized>(mut self, label: &str, value: &T) -> Self {
        self.parts.push((label.to_string(), value.key_part()));
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(digest(self.parts.iter().map(|(k, v)| (k.clone(), v))))
    }
}

/// Fingerprint a positional list of inputs.
pub fn fingerprint(inputs: &[&dyn Fingerprintable]) -> Fingerprint {
    inputs
        .iter()
        .fold(KeyBuilder::new(), |builder, input| builder.push(*input))
        .finish()
}

fn digest<'a>(entries: impl Iterator<Item = (String, &'a KeyPart)>) -> String {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut joined = String::new();
    for (i, (label, part)) in entries.iter().enumerate() {
        if i > 0 {
            joined.push(PART_DELIMITER);
        }
        joined.push_str(&escape(label));
        joined.push(LABEL_SEPARATOR);
        joined.push_str(&part.normalize());
    }
    format!("{:x}", md5::compute(joined.as_bytes()))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

impl Fingerprintable for Value {
    fn key_part(&self) -> KeyPart {
        match self {
            Value::Null | Value::Bool(false) => KeyPart::Empty,
            Value::Bool(true) => KeyPart::Token("1".into()),
            Value::Number(n) => KeyPart::Token(n.to_string()),
            Value::String(s) => KeyPart::token(s),
            Value::Array(items) => KeyPart::List(items.iter().map(Value::key_part).collect()),
            Value::Object(map) => map.key_part(),
        }
    }
}

impl Fingerprintable for Map<String, Value> {
    fn key_part(&self) -> KeyPart {
        KeyPart::map(self.iter().map(|(k, v)| (k.clone(), v.key_part())))
    }
}

impl<T: Fingerprintable> Fingerprintable for IndexMap<String, T> {
    fn key_part(&self) -> KeyPart {
        KeyPart::map(self.iter().map(|(k, v)| (k.clone(), v.key_part())))
    }
}

impl<T: Fingerprintable> Fingerprintable for [T] {
    fn key_part(&self) -> KeyPart {
        KeyPart::List(self.iter().map(Fingerprintable::key_part).collect())
    }
}

impl<T: Fingerprintable> Fingerprintable for Vec<T> {
    fn key_part(&self) -> KeyPart {
        self.as_slice().key_part()
    }
}

impl<T: Fingerprintable> Fingerprintable for Option<T> {
    fn key_part(&self) -> KeyPart {
        match self {
            Some(v) => v.key_part(),
            None => KeyPart::Empty,
        }
    }
}

impl<T: Fingerprintable + ?Sized> Fingerprintable for &T {
    fn key_part(&self) -> KeyPart {
        (**self).key_part()
    }
}

impl<T: Fingerprintable + ?Sized> Fingerprintable for Arc<T> {
    fn key_part(&self) -> KeyPart {
        (**self).key_part()
    }
}

impl<T: Fingerprintable + ?Sized> Fingerprintable for Rc<T> {
    fn key_part(&self) -> KeyPart {
        (**self).key_part()
    }
}

impl Fingerprintable for str {
    fn key_part(&self) -> KeyPart {
        KeyPart::token(self)
    }
}

impl Fingerprintable for String {
    fn key_part(&self) -> KeyPart {
        KeyPart::token(self)
    }
}

impl Fingerprintable for bool {
    fn key_part(&self) -> KeyPart {
        Value::Bool(*self).key_part()
    }
}

macro_rules! numeric_key_part {
    ($($t:ty),*) => {
        $(impl Fingerprintable for $t {
            fn key_part(&self) -> KeyPart {
                KeyPart::Token(self.to_string())
            }
        })*
    };
}

numeric_key_part!(u32, u64, usize, i32, i64);

impl Fingerprintable for Fingerprint {
    fn key_part(&self) -> KeyPart {
        KeyPart::Token(self.0.clone())
    }
}

impl Fingerprintable for KeyPart {
    fn key_part(&self) -> KeyPart {
        self.clone()
    }
}
