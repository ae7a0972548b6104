//! Deterministic cache keys.
//!
//! Every argument is tagged either `Primitive` (text, numbers, booleans, embedded as
//! written) or `Complex` (anything else, reduced to a SHA-256 digest of its canonical
//! JSON form with object keys sorted). Keyword arguments are sorted by name, so the
//! key never depends on argument order or on map iteration order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyArg {
    Primitive(String),
    Complex(String),
}

impl KeyArg {
    pub fn primitive(value: impl ToString) -> Self { KeyArg::Primitive(value.to_string()) }

    /// Digest of the canonical JSON serialization. Values that fail to serialize hash
    /// their error text, which is stable for a given type.
    pub fn complex<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut canonical = String::new();
        match serde_json::to_value(value) {
            Ok(v) => write_canonical(&v, &mut canonical),
            Err(e) => canonical.push_str(&format!("!{e}")),
        }
        KeyArg::Complex(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        match self { KeyArg::Primitive(s) | KeyArg::Complex(s) => s }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 { out.push(','); }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(&map[k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 { out.push(','); }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Per-type choice of key tag.
pub trait ToKeyArg {
    fn to_key_arg(&self) -> KeyArg;
}

macro_rules! primitive_key_arg {
    ($($t:ty),*) => {
        $(impl ToKeyArg for $t { fn to_key_arg(&self) -> KeyArg { KeyArg::primitive(self) } })*
    };
}

primitive_key_arg!(str, String, bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl<T: ToKeyArg + ?Sized> ToKeyArg for &T {
    fn to_key_arg(&self) -> KeyArg { (**self).to_key_arg() }
}

impl ToKeyArg for KeyArg {
    fn to_key_arg(&self) -> KeyArg { self.clone() }
}

impl<T: Serialize> ToKeyArg for [T] {
    fn to_key_arg(&self) -> KeyArg { KeyArg::complex(self) }
}

impl<T: Serialize> ToKeyArg for Vec<T> {
    fn to_key_arg(&self) -> KeyArg { KeyArg::complex(self) }
}

/// Marks any serializable value as a complex key argument.
#[derive(Debug, Clone, Copy)]
pub struct Complex<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> ToKeyArg for Complex<'_, T> {
    fn to_key_arg(&self) -> KeyArg { KeyArg::complex(self.0) }
}

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyArgs {
    pub positional: Vec<KeyArg>,
    pub keyword: Vec<(String, KeyArg)>,
}

impl KeyArgs {
    pub fn new() -> Self { Self::default() }

    pub fn arg(mut self, value: impl ToKeyArg) -> Self {
        self.positional.push(value.to_key_arg());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl ToKeyArg) -> Self {
        self.keyword.push((name.into(), value.to_key_arg()));
        self
    }

    pub fn key(&self, identity: &str) -> String { derive_key(identity, &self.positional, &self.keyword) }
}

/// Inputs of a memoized computation describe their own key arguments.
pub trait ToKeyArgs {
    fn key_args(&self) -> KeyArgs;
}

impl ToKeyArgs for KeyArgs {
    fn key_args(&self) -> KeyArgs { self.clone() }
}

macro_rules! single_key_args {
    ($($t:ty),*) => {
        $(impl ToKeyArgs for $t { fn key_args(&self) -> KeyArgs { KeyArgs::new().arg(self) } })*
    };
}

single_key_args!(bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl ToKeyArgs for str {
    fn key_args(&self) -> KeyArgs { KeyArgs::new().arg(self) }
}

impl ToKeyArgs for String {
    fn key_args(&self) -> KeyArgs { KeyArgs::new().arg(self) }
}

/// `identity:arg1:arg2:kw_a:va:kw_b:vb` with keywords sorted by name.
///
/// `:` and `\` inside primitive values and keyword names are backslash-escaped, so a
/// value containing `:` cannot collide with a different split of the arguments.
pub fn derive_key<K: AsRef<str>>(identity: &str, positional: &[KeyArg], keyword: &[(K, KeyArg)]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(1 + positional.len() + keyword.len());
    parts.push(identity.to_string());
    parts.extend(positional.iter().map(|a| escape(a.as_str())));
    let mut kw: Vec<&(K, KeyArg)> = keyword.iter().collect();
    kw.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
    parts.extend(kw.into_iter().map(|(k, v)| format!("{}:{}", escape(k.as_ref()), escape(v.as_str()))));
    parts.join(":")
}

fn escape(part: &str) -> String {
    if !part.contains([':', '\\']) { return part.to_string(); }
    let mut out = String::with_capacity(part.len() + 4);
    for c in part.chars() {
        if c == ':' || c == '\\' { out.push('\\'); }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_are_embedded_verbatim() {
        let key = derive_key("f", &[1i32.to_key_arg(), "a".to_key_arg(), true.to_key_arg()], &[] as &[(&str, KeyArg)]);
        assert_eq!(key, "f:1:a:true");
    }

    #[test]
    fn separators_inside_values_do_not_collide() {
        let packed = derive_key("f", &["x:k:v".to_key_arg()], &[] as &[(&str, KeyArg)]);
        let split = derive_key("f", &["x".to_key_arg()], &[("k", "v".to_key_arg())]);
        assert_ne!(packed, split);
        assert_eq!(packed, r"f:x\:k\:v");
        assert_eq!(split, "f:x:k:v");
        assert_ne!(derive_key("f", &[r"a\".to_key_arg(), "b".to_key_arg()], &[] as &[(&str, KeyArg)]), derive_key("f", &[r"a\:b".to_key_arg()], &[] as &[(&str, KeyArg)]));
    }

    #[test]
    fn canonical_form_ignores_field_order() {
        let mut a = serde_json::Map::new();
        a.insert("z".into(), json!(1));
        a.insert("a".into(), json!({"y": 2, "b": [1, 2]}));
        let b = json!({"a": {"b": [1, 2], "y": 2}, "z": 1});
        assert_eq!(KeyArg::complex(&a), KeyArg::complex(&b));
        assert_ne!(KeyArg::complex(&json!([1, 2])), KeyArg::complex(&json!([2, 1])));
    }

    #[test]
    fn complex_digest_is_hex_sha256() {
        let KeyArg::Complex(d) = vec![1u8, 2, 3].to_key_arg() else { panic!("expected complex") };
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
