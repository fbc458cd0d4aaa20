use std::borrow::Cow;
use std::cmp::Ordering;

/// A context value: the tagged union every expression evaluates to.
///
/// Mappings are stored as insertion-ordered pairs so that `@foreach` over a
/// mapping visits entries in the order they were defined.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Empty-ish values are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Sequence(items) => !items.is_empty(),
            Self::Mapping(pairs) => !pairs.is_empty(),
        }
    }

    /// Looks a key up in a mapping. First match wins on duplicate keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Mapping(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// The string a scalar renders as in template output. Composite values
    /// have no direct rendering (use the `json` helper for those).
    pub(crate) fn render(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => Some(Cow::Borrowed("")),
            Self::Bool(true) => Some(Cow::Borrowed("true")),
            Self::Bool(false) => Some(Cow::Borrowed("false")),
            Self::Int(n) => Some(Cow::Owned(n.to_string())),
            Self::Float(n) => Some(Cow::Owned(n.to_string())),
            Self::String(s) => Some(Cow::Borrowed(s)),
            Self::Sequence(_) | Self::Mapping(_) => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Loose equality (`==`): numerics compare numerically across Int/Float,
    /// Null only equals Null, Bool compares against the other side's
    /// truthiness, and anything else falls back to string rendering.
    pub(crate) fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Bool(b), v) | (v, Self::Bool(b)) => *b == v.is_truthy(),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.render(), other.render()) {
                    (Some(a), Some(b)) => a == b,
                    _ => self == other,
                },
            },
        }
    }

    /// Strict equality (`===`): same variant, same payload. Int vs Float is
    /// a mismatch even when numerically equal.
    pub(crate) fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(_), Self::Float(_)) | (Self::Float(_), Self::Int(_)) => false,
            _ => self == other,
        }
    }

    /// Ordering for `<`/`<=`/`>`/`>=`. Defined for numeric pairs and for two
    /// strings; anything else is not comparable.
    pub(crate) fn compare(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::Mapping(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Sequence(vec![]).is_truthy());
        assert!(!Value::Mapping(vec![]).is_truthy());

        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::from("no").is_truthy());
        assert!(Value::from(vec![0]).is_truthy());
    }

    #[test]
    fn test_loose_equality_coerces_numerics() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::Int(1).loose_eq(&Value::from("1")));
        assert!(!Value::Int(1).loose_eq(&Value::Int(2)));
    }

    #[test]
    fn test_loose_equality_null_and_bool() {
        assert!(Value::Null.loose_eq(&Value::Null));
        assert!(!Value::Null.loose_eq(&Value::from("")));
        assert!(Value::Bool(true).loose_eq(&Value::Int(7)));
        assert!(Value::Bool(false).loose_eq(&Value::from("")));
    }

    #[test]
    fn test_strict_equality_requires_same_variant() {
        assert!(!Value::Int(1).strict_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).strict_eq(&Value::from("1")));
        assert!(Value::Int(1).strict_eq(&Value::Int(1)));
        assert!(Value::from("a").strict_eq(&Value::from("a")));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::Int(1).compare(&Value::Float(2.0)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
        assert_eq!(Value::Sequence(vec![]).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_mapping_get_first_match_wins() {
        let m = Value::Mapping(vec![
            ("k".to_string(), Value::Int(1)),
            ("k".to_string(), Value::Int(2)),
        ]);
        assert_eq!(m.get("k"), Some(&Value::Int(1)));
        assert_eq!(m.get("missing"), None);
    }
}
