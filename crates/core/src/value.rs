//! Cursor parameters and fetched columns
//!
//! Test databases only ever hold identifiers, names and module states, so a
//! column is an integer, text, or NULL. Different kinds never compare equal.

use crate::types::{ModuleName, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Integer column (ids, counts)
    Int(i64),
    /// Text column (names, codes, states)
    Text(String),
}

/// One fetched record, columns in result order
pub type Row = Vec<Value>;

impl Value {
    /// Integer content, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text content, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<UserId> for Value {
    fn from(user: UserId) -> Self {
        Value::Int(i64::from(user.0))
    }
}

impl From<&ModuleName> for Value {
    fn from(module: &ModuleName) -> Self {
        Value::Text(module.as_str().to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_never_equal() {
        assert_ne!(Value::Text("1".into()), Value::Int(1));
        assert_ne!(Value::Null, Value::Text(String::new()));
    }

    #[test]
    fn test_domain_conversions() {
        assert_eq!(Value::from(UserId(2)).as_int(), Some(2));
        assert_eq!(Value::from(&ModuleName::from("sale")).as_str(), Some("sale"));
        assert_eq!(Value::from(Option::<&str>::None), Value::Null);
        assert!(Value::from(Option::<i64>::None).is_null());
        assert_eq!(Value::Int(7).as_str(), None);
    }

    #[test]
    fn test_display_quotes_text() {
        assert_eq!(Value::from("l'atelier").to_string(), "'l''atelier'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
