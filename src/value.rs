//! Scalar placeholder values and how they are rendered into templates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::template::escape_placeholder_value;

/// An immutable scalar that fills a `{placeholder}` hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaceholderValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Tuple(Vec<PlaceholderValue>),
}

impl fmt::Display for PlaceholderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderValue::Null => f.write_str("NULL"),
            PlaceholderValue::Bool(b) => write!(f, "{b}"),
            PlaceholderValue::Int(i) => write!(f, "{i}"),
            PlaceholderValue::Float(x) => write!(f, "{x}"),
            PlaceholderValue::Text(s) => f.write_str(s),
            PlaceholderValue::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for PlaceholderValue {
    fn from(s: &str) -> Self {
        PlaceholderValue::Text(s.to_string())
    }
}

impl From<String> for PlaceholderValue {
    fn from(s: String) -> Self {
        PlaceholderValue::Text(s)
    }
}

impl From<i64> for PlaceholderValue {
    fn from(i: i64) -> Self {
        PlaceholderValue::Int(i)
    }
}

impl From<i32> for PlaceholderValue {
    fn from(i: i32) -> Self {
        PlaceholderValue::Int(i64::from(i))
    }
}

impl From<f64> for PlaceholderValue {
    fn from(x: f64) -> Self {
        PlaceholderValue::Float(x)
    }
}

impl From<bool> for PlaceholderValue {
    fn from(b: bool) -> Self {
        PlaceholderValue::Bool(b)
    }
}

impl<T: Into<PlaceholderValue>> From<Option<T>> for PlaceholderValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PlaceholderValue::Null, Into::into)
    }
}

impl<T: Into<PlaceholderValue>> From<Vec<T>> for PlaceholderValue {
    fn from(items: Vec<T>) -> Self {
        PlaceholderValue::Tuple(items.into_iter().map(Into::into).collect())
    }
}

/// Placeholder-to-text formatter of a node spec.
///
/// Two nodes are only equal when they format placeholders the same way,
/// so this is a closed, comparable set rather than an arbitrary function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderFormat {
    /// Stringify, then escape braces for the second substitution pass.
    #[default]
    Escaped,
    /// Render as a SQL literal, then escape braces.
    SqlLiteral,
}

impl PlaceholderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderFormat::Escaped => "escaped",
            PlaceholderFormat::SqlLiteral => "sql_literal",
        }
    }

    /// Text that pass 1 inserts for `value`.
    pub fn format(&self, value: &PlaceholderValue) -> String {
        match self {
            PlaceholderFormat::Escaped => escape_placeholder_value(&value.to_string()),
            PlaceholderFormat::SqlLiteral => escape_placeholder_value(&sql_literal(value)),
        }
    }
}

fn sql_literal(value: &PlaceholderValue) -> String {
    match value {
        PlaceholderValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        PlaceholderValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(sql_literal).collect();
            format!("({})", inner.join(", "))
        }
        PlaceholderValue::Float(x) if !x.is_finite() => format!("'{x}'::float8"),
        other => other.to_string(),
    }
}
