//! Decoded values returned by remote evaluation.

use serde::{Deserialize, Serialize};

/// A value decoded from the engine's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Sexp {
    Null,
    Logical(Vec<Option<bool>>),
    Integer(Vec<Option<i32>>),
    Double(Vec<f64>),
    Strings(Vec<Option<String>>),
    /// Generic vector; names are `None` for unnamed elements.
    List(Vec<(Option<String>, Sexp)>),
}

impl Sexp {
    /// Build a string vector of length one.
    pub fn string(value: impl Into<String>) -> Self {
        Sexp::Strings(vec![Some(value.into())])
    }

    /// Build a string vector.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Sexp::Strings(values.into_iter().map(|s| Some(s.into())).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Sexp::Null)
    }

    /// First element of a string vector.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Sexp::Strings(values) => values.first().and_then(|v| v.as_deref()),
            _ => None,
        }
    }

    /// All string elements, flattening lists. `NA` elements are skipped.
    pub fn as_strings(&self) -> Option<Vec<String>> {
        match self {
            Sexp::Strings(values) => Some(values.iter().flatten().cloned().collect()),
            Sexp::List(items) => {
                let mut out = Vec::new();
                for (_, item) in items {
                    out.extend(item.as_strings()?);
                }
                Some(out)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Sexp::Double(values) => values.first().copied(),
            Sexp::Integer(values) => values.first().copied().flatten().map(f64::from),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Sexp::Logical(values) => values.first().copied().flatten(),
            _ => None,
        }
    }

    /// Look up a named element of a list.
    pub fn get(&self, name: &str) -> Option<&Sexp> {
        match self {
            Sexp::List(items) => items
                .iter()
                .find(|(n, _)| n.as_deref() == Some(name))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Sexp::Null => 0,
            Sexp::Logical(v) => v.len(),
            Sexp::Integer(v) => v.len(),
            Sexp::Double(v) => v.len(),
            Sexp::Strings(v) => v.len(),
            Sexp::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
