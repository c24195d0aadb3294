//! Structured representation of a configuration file.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single configuration value.
///
/// Serialized untagged, so JSON `true`, `5`, `"x"` and `[...]` map directly
/// onto the variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean, rendered `true`/`false`.
    Bool(bool),
    /// A signed decimal integer.
    Integer(i64),
    /// Verbatim text.
    String(String),
    /// Repeated key; one line per element.
    List(Vec<Value>),
}

impl Value {
    /// The text of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value of an integer.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Every scalar as text, flattening lists.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().flat_map(Self::to_strings).collect(),
            scalar => vec![scalar.to_string()],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Keys of one section block.
pub type Entries = BTreeMap<String, Value>;

/// One section name's content: a single block, or every block of a
/// repeatable section in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section {
    /// The section appears once.
    Single(Entries),
    /// The section may repeat.
    Repeated(Vec<Entries>),
}

impl Section {
    /// Every block of this section in order.
    #[must_use]
    pub fn blocks(&self) -> &[Entries] {
        match self {
            Self::Single(entries) => std::slice::from_ref(entries),
            Self::Repeated(blocks) => blocks,
        }
    }

    /// The first block, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Entries> {
        self.blocks().first()
    }

    /// Append another block, promoting a single block to a list.
    pub fn push(&mut self, entries: Entries) {
        match self {
            Self::Repeated(blocks) => blocks.push(entries),
            Self::Single(existing) => {
                let first = std::mem::take(existing);
                *self = Self::Repeated(vec![first, entries]);
            }
        }
    }
}

/// A whole configuration file: section name to content.
pub type ConfigDocument = BTreeMap<String, Section>;
