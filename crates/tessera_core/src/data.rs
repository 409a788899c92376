//! Row values and schemas.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;

/// A single value in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Data {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Unsigned counter.
    Count(u64),
    /// Floating point number.
    Real(f64),
    /// UTF-8 string.
    Text(String),
    /// IPv4 or IPv6 address.
    Address(IpAddr),
    /// Nanoseconds since the Unix epoch.
    Time(i64),
    /// Ordered list of values.
    List(Vec<Data>),
}

impl Data {
    /// Returns the name of this value's kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Count(_) => "count",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Address(_) => "address",
            Self::Time(_) => "time",
            Self::List(_) => "list",
        }
    }

    /// Compares two values.
    ///
    /// Values of the same kind compare naturally. `Integer`, `Count` and
    /// `Real` compare numerically with each other. Any other pairing, and
    /// lists, are unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Count(a), Self::Count(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Count(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::Count(a), Self::Integer(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::Real(a), Self::Real(b)) => a.partial_cmp(b),
            (Self::Real(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Real(a), Self::Count(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Integer(a), Self::Real(b)) => (*a as f64).partial_cmp(b),
            (Self::Count(a), Self::Real(b)) => (*a as f64).partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Address(a), Self::Address(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns true if both values are equal under [`Data::compare`].
    ///
    /// Lists are equal when they have equal elements in the same order.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "nil"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v:+}"),
            Self::Count(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Address(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "@{v}ns"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Data {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Data {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for Data {
    fn from(v: u64) -> Self {
        Self::Count(v)
    }
}

impl From<f64> for Data {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Data {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Data {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<IpAddr> for Data {
    fn from(v: IpAddr) -> Self {
        Self::Address(v)
    }
}

impl From<Vec<Data>> for Data {
    fn from(v: Vec<Data>) -> Self {
        Self::List(v)
    }
}

/// The layout shared by every row of a record batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    fields: Vec<String>,
}

impl Schema {
    /// Creates a schema such as `zeek.conn` with the given field names.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field names in column order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Returns the column index of `field`.
    #[must_use]
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_count_compare_numerically() {
        assert_eq!(Data::Integer(5).compare(&Data::Count(5)), Some(Ordering::Equal));
        assert_eq!(Data::Integer(-1).compare(&Data::Count(0)), Some(Ordering::Less));
        assert_eq!(
            Data::Count(u64::MAX).compare(&Data::Integer(i64::MAX)),
            Some(Ordering::Greater)
        );
        assert!(Data::Count(3).equals(&Data::Integer(3)));
    }

    #[test]
    fn mismatched_kinds_are_unordered() {
        assert_eq!(Data::Text("1".into()).compare(&Data::Integer(1)), None);
        assert!(!Data::Null.equals(&Data::Bool(false)));
    }

    #[test]
    fn nan_is_unordered() {
        assert_eq!(Data::Real(f64::NAN).compare(&Data::Real(1.0)), None);
    }

    #[test]
    fn list_equality() {
        let a = Data::List(vec![Data::Count(1), Data::from("x")]);
        let b = Data::List(vec![Data::Integer(1), Data::from("x")]);
        assert!(a.equals(&b));
        assert!(!a.equals(&Data::List(vec![Data::Count(1)])));
    }

    #[test]
    fn display() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(Data::Integer(4).to_string(), "+4");
        assert_eq!(Data::from(addr).to_string(), "10.0.0.1");
        assert_eq!(
            Data::List(vec![Data::Count(1), Data::from("a")]).to_string(),
            "[1, \"a\"]"
        );
    }

    #[test]
    fn schema_lookup() {
        let schema = Schema::new("zeek.conn", ["ts", "uid", "orig_h"]);
        assert_eq!(schema.name(), "zeek.conn");
        assert_eq!(schema.width(), 3);
        assert_eq!(schema.index_of("uid"), Some(1));
        assert_eq!(schema.index_of("resp_h"), None);
    }
}
