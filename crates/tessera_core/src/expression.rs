//! Predicate expressions over row contents.
//!
//! Expressions reach the store already resolved: field names are concrete
//! schema fields, never aliases.

use crate::data::{Data, Schema};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Logical expression over predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Matches every row.
    True,
    /// Matches when every operand matches. Empty is true.
    And(Vec<Expression>),
    /// Matches when any operand matches. Empty is false.
    Or(Vec<Expression>),
    /// Negation.
    Not(Box<Expression>),
    /// Leaf comparison.
    Predicate(Predicate),
}

impl Expression {
    /// Builds an AND of predicates.
    #[must_use]
    pub fn all_of(predicates: Vec<Predicate>) -> Self {
        Self::And(predicates.into_iter().map(Self::Predicate).collect())
    }

    /// Builds an OR of predicates.
    #[must_use]
    pub fn any_of(predicates: Vec<Predicate>) -> Self {
        Self::Or(predicates.into_iter().map(Self::Predicate).collect())
    }

    /// Wraps an expression in a logical NOT.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(expression: Self) -> Self {
        Self::Not(Box::new(expression))
    }

    /// Returns true if `row`, laid out by `schema`, satisfies the expression.
    #[must_use]
    pub fn matches(&self, schema: &Schema, row: &[Data]) -> bool {
        match self {
            Self::True => true,
            Self::And(operands) => operands.iter().all(|e| e.matches(schema, row)),
            Self::Or(operands) => operands.iter().any(|e| e.matches(schema, row)),
            Self::Not(inner) => !inner.matches(schema, row),
            Self::Predicate(predicate) => predicate.matches(schema, row),
        }
    }
}

impl From<Predicate> for Expression {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

/// What a predicate compares against its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extractor {
    /// The value of a named field.
    Field(String),
    /// The schema name, written `#type`.
    Type,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `in`: the extracted value is an element of the list value.
    In,
    /// `ni`: the extracted value contains the value, as a substring of text
    /// or an element of a list.
    Ni,
}

impl Operator {
    /// Returns the operator's textual form.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::In => "in",
            Self::Ni => "ni",
        }
    }

    fn apply(self, lhs: &Data, rhs: &Data) -> bool {
        match self {
            Self::Equal => lhs.equals(rhs),
            Self::NotEqual => !lhs.equals(rhs),
            Self::Less => lhs.compare(rhs) == Some(Ordering::Less),
            Self::LessEqual => matches!(lhs.compare(rhs), Some(Ordering::Less | Ordering::Equal)),
            Self::Greater => lhs.compare(rhs) == Some(Ordering::Greater),
            Self::GreaterEqual => {
                matches!(lhs.compare(rhs), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::In => contains(rhs, lhs),
            Self::Ni => contains(lhs, rhs),
        }
    }
}

fn contains(haystack: &Data, needle: &Data) -> bool {
    match (haystack, needle) {
        (Data::Text(h), Data::Text(n)) => h.contains(n.as_str()),
        (Data::List(items), _) => items.iter().any(|item| item.equals(needle)),
        _ => false,
    }
}

/// A single comparison of an extracted value against a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// What to extract from the row.
    pub extractor: Extractor,
    /// How to compare.
    pub operator: Operator,
    /// The constant to compare against.
    pub value: Data,
}

impl Predicate {
    /// Creates a predicate on a named field.
    pub fn field(name: impl Into<String>, operator: Operator, value: impl Into<Data>) -> Self {
        Self {
            extractor: Extractor::Field(name.into()),
            operator,
            value: value.into(),
        }
    }

    /// Creates a predicate on the schema name.
    pub fn schema_type(operator: Operator, name: impl Into<String>) -> Self {
        Self {
            extractor: Extractor::Type,
            operator,
            value: Data::Text(name.into()),
        }
    }

    /// Returns true if the row satisfies the predicate.
    ///
    /// A field the schema does not have never matches, whatever the operator.
    #[must_use]
    pub fn matches(&self, schema: &Schema, row: &[Data]) -> bool {
        match &self.extractor {
            Extractor::Type => {
                let name = Data::Text(schema.name().to_string());
                self.operator.apply(&name, &self.value)
            }
            Extractor::Field(field) => match schema.index_of(field).and_then(|i| row.get(i)) {
                Some(lhs) => self.operator.apply(lhs, &self.value),
                None => false,
            },
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extractor {
            Extractor::Field(name) => write!(f, "{name}")?,
            Extractor::Type => write!(f, "#type")?,
        }
        write!(f, " {} {}", self.operator.symbol(), self.value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, operands: &[Expression], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{operand}")?;
            }
            write!(f, ")")
        }

        match self {
            Self::True => write!(f, "true"),
            Self::And(operands) => join(f, operands, "&&"),
            Self::Or(operands) => join(f, operands, "||"),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::Predicate(predicate) => write!(f, "{predicate}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> (Schema, Vec<Data>) {
        let schema = Schema::new("zeek.conn", ["orig_h", "orig_p", "service", "tags"]);
        let row = vec![
            Data::Address("192.168.1.10".parse().unwrap()),
            Data::Count(443),
            Data::from("https"),
            Data::List(vec![Data::from("tls"), Data::from("web")]),
        ];
        (schema, row)
    }

    #[test]
    fn comparisons() {
        let (schema, row) = conn();
        let eval = |op, value: Data| Predicate::field("orig_p", op, value).matches(&schema, &row);

        assert!(eval(Operator::Equal, Data::Count(443)));
        assert!(eval(Operator::Equal, Data::Integer(443)));
        assert!(eval(Operator::NotEqual, Data::Count(80)));
        assert!(eval(Operator::Less, Data::Integer(1024)));
        assert!(eval(Operator::LessEqual, Data::Count(443)));
        assert!(eval(Operator::Greater, Data::Integer(-1)));
        assert!(eval(Operator::GreaterEqual, Data::Count(443)));
        assert!(!eval(Operator::Greater, Data::Count(443)));
        assert!(!eval(Operator::Less, Data::from("443")));
    }

    #[test]
    fn membership() {
        let (schema, row) = conn();
        let ports = Data::List(vec![Data::Count(80), Data::Count(443)]);
        assert!(Predicate::field("orig_p", Operator::In, ports).matches(&schema, &row));
        assert!(Predicate::field("service", Operator::Ni, "ttp").matches(&schema, &row));
        assert!(Predicate::field("tags", Operator::Ni, "web").matches(&schema, &row));
        assert!(!Predicate::field("tags", Operator::Ni, "dns").matches(&schema, &row));
    }

    #[test]
    fn missing_field_never_matches() {
        let (schema, row) = conn();
        assert!(!Predicate::field("resp_h", Operator::Equal, Data::Null).matches(&schema, &row));
        assert!(!Predicate::field("resp_h", Operator::NotEqual, 1u64).matches(&schema, &row));
    }

    #[test]
    fn type_extractor() {
        let (schema, row) = conn();
        assert!(Predicate::schema_type(Operator::Equal, "zeek.conn").matches(&schema, &row));
        assert!(Predicate::schema_type(Operator::Ni, "zeek").matches(&schema, &row));
        assert!(!Predicate::schema_type(Operator::Equal, "suricata.alert").matches(&schema, &row));
    }

    #[test]
    fn connectives() {
        let (schema, row) = conn();
        let https = Predicate::field("service", Operator::Equal, "https");
        let dns = Predicate::field("service", Operator::Equal, "dns");

        assert!(Expression::True.matches(&schema, &row));
        assert!(Expression::And(vec![]).matches(&schema, &row));
        assert!(!Expression::Or(vec![]).matches(&schema, &row));
        assert!(Expression::any_of(vec![https.clone(), dns.clone()]).matches(&schema, &row));
        assert!(!Expression::all_of(vec![https, dns.clone()]).matches(&schema, &row));
        assert!(Expression::not(dns.into()).matches(&schema, &row));
    }

    #[test]
    fn display() {
        let expr = Expression::And(vec![
            Predicate::schema_type(Operator::Equal, "zeek.conn").into(),
            Expression::not(Predicate::field("orig_p", Operator::In, vec![Data::Count(53)]).into()),
        ]);
        assert_eq!(
            expr.to_string(),
            "(#type == \"zeek.conn\" && !orig_p in [53])"
        );
    }
}
