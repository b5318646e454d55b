//! Boolean filter trees over model properties.
//!
//! `Q` leaves are single property lookups; groups combine children with AND
//! or OR and may be negated. Lookups can be written Django-style:
//! `Q::parse("age__gte", 18)`.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

use strand_core::ScalarValue;

use crate::error::CompileError;

/// Comparison applied by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Exact,
    IExact,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    IsNull,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Regex,
    IRegex,
}

impl Operator {
    pub const ALL: [Operator; 17] = [
        Self::Exact,
        Self::IExact,
        Self::Ne,
        Self::Lt,
        Self::Gt,
        Self::Lte,
        Self::Gte,
        Self::In,
        Self::IsNull,
        Self::Contains,
        Self::IContains,
        Self::StartsWith,
        Self::IStartsWith,
        Self::EndsWith,
        Self::IEndsWith,
        Self::Regex,
        Self::IRegex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Lte => "lte",
            Self::Gte => "gte",
            Self::In => "in",
            Self::IsNull => "isnull",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Regex => "regex",
            Self::IRegex => "iregex",
        }
    }

    /// Operators whose operand is a string pattern rather than a property value.
    pub fn is_string_match(self) -> bool {
        matches!(
            self,
            Self::IExact
                | Self::Contains
                | Self::IContains
                | Self::StartsWith
                | Self::IStartsWith
                | Self::EndsWith
                | Self::IEndsWith
                | Self::Regex
                | Self::IRegex
        )
    }

    pub fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            Self::IExact | Self::IContains | Self::IStartsWith | Self::IEndsWith | Self::IRegex
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|op| op.name() == s).ok_or(())
    }
}

/// A single `field op value` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub field: String,
    pub op: Operator,
    pub value: ScalarValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// A boolean filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    Leaf(Lookup),
    Group {
        connector: Connector,
        negated: bool,
        children: Vec<Q>,
    },
}

impl Q {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<ScalarValue>) -> Self {
        Self::Leaf(Lookup {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    /// Equality shorthand.
    pub fn exact(field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self::new(field, Operator::Exact, value)
    }

    /// Parse a `field__operator` lookup. A lookup without a known operator
    /// suffix is an exact match on the whole string.
    pub fn parse(lookup: &str, value: impl Into<ScalarValue>) -> Result<Self, CompileError> {
        let (field, op) = match lookup.rsplit_once("__") {
            Some((field, suffix)) => match suffix.parse::<Operator>() {
                Ok(op) => (field, op),
                Err(()) => {
                    return Err(CompileError::UnknownOperator {
                        lookup: lookup.to_string(),
                        operator: suffix.to_string(),
                    })
                }
            },
            None => (lookup, Operator::Exact),
        };
        Ok(Self::new(field, op, value))
    }

    /// AND of every child.
    pub fn all(children: impl IntoIterator<Item = Q>) -> Self {
        Self::Group {
            connector: Connector::And,
            negated: false,
            children: children.into_iter().collect(),
        }
    }

    /// OR of every child.
    pub fn any(children: impl IntoIterator<Item = Q>) -> Self {
        Self::Group {
            connector: Connector::Or,
            negated: false,
            children: children.into_iter().collect(),
        }
    }

    fn combine(self, other: Q, connector: Connector) -> Q {
        match self {
            Q::Group {
                connector: c,
                negated: false,
                mut children,
            } if c == connector => {
                children.push(other);
                Q::Group {
                    connector,
                    negated: false,
                    children,
                }
            }
            lhs => Q::Group {
                connector,
                negated: false,
                children: vec![lhs, other],
            },
        }
    }
}

impl BitAnd for Q {
    type Output = Q;

    fn bitand(self, rhs: Q) -> Q {
        self.combine(rhs, Connector::And)
    }
}

impl BitOr for Q {
    type Output = Q;

    fn bitor(self, rhs: Q) -> Q {
        self.combine(rhs, Connector::Or)
    }
}

impl Not for Q {
    type Output = Q;

    fn not(self) -> Q {
        match self {
            Q::Group {
                connector,
                negated,
                children,
            } => Q::Group {
                connector,
                negated: !negated,
                children,
            },
            leaf => Q::Group {
                connector: Connector::And,
                negated: true,
                children: vec![leaf],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operator_suffix() {
        let q = Q::parse("age__gte", 18).unwrap();
        assert_eq!(q, Q::new("age", Operator::Gte, 18));
    }

    #[test]
    fn test_parse_plain_field_is_exact() {
        assert_eq!(Q::parse("name", "Ada").unwrap(), Q::exact("name", "Ada"));
    }

    #[test]
    fn test_parse_unknown_operator() {
        assert!(matches!(
            Q::parse("age__between", 1),
            Err(CompileError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_and_flattens_same_connector() {
        let q = Q::exact("a", 1) & Q::exact("b", 2) & Q::exact("c", 3);
        match q {
            Q::Group { connector, children, .. } => {
                assert_eq!(connector, Connector::And);
                assert_eq!(children.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_or_nests_under_and() {
        let q = (Q::exact("a", 1) | Q::exact("b", 2)) & Q::exact("c", 3);
        let Q::Group { connector, children, .. } = q else {
            panic!("expected group")
        };
        assert_eq!(connector, Connector::And);
        assert!(matches!(children[0], Q::Group { connector: Connector::Or, .. }));
    }

    #[test]
    fn test_not_toggles_group_negation() {
        let q = !(Q::exact("a", 1) & Q::exact("b", 2));
        assert!(matches!(q, Q::Group { negated: true, .. }));
        assert!(matches!(!q, Q::Group { negated: false, .. }));
    }

    #[test]
    fn test_negated_group_is_not_extended() {
        let q = !(Q::exact("a", 1)) & Q::exact("b", 2);
        let Q::Group { negated, children, .. } = q else {
            panic!("expected group")
        };
        assert!(!negated);
        assert_eq!(children.len(), 2);
    }
}
