//! Compiled WHERE-clause trees.
//!
//! Conditions reference query variables and parameter placeholders only;
//! values live in the parameter table. A tree can be rendered to Cypher or
//! evaluated against a [`Fixture`] with Cypher's three-valued logic, which
//! lets boolean compilation be checked without a server.

use std::collections::BTreeMap;

use strand_core::value::Properties;
use strand_core::ScalarValue;

use super::escape;
use super::filter::Operator;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `ident.property <op> $param`; `param` is `None` for `isnull`.
    Property {
        ident: String,
        property: String,
        op: Operator,
        param: Option<String>,
        /// For `isnull`: whether the property must be null.
        is_null: bool,
    },
    /// `id(ident) = $param`
    IdEquals { ident: String, param: String },
    /// `ident_score >= $param`
    ScoreAtLeast { score: String, param: String },
    /// `[NOT] EXISTS { MATCH pattern }`
    Exists { pattern: String, negated: bool },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Conjunction, dropping the wrapper for a single condition.
    pub fn and_all(mut conditions: Vec<Condition>) -> Option<Condition> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::All(conditions)),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Property {
                ident,
                property,
                op,
                param,
                is_null,
            } => render_property(ident, property, *op, param.as_deref(), *is_null),
            Self::IdEquals { ident, param } => format!("id({ident}) = ${param}"),
            Self::ScoreAtLeast { score, param } => format!("{score} >= ${param}"),
            Self::Exists { pattern, negated } => {
                let not = if *negated { "NOT " } else { "" };
                format!("{not}EXISTS {{ MATCH {pattern} }}")
            }
            Self::All(children) => children
                .iter()
                .map(Self::render_operand)
                .collect::<Vec<_>>()
                .join(" AND "),
            Self::Any(children) => children
                .iter()
                .map(Self::render_operand)
                .collect::<Vec<_>>()
                .join(" OR "),
            Self::Not(inner) => format!("NOT ({})", inner.render()),
        }
    }

    fn render_operand(&self) -> String {
        match self {
            Self::All(c) | Self::Any(c) if c.len() > 1 => format!("({})", self.render()),
            _ => self.render(),
        }
    }

    /// Three-valued evaluation; `None` is Cypher's null ("unknown").
    pub fn eval(&self, fixture: &Fixture, params: &BTreeMap<String, ScalarValue>) -> Option<bool> {
        match self {
            Self::Property {
                ident,
                property,
                op,
                param,
                is_null,
            } => {
                let value = fixture.property(ident, property);
                if *op == Operator::IsNull {
                    return Some(value.is_null() == *is_null);
                }
                let operand = param.as_ref().and_then(|p| params.get(p))?;
                eval_operator(*op, &value, operand)
            }
            Self::IdEquals { ident, param } => {
                let id = fixture.ids.get(ident)?;
                Some(params.get(param)?.as_i64()? == *id)
            }
            Self::ScoreAtLeast { score, param } => {
                let score = fixture.scores.get(score)?;
                match params.get(param)? {
                    ScalarValue::Float(t) => Some(*score >= *t),
                    ScalarValue::Int(t) => Some(*score >= *t as f64),
                    _ => None,
                }
            }
            Self::Exists { pattern, negated } => {
                fixture.patterns.get(pattern).map(|found| found != negated)
            }
            Self::All(children) => {
                let mut unknown = false;
                for child in children {
                    match child.eval(fixture, params) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Self::Any(children) => {
                let mut unknown = false;
                for child in children {
                    match child.eval(fixture, params) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Self::Not(inner) => inner.eval(fixture, params).map(|b| !b),
        }
    }
}

fn render_property(
    ident: &str,
    property: &str,
    op: Operator,
    param: Option<&str>,
    is_null: bool,
) -> String {
    let lhs = format!("{ident}.{}", escape(property));
    let rhs = format!("${}", param.unwrap_or_default());
    match op {
        Operator::IsNull if is_null => format!("{lhs} IS NULL"),
        Operator::IsNull => format!("{lhs} IS NOT NULL"),
        Operator::Exact => format!("{lhs} = {rhs}"),
        Operator::Ne => format!("{lhs} <> {rhs}"),
        Operator::Lt => format!("{lhs} < {rhs}"),
        Operator::Gt => format!("{lhs} > {rhs}"),
        Operator::Lte => format!("{lhs} <= {rhs}"),
        Operator::Gte => format!("{lhs} >= {rhs}"),
        Operator::In => format!("{lhs} IN {rhs}"),
        Operator::IExact => format!("toLower({lhs}) = toLower({rhs})"),
        Operator::Contains => format!("{lhs} CONTAINS {rhs}"),
        Operator::IContains => format!("toLower({lhs}) CONTAINS toLower({rhs})"),
        Operator::StartsWith => format!("{lhs} STARTS WITH {rhs}"),
        Operator::IStartsWith => format!("toLower({lhs}) STARTS WITH toLower({rhs})"),
        Operator::EndsWith => format!("{lhs} ENDS WITH {rhs}"),
        Operator::IEndsWith => format!("toLower({lhs}) ENDS WITH toLower({rhs})"),
        Operator::Regex | Operator::IRegex => format!("{lhs} =~ {rhs}"),
    }
}

fn eval_operator(op: Operator, value: &ScalarValue, operand: &ScalarValue) -> Option<bool> {
    use std::cmp::Ordering::*;
    match op {
        Operator::Exact => value.cypher_eq(operand),
        Operator::Ne => value.cypher_eq(operand).map(|b| !b),
        Operator::Lt => value.cypher_cmp(operand).map(|o| o == Less),
        Operator::Gt => value.cypher_cmp(operand).map(|o| o == Greater),
        Operator::Lte => value.cypher_cmp(operand).map(|o| o != Greater),
        Operator::Gte => value.cypher_cmp(operand).map(|o| o != Less),
        Operator::In => {
            let ScalarValue::List(items) = operand else {
                return None;
            };
            let mut unknown = false;
            for item in items {
                match value.cypher_eq(item) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            (!unknown).then_some(false)
        }
        Operator::IsNull => Some(value.is_null()),
        Operator::Regex | Operator::IRegex => None,
        _ => {
            let (lhs, rhs) = (value.as_str()?, operand.as_str()?);
            let (lhs, rhs) = if op.is_case_insensitive() {
                (lhs.to_lowercase(), rhs.to_lowercase())
            } else {
                (lhs.to_string(), rhs.to_string())
            };
            Some(match op {
                Operator::IExact => lhs == rhs,
                Operator::Contains | Operator::IContains => lhs.contains(&rhs),
                Operator::StartsWith | Operator::IStartsWith => lhs.starts_with(&rhs),
                _ => lhs.ends_with(&rhs),
            })
        }
    }
}

/// Synthetic row for evaluating conditions: per-variable stored properties,
/// ids, similarity scores and known pattern outcomes.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    nodes: BTreeMap<String, Properties>,
    ids: BTreeMap<String, i64>,
    scores: BTreeMap<String, f64>,
    patterns: BTreeMap<String, bool>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, ident: impl Into<String>, properties: Properties) -> Self {
        self.nodes.insert(ident.into(), properties);
        self
    }

    pub fn with_id(mut self, ident: impl Into<String>, id: i64) -> Self {
        self.ids.insert(ident.into(), id);
        self
    }

    /// Score keyed by the score variable, e.g. `book_score`.
    pub fn with_score(mut self, score: impl Into<String>, value: f64) -> Self {
        self.scores.insert(score.into(), value);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>, found: bool) -> Self {
        self.patterns.insert(pattern.into(), found);
        self
    }

    fn property(&self, ident: &str, property: &str) -> ScalarValue {
        self.nodes
            .get(ident)
            .and_then(|props| props.get(property))
            .cloned()
            .unwrap_or_default()
    }
}
