//! Query-set compiler: typed filters, traversals and similarity searches to
//! parameterized Cypher.
//!
//! Every value reaches the server as a parameter; the query text only holds
//! variables, labels, property names and placeholders. Placeholder names are
//! `{variable}_{property}_{n}`, unique within one compiled query.

pub mod condition;
pub mod filter;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use strand_core::model::{DescriptorRef, Direction};
use strand_core::{Registry, ScalarValue};

use crate::error::CompileError;

pub use condition::{Condition, Fixture};
pub use filter::{Connector, Lookup, Operator, Q};

// ── Query sets ───────────────────────────────────────────────────

/// What a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// The last anchor (plus its score when it has a similarity filter).
    #[default]
    Last,
    /// Every anchor, root first.
    All,
    /// `count(last)`.
    Count,
    /// The relationship of the last traversal step.
    Edge,
    /// The whole chain as one named path.
    Path,
}

/// Candidate of a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityQuery {
    Vector(Vec<f64>),
    Text(String),
}

/// Nearest-neighbour (vector) or full-text search on one indexed property.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityFilter {
    pub property: String,
    pub query: SimilarityQuery,
    pub top_k: i64,
    pub threshold: Option<f64>,
}

impl SimilarityFilter {
    pub fn vector(property: impl Into<String>, vector: Vec<f64>, top_k: i64) -> Self {
        Self {
            property: property.into(),
            query: SimilarityQuery::Vector(vector),
            top_k,
            threshold: None,
        }
    }

    pub fn fulltext(property: impl Into<String>, text: impl Into<String>, top_k: i64) -> Self {
        Self {
            property: property.into(),
            query: SimilarityQuery::Text(text.into()),
            top_k,
            threshold: None,
        }
    }

    /// Drop candidates scoring below `threshold`.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum OrderBy {
    Field { field: String, descending: bool },
    Random,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct AnchorSpec {
    /// Relationship field leading here; `None` for the root.
    field: Option<String>,
    /// Rendered as `OPTIONAL MATCH`; unmatched rows keep a null anchor.
    optional: bool,
    id: Option<i64>,
    filters: Vec<Q>,
    edge_filters: Vec<Q>,
    has: Vec<(String, bool)>,
    similarity: Vec<SimilarityFilter>,
}

/// A declarative query: a root model, filters, traversal steps, ordering
/// and pagination. Filters apply to the most recent anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySet {
    model: String,
    anchors: Vec<AnchorSpec>,
    order_by: Vec<OrderBy>,
    skip: Option<i64>,
    limit: Option<i64>,
    projection: Projection,
}

impl QuerySet {
    /// All nodes of `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            anchors: vec![AnchorSpec::default()],
            order_by: Vec::new(),
            skip: None,
            limit: None,
            projection: Projection::Last,
        }
    }

    /// Start from one saved node, bound to the variable `source`.
    pub fn from_node(model: impl Into<String>, id: i64) -> Self {
        Self::new(model).with_id(id)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    fn current(&mut self) -> &mut AnchorSpec {
        let last = self.anchors.len() - 1;
        &mut self.anchors[last]
    }

    pub fn filter(mut self, q: Q) -> Self {
        self.current().filters.push(q);
        self
    }

    pub fn exclude(self, q: Q) -> Self {
        self.filter(!q)
    }

    /// Restrict the current anchor to one node id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.current().id = Some(id);
        self
    }

    /// Require (or forbid) at least one relationship through `field`.
    pub fn has(mut self, field: impl Into<String>, present: bool) -> Self {
        self.current().has.push((field.into(), present));
        self
    }

    /// Follow a relationship field of the current anchor.
    pub fn traverse(mut self, field: impl Into<String>) -> Self {
        self.anchors.push(AnchorSpec {
            field: Some(field.into()),
            ..Default::default()
        });
        self
    }

    /// Follow a relationship field, keeping rows that have no match. Later
    /// traversals must be optional too.
    pub fn traverse_optional(mut self, field: impl Into<String>) -> Self {
        self.anchors.push(AnchorSpec {
            field: Some(field.into()),
            optional: true,
            ..Default::default()
        });
        self
    }

    /// Filter on properties of the most recent traversal's relationship.
    pub fn filter_edges(mut self, q: Q) -> Self {
        self.current().edge_filters.push(q);
        self
    }

    pub fn similar(mut self, filter: SimilarityFilter) -> Self {
        self.current().similarity.push(filter);
        self
    }

    /// `"age"` ascending, `"-age"` descending, `"?"` random.
    pub fn order_by(mut self, spec: &str) -> Self {
        let order = match spec {
            "?" => OrderBy::Random,
            _ => match spec.strip_prefix('-') {
                Some(field) => OrderBy::Field {
                    field: field.to_string(),
                    descending: true,
                },
                None => OrderBy::Field {
                    field: spec.to_string(),
                    descending: false,
                },
            },
        };
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, n: i64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn count(mut self) -> Self {
        self.projection = Projection::Count;
        self
    }

    pub fn returning_all(mut self) -> Self {
        self.projection = Projection::All;
        self
    }

    pub fn returning_edges(mut self) -> Self {
        self.projection = Projection::Edge;
        self
    }

    /// Return the root-to-last chain as a single path.
    pub fn returning_path(mut self) -> Self {
        self.projection = Projection::Path;
        self
    }

    pub fn returning_last(mut self) -> Self {
        self.projection = Projection::Last;
        self
    }
}

// ── Compiled output ──────────────────────────────────────────────

/// Query text, its parameter table and the returned column names.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompiledQuery {
    pub text: String,
    pub params: BTreeMap<String, ScalarValue>,
    pub columns: Vec<String>,
    /// The WHERE tree, kept for offline evaluation.
    #[serde(skip)]
    pub condition: Option<Condition>,
    /// WHERE trees of the `OPTIONAL MATCH` lines, in order.
    #[serde(skip)]
    pub optional_conditions: Vec<Option<Condition>>,
}

impl CompiledQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Evaluate the WHERE tree against a fixture. No tree always matches.
    pub fn matches(&self, fixture: &Fixture) -> Option<bool> {
        match &self.condition {
            Some(c) => c.eval(fixture, &self.params),
            None => Some(true),
        }
    }

    /// Column names of each row: the declared ones, else the aliases of the
    /// final RETURN clause. Empty for `RETURN *` or text without a RETURN.
    pub fn result_columns(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        return_columns(&self.text)
    }
}

/// Backtick-quote a label, relationship type or property name.
pub fn escape(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `-[ident:`TYPE`]->(rhs)`: one hop of a pattern chain.
pub fn rel_segment(rhs: &str, direction: Direction, ident: &str, rel_type: &str) -> String {
    let rel = format!("[{ident}:{}]", escape(rel_type));
    match direction {
        Direction::Outgoing => format!("-{rel}->({rhs})"),
        Direction::Incoming => format!("<-{rel}-({rhs})"),
        Direction::Either => format!("-{rel}-({rhs})"),
    }
}

/// `(lhs)-[ident:`TYPE`]->(rhs)` in the given direction. `lhs`/`rhs` are the
/// inner node pattern text (variable and/or escaped label).
pub fn rel_pattern(lhs: &str, rhs: &str, direction: Direction, ident: &str, rel_type: &str) -> String {
    format!("({lhs}){}", rel_segment(rhs, direction, ident, rel_type))
}

/// Byte offsets of `text` outside brackets, braces, parentheses and quotes.
fn top_level(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            _ if depth == 0 => offsets.push(i),
            _ => {}
        }
    }
    offsets
}

/// Top-level offsets where keyword `kw` starts a whitespace-delimited word.
fn keyword_offsets(text: &str, kw: &str) -> Vec<usize> {
    let upper = text.to_ascii_uppercase();
    top_level(text)
        .into_iter()
        .filter(|&i| upper[i..].starts_with(kw))
        .filter(|&i| upper[..i].chars().next_back().map_or(true, char::is_whitespace))
        .filter(|&i| {
            upper[i + kw.len()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace)
        })
        .collect()
}

/// Column names the last RETURN clause of `text` produces, in order.
fn return_columns(text: &str) -> Vec<String> {
    let Some(start) = keyword_offsets(text, "RETURN").last().copied() else {
        return Vec::new();
    };
    let body = &text[start + "RETURN".len()..];
    let end = ["ORDER", "SKIP", "LIMIT", "UNION"]
        .iter()
        .filter_map(|kw| keyword_offsets(body, kw).first().copied())
        .min()
        .unwrap_or(body.len());
    let mut body = body[..end].trim();
    if let Some(rest) = keyword_offsets(body, "DISTINCT")
        .first()
        .filter(|&&i| i == 0)
        .map(|_| body["DISTINCT".len()..].trim_start())
    {
        body = rest;
    }
    if body.is_empty() || body == "*" {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut from = 0;
    for i in top_level(body) {
        if body[i..].starts_with(',') {
            items.push(&body[from..i]);
            from = i + 1;
        }
    }
    items.push(&body[from..]);

    items
        .into_iter()
        .map(|item| {
            let item = item.trim();
            let name = match keyword_offsets(item, "AS").last() {
                Some(&i) => item[i + "AS".len()..].trim(),
                None => item,
            };
            match name.strip_prefix('`').and_then(|n| n.strip_suffix('`')) {
                Some(quoted) => quoted.replace("``", "`"),
                None => name.to_string(),
            }
        })
        .collect()
}

// ── Compiler ─────────────────────────────────────────────────────

#[derive(Default)]
struct Scratch {
    placeholders: BTreeMap<String, usize>,
    idents: BTreeMap<String, usize>,
    params: BTreeMap<String, ScalarValue>,
}

/// Word characters only, so the result is a valid variable or parameter name.
fn sanitize(base: &str) -> String {
    let mut out: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

impl Scratch {
    /// Register a parameter under `{key}_{n}` and return the placeholder.
    fn param(&mut self, key: &str, value: ScalarValue) -> String {
        let key = sanitize(key);
        let n = self.placeholders.entry(key.clone()).or_insert(0);
        *n += 1;
        let name = format!("{key}_{n}");
        self.params.insert(name.clone(), value);
        name
    }

    /// Reserve a query variable, suffixing on collision.
    fn ident(&mut self, base: &str) -> String {
        let base = sanitize(base);
        let n = self.idents.entry(base.clone()).or_insert(0);
        *n += 1;
        if *n == 1 {
            base
        } else {
            format!("{base}_{n}")
        }
    }
}

struct ResolvedAnchor {
    ident: String,
    model: DescriptorRef,
    scored: bool,
}

/// Compiles [`QuerySet`]s against a registry snapshot.
#[derive(Clone)]
pub struct Compiler {
    registry: Arc<Registry>,
    database: Option<String>,
}

impl Compiler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            database: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn model(&self, name: &str) -> Result<DescriptorRef, CompileError> {
        self.registry
            .model(name, self.database.as_deref())
            .map_err(|_| CompileError::UnknownModel(name.to_string()))
    }

    pub fn compile(&self, qs: &QuerySet) -> Result<CompiledQuery, CompileError> {
        let mut scratch = Scratch::default();
        let mut calls = Vec::new();
        let mut root = String::new();
        let mut segments: Vec<(String, String)> = Vec::new();
        let mut conditions = Vec::new();
        let mut optional: Vec<(String, Option<Condition>)> = Vec::new();
        let mut anchors: Vec<ResolvedAnchor> = Vec::with_capacity(qs.anchors.len());
        let mut last_rel = None;

        for (step, spec) in qs.anchors.iter().enumerate() {
            let mut local = Vec::new();
            let (ident, model, hop) = match (&spec.field, anchors.last()) {
                (Some(field), Some(prev)) => {
                    let rel = prev.model.relationship_field(field).ok_or_else(|| {
                        CompileError::UnknownTraversal {
                            field: field.clone(),
                            model: prev.model.name.clone(),
                        }
                    })?;
                    if !spec.optional && !optional.is_empty() {
                        return Err(CompileError::InvalidTraversal {
                            field: field.clone(),
                            reason: "a required step cannot follow an optional one".to_string(),
                        });
                    }
                    let target = self.model(&rel.target)?;
                    let ident = scratch.ident(field);
                    let rel_ident = scratch.ident(&format!("r{step}"));
                    let segment = rel_segment(
                        &format!("{ident}:{}", escape(target.primary_label())),
                        rel.direction,
                        &rel_ident,
                        &rel.rel_type,
                    );

                    if !spec.edge_filters.is_empty() {
                        let edge_model = match &rel.model {
                            Some(name) => self.model(name)?,
                            None => {
                                return Err(CompileError::NoEdgeModel {
                                    field: field.clone(),
                                    model: prev.model.name.clone(),
                                })
                            }
                        };
                        for q in &spec.edge_filters {
                            local.extend(compile_q(&mut scratch, q, &edge_model, &rel_ident)?);
                        }
                    }
                    last_rel = Some(rel_ident);
                    let pattern = format!("({}){segment}", prev.ident);
                    (ident, target, Some((pattern, segment)))
                }
                _ => {
                    let model = self.model(&qs.model)?;
                    let ident = match spec.id {
                        Some(_) => scratch.ident("source"),
                        None => scratch.ident(&model.primary_label().to_lowercase()),
                    };
                    root = format!("({ident}:{})", escape(model.primary_label()));
                    (ident, model, None)
                }
            };

            if let Some(id) = spec.id {
                let param = scratch.param(&format!("{ident}_id"), ScalarValue::Int(id));
                local.push(Condition::IdEquals {
                    ident: ident.clone(),
                    param,
                });
            }
            for q in &spec.filters {
                local.extend(compile_q(&mut scratch, q, &model, &ident)?);
            }
            for (field, present) in &spec.has {
                local.push(self.existence(&model, &ident, field, *present)?);
            }
            let scored = match spec.similarity.as_slice() {
                [] => false,
                [_] if spec.optional => {
                    return Err(CompileError::InvalidTraversal {
                        field: spec.field.clone().unwrap_or_default(),
                        reason: "optional steps cannot carry a similarity filter".to_string(),
                    })
                }
                [filter] => {
                    let (call, threshold) = similarity_call(&mut scratch, filter, &model, &ident)?;
                    calls.push(call);
                    local.extend(threshold);
                    true
                }
                _ => return Err(CompileError::DuplicateSimilarity { ident }),
            };

            match hop {
                Some((pattern, _)) if spec.optional => {
                    optional.push((pattern, Condition::and_all(local)));
                }
                Some((pattern, segment)) => {
                    segments.push((pattern, segment));
                    conditions.extend(local);
                }
                None => conditions.extend(local),
            }
            anchors.push(ResolvedAnchor {
                ident,
                model,
                scored,
            });
        }

        let last = anchors
            .last()
            .ok_or_else(|| CompileError::UnknownModel(qs.model.clone()))?;
        let path = match qs.projection {
            Projection::Path if !optional.is_empty() => {
                return Err(CompileError::IncompatibleProjection(
                    "path projection cannot include optional steps".to_string(),
                ))
            }
            Projection::Path => Some(scratch.ident("path")),
            _ => None,
        };

        let condition = Condition::and_all(conditions);
        let mut lines = calls;
        match &path {
            Some(path) => {
                let chain: String = segments.iter().map(|(_, segment)| segment.as_str()).collect();
                lines.push(format!("MATCH {path} = {root}{chain}"));
            }
            None => {
                let patterns: Vec<&str> = std::iter::once(root.as_str())
                    .chain(segments.iter().map(|(pattern, _)| pattern.as_str()))
                    .collect();
                lines.push(format!("MATCH {}", patterns.join(", ")));
            }
        }
        if let Some(c) = &condition {
            lines.push(format!("WHERE {}", c.render()));
        }
        let mut optional_conditions = Vec::with_capacity(optional.len());
        for (pattern, c) in optional {
            lines.push(format!("OPTIONAL MATCH {pattern}"));
            if let Some(c) = &c {
                lines.push(format!("WHERE {}", c.render()));
            }
            optional_conditions.push(c);
        }

        let columns = match qs.projection {
            Projection::Count => {
                if !qs.order_by.is_empty() || qs.skip.is_some() || qs.limit.is_some() {
                    return Err(CompileError::IncompatibleProjection(
                        "count cannot be combined with ordering or pagination".to_string(),
                    ));
                }
                lines.push(format!("RETURN count({}) AS count", last.ident));
                return Ok(CompiledQuery {
                    text: lines.join("\n"),
                    params: scratch.params,
                    columns: vec!["count".to_string()],
                    condition,
                    optional_conditions,
                });
            }
            Projection::Edge => match &last_rel {
                Some(rel) => vec![rel.clone()],
                None => {
                    return Err(CompileError::IncompatibleProjection(
                        "edge projection needs a traversal".to_string(),
                    ))
                }
            },
            Projection::Path => path.into_iter().collect(),
            Projection::Last => scored_columns(std::slice::from_ref(last)),
            Projection::All => scored_columns(&anchors),
        };
        lines.push(format!("RETURN {}", columns.join(", ")));

        let mut order = Vec::new();
        for o in &qs.order_by {
            match o {
                OrderBy::Random => order.push("rand()".to_string()),
                OrderBy::Field { field, descending } => {
                    let prop = last.model.property(field).ok_or_else(|| CompileError::UnknownField {
                        field: field.clone(),
                        model: last.model.name.clone(),
                    })?;
                    let dir = if *descending { " DESC" } else { "" };
                    order.push(format!("{}.{}{dir}", last.ident, escape(prop.db_name())));
                }
            }
        }
        if order.is_empty() && qs.projection != Projection::Edge {
            let returned: &[ResolvedAnchor] = match qs.projection {
                Projection::All => &anchors,
                _ => std::slice::from_ref(last),
            };
            if let Some(a) = returned.iter().find(|a| a.scored) {
                order.push(format!("{}_score DESC", a.ident));
            }
        }
        if !order.is_empty() {
            lines.push(format!("ORDER BY {}", order.join(", ")));
        }
        if let Some(n) = qs.skip {
            lines.push(format!("SKIP ${}", scratch.param("skip", non_negative("skip", n)?)));
        }
        if let Some(n) = qs.limit {
            lines.push(format!("LIMIT ${}", scratch.param("limit", non_negative("limit", n)?)));
        }

        Ok(CompiledQuery {
            text: lines.join("\n"),
            params: scratch.params,
            columns,
            condition,
            optional_conditions,
        })
    }

    fn existence(
        &self,
        model: &DescriptorRef,
        ident: &str,
        field: &str,
        present: bool,
    ) -> Result<Condition, CompileError> {
        let rel = model
            .relationship_field(field)
            .ok_or_else(|| CompileError::UnknownTraversal {
                field: field.to_string(),
                model: model.name.clone(),
            })?;
        let target = self.model(&rel.target)?;
        let pattern = rel_pattern(
            ident,
            &format!(":{}", escape(target.primary_label())),
            rel.direction,
            "",
            &rel.rel_type,
        );
        Ok(Condition::Exists {
            pattern,
            negated: !present,
        })
    }
}

fn scored_columns(anchors: &[ResolvedAnchor]) -> Vec<String> {
    let mut columns = Vec::new();
    for a in anchors {
        columns.push(a.ident.clone());
        if a.scored {
            columns.push(format!("{}_score", a.ident));
        }
    }
    columns
}

fn non_negative(what: &str, n: i64) -> Result<ScalarValue, CompileError> {
    if n < 0 {
        return Err(CompileError::InvalidValue {
            field: what.to_string(),
            operator: what.to_string(),
            reason: format!("must not be negative, got {n}"),
        });
    }
    Ok(ScalarValue::Int(n))
}

fn compile_q(
    scratch: &mut Scratch,
    q: &Q,
    model: &DescriptorRef,
    ident: &str,
) -> Result<Option<Condition>, CompileError> {
    match q {
        Q::Leaf(lookup) => compile_lookup(scratch, lookup, model, ident).map(Some),
        Q::Group {
            connector,
            negated,
            children,
        } => {
            let mut compiled = Vec::with_capacity(children.len());
            for child in children {
                compiled.extend(compile_q(scratch, child, model, ident)?);
            }
            let inner = match (compiled.len(), connector) {
                (0, _) => return Ok(None),
                (1, _) => compiled.pop(),
                (_, Connector::And) => Some(Condition::All(compiled)),
                (_, Connector::Or) => Some(Condition::Any(compiled)),
            };
            Ok(match (inner, negated) {
                (Some(c), true) => Some(Condition::Not(Box::new(c))),
                (inner, _) => inner,
            })
        }
    }
}

fn compile_lookup(
    scratch: &mut Scratch,
    lookup: &Lookup,
    model: &DescriptorRef,
    ident: &str,
) -> Result<Condition, CompileError> {
    let prop = model
        .property(&lookup.field)
        .ok_or_else(|| CompileError::UnknownField {
            field: lookup.field.clone(),
            model: model.name.clone(),
        })?;
    let invalid = |reason: &str| CompileError::InvalidValue {
        field: lookup.field.clone(),
        operator: lookup.op.to_string(),
        reason: reason.to_string(),
    };

    let value = match (lookup.op, &lookup.value) {
        (Operator::IsNull, ScalarValue::Bool(is_null)) => {
            return Ok(Condition::Property {
                ident: ident.to_string(),
                property: prop.db_name().to_string(),
                op: Operator::IsNull,
                param: None,
                is_null: *is_null,
            })
        }
        (Operator::IsNull, _) => return Err(invalid("expected a boolean")),
        (Operator::In, ScalarValue::List(items)) => ScalarValue::List(
            items
                .iter()
                .map(|item| prop.deflate(item.clone()))
                .collect::<Result<_, _>>()?,
        ),
        (Operator::In, _) => return Err(invalid("expected a list")),
        (Operator::IRegex, ScalarValue::String(pattern)) => ScalarValue::String(format!("(?i){pattern}")),
        (op, ScalarValue::String(_)) if op.is_string_match() => lookup.value.clone(),
        (op, _) if op.is_string_match() => return Err(invalid("expected a string")),
        (_, ScalarValue::Null) => return Err(invalid("null comparison; use isnull")),
        (_, value) => prop.deflate(value.clone())?,
    };

    let param = scratch.param(&format!("{ident}_{}", prop.db_name()), value);
    Ok(Condition::Property {
        ident: ident.to_string(),
        property: prop.db_name().to_string(),
        op: lookup.op,
        param: Some(param),
        is_null: false,
    })
}

fn similarity_call(
    scratch: &mut Scratch,
    filter: &SimilarityFilter,
    model: &DescriptorRef,
    ident: &str,
) -> Result<(String, Option<Condition>), CompileError> {
    let prop = model
        .property(&filter.property)
        .ok_or_else(|| CompileError::UnknownField {
            field: filter.property.clone(),
            model: model.name.clone(),
        })?;
    if filter.top_k < 1 {
        return Err(CompileError::InvalidValue {
            field: filter.property.clone(),
            operator: "similar".to_string(),
            reason: format!("top_k must be positive, got {}", filter.top_k),
        });
    }
    let not_indexed = |index: &'static str| CompileError::NotIndexed {
        field: filter.property.clone(),
        model: model.name.clone(),
        index,
    };

    let label = model.primary_label();
    let call = match &filter.query {
        SimilarityQuery::Vector(vector) => {
            let index = prop.vector_index.ok_or_else(|| not_indexed("vector"))?;
            if vector.len() != index.dimensions {
                return Err(CompileError::VectorDimensions {
                    field: filter.property.clone(),
                    expected: index.dimensions,
                    actual: vector.len(),
                });
            }
            let index_name = format!("vector_index_{label}_{}", prop.db_name());
            let p_index = scratch.param(&format!("{ident}_index"), ScalarValue::String(index_name));
            let p_k = scratch.param(&format!("{ident}_top_k"), ScalarValue::Int(filter.top_k));
            let p_vec = scratch.param(
                &format!("{ident}_vector"),
                ScalarValue::List(vector.iter().copied().map(ScalarValue::Float).collect()),
            );
            format!(
                "CALL db.index.vector.queryNodes(${p_index}, ${p_k}, ${p_vec}) YIELD node AS {ident}, score AS {ident}_score"
            )
        }
        SimilarityQuery::Text(text) => {
            if !prop.fulltext_index {
                return Err(not_indexed("fulltext"));
            }
            let index_name = format!("fulltext_index_{label}_{}", prop.db_name());
            let p_index = scratch.param(&format!("{ident}_index"), ScalarValue::String(index_name));
            let p_query = scratch.param(&format!("{ident}_query"), ScalarValue::String(text.clone()));
            let p_k = scratch.param(&format!("{ident}_top_k"), ScalarValue::Int(filter.top_k));
            format!(
                "CALL db.index.fulltext.queryNodes(${p_index}, ${p_query}, {{limit: ${p_k}}}) YIELD node AS {ident}, score AS {ident}_score"
            )
        }
    };

    let threshold = filter.threshold.map(|t| Condition::ScoreAtLeast {
        score: format!("{ident}_score"),
        param: scratch.param(&format!("{ident}_threshold"), ScalarValue::Float(t)),
    });
    Ok((call, threshold))
}
