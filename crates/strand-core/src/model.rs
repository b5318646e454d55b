//! Model descriptors: the registration-time metadata for node and
//! relationship types.
//!
//! A descriptor is built once (builder or JSON schema), then frozen behind an
//! `Arc` and shared by the registry, the resolver and the query compiler.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeflateError, InflateError, RegistryError};
use crate::value::ScalarValue;

/// Shared, immutable handle to a registered descriptor.
pub type DescriptorRef = Arc<ModelDescriptor>;

/// Optional labels expand to every subset, so their number is capped.
pub const MAX_OPTIONAL_LABELS: usize = 16;

// ── Labels and keys ──────────────────────────────────────────────

/// An order-independent set of node labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, extra: &[&String]) -> Self {
        let mut set = self.0.clone();
        set.extend(extra.iter().map(|s| (*s).clone()));
        Self(set)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{label}")?;
        }
        write!(f, "}}")
    }
}

/// What a registry entry is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegistryKey {
    Node(LabelSet),
    Relationship(String),
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(labels) => write!(f, "{labels}"),
            Self::Relationship(rel_type) => write!(f, "[:{rel_type}]"),
        }
    }
}

// ── Relationship declarations ────────────────────────────────────

/// Direction of a relationship field, seen from the declaring node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    Either,
}

impl Direction {
    pub fn inverse(self) -> Self {
        match self {
            Self::Outgoing => Self::Incoming,
            Self::Incoming => Self::Outgoing,
            Self::Either => Self::Either,
        }
    }

    /// Phrase used in cardinality messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Outgoing => "a outgoing",
            Self::Incoming => "a incoming",
            Self::Either => "either",
        }
    }
}

/// Declared multiplicity of a relationship field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    ZeroOrMore,
    ZeroOrOne,
    OneOrMore,
    One,
}

impl Cardinality {
    pub fn min(self) -> usize {
        match self {
            Self::ZeroOrMore | Self::ZeroOrOne => 0,
            Self::OneOrMore | Self::One => 1,
        }
    }

    /// Upper bound, `None` when unbounded.
    pub fn max(self) -> Option<usize> {
        match self {
            Self::ZeroOrOne | Self::One => Some(1),
            Self::ZeroOrMore | Self::OneOrMore => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ZeroOrMore => "zero or more relationships",
            Self::ZeroOrOne => "zero or one relationship",
            Self::OneOrMore => "one or more relationships",
            Self::One => "one relationship",
        }
    }
}

/// A relationship field declared on a node model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Name of the target node model; resolved lazily through the registry.
    pub target: String,
    pub rel_type: String,
    pub direction: Direction,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Name of the relationship model describing edge properties.
    #[serde(default)]
    pub model: Option<String>,
}

// ── Properties ───────────────────────────────────────────────────

/// Codec of a declared property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    UniqueId,
    Json,
    Array(Box<PropertyKind>),
    Vector,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::DateTime => write!(f, "datetime"),
            Self::Date => write!(f, "date"),
            Self::UniqueId => write!(f, "unique_id"),
            Self::Json => write!(f, "json"),
            Self::Array(inner) => write!(f, "array<{inner}>"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

impl PropertyKind {
    /// Database value to application value. Null passes through.
    fn inflate_value(&self, value: ScalarValue) -> Result<ScalarValue, String> {
        if value.is_null() {
            return Ok(value);
        }
        match (self, value) {
            (Self::String | Self::UniqueId, v @ ScalarValue::String(_)) => Ok(v),
            (Self::Integer, v @ ScalarValue::Int(_)) => Ok(v),
            (Self::Integer, ScalarValue::Float(f)) => float_to_int(f),
            (Self::Integer, ScalarValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(ScalarValue::Int)
                .map_err(|e| e.to_string()),
            (Self::Float, v @ ScalarValue::Float(_)) => Ok(v),
            (Self::Float, ScalarValue::Int(i)) => Ok(ScalarValue::Float(i as f64)),
            (Self::Boolean, v @ ScalarValue::Bool(_)) => Ok(v),
            (Self::DateTime, v @ ScalarValue::DateTime(_)) => Ok(v),
            (Self::DateTime, ScalarValue::LocalDateTime(dt)) => {
                Ok(ScalarValue::DateTime(dt.and_utc().fixed_offset()))
            }
            (Self::DateTime, ScalarValue::Float(secs)) => epoch_to_datetime(secs),
            (Self::DateTime, ScalarValue::Int(secs)) => epoch_to_datetime(secs as f64),
            (Self::DateTime, ScalarValue::String(s)) => parse_datetime(&s),
            (Self::Date, v @ ScalarValue::Date(_)) => Ok(v),
            (Self::Date, ScalarValue::DateTime(dt)) => Ok(ScalarValue::Date(dt.date_naive())),
            (Self::Date, ScalarValue::LocalDateTime(dt)) => Ok(ScalarValue::Date(dt.date())),
            (Self::Date, ScalarValue::String(s)) => parse_date(&s),
            (Self::Json, ScalarValue::String(s)) => serde_json::from_str::<serde_json::Value>(&s)
                .map(ScalarValue::from)
                .map_err(|e| e.to_string()),
            (Self::Json, v @ (ScalarValue::Map(_) | ScalarValue::List(_))) => Ok(v),
            (Self::Array(inner), ScalarValue::List(items)) => items
                .into_iter()
                .map(|item| inner.inflate_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(ScalarValue::List),
            (Self::Vector, ScalarValue::List(items)) => to_float_list(items),
            (_, other) => Err(format!("unexpected {} value", other.type_name())),
        }
    }

    /// Application value to database value. Null passes through.
    fn deflate_value(&self, value: ScalarValue) -> Result<ScalarValue, String> {
        if value.is_null() {
            return Ok(value);
        }
        match (self, value) {
            (Self::String | Self::UniqueId, v @ ScalarValue::String(_)) => Ok(v),
            (Self::Integer, v @ ScalarValue::Int(_)) => Ok(v),
            (Self::Float, v @ ScalarValue::Float(_)) => Ok(v),
            (Self::Float, ScalarValue::Int(i)) => Ok(ScalarValue::Float(i as f64)),
            (Self::Boolean, v @ ScalarValue::Bool(_)) => Ok(v),
            (Self::DateTime, v @ ScalarValue::DateTime(_)) => Ok(v),
            (Self::DateTime, ScalarValue::String(s)) => parse_datetime(&s),
            (Self::Date, v @ ScalarValue::Date(_)) => Ok(v),
            (Self::Date, ScalarValue::String(s)) => parse_date(&s),
            (Self::Json, v) => serde_json::to_string(&v.to_json())
                .map(ScalarValue::String)
                .map_err(|e| e.to_string()),
            (Self::Array(inner), ScalarValue::List(items)) => items
                .into_iter()
                .map(|item| inner.deflate_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(ScalarValue::List),
            (Self::Vector, ScalarValue::List(items)) => to_float_list(items),
            (_, other) => Err(format!("unexpected {} value", other.type_name())),
        }
    }
}

/// Integral floats only, and only inside the `i64` range.
fn float_to_int(f: f64) -> Result<ScalarValue, String> {
    // 2^63 is exactly representable; anything at or beyond it saturates.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() != 0.0 || !f.is_finite() {
        return Err(format!("{f} is not an integral value"));
    }
    if !(-LIMIT..LIMIT).contains(&f) {
        return Err(format!("{f} is outside the integer range"));
    }
    Ok(ScalarValue::Int(f as i64))
}

fn epoch_to_datetime(secs: f64) -> Result<ScalarValue, String> {
    let out_of_range = || format!("timestamp {secs} out of range");
    // Floor, not trunc: -1.5 is one second and a half before the epoch.
    let floor = secs.floor();
    if !(i64::MIN as f64..i64::MAX as f64).contains(&floor) {
        return Err(out_of_range());
    }
    let mut whole = floor as i64;
    let mut nanos = ((secs - floor) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        whole = whole.checked_add(1).ok_or_else(out_of_range)?;
        nanos = 0;
    }
    Utc.timestamp_opt(whole, nanos)
        .single()
        .map(|dt| ScalarValue::DateTime(dt.fixed_offset()))
        .ok_or_else(out_of_range)
}

fn parse_datetime(s: &str) -> Result<ScalarValue, String> {
    DateTime::<FixedOffset>::parse_from_rfc3339(s)
        .map(ScalarValue::DateTime)
        .map_err(|e| e.to_string())
}

fn parse_date(s: &str) -> Result<ScalarValue, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(ScalarValue::Date)
        .map_err(|e| e.to_string())
}

fn to_float_list(items: Vec<ScalarValue>) -> Result<ScalarValue, String> {
    items
        .into_iter()
        .map(|item| match item {
            ScalarValue::Float(f) => Ok(ScalarValue::Float(f)),
            ScalarValue::Int(i) => Ok(ScalarValue::Float(i as f64)),
            other => Err(format!("vector element must be numeric, got {}", other.type_name())),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ScalarValue::List)
}

/// Generated default for a property left unset at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyDefault {
    Value(ScalarValue),
    Uuid4,
    Now,
}

impl PropertyDefault {
    pub fn generate(&self) -> ScalarValue {
        match self {
            Self::Value(v) => v.clone(),
            Self::Uuid4 => ScalarValue::String(uuid::Uuid::new_v4().simple().to_string()),
            Self::Now => ScalarValue::DateTime(Utc::now().fixed_offset()),
        }
    }
}

/// Vector index settings on a property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub dimensions: usize,
}

/// A declared property on a node or relationship model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    /// Name under which the property is stored, when it differs from `name`.
    #[serde(default)]
    pub db_property: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<PropertyDefault>,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub unique_index: bool,
    #[serde(default)]
    pub fulltext_index: bool,
    #[serde(default)]
    pub vector_index: Option<VectorIndex>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        let generated_id = kind == PropertyKind::UniqueId;
        Self {
            name: name.into(),
            kind,
            db_property: None,
            required: false,
            default: generated_id.then_some(PropertyDefault::Uuid4),
            index: false,
            unique_index: generated_id,
            fulltext_index: false,
            vector_index: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<ScalarValue>) -> Self {
        self.default = Some(PropertyDefault::Value(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(PropertyDefault::Now);
        self
    }

    pub fn stored_as(mut self, db_property: impl Into<String>) -> Self {
        self.db_property = Some(db_property.into());
        self
    }

    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique_index = true;
        self
    }

    pub fn fulltext_indexed(mut self) -> Self {
        self.fulltext_index = true;
        self
    }

    pub fn vector_indexed(mut self, dimensions: usize) -> Self {
        self.vector_index = Some(VectorIndex { dimensions });
        self
    }

    /// Name of the key in the database.
    pub fn db_name(&self) -> &str {
        self.db_property.as_deref().unwrap_or(&self.name)
    }

    pub fn inflate(&self, value: ScalarValue) -> Result<ScalarValue, InflateError> {
        self.kind
            .inflate_value(value)
            .map_err(|reason| InflateError {
                property: self.name.clone(),
                kind: self.kind.to_string(),
                reason,
            })
    }

    pub fn deflate(&self, value: ScalarValue) -> Result<ScalarValue, DeflateError> {
        self.kind
            .deflate_value(value)
            .map_err(|reason| DeflateError {
                property: self.name.clone(),
                kind: self.kind.to_string(),
                reason,
            })
    }
}

// ── Descriptors ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Node,
    Relationship,
}

/// Registration metadata for one node or relationship model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub kind: ModelKind,
    /// Primary label; defaults to the model name.
    #[serde(default)]
    pub label: Option<String>,
    /// Labels inherited from parent models.
    #[serde(default)]
    pub inherited_labels: Vec<String>,
    #[serde(default)]
    pub optional_labels: Vec<String>,
    /// Relationship type, for relationship models.
    #[serde(default)]
    pub rel_type: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
    /// Databases this model is registered in; empty means global.
    #[serde(default)]
    pub target_databases: Vec<String>,
    /// Allows a later registration to replace an existing binding.
    #[serde(default)]
    pub reloadable: bool,
}

impl ModelDescriptor {
    /// Start a node model whose primary label is its name.
    pub fn node(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name.into(), ModelKind::Node, None)
    }

    /// Start a relationship model bound to `rel_type`.
    pub fn relationship(name: impl Into<String>, rel_type: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name.into(), ModelKind::Relationship, Some(rel_type.into()))
    }

    pub fn is_node(&self) -> bool {
        self.kind == ModelKind::Node
    }

    pub fn primary_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Inherited labels plus the primary label.
    pub fn label_set(&self) -> LabelSet {
        LabelSet::new(
            self.inherited_labels
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(self.primary_label())),
        )
    }

    /// Every registry key this model binds: for nodes, the base label set
    /// combined with each subset of optional labels.
    pub fn registry_keys(&self) -> Result<Vec<RegistryKey>, RegistryError> {
        match self.kind {
            ModelKind::Relationship => Ok(self
                .rel_type
                .iter()
                .map(|t| RegistryKey::Relationship(t.clone()))
                .collect()),
            ModelKind::Node => {
                let base = self.label_set();
                let optional: Vec<&String> = self.optional_labels.iter().collect();
                if optional.len() > MAX_OPTIONAL_LABELS {
                    return Err(RegistryError::TooManyOptionalLabels {
                        model: self.name.clone(),
                        count: optional.len(),
                        max: MAX_OPTIONAL_LABELS,
                    });
                }
                let mut keys = Vec::with_capacity(1 << optional.len());
                for mask in 0..(1usize << optional.len()) {
                    let extra: Vec<&String> = optional
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << i) != 0)
                        .map(|(_, l)| *l)
                        .collect();
                    keys.push(RegistryKey::Node(base.with(&extra)));
                }
                Ok(keys)
            }
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn relationship_field(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// Builder for [`ModelDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    descriptor: ModelDescriptor,
}

impl DescriptorBuilder {
    fn new(name: String, kind: ModelKind, rel_type: Option<String>) -> Self {
        Self {
            descriptor: ModelDescriptor {
                name,
                kind,
                label: None,
                inherited_labels: Vec::new(),
                optional_labels: Vec::new(),
                rel_type,
                properties: Vec::new(),
                relationships: Vec::new(),
                target_databases: Vec::new(),
                reloadable: false,
            },
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.descriptor.label = Some(label.into());
        self
    }

    pub fn inherits(mut self, label: impl Into<String>) -> Self {
        self.descriptor.inherited_labels.push(label.into());
        self
    }

    pub fn optional_label(mut self, label: impl Into<String>) -> Self {
        self.descriptor.optional_labels.push(label.into());
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.descriptor.properties.push(property);
        self
    }

    pub fn relationship_to(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
        cardinality: Cardinality,
    ) -> Self {
        self.descriptor.relationships.push(RelationshipDef {
            name: name.into(),
            target: target.into(),
            rel_type: rel_type.into(),
            direction,
            cardinality,
            model: None,
        });
        self
    }

    /// Attach an edge model to the most recently declared relationship field.
    pub fn via(mut self, edge_model: impl Into<String>) -> Self {
        if let Some(last) = self.descriptor.relationships.last_mut() {
            last.model = Some(edge_model.into());
        }
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.descriptor.target_databases.push(database.into());
        self
    }

    pub fn reloadable(mut self) -> Self {
        self.descriptor.reloadable = true;
        self
    }

    pub fn build(self) -> DescriptorRef {
        Arc::new(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> DescriptorRef {
        ModelDescriptor::node("Person")
            .inherits("Entity")
            .optional_label("Admin")
            .optional_label("Verified")
            .property(PropertyDef::new("name", PropertyKind::String).required())
            .property(PropertyDef::new("age", PropertyKind::Integer).stored_as("years"))
            .relationship_to("friends", "Person", "FRIENDS_WITH", Direction::Either, Cardinality::ZeroOrMore)
            .build()
    }

    #[test]
    fn test_label_set_includes_inherited() {
        let d = person();
        assert_eq!(d.label_set(), LabelSet::new(["Entity", "Person"]));
        assert_eq!(d.primary_label(), "Person");
    }

    #[test]
    fn test_optional_labels_expand_to_all_combinations() {
        let keys = person().registry_keys().unwrap();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&RegistryKey::Node(LabelSet::new(["Entity", "Person"]))));
        assert!(keys.contains(&RegistryKey::Node(LabelSet::new([
            "Entity", "Person", "Admin", "Verified"
        ]))));
    }

    #[test]
    fn test_relationship_model_key() {
        let d = ModelDescriptor::relationship("Knows", "KNOWS").build();
        assert_eq!(
            d.registry_keys().unwrap(),
            vec![RegistryKey::Relationship("KNOWS".into())]
        );
    }

    #[test]
    fn test_db_name_alias() {
        let d = person();
        assert_eq!(d.property("age").map(|p| p.db_name()), Some("years"));
        assert_eq!(d.property("name").map(|p| p.db_name()), Some("name"));
    }

    #[test]
    fn test_integer_inflate_accepts_integral_float() {
        let p = PropertyDef::new("n", PropertyKind::Integer);
        assert_eq!(p.inflate(ScalarValue::Float(3.0)).ok(), Some(ScalarValue::Int(3)));
        assert!(p.inflate(ScalarValue::Bool(true)).is_err());
    }

    #[test]
    fn test_datetime_inflates_epoch_seconds() {
        let p = PropertyDef::new("at", PropertyKind::DateTime);
        match p.inflate(ScalarValue::Float(0.0)) {
            Ok(ScalarValue::DateTime(dt)) => assert_eq!(dt.timestamp(), 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_datetime_inflates_negative_fractional_epoch() {
        let p = PropertyDef::new("at", PropertyKind::DateTime);
        match p.inflate(ScalarValue::Float(-1.5)) {
            Ok(ScalarValue::DateTime(dt)) => assert_eq!(dt.timestamp_millis(), -1500),
            other => panic!("unexpected {other:?}"),
        }
        match p.inflate(ScalarValue::Float(1.25)) {
            Ok(ScalarValue::DateTime(dt)) => assert_eq!(dt.timestamp_millis(), 1250),
            other => panic!("unexpected {other:?}"),
        }
        assert!(p.inflate(ScalarValue::Float(f64::NAN)).is_err());
        assert!(p.inflate(ScalarValue::Float(1e300)).is_err());
    }

    #[test]
    fn test_datetime_inflates_local_datetime_as_utc() {
        let p = PropertyDef::new("at", PropertyKind::DateTime);
        let local = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        match p.inflate(ScalarValue::LocalDateTime(local)) {
            Ok(ScalarValue::DateTime(dt)) => assert_eq!(dt.naive_utc(), local),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_integer_inflate_rejects_out_of_range_float() {
        let p = PropertyDef::new("n", PropertyKind::Integer);
        assert!(p.inflate(ScalarValue::Float(1e19)).is_err());
        assert!(p.inflate(ScalarValue::Float(-1e19)).is_err());
        assert!(p.inflate(ScalarValue::Float(f64::INFINITY)).is_err());
        assert!(p.inflate(ScalarValue::Float(2.5)).is_err());
        assert_eq!(
            p.inflate(ScalarValue::Float(-4.0)).ok(),
            Some(ScalarValue::Int(-4))
        );
    }

    #[test]
    fn test_too_many_optional_labels_rejected() {
        let mut builder = ModelDescriptor::node("Tagged");
        for i in 0..=MAX_OPTIONAL_LABELS {
            builder = builder.optional_label(format!("Tag{i}"));
        }
        let err = builder.build().registry_keys().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::TooManyOptionalLabels { count, .. } if count == MAX_OPTIONAL_LABELS + 1
        ));
    }

    #[test]
    fn test_deflate_error_names_property() {
        let p = PropertyDef::new("name", PropertyKind::String);
        let err = p.deflate(ScalarValue::Int(1)).unwrap_err();
        assert_eq!(err.property, "name");
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_json_property_round_trip() {
        let p = PropertyDef::new("meta", PropertyKind::Json);
        let value = ScalarValue::from(serde_json::json!({"a": [1, 2]}));
        let stored = p.deflate(value.clone()).unwrap();
        assert!(matches!(stored, ScalarValue::String(_)));
        assert_eq!(p.inflate(stored).unwrap(), value);
    }

    #[test]
    fn test_unique_id_generates_default() {
        let p = PropertyDef::new("uid", PropertyKind::UniqueId);
        let generated = p.default.as_ref().map(PropertyDefault::generate);
        match generated {
            Some(ScalarValue::String(s)) => assert_eq!(s.len(), 32),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_descriptor_from_json() {
        let d: ModelDescriptor = serde_json::from_value(serde_json::json!({
            "name": "Book",
            "kind": "node",
            "properties": [
                {"name": "title", "kind": "string", "fulltext_index": true},
                {"name": "embedding", "kind": "vector", "vector_index": {"dimensions": 3}},
                {"name": "tags", "kind": {"array": "string"}}
            ],
            "relationships": [
                {"name": "author", "target": "Person", "rel_type": "WROTE",
                 "direction": "incoming", "cardinality": "one"}
            ]
        }))
        .unwrap();
        assert_eq!(d.primary_label(), "Book");
        assert_eq!(
            d.property("tags").map(|p| p.kind.clone()),
            Some(PropertyKind::Array(Box::new(PropertyKind::String)))
        );
        assert_eq!(
            d.relationship_field("author").map(|r| r.cardinality),
            Some(Cardinality::One)
        );
    }
}
