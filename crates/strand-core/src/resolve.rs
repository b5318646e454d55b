//! Object resolution: raw graph values to typed model instances.
//!
//! Resolution is total and recursive over lists, maps and paths. Nodes must
//! resolve through the registry; relationships fall back to a generic edge
//! unless the resolver requires edge models.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{InflateError, ResolveError};
use crate::model::{DescriptorRef, LabelSet, PropertyDefault, RegistryKey};
use crate::registry::Registry;
use crate::value::{Properties, RawNode, RawPath, RawRelationship, RawValue, ScalarValue};

/// A node bound to its model. Properties are keyed by declared name and
/// every declared property is present (`Null` when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInstance {
    /// Database id; `None` until saved.
    pub id: Option<i64>,
    pub model: DescriptorRef,
    pub labels: LabelSet,
    pub properties: BTreeMap<String, ScalarValue>,
}

impl NodeInstance {
    /// An unsaved instance with no properties set.
    pub fn new(model: DescriptorRef) -> Self {
        let labels = model.label_set();
        Self {
            id: None,
            model,
            labels,
            properties: BTreeMap::new(),
        }
    }

    /// Inflate a raw node into `model`.
    pub fn inflate(model: DescriptorRef, raw: RawNode) -> Result<Self, InflateError> {
        let properties = inflate_properties(&model, raw.properties)?;
        Ok(Self {
            id: Some(raw.id),
            labels: LabelSet::new(raw.labels),
            model,
            properties,
        })
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ScalarValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.properties.get(name)
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    /// Back to the raw form, properties under their stored names.
    pub fn to_raw(&self) -> RawNode {
        RawNode {
            id: self.id.unwrap_or_default(),
            labels: self.labels.iter().map(str::to_string).collect(),
            properties: stored_properties(&self.model, &self.properties),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "model": self.model.name,
            "id": self.id,
            "labels": self.labels.iter().collect::<Vec<_>>(),
            "properties": properties_json(&self.properties),
        })
    }
}

/// A relationship, typed when an edge model is registered for its type.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeInstance {
    pub id: i64,
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    /// `None` for the generic fallback; properties are then kept raw.
    pub model: Option<DescriptorRef>,
    pub properties: BTreeMap<String, ScalarValue>,
}

impl EdgeInstance {
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.properties.get(name)
    }

    pub fn to_raw(&self) -> RawRelationship {
        RawRelationship {
            id: self.id,
            rel_type: self.rel_type.clone(),
            start: self.start,
            end: self.end,
            properties: match &self.model {
                Some(model) => stored_properties(model, &self.properties),
                None => self.properties.clone(),
            },
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.rel_type,
            "model": self.model.as_ref().map(|m| m.name.clone()),
            "id": self.id,
            "start": self.start,
            "end": self.end,
            "properties": properties_json(&self.properties),
        })
    }
}

/// A resolved path. Its length is the number of relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct PathValue {
    pub nodes: Vec<NodeInstance>,
    pub relationships: Vec<EdgeInstance>,
}

impl PathValue {
    pub fn start(&self) -> Option<&NodeInstance> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&NodeInstance> {
        self.nodes.last()
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// Output of the resolver, mirroring [`RawValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Scalar(ScalarValue),
    Node(NodeInstance),
    Relationship(EdgeInstance),
    Path(PathValue),
    List(Vec<ResolvedValue>),
    Map(BTreeMap<String, ResolvedValue>),
}

impl ResolvedValue {
    pub fn as_node(&self) -> Option<&NodeInstance> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<NodeInstance> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Reverse of resolution; resolving the result yields an equal value.
    pub fn into_raw(self) -> RawValue {
        match self {
            Self::Scalar(s) => RawValue::Scalar(s),
            Self::Node(n) => RawValue::Node(n.to_raw()),
            Self::Relationship(e) => RawValue::Relationship(e.to_raw()),
            Self::Path(p) => RawValue::Path(RawPath {
                nodes: p.nodes.iter().map(NodeInstance::to_raw).collect(),
                relationships: p.relationships.iter().map(EdgeInstance::to_raw).collect(),
            }),
            Self::List(items) => RawValue::List(items.into_iter().map(Self::into_raw).collect()),
            Self::Map(map) => {
                RawValue::Map(map.into_iter().map(|(k, v)| (k, v.into_raw())).collect())
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::Node(n) => n.to_json(),
            Self::Relationship(e) => e.to_json(),
            Self::Path(p) => serde_json::json!({
                "nodes": p.nodes.iter().map(NodeInstance::to_json).collect::<Vec<_>>(),
                "relationships": p.relationships.iter().map(EdgeInstance::to_json).collect::<Vec<_>>(),
                "length": p.len(),
            }),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Inflate stored properties into declared ones. Undeclared keys are dropped;
/// declared keys missing from the store take their literal default or `Null`.
pub fn inflate_properties(
    model: &DescriptorRef,
    mut stored: Properties,
) -> Result<BTreeMap<String, ScalarValue>, InflateError> {
    let mut out = BTreeMap::new();
    for prop in &model.properties {
        let value = match stored.remove(prop.db_name()) {
            Some(v) => prop.inflate(v)?,
            None => match &prop.default {
                Some(PropertyDefault::Value(v)) => v.clone(),
                _ => ScalarValue::Null,
            },
        };
        out.insert(prop.name.clone(), value);
    }
    Ok(out)
}

fn stored_properties(model: &DescriptorRef, values: &BTreeMap<String, ScalarValue>) -> Properties {
    model
        .properties
        .iter()
        .filter_map(|p| {
            values
                .get(&p.name)
                .map(|v| (p.db_name().to_string(), v.clone()))
        })
        .collect()
}

fn properties_json(values: &BTreeMap<String, ScalarValue>) -> serde_json::Value {
    serde_json::Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Converts raw results into typed instances against a registry snapshot.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
    database: Option<String>,
    require_edge_models: bool,
}

impl Resolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            database: None,
            require_edge_models: false,
        }
    }

    /// Prefer bindings scoped to `database`.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Fail on relationships whose type has no registered edge model
    /// instead of producing a generic edge. Path members always fall back.
    pub fn require_edge_models(mut self, require: bool) -> Self {
        self.require_edge_models = require;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn resolve_value(&self, raw: RawValue) -> Result<ResolvedValue, ResolveError> {
        Ok(match raw {
            RawValue::Scalar(s) => ResolvedValue::Scalar(s),
            RawValue::Node(n) => ResolvedValue::Node(self.resolve_node(n)?),
            RawValue::Relationship(r) => {
                ResolvedValue::Relationship(self.resolve_relationship(r, self.require_edge_models)?)
            }
            RawValue::Path(p) => ResolvedValue::Path(self.resolve_path(p)?),
            RawValue::List(items) => ResolvedValue::List(
                items
                    .into_iter()
                    .map(|item| self.resolve_value(item))
                    .collect::<Result<_, _>>()?,
            ),
            RawValue::Map(map) => ResolvedValue::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, self.resolve_value(v)?)))
                    .collect::<Result<_, ResolveError>>()?,
            ),
        })
    }

    pub fn resolve_node(&self, raw: RawNode) -> Result<NodeInstance, ResolveError> {
        let labels = LabelSet::new(raw.labels.iter().cloned());
        let key = RegistryKey::Node(labels.clone());
        match self.registry.resolve(&key, self.database.as_deref()) {
            Ok(model) => Ok(NodeInstance::inflate(model, raw)?),
            Err(miss) => {
                tracing::debug!(labels = %labels, "Node labels not registered");
                Err(ResolveError::UnresolvedNode {
                    labels,
                    database: miss.database,
                    candidates: miss.candidates,
                })
            }
        }
    }

    pub fn resolve_relationship(
        &self,
        raw: RawRelationship,
        require_model: bool,
    ) -> Result<EdgeInstance, ResolveError> {
        let key = RegistryKey::Relationship(raw.rel_type.clone());
        let (model, properties) = match self.registry.resolve(&key, self.database.as_deref()) {
            Ok(model) => {
                let props = inflate_properties(&model, raw.properties)?;
                (Some(model), props)
            }
            Err(miss) if require_model => {
                return Err(ResolveError::UnresolvedRelationship {
                    rel_type: raw.rel_type,
                    database: miss.database,
                    candidates: miss.candidates,
                })
            }
            Err(_) => (None, raw.properties),
        };
        Ok(EdgeInstance {
            id: raw.id,
            rel_type: raw.rel_type,
            start: raw.start,
            end: raw.end,
            model,
            properties,
        })
    }

    pub fn resolve_path(&self, raw: RawPath) -> Result<PathValue, ResolveError> {
        let nodes = raw
            .nodes
            .into_iter()
            .map(|n| self.resolve_node(n))
            .collect::<Result<_, _>>()?;
        let relationships = raw
            .relationships
            .into_iter()
            .map(|r| self.resolve_relationship(r, false))
            .collect::<Result<_, _>>()?;
        Ok(PathValue {
            nodes,
            relationships,
        })
    }

    pub fn resolve_row(&self, row: Vec<RawValue>) -> Result<Vec<ResolvedValue>, ResolveError> {
        row.into_iter().map(|v| self.resolve_value(v)).collect()
    }

    pub fn resolve_rows(
        &self,
        rows: Vec<Vec<RawValue>>,
    ) -> Result<Vec<Vec<ResolvedValue>>, ResolveError> {
        rows.into_iter().map(|r| self.resolve_row(r)).collect()
    }
}
