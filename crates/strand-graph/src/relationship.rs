//! Relationship field accessor: traversal reads and guarded writes.

use strand_core::model::{DescriptorRef, RelationshipDef};
use strand_core::value::Properties;
use strand_core::{EdgeInstance, NodeInstance, RawValue, ScalarValue};

use crate::cardinality::{saved_id, CardinalityGuard, CardinalityNotice, CheckMode};
use crate::client::GraphError;
use crate::compile::QuerySet;
use crate::error::CompileError;
use crate::mutations::{
    connect_edge, disconnect_all_edges, disconnect_edge, reconnect_edge, reconnect_single_edge, replace_edges,
    stored_for_write,
};
use crate::session::Ogm;

/// Result of a connect: the written edge plus any overridden bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOutcome {
    pub edge: EdgeInstance,
    pub notices: Vec<CardinalityNotice>,
}

/// One relationship field of one saved node.
pub struct RelationshipAccessor<'a> {
    ogm: &'a Ogm,
    source: &'a NodeInstance,
    source_id: i64,
    rel: &'a RelationshipDef,
    target: DescriptorRef,
}

impl<'a> RelationshipAccessor<'a> {
    pub(crate) fn new(ogm: &'a Ogm, source: &'a NodeInstance, field: &str) -> Result<Self, GraphError> {
        let source_id = saved_id(source)?;
        let rel = source
            .model
            .relationship_field(field)
            .ok_or_else(|| CompileError::UnknownTraversal {
                field: field.to_string(),
                model: source.model_name().to_string(),
            })?;
        let target = ogm.compiler().model(&rel.target)?;
        Ok(Self {
            ogm,
            source,
            source_id,
            rel,
            target,
        })
    }

    pub fn definition(&self) -> &RelationshipDef {
        self.rel
    }

    /// Query set over the related nodes, for further filtering.
    pub fn query(&self) -> QuerySet {
        QuerySet::from_node(self.source.model_name(), self.source_id).traverse(&self.rel.name)
    }

    fn guard(&self) -> CardinalityGuard<'a> {
        CardinalityGuard::new(self.ogm)
    }

    fn check_target(&self, node: &NodeInstance) -> Result<i64, GraphError> {
        let id = saved_id(node)?;
        if !node.labels.contains(self.target.primary_label()) {
            return Err(GraphError::WrongTarget {
                field: self.rel.name.clone(),
                expected: self.target.name.clone(),
                found: node.model_name().to_string(),
            });
        }
        Ok(id)
    }

    /// Edge properties in stored form, through the field's edge model.
    fn edge_properties(&self, values: &Properties) -> Result<Properties, GraphError> {
        match &self.rel.model {
            Some(name) => {
                let model = self.ogm.compiler().model(name)?;
                for key in values.keys() {
                    if model.property(key).is_none() {
                        return Err(CompileError::UnknownField {
                            field: key.clone(),
                            model: model.name.clone(),
                        }
                        .into());
                    }
                }
                stored_for_write(&model, values, true)
            }
            None if values.is_empty() => Ok(Properties::new()),
            None => Err(CompileError::NoEdgeModel {
                field: self.rel.name.clone(),
                model: self.source.model_name().to_string(),
            }
            .into()),
        }
    }

    fn single_edge(&self, rows: Vec<Vec<RawValue>>) -> Result<Option<EdgeInstance>, GraphError> {
        match rows.into_iter().next().and_then(|row| row.into_iter().next()) {
            Some(RawValue::Relationship(raw)) => {
                Ok(Some(self.ogm.resolver().resolve_relationship(raw, false)?))
            }
            Some(other) => Err(GraphError::Conversion(format!(
                "expected a relationship, got {other:?}"
            ))),
            None => Ok(None),
        }
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Every related node. Fails when the stored edges break the field's
    /// cardinality.
    pub async fn all(&self) -> Result<Vec<NodeInstance>, GraphError> {
        let nodes = self.ogm.all(&self.query()).await?;
        self.guard().check_read(self.source, self.rel, nodes.len())?;
        Ok(nodes)
    }

    pub async fn single(&self) -> Result<Option<NodeInstance>, GraphError> {
        Ok(self.all().await?.into_iter().next())
    }

    /// Number of related nodes, without a cardinality check.
    pub async fn count(&self) -> Result<usize, GraphError> {
        self.ogm.count_query(self.query()).await
    }

    pub async fn is_connected(&self, node: &NodeInstance) -> Result<bool, GraphError> {
        let id = saved_id(node)?;
        Ok(self.ogm.count_query(self.query().with_id(id)).await? > 0)
    }

    /// The edge to `node`, if any.
    pub async fn relationship(&self, node: &NodeInstance) -> Result<Option<EdgeInstance>, GraphError> {
        Ok(self.relationships(node).await?.into_iter().next())
    }

    /// Every edge to `node`.
    pub async fn relationships(&self, node: &NodeInstance) -> Result<Vec<EdgeInstance>, GraphError> {
        let id = saved_id(node)?;
        let compiled = self
            .ogm
            .compiler()
            .compile(&self.query().with_id(id).returning_edges())?;
        let resolver = self.ogm.resolver();
        self.ogm
            .execute(&compiled)
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|value| match value {
                RawValue::Relationship(raw) => Ok(resolver.resolve_relationship(raw, false)?),
                other => Err(GraphError::Conversion(format!(
                    "expected a relationship, got {other:?}"
                ))),
            })
            .collect()
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Connect to `node`, checking both ends' upper bounds under `mode`.
    pub async fn connect(
        &self,
        node: &NodeInstance,
        properties: Properties,
        mode: CheckMode,
    ) -> Result<ConnectOutcome, GraphError> {
        let target_id = self.check_target(node)?;
        let props = self.edge_properties(&properties)?;
        let notices = self
            .guard()
            .check_connect(self.source, self.rel, node, mode)
            .await?;
        let rows = self
            .ogm
            .execute(&connect_edge(self.rel, self.source_id, target_id, props))
            .await?;
        let edge = self.single_edge(rows)?.ok_or(GraphError::NotConnected {
            field: self.rel.name.clone(),
            node_id: self.source_id,
            target_id,
        })?;
        tracing::debug!(
            field = %self.rel.name,
            source = self.source_id,
            target = target_id,
            overridden = notices.len(),
            "Connected"
        );
        Ok(ConnectOutcome { edge, notices })
    }

    /// Remove the edge to `node`. Lower bounds hold in every mode.
    pub async fn disconnect(&self, node: &NodeInstance) -> Result<(), GraphError> {
        let target_id = saved_id(node)?;
        self.guard().check_disconnect(self.source, self.rel).await?;
        self.ogm
            .execute(&disconnect_edge(self.rel, self.source_id, target_id))
            .await?;
        Ok(())
    }

    pub async fn disconnect_all(&self) -> Result<(), GraphError> {
        self.guard().check_disconnect_all(self.source, self.rel)?;
        self.ogm
            .execute(&disconnect_all_edges(
                self.rel,
                self.target.primary_label(),
                self.source_id,
            ))
            .await?;
        Ok(())
    }

    /// Move the edge from `old` to `new` atomically, keeping its properties.
    /// Reconnecting to the same node is a no-op. A field holding at most one
    /// edge ends with exactly one, even if soft connects overfilled it.
    pub async fn reconnect(&self, old: &NodeInstance, new: &NodeInstance) -> Result<(), GraphError> {
        let old_id = saved_id(old)?;
        let new_id = self.check_target(new)?;
        if old_id == new_id {
            return Ok(());
        }
        let statement = match self.rel.cardinality.max() {
            Some(1) => reconnect_single_edge(
                self.rel,
                self.target.primary_label(),
                self.source_id,
                old_id,
                new_id,
            ),
            _ => reconnect_edge(self.rel, self.source_id, old_id, new_id),
        };
        let rows = self.ogm.execute(&statement).await?;
        if rows.is_empty() {
            return Err(GraphError::NotConnected {
                field: self.rel.name.clone(),
                node_id: self.source_id,
                target_id: old_id,
            });
        }
        Ok(())
    }

    /// Drop every edge of the field and connect `node` in one statement.
    /// The source keeps exactly one edge, so only the target end is checked.
    pub async fn replace(
        &self,
        node: &NodeInstance,
        properties: Properties,
        mode: CheckMode,
    ) -> Result<ConnectOutcome, GraphError> {
        let target_id = self.check_target(node)?;
        let props = self.edge_properties(&properties)?;
        let notices: Vec<_> = self
            .guard()
            .check_inverse(self.source, self.rel, node, mode)
            .await?
            .into_iter()
            .collect();
        let rows = self
            .ogm
            .execute(&replace_edges(
                self.rel,
                self.target.primary_label(),
                self.source_id,
                target_id,
                props,
            ))
            .await?;
        let edge = self.single_edge(rows)?.ok_or(GraphError::NotConnected {
            field: self.rel.name.clone(),
            node_id: self.source_id,
            target_id,
        })?;
        Ok(ConnectOutcome { edge, notices })
    }
}

/// Edge property map from `(name, value)` pairs.
pub fn edge_props<I, K, V>(pairs: I) -> Properties
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ScalarValue>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
