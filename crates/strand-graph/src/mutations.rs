//! Write statements and node persistence.
//!
//! Statement builders are pure: they return [`CompiledQuery`] values with
//! stable parameter names (`id`, `props`, `source_id`, `target_id`,
//! `old_id`, `new_id`). Relationship writes match through the field's
//! direction but always create edges outgoing from the source when the
//! field is undirected.

use strand_core::model::{Direction, ModelDescriptor, RelationshipDef};
use strand_core::value::Properties;
use strand_core::{NodeInstance, RawValue, ScalarValue};

use crate::cardinality::saved_id;
use crate::client::GraphError;
use crate::compile::{escape, rel_pattern, CompiledQuery};
use crate::session::Ogm;

// ── Node statements ──────────────────────────────────────────────

pub fn create_node(model: &ModelDescriptor, props: Properties) -> CompiledQuery {
    let labels = model.label_set().iter().map(escape).collect::<Vec<_>>().join(":");
    CompiledQuery::new(format!("CREATE (n:{labels} $props)\nRETURN n"))
        .param("props", ScalarValue::Map(props))
        .returning(["n"])
}

pub fn update_node(id: i64, props: Properties) -> CompiledQuery {
    CompiledQuery::new("MATCH (n) WHERE id(n) = $id\nSET n += $props\nRETURN n")
        .param("id", id)
        .param("props", ScalarValue::Map(props))
        .returning(["n"])
}

pub fn fetch_node(id: i64) -> CompiledQuery {
    CompiledQuery::new("MATCH (n) WHERE id(n) = $id\nRETURN n")
        .param("id", id)
        .returning(["n"])
}

pub fn delete_node(id: i64) -> CompiledQuery {
    CompiledQuery::new("MATCH (n) WHERE id(n) = $id\nDETACH DELETE n").param("id", id)
}

// ── Relationship statements ──────────────────────────────────────

fn write_direction(direction: Direction) -> Direction {
    match direction {
        Direction::Either => Direction::Outgoing,
        d => d,
    }
}

pub fn connect_edge(rel: &RelationshipDef, source_id: i64, target_id: i64, props: Properties) -> CompiledQuery {
    let merge = rel_pattern("source", "target", write_direction(rel.direction), "r", &rel.rel_type);
    CompiledQuery::new(format!(
        "MATCH (source), (target)\n\
         WHERE id(source) = $source_id AND id(target) = $target_id\n\
         MERGE {merge}\n\
         SET r += $props\n\
         RETURN r"
    ))
    .param("source_id", source_id)
    .param("target_id", target_id)
    .param("props", ScalarValue::Map(props))
    .returning(["r"])
}

pub fn disconnect_edge(rel: &RelationshipDef, source_id: i64, target_id: i64) -> CompiledQuery {
    let pattern = rel_pattern("source", "target", rel.direction, "r", &rel.rel_type);
    CompiledQuery::new(format!(
        "MATCH {pattern}\n\
         WHERE id(source) = $source_id AND id(target) = $target_id\n\
         DELETE r"
    ))
    .param("source_id", source_id)
    .param("target_id", target_id)
}

pub fn disconnect_all_edges(rel: &RelationshipDef, target_label: &str, source_id: i64) -> CompiledQuery {
    let pattern = rel_pattern(
        "source",
        &format!(":{}", escape(target_label)),
        rel.direction,
        "r",
        &rel.rel_type,
    );
    CompiledQuery::new(format!(
        "MATCH {pattern}\n\
         WHERE id(source) = $source_id\n\
         DELETE r"
    ))
    .param("source_id", source_id)
}

/// Move one edge to a new target in a single statement, keeping its
/// properties. No rows back means the old edge did not exist.
pub fn reconnect_edge(rel: &RelationshipDef, source_id: i64, old_id: i64, new_id: i64) -> CompiledQuery {
    let old = rel_pattern("source", "old_target", rel.direction, "old_rel", &rel.rel_type);
    let new = rel_pattern(
        "source",
        "new_target",
        write_direction(rel.direction),
        "new_rel",
        &rel.rel_type,
    );
    CompiledQuery::new(format!(
        "MATCH {old}, (new_target)\n\
         WHERE id(source) = $source_id AND id(old_target) = $old_id AND id(new_target) = $new_id\n\
         MERGE {new}\n\
         SET new_rel += properties(old_rel)\n\
         DELETE old_rel\n\
         RETURN new_rel"
    ))
    .param("source_id", source_id)
    .param("old_id", old_id)
    .param("new_id", new_id)
    .returning(["new_rel"])
}

/// Reconnect for fields holding at most one edge: every edge of the field
/// is dropped, not only the one to `old_id`, and the new edge takes the old
/// one's properties. No rows back means the old edge did not exist.
pub fn reconnect_single_edge(
    rel: &RelationshipDef,
    target_label: &str,
    source_id: i64,
    old_id: i64,
    new_id: i64,
) -> CompiledQuery {
    let old = rel_pattern("source", "old_target", rel.direction, "old_rel", &rel.rel_type);
    let stale = rel_pattern(
        "source",
        &format!(":{}", escape(target_label)),
        rel.direction,
        "stale",
        &rel.rel_type,
    );
    let new = rel_pattern(
        "source",
        "new_target",
        write_direction(rel.direction),
        "new_rel",
        &rel.rel_type,
    );
    CompiledQuery::new(format!(
        "MATCH {old}, (new_target)\n\
         WHERE id(source) = $source_id AND id(old_target) = $old_id AND id(new_target) = $new_id\n\
         WITH source, new_target, properties(old_rel) AS kept\n\
         LIMIT 1\n\
         OPTIONAL MATCH {stale}\n\
         DELETE stale\n\
         WITH DISTINCT source, new_target, kept\n\
         MERGE {new}\n\
         SET new_rel += kept\n\
         RETURN new_rel"
    ))
    .param("source_id", source_id)
    .param("old_id", old_id)
    .param("new_id", new_id)
    .returning(["new_rel"])
}

/// Drop every edge of the field and connect `target_id`, in one statement.
pub fn replace_edges(
    rel: &RelationshipDef,
    target_label: &str,
    source_id: i64,
    target_id: i64,
    props: Properties,
) -> CompiledQuery {
    let old = rel_pattern(
        "source",
        &format!(":{}", escape(target_label)),
        rel.direction,
        "old_rel",
        &rel.rel_type,
    );
    let merge = rel_pattern("source", "target", write_direction(rel.direction), "r", &rel.rel_type);
    CompiledQuery::new(format!(
        "MATCH (source), (target)\n\
         WHERE id(source) = $source_id AND id(target) = $target_id\n\
         OPTIONAL MATCH {old}\n\
         DELETE old_rel\n\
         WITH DISTINCT source, target\n\
         MERGE {merge}\n\
         SET r += $props\n\
         RETURN r"
    ))
    .param("source_id", source_id)
    .param("target_id", target_id)
    .param("props", ScalarValue::Map(props))
    .returning(["r"])
}

/// Deflate declared values into stored form. Unset values take their
/// generated default when `fill_defaults`; a required property without one
/// fails.
pub(crate) fn stored_for_write(
    model: &ModelDescriptor,
    values: &std::collections::BTreeMap<String, ScalarValue>,
    fill_defaults: bool,
) -> Result<Properties, GraphError> {
    let mut stored = Properties::new();
    for prop in &model.properties {
        let value = match values.get(&prop.name) {
            Some(v) if !v.is_null() => v.clone(),
            _ => match (&prop.default, fill_defaults) {
                (Some(default), true) => default.generate(),
                _ if prop.required => {
                    return Err(GraphError::RequiredProperty {
                        model: model.name.clone(),
                        property: prop.name.clone(),
                    })
                }
                _ if fill_defaults => continue,
                _ => ScalarValue::Null,
            },
        };
        let value = match value {
            ScalarValue::Null => ScalarValue::Null,
            v => prop.deflate(v)?,
        };
        stored.insert(prop.db_name().to_string(), value);
    }
    Ok(stored)
}

fn single_node(rows: Vec<Vec<RawValue>>, model: &str) -> Result<strand_core::RawNode, GraphError> {
    match rows.into_iter().next().and_then(|row| row.into_iter().next()) {
        Some(RawValue::Node(node)) => Ok(node),
        Some(other) => Err(GraphError::Conversion(format!("expected a node, got {other:?}"))),
        None => Err(GraphError::NotFound {
            model: model.to_string(),
        }),
    }
}

impl Ogm {
    // ── Node persistence ─────────────────────────────────────────

    /// Insert an unsaved node. Defaults and unique ids are generated for
    /// unset properties.
    pub async fn create(&self, node: &NodeInstance) -> Result<NodeInstance, GraphError> {
        let props = stored_for_write(&node.model, &node.properties, true)?;
        let rows = self.execute(&create_node(&node.model, props)).await?;
        let raw = single_node(rows, node.model_name())?;
        tracing::debug!(model = %node.model_name(), id = raw.id, "Created node");
        Ok(NodeInstance::inflate(node.model.clone(), raw).map_err(strand_core::ResolveError::from)?)
    }

    /// Write every declared property of a node; unsaved nodes are created.
    pub async fn save(&self, node: &NodeInstance) -> Result<NodeInstance, GraphError> {
        let Some(id) = node.id else {
            return self.create(node).await;
        };
        let props = stored_for_write(&node.model, &node.properties, false)?;
        let rows = self.execute(&update_node(id, props)).await?;
        let raw = single_node(rows, node.model_name())?;
        Ok(NodeInstance::inflate(node.model.clone(), raw).map_err(strand_core::ResolveError::from)?)
    }

    /// Detach-delete a saved node.
    pub async fn delete(&self, node: &NodeInstance) -> Result<(), GraphError> {
        let id = saved_id(node)?;
        self.execute(&delete_node(id)).await?;
        tracing::debug!(model = %node.model_name(), id, "Deleted node");
        Ok(())
    }

    /// Reload a saved node's properties and labels.
    pub async fn refresh(&self, node: &NodeInstance) -> Result<NodeInstance, GraphError> {
        let id = saved_id(node)?;
        let rows = self.execute(&fetch_node(id)).await?;
        let raw = single_node(rows, node.model_name())?;
        Ok(NodeInstance::inflate(node.model.clone(), raw).map_err(strand_core::ResolveError::from)?)
    }
}
