//! Bolt values to raw graph values, and scalar parameters to Bolt.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use neo4rs::{
    BoltDuration, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNode, BoltNull, BoltPath,
    BoltPoint2D, BoltPoint3D, BoltString, BoltType,
};
use serde::de::IntoDeserializer;
use serde::Deserialize;

use strand_core::value::{Duration, Point, Properties};
use strand_core::{RawNode, RawPath, RawRelationship, RawValue, ScalarValue};

use crate::client::GraphError;

fn conversion(msg: impl Into<String>) -> GraphError {
    GraphError::Conversion(msg.into())
}

/// Convert one result cell.
pub fn bolt_to_raw(value: BoltType) -> Result<RawValue, GraphError> {
    Ok(match value {
        BoltType::Node(node) => RawValue::Node(node_to_raw(node)?),
        BoltType::Relation(rel) => RawValue::Relationship(RawRelationship {
            id: rel.id.value,
            rel_type: rel.typ.value,
            start: rel.start_node_id.value,
            end: rel.end_node_id.value,
            properties: map_to_properties(rel.properties)?,
        }),
        BoltType::Path(path) => RawValue::Path(path_to_raw(path)?),
        BoltType::List(list) => {
            let items = list
                .value
                .into_iter()
                .map(bolt_to_raw)
                .collect::<Result<Vec<_>, _>>()?;
            if items.iter().all(|i| matches!(i, RawValue::Scalar(_))) {
                RawValue::Scalar(ScalarValue::List(
                    items
                        .into_iter()
                        .filter_map(|i| match i {
                            RawValue::Scalar(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                ))
            } else {
                RawValue::List(items)
            }
        }
        BoltType::Map(map) => {
            let entries = map
                .value
                .into_iter()
                .map(|(k, v)| Ok((k.value, bolt_to_raw(v)?)))
                .collect::<Result<BTreeMap<_, _>, GraphError>>()?;
            if entries.values().all(|v| matches!(v, RawValue::Scalar(_))) {
                RawValue::Scalar(ScalarValue::Map(
                    entries
                        .into_iter()
                        .filter_map(|(k, v)| match v {
                            RawValue::Scalar(s) => Some((k, s)),
                            _ => None,
                        })
                        .collect(),
                ))
            } else {
                RawValue::Map(entries)
            }
        }
        other => RawValue::Scalar(bolt_to_scalar(other)?),
    })
}

/// Convert a property-level value.
pub fn bolt_to_scalar(value: BoltType) -> Result<ScalarValue, GraphError> {
    Ok(match value {
        BoltType::Null(_) => ScalarValue::Null,
        BoltType::Boolean(b) => ScalarValue::Bool(b.value),
        BoltType::Integer(i) => ScalarValue::Int(i.value),
        BoltType::Float(f) => ScalarValue::Float(f.value),
        BoltType::String(s) => ScalarValue::String(s.value),
        BoltType::Bytes(b) => ScalarValue::Bytes(b.value.to_vec()),
        BoltType::List(list) => ScalarValue::List(
            list.value
                .into_iter()
                .map(bolt_to_scalar)
                .collect::<Result<_, _>>()?,
        ),
        BoltType::Map(map) => ScalarValue::Map(map_to_properties(map)?),
        date @ BoltType::Date(_) => ScalarValue::Date(
            NaiveDate::try_from(date).map_err(|e| conversion(format!("date: {e}")))?,
        ),
        dt @ BoltType::DateTime(_) => ScalarValue::DateTime(
            DateTime::<FixedOffset>::try_from(dt).map_err(|e| conversion(format!("datetime: {e}")))?,
        ),
        local @ BoltType::LocalDateTime(_) => ScalarValue::LocalDateTime(
            NaiveDateTime::try_from(local).map_err(|e| conversion(format!("local datetime: {e}")))?,
        ),
        zoned @ BoltType::DateTimeZoneId(_) => {
            let (local, zone) = <(NaiveDateTime, String)>::try_from(zoned)
                .map_err(|e| conversion(format!("zoned datetime: {e}")))?;
            ScalarValue::ZonedDateTime { local, zone }
        }
        BoltType::Time(t) => {
            let (time, offset) = <(NaiveTime, FixedOffset)>::from(t);
            ScalarValue::Time(time, offset)
        }
        BoltType::LocalTime(t) => ScalarValue::LocalTime(NaiveTime::from(t)),
        duration @ BoltType::Duration(_) => {
            let (seconds, nanoseconds) = <(i64, i64)>::deserialize((&duration).into_deserializer())
                .map_err(|e| conversion(format!("duration: {e}")))?;
            ScalarValue::Duration(Duration { seconds, nanoseconds })
        }
        BoltType::Point2D(p) => ScalarValue::Point(Point {
            srid: p.sr_id.value,
            x: p.x.value,
            y: p.y.value,
            z: None,
        }),
        BoltType::Point3D(p) => ScalarValue::Point(Point {
            srid: p.sr_id.value,
            x: p.x.value,
            y: p.y.value,
            z: Some(p.z.value),
        }),
        structural @ (BoltType::Node(_)
        | BoltType::Relation(_)
        | BoltType::UnboundedRelation(_)
        | BoltType::Path(_)) => {
            return Err(conversion(format!(
                "graph structure where a property value was expected: {structural:?}"
            )))
        }
    })
}

fn map_to_properties(map: BoltMap) -> Result<Properties, GraphError> {
    map.value
        .into_iter()
        .map(|(k, v)| Ok((k.value, bolt_to_scalar(v)?)))
        .collect()
}

fn node_to_raw(node: BoltNode) -> Result<RawNode, GraphError> {
    let labels = node
        .labels
        .value
        .into_iter()
        .map(|l| match l {
            BoltType::String(s) => Ok(s.value),
            other => Err(conversion(format!("node label is not a string: {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawNode {
        id: node.id.value,
        labels,
        properties: map_to_properties(node.properties)?,
    })
}

/// Rebuild the alternating node/relationship sequence from Bolt's
/// deduplicated lists and index pairs. Relationship indices are 1-based and
/// negative when traversed against their direction.
fn path_to_raw(path: BoltPath) -> Result<RawPath, GraphError> {
    let nodes = path
        .nodes
        .value
        .into_iter()
        .map(|n| match n {
            BoltType::Node(node) => node_to_raw(node),
            other => Err(conversion(format!("path node expected, got {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rels = path
        .rels
        .value
        .into_iter()
        .map(|r| match r {
            BoltType::UnboundedRelation(rel) => Ok((
                rel.id.value,
                rel.typ.value,
                map_to_properties(rel.properties)?,
            )),
            other => Err(conversion(format!("path relationship expected, got {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let indices = path
        .indices
        .value
        .into_iter()
        .map(|i| match i {
            BoltType::Integer(i) => Ok(i.value),
            other => Err(conversion(format!("path index expected, got {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let first = nodes.first().ok_or_else(|| conversion("empty path"))?;
    let mut seq_nodes = vec![first.clone()];
    let mut seq_rels = Vec::with_capacity(indices.len() / 2);
    let mut prev = first.id;
    for pair in indices.chunks(2) {
        let [rel_index, node_index] = pair else {
            return Err(conversion("odd number of path indices"));
        };
        let next = usize::try_from(*node_index)
            .ok()
            .and_then(|i| nodes.get(i))
            .ok_or_else(|| conversion(format!("path node index {node_index} out of range")))?;
        let (id, rel_type, properties) = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| rels.get(i))
            .ok_or_else(|| conversion(format!("path relationship index {rel_index} out of range")))?;
        let (start, end) = if *rel_index > 0 {
            (prev, next.id)
        } else {
            (next.id, prev)
        };
        seq_rels.push(RawRelationship {
            id: *id,
            rel_type: rel_type.clone(),
            start,
            end,
            properties: properties.clone(),
        });
        seq_nodes.push(next.clone());
        prev = next.id;
    }
    Ok(RawPath {
        nodes: seq_nodes,
        relationships: seq_rels,
    })
}

/// Convert a query parameter.
pub fn scalar_to_bolt(value: &ScalarValue) -> BoltType {
    match value {
        ScalarValue::Null => BoltType::Null(BoltNull),
        ScalarValue::Bool(b) => BoltType::from(*b),
        ScalarValue::Int(i) => BoltType::from(*i),
        ScalarValue::Float(f) => BoltType::from(*f),
        ScalarValue::String(s) => BoltType::from(s.clone()),
        ScalarValue::List(items) => BoltType::List(BoltList {
            value: items.iter().map(scalar_to_bolt).collect(),
        }),
        ScalarValue::Map(map) => BoltType::Map(BoltMap {
            value: map
                .iter()
                .map(|(k, v)| (BoltString::from(k.clone()), scalar_to_bolt(v)))
                .collect::<HashMap<_, _>>(),
        }),
        ScalarValue::Date(d) => BoltType::from(*d),
        ScalarValue::DateTime(dt) => BoltType::from(*dt),
        ScalarValue::LocalDateTime(dt) => BoltType::from(*dt),
        ScalarValue::ZonedDateTime { local, zone } => BoltType::from((*local, zone.as_str())),
        ScalarValue::Time(t, offset) => BoltType::from((*t, *offset)),
        ScalarValue::LocalTime(t) => BoltType::from(*t),
        ScalarValue::Duration(d) => BoltType::Duration(BoltDuration::new(
            BoltInteger::new(0),
            BoltInteger::new(0),
            BoltInteger::new(d.seconds),
            BoltInteger::new(d.nanoseconds),
        )),
        ScalarValue::Point(p) => match p.z {
            None => BoltType::Point2D(BoltPoint2D {
                sr_id: BoltInteger::new(p.srid),
                x: BoltFloat::new(p.x),
                y: BoltFloat::new(p.y),
            }),
            Some(z) => BoltType::Point3D(BoltPoint3D {
                sr_id: BoltInteger::new(p.srid),
                x: BoltFloat::new(p.x),
                y: BoltFloat::new(p.y),
                z: BoltFloat::new(z),
            }),
        },
        ScalarValue::Bytes(bytes) => BoltType::from(bytes.clone()),
    }
}
