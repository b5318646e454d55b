//! Multiplicity enforcement for relationship fields.
//!
//! The decision table is pure; [`CardinalityGuard`] supplies current edge
//! counts by compiling count queries and applies the chosen [`CheckMode`].
//! Checks and the guarded write are separate statements, so concurrent
//! writers can still race past a bound.

use strand_core::model::{Cardinality, RelationshipDef};
use strand_core::NodeInstance;

use crate::client::GraphError;
use crate::compile::QuerySet;
use crate::error::CardinalityError;
use crate::session::Ogm;

/// How a bound violated by `connect` is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckMode {
    /// Refuse the mutation.
    #[default]
    Strict,
    /// Log a warning, record a notice and proceed.
    Soft,
}

impl CheckMode {
    pub fn from_soft(soft: bool) -> Self {
        if soft {
            Self::Soft
        } else {
            Self::Strict
        }
    }
}

// ── Decision table ───────────────────────────────────────────────

/// One more edge keeps `kind` within its upper bound.
pub fn allows_connect(kind: Cardinality, current: usize) -> bool {
    kind.max().map_or(true, |max| current < max)
}

/// One edge fewer keeps `kind` within its lower bound. `One` only changes
/// through reconnect.
pub fn allows_disconnect(kind: Cardinality, current: usize) -> bool {
    match kind {
        Cardinality::One => false,
        Cardinality::OneOrMore => current >= 2,
        Cardinality::ZeroOrMore | Cardinality::ZeroOrOne => true,
    }
}

pub fn allows_disconnect_all(kind: Cardinality) -> bool {
    kind.min() == 0
}

/// `Some(actual)` when `found` edges break `kind` on read.
pub fn check_read(kind: Cardinality, found: usize) -> Option<String> {
    if found < kind.min() {
        return Some("none".to_string());
    }
    match kind.max() {
        Some(max) if found > max => Some(found.to_string()),
        _ => None,
    }
}

/// The expected-side text of cardinality messages, e.g. `one relationship
/// in a outgoing direction of type LIVES_IN on node (4) of class 'Person'`.
pub fn describe_manager(rel: &RelationshipDef, node_id: i64, class: &str) -> String {
    format!(
        "{} in {} direction of type {} on node ({node_id}) of class '{class}'",
        rel.cardinality.description(),
        rel.direction.describe(),
        rel.rel_type,
    )
}

// ── Notices ──────────────────────────────────────────────────────

/// Which end of a connect a notice concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// A bound that soft mode detected and overrode.
#[derive(Debug, Clone, PartialEq)]
pub struct CardinalityNotice {
    pub field: String,
    pub rel_type: String,
    pub node_id: i64,
    pub cardinality: Cardinality,
    /// Edges present before the write.
    pub existing: usize,
    pub side: Side,
}

// ── Guard ────────────────────────────────────────────────────────

/// Applies the decision table with live counts.
pub struct CardinalityGuard<'a> {
    ogm: &'a Ogm,
}

impl<'a> CardinalityGuard<'a> {
    pub fn new(ogm: &'a Ogm) -> Self {
        Self { ogm }
    }

    /// Edges currently reachable through `field` from node `node_id`.
    pub async fn count(&self, model: &str, node_id: i64, field: &str) -> Result<usize, GraphError> {
        self.ogm
            .count_query(QuerySet::from_node(model, node_id).traverse(field))
            .await
    }

    /// Check both ends of a prospective edge from `source` to `target`.
    pub async fn check_connect(
        &self,
        source: &NodeInstance,
        rel: &RelationshipDef,
        target: &NodeInstance,
        mode: CheckMode,
    ) -> Result<Vec<CardinalityNotice>, GraphError> {
        let source_id = saved_id(source)?;
        let mut notices = Vec::new();
        notices.extend(
            self.check_side(source, source_id, rel, mode, Side::Source)
                .await?,
        );
        notices.extend(self.check_inverse(source, rel, target, mode).await?);
        Ok(notices)
    }

    /// Check only the target end: the target model's field with the same
    /// type and opposite direction that points back at the source model.
    pub async fn check_inverse(
        &self,
        source: &NodeInstance,
        rel: &RelationshipDef,
        target: &NodeInstance,
        mode: CheckMode,
    ) -> Result<Option<CardinalityNotice>, GraphError> {
        let target_id = saved_id(target)?;
        let inverse = target.model.relationships.iter().find(|r| {
            r.rel_type == rel.rel_type
                && r.direction == rel.direction.inverse()
                && r.target == source.model.name
        });
        match inverse {
            Some(inverse) => {
                self.check_side(target, target_id, inverse, mode, Side::Target)
                    .await
            }
            None => Ok(None),
        }
    }

    async fn check_side(
        &self,
        node: &NodeInstance,
        node_id: i64,
        rel: &RelationshipDef,
        mode: CheckMode,
        side: Side,
    ) -> Result<Option<CardinalityNotice>, GraphError> {
        if rel.cardinality.max().is_none() {
            return Ok(None);
        }
        let existing = self.count(node.model_name(), node_id, &rel.name).await?;
        if allows_connect(rel.cardinality, existing) {
            return Ok(None);
        }
        let expected = describe_manager(rel, node_id, node.model_name());
        match mode {
            CheckMode::Strict => Err(CardinalityError::AttemptedViolation {
                expected,
                reason: format!("Node already has {existing} {} relationship(s)", rel.rel_type),
            }
            .into()),
            CheckMode::Soft => {
                tracing::warn!(
                    field = %rel.name,
                    rel_type = %rel.rel_type,
                    node_id,
                    existing,
                    ?side,
                    "Cardinality bound exceeded; proceeding in soft mode"
                );
                Ok(Some(CardinalityNotice {
                    field: rel.name.clone(),
                    rel_type: rel.rel_type.clone(),
                    node_id,
                    cardinality: rel.cardinality,
                    existing,
                    side,
                }))
            }
        }
    }

    /// Refuse removing one edge when the lower bound forbids it. Applies in
    /// every mode.
    pub async fn check_disconnect(
        &self,
        source: &NodeInstance,
        rel: &RelationshipDef,
    ) -> Result<(), GraphError> {
        let source_id = saved_id(source)?;
        let current = match rel.cardinality {
            Cardinality::OneOrMore => self.count(source.model_name(), source_id, &rel.name).await?,
            _ => 0,
        };
        if allows_disconnect(rel.cardinality, current) {
            return Ok(());
        }
        Err(CardinalityError::AttemptedViolation {
            expected: describe_manager(rel, source_id, source.model_name()),
            reason: disconnect_reason(rel.cardinality).to_string(),
        }
        .into())
    }

    pub fn check_disconnect_all(
        &self,
        source: &NodeInstance,
        rel: &RelationshipDef,
    ) -> Result<(), GraphError> {
        let source_id = saved_id(source)?;
        if allows_disconnect_all(rel.cardinality) {
            return Ok(());
        }
        Err(CardinalityError::AttemptedViolation {
            expected: describe_manager(rel, source_id, source.model_name()),
            reason: disconnect_reason(rel.cardinality).to_string(),
        }
        .into())
    }

    /// Validate the number of nodes a read returned.
    pub fn check_read(
        &self,
        source: &NodeInstance,
        rel: &RelationshipDef,
        found: usize,
    ) -> Result<(), CardinalityError> {
        match check_read(rel.cardinality, found) {
            None => Ok(()),
            Some(actual) => Err(CardinalityError::Violation {
                expected: describe_manager(rel, source.id.unwrap_or_default(), source.model_name()),
                actual,
            }),
        }
    }
}

fn disconnect_reason(kind: Cardinality) -> &'static str {
    match kind {
        Cardinality::One => "One-to-one relationship cannot be disconnected, use reconnect",
        _ => "One or more expected",
    }
}

pub(crate) fn saved_id(node: &NodeInstance) -> Result<i64, GraphError> {
    node.id.ok_or_else(|| GraphError::Unsaved {
        model: node.model_name().to_string(),
    })
}
