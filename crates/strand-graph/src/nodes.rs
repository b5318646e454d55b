//! Node set reads over compiled query sets.

use strand_core::{NodeInstance, ResolvedValue, ScalarValue};

use crate::client::GraphError;
use crate::compile::{Projection, QuerySet};
use crate::session::Ogm;

fn first_node(row: Vec<ResolvedValue>) -> Result<NodeInstance, GraphError> {
    match row.into_iter().next() {
        Some(ResolvedValue::Node(node)) => Ok(node),
        other => Err(GraphError::Conversion(format!(
            "expected a node in the first column, got {other:?}"
        ))),
    }
}

impl Ogm {
    // ── Node sets ────────────────────────────────────────────────

    /// Every node the query set returns, in query order. Rows where an
    /// optional last step matched nothing are skipped.
    pub async fn all(&self, qs: &QuerySet) -> Result<Vec<NodeInstance>, GraphError> {
        let qs = match qs.projection() {
            Projection::Last => qs.clone(),
            _ => qs.clone().returning_last(),
        };
        self.fetch(&qs)
            .await?
            .into_iter()
            .filter(|row| !matches!(row.first(), Some(ResolvedValue::Scalar(ScalarValue::Null))))
            .map(first_node)
            .collect()
    }

    pub async fn first(&self, qs: &QuerySet) -> Result<Option<NodeInstance>, GraphError> {
        Ok(self.all(&qs.clone().limit(1)).await?.into_iter().next())
    }

    /// Exactly one match.
    pub async fn get(&self, qs: &QuerySet) -> Result<NodeInstance, GraphError> {
        self.get_or_none(qs).await?.ok_or_else(|| GraphError::NotFound {
            model: qs.model().to_string(),
        })
    }

    /// At most one match.
    pub async fn get_or_none(&self, qs: &QuerySet) -> Result<Option<NodeInstance>, GraphError> {
        let mut nodes = self.all(qs).await?;
        match nodes.len() {
            0 | 1 => Ok(nodes.pop()),
            count => Err(GraphError::MultipleFound {
                model: qs.model().to_string(),
                count,
            }),
        }
    }

    pub async fn count(&self, qs: &QuerySet) -> Result<usize, GraphError> {
        self.count_query(qs.clone()).await
    }

    pub async fn exists(&self, qs: &QuerySet) -> Result<bool, GraphError> {
        Ok(self.count(qs).await? > 0)
    }
}
