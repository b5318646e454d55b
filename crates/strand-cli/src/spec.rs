//! JSON query specs and schema files.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use strand_core::{Registry, ScalarValue};
use strand_graph::compile::SimilarityFilter;
use strand_graph::{QuerySet, Q};

/// Lookups ANDed together, e.g. `{"age__gte": 18, "name": "Ada"}`.
pub type FilterSpec = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionSpec {
    #[default]
    Last,
    All,
    Count,
    Edge,
    Path,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimilaritySpec {
    pub property: String,
    #[serde(default)]
    pub vector: Option<Vec<f64>>,
    #[serde(default)]
    pub text: Option<String>,
    pub top_k: i64,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepSpec {
    pub field: String,
    /// Keep rows without a match (`OPTIONAL MATCH`).
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub exclude: Vec<FilterSpec>,
    #[serde(default)]
    pub edge_filters: Vec<FilterSpec>,
    #[serde(default)]
    pub similar: Option<SimilaritySpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySpec {
    pub model: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub exclude: Vec<FilterSpec>,
    /// Relationship field to required presence.
    #[serde(default)]
    pub has: BTreeMap<String, bool>,
    #[serde(default)]
    pub similar: Option<SimilaritySpec>,
    #[serde(default)]
    pub traverse: Vec<StepSpec>,
    /// `"age"`, `"-age"` or `"?"`.
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub projection: ProjectionSpec,
}

fn conjunction(spec: &FilterSpec) -> anyhow::Result<Q> {
    let lookups = spec
        .iter()
        .map(|(lookup, value)| Q::parse(lookup, ScalarValue::from(value.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Q::all(lookups))
}

fn similarity(spec: &SimilaritySpec) -> anyhow::Result<SimilarityFilter> {
    let filter = match (&spec.vector, &spec.text) {
        (Some(vector), None) => SimilarityFilter::vector(&spec.property, vector.clone(), spec.top_k),
        (None, Some(text)) => SimilarityFilter::fulltext(&spec.property, text, spec.top_k),
        _ => anyhow::bail!(
            "similarity on '{}' needs exactly one of vector or text",
            spec.property
        ),
    };
    Ok(match spec.threshold {
        Some(t) => filter.threshold(t),
        None => filter,
    })
}

fn apply_filters(
    mut qs: QuerySet,
    filters: &[FilterSpec],
    exclude: &[FilterSpec],
) -> anyhow::Result<QuerySet> {
    for f in filters {
        qs = qs.filter(conjunction(f)?);
    }
    for f in exclude {
        qs = qs.exclude(conjunction(f)?);
    }
    Ok(qs)
}

impl QuerySpec {
    pub fn to_query_set(&self) -> anyhow::Result<QuerySet> {
        let mut qs = QuerySet::new(&self.model);
        if let Some(id) = self.id {
            qs = qs.with_id(id);
        }
        qs = apply_filters(qs, &self.filters, &self.exclude)?;
        for (field, present) in &self.has {
            qs = qs.has(field, *present);
        }
        if let Some(s) = &self.similar {
            qs = qs.similar(similarity(s)?);
        }

        for step in &self.traverse {
            qs = if step.optional {
                qs.traverse_optional(&step.field)
            } else {
                qs.traverse(&step.field)
            };
            if let Some(id) = step.id {
                qs = qs.with_id(id);
            }
            qs = apply_filters(qs, &step.filters, &step.exclude)?;
            for f in &step.edge_filters {
                qs = qs.filter_edges(conjunction(f)?);
            }
            if let Some(s) = &step.similar {
                qs = qs.similar(similarity(s)?);
            }
        }

        for order in &self.order_by {
            qs = qs.order_by(order);
        }
        if let Some(n) = self.skip {
            qs = qs.skip(n);
        }
        if let Some(n) = self.limit {
            qs = qs.limit(n);
        }
        Ok(match self.projection {
            ProjectionSpec::Last => qs,
            ProjectionSpec::All => qs.returning_all(),
            ProjectionSpec::Count => qs.count(),
            ProjectionSpec::Edge => qs.returning_edges(),
            ProjectionSpec::Path => qs.returning_path(),
        })
    }
}

/// Register a JSON array of model descriptors into `registry`.
pub fn load_schema(path: &Path, registry: Arc<Registry>) -> anyhow::Result<Arc<Registry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    let models = registry
        .register_json(&raw)
        .with_context(|| format!("loading schema {}", path.display()))?;
    tracing::info!(models = models.len(), bindings = registry.len(), "Schema loaded");
    Ok(registry)
}
