//! The mapper entry point: an executor, a registry and mapping settings.

use std::sync::Arc;

use strand_core::config::MappingSettings;
use strand_core::{NodeInstance, RawValue, Registry, ResolvedValue, Resolver, ScalarValue};

use crate::cardinality::CheckMode;
use crate::client::{GraphError, QueryExecutor};
use crate::compile::{CompiledQuery, Compiler, QuerySet};
use crate::relationship::RelationshipAccessor;

/// Object-graph mapper bound to one executor and registry.
///
/// Cheap to clone; every accessor borrows from it.
#[derive(Clone)]
pub struct Ogm {
    executor: Arc<dyn QueryExecutor>,
    registry: Arc<Registry>,
    database: Option<String>,
    settings: MappingSettings,
}

impl Ogm {
    pub fn new(executor: Arc<dyn QueryExecutor>, registry: Arc<Registry>) -> Self {
        Self {
            executor,
            registry,
            database: None,
            settings: MappingSettings::default(),
        }
    }

    /// Resolve and compile against bindings scoped to `database` first.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_settings(mut self, settings: MappingSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    pub fn compiler(&self) -> Compiler {
        let compiler = Compiler::new(Arc::clone(&self.registry));
        match &self.database {
            Some(db) => compiler.with_database(db.clone()),
            None => compiler,
        }
    }

    pub fn resolver(&self) -> Resolver {
        let resolver = Resolver::new(Arc::clone(&self.registry))
            .require_edge_models(self.settings.require_edge_models);
        match &self.database {
            Some(db) => resolver.with_database(db.clone()),
            None => resolver,
        }
    }

    /// Cardinality mode for callers that do not choose one.
    pub fn default_mode(&self) -> CheckMode {
        CheckMode::from_soft(self.settings.soft_cardinality_check)
    }

    /// Accessor for the relationship field `field` of a saved node.
    pub fn relationship<'a>(
        &'a self,
        source: &'a NodeInstance,
        field: &str,
    ) -> Result<RelationshipAccessor<'a>, GraphError> {
        RelationshipAccessor::new(self, source, field)
    }

    // ── Execution ────────────────────────────────────────────────

    /// Run a compiled statement and return raw rows.
    pub async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Vec<RawValue>>, GraphError> {
        self.executor.execute(query).await
    }

    /// Run a raw Cypher query and resolve every returned value.
    pub async fn cypher(&self, query: &CompiledQuery) -> Result<Vec<Vec<ResolvedValue>>, GraphError> {
        let rows = self.execute(query).await?;
        Ok(self.resolver().resolve_rows(rows)?)
    }

    /// Compile, run and resolve a query set.
    pub async fn fetch(&self, qs: &QuerySet) -> Result<Vec<Vec<ResolvedValue>>, GraphError> {
        let compiled = self.compiler().compile(qs)?;
        self.cypher(&compiled).await
    }

    /// Run a count-projected query set.
    pub(crate) async fn count_query(&self, qs: QuerySet) -> Result<usize, GraphError> {
        let compiled = self.compiler().compile(&qs.count())?;
        let rows = self.execute(&compiled).await?;
        count_from(&rows)
    }
}

/// First column of the first row as a non-negative count.
pub(crate) fn count_from(rows: &[Vec<RawValue>]) -> Result<usize, GraphError> {
    match rows.first().and_then(|row| row.first()) {
        Some(RawValue::Scalar(ScalarValue::Int(n))) => usize::try_from(*n)
            .map_err(|_| GraphError::Conversion(format!("negative count {n}"))),
        Some(other) => Err(GraphError::Conversion(format!(
            "expected an integer count, got {other:?}"
        ))),
        None => Ok(0),
    }
}
