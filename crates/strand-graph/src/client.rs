//! Neo4j connection management and the query execution boundary.

use std::time::Instant;

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};

use strand_core::config::{MappingSettings, Neo4jSettings};
use strand_core::{DeflateError, RawValue, RegistryError, ResolveError};

use crate::compile::CompiledQuery;
use crate::convert::{bolt_to_raw, scalar_to_bolt};
use crate::error::{CardinalityError, CompileError};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Result conversion error: {0}")]
    Conversion(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Deflate(#[from] DeflateError),

    #[error(transparent)]
    Cardinality(#[from] CardinalityError),

    #[error("Node {node_id} is not connected to node {target_id} through '{field}'")]
    NotConnected {
        field: String,
        node_id: i64,
        target_id: i64,
    },

    #[error("{model} node must be saved first")]
    Unsaved { model: String },

    #[error("Expected a {expected} node for '{field}', got {found}")]
    WrongTarget {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Required property '{property}' missing on {model}")]
    RequiredProperty { model: String, property: String },

    #[error("No {model} node matches the query")]
    NotFound { model: String },

    #[error("Expected one {model} node, found {count}")]
    MultipleFound { model: String, count: usize },
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub max_connections: u32,
    pub fetch_size: usize,
    pub cypher_debug: bool,
    pub slow_query_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from_settings(&Neo4jSettings::default(), &MappingSettings::default())
    }
}

impl GraphConfig {
    pub fn from_settings(neo4j: &Neo4jSettings, mapping: &MappingSettings) -> Self {
        Self {
            uri: neo4j.uri.clone(),
            user: neo4j.user.clone(),
            password: neo4j.password.clone(),
            database: neo4j.database.clone(),
            max_connections: neo4j.max_connections,
            fetch_size: neo4j.fetch_size,
            cypher_debug: mapping.cypher_debug,
            slow_query_ms: mapping.slow_query_ms,
        }
    }
}

/// Runs compiled queries and returns rows of raw values, one per column.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Vec<RawValue>>, GraphError>;
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    cypher_debug: bool,
    slow_query_ms: u64,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let mut builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo_config = builder
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, database = ?config.database, "Connected to Neo4j");
        Ok(Self {
            graph,
            cypher_debug: config.cypher_debug,
            slow_query_ms: config.slow_query_ms,
        })
    }

    /// Execute a write-only query.
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Keys of a row in name order, the order Neo4j uses for `RETURN *`.
fn row_keys(row: &neo4rs::Row) -> Result<Vec<String>, GraphError> {
    let map: neo4rs::BoltMap = row
        .to_strict()
        .map_err(|e| GraphError::Conversion(format!("row keys: {e}")))?;
    let mut keys: Vec<String> = map.value.into_keys().map(|k| k.value).collect();
    keys.sort();
    Ok(keys)
}

/// Build a neo4rs query from compiled text and parameters.
pub fn to_neo4rs(compiled: &CompiledQuery) -> Query {
    compiled
        .params
        .iter()
        .fold(neo4rs::query(&compiled.text), |q, (key, value)| {
            q.param(key, scalar_to_bolt(value))
        })
}

#[async_trait]
impl QueryExecutor for GraphClient {
    async fn execute(&self, compiled: &CompiledQuery) -> Result<Vec<Vec<RawValue>>, GraphError> {
        if self.cypher_debug {
            tracing::debug!(cypher = %compiled.text, params = ?compiled.params, "Executing query");
        }
        let started = Instant::now();
        let rows = self.query_rows(to_neo4rs(compiled)).await?;
        let elapsed = started.elapsed();
        if self.slow_query_ms > 0 && elapsed.as_millis() >= u128::from(self.slow_query_ms) {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                cypher = %compiled.text,
                "Slow query"
            );
        }

        let declared = compiled.result_columns();
        rows.iter()
            .map(|row| -> Result<Vec<RawValue>, GraphError> {
                let columns = if declared.is_empty() {
                    row_keys(row)?
                } else {
                    declared.clone()
                };
                columns
                    .iter()
                    .map(|col| {
                        let value: neo4rs::BoltType = row.get(col).map_err(|e| {
                            GraphError::Conversion(format!("column '{col}': {e}"))
                        })?;
                        bolt_to_raw(value)
                    })
                    .collect()
            })
            .collect()
    }
}
