//! Runtime configuration.
//!
//! Loaded from an optional `strand.toml` (or any prefix given on the command
//! line) layered with `STRAND__` environment variables, e.g.
//! `STRAND__MAPPING__SOFT_CARDINALITY_CHECK=true`.

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrandConfig {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub mapping: MappingSettings,
}

/// Connection settings handed to the graph client.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Database name; the server default when unset.
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            database: None,
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Behaviour of the mapping layer.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingSettings {
    /// Default cardinality mode for callers that do not pass one explicitly.
    #[serde(default)]
    pub soft_cardinality_check: bool,

    /// Log every compiled query and its parameters at debug level.
    #[serde(default)]
    pub cypher_debug: bool,

    /// Queries slower than this are logged as warnings. Zero disables.
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,

    /// Fail resolution of relationships without a registered edge model.
    #[serde(default)]
    pub require_edge_models: bool,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            soft_cardinality_check: false,
            cypher_debug: false,
            slow_query_ms: default_slow_query_ms(),
            require_edge_models: false,
        }
    }
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "strand-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_slow_query_ms() -> u64 {
    1000
}

impl StrandConfig {
    /// Load from `<file_prefix>.{toml,json,yaml}` (optional) and `STRAND__*`.
    pub fn load(file_prefix: &str) -> crate::error::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("STRAND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
