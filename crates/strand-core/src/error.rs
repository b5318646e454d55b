use thiserror::Error;

use crate::model::{LabelSet, RegistryKey};

/// A property value could not be converted from its stored form.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot inflate property '{property}' ({kind}): {reason}")]
pub struct InflateError {
    pub property: String,
    pub kind: String,
    pub reason: String,
}

/// A property value could not be converted into its stored form.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot deflate property '{property}' ({kind}): {reason}")]
pub struct DeflateError {
    pub property: String,
    pub kind: String,
    pub reason: String,
}

/// One known registry binding, listed in lookup failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: RegistryKey,
    pub model: String,
    /// `None` for global bindings.
    pub database: Option<String>,
}

/// Render candidates as `key --> Model` lines, global first, then one
/// section per database.
pub fn format_candidates(candidates: &[Candidate]) -> String {
    let mut out = String::new();
    for c in candidates.iter().filter(|c| c.database.is_none()) {
        out.push_str(&format!("\n  {} --> {}", c.key, c.model));
    }
    let mut databases: Vec<&str> = candidates
        .iter()
        .filter_map(|c| c.database.as_deref())
        .collect();
    databases.sort_unstable();
    databases.dedup();
    for db in databases {
        out.push_str(&format!("\n  Database-specific: {db}"));
        for c in candidates.iter().filter(|c| c.database.as_deref() == Some(db)) {
            out.push_str(&format!("\n    {} --> {}", c.key, c.model));
        }
    }
    out
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error(
        "Model '{model}' cannot bind {key}{}: already bound to '{existing}'. Registry:{}",
        scope_suffix(.database),
        format_candidates(.candidates)
    )]
    AlreadyDefined {
        key: RegistryKey,
        model: String,
        existing: String,
        database: Option<String>,
        candidates: Vec<Candidate>,
    },

    #[error("Model '{0}' is not registered")]
    UnknownModel(String),

    #[error("Model '{model}' declares {count} optional labels, at most {max} are supported")]
    TooManyOptionalLabels {
        model: String,
        count: usize,
        max: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error(
        "No model registered for labels {labels}{}. Registry:{}",
        scope_suffix(.database),
        format_candidates(.candidates)
    )]
    UnresolvedNode {
        labels: LabelSet,
        database: Option<String>,
        candidates: Vec<Candidate>,
    },

    #[error(
        "No relationship model registered for type {rel_type}{}. Registry:{}",
        scope_suffix(.database),
        format_candidates(.candidates)
    )]
    UnresolvedRelationship {
        rel_type: String,
        database: Option<String>,
        candidates: Vec<Candidate>,
    },

    #[error(transparent)]
    Inflate(#[from] InflateError),
}

fn scope_suffix(database: &Option<String>) -> String {
    match database {
        Some(db) => format!(" in database '{db}'"),
        None => String::new(),
    }
}

/// Top-level error type for the mapping core.
#[derive(Error, Debug)]
pub enum StrandError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Deflate(#[from] DeflateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StrandError>;
