//! CLI entry point for the Strand graph mapper.

mod spec;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use strand_core::{Registry, ResolvedValue, ScalarValue, StrandConfig};
use strand_graph::compile::CompiledQuery;
use strand_graph::{Compiler, GraphClient, GraphConfig, Ogm};

use crate::spec::{load_schema, QuerySpec};

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Map Neo4j graphs onto declared node and relationship models")]
struct Cli {
    /// Config file prefix (default: strand).
    #[arg(short, long, default_value = "strand", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON query spec to Cypher without connecting.
    Compile {
        /// JSON array of model descriptors.
        #[arg(short, long)]
        schema: PathBuf,

        /// Query spec file (reads stdin when omitted).
        #[arg(short, long)]
        query: Option<PathBuf>,
    },
    /// Run a JSON query spec and print resolved rows.
    Query {
        #[arg(short, long)]
        schema: PathBuf,

        #[arg(short, long)]
        query: Option<PathBuf>,
    },
    /// Run raw Cypher and print resolved rows.
    Cypher {
        #[arg(short, long)]
        schema: PathBuf,

        /// Cypher text.
        #[arg(short, long)]
        text: String,

        /// Parameters as a JSON object.
        #[arg(short, long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();

    match cli.command {
        Command::Compile { schema, query } => {
            let registry = load_schema(&schema, Registry::global())?;
            let spec = read_spec(query.as_deref())?;
            let compiled = Compiler::new(registry).compile(&spec.to_query_set()?)?;
            println!("{}", serde_json::to_string_pretty(&compiled)?);
        }
        Command::Query { schema, query } => {
            let spec = read_spec(query.as_deref())?;
            let ogm = connect(&cli.config, &schema).await?;
            let rows = ogm.fetch(&spec.to_query_set()?).await?;
            print_rows(&rows)?;
        }
        Command::Cypher {
            schema,
            text,
            params,
        } => {
            let ogm = connect(&cli.config, &schema).await?;
            let mut query = CompiledQuery::new(text);
            for (key, value) in parse_params(params.as_deref())? {
                query = query.param(key, value);
            }
            let rows = ogm.cypher(&query).await?;
            print_rows(&rows)?;
        }
    }

    Ok(())
}

async fn connect(file_prefix: &str, schema: &Path) -> anyhow::Result<Ogm> {
    let cfg = StrandConfig::load(file_prefix).context("loading configuration")?;
    let registry = load_schema(schema, Registry::global())?;

    let graph = GraphClient::connect(&GraphConfig::from_settings(&cfg.neo4j, &cfg.mapping)).await?;
    let mut ogm = Ogm::new(Arc::new(graph), registry).with_settings(cfg.mapping.clone());
    if let Some(db) = &cfg.neo4j.database {
        ogm = ogm.with_database(db.clone());
    }
    Ok(ogm)
}

fn read_spec(path: Option<&Path>) -> anyhow::Result<QuerySpec> {
    let raw = match path {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("reading query {}", p.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw).context("parsing query spec")?)
}

fn parse_params(raw: Option<&str>) -> anyhow::Result<BTreeMap<String, ScalarValue>> {
    let Some(raw) = raw else {
        return Ok(BTreeMap::new());
    };
    let map: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(raw).context("--params must be a JSON object")?;
    Ok(map
        .into_iter()
        .map(|(k, v)| (k, ScalarValue::from(v)))
        .collect())
}

fn print_rows(rows: &[Vec<ResolvedValue>]) -> anyhow::Result<()> {
    for row in rows {
        let values: Vec<serde_json::Value> = row.iter().map(ResolvedValue::to_json).collect();
        println!("{}", serde_json::to_string(&values)?);
    }
    tracing::info!(rows = rows.len(), "Query complete");
    Ok(())
}
