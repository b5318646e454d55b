//! strand-graph: the mapper's query side.
//!
//! Compiles query sets into parameterized Cypher, runs them through a
//! [`QueryExecutor`] (Neo4j via `neo4rs` in production) and resolves the
//! rows into model instances. Relationship writes go through the
//! cardinality guard.

pub mod cardinality;
pub mod client;
pub mod compile;
pub mod convert;
pub mod error;
pub mod mutations;
pub mod nodes;
pub mod relationship;
pub mod session;

pub use cardinality::{CardinalityGuard, CardinalityNotice, CheckMode, Side};
pub use client::{GraphClient, GraphConfig, GraphError, QueryExecutor};
pub use compile::{CompiledQuery, Compiler, Operator, Projection, QuerySet, SimilarityFilter, Q};
pub use error::{CardinalityError, CompileError};
pub use relationship::{edge_props, ConnectOutcome, RelationshipAccessor};
pub use session::Ogm;
