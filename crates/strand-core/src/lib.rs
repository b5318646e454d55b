//! strand-core: the mapping engine's data side.
//!
//! - Model descriptors and property codecs
//! - Raw graph values as delivered by a query client
//! - The label registry (label set / relationship type to model)
//! - The object resolver (raw values to typed instances)
//! - Configuration and error types shared by every Strand crate

pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod resolve;
pub mod value;

pub use config::StrandConfig;
pub use error::{
    DeflateError, InflateError, RegistryError, ResolveError, StrandError,
};
pub use model::{
    Cardinality, DescriptorRef, Direction, LabelSet, ModelDescriptor, PropertyDef, PropertyKind,
    RegistryKey, RelationshipDef,
};
pub use registry::{Registration, Registry};
pub use resolve::{EdgeInstance, NodeInstance, PathValue, ResolvedValue, Resolver};
pub use value::{RawNode, RawPath, RawRelationship, RawValue, ScalarValue};
