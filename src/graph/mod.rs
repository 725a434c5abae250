//! Core graph data structures

mod edge;
mod node;
pub mod schema;


pub use edge::{Edge, EdgeDirection};
pub use node::{Node, NodeId, NodeKind, Properties, PropertyValue};
pub use schema::{Relation, SchemaViolation, HIERARCHY_SCHEMA};
