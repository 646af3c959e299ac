//! Spec tree model and dependency-grant resolver.
//!
//! A spec tree is a hierarchy of MODULE and LEAF nodes. MODULE nodes grant
//! dependency names to everything below them; LEAF nodes describe a single code
//! unit and may carry its expected signature. The effective allow-list of a node
//! is the union of the grants declared by its MODULE ancestors.

pub mod authoring;
pub mod error;
pub mod signature;
pub mod store;
pub mod tree;

pub use error::SpecTreeError;
pub use signature::{ExpectedParam, ExpectedSignature};
pub use store::{JsonSpecStore, SpecStore};
pub use tree::{NodeKind, SpecNode, SpecTree};
