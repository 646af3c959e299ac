use thiserror::Error;

/// Structural and lookup failures on a spec tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecTreeError {
    #[error("spec node not found: {id:?}")]
    NodeNotFound { id: String },

    #[error("duplicate spec node id: {id:?}")]
    DuplicateNode { id: String },

    #[error("spec node {id:?} is not a MODULE")]
    NotAModule { id: String },

    #[error("LEAF node {id:?} must not declare dependencies")]
    LeafDeclaresDependencies { id: String },

    #[error("LEAF node {id:?} must not have children")]
    LeafHasChildren { id: String },

    #[error("spec node {id:?} declares an empty dependency name")]
    EmptyDependency { id: String },

    #[error("spec node id must be non-empty")]
    EmptyId,

    #[error("the root node {id:?} cannot be removed")]
    CannotRemoveRoot { id: String },
}

impl SpecTreeError {
    pub fn node_not_found(id: &str) -> Self {
        SpecTreeError::NodeNotFound { id: id.to_string() }
    }
}
