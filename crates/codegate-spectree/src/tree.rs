use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::SpecTreeError;
use crate::signature::ExpectedSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Module,
    Leaf,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "MODULE",
            NodeKind::Leaf => "LEAF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: NodeKind,
    /// Dependency names granted to every descendant. Only MODULE nodes may
    /// declare them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ExpectedSignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SpecNode>,
}

impl SpecNode {
    pub fn module(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Module)
    }

    pub fn leaf(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Leaf)
    }

    fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            dependencies: BTreeSet::new(),
            signature: None,
            children: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_signature(mut self, signature: ExpectedSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_child(mut self, child: SpecNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_module(&self) -> bool {
        self.kind == NodeKind::Module
    }

    /// Pre-order walk over this node and all of its descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &SpecNode> {
        let mut stack: Vec<&SpecNode> = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// A validated spec tree with a single root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecTree {
    root: SpecNode,
}

impl SpecTree {
    pub fn new(root: SpecNode) -> Result<Self, SpecTreeError> {
        check_invariants(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &SpecNode {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut SpecNode {
        &mut self.root
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SpecNode> {
        self.root.descendants()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn find(&self, id: &str) -> Option<&SpecNode> {
        self.nodes().find(|n| n.id == id)
    }

    /// Nodes on the path from the root to `id`, both ends included.
    pub fn path_to(&self, id: &str) -> Result<Vec<&SpecNode>, SpecTreeError> {
        let mut stack: Vec<(&SpecNode, usize)> = vec![(&self.root, 0)];
        let mut path: Vec<&SpecNode> = Vec::new();
        while let Some((node, depth)) = stack.pop() {
            path.truncate(depth);
            path.push(node);
            if node.id == id {
                return Ok(path);
            }
            for child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        Err(SpecTreeError::node_not_found(id))
    }

    /// MODULE ancestors of `id`, ordered from the root to its parent.
    pub fn ancestors_of(&self, id: &str) -> Result<Vec<&SpecNode>, SpecTreeError> {
        let mut path = self.path_to(id)?;
        path.pop();
        path.retain(|n| n.is_module());
        Ok(path)
    }

    /// Union of the dependency grants declared by every MODULE ancestor of `id`.
    pub fn effective_allow_list(&self, id: &str) -> Result<BTreeSet<String>, SpecTreeError> {
        let mut allowed = BTreeSet::new();
        for module in self.ancestors_of(id)? {
            allowed.extend(module.dependencies.iter().cloned());
        }
        Ok(allowed)
    }

    /// Expected signature carried by the node `id`, if any.
    pub fn signature_of(&self, id: &str) -> Result<Option<&ExpectedSignature>, SpecTreeError> {
        let node = self
            .find(id)
            .ok_or_else(|| SpecTreeError::node_not_found(id))?;
        Ok(node.signature.as_ref())
    }
}

pub(crate) fn check_invariants(root: &SpecNode) -> Result<(), SpecTreeError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for node in root.descendants() {
        check_node(node)?;
        if !seen.insert(node.id.as_str()) {
            return Err(SpecTreeError::DuplicateNode {
                id: node.id.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_node(node: &SpecNode) -> Result<(), SpecTreeError> {
    if node.id.trim().is_empty() {
        return Err(SpecTreeError::EmptyId);
    }
    match node.kind {
        NodeKind::Leaf => {
            if !node.dependencies.is_empty() {
                return Err(SpecTreeError::LeafDeclaresDependencies {
                    id: node.id.clone(),
                });
            }
            if !node.children.is_empty() {
                return Err(SpecTreeError::LeafHasChildren {
                    id: node.id.clone(),
                });
            }
        }
        NodeKind::Module => {
            if node.dependencies.iter().any(|d| d.trim().is_empty()) {
                return Err(SpecTreeError::EmptyDependency {
                    id: node.id.clone(),
                });
            }
        }
    }
    Ok(())
}
