//! Mutating operations used by spec authors.
//!
//! The validation pipeline only ever reads a tree; these operations exist for the
//! host that edits the persisted spec between validation runs. Each one leaves
//! the tree invariants intact or returns an error without modifying anything.

use crate::error::SpecTreeError;
use crate::tree::{check_invariants, check_node, SpecNode, SpecTree};

impl SpecTree {
    /// Grants `dep` to every descendant of the MODULE `module_id`.
    /// Returns `false` when the grant already existed.
    pub fn grant_dependency(&mut self, module_id: &str, dep: &str) -> Result<bool, SpecTreeError> {
        let dep = dep.trim();
        if dep.is_empty() {
            return Err(SpecTreeError::EmptyDependency {
                id: module_id.to_string(),
            });
        }
        let node = self.module_mut(module_id)?;
        Ok(node.dependencies.insert(dep.to_string()))
    }

    /// Withdraws a grant declared directly on `module_id`. Grants inherited
    /// from higher modules are unaffected. Returns `false` when nothing changed.
    pub fn revoke_dependency(&mut self, module_id: &str, dep: &str) -> Result<bool, SpecTreeError> {
        let node = self.module_mut(module_id)?;
        Ok(node.dependencies.remove(dep.trim()))
    }

    /// Attaches `node` (and its subtree) under the MODULE `parent_id`.
    pub fn add_node(&mut self, parent_id: &str, node: SpecNode) -> Result<(), SpecTreeError> {
        check_invariants(&node)?;
        for incoming in node.descendants() {
            if self.contains(&incoming.id) {
                return Err(SpecTreeError::DuplicateNode {
                    id: incoming.id.clone(),
                });
            }
        }
        let parent = self.module_mut(parent_id)?;
        parent.children.push(node);
        Ok(())
    }

    /// Detaches the subtree rooted at `id` and returns it.
    pub fn remove_node(&mut self, id: &str) -> Result<SpecNode, SpecTreeError> {
        if self.root().id == id {
            return Err(SpecTreeError::CannotRemoveRoot { id: id.to_string() });
        }
        detach(self.root_mut(), id).ok_or_else(|| SpecTreeError::node_not_found(id))
    }

    fn module_mut(&mut self, id: &str) -> Result<&mut SpecNode, SpecTreeError> {
        let node = find_mut(self.root_mut(), id).ok_or_else(|| SpecTreeError::node_not_found(id))?;
        if !node.is_module() {
            return Err(SpecTreeError::NotAModule { id: id.to_string() });
        }
        check_node(node)?;
        Ok(node)
    }
}

fn find_mut<'a>(node: &'a mut SpecNode, id: &str) -> Option<&'a mut SpecNode> {
    if node.id == id {
        return Some(node);
    }
    node.children.iter_mut().find_map(|child| find_mut(child, id))
}

fn detach(node: &mut SpecNode, id: &str) -> Option<SpecNode> {
    if let Some(idx) = node.children.iter().position(|c| c.id == id) {
        return Some(node.children.remove(idx));
    }
    node.children.iter_mut().find_map(|child| detach(child, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> SpecTree {
        SpecTree::new(
            SpecNode::module("root", "Root").with_child(
                SpecNode::module("tax", "Tax")
                    .with_dependencies(["math"])
                    .with_child(SpecNode::leaf("calc", "calculate_tax")),
            ),
        )
        .expect("valid tree")
    }

    #[test]
    fn grant_and_revoke_change_the_allow_list() {
        let mut t = tree();
        assert!(t.grant_dependency("tax", "decimal").expect("grant"));
        assert!(!t.grant_dependency("tax", "decimal").expect("regrant"));
        assert!(t
            .effective_allow_list("calc")
            .expect("allow")
            .contains("decimal"));

        assert!(t.revoke_dependency("tax", "math").expect("revoke"));
        assert!(!t
            .effective_allow_list("calc")
            .expect("allow")
            .contains("math"));
    }

    #[test]
    fn grants_are_module_only() {
        let mut t = tree();
        assert_eq!(
            t.grant_dependency("calc", "os"),
            Err(SpecTreeError::NotAModule { id: "calc".into() })
        );
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut t = tree();
        t.add_node("tax", SpecNode::leaf("round", "round_amount"))
            .expect("add");
        assert_eq!(
            t.add_node("tax", SpecNode::leaf("calc", "dup")),
            Err(SpecTreeError::DuplicateNode { id: "calc".into() })
        );
        assert_eq!(
            t.add_node("calc", SpecNode::leaf("child", "")),
            Err(SpecTreeError::NotAModule { id: "calc".into() })
        );

        let removed = t.remove_node("tax").expect("remove");
        assert_eq!(removed.children.len(), 2);
        assert!(!t.contains("round"));
        assert_eq!(
            t.remove_node("root"),
            Err(SpecTreeError::CannotRemoveRoot { id: "root".into() })
        );
    }
}
