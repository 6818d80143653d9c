use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        ComponentId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identity of a node or plug in the evaluated graph.
///
/// Components form a tree: parents own their children, children refer back
/// weakly. Equality and hashing are by identity, never by name.
pub struct GraphComponent {
    id: ComponentId,
    name: String,
    parent: RwLock<Weak<GraphComponent>>,
    children: RwLock<Vec<Arc<GraphComponent>>>,
}

impl GraphComponent {
    pub fn new_root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: ComponentId::next(),
            name: name.into(),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
        })
    }

    pub fn add_child(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        let child = Arc::new(Self {
            id: ComponentId::next(),
            name: name.into(),
            parent: RwLock::new(Arc::downgrade(self)),
            children: RwLock::new(Vec::new()),
        });
        self.children.write().push(child.clone());
        child
    }

    /// Detaches `child`, returning it if it was ours. The child becomes a
    /// root of its own subtree.
    pub fn remove_child(&self, child: &GraphComponent) -> Option<Arc<Self>> {
        let removed = {
            let mut children = self.children.write();
            let index = children.iter().position(|c| c.id == child.id)?;
            children.remove(index)
        };
        *removed.parent.write() = Weak::new();
        Some(removed)
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.read().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<Self>> {
        self.children.read().clone()
    }

    pub fn child(&self, name: &str) -> Option<Arc<Self>> {
        self.children.read().iter().find(|c| c.name == name).cloned()
    }

    /// Dot-separated path from the root, e.g. `"script.blur.out"`.
    pub fn full_name(&self) -> String {
        let mut names = vec![self.name.clone()];
        let mut current = self.parent();
        while let Some(p) = current {
            names.push(p.name.clone());
            current = p.parent();
        }
        names.reverse();
        names.join(".")
    }

    /// Path relative to `ancestor`. Falls back to the full name when
    /// `ancestor` is not above us.
    pub fn relative_name(&self, ancestor: &GraphComponent) -> String {
        let mut names = vec![self.name.clone()];
        let mut current = self.parent();
        while let Some(p) = current {
            if p.id == ancestor.id {
                names.reverse();
                return names.join(".");
            }
            names.push(p.name.clone());
            current = p.parent();
        }
        self.full_name()
    }

    /// True if `other` is a strict descendant of `self`.
    pub fn is_ancestor_of(&self, other: &GraphComponent) -> bool {
        let mut current = other.parent();
        while let Some(p) = current {
            if p.id == self.id {
                return true;
            }
            current = p.parent();
        }
        false
    }
}

impl PartialEq for GraphComponent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GraphComponent {}

impl Hash for GraphComponent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for GraphComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphComponent")
            .field("id", &self.id.0)
            .field("name", &self.full_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_ancestry() {
        let script = GraphComponent::new_root("script");
        let blur = script.add_child("blur");
        let out = blur.add_child("out");
        let other = GraphComponent::new_root("other");

        assert_eq!(out.full_name(), "script.blur.out");
        assert_eq!(out.relative_name(&script), "blur.out");
        assert_eq!(out.relative_name(&other), "script.blur.out");
        assert!(script.is_ancestor_of(&out));
        assert!(blur.is_ancestor_of(&out));
        assert!(!out.is_ancestor_of(&blur));
        assert!(!script.is_ancestor_of(&script));
        assert!(!other.is_ancestor_of(&out));
        assert_eq!(script.child("blur").as_ref(), Some(&blur));
    }

    #[test]
    fn identity_not_name() {
        let a = GraphComponent::new_root("n");
        let b = GraphComponent::new_root("n");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn removed_child_is_detached_immediately() {
        let root = GraphComponent::new_root("root");
        let child = root.add_child("child");
        let grandchild = child.add_child("leaf");
        assert!(root.remove_child(&child).is_some());

        assert!(child.parent().is_none());
        assert!(!root.is_ancestor_of(&child));
        assert!(!root.is_ancestor_of(&grandchild));
        assert!(child.is_ancestor_of(&grandchild));
        assert_eq!(grandchild.full_name(), "child.leaf");
        assert!(root.children().is_empty());
    }

    #[test]
    fn removed_child_loses_ancestry_when_parent_dropped() {
        let root = GraphComponent::new_root("root");
        let child = root.add_child("child");
        assert!(root.remove_child(&child).is_some());
        assert!(root.remove_child(&child).is_none());
        drop(root);
        assert!(child.parent().is_none());
        assert_eq!(child.full_name(), "child");
    }
}
