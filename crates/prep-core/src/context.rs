//! Forkable evaluation contexts.
//!
//! Contexts form a tree through parent indices into one arena, never a
//! graph: a fork is created at every block entry and either joined back
//! into its parent (selected conditional branch) or discarded (loop
//! iteration). Undefinition is recorded as a tombstone slot so that an
//! `undef` made inside a branch joins upward like a define, while one made
//! inside a loop iteration vanishes with the iteration.

use std::collections::HashMap;

use crate::eval::Value;

/// Index of a context record in its [`ContextArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextId(pub(crate) usize);

/// Value bound to a defined name.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Raw expression text, evaluated lazily at the point of use.
    Text(String),
    /// Already-resolved scalar; loop variables are bound this way.
    Scalar(Value),
    /// Defined with no value (`#define FLAG`).
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Bound(Binding),
    /// Tombstone left by `undef`; shadows any ancestor binding.
    Removed,
}

#[derive(Debug)]
struct ContextRecord {
    slots: HashMap<String, Slot>,
    enabled: bool,
    parent: Option<ContextId>,
}

/// Arena of context records.
///
/// One arena lives for the duration of an expansion run; records are
/// never removed, discarding a fork simply means never joining it.
#[derive(Debug, Default)]
pub struct ContextArena {
    records: Vec<ContextRecord>,
}

impl ContextArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root context (enabled, no parent).
    pub fn root(&mut self) -> ContextId {
        self.push(None, true)
    }

    /// Fork a child whose enabled flag is the conjunction of the parent's
    /// and the block's own gating decision.
    pub fn fork(&mut self, parent: ContextId, gate: bool) -> ContextId {
        let enabled = self.records[parent.0].enabled && gate;
        self.push(Some(parent), enabled)
    }

    fn push(&mut self, parent: Option<ContextId>, enabled: bool) -> ContextId {
        let id = ContextId(self.records.len());
        self.records.push(ContextRecord {
            slots: HashMap::new(),
            enabled,
            parent,
        });
        id
    }

    /// Whether output is emitted under this context.
    #[must_use]
    pub fn enabled(&self, id: ContextId) -> bool {
        self.records[id.0].enabled
    }

    /// Look up a name, walking parent pointers. The innermost context
    /// mentioning the name decides; a tombstone means undefined.
    #[must_use]
    pub fn lookup(&self, id: ContextId, name: &str) -> Option<&Binding> {
        let mut current = Some(id);
        while let Some(cid) = current {
            let record = &self.records[cid.0];
            match record.slots.get(name) {
                Some(Slot::Bound(binding)) => return Some(binding),
                Some(Slot::Removed) => return None,
                None => current = record.parent,
            }
        }
        None
    }

    /// Definedness test used by `ifdef`/`ifndef` and `defined(...)`.
    #[must_use]
    pub fn is_defined(&self, id: ContextId, name: &str) -> bool {
        self.lookup(id, name).is_some()
    }

    /// Bind a name in the innermost context. Returns `true` when the name
    /// was already visible, so callers can warn about redefinition.
    pub fn define(&mut self, id: ContextId, name: &str, binding: Binding) -> bool {
        let redefined = self.lookup(id, name).is_some();
        self.records[id.0]
            .slots
            .insert(name.to_owned(), Slot::Bound(binding));
        redefined
    }

    /// Remove a name. The tombstone lives in the innermost context and
    /// propagates (or not) under the same join rules as a define.
    pub fn undef(&mut self, id: ContextId, name: &str) {
        self.records[id.0]
            .slots
            .insert(name.to_owned(), Slot::Removed);
    }

    /// Merge a finished child's slots into its parent, making its defines
    /// and undefs look as if they had been performed there directly.
    pub fn join(&mut self, child: ContextId, parent: ContextId) {
        let slots = std::mem::take(&mut self.records[child.0].slots);
        self.records[parent.0].slots.extend(slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Text("1".to_owned()));

        let child = arena.fork(root, true);
        assert_eq!(
            arena.lookup(child, "A"),
            Some(&Binding::Text("1".to_owned()))
        );
        assert!(arena.lookup(child, "B").is_none());
    }

    #[test]
    fn test_define_binds_innermost() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Text("1".to_owned()));

        let child = arena.fork(root, true);
        arena.define(child, "A", Binding::Text("2".to_owned()));

        assert_eq!(
            arena.lookup(child, "A"),
            Some(&Binding::Text("2".to_owned()))
        );
        // Parent untouched until join.
        assert_eq!(
            arena.lookup(root, "A"),
            Some(&Binding::Text("1".to_owned()))
        );
    }

    #[test]
    fn test_join_propagates_defines() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        let child = arena.fork(root, true);
        arena.define(child, "NEW", Binding::Empty);
        arena.join(child, root);

        assert!(arena.is_defined(root, "NEW"));
    }

    #[test]
    fn test_join_propagates_undef_tombstone() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Empty);

        let child = arena.fork(root, true);
        arena.undef(child, "A");
        assert!(!arena.is_defined(child, "A"));
        // Still visible from the root until the join lands.
        assert!(arena.is_defined(root, "A"));

        arena.join(child, root);
        assert!(!arena.is_defined(root, "A"));
    }

    #[test]
    fn test_discarded_fork_leaves_parent_alone() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Empty);

        let iteration = arena.fork(root, true);
        arena.define(iteration, "B", Binding::Empty);
        arena.undef(iteration, "A");
        // No join: the iteration is discarded.

        assert!(arena.is_defined(root, "A"));
        assert!(!arena.is_defined(root, "B"));
    }

    #[test]
    fn test_redefinition_reported() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        assert!(!arena.define(root, "A", Binding::Empty));
        assert!(arena.define(root, "A", Binding::Empty));

        let child = arena.fork(root, true);
        assert!(arena.define(child, "A", Binding::Empty));
    }

    #[test]
    fn test_enabled_conjunction() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        assert!(arena.enabled(root));

        let disabled = arena.fork(root, false);
        assert!(!arena.enabled(disabled));

        // A gate of true cannot re-enable under a disabled parent.
        let nested = arena.fork(disabled, true);
        assert!(!arena.enabled(nested));
    }

    #[test]
    fn test_undef_at_root() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Empty);
        arena.undef(root, "A");
        assert!(!arena.is_defined(root, "A"));
    }
}
