//! Arena of posts keyed by id, each optionally pointing at its parent.
//!
//! Replies form a forest under `parent_post_id`. The closure over that
//! relation is computed with an explicit worklist so arbitrarily deep reply
//! chains never grow the call stack.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone)]
pub struct PostForest {
    parents: HashMap<i64, Option<i64>>,
    children: HashMap<i64, Vec<i64>>,
}

impl PostForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a post. A reply's parent must already be present, which keeps
    /// the relation acyclic. Returns `false` when the post is rejected.
    pub fn insert(&mut self, id: i64, parent: Option<i64>) -> bool {
        if self.parents.contains_key(&id) {
            return false;
        }
        if let Some(parent_id) = parent {
            if !self.parents.contains_key(&parent_id) {
                return false;
            }
            self.children.entry(parent_id).or_default().push(id);
        }
        self.parents.insert(id, parent);
        true
    }

    pub fn contains(&self, id: i64) -> bool {
        self.parents.contains_key(&id)
    }

    pub fn parent_of(&self, id: i64) -> Option<i64> {
        self.parents.get(&id).copied().flatten()
    }

    /// Direct replies of `id`.
    pub fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// The root plus every transitive reply. Empty when `root` is unknown.
    ///
    /// Worklist expansion until no new id is added; the result is sorted so
    /// callers get the same answer whatever order children were visited in.
    pub fn descendants(&self, root: i64) -> Vec<i64> {
        if !self.contains(root) {
            return Vec::new();
        }

        let mut seen = HashSet::from([root]);
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            for &child in self.children.get(&id).into_iter().flatten() {
                if seen.insert(child) {
                    pending.push(child);
                }
            }
        }

        let mut ids: Vec<i64> = seen.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Drops every id in `ids`. Returns the ids that were present, sorted.
    pub fn remove_all(&mut self, ids: &[i64]) -> Vec<i64> {
        let mut removed = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(parent) = self.parents.remove(&id) {
                self.children.remove(&id);
                if let Some(parent_id) = parent {
                    if let Some(siblings) = self.children.get_mut(&parent_id) {
                        siblings.retain(|&child| child != id);
                    }
                }
                removed.push(id);
            }
        }
        removed.sort_unstable();
        removed
    }
}
