// 🔗 Disjoint Set - Union-find over arbitrary hashable keys
// Path compression + union by size; scoped to a single resolution call.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct DisjointSet<T> {
    index: HashMap<T, usize>,
    items: Vec<T>,
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl<T: Clone + Eq + Hash> DisjointSet<T> {
    pub fn new() -> Self {
        DisjointSet {
            index: HashMap::new(),
            items: Vec::new(),
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    /// Build with every item as its own singleton class
    pub fn from_items<I: IntoIterator<Item = T>>(items: I) -> Self {
        let mut set = DisjointSet::new();
        for item in items {
            set.insert(item);
        }
        set
    }

    /// Add an item as a singleton; no-op if already present
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(&id) = self.index.get(&item) {
            return id;
        }
        let id = self.items.len();
        self.index.insert(item.clone(), id);
        self.items.push(item);
        self.parent.push(id);
        self.size.push(1);
        id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.index.contains_key(item)
    }

    /// Representative of the item's class (None for unknown items)
    pub fn find(&mut self, item: &T) -> Option<&T> {
        let id = *self.index.get(item)?;
        let root = self.find_root(id);
        Some(&self.items[root])
    }

    /// Merge the classes of `a` and `b`, inserting either if unseen.
    /// Returns true when two distinct classes were merged.
    pub fn union(&mut self, a: &T, b: &T) -> bool {
        let a_id = self.insert(a.clone());
        let b_id = self.insert(b.clone());

        let mut a_root = self.find_root(a_id);
        let mut b_root = self.find_root(b_id);
        if a_root == b_root {
            return false;
        }

        if self.size[a_root] < self.size[b_root] {
            std::mem::swap(&mut a_root, &mut b_root);
        }
        self.parent[b_root] = a_root;
        self.size[a_root] += self.size[b_root];
        true
    }

    pub fn same_class(&mut self, a: &T, b: &T) -> bool {
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(a_id), Some(b_id)) => self.find_root(a_id) == self.find_root(b_id),
            _ => false,
        }
    }

    /// All equivalence classes, members in insertion order, classes ordered
    /// by their first-inserted member
    pub fn classes(&mut self) -> Vec<Vec<T>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut classes: Vec<Vec<T>> = Vec::new();

        for id in 0..self.items.len() {
            let root = self.find_root(id);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                classes.push(Vec::new());
                classes.len() - 1
            });
            classes[slot].push(self.items[id].clone());
        }

        classes
    }

    fn find_root(&mut self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        // Path compression
        let mut current = id;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }

        root
    }
}

impl<T: Clone + Eq + Hash> Default for DisjointSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut ds = DisjointSet::from_items(vec!["a", "b", "c"]);

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.classes().len(), 3);
        assert_eq!(ds.find(&"b"), Some(&"b"));
        assert_eq!(ds.find(&"z"), None);
    }

    #[test]
    fn test_union_is_transitive() {
        let mut ds = DisjointSet::from_items(vec!["a", "b", "c", "d"]);

        assert!(ds.union(&"a", &"b"));
        assert!(ds.union(&"b", &"c"));
        assert!(!ds.union(&"a", &"c"));

        assert!(ds.same_class(&"a", &"c"));
        assert!(!ds.same_class(&"a", &"d"));

        let classes = ds.classes();
        assert_eq!(classes, vec![vec!["a", "b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_union_inserts_unknown_items() {
        let mut ds: DisjointSet<String> = DisjointSet::new();

        ds.union(&"x".to_string(), &"y".to_string());

        assert_eq!(ds.len(), 2);
        assert!(ds.same_class(&"x".to_string(), &"y".to_string()));
    }

    #[test]
    fn test_long_chain_compresses() {
        let items: Vec<usize> = (0..1000).collect();
        let mut ds = DisjointSet::from_items(items.clone());

        for pair in items.windows(2) {
            ds.union(&pair[0], &pair[1]);
        }

        let root = *ds.find(&0).unwrap();
        assert_eq!(ds.find(&999), Some(&root));
        assert_eq!(ds.classes().len(), 1);
    }
}
