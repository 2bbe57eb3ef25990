use super::ResourceId;

/// Disjoint sets of resources that get closed together
///
/// A wrapper and the resource it wraps end up in the same set: closing either one closes the
/// underlying handle. The `closed` flag lives on the root of each set.
#[derive(Debug, Clone)]
pub struct Equivalence {
    parent: Vec<usize>,
    rank: Vec<u8>,
    closed: Vec<bool>,
}

impl Equivalence {
    /// Every resource in its own set
    pub fn new(resource_count: usize) -> Equivalence {
        Equivalence {
            parent: (0..resource_count).collect(),
            rank: vec![0; resource_count],
            closed: vec![false; resource_count],
        }
    }

    /// Representative of the set containing a resource
    pub fn find(&mut self, resource: ResourceId) -> ResourceId {
        let mut root = resource.0;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        // Path compression
        let mut current = resource.0;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }

        ResourceId(root)
    }

    /// Merge the sets of two resources (the merged set is closed if either was)
    pub fn union(&mut self, left: ResourceId, right: ResourceId) {
        let ResourceId(left) = self.find(left);
        let ResourceId(right) = self.find(right);
        if left == right {
            return;
        }

        let closed = self.closed[left] || self.closed[right];
        let (root, child) = if self.rank[left] < self.rank[right] {
            (right, left)
        } else {
            (left, right)
        };
        self.parent[child] = root;
        if self.rank[root] == self.rank[child] {
            self.rank[root] += 1;
        }
        self.closed[root] = closed;
    }

    pub fn same_set(&mut self, left: ResourceId, right: ResourceId) -> bool {
        self.find(left) == self.find(right)
    }

    pub fn set_closed(&mut self, resource: ResourceId) {
        let ResourceId(root) = self.find(resource);
        self.closed[root] = true;
    }

    pub fn is_closed(&mut self, resource: ResourceId) -> bool {
        let ResourceId(root) = self.find(resource);
        self.closed[root]
    }
}
