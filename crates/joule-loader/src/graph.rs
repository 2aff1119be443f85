//! The import graph.
//!
//! Documents live in an arena and are addressed by [`DocId`]. Edges are
//! owned by the importing document and replaced wholesale whenever that
//! document is re-resolved; reverse edges are kept in sync so importers can
//! be found without a scan. Traversals are iterative with a visited set, so
//! cycles in the data never cause unbounded work.

use joule_syntax::TextRange;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Handle of a document in the [`ImportGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(u32);

impl DocId {
    /// Index into the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One `import` expression of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    /// Span of the import expression in the importing document.
    pub range: TextRange,
    /// The imported document, or `None` when the path did not resolve.
    pub target: Option<DocId>,
}

#[derive(Debug, Default)]
struct Node {
    path: PathBuf,
    edges: Vec<ImportEdge>,
    importers: BTreeSet<DocId>,
}

/// Directed graph of document imports.
#[derive(Debug, Default)]
pub struct ImportGraph {
    nodes: Vec<Node>,
    ids: HashMap<PathBuf, DocId>,
}

impl ImportGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of `path`, adding a node if needed.
    pub fn intern(&mut self, path: &Path) -> DocId {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = DocId(self.nodes.len() as u32);
        self.nodes.push(Node {
            path: path.to_path_buf(),
            ..Node::default()
        });
        self.ids.insert(path.to_path_buf(), id);
        id
    }

    /// The id of `path`, if known.
    #[must_use]
    pub fn id(&self, path: &Path) -> Option<DocId> {
        self.ids.get(path).copied()
    }

    /// The path of a document.
    #[must_use]
    pub fn path(&self, id: DocId) -> &Path {
        &self.nodes[id.index()].path
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replace the outgoing edges of `from`. At most one edge per import
    /// span is kept; a later duplicate overwrites an earlier one.
    ///
    /// Returns whether the set of imported documents changed.
    pub fn set_edges(&mut self, from: DocId, edges: Vec<ImportEdge>) -> bool {
        let mut by_range: Vec<ImportEdge> = Vec::with_capacity(edges.len());
        for edge in edges {
            match by_range.iter_mut().find(|e| e.range == edge.range) {
                Some(existing) => *existing = edge,
                None => by_range.push(edge),
            }
        }

        let old_targets = self.targets(from);
        for target in &old_targets {
            self.nodes[target.index()].importers.remove(&from);
        }
        self.nodes[from.index()].edges = by_range;
        let new_targets = self.targets(from);
        for target in &new_targets {
            self.nodes[target.index()].importers.insert(from);
        }
        old_targets != new_targets
    }

    /// Outgoing edges of `id`.
    #[must_use]
    pub fn imports(&self, id: DocId) -> &[ImportEdge] {
        &self.nodes[id.index()].edges
    }

    /// Documents directly importing `id`.
    pub fn importers(&self, id: DocId) -> impl Iterator<Item = DocId> + '_ {
        self.nodes[id.index()].importers.iter().copied()
    }

    /// Every document that imports `id` directly or indirectly, nearest
    /// first. `id` itself is included only when it is part of a cycle.
    #[must_use]
    pub fn transitive_importers(&self, id: DocId) -> Vec<DocId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue = std::collections::VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for importer in self.importers(current) {
                if seen.insert(importer) {
                    out.push(importer);
                    queue.push_back(importer);
                }
            }
        }
        out
    }

    /// Whether a path of one or more edges leads from `from` to `to`, or
    /// `from == to`.
    #[must_use]
    pub fn reaches(&self, from: DocId, to: DocId) -> bool {
        self.path_between(from, to).is_some()
    }

    /// Whether the edge `from -> to` closes a cycle.
    #[must_use]
    pub fn is_cyclic_edge(&self, from: DocId, to: DocId) -> bool {
        from == to || self.reaches(to, from)
    }

    /// The documents of the cycle closed by the edge `from -> to`, starting
    /// and ending at `from`.
    #[must_use]
    pub fn find_cycle(&self, from: DocId, to: DocId) -> Option<Vec<DocId>> {
        if from == to {
            return Some(vec![from, from]);
        }
        let mut cycle = vec![from];
        cycle.extend(self.path_between(to, from)?);
        Some(cycle)
    }

    /// Depth-first search for a path of documents `from ..= to`.
    fn path_between(&self, from: DocId, to: DocId) -> Option<Vec<DocId>> {
        let mut visited = HashSet::from([from]);
        let mut stack: Vec<(DocId, usize)> = vec![(from, 0)];
        loop {
            let &(current, _) = stack.last()?;
            if current == to {
                return Some(stack.into_iter().map(|(id, _)| id).collect());
            }
            let next = {
                let (_, cursor) = stack.last_mut()?;
                let edges = &self.nodes[current.index()].edges;
                let mut next = None;
                while *cursor < edges.len() {
                    let target = edges[*cursor].target;
                    *cursor += 1;
                    if let Some(target) = target {
                        if visited.insert(target) {
                            next = Some(target);
                            break;
                        }
                    }
                }
                next
            };
            match next {
                Some(target) => stack.push((target, 0)),
                None => {
                    stack.pop();
                }
            }
        }
    }

    fn targets(&self, id: DocId) -> BTreeSet<DocId> {
        self.nodes[id.index()]
            .edges
            .iter()
            .filter_map(|e| e.target)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(start: u32, target: DocId) -> ImportEdge {
        ImportEdge {
            range: TextRange::new(start.into(), (start + 1).into()),
            target: Some(target),
        }
    }

    fn graph(n: usize) -> (ImportGraph, Vec<DocId>) {
        let mut g = ImportGraph::new();
        let ids = (0..n)
            .map(|i| g.intern(Path::new(&format!("/w/{i}.jsonnet"))))
            .collect();
        (g, ids)
    }

    #[test]
    fn test_intern_is_stable() {
        let mut g = ImportGraph::new();
        let a = g.intern(Path::new("/w/a.jsonnet"));
        assert_eq!(g.intern(Path::new("/w/a.jsonnet")), a);
        assert_eq!(g.path(a), Path::new("/w/a.jsonnet"));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_two_cycle() {
        let (mut g, ids) = graph(2);
        g.set_edges(ids[0], vec![edge(0, ids[1])]);
        g.set_edges(ids[1], vec![edge(0, ids[0])]);
        assert!(g.is_cyclic_edge(ids[0], ids[1]));
        assert!(g.is_cyclic_edge(ids[1], ids[0]));
        assert_eq!(g.find_cycle(ids[0], ids[1]), Some(vec![ids[0], ids[1], ids[0]]));
    }

    #[test]
    fn test_self_import() {
        let (mut g, ids) = graph(1);
        g.set_edges(ids[0], vec![edge(0, ids[0])]);
        assert!(g.is_cyclic_edge(ids[0], ids[0]));
        assert_eq!(g.find_cycle(ids[0], ids[0]), Some(vec![ids[0], ids[0]]));
    }

    #[test]
    fn test_diamond_is_not_cyclic() {
        let (mut g, ids) = graph(4);
        g.set_edges(ids[0], vec![edge(0, ids[1]), edge(2, ids[2])]);
        g.set_edges(ids[1], vec![edge(0, ids[3])]);
        g.set_edges(ids[2], vec![edge(0, ids[3])]);
        assert!(!g.is_cyclic_edge(ids[0], ids[1]));
        assert!(!g.is_cyclic_edge(ids[2], ids[3]));
        assert_eq!(g.transitive_importers(ids[3]), vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn test_set_edges_replaces_and_reports_change() {
        let (mut g, ids) = graph(3);
        assert!(g.set_edges(ids[0], vec![edge(0, ids[1])]));
        assert!(!g.set_edges(ids[0], vec![edge(5, ids[1])]));
        assert!(g.set_edges(ids[0], vec![edge(5, ids[2])]));
        assert_eq!(g.importers(ids[1]).count(), 0);
        assert_eq!(g.importers(ids[2]).collect::<Vec<_>>(), vec![ids[0]]);
    }

    #[test]
    fn test_one_edge_per_span() {
        let (mut g, ids) = graph(3);
        g.set_edges(ids[0], vec![edge(0, ids[1]), edge(0, ids[2])]);
        assert_eq!(g.imports(ids[0]), &[edge(0, ids[2])]);
    }

    #[test]
    fn test_unresolved_edges_are_ignored_by_traversal() {
        let (mut g, ids) = graph(2);
        g.set_edges(
            ids[0],
            vec![ImportEdge {
                range: TextRange::new(0.into(), 1.into()),
                target: None,
            }],
        );
        assert!(!g.reaches(ids[0], ids[1]));
        assert!(g.reaches(ids[0], ids[0]));
    }
}
