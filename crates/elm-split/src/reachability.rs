//! Reachability over the declaration graph
//!
//! Nodes are declaration names; an edge `a -> b` means `b` is in the needs
//! of `a`. Names referenced but never declared get a node of their own
//! unless they are external (ambient or forced shared), so reaching one is a
//! hard [`SplitError::UnknownIdentifier`] rather than a silently dropped edge.

use std::collections::VecDeque;

use log::trace;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    dependency_map::DependencyMap,
    error::{Result, SplitError},
    types::FxIndexSet,
};

/// Dependency graph borrowed from a [`DependencyMap`]
#[derive(Debug)]
pub struct DependencyGraph<'m> {
    map: &'m DependencyMap,
    graph: DiGraph<&'m str, ()>,
    indices: FxHashMap<&'m str, NodeIndex>,
    externals: FxHashSet<String>,
}

impl<'m> DependencyGraph<'m> {
    /// Build the graph; `externals` are names that may stay undeclared
    pub fn new<I, S>(map: &'m DependencyMap, externals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let externals: FxHashSet<String> = externals
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect();
        let mut graph = DiGraph::new();
        let mut indices = FxHashMap::default();

        for name in map.declarations.keys() {
            indices.insert(name.as_str(), graph.add_node(name.as_str()));
        }
        for declaration in map.declarations.values() {
            let from = indices[declaration.name.as_str()];
            for need in &declaration.needs {
                let need = need.as_str();
                if !map.contains(need) && externals.contains(need) {
                    continue;
                }
                let to = *indices
                    .entry(need)
                    .or_insert_with(|| graph.add_node(need));
                graph.add_edge(from, to, ());
            }
        }

        Self {
            map,
            graph,
            indices,
            externals,
        }
    }

    /// Everything `seed` transitively needs, `seed` itself excluded
    pub fn closure(&self, seed: &str) -> Result<FxIndexSet<String>> {
        let mut reached = self.closure_from([seed], seed)?;
        reached.shift_remove(seed);
        Ok(reached)
    }

    /// Seeds plus everything they transitively need, in discovery order.
    ///
    /// `origin` names the requester in errors raised for unknown seeds.
    pub fn closure_from<I, S>(&self, seeds: I, origin: &str) -> Result<FxIndexSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut visited: FxIndexSet<NodeIndex> = FxIndexSet::default();
        let mut parents: FxHashMap<NodeIndex, NodeIndex> = FxHashMap::default();
        let mut queue = VecDeque::new();

        for seed in seeds {
            let seed = seed.as_ref();
            match self.indices.get(seed) {
                Some(&index) => {
                    if visited.insert(index) {
                        queue.push_back(index);
                    }
                }
                None if self.externals.contains(seed) => {}
                None => {
                    return Err(SplitError::UnknownIdentifier {
                        name: seed.to_owned(),
                        referenced_by: origin.to_owned(),
                    });
                }
            }
        }

        while let Some(index) = queue.pop_front() {
            let name = self.graph[index];
            if !self.map.contains(name) {
                let referenced_by = parents.get(&index).map_or(origin, |&p| self.graph[p]);
                return Err(SplitError::UnknownIdentifier {
                    name: name.to_owned(),
                    referenced_by: referenced_by.to_owned(),
                });
            }
            // petgraph lists neighbors newest edge first
            let mut next: Vec<NodeIndex> = self.graph.neighbors(index).collect();
            next.reverse();
            for dependency in next {
                if visited.insert(dependency) {
                    parents.insert(dependency, index);
                    queue.push_back(dependency);
                }
            }
        }

        let reached: FxIndexSet<String> = visited
            .into_iter()
            .map(|index| self.graph[index].to_owned())
            .collect();
        trace!("Closure for `{origin}` reached {} names", reached.len());
        Ok(reached)
    }

    /// Closure of `seeds` together with everything the unnamed chunks need
    pub fn requires<I, S>(&self, seeds: I, origin: &str) -> Result<FxIndexSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all: Vec<String> = seeds
            .into_iter()
            .map(|seed| seed.as_ref().to_owned())
            .collect();
        all.extend(self.map.unnamed_needs());
        self.closure_from(all, origin)
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.externals.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names(set: &FxIndexSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_closure_is_breadth_first_and_excludes_seed() {
        let map = DependencyMap::build(
            "var a = b + c;\nvar b = d;\nvar c = 1;\nvar d = 2;\nvar unused = a;",
        )
        .expect("build");
        let graph = DependencyGraph::new(&map, std::iter::empty::<&str>());
        assert_eq!(names(&graph.closure("a").expect("closure")), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let map = DependencyMap::build("function f() { return g(); }\nfunction g() { return f(); }")
            .expect("build");
        let graph = DependencyGraph::new(&map, std::iter::empty::<&str>());
        assert_eq!(names(&graph.closure("f").expect("closure")), vec!["g"]);
        assert_eq!(
            names(&graph.closure_from(["f"], "test").expect("closure")),
            vec!["f", "g"]
        );
    }

    #[test]
    fn test_unknown_identifier_names_referrer() {
        let map = DependencyMap::build("var a = b;\nvar b = missing;").expect("build");
        let graph = DependencyGraph::new(&map, std::iter::empty::<&str>());
        let err = graph.closure("a").expect_err("missing is unknown");
        match err {
            SplitError::UnknownIdentifier {
                name,
                referenced_by,
            } => {
                assert_eq!(name, "missing");
                assert_eq!(referenced_by, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_external_names_are_not_in_closure() {
        let map = DependencyMap::build("var a = _Runtime_slot + b;\nvar b = 1;").expect("build");
        let graph = DependencyGraph::new(&map, ["_Runtime_slot"]);
        assert_eq!(names(&graph.closure("a").expect("closure")), vec!["b"]);
        assert!(graph.is_external("_Runtime_slot"));
    }

    #[test]
    fn test_requires_folds_in_unnamed_chunks() {
        let map = DependencyMap::build("var a = 1;\nvar b = 2;\nvar c = 3;\nregister(c);\nvar register = 0;")
            .expect("build");
        let graph = DependencyGraph::new(&map, std::iter::empty::<&str>());
        let required = graph.requires(["a"], "Main").expect("requires");
        assert_eq!(names(&required), vec!["a", "register", "c"]);
    }

    #[test]
    fn test_unknown_seed_is_reported_against_origin() {
        let map = DependencyMap::build("var a = 1;").expect("build");
        let graph = DependencyGraph::new(&map, std::iter::empty::<&str>());
        let err = graph.closure_from(["nope"], "Main").expect_err("unknown seed");
        assert!(matches!(
            err,
            SplitError::UnknownIdentifier { ref referenced_by, .. } if referenced_by == "Main"
        ));
    }
}
