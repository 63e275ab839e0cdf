//! Directed dependency graph with deterministic ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::Error;

/// Directed graph over named nodes.
///
/// An edge `node → dep` means "`node` depends on `dep`": `dep` must start
/// before `node` and be cleaned up after it.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Node → the nodes it depends on. Every referenced name has an entry.
    deps: BTreeMap<String, BTreeSet<String>>,
    /// Reverse edges: node → the nodes that depend on it.
    dependents: BTreeMap<String, BTreeSet<String>>,
    /// Edge weights, keyed by (node, dep). Unlisted edges weigh 1.
    weights: HashMap<(String, String), u32>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and its dependency edges. Registering the same node twice
    /// merges the dependency sets.
    pub fn register<I, S>(&mut self, node: &str, deps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.entry(node.to_string()).or_default();
        for dep in deps {
            let dep = dep.into();
            self.deps.entry(dep.clone()).or_default();
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(node.to_string());
            self.deps.entry(node.to_string()).or_default().insert(dep);
        }
    }

    /// Add a single weighted dependency edge. Heavier edges are visited first
    /// when computing the cleanup order.
    pub fn register_weighted(&mut self, node: &str, dep: &str, weight: u32) {
        self.register(node, [dep]);
        self.weights
            .insert((node.to_string(), dep.to_string()), weight);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.deps.contains_key(node)
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Deterministic topological order: every node appears after all of its
    /// dependencies; ties broken lexicographically.
    pub fn order(&self) -> Result<Vec<String>, Error> {
        self.topo_order(false)
    }

    /// Cleanup order: dependents first. The reverse of the topological order,
    /// with heavier edges visited first within the deterministic sweep.
    pub fn cleanup_order(&self) -> Result<Vec<String>, Error> {
        let mut order = self.topo_order(true)?;
        order.reverse();
        Ok(order)
    }

    /// Group the cleanup order into sequential waves. A node is placed only
    /// after every node that depends on it landed in an earlier wave, so the
    /// members of one wave may be cleaned concurrently.
    pub fn cleanup_waves(&self) -> Result<Vec<Vec<String>>, Error> {
        let order = self.cleanup_order()?;
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<String>> = Vec::new();

        // The cleanup order visits dependents before dependencies, so every
        // dependent's depth is known by the time its dependency is reached.
        for node in &order {
            let d = self
                .dependents
                .get(node)
                .into_iter()
                .flatten()
                .map(|dependent| depth.get(dependent.as_str()).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, d);
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(node.clone());
        }

        for wave in &mut waves {
            wave.sort();
        }
        Ok(waves)
    }

    /// Iterative depth-first post-order. A dependency encountered while it is
    /// still on the current path is a cycle.
    fn topo_order(&self, weighted: bool) -> Result<Vec<String>, Error> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut on_path: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::with_capacity(self.deps.len());

        for root in self.deps.keys() {
            if visited.contains(root) {
                continue;
            }

            let mut stack: Vec<(String, Vec<String>, usize)> =
                vec![(root.clone(), self.sorted_deps(root, weighted), 0)];
            on_path.insert(root.clone());

            while let Some((node, deps, next)) = stack.last_mut() {
                if *next < deps.len() {
                    let dep = deps[*next].clone();
                    *next += 1;
                    if on_path.contains(&dep) {
                        return Err(Error::Cycle { node: dep });
                    }
                    if !visited.contains(&dep) {
                        on_path.insert(dep.clone());
                        let dep_deps = self.sorted_deps(&dep, weighted);
                        stack.push((dep, dep_deps, 0));
                    }
                } else {
                    let node = node.clone();
                    on_path.remove(&node);
                    visited.insert(node.clone());
                    order.push(node);
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    fn sorted_deps(&self, node: &str, weighted: bool) -> Vec<String> {
        let Some(deps) = self.deps.get(node) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = deps.iter().cloned().collect();
        if weighted {
            deps.sort_by(|a, b| {
                let wa = self.edge_weight(node, a);
                let wb = self.edge_weight(node, b);
                wb.cmp(&wa).then_with(|| a.cmp(b))
            });
        }
        deps
    }

    fn edge_weight(&self, node: &str, dep: &str) -> u32 {
        self.weights
            .get(&(node.to_string(), dep.to_string()))
            .copied()
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[String], node: &str) -> usize {
        order.iter().position(|n| n == node).unwrap()
    }

    #[test]
    fn order_places_dependencies_first() {
        let mut graph = DependencyGraph::new();
        graph.register("bot", ["cache", "search"]);
        graph.register("search", ["cache"]);
        graph.register("cache", Vec::<String>::new());

        let order = graph.order().unwrap();
        assert!(position(&order, "cache") < position(&order, "search"));
        assert!(position(&order, "search") < position(&order, "bot"));
    }

    #[test]
    fn order_breaks_ties_lexicographically() {
        let mut graph = DependencyGraph::new();
        graph.register("b", ["a"]);
        graph.register("c", ["a"]);
        graph.register("a", Vec::<String>::new());

        assert_eq!(graph.order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unregistered_dependency_becomes_a_node() {
        let mut graph = DependencyGraph::new();
        graph.register("worker", ["queue"]);

        let order = graph.order().unwrap();
        assert_eq!(order, vec!["queue", "worker"]);
    }

    #[test]
    fn cycle_is_reported_with_a_member_node() {
        let mut graph = DependencyGraph::new();
        graph.register("a", ["b"]);
        graph.register("b", ["c"]);
        graph.register("c", ["a"]);

        match graph.order() {
            Err(Error::Cycle { node }) => {
                assert!(["a", "b", "c"].contains(&node.as_str()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.register("a", ["a"]);
        assert!(matches!(graph.order(), Err(Error::Cycle { .. })));
    }

    #[test]
    fn cleanup_order_is_reverse_of_startup() {
        let mut graph = DependencyGraph::new();
        graph.register("b", ["a"]);
        graph.register("c", ["a"]);
        graph.register("a", Vec::<String>::new());

        assert_eq!(graph.cleanup_order().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn heavier_edges_clean_up_later_within_ties() {
        let mut graph = DependencyGraph::new();
        graph.register("app", ["db", "net"]);
        graph.register_weighted("app", "db", 5);

        let cleanup = graph.cleanup_order().unwrap();
        assert_eq!(cleanup[0], "app");
        // db's heavier edge is visited first in the forward sweep, so it is
        // released last.
        assert_eq!(cleanup.last().map(String::as_str), Some("db"));
    }

    #[test]
    fn cleanup_waves_respect_dependents() {
        let mut graph = DependencyGraph::new();
        graph.register("b", ["a"]);
        graph.register("c", ["a"]);
        graph.register("a", Vec::<String>::new());

        let waves = graph.cleanup_waves().unwrap();
        assert_eq!(waves, vec![vec!["b".to_string(), "c".to_string()], vec!["a".to_string()]]);
    }
}
