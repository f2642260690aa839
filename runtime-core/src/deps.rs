//! Dependency Graph (C9).
//!
//! A small, directed graph of "depends on" edges between named services.
//! Edges are validated against cycles immediately on insertion (a DFS from
//! the new dependency back to the dependent), so the graph is always
//! acyclic by construction and `get_init_order` can never fail.

use std::collections::{HashMap, HashSet};

use abi::{CoreError, CoreResult, ServiceId};

pub struct DependencyGraph {
    /// service -> the services it depends on.
    edges: HashMap<u16, Vec<u16>>,
    initialized: HashSet<u16>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            edges: HashMap::new(),
            initialized: HashSet::new(),
        }
    }

    fn reaches(&self, from: u16, to: u16) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(next) = self.edges.get(&node) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    /// Adds an edge `service depends_on depends_on`. Rejected, with the
    /// graph left unchanged, if it would close a cycle.
    pub fn add(&mut self, service: ServiceId, depends_on: ServiceId) -> CoreResult<()> {
        if service == depends_on {
            return Err(CoreError::CircularDependency);
        }
        if self.reaches(depends_on.0, service.0) {
            return Err(CoreError::CircularDependency);
        }
        let list = self.edges.entry(service.0).or_default();
        if !list.contains(&depends_on.0) {
            list.push(depends_on.0);
        }
        Ok(())
    }

    pub fn add_multiple(&mut self, edges: &[(ServiceId, ServiceId)]) -> CoreResult<()> {
        let snapshot: HashMap<u16, Vec<u16>> = self.edges.clone();
        for &(service, depends_on) in edges {
            if let Err(e) = self.add(service, depends_on) {
                self.edges = snapshot;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Kahn's algorithm. Cannot fail: every edge set accepted by `add` is
    /// acyclic by construction.
    pub fn get_init_order(&self) -> Vec<ServiceId> {
        let mut nodes: HashSet<u16> = self.edges.keys().copied().collect();
        for deps in self.edges.values() {
            nodes.extend(deps.iter().copied());
        }

        let mut in_degree: HashMap<u16, usize> = nodes.iter().map(|&n| (n, 0)).collect();
        // in_degree here counts "number of unresolved dependencies" for a
        // Kahn pass that emits a node only once everything it depends on
        // has been emitted.
        for (&node, deps) in &self.edges {
            *in_degree.get_mut(&node).unwrap() = deps.len();
        }

        let mut ready: Vec<u16> = nodes
            .iter()
            .copied()
            .filter(|n| in_degree[n] == 0)
            .collect();
        ready.sort_unstable();

        let mut order = Vec::with_capacity(nodes.len());
        let mut ready_idx = 0;
        let mut queue = ready;
        while ready_idx < queue.len() {
            let node = queue[ready_idx];
            ready_idx += 1;
            order.push(ServiceId(node));
            let mut newly_ready = Vec::new();
            for (&dependent, deps) in &self.edges {
                if deps.contains(&node) {
                    let deg = in_degree.get_mut(&dependent).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dependent);
                    }
                }
            }
            newly_ready.sort_unstable();
            queue.extend(newly_ready);
        }
        order
    }

    pub fn mark_initialized(&mut self, service: ServiceId) {
        self.initialized.insert(service.0);
    }

    /// OK iff every direct dependency has already been marked initialized.
    /// Callers combine this with the registry's live state to decide
    /// RUNNING/PAUSED readiness; this module only tracks graph completion.
    pub fn check_ready(&self, service: ServiceId) -> bool {
        match self.edges.get(&service.0) {
            Some(deps) => deps.iter().all(|d| self.initialized.contains(d)),
            None => true,
        }
    }

    pub fn dependencies_of(&self, service: ServiceId) -> Vec<ServiceId> {
        self.edges
            .get(&service.0)
            .map(|v| v.iter().copied().map(ServiceId).collect())
            .unwrap_or_default()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_rejected_and_graph_unchanged() {
        let mut g = DependencyGraph::new();
        let (a, b, c) = (ServiceId(0), ServiceId(1), ServiceId(2));
        g.add(a, b).unwrap();
        g.add(b, c).unwrap();
        let before = g.edges.clone();
        assert_eq!(g.add(c, a).unwrap_err(), CoreError::CircularDependency);
        assert_eq!(g.edges, before);
    }

    #[test]
    fn init_order_respects_edges() {
        let mut g = DependencyGraph::new();
        let (a, b, c) = (ServiceId(0), ServiceId(1), ServiceId(2));
        g.add(a, b).unwrap();
        g.add(b, c).unwrap();
        let order = g.get_init_order();
        let pos = |id: ServiceId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(c) < pos(b));
        assert!(pos(b) < pos(a));
    }

    #[test]
    fn self_dependency_rejected() {
        let mut g = DependencyGraph::new();
        assert_eq!(
            g.add(ServiceId(0), ServiceId(0)).unwrap_err(),
            CoreError::CircularDependency
        );
    }
}
