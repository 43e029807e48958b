//! Minimum s-t cut via Dinic's algorithm
//!
//! Pixels are nodes `0..n`; the source (foreground terminal) and sink
//! (background terminal) are appended after them. Terminal capacities are
//! pre-saturated: the common part of a node's source and sink capacity is
//! counted as flow up front and only the remainder becomes an edge.

use std::collections::VecDeque;

const NONE: usize = usize::MAX;
const EPS: f64 = 1e-9;

/// Residual graph with paired forward/reverse edges (`e ^ 1` is the twin)
#[derive(Debug, Clone)]
pub struct FlowGraph {
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    cap: Vec<f64>,
    source: usize,
    sink: usize,
    presaturated: f64,
}

impl FlowGraph {
    /// Graph with `nodes` non-terminal nodes
    #[must_use]
    pub fn new(nodes: usize) -> Self {
        Self::with_capacity(nodes, 0)
    }

    #[must_use]
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            head: vec![NONE; nodes + 2],
            next: Vec::with_capacity(edges * 2),
            to: Vec::with_capacity(edges * 2),
            cap: Vec::with_capacity(edges * 2),
            source: nodes,
            sink: nodes + 1,
            presaturated: 0.0,
        }
    }

    fn push_arc(&mut self, from: usize, to: usize, cap: f64) {
        self.to.push(to);
        self.cap.push(cap);
        self.next.push(self.head.get(from).copied().unwrap_or(NONE));
        if let Some(h) = self.head.get_mut(from) {
            *h = self.to.len() - 1;
        }
    }

    /// Undirected-style pair of arcs `u -> v` and `v -> u`
    pub fn add_edge(&mut self, u: usize, v: usize, cap_uv: f64, cap_vu: f64) {
        self.push_arc(u, v, cap_uv.max(0.0));
        self.push_arc(v, u, cap_vu.max(0.0));
    }

    /// Terminal links of `node`: capacity from the source and to the sink
    ///
    /// Only the difference between the two matters for the cut, so negative
    /// values are accepted and shift the reported flow.
    pub fn add_terminal_weights(&mut self, node: usize, from_source: f64, to_sink: f64) {
        let common = from_source.min(to_sink);
        self.presaturated += common;
        if from_source - common > EPS {
            self.add_edge(self.source, node, from_source - common, 0.0);
        }
        if to_sink - common > EPS {
            self.add_edge(node, self.sink, to_sink - common, 0.0);
        }
    }

    fn arc(&self, e: usize) -> (usize, f64, usize) {
        (
            self.to.get(e).copied().unwrap_or(NONE),
            self.cap.get(e).copied().unwrap_or(0.0),
            self.next.get(e).copied().unwrap_or(NONE),
        )
    }

    fn adjust(&mut self, e: usize, delta: f64) {
        if let Some(c) = self.cap.get_mut(e) {
            *c -= delta;
        }
        if let Some(c) = self.cap.get_mut(e ^ 1) {
            *c += delta;
        }
    }

    /// BFS levels over residual arcs; `None` once the sink is unreachable
    fn levels(&self) -> Option<Vec<usize>> {
        let mut level = vec![NONE; self.head.len()];
        let mut queue = VecDeque::new();
        level[self.source] = 0;
        queue.push_back(self.source);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head.get(u).copied().unwrap_or(NONE);
            while e != NONE {
                let (v, cap, next) = self.arc(e);
                if cap > EPS && level.get(v).copied() == Some(NONE) {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
                e = next;
            }
        }
        (level.get(self.sink).copied().unwrap_or(NONE) != NONE).then_some(level)
    }

    /// Blocking flow on the level graph with an explicit path stack
    fn blocking_flow(&mut self, level: &[usize]) -> f64 {
        let mut current = self.head.clone();
        let mut path: Vec<usize> = Vec::new();
        let mut node = self.source;
        let mut total = 0.0;

        loop {
            if node == self.sink {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.arc(e).1)
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.adjust(e, bottleneck);
                }
                total += bottleneck;
                let first_saturated = path
                    .iter()
                    .position(|&e| self.arc(e).1 <= EPS)
                    .unwrap_or(0);
                path.truncate(first_saturated);
                node = path.last().map_or(self.source, |&e| self.arc(e).0);
                continue;
            }

            let mut advanced = false;
            while let Some(&e) = current.get(node).filter(|&&e| e != NONE) {
                let (v, cap, next) = self.arc(e);
                let next_level = level.get(node).map(|l| l + 1);
                if cap > EPS && level.get(v).copied() == next_level {
                    path.push(e);
                    node = v;
                    advanced = true;
                    break;
                }
                current[node] = next;
            }

            if !advanced {
                let Some(e) = path.pop() else {
                    break;
                };
                // dead end: drop the arc that led here
                node = self.arc(e ^ 1).0;
                if let Some(slot) = current.get_mut(node) {
                    *slot = self.arc(e).2;
                }
            }
        }
        total
    }

    /// Run to completion and return the max-flow value
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = self.presaturated;
        while let Some(level) = self.levels() {
            let pushed = self.blocking_flow(&level);
            if pushed <= EPS {
                break;
            }
            flow += pushed;
        }
        flow
    }

    /// Nodes still reachable from the source in the residual graph
    #[must_use]
    pub fn source_side(&self) -> Vec<bool> {
        let mut seen = vec![false; self.head.len()];
        let mut stack = vec![self.source];
        seen[self.source] = true;
        while let Some(u) = stack.pop() {
            let mut e = self.head.get(u).copied().unwrap_or(NONE);
            while e != NONE {
                let (v, cap, next) = self.arc(e);
                if cap > EPS && !seen.get(v).copied().unwrap_or(true) {
                    seen[v] = true;
                    stack.push(v);
                }
                e = next;
            }
        }
        seen.truncate(self.source);
        seen
    }
}
