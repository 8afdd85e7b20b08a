//! Dependency graph cleanup.
//!
//! The graph maps a consumer class to the provider classes it depends on.
//! [`DependencyGraph::sanitize`] turns a raw, possibly cyclic graph into a
//! view rooted at one class with no self-loops, no unreachable nodes, and
//! strongly connected components folded together.

use crate::store::RuleRepository;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::info;

/// Node -> neighbour set.
pub type Adjacency = BTreeMap<String, BTreeSet<String>>;

/// Consumer -> providers adjacency with deterministic iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: Adjacency,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crawl `dependency` lists breadth-first starting at `start`.
    ///
    /// Classes without a record become nodes with no providers.
    pub fn from_repository(repo: &dyn RuleRepository, start: &str, languages: &[String]) -> Self {
        let mut graph = Self::new();
        let mut queue = VecDeque::from([start.to_string()]);

        while let Some(node) = queue.pop_front() {
            if graph.edges.contains_key(&node) {
                continue;
            }
            let deps = repo
                .load_preferring(&node, languages)
                .map(|rule| rule.dependencies())
                .unwrap_or_default();
            for dep in &deps {
                if !graph.edges.contains_key(dep) {
                    queue.push_back(dep.clone());
                }
            }
            graph.edges.insert(node, deps.into_iter().collect());
        }

        graph
    }

    pub fn add_edge(&mut self, consumer: &str, provider: &str) {
        self.edges
            .entry(consumer.to_string())
            .or_default()
            .insert(provider.to_string());
        self.edges.entry(provider.to_string()).or_default();
    }

    pub fn providers(&self, node: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Provider -> consumers view of this graph.
    pub fn reversed(&self) -> Adjacency {
        let mut rev = Adjacency::new();
        for (consumer, providers) in &self.edges {
            for provider in providers {
                rev.entry(provider.clone()).or_default().insert(consumer.clone());
            }
        }
        rev
    }

    /// Produce the cleaned view of the graph rooted at `start`.
    ///
    /// `reverse` is a provider -> consumers map from another source. When
    /// `start` has no providers, reverse neighbours that do not themselves
    /// depend on `start` are adopted as its providers.
    pub fn sanitize(&self, start: &str, reverse: Option<&Adjacency>) -> DependencyGraph {
        let mut g = self.edges.clone();
        g.entry(start.to_string()).or_default();

        if let Some(reverse) = reverse {
            self.recover_providers(&mut g, start, reverse);
        }

        let dangling: Vec<String> = g
            .values()
            .flatten()
            .filter(|d| !g.contains_key(*d))
            .cloned()
            .collect();
        for node in dangling {
            g.entry(node).or_default();
        }
        for (node, deps) in g.iter_mut() {
            deps.remove(node);
        }

        let reachable = reachable_from(&g, start);
        g.retain(|node, _| reachable.contains(node));
        for deps in g.values_mut() {
            deps.retain(|d| reachable.contains(d));
        }

        let sccs = tarjan(&g);
        let collapsed: Vec<&BTreeSet<String>> = sccs.iter().filter(|c| c.len() > 1).collect();
        if collapsed.is_empty() {
            return DependencyGraph { edges: g };
        }
        for comp in &collapsed {
            info!(start, members = ?comp, "Collapsing strongly connected component");
        }

        // BTreeSet iterates sorted, so the first member is the representative.
        let mut rep: HashMap<&str, &str> = HashMap::new();
        for comp in &sccs {
            if let Some(first) = comp.first() {
                for member in comp {
                    rep.insert(member.as_str(), first.as_str());
                }
            }
        }

        let mut out_by_rep: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for (node, deps) in &g {
            let r_node = rep[node.as_str()];
            let out = out_by_rep.entry(r_node).or_default();
            for dep in deps {
                let r_dep = rep[dep.as_str()];
                if r_dep != r_node {
                    out.insert(r_dep);
                }
            }
        }

        let members_by_rep: HashMap<&str, &BTreeSet<String>> = sccs
            .iter()
            .filter_map(|comp| comp.first().map(|first| (first.as_str(), comp)))
            .collect();

        let mut expanded = Adjacency::new();
        for comp in &sccs {
            let Some(first) = comp.first() else { continue };
            let deps: BTreeSet<String> = out_by_rep
                .get(first.as_str())
                .into_iter()
                .flatten()
                .flat_map(|r| members_by_rep.get(r).into_iter().flat_map(|m| m.iter().cloned()))
                .collect();
            for member in comp {
                expanded.insert(member.clone(), deps.clone());
            }
        }

        DependencyGraph { edges: expanded }
    }

    fn recover_providers(&self, g: &mut Adjacency, start: &str, reverse: &Adjacency) {
        if g.get(start).is_some_and(|deps| !deps.is_empty()) {
            return;
        }
        let recovered: BTreeSet<String> = reverse
            .get(start)
            .into_iter()
            .flatten()
            .filter(|cand| !self.edges.get(*cand).is_some_and(|deps| deps.contains(start)))
            .cloned()
            .collect();
        if !recovered.is_empty() {
            info!(start, recovered = ?recovered, "Recovered potential providers");
            g.entry(start.to_string()).or_default().extend(recovered);
        }
    }

    /// One `consumer -> a, b` line per node.
    pub fn render(&self) -> String {
        self.edges
            .iter()
            .map(|(node, deps)| {
                if deps.is_empty() {
                    format!("{node} -> (none)")
                } else {
                    let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                    format!("{node} -> {}", deps.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn reachable_from(g: &Adjacency, start: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![start.to_string()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.clone()) {
            continue;
        }
        if let Some(deps) = g.get(&node) {
            stack.extend(deps.iter().cloned());
        }
    }
    seen
}

/// Tarjan's strongly connected components.
fn tarjan(g: &Adjacency) -> Vec<BTreeSet<String>> {
    struct State<'a> {
        g: &'a Adjacency,
        counter: usize,
        index: HashMap<&'a str, usize>,
        low: HashMap<&'a str, usize>,
        stack: Vec<&'a str>,
        on_stack: BTreeSet<&'a str>,
        sccs: Vec<BTreeSet<String>>,
    }

    impl<'a> State<'a> {
        fn visit(&mut self, v: &'a str) {
            self.index.insert(v, self.counter);
            self.low.insert(v, self.counter);
            self.counter += 1;
            self.stack.push(v);
            self.on_stack.insert(v);

            let g = self.g;
            if let Some(deps) = g.get(v) {
                for w in deps {
                    let w = w.as_str();
                    if !self.index.contains_key(w) {
                        self.visit(w);
                        let low = self.low[v].min(self.low[w]);
                        self.low.insert(v, low);
                    } else if self.on_stack.contains(w) {
                        let low = self.low[v].min(self.index[w]);
                        self.low.insert(v, low);
                    }
                }
            }

            if self.low[v] == self.index[v] {
                let mut comp = BTreeSet::new();
                while let Some(x) = self.stack.pop() {
                    self.on_stack.remove(x);
                    comp.insert(x.to_string());
                    if x == v {
                        break;
                    }
                }
                self.sccs.push(comp);
            }
        }
    }

    let mut state = State {
        g,
        counter: 0,
        index: HashMap::new(),
        low: HashMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        sccs: Vec::new(),
    };
    for node in g.keys() {
        if !state.index.contains_key(node.as_str()) {
            state.visit(node.as_str());
        }
    }
    state.sccs
}
