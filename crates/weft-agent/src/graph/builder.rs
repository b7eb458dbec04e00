use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use weft_core::error::{Result, WeftError};

use super::node::Node;
use super::router::Router;
use super::state::GraphState;

/// Terminal marker. Valid as an edge target, never as a node name.
pub const END: &str = "__end__";

/// How the executor leaves a node.
pub enum Transition<S: GraphState> {
    Fixed(String),
    Branch {
        router: Arc<dyn Router<S>>,
        table: BTreeMap<String, String>,
    },
}

struct BranchSpec<S: GraphState> {
    from: String,
    router: Arc<dyn Router<S>>,
    table: Vec<(String, String)>,
}

/// Collects nodes and edges; [`build`](Self::build) validates the topology.
pub struct GraphBuilder<S: GraphState> {
    nodes: Vec<(String, Arc<dyn Node<S>>)>,
    edges: Vec<(String, String)>,
    branches: Vec<BranchSpec<S>>,
    entry: Option<String>,
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            branches: Vec::new(),
            entry: None,
        }
    }

    pub fn node(mut self, name: impl Into<String>, node: impl Node<S>) -> Self {
        self.nodes.push((name.into(), Arc::new(node)));
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Conditional edge table: `router` picks a label, the table maps it to
    /// the next node.
    pub fn branch<L, T>(
        mut self,
        from: impl Into<String>,
        router: impl Router<S>,
        table: impl IntoIterator<Item = (L, T)>,
    ) -> Self
    where
        L: Into<String>,
        T: Into<String>,
    {
        self.branches.push(BranchSpec {
            from: from.into(),
            router: Arc::new(router),
            table: table
                .into_iter()
                .map(|(l, t)| (l.into(), t.into()))
                .collect(),
        });
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate and freeze the graph. All problems are reported at once.
    pub fn build(self) -> Result<CompiledGraph<S>> {
        let mut problems = Vec::new();

        let mut names = HashSet::new();
        for (name, _) in &self.nodes {
            if name.is_empty() {
                problems.push("node name must not be empty".to_string());
            } else if name == END {
                problems.push(format!("node name '{}' is reserved", END));
            } else if !names.insert(name.as_str()) {
                problems.push(format!("duplicate node '{}'", name));
            }
        }

        let target_ok = |t: &str| t == END || names.contains(t);

        match &self.entry {
            None => problems.push("no entry node".to_string()),
            Some(e) if !names.contains(e.as_str()) => {
                problems.push(format!("entry node '{}' is not registered", e))
            }
            _ => {}
        }

        let mut outgoing: HashMap<&str, usize> = HashMap::new();
        for (from, to) in &self.edges {
            if !names.contains(from.as_str()) {
                problems.push(format!("edge source '{}' is not registered", from));
            }
            if !target_ok(to) {
                problems.push(format!("edge {} -> {}: unknown target", from, to));
            }
            *outgoing.entry(from.as_str()).or_default() += 1;
        }

        for branch in &self.branches {
            if !names.contains(branch.from.as_str()) {
                problems.push(format!("branch source '{}' is not registered", branch.from));
            }
            if branch.table.is_empty() {
                problems.push(format!("branch at '{}' has an empty table", branch.from));
            }
            let mut labels = HashSet::new();
            for (label, to) in &branch.table {
                if !labels.insert(label.as_str()) {
                    problems.push(format!(
                        "branch at '{}' maps label '{}' twice",
                        branch.from, label
                    ));
                }
                if !target_ok(to) {
                    problems.push(format!(
                        "branch at '{}': label '{}' targets unknown node '{}'",
                        branch.from, label, to
                    ));
                }
            }
            *outgoing.entry(branch.from.as_str()).or_default() += 1;
        }

        for (name, _) in &self.nodes {
            match outgoing.get(name.as_str()).copied().unwrap_or(0) {
                1 => {}
                0 => problems.push(format!("node '{}' has no outgoing edge", name)),
                n => problems.push(format!(
                    "node '{}' has {} outgoing edges; expected exactly one",
                    name, n
                )),
            }
        }

        if !problems.is_empty() {
            return Err(WeftError::GraphConfig(problems.join("; ")));
        }

        let order: Vec<String> = self.nodes.iter().map(|(n, _)| n.clone()).collect();
        let mut transitions = HashMap::new();
        for (from, to) in self.edges {
            transitions.insert(from, Transition::Fixed(to));
        }
        for branch in self.branches {
            transitions.insert(
                branch.from,
                Transition::Branch {
                    router: branch.router,
                    table: branch.table.into_iter().collect(),
                },
            );
        }

        Ok(CompiledGraph {
            nodes: self.nodes.into_iter().collect(),
            transitions,
            entry: self.entry.unwrap_or_default(),
            order,
        })
    }
}

/// A validated, immutable graph. Shareable across concurrent runs.
pub struct CompiledGraph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    transitions: HashMap<String, Transition<S>>,
    entry: String,
    order: Vec<String>,
}

impl<S: GraphState> CompiledGraph<S> {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node<S>>> {
        self.nodes.get(name)
    }

    pub fn transition(&self, name: &str) -> Option<&Transition<S>> {
        self.transitions.get(name)
    }

    /// Node names in registration order.
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    /// Every `(from, label, to)` triple; `label` is `None` for fixed edges.
    pub fn edges(&self) -> Vec<(String, Option<String>, String)> {
        let mut out = Vec::new();
        for name in &self.order {
            match self.transitions.get(name) {
                Some(Transition::Fixed(to)) => out.push((name.clone(), None, to.clone())),
                Some(Transition::Branch { table, .. }) => {
                    for (label, to) in table {
                        out.push((name.clone(), Some(label.clone()), to.clone()));
                    }
                }
                None => {}
            }
        }
        out
    }

    /// Human-readable topology, one edge per line.
    pub fn describe(&self) -> String {
        let mut out = format!("entry: {}\n", self.entry);
        for (from, label, to) in self.edges() {
            let to = if to == END { "END" } else { to.as_str() };
            match label {
                Some(l) => out.push_str(&format!("  {} --[{}]--> {}\n", from, l, to)),
                None => out.push_str(&format!("  {} --> {}\n", from, to)),
            }
        }
        out
    }

    /// Mermaid flowchart of the topology.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for (from, label, to) in self.edges() {
            let to = if to == END { "END" } else { to.as_str() };
            match label {
                Some(l) => out.push_str(&format!("    {} -->|{}| {}\n", from, l, to)),
                None => out.push_str(&format!("    {} --> {}\n", from, to)),
            }
        }
        out
    }
}
