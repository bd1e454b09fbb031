use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use statewalk_core::error::{Result, StatewalkError};
use statewalk_core::state::{FieldKind, StateSchema};
use statewalk_core::traits::{NodeAction, Router};
use statewalk_core::types::Transition;
use statewalk_core::RunConfig;

pub(crate) struct NodeSpec {
    pub action: Arc<dyn NodeAction>,
    /// Counter field this node is declared to increment, if any.
    pub increments: Option<String>,
}

pub(crate) enum Route {
    Static(Transition),
    Conditional {
        router: Arc<dyn Router>,
        targets: Vec<Transition>,
    },
}

/// An immutable, validated graph definition.
///
/// Safe to share read-only across concurrent sessions; each session carries
/// its own state record.
pub struct Graph {
    schema: StateSchema,
    nodes: HashMap<String, NodeSpec>,
    routes: HashMap<String, Route>,
    entry: String,
    config: RunConfig,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("schema", &self.schema)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("config", &self.config)
            .finish()
    }
}

impl Graph {
    pub fn builder(schema: StateSchema) -> GraphBuilder {
        GraphBuilder::new(schema)
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub(crate) fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub(crate) fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }
}

/// Builds and validates a [`Graph`].
///
/// All nodes, edges, and routers are registered up front; `build` checks
/// the full identifier set once, so nothing is resolved lazily during
/// execution.
pub struct GraphBuilder {
    schema: StateSchema,
    nodes: Vec<(String, NodeSpec)>,
    routes: Vec<(String, Route)>,
    entries: Vec<String>,
    config: RunConfig,
}

impl GraphBuilder {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            nodes: Vec::new(),
            routes: Vec::new(),
            entries: Vec::new(),
            config: RunConfig::default(),
        }
    }

    /// Register a node.
    pub fn add_node(mut self, id: impl Into<String>, action: impl NodeAction) -> Self {
        self.nodes.push((
            id.into(),
            NodeSpec {
                action: Arc::new(action),
                increments: None,
            },
        ));
        self
    }

    /// Register the node that increments `counter` by one per cycle.
    ///
    /// At most one node may be declared per counter; the merge rejects
    /// increments from any other node.
    pub fn add_incrementing_node(
        mut self,
        id: impl Into<String>,
        counter: impl Into<String>,
        action: impl NodeAction,
    ) -> Self {
        self.nodes.push((
            id.into(),
            NodeSpec {
                action: Arc::new(action),
                increments: Some(counter.into()),
            },
        ));
        self
    }

    /// Register an unconditional edge `from -> to`.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.routes
            .push((from.into(), Route::Static(Transition::to(to))));
        self
    }

    /// Register a conditional router on `from`.
    ///
    /// `targets` is the declared output set; a router returning anything
    /// outside it fails the step at run time.
    pub fn add_conditional_edges(
        mut self,
        from: impl Into<String>,
        router: impl Router,
        targets: Vec<Transition>,
    ) -> Self {
        self.routes.push((
            from.into(),
            Route::Conditional {
                router: Arc::new(router),
                targets,
            },
        ));
        self
    }

    /// Designate the entry node. Must be called exactly once.
    pub fn set_entry(mut self, id: impl Into<String>) -> Self {
        self.entries.push(id.into());
        self
    }

    /// Make `id` a finish point: its route is the end sentinel.
    pub fn set_finish(mut self, id: impl Into<String>) -> Self {
        self.routes.push((id.into(), Route::Static(Transition::End)));
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<Graph> {
        self.config.validate()?;

        let mut nodes: HashMap<String, NodeSpec> = HashMap::new();
        for (id, spec) in self.nodes {
            if nodes.insert(id.clone(), spec).is_some() {
                return Err(StatewalkError::Validation(format!(
                    "node '{}' declared twice",
                    id
                )));
            }
        }
        if nodes.is_empty() {
            return Err(StatewalkError::Validation("graph has no nodes".into()));
        }

        let entry = match self.entries.as_slice() {
            [one] => one.clone(),
            [] => {
                return Err(StatewalkError::Validation(
                    "graph has no entry point".into(),
                ))
            }
            many => {
                return Err(StatewalkError::Validation(format!(
                    "graph has {} entry points, expected exactly one",
                    many.len()
                )))
            }
        };
        if !nodes.contains_key(&entry) {
            return Err(StatewalkError::Validation(format!(
                "entry point '{}' is not a declared node",
                entry
            )));
        }

        let mut routes: HashMap<String, Route> = HashMap::new();
        for (from, route) in self.routes {
            if !nodes.contains_key(&from) {
                return Err(StatewalkError::Validation(format!(
                    "edge leaves undeclared node '{}'",
                    from
                )));
            }
            if routes.insert(from.clone(), route).is_some() {
                return Err(StatewalkError::Validation(format!(
                    "node '{}' has more than one outgoing route",
                    from
                )));
            }
        }

        for id in nodes.keys() {
            let route = routes.get(id).ok_or_else(|| {
                StatewalkError::Validation(format!(
                    "node '{}' has no outgoing edge and is not a finish point",
                    id
                ))
            })?;
            for target in route_targets(route) {
                if let Transition::To(to) = target {
                    if !nodes.contains_key(to) {
                        return Err(StatewalkError::Validation(format!(
                            "edge from '{}' targets undeclared node '{}'",
                            id, to
                        )));
                    }
                }
            }
            if let Route::Conditional { targets, .. } = route {
                if targets.is_empty() {
                    return Err(StatewalkError::Validation(format!(
                        "conditional router on '{}' declares no targets",
                        id
                    )));
                }
            }
        }

        // Increment declarations: field must be a schema counter, with at
        // most one incrementing node per counter.
        let mut incrementers: HashMap<&str, &str> = HashMap::new();
        for (id, spec) in &nodes {
            if let Some(counter) = &spec.increments {
                match self.schema.spec(counter).map(|s| s.kind) {
                    Some(FieldKind::Counter) => {}
                    Some(kind) => {
                        return Err(StatewalkError::Validation(format!(
                            "node '{}' increments '{}', which is declared as {:?}, not a counter",
                            id, counter, kind
                        )))
                    }
                    None => {
                        return Err(StatewalkError::Validation(format!(
                            "node '{}' increments undeclared field '{}'",
                            id, counter
                        )))
                    }
                }
                if let Some(other) = incrementers.insert(counter, id) {
                    return Err(StatewalkError::Validation(format!(
                        "counter '{}' has two incrementing nodes: '{}' and '{}'",
                        counter, other, id
                    )));
                }
            }
        }

        // Reachability from the entry over all declared targets.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(entry.as_str());
        queue.push_back(entry.as_str());
        while let Some(id) = queue.pop_front() {
            if let Some(route) = routes.get(id) {
                for target in route_targets(route) {
                    if let Transition::To(to) = target {
                        if seen.insert(to.as_str()) {
                            queue.push_back(to.as_str());
                        }
                    }
                }
            }
        }
        for id in nodes.keys() {
            if !seen.contains(id.as_str()) {
                return Err(StatewalkError::Validation(format!(
                    "node '{}' is unreachable from entry '{}'",
                    id, entry
                )));
            }
        }

        Ok(Graph {
            schema: self.schema,
            nodes,
            routes,
            entry,
            config: self.config,
        })
    }
}

fn route_targets(route: &Route) -> Vec<&Transition> {
    match route {
        Route::Static(t) => vec![t],
        Route::Conditional { targets, .. } => targets.iter().collect(),
    }
}
