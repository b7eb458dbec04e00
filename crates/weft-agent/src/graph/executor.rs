use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use weft_core::error::WeftError;
use weft_core::event::EventBus;
use weft_core::types::{RunEvent, RunId};

use super::builder::{CompiledGraph, Transition, END};
use super::node::NodeContext;
use super::state::GraphState;

/// One executed node and how the walk left it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub node: String,
    /// Router label, or `None` for an unconditional edge.
    pub label: Option<String>,
    pub next: String,
    /// The router forced its pass label after running out of retries.
    pub exhausted: bool,
    pub elapsed_ms: u64,
}

/// A walk that reached the terminal marker.
#[derive(Debug, Clone)]
pub struct RunOutcome<S> {
    pub run_id: RunId,
    pub state: S,
    pub steps: Vec<StepRecord>,
    pub elapsed_ms: u64,
}

/// A halted walk: the error plus everything accumulated before it.
#[derive(Debug)]
pub struct RunFailure<S> {
    pub run_id: RunId,
    pub state: S,
    pub steps: Vec<StepRecord>,
    pub error: WeftError,
}

impl<S> std::fmt::Display for RunFailure<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {} halted after {} steps: {}",
            self.run_id,
            self.steps.len(),
            self.error
        )
    }
}

impl<S: std::fmt::Debug> std::error::Error for RunFailure<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Walks a [`CompiledGraph`] from its entry node until [`END`].
pub struct Executor<S: GraphState> {
    graph: Arc<CompiledGraph<S>>,
    max_steps: usize,
    events: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

impl<S: GraphState> Executor<S> {
    pub fn new(graph: Arc<CompiledGraph<S>>, max_steps: usize) -> Self {
        Self {
            graph,
            max_steps,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn graph(&self) -> &CompiledGraph<S> {
        &self.graph
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    pub async fn run(&self, initial: S) -> Result<RunOutcome<S>, RunFailure<S>> {
        self.run_with_id(RunId::new(), initial).await
    }

    pub async fn run_with_id(
        &self,
        run_id: RunId,
        initial: S,
    ) -> Result<RunOutcome<S>, RunFailure<S>> {
        let started = Instant::now();
        let mut state = initial;
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut current = self.graph.entry().to_string();

        info!(run_id = %run_id, entry = %current, max_steps = self.max_steps, "Starting graph run");
        self.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            entry: current.clone(),
        });

        loop {
            let step = steps.len();
            if step >= self.max_steps {
                warn!(run_id = %run_id, max_steps = self.max_steps, "Step ceiling reached");
                return Err(self.fail(run_id, state, steps, WeftError::StepCeilingExceeded(self.max_steps)));
            }
            if self.cancel.is_cancelled() {
                return Err(self.fail(run_id, state, steps, WeftError::Cancelled));
            }

            let Some(node) = self.graph.node(&current).cloned() else {
                let err = WeftError::GraphConfig(format!("node '{}' is not registered", current));
                return Err(self.fail(run_id, state, steps, err));
            };

            info!(run_id = %run_id, node = %current, step, "Executing graph node");
            self.emit(RunEvent::NodeStarted {
                run_id: run_id.clone(),
                node: current.clone(),
                step,
            });

            let ctx = NodeContext {
                run_id: run_id.clone(),
                step,
                cancel: self.cancel.clone(),
            };
            let node_started = Instant::now();
            let result = tokio::select! {
                r = node.run(&state, &ctx) => r,
                _ = self.cancel.cancelled() => Err(WeftError::Cancelled),
            };
            let elapsed_ms = node_started.elapsed().as_millis() as u64;

            let update = match result {
                Ok(update) => update,
                Err(WeftError::Cancelled) => {
                    return Err(self.fail(run_id, state, steps, WeftError::Cancelled));
                }
                Err(e) => {
                    error!(run_id = %run_id, node = %current, error = %e, "Graph node failed");
                    self.emit(RunEvent::NodeFailed {
                        run_id: run_id.clone(),
                        node: current.clone(),
                        error: e.to_string(),
                    });
                    let err = WeftError::NodeFailed {
                        node: current,
                        source: Box::new(e),
                    };
                    return Err(self.fail(run_id, state, steps, err));
                }
            };

            let trace_before = state.trace().len();
            state.merge(update);
            let appended = state.trace().get(trace_before..).unwrap_or_default().to_vec();
            self.emit(RunEvent::NodeCompleted {
                run_id: run_id.clone(),
                node: current.clone(),
                step,
                trace: appended,
                elapsed_ms,
            });

            let (label, next, exhausted) = match self.graph.transition(&current) {
                Some(Transition::Fixed(to)) => (None, to.clone(), false),
                Some(Transition::Branch { router, table }) => {
                    let decision = router.route(&state);
                    let Some(to) = table.get(&decision.label) else {
                        let err = WeftError::UnknownRoute {
                            node: current,
                            label: decision.label,
                        };
                        return Err(self.fail(run_id, state, steps, err));
                    };
                    info!(
                        run_id = %run_id,
                        node = %current,
                        label = %decision.label,
                        target = %to,
                        exhausted = decision.exhausted,
                        "Route chosen"
                    );
                    self.emit(RunEvent::RouteChosen {
                        run_id: run_id.clone(),
                        node: current.clone(),
                        label: decision.label.clone(),
                        target: to.clone(),
                        exhausted: decision.exhausted,
                    });
                    (Some(decision.label), to.clone(), decision.exhausted)
                }
                None => {
                    let err = WeftError::GraphConfig(format!("node '{}' has no transition", current));
                    return Err(self.fail(run_id, state, steps, err));
                }
            };

            steps.push(StepRecord {
                step,
                node: current,
                label,
                next: next.clone(),
                exhausted,
                elapsed_ms,
            });

            if next == END {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(run_id = %run_id, steps = steps.len(), elapsed_ms, "Graph run complete");
                self.emit(RunEvent::RunComplete {
                    run_id: run_id.clone(),
                    steps: steps.len(),
                    elapsed_ms,
                });
                return Ok(RunOutcome {
                    run_id,
                    state,
                    steps,
                    elapsed_ms,
                });
            }
            current = next;
        }
    }

    fn fail(&self, run_id: RunId, state: S, steps: Vec<StepRecord>, error: WeftError) -> RunFailure<S> {
        self.emit(RunEvent::RunError {
            run_id: run_id.clone(),
            error: error.to_string(),
        });
        RunFailure {
            run_id,
            state,
            steps,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::node::{from_fn, Node};
    use crate::graph::router::{router_fn, Decision, Gate};
    use crate::graph::state::tests::{Counter, CounterUpdate};
    use crate::graph::state::Append;

    fn tracer(name: &'static str) -> impl Node<Counter> {
        from_fn(move |_: &Counter| {
            Ok(CounterUpdate {
                trace: Append::one(name.to_string()),
                ..Default::default()
            })
        })
    }

    #[tokio::test]
    async fn test_linear_walk() {
        let graph = GraphBuilder::new()
            .node("A", tracer("A"))
            .node("B", tracer("B"))
            .node("C", tracer("C"))
            .edge("A", "B")
            .edge("B", "C")
            .edge("C", END)
            .entry("A")
            .build()
            .unwrap();
        let outcome = Executor::new(Arc::new(graph), 10)
            .run(Counter::default())
            .await
            .unwrap();
        assert_eq!(outcome.state.trace, vec!["A", "B", "C"]);
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.steps[2].next, END);
        assert!(outcome.steps.iter().all(|s| s.label.is_none()));
    }

    /// reviewer always rejects; its counter goes up by one each time.
    fn rejecting_loop(max_revisions: u32) -> CompiledGraph<Counter> {
        let reviewer = from_fn(|s: &Counter| {
            let next = s.value + 1;
            Ok(CounterUpdate {
                value: next.into(),
                trace: Append::one(format!("reviewer_pass_{}_rejected", next)),
                ..Default::default()
            })
        });
        let downstream = from_fn(|s: &Counter| {
            Ok(CounterUpdate {
                label: format!("saw {}", s.value).into(),
                trace: Append::one("downstream".to_string()),
                ..Default::default()
            })
        });
        GraphBuilder::new()
            .node("writer", tracer("writer"))
            .node("reviewer", reviewer)
            .node("downstream", downstream)
            .edge("writer", "reviewer")
            .branch(
                "reviewer",
                Gate::new("review", |_: &Counter| false, |s: &Counter| s.value as u32)
                    .with_max_revisions(max_revisions)
                    .with_labels("downstream", "writer"),
                [("downstream", "downstream"), ("writer", "writer")],
            )
            .edge("downstream", END)
            .entry("writer")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exhausted_gate_forces_pass() {
        let outcome = Executor::new(Arc::new(rejecting_loop(2)), 50)
            .run(Counter::default())
            .await
            .unwrap();
        let state = &outcome.state;
        let rejected = state.trace.iter().filter(|t| t.ends_with("_rejected")).count();
        assert_eq!(rejected, 3);
        assert_eq!(state.value, 3);
        assert_eq!(state.label, "saw 3");
        assert_eq!(state.trace.last().map(String::as_str), Some("downstream"));
        assert!(!state.trace.iter().any(|t| t.ends_with("_approved")));

        let exits: Vec<_> = outcome.steps.iter().filter(|s| s.node == "reviewer").collect();
        assert_eq!(exits.len(), 3);
        assert!(exits[..2].iter().all(|s| !s.exhausted && s.next == "writer"));
        assert!(exits[2].exhausted);
        assert_eq!(exits[2].next, "downstream");
    }

    #[tokio::test]
    async fn test_first_time_approval() {
        let reviewer = from_fn(|_: &Counter| {
            Ok(CounterUpdate {
                label: "approved".to_string().into(),
                trace: Append::one("reviewer_approved".to_string()),
                ..Default::default()
            })
        });
        let graph = GraphBuilder::new()
            .node("writer", tracer("writer"))
            .node("reviewer", reviewer)
            .edge("writer", "reviewer")
            .branch(
                "reviewer",
                Gate::new("review", |s: &Counter| s.label == "approved", |s: &Counter| s.value as u32)
                    .with_max_revisions(2)
                    .with_labels("done", "writer"),
                [("done", END), ("writer", "writer")],
            )
            .entry("writer")
            .build()
            .unwrap();
        let outcome = Executor::new(Arc::new(graph), 50)
            .run(Counter::default())
            .await
            .unwrap();
        assert_eq!(outcome.state.trace, vec!["writer", "reviewer_approved"]);
        assert_eq!(outcome.state.value, 0);
    }

    #[tokio::test]
    async fn test_step_ceiling_halts_unbounded_loop() {
        let graph = GraphBuilder::new()
            .node("spin", tracer("spin"))
            .branch("spin", router_fn(|_: &Counter| Decision::to("again")), [("again", "spin")])
            .entry("spin")
            .build()
            .unwrap();
        let failure = Executor::new(Arc::new(graph), 4)
            .run(Counter::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, WeftError::StepCeilingExceeded(4)));
        assert_eq!(failure.state.trace.len(), 4);
        assert_eq!(failure.steps.len(), 4);
    }

    #[tokio::test]
    async fn test_ceiling_equal_to_path_length_succeeds() {
        let graph = GraphBuilder::new()
            .node("A", tracer("A"))
            .node("B", tracer("B"))
            .edge("A", "B")
            .edge("B", END)
            .entry("A")
            .build()
            .unwrap();
        assert!(Executor::new(Arc::new(graph), 2).run(Counter::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_node_error_halts_with_prior_state() {
        let failing = from_fn(|_: &Counter| Err(WeftError::LlmRequest("HTTP 500: boom".into())));
        let setter = from_fn(|_: &Counter| {
            Ok(CounterUpdate {
                value: 7.into(),
                trace: Append::one("setter".to_string()),
                ..Default::default()
            })
        });
        let graph = GraphBuilder::new()
            .node("setter", setter)
            .node("caller", failing)
            .node("after", tracer("after"))
            .edge("setter", "caller")
            .edge("caller", "after")
            .edge("after", END)
            .entry("setter")
            .build()
            .unwrap();

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let failure = Executor::new(Arc::new(graph), 10)
            .with_events(bus)
            .run(Counter::default())
            .await
            .unwrap_err();

        assert_eq!(failure.state.value, 7);
        assert_eq!(failure.state.label, "");
        assert_eq!(failure.state.trace, vec!["setter"]);
        assert_eq!(failure.steps.len(), 1);
        match &failure.error {
            WeftError::NodeFailed { node, source } => {
                assert_eq!(node, "caller");
                assert!(matches!(**source, WeftError::LlmRequest(_)));
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut saw_failed = false;
        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::NodeFailed { node, .. } => saw_failed = node == "caller",
                RunEvent::RunError { .. } => saw_error = true,
                RunEvent::RunComplete { .. } => panic!("halted run must not complete"),
                _ => {}
            }
        }
        assert!(saw_failed && saw_error);
    }

    #[tokio::test]
    async fn test_unknown_route_label() {
        let graph = GraphBuilder::new()
            .node("a", tracer("a"))
            .branch("a", router_fn(|_: &Counter| Decision::to("nope")), [("yes", END)])
            .entry("a")
            .build()
            .unwrap();
        let failure = Executor::new(Arc::new(graph), 10)
            .run(Counter::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, WeftError::UnknownRoute { ref label, .. } if label == "nope"));
        assert_eq!(failure.state.trace, vec!["a"]);
    }

    struct Hang(Arc<AtomicUsize>);

    impl Node<Counter> for Hang {
        fn run<'a>(
            &'a self,
            _state: &'a Counter,
            _ctx: &'a NodeContext,
        ) -> BoxFuture<'a, weft_core::Result<CounterUpdate>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_node() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = GraphBuilder::new()
            .node("hang", Hang(calls.clone()))
            .edge("hang", END)
            .entry("hang")
            .build()
            .unwrap();
        let token = CancellationToken::new();
        let executor = Executor::new(Arc::new(graph), 10).with_cancel(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });
        let failure = executor.run(Counter::default()).await.unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(failure.error, WeftError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(failure.steps.is_empty());
    }

    #[tokio::test]
    async fn test_events_report_trace_and_routes() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let outcome = Executor::new(Arc::new(rejecting_loop(0)), 10)
            .with_events(bus)
            .run_with_id(RunId::from_str("r-1"), Counter::default())
            .await
            .unwrap();
        assert_eq!(outcome.run_id.to_string(), "r-1");

        let mut routes = Vec::new();
        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id().to_string(), "r-1");
            match event {
                RunEvent::RouteChosen { label, exhausted, .. } => routes.push((label, exhausted)),
                RunEvent::NodeCompleted { trace, .. } => completed.extend(trace),
                _ => {}
            }
        }
        assert_eq!(routes, vec![("downstream".to_string(), true)]);
        assert_eq!(completed, outcome.state.trace);
    }
}
