use super::state::GraphState;

/// Outcome of a routing predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub label: String,
    /// True when a retry budget ran out and the pass label was forced.
    pub exhausted: bool,
}

impl Decision {
    pub fn to(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            exhausted: false,
        }
    }

    pub fn exhausted(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            exhausted: true,
        }
    }
}

/// A pure predicate consulted at a branch point.
pub trait Router<S: GraphState>: Send + Sync + 'static {
    fn route(&self, state: &S) -> Decision;
}

/// Adapter turning a closure into a [`Router`].
pub struct FnRouter<F>(F);

pub fn router_fn<F>(f: F) -> FnRouter<F> {
    FnRouter(f)
}

impl<S, F> Router<S> for FnRouter<F>
where
    S: GraphState,
    F: Fn(&S) -> Decision + Send + Sync + 'static,
{
    fn route(&self, state: &S) -> Decision {
        (self.0)(state)
    }
}

type Predicate<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;
type CounterFn<S> = Box<dyn Fn(&S) -> u32 + Send + Sync>;

/// Bounded retry gate.
///
/// Routes to `pass` when the condition holds, or when the retries already
/// taken reach `max_revisions`; otherwise routes to `retry`. The revision
/// counter is bumped by the gate's node on every rejection, so the first
/// rejection is not a retry: `retries_taken = counter - 1`. A gate therefore
/// runs at most `max_revisions + 1` times per run.
pub struct Gate<S> {
    name: String,
    satisfied: Predicate<S>,
    revisions: CounterFn<S>,
    max_revisions: u32,
    pass: String,
    retry: String,
}

impl<S: GraphState> Gate<S> {
    pub fn new(
        name: impl Into<String>,
        satisfied: impl Fn(&S) -> bool + Send + Sync + 'static,
        revisions: impl Fn(&S) -> u32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            satisfied: Box::new(satisfied),
            revisions: Box::new(revisions),
            max_revisions: 0,
            pass: "pass".into(),
            retry: "retry".into(),
        }
    }

    pub fn with_max_revisions(mut self, max: u32) -> Self {
        self.max_revisions = max;
        self
    }

    pub fn with_labels(mut self, pass: impl Into<String>, retry: impl Into<String>) -> Self {
        self.pass = pass.into();
        self.retry = retry.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_revisions(&self) -> u32 {
        self.max_revisions
    }

    pub fn pass_label(&self) -> &str {
        &self.pass
    }

    pub fn retry_label(&self) -> &str {
        &self.retry
    }
}

impl<S: GraphState> Router<S> for Gate<S> {
    fn route(&self, state: &S) -> Decision {
        if (self.satisfied)(state) {
            return Decision::to(&self.pass);
        }
        let retries_taken = (self.revisions)(state).saturating_sub(1);
        if retries_taken >= self.max_revisions {
            tracing::warn!(
                gate = %self.name,
                retries_taken,
                max_revisions = self.max_revisions,
                "Retry budget exhausted, forcing pass"
            );
            return Decision::exhausted(&self.pass);
        }
        Decision::to(&self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::tests::Counter;

    fn gate(max: u32, satisfied: bool) -> Gate<Counter> {
        Gate::new(
            "test",
            move |_: &Counter| satisfied,
            |s: &Counter| s.value as u32,
        )
        .with_max_revisions(max)
        .with_labels("next", "again")
    }

    fn at(value: i64) -> Counter {
        Counter {
            value,
            ..Default::default()
        }
    }

    #[test]
    fn test_satisfied_passes_regardless_of_counter() {
        assert_eq!(gate(2, true).route(&at(0)), Decision::to("next"));
        assert_eq!(gate(0, true).route(&at(7)), Decision::to("next"));
    }

    #[test]
    fn test_retries_until_ceiling_then_forced_pass() {
        let g = gate(2, false);
        assert_eq!(g.route(&at(1)), Decision::to("again"));
        assert_eq!(g.route(&at(2)), Decision::to("again"));
        assert_eq!(g.route(&at(3)), Decision::exhausted("next"));
    }

    #[test]
    fn test_zero_ceiling_never_retries() {
        assert_eq!(gate(0, false).route(&at(1)), Decision::exhausted("next"));
    }

    #[test]
    fn test_fn_router() {
        let r = router_fn(|s: &Counter| {
            if s.value > 0 {
                Decision::to("pos")
            } else {
                Decision::to("neg")
            }
        });
        assert_eq!(r.route(&at(3)).label, "pos");
        assert_eq!(r.route(&at(-1)).label, "neg");
    }
}
