use std::fmt::Debug;

/// A record threaded through every node of a run.
///
/// Each field's merge policy is fixed by the type of the matching field in
/// `Update`: [`Replace`] for last-write-wins, [`Append`] for ordered
/// accumulation. Fields left at their default in an update are untouched.
pub trait GraphState: Clone + Debug + Send + Sync + 'static {
    /// The partial state a node returns.
    type Update: Default + Debug + Send + 'static;

    /// Fold `update` into `self`, field by field.
    fn merge(&mut self, update: Self::Update);

    /// The append-only execution trace.
    fn trace(&self) -> &[String];
}

/// Apply `update` to `current` and return the merged state.
pub fn merge<S: GraphState>(mut current: S, update: S::Update) -> S {
    current.merge(update);
    current
}

/// Last-write-wins field update. `Replace::keep()` leaves the field alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Replace<T>(Option<T>);

impl<T> Replace<T> {
    pub fn set(value: T) -> Self {
        Self(Some(value))
    }

    pub fn keep() -> Self {
        Self(None)
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn apply(self, target: &mut T) {
        if let Some(value) = self.0 {
            *target = value;
        }
    }
}

impl<T> Default for Replace<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> From<T> for Replace<T> {
    fn from(value: T) -> Self {
        Self::set(value)
    }
}

/// Ordered accumulation. Entries are appended as given, never reordered or
/// de-duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct Append<T>(Vec<T>);

impl<T> Append<T> {
    pub fn one(value: T) -> Self {
        Self(vec![value])
    }

    pub fn many(values: Vec<T>) -> Self {
        Self(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.0
    }

    pub fn apply(self, target: &mut Vec<T>) {
        target.extend(self.0);
    }
}

impl<T> Default for Append<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal state used by the engine tests.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Counter {
        pub value: i64,
        pub label: String,
        pub trace: Vec<String>,
    }

    #[derive(Debug, Default)]
    pub struct CounterUpdate {
        pub value: Replace<i64>,
        pub label: Replace<String>,
        pub trace: Append<String>,
    }

    impl GraphState for Counter {
        type Update = CounterUpdate;

        fn merge(&mut self, update: CounterUpdate) {
            update.value.apply(&mut self.value);
            update.label.apply(&mut self.label);
            update.trace.apply(&mut self.trace);
        }

        fn trace(&self) -> &[String] {
            &self.trace
        }
    }

    #[test]
    fn test_absent_fields_are_untouched() {
        let start = Counter {
            value: 3,
            label: "a".into(),
            trace: vec!["x".into()],
        };
        let merged = merge(
            start.clone(),
            CounterUpdate {
                label: "b".to_string().into(),
                ..Default::default()
            },
        );
        assert_eq!(merged.value, 3);
        assert_eq!(merged.label, "b");
        assert_eq!(merged.trace, start.trace);
    }

    #[test]
    fn test_append_preserves_order_and_duplicates() {
        let start = Counter {
            trace: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let merged = merge(
            start,
            CounterUpdate {
                trace: Append::many(vec!["b".into(), "a".into()]),
                ..Default::default()
            },
        );
        assert_eq!(merged.trace, vec!["a", "b", "b", "a"]);
    }

    #[test]
    fn test_empty_update_is_identity() {
        let start = Counter {
            value: 9,
            label: "z".into(),
            trace: vec!["n".into()],
        };
        assert_eq!(merge(start.clone(), CounterUpdate::default()), start);
    }

    #[test]
    fn test_replace_accessors() {
        let r: Replace<u32> = 4.into();
        assert!(r.is_set());
        assert_eq!(r.get(), Some(&4));
        assert!(!Replace::<u32>::keep().is_set());
    }
}
