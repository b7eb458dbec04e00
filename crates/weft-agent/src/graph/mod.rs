//! Cyclic workflow graph engine.
//!
//! A workflow is a set of named [`Node`]s over a shared [`GraphState`]. Each
//! node returns a partial update that the [`Executor`] merges using the
//! field's fixed policy ([`Replace`] or [`Append`]). A node leaves either by
//! one unconditional edge or through a [`Router`] and its label table; cycles
//! are allowed and bounded by [`Gate`] retry ceilings and the executor's
//! global step ceiling.

pub mod builder;
pub mod executor;
pub mod node;
pub mod router;
pub mod state;

pub use builder::{CompiledGraph, GraphBuilder, Transition, END};
pub use executor::{Executor, RunFailure, RunOutcome, StepRecord};
pub use node::{from_fn, FnNode, Node, NodeContext};
pub use router::{router_fn, Decision, FnRouter, Gate, Router};
pub use state::{merge, Append, GraphState, Replace};
