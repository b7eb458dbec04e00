pub mod dataset;
pub mod evals;
pub mod graph;
pub mod pipeline;
pub mod react;
pub mod run_log;

pub use dataset::{check_expected_output, Check, ReactCase, ResearchItem};
pub use evals::{EvalSuite, Judge, RunMeasurements};
pub use graph::{CompiledGraph, Executor, GraphBuilder, GraphState, Node, Router, RunFailure, RunOutcome, END};
pub use pipeline::{PipelineDeps, ReportPipeline, ReportState};
pub use react::{judge_answer, ReactAgent, ReactOutcome};
pub use run_log::RunLogger;
