use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use weft_core::error::Result;
use weft_core::types::RunId;

use super::deps::PipelineDeps;
use super::gates::{compliance_gate, fact_check_gate, quality_gate};
use super::nodes::*;
use super::state::ReportState;
use crate::graph::{CompiledGraph, Executor, GraphBuilder, RunFailure, RunOutcome, END};

/// Wire the eleven nodes and three gates.
///
/// ```text
/// researcher → analyst → data_enricher → writer → fact_checker
/// fact_checker ─[writer]→ writer | ─[editor]→ editor
/// editor → seo_optimizer → compliance_reviewer
/// compliance_reviewer ─[editor]→ editor | ─[exec_summarizer]→ exec_summarizer
/// exec_summarizer → translator → quality_gate
/// quality_gate ─[editor]→ editor | ─[end]→ END
/// ```
pub fn build_report_graph(deps: Arc<PipelineDeps>) -> Result<CompiledGraph<ReportState>> {
    let limits = deps.limits.clone();
    GraphBuilder::new()
        .node("researcher", Researcher(deps.clone()))
        .node("analyst", Analyst(deps.clone()))
        .node("data_enricher", DataEnricher(deps.clone()))
        .node("writer", Writer(deps.clone()))
        .node("fact_checker", FactChecker(deps.clone()))
        .node("editor", Editor(deps.clone()))
        .node("seo_optimizer", SeoOptimizer(deps.clone()))
        .node("compliance_reviewer", ComplianceReviewer(deps.clone()))
        .node("exec_summarizer", ExecSummarizer(deps.clone()))
        .node("translator", Translator(deps.clone()))
        .node("quality_gate", QualityGate(deps))
        .entry("researcher")
        .edge("researcher", "analyst")
        .edge("analyst", "data_enricher")
        .edge("data_enricher", "writer")
        .edge("writer", "fact_checker")
        .branch(
            "fact_checker",
            fact_check_gate(limits.fact_check_max_revisions),
            [("writer", "writer"), ("editor", "editor")],
        )
        .edge("editor", "seo_optimizer")
        .edge("seo_optimizer", "compliance_reviewer")
        .branch(
            "compliance_reviewer",
            compliance_gate(limits.compliance_max_revisions),
            [("editor", "editor"), ("exec_summarizer", "exec_summarizer")],
        )
        .edge("exec_summarizer", "translator")
        .edge("translator", "quality_gate")
        .branch(
            "quality_gate",
            quality_gate(limits.quality_max_revisions, limits.quality_threshold),
            [("editor", "editor"), ("end", END)],
        )
        .build()
}

/// The research-report workflow, ready to run.
pub struct ReportPipeline {
    deps: Arc<PipelineDeps>,
    executor: Executor<ReportState>,
}

impl ReportPipeline {
    pub fn new(deps: PipelineDeps) -> Result<Self> {
        let deps = Arc::new(deps);
        let graph = Arc::new(build_report_graph(deps.clone())?);
        let mut executor = Executor::new(graph, deps.limits.max_steps);
        if let Some(events) = &deps.events {
            executor = executor.with_events(events.clone());
        }
        Ok(Self { deps, executor })
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancel(cancel);
        self
    }

    pub fn deps(&self) -> &Arc<PipelineDeps> {
        &self.deps
    }

    pub fn graph(&self) -> &CompiledGraph<ReportState> {
        self.executor.graph()
    }

    pub async fn run(
        &self,
        task: &str,
        topic_label: &str,
    ) -> std::result::Result<RunOutcome<ReportState>, RunFailure<ReportState>> {
        self.run_with_id(RunId::new(), task, topic_label).await
    }

    pub async fn run_with_id(
        &self,
        run_id: RunId,
        task: &str,
        topic_label: &str,
    ) -> std::result::Result<RunOutcome<ReportState>, RunFailure<ReportState>> {
        self.executor
            .run_with_id(run_id, ReportState::new(task, topic_label))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use weft_core::config::{ModelConfig, PipelineConfig};
    use weft_core::error::WeftError;
    use weft_core::types::{ChatMessage, ModelOutcome, ToolCall};
    use weft_test_utils::MockLlmClient;

    use super::*;
    use crate::pipeline::state::Review;

    fn prompt_of(messages: &[ChatMessage]) -> String {
        messages.iter().map(ChatMessage::text).collect::<Vec<_>>().join("\n")
    }

    const DRAFT: &str = "## Executive Summary\nEdge AI grows.\n## Introduction\nText.\n## Conclusion\nDone. See https://market-research.com/edge-growth";

    /// Canned reply per node, keyed on each prompt's opening line.
    fn reply_for(prompt: &str, fact_check: &str, quality: &str) -> weft_core::Result<ModelOutcome> {
        let text = |t: &str| Ok(ModelOutcome::DirectAnswer(t.to_string()));
        if prompt.starts_with("Research this topic deeply") {
            return Ok(ModelOutcome::ToolInvocations {
                text: String::new(),
                calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "search_tool".into(),
                    arguments: serde_json::json!({ "query": "edge computing" }),
                }],
            });
        }
        if prompt.starts_with("You are a Senior Data Analyst") {
            return text("Key trends: growth.");
        }
        if prompt.starts_with("Based on this analysis") {
            return text("Regulation is the main gap.");
        }
        if prompt.starts_with("You are an expert Tech Writer") || prompt.starts_with("You are a Senior Editor") {
            return text(DRAFT);
        }
        if prompt.starts_with("You are a strict Fact-Checker") {
            return text(fact_check);
        }
        if prompt.starts_with("You are an SEO Specialist") {
            return text("Title: Edge AI");
        }
        if prompt.starts_with("You are a Compliance Reviewer") {
            return text(r#"{"verdict": "compliant", "notes": ""}"#);
        }
        if prompt.starts_with("You are an Executive Summarizer") {
            return text("Edge AI grows. It matters. Invest now.");
        }
        if prompt.starts_with("Translate the following") {
            return text("SPANISH:\nLa IA crece.\n\nFRENCH:\nL'IA grandit.");
        }
        if prompt.starts_with("You are a Final Quality Gate") {
            return text(quality);
        }
        text("")
    }

    fn pipeline(llm: MockLlmClient, limits: PipelineConfig) -> ReportPipeline {
        ReportPipeline::new(PipelineDeps::new(Arc::new(llm), &ModelConfig::new("test-model"), limits)).unwrap()
    }

    const APPROVE: &str = r#"{"verdict": "approved", "notes": ""}"#;
    const REJECT: &str = r#"{"verdict": "rejected", "notes": "Market size is unsupported."}"#;
    const PASS: &str = r#"{"score": 9, "verdict": "passed", "notes": "Ready."}"#;

    #[tokio::test]
    async fn test_happy_path_visits_every_node_once() {
        let llm = MockLlmClient::new().with_responder(|m, _| reply_for(&prompt_of(m), APPROVE, PASS));
        let outcome = pipeline(llm, PipelineConfig::default())
            .run("The future of edge AI", "edge")
            .await
            .unwrap();
        let s = &outcome.state;
        assert_eq!(
            s.iteration_log,
            vec![
                "researcher",
                "analyst",
                "data_enricher",
                "writer",
                "fact_checker_pass_1_approved",
                "editor",
                "seo_optimizer",
                "compliance_pass_1_passed",
                "exec_summarizer",
                "translator",
                "quality_gate_pass_1_passed",
            ]
        );
        assert!(s.research_data[0].starts_with("Search 'edge computing':\n"));
        assert_eq!(s.research_data[1], "Enrichment LLM knowledge: Regulation is the main gap.");
        assert_eq!(s.enrichment_data.len(), 1);
        assert_eq!(s.final_output, DRAFT);
        assert_eq!(s.translations.spanish.as_deref(), Some("La IA crece."));
        assert!(s.translations.french_check.is_some());
        assert_eq!(s.quality, Review::Approved);
        assert!((s.quality_score - 0.9).abs() < 1e-9);
        assert!(!s.seo_keywords.is_empty());
        assert_eq!(outcome.steps.len(), 11);
    }

    #[tokio::test]
    async fn test_fact_check_exhaustion_forces_editor() {
        let llm = MockLlmClient::new().with_responder(|m, _| reply_for(&prompt_of(m), REJECT, PASS));
        let outcome = pipeline(llm, PipelineConfig::default())
            .run("The future of edge AI", "edge")
            .await
            .unwrap();
        let s = &outcome.state;
        let rejected: Vec<_> = s
            .iteration_log
            .iter()
            .filter(|e| e.starts_with("fact_checker_pass_"))
            .cloned()
            .collect();
        assert_eq!(
            rejected,
            vec![
                "fact_checker_pass_1_rejected",
                "fact_checker_pass_2_rejected",
                "fact_checker_pass_3_rejected",
            ]
        );
        assert_eq!(s.revision_count, 3);
        assert_eq!(s.critique, "Market size is unsupported.");
        let after = s
            .iteration_log
            .iter()
            .position(|e| e == "fact_checker_pass_3_rejected")
            .unwrap();
        assert_eq!(s.iteration_log[after + 1], "editor");
        assert!(outcome.steps.iter().any(|r| r.node == "fact_checker" && r.exhausted));
    }

    #[tokio::test]
    async fn test_every_gate_rejecting_still_terminates() {
        let llm = MockLlmClient::new().with_responder(|m, _| {
            let prompt = prompt_of(m);
            if prompt.starts_with("You are a Compliance Reviewer") {
                return Ok(ModelOutcome::DirectAnswer(
                    r#"{"verdict": "rejected", "notes": "Promotional tone."}"#.into(),
                ));
            }
            reply_for(
                &prompt,
                REJECT,
                r#"{"score": 3, "verdict": "failed", "notes": "Not publishable."}"#,
            )
        });
        let outcome = pipeline(llm, PipelineConfig::default())
            .run("The future of edge AI", "edge")
            .await
            .unwrap();
        let s = &outcome.state;

        assert_eq!(outcome.steps.len(), 27);
        assert_eq!(
            (s.revision_count, s.compliance_revision_count, s.quality_revision_count),
            (3, 4, 2)
        );
        for gate in ["fact_checker", "compliance_reviewer", "quality_gate"] {
            assert!(
                outcome.steps.iter().any(|r| r.node == gate && r.exhausted),
                "no exhausted record at {gate}"
            );
        }
        let compliance: Vec<_> = s
            .iteration_log
            .iter()
            .filter(|e| e.starts_with("compliance_pass_"))
            .cloned()
            .collect();
        assert_eq!(
            compliance,
            vec![
                "compliance_pass_1_failed",
                "compliance_pass_2_failed",
                "compliance_pass_3_failed",
                "compliance_pass_4_failed",
            ]
        );
        let third = s
            .iteration_log
            .iter()
            .position(|e| e == "compliance_pass_3_failed")
            .unwrap();
        assert_eq!(s.iteration_log[third + 1], "exec_summarizer");
        assert_eq!(s.iteration_log.last().map(String::as_str), Some("quality_gate_pass_2_failed"));
        assert_eq!(s.quality, Review::Rejected);
    }

    #[tokio::test]
    async fn test_quality_failure_loops_through_editor_once() {
        let quality_calls = Arc::new(AtomicUsize::new(0));
        let counter = quality_calls.clone();
        let llm = MockLlmClient::new().with_responder(move |m, _| {
            let prompt = prompt_of(m);
            if prompt.starts_with("You are a Final Quality Gate") {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = if n == 0 {
                    r#"{"score": 5, "verdict": "failed", "notes": "Conclusion is thin."}"#
                } else {
                    PASS
                };
                return Ok(ModelOutcome::DirectAnswer(reply.into()));
            }
            reply_for(&prompt, APPROVE, PASS)
        });
        let llm = Arc::new(llm);
        let deps = PipelineDeps::new(llm.clone(), &ModelConfig::new("m"), PipelineConfig::default());
        let outcome = ReportPipeline::new(deps).unwrap().run("Edge AI", "edge").await.unwrap();
        let log = &outcome.state.iteration_log;

        let failed = log.iter().position(|e| e == "quality_gate_pass_1_failed").unwrap();
        assert_eq!(log[failed + 1], "editor");
        assert_eq!(log.last().map(String::as_str), Some("quality_gate_pass_2_passed"));
        assert_eq!(outcome.state.quality_revision_count, 1);
        assert_eq!(quality_calls.load(Ordering::SeqCst), 2);

        let editor_prompts: Vec<String> = llm
            .calls()
            .into_iter()
            .map(|c| c.prompt())
            .filter(|p| p.starts_with("You are a Senior Editor"))
            .collect();
        assert_eq!(editor_prompts.len(), 2);
        assert!(editor_prompts[1].contains("Quality Gate feedback: Conclusion is thin."));
    }

    #[tokio::test]
    async fn test_writer_failure_halts_with_state_so_far() {
        let llm = MockLlmClient::new().with_responder(|m, _| {
            let prompt = prompt_of(m);
            if prompt.starts_with("You are an expert Tech Writer") {
                return Err(WeftError::LlmRequest("HTTP 500: upstream".into()));
            }
            reply_for(&prompt, APPROVE, PASS)
        });
        let failure = pipeline(llm, PipelineConfig::default())
            .run("Edge AI", "edge")
            .await
            .unwrap_err();
        assert!(matches!(failure.error, WeftError::NodeFailed { ref node, .. } if node == "writer"));
        assert_eq!(failure.state.draft, "");
        assert_eq!(failure.state.analysis, "Key trends: growth.");
        assert_eq!(
            failure.state.iteration_log,
            vec!["researcher", "analyst", "data_enricher"]
        );
    }

    #[tokio::test]
    async fn test_step_ceiling_applies_to_pipeline() {
        let llm = MockLlmClient::new().with_responder(|m, _| reply_for(&prompt_of(m), APPROVE, PASS));
        let limits = PipelineConfig {
            max_steps: 5,
            ..PipelineConfig::default()
        };
        let failure = pipeline(llm, limits).run("Edge AI", "edge").await.unwrap_err();
        assert!(matches!(failure.error, WeftError::StepCeilingExceeded(5)));
        assert_eq!(failure.state.iteration_log.len(), 5);
    }

    #[test]
    fn test_topology_renders_all_gates() {
        let deps = PipelineDeps::new(
            Arc::new(MockLlmClient::new()),
            &ModelConfig::new("m"),
            PipelineConfig::default(),
        );
        let graph = build_report_graph(Arc::new(deps)).unwrap();
        assert_eq!(graph.node_names().len(), 11);
        let text = graph.describe();
        assert!(text.contains("fact_checker --[writer]--> writer"));
        assert!(text.contains("compliance_reviewer --[exec_summarizer]--> exec_summarizer"));
        assert!(text.contains("quality_gate --[end]--> END"));
    }
}
