//! The eleven report-pipeline nodes.
//!
//! Each node gathers tool output first, then makes at most one model call,
//! and returns only the fields it owns plus one trace entry.

use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{info, warn};

use weft_core::error::Result;
use weft_core::types::{ChatMessage, ModelOutcome};
use weft_tools::truncate_chars;

use super::deps::PipelineDeps;
use super::state::{ReportState, ReportUpdate, Review, Translations};
use super::verdict::parse_verdict;
use crate::graph::{Append, Node, NodeContext};

pub const REQUIRED_SECTIONS: &[&str] = &[
    "Executive Summary",
    "Introduction",
    "Key Findings",
    "Analysis",
    "Implications",
    "Conclusion",
    "References",
];

fn said(text: &str) -> Append<ChatMessage> {
    Append::one(ChatMessage::assistant_text(text))
}

/// Trace prefixes for a tool-driven research pass.
struct FindingLabels {
    search: &'static str,
    scrape: &'static str,
    fallback: &'static str,
}

const RESEARCH_LABELS: FindingLabels = FindingLabels {
    search: "Search",
    scrape: "Scraped",
    fallback: "LLM knowledge: ",
};

const ENRICHMENT_LABELS: FindingLabels = FindingLabels {
    search: "Enrichment search",
    scrape: "Enrichment scraped",
    fallback: "Enrichment LLM knowledge: ",
};

/// Execute the search/scrape calls the model asked for, or fall back to its
/// own text when it asked for none.
async fn collect_findings(
    deps: &PipelineDeps,
    outcome: ModelOutcome,
    labels: &FindingLabels,
    ctx: &NodeContext,
) -> Result<Vec<String>> {
    let (text, calls) = match outcome {
        ModelOutcome::DirectAnswer(text) => (text, Vec::new()),
        ModelOutcome::ToolInvocations { text, calls } => (text, calls),
    };

    let mut findings = Vec::new();
    for call in calls {
        let arg = |key: &str| {
            call.arguments
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        match call.name.as_str() {
            "search_tool" => {
                let query = arg("query");
                let res = deps.tool("search_tool", call.arguments.clone(), ctx).await?;
                findings.push(format!("{} '{}':\n{}", labels.search, query, res));
            }
            "scrape_tool" => {
                let url = arg("url");
                let res = deps.tool("scrape_tool", call.arguments.clone(), ctx).await?;
                findings.push(format!("{} {}:\n{}", labels.scrape, url, res));
            }
            other => warn!(tool = other, "Ignoring call to unbound tool"),
        }
    }

    if findings.is_empty() {
        findings.push(format!("{}{}", labels.fallback, text));
    }
    Ok(findings)
}

// ── Researcher ──────────────────────────────────────────────────

/// First research pass: the model drives search and scrape.
pub struct Researcher(pub Arc<PipelineDeps>);

impl Researcher {
    async fn research(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let outcome = deps
            .ask(
                &deps.creative,
                format!(
                    "Research this topic deeply. Use both search and scrape tools: {}",
                    state.task
                ),
                &["search_tool", "scrape_tool"],
                ctx,
            )
            .await?;
        let findings = collect_findings(deps, outcome, &RESEARCH_LABELS, ctx).await?;
        info!(findings = findings.len(), "Research collected");

        Ok(ReportUpdate {
            research_data: Append::many(findings),
            ..ReportUpdate::traced("researcher")
        })
    }
}

impl Node<ReportState> for Researcher {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.research(state, ctx))
    }
}

// ── Analyst ─────────────────────────────────────────────────────

pub struct Analyst(pub Arc<PipelineDeps>);

impl Analyst {
    async fn analyze(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let research = state.research_text();
        let excerpt = truncate_chars(&research, deps.limits.max_research_chars);

        let sentiment = deps.text_tool("sentiment_analysis_tool", excerpt, ctx).await?;
        let stats = deps.text_tool("statistics_extractor_tool", excerpt, ctx).await?;

        let prompt = format!(
            r#"You are a Senior Data Analyst. Analyze the following research data about "{task}".

You have access to pre-computed tool outputs below. Incorporate them into your analysis.

## Sentiment Analysis Tool Output:
{sentiment}

## Statistics Extractor Tool Output:
{stats}

Structure your analysis with these sections:
1. **Key Trends**: What patterns emerge?
2. **Market Data**: Any numbers, projections, market sizes? (use the extracted stats)
3. **Sentiment Overview**: What is the overall tone? (use the sentiment analysis)
4. **Contradictions**: Where do sources disagree?
5. **Gaps**: What information is missing?
6. **Risk Factors**: What could go wrong?

Research Data:
{research}

Produce a structured analysis. Be specific and cite data points."#,
            task = state.task,
        );

        let analysis = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();
        Ok(ReportUpdate {
            messages: said(&analysis),
            analysis: analysis.into(),
            sentiment: sentiment.into(),
            ..ReportUpdate::traced("analyst")
        })
    }
}

impl Node<ReportState> for Analyst {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.analyze(state, ctx))
    }
}

// ── DataEnricher ────────────────────────────────────────────────

/// Second research pass aimed at the biggest gap in the analysis.
pub struct DataEnricher(pub Arc<PipelineDeps>);

impl DataEnricher {
    async fn enrich(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let prompt = format!(
            r#"Based on this analysis of "{task}", identify the TOP knowledge gap and search for additional data to fill it.

Analysis:
{analysis}

Use search_tool to find additional sources, then scrape_tool to get full content.
Focus on gaps, missing data points, or areas that need deeper research."#,
            task = state.task,
            analysis = truncate_chars(&state.analysis, deps.limits.max_snippet_chars),
        );
        let outcome = deps
            .ask(&deps.precise, prompt, &["search_tool", "scrape_tool"], ctx)
            .await?;
        let enrichments = collect_findings(deps, outcome, &ENRICHMENT_LABELS, ctx).await?;

        Ok(ReportUpdate {
            research_data: Append::many(enrichments.clone()),
            enrichment_data: Append::many(enrichments),
            ..ReportUpdate::traced("data_enricher")
        })
    }
}

impl Node<ReportState> for DataEnricher {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.enrich(state, ctx))
    }
}

// ── Writer ──────────────────────────────────────────────────────

pub struct Writer(pub Arc<PipelineDeps>);

impl Writer {
    async fn write(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let headlines = deps
            .tool("headline_generator_tool", serde_json::json!({ "topic": state.task }), ctx)
            .await?;

        let headings: String = REQUIRED_SECTIONS
            .iter()
            .map(|s| format!("## {}\n", s))
            .collect();
        let mut prompt = format!(
            r#"You are an expert Tech Writer. Write a comprehensive, well-structured report on "{task}".

MANDATORY STRUCTURE (use these exact markdown headings):
{headings}
Based on this analysis:
{analysis}

Here are suggested headline options from the headline generator tool. Pick the best one or create your own:
{headlines}
"#,
            task = state.task,
            analysis = state.analysis,
        );
        if state.fact_check == Review::Rejected && !state.critique.is_empty() {
            prompt.push_str(&format!(
                "\n\nIMPORTANT: Address this critique from the Fact-Checker:\n{}\nFix all issues raised.",
                state.critique
            ));
        }

        let draft = deps.ask(&deps.creative, prompt, &[], ctx).await?.into_text();
        info!(chars = draft.len(), "Draft written");
        Ok(ReportUpdate {
            messages: said(&draft),
            draft: draft.into(),
            ..ReportUpdate::traced("writer")
        })
    }
}

impl Node<ReportState> for Writer {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.write(state, ctx))
    }
}

// ── FactChecker ─────────────────────────────────────────────────

pub struct FactChecker(pub Arc<PipelineDeps>);

impl FactChecker {
    async fn check(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let research = state.research_text();
        let research = truncate_chars(&research, deps.limits.max_research_chars);
        let draft = truncate_chars(&state.draft, deps.limits.max_draft_chars);

        let plagiarism = deps
            .tool(
                "plagiarism_check_tool",
                serde_json::json!({ "draft": draft, "source_text": research }),
                ctx,
            )
            .await?;

        let prompt = format!(
            r#"You are a strict Fact-Checker. Compare the draft against the original research data.

Original Research:
{research}

Draft:
{draft}

Plagiarism Check Tool Output:
{plagiarism}

Tasks:
1. Identify factual errors or hallucinations NOT supported by research.
2. Check if tone is objective (no promotional language).
3. Verify all cited numbers match the research.
4. Consider the plagiarism check results. If overlap is HIGH, the draft needs more original language.

Reply with a JSON object only:
{{"verdict": "approved" | "rejected", "notes": "<every issue found; empty when approved>"}}"#
        );

        let reply = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();
        let verdict = parse_verdict(&reply);
        let pass = state.revision_count + 1;

        if verdict.review == Review::Approved {
            info!(pass, "Fact-check approved");
            Ok(ReportUpdate {
                critique: String::new().into(),
                fact_check: Review::Approved.into(),
                messages: said(&reply),
                ..ReportUpdate::traced(format!("fact_checker_pass_{}_approved", pass))
            })
        } else {
            info!(pass, "Fact-check rejected");
            Ok(ReportUpdate {
                critique: verdict.notes.into(),
                fact_check: Review::Rejected.into(),
                revision_count: pass.into(),
                messages: said(&reply),
                ..ReportUpdate::traced(format!("fact_checker_pass_{}_rejected", pass))
            })
        }
    }
}

impl Node<ReportState> for FactChecker {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.check(state, ctx))
    }
}

// ── Editor ──────────────────────────────────────────────────────

pub struct Editor(pub Arc<PipelineDeps>);

impl Editor {
    async fn edit(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let citations = deps
            .text_tool(
                "citation_formatter_tool",
                truncate_chars(&state.draft, deps.limits.max_research_chars),
                ctx,
            )
            .await?;

        let mut prompt = format!(
            r#"You are a Senior Editor. Polish the following report for publication.

Requirements:
- Clean, professional Markdown formatting
- Clear heading hierarchy (## for sections)
- Consistent tone: authoritative but accessible
- Remove any redundant sentences
- Ensure smooth transitions between sections
- The report MUST contain these sections: {sections}
- Incorporate the formatted citations below where appropriate

Citation Formatter Output:
{citations}

Draft:
{draft}
"#,
            sections = REQUIRED_SECTIONS.join(", "),
            citations = truncate_chars(&citations, deps.limits.max_snippet_chars),
            draft = state.draft,
        );
        if state.compliance == Review::Rejected && !state.compliance_notes.is_empty() {
            prompt.push_str(&format!(
                "\n\nCOMPLIANCE ISSUES TO FIX:\n{}\nAddress ALL compliance issues.",
                state.compliance_notes
            ));
        }
        if state.quality == Review::Rejected && !state.quality_notes.is_empty() {
            prompt.push_str(&format!(
                "\n\nQUALITY GATE FEEDBACK:\n{}\nResolve every point before resubmitting.",
                state.quality_notes
            ));
        }

        let draft = deps.ask(&deps.creative, prompt, &[], ctx).await?.into_text();
        Ok(ReportUpdate {
            messages: said(&draft),
            draft: draft.into(),
            ..ReportUpdate::traced("editor")
        })
    }
}

impl Node<ReportState> for Editor {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.edit(state, ctx))
    }
}

// ── SeoOptimizer ────────────────────────────────────────────────

pub struct SeoOptimizer(pub Arc<PipelineDeps>);

impl SeoOptimizer {
    async fn optimize(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let excerpt = truncate_chars(&state.draft, deps.limits.max_snippet_chars);
        let keywords_raw = deps.text_tool("keyword_extraction_tool", excerpt, ctx).await?;
        let keywords: Vec<String> = keywords_raw
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let prompt = format!(
            r#"You are an SEO Specialist. Given these extracted keywords: {keywords_raw}

And this draft excerpt:
{excerpt}

Suggest:
1. An optimized title (max 70 chars)
2. A meta description (max 160 chars)
3. Top 5 keywords ranked by importance

Output as structured text."#
        );
        // Keywords come from the tool above; the brief call binds no tools.
        let brief = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();

        Ok(ReportUpdate {
            seo_keywords: keywords.into(),
            seo_brief: brief.into(),
            ..ReportUpdate::traced("seo_optimizer")
        })
    }
}

impl Node<ReportState> for SeoOptimizer {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.optimize(state, ctx))
    }
}

// ── ComplianceReviewer ──────────────────────────────────────────

/// `Grade Level: N` from the readability tool's output.
pub fn parse_grade(readability: &str) -> f64 {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Grade Level:\s*([\d.]+)").ok())
        .as_ref()
        .and_then(|re| re.captures(readability))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().trim_end_matches('.').parse().ok())
        .unwrap_or(0.0)
}

pub struct ComplianceReviewer(pub Arc<PipelineDeps>);

impl ComplianceReviewer {
    async fn review(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let excerpt = truncate_chars(&state.draft, deps.limits.max_draft_chars);
        let word_count = deps.text_tool("word_count_tool", &state.draft, ctx).await?;
        let readability = deps.text_tool("readability_score_tool", excerpt, ctx).await?;
        let grade = parse_grade(&readability);

        let prompt = format!(
            r#"You are a Compliance Reviewer. Check this report against publishing standards.

Word count info: {word_count}

Readability Analysis:
{readability}

Rules to check:
1. Report must have AT LEAST 500 words.
2. Must contain sections: Executive Summary, Introduction, Conclusion.
3. Must NOT contain: "As an AI", "language model", "I cannot", "I'm sorry".
4. Must have at least 3 markdown headings (##).
5. Must not have any heading deeper than ### (no ####).
6. Readability grade level should be between 8 and 14 (accessible yet professional).

Report:
{excerpt}

Reply with a JSON object only:
{{"verdict": "compliant" | "violations", "notes": "<each violated rule; empty when compliant>"}}"#
        );

        let reply = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();
        let verdict = parse_verdict(&reply);
        let pass = state.compliance_revision_count + 1;

        if verdict.review == Review::Approved {
            Ok(ReportUpdate {
                compliance_notes: String::new().into(),
                compliance: Review::Approved.into(),
                readability_grade: grade.into(),
                ..ReportUpdate::traced(format!("compliance_pass_{}_passed", pass))
            })
        } else {
            info!(pass, grade, "Compliance violations found");
            Ok(ReportUpdate {
                compliance_notes: verdict.notes.into(),
                compliance: Review::Rejected.into(),
                compliance_revision_count: pass.into(),
                readability_grade: grade.into(),
                ..ReportUpdate::traced(format!("compliance_pass_{}_failed", pass))
            })
        }
    }
}

impl Node<ReportState> for ComplianceReviewer {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.review(state, ctx))
    }
}

// ── ExecSummarizer ──────────────────────────────────────────────

pub struct ExecSummarizer(pub Arc<PipelineDeps>);

impl ExecSummarizer {
    async fn summarize(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let extractive = deps
            .text_tool(
                "text_summarizer_tool",
                truncate_chars(&state.draft, deps.limits.max_research_chars),
                ctx,
            )
            .await?;

        let prompt = format!(
            r#"You are an Executive Summarizer. Read this report and produce an executive summary.

Here is an extractive summary from the text summarizer tool to guide you:
{extractive}

Requirements:
- Exactly 3 sentences.
- First sentence: the main finding.
- Second sentence: the key implication.
- Third sentence: the recommended action.

Report:
{report}

Output ONLY the 3-sentence summary, nothing else."#,
            report = truncate_chars(&state.draft, deps.limits.max_draft_chars),
        );
        let summary = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();

        Ok(ReportUpdate {
            executive_summary: summary.trim().to_string().into(),
            ..ReportUpdate::traced("exec_summarizer")
        })
    }
}

impl Node<ReportState> for ExecSummarizer {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.summarize(state, ctx))
    }
}

// ── Translator ──────────────────────────────────────────────────

/// Split a `SPANISH: … FRENCH: …` reply. `None` when either marker is missing.
pub fn split_translations(reply: &str) -> Option<(String, String)> {
    if !reply.contains("SPANISH:") {
        return None;
    }
    let (before, after) = reply.split_once("FRENCH:")?;
    let spanish = before.replace("SPANISH:", "").trim().to_string();
    let french = after.trim().to_string();
    Some((spanish, french))
}

pub struct Translator(pub Arc<PipelineDeps>);

impl Translator {
    async fn translate(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let summary = &state.executive_summary;
        let prompt = format!(
            r#"Translate the following executive summary into Spanish and French.

Summary:
{summary}

Output format:
SPANISH:
[translation]

FRENCH:
[translation]"#
        );
        let reply = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();

        let translations = match split_translations(&reply) {
            Some((spanish, french)) => {
                let check = |translation: &str| {
                    serde_json::json!({ "original": summary, "translation": translation })
                };
                let spanish_check = deps.tool("translation_quality_tool", check(&spanish), ctx).await?;
                let french_check = deps.tool("translation_quality_tool", check(&french), ctx).await?;
                Translations {
                    spanish: Some(spanish),
                    french: Some(french),
                    raw: None,
                    spanish_check: Some(spanish_check),
                    french_check: Some(french_check),
                }
            }
            None => {
                warn!("Translation reply lacks SPANISH:/FRENCH: markers");
                Translations {
                    raw: Some(reply),
                    ..Default::default()
                }
            }
        };

        Ok(ReportUpdate {
            translations: translations.into(),
            final_output: state.draft.clone().into(),
            ..ReportUpdate::traced("translator")
        })
    }
}

impl Node<ReportState> for Translator {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.translate(state, ctx))
    }
}

// ── QualityGate ─────────────────────────────────────────────────

/// Last holistic review; a failure sends the draft back to the editor.
pub struct QualityGate(pub Arc<PipelineDeps>);

impl QualityGate {
    async fn assess(&self, state: &ReportState, ctx: &NodeContext) -> Result<ReportUpdate> {
        let deps = &self.0;
        let word_count = deps.text_tool("word_count_tool", &state.draft, ctx).await?;
        let readability = deps
            .text_tool(
                "readability_score_tool",
                truncate_chars(&state.draft, deps.limits.max_draft_chars),
                ctx,
            )
            .await?;
        let translations_present =
            state.translations.spanish.is_some() && state.translations.french.is_some();

        let prompt = format!(
            r#"You are a Final Quality Gate reviewer. This is the LAST check before publication.

Perform a holistic quality assessment:

Word Count: {word_count}
Readability: {readability}
Translations present: {translations}

Check items:
1. Does the report have a clear narrative arc (intro, findings, implications, conclusion)?
2. Is the executive summary present and concise (3 sentences)?
3. Are translations present?
4. Is the overall quality PUBLICATION-READY?

Executive Summary:
{summary}

Report excerpt:
{excerpt}

Reply with a JSON object only:
{{"score": <1-10>, "verdict": "passed" | "failed", "notes": "<specific issues to fix>"}}
Use a score of 8-10 with "passed" only when the report is publication-ready."#,
            translations = if translations_present { "yes" } else { "no" },
            summary = state.executive_summary,
            excerpt = truncate_chars(&state.draft, deps.limits.max_snippet_chars),
        );

        let reply = deps.ask(&deps.precise, prompt, &[], ctx).await?.into_text();
        let verdict = parse_verdict(&reply);
        let score = verdict.score.unwrap_or(0.5);
        let passed = verdict.review == Review::Approved && score >= deps.limits.quality_threshold;
        let pass = state.quality_revision_count + 1;
        info!(pass, score, passed, "Quality assessed");

        if passed {
            Ok(ReportUpdate {
                quality_score: score.into(),
                quality: Review::Approved.into(),
                quality_notes: verdict.notes.into(),
                ..ReportUpdate::traced(format!("quality_gate_pass_{}_passed", pass))
            })
        } else {
            let notes = if verdict.notes.is_empty() {
                format!("Quality Gate feedback: score {:.1} below threshold", score)
            } else {
                format!("Quality Gate feedback: {}", verdict.notes)
            };
            Ok(ReportUpdate {
                quality_score: score.into(),
                quality: Review::Rejected.into(),
                quality_notes: notes.into(),
                quality_revision_count: pass.into(),
                ..ReportUpdate::traced(format!("quality_gate_pass_{}_failed", pass))
            })
        }
    }
}

impl Node<ReportState> for QualityGate {
    fn run<'a>(&'a self, state: &'a ReportState, ctx: &'a NodeContext) -> BoxFuture<'a, Result<ReportUpdate>> {
        Box::pin(self.assess(state, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grade() {
        assert_eq!(parse_grade("Grade Level: 11.2\nReading Ease: 45.0"), 11.2);
        assert_eq!(parse_grade("nothing here"), 0.0);
    }

    #[test]
    fn test_split_translations() {
        let (es, fr) =
            split_translations("SPANISH:\nHola mundo.\n\nFRENCH:\nBonjour le monde.").unwrap();
        assert_eq!(es, "Hola mundo.");
        assert_eq!(fr, "Bonjour le monde.");
        assert!(split_translations("Hola mundo.").is_none());
        assert!(split_translations("SPANISH: Hola").is_none());
    }

    #[tokio::test]
    async fn test_seo_brief_comes_from_an_unbound_call() {
        use crate::graph::GraphState;
        use tokio_util::sync::CancellationToken;
        use weft_core::config::{ModelConfig, PipelineConfig};
        use weft_core::types::RunId;
        use weft_test_utils::MockLlmClient;

        let llm = Arc::new(MockLlmClient::new().with_text("Title: Edge AI in 2026"));
        let deps = Arc::new(PipelineDeps::new(llm.clone(), &ModelConfig::new("m"), PipelineConfig::default()));
        let mut state = ReportState::new("Edge AI", "edge");
        state.draft = "Edge inference cuts latency. Edge inference saves bandwidth.".into();
        let ctx = NodeContext {
            run_id: RunId::from_str("seo"),
            step: 0,
            cancel: CancellationToken::new(),
        };

        let update = SeoOptimizer(deps).run(&state, &ctx).await.unwrap();
        state.merge(update);
        assert_eq!(state.seo_brief, "Title: Edge AI in 2026");
        assert!(!state.seo_keywords.is_empty());
        assert!(llm.calls()[0].tools.is_empty());
    }
}
