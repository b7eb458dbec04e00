use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::info;

use weft_core::error::Result;
use weft_core::traits::Tool;
use weft_core::types::{ToolContext, ToolResult};

use super::parse_input;

struct SearchHit {
    title: &'static str,
    url: &'static str,
    snippet: &'static str,
}

const EDGE_COMPUTING: &[SearchHit] = &[
    SearchHit {
        title: "The State of Edge Computing in 2026",
        url: "https://tech-trends-2026.com/edge-computing",
        snippet: "By 2026, edge computing is expected to process 75% of enterprise data. Key drivers include 6G rollouts and AI at the edge.",
    },
    SearchHit {
        title: "Challenges in Edge AI Deployment",
        url: "https://ai-daily.org/edge-ai-challenges",
        snippet: "Security, latency consistency, and hardware fragmentation remain top challenges for edge AI deployments in 2025-2026.",
    },
    SearchHit {
        title: "Market Size of Edge Computing",
        url: "https://market-research.com/edge-growth",
        snippet: "The global edge computing market is projected to reach $150 billion by 2028, growing at a CAGR of 30%.",
    },
    SearchHit {
        title: "Edge vs Cloud: The Shift",
        url: "https://cloud-insider.net/edge-vs-cloud",
        snippet: "The pendulum swings back to decentralized processing as bandwidth costs rise and privacy concerns mount.",
    },
];

const QUANTUM_ML: &[SearchHit] = &[
    SearchHit {
        title: "Quantum Machine Learning Breakthroughs in 2026",
        url: "https://quantum-digest.com/qml-2026",
        snippet: "Hybrid quantum-classical algorithms show 100x speedup for specific optimization problems. Google and IBM lead race.",
    },
    SearchHit {
        title: "NISQ Era Limitations for ML",
        url: "https://quantum-research.org/nisq-limits",
        snippet: "Current noisy quantum hardware limits ML to toy problems. Error correction at scale expected by 2028.",
    },
    SearchHit {
        title: "Quantum Feature Maps for Classification",
        url: "https://arxiv-summary.com/quantum-kernels",
        snippet: "Researchers demonstrate quantum kernel methods outperforming classical SVMs on 5 benchmark datasets.",
    },
];

const AI_REGULATION: &[SearchHit] = &[
    SearchHit {
        title: "EU AI Act 2026 Updates",
        url: "https://eu-policy-watch.com/ai-act-2026",
        snippet: "The EU finalized tiered risk classification. High-risk AI systems now require conformity assessments and audit trails.",
    },
    SearchHit {
        title: "US Executive Order on AI Safety",
        url: "https://ai-policy-us.gov/executive-order",
        snippet: "New NIST guidelines mandate red-teaming for frontier models. Reporting requirements for models above 10^26 FLOPs.",
    },
    SearchHit {
        title: "Global AI Governance Gap",
        url: "https://global-ai-tracker.org/governance-gap",
        snippet: "While EU and US advance regulation, Asia-Pacific nations diverge. China favors state-led AI governance; India proposes voluntary codes.",
    },
];

/// Pick the canned result set whose topic the query mentions.
fn results_for(query: &str) -> &'static [SearchHit] {
    let q = query.to_lowercase();
    if q.contains("quantum") || q.contains("qml") {
        QUANTUM_ML
    } else if ["regulation", "governance", "policy", "ai act"]
        .iter()
        .any(|k| q.contains(k))
    {
        AI_REGULATION
    } else {
        EDGE_COMPUTING
    }
}

// ── SearchTool ──────────────────────────────────────────────────

/// Simulated web search over a few fixed topic corpora.
pub struct SearchTool;

#[derive(Deserialize)]
struct SearchInput {
    query: String,
}

impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search_tool"
    }
    fn description(&self) -> &str {
        "Search the web. Returns up to three results with title, URL and snippet."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string", "description": "Search query" } },
            "required": ["query"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: SearchInput = parse_input(input)?;
            info!(query = %p.query, "Searching");

            let mut hits: Vec<&SearchHit> = results_for(&p.query).iter().collect();
            hits.shuffle(&mut rand::thread_rng());

            let formatted: String = hits
                .iter()
                .take(3)
                .enumerate()
                .map(|(i, h)| format!("{}. [{}]({}): {}\n", i + 1, h.title, h.url, h.snippet))
                .collect();
            Ok(ToolResult::success(formatted))
        })
    }
}

// ── ScrapeTool ──────────────────────────────────────────────────

const PAGES: &[(&str, &str)] = &[
    (
        "tech-trends-2026",
        "Full Article: The State of Edge Computing in 2026.\n\n\
         Edge computing is rapidly evolving. In 2026, we see a massive shift towards processing data locally. \
         6G networks are starting to appear, providing the low latency needed for real-time edge AI. \
         Autonomous vehicles and smart cities are the primary beneficiaries. \
         However, energy consumption of edge nodes is a growing concern. \
         Market analysts project $150B market size by 2028.",
    ),
    (
        "ai-daily",
        "Full Report: Challenges in Edge AI.\n\n\
         While promising, running AI at the edge is hard. Models need to be compressed. \
         Security is a nightmare because devices are physically accessible. \
         Fragmentation of hardware accelerators (TPUs, NPUs, GPUs) makes standardizing software difficult.",
    ),
    (
        "quantum-digest",
        "Full Article: Quantum ML Breakthroughs.\n\n\
         2026 marks a turning point for quantum machine learning. Hybrid quantum-classical models \
         are achieving practical speedups on optimization tasks. Google's 72-qubit processor demonstrated \
         quantum advantage for combinatorial problems. IBM's Heron chip enables error-corrected circuits.",
    ),
    (
        "quantum-research",
        "Full Report: NISQ Limitations.\n\n\
         The NISQ (Noisy Intermediate-Scale Quantum) era continues. Current hardware has 50-1000 qubits \
         but error rates remain 0.1-1%. For real-world ML, we need millions of logical qubits. \
         Error correction overhead means practical quantum ML is at least 3-5 years away.",
    ),
    (
        "eu-policy-watch",
        "Full Article: EU AI Act 2026.\n\n\
         The AI Act now enforces a four-tier risk system: Unacceptable, High, Limited, and Minimal risk. \
         High-risk systems (healthcare, law enforcement) require conformity assessments. \
         Foundation models must disclose training data summaries. Fines up to \u{20ac}35M or 7% of global revenue.",
    ),
    (
        "ai-policy-us",
        "Full Report: US AI Executive Order.\n\n\
         The Order mandates NIST to develop AI safety standards within 270 days. \
         Companies training models using >10^26 FLOPs must report to the government. \
         Red-teaming is now a requirement for frontier AI models before deployment.",
    ),
];

/// Simulated page fetch returning the article text for known hosts.
pub struct ScrapeTool;

#[derive(Deserialize)]
struct ScrapeInput {
    url: String,
}

impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        "scrape_tool"
    }
    fn description(&self) -> &str {
        "Fetch a web page and return its text content."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "url": { "type": "string", "description": "Page URL" } },
            "required": ["url"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: ScrapeInput = parse_input(input)?;
            info!(url = %p.url, "Scraping");

            let content = PAGES
                .iter()
                .find(|(key, _)| p.url.contains(key))
                .map(|(_, text)| text.to_string())
                .unwrap_or_else(|| {
                    format!(
                        "Content for {}: (Simulated content) This page discusses emerging technology trends.",
                        p.url
                    )
                });
            Ok(ToolResult::success(content))
        })
    }
}
