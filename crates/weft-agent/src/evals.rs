//! Post-run evaluation battery.
//!
//! Three deterministic checks, three LLM judges and two performance checks,
//! each producing a [`Score`] in `[0, 1]` with a human-readable reason.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weft_core::config::{EvalsConfig, ModelConfig};
use weft_core::event::EventBus;
use weft_core::traits::LlmClient;
use weft_core::types::{ChatMessage, RunEvent, RunId, Score};
use weft_llm::generate;
use weft_tools::truncate_chars;

const FORBIDDEN_PHRASES: &[&str] = &["As an AI", "language model", "I cannot", "I'm sorry"];

fn lazy_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

// ── Deterministic ───────────────────────────────────────────────

/// Required sections (with accepted heading variants) and forbidden phrases.
pub fn format_compliance(text: &str) -> Score {
    let required: &[(&str, &[&str])] = &[
        ("Executive Summary", &["## Executive Summary"]),
        ("Introduction", &["## Introduction", "# Introduction"]),
        (
            "Conclusion",
            &["## Conclusion", "# Conclusion", "## Summary", "## Final Thoughts"],
        ),
    ];
    let lower = text.to_lowercase();
    let mut issues = Vec::new();
    for (name, variants) in required {
        if !variants.iter().any(|v| lower.contains(&v.to_lowercase())) {
            issues.push(format!("Missing '{}' section", name));
        }
    }
    for phrase in FORBIDDEN_PHRASES {
        if lower.contains(&phrase.to_lowercase()) {
            issues.push(format!("Contains forbidden: '{}'", phrase));
        }
    }

    if issues.is_empty() {
        Score::new("format_compliance", 1.0, "All checks passed")
    } else {
        Score::new("format_compliance", 0.0, issues.join("; "))
    }
}

pub fn word_count_check(text: &str, min_words: usize) -> Score {
    let count = text.split_whitespace().count();
    if count >= min_words {
        return Score::new(
            "word_count_check",
            1.0,
            format!("Word count: {} (≥{})", count, min_words),
        );
    }
    let ratio = if min_words == 0 {
        1.0
    } else {
        (count as f64 / min_words as f64 * 100.0).round() / 100.0
    };
    Score::new(
        "word_count_check",
        ratio,
        format!("Word count: {} (<{} minimum)", count, min_words),
    )
}

/// URLs and `[n]` markers; two or more is full marks.
pub fn has_references(text: &str) -> Score {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    let urls = lazy_regex(&URL, r"https?://\S+").map_or(0, |re| re.find_iter(text).count());
    let markers = lazy_regex(&MARKER, r"\[\d+\]").map_or(0, |re| re.find_iter(text).count());

    match urls + markers {
        0 => Score::new("has_references", 0.0, "No references or citations found"),
        1 => Score::new("has_references", 0.5, "Only 1 reference(s) found"),
        _ => Score::new(
            "has_references",
            1.0,
            format!("Found {} URLs, {} citations", urls, markers),
        ),
    }
}

// ── Performance ─────────────────────────────────────────────────

pub fn latency_check(latency_secs: f64, max_secs: f64) -> Score {
    let ok = latency_secs <= max_secs;
    Score::new(
        "latency_check",
        if ok { 1.0 } else { 0.0 },
        format!(
            "Latency: {:.1}s {} {}s",
            latency_secs,
            if ok { "≤" } else { ">" },
            max_secs
        ),
    )
}

pub fn cost_check(cost_usd: f64, max_usd: f64) -> Score {
    let ok = cost_usd <= max_usd;
    Score::new(
        "cost_check",
        if ok { 1.0 } else { 0.0 },
        format!(
            "Cost: ${:.4} {} ${}",
            cost_usd,
            if ok { "≤" } else { ">" },
            max_usd
        ),
    )
}

// ── LLM judges ──────────────────────────────────────────────────

/// First integer in a judge reply, out of ten and capped at 1. A reply
/// without any number scores 0.5.
pub fn extract_score(reply: &str) -> f64 {
    static INT: OnceLock<Option<Regex>> = OnceLock::new();
    lazy_regex(&INT, r"\d+")
        .and_then(|re| re.find(reply.trim()))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|n| (n / 10.0).min(1.0))
        .unwrap_or(0.5)
}

pub struct Judge {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl Judge {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self { llm, model }
    }

    async fn rate(&self, name: &str, label: &str, prompt: String, cancel: &CancellationToken) -> Score {
        match generate(
            self.llm.as_ref(),
            &self.model,
            vec![ChatMessage::user(prompt)],
            &[],
            cancel,
        )
        .await
        {
            Ok(outcome) => {
                let reply = outcome.text().trim().to_string();
                Score::new(name, extract_score(&reply), format!("{}: {}/10", label, reply))
            }
            Err(e) => {
                warn!(eval = name, error = %e, "Judge call failed");
                Score::new(name, 0.0, format!("Failed: {}", e))
            }
        }
    }

    pub async fn analytical_rigor(&self, text: &str, cancel: &CancellationToken) -> Score {
        let prompt = format!(
            r#"Rate this report for ANALYTICAL RIGOR on a scale of 1-10.

Criteria:
- Does it go beyond surface-level observations?
- Are specific data points cited (numbers, percentages, dates)?
- Is there a logical argument structure?
- Are counter-arguments or risks addressed?

Report:
{}

Output ONLY a single integer 1-10."#,
            truncate_chars(text, 3000)
        );
        self.rate("analytical_rigor", "Analytical rigor", prompt, cancel).await
    }

    pub async fn readability(&self, text: &str, cancel: &CancellationToken) -> Score {
        let prompt = format!(
            r#"Rate this report for READABILITY on a scale of 1-10.

Criteria:
- Is the language clear and jargon-free (or jargon explained)?
- Do paragraphs flow logically from one to the next?
- Is the report scannable (good headings, short paragraphs)?
- Would a non-expert understand the key points?

Report:
{}

Output ONLY a single integer 1-10."#,
            truncate_chars(text, 3000)
        );
        self.rate("readability", "Readability", prompt, cancel).await
    }

    pub async fn factual_consistency(&self, text: &str, research: &str, cancel: &CancellationToken) -> Score {
        let prompt = format!(
            r#"Rate the FACTUAL CONSISTENCY of this report vs the source research on a scale of 1-10.

Source Research:
{}

Report:
{}

Criteria:
- Do claims in the report match the research data?
- Are there hallucinated facts not in the source?
- Are numbers and statistics accurately represented?

Output ONLY a single integer 1-10."#,
            truncate_chars(research, 2000),
            truncate_chars(text, 2000)
        );
        self.rate("factual_consistency", "Factual consistency", prompt, cancel).await
    }
}

/// What the battery needs to know about one finished run.
#[derive(Debug, Clone)]
pub struct RunMeasurements<'a> {
    pub output: &'a str,
    pub research: &'a str,
    pub latency_secs: f64,
    pub cost_usd: f64,
}

/// Runs all eight evaluations and optionally publishes each score.
pub struct EvalSuite {
    judge: Judge,
    config: EvalsConfig,
    events: Option<Arc<EventBus>>,
}

impl EvalSuite {
    pub fn new(judge: Judge, config: EvalsConfig) -> Self {
        Self {
            judge,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, run_id: &RunId, m: RunMeasurements<'_>, cancel: &CancellationToken) -> Vec<Score> {
        let scores = vec![
            format_compliance(m.output),
            word_count_check(m.output, self.config.min_word_count),
            has_references(m.output),
            self.judge.analytical_rigor(m.output, cancel).await,
            self.judge.readability(m.output, cancel).await,
            self.judge.factual_consistency(m.output, m.research, cancel).await,
            latency_check(m.latency_secs, self.config.max_latency_secs),
            cost_check(m.cost_usd, self.config.max_cost_usd),
        ];

        for score in &scores {
            info!(run_id = %run_id, eval = %score.name, value = score.value, reason = %score.reason, "Score recorded");
            if let Some(events) = &self.events {
                events.publish(RunEvent::ScoreRecorded {
                    run_id: run_id.clone(),
                    score: score.clone(),
                });
            }
        }
        scores
    }
}
