use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;

use weft_core::error::Result;
use weft_core::traits::Tool;
use weft_core::types::{ToolContext, ToolResult};

use super::{parse_input, sentences, text_schema, TextInput};

// ── KeywordExtractionTool ───────────────────────────────────────

/// Known SEO terms with their weights; higher weight ranks first.
const SEO_TERMS: &[(&str, u32)] = &[
    ("AI", 8),
    ("edge computing", 5),
    ("quantum", 5),
    ("latency", 4),
    ("machine learning", 4),
    ("security", 4),
    ("6G", 3),
    ("cloud", 3),
    ("regulation", 3),
    ("privacy", 3),
    ("IoT", 3),
    ("EU AI Act", 3),
    ("autonomous", 2),
    ("NISQ", 2),
    ("governance", 2),
];

pub const DEFAULT_KEYWORDS: &str = "technology, innovation, 2026";

pub fn extract_keywords(text: &str) -> String {
    let lower = text.to_lowercase();
    let found: Vec<&str> = SEO_TERMS
        .iter()
        .filter(|(kw, _)| lower.contains(&kw.to_lowercase()))
        .map(|(kw, _)| *kw)
        .take(8)
        .collect();
    if found.is_empty() {
        DEFAULT_KEYWORDS.to_string()
    } else {
        found.join(", ")
    }
}

pub struct KeywordExtractionTool;

impl Tool for KeywordExtractionTool {
    fn name(&self) -> &str {
        "keyword_extraction_tool"
    }
    fn description(&self) -> &str {
        "Extract SEO-relevant keywords from text. Returns a comma-separated list."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text to extract keywords from")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            Ok(ToolResult::success(extract_keywords(&p.text)))
        })
    }
}

// ── WordCountTool ───────────────────────────────────────────────

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub struct WordCountTool;

impl Tool for WordCountTool {
    fn name(&self) -> &str {
        "word_count_tool"
    }
    fn description(&self) -> &str {
        "Count the words in a text."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text to count")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            Ok(ToolResult::success(format!("Word count: {}", word_count(&p.text))))
        })
    }
}

// ── SentimentAnalysisTool ───────────────────────────────────────

const POSITIVE: &[&str] = &[
    "growth", "growing", "breakthrough", "advantage", "promising", "opportunity", "improve",
    "improved", "speedup", "lead", "benefit", "beneficiaries", "efficient", "innovation",
    "success", "strong", "outperforming", "practical", "rapidly", "gain",
];

const NEGATIVE: &[&str] = &[
    "challenge", "challenges", "risk", "concern", "concerns", "limit", "limits", "limitations",
    "nightmare", "hard", "difficult", "noisy", "fragmentation", "fines", "error", "decline",
    "threat", "gap", "costs", "weak",
];

/// Lexicon polarity in `[-1, 1]` plus the raw hit counts.
pub fn sentiment(text: &str) -> (f64, usize, usize) {
    let mut pos = 0;
    let mut neg = 0;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let w = word.to_lowercase();
        if POSITIVE.contains(&w.as_str()) {
            pos += 1;
        } else if NEGATIVE.contains(&w.as_str()) {
            neg += 1;
        }
    }
    let total = pos + neg;
    let score = if total == 0 {
        0.0
    } else {
        (pos as f64 - neg as f64) / total as f64
    };
    (score, pos, neg)
}

pub struct SentimentAnalysisTool;

impl Tool for SentimentAnalysisTool {
    fn name(&self) -> &str {
        "sentiment_analysis_tool"
    }
    fn description(&self) -> &str {
        "Score the overall tone of a text as Positive, Negative or Neutral."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text to analyse")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            let (score, pos, neg) = sentiment(&p.text);
            let label = if score > 0.2 {
                "Positive"
            } else if score < -0.2 {
                "Negative"
            } else {
                "Neutral"
            };
            Ok(ToolResult::success(format!(
                "Sentiment: {} (score: {:.2})\nPositive signals: {} | Negative signals: {}",
                label, score, pos, neg
            )))
        })
    }
}

// ── ReadabilityScoreTool ────────────────────────────────────────

fn syllables(word: &str) -> usize {
    let w: Vec<char> = word
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    if w.is_empty() {
        return 0;
    }
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut prev_vowel = false;
    for &c in &w {
        let v = is_vowel(c);
        if v && !prev_vowel {
            count += 1;
        }
        prev_vowel = v;
    }
    // silent trailing e
    if w.len() > 2 && w[w.len() - 1] == 'e' && !is_vowel(w[w.len() - 2]) && count > 1 {
        count -= 1;
    }
    count.max(1)
}

/// Flesch-Kincaid grade level and Flesch reading ease.
pub fn readability(text: &str) -> (f64, f64) {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .collect();
    let sentence_count = sentences(text).len().max(1) as f64;
    if words.is_empty() {
        return (0.0, 0.0);
    }
    let word_count = words.len() as f64;
    let syllable_count: usize = words.iter().map(|w| syllables(w)).sum();
    let wps = word_count / sentence_count;
    let spw = syllable_count as f64 / word_count;

    let grade = (0.39 * wps + 11.8 * spw - 15.59).max(0.0);
    let ease = (206.835 - 1.015 * wps - 84.6 * spw).clamp(0.0, 100.0);
    (grade, ease)
}

pub struct ReadabilityScoreTool;

impl Tool for ReadabilityScoreTool {
    fn name(&self) -> &str {
        "readability_score_tool"
    }
    fn description(&self) -> &str {
        "Compute the Flesch-Kincaid grade level and reading ease of a text."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text to score")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            let (grade, ease) = readability(&p.text);
            let band = if grade < 8.0 {
                "too simple"
            } else if grade <= 14.0 {
                "professional"
            } else {
                "too complex"
            };
            Ok(ToolResult::success(format!(
                "Grade Level: {:.1}\nReading Ease: {:.1}\nAssessment: {}",
                grade, ease, band
            )))
        })
    }
}

// ── TextSummarizerTool ──────────────────────────────────────────

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "is", "are", "was", "be", "by",
    "with", "as", "at", "that", "this", "it", "its", "from", "will", "has", "have", "their",
];

/// Frequency-scored extractive summary: the `n` best sentences, in the
/// order they appear.
pub fn summarize(text: &str, n: usize) -> Vec<String> {
    let sents = sentences(text);
    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let w = word.to_lowercase();
        if w.len() > 2 && !STOPWORDS.contains(&w.as_str()) {
            *freq.entry(w).or_default() += 1;
        }
    }

    let mut scored: Vec<(usize, f64)> = sents
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let words: Vec<String> = s
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase)
                .collect();
            let total: usize = words.iter().filter_map(|w| freq.get(w)).sum();
            (i, total as f64 / words.len().max(1) as f64)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut picked: Vec<usize> = scored.into_iter().take(n).map(|(i, _)| i).collect();
    picked.sort_unstable();
    picked.into_iter().map(|i| format!("{}.", sents[i])).collect()
}

pub struct TextSummarizerTool;

impl Tool for TextSummarizerTool {
    fn name(&self) -> &str {
        "text_summarizer_tool"
    }
    fn description(&self) -> &str {
        "Produce an extractive summary of the three most representative sentences."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text to summarise")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            let picked = summarize(&p.text, 3);
            if picked.is_empty() {
                return Ok(ToolResult::success("Extractive summary: (no sentences found)"));
            }
            let body: Vec<String> = picked.iter().map(|s| format!("- {}", s)).collect();
            Ok(ToolResult::success(format!("Extractive summary:\n{}", body.join("\n"))))
        })
    }
}

// ── HeadlineGeneratorTool ───────────────────────────────────────

pub struct HeadlineGeneratorTool;

#[derive(Deserialize)]
struct HeadlineInput {
    topic: String,
}

impl Tool for HeadlineGeneratorTool {
    fn name(&self) -> &str {
        "headline_generator_tool"
    }
    fn description(&self) -> &str {
        "Suggest five headline options for a report topic."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "topic": { "type": "string", "description": "Report topic" } },
            "required": ["topic"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: HeadlineInput = parse_input(input)?;
            let topic = p.topic.trim();
            let options = [
                format!("{}: What Leaders Need to Know", topic),
                format!("Inside {}: Trends, Risks and Opportunities", topic),
                format!("{} Explained: The Data Behind the Hype", topic),
                format!("Why {} Matters Now", topic),
                format!("{}: A Practical Outlook", topic),
            ];
            let lines: Vec<String> = options
                .iter()
                .enumerate()
                .map(|(i, h)| format!("{}. {}", i + 1, h))
                .collect();
            Ok(ToolResult::success(format!("Headline options:\n{}", lines.join("\n"))))
        })
    }
}

// ── StatisticsExtractorTool ─────────────────────────────────────

fn stat_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("Percentages", r"\d+(?:\.\d+)?%"),
            (
                "Monetary values",
                r"(?:\$|€|USD\s?)\d+(?:\.\d+)?\s?(?:[BMK]\b|billion|million|trillion)?",
            ),
            ("Multipliers", r"\b\d+(?:\.\d+)?x\b"),
            ("Years", r"\b(?:19|20)\d{2}\b"),
        ]
        .into_iter()
        .filter_map(|(label, re)| Regex::new(re).ok().map(|r| (label, r)))
        .collect()
    })
}

/// Numeric facts grouped by kind, each list de-duplicated in first-seen order.
pub fn extract_statistics(text: &str) -> Vec<(&'static str, Vec<String>)> {
    stat_patterns()
        .iter()
        .map(|(label, re)| {
            let mut seen = HashSet::new();
            let found = re
                .find_iter(text)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| seen.insert(s.clone()))
                .collect();
            (*label, found)
        })
        .collect()
}

pub struct StatisticsExtractorTool;

impl Tool for StatisticsExtractorTool {
    fn name(&self) -> &str {
        "statistics_extractor_tool"
    }
    fn description(&self) -> &str {
        "Extract percentages, monetary values, multipliers and years from text."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text to scan for statistics")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            let groups = extract_statistics(&p.text);
            let lines: Vec<String> = groups
                .iter()
                .map(|(label, items)| {
                    if items.is_empty() {
                        format!("{}: none", label)
                    } else {
                        format!("{}: {}", label, items.join(", "))
                    }
                })
                .collect();
            Ok(ToolResult::success(lines.join("\n")))
        })
    }
}
