use std::collections::HashSet;
use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;

use weft_core::error::Result;
use weft_core::traits::Tool;
use weft_core::types::{ToolContext, ToolResult};

use super::{parse_input, text_schema, TextInput};

fn normalized_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// ── PlagiarismCheckTool ─────────────────────────────────────────

const SHINGLE: usize = 5;

fn shingles(words: &[String]) -> HashSet<String> {
    words.windows(SHINGLE).map(|w| w.join(" ")).collect()
}

/// Share of the draft's 5-word shingles that also appear in the source.
pub fn overlap_ratio(draft: &str, source: &str) -> (f64, usize) {
    let draft_sh = shingles(&normalized_words(draft));
    if draft_sh.is_empty() {
        return (0.0, 0);
    }
    let source_sh = shingles(&normalized_words(source));
    let shared = draft_sh.intersection(&source_sh).count();
    (shared as f64 / draft_sh.len() as f64, shared)
}

pub struct PlagiarismCheckTool;

#[derive(Deserialize)]
struct PlagiarismInput {
    draft: String,
    source_text: String,
}

impl Tool for PlagiarismCheckTool {
    fn name(&self) -> &str {
        "plagiarism_check_tool"
    }
    fn description(&self) -> &str {
        "Measure verbatim phrase overlap between a draft and its source material."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "draft": { "type": "string", "description": "Draft text" },
                "source_text": { "type": "string", "description": "Source material" }
            },
            "required": ["draft", "source_text"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: PlagiarismInput = parse_input(input)?;
            let (ratio, shared) = overlap_ratio(&p.draft, &p.source_text);
            let level = if ratio >= 0.3 {
                "HIGH"
            } else if ratio >= 0.1 {
                "MODERATE"
            } else {
                "LOW"
            };
            Ok(ToolResult::success(format!(
                "Overlap: {:.1}% ({})\nShared phrases: {}",
                ratio * 100.0,
                level,
                shared
            )))
        })
    }
}

// ── CitationFormatterTool ───────────────────────────────────────

fn url_regex() -> Option<&'static Regex> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r#"https?://[^\s)\]>"']+"#).ok())
        .as_ref()
}

/// Numbered reference list of the distinct URLs in `text`.
pub fn format_citations(text: &str) -> Vec<String> {
    let Some(re) = url_regex() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    re.find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']))
        .filter(|u| seen.insert(u.to_string()))
        .enumerate()
        .map(|(i, url)| {
            let host = url
                .split("://")
                .nth(1)
                .and_then(|rest| rest.split('/').next())
                .unwrap_or(url);
            format!("[{}] {}. Retrieved from {}", i + 1, host, url)
        })
        .collect()
}

pub struct CitationFormatterTool;

impl Tool for CitationFormatterTool {
    fn name(&self) -> &str {
        "citation_formatter_tool"
    }
    fn description(&self) -> &str {
        "Collect the URLs in a text into a numbered reference list."
    }
    fn input_schema(&self) -> serde_json::Value {
        text_schema("Text containing URLs")
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TextInput = parse_input(input)?;
            let refs = format_citations(&p.text);
            if refs.is_empty() {
                return Ok(ToolResult::success("No URLs found to format."));
            }
            Ok(ToolResult::success(format!("References:\n{}", refs.join("\n"))))
        })
    }
}

// ── TranslationQualityTool ──────────────────────────────────────

pub struct TranslationQualityTool;

#[derive(Deserialize)]
struct TranslationInput {
    original: String,
    translation: String,
}

/// Length ratio and share of longer words copied unchanged from the
/// original.
pub fn translation_metrics(original: &str, translation: &str) -> (f64, f64) {
    let orig_len = original.chars().count();
    let ratio = if orig_len == 0 {
        0.0
    } else {
        translation.chars().count() as f64 / orig_len as f64
    };

    let orig_words: HashSet<String> = normalized_words(original)
        .into_iter()
        .filter(|w| w.len() > 3)
        .collect();
    let trans_words: Vec<String> = normalized_words(translation)
        .into_iter()
        .filter(|w| w.len() > 3)
        .collect();
    let copied = if trans_words.is_empty() {
        0.0
    } else {
        trans_words.iter().filter(|w| orig_words.contains(*w)).count() as f64
            / trans_words.len() as f64
    };
    (ratio, copied)
}

impl Tool for TranslationQualityTool {
    fn name(&self) -> &str {
        "translation_quality_tool"
    }
    fn description(&self) -> &str {
        "Sanity-check a translation against its original (length and untranslated words)."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "original": { "type": "string", "description": "Source text" },
                "translation": { "type": "string", "description": "Translated text" }
            },
            "required": ["original", "translation"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: TranslationInput = parse_input(input)?;
            if p.translation.trim().is_empty() {
                return Ok(ToolResult::success(
                    "Length ratio: 0.00 | Untranslated overlap: 0% | Assessment: MISSING",
                ));
            }
            let (ratio, copied) = translation_metrics(&p.original, &p.translation);
            let assessment = if copied > 0.5 {
                "UNTRANSLATED"
            } else if (0.8..=1.6).contains(&ratio) {
                "GOOD"
            } else {
                "CHECK LENGTH"
            };
            Ok(ToolResult::success(format!(
                "Length ratio: {:.2} | Untranslated overlap: {:.0}% | Assessment: {}",
                ratio,
                copied * 100.0,
                assessment
            )))
        })
    }
}
