use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::state::Review;

/// What a reviewer model decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub review: Review,
    pub notes: String,
    /// Score normalized to `[0, 1]`, when the reviewer gave one.
    pub score: Option<f64>,
}

#[derive(Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    notes: Option<serde_json::Value>,
    #[serde(default)]
    score: Option<f64>,
}

const APPROVING: &[&str] = &["approved", "approve", "passed", "pass", "compliant"];

/// Parse a reviewer reply of the form
/// `{"verdict": "...", "notes": "...", "score": n}`.
///
/// Anything that is not such an object is a rejection whose notes are the
/// raw reply. Scores above 1 are read as out of ten.
pub fn parse_verdict(text: &str) -> Verdict {
    let json = extract_json(text);
    let raw: RawVerdict = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Reviewer reply is not a verdict object");
            return Verdict {
                review: Review::Rejected,
                notes: text.trim().to_string(),
                score: legacy_score(text),
            };
        }
    };

    let review = if APPROVING.contains(&raw.verdict.trim().to_lowercase().as_str()) {
        Review::Approved
    } else {
        Review::Rejected
    };
    let notes = match raw.notes {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => format!("- {}", s),
                other => format!("- {}", other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let notes = if notes.trim().is_empty() && review == Review::Rejected {
        text.trim().to_string()
    } else {
        notes
    };
    let score = raw
        .score
        .map(|s| if s > 1.0 { s / 10.0 } else { s })
        .map(|s| s.clamp(0.0, 1.0));

    Verdict { review, notes, score }
}

/// `SCORE: n` out of ten, for replies that ignored the JSON format.
fn legacy_score(text: &str) -> Option<f64> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"SCORE:\s*(\d+)").ok()).as_ref()?;
    let n: f64 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    Some((n / 10.0).clamp(0.0, 1.0))
}

/// Extract JSON from text that may contain markdown code blocks.
pub(crate) fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approved_verdict() {
        let v = parse_verdict(r#"{"verdict": "approved", "notes": ""}"#);
        assert_eq!(v.review, Review::Approved);
        assert_eq!(v.notes, "");
        assert_eq!(v.score, None);
    }

    #[test]
    fn test_rejected_verdict_in_code_fence() {
        let v = parse_verdict(
            "Here you go:\n```json\n{\"verdict\": \"rejected\", \"notes\": [\"Wrong market size\", \"Promotional tone\"]}\n```",
        );
        assert_eq!(v.review, Review::Rejected);
        assert_eq!(v.notes, "- Wrong market size\n- Promotional tone");
    }

    #[test]
    fn test_unparseable_reply_is_rejection_with_raw_notes() {
        let v = parse_verdict("The draft looks fine to me.");
        assert_eq!(v.review, Review::Rejected);
        assert_eq!(v.notes, "The draft looks fine to me.");
    }

    #[test]
    fn test_prose_mentioning_approved_is_not_approval() {
        let v = parse_verdict("NOT APPROVED: numbers do not match");
        assert_eq!(v.review, Review::Rejected);
    }

    #[test]
    fn test_scores_normalized() {
        let v = parse_verdict(r#"{"verdict": "passed", "score": 9}"#);
        assert_eq!(v.review, Review::Approved);
        assert_eq!(v.score, Some(0.9));

        let v = parse_verdict(r#"{"verdict": "failed", "score": 0.4, "notes": "thin"}"#);
        assert_eq!(v.review, Review::Rejected);
        assert_eq!(v.score, Some(0.4));

        let v = parse_verdict("SCORE: 6 | VERDICT: FAILED | NOTES: weak conclusion");
        assert_eq!(v.score, Some(0.6));
    }

    #[test]
    fn test_rejection_without_notes_keeps_raw_text() {
        let raw = r#"{"verdict": "rejected"}"#;
        assert_eq!(parse_verdict(raw).notes, raw);
    }
}
