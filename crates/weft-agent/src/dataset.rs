use std::path::Path;

use serde::{Deserialize, Serialize};

use weft_core::error::{Result, WeftError};

/// One research topic with what its report is expected to contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchItem {
    pub topic: String,
    #[serde(default)]
    pub expected_sections: Vec<String>,
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_min_word_count() -> usize { 500 }
fn default_quality_threshold() -> f64 { 0.8 }

/// A question for the ReAct agent and the answer it should reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub ground_truth: Option<String>,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WeftError::Dataset(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| WeftError::Dataset(format!("{}: {}", path.display(), e)))
}

pub fn load_research_items(path: &Path) -> Result<Vec<ResearchItem>> {
    load_json(path)
}

pub fn load_react_cases(path: &Path) -> Result<Vec<ReactCase>> {
    load_json(path)
}

/// The three topics of the multi-topic demo run.
pub fn demo_topics() -> Vec<ResearchItem> {
    let item = |topic: &str, tags: &[&str]| ResearchItem {
        topic: topic.to_string(),
        expected_sections: Vec::new(),
        min_word_count: default_min_word_count(),
        expected_keywords: Vec::new(),
        quality_threshold: default_quality_threshold(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    };
    vec![
        item(
            "Future of Edge Computing in 2026",
            &["edge-computing", "infrastructure", "6G"],
        ),
        item(
            "Quantum Machine Learning: Promise vs Reality in 2026",
            &["quantum", "machine-learning", "research"],
        ),
        item(
            "Global AI Regulation Landscape in 2026",
            &["ai-regulation", "policy", "governance"],
        ),
    ]
}

/// A named pass/fail expectation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
}

/// Compare a finished draft with an item's expectations.
///
/// Produces one `has_<section>` check per expected section, a
/// `meets_word_count` check and a `keywords_<found>/<total>` check that
/// passes when at least half the keywords (rounded down) appear.
pub fn check_expected_output(draft: &str, item: &ResearchItem) -> Vec<Check> {
    let lower = draft.to_lowercase();
    let mut checks: Vec<Check> = item
        .expected_sections
        .iter()
        .map(|section| Check {
            name: format!("has_{}", section.to_lowercase().replace(' ', "_")),
            passed: lower.contains(&section.to_lowercase()),
        })
        .collect();

    checks.push(Check {
        name: "meets_word_count".into(),
        passed: draft.split_whitespace().count() >= item.min_word_count,
    });

    let total = item.expected_keywords.len();
    let found = item
        .expected_keywords
        .iter()
        .filter(|kw| lower.contains(&kw.to_lowercase()))
        .count();
    checks.push(Check {
        name: format!("keywords_{}/{}", found, total),
        passed: found >= total / 2,
    });

    checks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ResearchItem {
        ResearchItem {
            topic: "Edge".into(),
            expected_sections: vec!["Executive Summary".into(), "Key Findings".into()],
            min_word_count: 5,
            expected_keywords: vec!["latency".into(), "5G".into(), "privacy".into()],
            quality_threshold: 0.8,
            tags: vec![],
        }
    }

    #[test]
    fn test_checks_in_order() {
        let draft = "## Executive Summary\nLow LATENCY matters for edge workloads.";
        let checks = check_expected_output(draft, &item());
        let names: Vec<&str> = checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["has_executive_summary", "has_key_findings", "meets_word_count", "keywords_1/3"]
        );
        let passed: Vec<bool> = checks.iter().map(|c| c.passed).collect();
        assert_eq!(passed, vec![true, false, true, true]);
    }

    #[test]
    fn test_keyword_threshold_rounds_down() {
        let mut it = item();
        it.expected_keywords = vec!["a1".into(), "b2".into(), "c3".into(), "d4".into()];
        let checks = check_expected_output("a1 only", &it);
        let kw = checks.last().unwrap();
        assert_eq!(kw.name, "keywords_1/4");
        assert!(!kw.passed);
    }

    #[test]
    fn test_load_defaults_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, r#"[{"topic": "Quantum ML", "expected_keywords": ["qubit"]}]"#).unwrap();
        let items = load_research_items(&path).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].min_word_count, 500);
        assert_eq!(items[0].quality_threshold, 0.8);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load_research_items(&path), Err(WeftError::Dataset(_))));
        assert!(matches!(
            load_react_cases(&dir.path().join("missing.json")),
            Err(WeftError::Dataset(_))
        ));
    }

    #[test]
    fn test_demo_topics() {
        let topics = demo_topics();
        assert_eq!(topics.len(), 3);
        assert!(topics[2].tags.contains(&"governance".to_string()));
    }
}
