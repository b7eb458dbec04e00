use serde::{Deserialize, Serialize};

use weft_core::types::ChatMessage;

use crate::graph::{Append, GraphState, Replace};

/// Typed reviewer verdict written by a gate's node and read by its router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Review {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Review {
    pub fn is_approved(self) -> bool {
        self == Review::Approved
    }
}

/// Spanish and French renderings of the executive summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Translations {
    pub spanish: Option<String>,
    pub french: Option<String>,
    /// Model output kept verbatim when it lacked the expected markers.
    pub raw: Option<String>,
    pub spanish_check: Option<String>,
    pub french_check: Option<String>,
}

/// State threaded through the research-report graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportState {
    pub task: String,
    pub topic_label: String,
    pub research_data: Vec<String>,
    pub enrichment_data: Vec<String>,
    pub analysis: String,
    pub sentiment: String,
    pub draft: String,
    pub critique: String,
    pub fact_check: Review,
    pub revision_count: u32,
    pub seo_keywords: Vec<String>,
    pub seo_brief: String,
    pub compliance_notes: String,
    pub compliance: Review,
    pub compliance_revision_count: u32,
    pub readability_grade: f64,
    pub executive_summary: String,
    pub translations: Translations,
    pub final_output: String,
    pub quality_score: f64,
    pub quality_notes: String,
    pub quality: Review,
    pub quality_revision_count: u32,
    pub iteration_log: Vec<String>,
    #[serde(skip)]
    pub messages: Vec<ChatMessage>,
}

impl ReportState {
    pub fn new(task: impl Into<String>, topic_label: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            topic_label: topic_label.into(),
            ..Default::default()
        }
    }

    /// Findings joined the way every downstream prompt consumes them.
    pub fn research_text(&self) -> String {
        self.research_data.join("\n\n")
    }

    /// `researcher → analyst → …`
    pub fn trace_line(&self) -> String {
        self.iteration_log.join(" → ")
    }
}

/// Fields a pipeline node may set. Unset fields are left untouched.
#[derive(Debug, Default)]
pub struct ReportUpdate {
    pub task: Replace<String>,
    pub topic_label: Replace<String>,
    pub research_data: Append<String>,
    pub enrichment_data: Append<String>,
    pub analysis: Replace<String>,
    pub sentiment: Replace<String>,
    pub draft: Replace<String>,
    pub critique: Replace<String>,
    pub fact_check: Replace<Review>,
    pub revision_count: Replace<u32>,
    pub seo_keywords: Replace<Vec<String>>,
    pub seo_brief: Replace<String>,
    pub compliance_notes: Replace<String>,
    pub compliance: Replace<Review>,
    pub compliance_revision_count: Replace<u32>,
    pub readability_grade: Replace<f64>,
    pub executive_summary: Replace<String>,
    pub translations: Replace<Translations>,
    pub final_output: Replace<String>,
    pub quality_score: Replace<f64>,
    pub quality_notes: Replace<String>,
    pub quality: Replace<Review>,
    pub quality_revision_count: Replace<u32>,
    pub iteration_log: Append<String>,
    pub messages: Append<ChatMessage>,
}

impl ReportUpdate {
    /// An update carrying only the node's trace entry.
    pub fn traced(entry: impl Into<String>) -> Self {
        Self {
            iteration_log: Append::one(entry.into()),
            ..Default::default()
        }
    }
}

impl GraphState for ReportState {
    type Update = ReportUpdate;

    fn merge(&mut self, u: ReportUpdate) {
        u.task.apply(&mut self.task);
        u.topic_label.apply(&mut self.topic_label);
        u.research_data.apply(&mut self.research_data);
        u.enrichment_data.apply(&mut self.enrichment_data);
        u.analysis.apply(&mut self.analysis);
        u.sentiment.apply(&mut self.sentiment);
        u.draft.apply(&mut self.draft);
        u.critique.apply(&mut self.critique);
        u.fact_check.apply(&mut self.fact_check);
        u.revision_count.apply(&mut self.revision_count);
        u.seo_keywords.apply(&mut self.seo_keywords);
        u.seo_brief.apply(&mut self.seo_brief);
        u.compliance_notes.apply(&mut self.compliance_notes);
        u.compliance.apply(&mut self.compliance);
        u.compliance_revision_count.apply(&mut self.compliance_revision_count);
        u.readability_grade.apply(&mut self.readability_grade);
        u.executive_summary.apply(&mut self.executive_summary);
        u.translations.apply(&mut self.translations);
        u.final_output.apply(&mut self.final_output);
        u.quality_score.apply(&mut self.quality_score);
        u.quality_notes.apply(&mut self.quality_notes);
        u.quality.apply(&mut self.quality);
        u.quality_revision_count.apply(&mut self.quality_revision_count);
        u.iteration_log.apply(&mut self.iteration_log);
        u.messages.apply(&mut self.messages);
    }

    fn trace(&self) -> &[String] {
        &self.iteration_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::merge;

    #[test]
    fn test_research_accumulates_across_nodes() {
        let mut state = ReportState::new("Edge AI", "edge");
        state.merge(ReportUpdate {
            research_data: Append::one("first".into()),
            ..ReportUpdate::traced("researcher")
        });
        state.merge(ReportUpdate {
            research_data: Append::one("second".into()),
            enrichment_data: Append::one("second".into()),
            ..ReportUpdate::traced("data_enricher")
        });
        assert_eq!(state.research_data, vec!["first", "second"]);
        assert_eq!(state.enrichment_data, vec!["second"]);
        assert_eq!(state.research_text(), "first\n\nsecond");
        assert_eq!(state.trace_line(), "researcher → data_enricher");
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut start = ReportState::new("Edge AI", "edge");
        start.draft = "draft v1".into();
        start.revision_count = 1;
        let next = merge(
            start,
            ReportUpdate {
                critique: "fix numbers".to_string().into(),
                ..ReportUpdate::traced("fact_checker_pass_2_rejected")
            },
        );
        assert_eq!(next.draft, "draft v1");
        assert_eq!(next.revision_count, 1);
        assert_eq!(next.critique, "fix numbers");
        assert_eq!(next.task, "Edge AI");
    }

    #[test]
    fn test_review_default_is_pending() {
        assert_eq!(ReportState::default().fact_check, Review::Pending);
        assert!(!Review::Rejected.is_approved());
    }
}
