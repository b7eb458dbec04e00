use crate::graph::Gate;

use super::state::{ReportState, Review};

/// Fact-check gate: back to the writer until approved or out of revisions.
pub fn fact_check_gate(max_revisions: u32) -> Gate<ReportState> {
    Gate::new(
        "fact_check",
        |s: &ReportState| s.fact_check == Review::Approved,
        |s: &ReportState| s.revision_count,
    )
    .with_max_revisions(max_revisions)
    .with_labels("editor", "writer")
}

/// Compliance gate: back to the editor until compliant or out of revisions.
pub fn compliance_gate(max_revisions: u32) -> Gate<ReportState> {
    Gate::new(
        "compliance",
        |s: &ReportState| s.compliance == Review::Approved,
        |s: &ReportState| s.compliance_revision_count,
    )
    .with_max_revisions(max_revisions)
    .with_labels("exec_summarizer", "editor")
}

/// Quality gate: satisfied by an approving verdict scoring at least
/// `threshold`.
pub fn quality_gate(max_revisions: u32, threshold: f64) -> Gate<ReportState> {
    Gate::new(
        "quality",
        move |s: &ReportState| s.quality == Review::Approved && s.quality_score >= threshold,
        |s: &ReportState| s.quality_revision_count,
    )
    .with_max_revisions(max_revisions)
    .with_labels("end", "editor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Decision, Router};

    #[test]
    fn test_fact_check_routes() {
        let gate = fact_check_gate(2);
        let mut s = ReportState::default();
        s.fact_check = Review::Rejected;
        s.revision_count = 1;
        assert_eq!(gate.route(&s), Decision::to("writer"));
        s.revision_count = 3;
        assert_eq!(gate.route(&s), Decision::exhausted("editor"));
        s.fact_check = Review::Approved;
        assert_eq!(gate.route(&s), Decision::to("editor"));
    }

    #[test]
    fn test_quality_needs_score_and_verdict() {
        let gate = quality_gate(1, 0.8);
        let mut s = ReportState::default();
        s.quality = Review::Approved;
        s.quality_score = 0.9;
        assert_eq!(gate.route(&s), Decision::to("end"));

        s.quality = Review::Rejected;
        s.quality_revision_count = 1;
        assert_eq!(gate.route(&s), Decision::to("editor"));
        s.quality_revision_count = 2;
        assert_eq!(gate.route(&s), Decision::exhausted("end"));
    }

    #[test]
    fn test_compliance_labels() {
        let gate = compliance_gate(2);
        assert_eq!(gate.pass_label(), "exec_summarizer");
        assert_eq!(gate.retry_label(), "editor");
        assert_eq!(gate.max_revisions(), 2);
    }
}
