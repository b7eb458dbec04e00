//! Research-report workflow on the graph engine.
//!
//! Eleven nodes produce a researched, reviewed and translated report. Three
//! gates (fact-check, compliance, quality) can send the draft back for
//! revision a bounded number of times.

pub mod deps;
pub mod gates;
pub mod graph;
pub mod nodes;
pub mod state;
pub mod verdict;

pub use deps::PipelineDeps;
pub use gates::{compliance_gate, fact_check_gate, quality_gate};
pub use graph::{build_report_graph, ReportPipeline};
pub use nodes::REQUIRED_SECTIONS;
pub use state::{ReportState, ReportUpdate, Review, Translations};
pub use verdict::{parse_verdict, Verdict};
