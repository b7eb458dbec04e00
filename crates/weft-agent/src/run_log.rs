use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use weft_core::event::EventBus;
use weft_core::types::{RunEvent, RunId};

/// JSONL run logger.
///
/// Subscribes to the EventBus and writes one JSON object per line for the
/// events of a single run. Lines are flushed as they are written, so a log
/// survives a crash mid-run.
///
/// Scores are published after `RunComplete`, so the logger keeps going until
/// it is cancelled or the bus closes. Events already queued when the token
/// fires are still written.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `log_dir` is the base directory; logs go to
    /// `{log_dir}/{run_id}/{timestamp}.jsonl`.
    /// `level`: 1=run summary, 2=per-node, 3=per-tool.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and write in a background task.
    ///
    /// Subscribing before the task is spawned means no event published after
    /// this call returns can be missed.
    pub fn spawn(
        self,
        event_bus: &Arc<EventBus>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<PathBuf>> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, run_id, cancel))
    }

    /// Write events for `run_id` until cancellation or bus closure.
    /// Returns the log file path, or `None` when it could not be opened.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<RunEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let run_dir = self.log_dir.join(&run_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = run_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            let event = tokio::select! {
                biased;
                result = rx.recv() => match result {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "RunLogger lagged, skipped events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("EventBus closed, RunLogger stopping");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
            };

            if event.run_id() != &run_id {
                continue;
            }
            let Some(entry) = self.event_to_entry(&event) else {
                continue;
            };

            if let Ok(json) = serde_json::to_string(&entry) {
                let line = format!("{}\n", json);
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    error!(error = %e, "Failed to write log entry");
                    break;
                }
                if let Err(e) = writer.flush().await {
                    error!(error = %e, "Failed to flush log");
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }

    /// Convert a RunEvent to a log entry, or `None` when filtered by level.
    fn event_to_entry(&self, event: &RunEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, step: Option<usize>, detail: serde_json::Value| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().0.clone(),
            event_type: event_type.to_string(),
            step,
            detail: Some(detail),
        };

        match event {
            // L1: run summary
            RunEvent::RunStarted { entry: first, .. } => {
                Some(entry("run_started", None, serde_json::json!({ "entry": first })))
            }
            RunEvent::RunComplete {
                steps, elapsed_ms, ..
            } => Some(entry(
                "run_complete",
                Some(*steps),
                serde_json::json!({ "elapsed_ms": elapsed_ms }),
            )),
            RunEvent::RunError { error, .. } => Some(entry(
                "run_error",
                None,
                serde_json::json!({ "error": truncate_str(error, 500) }),
            )),
            RunEvent::ScoreRecorded { score, .. } => Some(entry(
                "score",
                None,
                serde_json::json!({
                    "name": score.name,
                    "value": score.value,
                    "reason": truncate_str(&score.reason, 200),
                }),
            )),

            // L2: per node
            RunEvent::NodeCompleted {
                node,
                step,
                trace,
                elapsed_ms,
                ..
            } if self.level >= 2 => Some(entry(
                "node_completed",
                Some(*step),
                serde_json::json!({ "node": node, "trace": trace, "elapsed_ms": elapsed_ms }),
            )),
            RunEvent::RouteChosen {
                node,
                label,
                target,
                exhausted,
                ..
            } if self.level >= 2 => Some(entry(
                "route_chosen",
                None,
                serde_json::json!({
                    "node": node,
                    "label": label,
                    "target": target,
                    "exhausted": exhausted,
                }),
            )),
            RunEvent::NodeFailed { node, error, .. } if self.level >= 2 => Some(entry(
                "node_failed",
                None,
                serde_json::json!({ "node": node, "error": truncate_str(error, 500) }),
            )),

            // L3: per step and per tool
            RunEvent::NodeStarted { node, step, .. } if self.level >= 3 => Some(entry(
                "node_started",
                Some(*step),
                serde_json::json!({ "node": node }),
            )),
            RunEvent::ToolStart { name, .. } if self.level >= 3 => {
                Some(entry("tool_start", None, serde_json::json!({ "tool": name })))
            }
            RunEvent::ToolEnd { name, is_error, .. } if self.level >= 3 => Some(entry(
                "tool_end",
                None,
                serde_json::json!({ "tool": name, "is_error": is_error }),
            )),

            _ => None,
        }
    }
}

fn truncate_str(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::types::Score;

    fn started(run_id: &RunId) -> RunEvent {
        RunEvent::RunStarted {
            run_id: run_id.clone(),
            entry: "researcher".into(),
        }
    }

    fn tool_start(run_id: &RunId) -> RunEvent {
        RunEvent::ToolStart {
            run_id: run_id.clone(),
            name: "search_tool".into(),
        }
    }

    fn node_completed(run_id: &RunId) -> RunEvent {
        RunEvent::NodeCompleted {
            run_id: run_id.clone(),
            node: "writer".into(),
            step: 3,
            trace: vec!["writer".into()],
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_entry_skips_empty_fields() {
        let entry = LogEntry {
            timestamp: "2026-02-24T12:00:00Z".to_string(),
            run_id: "run-1".to_string(),
            event_type: "run_started".to_string(),
            step: None,
            detail: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("run-1"));
        assert!(!json.contains("step"));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_event_level_filtering() {
        let run_id = RunId::from_str("r");

        let logger = RunLogger::new(PathBuf::from("/tmp"), 1);
        assert!(logger.event_to_entry(&started(&run_id)).is_some());
        assert!(logger.event_to_entry(&node_completed(&run_id)).is_none());
        assert!(logger.event_to_entry(&tool_start(&run_id)).is_none());

        let logger2 = RunLogger::new(PathBuf::from("/tmp"), 2);
        assert!(logger2.event_to_entry(&node_completed(&run_id)).is_some());
        assert!(logger2.event_to_entry(&tool_start(&run_id)).is_none());

        let logger3 = RunLogger::new(PathBuf::from("/tmp"), 3);
        assert!(logger3.event_to_entry(&tool_start(&run_id)).is_some());
    }

    #[test]
    fn test_truncate_str_respects_char_boundaries() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("ééééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_writes_only_its_run_and_keeps_scores() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let run_id = RunId::from_str("run-a");
        let other = RunId::from_str("run-b");
        let cancel = CancellationToken::new();

        let handle = RunLogger::new(dir.path().to_path_buf(), 2).spawn(&bus, run_id.clone(), cancel.clone());

        bus.publish(started(&run_id));
        bus.publish(started(&other));
        bus.publish(node_completed(&run_id));
        bus.publish(RunEvent::RunComplete {
            run_id: run_id.clone(),
            steps: 1,
            elapsed_ms: 5,
        });
        bus.publish(RunEvent::ScoreRecorded {
            run_id: run_id.clone(),
            score: Score::new("format_compliance", 1.0, "7/7 sections"),
        });
        cancel.cancel();

        let path = handle.await.unwrap().expect("log path");
        assert!(path.starts_with(dir.path().join("run-a")));

        let content = std::fs::read_to_string(&path).unwrap();
        let types: Vec<String> = content
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["event_type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(types, vec!["run_started", "node_completed", "run_complete", "score"]);
        assert!(!content.contains("run-b"));
    }
}
